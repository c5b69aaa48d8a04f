//! Exports the [`build_sites`] function which stitches together the
//! high-level steps of a full build: for every site in the registry, select
//! its post subset ([`crate::shard`]), render the detail and index documents
//! ([`crate::render`]), emit the SEO artifacts ([`crate::seo`]), and copy the
//! shared static assets into the site's output directory.
//!
//! Sites share no mutable state, so the per-site loop fans out across a
//! bounded worker pool. Each site writes only beneath its own directory; a
//! failure in one site's build never corrupts another's output.

use crate::config::{Config, Registry, Site};
use crate::render;
use crate::seo;
use crate::shard;
use crate::store::Post;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What a completed build produced: every registered site, and the total
/// number of detail pages written across all of them.
pub struct BuildSummary {
    pub sites: usize,
    pub posts: usize,
}

/// Builds every registered site from the loaded post store. The output root
/// is cleared and recreated first, so each build starts from a clean tree;
/// everything under it (verification stubs included) is re-derived from the
/// store and registry.
pub fn build_sites(config: &Config, registry: &Registry, posts: &[Post]) -> Result<BuildSummary> {
    rmdir(&config.output_directory)?;
    fs::create_dir_all(&config.output_directory)?;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let threads = config.threads.min(registry.len());
    let written = if threads < 2 {
        build_singlethreaded(config, registry, posts, &today)?
    } else {
        build_parallel(config, registry, posts, &today, threads)?
    };

    Ok(BuildSummary {
        sites: registry.len(),
        posts: written,
    })
}

fn build_singlethreaded(
    config: &Config,
    registry: &Registry,
    posts: &[Post],
    today: &str,
) -> Result<usize> {
    let mut written = 0;
    for site in registry.sites() {
        let subset = shard::site_posts(posts, site.index, registry.len());
        written += build_one_site(
            &config.output_directory,
            &config.assets_directory,
            site,
            &subset,
            today,
        )?;
    }
    Ok(written)
}

fn build_parallel(
    config: &Config,
    registry: &Registry,
    posts: &[Post],
    today: &str,
    threads: usize,
) -> Result<usize> {
    use crossbeam_channel::unbounded;
    use std::thread;

    let (tx, rx) = unbounded::<(Site, Vec<Post>)>();
    let mut workers = Vec::with_capacity(threads);

    for _ in 0..workers.capacity() {
        let rx = rx.clone();
        let output_directory = config.output_directory.clone();
        let assets_directory = config.assets_directory.clone();
        let today = today.to_owned();
        workers.push(thread::spawn(move || -> Result<usize> {
            let mut written = 0;
            for (site, subset) in rx {
                let refs: Vec<&Post> = subset.iter().collect();
                written +=
                    build_one_site(&output_directory, &assets_directory, &site, &refs, &today)?;
            }
            Ok(written)
        }));
    }

    for site in registry.sites() {
        let subset: Vec<Post> = shard::site_posts(posts, site.index, registry.len())
            .into_iter()
            .cloned()
            .collect();
        tx.send((site.clone(), subset))?;
    }
    drop(tx);

    let mut written = 0;
    for worker in workers {
        written += worker.join().unwrap()?;
    }
    Ok(written)
}

// Writes one site's complete output directory. Returns the number of detail
// pages written.
fn build_one_site(
    output_root: &Path,
    assets_directory: &Path,
    site: &Site,
    subset: &[&Post],
    today: &str,
) -> Result<usize> {
    let site_directory = output_root.join(&site.id);
    let posts_directory = site_directory.join("posts");
    fs::create_dir_all(&posts_directory)?;

    for post in subset {
        write_file(
            &posts_directory.join(format!("{}.html", post.slug)),
            &render::detail_page(post, site),
        )?;
    }

    write_file(
        &site_directory.join("index.html"),
        &render::index_page(subset, site),
    )?;
    write_file(
        &site_directory.join("sitemap.xml"),
        &seo::sitemap(&site.base_url, subset, today),
    )?;
    write_file(&site_directory.join("robots.txt"), &seo::robots(&site.base_url))?;

    // Search-engine ownership stub, regenerated from the registry on every
    // build.
    write_file(
        &site_directory.join(format!("naver{}.html", site.naver_verification)),
        &format!(
            "<html><head><meta name=\"naver-site-verification\" content=\"{}\" /></head><body></body></html>",
            html_escape::encode_double_quoted_attribute(&site.naver_verification)
        ),
    )?;

    copy_assets(assets_directory, &site_directory)?;

    Ok(subset.len())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|err| Error::Write {
        path: path.to_owned(),
        err,
    })
}

// Copies the shared static assets (stylesheet, client registry script) into
// the site directory, unmodified.
fn copy_assets(src: &Path, dst: &Path) -> Result<()> {
    for result in walkdir::WalkDir::new(src) {
        let entry = result?;
        // strip_prefix can't fail since the walk is rooted at `src`
        let relative = entry.path().strip_prefix(src).unwrap();
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|err| Error::Copy {
                from: entry.path().to_owned(),
                to: target,
                err,
            })?;
        }
    }
    Ok(())
}

fn rmdir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

type Result<T> = std::result::Result<T, Error>;

/// The error type for building the output tree. Errors can occur cleaning
/// the output root, writing rendered documents, copying assets, and other
/// I/O.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O problems while clearing the output root.
    Clean { path: PathBuf, err: io::Error },

    /// Returned for I/O problems writing a rendered document.
    Write { path: PathBuf, err: io::Error },

    /// Returned for I/O problems copying a shared asset.
    Copy {
        from: PathBuf,
        to: PathBuf,
        err: io::Error,
    },

    /// Returned for errors walking the assets directory.
    Walk(walkdir::Error),

    /// Returned when the per-site work queue is lost mid-build.
    Dispatch,

    /// Returned for other I/O errors.
    Io(io::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::Write { path, err } => {
                write!(f, "Writing '{}': {}", path.display(), err)
            }
            Error::Copy { from, to, err } => write!(
                f,
                "Copying asset '{}' to '{}': {}",
                from.display(),
                to.display(),
                err
            ),
            Error::Walk(err) => err.fmt(f),
            Error::Dispatch => write!(f, "Build workers exited before the site queue drained"),
            Error::Io(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Clean { path: _, err } => Some(err),
            Error::Write { path: _, err } => Some(err),
            Error::Copy { from: _, to: _, err } => Some(err),
            Error::Walk(err) => Some(err),
            Error::Dispatch => None,
            Error::Io(err) => Some(err),
        }
    }
}

impl From<io::Error> for Error {
    /// Converts [`io::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<walkdir::Error> for Error {
    /// Converts [`walkdir::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: walkdir::Error) -> Error {
        Error::Walk(err)
    }
}

impl From<crossbeam_channel::SendError<(Site, Vec<Post>)>> for Error {
    /// Converts send failures on the site queue into [`Error`]. This allows
    /// us to use the `?` operator.
    fn from(_: crossbeam_channel::SendError<(Site, Vec<Post>)>) -> Error {
        Error::Dispatch
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Registry;
    use crate::store::UNCATEGORIZED;

    const REGISTRY: &str = r#"
shop.moashop.co.kr:
  id: shop
  index: 0
  label: "데일리 쇼핑 가이드"
  theme: purple
  naverVerification: "aaaa0000"
aurora.moashop.co.kr:
  id: aurora
  index: 1
  label: "오로라 특가 정보"
  theme: red
  naverVerification: "bbbb1111"
"#;

    fn fixture(root: &Path, threads: usize) -> Config {
        let assets = root.join("assets");
        fs::create_dir_all(&assets).unwrap();
        fs::write(assets.join("styles.css"), "body { margin: 0; }\n").unwrap();
        fs::write(assets.join("siteconfig.js"), "// shared registry\n").unwrap();
        Config {
            store_path: root.join("posts.json"),
            registry_path: root.join("siteconfig.yaml"),
            keywords_path: root.join("keywords.csv"),
            assets_directory: assets,
            output_directory: root.join("dist"),
            batch_size: 21,
            min_products: 3,
            max_products: 6,
            threads,
        }
    }

    fn post(slug: &str, date: &str, site_index: Option<usize>) -> Post {
        Post {
            slug: slug.to_owned(),
            date: date.to_owned(),
            title: format!("{} 추천", slug),
            headline: String::new(),
            description: String::new(),
            category: UNCATEGORIZED.to_owned(),
            tags: Vec::new(),
            products: Vec::new(),
            site_index,
        }
    }

    fn assert_site_tree(config: &Config, registry: &Registry) {
        for site in registry.sites() {
            let dir = config.output_directory.join(&site.id);
            assert!(dir.join("index.html").exists());
            assert!(dir.join("sitemap.xml").exists());
            assert!(dir.join("robots.txt").exists());
            assert!(dir.join("styles.css").exists());
            assert!(dir.join("siteconfig.js").exists());
            assert!(dir
                .join(format!("naver{}.html", site.naver_verification))
                .exists());
        }
    }

    #[test]
    fn test_build_output_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let config = fixture(tmp.path(), 1);
        let registry = Registry::from_str(REGISTRY).unwrap();
        let posts = vec![
            post("a-2024-01-01", "2024-01-01", Some(0)),
            post("b-2024-01-02", "2024-01-02", None),
        ];

        let summary = build_sites(&config, &registry, &posts).unwrap();
        assert_eq!(summary.sites, 2);
        assert_eq!(summary.posts, 2);
        assert_site_tree(&config, &registry);

        // Post "a" is pinned to shop; "b" falls back to 1 mod 2 == aurora.
        assert!(config
            .output_directory
            .join("shop/posts/a-2024-01-01.html")
            .exists());
        assert!(!config
            .output_directory
            .join("shop/posts/b-2024-01-02.html")
            .exists());
        assert!(config
            .output_directory
            .join("aurora/posts/b-2024-01-02.html")
            .exists());
    }

    #[test]
    fn test_build_resets_output_root() {
        let tmp = tempfile::tempdir().unwrap();
        let config = fixture(tmp.path(), 1);
        let registry = Registry::from_str(REGISTRY).unwrap();

        let stale = config.output_directory.join("shop/posts/stale.html");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        build_sites(&config, &registry, &[]).unwrap();
        assert!(!stale.exists());
        assert_site_tree(&config, &registry);
    }

    #[test]
    fn test_build_parallel_matches_sequential() {
        let registry = Registry::from_str(REGISTRY).unwrap();
        let posts: Vec<Post> = (0..6)
            .map(|i| post(&format!("p{}-2024-01-0{}", i, i + 1), "2024-01-01", None))
            .collect();

        let sequential = tempfile::tempdir().unwrap();
        let parallel = tempfile::tempdir().unwrap();
        build_sites(&fixture(sequential.path(), 1), &registry, &posts).unwrap();
        build_sites(&fixture(parallel.path(), 4), &registry, &posts).unwrap();

        for site in registry.sites() {
            let a = fs::read_to_string(
                sequential.path().join("dist").join(&site.id).join("index.html"),
            )
            .unwrap();
            let b = fs::read_to_string(
                parallel.path().join("dist").join(&site.id).join("index.html"),
            )
            .unwrap();
            assert_eq!(a, b);
        }
    }
}
