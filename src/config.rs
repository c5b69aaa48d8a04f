//! Project configuration and the site registry. The registry is the static
//! table of every deployed domain; each entry carries the ordinal index that
//! the sharding step ([`crate::shard`]) matches posts against, so a
//! registry that fails to load (or whose indices are not a dense `0..N`
//! cover) aborts the whole build before any output is written.

use crate::util::open;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// The project file searched for in the working directory and its ancestors.
pub const PROJECT_FILE: &str = "dealgrid.yaml";

#[derive(Deserialize)]
struct BatchSize(usize);
impl Default for BatchSize {
    fn default() -> Self {
        BatchSize(21)
    }
}

#[derive(Deserialize)]
struct MinProducts(usize);
impl Default for MinProducts {
    fn default() -> Self {
        MinProducts(3)
    }
}

#[derive(Deserialize)]
struct MaxProducts(usize);
impl Default for MaxProducts {
    fn default() -> Self {
        MaxProducts(6)
    }
}

#[derive(Deserialize)]
struct Project {
    #[serde(default = "Project::default_store")]
    store: PathBuf,

    #[serde(default = "Project::default_registry")]
    registry: PathBuf,

    #[serde(default = "Project::default_keywords")]
    keywords: PathBuf,

    #[serde(default = "Project::default_assets")]
    assets: PathBuf,

    #[serde(default = "Project::default_output")]
    output: PathBuf,

    #[serde(default)]
    batch_size: BatchSize,

    #[serde(default)]
    min_products: MinProducts,

    #[serde(default)]
    max_products: MaxProducts,
}

impl Project {
    fn default_store() -> PathBuf {
        PathBuf::from("posts.json")
    }

    fn default_registry() -> PathBuf {
        PathBuf::from("siteconfig.yaml")
    }

    fn default_keywords() -> PathBuf {
        PathBuf::from("keywords.csv")
    }

    fn default_assets() -> PathBuf {
        PathBuf::from("assets")
    }

    fn default_output() -> PathBuf {
        PathBuf::from("dist")
    }
}

/// Fully-resolved project configuration. All paths are absolute with respect
/// to the directory containing the project file.
pub struct Config {
    pub store_path: PathBuf,
    pub registry_path: PathBuf,
    pub keywords_path: PathBuf,
    pub assets_directory: PathBuf,
    pub output_directory: PathBuf,

    /// Number of keywords attempted per `batch` ingestion run.
    pub batch_size: usize,

    /// Minimum usable products below which a keyword is skipped.
    pub min_products: usize,

    /// Maximum products embedded in a single post.
    pub max_products: usize,

    /// Worker threads for the per-site build loop.
    pub threads: usize,
}

impl Config {
    /// Searches `dir` and its ancestors for a [`PROJECT_FILE`] and loads the
    /// configuration from the first one found.
    pub fn from_directory(dir: &Path, threads: Option<usize>) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            match Config::from_project_file(&path, threads) {
                Ok(config) => Ok(config),
                Err(e) => Err(anyhow!("Loading configuration: {:?}", e)),
            }
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, threads),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(path: &Path, threads: Option<usize>) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)?;
        match path.parent() {
            None => Err(anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )),
            Some(project_root) => Ok(Config {
                store_path: project_root.join(project.store),
                registry_path: project_root.join(project.registry),
                keywords_path: project_root.join(project.keywords),
                assets_directory: project_root.join(project.assets),
                output_directory: project_root.join(project.output),
                batch_size: project.batch_size.0,
                min_products: project.min_products.0,
                max_products: project.max_products.0,
                threads: match threads {
                    None => num_cpus::get(),
                    Some(threads) => threads,
                },
            }),
        }
    }
}

/// The visual variant a site renders with. Emitted as the `data-theme`
/// attribute on the document body; the stylesheet maps each variant to a
/// palette.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Purple,
    Red,
    Green,
    Blue,
    Gold,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Theme::Purple => "purple",
            Theme::Red => "red",
            Theme::Green => "green",
            Theme::Blue => "blue",
            Theme::Gold => "gold",
        })
    }
}

#[derive(Deserialize)]
struct SiteEntry {
    id: String,
    index: usize,
    label: String,
    theme: Theme,
    #[serde(rename = "naverVerification")]
    naver_verification: String,
}

/// One registered site. `domain` is the registry key; `base_url` is derived
/// from it once at load time so downstream code never re-parses it.
#[derive(Clone, Debug)]
pub struct Site {
    pub id: String,
    pub index: usize,
    pub domain: String,
    pub label: String,
    pub theme: Theme,
    pub naver_verification: String,
    pub base_url: Url,
}

/// The static domain→site table, loaded once per build invocation. Sites are
/// held sorted by ordinal index.
pub struct Registry {
    sites: Vec<Site>,
}

impl Registry {
    pub fn load(path: &Path) -> Result<Registry> {
        let entries: BTreeMap<String, SiteEntry> =
            serde_yaml::from_reader(open(path, "site registry")?)?;
        Registry::from_entries(entries)
    }

    pub fn from_str(contents: &str) -> Result<Registry> {
        let entries: BTreeMap<String, SiteEntry> = serde_yaml::from_str(contents)?;
        Registry::from_entries(entries)
    }

    fn from_entries(entries: BTreeMap<String, SiteEntry>) -> Result<Registry> {
        if entries.is_empty() {
            return Err(anyhow!("Site registry is empty"));
        }

        let mut sites = Vec::with_capacity(entries.len());
        for (domain, entry) in entries {
            let base_url = Url::parse(&format!("https://{}/", domain))
                .map_err(|e| anyhow!("Registry domain `{}` is not a valid host: {}", domain, e))?;
            sites.push(Site {
                id: entry.id,
                index: entry.index,
                domain,
                label: entry.label,
                theme: entry.theme,
                naver_verification: entry.naver_verification,
                base_url,
            });
        }
        sites.sort_by_key(|site| site.index);

        // Every site's shard depends on a consistent registry size, so the
        // indices must cover 0..N exactly.
        for (expected, site) in sites.iter().enumerate() {
            if site.index != expected {
                return Err(anyhow!(
                    "Registry indices must cover 0..{} exactly; found index {} for site `{}`",
                    sites.len(),
                    site.index,
                    site.id
                ));
            }
        }

        let mut ids: Vec<&str> = sites.iter().map(|site| site.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.len() != sites.len() {
            return Err(anyhow!("Registry site ids must be unique"));
        }

        Ok(Registry { sites })
    }

    /// The registry size `N` that positional sharding closes over.
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }
}
