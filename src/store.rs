//! The post store: a single JSON document holding the flat, ordered array of
//! every post ever ingested. Posts are immutable once written; the only
//! mutation is a whole-array append (read-modify-write of the entire
//! document, single-writer assumption). Ordinal position within the array is
//! load-bearing for sharding ([`crate::shard`]), which is why the store is
//! never compacted or reordered.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sentinel substituted for a missing or blank post category.
pub const UNCATEGORIZED: &str = "uncategorized";

/// One product card embedded in a post. `price` is a pre-formatted display
/// string; no numeric price survives ingestion.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub price: String,

    #[serde(default)]
    pub desc: String,

    #[serde(default)]
    pub tag: String,

    #[serde(default)]
    pub image: String,

    #[serde(default)]
    pub link: String,
}

/// One comparison article. Every field except `slug` and `date` is read
/// defensively with a fallback default, since old store documents predate
/// some fields.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Post {
    pub slug: String,

    /// Publication date, `YYYY-MM-DD`. Drives index ordering and the
    /// sitemap's last-modified field.
    pub date: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub headline: String,

    #[serde(default)]
    pub description: String,

    #[serde(
        default = "default_category",
        deserialize_with = "deserialize_category"
    )]
    pub category: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default)]
    pub products: Vec<Product>,

    /// Explicit site assignment, stored at ingestion time. Absent on legacy
    /// posts, which fall back to positional sharding.
    #[serde(
        rename = "siteIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub site_index: Option<usize>,
}

fn default_category() -> String {
    UNCATEGORIZED.to_owned()
}

// `null` and blank categories collapse to the sentinel, not just missing
// keys.
fn deserialize_category<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<String>::deserialize(deserializer)? {
        Some(category) if !category.trim().is_empty() => category,
        _ => default_category(),
    })
}

impl Post {
    /// The image for the post's summary card: the first product's image, or a
    /// placeholder when the post has no products.
    pub fn thumbnail(&self) -> &str {
        self.products
            .first()
            .map(|product| product.image.as_str())
            .filter(|image| !image.is_empty())
            .unwrap_or(PLACEHOLDER_IMAGE)
    }
}

pub const PLACEHOLDER_IMAGE: &str = "https://via.placeholder.com/400x300?text=No+Image";

/// Loads the full ordered post sequence from the document at `path`.
/// Duplicate slugs are rejected here rather than silently letting two posts
/// fight over one output file.
pub fn load(path: &Path) -> Result<Vec<Post>> {
    let contents = fs::read_to_string(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    let posts: Vec<Post> = serde_json::from_str(&contents).map_err(|err| Error::Parse {
        path: path.to_owned(),
        err,
    })?;
    check_unique_slugs(&posts)?;
    Ok(posts)
}

/// Appends `new_posts` to the document at `path` as a whole-array rewrite.
/// Returns the number of posts appended.
pub fn append(path: &Path, new_posts: Vec<Post>) -> Result<usize> {
    let mut posts = load(path)?;
    let appended = new_posts.len();
    posts.extend(new_posts);
    check_unique_slugs(&posts)?;
    let contents = serde_json::to_string_pretty(&posts).map_err(|err| Error::Parse {
        path: path.to_owned(),
        err,
    })?;
    fs::write(path, contents).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    Ok(appended)
}

fn check_unique_slugs(posts: &[Post]) -> Result<()> {
    use std::collections::HashSet;
    let mut seen: HashSet<&str> = HashSet::with_capacity(posts.len());
    for post in posts {
        if !seen.insert(&post.slug) {
            return Err(Error::DuplicateSlug(post.slug.clone()));
        }
    }
    Ok(())
}

/// Reduces a keyword to the restricted slug character set: whitespace runs
/// become single hyphens and everything outside ASCII alphanumerics, Hangul
/// syllables, and hyphens is dropped.
pub fn sanitize_slug(keyword: &str) -> String {
    let mut slug = String::with_capacity(keyword.len());
    let mut pending_hyphen = false;
    for c in keyword.trim().chars() {
        if c.is_whitespace() {
            pending_hyphen = !slug.is_empty();
            continue;
        }
        if c.is_ascii_alphanumeric() || ('가'..='힣').contains(&c) || c == '-' {
            if pending_hyphen {
                slug.push('-');
                pending_hyphen = false;
            }
            slug.push(c);
        }
    }
    slug
}

/// Builds the canonical slug for a keyword posted on `date` (`YYYY-MM-DD`).
pub fn make_slug(keyword: &str, date: &str) -> String {
    format!("{}-{}", sanitize_slug(keyword), date)
}

type Result<T> = std::result::Result<T, Error>;

/// Represents an error reading or writing the post store.
#[derive(Debug)]
pub enum Error {
    /// Returned when the store document cannot be read or written.
    Io { path: PathBuf, err: io::Error },

    /// Returned when the store document is not a well-formed post array.
    Parse {
        path: PathBuf,
        err: serde_json::Error,
    },

    /// Returned when two posts share a slug; colliding slugs would silently
    /// overwrite each other's output file.
    DuplicateSlug(String),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => {
                write!(f, "Post store '{}': {}", path.display(), err)
            }
            Error::Parse { path, err } => {
                write!(f, "Parsing post store '{}': {}", path.display(), err)
            }
            Error::DuplicateSlug(slug) => {
                write!(f, "Duplicate post slug '{}'", slug)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::Parse { path: _, err } => Some(err),
            Error::DuplicateSlug(_) => None,
        }
    }
}
