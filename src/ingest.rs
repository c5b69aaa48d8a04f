//! Turns keywords into posts: each keyword is searched against the affiliate
//! catalog, the results are mapped into product cards, and one post per
//! keyword is appended to the store. Failures here are isolated per keyword —
//! an upstream error or a thin result set skips that keyword with a warning
//! and the batch continues, reporting a summary at the end of the run.
//!
//! Every ingested post stores its site assignment explicitly, computed
//! round-robin from the store length at creation time. Growing or shrinking
//! the registry later never moves these posts; only legacy records without a
//! stored index are re-derived positionally.

use crate::config::Config;
use crate::coupang::{self, SearchProduct};
use crate::store::{self, Post, Product, UNCATEGORIZED};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

// The catalog is asked for more products than a post embeds so that
// filtering unusable entries still leaves a full card grid.
const SEARCH_LIMIT: usize = 10;

/// One keyword to turn into a post. `category` is optional in the source
/// file; missing values fall back to the uncategorized sentinel.
#[derive(Clone, Debug, Deserialize)]
pub struct Keyword {
    pub keyword: String,

    #[serde(default)]
    pub category: Option<String>,
}

/// Loads `{keyword, category?}` records from a CSV file with a
/// `keyword,category` header.
pub fn load_keywords(path: &Path) -> Result<Vec<Keyword>> {
    let file = std::fs::File::open(path).map_err(|err| Error::Io {
        path: path.to_owned(),
        err,
    })?;
    parse_keywords(file).map_err(|err| Error::Csv {
        path: path.to_owned(),
        err,
    })
}

fn parse_keywords<R: io::Read>(reader: R) -> std::result::Result<Vec<Keyword>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut keywords = Vec::new();
    for result in reader.deserialize() {
        let keyword: Keyword = result?;
        if !keyword.keyword.is_empty() {
            keywords.push(keyword);
        }
    }
    Ok(keywords)
}

/// Picks `n` keywords at random (all of them, in random order, when the pool
/// is smaller than `n`).
pub fn sample(keywords: &[Keyword], n: usize) -> Vec<Keyword> {
    let mut rng = rand::thread_rng();
    keywords
        .choose_multiple(&mut rng, n)
        .cloned()
        .collect()
}

/// Formats a won amount for display: `1234567` becomes `"1,234,567원"`.
/// This is a one-way transform; the numeric price is not stored.
pub fn format_price(won: u64) -> String {
    let digits = won.to_string();
    let mut formatted = String::with_capacity(digits.len() + digits.len() / 3 + 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            formatted.push(',');
        }
        formatted.push(c);
    }
    formatted.push('원');
    formatted
}

fn usable(products: Vec<SearchProduct>) -> Vec<SearchProduct> {
    products
        .into_iter()
        .filter(|product| !product.name.is_empty() && !product.link.is_empty())
        .collect()
}

/// Assembles the post for a keyword from its search results. `site_index` is
/// stored on the post so the assignment survives registry changes.
pub fn compose_post(
    keyword: &str,
    category: Option<&str>,
    products: Vec<SearchProduct>,
    date: &str,
    site_index: usize,
    max_products: usize,
) -> Post {
    let products: Vec<Product> = products
        .into_iter()
        .take(max_products)
        .map(|product| Product {
            name: product.name,
            price: format_price(product.price),
            desc: format!("{} 관련 추천 상품입니다.", keyword),
            tag: keyword.to_owned(),
            image: product.image,
            link: product.link,
        })
        .collect();
    let count = products.len();

    Post {
        slug: store::make_slug(keyword, date),
        date: date.to_owned(),
        title: format!("{} 추천 상품 BEST {}", keyword, count),
        headline: format!("{} 가격 비교", keyword),
        description: format!(
            "{} 관련 인기 상품 {}개를 비교하고 최저가 정보를 확인하세요.",
            keyword, count
        ),
        category: match category {
            Some(category) if !category.trim().is_empty() => category.to_owned(),
            _ => UNCATEGORIZED.to_owned(),
        },
        tags: Vec::new(),
        products,
        site_index: Some(site_index),
    }
}

/// What a batch run did, for the end-of-run summary.
pub struct BatchOutcome {
    pub attempted: usize,
    pub added: usize,
    pub skipped: usize,
}

/// Samples a batch of keywords and appends one post per usable keyword to
/// the store. Upstream failures, thin result sets, and slug collisions skip
/// the keyword with a warning; only store and keyword-file problems abort
/// the run.
pub fn run_batch(
    config: &Config,
    client: &coupang::Client,
    total_sites: usize,
) -> Result<BatchOutcome> {
    let keywords = load_keywords(&config.keywords_path)?;
    if keywords.is_empty() {
        return Err(Error::NoKeywords(config.keywords_path.clone()));
    }

    let existing = store::load(&config.store_path)?;
    let store_len = existing.len();
    let mut slugs: HashSet<String> = existing.into_iter().map(|post| post.slug).collect();
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let selected = sample(&keywords, config.batch_size);
    let attempted = selected.len();
    let mut new_posts: Vec<Post> = Vec::new();
    let mut skipped = 0;

    for entry in &selected {
        let keyword = entry.keyword.as_str();
        let slug = store::make_slug(keyword, &today);
        if slugs.contains(&slug) {
            eprintln!("warning: skipping '{}': post '{}' already exists", keyword, slug);
            skipped += 1;
            continue;
        }

        let found = match client.search_products(keyword, SEARCH_LIMIT) {
            Ok(found) => usable(found),
            Err(e) => {
                eprintln!("warning: skipping '{}': {}", keyword, e);
                skipped += 1;
                continue;
            }
        };
        if found.len() < config.min_products {
            eprintln!(
                "warning: skipping '{}': {} usable products, need at least {}",
                keyword,
                found.len(),
                config.min_products
            );
            skipped += 1;
            continue;
        }

        let site_index = (store_len + new_posts.len()) % total_sites;
        let post = compose_post(
            keyword,
            entry.category.as_deref(),
            found,
            &today,
            site_index,
            config.max_products,
        );
        println!("queued '{}' for site index {}", post.slug, site_index);
        slugs.insert(post.slug.clone());
        new_posts.push(post);
    }

    let added = new_posts.len();
    if added > 0 {
        store::append(&config.store_path, new_posts)?;
    }
    Ok(BatchOutcome {
        attempted,
        added,
        skipped,
    })
}

/// Ingests a single keyword. Returns the new post's slug, or `None` when the
/// keyword was skipped (already posted today, or too few usable products).
/// Unlike [`run_batch`], an upstream failure here fails the run — there is no
/// batch to continue with.
pub fn run_single(
    config: &Config,
    client: &coupang::Client,
    total_sites: usize,
    keyword: &str,
    category: Option<&str>,
) -> Result<Option<String>> {
    let existing = store::load(&config.store_path)?;
    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();

    let slug = store::make_slug(keyword, &today);
    if existing.iter().any(|post| post.slug == slug) {
        eprintln!("warning: post '{}' already exists", slug);
        return Ok(None);
    }

    let found = usable(client.search_products(keyword, SEARCH_LIMIT)?);
    if found.len() < config.min_products {
        eprintln!(
            "warning: '{}' matched {} usable products, need at least {}",
            keyword,
            found.len(),
            config.min_products
        );
        return Ok(None);
    }

    let site_index = existing.len() % total_sites;
    let post = compose_post(
        keyword,
        category,
        found,
        &today,
        site_index,
        config.max_products,
    );
    let slug = post.slug.clone();
    store::append(&config.store_path, vec![post])?;
    Ok(Some(slug))
}

type Result<T> = std::result::Result<T, Error>;

/// Represents an error that aborts an ingestion run (as opposed to the
/// per-keyword failures, which are logged and skipped).
#[derive(Debug)]
pub enum Error {
    /// Returned when the keyword file cannot be read.
    Io { path: PathBuf, err: io::Error },

    /// Returned when the keyword file is not well-formed CSV.
    Csv { path: PathBuf, err: csv::Error },

    /// Returned when the keyword file yields no keywords at all.
    NoKeywords(PathBuf),

    /// Returned for post store failures.
    Store(store::Error),

    /// Returned when the affiliate gateway fails on a single-keyword run.
    Upstream(coupang::Error),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io { path, err } => {
                write!(f, "Keyword file '{}': {}", path.display(), err)
            }
            Error::Csv { path, err } => {
                write!(f, "Parsing keyword file '{}': {}", path.display(), err)
            }
            Error::NoKeywords(path) => {
                write!(f, "Keyword file '{}' contains no keywords", path.display())
            }
            Error::Store(err) => err.fmt(f),
            Error::Upstream(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io { path: _, err } => Some(err),
            Error::Csv { path: _, err } => Some(err),
            Error::NoKeywords(_) => None,
            Error::Store(err) => Some(err),
            Error::Upstream(err) => Some(err),
        }
    }
}

impl From<store::Error> for Error {
    /// Converts [`store::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: store::Error) -> Error {
        Error::Store(err)
    }
}

impl From<coupang::Error> for Error {
    /// Converts [`coupang::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: coupang::Error) -> Error {
        Error::Upstream(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(0), "0원");
        assert_eq!(format_price(999), "999원");
        assert_eq!(format_price(1000), "1,000원");
        assert_eq!(format_price(129000), "129,000원");
        assert_eq!(format_price(1234567), "1,234,567원");
    }

    #[test]
    fn test_parse_keywords() {
        let csv = "keyword,category\n무선 청소기,가전제품\nairpods,\n,가전제품\n  공기청정기  ,가전제품\n";
        let keywords = parse_keywords(csv.as_bytes()).unwrap();
        assert_eq!(keywords.len(), 3);
        assert_eq!(keywords[0].keyword, "무선 청소기");
        assert_eq!(keywords[0].category.as_deref(), Some("가전제품"));
        assert_eq!(keywords[1].keyword, "airpods");
        assert_eq!(keywords[1].category, None);
        // Whitespace is trimmed, blank keywords are dropped.
        assert_eq!(keywords[2].keyword, "공기청정기");
    }

    #[test]
    fn test_sample_bounds() {
        let keywords: Vec<Keyword> = (0..5)
            .map(|i| Keyword {
                keyword: format!("k{}", i),
                category: None,
            })
            .collect();
        assert_eq!(sample(&keywords, 3).len(), 3);
        assert_eq!(sample(&keywords, 10).len(), 5);

        let picked = sample(&keywords, 5);
        let mut names: Vec<&str> = picked.iter().map(|k| k.keyword.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    fn search_product(name: &str, price: u64) -> SearchProduct {
        serde_json::from_str(&format!(
            r#"{{"productName": "{}", "productPrice": {}, "productImage": "https://img.example.com/1.jpg", "productUrl": "https://link.example.com/1"}}"#,
            name, price
        ))
        .unwrap()
    }

    #[test]
    fn test_compose_post() {
        let products = vec![
            search_product("무선 청소기 A", 129000),
            search_product("무선 청소기 B", 89000),
        ];
        let post = compose_post(
            "무선 청소기",
            Some("가전제품"),
            products,
            "2024-01-01",
            4,
            6,
        );
        assert_eq!(post.slug, "무선-청소기-2024-01-01");
        assert_eq!(post.title, "무선 청소기 추천 상품 BEST 2");
        assert_eq!(post.headline, "무선 청소기 가격 비교");
        assert_eq!(post.category, "가전제품");
        assert_eq!(post.site_index, Some(4));
        assert_eq!(post.products.len(), 2);
        assert_eq!(post.products[0].price, "129,000원");
        assert_eq!(post.products[0].tag, "무선 청소기");
    }

    #[test]
    fn test_compose_post_caps_products_and_defaults_category() {
        let products: Vec<SearchProduct> = (0..9)
            .map(|i| search_product(&format!("상품 {}", i), 1000 * (i + 1)))
            .collect();
        let post = compose_post("선풍기", None, products, "2024-01-01", 0, 6);
        assert_eq!(post.products.len(), 6);
        assert_eq!(post.category, UNCATEGORIZED);
        // The title reflects what the post embeds, not what the search found.
        assert_eq!(post.title, "선풍기 추천 상품 BEST 6");
    }

    #[test]
    fn test_usable_filters_incomplete_products() {
        let complete = search_product("상품", 1000);
        let nameless: SearchProduct = serde_json::from_str(
            r#"{"productPrice": 1000, "productUrl": "https://link.example.com/1"}"#,
        )
        .unwrap();
        let linkless: SearchProduct =
            serde_json::from_str(r#"{"productName": "상품", "productPrice": 1000}"#).unwrap();
        let kept = usable(vec![complete, nameless, linkless]);
        assert_eq!(kept.len(), 1);
    }
}
