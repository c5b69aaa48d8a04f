//! Deterministic assignment of posts to sites. Given the registry size `N`,
//! every post belongs to exactly one site: an explicit `siteIndex` stored at
//! ingestion time wins; otherwise the post's ordinal position in the store,
//! modulo `N`, decides. Re-deriving the partition from an unchanged store and
//! registry is idempotent, so no assignment table exists to drift out of
//! sync.
//!
//! The ordinal position is the post's position in the *stored* sequence; it
//! is never recomputed after sorting, which is why selection happens before
//! any display ordering.

use crate::store::Post;

/// The site index a post resolves to. `position` is the post's 0-based
/// ordinal position within the full stored sequence.
pub fn assigned_index(post: &Post, position: usize, total_sites: usize) -> usize {
    match post.site_index {
        Some(index) => index,
        None => position % total_sites,
    }
}

/// Selects the ordered subset of `posts` belonging to the site with ordinal
/// `site_index`, preserving store order.
pub fn site_posts<'a>(posts: &'a [Post], site_index: usize, total_sites: usize) -> Vec<&'a Post> {
    posts
        .iter()
        .enumerate()
        .filter(|(position, post)| assigned_index(post, *position, total_sites) == site_index)
        .map(|(_, post)| post)
        .collect()
}

/// Orders a site's subset for display: date descending, ties keeping their
/// original relative order. `sort_by` is stable, which the tie-break relies
/// on.
pub fn sort_newest_first(posts: &mut [&Post]) {
    posts.sort_by(|a, b| b.date.cmp(&a.date));
}
