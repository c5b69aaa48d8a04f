//! SEO artifacts derived from a site's post subset: the sitemap document and
//! the robots directive. Both are pure functions of the site's base URL and
//! (for the sitemap) the subset plus the build date, so the orchestrator can
//! emit them alongside the rendered pages without extra state.

use crate::store::Post;
use url::Url;

/// Builds the `urlset` sitemap for one site: the site root at priority 1.0
/// with a daily change frequency, then one entry per post at priority 0.8
/// with a weekly change frequency and the post's date as `lastmod`. `today`
/// is the build date (`YYYY-MM-DD`), used as the root's `lastmod`.
pub fn sitemap(base_url: &Url, posts: &[&Post], today: &str) -> String {
    let mut urls = format!(
        "  <url><loc>{base}</loc><lastmod>{today}</lastmod><changefreq>daily</changefreq><priority>1.0</priority></url>",
        base = base_url,
        today = today,
    );

    for post in posts {
        urls.push_str(&format!(
            "\n  <url><loc>{base}posts/{slug}.html</loc><lastmod>{lastmod}</lastmod><changefreq>weekly</changefreq><priority>0.8</priority></url>",
            base = base_url,
            slug = post.slug,
            lastmod = post.date,
        ));
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}\n</urlset>\n",
        urls
    )
}

/// Builds the allow-all robots directive pointing at the site's sitemap.
pub fn robots(base_url: &Url) -> String {
    format!(
        "User-agent: *\nAllow: /\n\nSitemap: {}sitemap.xml\n",
        base_url
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::store::UNCATEGORIZED;

    fn base() -> Url {
        Url::parse("https://shop.moashop.co.kr/").unwrap()
    }

    fn post(slug: &str, date: &str) -> Post {
        Post {
            slug: slug.to_owned(),
            date: date.to_owned(),
            title: String::new(),
            headline: String::new(),
            description: String::new(),
            category: UNCATEGORIZED.to_owned(),
            tags: Vec::new(),
            products: Vec::new(),
            site_index: None,
        }
    }

    #[test]
    fn test_sitemap_entries_round_trip() {
        let a = post("a-2024-01-01", "2024-01-01");
        let b = post("b-2024-01-02", "2024-01-02");
        let refs: Vec<&Post> = vec![&a, &b];
        let xml = sitemap(&base(), &refs, "2024-02-01");

        // Exactly one entry per post, with exact loc and lastmod.
        for (slug, date) in [("a-2024-01-01", "2024-01-01"), ("b-2024-01-02", "2024-01-02")].iter()
        {
            let entry = format!(
                "<url><loc>https://shop.moashop.co.kr/posts/{}.html</loc><lastmod>{}</lastmod><changefreq>weekly</changefreq><priority>0.8</priority></url>",
                slug, date
            );
            assert_eq!(xml.matches(&entry).count(), 1);
        }
        assert_eq!(xml.matches("<url>").count(), 3);
    }

    #[test]
    fn test_sitemap_root_entry() {
        let xml = sitemap(&base(), &[], "2024-02-01");
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">"));
        assert!(xml.contains(
            "<url><loc>https://shop.moashop.co.kr/</loc><lastmod>2024-02-01</lastmod><changefreq>daily</changefreq><priority>1.0</priority></url>"
        ));
        assert!(xml.trim_end().ends_with("</urlset>"));
    }

    #[test]
    fn test_robots() {
        assert_eq!(
            robots(&base()),
            "User-agent: *\nAllow: /\n\nSitemap: https://shop.moashop.co.kr/sitemap.xml\n"
        );
    }
}
