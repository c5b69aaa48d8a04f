//! Pure document renderers: one post plus one site's metadata becomes a
//! detail page, a site's post subset becomes its index page. Rendering never
//! touches the filesystem and never fails — a post with no products renders
//! an empty product section rather than erroring.
//!
//! Product names, descriptions, and prices come from third-party data, so
//! every interpolated field passes through context-aware escaping before it
//! reaches the document.

use crate::config::Site;
use crate::shard;
use crate::store::{Post, Product, UNCATEGORIZED};
use std::borrow::Cow;
use std::collections::BTreeSet;

/// The pseudo-category that shows every card on the index page.
pub const ALL_CATEGORY: &str = "All";

fn esc(s: &str) -> Cow<str> {
    html_escape::encode_text(s)
}

fn esc_attr(s: &str) -> Cow<str> {
    html_escape::encode_double_quoted_attribute(s)
}

fn display_category(post: &Post) -> &str {
    if post.category.trim().is_empty() {
        UNCATEGORIZED
    } else {
        &post.category
    }
}

/// The distinct categories present in a subset, deterministically ordered,
/// with the [`ALL_CATEGORY`] pseudo-category prepended. Posts without a
/// category count as [`UNCATEGORIZED`].
pub fn categories(posts: &[&Post]) -> Vec<String> {
    let distinct: BTreeSet<&str> = posts.iter().map(|post| display_category(post)).collect();
    let mut categories = Vec::with_capacity(distinct.len() + 1);
    categories.push(ALL_CATEGORY.to_owned());
    categories.extend(distinct.into_iter().map(str::to_owned));
    categories
}

/// Renders a post's detail page as a self-contained HTML document.
pub fn detail_page(post: &Post, site: &Site) -> String {
    let canonical = format!("{}posts/{}.html", site.base_url, post.slug);

    let mut products = String::new();
    for product in &post.products {
        products.push_str(&product_card(product));
    }

    let tags = match post.tags.is_empty() {
        true => String::new(),
        false => format!(
            "      <p class=\"post-tags\">{}</p>\n",
            post.tags
                .iter()
                .map(|tag| format!("<span class=\"tag-item\">#{}</span>", esc(tag)))
                .collect::<Vec<String>>()
                .join(" ")
        ),
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{title} | {label}</title>
  <meta name="description" content="{description}">
  <meta name="naver-site-verification" content="{verification}" />
  <meta property="og:title" content="{title}" />
  <meta property="og:description" content="{description}" />
  <meta property="og:image" content="{thumbnail}" />
  <link rel="stylesheet" href="../styles.css" />
  <link rel="canonical" href="{canonical}" />
</head>
<body data-theme="{theme}">
  <header class="site-header">
    <h1><a href="../index.html">{label}</a></h1>
    <p class="subtitle">{label}에서 제공하는 인기 상품 정보입니다.</p>
  </header>

  <main class="content">
    <section class="post-info">
      <span class="badge">가격 비교</span>
      <h2>{title}</h2>
      <p class="post-desc">{post_description}</p>
{tags}    </section>
    <section class="product-grid">
{products}    </section>
  </main>

  <footer class="site-footer">
    <p>※ 본 페이지의 링크를 통해 구매할 경우 운영자가 제휴 활동의 일환으로 일정 수수료를 제공받을 수 있습니다.</p>
  </footer>
</body>
</html>
"#,
        title = esc(&post.title),
        label = esc(&site.label),
        description = esc_attr(&post.description),
        post_description = esc(&post.description),
        verification = esc_attr(&site.naver_verification),
        thumbnail = esc_attr(post.thumbnail()),
        canonical = esc_attr(&canonical),
        theme = site.theme,
        tags = tags,
        products = products,
    )
}

fn product_card(product: &Product) -> String {
    format!(
        r#"      <article class="product-card">
        <img src="{image}" alt="{name_attr}" loading="lazy" />
        <div class="product-body">
          <h3>{name}</h3>
          <p class="product-desc">{desc}</p>
          <div class="product-meta">
            <span class="price">{price}</span>
            <span class="tag">{tag}</span>
          </div>
          <a class="product-link" href="{link}" target="_blank" rel="nofollow noopener">최저가 확인하기</a>
        </div>
      </article>
"#,
        image = esc_attr(&product.image),
        name_attr = esc_attr(&product.name),
        name = esc(&product.name),
        desc = esc(&product.desc),
        price = esc(&product.price),
        tag = esc(&product.tag),
        link = esc_attr(&product.link),
    )
}

/// Renders a site's index page: filter chips for every category present plus
/// one summary card per post, newest first.
pub fn index_page(posts: &[&Post], site: &Site) -> String {
    let mut sorted: Vec<&Post> = posts.to_vec();
    shard::sort_newest_first(&mut sorted);

    let mut chips = String::new();
    for (i, category) in categories(&sorted).iter().enumerate() {
        chips.push_str(&format!(
            "        <button class=\"category-chip{active}\" data-category=\"{value}\">{name}</button>\n",
            active = match i {
                0 => " active",
                _ => "",
            },
            value = esc_attr(category),
            name = esc(category),
        ));
    }

    let mut cards = String::new();
    for post in &sorted {
        cards.push_str(&post_card(post));
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="ko">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>{label}</title>
  <meta name="description" content="{label}에서 제공하는 인기 상품과 가격 비교 정보를 확인하세요.">
  <meta name="naver-site-verification" content="{verification}" />
  <link rel="stylesheet" href="styles.css" />
  <link rel="canonical" href="{canonical}" />
</head>
<body data-theme="{theme}">
  <header class="site-header">
    <h1>{label}</h1>
    <p class="subtitle">{label}에서 제공하는 인기 상품 정보입니다.</p>
  </header>

  <main class="content">
    <section class="post-grid-section">
      <div class="category-bar">
{chips}      </div>
      <div class="post-grid">
{cards}      </div>
    </section>
  </main>

  <footer class="site-footer">
    <p>※ 본 페이지의 링크를 통해 구매할 경우 운영자가 제휴 활동의 일환으로 일정 수수료를 제공받을 수 있습니다.</p>
  </footer>
{script}</body>
</html>
"#,
        label = esc(&site.label),
        verification = esc_attr(&site.naver_verification),
        canonical = esc_attr(site.base_url.as_str()),
        theme = site.theme,
        chips = chips,
        cards = cards,
        script = FILTER_SCRIPT,
    )
}

fn post_card(post: &Post) -> String {
    format!(
        r#"        <article class="post-card" data-category="{category}">
          <img src="{thumbnail}" alt="{title_attr}" loading="lazy" />
          <div class="post-card-body">
            <h2 class="post-card-title">{title}</h2>
            <p class="post-card-date">{date}</p>
            <a class="post-card-link" href="posts/{slug}.html">최저가 보러가기</a>
          </div>
        </article>
"#,
        category = esc_attr(display_category(post)),
        thumbnail = esc_attr(post.thumbnail()),
        title_attr = esc_attr(&post.title),
        title = esc(&post.title),
        date = esc(&post.date),
        slug = esc_attr(&post.slug),
    )
}

// Client-side visibility toggle: exactly one chip active at a time, "All"
// active by default, selecting a chip shows exactly the cards whose category
// matches.
const FILTER_SCRIPT: &str = r#"  <script>
    (function () {
      var chips = Array.prototype.slice.call(document.querySelectorAll(".category-chip"));
      var cards = Array.prototype.slice.call(document.querySelectorAll(".post-card"));

      chips.forEach(function (chip) {
        chip.addEventListener("click", function () {
          var selected = chip.getAttribute("data-category");
          chips.forEach(function (other) {
            other.classList.remove("active");
          });
          chip.classList.add("active");

          cards.forEach(function (card) {
            var category = card.getAttribute("data-category");
            card.style.display =
              selected === "All" || category === selected ? "" : "none";
          });
        });
      });
    })();
  </script>
"#;

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Registry;
    use crate::store::PLACEHOLDER_IMAGE;

    fn site() -> Site {
        let registry = Registry::from_str(
            r#"
shop.moashop.co.kr:
  id: shop
  index: 0
  label: "데일리 쇼핑 가이드"
  theme: purple
  naverVerification: "0f3c9a17be2d48c1a6e5074d2b91c8aa30f7d612"
"#,
        )
        .unwrap();
        registry.sites()[0].clone()
    }

    fn post(slug: &str, date: &str, category: &str, products: Vec<Product>) -> Post {
        Post {
            slug: slug.to_owned(),
            date: date.to_owned(),
            title: format!("{} 추천", slug),
            headline: String::new(),
            description: "설명".to_owned(),
            category: category.to_owned(),
            tags: Vec::new(),
            products,
            site_index: None,
        }
    }

    fn product(name: &str) -> Product {
        Product {
            name: name.to_owned(),
            price: "12,345원".to_owned(),
            desc: "추천 상품".to_owned(),
            tag: "추천".to_owned(),
            image: "https://img.example.com/1.jpg".to_owned(),
            link: "https://link.example.com/1".to_owned(),
        }
    }

    #[test]
    fn test_detail_page_escapes_third_party_fields() {
        let hostile = Product {
            name: "<script>alert(1)</script>".to_owned(),
            price: "1 > 2 & 3".to_owned(),
            desc: "\"quoted\" <b>bold</b>".to_owned(),
            tag: "t&g".to_owned(),
            image: "https://img.example.com/x.jpg\" onerror=\"alert(1)".to_owned(),
            link: "https://link.example.com/1".to_owned(),
        };
        let p = post("a-2024-01-01", "2024-01-01", "전자", vec![hostile]);
        let html = detail_page(&p, &site());

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
        assert!(html.contains("1 &gt; 2 &amp; 3"));
        // The attribute context escapes the double quote that would otherwise
        // break out of src="...".
        assert!(!html.contains(r#".jpg" onerror"#));
    }

    #[test]
    fn test_detail_page_total_over_zero_products() {
        let p = post("empty-2024-01-01", "2024-01-01", "전자", Vec::new());
        let html = detail_page(&p, &site());
        assert!(!html.contains("product-card"));
        assert!(html.contains("product-grid"));
        assert!(html.contains("site-footer"));
    }

    #[test]
    fn test_detail_page_structure() {
        let p = post("a-2024-01-01", "2024-01-01", "전자", vec![product("상품")]);
        let html = detail_page(&p, &site());
        assert!(html.contains(
            r#"<link rel="canonical" href="https://shop.moashop.co.kr/posts/a-2024-01-01.html" />"#
        ));
        assert!(html.contains(r#"rel="nofollow noopener""#));
        assert!(html.contains(r#"data-theme="purple""#));
        assert!(html.contains("naver-site-verification"));
        assert!(html.contains("수수료"));
        assert!(html.contains(r#"<span class="price">12,345원</span>"#));
    }

    #[test]
    fn test_detail_page_tag_chips() {
        let mut p = post("a-2024-01-01", "2024-01-01", "전자", Vec::new());
        p.tags = vec!["청소기".to_owned(), "가전".to_owned()];
        let html = detail_page(&p, &site());
        assert!(html.contains(r#"<span class="tag-item">#청소기</span>"#));
        assert!(html.contains(r#"<span class="tag-item">#가전</span>"#));
    }

    #[test]
    fn test_categories_scenario() {
        // Two posts, one "electronics" and one uncategorized: chips are
        // exactly All / electronics / uncategorized, in that order.
        let a = post("a", "2024-01-01", "electronics", Vec::new());
        let b = post("b", "2024-01-02", "", Vec::new());
        let refs: Vec<&Post> = vec![&a, &b];
        assert_eq!(
            categories(&refs),
            vec!["All", "electronics", UNCATEGORIZED]
        );
    }

    #[test]
    fn test_categories_deduplicated() {
        let a = post("a", "2024-01-01", "가전", Vec::new());
        let b = post("b", "2024-01-02", "가전", Vec::new());
        let c = post("c", "2024-01-03", "식품", Vec::new());
        let refs: Vec<&Post> = vec![&a, &b, &c];
        assert_eq!(categories(&refs), vec!["All", "가전", "식품"]);
    }

    #[test]
    fn test_index_page_orders_posts_newest_first() {
        let a = post("old", "2024-01-01", "가전", Vec::new());
        let b = post("new", "2024-06-01", "가전", Vec::new());
        let c = post("mid", "2024-03-01", "가전", Vec::new());
        let refs: Vec<&Post> = vec![&a, &b, &c];
        let html = index_page(&refs, &site());

        let new_at = html.find("posts/new.html").unwrap();
        let mid_at = html.find("posts/mid.html").unwrap();
        let old_at = html.find("posts/old.html").unwrap();
        assert!(new_at < mid_at && mid_at < old_at);
    }

    #[test]
    fn test_index_page_cards_and_chips() {
        let with_products = post("a", "2024-01-02", "가전", vec![product("상품")]);
        let without = post("b", "2024-01-01", "", Vec::new());
        let refs: Vec<&Post> = vec![&with_products, &without];
        let html = index_page(&refs, &site());

        // First chip is the active "All" chip.
        assert!(html.contains(
            r#"<button class="category-chip active" data-category="All">All</button>"#
        ));
        assert!(html.contains(r#"data-category="가전""#));
        // The uncategorized post's card carries the sentinel, and its
        // thumbnail falls back to the placeholder.
        assert!(html.contains(&format!(r#"data-category="{}""#, UNCATEGORIZED)));
        assert!(html.contains(PLACEHOLDER_IMAGE));
        assert!(html.contains(r#"src="https://img.example.com/1.jpg""#));
    }

    #[test]
    fn test_filter_script_matches_all_sentinel() {
        assert!(FILTER_SCRIPT.contains(&format!("\"{}\"", ALL_CATEGORY)));
    }
}
