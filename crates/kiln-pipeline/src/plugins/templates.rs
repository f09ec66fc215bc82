//! `templates` plugin and the built-in page layout.
//!
//! Every generated page shares one layout: a header with the site title and
//! a search form, the page body, and a footer carrying the content license.

use std::fmt::Write;

use crate::html::escape_html;
use crate::plugin::Plugin;
use crate::stage::Stage;
use crate::state::{Post, SiteSettings};

const STYLE: &str = "body{font-family:system-ui,sans-serif;max-width:46rem;margin:0 auto;\
padding:1rem;line-height:1.6;color:#1f2937}\
header,footer{display:flex;justify-content:space-between;align-items:center;gap:1rem}\
header{border-bottom:1px solid #e5e7eb;margin-bottom:1.5rem}\
footer{border-top:1px solid #e5e7eb;margin-top:2rem;font-size:.875rem;color:#6b7280}\
a{color:#2563eb}ul.tags{list-style:none;padding:0;display:flex;gap:.5rem}\
ul.posts{padding-left:1rem}time{color:#6b7280;font-size:.875rem}";

pub(super) fn plugin() -> Plugin {
    Plugin::new("templates").on(Stage::Render, |ctx| {
        let site = &ctx.state.site;
        let pages = ctx.try_map(&ctx.state.posts, |post| Ok(render_post(site, post)))?;
        for (post, page) in ctx.state.posts.iter_mut().zip(pages) {
            post.page = page;
        }
        Ok(())
    })
}

/// Absolute link to `path` (a root-relative URL) under the site base URL.
pub(crate) fn link(site: &SiteSettings, path: &str) -> String {
    format!("{}{path}", site.base_url)
}

/// Full page for a single post.
pub(crate) fn render_post(site: &SiteSettings, post: &Post) -> String {
    let mut body = String::with_capacity(post.html.len() + 512);
    body.push_str("<article>\n");
    let _ = writeln!(body, "<h1>{}</h1>", escape_html(&post.title));
    if let Some(date) = &post.date {
        let _ = writeln!(body, "<time datetime=\"{0}\">{0}</time>", escape_html(date));
    }
    body.push_str(&post.html);
    if !post.tags.is_empty() {
        body.push_str("<ul class=\"tags\">\n");
        for tag in &post.tags {
            let _ = writeln!(
                body,
                "<li><a href=\"{}\">#{}</a></li>",
                escape_html(&link(site, &tag_url(tag))),
                escape_html(tag)
            );
        }
        body.push_str("</ul>\n");
    }
    body.push_str("</article>\n");

    let description = if post.description.is_empty() {
        &site.description
    } else {
        &post.description
    };
    page(site, &post.title, description, &body)
}

/// Index page listing `posts` (already ordered).
pub(crate) fn render_feed(site: &SiteSettings, title: &str, posts: &[&Post]) -> String {
    let mut body = String::with_capacity(256 + posts.len() * 128);
    let _ = writeln!(body, "<h1>{}</h1>", escape_html(title));
    if posts.is_empty() {
        body.push_str("<p>Nothing published yet.</p>\n");
    } else {
        body.push_str("<ul class=\"posts\">\n");
        for post in posts {
            body.push_str("<li>");
            let _ = write!(
                body,
                "<a href=\"{}\">{}</a>",
                escape_html(&link(site, &post.url())),
                escape_html(&post.title)
            );
            if let Some(date) = &post.date {
                let _ = write!(body, " <time datetime=\"{0}\">{0}</time>", escape_html(date));
            }
            if !post.description.is_empty() {
                let _ = write!(body, "<br>{}", escape_html(&post.description));
            }
            body.push_str("</li>\n");
        }
        body.push_str("</ul>\n");
    }
    page(site, title, &site.description, &body)
}

/// Built-in `404.html`.
pub(crate) fn render_not_found(site: &SiteSettings) -> String {
    let body = format!(
        "<h1>Page not found</h1>\n<p>The page you requested does not exist. \
         <a href=\"{}\">Back to the home page</a>.</p>\n",
        escape_html(&link(site, "/"))
    );
    page(site, "Page not found", &site.description, &body)
}

/// Root-relative URL of a tag feed.
pub(crate) fn tag_url(tag: &str) -> String {
    format!("/tags/{}/", crate::html::slugify(tag))
}

fn page(site: &SiteSettings, title: &str, description: &str, body: &str) -> String {
    let mut html = String::with_capacity(body.len() + 2048);

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    if title == site.title {
        let _ = writeln!(html, "<title>{}</title>", escape_html(title));
    } else {
        let _ = writeln!(
            html,
            "<title>{} | {}</title>",
            escape_html(title),
            escape_html(&site.title)
        );
    }
    if !description.is_empty() {
        let _ = writeln!(
            html,
            "<meta name=\"description\" content=\"{}\">",
            escape_html(description)
        );
    }
    let _ = writeln!(html, "<style>{STYLE}</style>");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    let _ = writeln!(
        html,
        "<a href=\"{}\"><strong>{}</strong></a>",
        escape_html(&link(site, "/")),
        escape_html(&site.title)
    );
    html.push_str(
        "<form method=\"post\" action=\"/_search\" role=\"search\">\
         <input type=\"search\" name=\"q\" placeholder=\"Search\" aria-label=\"Search\">\
         </form>\n",
    );
    html.push_str("</header>\n");

    html.push_str("<main>\n");
    html.push_str(body);
    html.push_str("</main>\n");

    // Footer
    html.push_str("<footer>\n");
    let _ = writeln!(html, "<span>{}</span>", escape_html(&site.title));
    if let Some(license) = &site.license {
        let _ = writeln!(html, "<span>Content licensed under {}</span>", escape_html(license));
    }
    html.push_str("</footer>\n");

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteSettings {
        SiteSettings {
            title: "Notes".to_owned(),
            base_url: "https://notes.dev".to_owned(),
            license: Some("CC-BY-4.0".to_owned()),
            ..SiteSettings::default()
        }
    }

    #[test]
    fn test_post_page() {
        let post = Post {
            slug: "hello".to_owned(),
            title: "Hello <World>".to_owned(),
            date: Some("2024-05-01".to_owned()),
            tags: vec!["Rust Lang".to_owned()],
            html: "<p>body</p>\n".to_owned(),
            ..Post::default()
        };
        let html = render_post(&site(), &post);

        assert!(html.contains("<title>Hello &lt;World&gt; | Notes</title>"));
        assert!(html.contains("<h1>Hello &lt;World&gt;</h1>"));
        assert!(html.contains("<p>body</p>"));
        assert!(html.contains("<time datetime=\"2024-05-01\">"));
        assert!(html.contains("href=\"https://notes.dev/tags/rust-lang/\""));
        assert!(html.contains("Content licensed under CC-BY-4.0"));
        assert!(html.trim_end().ends_with("</html>"));
    }

    #[test]
    fn test_no_license_no_footer_line() {
        let mut site = site();
        site.license = None;
        let html = render_not_found(&site);
        assert!(!html.contains("licensed under"));
        assert!(html.contains("Page not found"));
    }

    #[test]
    fn test_feed_lists_posts_in_given_order() {
        let a = Post {
            slug: "a".to_owned(),
            title: "A".to_owned(),
            ..Post::default()
        };
        let b = Post {
            slug: "b".to_owned(),
            title: "B".to_owned(),
            description: "about b".to_owned(),
            ..Post::default()
        };
        let html = render_feed(&site(), "Notes", &[&b, &a]);

        let pos_a = html.find("https://notes.dev/a/").unwrap();
        let pos_b = html.find("https://notes.dev/b/").unwrap();
        assert!(pos_b < pos_a);
        assert!(html.contains("<br>about b"));
        assert!(html.contains("<title>Notes</title>"));
    }

    #[test]
    fn test_empty_feed() {
        let html = render_feed(&site(), "Notes", &[]);
        assert!(html.contains("Nothing published yet."));
    }
}
