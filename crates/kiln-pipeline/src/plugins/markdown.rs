//! `markdown` plugin: renders post bodies to HTML.

use pulldown_cmark::{Options, Parser, html};
use sha2::{Digest, Sha256};

use crate::plugin::Plugin;
use crate::stage::Stage;

pub(super) fn plugin() -> Plugin {
    Plugin::new("markdown").on(Stage::Transform, |ctx| {
        let cache = ctx.cache();
        let rendered = ctx.try_map(&ctx.state.posts, |post| {
            let key = body_key(&post.body);
            if let Some(html) = cache.get_as::<String>(&key) {
                return Ok((html, true));
            }
            let html = render(&post.body);
            cache.set(&key, html.clone().into());
            Ok((html, false))
        })?;

        let mut hits = 0;
        for (post, (html, hit)) in ctx.state.posts.iter_mut().zip(rendered) {
            post.html = html;
            hits += usize::from(hit);
        }
        tracing::debug!(posts = ctx.state.posts.len(), cache_hits = hits, "Markdown rendered");
        Ok(())
    })
}

fn body_key(body: &str) -> String {
    hex::encode(Sha256::digest(body.as_bytes()))
}

/// Render markdown with tables, footnotes and strikethrough enabled.
pub(crate) fn render(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testutil::Fixture;
    use crate::state::Post;
    use crate::{Manager, Plugin};

    fn seed(posts: Vec<Post>) -> Plugin {
        Plugin::new("seed").on(Stage::Load, move |ctx| {
            ctx.state.posts.clone_from(&posts);
            Ok(())
        })
    }

    fn post(body: &str) -> Post {
        Post {
            body: body.to_owned(),
            ..Post::default()
        }
    }

    fn transform(fx: &Fixture, posts: Vec<Post>) -> Manager {
        let mut m = fx.manager(vec![seed(posts), plugin()]);
        m.run_to(Stage::Transform).unwrap();
        m
    }

    #[test]
    fn test_render_extensions() {
        let html = render("| a | b |\n|---|---|\n| 1 | 2 |\n\n~~old~~ text[^1]\n\n[^1]: note\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<del>old</del>"));
        assert!(html.contains("footnote"));
    }

    #[test]
    fn test_posts_rendered_in_order() {
        let fx = Fixture::new();
        let m = transform(&fx, vec![post("# One"), post("*two*")]);

        assert_eq!(m.posts()[0].html, "<h1>One</h1>\n");
        assert_eq!(m.posts()[1].html, "<p><em>two</em></p>\n");
    }

    #[test]
    fn test_rendered_html_memoised_by_body_hash() {
        let fx = Fixture::new();
        let m = transform(&fx, vec![post("same"), post("other")]);

        let key = format!("markdown:{}", body_key("same"));
        assert_eq!(m.cache().get_as::<String>(&key).as_deref(), Some("<p>same</p>\n"));
    }

    #[test]
    fn test_cached_html_reused() {
        let fx = Fixture::new();
        let mut m = fx.manager(vec![seed(vec![post("cached")]), plugin()]);
        m.cache().set(
            format!("markdown:{}", body_key("cached")),
            "<p>from cache</p>".into(),
        );
        m.run_to(Stage::Transform).unwrap();

        assert_eq!(m.posts()[0].html, "<p>from cache</p>");
    }
}
