//! `feeds` plugin: home and per-tag index pages.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use crate::html::slugify;
use crate::plugin::Plugin;
use crate::stage::Stage;
use crate::state::{BuildState, Feed, OutputFile, Post};

use super::templates::render_feed;

pub(super) fn plugin(per_tag: bool) -> Plugin {
    Plugin::new("feeds").on(Stage::Collect, move |ctx| {
        let feeds = build_feeds(&ctx.state.site.title, &ctx.state.posts, per_tag);
        let (feeds, shadowed) = drop_shadowed(feeds, &content_outputs(ctx.state));
        for feed in shadowed {
            ctx.warn(format!(
                "feed '{}' skipped: {} is already written by a content file",
                feed.name,
                feed.path.display()
            ));
        }

        for feed in &feeds {
            let posts: Vec<&Post> = feed.posts.iter().map(|&i| &ctx.state.posts[i]).collect();
            let html = render_feed(&ctx.state.site, &feed.title, &posts);
            ctx.state.files.push(OutputFile::bytes(feed.path.clone(), html));
        }

        tracing::debug!(feeds = feeds.len(), "Feeds collected");
        ctx.state.feeds = feeds;
        Ok(())
    })
}

/// Output paths owned by posts and copied assets.
fn content_outputs(state: &BuildState) -> HashSet<PathBuf> {
    let content_dir = &state.site.content_dir;
    let pages = state.posts.iter().map(Post::output_path);
    let assets = state
        .assets
        .iter()
        .map(|asset| asset.strip_prefix(content_dir).unwrap_or(asset).to_path_buf());
    pages.chain(assets).collect()
}

/// Split off feeds whose output path is already taken.
fn drop_shadowed(feeds: Vec<Feed>, taken: &HashSet<PathBuf>) -> (Vec<Feed>, Vec<Feed>) {
    feeds.into_iter().partition(|feed| !taken.contains(&feed.path))
}

/// Newest first; undated posts last, ties broken by title.
fn newest_first(a: &Post, b: &Post) -> Ordering {
    match (&a.date, &b.date) {
        (Some(x), Some(y)) => y.cmp(x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.title.cmp(&b.title))
}

fn build_feeds(site_title: &str, posts: &[Post], per_tag: bool) -> Vec<Feed> {
    let mut order: Vec<usize> = (0..posts.len()).filter(|&i| !posts[i].draft).collect();
    order.sort_by(|&a, &b| newest_first(&posts[a], &posts[b]));

    // A root page (`index.md`) owns `index.html`; the listing moves aside.
    let home_path = if posts.iter().any(|p| p.slug.is_empty()) {
        PathBuf::from("posts/index.html")
    } else {
        PathBuf::from("index.html")
    };
    let mut feeds = vec![Feed {
        name: "home".to_owned(),
        title: site_title.to_owned(),
        path: home_path,
        posts: order.iter().copied().filter(|&i| !posts[i].slug.is_empty()).collect(),
    }];

    if per_tag {
        // slug -> (display name, posts)
        let mut tags: BTreeMap<String, (String, Vec<usize>)> = BTreeMap::new();
        for &i in &order {
            for tag in &posts[i].tags {
                let slug = slugify(tag);
                if slug.is_empty() {
                    continue;
                }
                let entry = tags.entry(slug).or_insert_with(|| (tag.clone(), Vec::new()));
                if !entry.1.contains(&i) {
                    entry.1.push(i);
                }
            }
        }
        feeds.extend(tags.into_iter().map(|(slug, (tag, indices))| Feed {
            name: format!("tags/{slug}"),
            title: format!("Posts tagged #{tag}"),
            path: PathBuf::from(format!("tags/{slug}/index.html")),
            posts: indices,
        }));
    }
    feeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn post(slug: &str, date: Option<&str>, tags: &[&str]) -> Post {
        Post {
            slug: slug.to_owned(),
            title: slug.to_uppercase(),
            date: date.map(str::to_owned),
            tags: tags.iter().map(|t| (*t).to_owned()).collect(),
            ..Post::default()
        }
    }

    #[test]
    fn test_home_feed_newest_first() {
        let posts = vec![
            post("old", Some("2023-01-01"), &[]),
            post("undated", None, &[]),
            post("new", Some("2024-06-01"), &[]),
        ];
        let feeds = build_feeds("Site", &posts, false);

        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].name, "home");
        assert_eq!(feeds[0].path, PathBuf::from("index.html"));
        assert_eq!(feeds[0].posts, [2, 0, 1]);
    }

    #[test]
    fn test_root_page_moves_home_feed() {
        let posts = vec![post("", None, &[]), post("a", None, &[])];
        let feeds = build_feeds("Site", &posts, false);

        assert_eq!(feeds[0].path, PathBuf::from("posts/index.html"));
        assert_eq!(feeds[0].posts, [1]);
    }

    #[test]
    fn test_tag_feeds() {
        let posts = vec![
            post("a", Some("2024-01-01"), &["Rust", "web"]),
            post("b", Some("2024-02-01"), &["rust"]),
            post("c", None, &["???"]),
        ];
        let feeds = build_feeds("Site", &posts, true);
        let names: Vec<_> = feeds.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, ["home", "tags/rust", "tags/web"]);
        assert_eq!(feeds[1].posts, [1, 0]);
        assert_eq!(feeds[1].path, PathBuf::from("tags/rust/index.html"));
        assert_eq!(feeds[2].posts, [0]);
    }

    #[test]
    fn test_drafts_not_listed() {
        let mut draft = post("d", None, &["x"]);
        draft.draft = true;
        let feeds = build_feeds("Site", &[draft], true);

        assert!(feeds[0].posts.is_empty());
        assert_eq!(feeds.len(), 1);
    }

    #[test]
    fn test_shadowed_feeds_dropped() {
        let posts = vec![
            post("", None, &[]),
            post("posts", None, &["rust"]),
            post("tags/rust", None, &[]),
            post("a", None, &["web"]),
        ];
        let feeds = build_feeds("Site", &posts, true);
        let taken: HashSet<PathBuf> = posts.iter().map(Post::output_path).collect();

        let (kept, shadowed) = drop_shadowed(feeds, &taken);

        let kept: Vec<_> = kept.iter().map(|f| f.name.as_str()).collect();
        let shadowed: Vec<_> = shadowed.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(kept, ["tags/web"]);
        assert_eq!(shadowed, ["home", "tags/rust"]);
    }
}
