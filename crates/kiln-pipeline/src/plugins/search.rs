//! `search_index` plugin: JSON index consumed by client-side search and
//! the dev server's `/_search` fallback.

use crate::plugin::Plugin;
use crate::stage::Stage;
use crate::state::{OutputFile, SearchEntry};

pub(super) fn plugin(filename: String) -> Plugin {
    Plugin::new("search_index").on(Stage::Collect, move |ctx| {
        let entries: Vec<SearchEntry> = ctx
            .state
            .posts
            .iter()
            .filter(|post| !post.draft)
            .map(|post| SearchEntry {
                slug: post.slug.clone(),
                title: post.title.clone(),
                description: post.description.clone(),
                url: post.url(),
            })
            .collect();

        let json = serde_json::to_vec(&entries)?;
        tracing::debug!(entries = entries.len(), file = %filename, "Search index collected");
        ctx.state.files.push(OutputFile::bytes(filename.as_str(), json));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::testutil::Fixture;
    use crate::state::{OutputContents, Post};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_index_entries() {
        let fx = Fixture::new();
        let seed = crate::Plugin::new("seed").on(Stage::Load, |ctx| {
            ctx.state.posts = vec![
                Post {
                    slug: "go-testing-guide".to_owned(),
                    title: "Go Testing Guide".to_owned(),
                    description: "Table tests".to_owned(),
                    ..Post::default()
                },
                Post {
                    slug: "secret".to_owned(),
                    draft: true,
                    ..Post::default()
                },
            ];
            Ok(())
        });
        let mut m = fx.manager(vec![seed, plugin("search-index.json".to_owned())]);
        m.run_to(Stage::Collect).unwrap();

        let file = &m.files()[0];
        assert_eq!(file.path, std::path::PathBuf::from("search-index.json"));
        let OutputContents::Bytes(bytes) = &file.contents else {
            panic!("expected generated bytes");
        };
        let entries: Vec<SearchEntry> = serde_json::from_slice(bytes).unwrap();
        assert_eq!(
            entries,
            [SearchEntry {
                slug: "go-testing-guide".to_owned(),
                title: "Go Testing Guide".to_owned(),
                description: "Table tests".to_owned(),
                url: "/go-testing-guide/".to_owned(),
            }]
        );
    }
}
