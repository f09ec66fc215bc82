//! Search over the prebuilt JSON index.
//!
//! Each lowercase query word adds to a record's score when it occurs in the
//! title (10), slug (8) or description (5). Records without a match are
//! dropped; the rest are ranked by score, ties keeping index order.

use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use axum::Form;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Redirect, Response};
use kiln_pipeline::{SearchEntry, escape_html};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;

use crate::error::ServerError;
use crate::static_files::inject_script;
use crate::state::AppState;

const TITLE_WEIGHT: u32 = 10;
const SLUG_WEIGHT: u32 = 8;
const DESCRIPTION_WEIGHT: u32 = 5;

/// Results shown per query.
pub(crate) const MAX_RESULTS: usize = 20;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchForm {
    #[serde(default)]
    q: String,
}

/// Handle `POST /_search`.
pub(crate) async fn search(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SearchForm>,
) -> Response {
    let entries = match load_index(&state.search_index).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(error = %e, "Search index unavailable, redirecting");
            let location = format!("/?q={}", utf8_percent_encode(&form.q, NON_ALPHANUMERIC));
            return Redirect::to(&location).into_response();
        }
    };

    let results = rank(&entries, &form.q);
    tracing::debug!(query = %form.q, results = results.len(), "Search");
    (
        [(header::CACHE_CONTROL, "no-cache")],
        axum::response::Html(inject_script(&render_results(&form.q, &results))),
    )
        .into_response()
}

async fn load_index(path: &Path) -> Result<Vec<SearchEntry>, ServerError> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| ServerError::SearchIndex {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Score one record against lowercase query words.
fn score(entry: &SearchEntry, words: &[String]) -> u32 {
    let title = entry.title.to_lowercase();
    let slug = entry.slug.to_lowercase();
    let description = entry.description.to_lowercase();

    words
        .iter()
        .map(|word| {
            let mut score = 0;
            if title.contains(word.as_str()) {
                score += TITLE_WEIGHT;
            }
            if slug.contains(word.as_str()) {
                score += SLUG_WEIGHT;
            }
            if description.contains(word.as_str()) {
                score += DESCRIPTION_WEIGHT;
            }
            score
        })
        .sum()
}

/// Matching records, best first, at most [`MAX_RESULTS`].
pub(crate) fn rank<'a>(entries: &'a [SearchEntry], query: &str) -> Vec<(&'a SearchEntry, u32)> {
    let words: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    let mut ranked: Vec<_> = entries
        .iter()
        .map(|entry| (entry, score(entry, &words)))
        .filter(|(_, score)| *score > 0)
        .collect();
    // Stable: equal scores keep index order.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(MAX_RESULTS);
    ranked
}

fn render_results(query: &str, results: &[(&SearchEntry, u32)]) -> String {
    let query = escape_html(query);
    let mut html = String::new();
    let _ = writeln!(html, "<!DOCTYPE html>");
    let _ = writeln!(html, "<html lang=\"en\">");
    let _ = writeln!(html, "<head>");
    let _ = writeln!(html, "<meta charset=\"utf-8\">");
    let _ = writeln!(html, "<title>Search: {query}</title>");
    let _ = writeln!(html, "</head>");
    let _ = writeln!(html, "<body>");
    let _ = writeln!(html, "<h1>Results for &ldquo;{query}&rdquo;</h1>");
    if results.is_empty() {
        let _ = writeln!(html, "<p>No matches.</p>");
    } else {
        let _ = writeln!(html, "<ol class=\"search-results\">");
        for (entry, _) in results {
            let _ = write!(
                html,
                "<li><a href=\"{}\">{}</a>",
                escape_html(&entry.url),
                escape_html(&entry.title)
            );
            if !entry.description.is_empty() {
                let _ = write!(html, "<p>{}</p>", escape_html(&entry.description));
            }
            let _ = writeln!(html, "</li>");
        }
        let _ = writeln!(html, "</ol>");
    }
    let _ = writeln!(html, "<p><a href=\"/\">Back to the site</a></p>");
    let _ = writeln!(html, "</body>");
    let _ = writeln!(html, "</html>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(title: &str, slug: &str, description: &str) -> SearchEntry {
        SearchEntry {
            slug: slug.to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
            url: format!("/{slug}/"),
        }
    }

    #[test]
    fn test_title_and_slug_hits_outrank_description() {
        let entries = vec![
            entry("Cooking", "cooking", "go testing is not covered here"),
            entry("Go Testing Guide", "go-testing-guide", "How to write tests"),
        ];

        let ranked = rank(&entries, "go testing");

        let scores: Vec<_> = ranked.iter().map(|(e, s)| (e.slug.as_str(), *s)).collect();
        assert_eq!(scores, vec![("go-testing-guide", 36), ("cooking", 10)]);
    }

    #[test]
    fn test_case_insensitive() {
        let entries = vec![entry("Rust Tips", "rust-tips", "")];
        assert_eq!(rank(&entries, "RUST")[0].1, 18);
    }

    #[test]
    fn test_non_matching_dropped() {
        let entries = vec![entry("Rust", "rust", ""), entry("Go", "go", "")];
        let ranked = rank(&entries, "rust");
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.slug, "rust");
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let entries = vec![entry("Rust", "rust", "")];
        assert!(rank(&entries, "   ").is_empty());
    }

    #[test]
    fn test_ties_keep_index_order_and_truncate() {
        let entries: Vec<_> = (0..30)
            .map(|i| entry(&format!("Note {i}"), &format!("note-{i}"), ""))
            .collect();

        let ranked = rank(&entries, "note");

        assert_eq!(ranked.len(), MAX_RESULTS);
        let slugs: Vec<_> = ranked.iter().take(3).map(|(e, _)| e.slug.as_str()).collect();
        assert_eq!(slugs, vec!["note-0", "note-1", "note-2"]);
    }

    #[test]
    fn test_results_escaped() {
        let entries = vec![entry("<b>Bold</b>", "bold", "")];
        let html = render_results("<b>", &rank(&entries, "bold"));
        assert!(html.contains("Results for &ldquo;&lt;b&gt;&rdquo;"));
        assert!(html.contains("&lt;b&gt;Bold&lt;/b&gt;"));
    }
}
