//! Text rendering for conversation context and search listings.

use crate::model::SearchHit;

/// Header line of a context block.
pub const CONTEXT_HEADER: &str = "## Relevant Memories:";
/// Characters of each memory shown by [`format_search_results`].
pub const SEARCH_EXCERPT_CHARS: usize = 150;

/// Retrieval query for a conversation turn: the input followed by the last
/// `window` turns, most recent first.
pub fn conversation_query(input: &str, recent_turns: &[String], window: usize) -> String {
    let start = recent_turns.len().saturating_sub(window);
    let mut parts = vec![input];
    parts.extend(
        recent_turns[start..]
            .iter()
            .rev()
            .map(String::as_str)
            .filter(|turn| !turn.trim().is_empty()),
    );
    parts.join(" ")
}

/// Render hits as a context block, or an empty string when there are none.
pub fn format_context(hits: &[SearchHit], excerpt_chars: usize) -> String {
    if hits.is_empty() {
        return String::new();
    }
    let mut lines = vec![CONTEXT_HEADER.to_string()];
    lines.extend(hits.iter().map(|hit| {
        format!(
            "- [{}] {} (relevance: {:.2})",
            hit.area,
            excerpt(&hit.text, excerpt_chars),
            hit.score
        )
    }));
    lines.join("\n")
}

/// Render hits as a numbered listing for display.
pub fn format_search_results(query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!("No memories found for: {query}");
    }
    let mut lines = vec![format!("Memory search results for '{query}':")];
    lines.extend(hits.iter().enumerate().map(|(position, hit)| {
        format!(
            "{}. [{}] {} (score: {:.2})",
            position + 1,
            hit.area,
            excerpt(&hit.text, SEARCH_EXCERPT_CHARS),
            hit.score
        )
    }));
    lines.join("\n")
}

/// First `max_chars` characters of `text`, with `...` only when something was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{truncated}...")
    } else {
        truncated
    }
}

/// Truncate a string to a maximum character count.
fn truncate_chars(value: &str, max_chars: usize) -> String {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => value[..byte_index].to_string(),
        None => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{conversation_query, excerpt, format_context, format_search_results};
    use crate::model::{MemoryArea, SearchHit};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use uuid::Uuid;

    fn hit(text: &str, area: MemoryArea, score: f32) -> SearchHit {
        SearchHit {
            id: Uuid::new_v4(),
            text: text.to_string(),
            area,
            metadata: json!({}),
            created_at: Utc::now(),
            score,
            rank: 1,
        }
    }

    #[test]
    fn excerpt_marks_only_real_truncation() {
        assert_eq!(excerpt("hello", 0), "...");
        assert_eq!(excerpt("hello", 3), "hel...");
        assert_eq!(excerpt("hello", 5), "hello");
        assert_eq!(excerpt("héllo wörld", 4), "héll...");
    }

    #[test]
    fn query_folds_recent_turns_newest_first() {
        let turns = vec![
            "first".to_string(),
            "second".to_string(),
            "third".to_string(),
            "fourth".to_string(),
        ];
        assert_eq!(
            conversation_query("now", &turns, 3),
            "now fourth third second"
        );
        assert_eq!(conversation_query("now", &[], 3), "now");
    }

    #[test]
    fn context_block_layout() {
        let long = "x".repeat(250);
        let rendered = format_context(
            &[
                hit("short note", MemoryArea::Solutions, 0.834),
                hit(&long, MemoryArea::Fragments, 0.5),
            ],
            200,
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "## Relevant Memories:");
        assert_eq!(lines[1], "- [solutions] short note (relevance: 0.83)");
        assert_eq!(lines[2], format!("- [fragments] {}... (relevance: 0.50)", "x".repeat(200)));
        assert_eq!(format_context(&[], 200), "");
    }

    #[test]
    fn search_listing_is_numbered() {
        let rendered = format_search_results("rust", &[hit("ownership", MemoryArea::Main, 0.9)]);
        assert_eq!(
            rendered,
            "Memory search results for 'rust':\n1. [main] ownership (score: 0.90)"
        );
        assert_eq!(format_search_results("void", &[]), "No memories found for: void");
    }
}
