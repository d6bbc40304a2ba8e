// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TEXT UTILITIES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::types::SearchDoc;

/// Normaliza uma query para deduplicação: trim + minúsculas + whitespace
/// interno colapsado.
pub fn normalize_query(query: &str) -> String {
    query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trunca texto para um máximo de caracteres, respeitando boundaries UTF-8.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Trunca texto para `max_chars` acrescentando reticências quando cortar.
///
/// O resultado nunca excede `max_chars` caracteres, reticências incluídas.
pub fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Formata os principais resultados de uma busca como bloco Markdown.
///
/// Formato do relatório de fontes:
/// ```text
/// ### Source 1
/// - **URL**: [Título](https://…)
/// - **Summary**: snippet
/// ```
pub fn format_search_results(query: &str, docs: &[SearchDoc]) -> String {
    let mut block = format!(
        "### Search Summary\nFound {} relevant sources for \"{}\".\n\n### Detailed Sources\n",
        docs.len(),
        query
    );

    for (idx, doc) in docs.iter().enumerate() {
        let title = if doc.title.is_empty() {
            "No title"
        } else {
            &doc.title
        };
        let summary = if doc.snippet.is_empty() {
            "No summary available"
        } else {
            &doc.snippet
        };
        block.push_str(&format!(
            "### Source {}\n- **URL**: [{}]({})\n- **Summary**: {}\n\n",
            idx + 1,
            title,
            doc.url,
            summary
        ));
    }

    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  Quantum   Error\tCorrection "), "quantum error correction");
        assert_eq!(normalize_query("ABC"), "abc");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_truncate_chars_utf8() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("abcdef", 4), "abc…");
        assert_eq!(truncate_with_ellipsis("abc", 4), "abc");
        let truncated = truncate_with_ellipsis(&"y".repeat(600), 500);
        assert_eq!(truncated.chars().count(), 500);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn test_format_search_results() {
        let docs = vec![
            SearchDoc {
                url: "https://bell-labs.com/history".into(),
                title: "The Transistor".into(),
                snippet: "Invented in 1947.".into(),
                main_text: String::new(),
                rank: 0,
            },
            SearchDoc {
                url: "https://en.wikipedia.org/wiki/Transistor".into(),
                title: String::new(),
                snippet: String::new(),
                main_text: String::new(),
                rank: 1,
            },
        ];

        let block = format_search_results("who invented the transistor?", &docs);
        assert!(block.contains("Found 2 relevant sources"));
        assert!(block.contains("### Source 1"));
        assert!(block.contains("[The Transistor](https://bell-labs.com/history)"));
        assert!(block.contains("### Source 2"));
        assert!(block.contains("No title"));
        assert!(block.contains("No summary available"));
    }
}
