//! Compact output rendering helpers for block messages.
//!
//! Keeps path listings and failure previews bounded while preserving signal.

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Render up to `max_items` entries as an indented bullet list with a
/// `+N more` suffix when the list is truncated.
pub fn bullet_list(items: &[String], max_items: usize) -> String {
    let mut shown = items
        .iter()
        .take(max_items)
        .map(|i| format!("  • {}", compact_line(i, 90)))
        .collect::<Vec<_>>()
        .join("\n");
    if items.len() > max_items {
        shown.push_str(&format!("\n  • ... +{} more", items.len() - max_items));
    }
    shown
}
