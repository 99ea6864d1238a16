//! Session title derivation.

/// Maximum length of a heuristically derived title, in characters.
const MAX_TITLE_CHARS: usize = 40;

/// Derive a session title from the first user message.
///
/// Cheap heuristic used on the first exchange: first non-empty line,
/// whitespace-collapsed, truncated on a char boundary with an ellipsis. A
/// higher-quality title may replace it later via
/// [`crate::controller::ChatController::refine_title`].
pub fn derive_title(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let collapsed: String = line.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "New chat".to_string();
    }
    let mut chars = collapsed.chars();
    let head: String = chars.by_ref().take(MAX_TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head.trim_end())
    } else {
        head
    }
}
