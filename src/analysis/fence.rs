//! Helpers for replies wrapped in a fenced code block.
//!
//! Models asked for strict JSON still sometimes answer with
//! ```` ```json ... ``` ````.  These helpers peel that wrapper off so
//! the JSON attempt sees the bare object.

/// Extract the first fenced block tagged `json` (or untagged) and the
/// text surrounding it.
///
/// Returns `Some((inner, remaining))`; `remaining` is the trimmed text
/// outside the fence and may be empty.  CRLF line endings are accepted.
pub(crate) fn extract_json_block(reply: &str) -> Option<(String, String)> {
    let text = reply.replace("\r\n", "\n");
    let open = text.find("```")?;
    let after_ticks = &text[open + 3..];
    let nl = after_ticks.find('\n')?;
    let tag = after_ticks[..nl].trim();
    if !(tag.is_empty() || tag.eq_ignore_ascii_case("json")) {
        return None;
    }

    let inner_start = open + 3 + nl + 1;
    let inner_text = &text[inner_start..];
    let close = if inner_text.starts_with("```") {
        0
    } else {
        inner_text.find("\n```")? + 1
    };
    let inner = inner_text[..close].trim_end_matches('\n').to_string();

    let block_end = inner_start + close + 3;
    let before = text[..open].trim();
    let after = text.get(block_end..).unwrap_or("").trim();
    let remaining = match (before.is_empty(), after.is_empty()) {
        (true, true) => String::new(),
        (false, true) => before.to_string(),
        (true, false) => after.to_string(),
        (false, false) => format!("{before}\n{after}"),
    };

    Some((inner, remaining))
}

/// Return the fence contents when `reply` is nothing but one fenced
/// JSON block (surrounding whitespace allowed).
pub(crate) fn unwrap_fenced_json(reply: &str) -> Option<String> {
    match extract_json_block(reply) {
        Some((inner, remaining)) if remaining.is_empty() => Some(inner),
        _ => None,
    }
}
