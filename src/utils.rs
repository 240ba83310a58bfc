//! Shared utility helpers.

/// Truncate a string to `max` characters, appending `…` if trimmed.
///
/// Counts chars rather than bytes so Korean text is cut at the same
/// visual length as ASCII.
pub fn truncate_str(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}…", &s[..end]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_strings_untouched() {
        assert_eq!(truncate_str("abc", 3), "abc");
        assert_eq!(truncate_str("", 0), "");
    }

    #[test]
    fn cuts_on_char_boundary() {
        assert_eq!(truncate_str("피곤함: 40%", 3), "피곤함…");
        assert_eq!(truncate_str("abcdef", 2), "ab…");
    }
}
