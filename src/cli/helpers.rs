//! Shared helper functions for CLI commands.

/// Truncate a string to at most `max_len` characters, appending "..." when cut.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Split a comma separated list, dropping empty entries.
pub fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("9780000000001-chapter", 10), "9780000...");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list(" 978-1, ,978-2,"),
            vec!["978-1".to_string(), "978-2".to_string()]
        );
        assert!(parse_list("").is_empty());
    }
}
