/// Log injection prevention for user-controlled values (emails, user
/// agents). Strips control characters so a crafted input cannot forge log
/// lines, and truncates to keep audit output bounded.

const MAX_LOG_LENGTH: usize = 200;

pub fn sanitize_for_log(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();

    match cleaned.char_indices().nth(MAX_LOG_LENGTH) {
        Some((idx, _)) => format!("{}...", &cleaned[..idx]),
        None => cleaned,
    }
}

pub fn sanitize_option_for_log(input: &Option<String>) -> String {
    match input {
        Some(value) => sanitize_for_log(value),
        None => "None".to_string(),
    }
}

/// For values that must never appear in logs in full (passwords, raw tokens).
pub fn redact_sensitive(input: &str) -> String {
    format!("[REDACTED-{}]", input.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removes_newlines_and_tabs() {
        let result = sanitize_for_log("user@example.com\nINFO: fake entry\tdone\r");
        assert!(!result.contains('\n'));
        assert!(!result.contains('\r'));
        assert!(!result.contains('\t'));
        assert_eq!(result, "user@example.com INFO: fake entry done ");
    }

    #[test]
    fn removes_ansi_escape_introducer() {
        let result = sanitize_for_log("test\x1b[31mred\x1b[0m");
        assert!(!result.contains('\x1b'));
    }

    #[test]
    fn truncates_long_input() {
        let result = sanitize_for_log(&"a".repeat(300));
        assert!(result.ends_with("..."));
        assert_eq!(result.len(), MAX_LOG_LENGTH + 3);
    }

    #[test]
    fn preserves_unicode() {
        assert_eq!(sanitize_for_log("用户@example.com"), "用户@example.com");
    }

    #[test]
    fn redacts_without_leaking() {
        let result = redact_sensitive("super_secret");
        assert!(!result.contains("secret"));
        assert_eq!(result, "[REDACTED-12]");
    }

    #[test]
    fn option_variants() {
        assert_eq!(sanitize_option_for_log(&Some("ok".into())), "ok");
        assert_eq!(sanitize_option_for_log(&None), "None");
    }
}
