//! Service filter expression helpers.

/// `value` as a double-quoted filter string literal, with backslashes and
/// quotes escaped so the value cannot end the literal early.
pub(crate) fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("projects/shop"), r#""projects/shop""#);
    }

    #[test]
    fn test_quote_escapes_quote_and_backslash() {
        assert_eq!(quote(r#"a") || true || ("b"#), r#""a\") || true || (\"b""#);
        assert_eq!(quote(r"c:\tmp"), r#""c:\\tmp""#);
    }
}
