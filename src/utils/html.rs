use ammonia;

/// Clean rich-text post bodies using the ammonia library.
///
/// Whitelist-based sanitization: safe tags (<b>, <p>, ...) survive,
/// dangerous tags (<script>, <iframe>) and event-handler attributes are
/// stripped. Plain-text posts skip this entirely.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_tags() {
        let cleaned = clean_html("<b>hi</b><script>alert(1)</script>");
        assert_eq!(cleaned, "<b>hi</b>");
    }
}
