/// Slice the outermost JSON object candidate out of a noisy LLM reply.
///
/// Takes everything from the first `{` to the last `}` inclusive. Models
/// often wrap JSON in prose or markdown fences; this drops the wrapper
/// without trying to validate what is inside.
pub fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;

    if end < start {
        return None;
    }

    Some(&s[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_object_wrapped_in_prose() {
        let reply = "Sure! Here is the summary:\n```json\n{\"userInput\":[]}\n```\nEnjoy.";
        assert_eq!(extract_json_object(reply), Some("{\"userInput\":[]}"));
    }

    #[test]
    fn test_nested_objects_keep_outer_braces() {
        let reply = r#"x {"a":{"b":{}}} y"#;
        assert_eq!(extract_json_object(reply), Some(r#"{"a":{"b":{}}}"#));
    }

    #[test]
    fn test_no_braces() {
        assert_eq!(extract_json_object("I cannot summarize that."), None);
        assert_eq!(extract_json_object(""), None);
    }

    #[test]
    fn test_only_one_side() {
        assert_eq!(extract_json_object("{ unterminated"), None);
        assert_eq!(extract_json_object("closing only }"), None);
    }

    #[test]
    fn test_reversed_braces() {
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_multibyte_prose_around_object() {
        let reply = "Résumé → {\"k\":\"ü\"} ✓";
        assert_eq!(extract_json_object(reply), Some("{\"k\":\"ü\"}"));
    }
}
