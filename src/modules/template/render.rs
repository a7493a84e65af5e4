// Copyright © 2025 mailroom.dev
// Licensed under Mailroom License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::HashMap;

/// Substitutes `{key}` placeholders with user attributes. Unknown keys are
/// left in place so a half-configured signature stays visibly unfinished
/// instead of silently dropping text.
pub fn render_placeholders(template: &str, attributes: &HashMap<String, String>) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut remaining = template;

    while let Some(open) = remaining.find('{') {
        rendered.push_str(&remaining[..open]);
        let rest = &remaining[open + 1..];
        match rest.find(['{', '}']) {
            Some(end) if rest.as_bytes()[end] == b'}' => {
                let key = &rest[..end];
                match attributes.get(key) {
                    Some(value) => rendered.push_str(value),
                    None => {
                        rendered.push('{');
                        rendered.push_str(key);
                        rendered.push('}');
                    }
                }
                remaining = &rest[end + 1..];
            }
            _ => {
                rendered.push('{');
                remaining = rest;
            }
        }
    }
    rendered.push_str(remaining);

    rendered
}

/// The substitution context for signature rendering: the user's standard
/// fields plus everything in `custom_attributes`.
pub fn user_attributes(
    name: &str,
    custom_attributes: Option<&str>,
) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    attributes.insert("name".to_string(), name.to_string());
    if let Some(raw) = custom_attributes {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw) {
            for (key, value) in map {
                let rendered = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                attributes.insert(key, rendered);
            }
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_known_keys() {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), "Alice".to_string());
        attributes.insert("job_title".to_string(), "Engineer".to_string());
        assert_eq!(
            render_placeholders("-- \n{name}, {job_title}", &attributes),
            "-- \nAlice, Engineer"
        );
    }

    #[test]
    fn test_render_keeps_unknown_keys() {
        let attributes = HashMap::new();
        assert_eq!(
            render_placeholders("Hello {department}", &attributes),
            "Hello {department}"
        );
    }

    #[test]
    fn test_user_attributes_merges_custom_json() {
        let attributes = user_attributes(
            "Alice",
            Some(r#"{"job_title": "Engineer", "floor": 3}"#),
        );
        assert_eq!(attributes.get("name").unwrap(), "Alice");
        assert_eq!(attributes.get("job_title").unwrap(), "Engineer");
        assert_eq!(attributes.get("floor").unwrap(), "3");
    }
}
