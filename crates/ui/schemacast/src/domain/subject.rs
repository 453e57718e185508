//! Subject naming helpers.

/// Topic a subject publishes to, following the `TopicNameStrategy` naming
/// (`<topic>-value` / `<topic>-key`). Other subjects map to themselves.
pub fn subject_to_topic(subject: &str) -> &str {
    subject
        .strip_suffix("-value")
        .or_else(|| subject.strip_suffix("-key"))
        .unwrap_or(subject)
}

/// Case-insensitive substring filter. An empty query matches everything.
pub fn filter_subjects<'a>(subjects: &'a [String], query: &str) -> Vec<&'a str> {
    let needle = query.to_lowercase();
    subjects
        .iter()
        .filter(|s| needle.is_empty() || s.to_lowercase().contains(&needle))
        .map(String::as_str)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_value_and_key_suffix() {
        assert_eq!(subject_to_topic("orders-value"), "orders");
        assert_eq!(subject_to_topic("orders-key"), "orders");
        assert_eq!(subject_to_topic("orders"), "orders");
        assert_eq!(subject_to_topic("my-value-stream"), "my-value-stream");
    }

    #[test]
    fn filter_is_case_insensitive() {
        let subjects = vec!["Orders-value".to_string(), "payments-value".to_string()];
        assert_eq!(filter_subjects(&subjects, "ORD"), vec!["Orders-value"]);
        assert_eq!(filter_subjects(&subjects, "").len(), 2);
        assert!(filter_subjects(&subjects, "zzz").is_empty());
    }
}
