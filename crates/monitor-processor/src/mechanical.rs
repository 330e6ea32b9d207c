use monitor_core::{EventData, Provider};

const TITLE_HARD_CAP: usize = 80;
const DESCRIPTION_TRUNCATE_AT: usize = 500;

fn truncate_chars(text: &str, max_chars: usize) -> String {
    let char_count = text.chars().count();
    if char_count <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let truncated: String = text.chars().take(keep).collect();
    format!("{truncated}...")
}

/// Non-`my_mentions` title: `"[{Provider}] {truncated_subject_or_text}"`.
pub fn mechanical_title(provider: Provider, event_data: &EventData) -> String {
    let subject_or_text = event_data
        .subject
        .clone()
        .or_else(|| event_data.text.clone())
        .unwrap_or_default();
    let prefix = format!("[{}] ", provider.display_name());
    let budget = TITLE_HARD_CAP.saturating_sub(prefix.chars().count());
    format!("{prefix}{}", truncate_chars(&subject_or_text, budget))
}

/// Non-`my_mentions` description: sender, subject, and a truncated preview.
pub fn mechanical_description(sender: Option<&str>, event_data: &EventData) -> String {
    let mut lines = Vec::new();
    if let Some(sender) = sender {
        lines.push(format!("From: {sender}"));
    }
    if let Some(subject) = &event_data.subject {
        lines.push(format!("Subject: {subject}"));
    }
    let preview = event_data.text.clone().unwrap_or_default();
    lines.push(String::new());
    lines.push(truncate_chars(&preview, DESCRIPTION_TRUNCATE_AT));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mechanical_title_prefixes_provider() {
        let data = EventData {
            subject: Some("Quarterly report".into()),
            ..Default::default()
        };
        assert_eq!(mechanical_title(Provider::Gmail, &data), "[Gmail] Quarterly report");
    }

    #[test]
    fn mechanical_title_truncates_long_subject() {
        let data = EventData {
            text: Some("x".repeat(100)),
            ..Default::default()
        };
        let title = mechanical_title(Provider::Outlook, &data);
        assert!(title.chars().count() <= TITLE_HARD_CAP);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn mechanical_description_includes_sender_and_subject() {
        let data = EventData {
            subject: Some("Hi".into()),
            text: Some("body text".into()),
            ..Default::default()
        };
        let desc = mechanical_description(Some("a@example.com"), &data);
        assert!(desc.contains("From: a@example.com"));
        assert!(desc.contains("Subject: Hi"));
        assert!(desc.contains("body text"));
    }
}
