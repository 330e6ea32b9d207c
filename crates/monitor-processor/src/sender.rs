use monitor_core::EventData;

/// Prefers the Slack resolved display name, then the raw Slack user id,
/// then the Gmail/Outlook `from.name`/`from.email`.
pub fn extract_sender_name(event_data: &EventData) -> Option<String> {
    event_data
        .user_name
        .clone()
        .or_else(|| event_data.user.clone())
        .or_else(|| event_data.from_name.clone())
        .or_else(|| event_data.from_email.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_resolved_display_name() {
        let data = EventData {
            user_name: Some("Ada".into()),
            user: Some("U123".into()),
            ..Default::default()
        };
        assert_eq!(extract_sender_name(&data), Some("Ada".into()));
    }

    #[test]
    fn falls_back_to_raw_slack_id() {
        let data = EventData {
            user: Some("U123".into()),
            ..Default::default()
        };
        assert_eq!(extract_sender_name(&data), Some("U123".into()));
    }

    #[test]
    fn falls_back_to_email_sender() {
        let data = EventData {
            from_name: None,
            from_email: Some("a@example.com".into()),
            ..Default::default()
        };
        assert_eq!(extract_sender_name(&data), Some("a@example.com".into()));
    }
}
