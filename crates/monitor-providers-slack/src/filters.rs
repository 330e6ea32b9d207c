use monitor_adapters::is_dropped_subtype;

/// Config-level view of the Slack `provider_config` filter fields, decoupled
/// from `monitor_core::ProviderConfig` so filter logic can be unit tested
/// without constructing a full monitor.
#[derive(Debug, Clone, Default)]
pub struct SlackFilters {
    pub my_mentions: bool,
    pub tagged_user_ids: Vec<String>,
    pub keywords: Vec<String>,
}

/// Mirrors `_message_matches_filters`: subtype check first, then the
/// `my_mentions` short-circuit (the search query already guarantees the
/// mention, so any non-dropped hit matches), then tagged users, then
/// keywords. Each individual check is case-insensitive substring/containment.
pub fn message_matches_filters(
    text: &str,
    subtype: Option<&str>,
    mentioned_user_ids: &[String],
    filters: &SlackFilters,
) -> bool {
    if is_dropped_subtype(subtype) {
        return false;
    }
    if filters.my_mentions {
        return true;
    }
    if !filters.tagged_user_ids.is_empty() {
        return filters
            .tagged_user_ids
            .iter()
            .any(|id| mentioned_user_ids.iter().any(|m| m == id));
    }
    if !filters.keywords.is_empty() {
        let lower = text.to_lowercase();
        return filters
            .keywords
            .iter()
            .any(|kw| lower.contains(&kw.to_lowercase()));
    }
    // No filter configured: channel-scoped monitors with neither tagged
    // users nor keywords pass every non-dropped message in the channel.
    true
}

/// Extracts Slack user ids referenced via `<@USERID>` or `<@USERID|label>`
/// mention markup.
pub fn extract_mentioned_user_ids(text: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('>') else { break };
        let inner = &after[..end];
        let id = inner.split('|').next().unwrap_or(inner);
        if !id.is_empty() {
            ids.push(id.to_string());
        }
        rest = &after[end + 1..];
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_bot_messages_regardless_of_mode() {
        let filters = SlackFilters {
            my_mentions: true,
            ..Default::default()
        };
        assert!(!message_matches_filters(
            "hi",
            Some("bot_message"),
            &[],
            &filters
        ));
    }

    #[test]
    fn my_mentions_short_circuits_after_subtype_check() {
        let filters = SlackFilters {
            my_mentions: true,
            ..Default::default()
        };
        assert!(message_matches_filters("<@U9> ping", None, &[], &filters));
    }

    #[test]
    fn tagged_user_filter_requires_mention_match() {
        let filters = SlackFilters {
            tagged_user_ids: vec!["U1".to_string()],
            ..Default::default()
        };
        let mentions = extract_mentioned_user_ids("<@U1|alice> can you look");
        assert!(message_matches_filters("<@U1|alice> can you look", None, &mentions, &filters));
        assert!(!message_matches_filters("no mention here", None, &[], &filters));
    }

    #[test]
    fn keyword_filter_is_case_insensitive_substring() {
        let filters = SlackFilters {
            keywords: vec!["Outage".to_string()],
            ..Default::default()
        };
        assert!(message_matches_filters("prod outage in us-east", None, &[], &filters));
        assert!(!message_matches_filters("all good", None, &[], &filters));
    }

    #[test]
    fn extracts_mention_with_and_without_label() {
        let ids = extract_mentioned_user_ids("<@U1|alice> cc <@U2>");
        assert_eq!(ids, vec!["U1".to_string(), "U2".to_string()]);
    }
}
