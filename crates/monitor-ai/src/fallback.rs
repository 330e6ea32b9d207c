//! Deterministic fallbacks used when no AI provider is configured, or when
//! every configured provider's call fails. These must never be skipped —
//! the processor pipeline is fail-open around AI, never fail-closed.

const ACKNOWLEDGEMENT_PHRASES: &[&str] = &[
    "okay", "ok", "sure", "got it", "thanks", "thank you", "noted", "will do", "done", "yes",
    "no", "agreed",
];

const URGENCY_LEXICON: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "critical",
    "emergency",
    "time-sensitive",
    "blocking",
    "blocker",
    "outage",
    "down",
    "incident",
    "escalat",
    "p0",
    "p1",
    "sev1",
    "sev0",
    "production issue",
    "prod issue",
    "site down",
    "service down",
];

const REPLY_DRAFT_FALLBACK: &str =
    "Thanks for the heads up — I'll take a look and get back to you.";

/// Renders `<@ID|Name>` as `Name` and strips bare `<@ID>` to empty, then
/// collapses the resulting double spaces.
pub fn strip_mentions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("<@") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('>') {
            Some(end) => {
                let inner = &after[..end];
                if let Some((_, label)) = inner.split_once('|') {
                    out.push_str(label);
                }
                rest = &after[end + 1..];
            }
            None => {
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn is_actionable_fallback(text: &str) -> bool {
    let stripped = strip_mentions(text);
    let clean = stripped.trim().trim_end_matches(['.', '!']).to_lowercase();
    if ACKNOWLEDGEMENT_PHRASES.contains(&clean.as_str()) {
        return false;
    }
    if stripped.to_lowercase().contains("did not post a standup for") {
        return false;
    }
    true
}

pub fn is_already_handled_fallback() -> bool {
    false
}

pub fn is_urgent_fallback(text: &str) -> bool {
    let lower = text.to_lowercase();
    URGENCY_LEXICON.iter().any(|kw| lower.contains(kw))
}

const TITLE_TRUNCATE_AT: usize = 60;
const TITLE_HARD_CAP: usize = 80;

pub fn generate_title_fallback(text: &str, project: Option<&str>) -> String {
    let stripped = strip_mentions(text);
    let trimmed = stripped.trim().trim_matches(['"', '\'']);
    if trimmed.is_empty() {
        return match project {
            Some(p) => format!("{p}: New mention"),
            None => "New mention".to_string(),
        };
    }
    let body = truncate_chars(trimmed, TITLE_TRUNCATE_AT);
    let title = match project {
        Some(p) => format!("{p}: {body}"),
        None => body,
    };
    truncate_chars(&title, TITLE_HARD_CAP)
}

const DESCRIPTION_TRUNCATE_AT: usize = 500;

pub fn generate_description_fallback(text: &str) -> String {
    let stripped = strip_mentions(text);
    truncate_chars(stripped.trim(), DESCRIPTION_TRUNCATE_AT)
}

pub fn generate_reply_draft_fallback() -> String {
    REPLY_DRAFT_FALLBACK.to_string()
}

/// Truncates to at most `limit` chars, appending `...` when truncation
/// actually removed content (matching the original's `text[:n] + "..."`).
fn truncate_chars(s: &str, limit: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= limit {
        return s.to_string();
    }
    let keep = limit.saturating_sub(3);
    let truncated: String = s.chars().take(keep).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_labeled_and_bare_mentions() {
        assert_eq!(strip_mentions("<@U1|Alice> please review <@U2>"), "Alice please review");
    }

    #[test]
    fn acknowledgement_is_not_actionable() {
        assert!(!is_actionable_fallback("thanks!"));
        assert!(!is_actionable_fallback("<@U1> got it"));
    }

    #[test]
    fn standup_template_is_not_actionable() {
        assert!(!is_actionable_fallback("did not post a standup for today"));
    }

    #[test]
    fn substantive_message_is_actionable() {
        assert!(is_actionable_fallback("can you review PR 42 before EOD?"));
    }

    #[test]
    fn already_handled_fallback_never_suppresses() {
        assert!(!is_already_handled_fallback());
    }

    #[test]
    fn urgency_keyword_detected() {
        assert!(is_urgent_fallback("prod is down, need eyes asap"));
        assert!(!is_urgent_fallback("let's sync sometime next week"));
    }

    #[test]
    fn title_truncates_and_prepends_project() {
        let long = "a".repeat(100);
        let title = generate_title_fallback(&long, Some("Acme"));
        assert!(title.starts_with("Acme: "));
        assert!(title.len() <= TITLE_HARD_CAP);
    }

    #[test]
    fn empty_title_falls_back_to_new_mention() {
        assert_eq!(generate_title_fallback("<@U1>", None), "New mention");
        assert_eq!(generate_title_fallback("<@U1>", Some("Acme")), "Acme: New mention");
    }

    #[test]
    fn description_truncates_at_500() {
        let long = "b".repeat(600);
        let desc = generate_description_fallback(&long);
        assert_eq!(desc.chars().count(), DESCRIPTION_TRUNCATE_AT);
        assert!(desc.ends_with("..."));
    }
}
