use std::collections::HashMap;

use monitor_core::config::AiConfig;
use tracing::warn;

use crate::fallback;
use crate::provider::{ChatRequest, ProviderError};
use crate::providers::build_single_provider_router;
use crate::router::ProviderRouter;

/// Stateless triage facade (§4.2). Every method has a deterministic
/// fallback and never lets an AI provider failure propagate to the caller —
/// the Event Processor must not drop a message because AI is unavailable.
///
/// Each use case consults its own configured provider first (if
/// `ai.use_cases` names one), then falls through to the fixed Groq → OpenAI
/// → Anthropic router on any failure — the two-stage order `_call_with_fallback`
/// used in the original triage service.
pub struct TriageClient {
    router: ProviderRouter,
    use_case_routers: HashMap<String, ProviderRouter>,
}

impl TriageClient {
    pub fn new(router: ProviderRouter) -> Self {
        Self {
            router,
            use_case_routers: HashMap::new(),
        }
    }

    /// Builds the per-use-case provider overrides from `ai.use_cases`,
    /// on top of the fixed-order fallback router already held.
    pub fn with_use_case_config(router: ProviderRouter, config: &AiConfig) -> Self {
        let use_case_routers = config
            .use_cases
            .iter()
            .filter_map(|(use_case, provider_name)| {
                build_single_provider_router(config, provider_name)
                    .map(|r| (use_case.clone(), r))
            })
            .collect();
        Self {
            router,
            use_case_routers,
        }
    }

    async fn send(&self, use_case: &str, req: &ChatRequest) -> Result<String, ProviderError> {
        if let Some(preferred) = self.use_case_routers.get(use_case) {
            match preferred.send(req).await {
                Ok(reply) => return Ok(reply),
                Err(e) => warn!(
                    use_case,
                    error = %e,
                    "configured use-case provider failed, falling back to default order"
                ),
            }
        }
        self.router.send(req).await
    }

    fn has_any_provider(&self, use_case: &str) -> bool {
        !self.router.is_empty() || self.use_case_routers.contains_key(use_case)
    }

    pub async fn is_actionable(&self, text: &str, context: Option<&str>) -> bool {
        if !self.has_any_provider("actionability") {
            return fallback::is_actionable_fallback(text);
        }
        let req = ChatRequest {
            system: "Decide whether the recipient must take action or receive information \
                     they need to act on. Pure acknowledgements, standup-bot notices, and CCs \
                     are not actionable. Answer with exactly one word: yes or no."
                .to_string(),
            user: format_with_context(text, context),
            max_tokens: 8,
        };
        match self.send("actionability", &req).await {
            Ok(reply) => parse_yes_no(&reply),
            Err(e) => {
                warn!(error = %e, "actionability triage failed, using fallback heuristic");
                fallback::is_actionable_fallback(text)
            }
        }
    }

    pub async fn is_already_handled(&self, text: &str, context: &str) -> bool {
        if !self.has_any_provider("already_handled") {
            return fallback::is_already_handled_fallback();
        }
        let req = ChatRequest {
            system: "Given a message and its thread replies, decide whether someone already \
                     committed to and completed handling it, or the original author confirmed \
                     it is resolved. Answer with exactly one word: yes or no."
                .to_string(),
            user: format_with_context(text, Some(context)),
            max_tokens: 8,
        };
        match self.send("already_handled", &req).await {
            Ok(reply) => parse_yes_no(&reply),
            Err(e) => {
                warn!(error = %e, "already-handled triage failed, using fallback heuristic");
                fallback::is_already_handled_fallback()
            }
        }
    }

    pub async fn is_urgent(&self, text: &str, context: Option<&str>) -> bool {
        if !self.has_any_provider("urgency") {
            return fallback::is_urgent_fallback(text);
        }
        let req = ChatRequest {
            system: "Decide whether this message describes an explicit urgency, a production \
                     incident, an executive escalation, or a same-day deadline. Answer with \
                     exactly one word: yes or no."
                .to_string(),
            user: format_with_context(text, context),
            max_tokens: 8,
        };
        match self.send("urgency", &req).await {
            Ok(reply) => parse_yes_no(&reply),
            Err(e) => {
                warn!(error = %e, "urgency triage failed, using fallback heuristic");
                fallback::is_urgent_fallback(text)
            }
        }
    }

    pub async fn generate_title(
        &self,
        text: &str,
        context: Option<&str>,
        sender: Option<&str>,
        project: Option<&str>,
    ) -> String {
        if !self.has_any_provider("title") {
            return fallback::generate_title_fallback(text, project);
        }
        let req = ChatRequest {
            system: "Write an action-oriented task title, 60 characters or fewer, using an \
                     imperative verb. Weave in the project or sender name naturally if given. \
                     Reply with only the title text."
                .to_string(),
            user: format_with_hints(text, context, sender, project),
            max_tokens: 32,
        };
        match self.send("title", &req).await {
            Ok(reply) => clean_text_reply(&reply, 80),
            Err(e) => {
                warn!(error = %e, "title generation failed, using fallback heuristic");
                fallback::generate_title_fallback(text, project)
            }
        }
    }

    pub async fn generate_description(
        &self,
        text: &str,
        context: Option<&str>,
        sender: Option<&str>,
    ) -> String {
        if !self.has_any_provider("description") {
            return fallback::generate_description_fallback(text);
        }
        let req = ChatRequest {
            system: "Write a self-contained task description someone could act on without \
                     clicking through to the original thread. Preserve names, dates, and links \
                     verbatim. End with concrete next steps."
                .to_string(),
            user: format_with_hints(text, context, sender, None),
            max_tokens: 256,
        };
        match self.send("description", &req).await {
            Ok(reply) => clean_text_reply(&reply, 500),
            Err(e) => {
                warn!(error = %e, "description generation failed, using fallback heuristic");
                fallback::generate_description_fallback(text)
            }
        }
    }

    pub async fn generate_reply_draft(
        &self,
        text: &str,
        context: Option<&str>,
        sender: Option<&str>,
        channel: Option<&str>,
    ) -> String {
        if !self.has_any_provider("reply_draft") {
            return fallback::generate_reply_draft_fallback();
        }
        let mut user = format_with_hints(text, context, sender, None);
        if let Some(ch) = channel {
            user = format!("{user}\n\nChannel: {ch}");
        }
        let req = ChatRequest {
            system: "Draft a substantive reply that matches the thread's tone. Use @mentions \
                     when delegating to someone else. Reply with only the draft text."
                .to_string(),
            user,
            max_tokens: 200,
        };
        match self.send("reply_draft", &req).await {
            Ok(reply) => clean_text_reply(&reply, 2000),
            Err(e) => {
                warn!(error = %e, "reply draft generation failed, using fallback heuristic");
                fallback::generate_reply_draft_fallback()
            }
        }
    }
}

fn format_with_context(text: &str, context: Option<&str>) -> String {
    match context {
        Some(c) if !c.is_empty() => format!("Message: {text}\n\nThread context:\n{c}"),
        _ => format!("Message: {text}"),
    }
}

fn format_with_hints(
    text: &str,
    context: Option<&str>,
    sender: Option<&str>,
    project: Option<&str>,
) -> String {
    let mut parts = Vec::new();
    if let Some(s) = sender {
        parts.push(format!("Sender: {s}"));
    }
    if let Some(p) = project {
        parts.push(format!("Project: {p}"));
    }
    parts.push(format!("Message: {text}"));
    if let Some(c) = context.filter(|c| !c.is_empty()) {
        parts.push(format!("Thread context:\n{c}"));
    }
    parts.join("\n")
}

fn parse_yes_no(reply: &str) -> bool {
    let lower = reply.trim().to_lowercase();
    lower.starts_with("yes") || lower.starts_with("true")
}

fn clean_text_reply(reply: &str, max_chars: usize) -> String {
    let trimmed = reply.trim().trim_matches(['"', '\'']);
    let char_count = trimmed.chars().count();
    if char_count <= max_chars {
        trimmed.to_string()
    } else {
        let keep = max_chars.saturating_sub(3);
        let truncated: String = trimmed.chars().take(keep).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_router_uses_fallback_for_actionability() {
        let client = TriageClient::new(ProviderRouter::new(vec![]));
        assert!(!client.is_actionable("thanks!", None).await);
        assert!(client.is_actionable("please review PR 42", None).await);
    }

    #[tokio::test]
    async fn empty_router_uses_fallback_for_title() {
        let client = TriageClient::new(ProviderRouter::new(vec![]));
        let title = client.generate_title("<@U1> ping", None, None, None).await;
        assert_eq!(title, "New mention");
    }

    #[test]
    fn parses_yes_and_no() {
        assert!(parse_yes_no("Yes"));
        assert!(parse_yes_no("true"));
        assert!(!parse_yes_no("no"));
    }
}
