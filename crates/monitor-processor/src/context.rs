use monitor_core::{ContextData, ContextMessage};

/// Flattens thread context (falling back to before/after context when a
/// message has no thread) into display lines, newest-irrelevant — order is
/// whatever the adapter returned.
fn context_lines(context: &ContextData) -> Vec<String> {
    let source: Vec<&ContextMessage> = if !context.thread.is_empty() {
        context.thread.iter().collect()
    } else {
        context.before.iter().chain(context.after.iter()).collect()
    };
    source
        .into_iter()
        .map(|m| {
            let who = m.user_name.as_deref().or(m.user.as_deref()).unwrap_or("unknown");
            format!("{who}: {}", m.text)
        })
        .collect()
}

/// First `limit` context lines joined into a single string, or `None` if
/// there is no context at all (so callers can treat it as "no context").
pub fn context_text(context: &ContextData, limit: usize) -> Option<String> {
    if context.is_empty() {
        return None;
    }
    let lines = context_lines(context);
    let joined = lines.into_iter().take(limit).collect::<Vec<_>>().join("\n");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_yields_none() {
        assert_eq!(context_text(&ContextData::default(), 20), None);
    }

    #[test]
    fn caps_at_limit() {
        let context = ContextData {
            thread: (0..10)
                .map(|i| ContextMessage {
                    user: Some("U1".into()),
                    user_name: None,
                    text: format!("msg {i}"),
                    ts: None,
                })
                .collect(),
            ..Default::default()
        };
        let text = context_text(&context, 3).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
