use tracing::debug;

use crate::extract;
use crate::rchain::human::{Attachment, ChatTurn, TurnRole};
use crate::rchain::message::{ContentPart, NormalizedMessage};

/// Assembles the provider-neutral message list for one request.
///
/// Order: optional system prompt, history turns, then the current turn.
/// An empty result means there is nothing to send.
pub fn build_messages(
    history: &[ChatTurn],
    current_text: &str,
    current_attachments: &[Attachment],
    system_prompt: Option<&str>,
) -> Vec<NormalizedMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    if let Some(prompt) = system_prompt.filter(|prompt| !prompt.is_empty()) {
        messages.push(NormalizedMessage::system(prompt));
    }

    for turn in history {
        match turn.kind() {
            TurnRole::User => messages.extend(user_message(&turn.text, &turn.attachments)),
            TurnRole::Assistant => messages.push(NormalizedMessage::assistant(turn.text.clone())),
            TurnRole::Other => debug!(role = %turn.role, "skipping history turn with unknown role"),
        }
    }

    messages.extend(user_message(current_text, current_attachments));
    messages
}

fn user_message(text: &str, attachments: &[Attachment]) -> Option<NormalizedMessage> {
    let mut parts = Vec::with_capacity(attachments.len() + 1);
    if !text.is_empty() {
        parts.push(ContentPart::Text(text.to_string()));
    }
    parts.extend(attachments.iter().map(extract::content_part));
    NormalizedMessage::user_from_parts(parts)
}
