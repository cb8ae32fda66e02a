//! Token estimation utilities.
//!
//! Uses a byte-based heuristic: ~4 bytes per token. Prompt budgets are
//! converted between tokens and bytes with the same ratio so the context
//! store can be fitted with exact byte accounting.

use codeloop_core::message::Message;
use codeloop_core::tool::ToolDefinition;

/// Bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(BYTES_PER_TOKEN)
}

/// Estimate tokens for a single message including per-message overhead.
///
/// Each message costs ~4 tokens of overhead for the role name and
/// delimiters in the API wire format.
pub fn estimate_message_tokens(message: &Message) -> usize {
    4 + estimate_tokens(&message.content)
}

pub fn estimate_messages_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Estimate tokens for a tool definition as it appears in the system prompt.
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> usize {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}

/// Byte budget for the prompt: the context window minus the tokens reserved
/// for the reply, converted to bytes.
pub fn prompt_byte_budget(context_window: u32, reserved_for_reply: u32) -> usize {
    (context_window.saturating_sub(reserved_for_reply) as usize) * BYTES_PER_TOKEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn rounds_up() {
        assert_eq!(estimate_tokens("test"), 1);
        assert_eq!(estimate_tokens("tests"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(400)), 100);
    }

    #[test]
    fn message_has_overhead() {
        let msg = Message::user("test");
        assert_eq!(estimate_message_tokens(&msg), 5);
        assert_eq!(estimate_messages_tokens(&[msg.clone(), msg]), 10);
    }

    #[test]
    fn tool_definition_is_counted() {
        let def = ToolDefinition {
            name: "read_file".into(),
            description: "Read a file".into(),
            parameters: serde_json::json!({"type": "object"}),
        };
        assert!(estimate_tool_tokens(&def) > 5);
    }

    #[test]
    fn budget_reserves_reply_tokens() {
        assert_eq!(prompt_byte_budget(32768, 4096), 28672 * 4);
        assert_eq!(prompt_byte_budget(100, 4096), 0);
    }
}
