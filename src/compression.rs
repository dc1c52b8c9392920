use crate::request::Message;

/// Prompt compression hook applied to outgoing messages before the first
/// attempt. Currently returns the messages unchanged.
pub fn compress(messages: Vec<Message>) -> Vec<Message> {
    messages
}
