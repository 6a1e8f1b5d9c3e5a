use serde::{Deserialize, Serialize};

use crate::model::{FileHandle, Message, MessageRole};

/// Ordered chat transcript sent to the model on every turn.
///
/// System messages behave like a set of active context facts: the persona
/// prompt plus one `fileid://` entry per attached file. Appending a system
/// message that is already present is a no-op, so replaying an upload never
/// duplicates model context. User and assistant messages keep their order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh conversation holding only the persona prompt.
    pub fn seeded(system_prompt: &str) -> Self {
        let mut conversation = Self::new();
        if !system_prompt.trim().is_empty() {
            conversation.append(MessageRole::System, system_prompt);
        }
        conversation
    }

    pub fn from_messages(messages: Vec<Message>) -> Self {
        let mut conversation = Self::new();
        for msg in messages {
            conversation.push(msg);
        }
        conversation
    }

    pub fn append(&mut self, role: MessageRole, content: impl Into<String>) {
        self.push(Message::new(role, content));
    }

    pub fn push(&mut self, message: Message) {
        if message.role == MessageRole::System && self.messages.contains(&message) {
            return;
        }
        self.messages.push(message);
    }

    /// Removes every message with exactly this role and content.
    pub fn remove(&mut self, role: MessageRole, content: &str) {
        self.messages
            .retain(|msg| !(msg.role == role && msg.content == content));
    }

    pub fn attach_file(&mut self, handle: &FileHandle) {
        self.push(Message::file_reference(handle));
    }

    pub fn detach_file(&mut self, handle: &FileHandle) {
        self.remove(MessageRole::System, &handle.to_reference());
    }

    pub fn file_handles(&self) -> Vec<FileHandle> {
        self.messages
            .iter()
            .filter_map(Message::as_file_reference)
            .collect()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
