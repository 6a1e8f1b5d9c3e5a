use serde::{Deserialize, Serialize};
use std::fmt;

const FILE_REFERENCE_PREFIX: &str = "fileid://";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// System message that attaches an uploaded provider file to the context.
    pub fn file_reference(handle: &FileHandle) -> Self {
        Self::system(handle.to_reference())
    }

    /// Handle carried by a `fileid://` system message, if this is one.
    pub fn as_file_reference(&self) -> Option<FileHandle> {
        if self.role != MessageRole::System {
            return None;
        }
        self.content
            .strip_prefix(FILE_REFERENCE_PREFIX)
            .filter(|id| !id.is_empty())
            .map(FileHandle::new)
    }
}

/// Opaque file id issued by the model provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHandle(String);

impl FileHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_reference(&self) -> String {
        format!("{FILE_REFERENCE_PREFIX}{}", self.0)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entry of the provider's file listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteFile {
    pub id: String,
    pub filename: String,
}

impl RemoteFile {
    pub fn handle(&self) -> FileHandle {
        FileHandle::new(self.id.clone())
    }
}
