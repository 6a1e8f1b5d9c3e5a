use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tracing::debug;

use crate::conversation::Conversation;
use crate::model::MessageRole;
use crate::providers::ChatBackend;

/// Receives each non-empty fragment together with the text so far.
pub type OnFragment<'a> = &'a mut (dyn FnMut(&str, &str) + Send);

pub struct ChatInvoker {
    backend: Arc<dyn ChatBackend>,
}

impl ChatInvoker {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Appends `query` as a user message, streams the model reply and appends
    /// it as one assistant message. A failed stream leaves the user message in
    /// place and appends nothing else.
    pub async fn ask(
        &self,
        conversation: &mut Conversation,
        query: &str,
        on_fragment: OnFragment<'_>,
    ) -> Result<String> {
        conversation.append(MessageRole::User, query);

        let mut stream = self.backend.stream_chat(conversation.messages()).await?;
        let mut response = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            if fragment.is_empty() {
                continue;
            }
            response.push_str(&fragment);
            on_fragment(&fragment, &response);
        }

        debug!(response_len = response.len(), "model response complete");
        conversation.append(MessageRole::Assistant, response.clone());
        Ok(response)
    }
}
