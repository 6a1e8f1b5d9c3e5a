use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::chat::ChatInvoker;
use crate::command::Command;
use crate::config::Config;
use crate::conversation::Conversation;
use crate::error::UserInputError;
use crate::model::FileHandle;
use crate::providers::arxiv::ArxivClient;
use crate::providers::openai_compat::OpenAiCompatClient;
use crate::resolver::FileResolver;
use crate::transcript::{TranscriptStore, timestamp_log_name};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Progress notice while a paper is fetched or uploaded.
    Step(String),
    ResponseStarted,
    Fragment { fragment: String, text: String },
    ResponseFinished,
    Notice(String),
}

pub type EventSink<'a> = &'a mut (dyn FnMut(SessionEvent) + Send);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Quit,
    Cleared,
    Attached(FileHandle),
    /// `None` when no provider file had the requested name.
    Detached(Option<FileHandle>),
    LoadedLog(String),
    Answered(String),
    Rejected(String),
}

/// One interactive conversation and the log it is saved to.
pub struct Session {
    conversation: Conversation,
    log_name: String,
    system_prompt: String,
    resolver: FileResolver,
    chat: ChatInvoker,
    transcripts: TranscriptStore,
}

impl Session {
    pub fn new(
        system_prompt: impl Into<String>,
        resolver: FileResolver,
        chat: ChatInvoker,
        transcripts: TranscriptStore,
    ) -> Self {
        let system_prompt = system_prompt.into();
        Self {
            conversation: Conversation::seeded(&system_prompt),
            log_name: timestamp_log_name(),
            system_prompt,
            resolver,
            chat,
            transcripts,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        let provider = Arc::new(OpenAiCompatClient::from_config(cfg)?);
        let papers = Arc::new(ArxivClient::from_config(cfg));
        let resolver = FileResolver::new(provider.clone(), papers, cfg.files_dir.clone());
        Ok(Self::new(
            cfg.system_prompt.clone(),
            resolver,
            ChatInvoker::new(provider),
            TranscriptStore::new(cfg.transcript_dir.clone()),
        ))
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Puts back a conversation captured earlier, e.g. to drop a failed turn.
    pub fn restore_conversation(&mut self, conversation: Conversation) {
        self.conversation = conversation;
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn set_log_name(&mut self, name: impl Into<String>) {
        self.log_name = name.into();
    }

    /// Fresh seeded conversation written to a new timestamped log.
    pub fn reset(&mut self) {
        self.conversation = Conversation::seeded(&self.system_prompt);
        self.log_name = timestamp_log_name();
    }

    /// Runs one input line to completion. Every command except `Quit` ends by
    /// saving the conversation; a provider failure returns early and leaves
    /// the saved log as it was.
    pub async fn handle(&mut self, line: &str, emit: EventSink<'_>) -> Result<CommandOutcome> {
        let outcome = match Command::parse(line) {
            Ok(Command::Quit) => return Ok(CommandOutcome::Quit),
            Ok(command) => match self.execute(command, emit).await {
                Ok(outcome) => outcome,
                Err(err) => match err.downcast_ref::<UserInputError>() {
                    Some(input_err) => Self::reject(input_err, emit),
                    None => return Err(err),
                },
            },
            Err(input_err) => Self::reject(&input_err, emit),
        };

        self.persist()?;
        Ok(outcome)
    }

    fn reject(err: &UserInputError, emit: EventSink<'_>) -> CommandOutcome {
        warn!(error = %err, "rejected command");
        let reason = err.to_string();
        emit(SessionEvent::Notice(reason.clone()));
        CommandOutcome::Rejected(reason)
    }

    async fn execute(&mut self, command: Command, emit: EventSink<'_>) -> Result<CommandOutcome> {
        match command {
            Command::Quit => Ok(CommandOutcome::Quit),
            Command::Clear => {
                self.reset();
                info!(log_name = %self.log_name, "conversation cleared");
                emit(SessionEvent::Notice("Chat history cleared.".to_string()));
                Ok(CommandOutcome::Cleared)
            }
            Command::FetchArxiv(id) => {
                let handle = self
                    .resolver
                    .resolve_remote(&id, &mut |msg: String| emit(SessionEvent::Step(msg)))
                    .await?;
                Ok(self.attach(handle))
            }
            Command::UploadFile(path) => {
                let handle = self
                    .resolver
                    .resolve_local(&path, &mut |msg: String| emit(SessionEvent::Step(msg)))
                    .await?;
                Ok(self.attach(handle))
            }
            Command::Delete(file_name) => {
                let Some(handle) = self.resolver.lookup_handle(&file_name).await? else {
                    emit(SessionEvent::Notice(format!("File {file_name} not found...")));
                    return Ok(CommandOutcome::Detached(None));
                };
                self.resolver.delete(&handle).await?;
                self.conversation.detach_file(&handle);
                Ok(CommandOutcome::Detached(Some(handle)))
            }
            Command::LoadLog(name) => {
                self.conversation = self.transcripts.load(&name)?;
                self.log_name = name.clone();
                Ok(CommandOutcome::LoadedLog(name))
            }
            Command::Chat(query) => {
                emit(SessionEvent::ResponseStarted);
                let text = self
                    .chat
                    .ask(&mut self.conversation, &query, &mut |fragment: &str, text: &str| {
                        emit(SessionEvent::Fragment {
                            fragment: fragment.to_string(),
                            text: text.to_string(),
                        })
                    })
                    .await?;
                emit(SessionEvent::ResponseFinished);
                Ok(CommandOutcome::Answered(text))
            }
        }
    }

    fn attach(&mut self, handle: FileHandle) -> CommandOutcome {
        self.conversation.attach_file(&handle);
        info!(file_id = %handle, "file attached to conversation");
        CommandOutcome::Attached(handle)
    }

    fn persist(&self) -> Result<()> {
        self.transcripts.save(&self.log_name, &self.conversation)
    }
}
