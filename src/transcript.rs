use anyhow::{Context, Result};
use chrono::Local;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::conversation::Conversation;
use crate::error::UserInputError;
use crate::model::Message;

const LOG_EXTENSION: &str = "log";
const LOG_NAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Log name for a session started now.
pub fn timestamp_log_name() -> String {
    Local::now().format(LOG_NAME_FORMAT).to_string()
}

/// Accepts plain names only so a log always lands inside the transcript dir.
pub fn validate_log_name(name: &str) -> Result<(), UserInputError> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..");
    if invalid {
        return Err(UserInputError::InvalidLogName(name.to_string()));
    }
    Ok(())
}

/// Directory of named conversation snapshots, one `<name>.log` file each.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    dir: PathBuf,
}

impl TranscriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOG_EXTENSION}"))
    }

    /// Overwrites the named log with the full conversation.
    pub fn save(&self, name: &str, conversation: &Conversation) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!(
                "Failed to create transcript directory '{}'",
                self.dir.display()
            )
        })?;

        let mut buf = Vec::new();
        let mut serializer =
            Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        conversation
            .serialize(&mut serializer)
            .context("Failed to serialize conversation")?;

        // The previous snapshot stays in place until the new one is complete.
        let path = self.path_for(name);
        let partial = self.dir.join(format!("{name}.{LOG_EXTENSION}.part"));
        fs::write(&partial, buf)
            .with_context(|| format!("Failed to write transcript '{}'", partial.display()))?;
        fs::rename(&partial, &path)
            .with_context(|| format!("Failed to replace transcript '{}'", path.display()))?;
        debug!(
            log_name = %name,
            message_count = conversation.len(),
            "saved transcript"
        );
        Ok(())
    }

    /// Reads the named log back, dropping repeated system messages. A log
    /// that does not exist yields an empty conversation.
    pub fn load(&self, name: &str) -> Result<Conversation> {
        let path = self.path_for(name);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(log_name = %name, "transcript not found, starting empty");
                return Ok(Conversation::new());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read transcript '{}'", path.display()));
            }
        };

        let messages: Vec<Message> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse transcript '{}'", path.display()))?;
        let conversation = Conversation::from_messages(messages);
        info!(
            log_name = %name,
            message_count = conversation.len(),
            "loaded transcript"
        );
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{TranscriptStore, timestamp_log_name, validate_log_name};
    use crate::conversation::Conversation;
    use crate::error::UserInputError;
    use crate::model::{FileHandle, MessageRole};

    fn sample_conversation() -> Conversation {
        let mut conversation = Conversation::seeded("You are a reviewer.");
        conversation.attach_file(&FileHandle::new("file-fe-1"));
        conversation.append(MessageRole::User, "总结一下这篇论文");
        conversation.append(MessageRole::Assistant, "It proposes a new optimizer.");
        conversation
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path().join("logs"));
        let conversation = sample_conversation();

        store.save("session", &conversation).expect("save");
        let loaded = store.load("session").expect("load");

        assert_eq!(loaded, conversation);
    }

    #[test]
    fn save_writes_pretty_utf8_json_array() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        store.save("pretty", &sample_conversation()).expect("save");

        let raw = fs::read_to_string(dir.path().join("pretty.log")).expect("read");
        assert!(raw.starts_with("[\n    {\n        \"role\": \"system\""));
        assert!(raw.contains("总结一下这篇论文"));
        assert!(raw.contains("\"content\": \"fileid://file-fe-1\""));
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        store.save("same", &sample_conversation()).expect("first save");
        store
            .save("same", &Conversation::seeded("short"))
            .expect("second save");

        let loaded = store.load("same").expect("load");
        assert_eq!(loaded, Conversation::seeded("short"));
    }

    #[test]
    fn failed_save_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        store.save("kept", &sample_conversation()).expect("first save");
        fs::create_dir(dir.path().join("kept.log.part")).expect("block partial file");

        let err = store
            .save("kept", &Conversation::seeded("replacement"))
            .expect_err("write into a directory should fail");

        assert!(format!("{err:#}").contains("Failed to write transcript"));
        assert_eq!(store.load("kept").expect("load"), sample_conversation());
    }

    #[test]
    fn save_leaves_no_partial_file_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        store.save("clean", &sample_conversation()).expect("save");

        assert!(dir.path().join("clean.log").exists());
        assert!(!dir.path().join("clean.log.part").exists());
    }

    #[test]
    fn load_missing_log_yields_empty_conversation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TranscriptStore::new(dir.path());
        let loaded = store.load("missing").expect("missing log is not an error");
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_rejects_corrupt_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("broken.log"), "{not json").expect("write");
        let store = TranscriptStore::new(dir.path());
        let err = store.load("broken").expect_err("corrupt log should fail");
        assert!(format!("{err:#}").contains("Failed to parse transcript"));
    }

    #[test]
    fn load_drops_repeated_system_messages() {
        let dir = tempfile::tempdir().expect("tempdir");
        let raw = r#"[
    {"role": "system", "content": "fileid://file-fe-1"},
    {"role": "user", "content": "hi"},
    {"role": "system", "content": "fileid://file-fe-1"},
    {"role": "user", "content": "hi"}
]"#;
        fs::write(dir.path().join("dupes.log"), raw).expect("write");
        let store = TranscriptStore::new(dir.path());

        let loaded = store.load("dupes").expect("load");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.file_handles(), vec![FileHandle::new("file-fe-1")]);
        assert_eq!(loaded.messages()[2].role, MessageRole::User);
    }

    #[test]
    fn validate_log_name_rejects_paths() {
        assert!(validate_log_name("2024-08-19_15-56-26").is_ok());
        assert_eq!(
            validate_log_name("../etc/passwd"),
            Err(UserInputError::InvalidLogName("../etc/passwd".to_string()))
        );
        assert!(validate_log_name("nested/name").is_err());
        assert!(validate_log_name("").is_err());
    }

    #[test]
    fn timestamp_log_name_has_expected_shape() {
        let name = timestamp_log_name();
        assert_eq!(name.len(), "2024-08-19_15-56-26".len());
        assert_eq!(name.as_bytes()[10], b'_');
        assert!(validate_log_name(&name).is_ok());
    }
}
