#![allow(dead_code)]

use anyhow::anyhow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use paperchat::chat::ChatInvoker;
use paperchat::model::{FileHandle, Message, RemoteFile};
use paperchat::providers::{
    ChatBackend, ChunkStream, FileStore, PaperEntry, PaperLink, PaperSource, ProviderFuture,
};
use paperchat::resolver::FileResolver;
use paperchat::session::{Session, SessionEvent};
use paperchat::transcript::TranscriptStore;

fn ready<'a, T: Send + 'a>(value: anyhow::Result<T>) -> ProviderFuture<'a, T> {
    Box::pin(std::future::ready(value))
}

fn write_stub_pdf(dest: &Path) -> anyhow::Result<()> {
    if let Some(dir) = dest.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(dest, b"%PDF-1.4 stub")?;
    Ok(())
}

pub const PROMPT: &str = "You are an expert in the field of deep learning research.";

/// Provider file store that records every call.
#[derive(Default)]
pub struct FakeFileStore {
    pub files: Mutex<Vec<RemoteFile>>,
    pub creates: Mutex<Vec<PathBuf>>,
    pub deletes: Mutex<Vec<FileHandle>>,
}

impl FakeFileStore {
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let store = Self::default();
        *store.files.lock().unwrap() = files
            .iter()
            .map(|(id, filename)| RemoteFile {
                id: id.to_string(),
                filename: filename.to_string(),
            })
            .collect();
        store
    }

    pub fn create_count(&self) -> usize {
        self.creates.lock().unwrap().len()
    }

    pub fn deleted(&self) -> Vec<FileHandle> {
        self.deletes.lock().unwrap().clone()
    }
}

impl FileStore for FakeFileStore {
    fn list_files(&self) -> ProviderFuture<'_, Vec<RemoteFile>> {
        let files = self.files.lock().unwrap().clone();
        ready(Ok(files))
    }

    fn create_file<'a>(&'a self, path: &'a Path) -> ProviderFuture<'a, RemoteFile> {
        let mut creates = self.creates.lock().unwrap();
        creates.push(path.to_path_buf());
        let created = RemoteFile {
            id: format!("F{}", creates.len()),
            filename: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        self.files.lock().unwrap().push(created.clone());
        ready(Ok(created))
    }

    fn delete_file<'a>(&'a self, handle: &'a FileHandle) -> ProviderFuture<'a, ()> {
        self.deletes.lock().unwrap().push(handle.clone());
        self.files
            .lock()
            .unwrap()
            .retain(|file| file.id != handle.as_str());
        ready(Ok(()))
    }
}

/// Paper source returning a fixed search result and writing a stub PDF.
#[derive(Default)]
pub struct FakePaperSource {
    pub entry: Option<PaperEntry>,
    pub searches: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<(String, PathBuf)>>,
}

impl FakePaperSource {
    pub fn with_pdf(href: &str) -> Self {
        Self {
            entry: Some(PaperEntry {
                title: Some("A Paper".to_string()),
                links: vec![
                    PaperLink {
                        href: format!("{href}.html"),
                        content_type: Some("text/html".to_string()),
                    },
                    PaperLink {
                        href: href.to_string(),
                        content_type: Some("application/pdf".to_string()),
                    },
                ],
            }),
            ..Self::default()
        }
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().unwrap().len()
    }
}

impl PaperSource for FakePaperSource {
    fn find_paper<'a>(&'a self, identifier: &'a str) -> ProviderFuture<'a, Option<PaperEntry>> {
        self.searches.lock().unwrap().push(identifier.to_string());
        let entry = self.entry.clone();
        ready(Ok(entry))
    }

    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> ProviderFuture<'a, ()> {
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), dest.to_path_buf()));
        ready(write_stub_pdf(dest))
    }
}

/// Chat backend that replays scripted fragments.
pub struct StubChat {
    pub fragments: Vec<Result<String, String>>,
    pub fail_to_open: bool,
    pub failures_left: Mutex<usize>,
    pub calls: Mutex<Vec<Vec<Message>>>,
}

impl StubChat {
    pub fn replying(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            fail_to_open: false,
            failures_left: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_after(fragments: &[&str], error: &str) -> Self {
        let mut stub = Self::replying(fragments);
        stub.fragments.push(Err(error.to_string()));
        stub
    }

    pub fn unreachable() -> Self {
        let mut stub = Self::replying(&[]);
        stub.fail_to_open = true;
        stub
    }

    /// Refuses the first request, then replies normally.
    pub fn failing_once(fragments: &[&str]) -> Self {
        let stub = Self::replying(fragments);
        *stub.failures_left.lock().unwrap() = 1;
        stub
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ChatBackend for StubChat {
    fn stream_chat<'a>(&'a self, messages: &'a [Message]) -> ProviderFuture<'a, ChunkStream> {
        self.calls.lock().unwrap().push(messages.to_vec());
        let mut failures_left = self.failures_left.lock().unwrap();
        let refuse = self.fail_to_open || *failures_left > 0;
        *failures_left = failures_left.saturating_sub(1);
        drop(failures_left);
        if refuse {
            return ready(Err(anyhow!("Connection refused by model API")));
        }
        let items: Vec<anyhow::Result<String>> = self
            .fragments
            .iter()
            .map(|item| item.clone().map_err(|msg| anyhow!(msg)))
            .collect();
        let stream: ChunkStream = Box::pin(futures::stream::iter(items));
        ready(Ok(stream))
    }
}

pub struct Harness {
    pub session: Session,
    pub files: Arc<FakeFileStore>,
    pub papers: Arc<FakePaperSource>,
    pub chat: Arc<StubChat>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(files: FakeFileStore, papers: FakePaperSource, chat: StubChat) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let files = Arc::new(files);
        let papers = Arc::new(papers);
        let chat = Arc::new(chat);
        let resolver = FileResolver::new(files.clone(), papers.clone(), dir.path().join("files"));
        let mut session = Session::new(
            PROMPT,
            resolver,
            ChatInvoker::new(chat.clone()),
            TranscriptStore::new(dir.path().join("logs")),
        );
        session.set_log_name("session");
        Self {
            session,
            files,
            papers,
            chat,
            dir,
        }
    }

    pub fn with_chat(chat: StubChat) -> Self {
        Self::new(FakeFileStore::default(), FakePaperSource::default(), chat)
    }

    pub fn transcripts(&self) -> TranscriptStore {
        TranscriptStore::new(self.dir.path().join("logs"))
    }

    /// Writes a local file inside the scratch directory and returns its path.
    pub fn local_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join("papers").join(name);
        fs::create_dir_all(path.parent().expect("parent")).expect("create papers dir");
        fs::write(&path, b"%PDF-1.4 local").expect("write local file");
        path
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("files")
    }
}

/// Collects session events for assertions.
pub fn recorder() -> (Arc<Mutex<Vec<SessionEvent>>>, impl FnMut(SessionEvent) + Send) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    (events, move |event| sink_events.lock().unwrap().push(event))
}
