use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Error as EventSourceError, Event, EventSource};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::{FileHandle, Message, RemoteFile};
use crate::providers::http_errors::api_request_error;
use crate::providers::{ChatBackend, ChunkStream, FileStore, ProviderFuture};

const SERVICE: &str = "model API";
const URL_SETTING: &str = "MODEL_BASE_URL";
const FILE_PURPOSE: &str = "file-extract";
const STREAM_BUFFER: usize = 32;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    data: Vec<RemoteFile>,
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Delta(String),
    Done,
}

/// Decodes the `data` field of one chat completion event.
fn decode_event_data(data: &str) -> Result<SseEvent> {
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(SseEvent::Done);
    }
    if data.is_empty() {
        return Ok(SseEvent::Delta(String::new()));
    }

    let chunk: ChatCompletionChunk = serde_json::from_str(data)
        .with_context(|| format!("Failed to parse chat completion chunk: {data}"))?;
    let content: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok(SseEvent::Delta(content))
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}

async fn ensure_success(response: Response, what: &str) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        status = %status,
        response_body_len = body.len(),
        "{what} returned non-success status"
    );
    Err(anyhow!("{} failed with status {}: {}", what, status, body))
}

/// OpenAI-compatible provider (DashScope compatible mode by default):
/// file storage plus streaming chat completions.
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    model: String,
    connect_timeout_secs: u64,
}

impl OpenAiCompatClient {
    pub fn new(
        access_key: &str,
        base_url: impl Into<String>,
        model: impl Into<String>,
        connect_timeout_secs: u64,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {access_key}"))
            .context("Access key contains characters not allowed in a header")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .no_proxy()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .build()
            .context("Failed to initialize HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            connect_timeout_secs,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.access_key,
            cfg.model_base_url.clone(),
            cfg.model.clone(),
            cfg.model_connect_timeout_secs,
        )
    }

    fn request_error(&self, err: reqwest::Error, api_url: &str) -> anyhow::Error {
        warn!(api_url = %api_url, error = %err, "model API request failed");
        api_request_error(err, SERVICE, api_url, URL_SETTING, self.connect_timeout_secs)
    }

    async fn stream_open_error(&self, err: EventSourceError, api_url: &str) -> anyhow::Error {
        match err {
            EventSourceError::Transport(err) => self.request_error(err, api_url),
            EventSourceError::InvalidStatusCode(status, response) => {
                match ensure_success(response, "chat completion").await {
                    Err(err) => err,
                    Ok(_) => anyhow!("chat completion failed with status {status}"),
                }
            }
            EventSourceError::InvalidContentType(content_type, _) => anyhow!(
                "chat completion answered with content type {:?} instead of an event stream",
                content_type
            ),
            other => anyhow::Error::new(other).context("Chat completion stream failed"),
        }
    }

    async fn fetch_file_list(&self) -> Result<Vec<RemoteFile>> {
        let api_url = endpoint(&self.base_url, "files");
        let response = self
            .client
            .get(&api_url)
            .send()
            .await
            .map_err(|err| self.request_error(err, &api_url))?;
        let list: FileList = ensure_success(response, "file listing")
            .await?
            .json()
            .await
            .context("Failed to parse file listing")?;
        debug!(file_count = list.data.len(), "listed provider files");
        Ok(list.data)
    }

    async fn upload(&self, path: &Path) -> Result<RemoteFile> {
        let api_url = endpoint(&self.base_url, "files");
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("'{}' has no file name", path.display()))?;
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read '{}'", path.display()))?;
        debug!(file_name = %file_name, size = bytes.len(), "uploading file");

        let form = Form::new()
            .text("purpose", FILE_PURPOSE)
            .part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(&api_url)
            .multipart(form)
            .send()
            .await
            .map_err(|err| self.request_error(err, &api_url))?;
        ensure_success(response, "file upload")
            .await?
            .json()
            .await
            .context("Failed to parse file upload response")
    }

    async fn remove(&self, handle: &FileHandle) -> Result<()> {
        let api_url = endpoint(&self.base_url, &format!("files/{handle}"));
        let response = self
            .client
            .delete(&api_url)
            .send()
            .await
            .map_err(|err| self.request_error(err, &api_url))?;
        ensure_success(response, "file deletion").await?;
        Ok(())
    }

    async fn open_chat_stream(&self, messages: &[Message]) -> Result<ChunkStream> {
        let api_url = endpoint(&self.base_url, "chat/completions");
        let body = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: true,
        };
        debug!(
            api_url = %api_url,
            model = %self.model,
            message_count = messages.len(),
            "sending chat completion request"
        );

        let request = self.client.post(&api_url).json(&body);
        let mut events =
            EventSource::new(request).context("Failed to prepare chat completion request")?;
        events.set_retry_policy(Box::new(Never));

        match events.next().await {
            Some(Ok(Event::Open)) => {}
            Some(Ok(Event::Message(message))) => {
                events.close();
                return Err(anyhow!(
                    "Chat completion stream sent '{}' before opening",
                    message.event
                ));
            }
            Some(Err(err)) => {
                events.close();
                return Err(self.stream_open_error(err, &api_url).await);
            }
            None => return Err(anyhow!("Chat completion stream closed before opening")),
        }

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            while let Some(item) = events.next().await {
                let text = match item {
                    Ok(Event::Open) => continue,
                    Ok(Event::Message(message)) => match decode_event_data(&message.data) {
                        Ok(SseEvent::Delta(text)) => text,
                        Ok(SseEvent::Done) => break,
                        Err(err) => {
                            let _ = tx.send(Err(err)).await;
                            break;
                        }
                    },
                    Err(EventSourceError::StreamEnded) => break,
                    Err(err) => {
                        let err = anyhow::Error::new(err).context("Chat completion stream failed");
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                };
                if tx.send(Ok(text)).await.is_err() {
                    break;
                }
            }
            events.close();
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

impl FileStore for OpenAiCompatClient {
    fn list_files(&self) -> ProviderFuture<'_, Vec<RemoteFile>> {
        Box::pin(self.fetch_file_list())
    }

    fn create_file<'a>(&'a self, path: &'a Path) -> ProviderFuture<'a, RemoteFile> {
        Box::pin(self.upload(path))
    }

    fn delete_file<'a>(&'a self, handle: &'a FileHandle) -> ProviderFuture<'a, ()> {
        Box::pin(self.remove(handle))
    }
}

impl ChatBackend for OpenAiCompatClient {
    fn stream_chat<'a>(&'a self, messages: &'a [Message]) -> ProviderFuture<'a, ChunkStream> {
        Box::pin(self.open_chat_stream(messages))
    }
}
