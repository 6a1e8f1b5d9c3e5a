use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Html;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info, warn};

use crate::model::FileHandle;
use crate::session::{CommandOutcome, Session, SessionEvent};
use crate::transcript::timestamp_log_name;

const INDEX_HTML: &str = include_str!("web/index.html");

/// One exchange as shown in the chat window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    pub query: String,
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebEventKind {
    Step,
    Text,
    Notice,
    Error,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebEvent {
    pub kind: WebEventKind,
    pub text: String,
}

impl WebEvent {
    fn new(kind: WebEventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Web chat state: the live session plus the turns displayed so far.
///
/// The conversation sent to the model is the session's own structured state;
/// display text is never parsed back into file references.
pub struct WebChat {
    session: Session,
    turns: Vec<Turn>,
}

impl WebChat {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            turns: Vec::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.turns.clear();
    }

    /// Runs one submitted message. `emit` receives live updates; `Text`
    /// events always carry the whole response so far. The final response is
    /// returned and recorded as a turn.
    pub async fn submit(
        &mut self,
        query: &str,
        emit: &mut (dyn FnMut(WebEvent) + Send),
    ) -> Result<String> {
        if self.turns.is_empty() {
            self.session.set_log_name(timestamp_log_name());
        }

        let snapshot = self.session.conversation().clone();
        let mut shown = String::new();
        let mut step = 0usize;
        let result = {
            let mut sink = |event: SessionEvent| match event {
                SessionEvent::Step(msg) => {
                    step += 1;
                    shown = format!("[STEP {step}]: {msg}");
                    emit(WebEvent::new(WebEventKind::Step, shown.clone()));
                }
                SessionEvent::Fragment { text, .. } => {
                    shown = text.clone();
                    emit(WebEvent::new(WebEventKind::Text, text));
                }
                SessionEvent::Notice(msg) => {
                    shown = msg.clone();
                    emit(WebEvent::new(WebEventKind::Notice, msg));
                }
                SessionEvent::ResponseStarted | SessionEvent::ResponseFinished => {}
            };
            self.session.handle(query, &mut sink).await
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                // A failed query never becomes a turn; drop it from the model context.
                self.session.restore_conversation(snapshot);
                return Err(err);
            }
        };

        let (response, file_id) = match outcome {
            CommandOutcome::Attached(handle) => (
                format!("Finish Uploading Paper. File id: {handle}."),
                Some(handle),
            ),
            CommandOutcome::Detached(Some(handle)) => (
                format!("Finish Deleting Paper. File id: {handle}."),
                Some(handle),
            ),
            CommandOutcome::Detached(None) | CommandOutcome::Rejected(_) => (shown, None),
            CommandOutcome::Answered(text) => (text, None),
            CommandOutcome::LoadedLog(name) => (format!("Finish Loading log: {name}."), None),
            CommandOutcome::Cleared => {
                self.turns.clear();
                return Ok("Chat history cleared.".to_string());
            }
            CommandOutcome::Quit => {
                self.reset();
                return Ok("Session closed. Starting a new chat.".to_string());
            }
        };

        emit(WebEvent::new(WebEventKind::Text, response.clone()));
        self.turns.push(Turn {
            query: query.to_string(),
            response: response.clone(),
            file_id,
        });
        Ok(response)
    }
}

#[derive(Clone)]
struct AppState {
    chat: Arc<Mutex<WebChat>>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    log_name: String,
    turns: Vec<Turn>,
}

fn to_sse_event(event: &WebEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(data) => Event::default().data(data),
        Err(err) => {
            warn!(error = %err, "failed to serialize web event");
            Event::default().data(r#"{"kind":"error","text":"event serialization failed"}"#)
        }
    }
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut chat = state.chat.lock().await;
        let mut emit = |event: WebEvent| {
            let _ = tx.send(event);
        };
        let result = chat.submit(request.message.trim(), &mut emit).await;
        if let Err(err) = result {
            error!(error = %format!("{err:#}"), "web command failed");
            let _ = tx.send(WebEvent::new(WebEventKind::Error, format!("{err:#}")));
        }
        let _ = tx.send(WebEvent::new(WebEventKind::Done, ""));
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse_event(&event)));
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let chat = state.chat.lock().await;
    Json(HistoryResponse {
        log_name: chat.session().log_name().to_string(),
        turns: chat.turns().to_vec(),
    })
}

async fn reset(State(state): State<AppState>) -> StatusCode {
    state.chat.lock().await.reset();
    StatusCode::NO_CONTENT
}

fn router(web_chat: WebChat) -> Router {
    let state = AppState {
        chat: Arc::new(Mutex::new(web_chat)),
    };
    Router::new()
        .route("/", get(index))
        .route("/api/chat", post(chat))
        .route("/api/history", get(history))
        .route("/api/reset", post(reset))
        .with_state(state)
}

pub async fn serve(session: Session, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind web UI to '{addr}'"))?;
    info!(addr = %addr, "web UI listening");
    println!("Paper Reading LLM: open http://{addr}/");

    axum::serve(listener, router(WebChat::new(session)))
        .await
        .context("Web server failed")
}
