pub mod arxiv;
pub(crate) mod http_errors;
pub mod openai_compat;
pub mod proxy;

use anyhow::Result;
use futures::Stream;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::model::{FileHandle, Message, RemoteFile};

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Text fragments of a streamed completion, in arrival order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// File storage on the model provider side.
pub trait FileStore: Send + Sync {
    fn list_files(&self) -> ProviderFuture<'_, Vec<RemoteFile>>;
    fn create_file<'a>(&'a self, path: &'a Path) -> ProviderFuture<'a, RemoteFile>;
    fn delete_file<'a>(&'a self, handle: &'a FileHandle) -> ProviderFuture<'a, ()>;
}

/// Streaming chat completion.
pub trait ChatBackend: Send + Sync {
    fn stream_chat<'a>(&'a self, messages: &'a [Message]) -> ProviderFuture<'a, ChunkStream>;
}

/// Preprint repository that can locate and fetch a paper PDF by identifier.
pub trait PaperSource: Send + Sync {
    /// Links of the best match for `identifier`; `None` when the search has
    /// no results.
    fn find_paper<'a>(&'a self, identifier: &'a str) -> ProviderFuture<'a, Option<PaperEntry>>;
    fn download<'a>(&'a self, url: &'a str, dest: &'a Path) -> ProviderFuture<'a, ()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperLink {
    pub href: String,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperEntry {
    pub title: Option<String>,
    pub links: Vec<PaperLink>,
}

impl PaperEntry {
    pub fn pdf_link(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.content_type.as_deref() == Some("application/pdf"))
            .map(|link| link.href.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::{PaperEntry, PaperLink};

    #[test]
    fn pdf_link_picks_first_pdf_typed_link() {
        let entry = PaperEntry {
            title: None,
            links: vec![
                PaperLink {
                    href: "http://arxiv.org/abs/2311.11100v1".to_string(),
                    content_type: Some("text/html".to_string()),
                },
                PaperLink {
                    href: "http://arxiv.org/pdf/2311.11100v1".to_string(),
                    content_type: Some("application/pdf".to_string()),
                },
                PaperLink {
                    href: "http://example.org/other.pdf".to_string(),
                    content_type: Some("application/pdf".to_string()),
                },
            ],
        };
        assert_eq!(entry.pdf_link(), Some("http://arxiv.org/pdf/2311.11100v1"));
    }

    #[test]
    fn pdf_link_is_none_without_pdf() {
        let entry = PaperEntry {
            title: None,
            links: vec![PaperLink {
                href: "http://arxiv.org/abs/1".to_string(),
                content_type: None,
            }],
        };
        assert!(entry.pdf_link().is_none());
    }
}
