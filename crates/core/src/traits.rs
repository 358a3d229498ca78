use crate::error::Result;
use crate::models::{Item, Node};
use async_trait::async_trait;
use bytes::Bytes;

/// Something that can list the children of a ContentDirectory container
#[async_trait]
pub trait ContentBrowser: Send + Sync {
    /// Browse the direct children of `container_id`, in server order
    async fn browse(&self, container_id: &str) -> Result<Vec<Node>>;
}

/// Read-only view of what has already been saved locally
pub trait LocalState: Send + Sync {
    /// Whether a file for `item` already exists under `folder_title`
    fn exists(&self, folder_title: &str, item: &Item) -> bool;
}

/// Opens media payloads for download
#[async_trait]
pub trait PayloadSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn Payload>>;
}

/// A media payload being streamed from the server
#[async_trait]
pub trait Payload: Send {
    /// Length advertised by the server, if any
    fn content_length(&self) -> Option<u64>;

    /// Next chunk of the body, `None` at end of stream
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;
}

/// Receives per-item transfer progress while saving
pub trait ProgressSink: Send + Sync {
    /// A transfer of `title` is starting; `total` is the advertised length
    fn begin(&self, title: &str, total: Option<u64>) -> Box<dyn TransferProgress>;
}

/// Progress of one transfer
pub trait TransferProgress: Send + Sync {
    fn advance(&self, bytes: u64);
    fn finish(&self);
}

/// A `ProgressSink` that reports nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn begin(&self, _title: &str, _total: Option<u64>) -> Box<dyn TransferProgress> {
        Box::new(NoProgress)
    }
}

impl TransferProgress for NoProgress {
    fn advance(&self, _bytes: u64) {}
    fn finish(&self) {}
}
