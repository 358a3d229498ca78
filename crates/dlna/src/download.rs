/// Download executor: saves selected recordings under `<root>/<folder>/<title>.mpeg`
///
/// Payloads stream into a `.lock` sibling which is renamed over the final
/// path once the transfer ends, so nothing under the final name is still
/// being written.
use crate::context::FetchContext;
use async_trait::async_trait;
use bytes::Bytes;
use fetchtv_core::{
    Decision, DownloadReport, FetchError, Item, NoProgress, Outcome, Payload, PayloadSource,
    ProgressSink, RecordingSet, Result, SaveDirectory, RECORDING_IN_PROGRESS_SIZE,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

const LOCK_SUFFIX: &str = ".lock";

/// Where and how to save
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub root: PathBuf,
    pub overwrite: bool,
    pub concurrency: usize,
    /// Give up on a single item after this long
    pub deadline: Option<Duration>,
}

impl DownloadOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overwrite: false,
            concurrency: 2,
            deadline: None,
        }
    }
}

/// Streams media payloads over HTTP
#[derive(Debug, Clone)]
pub struct HttpPayloadSource {
    ctx: FetchContext,
}

impl HttpPayloadSource {
    pub fn new(ctx: FetchContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PayloadSource for HttpPayloadSource {
    async fn open(&self, url: &str) -> Result<Box<dyn Payload>> {
        let response = self
            .ctx
            .media_client()
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))?;

        if !response.status().is_success() {
            return Err(FetchError::transport(
                url,
                format!("HTTP {}", response.status()),
            ));
        }

        Ok(Box::new(HttpPayload {
            url: url.to_string(),
            response,
            received: 0,
        }))
    }
}

struct HttpPayload {
    url: String,
    response: reqwest::Response,
    received: u64,
}

#[async_trait]
impl Payload for HttpPayload {
    fn content_length(&self) -> Option<u64> {
        self.response.content_length()
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        match self.response.chunk().await {
            Ok(chunk) => {
                if let Some(bytes) = &chunk {
                    self.received += bytes.len() as u64;
                }
                Ok(chunk)
            }
            // The box often advertises more than it sends
            Err(e) if self.received > 0 && (e.is_body() || e.is_decode()) => {
                debug!("Body of {} cut short: {}", self.url, e);
                Err(FetchError::IncompleteBody {
                    url: self.url.clone(),
                    received: self.received,
                })
            }
            Err(e) => Err(FetchError::transport(&self.url, e)),
        }
    }
}

/// Saves items to disk, several at a time
pub struct Downloader {
    source: Arc<dyn PayloadSource>,
    save_dir: SaveDirectory,
    options: DownloadOptions,
    progress: Arc<dyn ProgressSink>,
}

enum Transfer {
    Complete(u64),
    StillRecording,
}

impl Downloader {
    pub fn new(source: Arc<dyn PayloadSource>, options: DownloadOptions) -> Self {
        Self {
            source,
            save_dir: SaveDirectory::new(options.root.clone()),
            options,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Save every item of `set`; reports come back in listing order
    pub async fn download(&self, set: &RecordingSet) -> Vec<DownloadReport> {
        let selection: Vec<(String, Item)> = set
            .items()
            .map(|(folder, item)| (folder.title.clone(), item.clone()))
            .collect();

        if selection.is_empty() {
            info!("There is nothing new to record");
            return Vec::new();
        }

        info!("Saving {} recording(s) to {}", selection.len(), self.options.root.display());

        let permits = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, (folder, item)) in selection.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let progress = Arc::clone(&self.progress);
            let permits = Arc::clone(&permits);
            let path = self.save_dir.item_path(&folder, &item);
            let overwrite = self.options.overwrite;
            let deadline = self.options.deadline;

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let outcome = save_item(
                    source.as_ref(),
                    progress.as_ref(),
                    &item,
                    &path,
                    overwrite,
                    deadline,
                )
                .await;
                (idx, outcome)
            });
        }

        let mut outcomes: Vec<Option<Outcome>> = vec![None; selection.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, outcome)) => outcomes[idx] = Some(outcome),
                Err(e) => warn!("Download task failed: {}", e),
            }
        }

        selection
            .into_iter()
            .zip(outcomes)
            .map(|((_, item), outcome)| DownloadReport {
                item,
                outcome: outcome.unwrap_or_else(|| Outcome::Failed {
                    reason: "download task aborted".to_string(),
                }),
            })
            .collect()
    }
}

/// Save one item, never failing the batch
pub async fn save_item(
    source: &dyn PayloadSource,
    progress: &dyn ProgressSink,
    item: &Item,
    path: &Path,
    overwrite: bool,
    deadline: Option<Duration>,
) -> Outcome {
    let decision = Decision::from_existing(path.exists(), overwrite);
    if decision == Decision::Skip {
        debug!("Skipping {}: {} exists", item.title, path.display());
        return Outcome::Skipped {
            reason: "already exists".to_string(),
        };
    }

    let lock = lock_path(path);
    if lock.exists() {
        if !overwrite {
            warn!("Already writing (lock file exists) skipping: [{}]", item.title);
            return Outcome::Skipped {
                reason: "already writing (lock file exists)".to_string(),
            };
        }
        info!("Replacing stale lock file {}", lock.display());
        if let Err(e) = tokio::fs::remove_file(&lock).await {
            return failed(item, FetchError::filesystem(&lock, e));
        }
    }

    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return failed(item, FetchError::filesystem(parent, e));
        }
    }

    info!("Writing: [{}] to [{}]", item.title, path.display());

    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, transfer(source, progress, item, &lock)).await {
            Ok(result) => result,
            Err(_) => {
                // Cancelled mid-write: drop the partial file
                if let Err(e) = tokio::fs::remove_file(&lock).await {
                    debug!("No partial file to remove at {}: {}", lock.display(), e);
                }
                warn!("Deadline elapsed saving [{}]", item.title);
                return Outcome::Failed {
                    reason: format!("deadline of {}s elapsed", limit.as_secs()),
                };
            }
        },
        None => transfer(source, progress, item, &lock).await,
    };

    match result {
        Ok(Transfer::Complete(bytes)) => {
            if let Err(e) = tokio::fs::rename(&lock, path).await {
                return failed(item, FetchError::filesystem(path, e));
            }
            info!("Saved [{}] ({} bytes, {:?})", item.title, bytes, decision);
            Outcome::Saved {
                path: path.to_path_buf(),
            }
        }
        Ok(Transfer::StillRecording) => {
            warn!("Skipping [{}], it's currently recording", item.title);
            Outcome::Skipped {
                reason: "currently recording".to_string(),
            }
        }
        Err(e) => failed(item, e),
    }
}

fn failed(item: &Item, error: FetchError) -> Outcome {
    warn!("Failed to save [{}]: {}", item.title, error);
    Outcome::Failed {
        reason: error.to_string(),
    }
}

/// Stream the item's payload into a freshly created `lock` file
async fn transfer(
    source: &dyn PayloadSource,
    progress: &dyn ProgressSink,
    item: &Item,
    lock: &Path,
) -> Result<Transfer> {
    let mut payload = source.open(&item.url).await?;

    let total = payload.content_length();
    if total == Some(RECORDING_IN_PROGRESS_SIZE) {
        return Ok(Transfer::StillRecording);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock)
        .await
        .map_err(|e| FetchError::filesystem(lock, e))?;

    let bar = progress.begin(&item.title, total);
    let copied = copy_payload(payload.as_mut(), &mut file, lock, |n| bar.advance(n)).await;
    bar.finish();
    // Flush even when the copy failed so the partial file is closed cleanly
    let flushed = file
        .flush()
        .await
        .map_err(|e| FetchError::filesystem(lock, e));
    drop(file);

    let bytes = copied?;
    flushed?;
    Ok(Transfer::Complete(bytes))
}

async fn copy_payload(
    payload: &mut dyn Payload,
    file: &mut tokio::fs::File,
    lock: &Path,
    mut on_chunk: impl FnMut(u64) + Send,
) -> Result<u64> {
    let mut written = 0u64;
    loop {
        let chunk = match payload.next_chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(FetchError::IncompleteBody { url, received }) => {
                warn!(
                    "{} ended after {} bytes, short of its Content-Length; keeping what arrived",
                    url, received
                );
                break;
            }
            Err(e) => return Err(e),
        };
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::filesystem(lock, e))?;
        written += chunk.len() as u64;
        on_chunk(chunk.len() as u64);
    }
    Ok(written)
}

/// Flag items whose payload advertises the in-progress length
///
/// The DIDL size is not always the unbounded marker for a live recording, so
/// every item not already flagged gets its media URL opened and the
/// `Content-Length` checked. The body itself is never read.
pub async fn detect_in_progress(
    source: Arc<dyn PayloadSource>,
    mut set: RecordingSet,
    concurrency: usize,
) -> RecordingSet {
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (show_idx, show) in set.shows.iter().enumerate() {
        for (item_idx, item) in show.items.iter().enumerate() {
            if item.is_recording {
                continue;
            }
            let source = Arc::clone(&source);
            let permits = Arc::clone(&permits);
            let url = item.url.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let live = match source.open(&url).await {
                    Ok(payload) => payload.content_length() == Some(RECORDING_IN_PROGRESS_SIZE),
                    Err(e) => {
                        debug!("Could not check {}: {}", url, e);
                        false
                    }
                };
                (show_idx, item_idx, live)
            });
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((show_idx, item_idx, true)) => {
                let item = &mut set.shows[show_idx].items[item_idx];
                debug!("{} is currently recording", item.title);
                item.is_recording = true;
            }
            Ok(_) => {}
            Err(e) => warn!("Recording check task failed: {}", e),
        }
    }
    set
}

/// `<path>.lock`
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(LOCK_SUFFIX);
    PathBuf::from(name)
}
