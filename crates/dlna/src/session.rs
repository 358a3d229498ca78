/// One entry point per command: info, recordings, shows, isrecording
use crate::content_directory::ContentDirectory;
use crate::context::{FetchContext, HttpConfig};
use crate::download::{detect_in_progress, DownloadOptions, Downloader, HttpPayloadSource};
use crate::walker::Walker;
use fetchtv_core::{
    filter, ContentBrowser, DownloadReport, FetchError, FilterCriteria, LocalState, NoProgress,
    NothingSaved, PayloadSource, ProgressSink, RecordingSet, Result, SaveDirectory, Server,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Where to save and whether existing files get replaced
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub root: PathBuf,
    pub overwrite: bool,
    pub deadline: Option<Duration>,
}

impl SaveRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            overwrite: false,
            deadline: None,
        }
    }

    /// The destination must be a directory, or not exist yet
    fn validate(&self) -> Result<()> {
        if self.root.as_os_str().is_empty() {
            return Err(FetchError::InvalidCriteria {
                reason: "save path is empty".to_string(),
            });
        }
        if self.root.exists() && !self.root.is_dir() {
            return Err(FetchError::InvalidCriteria {
                reason: format!("save path {} is not a directory", self.root.display()),
            });
        }
        Ok(())
    }
}

/// Result of a listing command, with download reports when saving
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub set: RecordingSet,
    pub reports: Option<Vec<DownloadReport>>,
}

/// Everything needed to serve commands against one server
pub struct FetchSession {
    server: Server,
    config: HttpConfig,
    browser: Arc<dyn ContentBrowser>,
    source: Arc<dyn PayloadSource>,
    progress: Arc<dyn ProgressSink>,
}

impl FetchSession {
    /// Session talking to `server` over HTTP
    pub fn new(ctx: &FetchContext, server: Server) -> Self {
        let browser = Arc::new(ContentDirectory::new(ctx.clone(), &server));
        let source = Arc::new(HttpPayloadSource::new(ctx.clone()));
        Self::from_parts(ctx.config().clone(), server, browser, source)
    }

    pub fn from_parts(
        config: HttpConfig,
        server: Server,
        browser: Arc<dyn ContentBrowser>,
        source: Arc<dyn PayloadSource>,
    ) -> Self {
        Self {
            server,
            config,
            browser,
            source,
            progress: Arc::new(NoProgress),
        }
    }

    /// Report download progress to `progress`
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// `--info`
    pub fn info(&self) -> &Server {
        &self.server
    }

    /// `--recordings`: walk, filter and optionally save
    pub async fn recordings(
        &self,
        criteria: &FilterCriteria,
        save: Option<&SaveRequest>,
    ) -> Result<Listing> {
        if let Some(request) = save {
            request.validate()?;
        } else if criteria.new_only {
            return Err(FetchError::InvalidCriteria {
                reason: "--new needs a save path to compare against".to_string(),
            });
        }

        info!("Getting recordings from {}", self.server.friendly_name);
        let walker = Walker::new(Arc::clone(&self.browser), self.config.browse_concurrency);
        let walked = walker.walk(criteria).await?;

        let local: Box<dyn LocalState> = match save {
            Some(request) => Box::new(SaveDirectory::new(request.root.clone())),
            None => Box::new(NothingSaved),
        };
        let walked = if criteria.recording_in_progress_only {
            // Narrow by every other predicate first so only candidates are opened
            let candidates = FilterCriteria {
                recording_in_progress_only: false,
                ..criteria.clone()
            };
            let narrowed = filter(&walked, &candidates, local.as_ref());
            info!("Checking {} recording(s) for one in progress", narrowed.item_count());
            detect_in_progress(
                Arc::clone(&self.source),
                narrowed,
                self.config.browse_concurrency,
            )
            .await
        } else {
            walked
        };
        let set = filter(&walked, criteria, local.as_ref());
        info!(
            "{} folder(s), {} recording(s) after filtering",
            set.shows.len(),
            set.item_count()
        );

        let reports = match save {
            Some(request) => {
                let options = DownloadOptions {
                    root: request.root.clone(),
                    overwrite: request.overwrite,
                    concurrency: self.config.download_concurrency,
                    deadline: request.deadline,
                };
                let downloader = Downloader::new(Arc::clone(&self.source), options)
                    .with_progress(Arc::clone(&self.progress));
                Some(downloader.download(&set).await)
            }
            None => None,
        };

        Ok(Listing { set, reports })
    }

    /// `--shows`: folder names only; item predicates do not apply
    pub async fn shows(&self, criteria: &FilterCriteria) -> Result<RecordingSet> {
        let criteria = FilterCriteria {
            shows_only: true,
            new_only: false,
            recording_in_progress_only: false,
            ..criteria.clone()
        };
        Ok(self.recordings(&criteria, None).await?.set)
    }

    /// `--isrecording`: items currently being recorded
    pub async fn is_recording(
        &self,
        criteria: &FilterCriteria,
        save: Option<&SaveRequest>,
    ) -> Result<Listing> {
        let criteria = FilterCriteria {
            recording_in_progress_only: true,
            ..criteria.clone()
        };
        self.recordings(&criteria, save).await
    }
}
