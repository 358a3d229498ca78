/// Hierarchy walker: root -> show folders -> recordings
use fetchtv_core::{
    folder_allowed, Container, ContentBrowser, FilterCriteria, Item, Node, RecordingSet, Result,
    Show, ROOT_CONTAINER_ID,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Title of the root container that holds the show folders on a Fetch box
pub const RECORDINGS_FOLDER: &str = "Recordings";

/// Expands show folders into their recordings
pub struct Walker {
    browser: Arc<dyn ContentBrowser>,
    concurrency: usize,
}

impl Walker {
    pub fn new(browser: Arc<dyn ContentBrowser>, concurrency: usize) -> Self {
        Self {
            browser,
            concurrency: concurrency.max(1),
        }
    }

    /// Walk the server and build the grouped recording set
    ///
    /// Folders excluded by `criteria` are never browsed. A folder whose browse
    /// fails is kept with its error; only failing to list the folders at all
    /// is an error.
    pub async fn walk(&self, criteria: &FilterCriteria) -> Result<RecordingSet> {
        let folders: Vec<Container> = self
            .show_folders()
            .await?
            .into_iter()
            .filter(|folder| {
                let allowed = folder_allowed(folder, criteria);
                if !allowed {
                    debug!("Pruned folder {}", folder.title);
                }
                allowed
            })
            .collect();

        if criteria.shows_only {
            info!("Listing {} show(s) without their recordings", folders.len());
            return Ok(RecordingSet::new(
                folders.into_iter().map(|f| Show::new(f, Vec::new())).collect(),
            ));
        }

        if criteria.recording_in_progress_only
            && !criteria.has_folder_filter()
            && criteria.title_include.is_empty()
        {
            info!(
                "Checking every folder for recordings in progress ({} folders), this can take a while",
                folders.len()
            );
        }

        Ok(RecordingSet::new(self.expand(folders).await))
    }

    /// Top-level show folders, in server order
    pub async fn show_folders(&self) -> Result<Vec<Container>> {
        let root = containers(self.browser.browse(ROOT_CONTAINER_ID).await?);

        match root.iter().find(|c| c.title == RECORDINGS_FOLDER) {
            Some(recordings) => {
                debug!("Found {} folder ({})", RECORDINGS_FOLDER, recordings.id);
                Ok(containers(self.browser.browse(&recordings.id).await?))
            }
            None => {
                warn!("No {} folder on the server, using the root folders", RECORDINGS_FOLDER);
                Ok(root)
            }
        }
    }

    /// Browse every folder on a bounded pool and return shows in folder order
    async fn expand(&self, folders: Vec<Container>) -> Vec<Show> {
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (idx, folder) in folders.iter().cloned().enumerate() {
            let browser = Arc::clone(&self.browser);
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await;
                let show = browse_show(browser.as_ref(), folder).await;
                (idx, show)
            });
        }

        let mut slots: Vec<Option<Show>> = vec![None; folders.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, show)) => slots[idx] = Some(show),
                Err(e) => warn!("Folder browse task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(folders)
            .map(|(slot, folder)| {
                slot.unwrap_or_else(|| Show::failed(folder, "browse task aborted"))
            })
            .collect()
    }
}

/// Browse one folder, turning a failure into a per-folder error
async fn browse_show(browser: &dyn ContentBrowser, folder: Container) -> Show {
    match browser.browse(&folder.id).await {
        Ok(nodes) => {
            let items = items_in(&folder, nodes);
            debug!("{}: {} recording(s)", folder.title, items.len());
            Show::new(folder, items)
        }
        Err(e) => {
            warn!("Failed to browse folder {}: {}", folder.title, e);
            Show::failed(folder, e.to_string())
        }
    }
}

fn containers(nodes: Vec<Node>) -> Vec<Container> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            Node::Container(c) => Some(c),
            Node::Item(_) => None,
        })
        .collect()
}

fn items_in(folder: &Container, nodes: Vec<Node>) -> Vec<Item> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            Node::Item(mut item) => {
                item.parent_folder = folder.title.clone();
                Some(item)
            }
            Node::Container(c) => {
                debug!("Ignoring nested folder {} in {}", c.title, folder.title);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fetchtv_core::{FetchError, ItemKind};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// In-memory server: container id -> children, plus ids that fail
    #[derive(Default)]
    struct FakeServer {
        children: HashMap<String, Vec<Node>>,
        failing: Vec<String>,
        browsed: Mutex<Vec<String>>,
    }

    impl FakeServer {
        fn folder(mut self, parent: &str, id: &str, title: &str) -> Self {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(Node::Container(Container {
                    id: id.to_string(),
                    parent_id: parent.to_string(),
                    title: title.to_string(),
                    child_count: None,
                }));
            self
        }

        fn item(mut self, parent: &str, id: &str, title: &str, recording: bool) -> Self {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(Node::Item(Item {
                    id: id.to_string(),
                    parent_id: parent.to_string(),
                    title: title.to_string(),
                    parent_folder: String::new(),
                    url: format!("http://box/{}.mpeg", id),
                    size_bytes: Some(10),
                    duration_seconds: Some(60),
                    kind: ItemKind::from_title(title),
                    description: String::new(),
                    is_recording: recording,
                }));
            self
        }

        fn failing(mut self, id: &str) -> Self {
            self.failing.push(id.to_string());
            self
        }

        fn browsed(&self) -> Vec<String> {
            self.browsed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentBrowser for FakeServer {
        async fn browse(&self, container_id: &str) -> Result<Vec<Node>> {
            self.browsed.lock().unwrap().push(container_id.to_string());
            // Finish out of order to exercise re-sorting
            tokio::time::sleep(Duration::from_millis(fastrand::u64(0..15))).await;
            if self.failing.iter().any(|id| id == container_id) {
                return Err(FetchError::protocol("connection reset"));
            }
            Ok(self.children.get(container_id).cloned().unwrap_or_default())
        }
    }

    fn fetch_box() -> FakeServer {
        FakeServer::default()
            .folder("0", "1", "Photos")
            .folder("0", "2", "Recordings")
            .folder("2", "10", "2 Broke Girls")
            .folder("2", "11", "News")
            .folder("2", "12", "Movies")
            .item("10", "100", "S4 E12", false)
            .item("10", "101", "S4 E13", false)
            .item("10", "102", "S4 E14", false)
            .item("11", "110", "Late News", true)
            .item("12", "120", "The Matrix", false)
    }

    fn folder_titles(set: &RecordingSet) -> Vec<&str> {
        set.shows.iter().map(|s| s.folder.title.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_preserves_server_order() {
        let walker = Walker::new(Arc::new(fetch_box()), 3);
        let set = walker.walk(&FilterCriteria::default()).await.unwrap();

        assert_eq!(folder_titles(&set), vec!["2 Broke Girls", "News", "Movies"]);
        let girls: Vec<&str> = set.shows[0].items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(girls, vec!["S4 E12", "S4 E13", "S4 E14"]);
        assert!(set.items().all(|(f, i)| i.parent_folder == f.title));
    }

    #[tokio::test]
    async fn test_excluded_folders_are_not_browsed() {
        let server = Arc::new(fetch_box());
        let walker = Walker::new(server.clone(), 2);
        let criteria = FilterCriteria {
            folder_exclude: vec!["news".to_string()],
            ..Default::default()
        };
        let set = walker.walk(&criteria).await.unwrap();

        assert_eq!(folder_titles(&set), vec!["2 Broke Girls", "Movies"]);
        assert!(!server.browsed().contains(&"11".to_string()));
    }

    #[tokio::test]
    async fn test_shows_only_never_fetches_children() {
        let server = Arc::new(fetch_box());
        let walker = Walker::new(server.clone(), 2);
        let criteria = FilterCriteria {
            shows_only: true,
            ..Default::default()
        };
        let set = walker.walk(&criteria).await.unwrap();

        assert_eq!(set.shows.len(), 3);
        assert_eq!(set.item_count(), 0);
        assert_eq!(server.browsed(), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn test_failed_folder_does_not_abort_walk() {
        let walker = Walker::new(Arc::new(fetch_box().failing("11")), 4);
        let set = walker.walk(&FilterCriteria::default()).await.unwrap();

        assert_eq!(folder_titles(&set), vec!["2 Broke Girls", "News", "Movies"]);
        let failed: Vec<&str> = set.failed_folders().map(|s| s.folder.title.as_str()).collect();
        assert_eq!(failed, vec!["News"]);
        assert_eq!(set.item_count(), 4);
    }

    #[tokio::test]
    async fn test_root_failure_is_fatal() {
        let walker = Walker::new(Arc::new(fetch_box().failing("0")), 1);
        assert!(walker.walk(&FilterCriteria::default()).await.is_err());
    }

    #[tokio::test]
    async fn test_root_folders_used_without_recordings_folder() {
        let server = FakeServer::default()
            .folder("0", "7", "Sport")
            .item("7", "70", "Cricket", false);
        let set = Walker::new(Arc::new(server), 1)
            .walk(&FilterCriteria::default())
            .await
            .unwrap();
        assert_eq!(folder_titles(&set), vec!["Sport"]);
        assert_eq!(set.item_count(), 1);
    }
}
