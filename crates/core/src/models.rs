use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::OnceLock;

/// Content-Length the box reports for a recording that is still being written
pub const RECORDING_IN_PROGRESS_SIZE: u64 = 4_398_046_510_080;

/// Default UPnP port of the Fetch TV media server
pub const DEFAULT_PORT: u16 = 49152;

/// Well-known ContentDirectory identifier of the root container
pub const ROOT_CONTAINER_ID: &str = "0";

/// A Fetch TV media server, either discovered via SSDP or built from an operator-supplied address
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub address: IpAddr,
    pub port: u16,
    /// ContentDirectory control endpoint (absolute URL)
    pub control_url: String,
    pub friendly_name: String,
    /// URL of the device description document
    pub location: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub manufacturer_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub udn: Option<String>,
}

impl Server {
    /// `address:port` identity of the server
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// A browsable grouping node (show or folder)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    pub title: String,
    #[serde(default)]
    pub child_count: Option<u32>,
}

/// Whether a recording is an episode of a series or a standalone movie
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Episode,
    Movie,
}

impl ItemKind {
    /// Episodes are titled `S<season> E<episode>...` by the box
    pub fn from_title(title: &str) -> Self {
        static EPISODE: OnceLock<Regex> = OnceLock::new();
        let re = EPISODE.get_or_init(|| Regex::new(r"^S\d+ E\d+").expect("valid episode pattern"));
        if re.is_match(title) {
            ItemKind::Episode
        } else {
            ItemKind::Movie
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Episode => "episode",
            ItemKind::Movie => "movie",
        }
    }
}

/// A leaf recording with a downloadable media resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default)]
    pub parent_id: String,
    pub title: String,
    /// Title of the folder (show) this recording lives in
    #[serde(rename = "folder", default)]
    pub parent_folder: String,
    #[serde(default)]
    pub url: String,
    /// `None` when the server omitted or mangled the size
    #[serde(rename = "size")]
    pub size_bytes: Option<u64>,
    /// `None` when the server omitted or mangled the duration
    #[serde(rename = "duration")]
    pub duration_seconds: Option<u64>,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_recording: bool,
}

/// A node returned by a ContentDirectory browse, classified once at the parse boundary
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Node {
    Container(Container),
    Item(Item),
}

impl Node {
    pub fn id(&self) -> &str {
        match self {
            Node::Container(c) => &c.id,
            Node::Item(i) => &i.id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Node::Container(c) => &c.title,
            Node::Item(i) => &i.title,
        }
    }
}

/// A folder together with the recordings found in it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Show {
    #[serde(flatten)]
    pub folder: Container,
    #[serde(default)]
    pub items: Vec<Item>,
    /// Set when browsing this folder failed; the rest of the listing is unaffected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Show {
    pub fn new(folder: Container, items: Vec<Item>) -> Self {
        Self {
            folder,
            items,
            error: None,
        }
    }

    pub fn failed(folder: Container, error: impl Into<String>) -> Self {
        Self {
            folder,
            items: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Grouped, ordered result of a hierarchy walk
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordingSet {
    pub shows: Vec<Show>,
}

impl RecordingSet {
    pub fn new(shows: Vec<Show>) -> Self {
        Self { shows }
    }

    pub fn is_empty(&self) -> bool {
        self.shows.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.shows.iter().map(|s| s.items.len()).sum()
    }

    /// Items in listing order, paired with their folder
    pub fn items(&self) -> impl Iterator<Item = (&Container, &Item)> {
        self.shows
            .iter()
            .flat_map(|show| show.items.iter().map(move |item| (&show.folder, item)))
    }

    pub fn failed_folders(&self) -> impl Iterator<Item = &Show> {
        self.shows.iter().filter(|s| s.error.is_some())
    }
}

/// Request-scoped listing/filter options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub folder_include: Vec<String>,
    pub folder_exclude: Vec<String>,
    pub title_include: Vec<String>,
    pub new_only: bool,
    pub shows_only: bool,
    pub recording_in_progress_only: bool,
}

impl FilterCriteria {
    /// True when any folder include/exclude term was supplied
    pub fn has_folder_filter(&self) -> bool {
        !self.folder_include.is_empty() || !self.folder_exclude.is_empty()
    }

    /// True when a predicate that looks at individual items is active
    pub fn has_item_filter(&self) -> bool {
        !self.title_include.is_empty() || self.new_only || self.recording_in_progress_only
    }
}

/// What to do with one item at download time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Save,
    Overwrite,
}

impl Decision {
    /// Existing file + no overwrite => skip; existing + overwrite => overwrite
    pub fn from_existing(exists: bool, overwrite: bool) -> Self {
        match (exists, overwrite) {
            (true, false) => Decision::Skip,
            (true, true) => Decision::Overwrite,
            (false, _) => Decision::Save,
        }
    }
}

/// Per-item result of the download executor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Saved { path: PathBuf },
    Skipped { reason: String },
    Failed { reason: String },
}

impl Outcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Outcome::Saved { .. })
    }
}

/// An item and what happened when we tried to save it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub item: Item,
    #[serde(flatten)]
    pub outcome: Outcome,
}
