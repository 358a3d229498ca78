/// Fetch TV DLNA/UPnP client
///
/// This crate provides:
/// - Server discovery via SSDP, or from a known address
/// - Device description parsing with quick-xml
/// - ContentDirectory `Browse` over SOAP and DIDL-Lite parsing
/// - Walking the show folders into a recording set
/// - Saving recordings to disk
pub mod content_directory;
pub mod context;
pub mod didl;
pub mod discovery;
pub mod download;
pub mod session;
pub mod walker;
pub mod xml_parser;

pub use content_directory::{BrowsePage, ContentDirectory};
pub use context::{FetchContext, HttpConfig};
pub use didl::parse_didl;
pub use discovery::{discover, server_at, server_from_location};
pub use download::{
    detect_in_progress, save_item, DownloadOptions, Downloader, HttpPayloadSource,
};
pub use session::{FetchSession, Listing, SaveRequest};
pub use walker::{Walker, RECORDINGS_FOLDER};
pub use xml_parser::{parse_device_description, DeviceDescription, DeviceService};
