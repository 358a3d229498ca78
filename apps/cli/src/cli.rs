use clap::Parser;
use fetchtv_core::FilterCriteria;
use std::net::IpAddr;
use std::path::PathBuf;

/// List and save recordings from a Fetch TV box
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Attempts auto-discovery and returns the Fetch server's details
    #[arg(long)]
    pub info: bool,

    /// List or save recordings
    #[arg(long)]
    pub recordings: bool,

    /// List the names of shows with available recordings
    #[arg(long)]
    pub shows: bool,

    /// List any items that are currently recording
    #[arg(long)]
    pub isrecording: bool,

    /// IP address of the Fetch server, if auto-discovery fails
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Port of the Fetch server, if auto-discovery fails
    #[arg(long)]
    pub port: Option<u16>,

    /// Save and overwrite any existing files
    #[arg(long)]
    pub overwrite: bool,

    /// Save recordings to the specified path
    #[arg(long, value_name = "PATH")]
    pub save: Option<PathBuf>,

    /// Only return recordings where the folder contains the text (repeatable, comma separated)
    #[arg(long, value_name = "TEXT", value_delimiter = ',')]
    pub folder: Vec<String>,

    /// Don't return folders containing the text (repeatable, comma separated)
    #[arg(long, value_name = "TEXT", value_delimiter = ',')]
    pub exclude: Vec<String>,

    /// Only return recordings where the title contains the text (repeatable, comma separated)
    #[arg(long, value_name = "TEXT", value_delimiter = ',')]
    pub title: Vec<String>,

    /// Only return recordings not already saved under --save
    #[arg(long = "new")]
    pub new_only: bool,

    /// Output show/recording/save results in JSON
    #[arg(long)]
    pub json: bool,

    /// Config file (defaults to the user config directory)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Seconds to wait for SSDP discovery
    #[arg(long, value_name = "SECS")]
    pub discovery_timeout: Option<u64>,

    /// Debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Any command that needs a walk of the server
    pub fn wants_listing(&self) -> bool {
        self.recordings || self.shows || self.isrecording
    }

    /// Progress bars only when saving to an interactive, non-JSON run
    pub fn shows_progress(&self) -> bool {
        self.save.is_some() && !self.shows && !self.json && !self.quiet
    }

    pub fn criteria(&self) -> FilterCriteria {
        FilterCriteria {
            folder_include: clean_terms(&self.folder),
            folder_exclude: clean_terms(&self.exclude),
            title_include: clean_terms(&self.title),
            new_only: self.new_only,
            shows_only: self.shows,
            recording_in_progress_only: self.isrecording,
        }
    }
}

fn clean_terms(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
