//! Text and JSON rendering of servers, listings and save results

use anyhow::Result;
use fetchtv_core::{DownloadReport, Outcome, RecordingSet, Server};
use std::fmt::Write as _;

pub fn heading(title: &str) -> String {
    format!("{:-^72}", format!(" {} ", title))
}

pub fn render_server(server: &Server, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(server)?);
    }

    let mut out = String::new();
    writeln!(out, "Name:         {}", server.friendly_name)?;
    writeln!(out, "Address:      {}", server.endpoint())?;
    writeln!(out, "Location:     {}", server.location)?;
    writeln!(out, "Control URL:  {}", server.control_url)?;
    if let Some(manufacturer) = &server.manufacturer {
        writeln!(out, "Manufacturer: {}", manufacturer)?;
    }
    if let Some(model) = &server.model {
        writeln!(out, "Model:        {}", model)?;
    }
    if let Some(udn) = &server.udn {
        writeln!(out, "UDN:          {}", udn)?;
    }
    Ok(out)
}

/// Folder tree with each item's URL, or the JSON listing
pub fn render_recordings(set: &RecordingSet, json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(set)?);
    }

    let mut out = String::new();
    if set.is_empty() {
        writeln!(out, "No recordings found!")?;
        return Ok(out);
    }

    writeln!(out, "Recordings")?;
    let last_show = set.shows.len() - 1;
    for (i, show) in set.shows.iter().enumerate() {
        let (branch, indent) = if i == last_show {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        writeln!(out, "{}📁 {}", branch, show.folder.title)?;

        if let Some(error) = &show.error {
            writeln!(out, "{}└── error: {}", indent, error)?;
            continue;
        }
        for (j, item) in show.items.iter().enumerate() {
            let leaf = if j + 1 == show.items.len() { "└── " } else { "├── " };
            let marker = if item.is_recording { " [recording]" } else { "" };
            writeln!(out, "{}{}{} ({}){}", indent, leaf, item.title, item.url, marker)?;
        }
    }
    Ok(out)
}

/// One line per download outcome, or the JSON result array
pub fn render_save_results(reports: &[DownloadReport], json: bool) -> Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(reports)?);
    }

    let mut out = String::new();
    if reports.is_empty() {
        writeln!(out, "There is nothing new to record")?;
        return Ok(out);
    }

    for report in reports {
        let title = &report.item.title;
        match &report.outcome {
            Outcome::Saved { path } => writeln!(out, "Saved [{}] to {}", title, path.display())?,
            Outcome::Skipped { reason } => writeln!(out, "Skipped [{}]: {}", title, reason)?,
            Outcome::Failed { reason } => writeln!(out, "Failed [{}]: {}", title, reason)?,
        }
    }

    let saved = reports.iter().filter(|r| r.outcome.is_saved()).count();
    writeln!(out, "{} of {} recording(s) saved", saved, reports.len())?;
    Ok(out)
}

/// Machine-readable fatal error for `--json`
pub fn render_error(message: &str) -> String {
    serde_json::json!({ "status": "error", "message": message }).to_string()
}
