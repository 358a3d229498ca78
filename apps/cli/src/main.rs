mod cli;
mod config;
mod output;
mod progress;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use cli::Args;
use config::AppConfig;
use fetchtv_core::Server;
use fetchtv_dlna::{discover, server_at, FetchContext, FetchSession, SaveRequest};
use progress::BarProgress;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(&args).await {
        if args.json {
            println!("{}", output::render_error(&format!("{:#}", e)));
        } else {
            error!("{:#}", e);
        }
        std::process::exit(1);
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable
fn init_logging(verbose: bool, quiet: bool) {
    let default_filter = if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(args: &Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(secs) = args.discovery_timeout {
        config.discovery_timeout_secs = secs;
    }

    print_heading(args, &format!("Started: {}", Local::now().format("%Y-%m-%d %H:%M:%S")));

    let ctx = FetchContext::new(config.http_config()).context("Failed to create HTTP clients")?;
    let server = locate_server(&ctx, args, &config).await?;
    let mut session = FetchSession::new(&ctx, server);
    if args.shows_progress() {
        session = session.with_progress(Arc::new(BarProgress::new()));
    }

    if args.info {
        print!("{}", output::render_server(session.info(), args.json)?);
    }

    if args.wants_listing() {
        run_listing(&session, args, &config).await?;
    } else if !args.info {
        info!("Nothing to do, pass --info, --recordings, --shows or --isrecording");
    }

    print_heading(args, &format!("Done: {}", Local::now().format("%Y-%m-%d %H:%M:%S")));
    Ok(())
}

async fn locate_server(ctx: &FetchContext, args: &Args, config: &AppConfig) -> Result<Server> {
    match args.ip {
        Some(ip) => server_at(ctx, ip, Some(config.port))
            .await
            .with_context(|| format!("No Fetch TV server at {}:{}", ip, config.port)),
        None => {
            info!("Starting discovery");
            let server = discover(ctx, config.discovery_timeout())
                .await
                .context("Discovery failed, try --ip")?;
            info!("Discovery successful: {}", server.location);
            Ok(server)
        }
    }
}

async fn run_listing(session: &FetchSession, args: &Args, config: &AppConfig) -> Result<()> {
    let criteria = args.criteria();

    if args.shows {
        if args.save.is_some() {
            warn!("--save is ignored with --shows");
        }
        if args.new_only || !args.title.is_empty() {
            warn!("--new and --title do not apply to --shows");
        }
        let set = session.shows(&criteria).await?;
        print_heading(args, "List shows");
        print!("{}", output::render_recordings(&set, args.json)?);
        return Ok(());
    }

    let save = args.save.as_ref().map(|root| SaveRequest {
        overwrite: args.overwrite,
        deadline: config.download_deadline(),
        ..SaveRequest::new(root)
    });
    if save.is_some() {
        print_heading(args, "Saving recordings");
    }

    let listing = if args.isrecording {
        session.is_recording(&criteria, save.as_ref()).await?
    } else {
        session.recordings(&criteria, save.as_ref()).await?
    };

    for show in listing.set.failed_folders() {
        warn!(
            "Could not list {}: {}",
            show.folder.title,
            show.error.as_deref().unwrap_or_default()
        );
    }

    match &listing.reports {
        Some(reports) => print!("{}", output::render_save_results(reports, args.json)?),
        None => {
            print_heading(args, "List recordings");
            print!("{}", output::render_recordings(&listing.set, args.json)?);
        }
    }
    Ok(())
}

fn print_heading(args: &Args, title: &str) {
    if !args.json && !args.quiet {
        println!("{}", output::heading(title));
    }
}
