use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use log::{error, info};
use split_downloader::download::logger::setup_logger;
use split_downloader::download::{Config, DownloadCoordinator, DownloadError, DownloadRequest};

use crate::cli::CliArgs;
use crate::progress_bar::ProgressBar;

mod cli;
mod progress_bar;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    if let Err(err) = setup_logger(args.log_level, args.log_file.as_deref()) {
        eprintln!("Logger setup failed: {:#}", err);
    }

    match run(args).await {
        Ok(()) => {}
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Download failed: {:#}", err);
            if let Some(download_err) = err.downcast_ref::<DownloadError>() {
                for range in download_err.incomplete_ranges() {
                    eprintln!("  unfinished range {}", range);
                }
            }
            std::process::exit(1);
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };

    let mut options = config.options()?;
    for header in &args.headers {
        options.insert_raw_header(header)?;
    }
    if let Some(retry) = args.retry {
        options.retry_count = retry;
    }

    let request = DownloadRequest::new(
        &args.url,
        args.file_name.clone(),
        args.dir.clone().or(config.download_dir.clone()),
        args.split.unwrap_or(config.split_count),
    )?;
    info!(
        "Downloading {} to {} in {} ranges",
        request.url(),
        request.file_path().display(),
        request.split_count()
    );

    let coordinator = DownloadCoordinator::new(request, options);

    let cancel_token = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, saving positions");
            cancel_token.cancel();
        }
    });

    let progress_handle = (!args.no_progress).then(|| {
        let mut stream = Box::pin(coordinator.progress_stream());
        tokio::spawn(async move {
            let mut bar = ProgressBar::new(100);
            while let Some(progress) = stream.next().await {
                if bar.print(progress).is_err() {
                    break;
                }
            }
            let _ = bar.finish();
        })
    });

    let result = coordinator.start().await;
    drop(coordinator);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let summary = result.context("Download did not complete")?;
    println!(
        "Downloaded {} ({} bytes, {} ranges{}) in {:.2?}",
        summary.file_path.display(),
        summary.total_len,
        summary.chunk_count,
        if summary.resumed { ", resumed" } else { "" },
        summary.elapsed
    );

    Ok(())
}
