//! Command-line front end for the conversion server.
//!
//! Drives the same session transitions an interactive front end would:
//! select a file, adjust options, submit, then save the returned file.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use convert_server::client::{ConversionClient, Upload};
use convert_server::options::{ImageFormat, PageSize};
use convert_server::session::{
    reduce, Event, PendingRequest, PreviewRegistry, SessionState, Tab,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "convert", version, about = "Convert SVG to PNG/JPEG and Markdown to PDF")]
struct Cli {
    /// Base URL of the conversion server.
    #[arg(long, env = "CONVERT_SERVER_URL", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Where to write the converted file. Defaults to the server-suggested
    /// name in the current directory.
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterize an SVG file.
    Svg {
        file: PathBuf,
        #[arg(long, default_value = "png")]
        format: ImageFormat,
        /// Output width in pixels; height follows while the ratio is locked.
        #[arg(long)]
        width: Option<i64>,
        /// Output height in pixels; width follows while the ratio is locked.
        #[arg(long)]
        height: Option<i64>,
        /// JPEG quality 1-100.
        #[arg(long)]
        quality: Option<u8>,
        /// Edit width and height independently.
        #[arg(long)]
        unlock: bool,
    },
    /// Render a Markdown file to PDF.
    Markdown {
        file: PathBuf,
        #[arg(long, default_value = "A4")]
        page_size: PageSize,
        /// Custom page width in millimetres (implies `--page-size custom`).
        #[arg(long)]
        width: Option<u32>,
        /// Custom page height in millimetres (implies `--page-size custom`).
        #[arg(long)]
        height: Option<u32>,
        /// Print the page estimate and exit without converting.
        #[arg(long)]
        estimate_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    convert_server::telemetry::init_logging();

    let cli = Cli::parse();
    let client = ConversionClient::new(&cli.server);
    let previews = PreviewRegistry::new();

    let (tab, file) = match &cli.command {
        Command::Svg { file, .. } => (Tab::Svg, file),
        Command::Markdown { file, .. } => (Tab::Markdown, file),
    };

    let mut state = reduce(SessionState::default(), Event::TabSelected(tab));
    state = select_file(state, file, &previews).await?;

    match cli.command {
        Command::Svg {
            format,
            width,
            height,
            quality,
            unlock,
            ..
        } => {
            if unlock {
                state = reduce(state, Event::LockToggled);
            }
            state = reduce(state, Event::FormatChanged(format));
            if let Some(width) = width {
                state = reduce(state, Event::WidthChanged(width));
            }
            if let Some(height) = height {
                state = reduce(state, Event::HeightChanged(height));
            }
            if let Some(quality) = quality {
                state = reduce(state, Event::QualityChanged(quality));
            }
            info!(
                "Output size: {}x{}",
                state.svg.size.width, state.svg.size.height
            );
        }
        Command::Markdown {
            page_size,
            width,
            height,
            estimate_only,
            ..
        } => {
            state = reduce(state, Event::PageSizeChanged(page_size));
            if let Some(width) = width {
                state = reduce(state, Event::CustomWidthChanged(width));
            }
            if let Some(height) = height {
                state = reduce(state, Event::CustomHeightChanged(height));
            }
            println!("Estimated pages: {}", state.estimate);
            if estimate_only {
                return Ok(());
            }
        }
    }

    state = submit(state, &client).await;

    if let Some(error) = &state.error {
        bail!("{}", error);
    }
    let Some(data) = &state.result else {
        bail!("Nothing to convert");
    };

    let bytes = data.decode().context("Server returned an unreadable payload")?;
    let target = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(&data.filename));
    tokio::fs::write(&target, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    match data.pages {
        Some(pages) => println!("Wrote {} ({} bytes, {} pages)", target.display(), data.size, pages),
        None => println!("Wrote {} ({} bytes)", target.display(), data.size),
    }
    Ok(())
}

async fn select_file(
    state: SessionState,
    path: &Path,
    previews: &PreviewRegistry,
) -> Result<SessionState> {
    let upload = Upload::from_path(path).await?;
    let limits = Default::default();

    let state = match upload.validate(state.tab.category(), &limits) {
        Ok(()) => reduce(
            state,
            Event::FileSelected {
                upload,
                preview: previews.acquire(),
            },
        ),
        Err(err) => reduce(state, Event::FileRejected(err)),
    };

    if let Some(error) = &state.error {
        bail!("{}: {}", path.display(), error);
    }
    Ok(state)
}

async fn submit(state: SessionState, client: &ConversionClient) -> SessionState {
    let state = reduce(state, Event::ConversionStarted);
    if !state.busy {
        return reduce(state, Event::ConversionFailed("Nothing to convert".into()));
    }

    let request = state.pending_request();
    debug!(?request, "Submitting to {}", client.base_url());

    let outcome = match (state.file.as_ref(), request) {
        (Some(upload), Some(PendingRequest::Svg(options))) => {
            client.convert_svg(upload, &options).await.map_err(|e| e.to_string())
        }
        (Some(upload), Some(PendingRequest::Markdown(options))) => client
            .convert_markdown(upload, &options)
            .await
            .map_err(|e| e.to_string()),
        _ => Err("Nothing to convert".to_string()),
    };

    match outcome {
        Ok(result) => reduce(state, Event::ConversionFinished(result)),
        Err(message) => reduce(state, Event::ConversionFailed(message)),
    }
}
