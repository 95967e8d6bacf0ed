use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gal_player::engine::transcript_io::load_transcript;
use gal_player::model::snapshot::SessionBootstrap;
use gal_player::ui::app::VnApp;
use gal_player::ui::settings_io::load_settings;

#[derive(Parser)]
#[command(name = "gal-player")]
#[command(about = "Play a chat transcript as a visual novel")]
struct Cli {
    /// Transcript to open (JSON or chat-host JSONL export)
    transcript: Option<PathBuf>,

    /// OpenAI-compatible API base URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Model name sent with each request
    #[arg(long)]
    model: Option<String>,

    /// Use one blocking request per reply instead of streaming
    #[arg(long)]
    no_stream: bool,

    /// Start from the first page instead of the saved position
    #[arg(long)]
    new_game: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(endpoint) = cli.endpoint {
        settings.llm.endpoint = endpoint;
    }
    if let Some(model) = cli.model {
        settings.llm.model = model;
    }
    if cli.no_stream {
        settings.llm.stream = false;
    }

    let opened = match cli.transcript {
        Some(path) => {
            let transcript = load_transcript(&path)
                .with_context(|| format!("could not open {}", path.display()))?;
            Some((transcript, path))
        }
        None => None,
    };
    let bootstrap = if cli.new_game {
        SessionBootstrap::NewGame
    } else {
        SessionBootstrap::default()
    };

    let options = eframe::NativeOptions::default();

    eframe::run_native(
        "Gal Player",
        options,
        Box::new(move |_cc| Ok(Box::new(VnApp::new(settings, opened, bootstrap)))),
    )
    .map_err(|e| anyhow!("{e}"))
}
