//! primus-chat terminal chat client entry point.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Parse CLI flags, load config, apply flag overrides
//!   3. Init logger
//!   4. Build the provider chain (credential problems fail here)
//!   5. Run the console until /quit, EOF or Ctrl-C

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use primus_chat::chat::ChatSession;
use primus_chat::config;
use primus_chat::console::{self, ConsoleOptions};
use primus_chat::error::{AppError, ChatError};
use primus_chat::llm::providers;
use primus_chat::logger;
use primus_chat::session::Transcript;

#[derive(Debug, Parser)]
#[command(name = "primus-chat", version, about = "Chat with an LLM from the terminal")]
struct Cli {
    /// Path to configuration file (default: config/default.toml)
    #[arg(short = 'f', long = "config")]
    config: Option<String>,

    /// Increase logging verbosity (-v warn, -vv info, -vvv debug, -vvvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Backend to use: openai, bridge or dummy
    #[arg(long)]
    backend: Option<String>,

    /// Model id to start with
    #[arg(long)]
    model: Option<String>,

    /// Request whole replies instead of streaming
    #[arg(long)]
    no_stream: bool,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = config::load(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.llm.provider = backend;
    }
    if let Some(model) = cli.model {
        config.chat.parameters.set_model(model)?;
    }
    if cli.no_stream {
        config.llm.openai.stream = false;
    }

    let cli_level = logger::verbosity_level(cli.verbose);
    let effective_log_level = cli_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, cli_level.is_some(), config.log_file.as_deref())?;

    info!(
        backend = %config.llm.provider,
        model = %config.chat.parameters.model(),
        configured_log_level = %config.log_level,
        effective_log_level = %effective_log_level,
        "config loaded"
    );

    let chain = providers::build(&config.llm, config.llm_api_key.clone()).map_err(ChatError::from)?;

    console::print_banner(config.ui.banner.as_deref());

    let transcript = Transcript::initialize(config.chat.system_prompt.clone(), config.chat.parameters.clone());
    let session = ChatSession::new(transcript, chain, config.llm.openai.stream);

    let shutdown = CancellationToken::new();
    let ctrlc_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            ctrlc_token.cancel();
        }
    });

    let options = ConsoleOptions {
        export_dir: config.export.dir.clone(),
        export_name: config.export.name.clone(),
    };
    console::run(session, options, shutdown).await
}
