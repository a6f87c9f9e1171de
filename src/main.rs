mod cli;
mod openai_client;
mod settings;

use std::io;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use eyre::Result;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use crate::cli::chat::ChatContext;
use crate::cli::chat::conversation_state::Conversation;
use crate::openai_client::OpenAiClient;
use crate::settings::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    chat: ChatArgs,
}

#[derive(clap::Args)]
struct ChatArgs {
    /// Send a single message and exit
    #[arg(short, long)]
    input: Option<String>,

    /// Model to request (overrides CHATUI_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Number of candidate answers to request (overrides CHATUI_CANDIDATES)
    #[arg(short = 'n', long)]
    candidates: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a chat session
    Chat(ChatArgs),
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment variables from .env file
    dotenv().ok();

    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Chat(args)) => args,
        None => cli.chat,
    };

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let settings =
        Settings::from_env().and_then(|s| s.with_overrides(args.model, args.candidates));
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let client = OpenAiClient::new(&settings)?;
    info!(
        model = %settings.model,
        candidates = settings.candidates,
        endpoint = client.endpoint(),
        "Starting chatui"
    );

    let conversation = Conversation::with_model(client, settings.model.clone());

    let mut chat_context = ChatContext::new(
        Box::new(io::stdout()),
        args.input,
        true,
        conversation,
    );
    chat_context.run().await
}
