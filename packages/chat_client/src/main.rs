use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use channel_mux::{ChannelMux, ConnectionState};
use chat_client::{ChatSession, ClientConfig, FileConfig, load_config};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

/// Upper bound on flushing queued frames before exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Terminal client for channel-based chat servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (missing file = defaults)
    #[arg(long, global = true, default_value = "chat.toml")]
    config: PathBuf,

    /// User id, overrides [identity] user_id
    #[arg(long, global = true)]
    user_id: Option<String>,

    /// Auth token, overrides [identity] token
    #[arg(long, global = true)]
    token: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a conversation and print its events until Ctrl-C
    Tail(TailArgs),

    /// Post one message to a conversation
    Send(SendArgs),
}

#[derive(Parser)]
struct TailArgs {
    #[arg(short, long)]
    conversation: String,
}

#[derive(Parser)]
struct SendArgs {
    #[arg(short, long)]
    conversation: String,

    /// Message text
    text: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "chat=debug,chat_client=debug,channel_mux=debug,info"
    } else {
        "chat=info,chat_client=info,channel_mux=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&cli.config)
        .extract()
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    let config = ClientConfig::from_file(&file_config)?;
    let (user_id, token) = config.credentials(cli.user_id.as_deref(), cli.token.as_deref())?;

    let mux = ChannelMux::new(config.endpoint.clone(), config.connector());
    let mut session = ChatSession::new(mux);
    info!(endpoint = %session.mux().endpoint(), user_id = %user_id, "connecting");
    session.start(&user_id, &token).await;
    session
        .wait_until_open(config.connect_timeout)
        .await
        .context("Failed to connect")?;

    let result = match cli.command {
        Commands::Tail(args) => tail(&mut session, &args.conversation).await,
        Commands::Send(args) => send(&mut session, &args.conversation, &args.text).await,
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, session.shutdown())
        .await
        .is_err()
    {
        warn!("socket did not close within {SHUTDOWN_GRACE:?}");
    }
    result
}

async fn tail(session: &mut ChatSession, conversation_id: &str) -> Result<()> {
    let conversation = session.open_conversation(conversation_id).await;

    conversation.on_new_message(|msg| {
        let sender = msg.sender_id.as_deref().unwrap_or("?");
        println!("[{sender}] {}", msg.text);
    });
    conversation.on_typing(|notice| {
        let who = notice.user_id.as_deref().unwrap_or("someone");
        if notice.active {
            println!("  {who} is typing...");
        }
    });
    conversation.on_read(|receipt| {
        let who = receipt.user_id.as_deref().unwrap_or("someone");
        println!("  {who} read {}", receipt.message_id);
    });

    let mut state = session.mux().watch_state();
    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
        _ = state.wait_for(|s| *s == ConnectionState::Closed) => {
            warn!("connection closed by server");
        }
    }
    Ok(())
}

async fn send(session: &mut ChatSession, conversation_id: &str, text: &str) -> Result<()> {
    let conversation = session.open_conversation(conversation_id).await;
    if !conversation.send_message(text) {
        anyhow::bail!("Connection closed before the message was sent");
    }
    info!(conversation_id = conversation.id(), "message sent");
    Ok(())
}
