use async_trait::async_trait;
use clap::{Parser, Subcommand};
use nlbot::analysis::HttpAnalysisClient;
use nlbot::bot::{Bot, TurnContext};
use nlbot::channels::{
    ChannelAccount, ConversationAccount, ConversationRef, MessageSender, TransportError,
};
use nlbot::dispatch::{Dispatcher, LogTrace};
use nlbot::message::OutboundMessage;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "nlsql-bot")]
#[command(about = "NL-SQL chat bot", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Run the bot's messaging endpoint (POST /api/messages) until Ctrl+C.
    Serve {
        /// Config file path (default: NLSQL_BOT_CONFIG or ~/.nlsql-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config, BOT_PORT, or 3978)
        #[arg(long, short)]
        port: Option<u16>,

        /// Analysis service URL (default from config, NLAPIURL, or http://localhost:8000/nlsql-analyzer)
        #[arg(long, value_name = "URL")]
        analysis_url: Option<String>,

        /// Trace answers and rendered messages
        #[arg(long)]
        debug: bool,
    },

    /// Send one question to the analysis service and print the activities the bot would send.
    Ask {
        /// Config file path (default: NLSQL_BOT_CONFIG or ~/.nlsql-bot/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Channel id passed to the analysis service
        #[arg(long, default_value = "cli")]
        channel: String,

        /// Question text
        text: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("nlsql-bot {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Serve {
            config,
            port,
            analysis_url,
            debug,
        }) => run_serve(config, port, analysis_url, debug).await,
        Some(Commands::Ask {
            config,
            channel,
            text,
        }) => run_ask(config, channel, text).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}

async fn run_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    analysis_url: Option<String>,
    debug: bool,
) -> anyhow::Result<()> {
    let (mut config, path) = nlbot::config::load_config(config_path)?;
    if let Some(p) = port {
        config.server.port = p;
    }
    if analysis_url.is_some() {
        config.analysis.url = analysis_url;
    }
    config.debug |= debug;
    init_logging(config.debug);
    log::info!(
        "starting bot on {}:{} (config {})",
        config.server.bind,
        config.server.port,
        path.display()
    );
    nlbot::gateway::run_gateway(config).await
}

/// Prints each outbound message as the activity JSON the connector would receive.
struct StdoutSender;

#[async_trait]
impl MessageSender for StdoutSender {
    async fn send(
        &self,
        conversation: &ConversationRef,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let activity = conversation.reply(message);
        match serde_json::to_string_pretty(&activity) {
            Ok(s) => println!("{}", s),
            Err(e) => log::warn!("could not render {} activity: {}", message.kind(), e),
        }
        Ok(())
    }
}

async fn run_ask(config_path: Option<PathBuf>, channel: String, text: String) -> anyhow::Result<()> {
    let (config, _) = nlbot::config::load_config(config_path)?;
    init_logging(config.debug);
    let analysis = HttpAnalysisClient::new(Some(nlbot::config::resolve_analysis_url(&config)));
    let bot = Bot::new(
        Arc::new(analysis),
        Dispatcher::new(Arc::new(LogTrace::new(config.debug))),
    );
    let conversation = ConversationRef {
        channel_id: channel,
        service_url: "http://localhost".to_string(),
        conversation: ConversationAccount {
            id: "cli".to_string(),
            extra: Default::default(),
        },
        bot: ChannelAccount::new("bot"),
        user: ChannelAccount::new("user"),
        activity_id: None,
    };
    let sender = StdoutSender;
    let ctx = TurnContext::new(conversation, &sender);
    bot.on_message(&ctx, &text).await?;
    Ok(())
}
