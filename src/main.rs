use journal_insight::analysis::{EmotionMode, NormalizeOptions, Normalizer, SummaryMode};
use journal_insight::config::Config;
use journal_insight::gateway;
use journal_insight::logs::RotatingFileLayer;
use journal_insight::service::JournalService;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "journal-insight", version, about = "Diary analysis service")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP gateway (default)
    Serve {
        /// Bind address, overrides server.addr and JOURNAL_ADDR
        #[arg(long)]
        addr: Option<String>,
    },
    /// Run one analysis end-to-end and print the result
    Analyze {
        /// Diary text
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        text: Option<String>,
        /// Read the diary text from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Identity the session is bound to
        #[arg(long)]
        user: Option<String>,
    },
    /// Normalize a saved model reply offline (reads stdin without --file)
    Parse {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, value_enum)]
        emotion_mode: Option<EmotionArg>,
        #[arg(long, value_enum)]
        summary_mode: Option<SummaryArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EmotionArg {
    Preserve,
    Flattened,
    Structured,
}

impl From<EmotionArg> for EmotionMode {
    fn from(a: EmotionArg) -> Self {
        match a {
            EmotionArg::Preserve => EmotionMode::Preserve,
            EmotionArg::Flattened => EmotionMode::Flattened,
            EmotionArg::Structured => EmotionMode::Structured,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SummaryArg {
    Preserve,
    Joined,
    Sentences,
}

impl From<SummaryArg> for SummaryMode {
    fn from(a: SummaryArg) -> Self {
        match a {
            SummaryArg::Preserve => SummaryMode::Preserve,
            SummaryArg::Joined => SummaryMode::Joined,
            SummaryArg::Sentences => SummaryMode::Sentences,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut cfg = Config::load(&config_path).await?;

    // Initialize tracing with layered subscriber (fmt + optional log file).
    // The guard flushes the file writer on exit.
    let _log_guard = {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

        let (file_layer, guard) = match &cfg.log.file {
            Some(path) => {
                let (layer, guard) =
                    RotatingFileLayer::new(path, cfg.log.max_bytes, cfg.log.backups)
                        .with_context(|| format!("failed to open log file: {}", path.display()))?;
                (Some(layer), Some(guard))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .with(file_layer)
            .init();
        guard
    };

    match cli.command.unwrap_or(Command::Serve { addr: None }) {
        Command::Serve { addr } => {
            if let Some(addr) = addr {
                cfg.server.addr = addr;
            }
            serve(cfg).await
        }
        Command::Analyze { text, file, user } => {
            let text = match (text, file) {
                (Some(t), _) => t,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("either --text or --file is required"),
            };
            let creds = cfg.credentials(|k| std::env::var(k).ok())?;
            let service = JournalService::from_config(&cfg, &creds).await?;
            let result = service.review(user.as_deref(), &text).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Command::Parse {
            file,
            emotion_mode,
            summary_mode,
        } => {
            let raw = match file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    tokio::io::stdin()
                        .read_to_string(&mut buf)
                        .await
                        .context("failed to read stdin")?;
                    buf
                }
            };
            let defaults = cfg.analysis.normalize_options();
            let options = NormalizeOptions {
                emotion: emotion_mode.map(Into::into).unwrap_or(defaults.emotion),
                summary: summary_mode.map(Into::into).unwrap_or(defaults.summary),
            };
            let analysis = Normalizer::new(options).normalize(&raw)?;
            info!(dialect = %analysis.dialect, "reply parsed");
            println!("{}", serde_json::to_string_pretty(&analysis.result)?);
            Ok(())
        }
    }
}

async fn serve(cfg: Config) -> anyhow::Result<()> {
    cfg.validate()?;
    let creds = cfg.credentials(|k| std::env::var(k).ok())?;
    let addr = cfg.bind_addr()?;

    info!(
        %addr,
        model = %creds.model,
        base_url = %cfg.model.base_url,
        "starting journal-insight"
    );

    let service = Arc::new(JournalService::from_config(&cfg, &creds).await?);
    let gw = gateway::start_gateway(addr, service, gateway::api_token_from_env())
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    gw.stop().await;
    Ok(())
}
