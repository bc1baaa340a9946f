mod echo;

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use threadcard_core::{Config, ConfigBuilder, OutboundMessage, Pipeline, ThreadcardError, Transport, extractors};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Turn forum links in chat messages into summary cards
#[derive(Parser, Debug)]
#[command(name = "threadcard")]
#[command(version)]
#[command(about = "Turn forum links in chat messages into summary cards", long_about = None)]
struct Args {
    /// Chat messages to handle, or "-" to read one message per line from stdin
    #[arg(value_name = "MESSAGE")]
    messages: Vec<String>,

    /// Session the messages come from
    #[arg(long, default_value = "console", value_name = "ID")]
    session: String,

    /// Config file (default: <config dir>/threadcard/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for downloaded media and rendered cards
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,

    /// Proxy for every site
    #[arg(long, value_name = "URL")]
    proxy: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Content count above which media are bundled into one forward
    #[arg(long, value_name = "N")]
    forward_threshold: Option<usize>,

    /// Print outbound messages as JSON lines
    #[arg(long)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Transport that prints outbound messages to stdout.
struct ConsoleTransport {
    json: bool,
}

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, message: OutboundMessage) -> threadcard_core::Result<()> {
        if self.json {
            let line = serde_json::to_string(&message).map_err(|e| ThreadcardError::Transport(e.to_string()))?;
            println!("{}", line);
        } else {
            echo::print_message(&message);
        }
        Ok(())
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warn,threadcard_core=debug,threadcard=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let base = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => Config::load_default().context("Failed to load default config")?,
    };

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(dir) = &args.cache_dir {
        builder = builder.cache_dir(dir);
    }
    if let Some(secs) = args.timeout {
        builder = builder.common_timeout(secs);
    }
    if let Some(threshold) = args.forward_threshold {
        builder = builder.forward_threshold(threshold);
    }
    if let Some(proxy) = &args.proxy {
        builder = builder.proxy(proxy);
    }

    let mut config = builder.build();
    if args.proxy.is_some() {
        for spec in extractors::all() {
            config.parser.entry(spec.name.to_string()).or_default().use_proxy = true;
        }
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn read_stdin_lines() -> anyhow::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut messages = Vec::new();
    while let Some(line) = lines.next_line().await.context("Failed to read from stdin")? {
        if !line.trim().is_empty() {
            messages.push(line);
        }
    }
    Ok(messages)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        echo::print_banner();
    }

    let config = load_config(&args)?;
    debug!(cache_dir = %config.cache_dir.display(), forward_threshold = config.forward_threshold, "config loaded");
    if args.verbose {
        echo::print_info(&format!("Cache directory: {}", config.cache_dir.display()));
    }

    let mut messages = Vec::new();
    for message in &args.messages {
        if message == "-" {
            messages.extend(read_stdin_lines().await?);
        } else {
            messages.push(message.clone());
        }
    }

    if messages.is_empty() {
        echo::print_warning("No messages to handle");
        return Ok(());
    }

    let pipeline = Pipeline::initialize(config).context("Failed to initialize pipeline")?;
    let transport = ConsoleTransport { json: args.json };

    let mut delivered = 0;
    for message in &messages {
        let sent = pipeline
            .handle_message(&args.session, message, &transport)
            .await
            .context("Failed to deliver message")?;
        if sent {
            delivered += 1;
        }
    }
    pipeline.terminate().await;

    if args.verbose {
        echo::print_summary(messages.len(), delivered);
        if delivered > 0 {
            echo::print_success(&format!("Delivered {} of {} messages", delivered, messages.len()));
        }
    }

    Ok(())
}
