//! Tether CLI - JSON-RPC over stdio
//!
//! `serve` answers newline-delimited JSON-RPC messages from stdin on stdout;
//! `notify` and `request` print the encoded form of a call.

mod demo;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use tether_codec_json::{JsonRpcCodec, JsonRpcEngine};
use tether_core::{Args, CodecOptions, EngineConfig, EngineError, RpcEngine};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Transport-agnostic JSON-RPC engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Send internal failure detail instead of redaction tokens [also: TETHER_SEND_FULL_ERRORS]
    #[arg(long, global = true)]
    full_errors: bool,

    /// Log every inbound and outbound message at info level [also: TETHER_LOG_MESSAGES]
    #[arg(long, global = true)]
    log_messages: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer JSON-RPC messages read line by line from stdin
    Serve,

    /// Print an encoded notification
    Notify {
        method: String,

        /// Arguments as JSON; anything that does not parse is a string
        args: Vec<String>,
    },

    /// Print an encoded request
    Request {
        method: String,

        /// Arguments as JSON; anything that does not parse is a string
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = EngineConfig::from_env();
    config.log_messages |= cli.log_messages;

    let mut options = CodecOptions::from_env();
    options.send_full_errors |= cli.full_errors;

    match cli.command {
        Commands::Serve => serve(config, options).await,
        Commands::Notify { method, args } => {
            let engine = RpcEngine::builder(JsonRpcCodec::new(options)).config(config).build();
            let outgoing = engine
                .notification(method, parse_args(&args))
                .context("Failed to encode notification")?;
            println!("{}", outgoing);
            Ok(())
        }
        Commands::Request { method, args } => {
            let engine = RpcEngine::builder(JsonRpcCodec::new(options)).config(config).build();
            let handle = engine
                .request(method, parse_args(&args))
                .context("Failed to encode request")?;
            println!("{}", handle);
            Ok(())
        }
    }
}

/// Logs go to stderr; stdout carries protocol messages
fn init_logging() -> Result<()> {
    let log_format = std::env::var("TETHER_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("tether=info"))
        .context("Failed to create env filter")?;

    match log_format.as_str() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        _ => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }

    Ok(())
}

async fn serve(config: EngineConfig, options: CodecOptions) -> Result<()> {
    let engine: JsonRpcEngine = RpcEngine::builder(JsonRpcCodec::new(options))
        .methods(demo::registry())
        .config(config)
        .transport(write_line)
        .build();

    info!(version = tether_core::VERSION, "Serving JSON-RPC on stdio");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let engine = engine.clone();
                tokio::spawn(async move {
                    match engine.on_message(&line).await {
                        Ok(_) => {}
                        // Nobody to answer: the peer sent a notification or a stray response
                        Err(err @ (EngineError::NotificationFailed(_) | EngineError::UnknownRequest { .. })) => {
                            debug!(error = %err, "Message not answered");
                        }
                        Err(err) => warn!(error = %err, "Failed to process message"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!(pending = engine.pending_count(), "Input closed, shutting down");
    Ok(())
}

fn write_line(payload: &str) {
    let mut stdout = std::io::stdout().lock();
    if let Err(err) = writeln!(stdout, "{}", payload).and_then(|_| stdout.flush()) {
        warn!(error = %err, "Failed to write reply");
    }
}

fn parse_args(raw: &[String]) -> Args {
    raw.iter()
        .map(|arg| serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.clone())))
        .collect::<Vec<Value>>()
        .into()
}
