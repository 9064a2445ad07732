//! go2link CLI - relay and tools for Unitree Go2 robots
//!
//! Runs the TCP relay that lets simple line-based clients drive a robot over
//! WebRTC, and decodes device error codes offline.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use go2link_core::{classify, DeviceErrorRecord};

mod config;
mod relay;

use config::CliConfig;

/// go2link - WebRTC link to Unitree Go2 robots
#[derive(Parser)]
#[command(name = "go2link")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "GO2LINK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay line-delimited JSON clients to a robot
    Relay {
        /// Bind address
        #[arg(short, long)]
        bind: Option<String>,

        /// Port number
        #[arg(short = 'P', long)]
        port: Option<u16>,
    },

    /// Explain a device error code
    Decode {
        /// Error source as reported by the robot
        source: u32,

        /// Error code, decimal or 0x-prefixed hex
        code: String,
    },

    /// Show version and system info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = CliConfig::load(cli.config.as_deref())?;

    // Handle Ctrl+C
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for ctrl+c: {}", e),
        }
        let _ = shutdown_tx.send(()).await;
    });

    match cli.command {
        Commands::Relay { bind, port } => {
            let bind = bind.unwrap_or(config.relay.bind);
            let port = port.unwrap_or(config.relay.port);
            println!(
                "{} Starting relay on {}:{}",
                "GO2LINK".cyan().bold(),
                bind,
                port
            );
            relay::run_relay(&bind, port, config.connection, &mut shutdown_rx).await?;
        }

        Commands::Decode { source, code } => {
            let code = parse_code(&code)?;
            print_decoded(source, code);
        }

        Commands::Info => {
            print_info(&config);
        }
    }

    Ok(())
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}

fn parse_code(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    match parsed {
        Ok(code) => Ok(code),
        Err(_) => bail!("Invalid error code: {}", text),
    }
}

fn print_decoded(source: u32, code: u64) {
    let record = DeviceErrorRecord::new(0, source, code);
    let class = classify(&record);

    let severity = if class.critical {
        "CRITICAL".red().bold()
    } else {
        "error".yellow()
    };
    println!("{} {}", severity, class.code_text);
    println!("  Source:   {} ({})", class.source_text, class.source);
    println!("  Code:     0x{}", record.code_hex());
}

fn print_info(config: &CliConfig) {
    println!("{}", "go2link - WebRTC link to Unitree Go2 robots".cyan().bold());
    println!();
    println!("Version:    {}", env!("CARGO_PKG_VERSION"));
    println!("Platform:   {}", std::env::consts::OS);
    println!("Arch:       {}", std::env::consts::ARCH);
    println!();
    println!("{}", "Connection:".green());
    println!("  Signaling port:  {}", config.connection.signaling_port);
    println!("  STUN server:     {}", config.connection.stun_server);
    println!("  Data channel:    {}", config.connection.channel_label);
    println!(
        "  Access point:    {}",
        go2link_core::ACCESS_POINT_ADDR
    );
    println!();
    println!("{}", "Examples:".green());
    println!("  go2link relay --port 12346       # Relay TCP clients to a robot");
    println!("  go2link decode 300 0x4           # Explain a motor error");
}
