// src/main.rs

//! The main entry point for the Cortado server, and for the demo client.

use anyhow::Result;
use cortado::config::Config;
use cortado::{client, server};
use std::env;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    run_app().await
}

fn init_logging(default_filter: &str) {
    let filter = env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter))
        .with(
            tracing_subscriber::fmt::layer()
                .compact() // Use the compact, single-line format.
                .with_ansi(true),
        )
        .init();
}

/// Returns the value following `flag`, exiting with usage help if it is missing.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    let index = args.iter().position(|arg| arg == flag)?;
    match args.get(index + 1) {
        Some(value) => Some(value.as_str()),
        None => {
            eprintln!("{flag} flag requires a value");
            std::process::exit(1);
        }
    }
}

fn port_override(args: &[String], flag: &str) -> Option<u16> {
    let value = flag_value(args, flag)?;
    match value.parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            eprintln!("Invalid port number for {flag}: {value}");
            std::process::exit(1);
        }
    }
}

async fn run_app() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("Cortado version {VERSION}");
        return Ok(());
    }

    if args.len() > 1 && args[1] == "--client" {
        // --- Demo Client Mode ---
        if args.len() != 3 {
            eprintln!("Usage: cortado --client /path/to/client.toml");
            std::process::exit(1);
        }
        init_logging("info,cortado::client=debug");
        info!("Starting Cortado demo client...");

        if let Err(e) = client::demo::run(&args[2]).await {
            error!("Client error: {:#}", e);
            return Err(e);
        }
        return Ok(());
    }

    // --- Server Mode ---
    let config_path = flag_value(&args, "--config").unwrap_or("config.toml");

    let mut config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    if let Some(port) = port_override(&args, "--binary-port") {
        config.binary_port = port;
    }
    if let Some(port) = port_override(&args, "--json-port") {
        config.json_port = port;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e:#}");
        std::process::exit(1);
    }

    init_logging(&config.log_level);

    if let Err(e) = server::run(config).await {
        error!("Server runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
