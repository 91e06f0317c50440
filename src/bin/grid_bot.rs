//! Grid Trading Bot Binary
//!
//! Runs one grid per configured instrument against StandX, or against the
//! local simulator fed with live StandX prices in paper mode.
//!
//! ## Setup
//!
//! 1. Create a `.env` file in the project root (optional):
//!    ```text
//!    GRID__NETWORK__ACCESS_TOKEN=yourAccessToken
//!    RUST_LOG=info
//!    ```
//!
//! 2. Run the bot:
//!    ```bash
//!    cargo run --bin grid_bot -- --config config.toml
//!    ```

use std::env;
use std::path::Path;

use log::{error, info};

use standx_grid::{BotRunner, Settings};

#[tokio::main]
async fn main() {
    // Load .env before settings so it can override them
    let dotenv = dotenvy::dotenv();

    let args: Vec<String> = env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => args.get(i + 1).cloned(),
        None => args.get(1).cloned(),
    }
    .unwrap_or_else(|| "config.toml".to_string());

    if !Path::new(&config_path).exists() {
        eprintln!("Config file '{}' not found. Please create one.", config_path);
        std::process::exit(1);
    }

    let settings = match Settings::new(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load config {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(settings.log.level.as_str()))
        .init();
    match dotenv {
        Ok(path) => info!("Loaded environment from: {}", path.display()),
        Err(_) => info!("No .env file found, using system environment variables"),
    }
    info!("Loaded config from {}", config_path);

    if let Err(e) = BotRunner::from_settings(settings).run().await {
        error!("Bot execution error: {}", e);
        std::process::exit(1);
    }
}
