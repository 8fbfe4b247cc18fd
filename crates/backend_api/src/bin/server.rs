use backend_api::{run_server, AppState, JsonFileRepository};
use brapi_client::{BrapiClient, BrapiConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::{env, process};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment variables with sane defaults
    let store_path = env::var("STORE_PATH").unwrap_or_else(|_| "data/planner.json".to_string());
    let settings_path = env::var("SETTINGS_PATH").ok().map(PathBuf::from);
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let settings = match settings_loader::load_optional_settings(settings_path.as_ref()) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("[FATAL] could not load settings: {err:#}");
            process::exit(1);
        }
    };

    println!("Dividend Planner API Server");
    println!("===========================");
    println!("Store path: {}", store_path);
    println!(
        "Settings: {}",
        settings_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "built-in defaults".to_string())
    );
    println!("Listening on: {}:{}", host, port);
    println!("Environment overrides: STORE_PATH, SETTINGS_PATH, HOST, PORT, BRAPI_BASE_URL, BRAPI_TOKEN");
    println!();

    let brapi_config = BrapiConfig::from_env();
    let market = BrapiClient::new(brapi_config)?;

    // Opens the store, creating an empty document on first run
    let repo = JsonFileRepository::open(&store_path).await?;

    let state = AppState {
        repo: Arc::new(repo),
        market: Arc::new(market),
        settings: Arc::new(settings),
    };

    // Start the server
    run_server(state, &host, port).await?;

    Ok(())
}
