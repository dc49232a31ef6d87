use std::sync::Arc;

use tracing::{error, info, warn};

use imagebox::{Config, Database, FileStorage, ImageService, UploadLimits, WebServer};

const CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {CONFIG_PATH}: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = imagebox::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        imagebox::logging::init_console_only(&config.logging.level);
    }

    info!("Imagebox starting");

    if let Err(e) = run(config).await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> imagebox::Result<()> {
    let db = Database::open(&config.database.path).await?;
    let storage = FileStorage::new(&config.storage.upload_dir)?;
    info!("Storing uploads in {:?}", storage.base_path());

    let service = ImageService::new(db, Arc::new(storage))
        .with_limits(UploadLimits::from(&config.limits))
        .with_storage_config(&config.storage);

    let report = service.audit().await?;
    if !report.is_consistent() {
        warn!(
            "Storage audit found {} orphan file(s) and {} record(s) without a file",
            report.orphan_files.len(),
            report.missing_files.len()
        );
    }

    let server = WebServer::new(&config, service)?;
    server.run().await?;

    Ok(())
}
