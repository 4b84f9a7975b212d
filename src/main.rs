//! FYP portal - final-year-project supervision service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fyp_portal::{
    auth::JwtValidator,
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore, PortalStore},
    logging::AuditLogger,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("fyp_portal={},info", log_level).into());
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  FYP Portal");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    if !args.dev_mode {
        info!("MongoDB: {} (db: {})", args.mongodb_uri, args.mongodb_db);
    }
    info!("Token expiry: {}s", args.jwt_expiry_seconds);
    info!("======================================");

    let (store, store_kind, jwt): (Arc<dyn PortalStore>, &'static str, JwtValidator) =
        if args.dev_mode {
            warn!("Using in-memory store; data is lost on restart");
            (
                Arc::new(MemoryStore::new()),
                "memory",
                JwtValidator::new_dev(args.jwt_expiry_seconds),
            )
        } else {
            let client = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
                Ok(client) => {
                    info!("MongoDB connected successfully");
                    client
                }
                Err(e) => {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            };
            let store = MongoStore::new(client).await?;
            let secret = args.jwt_secret.clone().unwrap_or_default();
            let jwt = JwtValidator::new(secret, args.jwt_expiry_seconds)?;
            (Arc::new(store), "mongodb", jwt)
        };

    let audit = AuditLogger::new();
    if let Some(path) = args.audit_log_path.clone() {
        if let Err(e) = audit.init_file(path).await {
            error!("Failed to open audit log: {}", e);
            std::process::exit(1);
        }
    }

    let state = Arc::new(AppState::new(args, store, store_kind, jwt, audit));

    if let Err(e) = server::run(state).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
