//! Configuration for the FYP portal
//!
//! CLI arguments and environment variable handling using clap. A `.env` file
//! is loaded first by `main`.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Token lifetime matching the 15 days issued by earlier deployments
pub const DEFAULT_JWT_EXPIRY_SECONDS: u64 = 15 * 24 * 60 * 60;

/// FYP portal - supervision contracts, evaluation panels and marks
#[derive(Parser, Debug, Clone)]
#[command(name = "fyp-portal")]
#[command(about = "Final-year-project supervision service")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "fyp")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value_t = DEFAULT_JWT_EXPIRY_SECONDS)]
    pub jwt_expiry_seconds: u64,

    /// Development mode: in-memory store and a fixed dev signing secret
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit JSON log lines instead of the human-readable format
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append-only JSONL audit log of state changes
    #[arg(long, env = "AUDIT_LOG_PATH")]
    pub audit_log_path: Option<PathBuf>,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "65536")]
    pub max_body_bytes: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            match self.jwt_secret.as_deref() {
                None | Some("") => {
                    return Err("JWT_SECRET is required in production mode".to_string())
                }
                Some(secret) if secret.len() < 32 => {
                    return Err("JWT_SECRET must be at least 32 characters".to_string())
                }
                Some(_) => {}
            }
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["fyp-portal"];
        argv.extend_from_slice(args);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dev-mode"]);
        assert_eq!(args.jwt_expiry_seconds, 1_296_000);
        assert_eq!(args.max_body_bytes, 65536);
        assert_eq!(args.mongodb_db, "fyp");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--jwt-secret", "short"]).validate().is_err());
        assert!(parse(&["--jwt-secret", "a-production-secret-of-32-chars!!"])
            .validate()
            .is_ok());
    }
}
