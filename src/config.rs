//! Configuration management for the registry.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `REGISTRY_` prefix
//! - Sensible defaults for all optional settings
//!
//! Configuration is read once at startup and never changes afterwards.
//!
//! # Example
//!
//! ```ignore
//! use registry_v1::config::Config;
//!
//! let config = Config::parse();
//! println!("Serving {} on {}", config.data_dir.display(), config.bind_address());
//! ```
//!
//! # Environment Variables
//!
//! - `REGISTRY_HOST` - Server bind address (default: 0.0.0.0)
//! - `REGISTRY_PORT` - Server port (default: 5000)
//! - `REGISTRY_DATA_DIR` - Root of the content store (default: ./data)
//! - `REGISTRY_PID_FILE` - Pid file written while running
//! - `REGISTRY_DEBUG` - Enable debug logging
//! - `REGISTRY_SECRET` - HMAC key for session tokens
//! - `REGISTRY_PASSWORD` - Password accepted for Basic logins
//! - `REGISTRY_NAMESPACE` - Only serve repositories in this namespace
//! - `REGISTRY_MAX_BODY_SIZE` - Largest accepted request body in bytes

use std::path::PathBuf;

use clap::Parser;

use crate::server::routes::{RouterConfig, DEFAULT_MAX_BODY_SIZE};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "./data";

// =============================================================================
// CLI Arguments
// =============================================================================

/// registry-v1 - A file-backed server for the legacy container image registry protocol.
///
/// Stores repositories, tags and image layers under a local data directory
/// and speaks the v1 push/pull protocol.
#[derive(Parser, Debug, Clone)]
#[command(name = "registry-v1")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "REGISTRY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "REGISTRY_PORT")]
    pub port: u16,

    /// Root directory of the content store.
    #[arg(long, default_value = DEFAULT_DATA_DIR, env = "REGISTRY_DATA_DIR")]
    pub data_dir: PathBuf,

    /// Write the process id here while running.
    ///
    /// Startup fails if the file names a process that is still alive.
    #[arg(long, env = "REGISTRY_PID_FILE")]
    pub pid_file: Option<PathBuf>,

    /// Largest request body accepted, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_SIZE, env = "REGISTRY_MAX_BODY_SIZE")]
    pub max_body_size: usize,

    // =========================================================================
    // Authentication Configuration
    // =========================================================================
    /// Secret key for HMAC-SHA256 session tokens.
    #[arg(long, env = "REGISTRY_SECRET")]
    pub secret: Option<String>,

    /// Password accepted for Basic logins (any login name).
    ///
    /// Without a password every Basic login is refused; requests without
    /// credentials are still served.
    #[arg(long, env = "REGISTRY_PASSWORD")]
    pub password: Option<String>,

    /// Only serve repositories in this namespace.
    #[arg(long, env = "REGISTRY_NAMESPACE")]
    pub namespace: Option<String>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, env = "REGISTRY_DEBUG")]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.password.is_some() && self.secret.is_none() {
            return Err(
                "A password is set but no secret to sign tokens with. \
                 Set --secret or REGISTRY_SECRET"
                    .to_string(),
            );
        }

        if matches!(self.secret.as_deref(), Some("")) {
            return Err("secret must not be empty".to_string());
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(
                "Data directory is required. Set --data-dir or REGISTRY_DATA_DIR".to_string(),
            );
        }

        if let Some(namespace) = &self.namespace {
            if crate::store::validate_name(namespace).is_err() {
                return Err(format!("Invalid namespace: {:?}", namespace));
            }
        }

        if self.max_body_size == 0 {
            return Err("max_body_size must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether Basic logins can succeed.
    pub fn logins_enabled(&self) -> bool {
        self.secret.is_some() && self.password.is_some()
    }

    /// Build the router configuration for this server.
    pub fn router_config(&self) -> RouterConfig {
        let mut router_config = RouterConfig::new(self.data_dir.clone())
            .with_default_endpoint(self.bind_address())
            .with_max_body_size(self.max_body_size)
            .with_tracing(!self.no_tracing);

        if let Some(ref secret) = self.secret {
            router_config = router_config.with_secret(secret.clone());
        }
        if let Some(ref password) = self.password {
            router_config = router_config.with_password(password.clone());
        }
        if let Some(ref namespace) = self.namespace {
            router_config = router_config.with_namespace(namespace.clone());
        }

        router_config
    }
}

// =============================================================================
// Tests
// =============================================================================
