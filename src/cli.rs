//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::config::{
    AuthConfig, CookieConfig, DEFAULT_ACCESS_TTL_MINUTES, DEFAULT_REFRESH_COOKIE_PATH,
    DEFAULT_REFRESH_TTL_HOURS, GoogleConfig, MIN_SECRET_LENGTH, TokenConfig,
};
use crate::db::Database;
use clap::Parser;
use tracing::{error, info};

pub const ACCESS_SECRET_ENV: &str = "JWT_ACCESS_SECRET";
pub const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "tokenward",
    about = "Password and OAuth login with rotating refresh tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "tokenward.db")]
    pub database: String,

    /// Path to file containing the access-token secret. Prefer the JWT_ACCESS_SECRET env var
    #[arg(long)]
    pub access_secret_file: Option<String>,

    /// Path to file containing the refresh-token secret. Prefer the JWT_REFRESH_SECRET env var
    #[arg(long)]
    pub refresh_secret_file: Option<String>,

    /// Access token lifetime in minutes
    #[arg(long, default_value_t = DEFAULT_ACCESS_TTL_MINUTES)]
    pub access_ttl_minutes: u64,

    /// Refresh token lifetime in hours
    #[arg(long, default_value_t = DEFAULT_REFRESH_TTL_HOURS)]
    pub refresh_ttl_hours: u64,

    /// Web client origin that receives the federated-login redirect
    #[arg(long, default_value = "http://localhost:5173")]
    pub frontend_origin: String,

    /// Domain attribute for cookies
    #[arg(long)]
    pub cookie_domain: Option<String>,

    /// Set the Secure flag on cookies (should be on behind HTTPS)
    #[arg(long)]
    pub cookie_secure: bool,

    /// Path the refresh cookie is restricted to
    #[arg(long, default_value = DEFAULT_REFRESH_COOKIE_PATH)]
    pub refresh_cookie_path: String,

    #[arg(long, env = "GOOGLE_CLIENT_ID", default_value = "")]
    pub google_client_id: String,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", default_value = "", hide_env_values = true)]
    pub google_client_secret: String,

    #[arg(
        long,
        env = "GOOGLE_REDIRECT_URL",
        default_value = "http://localhost:8080/api/auth/google/callback"
    )]
    pub google_redirect_url: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a signing secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = env_var,
            "Signing secret is required. Set the environment variable (recommended) or pass a secret file"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Assemble the immutable auth configuration from arguments and secrets.
/// Returns None and logs an error if the result is invalid.
pub fn build_auth_config(
    args: &Args,
    access_secret: String,
    refresh_secret: String,
) -> Option<AuthConfig> {
    let config = AuthConfig {
        tokens: TokenConfig {
            access_secret: access_secret.into_bytes(),
            refresh_secret: refresh_secret.into_bytes(),
            access_ttl_minutes: args.access_ttl_minutes,
            refresh_ttl_hours: args.refresh_ttl_hours,
        },
        cookies: CookieConfig {
            refresh_path: args.refresh_cookie_path.clone(),
            domain: args.cookie_domain.clone().filter(|d| !d.is_empty()),
            secure: args.cookie_secure,
        },
        google: GoogleConfig {
            client_id: args.google_client_id.clone(),
            client_secret: args.google_client_secret.clone(),
            redirect_url: args.google_redirect_url.clone(),
        },
        frontend_origin: args.frontend_origin.clone(),
    };

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return None;
    }
    Some(config)
}

/// Build ServerConfig from validated parts.
pub fn build_config(db: Database, auth: AuthConfig) -> ServerConfig {
    ServerConfig {
        db,
        auth,
        identity_provider: None,
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
