use crate::application::gateway::DEFAULT_INTENT_TIMEOUT;
use crate::infrastructure::provider::DEFAULT_PROVIDER_BASE_URL;
use crate::infrastructure::signature::DEFAULT_TOLERANCE_SECS;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for `--older-than-mins`, roughly a century.
pub const MAX_REPORT_AGE_MINS: i64 = 100 * 365 * 24 * 60;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to persistent database (optional). Requires the `storage-rocksdb` feature.
    #[arg(long, env = "DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the settlement HTTP API (the default).
    Serve,
    /// Print payments still PENDING after the cutoff as CSV on stdout.
    PendingPayments {
        /// Only report payments created more than this many minutes ago.
        #[arg(
            long,
            default_value_t = 60,
            value_parser = clap::value_parser!(i64).range(0..=MAX_REPORT_AGE_MINS)
        )]
        older_than_mins: i64,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ServerArgs {
    #[arg(long, env = "HOST", default_value = "0.0.0.0", global = true)]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8080, global = true)]
    pub port: u16,

    /// HS256 secret used to validate bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true, global = true)]
    pub jwt_secret: Option<String>,

    /// Endpoint secret the payment provider signs webhooks with.
    #[arg(long, env = "WEBHOOK_SECRET", hide_env_values = true, global = true)]
    pub webhook_secret: Option<String>,

    #[arg(long, env = "WEBHOOK_TOLERANCE_SECS", default_value_t = DEFAULT_TOLERANCE_SECS, global = true)]
    pub webhook_tolerance_secs: u64,

    /// Provider API key. Without one, intents come from the in-process sandbox.
    #[arg(long, env = "PROVIDER_API_KEY", hide_env_values = true, global = true)]
    pub provider_api_key: Option<String>,

    #[arg(long, env = "PROVIDER_BASE_URL", default_value = DEFAULT_PROVIDER_BASE_URL, global = true)]
    pub provider_base_url: String,

    #[arg(long, env = "CURRENCY", default_value = "usd", global = true)]
    pub currency: String,

    #[arg(long, env = "INTENT_TIMEOUT_SECS", default_value_t = DEFAULT_INTENT_TIMEOUT.as_secs(), global = true)]
    pub intent_timeout_secs: u64,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30, global = true)]
    pub request_timeout_secs: u64,
}

impl ServerArgs {
    pub fn intent_timeout(&self) -> Duration {
        Duration::from_secs(self.intent_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
