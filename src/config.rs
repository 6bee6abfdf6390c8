use std::env;
use std::path::PathBuf;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DB_PATH_ENV: &str = "FINANCE_LEDGER_DB_PATH";
pub const LOG_FILTER_ENV: &str = "FINANCE_LEDGER_LOG";
pub const LOG_JSON_ENV: &str = "FINANCE_LEDGER_LOG_JSON";

const DEFAULT_APP_DIR_NAME: &str = "finance-ledger";
const DEFAULT_LEDGER_DB_RELATIVE_PATH: &str = "ledger/finance.db";
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub log_filter: String,
    pub log_json: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let db_path = env::var(DB_PATH_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_ledger_db_path);
        let log_filter = env::var(LOG_FILTER_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
        Self {
            db_path,
            log_filter,
            log_json: env_bool(LOG_JSON_ENV, false),
        }
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

pub fn default_ledger_db_path() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(env::temp_dir);
    base.join(DEFAULT_APP_DIR_NAME)
        .join(DEFAULT_LEDGER_DB_RELATIVE_PATH)
}

// stdout carries adapter responses, so logs go to stderr.
pub fn init_tracing(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let result = if config.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    if let Err(err) = result {
        eprintln!("[finance_ledger] tracing already initialised: {err}");
    }
}
