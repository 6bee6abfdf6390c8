use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

use crate::backup::{export_backup_at_db_path, import_backup_at_db_path};
use crate::budgets::{create_budget_at_db_path, query_budgets_at_db_path};
use crate::dashboard::query_dashboard_at_db_path;
use crate::debts::{
    create_debt_at_db_path, delete_debt_at_db_path, query_debt_summary_at_db_path,
    query_debts_at_db_path, update_debt_status_at_db_path,
};
use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::expense_limits::{
    delete_expense_limit_at_db_path, query_exceeded_transactions_at_db_path,
    query_expense_limit_status_at_db_path, query_expense_limits_at_db_path,
    upsert_expense_limit_at_db_path,
};
use crate::goals::{create_goal_at_db_path, query_goals_at_db_path};
use crate::ledger_db::{
    apply_embedded_migrations, inspect_status_at_path, query_admin_db_stats_at_path,
    reset_admin_db_data_at_path, reset_admin_transaction_data_at_path,
};
use crate::preferences::{
    add_category_at_db_path, delete_category_at_db_path, query_preferences_at_db_path,
    update_preferences_at_db_path,
};
use crate::reports::{export_report_csv_at_db_path, query_report_at_db_path};
use crate::subscriptions::{
    create_subscription_at_db_path, delete_subscription_at_db_path,
    query_subscription_summary_at_db_path, query_subscriptions_at_db_path,
    query_upcoming_subscriptions_at_db_path, update_subscription_at_db_path,
};
use crate::transactions::{
    create_transaction_at_db_path, delete_transaction_at_db_path, query_monthly_stats_at_db_path,
    query_transactions_at_db_path,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        match raw.map(str::trim).unwrap_or("").to_uppercase().as_str() {
            "" | "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(ApiError::UnsupportedMethod(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unsupported endpoint: {method} {path}")]
    UnsupportedEndpoint { method: &'static str, path: String },

    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("request.query invalid for {endpoint}: {source}")]
    InvalidQuery {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Finance(#[from] FinanceError),
}

impl ApiError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::UnsupportedEndpoint { .. } | Self::UnsupportedMethod(_) => "UNSUPPORTED_ENDPOINT",
            Self::InvalidQuery { .. } => "VALIDATION_ERROR",
            Self::Finance(err) => err.category(),
        }
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, query: Value) -> Result<T, ApiError> {
    let query = if query.is_null() {
        Value::Object(Map::new())
    } else {
        query
    };
    serde_json::from_value(query).map_err(|source| ApiError::InvalidQuery {
        endpoint: endpoint.to_string(),
        source,
    })
}

fn with_path_param(query: Value, key: &str, value: Value) -> Value {
    let mut obj = match query {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    obj.insert(key.to_string(), value);
    Value::Object(obj)
}

fn path_id(raw: &str) -> Result<Value, ApiError> {
    raw.parse::<i64>()
        .map(|id| json!(id))
        .map_err(|_| FinanceError::validation(format!("invalid id in path: {raw}")).into())
}

fn health_payload(db_path: &Path) -> FinanceResult<Value> {
    let status = inspect_status_at_path(db_path)?;
    let unix_ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(json!({
        "status": "ok",
        "unix_ts": unix_ts,
        "version": env!("CARGO_PKG_VERSION"),
        "db_path": status.db_path,
        "db_ready": status.ready,
        "pending_migrations": status.pending_versions,
    }))
}

fn to_value<T: Serialize>(value: T) -> FinanceResult<Value> {
    serde_json::to_value(value).context("serialize admin payload")
}

pub fn dispatch(
    method: Method,
    path: &str,
    query: Value,
    db_path: &Path,
) -> Result<Value, ApiError> {
    let segments = path
        .trim()
        .trim_end_matches('/')
        .split('/')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    debug!(method = method.as_str(), path, "dispatch");

    use Method::*;
    let payload = match (method, segments.as_slice()) {
        (Get, ["api", "health"]) => health_payload(db_path)?,

        (Get, ["api", "admin", "db-status"]) => to_value(inspect_status_at_path(db_path)?)?,
        (Post, ["api", "admin", "migrate"]) => to_value(apply_embedded_migrations(db_path)?)?,
        (Get, ["api", "admin", "db-stats"]) => to_value(query_admin_db_stats_at_path(db_path)?)?,
        (Post, ["api", "admin", "reset-transactions"]) => to_value(
            reset_admin_transaction_data_at_path(db_path, decode(path, query)?)?,
        )?,
        (Post | Delete, ["api", "clear-all"]) => {
            to_value(reset_admin_db_data_at_path(db_path, decode(path, query)?)?)?
        }

        (Get, ["api", "transactions"]) => {
            query_transactions_at_db_path(db_path, decode(path, query)?)?
        }
        (Post, ["api", "transactions"]) => {
            create_transaction_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "transactions", "monthly-stats"]) => {
            query_monthly_stats_at_db_path(db_path, decode(path, query)?)?
        }
        (Delete, ["api", "transactions", id]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            delete_transaction_at_db_path(db_path, decode(path, query)?)?
        }

        (Get, ["api", "expense-limits"]) => query_expense_limits_at_db_path(db_path)?,
        (Post | Put, ["api", "expense-limits"]) => {
            upsert_expense_limit_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "expense-limits", "status"]) => {
            query_expense_limit_status_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "expense-limits", "exceeded-transactions"]) => {
            query_exceeded_transactions_at_db_path(db_path, decode(path, query)?)?
        }
        (Delete, ["api", "expense-limits", id]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            delete_expense_limit_at_db_path(db_path, decode(path, query)?)?
        }

        (Get, ["api", "budgets"]) => query_budgets_at_db_path(db_path)?,
        (Post, ["api", "budgets"]) => create_budget_at_db_path(db_path, decode(path, query)?)?,

        (Get, ["api", "goals"]) => query_goals_at_db_path(db_path)?,
        (Post, ["api", "goals"]) => create_goal_at_db_path(db_path, decode(path, query)?)?,

        (Get, ["api", "debts"]) => query_debts_at_db_path(db_path, decode(path, query)?)?,
        (Post, ["api", "debts"]) => create_debt_at_db_path(db_path, decode(path, query)?)?,
        (Get, ["api", "debts", "summary"]) => {
            query_debt_summary_at_db_path(db_path, decode(path, query)?)?
        }
        (Put | Patch, ["api", "debts", id, "status"]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            update_debt_status_at_db_path(db_path, decode(path, query)?)?
        }
        (Delete, ["api", "debts", id]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            delete_debt_at_db_path(db_path, decode(path, query)?)?
        }

        (Get, ["api", "subscriptions"]) => {
            query_subscriptions_at_db_path(db_path, decode(path, query)?)?
        }
        (Post, ["api", "subscriptions"]) => {
            create_subscription_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "subscriptions", "summary"]) => {
            query_subscription_summary_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "subscriptions", "upcoming"]) => {
            query_upcoming_subscriptions_at_db_path(db_path, decode(path, query)?)?
        }
        (Put, ["api", "subscriptions", id]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            update_subscription_at_db_path(db_path, decode(path, query)?)?
        }
        (Delete, ["api", "subscriptions", id]) => {
            let query = with_path_param(query, "id", path_id(id)?);
            delete_subscription_at_db_path(db_path, decode(path, query)?)?
        }

        (Get, ["api", "reports"]) => query_report_at_db_path(db_path, decode(path, query)?)?,
        (Get | Post, ["api", "reports", "export"]) => {
            export_report_csv_at_db_path(db_path, decode(path, query)?)?
        }
        (Get, ["api", "dashboard"]) => query_dashboard_at_db_path(db_path, decode(path, query)?)?,

        (Get, ["api", "preferences"]) => query_preferences_at_db_path(db_path)?,
        (Put | Patch, ["api", "preferences"]) => {
            update_preferences_at_db_path(db_path, decode(path, query)?)?
        }
        (Post, ["api", "categories"]) => add_category_at_db_path(db_path, decode(path, query)?)?,
        (Delete, ["api", "categories", name]) => {
            let query = with_path_param(query, "name", json!(name));
            delete_category_at_db_path(db_path, decode(path, query)?)?
        }

        (Get, ["api", "backup", "export"]) => export_backup_at_db_path(db_path)?,
        (Post, ["api", "backup", "import"]) => {
            import_backup_at_db_path(db_path, decode(path, query)?)?
        }

        _ => {
            return Err(ApiError::UnsupportedEndpoint {
                method: method.as_str(),
                path: path.to_string(),
            })
        }
    };
    Ok(payload)
}
