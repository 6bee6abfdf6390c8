use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use crate::debts::{debt_totals_to_json, load_debt_summary};
use crate::errors::{FinanceResult, ResultExt};
use crate::expense_limits::{counts_to_json, load_limit_status_counts};
use crate::ledger_db::open_ledger;
use crate::preferences::{format_amount, PreferencesStore, SqlitePreferencesStore};
use crate::subscriptions::{load_subscription_summary, subscription_summary_to_json};
use crate::transactions::{load_monthly_stats, monthly_stats_to_json};
use crate::value_parsing::{format_date, resolve_today};

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQueryRequest {
    pub today: Option<String>,
}

pub fn query_dashboard_at_db_path(
    db_path: &Path,
    req: DashboardQueryRequest,
) -> FinanceResult<Value> {
    let today = resolve_today(req.today)?;
    let mut conn = open_ledger(db_path)?;
    // One read transaction so every area sees the same snapshot.
    let tx = conn.transaction().context("begin dashboard snapshot")?;

    let stats = load_monthly_stats(&tx, today)?;
    let limit_counts = load_limit_status_counts(&tx)?;
    let subscriptions = load_subscription_summary(&tx, today)?;
    let debts = load_debt_summary(&tx)?;
    let prefs = SqlitePreferencesStore::new(&tx).load()?;
    tx.commit().context("end dashboard snapshot")?;
    debug!(
        exceeded_limits = limit_counts.exceeded,
        active_subscriptions = subscriptions.total_active,
        pending_debts = debts.pending_count,
        "dashboard assembled"
    );

    Ok(json!({
        "today": format_date(today),
        "monthly": monthly_stats_to_json(&stats, today),
        "expense_limits": counts_to_json(&limit_counts),
        "subscriptions": subscription_summary_to_json(&subscriptions),
        "debts": debt_totals_to_json(&debts),
        "display": {
            "currency": prefs.currency.code(),
            "income": format_amount(stats.month_income_cents, &prefs),
            "expenses": format_amount(stats.month_expenses_cents, &prefs),
            "balance": format_amount(stats.balance_cents(), &prefs),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_temp_db, v_i64, v_str};
    use rusqlite::Connection;
    use std::fs;

    #[test]
    fn dashboard_combines_every_area() {
        let db_path = migrated_temp_db();
        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch(
            r#"
            INSERT INTO transactions(amount_cents, description, category, type, date) VALUES
              (100000, 'Salary', 'Income', 'income', '2026-03-01 09:00:00'),
              (7000, 'Groceries', 'Food', 'expense', '2026-03-04 18:00:00');
            INSERT INTO expense_limits(category, limit_amount_cents, period_type, start_date, end_date) VALUES
              ('Food', 5000, 'monthly', '2026-03-01', '2026-03-31'),
              ('Bills', 5000, 'monthly', '2026-03-01', '2026-03-31');
            INSERT INTO subscriptions(name, cost_cents, billing_cycle, next_billing_date, category) VALUES
              ('Music', 999, 'monthly', '2026-03-12', 'Streaming');
            INSERT INTO debts(person_name, amount_cents, type, status, created_date) VALUES
              ('Ana', 2000, 'owed', 'pending', '2026-02-01'),
              ('Ben', 500, 'owe', 'pending', '2026-02-03');
            "#,
        )
        .expect("seed dashboard");

        let dash = query_dashboard_at_db_path(
            &db_path,
            DashboardQueryRequest {
                today: Some("2026-03-10".to_string()),
            },
        )
        .expect("dashboard");
        assert_eq!(v_str(&dash, &["monthly", "month_key"]), "2026-03");
        assert_eq!(v_i64(&dash, &["monthly", "balance_cents"]), 93_000);
        assert_eq!(v_i64(&dash, &["expense_limits", "exceeded"]), 1);
        assert_eq!(v_i64(&dash, &["expense_limits", "on_track"]), 1);
        assert_eq!(v_i64(&dash, &["subscriptions", "upcoming_this_week"]), 1);
        assert_eq!(v_i64(&dash, &["debts", "net_cents"]), 1_500);
        assert_eq!(v_str(&dash, &["display", "balance"]), "$930.00");

        conn.execute_batch("INSERT INTO user_preferences(key, value) VALUES ('privacy_mode', 'true');")
            .expect("enable privacy mode");
        let masked = query_dashboard_at_db_path(
            &db_path,
            DashboardQueryRequest {
                today: Some("2026-03-10".to_string()),
            },
        )
        .expect("masked dashboard");
        assert_eq!(v_str(&masked, &["display", "balance"]), "$------");

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn dashboard_reads_committed_rows_only() {
        let db_path = migrated_temp_db();
        let conn = Connection::open(&db_path).expect("open db");
        conn.execute_batch(
            "INSERT INTO transactions(amount_cents, description, category, type, date)
             VALUES (5000, 'Salary', 'Income', 'income', '2026-03-01 09:00:00');",
        )
        .expect("seed income");

        let writer = Connection::open(&db_path).expect("open writer");
        writer
            .execute_batch(
                "BEGIN IMMEDIATE;
                 INSERT INTO transactions(amount_cents, description, category, type, date)
                 VALUES (2000, 'Pending', 'Food', 'expense', '2026-03-02 09:00:00');",
            )
            .expect("open write");

        let dash = query_dashboard_at_db_path(
            &db_path,
            DashboardQueryRequest {
                today: Some("2026-03-10".to_string()),
            },
        )
        .expect("dashboard during write");
        assert_eq!(v_i64(&dash, &["monthly", "balance_cents"]), 5_000);

        writer.execute_batch("ROLLBACK;").expect("rollback writer");
        let _ = fs::remove_file(&db_path);
    }
}
