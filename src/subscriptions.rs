use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::subscription_engine::{
    compute_subscription_summary, monthly_equivalent_cents, upcoming_payments, BillingCycle,
    Subscription, SubscriptionStatus, SubscriptionSummary, UPCOMING_MONTH_DAYS,
};
use crate::value_parsing::{
    cents_to_text, format_date, parse_date, parse_non_negative_amount, parse_optional_text,
    parse_required_date, parse_required_text, resolve_today, AmountInput,
};

const DEFAULT_CATEGORY: &str = "Other";
const MAX_UPCOMING_DAYS: i64 = 366;

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionsQueryRequest {
    pub category: Option<String>,
    pub billing_cycle: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionUpsertRequest {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub cost: Option<AmountInput>,
    pub billing_cycle: Option<String>,
    pub next_billing_date: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionDeleteRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionSummaryQueryRequest {
    pub today: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpcomingSubscriptionsQueryRequest {
    pub today: Option<String>,
    pub days: Option<i64>,
}

struct SubscriptionFields {
    name: String,
    cost_cents: i64,
    billing_cycle: BillingCycle,
    next_billing_date: String,
    category: String,
    description: Option<String>,
    status: SubscriptionStatus,
}

impl SubscriptionFields {
    fn parse(req: SubscriptionUpsertRequest) -> FinanceResult<Self> {
        let name = parse_required_text(req.name, "name")?;
        if req.cost.is_none() {
            return Err(FinanceError::validation("cost is required"));
        }
        let cost_cents = parse_non_negative_amount(req.cost.as_ref(), "cost", 0)?;
        let billing_cycle =
            BillingCycle::parse(&parse_required_text(req.billing_cycle, "billing_cycle")?)?;
        let next_billing_date =
            format_date(parse_required_date(req.next_billing_date, "next_billing_date")?);
        let category = match parse_optional_text(req.category) {
            c if c.is_empty() => DEFAULT_CATEGORY.to_string(),
            c => c,
        };
        let description = Some(parse_optional_text(req.description)).filter(|d| !d.is_empty());
        let status = match parse_optional_text(req.status) {
            s if s.is_empty() => SubscriptionStatus::Active,
            s => SubscriptionStatus::parse(&s)?,
        };
        Ok(Self {
            name,
            cost_cents,
            billing_cycle,
            next_billing_date,
            category,
            description,
            status,
        })
    }
}

struct SubscriptionRow {
    id: i64,
    name: String,
    cost_cents: i64,
    billing_cycle: String,
    next_billing_date: String,
    category: String,
    description: Option<String>,
    status: String,
}

impl SubscriptionRow {
    fn into_subscription(self) -> FinanceResult<Subscription> {
        Ok(Subscription {
            id: self.id,
            name: self.name,
            cost_cents: self.cost_cents,
            billing_cycle: BillingCycle::parse(&self.billing_cycle)?,
            next_billing_date: parse_date(
                &self.next_billing_date,
                "subscriptions.next_billing_date",
            )?,
            category: self.category,
            description: self.description,
            status: SubscriptionStatus::parse(&self.status)?,
        })
    }
}

const SUBSCRIPTION_COLUMNS: &str =
    "id, name, cost_cents, billing_cycle, next_billing_date, category, description, status";

fn map_subscription_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SubscriptionRow> {
    Ok(SubscriptionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        cost_cents: row.get(2)?,
        billing_cycle: row.get(3)?,
        next_billing_date: row.get(4)?,
        category: row.get(5)?,
        description: row.get(6)?,
        status: row.get(7)?,
    })
}

#[derive(Debug, Default)]
struct SubscriptionFilter {
    category: Option<String>,
    billing_cycle: Option<BillingCycle>,
    status: Option<SubscriptionStatus>,
}

fn load_subscriptions(
    conn: &Connection,
    filter: &SubscriptionFilter,
) -> FinanceResult<Vec<Subscription>> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(category) = filter.category.as_ref() {
        conditions.push("category = ?");
        params.push(SqlValue::Text(category.clone()));
    }
    if let Some(cycle) = filter.billing_cycle {
        conditions.push("billing_cycle = ?");
        params.push(SqlValue::Text(cycle.as_str().to_string()));
    }
    if let Some(status) = filter.status {
        conditions.push("status = ?");
        params.push(SqlValue::Text(status.as_str().to_string()));
    }
    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let sql = format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions {where_sql} ORDER BY next_billing_date ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql).context("query subscriptions")?;
    let iter = stmt
        .query_map(params_from_iter(params.iter()), map_subscription_row)
        .context("query subscriptions")?;
    let mut out = Vec::new();
    for row in iter {
        out.push(row.context("read subscription row")?.into_subscription()?);
    }
    Ok(out)
}

fn load_subscription_by_id(conn: &Connection, id: i64) -> FinanceResult<Subscription> {
    conn.query_row(
        &format!("SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE id = ?1"),
        [id],
        map_subscription_row,
    )
    .optional()
    .context("read subscription")?
    .ok_or_else(|| FinanceError::not_found(format!("subscription {id} not found")))?
    .into_subscription()
}

pub(crate) fn load_subscription_summary(
    conn: &Connection,
    today: chrono::NaiveDate,
) -> FinanceResult<SubscriptionSummary> {
    let subs = load_subscriptions(conn, &SubscriptionFilter::default())?;
    Ok(compute_subscription_summary(&subs, today))
}

fn subscription_to_json(sub: &Subscription) -> Value {
    let monthly = monthly_equivalent_cents(sub.cost_cents, sub.billing_cycle);
    json!({
        "id": sub.id,
        "name": sub.name,
        "cost_cents": sub.cost_cents,
        "cost": cents_to_text(sub.cost_cents),
        "billing_cycle": sub.billing_cycle.as_str(),
        "monthly_equivalent_cents": monthly,
        "monthly_equivalent": cents_to_text(monthly),
        "next_billing_date": format_date(sub.next_billing_date),
        "category": sub.category,
        "description": sub.description,
        "status": sub.status.as_str(),
    })
}

pub(crate) fn subscription_summary_to_json(summary: &SubscriptionSummary) -> Value {
    let by_category = summary
        .by_category
        .iter()
        .map(|(category, cost)| {
            json!({
                "category": category,
                "count": cost.count,
                "monthly_cost_cents": cost.monthly_cost_cents,
                "monthly_cost": cents_to_text(cost.monthly_cost_cents),
            })
        })
        .collect::<Vec<_>>();
    json!({
        "total_active": summary.total_active,
        "monthly_cost_cents": summary.monthly_cost_cents,
        "monthly_cost": cents_to_text(summary.monthly_cost_cents),
        "yearly_cost_cents": summary.yearly_cost_cents,
        "yearly_cost": cents_to_text(summary.yearly_cost_cents),
        // yearly_cost scales each cost by its cycle; this is the rounded
        // monthly figure times twelve, which can differ by a few cents.
        "yearly_cost_basis": "billing_cycle",
        "monthly_cost_x12_cents": summary.monthly_cost_cents.saturating_mul(12),
        "upcoming_this_week": summary.upcoming_this_week,
        "upcoming_this_month": summary.upcoming_this_month,
        "by_category": by_category,
    })
}

pub fn query_subscriptions_at_db_path(
    db_path: &Path,
    req: SubscriptionsQueryRequest,
) -> FinanceResult<Value> {
    let category = parse_optional_text(req.category);
    let billing_cycle = match parse_optional_text(req.billing_cycle) {
        c if c.is_empty() => None,
        c => Some(BillingCycle::parse(&c)?),
    };
    let status = match parse_optional_text(req.status) {
        s if s.is_empty() => None,
        s => Some(SubscriptionStatus::parse(&s)?),
    };
    let filter = SubscriptionFilter {
        category: (!category.is_empty()).then_some(category),
        billing_cycle,
        status,
    };
    let conn = open_ledger(db_path)?;
    let subs = load_subscriptions(&conn, &filter)?;
    debug!(count = subs.len(), "subscriptions listed");
    Ok(json!({
        "summary": { "count": subs.len() },
        "rows": subs.iter().map(subscription_to_json).collect::<Vec<_>>(),
    }))
}

pub fn create_subscription_at_db_path(
    db_path: &Path,
    req: SubscriptionUpsertRequest,
) -> FinanceResult<Value> {
    let fields = SubscriptionFields::parse(req)?;
    let conn = open_ledger(db_path)?;
    conn.execute(
        r#"
        INSERT INTO subscriptions(name, cost_cents, billing_cycle, next_billing_date, category, description, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            fields.name,
            fields.cost_cents,
            fields.billing_cycle.as_str(),
            fields.next_billing_date,
            fields.category,
            fields.description,
            fields.status.as_str(),
        ],
    )
    .context("insert subscription")?;
    let saved = load_subscription_by_id(&conn, conn.last_insert_rowid())?;
    info!(id = saved.id, name = %saved.name, cycle = saved.billing_cycle.as_str(), "subscription created");
    Ok(subscription_to_json(&saved))
}

pub fn update_subscription_at_db_path(
    db_path: &Path,
    req: SubscriptionUpsertRequest,
) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let fields = SubscriptionFields::parse(req)?;
    let conn = open_ledger(db_path)?;
    load_subscription_by_id(&conn, id)?;
    conn.execute(
        r#"
        UPDATE subscriptions
        SET name = ?1, cost_cents = ?2, billing_cycle = ?3, next_billing_date = ?4,
            category = ?5, description = ?6, status = ?7, updated_at = datetime('now')
        WHERE id = ?8
        "#,
        params![
            fields.name,
            fields.cost_cents,
            fields.billing_cycle.as_str(),
            fields.next_billing_date,
            fields.category,
            fields.description,
            fields.status.as_str(),
            id,
        ],
    )
    .context("update subscription")?;
    let saved = load_subscription_by_id(&conn, id)?;
    info!(id, status = saved.status.as_str(), "subscription updated");
    Ok(subscription_to_json(&saved))
}

pub fn delete_subscription_at_db_path(
    db_path: &Path,
    req: SubscriptionDeleteRequest,
) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let conn = open_ledger(db_path)?;
    let existing = load_subscription_by_id(&conn, id)?;
    conn.execute("DELETE FROM subscriptions WHERE id = ?1", [id])
        .context("delete subscription")?;
    info!(id, "subscription deleted");
    Ok(json!({
        "deleted": true,
        "subscription": subscription_to_json(&existing),
    }))
}

pub fn query_subscription_summary_at_db_path(
    db_path: &Path,
    req: SubscriptionSummaryQueryRequest,
) -> FinanceResult<Value> {
    let today = resolve_today(req.today)?;
    let conn = open_ledger(db_path)?;
    let summary = load_subscription_summary(&conn, today)?;
    debug!(active = summary.total_active, "subscription summary computed");
    Ok(json!({
        "today": format_date(today),
        "summary": subscription_summary_to_json(&summary),
    }))
}

pub fn query_upcoming_subscriptions_at_db_path(
    db_path: &Path,
    req: UpcomingSubscriptionsQueryRequest,
) -> FinanceResult<Value> {
    let today = resolve_today(req.today)?;
    let days = req.days.unwrap_or(UPCOMING_MONTH_DAYS);
    if !(0..=MAX_UPCOMING_DAYS).contains(&days) {
        return Err(FinanceError::validation(format!(
            "days must be between 0 and {MAX_UPCOMING_DAYS}"
        )));
    }
    let conn = open_ledger(db_path)?;
    let subs = load_subscriptions(&conn, &SubscriptionFilter::default())?;
    let due = upcoming_payments(&subs, today, days);
    let due_total = due
        .iter()
        .fold(0_i64, |acc, s| acc.saturating_add(s.cost_cents));
    Ok(json!({
        "today": format_date(today),
        "days": days,
        "summary": {
            "count": due.len(),
            "total_cents": due_total,
            "total": cents_to_text(due_total),
        },
        "rows": due
            .iter()
            .map(|sub| {
                let mut row = subscription_to_json(sub);
                if let Some(obj) = row.as_object_mut() {
                    obj.insert(
                        "days_until".to_string(),
                        json!((sub.next_billing_date - today).num_days()),
                    );
                }
                row
            })
            .collect::<Vec<_>>(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_temp_db, v_array, v_i64, v_str};
    use std::fs;

    fn request(name: &str, cost: &str, cycle: &str, next: &str, category: &str) -> SubscriptionUpsertRequest {
        SubscriptionUpsertRequest {
            name: Some(name.to_string()),
            cost: Some(AmountInput::Text(cost.to_string())),
            billing_cycle: Some(cycle.to_string()),
            next_billing_date: Some(next.to_string()),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn summary_and_upcoming_over_stored_subscriptions() {
        let db_path = migrated_temp_db();
        create_subscription_at_db_path(&db_path, request("Music", "9.99", "monthly", "2026-03-05", "Streaming"))
            .expect("create music");
        create_subscription_at_db_path(&db_path, request("Cloud", "120", "yearly", "2026-03-25", "Software"))
            .expect("create cloud");
        let gym = create_subscription_at_db_path(&db_path, request("Gym", "30", "monthly", "2026-03-02", ""))
            .expect("create gym");
        assert_eq!(v_str(&gym, &["category"]), "Other");

        let mut paused = request("Gym", "30", "monthly", "2026-03-02", "Health");
        paused.id = Some(v_i64(&gym, &["id"]));
        paused.status = Some("paused".to_string());
        let updated = update_subscription_at_db_path(&db_path, paused).expect("pause gym");
        assert_eq!(v_str(&updated, &["status"]), "paused");
        assert_eq!(v_str(&updated, &["category"]), "Health");

        let summary = query_subscription_summary_at_db_path(
            &db_path,
            SubscriptionSummaryQueryRequest {
                today: Some("2026-03-01".to_string()),
            },
        )
        .expect("summary");
        assert_eq!(v_i64(&summary, &["summary", "total_active"]), 2);
        assert_eq!(v_i64(&summary, &["summary", "monthly_cost_cents"]), 999 + 1_000);
        assert_eq!(v_i64(&summary, &["summary", "yearly_cost_cents"]), 11_988 + 12_000);
        assert_eq!(v_i64(&summary, &["summary", "upcoming_this_week"]), 1);
        assert_eq!(v_i64(&summary, &["summary", "upcoming_this_month"]), 2);
        assert_eq!(v_array(&summary, &["summary", "by_category"]).len(), 2);

        let upcoming = query_upcoming_subscriptions_at_db_path(
            &db_path,
            UpcomingSubscriptionsQueryRequest {
                today: Some("2026-03-01".to_string()),
                days: Some(7),
            },
        )
        .expect("upcoming");
        let rows = v_array(&upcoming, &["rows"]);
        assert_eq!(rows.len(), 1);
        assert_eq!(v_str(&rows[0], &["name"]), "Music");
        assert_eq!(v_i64(&rows[0], &["days_until"]), 4);

        let filtered = query_subscriptions_at_db_path(
            &db_path,
            SubscriptionsQueryRequest {
                status: Some("paused".to_string()),
                ..Default::default()
            },
        )
        .expect("filtered list");
        assert_eq!(v_i64(&filtered, &["summary", "count"]), 1);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn summary_reports_both_yearly_figures() {
        let db_path = migrated_temp_db();
        create_subscription_at_db_path(&db_path, request("Domain", "1.00", "yearly", "2026-09-01", "Web"))
            .expect("create domain");

        let summary = query_subscription_summary_at_db_path(
            &db_path,
            SubscriptionSummaryQueryRequest {
                today: Some("2026-03-01".to_string()),
            },
        )
        .expect("summary");
        assert_eq!(v_i64(&summary, &["summary", "monthly_cost_cents"]), 8);
        assert_eq!(v_i64(&summary, &["summary", "yearly_cost_cents"]), 100);
        assert_eq!(v_i64(&summary, &["summary", "monthly_cost_x12_cents"]), 96);
        assert_eq!(v_str(&summary, &["summary", "yearly_cost_basis"]), "billing_cycle");

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn costs_are_capped_and_capped_costs_summarize() {
        let db_path = migrated_temp_db();
        let err = create_subscription_at_db_path(
            &db_path,
            request("Yacht", "100000000000000", "weekly", "2026-03-02", "Leisure"),
        )
        .unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");

        create_subscription_at_db_path(
            &db_path,
            request("Lease", "99999999.99", "weekly", "2026-03-02", "Leisure"),
        )
        .expect("create at cap");
        let summary = query_subscription_summary_at_db_path(
            &db_path,
            SubscriptionSummaryQueryRequest {
                today: Some("2026-03-01".to_string()),
            },
        )
        .expect("summary at cap");
        assert_eq!(v_i64(&summary, &["summary", "monthly_cost_cents"]), 43_299_999_996);
        assert_eq!(v_i64(&summary, &["summary", "yearly_cost_cents"]), 519_599_999_948);

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn invalid_cycle_and_missing_rows_are_rejected() {
        let db_path = migrated_temp_db();
        let err = create_subscription_at_db_path(&db_path, request("X", "1", "daily", "2026-03-01", "A"))
            .unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");

        let err = delete_subscription_at_db_path(&db_path, SubscriptionDeleteRequest { id: Some(99) })
            .unwrap_err();
        assert_eq!(err.category(), "NOT_FOUND_ERROR");

        let mut missing = request("X", "1", "weekly", "2026-03-01", "A");
        missing.id = Some(99);
        assert_eq!(
            update_subscription_at_db_path(&db_path, missing)
                .unwrap_err()
                .category(),
            "NOT_FOUND_ERROR"
        );
        let _ = fs::remove_file(&db_path);
    }
}
