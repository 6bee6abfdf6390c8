use chrono::{Datelike, Duration, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::limit_engine::{
    compute_exceeded_transactions, compute_limit_statuses, count_statuses, ExceededTransaction,
    ExpenseLimit, LimitStatus, LimitStatusCounts, PeriodType, Transaction, TransactionType,
};
use crate::transactions::{load_transactions, transaction_to_json, TransactionFilter};
use crate::value_parsing::{
    cents_to_text, format_date, parse_date, parse_non_negative_amount, parse_optional_date,
    parse_optional_text, parse_required_text, AmountInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseLimitUpsertRequest {
    pub category: Option<String>,
    pub limit_amount: Option<AmountInput>,
    pub period_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub period_start: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpenseLimitDeleteRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpenseLimitStatusQueryRequest {
    pub category: Option<String>,
    pub filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExceededTransactionsQueryRequest {
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusView {
    All,
    Exceeded,
    Within,
}

impl StatusView {
    fn parse(raw: Option<String>) -> FinanceResult<Self> {
        match parse_optional_text(raw).to_lowercase().as_str() {
            "" | "all" => Ok(Self::All),
            "exceeded" => Ok(Self::Exceeded),
            "within" => Ok(Self::Within),
            _ => Err(FinanceError::validation(
                "filter must be one of all/exceeded/within",
            )),
        }
    }

    fn keeps(self, status: &LimitStatus) -> bool {
        match self {
            Self::All => true,
            Self::Exceeded => status.exceeded,
            Self::Within => !status.exceeded,
        }
    }
}

fn first_of_month(year: i32, month: u32) -> FinanceResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| FinanceError::validation("period start is out of range"))
}

fn next_month_start(date: NaiveDate) -> FinanceResult<NaiveDate> {
    if date.month() == 12 {
        first_of_month(date.year() + 1, 1)
    } else {
        first_of_month(date.year(), date.month() + 1)
    }
}

// Yearly windows close on the last day of the month before the start month,
// one year on: 2026-03-15 runs through 2027-02-28.
pub fn derive_period(
    period_type: PeriodType,
    start: NaiveDate,
    explicit_end: Option<NaiveDate>,
) -> FinanceResult<(NaiveDate, NaiveDate)> {
    let end = match period_type {
        PeriodType::Monthly => next_month_start(start)? - Duration::days(1),
        PeriodType::Yearly => first_of_month(start.year() + 1, start.month())? - Duration::days(1),
        PeriodType::Custom => explicit_end
            .ok_or_else(|| FinanceError::validation("end_date is required for custom limits"))?,
    };
    if start > end {
        return Err(FinanceError::validation(
            "start_date must not be later than end_date",
        ));
    }
    Ok((start, end))
}

struct LimitRow {
    id: i64,
    category: String,
    limit_amount_cents: i64,
    period_type: String,
    start_date: String,
    end_date: String,
}

impl LimitRow {
    fn into_limit(self) -> FinanceResult<ExpenseLimit> {
        Ok(ExpenseLimit {
            id: self.id,
            category: self.category,
            limit_amount_cents: self.limit_amount_cents,
            period_type: PeriodType::parse(&self.period_type)?,
            start_date: parse_date(&self.start_date, "expense_limits.start_date")?,
            end_date: parse_date(&self.end_date, "expense_limits.end_date")?,
        })
    }
}

fn map_limit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LimitRow> {
    Ok(LimitRow {
        id: row.get::<_, i64>(0)?,
        category: row.get::<_, String>(1)?,
        limit_amount_cents: row.get::<_, i64>(2)?,
        period_type: row.get::<_, String>(3)?,
        start_date: row.get::<_, String>(4)?,
        end_date: row.get::<_, String>(5)?,
    })
}

pub(crate) fn load_expense_limits(conn: &Connection) -> FinanceResult<Vec<ExpenseLimit>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, category, limit_amount_cents, period_type, start_date, end_date
            FROM expense_limits
            ORDER BY start_date DESC, id DESC
            "#,
        )
        .context("query expense limits")?;
    let iter = stmt
        .query_map([], map_limit_row)
        .context("query expense limits")?;
    let mut out = Vec::new();
    for row in iter {
        out.push(row.context("read expense limit row")?.into_limit()?);
    }
    Ok(out)
}

fn load_expense_limit_by_id(conn: &Connection, id: i64) -> FinanceResult<ExpenseLimit> {
    conn.query_row(
        r#"
        SELECT id, category, limit_amount_cents, period_type, start_date, end_date
        FROM expense_limits
        WHERE id = ?1
        "#,
        [id],
        map_limit_row,
    )
    .optional()
    .context("read expense limit")?
    .ok_or_else(|| FinanceError::not_found(format!("expense limit {id} not found")))?
    .into_limit()
}

pub(crate) fn load_expense_snapshot(
    conn: &Connection,
) -> FinanceResult<Vec<Transaction>> {
    load_transactions(
        conn,
        &TransactionFilter {
            tx_type: Some(TransactionType::Expense),
            oldest_first: true,
            ..Default::default()
        },
    )
}

fn limit_to_json(limit: &ExpenseLimit) -> Value {
    json!({
        "id": limit.id,
        "category": limit.category,
        "limit_amount_cents": limit.limit_amount_cents,
        "limit_amount": cents_to_text(limit.limit_amount_cents),
        "period_type": limit.period_type.as_str(),
        "start_date": format_date(limit.start_date),
        "end_date": format_date(limit.end_date),
    })
}

fn limit_status_to_json(status: &LimitStatus) -> Value {
    json!({
        "id": status.id,
        "category": status.category,
        "limit_amount_cents": status.limit_amount_cents,
        "limit_amount": cents_to_text(status.limit_amount_cents),
        "spent_cents": status.spent_cents,
        "spent": cents_to_text(status.spent_cents),
        "remaining_cents": status.remaining_cents,
        "remaining": cents_to_text(status.remaining_cents),
        "exceeded": status.exceeded,
        "exceeded_by_cents": status.exceeded_by_cents,
        "exceeded_by": cents_to_text(status.exceeded_by_cents),
        "period_type": status.period_type.as_str(),
        "start_date": format_date(status.start_date),
        "end_date": format_date(status.end_date),
    })
}

fn exceeded_transaction_to_json(item: &ExceededTransaction) -> Value {
    let mut row = transaction_to_json(&item.transaction);
    if let Some(obj) = row.as_object_mut() {
        obj.insert("limit_id".to_string(), json!(item.limit_id));
        obj.insert(
            "limit_amount_cents".to_string(),
            json!(item.limit_amount_cents),
        );
        obj.insert(
            "limit_amount".to_string(),
            json!(cents_to_text(item.limit_amount_cents)),
        );
        obj.insert(
            "running_total_cents".to_string(),
            json!(item.running_total_cents),
        );
        obj.insert(
            "exceeded_by_cents".to_string(),
            json!(item.exceeded_by_cents),
        );
        obj.insert(
            "exceeded_by".to_string(),
            json!(cents_to_text(item.exceeded_by_cents)),
        );
        obj.insert("period_type".to_string(), json!(item.period_type.as_str()));
        obj.insert("start_date".to_string(), json!(format_date(item.start_date)));
        obj.insert("end_date".to_string(), json!(format_date(item.end_date)));
    }
    row
}

pub(crate) fn counts_to_json(counts: &LimitStatusCounts) -> Value {
    json!({
        "active": counts.active,
        "exceeded": counts.exceeded,
        "on_track": counts.on_track,
    })
}

pub fn upsert_expense_limit_at_db_path(
    db_path: &Path,
    req: ExpenseLimitUpsertRequest,
) -> FinanceResult<Value> {
    let category = parse_required_text(req.category, "category")?;
    if req.limit_amount.is_none() {
        return Err(FinanceError::validation("limit_amount is required"));
    }
    let limit_amount_cents = parse_non_negative_amount(req.limit_amount.as_ref(), "limit_amount", 0)?;
    let period_type = PeriodType::parse(&parse_required_text(req.period_type, "period_type")?)?;
    let start_date = parse_optional_date(req.start_date, "start_date")?;
    let period_start = parse_optional_date(req.period_start, "period_start")?;
    let end_date = parse_optional_date(req.end_date, "end_date")?;

    let start = match period_type {
        PeriodType::Custom => start_date.ok_or_else(|| {
            FinanceError::validation("start_date is required for custom limits")
        })?,
        PeriodType::Monthly | PeriodType::Yearly => period_start.or(start_date).ok_or_else(|| {
            FinanceError::validation("period_start or start_date is required")
        })?,
    };
    let (start, end) = derive_period(period_type, start, end_date)?;
    let start_text = format_date(start);
    let end_text = format_date(end);

    let mut conn = open_ledger(db_path)?;
    let tx = conn.transaction().context("start expense limit upsert")?;
    let existing_id = tx
        .query_row(
            "SELECT id FROM expense_limits WHERE category = ?1 AND start_date = ?2 AND end_date = ?3",
            params![category, start_text, end_text],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .context("look up expense limit")?;
    let (id, replaced) = match existing_id {
        Some(id) => {
            tx.execute(
                r#"
                UPDATE expense_limits
                SET limit_amount_cents = ?1, period_type = ?2, updated_at = datetime('now')
                WHERE id = ?3
                "#,
                params![limit_amount_cents, period_type.as_str(), id],
            )
            .context("replace expense limit")?;
            (id, true)
        }
        None => {
            tx.execute(
                r#"
                INSERT INTO expense_limits(category, limit_amount_cents, period_type, start_date, end_date)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    category,
                    limit_amount_cents,
                    period_type.as_str(),
                    start_text,
                    end_text
                ],
            )
            .context("insert expense limit")?;
            (tx.last_insert_rowid(), false)
        }
    };
    tx.commit().context("commit expense limit upsert")?;

    let saved = load_expense_limit_by_id(&conn, id)?;
    info!(
        id,
        category = %saved.category,
        period_type = saved.period_type.as_str(),
        replaced,
        "expense limit saved"
    );
    Ok(json!({
        "replaced": replaced,
        "limit": limit_to_json(&saved),
    }))
}

pub fn query_expense_limits_at_db_path(db_path: &Path) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let limits = load_expense_limits(&conn)?;
    debug!(count = limits.len(), "expense limits listed");
    Ok(json!({
        "summary": { "count": limits.len() },
        "rows": limits.iter().map(limit_to_json).collect::<Vec<_>>(),
    }))
}

pub fn delete_expense_limit_at_db_path(
    db_path: &Path,
    req: ExpenseLimitDeleteRequest,
) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let conn = open_ledger(db_path)?;
    let existing = load_expense_limit_by_id(&conn, id)?;
    conn.execute("DELETE FROM expense_limits WHERE id = ?1", [id])
        .context("delete expense limit")?;
    info!(id, category = %existing.category, "expense limit deleted");
    Ok(json!({
        "deleted": true,
        "limit": limit_to_json(&existing),
    }))
}

pub(crate) fn load_limit_status_counts(conn: &Connection) -> FinanceResult<LimitStatusCounts> {
    let limits = load_expense_limits(conn)?;
    let transactions = load_expense_snapshot(conn)?;
    Ok(count_statuses(&compute_limit_statuses(&limits, &transactions)))
}

pub fn query_expense_limit_status_at_db_path(
    db_path: &Path,
    req: ExpenseLimitStatusQueryRequest,
) -> FinanceResult<Value> {
    let view = StatusView::parse(req.filter)?;
    let category = parse_optional_text(req.category);

    let conn = open_ledger(db_path)?;
    let limits = load_expense_limits(&conn)?;
    let transactions = load_expense_snapshot(&conn)?;
    let statuses = compute_limit_statuses(&limits, &transactions);
    let counts = count_statuses(&statuses);
    let rows = statuses
        .iter()
        .filter(|s| category.is_empty() || s.category == category)
        .filter(|s| view.keeps(s))
        .map(limit_status_to_json)
        .collect::<Vec<_>>();
    debug!(
        limits = limits.len(),
        transactions = transactions.len(),
        exceeded = counts.exceeded,
        "expense limit status computed"
    );
    Ok(json!({
        "summary": counts_to_json(&counts),
        "rows": rows,
    }))
}

pub fn query_exceeded_transactions_at_db_path(
    db_path: &Path,
    req: ExceededTransactionsQueryRequest,
) -> FinanceResult<Value> {
    let category = parse_optional_text(req.category);

    let conn = open_ledger(db_path)?;
    let limits = load_expense_limits(&conn)?
        .into_iter()
        .filter(|l| category.is_empty() || l.category == category)
        .collect::<Vec<_>>();
    let transactions = load_expense_snapshot(&conn)?;
    let flagged = compute_exceeded_transactions(&limits, &transactions);
    debug!(count = flagged.len(), "exceeded transactions computed");
    Ok(json!({
        "summary": { "count": flagged.len() },
        "rows": flagged.iter().map(exceeded_transaction_to_json).collect::<Vec<_>>(),
    }))
}
