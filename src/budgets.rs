use rusqlite::params;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::value_parsing::{
    cents_to_text, format_date, parse_non_negative_amount, parse_required_date,
    parse_required_text, AmountInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct BudgetCreateRequest {
    pub category: Option<String>,
    pub amount: Option<AmountInput>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

fn budget_row_to_json(
    id: i64,
    category: &str,
    amount_cents: i64,
    start_date: &str,
    end_date: &str,
) -> Value {
    json!({
        "id": id,
        "category": category,
        "amount_cents": amount_cents,
        "amount": cents_to_text(amount_cents),
        "start_date": start_date,
        "end_date": end_date,
    })
}

pub fn query_budgets_at_db_path(db_path: &Path) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, category, amount_cents, start_date, end_date
            FROM budgets
            ORDER BY start_date DESC, id DESC
            "#,
        )
        .context("query budgets")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(budget_row_to_json(
                row.get::<_, i64>(0)?,
                &row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                &row.get::<_, String>(3)?,
                &row.get::<_, String>(4)?,
            ))
        })
        .context("query budgets")?
        .collect::<Result<Vec<_>, _>>()
        .context("read budget row")?;
    debug!(count = rows.len(), "budgets listed");
    Ok(json!({
        "summary": { "count": rows.len() },
        "rows": rows,
    }))
}

pub fn create_budget_at_db_path(db_path: &Path, req: BudgetCreateRequest) -> FinanceResult<Value> {
    let category = parse_required_text(req.category, "category")?;
    if req.amount.is_none() {
        return Err(FinanceError::validation("amount is required"));
    }
    let amount_cents = parse_non_negative_amount(req.amount.as_ref(), "amount", 0)?;
    let start = parse_required_date(req.start_date, "start_date")?;
    let end = parse_required_date(req.end_date, "end_date")?;
    if start > end {
        return Err(FinanceError::validation(
            "start_date must not be later than end_date",
        ));
    }
    let start_text = format_date(start);
    let end_text = format_date(end);

    let conn = open_ledger(db_path)?;
    conn.execute(
        "INSERT INTO budgets(category, amount_cents, start_date, end_date) VALUES (?1, ?2, ?3, ?4)",
        params![category, amount_cents, start_text, end_text],
    )
    .context("insert budget")?;
    let id = conn.last_insert_rowid();
    info!(id, category = %category, "budget created");
    Ok(budget_row_to_json(
        id,
        &category,
        amount_cents,
        &start_text,
        &end_text,
    ))
}
