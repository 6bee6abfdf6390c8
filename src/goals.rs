use rusqlite::{params, Connection};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::value_parsing::{
    cents_to_text, format_date, parse_non_negative_amount, parse_optional_date,
    parse_optional_text, parse_positive_amount, parse_required_text, round_to, AmountInput,
};

#[derive(Debug, Default, Deserialize)]
pub struct GoalCreateRequest {
    pub name: Option<String>,
    pub target_amount: Option<AmountInput>,
    pub current_amount: Option<AmountInput>,
    pub deadline: Option<String>,
    pub status: Option<String>,
}

struct GoalRow {
    id: i64,
    name: String,
    target_amount_cents: i64,
    current_amount_cents: i64,
    deadline: Option<String>,
    status: String,
    created_at: String,
}

fn parse_goal_status(raw: Option<String>) -> FinanceResult<String> {
    let status = parse_optional_text(raw).to_lowercase();
    match status.as_str() {
        "" => Ok("active".to_string()),
        "active" | "completed" | "cancelled" => Ok(status),
        _ => Err(FinanceError::validation(
            "status must be one of active/completed/cancelled",
        )),
    }
}

fn goal_to_json(goal: &GoalRow) -> Value {
    let remaining_cents = goal
        .target_amount_cents
        .saturating_sub(goal.current_amount_cents)
        .max(0);
    let progress_ratio = if goal.target_amount_cents > 0 {
        round_to(
            goal.current_amount_cents as f64 / goal.target_amount_cents as f64,
            4,
        )
    } else {
        0.0
    };
    json!({
        "id": goal.id,
        "name": goal.name,
        "target_amount_cents": goal.target_amount_cents,
        "target_amount": cents_to_text(goal.target_amount_cents),
        "current_amount_cents": goal.current_amount_cents,
        "current_amount": cents_to_text(goal.current_amount_cents),
        "remaining_cents": remaining_cents,
        "remaining": cents_to_text(remaining_cents),
        "progress_ratio": progress_ratio,
        "deadline": goal.deadline,
        "status": goal.status,
        "created_at": goal.created_at,
    })
}

fn load_goals(conn: &Connection, id: Option<i64>) -> FinanceResult<Vec<GoalRow>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, name, target_amount_cents, current_amount_cents, deadline, status, created_at
            FROM goals
            WHERE (?1 IS NULL OR id = ?1)
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .context("query goals")?;
    let rows = stmt
        .query_map([id], |row| {
            Ok(GoalRow {
                id: row.get(0)?,
                name: row.get(1)?,
                target_amount_cents: row.get(2)?,
                current_amount_cents: row.get(3)?,
                deadline: row.get(4)?,
                status: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .context("query goals")?
        .collect::<Result<Vec<_>, _>>()
        .context("read goal row")?;
    Ok(rows)
}

pub fn query_goals_at_db_path(db_path: &Path) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let goals = load_goals(&conn, None)?;
    let target_total: i64 = goals.iter().map(|g| g.target_amount_cents).sum();
    let saved_total: i64 = goals.iter().map(|g| g.current_amount_cents).sum();
    debug!(count = goals.len(), "goals listed");
    Ok(json!({
        "summary": {
            "count": goals.len(),
            "target_total_cents": target_total,
            "target_total": cents_to_text(target_total),
            "saved_total_cents": saved_total,
            "saved_total": cents_to_text(saved_total),
        },
        "rows": goals.iter().map(goal_to_json).collect::<Vec<_>>(),
    }))
}

pub fn create_goal_at_db_path(db_path: &Path, req: GoalCreateRequest) -> FinanceResult<Value> {
    let name = parse_required_text(req.name, "name")?;
    let target_amount_cents = parse_positive_amount(req.target_amount.as_ref(), "target_amount")?;
    let current_amount_cents =
        parse_non_negative_amount(req.current_amount.as_ref(), "current_amount", 0)?;
    let deadline = parse_optional_date(req.deadline, "deadline")?.map(format_date);
    let status = parse_goal_status(req.status)?;

    let conn = open_ledger(db_path)?;
    conn.execute(
        r#"
        INSERT INTO goals(name, target_amount_cents, current_amount_cents, deadline, status)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![name, target_amount_cents, current_amount_cents, deadline, status],
    )
    .context("insert goal")?;
    let id = conn.last_insert_rowid();
    let saved = load_goals(&conn, Some(id))?
        .into_iter()
        .next()
        .ok_or_else(|| FinanceError::not_found(format!("goal {id} not found")))?;
    info!(id, name = %saved.name, "goal created");
    Ok(goal_to_json(&saved))
}
