use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::value_parsing::{
    cents_to_text, format_date, parse_date, parse_optional_date, parse_optional_text,
    parse_positive_amount, parse_required_text, resolve_today, AmountInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtType {
    Owe,
    Owed,
}

impl DebtType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owe => "owe",
            Self::Owed => "owed",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "owe" => Ok(Self::Owe),
            "owed" => Ok(Self::Owed),
            _ => Err(FinanceError::validation("type must be one of owe/owed")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtStatus {
    Pending,
    Paid,
}

impl DebtStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            _ => Err(FinanceError::validation("status must be one of pending/paid")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Debt {
    pub id: i64,
    pub person_name: String,
    pub amount_cents: i64,
    pub description: Option<String>,
    pub debt_type: DebtType,
    pub status: DebtStatus,
    pub created_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PersonDebtGroup {
    pub i_owe_cents: i64,
    pub owed_to_me_cents: i64,
    pub pending_count: usize,
    pub oldest_pending_date: Option<NaiveDate>,
    pub oldest_pending_due_date: Option<NaiveDate>,
}

impl PersonDebtGroup {
    pub fn net_cents(&self) -> i64 {
        self.owed_to_me_cents.saturating_sub(self.i_owe_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DebtSummary {
    pub i_owe_cents: i64,
    pub owed_to_me_cents: i64,
    pub pending_count: usize,
    pub by_person: BTreeMap<String, PersonDebtGroup>,
}

impl DebtSummary {
    pub fn net_cents(&self) -> i64 {
        self.owed_to_me_cents.saturating_sub(self.i_owe_cents)
    }
}

pub fn summarize_debts(debts: &[Debt]) -> DebtSummary {
    let mut summary = DebtSummary::default();
    for debt in debts.iter().filter(|d| d.status == DebtStatus::Pending) {
        summary.pending_count += 1;
        let group = summary
            .by_person
            .entry(debt.person_name.clone())
            .or_default();
        group.pending_count += 1;
        match debt.debt_type {
            DebtType::Owe => {
                summary.i_owe_cents = summary.i_owe_cents.saturating_add(debt.amount_cents);
                group.i_owe_cents = group.i_owe_cents.saturating_add(debt.amount_cents);
            }
            DebtType::Owed => {
                summary.owed_to_me_cents = summary.owed_to_me_cents.saturating_add(debt.amount_cents);
                group.owed_to_me_cents = group.owed_to_me_cents.saturating_add(debt.amount_cents);
            }
        }
        let is_older = group
            .oldest_pending_date
            .map_or(true, |oldest| debt.created_date < oldest);
        if is_older {
            group.oldest_pending_date = Some(debt.created_date);
            group.oldest_pending_due_date = debt.due_date;
        }
    }
    summary
}

#[derive(Debug, Default, Deserialize)]
pub struct DebtsQueryRequest {
    pub person: Option<String>,
    #[serde(rename = "type")]
    pub debt_type: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebtCreateRequest {
    pub person_name: Option<String>,
    pub amount: Option<AmountInput>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub debt_type: Option<String>,
    pub status: Option<String>,
    pub created_date: Option<String>,
    pub due_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebtStatusUpdateRequest {
    pub id: Option<i64>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DebtDeleteRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DebtSummaryQueryRequest {
    pub today: Option<String>,
}

struct DebtRow {
    id: i64,
    person_name: String,
    amount_cents: i64,
    description: Option<String>,
    debt_type: String,
    status: String,
    created_date: String,
    due_date: Option<String>,
}

impl DebtRow {
    fn into_debt(self) -> FinanceResult<Debt> {
        let due_date = match self.due_date.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(parse_date(text, "debts.due_date")?),
            _ => None,
        };
        Ok(Debt {
            id: self.id,
            person_name: self.person_name,
            amount_cents: self.amount_cents,
            description: self.description,
            debt_type: DebtType::parse(&self.debt_type)?,
            status: DebtStatus::parse(&self.status)?,
            created_date: parse_date(&self.created_date, "debts.created_date")?,
            due_date,
        })
    }
}

const DEBT_COLUMNS: &str =
    "id, person_name, amount_cents, description, type, status, created_date, due_date";

fn map_debt_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DebtRow> {
    Ok(DebtRow {
        id: row.get(0)?,
        person_name: row.get(1)?,
        amount_cents: row.get(2)?,
        description: row.get(3)?,
        debt_type: row.get(4)?,
        status: row.get(5)?,
        created_date: row.get(6)?,
        due_date: row.get(7)?,
    })
}

#[derive(Debug, Default)]
struct DebtFilter {
    person: Option<String>,
    debt_type: Option<DebtType>,
    status: Option<DebtStatus>,
}

fn load_debts(conn: &Connection, filter: &DebtFilter) -> FinanceResult<Vec<Debt>> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(person) = filter.person.as_ref() {
        conditions.push("person_name = ? COLLATE NOCASE");
        params.push(SqlValue::Text(person.clone()));
    }
    if let Some(debt_type) = filter.debt_type {
        conditions.push("type = ?");
        params.push(SqlValue::Text(debt_type.as_str().to_string()));
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
        "SELECT {DEBT_COLUMNS} FROM debts {where_sql} ORDER BY created_date DESC, id DESC"
    );
    let mut stmt = conn.prepare(&sql).context("query debts")?;
    let iter = stmt
        .query_map(params_from_iter(params.iter()), map_debt_row)
        .context("query debts")?;
    let mut out = Vec::new();
    for row in iter {
        out.push(row.context("read debt row")?.into_debt()?);
    }
    Ok(out)
}

fn load_debt_by_id(conn: &Connection, id: i64) -> FinanceResult<Debt> {
    conn.query_row(
        &format!("SELECT {DEBT_COLUMNS} FROM debts WHERE id = ?1"),
        [id],
        map_debt_row,
    )
    .optional()
    .context("read debt")?
    .ok_or_else(|| FinanceError::not_found(format!("debt {id} not found")))?
    .into_debt()
}

pub(crate) fn load_debt_summary(conn: &Connection) -> FinanceResult<DebtSummary> {
    let pending = load_debts(
        conn,
        &DebtFilter {
            status: Some(DebtStatus::Pending),
            ..Default::default()
        },
    )?;
    Ok(summarize_debts(&pending))
}

fn debt_to_json(debt: &Debt) -> Value {
    json!({
        "id": debt.id,
        "person_name": debt.person_name,
        "amount_cents": debt.amount_cents,
        "amount": cents_to_text(debt.amount_cents),
        "description": debt.description,
        "type": debt.debt_type.as_str(),
        "status": debt.status.as_str(),
        "created_date": format_date(debt.created_date),
        "due_date": debt.due_date.map(format_date),
    })
}

pub(crate) fn debt_totals_to_json(summary: &DebtSummary) -> Value {
    json!({
        "i_owe_cents": summary.i_owe_cents,
        "i_owe": cents_to_text(summary.i_owe_cents),
        "owed_to_me_cents": summary.owed_to_me_cents,
        "owed_to_me": cents_to_text(summary.owed_to_me_cents),
        "net_cents": summary.net_cents(),
        "net": cents_to_text(summary.net_cents()),
        "pending_count": summary.pending_count,
    })
}

fn parse_type_filter(raw: Option<String>) -> FinanceResult<Option<DebtType>> {
    let text = parse_optional_text(raw);
    if text.is_empty() {
        Ok(None)
    } else {
        DebtType::parse(&text).map(Some)
    }
}

fn parse_status_filter(raw: Option<String>) -> FinanceResult<Option<DebtStatus>> {
    let text = parse_optional_text(raw);
    if text.is_empty() {
        Ok(None)
    } else {
        DebtStatus::parse(&text).map(Some)
    }
}

pub fn query_debts_at_db_path(db_path: &Path, req: DebtsQueryRequest) -> FinanceResult<Value> {
    let person = parse_optional_text(req.person);
    let filter = DebtFilter {
        person: (!person.is_empty()).then_some(person),
        debt_type: parse_type_filter(req.debt_type)?,
        status: parse_status_filter(req.status)?,
    };
    let conn = open_ledger(db_path)?;
    let debts = load_debts(&conn, &filter)?;
    debug!(count = debts.len(), "debts listed");
    Ok(json!({
        "summary": { "count": debts.len() },
        "rows": debts.iter().map(debt_to_json).collect::<Vec<_>>(),
    }))
}

pub fn create_debt_at_db_path(db_path: &Path, req: DebtCreateRequest) -> FinanceResult<Value> {
    let person_name = parse_required_text(req.person_name, "person_name")?;
    let amount_cents = parse_positive_amount(req.amount.as_ref(), "amount")?;
    let debt_type = DebtType::parse(&parse_required_text(req.debt_type, "type")?)?;
    let status = parse_status_filter(req.status)?.unwrap_or(DebtStatus::Pending);
    let description = Some(parse_optional_text(req.description)).filter(|d| !d.is_empty());
    let created_date = parse_optional_date(req.created_date, "created_date")?
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let due_date = parse_optional_date(req.due_date, "due_date")?;

    let conn = open_ledger(db_path)?;
    conn.execute(
        r#"
        INSERT INTO debts(person_name, amount_cents, description, type, status, created_date, due_date)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            person_name,
            amount_cents,
            description,
            debt_type.as_str(),
            status.as_str(),
            format_date(created_date),
            due_date.map(format_date),
        ],
    )
    .context("insert debt")?;
    let saved = load_debt_by_id(&conn, conn.last_insert_rowid())?;
    info!(id = saved.id, person = %saved.person_name, debt_type = saved.debt_type.as_str(), "debt created");
    Ok(debt_to_json(&saved))
}

pub fn update_debt_status_at_db_path(
    db_path: &Path,
    req: DebtStatusUpdateRequest,
) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let status = DebtStatus::parse(&parse_required_text(req.status, "status")?)?;
    let conn = open_ledger(db_path)?;
    let before = load_debt_by_id(&conn, id)?;
    conn.execute(
        "UPDATE debts SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
        params![status.as_str(), id],
    )
    .context("update debt status")?;
    let saved = load_debt_by_id(&conn, id)?;
    info!(
        id,
        from = before.status.as_str(),
        to = saved.status.as_str(),
        "debt status updated"
    );
    Ok(debt_to_json(&saved))
}

pub fn delete_debt_at_db_path(db_path: &Path, req: DebtDeleteRequest) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let conn = open_ledger(db_path)?;
    let existing = load_debt_by_id(&conn, id)?;
    conn.execute("DELETE FROM debts WHERE id = ?1", [id])
        .context("delete debt")?;
    info!(id, "debt deleted");
    Ok(json!({
        "deleted": true,
        "debt": debt_to_json(&existing),
    }))
}

pub fn query_debt_summary_at_db_path(
    db_path: &Path,
    req: DebtSummaryQueryRequest,
) -> FinanceResult<Value> {
    let today = resolve_today(req.today)?;
    let conn = open_ledger(db_path)?;
    let summary = load_debt_summary(&conn)?;
    let people = summary
        .by_person
        .iter()
        .map(|(person, group)| {
            json!({
                "person_name": person,
                "i_owe_cents": group.i_owe_cents,
                "owed_to_me_cents": group.owed_to_me_cents,
                "net_cents": group.net_cents(),
                "net": cents_to_text(group.net_cents()),
                "pending_count": group.pending_count,
                "oldest_pending_date": group.oldest_pending_date.map(format_date),
                "days_since_oldest": group.oldest_pending_date.map(|d| (today - d).num_days()),
                "oldest_pending_due_date": group.oldest_pending_due_date.map(format_date),
            })
        })
        .collect::<Vec<_>>();
    Ok(json!({
        "today": format_date(today),
        "summary": debt_totals_to_json(&summary),
        "people": people,
    }))
}
