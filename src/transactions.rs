use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::limit_engine::{Transaction, TransactionType};
use crate::value_parsing::{
    cents_to_text, format_date, format_datetime, parse_datetime, parse_limit,
    parse_optional_date, parse_optional_text, parse_positive_amount, parse_required_text,
    resolve_today, AmountInput,
};

const INCOME_CATEGORY: &str = "Income";
const DEFAULT_LIST_LIMIT: u32 = 500;
const MAX_LIST_LIMIT: u32 = 5000;

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsQueryRequest {
    pub limit: Option<u32>,
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionCreateRequest {
    pub amount: Option<AmountInput>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionDeleteRequest {
    pub id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MonthlyStatsQueryRequest {
    pub today: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct TransactionFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub category: Option<String>,
    pub tx_type: Option<TransactionType>,
    pub keyword: Option<String>,
    pub limit: Option<u32>,
    pub oldest_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyStats {
    pub month_income_cents: i64,
    pub month_expenses_cents: i64,
    pub total_income_cents: i64,
    pub total_expenses_cents: i64,
}

impl MonthlyStats {
    pub fn balance_cents(&self) -> i64 {
        self.total_income_cents.saturating_sub(self.total_expenses_cents)
    }
}

struct TransactionRow {
    id: i64,
    amount_cents: i64,
    description: String,
    category: String,
    tx_type: String,
    date: String,
}

impl TransactionRow {
    fn into_transaction(self) -> FinanceResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            amount_cents: self.amount_cents,
            description: self.description,
            category: self.category,
            tx_type: TransactionType::parse(&self.tx_type)?,
            date: parse_datetime(&self.date, "transactions.date")?,
        })
    }
}

pub(crate) fn transaction_to_json(tx: &Transaction) -> Value {
    json!({
        "id": tx.id,
        "amount_cents": tx.amount_cents,
        "amount": cents_to_text(tx.amount_cents),
        "description": tx.description,
        "category": tx.category,
        "type": tx.tx_type.as_str(),
        "date": format_datetime(tx.date),
    })
}

pub(crate) fn load_transactions(
    conn: &Connection,
    filter: &TransactionFilter,
) -> FinanceResult<Vec<Transaction>> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut params: Vec<SqlValue> = Vec::new();
    if let Some(from) = filter.from {
        conditions.push("substr(date, 1, 10) >= ?");
        params.push(SqlValue::Text(format_date(from)));
    }
    if let Some(to) = filter.to {
        conditions.push("substr(date, 1, 10) <= ?");
        params.push(SqlValue::Text(format_date(to)));
    }
    if let Some(category) = filter.category.as_ref().filter(|c| !c.is_empty()) {
        conditions.push("category = ?");
        params.push(SqlValue::Text(category.clone()));
    }
    if let Some(tx_type) = filter.tx_type {
        conditions.push("type = ?");
        params.push(SqlValue::Text(tx_type.as_str().to_string()));
    }
    if let Some(keyword) = filter.keyword.as_ref().filter(|k| !k.is_empty()) {
        conditions.push("description LIKE ?");
        params.push(SqlValue::Text(format!("%{keyword}%")));
    }
    let where_sql = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    let order_sql = if filter.oldest_first {
        "ORDER BY date ASC, id ASC"
    } else {
        "ORDER BY date DESC, id DESC"
    };
    let limit_sql = match filter.limit {
        Some(limit) => {
            params.push(SqlValue::Integer(i64::from(limit)));
            "LIMIT ?"
        }
        None => "",
    };

    let sql = format!(
        r#"
        SELECT id, amount_cents, description, category, type, date
        FROM transactions
        {where_sql}
        {order_sql}
        {limit_sql}
        "#
    );
    let mut stmt = conn.prepare(&sql).context("query transactions")?;
    let iter = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(TransactionRow {
                id: row.get::<_, i64>(0)?,
                amount_cents: row.get::<_, i64>(1)?,
                description: row.get::<_, String>(2)?,
                category: row.get::<_, String>(3)?,
                tx_type: row.get::<_, String>(4)?,
                date: row.get::<_, String>(5)?,
            })
        })
        .context("query transactions")?;
    let mut out = Vec::new();
    for row in iter {
        out.push(row.context("read transaction row")?.into_transaction()?);
    }
    Ok(out)
}

fn load_transaction_by_id(conn: &Connection, id: i64) -> FinanceResult<Transaction> {
    let row = conn
        .query_row(
            "SELECT id, amount_cents, description, category, type, date FROM transactions WHERE id = ?1",
            [id],
            |row| {
                Ok(TransactionRow {
                    id: row.get::<_, i64>(0)?,
                    amount_cents: row.get::<_, i64>(1)?,
                    description: row.get::<_, String>(2)?,
                    category: row.get::<_, String>(3)?,
                    tx_type: row.get::<_, String>(4)?,
                    date: row.get::<_, String>(5)?,
                })
            },
        )
        .optional()
        .context("read transaction")?
        .ok_or_else(|| FinanceError::not_found(format!("transaction {id} not found")))?;
    row.into_transaction()
}

pub(crate) fn insert_transaction(
    conn: &Connection,
    amount_cents: i64,
    description: &str,
    category: &str,
    tx_type: TransactionType,
    date: NaiveDateTime,
) -> FinanceResult<i64> {
    conn.execute(
        r#"
        INSERT INTO transactions(amount_cents, description, category, type, date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            amount_cents,
            description,
            category,
            tx_type.as_str(),
            format_datetime(date)
        ],
    )
    .context("insert transaction")?;
    Ok(conn.last_insert_rowid())
}

pub(crate) fn parse_type_filter(raw: Option<String>) -> FinanceResult<Option<TransactionType>> {
    let text = parse_optional_text(raw);
    if text.is_empty() {
        return Ok(None);
    }
    TransactionType::parse(&text).map(Some)
}

pub fn query_transactions_at_db_path(
    db_path: &Path,
    req: TransactionsQueryRequest,
) -> FinanceResult<Value> {
    let filter = TransactionFilter {
        from: parse_optional_date(req.from_date, "from")?,
        to: parse_optional_date(req.to_date, "to")?,
        category: Some(parse_optional_text(req.category)),
        tx_type: parse_type_filter(req.tx_type)?,
        keyword: Some(parse_optional_text(req.keyword)),
        limit: Some(parse_limit(req.limit, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT)),
        oldest_first: false,
    };
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(FinanceError::validation("from must not be later than to"));
        }
    }

    let conn = open_ledger(db_path)?;
    let rows = load_transactions(&conn, &filter)?;
    debug!(count = rows.len(), "transactions listed");

    Ok(json!({
        "summary": {
            "count": rows.len(),
            "limit": filter.limit,
        },
        "rows": rows.iter().map(transaction_to_json).collect::<Vec<_>>(),
    }))
}

pub fn create_transaction_at_db_path(
    db_path: &Path,
    req: TransactionCreateRequest,
) -> FinanceResult<Value> {
    let amount_cents = parse_positive_amount(req.amount.as_ref(), "amount")?;
    let description = parse_required_text(req.description, "description")?;
    let tx_type = TransactionType::parse(&parse_required_text(req.tx_type, "type")?)?;
    let category = match tx_type {
        TransactionType::Income => {
            let text = parse_optional_text(req.category);
            if text.is_empty() {
                INCOME_CATEGORY.to_string()
            } else {
                text
            }
        }
        TransactionType::Expense => parse_required_text(req.category, "category")?,
    };
    let date_text = parse_optional_text(req.date);
    let date = if date_text.is_empty() {
        chrono::Local::now().naive_local()
    } else {
        parse_datetime(&date_text, "date")?
    };

    let conn = open_ledger(db_path)?;
    let id = insert_transaction(&conn, amount_cents, &description, &category, tx_type, date)?;
    let saved = load_transaction_by_id(&conn, id)?;
    info!(id, category = %saved.category, tx_type = saved.tx_type.as_str(), "transaction created");
    Ok(transaction_to_json(&saved))
}

pub fn delete_transaction_at_db_path(
    db_path: &Path,
    req: TransactionDeleteRequest,
) -> FinanceResult<Value> {
    let id = req
        .id
        .ok_or_else(|| FinanceError::validation("id is required"))?;
    let conn = open_ledger(db_path)?;
    let existing = load_transaction_by_id(&conn, id)?;
    conn.execute("DELETE FROM transactions WHERE id = ?1", [id])
        .context("delete transaction")?;
    info!(id, "transaction deleted");
    Ok(json!({
        "deleted": true,
        "transaction": transaction_to_json(&existing),
    }))
}

pub(crate) fn load_monthly_stats(conn: &Connection, today: NaiveDate) -> FinanceResult<MonthlyStats> {
    let month_key = today.format("%Y-%m").to_string();
    conn.query_row(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN type = 'income' AND substr(date, 1, 7) = ?1 THEN amount_cents END), 0),
            COALESCE(SUM(CASE WHEN type = 'expense' AND substr(date, 1, 7) = ?1 THEN amount_cents END), 0),
            COALESCE(SUM(CASE WHEN type = 'income' THEN amount_cents END), 0),
            COALESCE(SUM(CASE WHEN type = 'expense' THEN amount_cents END), 0)
        FROM transactions
        "#,
        [month_key.as_str()],
        |row| {
            Ok(MonthlyStats {
                month_income_cents: row.get::<_, i64>(0)?,
                month_expenses_cents: row.get::<_, i64>(1)?,
                total_income_cents: row.get::<_, i64>(2)?,
                total_expenses_cents: row.get::<_, i64>(3)?,
            })
        },
    )
    .context("aggregate monthly stats")
}

pub(crate) fn monthly_stats_to_json(stats: &MonthlyStats, today: NaiveDate) -> Value {
    json!({
        "month_key": today.format("%Y-%m").to_string(),
        "income_cents": stats.month_income_cents,
        "income": cents_to_text(stats.month_income_cents),
        "expenses_cents": stats.month_expenses_cents,
        "expenses": cents_to_text(stats.month_expenses_cents),
        "balance_cents": stats.balance_cents(),
        "balance": cents_to_text(stats.balance_cents()),
    })
}

pub fn query_monthly_stats_at_db_path(
    db_path: &Path,
    req: MonthlyStatsQueryRequest,
) -> FinanceResult<Value> {
    let today = resolve_today(req.today)?;
    let conn = open_ledger(db_path)?;
    let stats = load_monthly_stats(&conn, today)?;
    Ok(monthly_stats_to_json(&stats, today))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_temp_db, v_array, v_i64, v_str};
    use std::fs;

    fn seed_transactions(db_path: &Path) {
        let conn = Connection::open(db_path).expect("open seeded db");
        conn.execute_batch(
            r#"
            INSERT INTO transactions(amount_cents, description, category, type, date) VALUES
              (300000, 'Salary', 'Income', 'income', '2026-02-28 09:00:00'),
              (4550, 'Groceries', 'Food', 'expense', '2026-03-02 18:30:00'),
              (12000, 'Electricity', 'Bills', 'expense', '2026-03-05 08:00:00'),
              (250000, 'Salary', 'Income', 'income', '2026-03-28 09:00:00'),
              (1999, 'Cinema', 'Entertainment', 'expense', '2026-04-01 20:00:00');
            "#,
        )
        .expect("seed transactions");
    }

    #[test]
    fn list_filters_by_range_category_and_type() {
        let db_path = migrated_temp_db();
        seed_transactions(&db_path);

        let all = query_transactions_at_db_path(&db_path, TransactionsQueryRequest::default())
            .expect("list all");
        assert_eq!(v_i64(&all, &["summary", "count"]), 5);
        let rows = v_array(&all, &["rows"]);
        assert_eq!(v_str(&rows[0], &["description"]), "Cinema");

        let march_expenses = query_transactions_at_db_path(
            &db_path,
            TransactionsQueryRequest {
                from_date: Some("2026-03-01".to_string()),
                to_date: Some("2026-03-31".to_string()),
                tx_type: Some("expense".to_string()),
                ..Default::default()
            },
        )
        .expect("list march expenses");
        assert_eq!(v_i64(&march_expenses, &["summary", "count"]), 2);

        let keyword = query_transactions_at_db_path(
            &db_path,
            TransactionsQueryRequest {
                keyword: Some("Sal".to_string()),
                ..Default::default()
            },
        )
        .expect("keyword search");
        assert_eq!(v_i64(&keyword, &["summary", "count"]), 2);

        let bad_range = query_transactions_at_db_path(
            &db_path,
            TransactionsQueryRequest {
                from_date: Some("2026-04-01".to_string()),
                to_date: Some("2026-03-01".to_string()),
                ..Default::default()
            },
        );
        assert!(bad_range.is_err());

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn create_defaults_income_category_and_validates_input() {
        let db_path = migrated_temp_db();

        let created = create_transaction_at_db_path(
            &db_path,
            TransactionCreateRequest {
                amount: Some(AmountInput::Number(1500.0)),
                description: Some("Bonus".to_string()),
                tx_type: Some("income".to_string()),
                date: Some("2026-03-10".to_string()),
                ..Default::default()
            },
        )
        .expect("create income");
        assert_eq!(v_str(&created, &["category"]), "Income");
        assert_eq!(v_i64(&created, &["amount_cents"]), 150_000);
        assert_eq!(v_str(&created, &["date"]), "2026-03-10 00:00:00");

        let missing_category = create_transaction_at_db_path(
            &db_path,
            TransactionCreateRequest {
                amount: Some(AmountInput::Text("10".to_string())),
                description: Some("Snack".to_string()),
                tx_type: Some("expense".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(missing_category.unwrap_err().category(), "VALIDATION_ERROR");

        let negative = create_transaction_at_db_path(
            &db_path,
            TransactionCreateRequest {
                amount: Some(AmountInput::Text("-10".to_string())),
                description: Some("Snack".to_string()),
                category: Some("Food".to_string()),
                tx_type: Some("expense".to_string()),
                ..Default::default()
            },
        );
        assert!(negative.is_err());

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn delete_reports_missing_rows() {
        let db_path = migrated_temp_db();
        seed_transactions(&db_path);

        let deleted =
            delete_transaction_at_db_path(&db_path, TransactionDeleteRequest { id: Some(2) })
                .expect("delete");
        assert_eq!(v_str(&deleted, &["transaction", "description"]), "Groceries");

        let again = delete_transaction_at_db_path(&db_path, TransactionDeleteRequest { id: Some(2) });
        assert_eq!(again.unwrap_err().category(), "NOT_FOUND_ERROR");

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn monthly_stats_use_current_month_and_all_time_balance() {
        let db_path = migrated_temp_db();
        seed_transactions(&db_path);

        let stats = query_monthly_stats_at_db_path(
            &db_path,
            MonthlyStatsQueryRequest {
                today: Some("2026-03-15".to_string()),
            },
        )
        .expect("monthly stats");
        assert_eq!(v_i64(&stats, &["income_cents"]), 250_000);
        assert_eq!(v_i64(&stats, &["expenses_cents"]), 16_550);
        assert_eq!(
            v_i64(&stats, &["balance_cents"]),
            550_000 - 4550 - 12000 - 1999
        );

        let _ = fs::remove_file(&db_path);
    }
}
