use chrono::{Datelike, NaiveDate};
use csv::{Terminator, WriterBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::limit_engine::{Transaction, TransactionType};
use crate::transactions::{load_transactions, transaction_to_json, TransactionFilter};
use crate::value_parsing::{
    cents_to_text, format_date, format_datetime, parse_optional_date, parse_optional_text,
    resolve_today, round_to,
};

const CSV_HEADERS: &[&str] = &["date", "description", "category", "type", "amount"];

#[derive(Debug, Default, Deserialize)]
pub struct ReportQueryRequest {
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    pub today: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportExportRequest {
    #[serde(rename = "from")]
    pub from_date: Option<String>,
    #[serde(rename = "to")]
    pub to_date: Option<String>,
    pub today: Option<String>,
    pub output_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyTotals {
    pub income_cents: i64,
    pub expense_cents: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryShare {
    pub category: String,
    pub amount_cents: i64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub income_cents: i64,
    pub expense_cents: i64,
    pub daily: BTreeMap<NaiveDate, DailyTotals>,
    pub expense_by_category: Vec<CategoryShare>,
}

impl PeriodReport {
    pub fn net_cents(&self) -> i64 {
        self.income_cents.saturating_sub(self.expense_cents)
    }
}

fn resolve_range(
    from: Option<String>,
    to: Option<String>,
    today: Option<String>,
) -> FinanceResult<(NaiveDate, NaiveDate)> {
    let today = resolve_today(today)?;
    let from = parse_optional_date(from, "from")?.unwrap_or_else(|| today.with_day(1).unwrap_or(today));
    let to = parse_optional_date(to, "to")?.unwrap_or(today);
    if from > to {
        return Err(FinanceError::validation("from must not be later than to"));
    }
    Ok((from, to))
}

pub fn build_period_report(from: NaiveDate, to: NaiveDate, transactions: &[Transaction]) -> PeriodReport {
    let mut income_cents = 0_i64;
    let mut expense_cents = 0_i64;
    let mut daily = BTreeMap::<NaiveDate, DailyTotals>::new();
    let mut by_category = HashMap::<String, i64>::new();

    for tx in transactions {
        let day = tx.date.date();
        if day < from || day > to {
            continue;
        }
        let bucket = daily.entry(day).or_default();
        match tx.tx_type {
            TransactionType::Income => {
                income_cents = income_cents.saturating_add(tx.amount_cents);
                bucket.income_cents = bucket.income_cents.saturating_add(tx.amount_cents);
            }
            TransactionType::Expense => {
                expense_cents = expense_cents.saturating_add(tx.amount_cents);
                bucket.expense_cents = bucket.expense_cents.saturating_add(tx.amount_cents);
                let total = by_category.entry(tx.category.clone()).or_insert(0);
                *total = total.saturating_add(tx.amount_cents);
            }
        }
    }

    let mut expense_by_category = by_category
        .into_iter()
        .map(|(category, amount_cents)| CategoryShare {
            share: if expense_cents > 0 {
                round_to(amount_cents as f64 / expense_cents as f64, 4)
            } else {
                0.0
            },
            category,
            amount_cents,
        })
        .collect::<Vec<_>>();
    expense_by_category.sort_by(|a, b| {
        b.amount_cents
            .cmp(&a.amount_cents)
            .then_with(|| a.category.cmp(&b.category))
    });

    PeriodReport {
        from,
        to,
        income_cents,
        expense_cents,
        daily,
        expense_by_category,
    }
}

fn load_range(conn: &rusqlite::Connection, from: NaiveDate, to: NaiveDate) -> FinanceResult<Vec<Transaction>> {
    load_transactions(
        conn,
        &TransactionFilter {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        },
    )
}

pub fn query_report_at_db_path(db_path: &Path, req: ReportQueryRequest) -> FinanceResult<Value> {
    let (from, to) = resolve_range(req.from_date, req.to_date, req.today)?;
    let conn = open_ledger(db_path)?;
    let transactions = load_range(&conn, from, to)?;
    let report = build_period_report(from, to, &transactions);
    debug!(
        from = %format_date(from),
        to = %format_date(to),
        rows = transactions.len(),
        "report built"
    );

    let daily = report
        .daily
        .iter()
        .map(|(day, totals)| {
            json!({
                "date": format_date(*day),
                "income_cents": totals.income_cents,
                "expense_cents": totals.expense_cents,
            })
        })
        .collect::<Vec<_>>();
    let distribution = report
        .expense_by_category
        .iter()
        .map(|share| {
            json!({
                "category": share.category,
                "amount_cents": share.amount_cents,
                "amount": cents_to_text(share.amount_cents),
                "share": share.share,
            })
        })
        .collect::<Vec<_>>();

    Ok(json!({
        "range": {
            "from": format_date(from),
            "to": format_date(to),
        },
        "summary": {
            "income_cents": report.income_cents,
            "income": cents_to_text(report.income_cents),
            "expense_cents": report.expense_cents,
            "expense": cents_to_text(report.expense_cents),
            "net_cents": report.net_cents(),
            "net": cents_to_text(report.net_cents()),
            "transaction_count": transactions.len(),
        },
        "daily": daily,
        "expense_by_category": distribution,
        "rows": transactions.iter().map(transaction_to_json).collect::<Vec<_>>(),
    }))
}

fn write_csv<W: Write>(writer: W, transactions: &[Transaction]) -> FinanceResult<()> {
    let mut csv_writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(writer);
    csv_writer
        .write_record(CSV_HEADERS)
        .context("write csv header")?;
    for tx in transactions {
        csv_writer
            .write_record([
                format_datetime(tx.date),
                tx.description.clone(),
                tx.category.clone(),
                tx.tx_type.as_str().to_string(),
                cents_to_text(tx.amount_cents),
            ])
            .context("write csv row")?;
    }
    csv_writer.flush().context("flush csv")?;
    Ok(())
}

pub fn export_report_csv_at_db_path(
    db_path: &Path,
    req: ReportExportRequest,
) -> FinanceResult<Value> {
    let (from, to) = resolve_range(req.from_date, req.to_date, req.today)?;
    let output_path = parse_optional_text(req.output_path);
    let conn = open_ledger(db_path)?;
    let transactions = load_range(&conn, from, to)?;
    let filename = format!("report_{}_{}.csv", format_date(from), format_date(to));

    if output_path.is_empty() {
        let mut buf = Vec::<u8>::new();
        write_csv(&mut buf, &transactions)?;
        let text = String::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            .context("encode csv")?;
        return Ok(json!({
            "filename": filename,
            "row_count": transactions.len(),
            "csv": text,
        }));
    }

    let path = PathBuf::from(&output_path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .context(format!("create export dir {}", parent.to_string_lossy()))?;
    }
    let file = std::fs::File::create(&path)
        .context(format!("create export file {}", path.to_string_lossy()))?;
    write_csv(file, &transactions)?;
    info!(path = %path.to_string_lossy(), rows = transactions.len(), "report csv exported");
    Ok(json!({
        "filename": filename,
        "row_count": transactions.len(),
        "output_path": path.to_string_lossy().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_temp_db, v_array, v_i64, v_str};
    use rusqlite::Connection;
    use std::fs;

    fn seed(db_path: &Path) {
        let conn = Connection::open(db_path).expect("open seeded db");
        conn.execute_batch(
            r#"
            INSERT INTO transactions(amount_cents, description, category, type, date) VALUES
              (200000, 'Salary', 'Income', 'income', '2026-03-01 09:00:00'),
              (4500, 'Groceries', 'Food', 'expense', '2026-03-01 18:00:00'),
              (12000, 'Power, water', 'Bills', 'expense', '2026-03-03 08:00:00'),
              (1500, 'Coffee', 'Food', 'expense', '2026-03-03 09:30:00'),
              (9900, 'Old', 'Food', 'expense', '2026-02-27 09:30:00');
            "#,
        )
        .expect("seed report rows");
    }

    #[test]
    fn report_defaults_to_month_to_date() {
        let db_path = migrated_temp_db();
        seed(&db_path);

        let report = query_report_at_db_path(
            &db_path,
            ReportQueryRequest {
                today: Some("2026-03-15".to_string()),
                ..Default::default()
            },
        )
        .expect("report");
        assert_eq!(v_str(&report, &["range", "from"]), "2026-03-01");
        assert_eq!(v_i64(&report, &["summary", "expense_cents"]), 18_000);
        assert_eq!(v_i64(&report, &["summary", "net_cents"]), 182_000);

        let daily = v_array(&report, &["daily"]);
        assert_eq!(daily.len(), 2);
        assert_eq!(v_i64(&daily[1], &["expense_cents"]), 13_500);

        let dist = v_array(&report, &["expense_by_category"]);
        assert_eq!(v_str(&dist[0], &["category"]), "Bills");
        assert_eq!(v_i64(&dist[1], &["amount_cents"]), 6_000);

        let rows = v_array(&report, &["rows"]);
        assert_eq!(v_str(&rows[0], &["description"]), "Coffee");

        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn csv_export_quotes_fields_and_writes_files() {
        let db_path = migrated_temp_db();
        seed(&db_path);

        let inline = export_report_csv_at_db_path(
            &db_path,
            ReportExportRequest {
                from_date: Some("2026-03-03".to_string()),
                to_date: Some("2026-03-03".to_string()),
                ..Default::default()
            },
        )
        .expect("inline csv");
        assert_eq!(v_i64(&inline, &["row_count"]), 2);
        let text = v_str(&inline, &["csv"]);
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("date,description,category,type,amount"));
        assert_eq!(
            lines.next(),
            Some("2026-03-03 09:30:00,Coffee,Food,expense,15.00")
        );
        assert_eq!(
            lines.next(),
            Some("2026-03-03 08:00:00,\"Power, water\",Bills,expense,120.00")
        );

        let out = std::env::temp_dir().join(format!("finance_ledger_export_{}.csv", uuid::Uuid::new_v4()));
        let written = export_report_csv_at_db_path(
            &db_path,
            ReportExportRequest {
                from_date: Some("2026-02-01".to_string()),
                to_date: Some("2026-03-31".to_string()),
                output_path: Some(out.to_string_lossy().to_string()),
                ..Default::default()
            },
        )
        .expect("file csv");
        assert_eq!(v_i64(&written, &["row_count"]), 5);
        let contents = fs::read_to_string(&out).expect("read export");
        assert_eq!(contents.lines().count(), 6);

        let _ = fs::remove_file(&out);
        let _ = fs::remove_file(&db_path);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let db_path = migrated_temp_db();
        let err = query_report_at_db_path(
            &db_path,
            ReportQueryRequest {
                from_date: Some("2026-03-10".to_string()),
                to_date: Some("2026-03-01".to_string()),
                today: None,
            },
        )
        .unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");
        let _ = fs::remove_file(&db_path);
    }
}
