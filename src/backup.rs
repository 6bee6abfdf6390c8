use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::limit_engine::TransactionType;
use crate::preferences::{Currency, PreferencesStore, SqlitePreferencesStore, Theme};
use crate::transactions::{insert_transaction, load_transactions, transaction_to_json, TransactionFilter};
use crate::value_parsing::{
    parse_datetime, parse_optional_text, parse_positive_amount, parse_required_text, AmountInput,
};

const FALLBACK_EXPENSE_CATEGORY: &str = "Other";
const INCOME_CATEGORY: &str = "Income";

#[derive(Debug, Deserialize)]
pub struct BackupTransaction {
    pub amount: Option<AmountInput>,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: Option<String>,
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BackupSettings {
    pub currency: Option<String>,
    pub theme: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BackupImportRequest {
    pub transactions: Option<Vec<BackupTransaction>>,
    pub categories: Option<Vec<String>>,
    pub settings: Option<BackupSettings>,
}

pub fn export_backup_at_db_path(db_path: &Path) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let transactions = load_transactions(
        &conn,
        &TransactionFilter {
            oldest_first: true,
            ..Default::default()
        },
    )?;
    let prefs = SqlitePreferencesStore::new(&conn).load()?;
    info!(transactions = transactions.len(), "backup exported");
    Ok(json!({
        "transactions": transactions.iter().map(transaction_to_json).collect::<Vec<_>>(),
        "categories": prefs.categories,
        "settings": {
            "currency": prefs.currency.code(),
            "theme": prefs.theme.as_str(),
        },
    }))
}

pub fn import_backup_at_db_path(db_path: &Path, req: BackupImportRequest) -> FinanceResult<Value> {
    let (Some(rows), Some(categories), Some(settings)) =
        (req.transactions, req.categories, req.settings)
    else {
        return Err(FinanceError::validation(
            "invalid backup: transactions, categories and settings are required",
        ));
    };

    let mut parsed = Vec::with_capacity(rows.len());
    for (index, row) in rows.into_iter().enumerate() {
        let field = |name: &str| format!("transactions[{index}].{name}");
        let amount_cents = parse_positive_amount(row.amount.as_ref(), &field("amount"))?;
        let tx_type = TransactionType::parse(&parse_required_text(row.tx_type, &field("type"))?)?;
        let category = match (parse_optional_text(row.category), tx_type) {
            (c, _) if !c.is_empty() => c,
            (_, TransactionType::Income) => INCOME_CATEGORY.to_string(),
            (_, TransactionType::Expense) => FALLBACK_EXPENSE_CATEGORY.to_string(),
        };
        let date_text = parse_optional_text(row.date);
        let date = if date_text.is_empty() {
            chrono::Local::now().naive_local()
        } else {
            parse_datetime(&date_text, &field("date"))?
        };
        parsed.push((
            amount_cents,
            parse_optional_text(row.description),
            category,
            tx_type,
            date,
        ));
    }
    let currency = match parse_optional_text(settings.currency) {
        c if c.is_empty() => None,
        c => Some(Currency::parse(&c)?),
    };
    let theme = match parse_optional_text(settings.theme) {
        t if t.is_empty() => None,
        t => Some(Theme::parse(&t)?),
    };
    let categories = categories
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .fold(Vec::<String>::new(), |mut acc, c| {
            if !acc.iter().any(|seen| seen.eq_ignore_ascii_case(&c)) {
                acc.push(c);
            }
            acc
        });

    let mut conn = open_ledger(db_path)?;
    let tx = conn.transaction().context("start backup import")?;
    let removed = tx
        .execute("DELETE FROM transactions", [])
        .context("clear transactions")?;
    for (amount_cents, description, category, tx_type, date) in &parsed {
        insert_transaction(&tx, *amount_cents, description, category, *tx_type, *date)?;
    }
    let store = SqlitePreferencesStore::new(&tx);
    let mut prefs = store.load()?;
    prefs.categories = categories;
    if let Some(currency) = currency {
        prefs.currency = currency;
    }
    if let Some(theme) = theme {
        prefs.theme = theme;
    }
    store.save(&prefs)?;
    tx.commit().context("commit backup import")?;

    info!(
        removed,
        imported = parsed.len(),
        categories = prefs.categories.len(),
        "backup imported"
    );
    Ok(json!({
        "imported_transactions": parsed.len(),
        "removed_transactions": removed,
        "preferences": prefs.to_json(),
    }))
}
