use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::errors::{FinanceError, FinanceResult, ResultExt};
use crate::ledger_db::open_ledger;
use crate::value_parsing::{cents_to_text, parse_required_text};

const PRIVACY_MASK: &str = "------";
const DEFAULT_CATEGORIES: &[&str] = &["Food", "Transportation", "Entertainment", "Bills", "Other"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
    Gbp,
    Inr,
}

impl Currency {
    pub fn code(self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Inr => "INR",
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Usd => "$",
            Self::Eur => "€",
            Self::Gbp => "£",
            Self::Inr => "₹",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_uppercase().as_str() {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "INR" => Ok(Self::Inr),
            _ => Err(FinanceError::validation(
                "currency must be one of USD/EUR/GBP/INR",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(raw: &str) -> FinanceResult<Self> {
        match raw.trim().to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(FinanceError::validation("theme must be one of light/dark")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub currency: Currency,
    pub theme: Theme,
    pub privacy_mode: bool,
    pub sidebar_collapsed: bool,
    pub categories: Vec<String>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            currency: Currency::default(),
            theme: Theme::default(),
            privacy_mode: false,
            sidebar_collapsed: false,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl UserPreferences {
    pub fn to_json(&self) -> Value {
        json!({
            "currency": self.currency.code(),
            "currency_symbol": self.currency.symbol(),
            "theme": self.theme.as_str(),
            "privacy_mode": self.privacy_mode,
            "sidebar_collapsed": self.sidebar_collapsed,
            "categories": self.categories,
        })
    }
}

pub trait PreferencesStore {
    fn load(&self) -> FinanceResult<UserPreferences>;
    fn save(&self, prefs: &UserPreferences) -> FinanceResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferencesStore {
    current: RefCell<UserPreferences>,
}

impl MemoryPreferencesStore {
    pub fn new(prefs: UserPreferences) -> Self {
        Self {
            current: RefCell::new(prefs),
        }
    }
}

impl PreferencesStore for MemoryPreferencesStore {
    fn load(&self) -> FinanceResult<UserPreferences> {
        Ok(self.current.borrow().clone())
    }

    fn save(&self, prefs: &UserPreferences) -> FinanceResult<()> {
        *self.current.borrow_mut() = prefs.clone();
        Ok(())
    }
}

// Missing or unreadable keys fall back to defaults.
pub struct SqlitePreferencesStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePreferencesStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

fn stored_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

impl PreferencesStore for SqlitePreferencesStore<'_> {
    fn load(&self) -> FinanceResult<UserPreferences> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM user_preferences")
            .context("query user_preferences")?;
        let stored = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("query user_preferences")?
            .collect::<Result<HashMap<_, _>, _>>()
            .context("read user_preferences row")?;

        let mut prefs = UserPreferences::default();
        if let Some(raw) = stored.get("currency") {
            match Currency::parse(raw) {
                Ok(currency) => prefs.currency = currency,
                Err(_) => warn!(value = %raw, "ignoring stored currency"),
            }
        }
        if let Some(raw) = stored.get("theme") {
            match Theme::parse(raw) {
                Ok(theme) => prefs.theme = theme,
                Err(_) => warn!(value = %raw, "ignoring stored theme"),
            }
        }
        if let Some(flag) = stored.get("privacy_mode").and_then(|v| stored_bool(v)) {
            prefs.privacy_mode = flag;
        }
        if let Some(flag) = stored.get("sidebar_collapsed").and_then(|v| stored_bool(v)) {
            prefs.sidebar_collapsed = flag;
        }
        if let Some(raw) = stored.get("categories") {
            match serde_json::from_str::<Vec<String>>(raw) {
                Ok(categories) => prefs.categories = categories,
                Err(e) => warn!(error = %e, "ignoring stored categories"),
            }
        }
        Ok(prefs)
    }

    fn save(&self, prefs: &UserPreferences) -> FinanceResult<()> {
        let categories =
            serde_json::to_string(&prefs.categories).context("serialize categories")?;
        let entries = [
            ("currency", prefs.currency.code().to_string()),
            ("theme", prefs.theme.as_str().to_string()),
            ("privacy_mode", prefs.privacy_mode.to_string()),
            ("sidebar_collapsed", prefs.sidebar_collapsed.to_string()),
            ("categories", categories),
        ];
        for (key, value) in entries {
            self.conn
                .execute(
                    r#"
                    INSERT INTO user_preferences(key, value, updated_at)
                    VALUES (?1, ?2, datetime('now'))
                    ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                    "#,
                    params![key, value],
                )
                .context(format!("save preference {key}"))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PreferencesUpdateRequest {
    pub currency: Option<String>,
    pub theme: Option<String>,
    pub privacy_mode: Option<bool>,
    pub sidebar_collapsed: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
}

pub fn update_preferences<S: PreferencesStore>(
    store: &S,
    req: PreferencesUpdateRequest,
) -> FinanceResult<UserPreferences> {
    let mut prefs = store.load()?;
    if let Some(raw) = req.currency {
        prefs.currency = Currency::parse(&raw)?;
    }
    if let Some(raw) = req.theme {
        prefs.theme = Theme::parse(&raw)?;
    }
    if let Some(flag) = req.privacy_mode {
        prefs.privacy_mode = flag;
    }
    if let Some(flag) = req.sidebar_collapsed {
        prefs.sidebar_collapsed = flag;
    }
    store.save(&prefs)?;
    Ok(prefs)
}

fn category_position(prefs: &UserPreferences, name: &str) -> Option<usize> {
    prefs
        .categories
        .iter()
        .position(|c| c.eq_ignore_ascii_case(name))
}

pub fn add_category<S: PreferencesStore>(store: &S, name: &str) -> FinanceResult<UserPreferences> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FinanceError::validation("category name is required"));
    }
    let mut prefs = store.load()?;
    if category_position(&prefs, name).is_some() {
        return Err(FinanceError::conflict(format!(
            "category already exists: {name}"
        )));
    }
    prefs.categories.push(name.to_string());
    store.save(&prefs)?;
    Ok(prefs)
}

pub fn delete_category<S: PreferencesStore>(
    store: &S,
    name: &str,
) -> FinanceResult<UserPreferences> {
    let mut prefs = store.load()?;
    let index = category_position(&prefs, name.trim())
        .ok_or_else(|| FinanceError::not_found(format!("category not found: {}", name.trim())))?;
    prefs.categories.remove(index);
    store.save(&prefs)?;
    Ok(prefs)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn format_amount(cents: i64, prefs: &UserPreferences) -> String {
    let symbol = prefs.currency.symbol();
    if prefs.privacy_mode {
        return format!("{symbol}{PRIVACY_MASK}");
    }
    let text = cents_to_text(cents);
    let (sign, unsigned) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text.as_str()),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, "00"));
    format!("{symbol}{sign}{}.{fraction}", group_thousands(whole))
}

pub fn query_preferences_at_db_path(db_path: &Path) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let prefs = SqlitePreferencesStore::new(&conn).load()?;
    Ok(prefs.to_json())
}

pub fn update_preferences_at_db_path(
    db_path: &Path,
    req: PreferencesUpdateRequest,
) -> FinanceResult<Value> {
    let conn = open_ledger(db_path)?;
    let prefs = update_preferences(&SqlitePreferencesStore::new(&conn), req)?;
    info!(
        currency = prefs.currency.code(),
        theme = prefs.theme.as_str(),
        privacy_mode = prefs.privacy_mode,
        "preferences updated"
    );
    Ok(prefs.to_json())
}

pub fn add_category_at_db_path(db_path: &Path, req: CategoryRequest) -> FinanceResult<Value> {
    let name = parse_required_text(req.name, "name")?;
    let conn = open_ledger(db_path)?;
    let prefs = add_category(&SqlitePreferencesStore::new(&conn), &name)?;
    info!(category = %name, "category added");
    Ok(prefs.to_json())
}

pub fn delete_category_at_db_path(db_path: &Path, req: CategoryRequest) -> FinanceResult<Value> {
    let name = parse_required_text(req.name, "name")?;
    let conn = open_ledger(db_path)?;
    let prefs = delete_category(&SqlitePreferencesStore::new(&conn), &name)?;
    info!(category = %name, "category deleted");
    Ok(prefs.to_json())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{migrated_temp_db, v_array, v_bool, v_str};
    use std::fs;

    #[test]
    fn format_amount_groups_thousands_and_masks_privacy() {
        let mut prefs = UserPreferences::default();
        assert_eq!(format_amount(123_456, &prefs), "$1,234.56");
        assert_eq!(format_amount(5, &prefs), "$0.05");
        assert_eq!(format_amount(-100_000_000, &prefs), "$-1,000,000.00");
        prefs.currency = Currency::Inr;
        assert_eq!(format_amount(99_900, &prefs), "₹999.00");
        prefs.privacy_mode = true;
        assert_eq!(format_amount(99_900, &prefs), "₹------");
    }

    #[test]
    fn memory_store_round_trips_partial_updates() {
        let store = MemoryPreferencesStore::default();
        let prefs = update_preferences(
            &store,
            PreferencesUpdateRequest {
                theme: Some("dark".to_string()),
                ..Default::default()
            },
        )
        .expect("update theme");
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.currency, Currency::Usd);

        let err = update_preferences(
            &store,
            PreferencesUpdateRequest {
                currency: Some("JPY".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.category(), "VALIDATION_ERROR");
        assert_eq!(store.load().expect("load").theme, Theme::Dark);
    }

    #[test]
    fn categories_reject_duplicates_and_missing_names() {
        let store = MemoryPreferencesStore::default();
        let prefs = add_category(&store, "Health").expect("add category");
        assert_eq!(prefs.categories.last().map(String::as_str), Some("Health"));
        assert_eq!(
            add_category(&store, "food").unwrap_err().category(),
            "CONFLICT_ERROR"
        );
        let prefs = delete_category(&store, "Bills").expect("delete category");
        assert!(!prefs.categories.iter().any(|c| c == "Bills"));
        assert_eq!(
            delete_category(&store, "Bills").unwrap_err().category(),
            "NOT_FOUND_ERROR"
        );
    }

    #[test]
    fn sqlite_store_persists_between_connections() {
        let db_path = migrated_temp_db();
        let initial = query_preferences_at_db_path(&db_path).expect("defaults");
        assert_eq!(v_str(&initial, &["currency"]), "USD");
        assert_eq!(v_array(&initial, &["categories"]).len(), 5);

        update_preferences_at_db_path(
            &db_path,
            PreferencesUpdateRequest {
                currency: Some("eur".to_string()),
                privacy_mode: Some(true),
                ..Default::default()
            },
        )
        .expect("update");
        add_category_at_db_path(
            &db_path,
            CategoryRequest {
                name: Some("Travel".to_string()),
            },
        )
        .expect("add category");

        let reloaded = query_preferences_at_db_path(&db_path).expect("reload");
        assert_eq!(v_str(&reloaded, &["currency"]), "EUR");
        assert_eq!(v_str(&reloaded, &["currency_symbol"]), "€");
        assert!(v_bool(&reloaded, &["privacy_mode"]));
        assert_eq!(v_array(&reloaded, &["categories"]).len(), 6);

        let _ = fs::remove_file(&db_path);
    }
}
