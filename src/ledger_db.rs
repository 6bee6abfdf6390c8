use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::errors::{FinanceError, FinanceResult, ResultExt};

pub const ADMIN_RESET_CONFIRM_PHRASE: &str = "RESET FINANCE LEDGER";
const ADMIN_TRANSACTION_RESET_SCOPES: &[&str] = &["transactions"];
const ADMIN_DATA_TABLES: &[&str] = &[
    "transactions",
    "expense_limits",
    "budgets",
    "goals",
    "debts",
    "subscriptions",
];

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_init.sql",
        include_str!("../migrations/0001_init.sql"),
    ),
    (
        "0002_limits_debts_subscriptions.sql",
        include_str!("../migrations/0002_limits_debts_subscriptions.sql"),
    ),
    (
        "0003_user_preferences.sql",
        include_str!("../migrations/0003_user_preferences.sql"),
    ),
];

#[derive(Debug, Serialize)]
pub struct LedgerDbStatus {
    pub db_path: String,
    pub exists: bool,
    pub migration_files: Vec<String>,
    pub applied_versions: Vec<String>,
    pub pending_versions: Vec<String>,
    pub schema_migrations_table_exists: bool,
    pub ready: bool,
}

#[derive(Debug, Serialize)]
pub struct LedgerDbMigrateResult {
    pub db_path: String,
    pub created: bool,
    pub applied_now: Vec<String>,
    pub skipped: Vec<String>,
    pub applied_total: usize,
    pub pending_total: usize,
}

#[derive(Debug, Serialize)]
pub struct LedgerAdminDbStatsSummary {
    pub table_count: usize,
    pub total_rows: i64,
}

#[derive(Debug, Serialize)]
pub struct LedgerAdminDbTableCountRow {
    pub table: String,
    pub row_count: i64,
}

#[derive(Debug, Serialize)]
pub struct LedgerAdminDbStatsResult {
    pub db_path: String,
    pub confirm_phrase: String,
    pub summary: LedgerAdminDbStatsSummary,
    pub rows: Vec<LedgerAdminDbTableCountRow>,
}

#[derive(Debug, Serialize)]
pub struct LedgerAdminResetSummary {
    pub table_count: usize,
    pub total_rows_before: i64,
    pub total_rows_after: i64,
    pub deleted_rows: i64,
}

#[derive(Debug, Serialize)]
pub struct LedgerAdminResetResult {
    pub db_path: String,
    pub scopes: Vec<String>,
    pub summary: LedgerAdminResetSummary,
    pub before_rows: Vec<LedgerAdminDbTableCountRow>,
    pub after_rows: Vec<LedgerAdminDbTableCountRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LedgerAdminResetRequest {
    pub confirm_text: Option<String>,
}

pub fn open_ledger(db_path: &Path) -> FinanceResult<Connection> {
    if !db_path.exists() {
        return Err(FinanceError::not_found(format!(
            "database does not exist: {} (run ledger migration first)",
            db_path.to_string_lossy()
        )));
    }
    let conn = Connection::open(db_path).context("open database")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("enable foreign_keys")?;
    Ok(conn)
}

fn ensure_schema_migrations_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        "#,
    )
}

fn has_schema_migrations_table(conn: &Connection) -> rusqlite::Result<bool> {
    let exists = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_migrations')",
            [],
            |row| row.get::<_, i64>(0),
        )
        .map(|v| v != 0)?;
    Ok(exists)
}

fn load_applied_versions(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version ASC")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    let mut versions = Vec::new();
    for row in rows {
        versions.push(row?);
    }
    Ok(versions)
}

fn list_non_system_tables(conn: &Connection) -> FinanceResult<HashSet<String>> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
        .context("read sqlite_master")?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .context("query sqlite_master")?;
    let mut names = HashSet::new();
    for row in rows {
        names.insert(row.context("read table name")?);
    }
    Ok(names)
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn existing_data_tables(conn: &Connection, candidates: &[&str]) -> FinanceResult<Vec<String>> {
    let existing = list_non_system_tables(conn)?;
    Ok(candidates
        .iter()
        .filter(|name| existing.contains(**name))
        .map(|name| (*name).to_string())
        .collect())
}

fn build_admin_table_counts(
    conn: &Connection,
    tables: &[String],
) -> FinanceResult<Vec<LedgerAdminDbTableCountRow>> {
    let mut rows = Vec::new();
    for table in tables {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row_count = conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .context(format!("count rows of {table}"))?;
        rows.push(LedgerAdminDbTableCountRow {
            table: table.clone(),
            row_count,
        });
    }
    Ok(rows)
}

pub fn query_admin_db_stats_at_path(db_path: &Path) -> FinanceResult<LedgerAdminDbStatsResult> {
    let conn = open_ledger(db_path)?;
    let tables = existing_data_tables(&conn, ADMIN_DATA_TABLES)?;
    let rows = build_admin_table_counts(&conn, &tables)?;
    let total_rows = rows.iter().map(|r| r.row_count).sum::<i64>();
    debug!(tables = rows.len(), total_rows, "admin db stats");

    Ok(LedgerAdminDbStatsResult {
        db_path: db_path.to_string_lossy().to_string(),
        confirm_phrase: ADMIN_RESET_CONFIRM_PHRASE.to_string(),
        summary: LedgerAdminDbStatsSummary {
            table_count: rows.len(),
            total_rows,
        },
        rows,
    })
}

fn check_confirm_phrase(confirm_text: &str) -> FinanceResult<()> {
    if confirm_text.trim() != ADMIN_RESET_CONFIRM_PHRASE {
        warn!("admin reset rejected: confirm phrase mismatch");
        return Err(FinanceError::validation(format!(
            "confirm_text is incorrect, please enter: {ADMIN_RESET_CONFIRM_PHRASE}"
        )));
    }
    Ok(())
}

fn reset_tables(
    db_path: &Path,
    confirm_text: &str,
    candidates: &[&str],
) -> FinanceResult<LedgerAdminResetResult> {
    check_confirm_phrase(confirm_text)?;
    let mut conn = open_ledger(db_path)?;
    let tables = existing_data_tables(&conn, candidates)?;

    let before_rows = build_admin_table_counts(&conn, &tables)?;
    {
        let tx = conn.transaction().context("begin reset transaction")?;
        for table in &tables {
            let sql = format!("DELETE FROM {}", quote_ident(table));
            tx.execute(&sql, [])
                .context(format!("clear table {table}"))?;
        }
        tx.commit().context("commit reset transaction")?;
    }
    let after_rows = build_admin_table_counts(&conn, &tables)?;

    let total_before = before_rows.iter().map(|r| r.row_count).sum::<i64>();
    let total_after = after_rows.iter().map(|r| r.row_count).sum::<i64>();
    let deleted_rows = total_before - total_after;
    info!(tables = tables.len(), deleted_rows, "ledger tables reset");

    Ok(LedgerAdminResetResult {
        db_path: db_path.to_string_lossy().to_string(),
        scopes: tables.clone(),
        summary: LedgerAdminResetSummary {
            table_count: tables.len(),
            total_rows_before: total_before,
            total_rows_after: total_after,
            deleted_rows,
        },
        before_rows,
        after_rows,
    })
}

// Preferences survive a full reset.
pub fn reset_admin_db_data_at_path(
    db_path: &Path,
    req: LedgerAdminResetRequest,
) -> FinanceResult<LedgerAdminResetResult> {
    reset_tables(
        db_path,
        req.confirm_text.unwrap_or_default().as_str(),
        ADMIN_DATA_TABLES,
    )
}

pub fn reset_admin_transaction_data_at_path(
    db_path: &Path,
    req: LedgerAdminResetRequest,
) -> FinanceResult<LedgerAdminResetResult> {
    reset_tables(
        db_path,
        req.confirm_text.unwrap_or_default().as_str(),
        ADMIN_TRANSACTION_RESET_SCOPES,
    )
}

pub fn inspect_status_at_path(db_path: &Path) -> FinanceResult<LedgerDbStatus> {
    let migration_files = MIGRATIONS
        .iter()
        .map(|(v, _)| (*v).to_string())
        .collect::<Vec<_>>();
    let exists = db_path.exists();
    if !exists {
        return Ok(LedgerDbStatus {
            db_path: db_path.to_string_lossy().to_string(),
            exists: false,
            migration_files: migration_files.clone(),
            applied_versions: Vec::new(),
            pending_versions: migration_files,
            schema_migrations_table_exists: false,
            ready: false,
        });
    }

    let conn = Connection::open(db_path).context("open database")?;
    let schema_table_exists =
        has_schema_migrations_table(&conn).context("check schema_migrations")?;

    let applied_versions = if schema_table_exists {
        load_applied_versions(&conn).context("read schema_migrations")?
    } else {
        Vec::new()
    };
    let applied_set = applied_versions.iter().cloned().collect::<HashSet<_>>();
    let pending_versions = migration_files
        .iter()
        .filter(|v| !applied_set.contains(*v))
        .cloned()
        .collect::<Vec<_>>();

    Ok(LedgerDbStatus {
        db_path: db_path.to_string_lossy().to_string(),
        exists: true,
        migration_files,
        applied_versions,
        pending_versions: pending_versions.clone(),
        schema_migrations_table_exists: schema_table_exists,
        ready: pending_versions.is_empty(),
    })
}

pub fn apply_embedded_migrations(db_path: &Path) -> FinanceResult<LedgerDbMigrateResult> {
    let created = !db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).context("create database directory")?;
        }
    }

    let mut conn = Connection::open(db_path).context("open database")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .context("enable foreign_keys")?;
    ensure_schema_migrations_table(&conn).context("initialise schema_migrations")?;

    let already = load_applied_versions(&conn)
        .context("read applied migrations")?
        .into_iter()
        .collect::<HashSet<_>>();

    let mut applied_now = Vec::new();
    let mut skipped = Vec::new();

    for (version, sql) in MIGRATIONS {
        if already.contains(*version) {
            skipped.push((*version).to_string());
            continue;
        }
        let tx = conn
            .transaction()
            .context(format!("begin migration ({version})"))?;
        tx.execute_batch(sql)
            .context(format!("apply migration ({version})"))?;
        tx.execute(
            "INSERT INTO schema_migrations(version) VALUES (?1)",
            [*version],
        )
        .context(format!("record schema_migrations ({version})"))?;
        tx.commit()
            .context(format!("commit migration ({version})"))?;
        info!(version = *version, "migration applied");
        applied_now.push((*version).to_string());
    }

    let final_applied_total = load_applied_versions(&conn)
        .context("read migration result")?
        .len();
    let pending_total = MIGRATIONS.len().saturating_sub(final_applied_total);

    Ok(LedgerDbMigrateResult {
        db_path: db_path.to_string_lossy().to_string(),
        created,
        applied_now,
        skipped,
        applied_total: final_applied_total,
        pending_total,
    })
}
