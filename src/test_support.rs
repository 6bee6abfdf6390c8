use serde_json::Value;
use std::path::PathBuf;
use uuid::Uuid;

use crate::ledger_db::apply_embedded_migrations;

pub(crate) fn create_temp_test_db() -> PathBuf {
    let unique = format!(
        "finance_ledger_test_{}_{}.db",
        std::process::id(),
        Uuid::new_v4()
    );
    std::env::temp_dir().join(unique)
}

pub(crate) fn migrated_temp_db() -> PathBuf {
    let db_path = create_temp_test_db();
    apply_embedded_migrations(&db_path).expect("apply migrations to temp db");
    db_path
}

fn v_at<'a>(v: &'a Value, path: &[&str]) -> &'a Value {
    let mut cur = v;
    for key in path {
        cur = cur
            .get(*key)
            .unwrap_or_else(|| panic!("missing key: {}", key));
    }
    cur
}

pub(crate) fn v_i64(v: &Value, path: &[&str]) -> i64 {
    v_at(v, path)
        .as_i64()
        .unwrap_or_else(|| panic!("expected i64 at path {:?}", path))
}

pub(crate) fn v_str<'a>(v: &'a Value, path: &[&str]) -> &'a str {
    v_at(v, path)
        .as_str()
        .unwrap_or_else(|| panic!("expected str at path {:?}", path))
}

pub(crate) fn v_bool(v: &Value, path: &[&str]) -> bool {
    v_at(v, path)
        .as_bool()
        .unwrap_or_else(|| panic!("expected bool at path {:?}", path))
}

pub(crate) fn v_array<'a>(v: &'a Value, path: &[&str]) -> &'a Vec<Value> {
    v_at(v, path)
        .as_array()
        .unwrap_or_else(|| panic!("expected array at path {:?}", path))
}
