use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::store::{Filter, Record, RecordStore, StoreError};

/// Columns that hold structured JSON as text. Parsed back to real
/// values on read so callers never see double-encoded strings.
const JSON_COLUMNS: &[&str] = &["meta", "materials", "component_info", "data"];

fn table_columns(table: &str) -> Option<&'static [&'static str]> {
    match table {
        "courses" => Some(&["id", "slug", "title", "description", "meta"]),
        "phases" => Some(&["id", "course_id", "name", "description", "position", "meta"]),
        "projects" => Some(&[
            "id",
            "course_id",
            "phase_id",
            "slug",
            "title",
            "description",
            "materials",
            "code",
            "component_info",
            "position",
        ]),
        "components" => Some(&["course_id", "key", "data"]),
        _ => None,
    }
}

/// SQLite-backed `RecordStore`. One file per workspace, schema created
/// on open, additive column upgrades for stores written by older
/// builds.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(workspace)?;
        let conn = Connection::open(workspace.join("content.sqlite3"))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS courses(
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                meta TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS phases(
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                position INTEGER NOT NULL,
                meta TEXT,
                UNIQUE(course_id, name),
                FOREIGN KEY(course_id) REFERENCES courses(id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_phases_course ON phases(course_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS projects(
                id TEXT PRIMARY KEY,
                course_id TEXT NOT NULL,
                phase_id TEXT NOT NULL,
                slug TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                materials TEXT,
                code TEXT,
                component_info TEXT,
                position INTEGER NOT NULL DEFAULT 0,
                UNIQUE(course_id, slug),
                FOREIGN KEY(course_id) REFERENCES courses(id),
                FOREIGN KEY(phase_id) REFERENCES phases(id)
            )",
            [],
        )?;
        // Stores created before the side channel existed lack this column.
        ensure_projects_component_info(&conn)?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_projects_course ON projects(course_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_projects_phase ON projects(phase_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS components(
                course_id TEXT NOT NULL,
                key TEXT NOT NULL,
                data TEXT,
                PRIMARY KEY(course_id, key),
                FOREIGN KEY(course_id) REFERENCES courses(id)
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    fn row_err(table: &str, e: impl std::fmt::Display) -> StoreError {
        StoreError::row(table, e.to_string())
    }
}

fn ensure_projects_component_info(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "projects", "component_info")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE projects ADD COLUMN component_info TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn json_to_sql(value: &JsonValue) -> SqlValue {
    match value {
        JsonValue::Null => SqlValue::Null,
        JsonValue::Bool(b) => SqlValue::Integer(*b as i64),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        JsonValue::String(s) => SqlValue::Text(s.clone()),
        structured => SqlValue::Text(structured.to_string()),
    }
}

fn sql_to_json(value: SqlValue, column: &str) -> JsonValue {
    match value {
        SqlValue::Null => JsonValue::Null,
        SqlValue::Integer(i) => JsonValue::from(i),
        SqlValue::Real(f) => JsonValue::from(f),
        SqlValue::Text(s) => {
            if JSON_COLUMNS.contains(&column) {
                serde_json::from_str(&s).unwrap_or(JsonValue::String(s))
            } else {
                JsonValue::String(s)
            }
        }
        SqlValue::Blob(_) => JsonValue::Null,
    }
}

fn known_columns(table: &str) -> Result<&'static [&'static str], StoreError> {
    table_columns(table).ok_or_else(|| StoreError::UnknownTable(table.to_string()))
}

fn check_filter_columns(table: &str, filters: &[Filter]) -> Result<(), StoreError> {
    let columns = known_columns(table)?;
    for f in filters {
        if !columns.contains(&f.column.as_str()) {
            return Err(StoreError::row(
                table,
                format!("unknown filter column: {}", f.column),
            ));
        }
    }
    Ok(())
}

fn where_clause(filters: &[Filter]) -> (String, Vec<SqlValue>) {
    if filters.is_empty() {
        return (String::new(), Vec::new());
    }
    let clause = filters
        .iter()
        .map(|f| format!("{} = ?", f.column))
        .collect::<Vec<_>>()
        .join(" AND ");
    let params = filters.iter().map(|f| json_to_sql(&f.value)).collect();
    (format!(" WHERE {}", clause), params)
}

/// Fill a uuid primary key when the caller did not supply one.
/// `components` is keyed naturally and has no id column.
fn ensure_row_id(table: &str, record: &mut Record) {
    if table == "components" {
        return;
    }
    let missing = !matches!(record.get("id"), Some(JsonValue::String(s)) if !s.is_empty());
    if missing {
        record.insert(
            "id".to_string(),
            JsonValue::String(Uuid::new_v4().to_string()),
        );
    }
}

impl RecordStore for SqliteStore {
    fn select(&self, table: &str, filters: &[Filter]) -> Result<Vec<Record>, StoreError> {
        let columns = known_columns(table)?;
        check_filter_columns(table, filters)?;
        let (where_sql, params) = where_clause(filters);
        let sql = format!("SELECT {} FROM {}{}", columns.join(", "), table, where_sql);

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| Self::row_err(table, e))?;
        let mut rows = stmt
            .query(rusqlite::params_from_iter(params))
            .map_err(|e| Self::row_err(table, e))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Self::row_err(table, e))? {
            let mut record = Record::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i).map_err(|e| Self::row_err(table, e))?;
                record.insert(column.to_string(), sql_to_json(value, column));
            }
            out.push(record);
        }
        Ok(out)
    }

    fn insert(&self, table: &str, mut record: Record) -> Result<Record, StoreError> {
        let columns = known_columns(table)?;
        ensure_row_id(table, &mut record);

        let present: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| record.contains_key(*c))
            .collect();
        if present.is_empty() {
            return Err(StoreError::row(table, "empty record"));
        }
        let placeholders = vec!["?"; present.len()].join(", ");
        let sql = format!(
            "INSERT INTO {}({}) VALUES({})",
            table,
            present.join(", "),
            placeholders
        );
        let params: Vec<SqlValue> = present
            .iter()
            .map(|c| json_to_sql(record.get(*c).unwrap_or(&JsonValue::Null)))
            .collect();

        self.conn
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| Self::row_err(table, e))?;
        Ok(record)
    }

    fn update(
        &self,
        table: &str,
        filters: &[Filter],
        patch: Record,
    ) -> Result<Record, StoreError> {
        let columns = known_columns(table)?;
        check_filter_columns(table, filters)?;

        let assigned: Vec<&str> = columns
            .iter()
            .copied()
            .filter(|c| *c != "id" && patch.contains_key(*c))
            .collect();
        if assigned.is_empty() {
            return Err(StoreError::row(table, "empty patch"));
        }

        let set_sql = assigned
            .iter()
            .map(|c| format!("{} = ?", c))
            .collect::<Vec<_>>()
            .join(", ");
        let (where_sql, where_params) = where_clause(filters);
        let sql = format!("UPDATE {} SET {}{}", table, set_sql, where_sql);

        let mut params: Vec<SqlValue> = assigned
            .iter()
            .map(|c| json_to_sql(patch.get(*c).unwrap_or(&JsonValue::Null)))
            .collect();
        params.extend(where_params);

        self.conn
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| Self::row_err(table, e))?;

        let rows = self.select(table, filters)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::row(table, "updated row not found"))
    }

    fn upsert(
        &self,
        table: &str,
        records: Vec<Record>,
        conflict_columns: &[&str],
    ) -> Result<Vec<Record>, StoreError> {
        let columns = known_columns(table)?;
        if conflict_columns.is_empty() {
            return Err(StoreError::row(table, "upsert needs conflict columns"));
        }

        let mut out = Vec::with_capacity(records.len());
        for mut record in records {
            ensure_row_id(table, &mut record);

            let present: Vec<&str> = columns
                .iter()
                .copied()
                .filter(|c| record.contains_key(*c))
                .collect();
            let updates: Vec<String> = present
                .iter()
                .filter(|c| **c != "id" && !conflict_columns.contains(*c))
                .map(|c| format!("{c} = excluded.{c}"))
                .collect();
            let placeholders = vec!["?"; present.len()].join(", ");
            let action = if updates.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", updates.join(", "))
            };
            let sql = format!(
                "INSERT INTO {}({}) VALUES({}) ON CONFLICT({}) {}",
                table,
                present.join(", "),
                placeholders,
                conflict_columns.join(", "),
                action
            );
            let params: Vec<SqlValue> = present
                .iter()
                .map(|c| json_to_sql(record.get(*c).unwrap_or(&JsonValue::Null)))
                .collect();

            self.conn
                .execute(&sql, rusqlite::params_from_iter(params))
                .map_err(|e| Self::row_err(table, e))?;

            // On conflict the existing row (and its id) wins; read the
            // authoritative row back by natural key.
            let filters: Vec<Filter> = conflict_columns
                .iter()
                .map(|c| {
                    Filter::eq(
                        *c,
                        record.get(*c).cloned().unwrap_or(JsonValue::Null),
                    )
                })
                .collect();
            let mut rows = self.select(table, &filters)?;
            match rows.pop() {
                Some(row) => out.push(row),
                None => out.push(record),
            }
        }
        Ok(out)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<(), StoreError> {
        known_columns(table)?;
        check_filter_columns(table, filters)?;
        let (where_sql, params) = where_clause(filters);
        let sql = format!("DELETE FROM {}{}", table, where_sql);
        self.conn
            .execute(&sql, rusqlite::params_from_iter(params))
            .map_err(|e| Self::row_err(table, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn course_record(slug: &str) -> Record {
        let mut record = Record::new();
        record.insert("slug".to_string(), json!(slug));
        record.insert("title".to_string(), json!("Robotics"));
        record.insert("description".to_string(), json!(""));
        record.insert("meta".to_string(), json!({ "key": "robotics" }));
        record
    }

    #[test]
    fn insert_fills_missing_id_and_roundtrips_json_columns() {
        let store = SqliteStore::open_in_memory().expect("open");
        let inserted = store.insert("courses", course_record("robotics")).expect("insert");
        let id = inserted.get("id").and_then(|v| v.as_str()).expect("id");
        assert!(!id.is_empty());

        let rows = store
            .select("courses", &[Filter::eq("slug", "robotics")])
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["meta"]["key"], "robotics");
    }

    #[test]
    fn upsert_by_natural_key_keeps_the_original_id() {
        let store = SqliteStore::open_in_memory().expect("open");
        let first = store
            .upsert("courses", vec![course_record("robotics")], &["slug"])
            .expect("first upsert");
        let first_id = first[0]["id"].as_str().expect("id").to_string();

        let mut changed = course_record("robotics");
        changed.insert("title".to_string(), json!("Robotics 2"));
        let second = store
            .upsert("courses", vec![changed], &["slug"])
            .expect("second upsert");

        assert_eq!(second[0]["id"].as_str(), Some(first_id.as_str()));
        assert_eq!(second[0]["title"], "Robotics 2");

        let rows = store.select("courses", &[]).expect("select all");
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn unknown_table_is_a_typed_error() {
        let store = SqliteStore::open_in_memory().expect("open");
        match store.select("grades", &[]) {
            Err(StoreError::UnknownTable(t)) => assert_eq!(t, "grades"),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }
}
