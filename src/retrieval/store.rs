//! 구조화 검색기 - rusqlite 기반 의약품 테이블 저장소
//!
//! 검증된 쿼리를 읽기 전용 연결로 실행합니다. 질의마다 연결을 새로 열고
//! 닫으므로 질문 간에 공유되는 가변 상태가 없습니다. 코퍼스 적재와
//! 인덱스 빌드용 전체 조회도 여기서 담당합니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;

use super::error::RagError;
use super::schema::SchemaDescriptor;
use super::validator::ValidatedQuery;

/// 단일 매칭 행 - 컬럼 이름 → 값의 순서 보존 매핑
pub type RetrievalRecord = serde_json::Map<String, Value>;

// ============================================================================
// MedicineStore
// ============================================================================

/// 의약품 구조화 저장소
///
/// 경로만 보유하고, 읽기 질의는 매번 읽기 전용으로 열어 한 번만 시도합니다.
pub struct MedicineStore {
    db_path: PathBuf,
}

impl MedicineStore {
    /// 저장소 핸들 생성 (파일은 적재 시점에 만들어짐)
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// DB 파일 존재 여부
    pub fn exists(&self) -> bool {
        self.db_path.exists()
    }

    /// 검증된 쿼리 실행
    ///
    /// 읽기 전용 연결로 단일 시도. 저장소 수준 실패는 원본 오류 텍스트를
    /// 담은 `RagError::QueryExecution`으로 반환되고, 이 채널만 종료합니다.
    pub fn run(&self, query: &ValidatedQuery) -> Result<Vec<RetrievalRecord>, RagError> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(exec_error)?;

        let mut stmt = conn.prepare(query.as_str()).map_err(exec_error)?;
        let column_names: Vec<String> =
            stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query([]).map_err(exec_error)?;
        let mut records = Vec::new();

        while let Some(row) = rows.next().map_err(exec_error)? {
            let mut record = RetrievalRecord::new();
            for (i, name) in column_names.iter().enumerate() {
                let value = match row.get_ref(i).map_err(exec_error)? {
                    ValueRef::Null => Value::Null,
                    ValueRef::Integer(v) => Value::from(v),
                    ValueRef::Real(v) => Value::from(v),
                    ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
                };
                record.insert(name.clone(), value);
            }
            records.push(record);
        }

        tracing::debug!("SQL rows: {}", records.len());
        Ok(records)
    }

    /// JSON 코퍼스 적재
    ///
    /// 행 객체 배열을 읽어 키를 정규화(소문자, 공백/밑줄 제거)한 뒤
    /// 스키마의 기대 컬럼으로 매핑해서 테이블을 재생성합니다.
    pub fn load_corpus(&self, path: &Path, schema: &SchemaDescriptor) -> Result<usize> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read corpus file: {}", path.display()))?;
        let rows: Vec<serde_json::Map<String, Value>> =
            serde_json::from_str(&raw).context("Corpus must be a JSON array of row objects")?;

        let mut conn = self.open_writable()?;
        let tx = conn.transaction().context("Failed to start transaction")?;

        // 테이블 재생성 (전체 재적재만 지원)
        tx.execute(&format!("DROP TABLE IF EXISTS {}", schema.table()), [])
            .context("Failed to drop old table")?;

        let column_defs: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect();
        tx.execute(
            &format!(
                "CREATE TABLE {} ({})",
                schema.table(),
                column_defs.join(", ")
            ),
            [],
        )
        .context("Failed to create table")?;

        let placeholders: Vec<String> = (1..=schema.columns().len())
            .map(|i| format!("?{}", i))
            .collect();
        let insert_sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table(),
            schema.columns().join(", "),
            placeholders.join(", ")
        );

        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare(&insert_sql)
                .context("Failed to prepare insert")?;

            for row in &rows {
                let normalized = normalize_row(row);
                let values: Vec<String> = schema
                    .columns()
                    .iter()
                    .map(|c| {
                        normalized
                            .get(&c.replace('_', ""))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect();

                stmt.execute(rusqlite::params_from_iter(values.iter()))
                    .context("Failed to insert corpus row")?;
                inserted += 1;
            }
        }

        tx.commit().context("Failed to commit corpus load")?;
        tracing::info!("Loaded {} corpus rows into {}", inserted, schema.table());

        Ok(inserted)
    }

    /// 인덱스 빌드용 전체 조회 (rowid 포함)
    pub fn all_rows(
        &self,
        schema: &SchemaDescriptor,
        limit: usize,
    ) -> Result<Vec<(i64, RetrievalRecord)>> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open medicine store")?;

        let sql = format!(
            "SELECT rowid, {} FROM {} LIMIT {}",
            schema.columns().join(", "),
            schema.table(),
            limit
        );
        let mut stmt = conn.prepare(&sql).context("Failed to prepare full scan")?;

        let mut rows = stmt.query([]).context("Failed to run full scan")?;
        let mut out = Vec::new();

        while let Some(row) = rows.next().context("Failed to read corpus row")? {
            let rowid: i64 = row.get(0).context("Missing rowid")?;
            let mut record = RetrievalRecord::new();
            for (i, name) in schema.columns().iter().enumerate() {
                let text: Option<String> = row.get(i + 1).ok();
                record.insert(
                    name.clone(),
                    text.map(Value::String).unwrap_or(Value::Null),
                );
            }
            out.push((rowid, record));
        }

        Ok(out)
    }

    /// 저장된 행 수
    pub fn count(&self, schema: &SchemaDescriptor) -> Result<usize> {
        let conn = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open medicine store")?;

        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", schema.table()),
                [],
                |row| row.get(0),
            )
            .context("Failed to count rows")?;

        Ok(count as usize)
    }

    fn open_writable(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create database directory")?;
            }
        }

        Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")
    }
}

/// rusqlite 오류를 쿼리 실행 오류로 변환
fn exec_error(e: rusqlite::Error) -> RagError {
    RagError::QueryExecution {
        message: e.to_string(),
    }
}

/// 행 객체의 키를 정규화 (소문자, 공백/밑줄 제거), 값은 텍스트화
fn normalize_row(row: &serde_json::Map<String, Value>) -> std::collections::HashMap<String, String> {
    row.iter()
        .map(|(key, value)| {
            let norm_key: String = key
                .trim()
                .to_lowercase()
                .chars()
                .filter(|c| *c != ' ' && *c != '_')
                .collect();

            let text = match value {
                Value::Null => String::new(),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (norm_key, text)
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::validator::validate;
    use tempfile::TempDir;

    fn corpus_json() -> String {
        serde_json::json!([
            {
                "Name": "Aspirin",
                "Product Uses": "pain relief and fever",
                "How Works": "inhibits prostaglandin synthesis",
                "Side Effect": "stomach upset",
                "Habit Forming": "No"
            },
            {
                "Name": "Paracetamol",
                "Product Uses": "fever and mild pain",
                "How Works": "blocks pain signals in the brain",
                "Side Effect": "rare at normal doses",
                "Habit Forming": "No"
            },
            {
                "Name": "Diazepam",
                "Product Uses": "anxiety",
                "How Works": "enhances GABA activity",
                "Side Effect": "drowsiness",
                "Habit Forming": "Yes"
            }
        ])
        .to_string()
    }

    fn create_test_store() -> (TempDir, MedicineStore, SchemaDescriptor) {
        let dir = TempDir::new().unwrap();
        let store = MedicineStore::new(dir.path().join("mid.db"));
        let schema = SchemaDescriptor::mid_drugs();

        let corpus_path = dir.path().join("corpus.json");
        std::fs::write(&corpus_path, corpus_json()).unwrap();
        let loaded = store.load_corpus(&corpus_path, &schema).unwrap();
        assert_eq!(loaded, 3);

        (dir, store, schema)
    }

    #[test]
    fn test_load_and_count() {
        let (_dir, store, schema) = create_test_store();
        assert_eq!(store.count(&schema).unwrap(), 3);
    }

    #[test]
    fn test_run_returns_ordered_records() {
        let (_dir, store, schema) = create_test_store();

        let query = validate("SELECT name, sideeffect FROM mid_drugs LIMIT 10;", &schema);
        let records = store.run(&query).unwrap();

        assert_eq!(records.len(), 3);
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["name", "sideeffect"]);
        assert_eq!(records[0]["name"], "Aspirin");
    }

    #[test]
    fn test_run_with_filter() {
        let (_dir, store, schema) = create_test_store();

        let query = validate(
            "SELECT name FROM mid_drugs WHERE habit_forming = 'Yes' LIMIT 10;",
            &schema,
        );
        let records = store.run(&query).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["name"], "Diazepam");
    }

    #[test]
    fn test_run_surfaces_query_execution_error() {
        let (_dir, store, schema) = create_test_store();

        // 미지 컬럼은 필터 위치에서만 걸러지므로 SELECT 목록의 오타는
        // 저장소 실행 오류로 표면화됨
        let query = validate("SELECT nosuchcol FROM mid_drugs LIMIT 5;", &schema);
        let err = store.run(&query).unwrap_err();

        match err {
            RagError::QueryExecution { message } => {
                assert!(message.contains("nosuchcol"));
            }
            other => panic!("Expected QueryExecution, got: {:?}", other),
        }
    }

    #[test]
    fn test_all_rows_returns_rowids() {
        let (_dir, store, schema) = create_test_store();

        let rows = store.all_rows(&schema, 100).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].0, 1);
        assert_eq!(rows[0].1["name"], "Aspirin");
    }

    #[test]
    fn test_normalize_row_keys() {
        let row = serde_json::json!({
            " Product Uses ": "x",
            "HOW_WORKS": "y",
            "count": 3
        });
        let normalized = normalize_row(row.as_object().unwrap());

        assert_eq!(normalized.get("productuses").unwrap(), "x");
        assert_eq!(normalized.get("howworks").unwrap(), "y");
        assert_eq!(normalized.get("count").unwrap(), "3");
    }
}
