//! 노트/플래시카드 저장소
//!
//! 검색 코어 밖의 학습 데이터 영속화입니다. 저장된 Q&A 노트와
//! 복습 주기가 달린 플래시카드를 SQLite 두 테이블에 보관하고,
//! 노트의 마크다운 내보내기를 제공합니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};

// ============================================================================
// Types
// ============================================================================

/// 저장된 Q&A 노트
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub question: String,
    pub answer: String,
    /// 응답 근거로 쓰인 소스 목록
    pub sources: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// 저장된 플래시카드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: i64,
    pub front: String,
    pub back: String,
    pub topic: String,
    pub next_review: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// 새 플래시카드 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewFlashcard {
    pub front: String,
    pub back: String,
}

// ============================================================================
// LearningStore
// ============================================================================

/// 학습 저장소 (노트 + 플래시카드)
pub struct LearningStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl LearningStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                sources_json TEXT,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS flashcards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                topic TEXT,
                next_review TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .context("Failed to create learning tables")?;

        tracing::debug!("Learning store initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Notes
    // ------------------------------------------------------------------

    /// Q&A 노트 저장
    pub fn save_note(&self, question: &str, answer: &str, sources: &[String]) -> Result<i64> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let sources_json = serde_json::to_string(sources).context("Failed to encode sources")?;

        conn.execute(
            "INSERT INTO notes (question, answer, sources_json, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![question, answer, sources_json, now],
        )
        .context("Failed to insert note")?;

        let id = conn.last_insert_rowid();
        tracing::info!("Saved note (id={})", id);
        Ok(id)
    }

    /// 노트 목록 (최신순)
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT id, question, answer, sources_json, created_at FROM notes
             ORDER BY created_at DESC",
        )?;

        let notes = stmt
            .query_map([], |row| {
                let sources_json: Option<String> = row.get(3)?;
                Ok(Note {
                    id: row.get(0)?,
                    question: row.get(1)?,
                    answer: row.get(2)?,
                    sources: sources_json
                        .and_then(|s| serde_json::from_str(&s).ok())
                        .unwrap_or_default(),
                    created_at: parse_datetime(row.get::<_, String>(4)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(notes)
    }

    // ------------------------------------------------------------------
    // Flashcards
    // ------------------------------------------------------------------

    /// 플래시카드 배치 저장
    ///
    /// 새 카드의 복습 시각은 즉시(now)로 설정됩니다.
    pub fn save_flashcards(&self, cards: &[NewFlashcard], topic: &str) -> Result<usize> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let mut saved = 0usize;
        for card in cards {
            conn.execute(
                "INSERT INTO flashcards (front, back, topic, next_review, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![card.front, card.back, topic, now, now],
            )
            .context("Failed to insert flashcard")?;
            saved += 1;
        }

        tracing::info!("Saved {} flashcards (topic={})", saved, topic);
        Ok(saved)
    }

    /// 복습 기한이 된 카드 조회 (next_review <= now 또는 미설정)
    pub fn due_flashcards(&self, limit: usize) -> Result<Vec<Flashcard>> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn.prepare(
            "SELECT id, front, back, topic, next_review, created_at FROM flashcards
             WHERE next_review IS NULL OR next_review <= ?1
             ORDER BY id
             LIMIT ?2",
        )?;

        let cards = stmt
            .query_map(params![now, limit as i64], |row| {
                Ok(Flashcard {
                    id: row.get(0)?,
                    front: row.get(1)?,
                    back: row.get(2)?,
                    topic: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    next_review: parse_datetime(
                        row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    ),
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(cards)
    }

    /// 복습 결과 반영 (다음 복습 시각 갱신)
    pub fn update_flashcard_review(
        &self,
        card_id: i64,
        next_review: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE flashcards SET next_review = ?1 WHERE id = ?2",
                params![next_review.to_rfc3339(), card_id],
            )
            .context("Failed to update flashcard review")?;

        Ok(rows > 0)
    }

    // ------------------------------------------------------------------
    // Export
    // ------------------------------------------------------------------

    /// 전체 노트를 마크다운 파일로 내보내기
    pub fn export_notes_markdown(&self, output: &Path) -> Result<usize> {
        let notes = self.list_notes()?;

        let mut md = String::from("# Saved Notes\n\n");
        for note in &notes {
            md.push_str(&format!(
                "## {}\n\n{}\n\n",
                note.question.trim(),
                note.answer.trim()
            ));

            if !note.sources.is_empty() {
                md.push_str("Sources:\n");
                for source in &note.sources {
                    md.push_str(&format!("- {}\n", source.trim()));
                }
                md.push('\n');
            }

            md.push_str(&format!(
                "_{}_\n\n---\n\n",
                note.created_at.format("%Y-%m-%d %H:%M")
            ));
        }

        std::fs::write(output, md)
            .with_context(|| format!("Failed to write markdown export: {}", output.display()))?;

        tracing::info!("Exported {} notes to {}", notes.len(), output.display());
        Ok(notes.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, LearningStore) {
        let dir = TempDir::new().unwrap();
        let store = LearningStore::open(&dir.path().join("learning.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_save_and_list_notes() {
        let (_dir, store) = create_test_store();

        let id = store
            .save_note(
                "What is aspirin used for?",
                "Pain relief and fever.",
                &["Aspirin pain relief".to_string()],
            )
            .unwrap();
        assert!(id > 0);

        let notes = store.list_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].question, "What is aspirin used for?");
        assert_eq!(notes[0].sources.len(), 1);
    }

    #[test]
    fn test_note_without_sources() {
        let (_dir, store) = create_test_store();

        store.save_note("Q", "A", &[]).unwrap();
        let notes = store.list_notes().unwrap();
        assert!(notes[0].sources.is_empty());
    }

    #[test]
    fn test_save_flashcards_and_due_review() {
        let (_dir, store) = create_test_store();

        let cards = vec![
            NewFlashcard {
                front: "Aspirin mechanism?".to_string(),
                back: "Inhibits prostaglandin synthesis.".to_string(),
            },
            NewFlashcard {
                front: "Is diazepam habit forming?".to_string(),
                back: "Yes.".to_string(),
            },
        ];

        let saved = store.save_flashcards(&cards, "pharmacology").unwrap();
        assert_eq!(saved, 2);

        // 새 카드는 즉시 복습 대상
        let due = store.due_flashcards(10).unwrap();
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].topic, "pharmacology");
    }

    #[test]
    fn test_update_review_defers_card() {
        let (_dir, store) = create_test_store();

        store
            .save_flashcards(
                &[NewFlashcard {
                    front: "F".to_string(),
                    back: "B".to_string(),
                }],
                "t",
            )
            .unwrap();

        let due = store.due_flashcards(10).unwrap();
        assert_eq!(due.len(), 1);

        // 내일로 미루면 오늘 복습 대상에서 제외
        let tomorrow = Utc::now() + chrono::Duration::days(1);
        let updated = store.update_flashcard_review(due[0].id, tomorrow).unwrap();
        assert!(updated);

        assert!(store.due_flashcards(10).unwrap().is_empty());
    }

    #[test]
    fn test_export_notes_markdown() {
        let (dir, store) = create_test_store();

        store
            .save_note("Q1", "A1", &["source one".to_string()])
            .unwrap();
        store.save_note("Q2", "A2", &[]).unwrap();

        let output = dir.path().join("notes.md");
        let exported = store.export_notes_markdown(&output).unwrap();
        assert_eq!(exported, 2);

        let md = std::fs::read_to_string(&output).unwrap();
        assert!(md.contains("# Saved Notes"));
        assert!(md.contains("## Q1"));
        assert!(md.contains("- source one"));
    }
}
