//! LanceDB 벡터 인덱스 구현
//!
//! ANN (Approximate Nearest Neighbor) 검색으로 코퍼스 청크 임베딩을
//! 로컬 디스크에 저장/검색합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{Passage, VectorEntry, VectorStore, EMBEDDING_DIMENSION};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "mid_vectors";

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소
///
/// Apache Arrow 기반 columnar 포맷으로 영속화됩니다. "컬렉션 없음"과
/// 그 외 실패를 구분하기 위해 명시적으로 테이블 존재를 확인합니다.
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 벡터 테이블 스키마
    fn create_schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSION,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        let ids: Vec<i64> = entries.iter().map(|e| e.id).collect();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            EMBEDDING_DIMENSION,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema()),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(texts)),
                Arc::new(StringArray::from(sources)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.table_exists().await {
            let table = self
                .db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .context("Failed to open table")?;

            table
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<Passage>> {
        if !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table for search")?;

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(k)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let mut passages = Vec::new();

        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = results.try_collect().await?;

        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing id column"))?;

            let texts = batch
                .column_by_name("text")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing text column"))?;

            let sources = batch
                .column_by_name("source")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing source column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가, 오름차순)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let distance = distances.value(i);
                // 거리를 유사도로 변환
                let similarity = 1.0 / (1.0 + distance);

                passages.push(Passage {
                    id: ids.value(i),
                    text: texts.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    similarity,
                });
            }
        }

        Ok(passages)
    }

    async fn delete_all(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table for delete")?;

        let before = table
            .count_rows(None)
            .await
            .context("Failed to count rows")?;

        // rowid 기반 id는 항상 0 이상 - 전체 매칭 술어
        table
            .delete("id >= 0")
            .await
            .context("Failed to delete vectors")?;

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table for count")?;

        table.count_rows(None).await.context("Failed to count rows")
    }
}

// ============================================================================
// Tests
// ============================================================================
