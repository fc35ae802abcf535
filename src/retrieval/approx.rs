//! 근사 검색기 - 질문 임베딩 + top-k 유사도 검색
//!
//! 벡터 채널은 절대 실패하지 않습니다. 임베딩이나 인덱스가 닿지 않으면
//! 빈 결과로 강등되고 경고만 남깁니다. 인덱스 리빌드는 쓰기 락으로
//! 검색과 상호 배제되어, 동시 검색은 리빌드 이전 전체나 이후 전체만
//! 관찰합니다.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::llm::EmbeddingProvider;

use super::schema::SchemaDescriptor;
use super::store::RetrievalRecord;
use super::vector::{build_chunk, Passage, VectorEntry, VectorStore};

// ============================================================================
// ApproximateRetriever
// ============================================================================

/// 근사 검색기
pub struct ApproximateRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    rebuild_lock: RwLock<()>,
}

impl ApproximateRetriever {
    /// 새 근사 검색기 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn VectorStore>) -> Self {
        Self {
            embedder,
            store,
            rebuild_lock: RwLock::new(()),
        }
    }

    /// top-k 유사도 검색
    ///
    /// 유사도 내림차순으로 최대 k개를 반환합니다. 어떤 일시적 실패도
    /// 빈 시퀀스로 강등됩니다 - 이 채널이 전체 응답을 실패시키지 않습니다.
    pub async fn search(&self, question: &str, k: usize) -> Vec<Passage> {
        let _guard = self.rebuild_lock.read().await;

        let query_embedding = match self.embedder.embed(question).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Question embedding failed, degrading to empty: {}", e);
                return vec![];
            }
        };

        let mut passages = match self.store.search(&query_embedding, k).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Vector search failed, degrading to empty: {}", e);
                return vec![];
            }
        };

        passages.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        passages.truncate(k);

        tracing::debug!("Vector matches: {}", passages.len());
        passages
    }

    /// 인덱스 리빌드 (오프라인 빌드 패스)
    ///
    /// 각 코퍼스 행에서 고정 컬럼 부분집합으로 청크를 만들고(빈 청크는
    /// 제외), 행의 rowid를 벡터 id로 사용합니다. 전체 삭제 + 재삽입은
    /// 쓰기 락 아래에서 수행되어 반쯤 지워진 인덱스가 보이지 않습니다.
    pub async fn rebuild(
        &self,
        rows: &[(i64, RetrievalRecord)],
        schema: &SchemaDescriptor,
        chunk_max_chars: usize,
    ) -> Result<usize> {
        let mut entries = Vec::new();

        for (rowid, record) in rows {
            let Some(chunk) = build_chunk(record, schema, chunk_max_chars) else {
                continue;
            };

            let source = record
                .get(schema.primary_text_column())
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();

            let embedding = self.embedder.embed(&chunk).await?;
            entries.push(VectorEntry {
                id: *rowid,
                text: chunk,
                source,
                embedding,
            });
        }

        let _guard = self.rebuild_lock.write().await;

        let removed = self.store.delete_all().await?;
        let inserted = if entries.is_empty() {
            0
        } else {
            self.store.insert_batch(&entries).await?
        };

        tracing::info!(
            "Rebuilt vector index: {} removed, {} inserted",
            removed,
            inserted
        );
        Ok(inserted)
    }

    /// 인덱스 엔트리 수
    pub async fn count(&self) -> Result<usize> {
        let _guard = self.rebuild_lock.read().await;
        self.store.count().await
    }
}

// ============================================================================
// Tests
// ============================================================================
