//! 벡터 검색 트레이트 및 유틸리티
//!
//! 근사 인덱스 콜라보레이터의 공통 인터페이스와 청크 구성 규칙을 정의합니다.

use anyhow::Result;
use async_trait::async_trait;

use super::schema::SchemaDescriptor;
use super::store::RetrievalRecord;

/// 벡터 임베딩 차원 (bge-m3 기본값)
/// ref: https://huggingface.co/BAAI/bge-m3
pub const EMBEDDING_DIMENSION: i32 = 1024;

// ============================================================================
// Types
// ============================================================================

/// 벡터 인덱스 엔트리 (저장용)
///
/// 오프라인 빌드 패스에서 생성되고 전체 리빌드 외에는 불변입니다.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 코퍼스 행 식별자 (rowid)
    pub id: i64,
    /// 청크 텍스트 (길이 상한 적용됨)
    pub text: String,
    /// 소스 메타데이터 (의약품 이름)
    pub source: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 유사도 검색 결과 패시지
#[derive(Debug, Clone)]
pub struct Passage {
    /// 코퍼스 행 식별자
    pub id: i64,
    /// 청크 텍스트
    pub text: String,
    /// 소스 메타데이터
    pub source: String,
    /// 유사도 스코어 (높을수록 가까움)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 벡터 인덱스 콜라보레이터 트레이트
///
/// "없으면 생성" 동작은 구현체가 명시적 존재 확인으로 처리하고,
/// 전체 삭제는 리빌드 전용입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 유사도 상위 k개 검색
    async fn search(&self, query_embedding: &[f32], k: usize) -> Result<Vec<Passage>>;

    /// 전체 엔트리 삭제 (리빌드 전용)
    async fn delete_all(&self) -> Result<usize>;

    /// 엔트리 수 조회
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// Chunk Construction
// ============================================================================

/// 코퍼스 행에서 인덱스 청크 구성
///
/// 스키마의 고정 컬럼 부분집합을 공백으로 이어붙이고 문자 상한으로
/// 자릅니다. 트리밍 후 비어 있으면 None (해당 행은 인덱스에서 제외).
pub fn build_chunk(
    record: &RetrievalRecord,
    schema: &SchemaDescriptor,
    max_chars: usize,
) -> Option<String> {
    let combined = schema
        .chunk_columns()
        .iter()
        .filter_map(|c| record.get(c.as_str()))
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let capped: String = combined.chars().take(max_chars).collect();
    let trimmed = capped.trim();

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산 (-1.0 ~ 1.0)
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(name: &str, uses: &str, works: &str) -> RetrievalRecord {
        let mut r = RetrievalRecord::new();
        r.insert("name".to_string(), Value::String(name.to_string()));
        r.insert("productuses".to_string(), Value::String(uses.to_string()));
        r.insert("howworks".to_string(), Value::String(works.to_string()));
        r
    }

    #[test]
    fn test_build_chunk_concatenates_fixed_fields() {
        let schema = SchemaDescriptor::mid_drugs();
        let r = record("Aspirin", "pain relief", "inhibits prostaglandins");

        let chunk = build_chunk(&r, &schema, 300).unwrap();
        assert_eq!(chunk, "Aspirin pain relief inhibits prostaglandins");
    }

    #[test]
    fn test_build_chunk_respects_char_cap() {
        let schema = SchemaDescriptor::mid_drugs();
        let long = "x".repeat(500);
        let r = record("Aspirin", &long, "");

        let chunk = build_chunk(&r, &schema, 300).unwrap();
        assert_eq!(chunk.chars().count(), 300);
    }

    #[test]
    fn test_build_chunk_empty_record_skipped() {
        let schema = SchemaDescriptor::mid_drugs();
        let r = record("", "   ", "");
        assert!(build_chunk(&r, &schema, 300).is_none());
    }

    #[test]
    fn test_build_chunk_missing_fields_skipped() {
        let schema = SchemaDescriptor::mid_drugs();
        let r = RetrievalRecord::new();
        assert!(build_chunk(&r, &schema, 300).is_none());
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        let a: Vec<f32> = vec![];
        let b: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }
}
