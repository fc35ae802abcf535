//! Retrieval 모듈 - 하이브리드 검색 오케스트레이션
//!
//! - schema: 검증기가 참조하는 고정 테이블/컬럼 집합
//! - validator: LLM 후보 SQL의 사전 검사 및 기본 쿼리 폴백
//! - store: SQLite 구조화 검색 (읽기 전용, 행 상한)
//! - vector/lance: LanceDB 근사 인덱스
//! - approx: 질문 임베딩 + top-k 검색, 리빌드 락
//! - context: SQL 행 + 패시지의 크기 제한 병합
//! - hybrid: 전체 사이클 오케스트레이터

mod approx;
mod context;
mod error;
mod hybrid;
mod lance;
mod schema;
mod store;
mod validator;
mod vector;

// Re-exports
pub use approx::ApproximateRetriever;
pub use context::{assemble, AssembledContext, ContextPassage};
pub use error::RagError;
pub use hybrid::HybridRag;
pub use lance::LanceVectorStore;
pub use schema::SchemaDescriptor;
pub use store::{MedicineStore, RetrievalRecord};
pub use validator::{validate, ValidatedQuery};
pub use vector::{
    build_chunk, cosine_similarity, Passage, VectorEntry, VectorStore, EMBEDDING_DIMENSION,
};
