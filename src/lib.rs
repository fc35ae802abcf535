//! mid-rag - 의약품 데이터셋 하이브리드 RAG
//!
//! SQLite 구조화 검색 + LanceDB 벡터 검색을 결합해
//! 그라운딩된 응답을 생성하는 하이브리드 RAG 시스템입니다.

pub mod cli;
pub mod config;
pub mod llm;
pub mod notes;
pub mod retrieval;

// Re-exports
pub use config::{get_data_dir, OllamaConfig, RagConfig};
pub use llm::{ChatMessage, ChatProvider, EmbeddingProvider, OllamaClient};
pub use notes::{Flashcard, LearningStore, NewFlashcard, Note};
pub use retrieval::{
    assemble, validate, ApproximateRetriever, AssembledContext, HybridRag, LanceVectorStore,
    MedicineStore, Passage, RagError, RetrievalRecord, SchemaDescriptor, ValidatedQuery,
    VectorEntry, VectorStore,
};
