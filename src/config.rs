//! 런타임 설정
//!
//! 프로세스 시작 시 한 번 생성해서 각 컴포넌트에 핸들로 전달합니다.
//! 전역 싱글톤 없이, 테스트에서는 임시 디렉토리로 교체할 수 있습니다.

use std::path::PathBuf;

/// 데이터 디렉토리 경로 (~/.mid-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mid-rag")
}

/// Ollama 연결 설정
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    /// Ollama 서버 주소
    pub base_url: String,
    /// 채팅 모델
    pub chat_model: String,
    /// 임베딩 모델
    pub embed_model: String,
    /// 임베딩 차원
    pub dimension: usize,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            chat_model: "mistral".to_string(),
            embed_model: "bge-m3".to_string(),
            dimension: crate::retrieval::EMBEDDING_DIMENSION as usize,
        }
    }
}

/// 전체 RAG 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// 데이터 디렉토리
    pub data_dir: PathBuf,
    /// Ollama 설정
    pub ollama: OllamaConfig,
    /// SQL 결과 행 상한
    pub max_rows: usize,
    /// 벡터 검색 top-k
    pub search_k: usize,
    /// 컨텍스트 직렬화 크기 상한 (문자 수)
    pub max_context_chars: usize,
    /// 인덱스 청크 길이 상한 (문자 수)
    pub chunk_max_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            ollama: OllamaConfig::default(),
            max_rows: 10,
            search_k: 5,
            max_context_chars: 8000,
            chunk_max_chars: 300,
        }
    }
}

impl RagConfig {
    /// 환경변수 오버라이드를 적용한 설정 생성
    ///
    /// - `MIDRAG_DATA_DIR`: 데이터 디렉토리
    /// - `OLLAMA_HOST`: Ollama 서버 주소
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MIDRAG_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }

        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            if !host.is_empty() {
                config.ollama.base_url = host;
            }
        }

        config
    }

    /// SQLite 의약품 DB 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("mid.db")
    }

    /// LanceDB 벡터 인덱스 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }

    /// 노트/플래시카드 DB 경로
    pub fn notes_path(&self) -> PathBuf {
        self.data_dir.join("learning.db")
    }
}

// ============================================================================
// Tests
// ============================================================================
