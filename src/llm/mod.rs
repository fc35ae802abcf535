//! LLM 모듈 - Ollama 기반 채팅/임베딩 콜라보레이터
//!
//! 로컬 Ollama 인스턴스를 통해 텍스트를 벡터로 변환하고
//! role-tagged 메시지 목록으로 응답을 생성합니다.
//! ref: https://github.com/ollama/ollama/blob/main/docs/api.md
//!
//! ## 사용법
//! ```rust,ignore
//! let client = OllamaClient::new(&config.ollama)?;
//! let embedding = client.embed("아스피린").await?;
//! let answer = client.complete(&[ChatMessage::user("질문")]).await?;
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OllamaConfig;

// ============================================================================
// Types
// ============================================================================

/// 역할 태그가 붙은 대화 메시지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

// ============================================================================
// Provider Traits
// ============================================================================

/// 채팅 프로바이더 트레이트
///
/// 메시지 목록을 받아 응답 텍스트를 생성합니다. 호출 간 상태 없음.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 대화 완성
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Ollama API 요청/응답 본문
#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

/// Ollama 클라이언트 (채팅 + 임베딩)
///
/// 프로세스 시작 시 한 번 생성해서 Arc 핸들로 전달합니다.
#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    chat_model: String,
    embed_model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl OllamaClient {
    /// 새 Ollama 클라이언트 생성
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embed_model: config.embed_model.clone(),
            dimension: config.dimension,
            client,
        })
    }

    /// Ollama 서버 연결 확인
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!("Ollama health check failed: {}", resp.status());
                false
            }
            Err(e) => {
                tracing::warn!("Ollama unreachable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ChatProvider for OllamaClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaChatRequest {
            model: self.chat_model.clone(),
            messages: messages.to_vec(),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send chat request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read chat response body")?;

        if !status.is_success() {
            anyhow::bail!("Ollama chat error ({}): {}", status, body);
        }

        let chat_response: OllamaChatResponse =
            serde_json::from_str(&body).context("Failed to parse chat response")?;

        Ok(chat_response.message.content)
    }

    fn name(&self) -> &str {
        &self.chat_model
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 영벡터 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbedRequest {
            model: self.embed_model.clone(),
            prompt: text.to_string(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send embedding request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read embedding response body")?;

        if !status.is_success() {
            anyhow::bail!("Ollama embedding error ({}): {}", status, body);
        }

        let embed_response: OllamaEmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        Ok(embed_response.embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.embed_model
    }
}

// ============================================================================
// Tests
// ============================================================================
