//! 하이브리드 RAG 오케스트레이터
//!
//! 선형 상태 기계: 질문 → 후보 SQL 생성 → 검증 → 구조화 검색 /
//! 근사 검색 → 컨텍스트 조립 → 그라운딩된 응답. 두 검색 채널은 서로
//! 의존하지 않고, 터미널 오류는 현재 질문만 끝내고 사용자 메시지로
//! 변환됩니다. 재시도 없음.

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatProvider};

use super::approx::ApproximateRetriever;
use super::context::{assemble, AssembledContext};
use super::error::RagError;
use super::schema::SchemaDescriptor;
use super::store::MedicineStore;
use super::validator::validate;

// ============================================================================
// Prompts
// ============================================================================

/// 응답 생성 시스템 지침
///
/// 그라운딩은 지침으로 강제되는 정책 계약이고, 오케스트레이터가 사후
/// 검증하지는 않습니다.
const ANSWER_SYSTEM: &str = "You answer using ONLY:\n\
                             - SQL rows\n\
                             - vector documents\n\n\
                             Never invent facts.";

/// 스키마 디스크립터로부터 SQL 생성 시스템 지침 구성
fn sql_system_prompt(schema: &SchemaDescriptor) -> String {
    format!(
        "You write SQL for a SQLite table named {table}.\n\n\
         VALID COLUMNS:\n{columns}\n\n\
         RULES:\n\
         - Only use SELECT\n\
         - Never use JOIN\n\
         - Never invent columns\n\
         - If unsure, use:\n  {fallback}",
        table = schema.table(),
        columns = schema.columns().join(", "),
        fallback = schema.wildcard_default_query(),
    )
}

// ============================================================================
// HybridRag
// ============================================================================

/// 하이브리드 RAG 파이프라인
///
/// 콜라보레이터들은 프로세스 시작 시 생성해서 주입합니다. 질문 간에
/// 공유되는 가변 상태는 없습니다 (스키마는 읽기 전용).
pub struct HybridRag {
    store: MedicineStore,
    approx: ApproximateRetriever,
    chat: Arc<dyn ChatProvider>,
    schema: Arc<SchemaDescriptor>,
    search_k: usize,
    max_context_chars: usize,
}

impl HybridRag {
    /// 새 파이프라인 생성
    pub fn new(
        store: MedicineStore,
        approx: ApproximateRetriever,
        chat: Arc<dyn ChatProvider>,
        schema: Arc<SchemaDescriptor>,
        search_k: usize,
        max_context_chars: usize,
    ) -> Self {
        Self {
            store,
            approx,
            chat,
            schema,
            search_k,
            max_context_chars,
        }
    }

    /// 질문에 응답
    ///
    /// 모든 터미널 오류를 여기서 잡아 사용자 메시지 문자열로 변환합니다.
    /// 단일 질문의 실패가 프로세스를 죽이지 않습니다.
    pub async fn ask(&self, question: &str) -> String {
        match self.answer_cycle(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Question cycle terminated: {}", e);
                e.to_user_message()
            }
        }
    }

    /// 질문-응답 사이클 본체
    async fn answer_cycle(&self, question: &str) -> Result<String, RagError> {
        // 1. 후보 SQL 생성 (외부 콜라보레이터)
        let candidate = self.generate_candidate_query(question).await?;

        // 2. 검증 - 실패하지 않고 기본 쿼리로 폴백
        let validated = validate(&candidate, &self.schema);
        tracing::info!("SQL: {}", validated);

        // 3. 구조화 검색 - 단일 시도, 실패는 이 사이클을 종료
        let records = self.store.run(&validated)?;
        tracing::info!("SQL rows: {}", records.len());

        // 4. 근사 검색 - 구조화 채널과 독립, 실패 시 빈 결과로 강등
        let passages = self.approx.search(question, self.search_k).await;
        tracing::info!("Vector matches: {}", passages.len());

        // 5. 컨텍스트 조립
        let context = assemble(records, passages, self.max_context_chars);

        // 6. 그라운딩된 응답 생성
        self.answer(question, &context).await
    }

    /// 후보 SQL 생성 (검증 전의 비신뢰 입력)
    async fn generate_candidate_query(&self, question: &str) -> Result<String, RagError> {
        let messages = vec![
            ChatMessage::system(sql_system_prompt(&self.schema)),
            ChatMessage::user(question),
        ];

        self.chat
            .complete(&messages)
            .await
            .map_err(|e| RagError::AnswerGeneration {
                message: e.to_string(),
            })
    }

    /// 조립된 컨텍스트만으로 응답 생성
    async fn answer(
        &self,
        question: &str,
        context: &AssembledContext,
    ) -> Result<String, RagError> {
        let messages = vec![
            ChatMessage::system(ANSWER_SYSTEM),
            ChatMessage::assistant(context.to_json()),
            ChatMessage::user(question),
        ];

        self.chat
            .complete(&messages)
            .await
            .map_err(|e| RagError::AnswerGeneration {
                message: e.to_string(),
            })
    }
}

// ============================================================================
// Tests
// ============================================================================
