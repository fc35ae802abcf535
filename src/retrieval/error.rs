//! RAG 오류 분류
//!
//! 두 터미널 오류만 타입으로 구분합니다. 검증 폴백은 오류가 아니라
//! 기본 쿼리 치환이고, 벡터 채널 실패는 빈 결과로 강등됩니다.

use thiserror::Error;

/// 질문-응답 사이클의 터미널 오류
///
/// 둘 다 현재 질문만 종료시키며, 재시도 없이 한 번 보고됩니다.
/// 오케스트레이터 경계에서 사용자 메시지 문자열로 변환됩니다.
#[derive(Debug, Error)]
pub enum RagError {
    /// 구조화 저장소 실행 실패 (SQL 채널 로컬)
    #[error("SQL error: {message}")]
    QueryExecution { message: String },

    /// 채팅 콜라보레이터 호출 실패
    #[error("answer generation failed: {message}")]
    AnswerGeneration { message: String },
}

impl RagError {
    /// 사용자에게 보여줄 메시지로 변환
    pub fn to_user_message(&self) -> String {
        match self {
            RagError::QueryExecution { message } => format!("SQL error: {}", message),
            RagError::AnswerGeneration { message } => {
                format!("응답 생성 실패: {}", message)
            }
        }
    }
}
