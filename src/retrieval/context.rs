//! 컨텍스트 어셈블러 - SQL 행과 벡터 패시지의 결정적 병합
//!
//! 구조화 행 다음에 패시지 순서로 합치고, 직렬화 크기 상한을 넘으면
//! 유사도가 낮은 패시지부터, 그 다음 뒤쪽 행부터 통째로 버립니다.
//! 레코드나 패시지를 중간에서 자르는 일은 없습니다. I/O 없음.

use serde::Serialize;

use super::store::RetrievalRecord;
use super::vector::Passage;

// ============================================================================
// Types
// ============================================================================

/// 다운스트림에 전달되는 패시지 (스코어 제거됨)
#[derive(Debug, Clone, Serialize)]
pub struct ContextPassage {
    pub text: String,
    pub source: String,
}

/// 단일 응답 생성 호출이 소유하는 조립된 컨텍스트
///
/// 질문-응답 사이클을 넘어 보존되지 않습니다.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    /// 구조화 검색 행 (입력 순서 유지)
    pub sql_rows: Vec<RetrievalRecord>,
    /// 벡터 검색 패시지 (유사도 내림차순)
    pub vector_docs: Vec<ContextPassage>,
}

impl AssembledContext {
    /// 응답 생성 프롬프트에 넣을 JSON 직렬화
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.sql_rows.is_empty() && self.vector_docs.is_empty()
    }
}

// ============================================================================
// Assembly
// ============================================================================

/// 컨텍스트 조립
///
/// 직렬화 길이가 `max_chars`를 넘지 않을 때까지 유사도 최하위 패시지,
/// 그 다음 마지막 행 순으로 항목 단위 삭제를 반복합니다.
pub fn assemble(
    records: Vec<RetrievalRecord>,
    passages: Vec<Passage>,
    max_chars: usize,
) -> AssembledContext {
    let mut passages = passages;
    passages.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut context = AssembledContext {
        sql_rows: records,
        vector_docs: passages
            .into_iter()
            .map(|p| ContextPassage {
                text: p.text,
                source: p.source,
            })
            .collect(),
    };

    // 항목 단위 축소: 패시지(낮은 유사도부터) → 행(뒤에서부터)
    while context.to_json().chars().count() > max_chars {
        if context.vector_docs.pop().is_some() {
            continue;
        }
        if context.sql_rows.pop().is_some() {
            continue;
        }
        break;
    }

    tracing::debug!(
        "Assembled context: {} rows, {} passages",
        context.sql_rows.len(),
        context.vector_docs.len()
    );
    context
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn record(name: &str, uses: &str) -> RetrievalRecord {
        let mut r = RetrievalRecord::new();
        r.insert("name".to_string(), Value::String(name.to_string()));
        r.insert("productuses".to_string(), Value::String(uses.to_string()));
        r
    }

    fn passage(text: &str, similarity: f32) -> Passage {
        Passage {
            id: 1,
            text: text.to_string(),
            source: "Aspirin".to_string(),
            similarity,
        }
    }

    #[test]
    fn test_records_first_then_passages_score_dropped() {
        let context = assemble(
            vec![record("Aspirin", "pain")],
            vec![passage("chunk", 0.9)],
            10_000,
        );

        let json = context.to_json();
        assert!(json.find("sql_rows").unwrap() < json.find("vector_docs").unwrap());
        assert!(!json.contains("similarity"));
    }

    #[test]
    fn test_passages_sorted_by_descending_similarity() {
        let context = assemble(
            vec![],
            vec![
                passage("low", 0.1),
                passage("high", 0.9),
                passage("mid", 0.5),
            ],
            10_000,
        );

        let texts: Vec<&str> = context.vector_docs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_size_cap_never_exceeded() {
        let records: Vec<RetrievalRecord> = (0..10)
            .map(|i| record(&format!("Drug{}", i), &"u".repeat(100)))
            .collect();
        let passages: Vec<Passage> = (0..10)
            .map(|i| passage(&"p".repeat(100), 1.0 - i as f32 * 0.05))
            .collect();

        for max_chars in [100, 500, 1000, 5000] {
            let context = assemble(records.clone(), passages.clone(), max_chars);
            assert!(
                context.to_json().chars().count() <= max_chars
                    || (context.sql_rows.is_empty() && context.vector_docs.is_empty()),
                "cap {} exceeded",
                max_chars
            );
        }
    }

    #[test]
    fn test_lowest_similarity_passages_dropped_first() {
        let records = vec![record("Aspirin", "pain")];
        let passages = vec![passage("keep-high", 0.9), passage("drop-low", 0.1)];

        // 패시지 하나는 버려야 하는 크기
        let full = assemble(records.clone(), passages.clone(), 10_000)
            .to_json()
            .chars()
            .count();
        let context = assemble(records, passages, full - 1);

        assert_eq!(context.sql_rows.len(), 1);
        assert_eq!(context.vector_docs.len(), 1);
        assert_eq!(context.vector_docs[0].text, "keep-high");
    }

    #[test]
    fn test_records_dropped_only_after_all_passages() {
        let records = vec![record("A", "one"), record("B", "two")];
        let passages = vec![passage("p1", 0.9), passage("p2", 0.5)];

        // 아주 작은 상한: 패시지가 모두 사라진 뒤에야 행을 버림
        let context = assemble(records, passages, 120);
        if !context.sql_rows.is_empty() {
            assert!(context.vector_docs.is_empty());
        }
    }

    #[test]
    fn test_no_mid_record_truncation() {
        let records = vec![record("Aspirin", &"u".repeat(50))];
        let context = assemble(records, vec![], 10_000);

        // 살아남은 행은 온전한 형태
        assert_eq!(
            context.sql_rows[0]["productuses"].as_str().unwrap().len(),
            50
        );
    }

    #[test]
    fn test_empty_inputs() {
        let context = assemble(vec![], vec![], 100);
        assert!(context.is_empty());
        assert!(context.to_json().chars().count() <= 100);
    }
}
