//! 스키마 디스크립터 - 검증기와 쿼리 생성 프롬프트가 참조할 수 있는
//! 테이블/컬럼의 고정 집합
//!
//! 프로세스 시작 시 한 번 생성되고 이후 변경되지 않습니다.

/// 구조화 저장소의 고정 스키마
///
/// 검증기(validator)는 이 집합 밖의 식별자를 필터 위치에서 발견하면
/// 후보 쿼리를 폐기합니다.
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    table: String,
    columns: Vec<String>,
    /// 와일드카드 기본 쿼리가 매칭하는 대표 텍스트 컬럼
    primary_text_column: String,
    /// SQL 결과 행 상한
    max_rows: usize,
    /// 벡터 인덱스 청크를 구성하는 컬럼 부분집합
    chunk_columns: Vec<String>,
}

impl SchemaDescriptor {
    /// 임의 스키마 생성
    pub fn new(
        table: impl Into<String>,
        columns: &[&str],
        primary_text_column: impl Into<String>,
        max_rows: usize,
        chunk_columns: &[&str],
    ) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_text_column: primary_text_column.into(),
            max_rows,
            chunk_columns: chunk_columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// MID (Medicines Information Dataset) 스키마
    pub fn mid_drugs() -> Self {
        Self::new(
            "mid_drugs",
            &[
                "name",
                "link",
                "contains",
                "productintroduction",
                "productuses",
                "productbenefits",
                "sideeffect",
                "howtouse",
                "howworks",
                "quicktips",
                "safetyadvice",
                "chemical_class",
                "habit_forming",
                "therapeutic_class",
                "action_class",
            ],
            "name",
            10,
            &["name", "productuses", "howworks"],
        )
    }

    /// 테이블 이름
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 컬럼 목록 (선언 순서)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// 대표 텍스트 컬럼
    pub fn primary_text_column(&self) -> &str {
        &self.primary_text_column
    }

    /// 행 상한
    pub fn max_rows(&self) -> usize {
        self.max_rows
    }

    /// 청크 구성 컬럼
    pub fn chunk_columns(&self) -> &[String] {
        &self.chunk_columns
    }

    /// 컬럼 존재 여부 (대소문자 무시)
    pub fn is_known_column(&self, identifier: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(identifier))
    }

    /// 안전 기본 쿼리 (select 누락/조인 감지 시 치환)
    pub fn safe_default_query(&self) -> String {
        format!("SELECT * FROM {} LIMIT {};", self.table, self.max_rows)
    }

    /// 와일드카드 기본 쿼리 (미지 컬럼 감지 시 치환)
    pub fn wildcard_default_query(&self) -> String {
        format!(
            "SELECT * FROM {} WHERE {} LIKE '%keyword%' LIMIT {};",
            self.table, self.primary_text_column, self.max_rows
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
