//! 쿼리 검증기 - LLM이 생성한 후보 SQL의 사전 검사
//!
//! 후보 문자열을 실행 전에 검사해서 스키마를 벗어나거나 위험한 구문을
//! 기본 쿼리로 치환합니다. 어떤 입력에도 실패하지 않고, 항상 행 상한이
//! 걸린 읽기 전용 쿼리를 반환합니다.

use regex::Regex;

use super::schema::SchemaDescriptor;

/// 검증을 통과한 쿼리
///
/// `validate`를 통해서만 생성됩니다. 구조화 검색기는 이 형태만 실행합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQuery(String);

impl ValidatedQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ValidatedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// WHERE 절에서 식별자로 나타나도 컬럼이 아닌 SQL 키워드/함수
const SQL_KEYWORDS: &[&str] = &[
    "and", "or", "not", "like", "glob", "in", "is", "null", "between", "exists", "case", "when",
    "then", "else", "end", "as", "asc", "desc", "distinct", "escape", "collate", "nocase",
    "lower", "upper", "trim", "length", "substr", "coalesce", "instr", "replace", "true", "false",
];

/// 후보 쿼리 검증
///
/// 알고리즘:
/// 1. `select`가 없으면 안전 기본 쿼리로 치환
/// 2. `join`이 있으면 안전 기본 쿼리로 치환
/// 3. 필터 위치(WHERE 절)에 스키마 밖 식별자가 있으면 와일드카드 기본
///    쿼리로 치환
/// 4. `LIMIT`이 없으면 스키마의 행 상한을 덧붙임
///
/// 입력이 아무리 망가져 있어도 패닉하지 않습니다.
pub fn validate(candidate: &str, schema: &SchemaDescriptor) -> ValidatedQuery {
    let select_re = Regex::new(r"(?i)\bselect\b").unwrap();

    // 1. 읽기 키워드 탐색
    let sql = match select_re.find(candidate) {
        Some(m) => candidate[m.start()..].trim(),
        None => {
            tracing::debug!("Candidate has no SELECT, substituting safe default");
            return ValidatedQuery(schema.safe_default_query());
        }
    };

    // 2. 조인 금지
    let join_re = Regex::new(r"(?i)\bjoin\b").unwrap();
    if join_re.is_match(sql) {
        tracing::debug!("Candidate contains JOIN, substituting safe default");
        return ValidatedQuery(schema.safe_default_query());
    }

    // 3. 필터 위치의 미지 컬럼 검사
    if let Some(clause) = filter_clause(sql) {
        if let Some(unknown) = find_unknown_identifier(&clause, schema) {
            tracing::debug!(
                "Unknown column '{}' in filter position, substituting wildcard default",
                unknown
            );
            return ValidatedQuery(schema.wildcard_default_query());
        }
    }

    // 4. 행 상한 보장
    let limit_re = Regex::new(r"(?i)\blimit\b").unwrap();
    if limit_re.is_match(sql) {
        ValidatedQuery(sql.to_string())
    } else {
        let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
        ValidatedQuery(format!("{} LIMIT {};", trimmed, schema.max_rows()))
    }
}

/// WHERE 절 추출 (ORDER/GROUP/LIMIT 또는 세미콜론 직전까지)
fn filter_clause(sql: &str) -> Option<String> {
    let where_re = Regex::new(r"(?i)\bwhere\b").unwrap();
    let m = where_re.find(sql)?;

    let rest = &sql[m.end()..];
    let end_re = Regex::new(r"(?i)\b(order|group|limit)\b|;").unwrap();
    let clause = match end_re.find(rest) {
        Some(end) => &rest[..end.start()],
        None => rest,
    };

    Some(clause.to_string())
}

/// 절 안에서 스키마에 없는 첫 식별자 탐색
///
/// 문자열 리터럴을 먼저 제거하고, SQL 키워드와 테이블 이름은 건너뜁니다.
fn find_unknown_identifier(clause: &str, schema: &SchemaDescriptor) -> Option<String> {
    let literal_re = Regex::new(r"'[^']*'").unwrap();
    let stripped = literal_re.replace_all(clause, " ");

    let ident_re = Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap();
    for m in ident_re.find_iter(&stripped) {
        let ident = m.as_str();
        let lower = ident.to_ascii_lowercase();

        if SQL_KEYWORDS.contains(&lower.as_str()) {
            continue;
        }
        if ident.eq_ignore_ascii_case(schema.table()) {
            continue;
        }
        if !schema.is_known_column(ident) {
            return Some(ident.to_string());
        }
    }

    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::mid_drugs()
    }

    #[test]
    fn test_join_returns_safe_default() {
        let q = validate("SELECT name FROM mid_drugs JOIN other", &schema());
        assert_eq!(q.as_str(), "SELECT * FROM mid_drugs LIMIT 10;");
    }

    #[test]
    fn test_missing_select_returns_safe_default() {
        let q = validate("show me everything about paracetamol", &schema());
        assert_eq!(q.as_str(), "SELECT * FROM mid_drugs LIMIT 10;");
    }

    #[test]
    fn test_empty_candidate_returns_safe_default() {
        let q = validate("", &schema());
        assert_eq!(q.as_str(), "SELECT * FROM mid_drugs LIMIT 10;");
    }

    #[test]
    fn test_unknown_column_in_filter_returns_wildcard_default() {
        let q = validate(
            "SELECT * FROM mid_drugs WHERE drug_name = 'Aspirin' LIMIT 5;",
            &schema(),
        );
        assert_eq!(
            q.as_str(),
            "SELECT * FROM mid_drugs WHERE name LIKE '%keyword%' LIMIT 10;"
        );
    }

    #[test]
    fn test_unknown_column_generalized_not_just_drug_name() {
        let q = validate(
            "SELECT name FROM mid_drugs WHERE dosage > 5",
            &schema(),
        );
        assert_eq!(
            q.as_str(),
            "SELECT * FROM mid_drugs WHERE name LIKE '%keyword%' LIMIT 10;"
        );
    }

    #[test]
    fn test_known_columns_in_filter_pass() {
        let candidate =
            "SELECT name, sideeffect FROM mid_drugs WHERE name LIKE '%aspirin%' AND habit_forming = 'No' LIMIT 3;";
        let q = validate(candidate, &schema());
        assert_eq!(q.as_str(), candidate);
    }

    #[test]
    fn test_string_literal_contents_ignored() {
        // 리터럴 안의 'unknown_word'는 식별자가 아님
        let candidate =
            "SELECT name FROM mid_drugs WHERE productuses LIKE '%unknown_word%' LIMIT 5;";
        let q = validate(candidate, &schema());
        assert_eq!(q.as_str(), candidate);
    }

    #[test]
    fn test_missing_limit_gets_row_cap() {
        let q = validate("SELECT name FROM mid_drugs", &schema());
        assert_eq!(q.as_str(), "SELECT name FROM mid_drugs LIMIT 10;");
    }

    #[test]
    fn test_leading_prose_is_stripped() {
        let q = validate(
            "Sure! Here is the query:\nSELECT name FROM mid_drugs LIMIT 5;",
            &schema(),
        );
        assert_eq!(q.as_str(), "SELECT name FROM mid_drugs LIMIT 5;");
    }

    #[test]
    fn test_validation_is_idempotent_on_defaults() {
        let s = schema();

        let safe = validate("no query here", &s);
        let safe_again = validate(safe.as_str(), &s);
        assert_eq!(safe, safe_again);

        let wildcard = validate("SELECT * FROM mid_drugs WHERE bogus = 1", &s);
        let wildcard_again = validate(wildcard.as_str(), &s);
        assert_eq!(wildcard, wildcard_again);
    }

    #[test]
    fn test_case_insensitive_markers() {
        let q = validate("select Name from MID_DRUGS Join other", &schema());
        assert_eq!(q.as_str(), "SELECT * FROM mid_drugs LIMIT 10;");

        let q = validate("SeLeCt name FrOm mid_drugs WhErE name = 'x' LiMiT 2", &schema());
        assert_eq!(q.as_str(), "SeLeCt name FrOm mid_drugs WhErE name = 'x' LiMiT 2");
    }

    #[test]
    fn test_order_by_after_where_not_scanned_as_filter() {
        // ORDER BY 이후는 필터 위치가 아님 (rowid는 컬럼 집합 밖이지만 통과)
        let candidate = "SELECT name FROM mid_drugs WHERE name LIKE '%a%' ORDER BY rowid LIMIT 5;";
        let q = validate(candidate, &schema());
        assert_eq!(q.as_str(), candidate);
    }
}
