//! 검색 설정
//!
//! 벡터 DB 경로, 검색 파라미터, 컬렉션 별칭 테이블을 관리합니다.
//! 별칭 테이블은 전역이 아니라 설정 객체에 담아 주입합니다.

use std::collections::HashMap;
use std::path::PathBuf;

// ============================================================================
// Defaults
// ============================================================================

/// 기본 검색 결과 개수
pub const DEFAULT_SEARCH_K: usize = 5;

/// 기본 유사도 임계값 (score = 1 / (1 + distance))
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.7;

/// 벡터 DB 경로 오버라이드용 환경 변수
pub const VECTOR_DB_ENV: &str = "INSUPANDA_VECTOR_DB";

/// 데이터 디렉토리 경로 (~/.insupanda-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".insupanda-rag")
}

/// 기본 벡터 DB 디렉토리
///
/// 환경 변수 INSUPANDA_VECTOR_DB가 설정되어 있으면 그 경로를 사용합니다.
pub fn default_vector_db_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(VECTOR_DB_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    get_data_dir().join("vector_db")
}

// ============================================================================
// RagConfig
// ============================================================================

/// 검색 파이프라인 설정
///
/// 별칭 테이블은 정확 일치(대소문자 구분)로만 조회하며,
/// 테이블에 없는 이름은 그대로 정식 이름으로 간주합니다.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// 컬렉션 디렉토리들이 있는 루트 경로
    pub vector_db_dir: PathBuf,
    /// 컬렉션당 검색 결과 개수
    pub search_k: usize,
    /// 이 값 미만의 스코어는 결과에서 제외
    pub similarity_threshold: f32,
    /// 별칭 → 정식 컬렉션 이름
    pub aliases: HashMap<String, String>,
}

impl RagConfig {
    /// 지정한 벡터 DB 경로로 설정 생성
    pub fn new(vector_db_dir: impl Into<PathBuf>) -> Self {
        Self {
            vector_db_dir: vector_db_dir.into(),
            search_k: DEFAULT_SEARCH_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            aliases: default_aliases(),
        }
    }

    /// 별칭을 정식 컬렉션 이름으로 변환
    ///
    /// 테이블에 없으면 입력을 그대로 반환합니다 (identity fallback).
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self::new(default_vector_db_dir())
    }
}

/// 기본 별칭 테이블
///
/// 보험사 한글/영문 표기를 실제 컬렉션 디렉토리 이름으로 매핑합니다.
pub fn default_aliases() -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (alias, canonical) in [
        ("db손해보험", "DBSonBo_YakMu20250123"),
        ("DB손해보험", "DBSonBo_YakMu20250123"),
        ("db손보", "DBSonBo_YakMu20250123"),
        ("삼성화재", "Samsung_YakMu2404103NapHae20250113"),
        ("삼성", "Samsung_YakMu2404103NapHae20250113"),
        // 구버전 컬렉션 이름도 최신으로 넘겨준다
        ("DBSonbo_Yakwan20250123", "DBSonBo_YakMu20250123"),
    ] {
        map.insert(alias.to_string(), canonical.to_string());
    }
    map
}
