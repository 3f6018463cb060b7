//! 패시지 데이터 타입
//!
//! metadata.json 항목과 검색 결과 타입을 정의합니다.
//! metadata.json은 JSON 배열이며, i번째 원소가 인덱스의 i번째 행과 짝을 이룹니다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// metadata.json의 패시지 항목
///
/// 배열 위치가 인덱스 행 위치와 일치해야 합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageEntry {
    /// 패시지 본문
    pub content: String,
    /// 출처 등 부가 정보 (없으면 빈 객체)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// 스코어가 매겨진 검색 결과 패시지
///
/// id는 "{컬렉션 정식 이름}_{인덱스 행 위치}" 형식입니다.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPassage {
    pub id: String,
    pub content: String,
    pub metadata: Map<String, Value>,
    /// 1 / (1 + 거리). 거리 0이면 정확히 1.0
    pub score: f32,
}
