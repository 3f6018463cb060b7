//! 검색 엔진 - 멀티 컬렉션 벡터 검색 파이프라인
//!
//! 요청 처리 순서:
//! 1. 요청된 컬렉션을 로드 (실패한 컬렉션은 제외하고 계속)
//! 2. 질의 텍스트 임베딩
//! 3. 캐시에 로드된 모든 컬렉션에서 k-최근접 검색
//! 4. 결과 병합 후 스코어 내림차순 정렬
//! 5. 유사도 임계값 미만 제거
//!
//! 어떤 실패든 호출자에게는 {"success": false, "error": ...} 봉투로
//! 돌아가고, 패닉 외에는 에러가 밖으로 새지 않습니다.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::collection::{CollectionStore, ScoredPassage};
use crate::config::RagConfig;
use crate::embedding::{create_query_embedder, EmbeddingProvider};
use crate::error::{RagError, RagResult};

// ============================================================================
// Request / Response Types
// ============================================================================

/// 질의 입력
///
/// 평문 문자열과 {"query": "..."} 한 겹 중첩을 모두 받습니다.
/// 중첩은 정확히 한 단계만 허용됩니다.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QueryInput {
    Text(String),
    Nested { query: String },
}

impl QueryInput {
    /// 실제 질의 텍스트
    pub fn text(&self) -> &str {
        match self {
            QueryInput::Text(s) => s,
            QueryInput::Nested { query } => query,
        }
    }
}

impl From<&str> for QueryInput {
    fn from(s: &str) -> Self {
        QueryInput::Text(s.to_string())
    }
}

/// 검색 요청
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: QueryInput,
    /// 로드를 보장할 컬렉션 이름들 (별칭 허용)
    #[serde(default)]
    pub collections: Vec<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<QueryInput>, collections: Vec<String>) -> Self {
        Self {
            query: query.into(),
            collections,
        }
    }
}

/// 검색 응답 봉투
///
/// 성공: {"success": true, "results": [...], "skipped_collections": [...]?}
/// 실패: {"success": false, "error": "..."}
#[derive(Debug, Serialize)]
pub struct RetrievalResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<ScoredPassage>>,
    /// 로드에 실패해 검색에서 빠진 컬렉션들 (없으면 필드 생략)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_collections: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RetrievalResponse {
    fn ok(results: Vec<ScoredPassage>, skipped: Vec<String>) -> Self {
        Self {
            success: true,
            results: Some(results),
            skipped_collections: if skipped.is_empty() { None } else { Some(skipped) },
            error: None,
        }
    }

    fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: None,
            skipped_collections: None,
            error: Some(error.into()),
        }
    }

    /// 성공 응답의 결과 목록 (실패면 빈 슬라이스)
    pub fn passages(&self) -> &[ScoredPassage] {
        self.results.as_deref().unwrap_or(&[])
    }
}

// ============================================================================
// RetrievalEngine
// ============================================================================

/// 멀티 컬렉션 검색 엔진
///
/// 컬렉션 저장소와 임베더를 묶어 검색 요청을 처리합니다.
/// 전역 상태 없이 엔진 인스턴스 단위로 설정이 주입됩니다.
pub struct RetrievalEngine {
    store: Arc<CollectionStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    search_k: usize,
    similarity_threshold: f32,
}

impl RetrievalEngine {
    /// 저장소와 임베더로 엔진 생성
    ///
    /// 검색 파라미터(k, 임계값)는 저장소의 설정에서 가져옵니다.
    pub fn new(store: Arc<CollectionStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let search_k = store.config().search_k;
        let similarity_threshold = store.config().similarity_threshold;
        Self {
            store,
            embedder,
            search_k,
            similarity_threshold,
        }
    }

    /// 환경변수의 API 키로 엔진 구성 (Upstage 쿼리 임베더)
    pub fn from_env(config: RagConfig) -> anyhow::Result<Self> {
        let store = Arc::new(CollectionStore::new(config));
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(create_query_embedder()?);
        Ok(Self::new(store, embedder))
    }

    /// 내부 저장소 접근
    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// 검색 실행
    ///
    /// 실패해도 에러를 던지지 않고 항상 응답 봉투를 돌려줍니다.
    pub async fn retrieve(&self, request: &SearchRequest) -> RetrievalResponse {
        match self.retrieve_inner(request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "retrieval failed");
                RetrievalResponse::fail(e.to_string())
            }
        }
    }

    async fn retrieve_inner(&self, request: &SearchRequest) -> RagResult<RetrievalResponse> {
        debug!(
            query_chars = request.query.text().chars().count(),
            collections = ?request.collections,
            "retrieval started"
        );

        // 1. 요청된 컬렉션 로드. 실패한 컬렉션은 빼고 계속 진행
        let mut skipped = Vec::new();
        for name in &request.collections {
            if let Err(e) = self.store.ensure_loaded(name).await {
                warn!(collection = %name, error = %e, "collection load failed, skipping");
                skipped.push(name.clone());
            }
        }

        // 2. 질의 임베딩 (실패는 요청 전체 실패)
        let query_vector = self
            .embedder
            .embed(request.query.text())
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;

        // 3-4. 로드된 모든 컬렉션 검색 + 병합 + 정렬
        //      (요청에 없어도 이미 캐시에 있는 컬렉션은 검색 대상)
        let merged = self.store.search_all(&query_vector, self.search_k).await?;

        // 5. 임계값 필터
        let merged_len = merged.len();
        let results: Vec<ScoredPassage> = merged
            .into_iter()
            .filter(|p| p.score >= self.similarity_threshold)
            .collect();

        debug!(
            merged = merged_len,
            kept = results.len(),
            skipped = skipped.len(),
            "retrieval finished"
        );

        Ok(RetrievalResponse::ok(results, skipped))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;
    use tempfile::TempDir;

    use crate::collection::VectorIndex;
    use crate::embedding::testing::FixedEmbedding;

    use super::*;

    fn write_collection(base: &Path, name: &str, rows: &[Vec<f32>], contents: &[&str]) {
        let dir = base.join(name);
        std::fs::create_dir_all(&dir).unwrap();

        let dim = rows.first().map(|r| r.len()).unwrap_or(3);
        VectorIndex::from_rows(dim, rows)
            .unwrap()
            .write(&dir.join("index.vec"))
            .unwrap();

        let entries: Vec<_> = contents.iter().map(|c| json!({"content": c})).collect();
        std::fs::write(
            dir.join("metadata.json"),
            serde_json::to_string(&entries).unwrap(),
        )
        .unwrap();
    }

    /// 질의 "질의" → [1, 0, 0] 임베딩으로 고정한 테스트 엔진
    fn test_engine(base: &Path) -> RetrievalEngine {
        let config = RagConfig::new(base);
        let store = Arc::new(CollectionStore::new(config));
        let embedder = Arc::new(FixedEmbedding::new(3).with("질의", vec![1.0, 0.0, 0.0]));
        RetrievalEngine::new(store, embedder)
    }

    #[tokio::test]
    async fn test_retrieve_merges_sorts_and_filters() {
        let tmp = TempDir::new().unwrap();
        // CollA 행0: 거리 0 → 1.0 / 행1: 거리 2 → 1/3 (임계값 미달)
        write_collection(
            tmp.path(),
            "CollA",
            &[vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            &["정확 일치 조항", "무관한 조항"],
        );
        // CollB 행0: 거리 0.25 → 0.8
        write_collection(tmp.path(), "CollB", &[vec![0.5, 0.0, 0.0]], &["근접 조항"]);

        let engine = test_engine(tmp.path());
        let request =
            SearchRequest::new("질의", vec!["CollA".to_string(), "CollB".to_string()]);
        let response = engine.retrieve(&request).await;

        assert!(response.success);
        assert!(response.skipped_collections.is_none());
        let passages = response.passages();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].id, "CollA_0");
        assert_eq!(passages[0].score, 1.0);
        assert_eq!(passages[1].id, "CollB_0");
        assert!((passages[1].score - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_whole_collection_below_threshold_excluded() {
        let tmp = TempDir::new().unwrap();
        // CollA: 1.0, 0.8 — 둘 다 임계값 이상
        write_collection(
            tmp.path(),
            "CollA",
            &[vec![1.0, 0.0, 0.0], vec![0.5, 0.0, 0.0]],
            &["최고 조항", "차선 조항"],
        );
        // CollB 최고 스코어가 1/1.49 ≈ 0.67 로 임계값 미달
        write_collection(tmp.path(), "CollB", &[vec![0.3, 0.0, 0.0]], &["미달 조항"]);

        let engine = test_engine(tmp.path());
        let request =
            SearchRequest::new("질의", vec!["CollA".to_string(), "CollB".to_string()]);
        let response = engine.retrieve(&request).await;

        assert!(response.success);
        let ids: Vec<&str> = response.passages().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["CollA_0", "CollA_1"]);
        assert!(response
            .passages()
            .iter()
            .all(|p| p.score >= 0.7 && !p.id.starts_with("CollB")));
    }

    #[tokio::test]
    async fn test_missing_collection_is_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "CollA", &[vec![1.0, 0.0, 0.0]], &["조항"]);

        let engine = test_engine(tmp.path());
        let request = SearchRequest::new(
            "질의",
            vec!["CollA".to_string(), "없는컬렉션".to_string()],
        );
        let response = engine.retrieve(&request).await;

        assert!(response.success);
        assert_eq!(
            response.skipped_collections,
            Some(vec!["없는컬렉션".to_string()])
        );
        assert_eq!(response.passages().len(), 1);
        assert_eq!(response.passages()[0].id, "CollA_0");
    }

    #[tokio::test]
    async fn test_all_collections_missing_returns_empty_success() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(tmp.path());

        let request = SearchRequest::new("질의", vec!["없음1".to_string(), "없음2".to_string()]);
        let response = engine.retrieve(&request).await;

        assert!(response.success);
        assert_eq!(response.passages().len(), 0);
        assert_eq!(
            response.skipped_collections,
            Some(vec!["없음1".to_string(), "없음2".to_string()])
        );
    }

    #[tokio::test]
    async fn test_empty_query_returns_error_envelope() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "CollA", &[vec![1.0, 0.0, 0.0]], &["조항"]);

        let engine = test_engine(tmp.path());
        let request = SearchRequest::new("", vec!["CollA".to_string()]);
        let response = engine.retrieve(&request).await;

        assert!(!response.success);
        assert!(response.results.is_none());
        assert!(response.error.as_ref().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn test_cached_collections_searched_even_if_not_requested() {
        let tmp = TempDir::new().unwrap();
        write_collection(tmp.path(), "CollA", &[vec![1.0, 0.0, 0.0]], &["A 조항"]);
        write_collection(tmp.path(), "CollB", &[vec![0.5, 0.0, 0.0]], &["B 조항"]);

        let engine = test_engine(tmp.path());

        // 첫 요청으로 CollA를 캐시에 올린다
        let first = SearchRequest::new("질의", vec!["CollA".to_string()]);
        assert!(engine.retrieve(&first).await.success);

        // 두 번째 요청은 CollB만 지정하지만 캐시된 CollA도 검색된다
        let second = SearchRequest::new("질의", vec!["CollB".to_string()]);
        let response = engine.retrieve(&second).await;

        let ids: Vec<&str> = response.passages().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["CollA_0", "CollB_0"]);
    }

    #[tokio::test]
    async fn test_no_collections_at_all_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let engine = test_engine(tmp.path());

        let response = engine.retrieve(&SearchRequest::new("질의", vec![])).await;
        assert!(response.success);
        assert!(response.passages().is_empty());
        assert!(response.skipped_collections.is_none());
    }

    #[test]
    fn test_query_input_accepts_plain_and_nested() {
        let plain: SearchRequest =
            serde_json::from_str(r#"{"query": "삼성화재 암보험"}"#).unwrap();
        assert_eq!(plain.query.text(), "삼성화재 암보험");
        assert!(plain.collections.is_empty());

        let nested: SearchRequest =
            serde_json::from_str(r#"{"query": {"query": "보장 내용"}, "collections": ["삼성"]}"#)
                .unwrap();
        assert_eq!(nested.query.text(), "보장 내용");
        assert_eq!(nested.collections, vec!["삼성"]);
    }

    #[test]
    fn test_query_input_rejects_double_nesting() {
        let result: Result<SearchRequest, _> =
            serde_json::from_str(r#"{"query": {"query": {"query": "너무 깊음"}}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_response_envelope_shapes() {
        let ok = RetrievalResponse::ok(vec![], vec![]);
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["success"], true);
        assert!(value["results"].is_array());
        assert!(value.get("skipped_collections").is_none());
        assert!(value.get("error").is_none());

        let with_skipped = RetrievalResponse::ok(vec![], vec!["삼성".to_string()]);
        let value = serde_json::to_value(&with_skipped).unwrap();
        assert_eq!(value["skipped_collections"][0], "삼성");

        let fail = RetrievalResponse::fail("boom");
        let value = serde_json::to_value(&fail).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert!(value.get("results").is_none());
    }
}
