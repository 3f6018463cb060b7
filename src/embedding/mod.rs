//! 임베딩 모듈 - Upstage Solar API를 통한 텍스트 벡터화
//!
//! 질의와 패시지를 4096차원 벡터로 변환합니다. 쿼리용/패시지용
//! 모델이 분리되어 있어 용도에 맞는 쪽을 선택해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = UpstageEmbedding::query_from_env()?;
//! let embedding = embedder.embed("삼성화재 암보험 보장 내용").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    ///
    /// 빈 텍스트는 에러입니다. 호출자가 먼저 검증하거나 에러를 처리해야 합니다.
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
// Upstage Solar Embedding
// ============================================================================

/// Upstage 임베딩 API 엔드포인트
/// ref: https://developers.upstage.ai/docs/apis/embeddings
const UPSTAGE_EMBED_URL: &str = "https://api.upstage.ai/v1/solar/embeddings";

/// Solar 임베딩 차원
pub const EMBEDDING_DIMENSION: usize = 4096;

/// Rate Limiter 설정
const RATE_LIMIT_RPM: u32 = 100;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (버스트 방지)
const MIN_DELAY_MS: u64 = 100;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// 임베딩 용도 (모델 선택)
///
/// Solar 임베딩은 검색 질의와 색인 패시지에 서로 다른 모델을 씁니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    /// 검색 질의용
    Query,
    /// 색인할 패시지용
    Passage,
}

impl EmbeddingKind {
    /// 용도에 맞는 모델 이름
    pub fn model(&self) -> &'static str {
        match self {
            EmbeddingKind::Query => "solar-embedding-1-large-query",
            EmbeddingKind::Passage => "solar-embedding-1-large-passage",
        }
    }
}

/// Upstage Solar 임베딩 구현체
#[derive(Debug)]
pub struct UpstageEmbedding {
    api_key: String,
    client: reqwest::Client,
    kind: EmbeddingKind,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window - now.duration_since(oldest);
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                // 대기 후 다시 정리
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl UpstageEmbedding {
    /// 새 Upstage 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `api_key` - Upstage API 키
    /// * `kind` - 쿼리용/패시지용 모델 선택
    pub fn new(api_key: String, kind: EmbeddingKind) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            client,
            kind,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 쿼리용 임베더 생성
    pub fn query_from_env() -> Result<Self> {
        Self::new(get_api_key()?, EmbeddingKind::Query)
    }

    /// 환경변수에서 API 키를 읽어 패시지용 임베더 생성
    pub fn passage_from_env() -> Result<Self> {
        Self::new(get_api_key()?, EmbeddingKind::Passage)
    }

    /// 임베딩 용도 반환
    pub fn kind(&self) -> EmbeddingKind {
        self.kind
    }
}

/// Upstage API 요청 본문 (OpenAI 호환 형식)
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    input: String,
}

/// Upstage API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

/// Upstage API 에러 응답
#[derive(Debug, Deserialize)]
struct UpstageError {
    error: UpstageErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UpstageErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[async_trait]
impl EmbeddingProvider for UpstageEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 의미 있는 벡터가 없으므로 명시적으로 실패시킨다
        if text.trim().is_empty() {
            anyhow::bail!("Cannot embed empty text");
        }

        let request = EmbedRequest {
            model: self.kind.model().to_string(),
            input: text.to_string(),
        };

        let mut last_error: Option<anyhow::Error> = None;

        // 재시도 루프 (429 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            // Rate limiting (매 시도마다)
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 호출 (키는 헤더로만 전송하고 에러 메시지에는 싣지 않는다)
            let response = match self
                .client
                .post(UPSTAGE_EMBED_URL)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow::anyhow!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .context("Failed to read response body")?;

            // 성공
            if status.is_success() {
                let embed_response: EmbedResponse =
                    serde_json::from_str(&body).context("Failed to parse embedding response")?;
                let data = embed_response
                    .data
                    .into_iter()
                    .next()
                    .context("Embedding response contained no data")?;
                return Ok(data.embedding);
            }

            // 429 Rate Limit 에러 - 재시도
            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(anyhow::anyhow!("Rate limit exceeded (429)"));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                if let Ok(error) = serde_json::from_str::<UpstageError>(&body) {
                    anyhow::bail!(
                        "Upstage API error ({}): {}",
                        error.error.code.as_deref().unwrap_or("unknown"),
                        error.error.message
                    );
                }
                anyhow::bail!("Upstage API error ({}): {}", status, body);
            }
        }

        // 모든 재시도 실패
        Err(last_error
            .unwrap_or_else(|| anyhow::anyhow!("Embedding failed after {} retries", MAX_RETRIES)))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // 순차 처리. Rate limiter가 호출 간격을 조절한다
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn name(&self) -> &str {
        self.kind.model()
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `UPSTAGE_API_KEY` 환경변수
/// 2. `SOLAR_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    // 1. UPSTAGE_API_KEY 확인
    if let Ok(key) = std::env::var("UPSTAGE_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from UPSTAGE_API_KEY");
            return Ok(key);
        }
    }

    // 2. SOLAR_API_KEY 확인 (대체)
    if let Ok(key) = std::env::var("SOLAR_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from SOLAR_API_KEY");
            return Ok(key);
        }
    }

    anyhow::bail!(
        "API key not found. Set UPSTAGE_API_KEY or SOLAR_API_KEY environment variable.\n\
         Get your API key at: https://console.upstage.ai/api-keys"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    for var in ["UPSTAGE_API_KEY", "SOLAR_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                return true;
            }
        }
    }
    false
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 쿼리 임베딩 프로바이더 생성
///
/// 환경변수에서 API 키를 읽어 UpstageEmbedding을 생성합니다.
pub fn create_query_embedder() -> Result<UpstageEmbedding> {
    let embedder = UpstageEmbedding::query_from_env()?;
    tracing::info!("Using Upstage embedding: {}", embedder.name());
    Ok(embedder)
}

/// 패시지 임베딩 프로바이더 생성 (컬렉션 빌드용)
pub fn create_passage_embedder() -> Result<UpstageEmbedding> {
    let embedder = UpstageEmbedding::passage_from_env()?;
    tracing::info!("Using Upstage embedding: {}", embedder.name());
    Ok(embedder)
}

// ============================================================================
// Test Double
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::FixedEmbedding;
    use super::*;

    #[test]
    fn test_embedding_kind_models() {
        assert_eq!(EmbeddingKind::Query.model(), "solar-embedding-1-large-query");
        assert_eq!(
            EmbeddingKind::Passage.model(),
            "solar-embedding-1-large-passage"
        );
    }

    #[test]
    fn test_upstage_embedding_name_and_dimension() {
        let embedder = UpstageEmbedding::new("fake_key".to_string(), EmbeddingKind::Query).unwrap();
        assert_eq!(embedder.name(), "solar-embedding-1-large-query");
        assert_eq!(embedder.dimension(), 4096);
    }

    #[tokio::test]
    async fn test_embed_empty_text_fails_before_network() {
        let embedder = UpstageEmbedding::new("fake_key".to_string(), EmbeddingKind::Query).unwrap();

        let result = embedder.embed("   ").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[tokio::test]
    async fn test_fixed_embedding_returns_registered_vector() {
        let embedder = FixedEmbedding::new(3).with("질의", vec![1.0, 0.0, 0.0]);

        let vector = embedder.embed("질의").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);

        let missing = embedder.embed("등록 안 됨").await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_fixed_embedding_fallback() {
        let embedder = FixedEmbedding::new(3).with_fallback(vec![0.0, 0.0, 1.0]);
        let vector = embedder.embed("아무 텍스트").await.unwrap();
        assert_eq!(vector, vec![0.0, 0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_fixed_embedding_rejects_empty() {
        let embedder = FixedEmbedding::new(3).with_fallback(vec![0.0; 3]);
        assert!(embedder.embed("").await.is_err());
    }
}
