//! 컬렉션 저장소
//!
//! 디스크의 컬렉션 디렉토리(인덱스 아티팩트 + metadata.json)를 로드하고
//! 메모리 캐시로 관리합니다. 한 번 로드된 컬렉션은 프로세스가 살아있는 동안
//! 다시 읽지 않습니다.
//!
//! 저장 레이아웃:
//!   {vector_db_dir}/
//!     {컬렉션 정식 이름}/
//!       index.vec        (또는 vec.index, index)
//!       metadata.json    (JSON 배열, i번째 원소 = 인덱스 i번째 행)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use crate::collection::document::{PassageEntry, ScoredPassage};
use crate::collection::index::{VectorIndex, INDEX_FILE_CANDIDATES};
use crate::config::RagConfig;
use crate::error::{RagError, RagResult};

/// 패시지 메타데이터 파일 이름
pub const METADATA_FILENAME: &str = "metadata.json";

// ============================================================================
// Collection
// ============================================================================

/// 로드 완료된 컬렉션 (인덱스 + 패시지 목록)
///
/// 생성자는 두 아티팩트를 모두 읽어 성공했을 때만 값을 돌려주므로,
/// 캐시에는 절반만 로드된 컬렉션이 존재할 수 없습니다.
pub struct Collection {
    name: String,
    dir: PathBuf,
    index: VectorIndex,
    passages: Vec<PassageEntry>,
}

impl Collection {
    /// 디렉토리에서 컬렉션 로드
    ///
    /// 인덱스 파일은 후보 이름들을 순서대로 시도해 첫 번째로 존재하는 것을
    /// 사용합니다. 인덱스나 metadata.json이 없으면 CollectionNotFound.
    pub fn load(name: &str, dir: &Path) -> RagResult<Self> {
        let index_path = find_index_file(dir);
        let metadata_path = dir.join(METADATA_FILENAME);

        let index_path = match index_path {
            Some(p) if metadata_path.exists() => p,
            _ => {
                return Err(RagError::CollectionNotFound {
                    name: name.to_string(),
                    dir: dir.to_path_buf(),
                })
            }
        };

        let index = VectorIndex::read(&index_path)?;

        let raw = std::fs::read_to_string(&metadata_path)?;
        let passages: Vec<PassageEntry> =
            serde_json::from_str(&raw).map_err(|e| RagError::InvalidMetadata {
                path: metadata_path.clone(),
                source: e,
            })?;

        debug!(
            collection = name,
            vectors = index.len(),
            passages = passages.len(),
            "collection loaded"
        );

        Ok(Self {
            name: name.to_string(),
            dir: dir.to_path_buf(),
            index,
            passages,
        })
    }

    /// 컬렉션 정식 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 컬렉션 디렉토리
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 패시지 개수
    pub fn len(&self) -> usize {
        self.passages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passages.is_empty()
    }

    /// 벡터 차원
    pub fn dim(&self) -> usize {
        self.index.dim()
    }

    /// 컬렉션 내 k-최근접 검색
    ///
    /// 거리 d는 score = 1 / (1 + d)로 변환합니다. 정확히 일치하면 1.0.
    /// 메타데이터 범위를 벗어난 행 위치는 조용히 건너뜁니다.
    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<ScoredPassage>> {
        let neighbors = self.index.search(query, k)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            // 인덱스 행이 메타데이터보다 많은 경우: 해당 행은 결과에서 제외
            let Some(entry) = self.passages.get(neighbor.position) else {
                trace!(
                    collection = %self.name,
                    position = neighbor.position,
                    "index row has no metadata entry, skipping"
                );
                continue;
            };
            results.push(ScoredPassage {
                id: format!("{}_{}", self.name, neighbor.position),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                score: 1.0 / (1.0 + neighbor.distance),
            });
        }

        Ok(results)
    }
}

/// 후보 이름들을 순서대로 시도해 존재하는 인덱스 파일 경로 반환
fn find_index_file(dir: &Path) -> Option<PathBuf> {
    INDEX_FILE_CANDIDATES
        .iter()
        .map(|candidate| dir.join(candidate))
        .find(|path| path.exists())
}

// ============================================================================
// CollectionStore
// ============================================================================

/// 컬렉션 캐시 저장소
///
/// 읽기가 압도적으로 많은 워크로드라 캐시는 RwLock으로 보호하고,
/// 로드는 전역 뮤텍스로 직렬화해 같은 컬렉션이 중복으로 읽히지 않게 합니다.
pub struct CollectionStore {
    config: RagConfig,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    load_lock: Mutex<()>,
}

impl CollectionStore {
    pub fn new(config: RagConfig) -> Self {
        Self {
            config,
            collections: RwLock::new(HashMap::new()),
            load_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// 별칭을 정식 컬렉션 이름으로 변환
    pub fn resolve_alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.config.canonical_name(name)
    }

    /// 컬렉션이 캐시에 있도록 보장 (없으면 디스크에서 로드)
    ///
    /// 캐시 키는 정식 이름이라 같은 컬렉션의 여러 별칭이 캐시 항목을
    /// 하나만 차지합니다. 이미 로드된 컬렉션은 디스크를 다시 읽지 않습니다.
    pub async fn ensure_loaded(&self, name: &str) -> RagResult<()> {
        let canonical = self.resolve_alias(name).to_string();

        // Fast path: 이미 캐시에 있음
        if self.is_loaded(&canonical) {
            return Ok(());
        }

        // 로드 직렬화. 락을 잡은 뒤 다른 태스크가 먼저 로드했는지 다시 확인
        let _guard = self.load_lock.lock().await;
        if self.is_loaded(&canonical) {
            return Ok(());
        }

        let dir = self.config.vector_db_dir.join(&canonical);
        let load_name = canonical.clone();
        let loaded = tokio::task::spawn_blocking(move || Collection::load(&load_name, &dir))
            .await
            .map_err(|e| RagError::Task(e.to_string()))??;

        info!(
            collection = %canonical,
            passages = loaded.len(),
            dim = loaded.dim(),
            "collection registered"
        );

        let mut cache = self.collections.write().unwrap_or_else(|e| e.into_inner());
        cache.insert(canonical, Arc::new(loaded));
        Ok(())
    }

    fn is_loaded(&self, canonical: &str) -> bool {
        self.collections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(canonical)
    }

    /// 로드된 컬렉션 스냅샷 (이름순 정렬)
    pub fn loaded(&self) -> Vec<Arc<Collection>> {
        let cache = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<Arc<Collection>> = cache.values().cloned().collect();
        list.sort_by(|a, b| a.name().cmp(b.name()));
        list
    }

    /// 로드된 컬렉션 이름 목록 (이름순 정렬)
    pub fn loaded_names(&self) -> Vec<String> {
        self.loaded().iter().map(|c| c.name().to_string()).collect()
    }

    /// 로드된 모든 컬렉션에서 병렬 검색 후 병합
    ///
    /// 컬렉션별로 k개씩 검색하고, 병합 결과를 스코어 내림차순으로
    /// 안정 정렬합니다 (동점은 이름순 컬렉션 순서 유지).
    pub async fn search_all(&self, query: &[f32], k: usize) -> RagResult<Vec<ScoredPassage>> {
        let collections = self.loaded();
        if collections.is_empty() {
            return Ok(vec![]);
        }

        let query: Arc<Vec<f32>> = Arc::new(query.to_vec());
        let tasks = collections.into_iter().map(|collection| {
            let query = Arc::clone(&query);
            tokio::task::spawn_blocking(move || collection.search(&query, k))
        });

        let mut merged = Vec::new();
        for joined in join_all(tasks).await {
            let results = joined.map_err(|e| RagError::Task(e.to_string()))??;
            merged.extend(results);
        }

        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(merged)
    }
}

// ============================================================================
// Tests
// ============================================================================
