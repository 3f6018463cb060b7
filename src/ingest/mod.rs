//! Ingest 모듈 - 컬렉션 빌드 파이프라인
//!
//! 약관 문서 파일 또는 디렉토리를 읽어 검색 가능한 컬렉션 아티팩트
//! (index.vec + metadata.json)를 생성합니다.
//!
//! 파이프라인: 파일 수집 → 텍스트 추출 → 조문 청킹 → 패시지 임베딩 → 아티팩트 쓰기

mod chunker;
mod extract;

// Re-exports
pub use chunker::{default_chunker, Chunk, ChunkConfig, Chunker, ClauseChunker};
pub use extract::{extract_pages, DocumentKind, Page};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use ignore::WalkBuilder;
use serde_json::{json, Map};
use tracing::{info, warn};

use crate::collection::{PassageEntry, VectorIndex, DEFAULT_INDEX_FILENAME, METADATA_FILENAME};
use crate::embedding::EmbeddingProvider;

// ============================================================================
// Types
// ============================================================================

/// 빌드 결과 요약
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// 컬렉션 정식 이름
    pub collection: String,
    /// 처리된 문서 파일 수
    pub documents: usize,
    /// 생성된 패시지 수
    pub passages: usize,
    /// 임베딩 차원
    pub dimension: usize,
    /// 아티팩트가 쓰인 디렉토리
    pub dir: PathBuf,
}

// ============================================================================
// CollectionBuilder
// ============================================================================

/// 컬렉션 빌더
///
/// 문서 파일 하나 또는 디렉토리 하나가 컬렉션 하나가 됩니다. 패시지 순서는
/// 파일 경로 오름차순 → 페이지 순 → 청크 순으로 고정되어,
/// 같은 입력에서 항상 같은 인덱스가 나옵니다.
pub struct CollectionBuilder {
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: Box<dyn Chunker>,
}

impl CollectionBuilder {
    /// 임베더와 청커로 빌더 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, chunker: Box<dyn Chunker>) -> Self {
        Self { embedder, chunker }
    }

    /// 기본 청커로 빌더 생성
    pub fn with_defaults(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::new(embedder, default_chunker())
    }

    /// 컬렉션 빌드
    ///
    /// # Arguments
    /// * `name` - 컬렉션 정식 이름 (출력 디렉토리 이름이 됨)
    /// * `input` - 약관 문서 파일 또는 문서들이 있는 디렉토리
    /// * `output_base` - 벡터 DB 루트 (이 아래에 {name}/ 생성)
    pub async fn build(
        &self,
        name: &str,
        input: &Path,
        output_base: &Path,
    ) -> Result<BuildReport> {
        let files = collect_documents(input)?;
        if files.is_empty() {
            anyhow::bail!("No supported documents (.txt, .md, .pdf) found in {:?}", input);
        }

        // 문서 추출 + 청킹. 추출에 실패한 파일은 빼고 계속 진행
        let mut entries: Vec<PassageEntry> = Vec::new();
        let mut documents = 0usize;

        for file in &files {
            let pages = match extract_pages(file) {
                Ok(pages) => pages,
                Err(e) => {
                    warn!(file = ?file, error = %e, "document extraction failed, skipping");
                    continue;
                }
            };

            let file_name = file
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();

            let mut file_chunks = 0usize;
            for page in pages {
                for chunk in self.chunker.chunk(&page.text) {
                    let mut metadata = Map::new();
                    metadata.insert("source".to_string(), json!(file_name));
                    if let Some(number) = page.number {
                        metadata.insert("page".to_string(), json!(number));
                    }
                    if let Some(article) = &chunk.article {
                        metadata.insert("article".to_string(), json!(article));
                    }
                    entries.push(PassageEntry {
                        content: chunk.text,
                        metadata,
                    });
                    file_chunks += 1;
                }
            }

            if file_chunks > 0 {
                documents += 1;
            }
            info!(file = %file_name, chunks = file_chunks, "document chunked");
        }

        if entries.is_empty() {
            anyhow::bail!("No text chunks produced from {:?}", input);
        }

        // 패시지 임베딩
        let texts: Vec<String> = entries.iter().map(|e| e.content.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed passages")?;

        let dimension = embeddings
            .first()
            .map(|v| v.len())
            .context("Embedder returned no vectors")?;

        // 아티팩트 쓰기
        let dir = output_base.join(name);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create collection directory {:?}", dir))?;

        let index = VectorIndex::from_rows(dimension, &embeddings)?;
        index.write(&dir.join(DEFAULT_INDEX_FILENAME))?;

        let metadata_json = serde_json::to_string_pretty(&entries)
            .context("Failed to serialize passage metadata")?;
        std::fs::write(dir.join(METADATA_FILENAME), metadata_json)?;

        info!(
            collection = name,
            documents,
            passages = entries.len(),
            dimension,
            "collection built"
        );

        Ok(BuildReport {
            collection: name.to_string(),
            documents,
            passages: entries.len(),
            dimension,
            dir,
        })
    }
}

// ============================================================================
// Document Discovery
// ============================================================================

/// 입력 경로에서 지원하는 문서 파일 수집
///
/// 파일 하나를 지정하면 그 파일만, 디렉토리를 지정하면 재귀 수집합니다.
fn collect_documents(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return collect_file(input);
    }
    if input.is_dir() {
        return collect_directory(input);
    }
    anyhow::bail!("Input path not found: {:?}", input)
}

/// 단일 파일 수집 (지원하는 확장자만)
fn collect_file(path: &Path) -> Result<Vec<PathBuf>> {
    if DocumentKind::from_path(path).is_none() {
        anyhow::bail!(
            "Unsupported document type (.txt, .md, .pdf only): {:?}",
            path
        );
    }
    Ok(vec![path.to_path_buf()])
}

/// 디렉토리 재귀 수집
///
/// .gitignore 패턴과 숨김 파일을 제외하고, 경로 오름차순으로 반환합니다.
fn collect_directory(input: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkBuilder::new(input)
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .build();

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Failed to read entry: {}", e);
                continue;
            }
        };

        if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
            continue;
        }

        let path = entry.path().to_path_buf();
        if DocumentKind::from_path(&path).is_some() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
