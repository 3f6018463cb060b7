//! CLI 모듈
//!
//! insupanda-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use crate::collection::{read_header, INDEX_FILE_CANDIDATES, METADATA_FILENAME};
use crate::config::RagConfig;
use crate::embedding::{create_passage_embedder, has_api_key, EmbeddingProvider};
use crate::ingest::{ChunkConfig, ClauseChunker, CollectionBuilder};
use crate::retrieval::{RetrievalEngine, SearchRequest};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "insupanda-rag")]
#[command(version, about = "보험 약관 멀티 컬렉션 벡터 검색", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 약관 컬렉션 검색
    Search {
        /// 검색 질의
        query: String,

        /// 검색할 컬렉션 (별칭 허용, 여러 번 지정하거나 쉼표로 구분)
        #[arg(short, long = "collection", alias = "collections", value_delimiter = ',')]
        collections: Vec<String>,

        /// 컬렉션당 결과 개수
        #[arg(short, long, default_value = "5")]
        k: usize,

        /// 유사도 임계값 (이 값 미만은 제외)
        #[arg(short, long, default_value = "0.7")]
        threshold: f32,

        /// 사람용 출력 대신 JSON 응답 봉투 출력
        #[arg(long)]
        json: bool,
    },

    /// 약관 문서 파일/디렉토리로 컬렉션 빌드
    Build {
        /// 컬렉션 정식 이름 (출력 디렉토리 이름)
        name: String,

        /// 약관 문서(.txt, .md, .pdf) 파일 또는 디렉토리
        #[arg(short, long)]
        input: PathBuf,

        /// 최대 청크 크기 (문자 수)
        #[arg(long, default_value = "1200")]
        max_chars: usize,

        /// 최소 청크 크기 (문자 수)
        #[arg(long, default_value = "200")]
        min_chars: usize,
    },

    /// 디스크의 컬렉션 목록
    Collections,

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Search {
            query,
            collections,
            k,
            threshold,
            json,
        } => cmd_search(&query, collections, k, threshold, json).await,
        Commands::Build {
            name,
            input,
            max_chars,
            min_chars,
        } => cmd_build(&name, &input, max_chars, min_chars).await,
        Commands::Collections => cmd_collections(),
        Commands::Status => cmd_status(),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 검색 명령어 (search)
///
/// 지정한 컬렉션들을 로드하고 질의에 대한 상위 패시지를 출력합니다.
async fn cmd_search(
    query: &str,
    collections: Vec<String>,
    k: usize,
    threshold: f32,
    json: bool,
) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export UPSTAGE_API_KEY=your-api-key\n  \
             또는\n  \
             export SOLAR_API_KEY=your-api-key\n\n\
             API 키 발급: https://console.upstage.ai/api-keys"
        );
    }

    let mut config = RagConfig::default();
    config.search_k = k;
    config.similarity_threshold = threshold;

    let engine = RetrievalEngine::from_env(config).context("검색 엔진 초기화 실패")?;

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
        if !collections.is_empty() {
            println!("    컬렉션: {}", collections.join(", "));
        }
    }

    let request = SearchRequest::new(query, collections);
    let response = engine.retrieve(&request).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if !response.success {
        println!(
            "\n[!] 검색 실패: {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
        return Ok(());
    }

    if let Some(skipped) = &response.skipped_collections {
        println!("[!] 로드 실패로 제외된 컬렉션: {}", skipped.join(", "));
    }

    let passages = response.passages();
    if passages.is_empty() {
        println!("\n[!] 임계값 {} 이상의 결과가 없습니다.", threshold);
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", passages.len());

    for (i, passage) in passages.iter().enumerate() {
        println!("{}. [점수: {:.4}] {}", i + 1, passage.score, passage.id);

        if let Some(source) = passage.metadata.get("source").and_then(|v| v.as_str()) {
            let article = passage
                .metadata
                .get("article")
                .and_then(|v| v.as_str())
                .unwrap_or("-");
            println!("   출처: {} ({})", source, article);
        }

        println!("   내용: {}", truncate_text(&passage.content, 200));
        println!();
    }

    Ok(())
}

/// 빌드 명령어 (build)
///
/// 문서 파일 또는 디렉토리를 읽어 벡터 DB에 컬렉션 아티팩트를 생성합니다.
async fn cmd_build(name: &str, input: &Path, max_chars: usize, min_chars: usize) -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export UPSTAGE_API_KEY=your-key"
        );
    }

    let config = RagConfig::default();

    println!("[*] 컬렉션 빌드 중: {}", name);
    println!("    입력: {}", input.display());
    println!("    출력: {}", config.vector_db_dir.join(name).display());

    let embedder: Arc<dyn EmbeddingProvider> =
        Arc::new(create_passage_embedder().context("임베더 초기화 실패")?);
    let chunker = ClauseChunker::new(ChunkConfig {
        min_characters: min_chars,
        max_characters: max_chars,
    });
    let builder = CollectionBuilder::new(embedder, Box::new(chunker));

    let report = builder
        .build(name, input, &config.vector_db_dir)
        .await
        .context("컬렉션 빌드 실패")?;

    println!();
    println!("[OK] 컬렉션이 생성되었습니다: {}", report.collection);
    println!("     문서 {} 개 → 패시지 {} 개 (차원 {})", report.documents, report.passages, report.dimension);
    println!("     위치: {}", report.dir.display());

    Ok(())
}

/// 컬렉션 목록 명령어 (collections)
///
/// 벡터 DB 디렉토리의 컬렉션들과 아티팩트 상태를 보여줍니다.
fn cmd_collections() -> Result<()> {
    let config = RagConfig::default();
    let entries = list_collection_dirs(&config.vector_db_dir)?;

    println!("[*] 벡터 DB: {}", config.vector_db_dir.display());

    if entries.is_empty() {
        println!("[!] 컬렉션이 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 컬렉션 ({} 개):\n", entries.len());
    for entry in &entries {
        let marker = if entry.complete { "[OK]" } else { "[!]" };
        match (entry.dim, entry.passages) {
            (Some(dim), Some(passages)) => println!(
                "  {} {} - 패시지 {} 개, 차원 {}, {}",
                marker,
                entry.name,
                passages,
                dim,
                format_bytes(entry.artifact_bytes as usize)
            ),
            _ => println!(
                "  {} {} ({})",
                marker,
                entry.name,
                format_bytes(entry.artifact_bytes as usize)
            ),
        }
        if let Some(modified) = entry.modified {
            println!("       수정: {}", modified.format("%Y-%m-%d %H:%M UTC"));
        }
        if !entry.complete {
            println!("       인덱스 또는 metadata.json 누락");
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
fn cmd_status() -> Result<()> {
    println!("insupanda-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = RagConfig::default();
    println!("[*] 벡터 DB 디렉토리: {}", config.vector_db_dir.display());
    if !config.vector_db_dir.exists() {
        println!("    (아직 없음 - build 명령으로 생성됩니다)");
    }

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export UPSTAGE_API_KEY=your-key");
    }

    let entries = list_collection_dirs(&config.vector_db_dir)?;
    println!("[*] 컬렉션: {} 개", entries.len());

    // 별칭 테이블
    let mut aliases: Vec<_> = config.aliases.iter().collect();
    aliases.sort();
    println!("[*] 별칭 ({} 개):", aliases.len());
    for (alias, canonical) in aliases {
        println!("    {} → {}", alias, canonical);
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 디스크 컬렉션 항목
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct CollectionDirEntry {
    name: String,
    complete: bool,
    artifact_bytes: u64,
    /// 인덱스 헤더의 벡터 차원 (헤더를 읽지 못하면 None)
    dim: Option<usize>,
    /// 인덱스 헤더의 패시지 개수
    passages: Option<usize>,
    /// 아티팩트 중 가장 최근 수정 시각
    modified: Option<DateTime<Utc>>,
}

/// 벡터 DB 디렉토리의 컬렉션 목록 (이름순)
fn list_collection_dirs(base: &Path) -> Result<Vec<CollectionDirEntry>> {
    let mut entries = Vec::new();
    if !base.exists() {
        return Ok(entries);
    }

    for entry in std::fs::read_dir(base).context("벡터 DB 디렉토리 읽기 실패")? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let dir = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();

        let index_path = INDEX_FILE_CANDIDATES
            .iter()
            .map(|c| dir.join(c))
            .find(|p| p.exists());
        let metadata_path = dir.join(METADATA_FILENAME);
        let complete = index_path.is_some() && metadata_path.exists();

        let (dim, passages) = match index_path.as_deref().map(read_header) {
            Some(Ok(header)) => (Some(header.dim), Some(header.count)),
            _ => (None, None),
        };

        let mut artifact_bytes = 0u64;
        let mut modified: Option<DateTime<Utc>> = None;
        let mut artifact_paths: Vec<&Path> = Vec::new();
        if let Some(path) = &index_path {
            artifact_paths.push(path);
        }
        if metadata_path.exists() {
            artifact_paths.push(&metadata_path);
        }
        for path in artifact_paths {
            if let Ok(meta) = std::fs::metadata(path) {
                artifact_bytes += meta.len();
                if let Ok(time) = meta.modified() {
                    let ts: DateTime<Utc> = time.into();
                    modified = Some(modified.map_or(ts, |cur| cur.max(ts)));
                }
            }
        }

        entries.push(CollectionDirEntry {
            name,
            complete,
            artifact_bytes,
            dim,
            passages,
            modified,
        });
    }

    entries.sort();
    Ok(entries)
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
