//! 약관 텍스트 청킹
//!
//! 보험 약관의 조문 구조("제N조", "제N조의M")를 존중하면서 텍스트를
//! 적절한 크기의 청크로 나눕니다. 조문 경계를 넘는 청크는 만들지 않습니다.

use regex::Regex;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정 (문자 수 기준)
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최소 청크 크기. 이보다 작은 청크는 같은 조문 안에서 병합
    pub min_characters: usize,
    /// 최대 청크 크기
    pub max_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_characters: 200,
            max_characters: 1200,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 청크 하나 (본문 + 소속 조문)
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// 이 청크가 속한 조문 라벨 (예: "제3조", "제10조의2"). 전문(前文)은 None
    pub article: Option<String>,
}

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// ClauseChunker
// ============================================================================

/// 조문 헤딩 패턴
///
/// 행 시작의 "제N조", "제N조의M"만 헤딩으로 본다. 뒤에 여는 괄호나
/// 공백이 따라와야 하므로 "제5조에 따라" 같은 본문 참조는 걸리지 않는다.
const ARTICLE_PATTERN: &str = r"^\s*(제\s*\d+\s*조(?:\s*의\s*\d+)?)(?:\(|\s|$)";

/// 조문 인식 청커
///
/// 분할 순서:
/// 1. 조문 헤딩에서 섹션 분리 (첫 조문 앞의 전문은 별도 섹션)
/// 2. 최대 크기를 넘는 섹션을 문단 경계에서 분할
/// 3. 같은 조문 안에서 너무 작은 청크 병합
pub struct ClauseChunker {
    config: ChunkConfig,
    article_re: Regex,
}

struct Section {
    article: Option<String>,
    text: String,
}

impl ClauseChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            article_re: Regex::new(ARTICLE_PATTERN).unwrap(),
        }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 조문 헤딩 기준으로 섹션 분리
    fn split_articles(&self, text: &str) -> Vec<Section> {
        let mut sections = Vec::new();
        let mut current = String::new();
        let mut current_article: Option<String> = None;

        for line in text.lines() {
            if let Some(caps) = self.article_re.captures(line) {
                if !current.trim().is_empty() {
                    sections.push(Section {
                        article: current_article.clone(),
                        text: current.trim().to_string(),
                    });
                }
                current = String::new();
                current_article = Some(normalize_article_label(&caps[1]));
            }
            current.push_str(line);
            current.push('\n');
        }

        if !current.trim().is_empty() {
            sections.push(Section {
                article: current_article,
                text: current.trim().to_string(),
            });
        }

        sections
    }

    /// 긴 섹션을 문단 경계에서 분할
    fn split_long_section(&self, section: &str) -> Vec<String> {
        if char_len(section) <= self.config.max_characters {
            return vec![section.to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in section.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            // 현재 청크에 추가하면 최대 크기 초과?
            if !current.is_empty()
                && char_len(&current) + char_len(para) + 2 > self.config.max_characters
            {
                chunks.push(std::mem::take(&mut current));
            }

            // 문단 자체가 최대 크기를 넘으면 줄 단위로 분할
            if char_len(para) > self.config.max_characters {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                for line in para.lines() {
                    if !current.is_empty()
                        && char_len(&current) + char_len(line) + 1 > self.config.max_characters
                    {
                        chunks.push(std::mem::take(&mut current));
                    }
                    if !current.is_empty() {
                        current.push('\n');
                    }
                    current.push_str(line);
                }
            } else {
                if !current.is_empty() {
                    current.push_str("\n\n");
                }
                current.push_str(para);
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        chunks
    }

    /// 같은 조문 안에서 작은 청크 병합
    fn merge_small_chunks(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.min_characters == 0 {
            return chunks;
        }

        let mut result: Vec<String> = Vec::new();

        for chunk in chunks {
            if let Some(last) = result.last_mut() {
                if char_len(last) < self.config.min_characters
                    && char_len(last) + char_len(&chunk) + 2 <= self.config.max_characters
                {
                    last.push_str("\n\n");
                    last.push_str(&chunk);
                    continue;
                }
            }
            result.push(chunk);
        }

        result
    }
}

impl Chunker for ClauseChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return vec![];
        }

        let mut chunks = Vec::new();

        for section in self.split_articles(text) {
            let pieces = self.split_long_section(&section.text);
            let pieces = self.merge_small_chunks(pieces);

            for piece in pieces {
                if piece.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    text: piece,
                    article: section.article.clone(),
                });
            }
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "ClauseChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 문자 수 (바이트 수 아님)
#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 조문 라벨 정규화 ("제 3 조" → "제3조")
fn normalize_article_label(label: &str) -> String {
    label.chars().filter(|c| !c.is_whitespace()).collect()
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(ClauseChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
