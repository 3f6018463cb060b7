//! 문서 텍스트 추출
//!
//! 약관 문서 파일(.txt, .md, .pdf)에서 페이지 단위 텍스트를 추출합니다.
//! PDF는 pdf-extract 크레이트로 읽고 폼피드 문자로 페이지를 나눕니다.

use std::path::Path;

use anyhow::{Context, Result};

// ============================================================================
// Document Kinds
// ============================================================================

/// 지원하는 문서 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// 일반 텍스트 (.txt, .md)
    Text,
    /// PDF 문서
    Pdf,
}

impl DocumentKind {
    /// 확장자로 문서 종류 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" => Some(DocumentKind::Text),
            "pdf" => Some(DocumentKind::Pdf),
            _ => None,
        }
    }

    /// 파일 경로에서 문서 종류 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

// ============================================================================
// Page Extraction
// ============================================================================

/// 추출된 페이지
#[derive(Debug, Clone)]
pub struct Page {
    /// 페이지 번호 (1부터). 페이지 개념이 없는 텍스트 파일은 None
    pub number: Option<usize>,
    pub text: String,
}

/// 문서에서 페이지별 텍스트 추출
pub fn extract_pages(path: &Path) -> Result<Vec<Page>> {
    let kind = DocumentKind::from_path(path)
        .with_context(|| format!("Unsupported document type: {:?}", path))?;

    match kind {
        DocumentKind::Text => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {:?}", path))?;
            Ok(vec![Page { number: None, text }])
        }
        DocumentKind::Pdf => extract_pdf_pages(path),
    }
}

/// PDF에서 페이지별 텍스트 추출
fn extract_pdf_pages(path: &Path) -> Result<Vec<Page>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| Page {
            number: Some(i + 1),
            text,
        })
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
///
/// 폼피드 문자(\x0c)를 우선 시도하고, 실패하면 전체를 한 페이지로 둡니다.
fn split_pdf_pages(text: &str) -> Vec<String> {
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("txt"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_extension("md"), Some(DocumentKind::Text));
        assert_eq!(DocumentKind::from_extension("PDF"), Some(DocumentKind::Pdf));
        assert_eq!(DocumentKind::from_extension("hwp"), None);
        assert_eq!(DocumentKind::from_extension("exe"), None);
    }

    #[test]
    fn test_extract_text_file_single_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("약관.txt");
        std::fs::write(&path, "제1조(목적) 이 약관의 목적.").unwrap();

        let pages = extract_pages(&path).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].number, None);
        assert!(pages[0].text.contains("제1조"));
    }

    #[test]
    fn test_extract_unsupported_extension_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("약관.hwp");
        std::fs::write(&path, "내용").unwrap();

        assert!(extract_pages(&path).is_err());
    }

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let text = "1쪽 내용\x0c2쪽 내용\x0c3쪽 내용";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0], "1쪽 내용");
        assert_eq!(pages[2], "3쪽 내용");
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        let text = "페이지 구분 없는 텍스트";
        let pages = split_pdf_pages(text);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0], "페이지 구분 없는 텍스트");
    }
}
