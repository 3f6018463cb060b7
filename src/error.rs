//! 에러 타입 정의
//!
//! 검색 파이프라인 전반에서 사용하는 에러 분류입니다.
//! 컬렉션 로드 실패는 해당 컬렉션만 제외하는 비치명적 에러이고,
//! 임베딩 실패는 요청 전체를 실패시키는 치명적 에러입니다.

use std::path::PathBuf;

use thiserror::Error;

/// 검색 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 컬렉션 디렉토리에 인덱스/메타데이터 아티팩트가 없음
    ///
    /// 배치 로드에서는 해당 컬렉션만 검색 대상에서 제외됩니다.
    #[error("collection '{name}': required artifacts not found in {}", .dir.display())]
    CollectionNotFound { name: String, dir: PathBuf },

    /// 인덱스 아티팩트 손상 (매직/버전/길이 불일치)
    #[error("invalid index artifact {}: {reason}", .path.display())]
    InvalidIndex { path: PathBuf, reason: String },

    /// metadata.json 파싱 실패
    #[error("invalid metadata file {}: {source}", .path.display())]
    InvalidMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// 쿼리 벡터와 인덱스의 차원 불일치
    #[error("query vector dimension {got} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    /// 쿼리 임베딩 실패 (요청 단위 치명적)
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// 파일 IO 에러
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// 검색 태스크 조인 실패
    #[error("search task failed: {0}")]
    Task(String),
}

/// 파이프라인 공용 Result
pub type RagResult<T> = Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_not_found_message() {
        let err = RagError::CollectionNotFound {
            name: "삼성화재".to_string(),
            dir: PathBuf::from("/data/vector_db/Samsung"),
        };
        let msg = err.to_string();
        assert!(msg.contains("삼성화재"));
        assert!(msg.contains("vector_db"));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = RagError::DimensionMismatch {
            expected: 4096,
            got: 768,
        };
        assert_eq!(
            err.to_string(),
            "query vector dimension 768 does not match index dimension 4096"
        );
    }

    #[test]
    fn test_io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RagError = io.into();
        assert!(matches!(err, RagError::Io(_)));
    }
}
