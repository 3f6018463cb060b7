//! Collection 모듈 - 벡터 컬렉션 저장소
//!
//! - document: metadata.json 항목과 검색 결과 타입
//! - index: 평면 벡터 인덱스 (IPVI 아티팩트 읽기/쓰기, 제곱 L2 검색)
//! - store: 컬렉션 로드/캐시/병렬 검색

mod document;
mod index;
mod store;

// Re-exports
pub use document::{PassageEntry, ScoredPassage};
pub use index::{
    read_header, IndexHeader, Neighbor, VectorIndex,
    DEFAULT_INDEX_FILENAME, INDEX_FILE_CANDIDATES,
};
pub use store::{Collection, CollectionStore, METADATA_FILENAME};
