//! insupanda-rag - 보험 약관 검색 RAG 백엔드
//!
//! 보험 약관 문서에서 만든 벡터 컬렉션들을 메모리에 로드하고,
//! 질의 임베딩으로 멀티 컬렉션 k-최근접 검색을 수행합니다.
//! 결과는 유사도 스코어(1 / (1 + 거리)) 내림차순으로 병합됩니다.

pub mod cli;
pub mod collection;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod retrieval;

// Re-exports
pub use collection::{
    Collection, CollectionStore, Neighbor, PassageEntry, ScoredPassage, VectorIndex,
};
pub use config::{default_vector_db_dir, get_data_dir, RagConfig};
pub use embedding::{
    create_passage_embedder, create_query_embedder, get_api_key, has_api_key, EmbeddingKind,
    EmbeddingProvider, UpstageEmbedding, EMBEDDING_DIMENSION,
};
pub use error::{RagError, RagResult};
pub use ingest::{BuildReport, Chunk, ChunkConfig, Chunker, ClauseChunker, CollectionBuilder};
pub use retrieval::{QueryInput, RetrievalEngine, RetrievalResponse, SearchRequest};
