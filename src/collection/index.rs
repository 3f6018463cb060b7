//! 평면 벡터 인덱스
//!
//! 전체 벡터를 메모리에 올려두고 제곱 L2 거리로 정확 탐색합니다.
//! 컬렉션 규모(수천 개 패시지)에서는 근사 인덱스 없이 충분히 빠릅니다.
//!
//! 인덱스 아티팩트 포맷 (IPVI v1, little-endian):
//!   [0..4)   매직 "IPVI"
//!   [4..8)   포맷 버전 (u32)
//!   [8..12)  벡터 차원 (u32)
//!   [12..16) 벡터 개수 (u32)
//!   [16..)   f32 벡터 데이터, 행우선 (개수 x 차원)

use std::cmp::Ordering;
use std::path::Path;

use crate::error::{RagError, RagResult};

// ============================================================================
// Artifact Format
// ============================================================================

const INDEX_MAGIC: &[u8; 4] = b"IPVI";
const INDEX_FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 16;

/// 빌더가 쓰는 인덱스 파일 이름
pub const DEFAULT_INDEX_FILENAME: &str = "index.vec";

/// 로드 시 순서대로 시도하는 인덱스 파일 이름 후보
pub const INDEX_FILE_CANDIDATES: &[&str] = &[DEFAULT_INDEX_FILENAME, "vec.index", "index"];

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 이웃 (인덱스 행 위치 + 제곱 L2 거리)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

/// 인덱스 파일 헤더 정보
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexHeader {
    pub dim: usize,
    pub count: usize,
}

/// 메모리 상주 평면 벡터 인덱스
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dim: usize,
    /// 행우선 벡터 데이터 (len = count * dim)
    vectors: Vec<f32>,
}

impl VectorIndex {
    /// 벡터 행들로 인덱스 구성
    ///
    /// 모든 행의 차원이 같아야 합니다.
    pub fn from_rows(dim: usize, rows: &[Vec<f32>]) -> RagResult<Self> {
        let mut vectors = Vec::with_capacity(rows.len() * dim);
        for row in rows {
            if row.len() != dim {
                return Err(RagError::DimensionMismatch {
                    expected: dim,
                    got: row.len(),
                });
            }
            vectors.extend_from_slice(row);
        }
        Ok(Self { dim, vectors })
    }

    /// 벡터 개수
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.vectors.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// 벡터 차원
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 특정 행의 벡터 조회
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dim;
        Some(&self.vectors[start..start + self.dim])
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// k-최근접 이웃 검색
    ///
    /// 거리 오름차순으로 정렬하고, 거리가 같으면 행 위치가 작은 쪽을 앞에 둡니다.
    /// k가 벡터 개수보다 커도 에러 없이 전체를 반환합니다.
    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(position, row)| Neighbor {
                position,
                distance: squared_l2(query, row),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);

        Ok(neighbors)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// 파일에서 인덱스 읽기
    ///
    /// 매직/버전/길이를 모두 검증하고, 하나라도 어긋나면 InvalidIndex를 반환합니다.
    pub fn read(path: &Path) -> RagResult<Self> {
        let data = std::fs::read(path)?;
        let header = parse_header(path, &data)?;

        let expected_len = header
            .count
            .checked_mul(header.dim)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| invalid(path, "vector payload size overflow"))?;
        if data.len() != expected_len {
            return Err(invalid(
                path,
                format!(
                    "expected {} bytes for {} x {} vectors, got {}",
                    expected_len,
                    header.count,
                    header.dim,
                    data.len()
                ),
            ));
        }

        let mut vectors = Vec::with_capacity(header.count * header.dim);
        for chunk in data[HEADER_LEN..].chunks_exact(4) {
            vectors.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        }

        Ok(Self { dim: header.dim, vectors })
    }

    /// 인덱스를 파일로 쓰기
    pub fn write(&self, path: &Path) -> RagResult<()> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&INDEX_FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&(self.dim as u32).to_le_bytes());
        buf.extend_from_slice(&(self.len() as u32).to_le_bytes());
        for v in &self.vectors {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        std::fs::write(path, buf)?;
        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 헤더만 읽어 차원/개수 조회
///
/// 본문은 읽지 않으므로 전체 로드가 필요 없는 목록 출력 등에 사용합니다.
pub fn read_header(path: &Path) -> RagResult<IndexHeader> {
    use std::io::Read;

    let mut file = std::fs::File::open(path)?;
    let mut header = [0u8; HEADER_LEN];
    file.read_exact(&mut header).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            invalid(path, format!("file too short (< {} bytes)", HEADER_LEN))
        } else {
            RagError::Io(e)
        }
    })?;
    parse_header(path, &header)
}

/// 헤더 검증 (매직/버전/차원)
fn parse_header(path: &Path, data: &[u8]) -> RagResult<IndexHeader> {
    if data.len() < HEADER_LEN {
        return Err(invalid(path, format!("file too short ({} bytes)", data.len())));
    }
    if &data[0..4] != INDEX_MAGIC {
        return Err(invalid(path, "bad magic (not an IPVI index)"));
    }

    let version = read_u32(data, 4);
    if version != INDEX_FORMAT_VERSION {
        return Err(invalid(path, format!("unsupported format version {}", version)));
    }

    let dim = read_u32(data, 8) as usize;
    let count = read_u32(data, 12) as usize;
    if dim == 0 {
        return Err(invalid(path, "dimension must be non-zero"));
    }

    Ok(IndexHeader { dim, count })
}

/// 제곱 L2 거리 (루트 생략)
fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn invalid(path: &Path, reason: impl Into<String>) -> RagError {
    RagError::InvalidIndex {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_index() -> VectorIndex {
        VectorIndex::from_rows(
            3,
            &[
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
                vec![1.0, 1.0, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_from_rows_rejects_ragged_rows() {
        let result = VectorIndex::from_rows(3, &[vec![1.0, 0.0, 0.0], vec![1.0, 0.0]]);
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_search_orders_by_distance_ascending() {
        let index = sample_index();
        let neighbors = index.search(&[1.0, 0.0, 0.0], 4).unwrap();

        assert_eq!(neighbors.len(), 4);
        // 정확히 일치하는 행이 거리 0으로 맨 앞
        assert_eq!(neighbors[0].position, 0);
        assert_eq!(neighbors[0].distance, 0.0);
        assert_eq!(neighbors[1].position, 3); // 거리 1.0
        // 나머지 둘은 거리 2.0 동점, 행 위치 순
        assert_eq!(neighbors[2].position, 1);
        assert_eq!(neighbors[3].position, 2);
        assert!(neighbors.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_search_k_larger_than_count() {
        let index = sample_index();
        let neighbors = index.search(&[0.0, 0.0, 0.0], 100).unwrap();
        assert_eq!(neighbors.len(), 4);
    }

    #[test]
    fn test_search_k_zero() {
        let index = sample_index();
        let neighbors = index.search(&[0.0, 0.0, 0.0], 0).unwrap();
        assert!(neighbors.is_empty());
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = sample_index();
        let result = index.search(&[1.0, 0.0], 5);
        assert!(matches!(
            result,
            Err(RagError::DimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_INDEX_FILENAME);

        let index = sample_index();
        index.write(&path).unwrap();

        let loaded = VectorIndex::read(&path).unwrap();
        assert_eq!(loaded.dim(), 3);
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded.row(3).unwrap(), &[1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_read_rejects_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00\x03\x00\x00\x00\x00\x00\x00\x00").unwrap();

        let result = VectorIndex::read(&path);
        match result {
            Err(RagError::InvalidIndex { reason, .. }) => assert!(reason.contains("magic")),
            other => panic!("expected InvalidIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_read_rejects_unsupported_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");

        let mut buf = Vec::new();
        buf.extend_from_slice(INDEX_MAGIC);
        buf.extend_from_slice(&99u32.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        std::fs::write(&path, buf).unwrap();

        let result = VectorIndex::read(&path);
        match result {
            Err(RagError::InvalidIndex { reason, .. }) => assert!(reason.contains("version")),
            other => panic!("expected InvalidIndex, got {:?}", other),
        }
    }

    #[test]
    fn test_read_rejects_truncated_payload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");

        let index = sample_index();
        index.write(&path).unwrap();

        // 마지막 4바이트를 잘라낸다
        let mut data = std::fs::read(&path).unwrap();
        data.truncate(data.len() - 4);
        std::fs::write(&path, data).unwrap();

        let result = VectorIndex::read(&path);
        assert!(matches!(result, Err(RagError::InvalidIndex { .. })));
    }

    #[test]
    fn test_read_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");
        sample_index().write(&path).unwrap();

        let header = read_header(&path).unwrap();
        assert_eq!(header.dim, 3);
        assert_eq!(header.count, 4);
    }

    #[test]
    fn test_read_header_rejects_short_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");
        std::fs::write(&path, b"data").unwrap();

        assert!(matches!(read_header(&path), Err(RagError::InvalidIndex { .. })));
    }

    #[test]
    fn test_empty_index_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.vec");

        let index = VectorIndex::from_rows(4096, &[]).unwrap();
        index.write(&path).unwrap();

        let loaded = VectorIndex::read(&path).unwrap();
        assert_eq!(loaded.dim(), 4096);
        assert!(loaded.is_empty());
        assert!(loaded.search(&vec![0.0; 4096], 5).unwrap().is_empty());
    }
}
