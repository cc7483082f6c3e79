//! Integration tests for friendrec.
//!
//! These tests exercise the library end to end:
//! - Loading embeddings from `.json` and `.npy` files
//! - Loading the user directory, including the GBK fallback
//! - Recommendations joined with directory info

use friendrec::directory::{TextEncoding, placeholder};
use friendrec::{EmbeddingStore, FriendRecError, RecommendationEngine, UserDirectory, UserId};
use std::path::PathBuf;
use tempfile::TempDir;

/// Write a 2-D little-endian `<f4` array in NPY v1 format.
fn write_npy(dir: &TempDir, name: &str, rows: &[Vec<f32>]) -> PathBuf {
    let cols = rows.first().map_or(0, Vec::len);
    let mut header = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {cols}), }}",
        rows.len()
    );
    while (10 + header.len() + 1) % 64 != 0 {
        header.push(' ');
    }
    header.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.extend_from_slice(&u16::try_from(header.len()).unwrap().to_le_bytes());
    bytes.extend_from_slice(header.as_bytes());
    for value in rows.iter().flatten() {
        bytes.extend_from_slice(&value.to_le_bytes());
    }

    let path = dir.path().join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn write_json(dir: &TempDir, name: &str, rows: &[Vec<f32>]) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string(rows).unwrap()).unwrap();
    path
}

fn write_directory(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("users.csv");
    std::fs::write(&path, content).unwrap();
    path
}

/// Deterministic pseudo-random rows (xorshift), no zero vectors.
fn synthetic_rows(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut state = seed.max(1);
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        #[allow(clippy::cast_precision_loss)]
        let unit = (state % 10_000) as f32 / 10_000.0;
        unit - 0.5
    };
    (0..n)
        .map(|_| {
            let mut row: Vec<f32> = (0..dim).map(|_| next()).collect();
            row[0] += 1.0;
            row
        })
        .collect()
}

#[test]
fn json_and_npy_files_load_identically() {
    let dir = TempDir::new().unwrap();
    let rows = synthetic_rows(20, 6, 7);

    let from_json = EmbeddingStore::load(&write_json(&dir, "e.json", &rows)).unwrap();
    let from_npy = EmbeddingStore::load(&write_npy(&dir, "e.npy", &rows)).unwrap();

    assert_eq!(from_json.len(), 20);
    assert_eq!(from_json.dimension(), 6);
    for i in 0..20 {
        assert_eq!(from_json.row(i), from_npy.row(i));
    }
}

#[test]
fn missing_embedding_file_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let err = EmbeddingStore::load(&dir.path().join("absent.npy")).unwrap_err();
    assert!(matches!(err, FriendRecError::StoreLoad { .. }));
    assert!(err.suggestion().is_some());
}

#[test]
fn recommendations_join_directory_info() {
    let dir = TempDir::new().unwrap();
    let store = EmbeddingStore::load(&write_json(
        &dir,
        "e.json",
        &[vec![1.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]],
    ))
    .unwrap();
    let engine = RecommendationEngine::new(store);
    let directory =
        UserDirectory::load(&write_directory(&dir, "uid,info\n1,Alice\n2,Bob\n")).unwrap();

    let ids = engine.recommend(1, 5);
    assert_eq!(ids, vec![UserId(2), UserId(3)]);

    let names: Vec<String> = ids.iter().map(|id| directory.display(*id)).collect();
    assert_eq!(names[0], "Bob");
    assert_eq!(names[1], placeholder(UserId(3)));
    assert!(names[1].contains('3'));

    assert!(engine.recommend(999, 5).is_empty());
}

#[test]
fn gbk_directory_round_trips_through_file() {
    let dir = TempDir::new().unwrap();
    let (bytes, _, _) = encoding_rs::GBK.encode("uid,info\n1,张三 计算机系\n2,李四 数学系\n");
    let path = dir.path().join("users.csv");
    std::fs::write(&path, &bytes).unwrap();

    let directory = UserDirectory::load(&path).unwrap();
    assert_eq!(directory.encoding(), TextEncoding::Gbk);
    assert_eq!(directory.get(UserId(1)), Some("张三 计算机系"));
    assert_eq!(directory.get(UserId(2)), Some("李四 数学系"));
}

#[test]
fn broken_directory_degrades_to_empty() {
    let dir = TempDir::new().unwrap();
    let path = write_directory(&dir, "id,name\n1,Alice\n");

    assert!(matches!(
        UserDirectory::load(&path),
        Err(FriendRecError::DirectoryLoad { .. })
    ));

    let directory = UserDirectory::load_or_empty(Some(&path));
    assert!(directory.is_empty());
    assert_eq!(directory.display(UserId(1)), placeholder(UserId(1)));

    assert!(UserDirectory::load_or_empty(Some(&dir.path().join("nope.csv"))).is_empty());
    assert!(UserDirectory::load_or_empty(None).is_empty());
}

#[test]
fn recommend_properties_hold_on_synthetic_store() {
    let rows = synthetic_rows(200, 16, 42);
    let engine = RecommendationEngine::new(EmbeddingStore::from_rows(rows).unwrap());

    for id in 1..=200_i64 {
        for k in [1_usize, 5, 20] {
            let recs = engine.recommend_scored(id, k);
            assert!(recs.len() <= k);
            assert_eq!(recs.len(), k.min(199));
            assert!(recs.iter().all(|r| r.user != UserId(id)));
            assert!(recs.windows(2).all(|w| w[0].score >= w[1].score));
            assert!(recs.iter().all(|r| (-1.0..=1.0).contains(&r.score)));
        }
    }

    assert_eq!(engine.recommend(17, 10), engine.recommend(17, 10));
}

#[test]
fn parallel_scan_matches_pairwise_similarity() {
    // Above the parallel threshold the scan runs on rayon.
    let rows = synthetic_rows(5_000, 8, 99);
    let store = EmbeddingStore::from_rows(rows).unwrap();
    let scores = store.similarity_to_all(123).unwrap();

    assert_eq!(scores.len(), 5_000);
    for j in [0, 1, 123, 2_500, 4_999] {
        let pairwise = store.similarity(123, j).unwrap();
        assert!((scores[j] - pairwise).abs() < 1e-6, "row {j}");
    }

    let engine = RecommendationEngine::new(store);
    let recs = engine.recommend_scored(124, 5);
    assert_eq!(recs.len(), 5);
    assert!(recs.iter().all(|r| r.user != UserId(124)));
}
