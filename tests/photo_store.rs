use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream;
use passreg::models::PhotoMeta;
use passreg::reconcile::{storage_name, PhotoError, PhotoReconciler, PhotoUpload};
use passreg::storage::{ByteStream, FsPhotoStore, PhotoStore, PhotoStoreError};
use tempfile::TempDir;
use uuid::Uuid;

fn store() -> (Arc<FsPhotoStore>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store = FsPhotoStore::new(dir.path()).unwrap();
    (Arc::new(store), dir)
}

fn chunked(parts: &[&[u8]]) -> ByteStream {
    let items: Vec<std::io::Result<Bytes>> = parts
        .iter()
        .map(|p| Ok(Bytes::copy_from_slice(p)))
        .collect();
    Box::pin(stream::iter(items))
}

/// A stream that yields one good chunk and then fails.
fn failing_stream() -> ByteStream {
    let items: Vec<std::io::Result<Bytes>> = vec![
        Ok(Bytes::from_static(b"partial")),
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "client went away")),
    ];
    Box::pin(stream::iter(items))
}

// Minimal 1x1 PNG (transparent)
fn sample_png() -> Vec<u8> {
    vec![
        0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, // signature
        0x00, 0x00, 0x00, 0x0D, b'I', b'H', b'D', b'R', 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, b'I',
        b'D', b'A', b'T', 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A,
        0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82,
    ]
}

#[tokio::test]
async fn save_stream_multi_chunk_round_trip() {
    let (store, dir) = store();

    let written = store
        .save_stream("photo1.jpg", chunked(&[b"abc", b"def", b"ghi"]))
        .await
        .unwrap();
    assert_eq!(written, 9);

    let on_disk = std::fs::read(dir.path().join("photo1.jpg")).unwrap();
    assert_eq!(on_disk, b"abcdefghi");

    let (loaded, _mime) = store.load("photo1.jpg").await.unwrap();
    assert_eq!(loaded, b"abcdefghi");
}

#[tokio::test]
async fn load_sniffs_png_mime() {
    let (store, _dir) = store();
    let png = sample_png();
    store
        .save_stream("img.png", chunked(&[&png]))
        .await
        .unwrap();
    let (bytes, mime) = store.load("img.png").await.unwrap();
    assert_eq!(bytes, png);
    assert_eq!(mime, "image/png");
}

#[tokio::test]
async fn no_tmp_residue_after_success_or_failure() {
    let (store, dir) = store();

    store.save_stream("ok.bin", chunked(&[b"data"])).await.unwrap();
    let err = store.save_stream("bad.bin", failing_stream()).await.unwrap_err();
    assert!(matches!(err, PhotoStoreError::Io(_)));

    // failed write leaves neither a final file nor staging residue
    assert!(!dir.path().join("bad.bin").exists());
    let tmp_entries: Vec<_> = std::fs::read_dir(dir.path().join(".tmp")).unwrap().collect();
    assert!(tmp_entries.is_empty());
}

#[tokio::test]
async fn delete_tolerates_missing_files() {
    let (store, dir) = store();

    store.save_stream("gone.jpg", chunked(&[b"x"])).await.unwrap();
    store.delete("gone.jpg").await.unwrap();
    assert!(!dir.path().join("gone.jpg").exists());

    // second delete is a no-op, not an error
    store.delete("gone.jpg").await.unwrap();
}

#[tokio::test]
async fn delete_stem_matches_any_extension() {
    let (store, dir) = store();

    store.save_stream("aabb.jpg", chunked(&[b"1"])).await.unwrap();
    store.save_stream("aabb.png", chunked(&[b"2"])).await.unwrap();
    store.save_stream("ccdd.jpg", chunked(&[b"3"])).await.unwrap();

    let removed = store.delete_stem("aabb").await.unwrap();
    assert_eq!(removed, 2);
    assert!(!dir.path().join("aabb.jpg").exists());
    assert!(!dir.path().join("aabb.png").exists());
    assert!(dir.path().join("ccdd.jpg").exists());

    assert_eq!(store.delete_stem("eeff").await.unwrap(), 0);
}

#[tokio::test]
async fn rejects_path_traversal_names() {
    let (store, _dir) = store();

    for name in ["../escape.jpg", "a/b.jpg", "", "..\\x.jpg"] {
        let err = store.save_stream(name, chunked(&[b"x"])).await.unwrap_err();
        assert!(matches!(err, PhotoStoreError::BadName(_)), "name: {name:?}");
    }
}

#[test]
fn storage_name_keeps_only_the_extension() {
    let id = Uuid::new_v4();
    assert_eq!(
        storage_name(id, Some("Overlook Photo.JPG")),
        format!("{}.JPG", id.simple())
    );
    assert_eq!(storage_name(id, Some("noext")), id.simple().to_string());
    assert_eq!(storage_name(id, None), id.simple().to_string());
}

#[tokio::test]
async fn reconcile_pairs_positionally() {
    let (store, dir) = store();
    let reconciler = PhotoReconciler::new(store.clone());

    let metas = vec![
        PhotoMeta { id: Uuid::new_v4(), title: "First".into() },
        PhotoMeta { id: Uuid::new_v4(), title: "Second".into() },
    ];
    let uploads = vec![
        PhotoUpload::from_bytes(Some("a.jpg".into()), b"first-bytes".to_vec()),
        PhotoUpload::from_bytes(Some("b.png".into()), b"second-bytes".to_vec()),
    ];

    let stored = reconciler.reconcile(&metas, uploads).await.unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].file_name, format!("{}.jpg", metas[0].id.simple()));
    assert_eq!(stored[1].file_name, format!("{}.png", metas[1].id.simple()));

    let first = std::fs::read(dir.path().join(&stored[0].file_name)).unwrap();
    assert_eq!(first, b"first-bytes");
    let second = std::fs::read(dir.path().join(&stored[1].file_name)).unwrap();
    assert_eq!(second, b"second-bytes");
}

#[tokio::test]
async fn reconcile_count_mismatch_writes_nothing() {
    let (store, dir) = store();
    let reconciler = PhotoReconciler::new(store.clone());

    let metas = vec![PhotoMeta { id: Uuid::new_v4(), title: "Lone".into() }];
    let err = reconciler.reconcile(&metas, Vec::new()).await.unwrap_err();
    assert!(matches!(
        err,
        PhotoError::CountMismatch { declared: 1, supplied: 0 }
    ));

    // upload dir holds only the staging dir, no photo files
    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    assert!(files.is_empty());
}

#[tokio::test]
async fn reconcile_write_failure_keeps_written_prefix() {
    let (store, dir) = store();
    let reconciler = PhotoReconciler::new(store.clone());

    let metas = vec![
        PhotoMeta { id: Uuid::new_v4(), title: "Good".into() },
        PhotoMeta { id: Uuid::new_v4(), title: "Bad".into() },
    ];
    let uploads = vec![
        PhotoUpload::from_bytes(Some("good.jpg".into()), b"ok".to_vec()),
        PhotoUpload::new(Some("bad.jpg".into()), failing_stream()),
    ];

    let err = reconciler.reconcile(&metas, uploads).await.unwrap_err();
    assert!(matches!(err, PhotoError::WriteFailed(_)));
    assert!(err.to_string().starts_with("Photo saving error"));

    // the first binary survives; the failed one leaves nothing behind
    assert!(dir.path().join(format!("{}.jpg", metas[0].id.simple())).exists());
    assert!(!dir.path().join(format!("{}.jpg", metas[1].id.simple())).exists());
}
