//! Concurrency tests for Imagebox.
//!
//! These tests verify that concurrent uploads and deletes never push the
//! catalog above its limit and never leave storage and catalog out of step.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat, RgbImage};
use imagebox::{Database, FileStorage, ImageService, ImageStorage, ImageboxError, UploadFile};
use tempfile::TempDir;

/// Setup a service over a file-backed catalog and a temp upload dir.
async fn setup_service() -> (TempDir, FileStorage, ImageService) {
    let temp_dir = TempDir::new().unwrap();
    let storage = FileStorage::new(temp_dir.path().join("uploads")).unwrap();
    let db = Database::open(temp_dir.path().join("catalog.db"))
        .await
        .unwrap();
    let service = ImageService::new(db, Arc::new(storage.clone()));
    (temp_dir, storage, service)
}

fn png(name: &str) -> UploadFile {
    let image = DynamicImage::ImageRgb8(RgbImage::new(2, 2));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    UploadFile::new(name, out.into_inner()).with_content_type("image/png")
}

/// Assert every record has its file and every file its record.
async fn assert_paired(storage: &FileStorage, service: &ImageService) {
    let mut recorded: Vec<String> = service
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.file_name)
        .collect();
    recorded.sort();

    assert_eq!(storage.list_names().unwrap(), recorded);
}

/// Test concurrent batch submissions against the image limit.
///
/// Six batches of three race for ten slots; exactly three can fit.
#[tokio::test]
async fn test_concurrent_uploads_respect_capacity() {
    let (_temp_dir, storage, service) = setup_service().await;

    const NUM_BATCHES: usize = 6;
    const BATCH_SIZE: usize = 3;

    let mut handles = Vec::new();
    for batch in 0..NUM_BATCHES {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let files = (0..BATCH_SIZE)
                .map(|i| png(&format!("batch{batch}-{i}.png")))
                .collect();
            service.submit(files).await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(records) => {
                assert_eq!(records.len(), BATCH_SIZE);
                accepted += 1;
            }
            Err(ImageboxError::CapacityExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 3);
    assert_eq!(service.list().await.unwrap().len(), 9);
    assert_paired(&storage, &service).await;
}

/// Test concurrent submissions of the same name.
///
/// Only one can win; the others see the name as taken.
#[tokio::test]
async fn test_concurrent_uploads_same_name() {
    let (_temp_dir, storage, service) = setup_service().await;

    let mut handles = Vec::new();
    for i in 0..5 {
        let service = service.clone();
        let name = if i % 2 == 0 { "cat.png" } else { "CAT.PNG" };
        handles.push(tokio::spawn(
            async move { service.submit(vec![png(name)]).await },
        ));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(ImageboxError::NameCollision(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(accepted, 1);
    assert_paired(&storage, &service).await;
}

/// Test uploads and deletes interleaving.
#[tokio::test]
async fn test_concurrent_uploads_and_deletes() {
    let (_temp_dir, storage, service) = setup_service().await;

    let seeded = service
        .submit((0..10).map(|i| png(&format!("seed{i}.png"))).collect())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for (i, record) in seeded.iter().take(5).enumerate() {
        let deleter = service.clone();
        let id = record.id;
        handles.push(tokio::spawn(async move {
            deleter.delete(id).await.map(|_| ())
        }));

        let uploader = service.clone();
        handles.push(tokio::spawn(async move {
            uploader.submit(vec![png(&format!("new{i}.png"))]).await.map(|_| ())
        }));
    }

    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) | Err(ImageboxError::CapacityExceeded { .. }) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    let count = service.list().await.unwrap().len();
    assert!(count <= 10, "catalog holds {count} images");
    assert!(count >= 5);
    assert_paired(&storage, &service).await;
}

/// Test that dropping a caller does not abandon a batch half way.
#[tokio::test]
async fn test_cancelled_upload_completes_or_rolls_back() {
    let (_temp_dir, storage, service) = setup_service().await;

    let files = (0..5).map(|i| png(&format!("img{i}.png"))).collect();
    let submitting = service.clone();
    let handle = tokio::spawn(async move { submitting.submit(files).await });

    // Abort the caller right away; the upload task itself keeps running
    tokio::task::yield_now().await;
    handle.abort();
    let _ = handle.await;

    // Records only ever appear as a whole batch
    let mut settled = false;
    for _ in 0..100 {
        let count = service.list().await.unwrap().len();
        assert!(count == 0 || count == 5, "partial batch of {count} images");

        if count == storage.list_names().unwrap().len() {
            settled = true;
            if count == 5 {
                break;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    assert!(settled);
    assert_paired(&storage, &service).await;
}
