use std::sync::atomic::Ordering;

use zmage_domain::asset::{AssetStatus, AssetType};
use zmage_service::Error;
use zmage_testkit::Harness;

use super::{OWNER, upload};

#[tokio::test]
async fn ingest_creates_pending_asset_and_blob() {
	let harness = Harness::new();
	let mut req = upload(OWNER, "holiday/Beach Day.JPG", b"jpeg-bytes");

	req.thumbnail = Some(b"thumb".to_vec());

	let asset = harness.service.ingest(req).await.expect("Ingest failed.");

	assert_eq!(asset.status, AssetStatus::Pending);
	assert_eq!(asset.asset_type, AssetType::Image);
	assert_eq!(asset.mime_type, "image/jpeg");
	assert_eq!(asset.original_filename, "holiday/Beach Day.JPG");
	assert_eq!(asset.filename, "Beach_Day.JPG");
	assert_eq!(asset.file_size, 10);
	assert!(asset.file_path.starts_with(&format!("assets/{OWNER}/")));
	assert!(harness.blobs.contains(&asset.file_path));
	assert_eq!(harness.blobs.content_type(&asset.file_path).as_deref(), Some("image/jpeg"));

	let thumbnail = asset.thumbnail_path.expect("Expected a thumbnail path.");

	assert!(harness.blobs.contains(&thumbnail));
	assert_eq!(harness.blobs.content_type(&thumbnail).as_deref(), Some("image/jpeg"));
}

#[tokio::test]
async fn duplicate_content_is_rejected_per_owner() {
	let harness = Harness::new();
	let first = harness
		.service
		.ingest(upload(OWNER, "a.jpg", b"same-bytes"))
		.await
		.expect("First ingest failed.");
	let err = harness
		.service
		.ingest(upload(OWNER, "b.jpg", b"same-bytes"))
		.await
		.expect_err("Expected duplicate content.");

	match err {
		Error::DuplicateContent { content_hash } => assert_eq!(content_hash, first.content_hash),
		other => panic!("Unexpected error: {other:?}"),
	}

	assert_eq!(harness.metadata.asset_count(), 1);
	assert_eq!(harness.blobs.len(), 1);

	let other_owner = harness
		.service
		.ingest(upload(OWNER + 1, "a.jpg", b"same-bytes"))
		.await
		.expect("Another owner may hold the same content.");

	assert_eq!(other_owner.content_hash, first.content_hash);
}

#[tokio::test]
async fn empty_uploads_are_invalid() {
	let harness = Harness::new();

	assert!(matches!(
		harness.service.ingest(upload(OWNER, "  ", b"bytes")).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(
		harness.service.ingest(upload(OWNER, "empty.jpg", b"")).await,
		Err(Error::InvalidRequest { .. })
	));
	assert_eq!(harness.metadata.asset_count(), 0);
}

#[tokio::test]
async fn blob_failure_creates_no_row() {
	let harness = Harness::new();

	harness.blobs.fail_puts.store(true, Ordering::SeqCst);

	let err = harness
		.service
		.ingest(upload(OWNER, "a.jpg", b"bytes"))
		.await
		.expect_err("Expected blob store failure.");

	assert!(matches!(err, Error::Unavailable { .. }));
	assert_eq!(harness.metadata.asset_count(), 0);
}

#[tokio::test]
async fn explicit_mime_type_wins_over_extension() {
	let harness = Harness::new();
	let mut req = upload(OWNER, "clip.bin", b"video-bytes");

	req.mime_type = Some("video/mp4".to_string());

	let asset = harness.service.ingest(req).await.expect("Ingest failed.");

	assert_eq!(asset.asset_type, AssetType::Video);
	assert_eq!(asset.mime_type, "video/mp4");
	assert_eq!(harness.blobs.content_type(&asset.file_path).as_deref(), Some("video/mp4"));
}
