use std::sync::{Arc, atomic::Ordering};

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use zmage_domain::asset::{AssetStatus, ProcessTrigger};
use zmage_service::{BoxFuture, EditRequest, Error, MetadataStore, VersionHistory};
use zmage_storage::models::{Asset, DerivedFields};
use zmage_testkit::Harness;

use super::{OWNER, analysis, ready_image, upload};

struct KeepEveryVersion;
impl VersionHistory for KeepEveryVersion {
	fn retain_previous<'a>(&'a self, _asset: &'a Asset) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async { Ok(true) })
	}
}

fn edit(asset_id: i64, bytes: &[u8]) -> EditRequest {
	EditRequest {
		owner_id: OWNER,
		asset_id,
		bytes: bytes.to_vec(),
		mime_type: None,
		thumbnail: None,
	}
}

#[tokio::test]
async fn processing_publishes_derived_fields_and_vector() {
	let harness = Harness::new();
	let asset =
		ready_image(&harness, "harbor.jpg", analysis("Harbor at dusk", &["sea"]), None).await;

	assert_eq!(asset.status, AssetStatus::Ready);
	assert_eq!(asset.title.as_deref(), Some("Harbor at dusk"));
	assert_eq!(asset.tags, vec!["sea".to_string()]);
	assert!(asset.processed_at.is_some());
	assert!(asset.processing_run_id.is_none());

	let vector_id = asset.vector_id.expect("Ready asset must reference a vector.");
	let payload = harness.vectors.payload(vector_id).expect("Vector record missing.");

	assert_eq!(payload.asset_id, asset.id);
	assert_eq!(payload.title.as_deref(), Some("Harbor at dusk"));
}

#[tokio::test]
async fn non_images_skip_analysis() {
	let harness = Harness::new();

	harness.analysis.fail.store(true, Ordering::SeqCst);

	let asset = harness
		.service
		.ingest(upload(OWNER, "notes.txt", b"meeting notes"))
		.await
		.expect("Ingest failed.");
	let ready = harness.service.process(OWNER, asset.id).await.expect("Processing failed.");

	assert_eq!(ready.status, AssetStatus::Ready);
	assert!(ready.title.is_none());
}

#[tokio::test]
async fn embedding_failure_then_retry_reuses_the_row() {
	let harness = Harness::new();
	let asset =
		harness.service.ingest(upload(OWNER, "a.jpg", b"bytes")).await.expect("Ingest failed.");

	harness.embedding.fail.store(true, Ordering::SeqCst);

	let err = harness.service.process(OWNER, asset.id).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Processing { asset_id, .. } if asset_id == asset.id));

	let failed = harness.metadata.asset(asset.id).expect("Asset missing.");

	assert_eq!(failed.status, AssetStatus::Failed);
	assert!(failed.error_message.as_deref().is_some_and(|msg| msg.contains("Embedding")));
	assert!(failed.vector_id.is_none());
	assert!(harness.vectors.is_empty());

	harness.embedding.fail.store(false, Ordering::SeqCst);

	let ready = harness.service.retry(OWNER, asset.id).await.expect("Retry failed.");

	assert_eq!(ready.id, asset.id);
	assert_eq!(ready.status, AssetStatus::Ready);
	assert!(ready.error_message.is_none());
	assert_eq!(harness.metadata.asset_count(), 1);
	assert_eq!(harness.vectors.len(), 1);
}

#[tokio::test]
async fn analysis_failure_marks_asset_failed() {
	let harness = Harness::new();
	let asset =
		harness.service.ingest(upload(OWNER, "a.png", b"png")).await.expect("Ingest failed.");

	harness.analysis.fail.store(true, Ordering::SeqCst);

	assert!(harness.service.process(OWNER, asset.id).await.is_err());
	assert_eq!(
		harness.metadata.asset(asset.id).map(|asset| asset.status),
		Some(AssetStatus::Failed)
	);
	assert_eq!(harness.embedding.calls(), 0);
}

#[tokio::test]
async fn only_failed_assets_can_be_retried() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let err = harness.service.retry(OWNER, asset.id).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::InvalidRequest { .. }));
	assert!(matches!(harness.service.retry(OWNER, 999).await, Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn a_ready_asset_is_not_processed_again_by_ingest() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;

	assert!(matches!(
		harness.service.process(OWNER, asset.id).await,
		Err(Error::InvalidRequest { .. })
	));
	assert_eq!(harness.vectors.len(), 1);
}

#[tokio::test]
async fn claims_are_fenced_until_the_lease_expires() {
	let harness = Harness::new();
	let asset =
		harness.service.ingest(upload(OWNER, "a.jpg", b"bytes")).await.expect("Ingest failed.");
	let stale_run = Uuid::new_v4();
	let now = OffsetDateTime::now_utc();

	harness
		.metadata
		.claim_processing(
			OWNER,
			asset.id,
			ProcessTrigger::Ingest.claimable_from(),
			stale_run,
			now,
			now - Duration::minutes(10),
		)
		.await
		.expect("Claim failed.")
		.expect("Expected the claim to succeed.");

	assert!(matches!(
		harness.service.process(OWNER, asset.id).await,
		Err(Error::Conflict { .. })
	));

	harness.metadata.set_processing_started_at(asset.id, now - Duration::hours(1));

	let ready = harness.service.process(OWNER, asset.id).await.expect("Lease takeover failed.");

	assert_eq!(ready.status, AssetStatus::Ready);

	let late_commit = harness
		.metadata
		.complete_processing(asset.id, stale_run, &DerivedFields::default(), Uuid::new_v4(), now)
		.await
		.expect("Commit query failed.");

	assert!(late_commit.is_none());
	assert!(
		!harness
			.metadata
			.fail_processing(asset.id, stale_run, "late", now)
			.await
			.expect("Fail query failed.")
	);
	assert_eq!(
		harness.metadata.asset(asset.id).map(|asset| asset.vector_id),
		Some(ready.vector_id)
	);
}

#[tokio::test]
async fn edit_replaces_content_and_reindexes() {
	let harness = Harness::new();
	let original = ready_image(&harness, "a.jpg", analysis("Before", &[]), None).await;

	harness.analysis.set(analysis("After", &["edited"]));

	let edited = harness
		.service
		.edit_in_place(edit(original.id, b"new-bytes"))
		.await
		.expect("Edit failed.");

	assert_eq!(edited.id, original.id);
	assert_eq!(edited.status, AssetStatus::Ready);
	assert_ne!(edited.content_hash, original.content_hash);
	assert_ne!(edited.file_path, original.file_path);
	assert_eq!(edited.title.as_deref(), Some("After"));
	assert!(harness.blobs.contains(&edited.file_path));
	assert!(!harness.blobs.contains(&original.file_path));

	let new_vector = edited.vector_id.expect("Edited asset must reference a vector.");

	assert_ne!(Some(new_vector), original.vector_id);
	assert!(harness.vectors.contains(new_vector));
	assert_eq!(harness.vectors.len(), 1);
}

#[tokio::test]
async fn edit_with_identical_content_changes_nothing() {
	let harness = Harness::new();
	let original = ready_image(&harness, "a.jpg", analysis("Same", &[]), None).await;
	let calls = harness.embedding.calls();
	let unchanged = harness
		.service
		.edit_in_place(edit(original.id, b"a.jpg"))
		.await
		.expect("Edit failed.");

	assert_eq!(unchanged, original);
	assert_eq!(harness.embedding.calls(), calls);
}

#[tokio::test]
async fn edit_cannot_collide_with_another_asset() {
	let harness = Harness::new();
	let first = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let second = ready_image(&harness, "b.jpg", analysis("B", &[]), None).await;
	let err = harness
		.service
		.edit_in_place(edit(second.id, b"a.jpg"))
		.await
		.expect_err("Expected duplicate content.");

	assert!(matches!(err, Error::DuplicateContent { .. }));
	assert_eq!(
		harness.metadata.asset(second.id).map(|asset| asset.content_hash),
		Some(second.content_hash)
	);
	assert!(harness.blobs.contains(&first.file_path));
	assert_eq!(harness.blobs.len(), 2);
}

#[tokio::test]
async fn retained_versions_keep_the_previous_blob() {
	let harness = Harness::new();
	let original = ready_image(&harness, "a.jpg", analysis("Before", &[]), None).await;
	let service = harness.service.with_version_history(Arc::new(KeepEveryVersion));
	let edited = service.edit_in_place(edit(original.id, b"v2")).await.expect("Edit failed.");

	assert!(harness.blobs.contains(&original.file_path));
	assert!(harness.blobs.contains(&edited.file_path));
}

#[tokio::test]
async fn retry_needs_the_source_blob() {
	let harness = Harness::new();
	let asset =
		harness.service.ingest(upload(OWNER, "a.jpg", b"bytes")).await.expect("Ingest failed.");

	harness.embedding.fail.store(true, Ordering::SeqCst);

	assert!(harness.service.process(OWNER, asset.id).await.is_err());

	harness.embedding.fail.store(false, Ordering::SeqCst);

	assert!(harness.blobs.remove(&asset.file_path));

	let err = harness.service.retry(OWNER, asset.id).await.expect_err("Expected rejection.");

	assert!(matches!(err, Error::NotFound { .. }), "Unexpected error: {err}");
	assert_eq!(
		harness.metadata.asset(asset.id).map(|asset| asset.status),
		Some(AssetStatus::Failed)
	);
	assert_eq!(harness.embedding.calls(), 1);
}
