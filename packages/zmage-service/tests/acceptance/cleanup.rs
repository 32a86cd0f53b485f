use std::sync::atomic::Ordering;

use time::OffsetDateTime;
use uuid::Uuid;

use zmage_domain::{
	asset::AssetType,
	task::{TaskKind, TaskStatus},
	vector::VectorPayload,
};
use zmage_providers::GroupingSuggestion;
use zmage_service::ReviewDecision;
use zmage_testkit::{Harness, ScriptedSuggestions, TEST_VECTOR_DIM, test_config};

use super::{OWNER, analysis, days_later, ready_image};

#[tokio::test]
async fn failed_vector_delete_is_swept_later() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let vector_id = asset.vector_id.expect("Ready asset must reference a vector.");

	harness.vectors.fail_deletes.store(true, Ordering::SeqCst);
	harness.service.purge(OWNER, asset.id).await.expect("Purge must tolerate the index.");

	assert!(harness.metadata.asset(asset.id).is_none());
	assert!(harness.vectors.contains(vector_id));

	harness.vectors.fail_deletes.store(false, Ordering::SeqCst);

	let report =
		harness.service.cleanup(OffsetDateTime::now_utc()).await.expect("Cleanup failed.");

	assert_eq!(report.orphan_vectors_removed, 1);
	assert!(harness.vectors.is_empty());
}

#[tokio::test]
async fn only_published_vectors_survive_the_sweep() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let stray = Uuid::new_v4();
	let payload = VectorPayload {
		asset_id: asset.id,
		title: None,
		tags: Vec::new(),
		asset_type: AssetType::Image,
		folder_id: None,
	};
	let embedding = vec![1.0; TEST_VECTOR_DIM as usize];

	harness.vectors.insert_raw(stray, embedding.clone(), payload.clone());
	harness.vectors.insert_raw(
		Uuid::new_v4(),
		embedding,
		VectorPayload { asset_id: 4_040, ..payload },
	);

	let report =
		harness.service.cleanup(OffsetDateTime::now_utc()).await.expect("Cleanup failed.");

	assert_eq!(report.orphan_vectors_removed, 2);
	assert_eq!(harness.vectors.len(), 1);
	assert!(harness.vectors.contains(asset.vector_id.expect("Vector missing.")));
	assert!(!harness.vectors.contains(stray));
}

#[tokio::test]
async fn expired_trash_is_purged_and_recent_trash_kept() {
	let harness = Harness::new();
	let old = ready_image(&harness, "old.jpg", analysis("Old", &[]), None).await;
	let kept = ready_image(&harness, "kept.jpg", analysis("Kept", &[]), None).await;

	harness.service.soft_delete(OWNER, old.id).await.expect("Delete failed.");

	let report = harness.service.cleanup(days_later(31)).await.expect("Cleanup failed.");

	assert_eq!(report.assets_purged, 1);
	assert_eq!(report.purge_failures, 0);
	assert!(harness.metadata.asset(old.id).is_none());
	assert!(!harness.blobs.contains(&old.file_path));
	assert!(harness.metadata.asset(kept.id).is_some());

	harness.service.soft_delete(OWNER, kept.id).await.expect("Delete failed.");

	let early = harness.service.cleanup(days_later(10)).await.expect("Cleanup failed.");

	assert_eq!(early.assets_purged, 0);
	assert!(harness.metadata.asset(kept.id).is_some());
}

#[tokio::test]
async fn blob_failures_leave_trash_for_the_next_run() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;

	harness.service.soft_delete(OWNER, asset.id).await.expect("Delete failed.");
	harness.blobs.fail_deletes.store(true, Ordering::SeqCst);

	let report = harness.service.cleanup(days_later(31)).await.expect("Cleanup failed.");

	assert_eq!(report.assets_purged, 0);
	assert_eq!(report.purge_failures, 1);
	assert!(harness.metadata.asset(asset.id).is_some());

	harness.blobs.fail_deletes.store(false, Ordering::SeqCst);

	let retry = harness.service.cleanup(days_later(31)).await.expect("Cleanup failed.");

	assert_eq!(retry.assets_purged, 1);
}

#[tokio::test]
async fn stuck_purges_do_not_block_later_trash() {
	let mut cfg = test_config();

	cfg.reconciliation.sweep_batch_size = 2;

	let harness = Harness::with(cfg, ScriptedSuggestions::none());
	let mut trashed = Vec::new();

	for index in 0..5 {
		let asset =
			ready_image(&harness, &format!("{index}.jpg"), analysis("Photo", &[]), None).await;

		harness.service.soft_delete(OWNER, asset.id).await.expect("Delete failed.");
		trashed.push(asset);
	}

	for stuck in &trashed[..2] {
		harness.blobs.fail_deletes_of(&stuck.file_path);
	}

	let report = harness.service.cleanup(days_later(31)).await.expect("Cleanup failed.");

	assert_eq!(report.assets_purged, 3);
	assert_eq!(report.purge_failures, 2);

	for (index, asset) in trashed.iter().enumerate() {
		assert_eq!(harness.metadata.asset(asset.id).is_some(), index < 2, "asset {index}");
	}
}

#[tokio::test]
async fn stale_memberships_and_ignored_suggestions_are_removed() {
	let harness = Harness::with_suggestions(ScriptedSuggestions::new(|assets, _| {
		Ok(vec![GroupingSuggestion {
			name: "Everything".to_string(),
			description: None,
			reason: None,
			asset_ids: assets.iter().map(|asset| asset.id).collect(),
			confidence: Some(0.5),
		}])
	}));

	for index in 0..5 {
		ready_image(&harness, &format!("{index}.jpg"), analysis("Photo", &[]), None).await;
	}

	harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	let suggested = harness.metadata.albums(OWNER).remove(0);

	harness
		.service
		.review_suggestion(OWNER, suggested.id, ReviewDecision::Ignore)
		.await
		.expect("Review failed.");
	harness.metadata.add_album_member(suggested.id, 8_080);
	harness.metadata.add_collection_member(1, 8_080);

	let report =
		harness.service.cleanup(OffsetDateTime::now_utc()).await.expect("Cleanup failed.");

	assert_eq!(report.associations_removed, 2);
	assert_eq!(report.ignored_suggestions_purged, 0);
	assert_eq!(harness.metadata.collection_member_count(), 0);

	let later = harness.service.cleanup(days_later(31)).await.expect("Cleanup failed.");

	assert_eq!(later.ignored_suggestions_purged, 1);
	assert!(harness.metadata.albums(OWNER).is_empty());

	let tasks = harness.metadata.tasks();
	let cleanups: Vec<_> = tasks.iter().filter(|task| task.kind == TaskKind::Cleanup).collect();

	assert_eq!(cleanups.len(), 2);
	assert!(cleanups.iter().all(|task| task.status == TaskStatus::Completed));
	assert!(cleanups.iter().all(|task| task.progress == 100));
}
