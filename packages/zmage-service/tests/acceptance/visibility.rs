use std::sync::atomic::Ordering;

use zmage_domain::asset::{AssetStatus, VisibilityScope};
use zmage_service::{Error, SearchRequest};
use zmage_testkit::Harness;

use super::{OWNER, analysis, listed_ids, listing, ready_image, upload};

#[tokio::test]
async fn soft_delete_and_restore_move_between_views() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;

	assert_eq!(listed_ids(&harness, VisibilityScope::Active).await, vec![asset.id]);

	let trashed = harness.service.soft_delete(OWNER, asset.id).await.expect("Delete failed.");
	let deleted_at = trashed.deleted_at.expect("Trashed asset needs a deletion time.");

	assert!(listed_ids(&harness, VisibilityScope::Active).await.is_empty());
	assert_eq!(listed_ids(&harness, VisibilityScope::Trashed).await, vec![asset.id]);

	let again = harness.service.soft_delete(OWNER, asset.id).await.expect("Delete failed.");

	assert_eq!(again.deleted_at, Some(deleted_at));

	let restored = harness.service.restore(OWNER, asset.id).await.expect("Restore failed.");

	assert!(restored.deleted_at.is_none());
	assert_eq!(listed_ids(&harness, VisibilityScope::Active).await, vec![asset.id]);
	assert!(listed_ids(&harness, VisibilityScope::Trashed).await.is_empty());
	assert!(harness.blobs.contains(&asset.file_path));
}

#[tokio::test]
async fn private_assets_stay_out_of_active_and_trash() {
	let harness = Harness::new();
	let mut req = upload(OWNER, "secret.jpg", b"secret");

	req.is_private = true;

	let private = harness.service.ingest(req).await.expect("Ingest failed.");

	harness.service.process(OWNER, private.id).await.expect("Processing failed.");

	assert!(listed_ids(&harness, VisibilityScope::Active).await.is_empty());
	assert_eq!(listed_ids(&harness, VisibilityScope::Private).await, vec![private.id]);

	harness.service.soft_delete(OWNER, private.id).await.expect("Delete failed.");

	for scope in [VisibilityScope::Active, VisibilityScope::Private, VisibilityScope::Trashed] {
		assert!(listed_ids(&harness, scope).await.is_empty(), "{scope:?} should be empty.");
	}
}

#[tokio::test]
async fn vault_moves_require_a_live_asset() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let vaulted = harness.service.move_to_vault(OWNER, asset.id).await.expect("Vault failed.");

	assert!(vaulted.is_private);
	assert_eq!(listed_ids(&harness, VisibilityScope::Private).await, vec![asset.id]);

	let back = harness.service.move_from_vault(OWNER, asset.id).await.expect("Unvault failed.");

	assert!(!back.is_private);

	harness.service.soft_delete(OWNER, asset.id).await.expect("Delete failed.");

	assert!(matches!(
		harness.service.move_to_vault(OWNER, asset.id).await,
		Err(Error::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn assets_are_scoped_to_their_owner() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;

	assert!(matches!(
		harness.service.get_asset(OWNER + 1, asset.id).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		harness.service.soft_delete(OWNER + 1, asset.id).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		harness.service.purge(OWNER + 1, asset.id).await,
		Err(Error::NotFound { .. })
	));
}

#[tokio::test]
async fn purge_removes_every_store_entry() {
	let harness = Harness::new();
	let mut req = upload(OWNER, "a.jpg", b"bytes");

	req.thumbnail = Some(b"thumb".to_vec());

	let asset = harness.service.ingest(req).await.expect("Ingest failed.");
	let asset = harness.service.process(OWNER, asset.id).await.expect("Processing failed.");

	harness.service.purge(OWNER, asset.id).await.expect("Purge failed.");

	assert!(harness.metadata.asset(asset.id).is_none());
	assert!(harness.blobs.is_empty());
	assert!(harness.vectors.is_empty());
}

#[tokio::test]
async fn purge_aborts_when_the_blob_cannot_be_deleted() {
	let harness = Harness::new();
	let asset = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;

	harness.blobs.fail_deletes.store(true, Ordering::SeqCst);

	assert!(matches!(
		harness.service.purge(OWNER, asset.id).await,
		Err(Error::Unavailable { .. })
	));
	assert!(harness.metadata.asset(asset.id).is_some());
	assert_eq!(harness.vectors.len(), 1);
}

#[tokio::test]
async fn failed_assets_stay_listed_and_findable_by_keyword() {
	let harness = Harness::new();
	let receipt = harness
		.service
		.ingest(upload(OWNER, "receipt-march.jpg", b"receipt"))
		.await
		.expect("Ingest failed.");
	let scan = harness
		.service
		.ingest(upload(OWNER, "scan-march.png", b"scan"))
		.await
		.expect("Ingest failed.");

	harness.embedding.fail.store(true, Ordering::SeqCst);

	assert!(harness.service.process(OWNER, receipt.id).await.is_err());

	harness.embedding.fail.store(false, Ordering::SeqCst);
	harness.analysis.fail.store(true, Ordering::SeqCst);

	assert!(harness.service.process(OWNER, scan.id).await.is_err());

	for id in [receipt.id, scan.id] {
		assert_eq!(
			harness.metadata.asset(id).map(|asset| asset.status),
			Some(AssetStatus::Failed)
		);
	}

	let mut active = listed_ids(&harness, VisibilityScope::Active).await;

	active.sort_unstable();

	assert_eq!(active, vec![receipt.id, scan.id]);

	let found = harness
		.service
		.search(SearchRequest {
			query: Some("march".to_string()),
			..listing(VisibilityScope::Active)
		})
		.await
		.expect("Keyword search failed.");
	let mut found_ids: Vec<i64> = found.items.iter().map(|item| item.asset.id).collect();

	found_ids.sort_unstable();

	assert_eq!(found_ids, vec![receipt.id, scan.id]);
	assert_eq!(found.total, 2);
}
