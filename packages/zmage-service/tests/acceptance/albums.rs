use serde_json::json;
use time::{Duration, macros::datetime};

use zmage_domain::album::AlbumKind;
use zmage_service::{AlbumDraft, CreateAlbumRequest, Error};
use zmage_testkit::Harness;

use super::{OWNER, analysis, ready_image};

fn album(name: &str, draft: AlbumDraft, asset_ids: Vec<i64>) -> CreateAlbumRequest {
	CreateAlbumRequest {
		owner_id: OWNER,
		name: name.to_string(),
		description: None,
		draft,
		asset_ids,
		cover_asset_id: None,
	}
}

#[tokio::test]
async fn smart_rules_select_three_of_ten_in_a_stable_order() {
	let harness = Harness::new();
	let base = datetime!(2024-06-01 18:00 UTC);
	let mut sunsets = Vec::new();

	for index in 0..10_i64 {
		let tags: &[&str] = if index % 3 == 0 && index < 9 { &["sunset"] } else { &["street"] };
		let asset = ready_image(
			&harness,
			&format!("photo-{index}.jpg"),
			analysis(&format!("Photo {index}"), tags),
			Some(base + Duration::days(index)),
		)
		.await;

		if tags == ["sunset"] {
			sunsets.push(asset.id);
		}
	}

	let rules = json!({ "tags": { "include": ["sunset"] } });
	let first = harness.service.evaluate_smart_rules(OWNER, &rules).await.expect("Rules failed.");
	let second = harness.service.evaluate_smart_rules(OWNER, &rules).await.expect("Rules failed.");
	let ids: Vec<i64> = first.iter().map(|asset| asset.id).collect();

	sunsets.reverse();

	assert_eq!(ids, sunsets);
	assert_eq!(ids, second.iter().map(|asset| asset.id).collect::<Vec<_>>());

	let created = harness
		.service
		.create_album(album("Sunsets", AlbumDraft::Smart { rules }, Vec::new()))
		.await
		.expect("Create failed.");

	assert!(matches!(created.kind, AlbumKind::Smart { .. }));

	let stored = harness.service.get_album(OWNER, created.id).await.expect("Get failed.");

	assert_eq!(stored.asset_count, 3);

	harness.service.soft_delete(OWNER, ids[0]).await.expect("Delete failed.");

	let members =
		harness.service.evaluate_smart_album(OWNER, created.id).await.expect("Evaluate failed.");

	assert_eq!(members.iter().map(|asset| asset.id).collect::<Vec<_>>(), ids[1..].to_vec());
}

#[tokio::test]
async fn rule_documents_are_validated() {
	let harness = Harness::new();

	assert!(matches!(
		harness.service.evaluate_smart_rules(OWNER, &json!({ "colour": "red" })).await,
		Err(Error::Validation { .. })
	));
	assert!(
		harness
			.service
			.evaluate_smart_rules(OWNER, &json!({}))
			.await
			.expect("Empty rules must evaluate.")
			.is_empty()
	);
	assert!(matches!(
		harness
			.service
			.create_album(album("Empty", AlbumDraft::Smart { rules: json!({}) }, Vec::new()))
			.await,
		Err(Error::Validation { .. })
	));
}

#[tokio::test]
async fn unusable_rule_values_evaluate_to_nothing() {
	let harness = Harness::new();

	ready_image(&harness, "beach.jpg", analysis("Beach", &["sunset"]), None).await;

	let docs = [
		json!({ "location": { "lat": 10, "lon": 10, "radius_km": 0 } }),
		json!({ "location": { "lat": 95, "lon": 10 } }),
		json!({ "tags": { "include": ["sunset"] }, "date_range": { "start": "not-a-date" } }),
		json!({ "tags": { "include": ["sunset"] }, "asset_type": "photo" }),
	];

	for rules in docs {
		let found = harness
			.service
			.evaluate_smart_rules(OWNER, &rules)
			.await
			.expect("Unusable values must not fail evaluation.");

		assert!(found.is_empty(), "Rules {rules} matched {} assets.", found.len());
	}

	assert!(matches!(
		harness
			.service
			.create_album(album(
				"Nowhere",
				AlbumDraft::Smart { rules: json!({ "asset_type": "photo" }) },
				Vec::new(),
			))
			.await,
		Err(Error::Validation { .. })
	));
	assert!(matches!(
		harness
			.service
			.evaluate_smart_rules(OWNER, &json!({ "location": { "lat": "north", "lon": 1 } }))
			.await,
		Err(Error::Validation { .. })
	));
}

#[tokio::test]
async fn manual_albums_count_live_members() {
	let harness = Harness::new();
	let a = ready_image(&harness, "a.jpg", analysis("A", &[]), None).await;
	let b = ready_image(&harness, "b.jpg", analysis("B", &[]), None).await;
	let mut req = album("  Trip  ", AlbumDraft::Manual, vec![a.id, b.id, a.id]);

	req.cover_asset_id = Some(b.id);

	let created = harness.service.create_album(req).await.expect("Create failed.");

	assert_eq!(created.name, "Trip");
	assert_eq!(created.asset_count, 2);
	assert_eq!(created.cover_asset_id, Some(b.id));
	assert_eq!(harness.metadata.album_members(created.id), vec![a.id, b.id]);

	harness.service.move_to_vault(OWNER, a.id).await.expect("Vault failed.");

	let stored = harness.service.get_album(OWNER, created.id).await.expect("Get failed.");

	assert_eq!(stored.asset_count, 1);
	assert!(
		harness
			.service
			.evaluate_smart_album(OWNER, created.id)
			.await
			.expect("Evaluate failed.")
			.is_empty()
	);
}

#[tokio::test]
async fn album_members_must_belong_to_the_owner() {
	let harness = Harness::new();

	assert!(matches!(
		harness.service.create_album(album("Trip", AlbumDraft::Manual, vec![404])).await,
		Err(Error::NotFound { .. })
	));
	assert!(matches!(
		harness.service.create_album(album(" ", AlbumDraft::Manual, Vec::new())).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(harness.metadata.albums(OWNER).is_empty());
}
