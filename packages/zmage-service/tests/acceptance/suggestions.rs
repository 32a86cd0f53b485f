use color_eyre::eyre;
use time::OffsetDateTime;

use zmage_domain::{
	album::{AlbumKind, ReviewStatus},
	task::{TaskKind, TaskStatus},
};
use zmage_providers::GroupingSuggestion;
use zmage_service::{AlbumDraft, CreateAlbumRequest, Error, ReviewDecision};
use zmage_testkit::{Harness, ScriptedSuggestions};

use super::{OWNER, analysis, ready_image};

/// Groups the first three scanned assets and pads the batch with one unusable suggestion.
fn beach_week() -> ScriptedSuggestions {
	ScriptedSuggestions::new(|assets, _existing| {
		let ids: Vec<i64> = assets.iter().take(3).map(|asset| asset.id).collect();

		Ok(vec![
			GroupingSuggestion {
				name: "Beach Week".to_string(),
				description: Some("Days at the coast.".to_string()),
				reason: Some("Shared tags and dates.".to_string()),
				asset_ids: ids,
				confidence: Some(1.7),
			},
			GroupingSuggestion {
				name: "Too Small".to_string(),
				description: None,
				reason: None,
				asset_ids: vec![assets[0].id, 9_999],
				confidence: None,
			},
		])
	})
}

async fn seed(harness: &Harness, count: usize) -> Vec<i64> {
	let mut ids = Vec::with_capacity(count);

	for index in 0..count {
		let asset = ready_image(
			harness,
			&format!("coast-{index}.jpg"),
			analysis(&format!("Coast {index}"), &["beach"]),
			None,
		)
		.await;

		ids.push(asset.id);
	}

	ids
}

#[tokio::test]
async fn suggestions_become_pending_albums() {
	let harness = Harness::with_suggestions(beach_week());

	seed(&harness, 6).await;

	let report =
		harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	assert_eq!(report.owners_scanned, 1);
	assert_eq!(report.albums_created, 1);
	assert_eq!(report.suggestions_skipped, 1);

	let albums = harness.metadata.albums(OWNER);

	assert_eq!(albums.len(), 1);

	let suggested = &albums[0];

	assert_eq!(suggested.name, "Beach Week");
	assert_eq!(suggested.asset_count, 3);
	assert_eq!(
		suggested.kind,
		AlbumKind::Suggested {
			status: ReviewStatus::Pending,
			reason: Some("Shared tags and dates.".to_string()),
			confidence: Some(1.0),
		}
	);
	assert_eq!(
		suggested.cover_asset_id,
		harness.metadata.album_members(suggested.id).first().copied()
	);

	let task = harness
		.metadata
		.tasks()
		.into_iter()
		.find(|task| task.id == report.task_id)
		.expect("Task missing.");

	assert_eq!(task.kind, TaskKind::GenerateAlbums);
	assert_eq!(task.status, TaskStatus::Completed);
	assert_eq!(task.progress, 100);
	assert!(task.started_at.is_some() && task.completed_at.is_some());
	assert_eq!(task.result.as_ref().and_then(|result| result["albums_created"].as_u64()), Some(1));
}

#[tokio::test]
async fn existing_names_block_repeat_suggestions() {
	let harness = Harness::with_suggestions(beach_week());

	seed(&harness, 5).await;
	harness
		.service
		.create_album(CreateAlbumRequest {
			owner_id: OWNER,
			name: "beach  WEEK".to_string(),
			description: None,
			draft: AlbumDraft::Manual,
			asset_ids: Vec::new(),
			cover_asset_id: None,
		})
		.await
		.expect("Create failed.");

	let report =
		harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	assert_eq!(report.albums_created, 0);
	assert_eq!(report.suggestions_skipped, 2);

	let (_, existing) = harness.suggestions.calls().pop().expect("Provider was not called.");

	assert_eq!(existing, vec!["beach  WEEK".to_string()]);
}

#[tokio::test]
async fn owners_below_the_minimum_are_not_sent_to_the_provider() {
	let harness = Harness::with_suggestions(beach_week());

	seed(&harness, 4).await;

	let report =
		harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	assert_eq!(report.owners_scanned, 1);
	assert_eq!(report.albums_created, 0);
	assert!(harness.suggestions.calls().is_empty());
}

#[tokio::test]
async fn a_failing_owner_does_not_fail_the_run() {
	let harness = Harness::with_suggestions(ScriptedSuggestions::new(|_, _| {
		Err(eyre::eyre!("Grouping model returned malformed JSON."))
	}));

	seed(&harness, 5).await;

	let report =
		harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	assert_eq!(report.owners_failed, 1);
	assert!(harness.metadata.albums(OWNER).is_empty());
	assert!(harness.metadata.tasks().iter().all(|task| task.status == TaskStatus::Completed));
}

#[tokio::test]
async fn review_updates_only_suggestions() {
	let harness = Harness::with_suggestions(beach_week());

	seed(&harness, 5).await;
	harness.service.suggest_albums(OffsetDateTime::now_utc()).await.expect("Run failed.");

	let suggested = harness.metadata.albums(OWNER).remove(0);
	let accepted = harness
		.service
		.review_suggestion(OWNER, suggested.id, ReviewDecision::Accept)
		.await
		.expect("Review failed.");

	assert_eq!(accepted.kind.review_status(), Some(ReviewStatus::Accepted));

	let manual = harness
		.service
		.create_album(CreateAlbumRequest {
			owner_id: OWNER,
			name: "Mine".to_string(),
			description: None,
			draft: AlbumDraft::Manual,
			asset_ids: Vec::new(),
			cover_asset_id: None,
		})
		.await
		.expect("Create failed.");

	assert!(matches!(
		harness.service.review_suggestion(OWNER, manual.id, ReviewDecision::Ignore).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(
		harness.service.review_suggestion(OWNER, 9_999, ReviewDecision::Ignore).await,
		Err(Error::NotFound { .. })
	));
}
