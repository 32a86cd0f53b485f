//! Background reconciliation jobs. Each run is recorded as a task and may be re-run at any time:
//! a crashed run leaves partial progress that the next run completes.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use time::{Duration, OffsetDateTime};

use crate::{Error, Result, ZmageService};
use zmage_domain::{
	album::{AlbumKind, ReviewStatus, normalize_album_name},
	asset::AssetStatus,
	task::{TaskKind, TaskStatus},
};
use zmage_providers::{AssetSummary, GroupingSuggestion};
use zmage_storage::{
	models::{Asset, NewAlbum, TaskUpdate, VectorLink},
	qdrant::VectorRef,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SuggestionReport {
	pub task_id: i64,
	pub owners_scanned: u32,
	pub owners_failed: u32,
	pub albums_created: u32,
	pub suggestions_skipped: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
	pub task_id: i64,
	pub ignored_suggestions_purged: u64,
	pub assets_purged: u64,
	pub purge_failures: u64,
	pub associations_removed: u64,
	pub orphan_vectors_removed: u64,
}

/// A suggestion that passed validation and is ready to be stored.
#[derive(Debug, Clone, PartialEq)]
struct PlannedSuggestion {
	name: String,
	asset_ids: Vec<i64>,
}

impl ZmageService {
	/// Asks the suggestion provider for groupings of each owner's recent assets and stores every
	/// acceptable grouping as a suggested album awaiting review.
	pub async fn suggest_albums(&self, now: OffsetDateTime) -> Result<SuggestionReport> {
		let task = self.stores.metadata.create_task(None, TaskKind::GenerateAlbums, now).await?;

		self.advance_task(task.id, TaskStatus::Running, 0, None, None).await?;

		match self.run_suggestions(task.id, now).await {
			Ok(report) => {
				let result = serde_json::to_value(&report).ok();

				self.advance_task(task.id, TaskStatus::Completed, 100, result, None).await?;

				tracing::info!(
					task_id = task.id,
					albums_created = report.albums_created,
					owners_failed = report.owners_failed,
					"Album suggestion run finished."
				);

				Ok(report)
			},
			Err(err) => Err(self.fail_task(task.id, err).await),
		}
	}

	/// Daily cleanup: ignored suggestions, expired trash, orphaned memberships, orphaned vectors.
	pub async fn cleanup(&self, now: OffsetDateTime) -> Result<CleanupReport> {
		let task = self.stores.metadata.create_task(None, TaskKind::Cleanup, now).await?;

		self.advance_task(task.id, TaskStatus::Running, 0, None, None).await?;

		match self.run_cleanup(task.id, now).await {
			Ok(report) => {
				let result = serde_json::to_value(&report).ok();

				self.advance_task(task.id, TaskStatus::Completed, 100, result, None).await?;

				tracing::info!(
					task_id = task.id,
					assets_purged = report.assets_purged,
					orphan_vectors_removed = report.orphan_vectors_removed,
					"Cleanup run finished."
				);

				Ok(report)
			},
			Err(err) => Err(self.fail_task(task.id, err).await),
		}
	}

	async fn run_suggestions(&self, task_id: i64, now: OffsetDateTime) -> Result<SuggestionReport> {
		let since = now - Duration::days(self.cfg.reconciliation.suggestion_window_days);
		let owners = self.stores.metadata.owners_with_recent_assets(since).await?;
		let mut report = SuggestionReport { task_id, ..Default::default() };

		for (index, owner_id) in owners.iter().copied().enumerate() {
			report.owners_scanned += 1;

			match self.suggest_for_owner(owner_id, since, now).await {
				Ok((created, skipped)) => {
					report.albums_created += created;
					report.suggestions_skipped += skipped;
				},
				Err(err) => {
					report.owners_failed += 1;

					tracing::warn!(error = %err, owner_id, "Album suggestion failed for owner.");
				},
			}

			let progress = ((index + 1) * 100 / owners.len()) as i32;

			self.advance_task(task_id, TaskStatus::Running, progress, None, None).await?;
		}

		Ok(report)
	}

	/// Returns the number of albums created and suggestions skipped.
	async fn suggest_for_owner(
		&self,
		owner_id: i64,
		since: OffsetDateTime,
		now: OffsetDateTime,
	) -> Result<(u32, u32)> {
		let cfg = &self.cfg.reconciliation;
		let assets = self
			.stores
			.metadata
			.recent_ready_assets(owner_id, since, i64::from(cfg.suggestion_max_assets))
			.await?;

		if assets.len() < cfg.suggestion_min_assets as usize {
			return Ok((0, 0));
		}

		let existing = self.stores.metadata.album_names(owner_id).await?;
		let summaries: Vec<AssetSummary> = assets.iter().map(summarize).collect();
		let suggestions = self
			.providers
			.suggestion
			.suggest(&self.cfg.providers.suggestion, &summaries, &existing)
			.await?;
		let known: HashSet<i64> = assets.iter().map(|asset| asset.id).collect();
		let mut taken: HashSet<String> =
			existing.iter().map(|name| normalize_album_name(name)).collect();
		let (mut created, mut skipped) = (0, 0);

		for suggestion in suggestions {
			let Some(plan) =
				plan_suggestion(&suggestion, &known, &taken, cfg.suggestion_min_group_size as usize)
			else {
				skipped += 1;

				continue;
			};
			let album = self
				.stores
				.metadata
				.insert_album(&NewAlbum {
					owner_id,
					name: plan.name.clone(),
					description: suggestion.description.clone(),
					kind: AlbumKind::Suggested {
						status: ReviewStatus::Pending,
						reason: suggestion.reason.clone(),
						confidence: suggestion
							.confidence
							.filter(|c| c.is_finite())
							.map(|c| c.clamp(0.0, 1.0)),
					},
					cover_asset_id: plan.asset_ids.first().copied(),
					asset_ids: plan.asset_ids,
					now,
				})
				.await?;

			taken.insert(normalize_album_name(&plan.name));

			created += 1;

			tracing::info!(owner_id, album_id = album.id, "Suggested album created.");
		}

		Ok((created, skipped))
	}

	async fn run_cleanup(&self, task_id: i64, now: OffsetDateTime) -> Result<CleanupReport> {
		let cfg = &self.cfg.reconciliation;
		let batch = cfg.sweep_batch_size.max(1);
		let mut report = CleanupReport { task_id, ..Default::default() };
		let ignored_cutoff = now - Duration::days(cfg.ignored_suggestion_retention_days);

		report.ignored_suggestions_purged =
			self.stores.metadata.purge_ignored_suggestions(ignored_cutoff).await?;

		self.advance_task(task_id, TaskStatus::Running, 25, None, None).await?;

		let trash_cutoff = now - Duration::days(cfg.trash_retention_days);

		(report.assets_purged, report.purge_failures) =
			self.purge_expired_trash(trash_cutoff, i64::from(batch)).await?;

		self.advance_task(task_id, TaskStatus::Running, 50, None, None).await?;

		report.associations_removed =
			self.stores.metadata.sweep_orphan_associations(i64::from(batch)).await?;

		self.advance_task(task_id, TaskStatus::Running, 75, None, None).await?;

		report.orphan_vectors_removed = self.sweep_orphan_vectors(batch).await?;

		Ok(report)
	}

	/// Purges assets trashed before `cutoff`. A failed purge leaves the asset for the next run
	/// and the walk continues past it.
	async fn purge_expired_trash(&self, cutoff: OffsetDateTime, batch: i64) -> Result<(u64, u64)> {
		let mut purged = 0_u64;
		let mut failed = 0_u64;
		let mut after = None;

		loop {
			let page = self.stores.metadata.trashed_before(cutoff, after, batch).await?;

			for asset in &page {
				match self.purge_asset(asset).await {
					Ok(()) => purged += 1,
					Err(err) => {
						failed += 1;

						tracing::warn!(
							error = %err,
							asset_id = asset.id,
							"Expired asset purge failed."
						);
					},
				}
			}

			after = page.last().and_then(|asset| asset.deleted_at.map(|at| (at, asset.id)));

			if (page.len() as i64) < batch || after.is_none() {
				break;
			}
		}

		Ok((purged, failed))
	}

	/// Deletes vector records that no asset publishes. Records of assets with a processing run
	/// in flight are left alone, since that run may still commit them.
	async fn sweep_orphan_vectors(&self, batch: u32) -> Result<u64> {
		let mut offset = None;
		let mut removed = 0_u64;

		loop {
			let (records, next) =
				self.stores.vectors.scroll(offset, batch).await.map_err(Error::vector_index)?;
			let ids: Vec<i64> = records.iter().filter_map(|record| record.asset_id).collect();
			let links: HashMap<i64, VectorLink> = self
				.stores
				.metadata
				.vector_links(&ids)
				.await?
				.into_iter()
				.map(|link| (link.id, link))
				.collect();

			for record in records.iter().filter(|record| is_orphan(record, &links)) {
				match self.stores.vectors.delete(record.vector_id).await {
					Ok(()) => removed += 1,
					Err(err) => tracing::warn!(
						error = %err,
						vector_id = %record.vector_id,
						"Orphan vector delete failed."
					),
				}
			}

			match next {
				Some(next) => offset = Some(next),
				None => break,
			}
		}

		Ok(removed)
	}

	async fn advance_task(
		&self,
		task_id: i64,
		status: TaskStatus,
		progress: i32,
		result: Option<Value>,
		error_message: Option<String>,
	) -> Result<()> {
		let update =
			TaskUpdate { status, progress, result, error_message, now: OffsetDateTime::now_utc() };

		if self.stores.metadata.update_task(task_id, &update).await?.is_none() {
			tracing::warn!(task_id, status = %status, "Task update ignored.");
		}

		Ok(())
	}

	/// Marks the task failed and hands back the error that ended the run.
	async fn fail_task(&self, task_id: i64, err: Error) -> Error {
		tracing::error!(error = %err, task_id, "Background job failed.");

		if let Err(update_err) =
			self.advance_task(task_id, TaskStatus::Failed, 0, None, Some(err.to_string())).await
		{
			tracing::warn!(error = %update_err, task_id, "Recording task failure failed.");
		}

		err
	}
}

fn summarize(asset: &Asset) -> AssetSummary {
	AssetSummary {
		id: asset.id,
		title: asset.title.clone(),
		description: asset.description.clone(),
		tags: asset.tags.clone(),
		taken_at: asset.taken_at,
		camera_model: asset.camera_model.clone(),
	}
}

/// Keeps the suggested ids that belong to the scanned assets and rejects groups that are too
/// small or whose name collides with an album the owner already has.
fn plan_suggestion(
	suggestion: &GroupingSuggestion,
	known: &HashSet<i64>,
	taken: &HashSet<String>,
	min_group_size: usize,
) -> Option<PlannedSuggestion> {
	let name = suggestion.name.trim();

	if name.is_empty() || taken.contains(&normalize_album_name(name)) {
		return None;
	}

	let mut asset_ids: Vec<i64> = Vec::with_capacity(suggestion.asset_ids.len());

	for id in &suggestion.asset_ids {
		if known.contains(id) && !asset_ids.contains(id) {
			asset_ids.push(*id);
		}
	}

	if asset_ids.len() < min_group_size.max(1) {
		return None;
	}

	Some(PlannedSuggestion { name: name.to_string(), asset_ids })
}

fn is_orphan(record: &VectorRef, links: &HashMap<i64, VectorLink>) -> bool {
	let Some(asset_id) = record.asset_id else {
		return true;
	};

	match links.get(&asset_id) {
		None => true,
		Some(link) if link.status == AssetStatus::Processing => false,
		Some(link) => link.vector_id != Some(record.vector_id),
	}
}
