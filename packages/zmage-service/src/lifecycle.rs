//! Processing runs: PENDING -> PROCESSING -> READY | FAILED.
//!
//! A run claims the row under a fresh run id before touching any other store. Only the run
//! holding the claim may publish, so concurrent triggers for one asset are rejected rather than
//! interleaved. The new vector is written before the metadata commit that publishes its id; a run
//! that loses its claim deletes that vector again, and anything it leaves behind is picked up by
//! the orphan-vector sweep.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{Error, Result, ZmageService};
use zmage_domain::{
	asset::{AssetStatus, AssetType, ProcessTrigger, embedding_text},
	vector::l2_normalize,
};
use zmage_providers::EmbeddingTask;
use zmage_storage::models::{Asset, DerivedFields};

impl ZmageService {
	/// Runs processing for a freshly ingested asset.
	pub async fn process(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		self.run_processing(owner_id, asset_id, ProcessTrigger::Ingest).await
	}

	/// Moves a FAILED asset back to PENDING and processes it again. The metadata row is reused.
	///
	/// An asset whose source blob has gone missing is not retried; it would only fail again.
	pub async fn retry(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		let current = self.require_asset(owner_id, asset_id).await?;

		if current.status == AssetStatus::Failed
			&& !self.stores.blobs.exists(&current.file_path).await.map_err(Error::blob_store)?
		{
			return Err(Error::NotFound {
				message: format!("Source blob of asset {asset_id} is missing."),
			});
		}

		let now = OffsetDateTime::now_utc();

		if self.stores.metadata.reset_for_retry(owner_id, asset_id, now).await?.is_none() {
			let asset = self.require_asset(owner_id, asset_id).await?;

			return Err(Error::InvalidRequest {
				message: format!(
					"Only failed assets can be retried; asset {asset_id} is {}.",
					asset.status
				),
			});
		}

		tracing::info!(asset_id, "Asset reset for retry.");

		self.run_processing(owner_id, asset_id, ProcessTrigger::Retry).await
	}

	pub(crate) async fn run_processing(
		&self,
		owner_id: i64,
		asset_id: i64,
		trigger: ProcessTrigger,
	) -> Result<Asset> {
		let now = OffsetDateTime::now_utc();
		let stale_before = now - Duration::seconds(self.cfg.processing.lease_seconds);
		let run_id = Uuid::new_v4();
		let Some(asset) = self
			.stores
			.metadata
			.claim_processing(
				owner_id,
				asset_id,
				trigger.claimable_from(),
				run_id,
				now,
				stale_before,
			)
			.await?
		else {
			return Err(self.claim_rejected(owner_id, asset_id, trigger).await);
		};

		tracing::info!(asset_id, run_id = %run_id, "Processing claimed.");

		let (derived, vector_id) = match self.derive_and_index(&asset).await {
			Ok(output) => output,
			Err(message) => {
				let recorded = self
					.stores
					.metadata
					.fail_processing(asset_id, run_id, &message, OffsetDateTime::now_utc())
					.await?;

				if recorded {
					tracing::warn!(asset_id, error = %message, "Processing failed.");
				} else {
					tracing::warn!(
						asset_id,
						run_id = %run_id,
						"Superseded run failed; state untouched."
					);
				}

				return Err(Error::Processing { asset_id, message });
			},
		};
		let committed = self
			.stores
			.metadata
			.complete_processing(asset_id, run_id, &derived, vector_id, OffsetDateTime::now_utc())
			.await?;
		let Some(ready) = committed else {
			self.delete_vector_best_effort(vector_id, asset_id).await;

			return Err(Error::Conflict {
				message: format!("Processing run for asset {asset_id} was superseded."),
			});
		};

		if let Some(previous) = asset.vector_id
			&& previous != vector_id
		{
			self.delete_vector_best_effort(previous, asset_id).await;
		}

		tracing::info!(asset_id, vector_id = %vector_id, "Asset ready.");

		Ok(ready)
	}

	pub(crate) async fn delete_vector_best_effort(&self, vector_id: Uuid, asset_id: i64) {
		if let Err(err) = self.stores.vectors.delete(vector_id).await {
			tracing::warn!(
				error = %err,
				asset_id,
				vector_id = %vector_id,
				"Vector delete failed; leaving it for the orphan sweep."
			);
		}
	}

	async fn claim_rejected(&self, owner_id: i64, asset_id: i64, trigger: ProcessTrigger) -> Error {
		match self.stores.metadata.get_asset(owner_id, asset_id).await {
			Ok(None) => Error::not_found("Asset", asset_id),
			Ok(Some(asset)) if asset.status == AssetStatus::Processing => Error::Conflict {
				message: format!("Asset {asset_id} is already being processed."),
			},
			Ok(Some(asset)) => Error::InvalidRequest {
				message: format!(
					"Asset {asset_id} is {} and cannot be processed by {trigger:?}.",
					asset.status
				),
			},
			Err(err) => err.into(),
		}
	}

	/// Runs the external steps of a processing run. Any failure is reported as the message that
	/// the asset records.
	async fn derive_and_index(
		&self,
		asset: &Asset,
	) -> std::result::Result<(DerivedFields, Uuid), String> {
		let derived = if asset.asset_type == AssetType::Image {
			self.analyze(asset).await?
		} else {
			DerivedFields::default()
		};
		let text = embedding_text(
			derived.title.as_deref(),
			derived.description.as_deref(),
			&derived.tags,
			derived.ocr_text.as_deref(),
			&asset.original_filename,
		);
		let embedding = self
			.embed_one(text, EmbeddingTask::RetrievalDocument)
			.await
			.map_err(|err| err.to_string())?;
		let vector_id = Uuid::new_v4();
		let mut indexed = asset.clone();

		indexed.title = derived.title.clone();
		indexed.tags = derived.tags.clone();

		self.stores
			.vectors
			.upsert(vector_id, embedding, &indexed.vector_payload())
			.await
			.map_err(|err| format!("Vector upsert failed: {err}"))?;

		Ok((derived, vector_id))
	}

	async fn analyze(&self, asset: &Asset) -> std::result::Result<DerivedFields, String> {
		let bytes = self
			.stores
			.blobs
			.get(&asset.file_path)
			.await
			.map_err(|err| format!("Blob read failed: {err}"))?;
		let analysis = self
			.providers
			.analysis
			.analyze(&self.cfg.providers.analysis, &bytes, &asset.mime_type)
			.await
			.map_err(|err| format!("Image analysis failed: {err}"))?;

		Ok(DerivedFields {
			title: non_blank(analysis.title),
			description: non_blank(analysis.description),
			tags: clean_tags(analysis.tags),
			ocr_text: non_blank(analysis.ocr_text),
		})
	}

	/// Embeds one text and returns it unit-normalized with the configured dimension.
	pub(crate) async fn embed_one(&self, text: String, task: EmbeddingTask) -> Result<Vec<f32>> {
		let cfg = &self.cfg.providers.embedding;
		let texts = [text];
		let mut vectors = self
			.providers
			.embedding
			.embed(cfg, &texts, task)
			.await
			.map_err(|err| Error::Provider { message: format!("Embedding failed: {err}") })?;

		if vectors.len() != 1 {
			return Err(Error::Provider {
				message: format!("Embedding returned {} vectors for one input.", vectors.len()),
			});
		}

		let vector = vectors.remove(0);

		Ok(l2_normalize(vector, self.cfg.storage.qdrant.vector_dim as usize)?)
	}

	pub(crate) async fn require_asset(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		self.stores
			.metadata
			.get_asset(owner_id, asset_id)
			.await?
			.ok_or_else(|| Error::not_found("Asset", asset_id))
	}
}

fn non_blank(value: Option<String>) -> Option<String> {
	value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Trims tags and drops blanks and repeats, keeping first-seen order.
fn clean_tags(tags: Vec<String>) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(tags.len());

	for tag in tags {
		let tag = tag.trim();

		if !tag.is_empty() && !out.iter().any(|seen| seen == tag) {
			out.push(tag.to_string());
		}
	}

	out
}
