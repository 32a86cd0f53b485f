//! Cross-store writes. The metadata row is always the last writer: blobs are written before the
//! row that references them and deleted before the row goes away, so other stores may hold
//! orphans but the metadata store never points at something missing.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result, ZmageService};
use zmage_domain::{
	asset::{self, AssetStatus, AssetType, ProcessTrigger},
	time_serde,
};
use zmage_storage::models::{Asset, ContentUpdate, NewAsset};

const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Capture metadata supplied by the upload layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
	#[serde(default, with = "time_serde::option")]
	pub taken_at: Option<OffsetDateTime>,
	pub camera_model: Option<String>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub width: Option<i32>,
	pub height: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct IngestRequest {
	pub owner_id: i64,
	pub filename: String,
	pub bytes: Vec<u8>,
	/// Guessed from the filename when absent.
	pub mime_type: Option<String>,
	pub metadata: MediaMetadata,
	pub folder_id: Option<i64>,
	pub is_private: bool,
	/// Pre-rendered thumbnail. Storing it is best-effort.
	pub thumbnail: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct EditRequest {
	pub owner_id: i64,
	pub asset_id: i64,
	pub bytes: Vec<u8>,
	/// Defaults to the asset's current MIME type.
	pub mime_type: Option<String>,
	pub thumbnail: Option<Vec<u8>>,
}

impl ZmageService {
	pub async fn get_asset(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		self.require_asset(owner_id, asset_id).await
	}

	/// Stores the bytes and creates a PENDING asset. The blob is written first; when that fails no
	/// row is created.
	pub async fn ingest(&self, req: IngestRequest) -> Result<Asset> {
		let filename = req.filename.trim();

		if filename.is_empty() {
			return Err(Error::InvalidRequest {
				message: "filename must be non-empty.".to_string(),
			});
		}
		if req.bytes.is_empty() {
			return Err(Error::InvalidRequest { message: "Asset content is empty.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let content_hash = asset::content_hash(&req.bytes);

		if self.stores.metadata.find_by_hash(req.owner_id, &content_hash).await?.is_some() {
			return Err(Error::DuplicateContent { content_hash });
		}

		let mime_type = resolve_mime(req.mime_type.as_deref(), filename);
		let file_path = asset::blob_path(req.owner_id, now, &content_hash, filename);

		self.stores
			.blobs
			.put(&file_path, &req.bytes, &mime_type)
			.await
			.map_err(Error::blob_store)?;

		let thumbnail_path = self
			.store_thumbnail(req.owner_id, now, &content_hash, req.thumbnail.as_deref())
			.await;
		let new_asset = NewAsset {
			owner_id: req.owner_id,
			filename: asset::sanitize_file_name(filename),
			original_filename: filename.to_string(),
			file_path: file_path.clone(),
			thumbnail_path: thumbnail_path.clone(),
			file_size: req.bytes.len() as i64,
			asset_type: AssetType::from_mime(&mime_type),
			mime_type,
			content_hash: content_hash.clone(),
			taken_at: req.metadata.taken_at,
			camera_model: req.metadata.camera_model,
			latitude: req.metadata.latitude,
			longitude: req.metadata.longitude,
			width: req.metadata.width,
			height: req.metadata.height,
			folder_id: req.folder_id,
			is_private: req.is_private,
			now,
		};

		match self.stores.metadata.insert_asset(&new_asset).await {
			Ok(asset) => {
				tracing::info!(asset_id = asset.id, owner_id = asset.owner_id, "Asset ingested.");

				Ok(asset)
			},
			Err(err) => {
				self.delete_blob_best_effort(&file_path).await;

				if let Some(path) = thumbnail_path.as_deref() {
					self.delete_blob_best_effort(path).await;
				}

				match err {
					zmage_storage::Error::Conflict(_) =>
						Err(Error::DuplicateContent { content_hash }),
					err => Err(err.into()),
				}
			},
		}
	}

	/// Replaces an asset's bytes and reprocesses it. The new blob goes to a fresh path; the old one
	/// is deleted after the commit unless the version history keeps it.
	pub async fn edit_in_place(&self, req: EditRequest) -> Result<Asset> {
		if req.bytes.is_empty() {
			return Err(Error::InvalidRequest { message: "Asset content is empty.".to_string() });
		}

		let current = self.require_asset(req.owner_id, req.asset_id).await?;

		if current.status == AssetStatus::Processing {
			return Err(Error::Conflict {
				message: format!("Asset {} is being processed.", req.asset_id),
			});
		}

		let content_hash = asset::content_hash(&req.bytes);

		if content_hash == current.content_hash {
			return Ok(current);
		}
		if self.stores.metadata.find_by_hash(req.owner_id, &content_hash).await?.is_some() {
			return Err(Error::DuplicateContent { content_hash });
		}

		let now = OffsetDateTime::now_utc();
		let mime_type = req.mime_type.clone().unwrap_or_else(|| current.mime_type.clone());
		let file_path =
			asset::blob_path(req.owner_id, now, &content_hash, &current.original_filename);

		self.stores
			.blobs
			.put(&file_path, &req.bytes, &mime_type)
			.await
			.map_err(Error::blob_store)?;

		let thumbnail_path =
			self.store_thumbnail(req.owner_id, now, &content_hash, req.thumbnail.as_deref()).await;
		let retained = match self.versions.retain_previous(&current).await {
			Ok(retained) => retained,
			Err(err) => {
				tracing::warn!(
					error = %err,
					asset_id = current.id,
					"Version history failed; keeping the previous blob."
				);

				true
			},
		};
		let update = ContentUpdate {
			file_path: file_path.clone(),
			thumbnail_path: thumbnail_path.clone(),
			file_size: req.bytes.len() as i64,
			asset_type: AssetType::from_mime(&mime_type),
			mime_type,
			content_hash: content_hash.clone(),
			width: current.width,
			height: current.height,
		};
		let committed =
			self.stores.metadata.replace_content(req.owner_id, req.asset_id, &update, now).await;
		let replaced = match committed {
			Ok(Some(asset)) => asset,
			outcome => {
				self.delete_blob_best_effort(&file_path).await;

				if let Some(path) = thumbnail_path.as_deref() {
					self.delete_blob_best_effort(path).await;
				}

				return Err(match outcome {
					Ok(_) => Error::Conflict {
						message: format!("Asset {} changed during the edit.", req.asset_id),
					},
					Err(zmage_storage::Error::Conflict(_)) =>
						Error::DuplicateContent { content_hash },
					Err(err) => err.into(),
				});
			},
		};

		if !retained {
			self.delete_blob_best_effort(&current.file_path).await;

			if let Some(path) = current.thumbnail_path.as_deref()
				&& replaced.thumbnail_path.as_deref() != Some(path)
			{
				self.delete_blob_best_effort(path).await;
			}
		}

		tracing::info!(asset_id = replaced.id, retained, "Asset content replaced.");

		self.run_processing(req.owner_id, req.asset_id, ProcessTrigger::Edit).await
	}

	/// Moves the asset to the trash. Already-trashed assets keep their original deletion time.
	pub async fn soft_delete(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		let now = OffsetDateTime::now_utc();

		self.stores
			.metadata
			.set_deleted(owner_id, asset_id, true, now)
			.await?
			.ok_or_else(|| Error::not_found("Asset", asset_id))
	}

	pub async fn restore(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		let now = OffsetDateTime::now_utc();

		self.stores
			.metadata
			.set_deleted(owner_id, asset_id, false, now)
			.await?
			.ok_or_else(|| Error::not_found("Asset", asset_id))
	}

	/// Moves an asset into the private vault. Trashed assets must be restored first.
	pub async fn move_to_vault(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		let current = self.require_asset(owner_id, asset_id).await?;

		if current.deleted_at.is_some() {
			return Err(Error::InvalidRequest {
				message: format!("Asset {asset_id} is in the trash; restore it first."),
			});
		}

		self.set_private(owner_id, asset_id, true).await
	}

	pub async fn move_from_vault(&self, owner_id: i64, asset_id: i64) -> Result<Asset> {
		self.set_private(owner_id, asset_id, false).await
	}

	/// Hard-deletes an asset: blob, then vector record, then the metadata row.
	///
	/// A blob store failure aborts before anything is removed. A vector delete failure is logged
	/// and left for the orphan-vector sweep.
	pub async fn purge(&self, owner_id: i64, asset_id: i64) -> Result<()> {
		let asset = self.require_asset(owner_id, asset_id).await?;

		self.purge_asset(&asset).await
	}

	pub(crate) async fn purge_asset(&self, asset: &Asset) -> Result<()> {
		self.stores.blobs.delete(&asset.file_path).await.map_err(Error::blob_store)?;

		if let Some(path) = asset.thumbnail_path.as_deref() {
			self.delete_blob_best_effort(path).await;
		}
		if let Some(vector_id) = asset.vector_id {
			self.delete_vector_best_effort(vector_id, asset.id).await;
		}

		self.stores.metadata.delete_asset(asset.owner_id, asset.id).await?;

		tracing::info!(asset_id = asset.id, owner_id = asset.owner_id, "Asset purged.");

		Ok(())
	}

	async fn set_private(&self, owner_id: i64, asset_id: i64, is_private: bool) -> Result<Asset> {
		let now = OffsetDateTime::now_utc();

		self.stores
			.metadata
			.set_private(owner_id, asset_id, is_private, now)
			.await?
			.ok_or_else(|| Error::not_found("Asset", asset_id))
	}

	async fn store_thumbnail(
		&self,
		owner_id: i64,
		now: OffsetDateTime,
		content_hash: &str,
		thumbnail: Option<&[u8]>,
	) -> Option<String> {
		let bytes = thumbnail.filter(|bytes| !bytes.is_empty())?;
		let path = asset::thumbnail_path(owner_id, now, content_hash);

		match self.stores.blobs.put(&path, bytes, THUMBNAIL_CONTENT_TYPE).await {
			Ok(()) => Some(path),
			Err(err) => {
				tracing::warn!(error = %err, owner_id, "Thumbnail write failed.");

				None
			},
		}
	}

	async fn delete_blob_best_effort(&self, path: &str) {
		if let Err(err) = self.stores.blobs.delete(path).await {
			tracing::warn!(error = %err, path, "Blob delete failed.");
		}
	}
}

fn resolve_mime(explicit: Option<&str>, filename: &str) -> String {
	explicit
		.map(str::trim)
		.filter(|mime| !mime.is_empty())
		.map(str::to_ascii_lowercase)
		.unwrap_or_else(|| asset::guess_mime(filename).to_string())
}
