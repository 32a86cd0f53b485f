use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use zmage_domain::{
	album::{AlbumKind, ReviewStatus},
	asset::{AssetStatus, AssetType, VisibilityScope},
	query::FilterSubject,
	rules::{RuleSubject, SmartRules},
	task::{TaskKind, TaskStatus},
	time_serde,
	vector::VectorPayload,
};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Asset {
	pub id: i64,
	pub owner_id: i64,
	pub filename: String,
	pub original_filename: String,
	pub file_path: String,
	pub thumbnail_path: Option<String>,
	pub file_size: i64,
	pub mime_type: String,
	#[sqlx(try_from = "String")]
	pub asset_type: AssetType,
	pub content_hash: String,
	pub title: Option<String>,
	pub description: Option<String>,
	pub tags: Vec<String>,
	pub ocr_text: Option<String>,
	#[serde(with = "time_serde::option")]
	pub taken_at: Option<OffsetDateTime>,
	pub camera_model: Option<String>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub width: Option<i32>,
	pub height: Option<i32>,
	pub folder_id: Option<i64>,
	#[sqlx(try_from = "String")]
	pub status: AssetStatus,
	pub error_message: Option<String>,
	pub vector_id: Option<Uuid>,
	#[serde(skip)]
	pub processing_run_id: Option<Uuid>,
	#[serde(with = "time_serde::option")]
	pub processing_started_at: Option<OffsetDateTime>,
	#[serde(with = "time_serde::option")]
	pub processed_at: Option<OffsetDateTime>,
	pub is_private: bool,
	#[serde(with = "time_serde")]
	pub created_at: OffsetDateTime,
	#[serde(with = "time_serde")]
	pub updated_at: OffsetDateTime,
	#[serde(with = "time_serde::option")]
	pub deleted_at: Option<OffsetDateTime>,
}
impl Asset {
	pub fn visibility(&self) -> Option<VisibilityScope> {
		VisibilityScope::classify(self.deleted_at.is_some(), self.is_private)
	}

	pub fn filter_subject(&self) -> FilterSubject<'_> {
		FilterSubject {
			asset_type: self.asset_type,
			folder_id: self.folder_id,
			tags: &self.tags,
			created_at: self.created_at,
		}
	}

	pub fn rule_subject(&self) -> RuleSubject<'_> {
		RuleSubject {
			tags: &self.tags,
			taken_at: self.taken_at,
			camera_model: self.camera_model.as_deref(),
			asset_type: self.asset_type,
			latitude: self.latitude,
			longitude: self.longitude,
		}
	}

	/// Text fields searched by keyword mode.
	pub fn keyword_fields(&self) -> [Option<&str>; 4] {
		[
			self.title.as_deref(),
			self.description.as_deref(),
			Some(self.original_filename.as_str()),
			self.ocr_text.as_deref(),
		]
	}

	pub fn vector_payload(&self) -> VectorPayload {
		VectorPayload {
			asset_id: self.id,
			title: self.title.clone(),
			tags: self.tags.clone(),
			asset_type: self.asset_type,
			folder_id: self.folder_id,
		}
	}
}

/// A metadata row to insert in PENDING state.
#[derive(Debug, Clone)]
pub struct NewAsset {
	pub owner_id: i64,
	pub filename: String,
	pub original_filename: String,
	pub file_path: String,
	pub thumbnail_path: Option<String>,
	pub file_size: i64,
	pub mime_type: String,
	pub asset_type: AssetType,
	pub content_hash: String,
	pub taken_at: Option<OffsetDateTime>,
	pub camera_model: Option<String>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub width: Option<i32>,
	pub height: Option<i32>,
	pub folder_id: Option<i64>,
	pub is_private: bool,
	pub now: OffsetDateTime,
}

/// Fields produced by a successful processing run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedFields {
	pub title: Option<String>,
	pub description: Option<String>,
	pub tags: Vec<String>,
	pub ocr_text: Option<String>,
}

/// New bytes for an existing asset after an in-place edit.
#[derive(Debug, Clone)]
pub struct ContentUpdate {
	pub file_path: String,
	pub thumbnail_path: Option<String>,
	pub file_size: i64,
	pub mime_type: String,
	pub asset_type: AssetType,
	pub content_hash: String,
	pub width: Option<i32>,
	pub height: Option<i32>,
}

/// The index linkage of an asset, used when reconciling vector records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct VectorLink {
	pub id: i64,
	pub vector_id: Option<Uuid>,
	#[sqlx(try_from = "String")]
	pub status: AssetStatus,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AlbumRow {
	pub id: i64,
	pub owner_id: i64,
	pub name: String,
	pub description: Option<String>,
	pub album_type: String,
	pub smart_rules: Option<Value>,
	pub review_status: Option<String>,
	pub suggestion_reason: Option<String>,
	pub suggestion_score: Option<f32>,
	pub cover_asset_id: Option<i64>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	pub asset_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Album {
	pub id: i64,
	pub owner_id: i64,
	pub name: String,
	pub description: Option<String>,
	pub kind: AlbumKind,
	pub cover_asset_id: Option<i64>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
	/// Live member count, computed when the album is read.
	pub asset_count: i64,
}
impl TryFrom<AlbumRow> for Album {
	type Error = Error;

	fn try_from(row: AlbumRow) -> Result<Self> {
		let kind = match row.album_type.as_str() {
			"manual" => AlbumKind::Manual,
			"smart" => {
				let raw = row.smart_rules.ok_or_else(|| {
					Error::Decode(format!("Smart album {} has no rules.", row.id))
				})?;

				AlbumKind::Smart { rules: SmartRules::parse(&raw)? }
			},
			"suggested" => {
				let status = row
					.review_status
					.as_deref()
					.ok_or_else(|| {
						Error::Decode(format!("Suggested album {} has no review status.", row.id))
					})?
					.parse::<ReviewStatus>()?;

				AlbumKind::Suggested {
					status,
					reason: row.suggestion_reason,
					confidence: row.suggestion_score,
				}
			},
			other => return Err(Error::Decode(format!("Unknown album type {other:?}."))),
		};

		Ok(Self {
			id: row.id,
			owner_id: row.owner_id,
			name: row.name,
			description: row.description,
			kind,
			cover_asset_id: row.cover_asset_id,
			created_at: row.created_at,
			updated_at: row.updated_at,
			asset_count: row.asset_count,
		})
	}
}

#[derive(Debug, Clone)]
pub struct NewAlbum {
	pub owner_id: i64,
	pub name: String,
	pub description: Option<String>,
	pub kind: AlbumKind,
	pub cover_asset_id: Option<i64>,
	/// Initial members, in display order.
	pub asset_ids: Vec<i64>,
	pub now: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TaskRow {
	pub id: i64,
	pub owner_id: Option<i64>,
	pub task_type: String,
	pub status: String,
	pub progress: i32,
	pub result: Option<Value>,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
	pub id: i64,
	pub owner_id: Option<i64>,
	pub kind: TaskKind,
	pub status: TaskStatus,
	pub progress: i32,
	pub result: Option<Value>,
	pub error_message: Option<String>,
	pub created_at: OffsetDateTime,
	pub started_at: Option<OffsetDateTime>,
	pub completed_at: Option<OffsetDateTime>,
}
impl TryFrom<TaskRow> for Task {
	type Error = Error;

	fn try_from(row: TaskRow) -> Result<Self> {
		Ok(Self {
			id: row.id,
			owner_id: row.owner_id,
			kind: row.task_type.parse()?,
			status: row.status.parse()?,
			progress: row.progress,
			result: row.result,
			error_message: row.error_message,
			created_at: row.created_at,
			started_at: row.started_at,
			completed_at: row.completed_at,
		})
	}
}

/// A status change for a task. `progress` is clamped to 0..=100 when applied.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
	pub status: TaskStatus,
	pub progress: i32,
	pub result: Option<Value>,
	pub error_message: Option<String>,
	pub now: OffsetDateTime,
}
