use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, macros::format_description};

use crate::{Error, Result};

const HASH_PREFIX_CHARS: usize = 8;
const MAX_FILE_NAME_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
	Pending,
	Processing,
	Ready,
	Failed,
}
impl AssetStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Processing => "processing",
			Self::Ready => "ready",
			Self::Failed => "failed",
		}
	}
}
impl FromStr for AssetStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"pending" => Ok(Self::Pending),
			"processing" => Ok(Self::Processing),
			"ready" => Ok(Self::Ready),
			"failed" => Ok(Self::Failed),
			other => Err(Error::UnknownVariant { kind: "asset status", value: other.to_string() }),
		}
	}
}
impl TryFrom<String> for AssetStatus {
	type Error = Error;

	fn try_from(raw: String) -> Result<Self> {
		raw.parse()
	}
}
impl fmt::Display for AssetStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
	Image,
	Video,
	Document,
	Other,
}
impl AssetType {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Image => "image",
			Self::Video => "video",
			Self::Document => "document",
			Self::Other => "other",
		}
	}

	pub fn from_mime(mime: &str) -> Self {
		let mime = mime.trim().to_ascii_lowercase();

		if mime.starts_with("image/") {
			Self::Image
		} else if mime.starts_with("video/") {
			Self::Video
		} else if mime == "application/pdf" || mime.starts_with("text/") {
			Self::Document
		} else {
			Self::Other
		}
	}
}
impl FromStr for AssetType {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"image" => Ok(Self::Image),
			"video" => Ok(Self::Video),
			"document" => Ok(Self::Document),
			"other" => Ok(Self::Other),
			other => Err(Error::UnknownVariant { kind: "asset type", value: other.to_string() }),
		}
	}
}
impl TryFrom<String> for AssetType {
	type Error = Error;

	fn try_from(raw: String) -> Result<Self> {
		raw.parse()
	}
}
impl fmt::Display for AssetType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Retrieval context. Exactly one scope is applied to every listing query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
	Active,
	Private,
	Trashed,
}
impl VisibilityScope {
	/// Resolves the single view an asset belongs to.
	///
	/// A deleted vault asset belongs to no view: vault contents never surface in the trash, and
	/// the asset stays hidden until it is restored or purged by retention.
	pub fn classify(deleted: bool, is_private: bool) -> Option<Self> {
		match (deleted, is_private) {
			(false, false) => Some(Self::Active),
			(false, true) => Some(Self::Private),
			(true, false) => Some(Self::Trashed),
			(true, true) => None,
		}
	}

	pub fn admits(self, deleted: bool, is_private: bool) -> bool {
		Self::classify(deleted, is_private) == Some(self)
	}
}

/// What started a processing run. Each trigger may only claim an asset from a fixed set of
/// states so that two runs can never interleave on one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTrigger {
	Ingest,
	Retry,
	Edit,
}
impl ProcessTrigger {
	pub fn claimable_from(self) -> &'static [AssetStatus] {
		match self {
			Self::Ingest | Self::Retry => &[AssetStatus::Pending],
			Self::Edit => &[AssetStatus::Pending, AssetStatus::Ready, AssetStatus::Failed],
		}
	}

	pub fn can_claim(self, status: AssetStatus) -> bool {
		self.claimable_from().contains(&status)
	}
}

/// Hex-encoded BLAKE3 digest of the asset bytes.
pub fn content_hash(bytes: &[u8]) -> String {
	blake3::hash(bytes).to_hex().to_string()
}

pub fn guess_mime(filename: &str) -> &'static str {
	let ext = filename.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());

	match ext.as_deref() {
		Some("jpg" | "jpeg") => "image/jpeg",
		Some("png") => "image/png",
		Some("gif") => "image/gif",
		Some("webp") => "image/webp",
		Some("heic") => "image/heic",
		Some("bmp") => "image/bmp",
		Some("tif" | "tiff") => "image/tiff",
		Some("svg") => "image/svg+xml",
		Some("mp4") => "video/mp4",
		Some("mov") => "video/quicktime",
		Some("webm") => "video/webm",
		Some("mkv") => "video/x-matroska",
		Some("avi") => "video/x-msvideo",
		Some("pdf") => "application/pdf",
		Some("txt") => "text/plain",
		Some("md") => "text/markdown",
		Some("csv") => "text/csv",
		Some("html" | "htm") => "text/html",
		_ => "application/octet-stream",
	}
}

/// Object-store path for a freshly written blob: `assets/{owner}/{yyyyMMdd_HHmmss}_{hash8}_{name}`.
///
/// Including the hash prefix keeps paths fresh across in-place edits, so a new version never
/// overwrites the bytes an older row may still reference.
pub fn blob_path(owner_id: i64, now: OffsetDateTime, hash: &str, filename: &str) -> String {
	format!("assets/{owner_id}/{}", stamped_name(now, hash, filename))
}

pub fn thumbnail_path(owner_id: i64, now: OffsetDateTime, hash: &str) -> String {
	format!("thumbnails/{owner_id}/{}", stamped_name(now, hash, "thumb.jpg"))
}

pub fn sanitize_file_name(filename: &str) -> String {
	let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
	let cleaned: String = base
		.chars()
		.map(|ch| if ch.is_alphanumeric() || matches!(ch, '.' | '-' | '_') { ch } else { '_' })
		.take(MAX_FILE_NAME_CHARS)
		.collect();
	let trimmed = cleaned.trim_matches('.');

	if trimmed.is_empty() { "file".to_string() } else { trimmed.to_string() }
}

/// Text handed to the embedding service. The original filename is always present, so every
/// asset yields a non-empty embedding input even when analysis produced nothing.
pub fn embedding_text(
	title: Option<&str>,
	description: Option<&str>,
	tags: &[String],
	ocr_text: Option<&str>,
	original_filename: &str,
) -> String {
	let mut parts: Vec<&str> = Vec::with_capacity(4 + tags.len());

	parts.extend(title.filter(|s| !s.trim().is_empty()));
	parts.extend(description.filter(|s| !s.trim().is_empty()));
	parts.extend(tags.iter().map(String::as_str).filter(|s| !s.trim().is_empty()));
	parts.extend(ocr_text.filter(|s| !s.trim().is_empty()));
	parts.push(original_filename);

	parts.join(" ")
}

fn stamped_name(now: OffsetDateTime, hash: &str, filename: &str) -> String {
	let stamp = now
		.format(format_description!("[year][month][day]_[hour][minute][second]"))
		.unwrap_or_else(|_| now.unix_timestamp().to_string());
	let prefix: String = hash.chars().take(HASH_PREFIX_CHARS).collect();

	format!("{stamp}_{prefix}_{}", sanitize_file_name(filename))
}
