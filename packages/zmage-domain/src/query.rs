use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
	Error, Result,
	asset::{AssetStatus, AssetType, VisibilityScope},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
	#[default]
	CreatedAt,
	UpdatedAt,
	TakenAt,
	OriginalFilename,
	FileSize,
	Title,
}
impl SortField {
	/// Column name, safe to splice into SQL because the set is closed.
	pub const fn column(self) -> &'static str {
		match self {
			Self::CreatedAt => "created_at",
			Self::UpdatedAt => "updated_at",
			Self::TakenAt => "taken_at",
			Self::OriginalFilename => "original_filename",
			Self::FileSize => "file_size",
			Self::Title => "title",
		}
	}
}
impl FromStr for SortField {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"created_at" => Ok(Self::CreatedAt),
			"updated_at" => Ok(Self::UpdatedAt),
			"taken_at" => Ok(Self::TakenAt),
			"original_filename" => Ok(Self::OriginalFilename),
			"file_size" => Ok(Self::FileSize),
			"title" => Ok(Self::Title),
			other => Err(Error::UnknownVariant { kind: "sort field", value: other.to_string() }),
		}
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
	Asc,
	#[default]
	Desc,
}
impl SortOrder {
	pub const fn keyword(self) -> &'static str {
		match self {
			Self::Asc => "ASC",
			Self::Desc => "DESC",
		}
	}
}
impl fmt::Display for SortOrder {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.keyword())
	}
}

/// Structured filters shared by keyword and semantic retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetFilter {
	pub asset_types: Vec<AssetType>,
	pub folder_id: Option<i64>,
	/// Every listed tag must be present on the asset.
	pub tags: Vec<String>,
	#[serde(with = "crate::time_serde::option")]
	pub created_from: Option<OffsetDateTime>,
	#[serde(with = "crate::time_serde::option")]
	pub created_to: Option<OffsetDateTime>,
}

/// Fields a filter can observe, borrowed from an asset row.
#[derive(Debug, Clone, Copy)]
pub struct FilterSubject<'a> {
	pub asset_type: AssetType,
	pub folder_id: Option<i64>,
	pub tags: &'a [String],
	pub created_at: OffsetDateTime,
}

impl AssetFilter {
	pub fn matches(&self, subject: &FilterSubject<'_>) -> bool {
		if !self.asset_types.is_empty() && !self.asset_types.contains(&subject.asset_type) {
			return false;
		}
		if self.folder_id.is_some() && self.folder_id != subject.folder_id {
			return false;
		}
		if !self.tags.iter().all(|tag| subject.tags.contains(tag)) {
			return false;
		}
		if self.created_from.is_some_and(|from| subject.created_at < from) {
			return false;
		}
		if self.created_to.is_some_and(|to| subject.created_at > to) {
			return false;
		}

		true
	}
}

/// One listing request against the metadata store.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetQuery {
	pub owner_id: i64,
	pub scope: VisibilityScope,
	/// Keyword matched against the text fields and the tag set. Blank means no keyword.
	pub keyword: Option<String>,
	pub filter: AssetFilter,
	pub status: Option<AssetStatus>,
	/// Restricts the result to these ids when set.
	pub ids: Option<Vec<i64>>,
	pub sort: SortField,
	pub order: SortOrder,
	/// No limit when unset.
	pub limit: Option<i64>,
	pub offset: i64,
}
impl AssetQuery {
	pub fn new(owner_id: i64, scope: VisibilityScope) -> Self {
		Self {
			owner_id,
			scope,
			keyword: None,
			filter: AssetFilter::default(),
			status: None,
			ids: None,
			sort: SortField::default(),
			order: SortOrder::default(),
			limit: None,
			offset: 0,
		}
	}

	pub fn keyword(&self) -> Option<&str> {
		self.keyword.as_deref().map(str::trim).filter(|kw| !kw.is_empty())
	}
}

/// Case-insensitive keyword match over the searchable text fields and exact tag membership.
pub fn keyword_matches(needle: &str, haystacks: &[Option<&str>], tags: &[String]) -> bool {
	let needle = needle.trim();

	if needle.is_empty() {
		return true;
	}

	let lowered = needle.to_lowercase();

	haystacks.iter().flatten().any(|text| text.to_lowercase().contains(&lowered))
		|| tags.iter().any(|tag| tag == needle)
}
