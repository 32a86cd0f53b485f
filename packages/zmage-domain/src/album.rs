use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, rules::SmartRules};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
	Pending,
	Accepted,
	Ignored,
}
impl ReviewStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Accepted => "accepted",
			Self::Ignored => "ignored",
		}
	}
}
impl FromStr for ReviewStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"pending" => Ok(Self::Pending),
			"accepted" => Ok(Self::Accepted),
			"ignored" => Ok(Self::Ignored),
			other => Err(Error::UnknownVariant { kind: "review status", value: other.to_string() }),
		}
	}
}
impl fmt::Display for ReviewStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Album variants. Variant-specific data lives on the variant, so a smart album always has rules
/// and no other kind can carry them.
#[derive(Debug, Clone, PartialEq)]
pub enum AlbumKind {
	Manual,
	Smart { rules: SmartRules },
	Suggested { status: ReviewStatus, reason: Option<String>, confidence: Option<f32> },
}
impl AlbumKind {
	pub const fn as_str(&self) -> &'static str {
		match self {
			Self::Manual => "manual",
			Self::Smart { .. } => "smart",
			Self::Suggested { .. } => "suggested",
		}
	}

	pub fn rules(&self) -> Option<&SmartRules> {
		match self {
			Self::Smart { rules } => Some(rules),
			_ => None,
		}
	}

	pub fn review_status(&self) -> Option<ReviewStatus> {
		match self {
			Self::Suggested { status, .. } => Some(*status),
			_ => None,
		}
	}
}

/// Key used for album-name collision checks.
pub fn normalize_album_name(name: &str) -> String {
	name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
