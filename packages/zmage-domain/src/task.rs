use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
	GenerateAlbums,
	Cleanup,
}
impl TaskKind {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::GenerateAlbums => "generate_albums",
			Self::Cleanup => "cleanup",
		}
	}
}
impl FromStr for TaskKind {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"generate_albums" => Ok(Self::GenerateAlbums),
			"cleanup" => Ok(Self::Cleanup),
			other => Err(Error::UnknownVariant { kind: "task kind", value: other.to_string() }),
		}
	}
}
impl fmt::Display for TaskKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Pending,
	Running,
	Completed,
	Failed,
	Cancelled,
}
impl TaskStatus {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pending => "pending",
			Self::Running => "running",
			Self::Completed => "completed",
			Self::Failed => "failed",
			Self::Cancelled => "cancelled",
		}
	}

	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
	}

	pub const fn can_transition_to(self, next: Self) -> bool {
		match self {
			Self::Pending => matches!(next, Self::Running | Self::Cancelled),
			Self::Running =>
				matches!(next, Self::Running | Self::Completed | Self::Failed | Self::Cancelled),
			Self::Completed | Self::Failed | Self::Cancelled => false,
		}
	}

	pub fn transition(self, next: Self) -> Result<Self> {
		if self.can_transition_to(next) {
			Ok(next)
		} else {
			Err(Error::IllegalTaskTransition { from: self.as_str(), to: next.as_str() })
		}
	}
}
impl FromStr for TaskStatus {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"pending" => Ok(Self::Pending),
			"running" => Ok(Self::Running),
			"completed" => Ok(Self::Completed),
			"failed" => Ok(Self::Failed),
			"cancelled" => Ok(Self::Cancelled),
			other => Err(Error::UnknownVariant { kind: "task status", value: other.to_string() }),
		}
	}
}
impl fmt::Display for TaskStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

pub fn clamp_progress(progress: i32) -> i32 {
	progress.clamp(0, 100)
}
