use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::{Error, Result, ZmageService};
use zmage_domain::{
	album::{AlbumKind, ReviewStatus},
	rules::{SmartRules, compare_rule_order},
};
use zmage_storage::models::{Album, Asset, NewAlbum};

/// The user-creatable album variants. Suggested albums come from the reconciliation worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "album_type", rename_all = "snake_case")]
pub enum AlbumDraft {
	Manual,
	Smart { rules: Value },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateAlbumRequest {
	pub owner_id: i64,
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(flatten)]
	pub draft: AlbumDraft,
	/// Initial members of a manual album, in display order.
	#[serde(default)]
	pub asset_ids: Vec<i64>,
	#[serde(default)]
	pub cover_asset_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
	Accept,
	Ignore,
}
impl ReviewDecision {
	const fn status(self) -> ReviewStatus {
		match self {
			Self::Accept => ReviewStatus::Accepted,
			Self::Ignore => ReviewStatus::Ignored,
		}
	}
}

impl ZmageService {
	pub async fn create_album(&self, req: CreateAlbumRequest) -> Result<Album> {
		let name = req.name.trim();

		if name.is_empty() {
			return Err(Error::InvalidRequest {
				message: "Album name must be non-empty.".to_string(),
			});
		}

		let kind = album_kind(&req.draft, &req.asset_ids)?;
		let asset_ids = dedup_ids(&req.asset_ids);

		for asset_id in asset_ids.iter().copied().chain(req.cover_asset_id) {
			self.require_asset(req.owner_id, asset_id).await?;
		}

		let album = self
			.stores
			.metadata
			.insert_album(&NewAlbum {
				owner_id: req.owner_id,
				name: name.to_string(),
				description: req.description.clone(),
				kind,
				cover_asset_id: req.cover_asset_id,
				asset_ids,
				now: OffsetDateTime::now_utc(),
			})
			.await?;

		tracing::info!(album_id = album.id, kind = album.kind.as_str(), "Album created.");

		Ok(album)
	}

	/// Reads an album. A smart album's count is the size of its live evaluation.
	pub async fn get_album(&self, owner_id: i64, album_id: i64) -> Result<Album> {
		let mut album = self
			.stores
			.metadata
			.get_album(owner_id, album_id)
			.await?
			.ok_or_else(|| Error::not_found("Album", album_id))?;

		if let Some(rules) = album.kind.rules() {
			album.asset_count = self.evaluate_parsed(owner_id, rules).await?.len() as i64;
		}

		Ok(album)
	}

	pub async fn review_suggestion(
		&self,
		owner_id: i64,
		album_id: i64,
		decision: ReviewDecision,
	) -> Result<Album> {
		let now = OffsetDateTime::now_utc();
		let reviewed = self
			.stores
			.metadata
			.set_review_status(owner_id, album_id, decision.status(), now)
			.await?;

		if let Some(album) = reviewed {
			tracing::info!(album_id, status = %decision.status(), "Suggestion reviewed.");

			return Ok(album);
		}

		match self.stores.metadata.get_album(owner_id, album_id).await? {
			None => Err(Error::not_found("Album", album_id)),
			Some(album) => Err(Error::InvalidRequest {
				message: format!(
					"Album {album_id} is a {} album, not a suggestion.",
					album.kind.as_str()
				),
			}),
		}
	}

	/// Evaluates a rule document against the owner's active READY assets.
	///
	/// A structurally invalid document fails with a validation error. A well-formed document with
	/// an unusable value, or one without any condition, matches nothing.
	pub async fn evaluate_smart_rules(&self, owner_id: i64, rules: &Value) -> Result<Vec<Asset>> {
		let rules = match SmartRules::parse(rules) {
			Ok(rules) => rules,
			Err(err @ zmage_domain::Error::InvalidRuleValue { .. }) => {
				tracing::warn!(error = %err, owner_id, "Rule document has an unusable value.");

				return Ok(Vec::new());
			},
			Err(err) => return Err(err.into()),
		};

		self.evaluate_parsed(owner_id, &rules).await
	}

	/// Live members of a stored smart album. Other album kinds evaluate to nothing.
	pub async fn evaluate_smart_album(&self, owner_id: i64, album_id: i64) -> Result<Vec<Asset>> {
		let album = self
			.stores
			.metadata
			.get_album(owner_id, album_id)
			.await?
			.ok_or_else(|| Error::not_found("Album", album_id))?;

		match album.kind.rules() {
			Some(rules) => self.evaluate_parsed(owner_id, rules).await,
			None => Ok(Vec::new()),
		}
	}

	async fn evaluate_parsed(&self, owner_id: i64, rules: &SmartRules) -> Result<Vec<Asset>> {
		if rules.is_empty() {
			return Ok(Vec::new());
		}

		let limit = i64::from(self.cfg.smart_rules.max_results);
		let mut assets = self.stores.metadata.evaluate_rules(owner_id, rules, limit).await?;

		assets.sort_by(|a, b| compare_rule_order(a.taken_at, a.id, b.taken_at, b.id));

		Ok(assets)
	}
}

fn album_kind(draft: &AlbumDraft, asset_ids: &[i64]) -> Result<AlbumKind> {
	match draft {
		AlbumDraft::Manual => Ok(AlbumKind::Manual),
		AlbumDraft::Smart { rules } => {
			let rules = SmartRules::parse(rules)?;

			if rules.is_empty() {
				return Err(Error::Validation {
					message: "A smart album needs at least one rule.".to_string(),
				});
			}
			if !asset_ids.is_empty() {
				return Err(Error::InvalidRequest {
					message: "Smart album members come from its rules; asset_ids must be empty."
						.to_string(),
				});
			}

			Ok(AlbumKind::Smart { rules })
		},
	}
}

fn dedup_ids(ids: &[i64]) -> Vec<i64> {
	let mut out = Vec::with_capacity(ids.len());

	for id in ids {
		if !out.contains(id) {
			out.push(*id);
		}
	}

	out
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn smart_drafts_are_validated_up_front() {
		let ok = AlbumDraft::Smart { rules: json!({ "tags": { "include": ["sunset"] } }) };
		let unknown = AlbumDraft::Smart { rules: json!({ "colour": "red" }) };
		let empty = AlbumDraft::Smart { rules: json!({}) };
		let unusable = AlbumDraft::Smart { rules: json!({ "asset_type": "photo" }) };

		assert!(matches!(album_kind(&ok, &[]), Ok(AlbumKind::Smart { .. })));
		assert!(matches!(album_kind(&unknown, &[]), Err(Error::Validation { .. })));
		assert!(matches!(album_kind(&unusable, &[]), Err(Error::Validation { .. })));
		assert!(matches!(album_kind(&empty, &[]), Err(Error::Validation { .. })));
		assert!(matches!(album_kind(&ok, &[1]), Err(Error::InvalidRequest { .. })));
	}

	#[test]
	fn request_parses_tagged_draft() {
		let req: CreateAlbumRequest = serde_json::from_value(json!({
			"owner_id": 1,
			"name": "Dusk",
			"album_type": "smart",
			"rules": { "camera_model": "X100V" }
		}))
		.expect("Failed to parse request.");

		assert_eq!(req.draft, AlbumDraft::Smart { rules: json!({ "camera_model": "X100V" }) });
		assert!(req.asset_ids.is_empty());
	}

	#[test]
	fn member_ids_keep_first_occurrence() {
		assert_eq!(dedup_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
	}
}
