//! Hybrid retrieval over the metadata store and the vector index.
//!
//! Semantic mode asks the index for an oversampled candidate set, then re-reads the candidates
//! from the metadata store under the caller's visibility scope and filters. Survivors keep the
//! index similarity order; `total` counts survivors only and is therefore bounded by the
//! candidate count.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result, ZmageService};
use zmage_domain::{
	asset::{AssetStatus, VisibilityScope},
	query::{AssetFilter, AssetQuery, SortField, SortOrder},
	vector::cmp_score_desc,
};
use zmage_providers::EmbeddingTask;
use zmage_storage::{
	models::Asset,
	qdrant::{VectorFilter, VectorHit},
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
	#[default]
	Keyword,
	Semantic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
	pub owner_id: i64,
	pub scope: VisibilityScope,
	#[serde(default)]
	pub query: Option<String>,
	#[serde(default)]
	pub mode: SearchMode,
	#[serde(default)]
	pub filter: AssetFilter,
	/// 1-based.
	#[serde(default = "first_page")]
	pub page: u32,
	#[serde(default)]
	pub page_size: Option<u32>,
	/// Keyword mode only. Semantic results are always ordered by similarity.
	#[serde(default)]
	pub sort: SortField,
	#[serde(default)]
	pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchItem {
	pub asset: Asset,
	/// Similarity score in semantic mode.
	pub score: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResponse {
	pub items: Vec<SearchItem>,
	pub total: i64,
	pub page: u32,
	pub page_size: u32,
	pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarItem {
	pub asset: Asset,
	pub score: f32,
}

impl ZmageService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
		let page_size = req.page_size.unwrap_or(self.cfg.search.default_page_size);

		if req.page == 0 {
			return Err(Error::InvalidRequest { message: "page must be at least 1.".to_string() });
		}
		if page_size == 0 || page_size > self.cfg.search.max_page_size {
			return Err(Error::InvalidRequest {
				message: format!(
					"page_size must be between 1 and {}.",
					self.cfg.search.max_page_size
				),
			});
		}

		let semantic_text = req.query.as_deref().map(str::trim).filter(|q| !q.is_empty());
		let (items, total) = match (req.mode, semantic_text) {
			(SearchMode::Semantic, Some(text)) => self.semantic_page(&req, text, page_size).await?,
			// Without a query there is nothing to embed, so the plain filtered listing is served.
			(SearchMode::Semantic, None) | (SearchMode::Keyword, _) =>
				self.keyword_page(&req, page_size).await?,
		};
		let has_more = i64::from(req.page) * i64::from(page_size) < total;

		Ok(SearchResponse { items, total, page: req.page, page_size, has_more })
	}

	/// Assets closest to the stored embedding of `asset_id`, never including the asset itself.
	/// An asset that has not been indexed yet has no neighbours.
	pub async fn find_similar(
		&self,
		owner_id: i64,
		asset_id: i64,
		limit: u32,
	) -> Result<Vec<SimilarItem>> {
		if limit == 0 || limit > self.cfg.search.max_page_size {
			return Err(Error::InvalidRequest {
				message: format!("limit must be between 1 and {}.", self.cfg.search.max_page_size),
			});
		}

		let reference = self.require_asset(owner_id, asset_id).await?;
		let Some(vector_id) = reference.vector_id else {
			return Ok(Vec::new());
		};
		let Some(embedding) =
			self.stores.vectors.fetch_embedding(vector_id).await.map_err(Error::vector_index)?
		else {
			tracing::warn!(asset_id, vector_id = %vector_id, "Indexed asset has no stored vector.");

			return Ok(Vec::new());
		};
		let filter = VectorFilter { exclude_asset_id: Some(asset_id), ..Default::default() };
		let hits = self
			.stores
			.vectors
			.search(embedding, self.candidate_limit(limit), &filter)
			.await
			.map_err(Error::vector_index)?;
		let rows = self
			.candidate_rows(owner_id, VisibilityScope::Active, &AssetFilter::default(), &hits)
			.await?;
		let mut ranked = rank_hits(hits, rows);

		ranked.retain(|(asset, _)| asset.id != asset_id);
		ranked.truncate(limit as usize);

		Ok(ranked.into_iter().map(|(asset, score)| SimilarItem { asset, score }).collect())
	}

	async fn keyword_page(
		&self,
		req: &SearchRequest,
		page_size: u32,
	) -> Result<(Vec<SearchItem>, i64)> {
		let query = AssetQuery {
			keyword: req.query.clone(),
			filter: req.filter.clone(),
			sort: req.sort,
			order: req.order,
			limit: Some(i64::from(page_size)),
			offset: i64::from(req.page - 1) * i64::from(page_size),
			..AssetQuery::new(req.owner_id, req.scope)
		};
		let (assets, total) = self.stores.metadata.search_assets(&query).await?;
		let items = assets.into_iter().map(|asset| SearchItem { asset, score: None }).collect();

		Ok((items, total))
	}

	async fn semantic_page(
		&self,
		req: &SearchRequest,
		text: &str,
		page_size: u32,
	) -> Result<(Vec<SearchItem>, i64)> {
		let embedding = self.embed_one(text.to_string(), EmbeddingTask::RetrievalQuery).await?;
		let filter = VectorFilter {
			asset_types: req.filter.asset_types.clone(),
			folder_id: req.filter.folder_id,
			exclude_asset_id: None,
		};
		let wanted = req.page.saturating_mul(page_size);
		let hits = self
			.stores
			.vectors
			.search(embedding, self.candidate_limit(wanted), &filter)
			.await
			.map_err(Error::vector_index)?;
		let candidate_count = hits.len();
		let rows = self.candidate_rows(req.owner_id, req.scope, &req.filter, &hits).await?;
		let ranked = rank_hits(hits, rows);
		let total = ranked.len() as i64;

		tracing::debug!(candidate_count, survivors = total, "Semantic candidates filtered.");

		let skip = (req.page as usize - 1).saturating_mul(page_size as usize);
		let items = ranked
			.into_iter()
			.skip(skip)
			.take(page_size as usize)
			.map(|(asset, score)| SearchItem { asset, score: Some(score) })
			.collect();

		Ok((items, total))
	}

	fn candidate_limit(&self, wanted: u32) -> u64 {
		let oversampled = u64::from(wanted) * u64::from(self.cfg.search.oversample_factor);

		oversampled.min(u64::from(self.cfg.search.max_candidates)).max(1)
	}

	/// Loads the READY rows behind a hit list under the given scope and filter.
	async fn candidate_rows(
		&self,
		owner_id: i64,
		scope: VisibilityScope,
		filter: &AssetFilter,
		hits: &[VectorHit],
	) -> Result<Vec<Asset>> {
		let mut seen = HashSet::with_capacity(hits.len());
		let ids: Vec<i64> =
			hits.iter().map(|hit| hit.asset_id).filter(|id| seen.insert(*id)).collect();

		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let query = AssetQuery {
			filter: filter.clone(),
			status: Some(AssetStatus::Ready),
			ids: Some(ids),
			..AssetQuery::new(owner_id, scope)
		};
		let (rows, _) = self.stores.metadata.search_assets(&query).await?;

		Ok(rows)
	}
}

/// Joins hits to rows and restores similarity order.
///
/// A hit survives only when its row still publishes the hit's vector id, which drops records a
/// reprocessing run has replaced. Each asset appears once, at its best-scoring hit.
fn rank_hits(hits: Vec<VectorHit>, rows: Vec<Asset>) -> Vec<(Asset, f32)> {
	let mut by_id: HashMap<i64, Asset> = rows.into_iter().map(|asset| (asset.id, asset)).collect();
	let mut ranked = Vec::with_capacity(by_id.len());

	for hit in hits {
		let current = by_id
			.get(&hit.asset_id)
			.is_some_and(|asset| asset.vector_id == Some(hit.vector_id));

		if !current {
			continue;
		}
		if let Some(asset) = by_id.remove(&hit.asset_id) {
			ranked.push((asset, hit.score));
		}
	}

	ranked.sort_by(|a, b| cmp_score_desc(a.1, b.1));

	ranked
}

fn first_page() -> u32 {
	1
}
