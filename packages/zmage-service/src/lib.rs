pub mod albums;
pub mod assets;
pub mod lifecycle;
pub mod reconcile;
pub mod search;
pub mod stores;

mod error;

pub use albums::{AlbumDraft, CreateAlbumRequest, ReviewDecision};
pub use assets::{EditRequest, IngestRequest, MediaMetadata};
pub use error::{Error, Result};
pub use reconcile::{CleanupReport, SuggestionReport};
pub use search::{SearchItem, SearchMode, SearchRequest, SearchResponse, SimilarItem};
pub use stores::{BlobStore, MetadataStore, Stores, VectorIndex};

use std::{future::Future, pin::Pin, sync::Arc};

use zmage_config::{Config, EmbeddingProviderConfig, LlmProviderConfig};
use zmage_providers::{
	AssetSummary, EmbeddingTask, GroupingSuggestion, ImageAnalysis, analysis, embedding,
	suggestion,
};
use zmage_storage::{blob::FsBlobStore, db::Db, models::Asset, qdrant::QdrantStore};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		task: EmbeddingTask,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>>;
}

pub trait AnalysisProvider
where
	Self: Send + Sync,
{
	fn analyze<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		bytes: &'a [u8],
		mime: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<ImageAnalysis>>;
}

pub trait SuggestionProvider
where
	Self: Send + Sync,
{
	fn suggest<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		assets: &'a [AssetSummary],
		existing_names: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<GroupingSuggestion>>>;
}

/// Decides whether the bytes an edit replaces are kept as a prior version.
pub trait VersionHistory
where
	Self: Send + Sync,
{
	/// Returns `true` when a version record now owns the asset's current blob, which must then
	/// survive the edit.
	fn retain_previous<'a>(&'a self, asset: &'a Asset) -> BoxFuture<'a, color_eyre::Result<bool>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub analysis: Arc<dyn AnalysisProvider>,
	pub suggestion: Arc<dyn SuggestionProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		analysis: Arc<dyn AnalysisProvider>,
		suggestion: Arc<dyn SuggestionProvider>,
	) -> Self {
		Self { embedding, analysis, suggestion }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), analysis: provider.clone(), suggestion: provider }
	}
}

/// Keeps no versions: replaced blobs are deleted after an edit commits.
pub struct NoVersionHistory;
impl VersionHistory for NoVersionHistory {
	fn retain_previous<'a>(&'a self, _asset: &'a Asset) -> BoxFuture<'a, color_eyre::Result<bool>> {
		Box::pin(async { Ok(false) })
	}
}

pub struct ZmageService {
	pub cfg: Config,
	pub stores: Stores,
	pub providers: Providers,
	pub versions: Arc<dyn VersionHistory>,
}
impl ZmageService {
	pub fn new(cfg: Config, db: Db, qdrant: QdrantStore, blobs: FsBlobStore) -> Self {
		let stores = Stores::new(Arc::new(db), Arc::new(blobs), Arc::new(qdrant));

		Self::with_stores(cfg, stores, Providers::default())
	}

	pub fn with_stores(cfg: Config, stores: Stores, providers: Providers) -> Self {
		Self { cfg, stores, providers, versions: Arc::new(NoVersionHistory) }
	}

	pub fn with_version_history(mut self, versions: Arc<dyn VersionHistory>) -> Self {
		self.versions = versions;

		self
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		task: EmbeddingTask,
	) -> BoxFuture<'a, color_eyre::Result<Vec<Vec<f32>>>> {
		Box::pin(embedding::embed(cfg, texts, task))
	}
}
impl AnalysisProvider for DefaultProviders {
	fn analyze<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		bytes: &'a [u8],
		mime: &'a str,
	) -> BoxFuture<'a, color_eyre::Result<ImageAnalysis>> {
		Box::pin(analysis::analyze_image(cfg, bytes, mime))
	}
}
impl SuggestionProvider for DefaultProviders {
	fn suggest<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		assets: &'a [AssetSummary],
		existing_names: &'a [String],
	) -> BoxFuture<'a, color_eyre::Result<Vec<GroupingSuggestion>>> {
		Box::pin(suggestion::suggest_groupings(cfg, assets, existing_names))
	}
}
