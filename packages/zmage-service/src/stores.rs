//! Store collaborators. The engine only talks to the metadata store, the blob store and the
//! vector index through these traits, so each can be replaced by a fake in tests.

use std::sync::Arc;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::BoxFuture;
use zmage_domain::{
	album::ReviewStatus,
	asset::AssetStatus,
	query::AssetQuery,
	rules::SmartRules,
	task::TaskKind,
	vector::VectorPayload,
};
use zmage_storage::{
	Result as StorageResult, albums, assets,
	blob::FsBlobStore,
	db::Db,
	models::{
		Album, Asset, ContentUpdate, DerivedFields, NewAlbum, NewAsset, Task, TaskUpdate,
		VectorLink,
	},
	qdrant::{QdrantStore, VectorFilter, VectorHit, VectorRef},
	tasks,
};

/// The relational source of truth. Every cross-store operation ends with a write here.
pub trait MetadataStore
where
	Self: Send + Sync,
{
	fn insert_asset<'a>(&'a self, asset: &'a NewAsset) -> BoxFuture<'a, StorageResult<Asset>>;

	fn get_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn find_by_hash<'a>(
		&'a self,
		owner_id: i64,
		content_hash: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn claim_processing<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		claimable: &'a [AssetStatus],
		run_id: Uuid,
		now: OffsetDateTime,
		stale_before: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn complete_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		derived: &'a DerivedFields,
		vector_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn fail_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>>;

	fn reset_for_retry<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn replace_content<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		update: &'a ContentUpdate,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn set_deleted<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		deleted: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn set_private<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		is_private: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>>;

	fn delete_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<bool>>;

	fn search_assets<'a>(
		&'a self,
		query: &'a AssetQuery,
	) -> BoxFuture<'a, StorageResult<(Vec<Asset>, i64)>>;

	fn evaluate_rules<'a>(
		&'a self,
		owner_id: i64,
		rules: &'a SmartRules,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>>;

	fn owners_with_recent_assets<'a>(
		&'a self,
		since: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Vec<i64>>>;

	fn recent_ready_assets<'a>(
		&'a self,
		owner_id: i64,
		since: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>>;

	/// Pages through expired trash by the `(deleted_at, id)` key of the last row seen.
	fn trashed_before<'a>(
		&'a self,
		cutoff: OffsetDateTime,
		after: Option<(OffsetDateTime, i64)>,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>>;

	fn vector_links<'a>(
		&'a self,
		asset_ids: &'a [i64],
	) -> BoxFuture<'a, StorageResult<Vec<VectorLink>>>;

	fn insert_album<'a>(&'a self, album: &'a NewAlbum) -> BoxFuture<'a, StorageResult<Album>>;

	fn get_album<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Album>>>;

	fn album_names<'a>(&'a self, owner_id: i64) -> BoxFuture<'a, StorageResult<Vec<String>>>;

	fn set_review_status<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
		status: ReviewStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Album>>>;

	fn purge_ignored_suggestions<'a>(
		&'a self,
		cutoff: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<u64>>;

	fn sweep_orphan_associations<'a>(&'a self, batch: i64) -> BoxFuture<'a, StorageResult<u64>>;

	fn create_task<'a>(
		&'a self,
		owner_id: Option<i64>,
		kind: TaskKind,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Task>>;

	fn update_task<'a>(
		&'a self,
		task_id: i64,
		update: &'a TaskUpdate,
	) -> BoxFuture<'a, StorageResult<Option<Task>>>;

	fn get_task<'a>(&'a self, task_id: i64) -> BoxFuture<'a, StorageResult<Option<Task>>>;
}

pub trait BlobStore
where
	Self: Send + Sync,
{
	fn put<'a>(
		&'a self,
		path: &'a str,
		bytes: &'a [u8],
		content_type: &'a str,
	) -> BoxFuture<'a, StorageResult<()>>;

	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<Vec<u8>>>;

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>>;

	fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>>;
}

/// Nearest-neighbour index over unit-length embeddings, keyed by vector id.
pub trait VectorIndex
where
	Self: Send + Sync,
{
	fn upsert<'a>(
		&'a self,
		vector_id: Uuid,
		embedding: Vec<f32>,
		payload: &'a VectorPayload,
	) -> BoxFuture<'a, StorageResult<()>>;

	fn delete<'a>(&'a self, vector_id: Uuid) -> BoxFuture<'a, StorageResult<()>>;

	/// Hits ordered by descending similarity.
	fn search<'a>(
		&'a self,
		embedding: Vec<f32>,
		limit: u64,
		filter: &'a VectorFilter,
	) -> BoxFuture<'a, StorageResult<Vec<VectorHit>>>;

	fn fetch_embedding<'a>(
		&'a self,
		vector_id: Uuid,
	) -> BoxFuture<'a, StorageResult<Option<Vec<f32>>>>;

	fn scroll<'a>(
		&'a self,
		offset: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, StorageResult<(Vec<VectorRef>, Option<Uuid>)>>;
}

#[derive(Clone)]
pub struct Stores {
	pub metadata: Arc<dyn MetadataStore>,
	pub blobs: Arc<dyn BlobStore>,
	pub vectors: Arc<dyn VectorIndex>,
}
impl Stores {
	pub fn new(
		metadata: Arc<dyn MetadataStore>,
		blobs: Arc<dyn BlobStore>,
		vectors: Arc<dyn VectorIndex>,
	) -> Self {
		Self { metadata, blobs, vectors }
	}
}

impl MetadataStore for Db {
	fn insert_asset<'a>(&'a self, asset: &'a NewAsset) -> BoxFuture<'a, StorageResult<Asset>> {
		Box::pin(assets::insert_asset(self, asset))
	}

	fn get_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::get_asset(self, owner_id, asset_id))
	}

	fn find_by_hash<'a>(
		&'a self,
		owner_id: i64,
		content_hash: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::find_by_hash(self, owner_id, content_hash))
	}

	fn claim_processing<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		claimable: &'a [AssetStatus],
		run_id: Uuid,
		now: OffsetDateTime,
		stale_before: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::claim_processing(
			self,
			owner_id,
			asset_id,
			claimable,
			run_id,
			now,
			stale_before,
		))
	}

	fn complete_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		derived: &'a DerivedFields,
		vector_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::complete_processing(self, asset_id, run_id, derived, vector_id, now))
	}

	fn fail_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(assets::fail_processing(self, asset_id, run_id, message, now))
	}

	fn reset_for_retry<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::reset_for_retry(self, owner_id, asset_id, now))
	}

	fn replace_content<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		update: &'a ContentUpdate,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::replace_content(self, owner_id, asset_id, update, now))
	}

	fn set_deleted<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		deleted: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::set_deleted(self, owner_id, asset_id, deleted, now))
	}

	fn set_private<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		is_private: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		Box::pin(assets::set_private(self, owner_id, asset_id, is_private, now))
	}

	fn delete_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(assets::delete_asset(self, owner_id, asset_id))
	}

	fn search_assets<'a>(
		&'a self,
		query: &'a AssetQuery,
	) -> BoxFuture<'a, StorageResult<(Vec<Asset>, i64)>> {
		Box::pin(assets::search_assets(self, query))
	}

	fn evaluate_rules<'a>(
		&'a self,
		owner_id: i64,
		rules: &'a SmartRules,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		Box::pin(assets::evaluate_rules(self, owner_id, rules, limit))
	}

	fn owners_with_recent_assets<'a>(
		&'a self,
		since: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Vec<i64>>> {
		Box::pin(assets::owners_with_recent_assets(self, since))
	}

	fn recent_ready_assets<'a>(
		&'a self,
		owner_id: i64,
		since: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		Box::pin(assets::recent_ready_assets(self, owner_id, since, limit))
	}

	fn trashed_before<'a>(
		&'a self,
		cutoff: OffsetDateTime,
		after: Option<(OffsetDateTime, i64)>,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		Box::pin(assets::trashed_before(self, cutoff, after, limit))
	}

	fn vector_links<'a>(
		&'a self,
		asset_ids: &'a [i64],
	) -> BoxFuture<'a, StorageResult<Vec<VectorLink>>> {
		Box::pin(assets::vector_links(self, asset_ids))
	}

	fn insert_album<'a>(&'a self, album: &'a NewAlbum) -> BoxFuture<'a, StorageResult<Album>> {
		Box::pin(albums::insert_album(self, album))
	}

	fn get_album<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Album>>> {
		Box::pin(albums::get_album(self, owner_id, album_id))
	}

	fn album_names<'a>(&'a self, owner_id: i64) -> BoxFuture<'a, StorageResult<Vec<String>>> {
		Box::pin(albums::album_names(self, owner_id))
	}

	fn set_review_status<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
		status: ReviewStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Album>>> {
		Box::pin(albums::set_review_status(self, owner_id, album_id, status, now))
	}

	fn purge_ignored_suggestions<'a>(
		&'a self,
		cutoff: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<u64>> {
		Box::pin(albums::purge_ignored_suggestions(self, cutoff))
	}

	fn sweep_orphan_associations<'a>(&'a self, batch: i64) -> BoxFuture<'a, StorageResult<u64>> {
		Box::pin(albums::sweep_orphan_associations(self, batch))
	}

	fn create_task<'a>(
		&'a self,
		owner_id: Option<i64>,
		kind: TaskKind,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Task>> {
		Box::pin(tasks::create_task(self, owner_id, kind, now))
	}

	fn update_task<'a>(
		&'a self,
		task_id: i64,
		update: &'a TaskUpdate,
	) -> BoxFuture<'a, StorageResult<Option<Task>>> {
		Box::pin(tasks::update_task(self, task_id, update))
	}

	fn get_task<'a>(&'a self, task_id: i64) -> BoxFuture<'a, StorageResult<Option<Task>>> {
		Box::pin(tasks::get_task(self, task_id))
	}
}

impl BlobStore for FsBlobStore {
	fn put<'a>(
		&'a self,
		path: &'a str,
		bytes: &'a [u8],
		content_type: &'a str,
	) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(FsBlobStore::put(self, path, bytes, content_type))
	}

	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<Vec<u8>>> {
		Box::pin(FsBlobStore::get(self, path))
	}

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(FsBlobStore::delete(self, path))
	}

	fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		Box::pin(FsBlobStore::exists(self, path))
	}
}

impl VectorIndex for QdrantStore {
	fn upsert<'a>(
		&'a self,
		vector_id: Uuid,
		embedding: Vec<f32>,
		payload: &'a VectorPayload,
	) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(QdrantStore::upsert(self, vector_id, embedding, payload))
	}

	fn delete<'a>(&'a self, vector_id: Uuid) -> BoxFuture<'a, StorageResult<()>> {
		Box::pin(QdrantStore::delete(self, vector_id))
	}

	fn search<'a>(
		&'a self,
		embedding: Vec<f32>,
		limit: u64,
		filter: &'a VectorFilter,
	) -> BoxFuture<'a, StorageResult<Vec<VectorHit>>> {
		Box::pin(QdrantStore::search(self, embedding, limit, filter))
	}

	fn fetch_embedding<'a>(
		&'a self,
		vector_id: Uuid,
	) -> BoxFuture<'a, StorageResult<Option<Vec<f32>>>> {
		Box::pin(QdrantStore::fetch_embedding(self, vector_id))
	}

	fn scroll<'a>(
		&'a self,
		offset: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, StorageResult<(Vec<VectorRef>, Option<Uuid>)>> {
		Box::pin(QdrantStore::scroll(self, offset, limit))
	}
}
