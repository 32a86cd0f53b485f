//! In-memory stores with the same observable semantics as the Postgres, filesystem and Qdrant
//! backends: unique content hashes per owner, claim fencing on the processing run id, the
//! visibility partition, and task transition rules.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, BTreeSet, HashMap, HashSet},
	future, io,
	sync::{
		Mutex, MutexGuard,
		atomic::{AtomicBool, Ordering as AtomicOrdering},
	},
};

use time::OffsetDateTime;
use uuid::Uuid;

use zmage_domain::{
	album::{AlbumKind, ReviewStatus},
	asset::AssetStatus,
	query::{AssetQuery, SortField, SortOrder, keyword_matches},
	rules::{SmartRules, compare_rule_order},
	task::{TaskKind, TaskStatus, clamp_progress},
	vector::{VectorPayload, cmp_score_desc, cosine},
};
use zmage_service::{BlobStore, BoxFuture, MetadataStore, VectorIndex};
use zmage_storage::{
	Error as StorageError, Result as StorageResult,
	models::{
		Album, Asset, ContentUpdate, DerivedFields, NewAlbum, NewAsset, Task, TaskUpdate,
		VectorLink,
	},
	qdrant::{VectorFilter, VectorHit, VectorRef},
};

const DUPLICATE_CONTENT: &str = "An asset with identical content already exists.";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}

fn ready<'a, T>(value: T) -> BoxFuture<'a, T>
where
	T: Send + 'a,
{
	Box::pin(future::ready(value))
}

fn injected(path: String) -> StorageError {
	StorageError::Io { path, source: io::Error::other("injected failure") }
}

#[derive(Debug, Clone)]
struct StoredAlbum {
	album: Album,
	members: Vec<i64>,
}

#[derive(Debug, Default)]
struct MetadataState {
	last_asset_id: i64,
	assets: BTreeMap<i64, Asset>,
	last_album_id: i64,
	albums: BTreeMap<i64, StoredAlbum>,
	collection_members: Vec<(i64, i64)>,
	last_task_id: i64,
	tasks: BTreeMap<i64, Task>,
}
impl MetadataState {
	fn owned_mut(&mut self, owner_id: i64, asset_id: i64) -> Option<&mut Asset> {
		self.assets.get_mut(&asset_id).filter(|asset| asset.owner_id == owner_id)
	}

	fn hash_taken(&self, owner_id: i64, content_hash: &str, except: Option<i64>) -> bool {
		self.assets.values().any(|asset| {
			asset.owner_id == owner_id
				&& asset.content_hash == content_hash
				&& Some(asset.id) != except
		})
	}

	fn album_view(&self, stored: &StoredAlbum) -> Album {
		let live = stored
			.members
			.iter()
			.filter(|id| {
				self.assets
					.get(id)
					.is_some_and(|asset| asset.deleted_at.is_none() && !asset.is_private)
			})
			.count();

		Album { asset_count: live as i64, ..stored.album.clone() }
	}
}

/// Metadata store backed by ordered maps behind one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
	state: Mutex<MetadataState>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn asset(&self, asset_id: i64) -> Option<Asset> {
		locked(&self.state).assets.get(&asset_id).cloned()
	}

	pub fn asset_count(&self) -> usize {
		locked(&self.state).assets.len()
	}

	pub fn albums(&self, owner_id: i64) -> Vec<Album> {
		let state = locked(&self.state);

		state
			.albums
			.values()
			.filter(|stored| stored.album.owner_id == owner_id)
			.map(|stored| state.album_view(stored))
			.collect()
	}

	/// Member ids in insertion order, including members that are no longer live.
	pub fn album_members(&self, album_id: i64) -> Vec<i64> {
		locked(&self.state)
			.albums
			.get(&album_id)
			.map(|stored| stored.members.clone())
			.unwrap_or_default()
	}

	/// Adds a membership row directly, bypassing existence checks like a stale association would.
	pub fn add_album_member(&self, album_id: i64, asset_id: i64) {
		if let Some(stored) = locked(&self.state).albums.get_mut(&album_id)
			&& !stored.members.contains(&asset_id)
		{
			stored.members.push(asset_id);
		}
	}

	pub fn add_collection_member(&self, collection_id: i64, asset_id: i64) {
		locked(&self.state).collection_members.push((collection_id, asset_id));
	}

	pub fn collection_member_count(&self) -> usize {
		locked(&self.state).collection_members.len()
	}

	pub fn tasks(&self) -> Vec<Task> {
		locked(&self.state).tasks.values().cloned().collect()
	}

	/// Rewrites the start of an in-flight processing claim, e.g. to make it look abandoned.
	pub fn set_processing_started_at(&self, asset_id: i64, started_at: OffsetDateTime) {
		if let Some(asset) = locked(&self.state).assets.get_mut(&asset_id) {
			asset.processing_started_at = Some(started_at);
		}
	}
}

impl MetadataStore for MemoryStore {
	fn insert_asset<'a>(&'a self, new: &'a NewAsset) -> BoxFuture<'a, StorageResult<Asset>> {
		let mut state = locked(&self.state);

		if state.hash_taken(new.owner_id, &new.content_hash, None) {
			return ready(Err(StorageError::Conflict(DUPLICATE_CONTENT.to_string())));
		}

		state.last_asset_id += 1;

		let asset = Asset {
			id: state.last_asset_id,
			owner_id: new.owner_id,
			filename: new.filename.clone(),
			original_filename: new.original_filename.clone(),
			file_path: new.file_path.clone(),
			thumbnail_path: new.thumbnail_path.clone(),
			file_size: new.file_size,
			mime_type: new.mime_type.clone(),
			asset_type: new.asset_type,
			content_hash: new.content_hash.clone(),
			title: None,
			description: None,
			tags: Vec::new(),
			ocr_text: None,
			taken_at: new.taken_at,
			camera_model: new.camera_model.clone(),
			latitude: new.latitude,
			longitude: new.longitude,
			width: new.width,
			height: new.height,
			folder_id: new.folder_id,
			status: AssetStatus::Pending,
			error_message: None,
			vector_id: None,
			processing_run_id: None,
			processing_started_at: None,
			processed_at: None,
			is_private: new.is_private,
			created_at: new.now,
			updated_at: new.now,
			deleted_at: None,
		};

		state.assets.insert(asset.id, asset.clone());

		ready(Ok(asset))
	}

	fn get_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);

		ready(Ok(state.owned_mut(owner_id, asset_id).cloned()))
	}

	fn find_by_hash<'a>(
		&'a self,
		owner_id: i64,
		content_hash: &'a str,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let state = locked(&self.state);
		let found = state
			.assets
			.values()
			.find(|asset| asset.owner_id == owner_id && asset.content_hash == content_hash)
			.cloned();

		ready(Ok(found))
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
		let mut state = locked(&self.state);
		let claimed = state.owned_mut(owner_id, asset_id).and_then(|asset| {
			let abandoned = asset.status == AssetStatus::Processing
				&& asset.processing_started_at.is_some_and(|started| started < stale_before);

			if !claimable.contains(&asset.status) && !abandoned {
				return None;
			}

			asset.status = AssetStatus::Processing;
			asset.processing_run_id = Some(run_id);
			asset.processing_started_at = Some(now);
			asset.error_message = None;
			asset.updated_at = now;

			Some(asset.clone())
		});

		ready(Ok(claimed))
	}

	fn complete_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		derived: &'a DerivedFields,
		vector_id: Uuid,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);
		let committed = state
			.assets
			.get_mut(&asset_id)
			.filter(|asset| {
				asset.status == AssetStatus::Processing && asset.processing_run_id == Some(run_id)
			})
			.map(|asset| {
				asset.status = AssetStatus::Ready;
				asset.title = derived.title.clone();
				asset.description = derived.description.clone();
				asset.tags = derived.tags.clone();
				asset.ocr_text = derived.ocr_text.clone();
				asset.vector_id = Some(vector_id);
				asset.processed_at = Some(now);
				asset.updated_at = now;
				asset.error_message = None;
				asset.processing_run_id = None;

				asset.clone()
			});

		ready(Ok(committed))
	}

	fn fail_processing<'a>(
		&'a self,
		asset_id: i64,
		run_id: Uuid,
		message: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<bool>> {
		let mut state = locked(&self.state);
		let recorded = match state.assets.get_mut(&asset_id) {
			Some(asset)
				if asset.status == AssetStatus::Processing
					&& asset.processing_run_id == Some(run_id) =>
			{
				asset.status = AssetStatus::Failed;
				asset.error_message = Some(message.to_string());
				asset.processing_run_id = None;
				asset.updated_at = now;

				true
			},
			_ => false,
		};

		ready(Ok(recorded))
	}

	fn reset_for_retry<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);
		let reset = state
			.owned_mut(owner_id, asset_id)
			.filter(|asset| asset.status == AssetStatus::Failed)
			.map(|asset| {
				asset.status = AssetStatus::Pending;
				asset.error_message = None;
				asset.processing_run_id = None;
				asset.processing_started_at = None;
				asset.processed_at = None;
				asset.updated_at = now;

				asset.clone()
			});

		ready(Ok(reset))
	}

	fn replace_content<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		update: &'a ContentUpdate,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);

		if state.hash_taken(owner_id, &update.content_hash, Some(asset_id)) {
			return ready(Err(StorageError::Conflict(DUPLICATE_CONTENT.to_string())));
		}

		let replaced = state
			.owned_mut(owner_id, asset_id)
			.filter(|asset| asset.status != AssetStatus::Processing)
			.map(|asset| {
				asset.file_path = update.file_path.clone();
				asset.thumbnail_path = update.thumbnail_path.clone();
				asset.file_size = update.file_size;
				asset.mime_type = update.mime_type.clone();
				asset.asset_type = update.asset_type;
				asset.content_hash = update.content_hash.clone();
				asset.width = update.width;
				asset.height = update.height;
				asset.updated_at = now;

				asset.clone()
			});

		ready(Ok(replaced))
	}

	fn set_deleted<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		deleted: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);
		let updated = state.owned_mut(owner_id, asset_id).map(|asset| {
			asset.deleted_at = if deleted { Some(asset.deleted_at.unwrap_or(now)) } else { None };
			asset.updated_at = now;

			asset.clone()
		});

		ready(Ok(updated))
	}

	fn set_private<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
		is_private: bool,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Asset>>> {
		let mut state = locked(&self.state);
		let updated = state.owned_mut(owner_id, asset_id).map(|asset| {
			asset.is_private = is_private;
			asset.updated_at = now;

			asset.clone()
		});

		ready(Ok(updated))
	}

	fn delete_asset<'a>(
		&'a self,
		owner_id: i64,
		asset_id: i64,
	) -> BoxFuture<'a, StorageResult<bool>> {
		let mut state = locked(&self.state);
		let owned = state.owned_mut(owner_id, asset_id).is_some();

		if owned {
			state.assets.remove(&asset_id);
		}

		ready(Ok(owned))
	}

	fn search_assets<'a>(
		&'a self,
		query: &'a AssetQuery,
	) -> BoxFuture<'a, StorageResult<(Vec<Asset>, i64)>> {
		let state = locked(&self.state);
		let mut matched: Vec<Asset> =
			state.assets.values().filter(|asset| matches_query(asset, query)).cloned().collect();
		let total = matched.len() as i64;

		matched.sort_by(|a, b| compare_listing(query.sort, query.order, a, b));

		let page: Vec<Asset> = matched
			.into_iter()
			.skip(query.offset.max(0) as usize)
			.take(query.limit.map_or(usize::MAX, |limit| limit.max(0) as usize))
			.collect();

		ready(Ok((page, total)))
	}

	fn evaluate_rules<'a>(
		&'a self,
		owner_id: i64,
		rules: &'a SmartRules,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		let state = locked(&self.state);
		let mut matched: Vec<Asset> = state
			.assets
			.values()
			.filter(|asset| {
				asset.owner_id == owner_id
					&& is_live_ready(asset)
					&& rules.matches(&asset.rule_subject())
			})
			.cloned()
			.collect();

		matched.sort_by(|a, b| compare_rule_order(a.taken_at, a.id, b.taken_at, b.id));
		matched.truncate(limit.max(0) as usize);

		ready(Ok(matched))
	}

	fn owners_with_recent_assets<'a>(
		&'a self,
		since: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Vec<i64>>> {
		let state = locked(&self.state);
		let owners: Vec<i64> = state
			.assets
			.values()
			.filter(|asset| is_live_ready(asset) && asset.created_at >= since)
			.map(|asset| asset.owner_id)
			.collect::<BTreeSet<_>>()
			.into_iter()
			.collect();

		ready(Ok(owners))
	}

	fn recent_ready_assets<'a>(
		&'a self,
		owner_id: i64,
		since: OffsetDateTime,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		let state = locked(&self.state);
		let mut recent: Vec<Asset> = state
			.assets
			.values()
			.filter(|asset| {
				asset.owner_id == owner_id && is_live_ready(asset) && asset.created_at >= since
			})
			.cloned()
			.collect();

		recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
		recent.truncate(limit.max(0) as usize);

		ready(Ok(recent))
	}

	fn trashed_before<'a>(
		&'a self,
		cutoff: OffsetDateTime,
		after: Option<(OffsetDateTime, i64)>,
		limit: i64,
	) -> BoxFuture<'a, StorageResult<Vec<Asset>>> {
		let state = locked(&self.state);
		let mut trashed: Vec<Asset> = state
			.assets
			.values()
			.filter(|asset| match asset.deleted_at {
				Some(at) => at < cutoff && after.is_none_or(|key| (at, asset.id) > key),
				None => false,
			})
			.cloned()
			.collect();

		trashed.sort_by(|a, b| a.deleted_at.cmp(&b.deleted_at).then_with(|| a.id.cmp(&b.id)));
		trashed.truncate(limit.max(0) as usize);

		ready(Ok(trashed))
	}

	fn vector_links<'a>(
		&'a self,
		asset_ids: &'a [i64],
	) -> BoxFuture<'a, StorageResult<Vec<VectorLink>>> {
		let state = locked(&self.state);
		let links = asset_ids
			.iter()
			.filter_map(|id| state.assets.get(id))
			.map(|asset| VectorLink {
				id: asset.id,
				vector_id: asset.vector_id,
				status: asset.status,
			})
			.collect();

		ready(Ok(links))
	}

	fn insert_album<'a>(&'a self, new: &'a NewAlbum) -> BoxFuture<'a, StorageResult<Album>> {
		let mut state = locked(&self.state);

		state.last_album_id += 1;

		let mut members: Vec<i64> = Vec::with_capacity(new.asset_ids.len());

		for id in &new.asset_ids {
			if !members.contains(id) {
				members.push(*id);
			}
		}

		let stored = StoredAlbum {
			album: Album {
				id: state.last_album_id,
				owner_id: new.owner_id,
				name: new.name.clone(),
				description: new.description.clone(),
				kind: new.kind.clone(),
				cover_asset_id: new.cover_asset_id,
				created_at: new.now,
				updated_at: new.now,
				asset_count: 0,
			},
			members,
		};
		let album = state.album_view(&stored);

		state.albums.insert(album.id, stored);

		ready(Ok(album))
	}

	fn get_album<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
	) -> BoxFuture<'a, StorageResult<Option<Album>>> {
		let state = locked(&self.state);
		let album = state
			.albums
			.get(&album_id)
			.filter(|stored| stored.album.owner_id == owner_id)
			.map(|stored| state.album_view(stored));

		ready(Ok(album))
	}

	fn album_names<'a>(&'a self, owner_id: i64) -> BoxFuture<'a, StorageResult<Vec<String>>> {
		let state = locked(&self.state);
		let names = state
			.albums
			.values()
			.filter(|stored| stored.album.owner_id == owner_id)
			.map(|stored| stored.album.name.clone())
			.collect();

		ready(Ok(names))
	}

	fn set_review_status<'a>(
		&'a self,
		owner_id: i64,
		album_id: i64,
		status: ReviewStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Option<Album>>> {
		let mut state = locked(&self.state);
		let reviewed = match state.albums.get_mut(&album_id) {
			Some(stored) if stored.album.owner_id == owner_id => match &mut stored.album.kind {
				AlbumKind::Suggested { status: current, .. } => {
					*current = status;
					stored.album.updated_at = now;

					true
				},
				_ => false,
			},
			_ => false,
		};
		let album = if reviewed {
			state.albums.get(&album_id).map(|stored| state.album_view(stored))
		} else {
			None
		};

		ready(Ok(album))
	}

	fn purge_ignored_suggestions<'a>(
		&'a self,
		cutoff: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<u64>> {
		let mut state = locked(&self.state);
		let before = state.albums.len();

		state.albums.retain(|_, stored| {
			!(stored.album.kind.review_status() == Some(ReviewStatus::Ignored)
				&& stored.album.updated_at < cutoff)
		});

		ready(Ok((before - state.albums.len()) as u64))
	}

	fn sweep_orphan_associations<'a>(&'a self, _batch: i64) -> BoxFuture<'a, StorageResult<u64>> {
		let mut state = locked(&self.state);
		let live: HashSet<i64> = state.assets.keys().copied().collect();
		let mut removed = 0_u64;

		for stored in state.albums.values_mut() {
			let before = stored.members.len();

			stored.members.retain(|id| live.contains(id));

			removed += (before - stored.members.len()) as u64;
		}

		let before = state.collection_members.len();

		state.collection_members.retain(|(_, asset_id)| live.contains(asset_id));

		removed += (before - state.collection_members.len()) as u64;

		ready(Ok(removed))
	}

	fn create_task<'a>(
		&'a self,
		owner_id: Option<i64>,
		kind: TaskKind,
		now: OffsetDateTime,
	) -> BoxFuture<'a, StorageResult<Task>> {
		let mut state = locked(&self.state);

		state.last_task_id += 1;

		let task = Task {
			id: state.last_task_id,
			owner_id,
			kind,
			status: TaskStatus::Pending,
			progress: 0,
			result: None,
			error_message: None,
			created_at: now,
			started_at: None,
			completed_at: None,
		};

		state.tasks.insert(task.id, task.clone());

		ready(Ok(task))
	}

	fn update_task<'a>(
		&'a self,
		task_id: i64,
		update: &'a TaskUpdate,
	) -> BoxFuture<'a, StorageResult<Option<Task>>> {
		let mut state = locked(&self.state);
		let updated = state
			.tasks
			.get_mut(&task_id)
			.filter(|task| task.status.can_transition_to(update.status))
			.map(|task| {
				task.status = update.status;
				task.progress = clamp_progress(update.progress);
				task.result = update.result.clone().or_else(|| task.result.take());
				task.error_message = update.error_message.clone();

				if update.status == TaskStatus::Running && task.started_at.is_none() {
					task.started_at = Some(update.now);
				}

				task.completed_at = update.status.is_terminal().then_some(update.now);

				task.clone()
			});

		ready(Ok(updated))
	}

	fn get_task<'a>(&'a self, task_id: i64) -> BoxFuture<'a, StorageResult<Option<Task>>> {
		ready(Ok(locked(&self.state).tasks.get(&task_id).cloned()))
	}
}

fn is_live_ready(asset: &Asset) -> bool {
	asset.status == AssetStatus::Ready && asset.deleted_at.is_none() && !asset.is_private
}

fn matches_query(asset: &Asset, query: &AssetQuery) -> bool {
	asset.owner_id == query.owner_id
		&& query.scope.admits(asset.deleted_at.is_some(), asset.is_private)
		&& query
			.keyword()
			.is_none_or(|keyword| keyword_matches(keyword, &asset.keyword_fields(), &asset.tags))
		&& query.filter.matches(&asset.filter_subject())
		&& query.status.is_none_or(|status| asset.status == status)
		&& query.ids.as_ref().is_none_or(|ids| ids.contains(&asset.id))
}

/// `{column} {order} NULLS LAST, created_at DESC, id DESC`.
fn compare_listing(sort: SortField, order: SortOrder, a: &Asset, b: &Asset) -> Ordering {
	let primary = match sort {
		SortField::CreatedAt => nulls_last(Some(a.created_at), Some(b.created_at), order),
		SortField::UpdatedAt => nulls_last(Some(a.updated_at), Some(b.updated_at), order),
		SortField::TakenAt => nulls_last(a.taken_at, b.taken_at, order),
		SortField::OriginalFilename =>
			nulls_last(Some(&a.original_filename), Some(&b.original_filename), order),
		SortField::FileSize => nulls_last(Some(a.file_size), Some(b.file_size), order),
		SortField::Title => nulls_last(a.title.as_ref(), b.title.as_ref(), order),
	};

	primary.then_with(|| b.created_at.cmp(&a.created_at)).then_with(|| b.id.cmp(&a.id))
}

fn nulls_last<T: Ord>(a: Option<T>, b: Option<T>, order: SortOrder) -> Ordering {
	match (a, b) {
		(Some(a), Some(b)) => match order {
			SortOrder::Asc => a.cmp(&b),
			SortOrder::Desc => b.cmp(&a),
		},
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	}
}

#[derive(Debug)]
struct StoredBlob {
	bytes: Vec<u8>,
	content_type: String,
}

/// Object store held in a map. Failures can be switched on per operation, and deletes can also
/// be made to fail for single paths.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
	objects: Mutex<HashMap<String, StoredBlob>>,
	undeletable: Mutex<HashSet<String>>,
	pub fail_puts: AtomicBool,
	pub fail_gets: AtomicBool,
	pub fail_deletes: AtomicBool,
}
impl MemoryBlobStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn contains(&self, path: &str) -> bool {
		locked(&self.objects).contains_key(path)
	}

	pub fn content_type(&self, path: &str) -> Option<String> {
		locked(&self.objects).get(path).map(|blob| blob.content_type.clone())
	}

	/// Drops an object behind the engine's back.
	pub fn remove(&self, path: &str) -> bool {
		locked(&self.objects).remove(path).is_some()
	}

	pub fn fail_deletes_of(&self, path: &str) {
		locked(&self.undeletable).insert(path.to_string());
	}

	pub fn len(&self) -> usize {
		locked(&self.objects).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
impl BlobStore for MemoryBlobStore {
	fn put<'a>(
		&'a self,
		path: &'a str,
		bytes: &'a [u8],
		content_type: &'a str,
	) -> BoxFuture<'a, StorageResult<()>> {
		if self.fail_puts.load(AtomicOrdering::SeqCst) {
			return ready(Err(injected(path.to_string())));
		}

		let blob = StoredBlob { bytes: bytes.to_vec(), content_type: content_type.to_string() };

		locked(&self.objects).insert(path.to_string(), blob);

		ready(Ok(()))
	}

	fn get<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<Vec<u8>>> {
		if self.fail_gets.load(AtomicOrdering::SeqCst) {
			return ready(Err(injected(path.to_string())));
		}

		let found = locked(&self.objects)
			.get(path)
			.map(|blob| blob.bytes.clone())
			.ok_or_else(|| StorageError::NotFound(format!("Blob {path:?} does not exist.")));

		ready(found)
	}

	fn delete<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		let blocked = self.fail_deletes.load(AtomicOrdering::SeqCst)
			|| locked(&self.undeletable).contains(path);

		if blocked {
			return ready(Err(injected(path.to_string())));
		}

		ready(Ok(self.remove(path)))
	}

	fn exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, StorageResult<bool>> {
		ready(Ok(self.contains(path)))
	}
}

/// Exact cosine search over every stored record. Records are kept in id order so paging is
/// stable, matching the index's scroll contract.
#[derive(Debug)]
pub struct MemoryVectorIndex {
	dim: usize,
	records: Mutex<BTreeMap<Uuid, (Vec<f32>, VectorPayload)>>,
	pub fail_upserts: AtomicBool,
	pub fail_deletes: AtomicBool,
	pub fail_searches: AtomicBool,
}
impl MemoryVectorIndex {
	pub fn new(dim: usize) -> Self {
		Self {
			dim,
			records: Mutex::new(BTreeMap::new()),
			fail_upserts: AtomicBool::new(false),
			fail_deletes: AtomicBool::new(false),
			fail_searches: AtomicBool::new(false),
		}
	}

	pub fn contains(&self, vector_id: Uuid) -> bool {
		locked(&self.records).contains_key(&vector_id)
	}

	pub fn len(&self) -> usize {
		locked(&self.records).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn payload(&self, vector_id: Uuid) -> Option<VectorPayload> {
		locked(&self.records).get(&vector_id).map(|(_, payload)| payload.clone())
	}

	/// Stores a record directly, e.g. to stand in for one left behind by a crashed run.
	pub fn insert_raw(&self, vector_id: Uuid, embedding: Vec<f32>, payload: VectorPayload) {
		locked(&self.records).insert(vector_id, (embedding, payload));
	}
}
impl VectorIndex for MemoryVectorIndex {
	fn upsert<'a>(
		&'a self,
		vector_id: Uuid,
		embedding: Vec<f32>,
		payload: &'a VectorPayload,
	) -> BoxFuture<'a, StorageResult<()>> {
		if self.fail_upserts.load(AtomicOrdering::SeqCst) {
			return ready(Err(injected(vector_id.to_string())));
		}
		if embedding.len() != self.dim {
			return ready(Err(StorageError::InvalidArgument(format!(
				"Vector has {} components; the index expects {}.",
				embedding.len(),
				self.dim
			))));
		}

		locked(&self.records).insert(vector_id, (embedding, payload.clone()));

		ready(Ok(()))
	}

	fn delete<'a>(&'a self, vector_id: Uuid) -> BoxFuture<'a, StorageResult<()>> {
		if self.fail_deletes.load(AtomicOrdering::SeqCst) {
			return ready(Err(injected(vector_id.to_string())));
		}

		locked(&self.records).remove(&vector_id);

		ready(Ok(()))
	}

	fn search<'a>(
		&'a self,
		embedding: Vec<f32>,
		limit: u64,
		filter: &'a VectorFilter,
	) -> BoxFuture<'a, StorageResult<Vec<VectorHit>>> {
		if self.fail_searches.load(AtomicOrdering::SeqCst) {
			return ready(Err(injected("search".to_string())));
		}

		let records = locked(&self.records);
		let mut hits: Vec<VectorHit> = records
			.iter()
			.filter(|(_, (_, payload))| admits(filter, payload))
			.map(|(vector_id, (stored, payload))| VectorHit {
				vector_id: *vector_id,
				asset_id: payload.asset_id,
				score: cosine(&embedding, stored),
			})
			.collect();

		hits.sort_by(|a, b| cmp_score_desc(a.score, b.score));
		hits.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

		ready(Ok(hits))
	}

	fn fetch_embedding<'a>(
		&'a self,
		vector_id: Uuid,
	) -> BoxFuture<'a, StorageResult<Option<Vec<f32>>>> {
		ready(Ok(locked(&self.records).get(&vector_id).map(|(embedding, _)| embedding.clone())))
	}

	fn scroll<'a>(
		&'a self,
		offset: Option<Uuid>,
		limit: u32,
	) -> BoxFuture<'a, StorageResult<(Vec<VectorRef>, Option<Uuid>)>> {
		let records = locked(&self.records);
		let mut page: Vec<VectorRef> = records
			.range(offset.unwrap_or(Uuid::nil())..)
			.take(limit as usize + 1)
			.map(|(vector_id, (_, payload))| VectorRef {
				vector_id: *vector_id,
				asset_id: Some(payload.asset_id),
			})
			.collect();
		let next =
			if page.len() > limit as usize { page.pop().map(|last| last.vector_id) } else { None };

		ready(Ok((page, next)))
	}
}

fn admits(filter: &VectorFilter, payload: &VectorPayload) -> bool {
	(filter.asset_types.is_empty() || filter.asset_types.contains(&payload.asset_type))
		&& filter.folder_id.is_none_or(|folder| payload.folder_id == Some(folder))
		&& filter.exclude_asset_id != Some(payload.asset_id)
}
