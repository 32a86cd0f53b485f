use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use zmage_domain::{
	asset::{AssetStatus, VisibilityScope},
	query::AssetQuery,
	rules::{RuleCondition, SmartRules},
};

use crate::{
	Result,
	db::Db,
	error::conflict_on_unique,
	models::{Asset, ContentUpdate, DerivedFields, NewAsset, VectorLink},
};

const DUPLICATE_CONTENT: &str = "An asset with identical content already exists.";

pub async fn insert_asset(db: &Db, asset: &NewAsset) -> Result<Asset> {
	sqlx::query_as::<_, Asset>(
		"\
INSERT INTO assets (
	owner_id,
	filename,
	original_filename,
	file_path,
	thumbnail_path,
	file_size,
	mime_type,
	asset_type,
	content_hash,
	taken_at,
	camera_model,
	latitude,
	longitude,
	width,
	height,
	folder_id,
	status,
	is_private,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $19)
RETURNING *",
	)
	.bind(asset.owner_id)
	.bind(asset.filename.as_str())
	.bind(asset.original_filename.as_str())
	.bind(asset.file_path.as_str())
	.bind(asset.thumbnail_path.as_deref())
	.bind(asset.file_size)
	.bind(asset.mime_type.as_str())
	.bind(asset.asset_type.as_str())
	.bind(asset.content_hash.as_str())
	.bind(asset.taken_at)
	.bind(asset.camera_model.as_deref())
	.bind(asset.latitude)
	.bind(asset.longitude)
	.bind(asset.width)
	.bind(asset.height)
	.bind(asset.folder_id)
	.bind(AssetStatus::Pending.as_str())
	.bind(asset.is_private)
	.bind(asset.now)
	.fetch_one(&db.pool)
	.await
	.map_err(|err| conflict_on_unique(err, DUPLICATE_CONTENT))
}

pub async fn get_asset(db: &Db, owner_id: i64, asset_id: i64) -> Result<Option<Asset>> {
	let asset = sqlx::query_as::<_, Asset>("SELECT * FROM assets WHERE id = $1 AND owner_id = $2")
		.bind(asset_id)
		.bind(owner_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(asset)
}

/// Any non-purged asset of the owner with this content hash, trashed or not.
pub async fn find_by_hash(db: &Db, owner_id: i64, content_hash: &str) -> Result<Option<Asset>> {
	let asset = sqlx::query_as::<_, Asset>(
		"SELECT * FROM assets WHERE owner_id = $1 AND content_hash = $2",
	)
	.bind(owner_id)
	.bind(content_hash)
	.fetch_optional(&db.pool)
	.await?;

	Ok(asset)
}

/// Moves the asset to PROCESSING under a new run id when its current state allows it.
///
/// A PROCESSING row whose claim started before `stale_before` is treated as abandoned and may be
/// claimed again. Returns `None` when the asset is missing or not claimable.
pub async fn claim_processing(
	db: &Db,
	owner_id: i64,
	asset_id: i64,
	claimable: &[AssetStatus],
	run_id: Uuid,
	now: OffsetDateTime,
	stale_before: OffsetDateTime,
) -> Result<Option<Asset>> {
	let claimable: Vec<String> =
		claimable.iter().map(|status| status.as_str().to_string()).collect();
	let asset = sqlx::query_as::<_, Asset>(
		"\
UPDATE assets
SET
	status = 'processing',
	processing_run_id = $1,
	processing_started_at = $2,
	error_message = NULL,
	updated_at = $2
WHERE id = $3
	AND owner_id = $4
	AND (
		status = ANY($5)
		OR (status = 'processing' AND processing_started_at < $6)
	)
RETURNING *",
	)
	.bind(run_id)
	.bind(now)
	.bind(asset_id)
	.bind(owner_id)
	.bind(claimable)
	.bind(stale_before)
	.fetch_optional(&db.pool)
	.await?;

	Ok(asset)
}

/// Publishes the derived fields and the new vector id. Only the run that holds the claim can
/// commit; a superseded run gets `None`.
pub async fn complete_processing(
	db: &Db,
	asset_id: i64,
	run_id: Uuid,
	derived: &DerivedFields,
	vector_id: Uuid,
	now: OffsetDateTime,
) -> Result<Option<Asset>> {
	let asset = sqlx::query_as::<_, Asset>(
		"\
UPDATE assets
SET
	status = 'ready',
	title = $1,
	description = $2,
	tags = $3,
	ocr_text = $4,
	vector_id = $5,
	processed_at = $6,
	updated_at = $6,
	error_message = NULL,
	processing_run_id = NULL
WHERE id = $7
	AND processing_run_id = $8
	AND status = 'processing'
RETURNING *",
	)
	.bind(derived.title.as_deref())
	.bind(derived.description.as_deref())
	.bind(&derived.tags)
	.bind(derived.ocr_text.as_deref())
	.bind(vector_id)
	.bind(now)
	.bind(asset_id)
	.bind(run_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(asset)
}

pub async fn fail_processing(
	db: &Db,
	asset_id: i64,
	run_id: Uuid,
	message: &str,
	now: OffsetDateTime,
) -> Result<bool> {
	let result = sqlx::query(
		"\
UPDATE assets
SET
	status = 'failed',
	error_message = $1,
	processing_run_id = NULL,
	updated_at = $2
WHERE id = $3
	AND processing_run_id = $4
	AND status = 'processing'",
	)
	.bind(message)
	.bind(now)
	.bind(asset_id)
	.bind(run_id)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected() > 0)
}

/// FAILED back to PENDING with the error and processing timestamps cleared.
pub async fn reset_for_retry(
	db: &Db,
	owner_id: i64,
	asset_id: i64,
	now: OffsetDateTime,
) -> Result<Option<Asset>> {
	let asset = sqlx::query_as::<_, Asset>(
		"\
UPDATE assets
SET
	status = 'pending',
	error_message = NULL,
	processing_run_id = NULL,
	processing_started_at = NULL,
	processed_at = NULL,
	updated_at = $1
WHERE id = $2
	AND owner_id = $3
	AND status = 'failed'
RETURNING *",
	)
	.bind(now)
	.bind(asset_id)
	.bind(owner_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(asset)
}

/// Points the row at new content. Refused while a processing run holds the asset.
pub async fn replace_content(
	db: &Db,
	owner_id: i64,
	asset_id: i64,
	update: &ContentUpdate,
	now: OffsetDateTime,
) -> Result<Option<Asset>> {
	sqlx::query_as::<_, Asset>(
		"\
UPDATE assets
SET
	file_path = $1,
	thumbnail_path = $2,
	file_size = $3,
	mime_type = $4,
	asset_type = $5,
	content_hash = $6,
	width = $7,
	height = $8,
	updated_at = $9
WHERE id = $10
	AND owner_id = $11
	AND status <> 'processing'
RETURNING *",
	)
	.bind(update.file_path.as_str())
	.bind(update.thumbnail_path.as_deref())
	.bind(update.file_size)
	.bind(update.mime_type.as_str())
	.bind(update.asset_type.as_str())
	.bind(update.content_hash.as_str())
	.bind(update.width)
	.bind(update.height)
	.bind(now)
	.bind(asset_id)
	.bind(owner_id)
	.fetch_optional(&db.pool)
	.await
	.map_err(|err| conflict_on_unique(err, DUPLICATE_CONTENT))
}

/// Sets or clears `deleted_at`. Deleting an already-deleted asset keeps its original timestamp.
pub async fn set_deleted(
	db: &Db,
	owner_id: i64,
	asset_id: i64,
	deleted: bool,
	now: OffsetDateTime,
) -> Result<Option<Asset>> {
	let sql = if deleted {
		"\
UPDATE assets
SET deleted_at = COALESCE(deleted_at, $1), updated_at = $1
WHERE id = $2 AND owner_id = $3
RETURNING *"
	} else {
		"\
UPDATE assets
SET deleted_at = NULL, updated_at = $1
WHERE id = $2 AND owner_id = $3
RETURNING *"
	};
	let asset = sqlx::query_as::<_, Asset>(sql)
		.bind(now)
		.bind(asset_id)
		.bind(owner_id)
		.fetch_optional(&db.pool)
		.await?;

	Ok(asset)
}

pub async fn set_private(
	db: &Db,
	owner_id: i64,
	asset_id: i64,
	is_private: bool,
	now: OffsetDateTime,
) -> Result<Option<Asset>> {
	let asset = sqlx::query_as::<_, Asset>(
		"\
UPDATE assets
SET is_private = $1, updated_at = $2
WHERE id = $3 AND owner_id = $4
RETURNING *",
	)
	.bind(is_private)
	.bind(now)
	.bind(asset_id)
	.bind(owner_id)
	.fetch_optional(&db.pool)
	.await?;

	Ok(asset)
}

pub async fn delete_asset(db: &Db, owner_id: i64, asset_id: i64) -> Result<bool> {
	let result = sqlx::query("DELETE FROM assets WHERE id = $1 AND owner_id = $2")
		.bind(asset_id)
		.bind(owner_id)
		.execute(&db.pool)
		.await?;

	Ok(result.rows_affected() > 0)
}

/// Runs a listing query and returns the requested page with the total match count.
pub async fn search_assets(db: &Db, query: &AssetQuery) -> Result<(Vec<Asset>, i64)> {
	let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM assets");

	push_query_conditions(&mut count, query);

	let total = count.build_query_scalar::<i64>().fetch_one(&db.pool).await?;
	let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM assets");

	push_query_conditions(&mut select, query);

	let column = query.sort.column();
	let order = query.order.keyword();

	select.push(format!(" ORDER BY {column} {order} NULLS LAST, created_at DESC, id DESC"));

	if let Some(limit) = query.limit {
		select.push(" LIMIT ").push_bind(limit);
	}
	if query.offset > 0 {
		select.push(" OFFSET ").push_bind(query.offset);
	}

	let items = select.build_query_as::<Asset>().fetch_all(&db.pool).await?;

	Ok((items, total))
}

/// Live evaluation of a rule document over the owner's active READY assets.
pub async fn evaluate_rules(
	db: &Db,
	owner_id: i64,
	rules: &SmartRules,
	limit: i64,
) -> Result<Vec<Asset>> {
	if rules.is_empty() {
		return Ok(Vec::new());
	}

	let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM assets WHERE owner_id = ");

	builder.push_bind(owner_id);
	builder.push(" AND deleted_at IS NULL AND is_private = false AND status = 'ready'");

	for condition in rules.conditions() {
		match condition {
			RuleCondition::TagsInclude(tags) => {
				builder.push(" AND tags && ").push_bind(tags.clone());
			},
			RuleCondition::TagsExclude(tags) => {
				builder.push(" AND NOT (tags && ").push_bind(tags.clone()).push(")");
			},
			RuleCondition::TakenFrom(start) => {
				builder.push(" AND taken_at >= ").push_bind(*start);
			},
			RuleCondition::TakenTo(end) => {
				builder.push(" AND taken_at <= ").push_bind(*end);
			},
			RuleCondition::CameraModel(model) => {
				builder.push(" AND camera_model = ").push_bind(model.clone());
			},
			RuleCondition::AssetType(kind) => {
				builder.push(" AND asset_type = ").push_bind(kind.as_str());
			},
			RuleCondition::Near(location) => {
				let delta = location.delta_degrees();

				builder
					.push(" AND latitude BETWEEN ")
					.push_bind(location.lat - delta)
					.push(" AND ")
					.push_bind(location.lat + delta)
					.push(" AND longitude BETWEEN ")
					.push_bind(location.lon - delta)
					.push(" AND ")
					.push_bind(location.lon + delta);
			},
		}
	}

	builder.push(" ORDER BY taken_at DESC NULLS LAST, id DESC LIMIT ").push_bind(limit);

	let assets = builder.build_query_as::<Asset>().fetch_all(&db.pool).await?;

	Ok(assets)
}

/// Owners that have at least one active READY asset created since `since`.
pub async fn owners_with_recent_assets(db: &Db, since: OffsetDateTime) -> Result<Vec<i64>> {
	let owners: Vec<i64> = sqlx::query_scalar(
		"\
SELECT DISTINCT owner_id
FROM assets
WHERE status = 'ready'
	AND deleted_at IS NULL
	AND is_private = false
	AND created_at >= $1
ORDER BY owner_id",
	)
	.bind(since)
	.fetch_all(&db.pool)
	.await?;

	Ok(owners)
}

pub async fn recent_ready_assets(
	db: &Db,
	owner_id: i64,
	since: OffsetDateTime,
	limit: i64,
) -> Result<Vec<Asset>> {
	let assets = sqlx::query_as::<_, Asset>(
		"\
SELECT *
FROM assets
WHERE owner_id = $1
	AND status = 'ready'
	AND deleted_at IS NULL
	AND is_private = false
	AND created_at >= $2
ORDER BY created_at DESC, id DESC
LIMIT $3",
	)
	.bind(owner_id)
	.bind(since)
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(assets)
}

/// Assets soft-deleted before `cutoff`, including deleted vault assets, in `(deleted_at, id)`
/// order and strictly after the `after` key when one is given.
pub async fn trashed_before(
	db: &Db,
	cutoff: OffsetDateTime,
	after: Option<(OffsetDateTime, i64)>,
	limit: i64,
) -> Result<Vec<Asset>> {
	let assets = sqlx::query_as::<_, Asset>(
		"\
SELECT *
FROM assets
WHERE deleted_at IS NOT NULL
	AND deleted_at < $1
	AND ($2::timestamptz IS NULL OR (deleted_at, id) > ($2, $3))
ORDER BY deleted_at, id
LIMIT $4",
	)
	.bind(cutoff)
	.bind(after.map(|(deleted_at, _)| deleted_at))
	.bind(after.map(|(_, id)| id))
	.bind(limit)
	.fetch_all(&db.pool)
	.await?;

	Ok(assets)
}

pub async fn vector_links(db: &Db, asset_ids: &[i64]) -> Result<Vec<VectorLink>> {
	if asset_ids.is_empty() {
		return Ok(Vec::new());
	}

	let links = sqlx::query_as::<_, VectorLink>(
		"SELECT id, vector_id, status FROM assets WHERE id = ANY($1)",
	)
	.bind(asset_ids)
	.fetch_all(&db.pool)
	.await?;

	Ok(links)
}

fn push_query_conditions(builder: &mut QueryBuilder<'_, Postgres>, query: &AssetQuery) {
	builder.push(" WHERE owner_id = ").push_bind(query.owner_id);
	builder.push(match query.scope {
		VisibilityScope::Active => " AND deleted_at IS NULL AND is_private = false",
		VisibilityScope::Private => " AND deleted_at IS NULL AND is_private = true",
		VisibilityScope::Trashed => " AND deleted_at IS NOT NULL AND is_private = false",
	});

	if let Some(keyword) = query.keyword() {
		let pattern = format!("%{}%", escape_like(keyword));

		builder
			.push(" AND (title ILIKE ")
			.push_bind(pattern.clone())
			.push(" OR description ILIKE ")
			.push_bind(pattern.clone())
			.push(" OR original_filename ILIKE ")
			.push_bind(pattern.clone())
			.push(" OR ocr_text ILIKE ")
			.push_bind(pattern)
			.push(" OR ")
			.push_bind(keyword.to_string())
			.push(" = ANY(tags))");
	}

	let filter = &query.filter;

	if !filter.asset_types.is_empty() {
		let types: Vec<String> =
			filter.asset_types.iter().map(|kind| kind.as_str().to_string()).collect();

		builder.push(" AND asset_type = ANY(").push_bind(types).push(")");
	}
	if let Some(folder_id) = filter.folder_id {
		builder.push(" AND folder_id = ").push_bind(folder_id);
	}
	if !filter.tags.is_empty() {
		builder.push(" AND tags @> ").push_bind(filter.tags.clone());
	}
	if let Some(from) = filter.created_from {
		builder.push(" AND created_at >= ").push_bind(from);
	}
	if let Some(to) = filter.created_to {
		builder.push(" AND created_at <= ").push_bind(to);
	}
	if let Some(status) = query.status {
		builder.push(" AND status = ").push_bind(status.as_str());
	}
	if let Some(ids) = &query.ids {
		builder.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
	}
}

/// Escapes `%`, `_` and `\` so user input matches literally inside an ILIKE pattern.
fn escape_like(raw: &str) -> String {
	let mut out = String::with_capacity(raw.len());

	for ch in raw.chars() {
		if matches!(ch, '%' | '_' | '\\') {
			out.push('\\');
		}

		out.push(ch);
	}

	out
}
