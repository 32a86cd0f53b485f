use serde_json::Value;
use time::OffsetDateTime;

use zmage_domain::album::{AlbumKind, ReviewStatus};

use crate::{
	Error, Result,
	db::Db,
	models::{Album, AlbumRow, NewAlbum},
};

// Only live members count: trashed, vaulted and purged assets are left out.
const ALBUM_SELECT: &str = "\
SELECT
	a.*,
	(
		SELECT COUNT(*)
		FROM album_assets aa
		JOIN assets s ON s.id = aa.asset_id
		WHERE aa.album_id = a.id
			AND s.deleted_at IS NULL
			AND s.is_private = false
	) AS asset_count
FROM albums a";

/// Inserts the album and its initial members in one transaction.
pub async fn insert_album(db: &Db, album: &NewAlbum) -> Result<Album> {
	let (smart_rules, review_status, reason, score) = kind_columns(&album.kind);
	let mut tx = db.pool.begin().await?;
	let album_id: i64 = sqlx::query_scalar(
		"\
INSERT INTO albums (
	owner_id,
	name,
	description,
	album_type,
	smart_rules,
	review_status,
	suggestion_reason,
	suggestion_score,
	cover_asset_id,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
RETURNING id",
	)
	.bind(album.owner_id)
	.bind(album.name.as_str())
	.bind(album.description.as_deref())
	.bind(album.kind.as_str())
	.bind(smart_rules)
	.bind(review_status)
	.bind(reason)
	.bind(score)
	.bind(album.cover_asset_id)
	.bind(album.now)
	.fetch_one(&mut *tx)
	.await?;

	if !album.asset_ids.is_empty() {
		sqlx::query(
			"\
INSERT INTO album_assets (album_id, asset_id, position, added_at)
SELECT $1, member.asset_id, (member.ord - 1)::integer, $3
FROM unnest($2::bigint[]) WITH ORDINALITY AS member(asset_id, ord)
ON CONFLICT (album_id, asset_id) DO NOTHING",
		)
		.bind(album_id)
		.bind(album.asset_ids.as_slice())
		.bind(album.now)
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	get_album(db, album.owner_id, album_id)
		.await?
		.ok_or_else(|| Error::NotFound(format!("Album {album_id} vanished after insert.")))
}

pub async fn get_album(db: &Db, owner_id: i64, album_id: i64) -> Result<Option<Album>> {
	let row = sqlx::query_as::<_, AlbumRow>(&format!(
		"{ALBUM_SELECT} WHERE a.id = $1 AND a.owner_id = $2"
	))
	.bind(album_id)
	.bind(owner_id)
	.fetch_optional(&db.pool)
	.await?;

	row.map(Album::try_from).transpose()
}

/// Every album name the owner has, across all album types and review states.
pub async fn album_names(db: &Db, owner_id: i64) -> Result<Vec<String>> {
	let names: Vec<String> =
		sqlx::query_scalar("SELECT name FROM albums WHERE owner_id = $1 ORDER BY id")
			.bind(owner_id)
			.fetch_all(&db.pool)
			.await?;

	Ok(names)
}

/// Records a review decision. Only suggested albums have a review state; other albums yield
/// `None`.
pub async fn set_review_status(
	db: &Db,
	owner_id: i64,
	album_id: i64,
	status: ReviewStatus,
	now: OffsetDateTime,
) -> Result<Option<Album>> {
	let result = sqlx::query(
		"\
UPDATE albums
SET review_status = $1, updated_at = $2
WHERE id = $3 AND owner_id = $4 AND album_type = 'suggested'",
	)
	.bind(status.as_str())
	.bind(now)
	.bind(album_id)
	.bind(owner_id)
	.execute(&db.pool)
	.await?;

	if result.rows_affected() == 0 {
		return Ok(None);
	}

	get_album(db, owner_id, album_id).await
}

/// Deletes suggestions that were ignored before `cutoff`. Memberships go with them.
pub async fn purge_ignored_suggestions(db: &Db, cutoff: OffsetDateTime) -> Result<u64> {
	let result = sqlx::query(
		"\
DELETE FROM albums
WHERE album_type = 'suggested'
	AND review_status = 'ignored'
	AND updated_at < $1",
	)
	.bind(cutoff)
	.execute(&db.pool)
	.await?;

	Ok(result.rows_affected())
}

/// Removes album and collection memberships whose asset row no longer exists, `batch` rows per
/// statement until nothing is left.
pub async fn sweep_orphan_associations(db: &Db, batch: i64) -> Result<u64> {
	let mut removed = 0_u64;

	for sql in [
		"\
DELETE FROM album_assets
WHERE (album_id, asset_id) IN (
	SELECT aa.album_id, aa.asset_id
	FROM album_assets aa
	LEFT JOIN assets s ON s.id = aa.asset_id
	WHERE s.id IS NULL
	LIMIT $1
)",
		"\
DELETE FROM collection_assets
WHERE (collection_id, asset_id) IN (
	SELECT ca.collection_id, ca.asset_id
	FROM collection_assets ca
	LEFT JOIN assets s ON s.id = ca.asset_id
	WHERE s.id IS NULL
	LIMIT $1
)",
	] {
		loop {
			let deleted = sqlx::query(sql).bind(batch).execute(&db.pool).await?.rows_affected();

			removed += deleted;

			if deleted < batch.max(1) as u64 {
				break;
			}
		}
	}

	Ok(removed)
}

fn kind_columns(
	kind: &AlbumKind,
) -> (Option<Value>, Option<&'static str>, Option<&str>, Option<f32>) {
	match kind {
		AlbumKind::Manual => (None, None, None, None),
		AlbumKind::Smart { rules } => (Some(rules.to_value()), None, None, None),
		AlbumKind::Suggested { status, reason, confidence } =>
			(None, Some(status.as_str()), reason.as_deref(), *confidence),
	}
}
