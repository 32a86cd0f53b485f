use std::collections::HashMap;

use qdrant_client::{
	QdrantError,
	client::Payload,
	qdrant::{
		Condition, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder, DeletePointsBuilder,
		Distance, FieldType, Filter, GetPointsBuilder, PointId, PointStruct, PointsIdsList, Query,
		QueryPointsBuilder, RetrievedPoint, ScrollPointsBuilder, UpsertPointsBuilder, Value,
		VectorParamsBuilder, point_id::PointIdOptions, value::Kind, vectors_output::VectorsOptions,
	},
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use zmage_domain::{asset::AssetType, vector::VectorPayload};

use crate::{Error, Result};

pub const ASSET_ID_FIELD: &str = "asset_id";
pub const ASSET_TYPE_FIELD: &str = "asset_type";
pub const FOLDER_ID_FIELD: &str = "folder_id";

/// Payload constraints pushed down into a nearest-neighbour query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
	pub asset_types: Vec<AssetType>,
	pub folder_id: Option<i64>,
	pub exclude_asset_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
	pub vector_id: Uuid,
	pub asset_id: i64,
	pub score: f32,
}

/// A stored record without its embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorRef {
	pub vector_id: Uuid,
	pub asset_id: Option<i64>,
}

pub struct QdrantStore {
	pub client: qdrant_client::Qdrant,
	pub collection: String,
	pub vector_dim: u32,
}
impl QdrantStore {
	pub fn new(cfg: &zmage_config::Qdrant) -> Result<Self> {
		let client = qdrant_client::Qdrant::from_url(&cfg.url).build()?;

		Ok(Self { client, collection: cfg.collection.clone(), vector_dim: cfg.vector_dim })
	}

	/// Creates the cosine collection and its payload indexes when they do not exist yet.
	pub async fn ensure_collection(&self) -> Result<()> {
		if self.client.collection_exists(&self.collection).await? {
			return Ok(());
		}

		let create = CreateCollectionBuilder::new(self.collection.clone())
			.vectors_config(VectorParamsBuilder::new(self.vector_dim.into(), Distance::Cosine));

		self.client.create_collection(create).await?;

		for (field, field_type) in [
			(ASSET_ID_FIELD, FieldType::Integer),
			(ASSET_TYPE_FIELD, FieldType::Keyword),
			(FOLDER_ID_FIELD, FieldType::Integer),
		] {
			let index =
				CreateFieldIndexCollectionBuilder::new(self.collection.clone(), field, field_type)
					.wait(true);

			self.client.create_field_index(index).await?;
		}

		tracing::info!(collection = %self.collection, "Created Qdrant collection.");

		Ok(())
	}

	pub async fn upsert(
		&self,
		vector_id: Uuid,
		embedding: Vec<f32>,
		payload: &VectorPayload,
	) -> Result<()> {
		if embedding.len() != self.vector_dim as usize {
			return Err(Error::InvalidArgument(format!(
				"Embedding has {} dimensions; the collection expects {}.",
				embedding.len(),
				self.vector_dim
			)));
		}

		let payload = Payload::from(payload_map(payload)?);
		let point = PointStruct::new(vector_id.to_string(), embedding, payload);
		let upsert = UpsertPointsBuilder::new(self.collection.clone(), vec![point]).wait(true);

		self.client.upsert_points(upsert).await?;

		Ok(())
	}

	/// Removes one record. A record that is already gone is not an error.
	pub async fn delete(&self, vector_id: Uuid) -> Result<()> {
		let delete = DeletePointsBuilder::new(self.collection.clone())
			.points(PointsIdsList { ids: vec![PointId::from(vector_id.to_string())] })
			.wait(true);

		match self.client.delete_points(delete).await {
			Ok(_) => Ok(()),
			Err(err) if is_not_found_error(&err) => {
				tracing::info!(vector_id = %vector_id, "Vector record missing during delete.");

				Ok(())
			},
			Err(err) => Err(err.into()),
		}
	}

	pub async fn search(
		&self,
		embedding: Vec<f32>,
		limit: u64,
		filter: &VectorFilter,
	) -> Result<Vec<VectorHit>> {
		let mut query = QueryPointsBuilder::new(self.collection.clone())
			.query(Query::new_nearest(embedding))
			.limit(limit)
			.with_payload(true);

		if let Some(filter) = build_filter(filter) {
			query = query.filter(filter);
		}

		let response = self.client.query(query).await?;
		let hits = response
			.result
			.into_iter()
			.filter_map(|point| {
				let vector_id = point.id.as_ref().and_then(point_id_to_uuid)?;
				let asset_id = payload_i64(&point.payload, ASSET_ID_FIELD)?;

				Some(VectorHit { vector_id, asset_id, score: point.score })
			})
			.collect();

		Ok(hits)
	}

	pub async fn fetch_embedding(&self, vector_id: Uuid) -> Result<Option<Vec<f32>>> {
		let get = GetPointsBuilder::new(
			self.collection.clone(),
			vec![PointId::from(vector_id.to_string())],
		)
		.with_vectors(true)
		.with_payload(false);
		let response = match self.client.get_points(get).await {
			Ok(response) => response,
			Err(err) if is_not_found_error(&err) => return Ok(None),
			Err(err) => return Err(err.into()),
		};

		Ok(response.result.into_iter().next().and_then(dense_vector))
	}

	/// One page of stored records, in point id order. The returned cursor is `None` on the last
	/// page.
	pub async fn scroll(
		&self,
		offset: Option<Uuid>,
		limit: u32,
	) -> Result<(Vec<VectorRef>, Option<Uuid>)> {
		let mut scroll = ScrollPointsBuilder::new(self.collection.clone())
			.limit(limit)
			.with_payload(true)
			.with_vectors(false);

		if let Some(offset) = offset {
			scroll = scroll.offset(PointId::from(offset.to_string()));
		}

		let response = self.client.scroll(scroll).await?;
		let next = response.next_page_offset.as_ref().and_then(point_id_to_uuid);
		let refs = response
			.result
			.iter()
			.filter_map(|point| {
				let vector_id = point.id.as_ref().and_then(point_id_to_uuid)?;

				Some(VectorRef { vector_id, asset_id: payload_i64(&point.payload, ASSET_ID_FIELD) })
			})
			.collect();

		Ok((refs, next))
	}
}

pub fn is_not_found_error(err: &QdrantError) -> bool {
	let message = err.to_string().to_lowercase();
	let point_not_found =
		(message.contains("not found") || message.contains("404")) && message.contains("point");
	let no_point_found = message.contains("no point") && message.contains("found");

	point_not_found || no_point_found
}

fn payload_map(payload: &VectorPayload) -> Result<HashMap<String, Value>> {
	let json = serde_json::to_value(payload)
		.map_err(|err| Error::InvalidArgument(format!("Vector payload is not encodable: {err}.")))?;
	let JsonValue::Object(fields) = json else {
		return Err(Error::InvalidArgument("Vector payload must encode as an object.".to_string()));
	};

	Ok(fields.into_iter().map(|(key, value)| (key, Value::from(value))).collect())
}

fn build_filter(filter: &VectorFilter) -> Option<Filter> {
	let mut must = Vec::new();
	let mut must_not = Vec::new();

	if !filter.asset_types.is_empty() {
		let types: Vec<String> =
			filter.asset_types.iter().map(|kind| kind.as_str().to_string()).collect();

		must.push(Condition::matches(ASSET_TYPE_FIELD, types));
	}
	if let Some(folder_id) = filter.folder_id {
		must.push(Condition::matches(FOLDER_ID_FIELD, folder_id));
	}
	if let Some(asset_id) = filter.exclude_asset_id {
		must_not.push(Condition::matches(ASSET_ID_FIELD, asset_id));
	}

	if must.is_empty() && must_not.is_empty() {
		return None;
	}

	Some(Filter { must, must_not, ..Default::default() })
}

fn point_id_to_uuid(point_id: &PointId) -> Option<Uuid> {
	match &point_id.point_id_options {
		Some(PointIdOptions::Uuid(id)) => Uuid::parse_str(id).ok(),
		_ => None,
	}
}

fn payload_i64(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
	match &payload.get(key)?.kind {
		Some(Kind::IntegerValue(value)) => Some(*value),
		Some(Kind::DoubleValue(value)) if value.fract() == 0.0 => Some(*value as i64),
		_ => None,
	}
}

#[allow(deprecated)]
fn dense_vector(point: RetrievedPoint) -> Option<Vec<f32>> {
	match point.vectors?.vectors_options? {
		VectorsOptions::Vector(output) if !output.data.is_empty() => Some(output.data),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_filter_pushes_nothing_down() {
		assert!(build_filter(&VectorFilter::default()).is_none());
	}

	#[test]
	fn filter_excludes_source_asset() {
		let filter = build_filter(&VectorFilter {
			asset_types: vec![AssetType::Image],
			folder_id: None,
			exclude_asset_id: Some(9),
		})
		.expect("Filter should be built.");

		assert_eq!(filter.must.len(), 1);
		assert_eq!(filter.must_not.len(), 1);
	}

	#[test]
	fn payload_ints_accept_whole_doubles() {
		let mut payload = HashMap::new();

		payload.insert("a".to_string(), Value::from(7_i64));
		payload.insert("b".to_string(), Value::from(3.0_f64));
		payload.insert("c".to_string(), Value::from(3.5_f64));

		assert_eq!(payload_i64(&payload, "a"), Some(7));
		assert_eq!(payload_i64(&payload, "b"), Some(3));
		assert_eq!(payload_i64(&payload, "c"), None);
		assert_eq!(payload_i64(&payload, "missing"), None);
	}

	#[test]
	fn payload_encodes_asset_fields() {
		let map = payload_map(&VectorPayload {
			asset_id: 4,
			title: Some("Dusk".to_string()),
			tags: vec!["sunset".to_string()],
			asset_type: AssetType::Image,
			folder_id: None,
		})
		.expect("Payload encoding failed.");

		assert_eq!(payload_i64(&map, ASSET_ID_FIELD), Some(4));
		assert!(map.contains_key(ASSET_TYPE_FIELD));
	}
}
