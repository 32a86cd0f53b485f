mod acceptance {
	mod albums;
	mod cleanup;
	mod ingestion;
	mod processing;
	mod search;
	mod suggestions;
	mod visibility;

	use time::{Duration, OffsetDateTime};

	use zmage_domain::asset::VisibilityScope;
	use zmage_providers::ImageAnalysis;
	use zmage_service::{IngestRequest, MediaMetadata, SearchRequest};
	use zmage_storage::models::Asset;
	use zmage_testkit::Harness;

	pub const OWNER: i64 = 7;

	pub fn upload(owner_id: i64, filename: &str, bytes: &[u8]) -> IngestRequest {
		IngestRequest {
			owner_id,
			filename: filename.to_string(),
			bytes: bytes.to_vec(),
			mime_type: None,
			metadata: MediaMetadata::default(),
			folder_id: None,
			is_private: false,
			thumbnail: None,
		}
	}

	pub fn analysis(title: &str, tags: &[&str]) -> ImageAnalysis {
		ImageAnalysis {
			title: Some(title.to_string()),
			description: None,
			tags: tags.iter().map(|tag| tag.to_string()).collect(),
			ocr_text: None,
		}
	}

	/// Ingests an image and processes it with the given analysis.
	pub async fn ready_image(
		harness: &Harness,
		filename: &str,
		analysis: ImageAnalysis,
		taken_at: Option<OffsetDateTime>,
	) -> Asset {
		let mut req = upload(OWNER, filename, filename.as_bytes());

		req.metadata.taken_at = taken_at;

		let asset = harness.service.ingest(req).await.expect("Ingest failed.");

		harness.analysis.set(analysis);

		harness.service.process(OWNER, asset.id).await.expect("Processing failed.")
	}

	pub fn listing(scope: VisibilityScope) -> SearchRequest {
		SearchRequest {
			owner_id: OWNER,
			scope,
			query: None,
			mode: Default::default(),
			filter: Default::default(),
			page: 1,
			page_size: None,
			sort: Default::default(),
			order: Default::default(),
		}
	}

	pub async fn listed_ids(harness: &Harness, scope: VisibilityScope) -> Vec<i64> {
		let response = harness.service.search(listing(scope)).await.expect("Listing failed.");

		response.items.into_iter().map(|item| item.asset.id).collect()
	}

	pub fn days_later(days: i64) -> OffsetDateTime {
		OffsetDateTime::now_utc() + Duration::days(days)
	}
}
