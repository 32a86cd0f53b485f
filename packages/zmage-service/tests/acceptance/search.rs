use zmage_domain::{
	asset::{AssetType, VisibilityScope},
	query::{AssetFilter, SortField, SortOrder},
};
use zmage_service::{Error, SearchMode, SearchRequest, SearchResponse};
use zmage_testkit::Harness;

use super::{OWNER, analysis, listing, ready_image, upload};

fn semantic(query: &str) -> SearchRequest {
	SearchRequest {
		query: Some(query.to_string()),
		mode: SearchMode::Semantic,
		..listing(VisibilityScope::Active)
	}
}

#[tokio::test]
async fn semantic_search_ranks_the_matching_asset_first() {
	let harness = Harness::new();
	let harbor =
		ready_image(&harness, "harbor.jpg", analysis("Golden sunset harbor", &[]), None).await;

	ready_image(&harness, "forest.jpg", analysis("Misty pine forest", &[]), None).await;
	ready_image(&harness, "city.jpg", analysis("Neon city street", &[]), None).await;

	let response = harness
		.service
		.search(semantic("Golden sunset harbor harbor.jpg"))
		.await
		.expect("Semantic search failed.");

	assert_eq!(response.items.first().map(|item| item.asset.id), Some(harbor.id));

	let scores: Vec<f32> = response.items.iter().filter_map(|item| item.score).collect();

	assert_eq!(scores.len(), response.items.len());
	assert!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
	assert!((scores[0] - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn semantic_search_honours_scope_and_status() {
	let harness = Harness::new();
	let harbor =
		ready_image(&harness, "harbor.jpg", analysis("Golden sunset harbor", &[]), None).await;
	let pending = harness
		.service
		.ingest(upload(OWNER, "pending.jpg", b"pending"))
		.await
		.expect("Ingest failed.");

	harness.service.soft_delete(OWNER, harbor.id).await.expect("Delete failed.");

	let active = harness.service.search(semantic("sunset harbor")).await.expect("Search failed.");

	assert!(active.items.iter().all(|item| item.asset.id != harbor.id));
	assert!(active.items.iter().all(|item| item.asset.id != pending.id));

	let trashed = harness
		.service
		.search(SearchRequest { scope: VisibilityScope::Trashed, ..semantic("sunset harbor") })
		.await
		.expect("Search failed.");

	assert_eq!(
		trashed.items.iter().map(|item| item.asset.id).collect::<Vec<_>>(),
		vec![harbor.id]
	);
}

#[tokio::test]
async fn semantic_search_without_a_query_lists_assets() {
	let harness = Harness::new();
	let older = ready_image(&harness, "older.jpg", analysis("Older", &[]), None).await;
	let newer = ready_image(&harness, "newer.jpg", analysis("Newer", &[]), None).await;
	let blank = harness.service.search(semantic("   ")).await.expect("Blank search failed.");
	let missing = harness
		.service
		.search(SearchRequest { query: None, ..semantic("") })
		.await
		.expect("Query-less search failed.");
	let plain =
		harness.service.search(listing(VisibilityScope::Active)).await.expect("List failed.");

	for response in [&blank, &missing] {
		let ids: Vec<i64> = response.items.iter().map(|item| item.asset.id).collect();

		assert_eq!(ids, plain.items.iter().map(|item| item.asset.id).collect::<Vec<_>>());
		assert_eq!(response.total, 2);
		assert!(ids.contains(&older.id) && ids.contains(&newer.id));
		assert!(response.items.iter().all(|item| item.score.is_none()));
	}
}

#[tokio::test]
async fn find_similar_never_returns_the_reference() {
	let harness = Harness::new();
	let reference =
		ready_image(&harness, "a.jpg", analysis("Sunset beach", &["sunset"]), None).await;
	let near =
		ready_image(&harness, "b.jpg", analysis("Sunset beach walk", &["sunset"]), None).await;
	let far = ready_image(&harness, "c.jpg", analysis("Tax invoice", &["paper"]), None).await;
	let similar =
		harness.service.find_similar(OWNER, reference.id, 10).await.expect("Similar failed.");
	let ids: Vec<i64> = similar.iter().map(|item| item.asset.id).collect();

	assert!(!ids.contains(&reference.id));
	assert_eq!(ids.first(), Some(&near.id));
	assert!(ids.contains(&far.id));

	let limited =
		harness.service.find_similar(OWNER, reference.id, 1).await.expect("Similar failed.");

	assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn find_similar_without_a_vector_is_empty() {
	let harness = Harness::new();
	let pending =
		harness.service.ingest(upload(OWNER, "a.jpg", b"bytes")).await.expect("Ingest failed.");

	let similar =
		harness.service.find_similar(OWNER, pending.id, 5).await.expect("Similar failed.");

	assert!(similar.is_empty());
	assert!(matches!(
		harness.service.find_similar(OWNER, pending.id, 0).await,
		Err(Error::InvalidRequest { .. })
	));
}

#[tokio::test]
async fn keyword_search_matches_text_and_exact_tags() {
	let harness = Harness::new();
	let beach =
		ready_image(&harness, "beach.jpg", analysis("Sunny Beach", &["Summer"]), None).await;

	ready_image(&harness, "other.jpg", analysis("Office", &["work"]), None).await;

	let keyword = |text: &str| SearchRequest {
		query: Some(text.to_string()),
		..listing(VisibilityScope::Active)
	};
	let by_title = harness.service.search(keyword("sunny")).await.expect("Search failed.");
	let by_tag = harness.service.search(keyword("Summer")).await.expect("Search failed.");
	let ids = |response: &SearchResponse| {
		response.items.iter().map(|item| item.asset.id).collect::<Vec<_>>()
	};

	assert_eq!(ids(&by_title), vec![beach.id]);
	assert_eq!(ids(&by_tag), vec![beach.id]);
	assert!(by_title.items.iter().all(|item| item.score.is_none()));
}

#[tokio::test]
async fn keyword_listing_pages_and_sorts() {
	let harness = Harness::new();

	for name in ["c.jpg", "a.jpg", "b.jpg", "d.txt"] {
		ready_image(&harness, name, analysis(name, &[]), None).await;
	}

	let request = SearchRequest {
		page_size: Some(2),
		sort: SortField::OriginalFilename,
		order: SortOrder::Asc,
		..listing(VisibilityScope::Active)
	};
	let first = harness.service.search(request.clone()).await.expect("Search failed.");
	let second = harness
		.service
		.search(SearchRequest { page: 2, ..request.clone() })
		.await
		.expect("Search failed.");
	let names = |response: &SearchResponse| {
		response.items.iter().map(|item| item.asset.original_filename.clone()).collect::<Vec<_>>()
	};

	assert_eq!(first.total, 4);
	assert!(first.has_more);
	assert_eq!(names(&first), vec!["a.jpg", "b.jpg"]);
	assert_eq!(names(&second), vec!["c.jpg", "d.txt"]);
	assert!(!second.has_more);

	let documents = harness
		.service
		.search(SearchRequest {
			filter: AssetFilter { asset_types: vec![AssetType::Document], ..Default::default() },
			..request
		})
		.await
		.expect("Search failed.");

	assert_eq!(names(&documents), vec!["d.txt"]);
	assert_eq!(documents.total, 1);
}

#[tokio::test]
async fn paging_bounds_are_validated() {
	let harness = Harness::new();

	assert!(matches!(
		harness.service.search(SearchRequest { page: 0, ..listing(VisibilityScope::Active) }).await,
		Err(Error::InvalidRequest { .. })
	));
	assert!(matches!(
		harness
			.service
			.search(SearchRequest { page_size: Some(201), ..listing(VisibilityScope::Active) })
			.await,
		Err(Error::InvalidRequest { .. })
	));
}
