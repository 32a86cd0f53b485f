use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::Client;
use serde_json::Value;

/// How the embedding will be used. Some providers embed documents and queries asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
	RetrievalDocument,
	RetrievalQuery,
}
impl EmbeddingTask {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::RetrievalDocument => "RETRIEVAL_DOCUMENT",
			Self::RetrievalQuery => "RETRIEVAL_QUERY",
		}
	}
}

pub async fn embed(
	cfg: &zmage_config::EmbeddingProviderConfig,
	texts: &[String],
	task: EmbeddingTask,
) -> Result<Vec<Vec<f32>>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = request_body(cfg, texts, task);
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = res.error_for_status()?.json().await?;
	let vectors = parse_embedding_response(json)?;

	if vectors.len() != texts.len() {
		return Err(eyre::eyre!(
			"Embedding response has {} vectors for {} inputs.",
			vectors.len(),
			texts.len()
		));
	}

	Ok(vectors)
}

fn request_body(
	cfg: &zmage_config::EmbeddingProviderConfig,
	texts: &[String],
	task: EmbeddingTask,
) -> Value {
	let mut body = serde_json::json!({
		"model": cfg.model,
		"input": texts,
		"dimensions": cfg.dimensions,
	});

	if let (Some(field), Some(obj)) = (cfg.task_field.as_deref(), body.as_object_mut()) {
		obj.insert(field.to_string(), Value::from(task.as_str()));
	}

	body
}

fn parse_embedding_response(json: Value) -> Result<Vec<Vec<f32>>> {
	let data = json
		.get("data")
		.and_then(|v| v.as_array())
		.ok_or_else(|| eyre::eyre!("Embedding response is missing data array."))?;
	let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

	for (fallback_index, item) in data.iter().enumerate() {
		let index = item
			.get("index")
			.and_then(|v| v.as_u64())
			.map(|v| v as usize)
			.unwrap_or(fallback_index);
		let embedding = item
			.get("embedding")
			.and_then(|v| v.as_array())
			.ok_or_else(|| eyre::eyre!("Embedding item missing embedding array."))?;
		let vec = embedding
			.iter()
			.map(|value| {
				value
					.as_f64()
					.map(|number| number as f32)
					.ok_or_else(|| eyre::eyre!("Embedding value must be numeric."))
			})
			.collect::<Result<Vec<_>>>()?;

		indexed.push((index, vec));
	}

	indexed.sort_by_key(|(index, _)| *index);

	Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
}

#[cfg(test)]
mod tests {
	use serde_json::Map;

	use super::*;

	fn cfg(task_field: Option<&str>) -> zmage_config::EmbeddingProviderConfig {
		zmage_config::EmbeddingProviderConfig {
			provider_id: "p".to_string(),
			api_base: "http://localhost".to_string(),
			api_key: "key".to_string(),
			path: "/v1/embeddings".to_string(),
			model: "m".to_string(),
			dimensions: 2,
			timeout_ms: 1_000,
			default_headers: Map::new(),
			task_field: task_field.map(str::to_string),
		}
	}

	#[test]
	fn parses_embeddings_in_index_order() {
		let json = serde_json::json!({
			"data": [
				{ "index": 1, "embedding": [2.0, 3.0] },
				{ "index": 0, "embedding": [0.5, 1.5] }
			]
		});
		let parsed = parse_embedding_response(json).expect("parse failed");

		assert_eq!(parsed, vec![vec![0.5, 1.5], vec![2.0, 3.0]]);
	}

	#[test]
	fn rejects_non_numeric_values() {
		let json = serde_json::json!({ "data": [{ "embedding": ["x"] }] });

		assert!(parse_embedding_response(json).is_err());
	}

	#[test]
	fn task_type_is_forwarded_only_when_configured() {
		let texts = vec!["hello".to_string()];
		let with_task =
			request_body(&cfg(Some("task_type")), &texts, EmbeddingTask::RetrievalQuery);
		let without_task = request_body(&cfg(None), &texts, EmbeddingTask::RetrievalQuery);

		assert_eq!(with_task["task_type"], "RETRIEVAL_QUERY");
		assert!(without_task.get("task_type").is_none());
	}
}
