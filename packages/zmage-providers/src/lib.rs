pub mod analysis;
pub mod embedding;
pub mod suggestion;

use std::time::Duration;

use color_eyre::{Result, eyre};
use reqwest::{
	Client,
	header::{AUTHORIZATION, HeaderMap, HeaderName},
};
use serde_json::{Map, Value};

pub use analysis::ImageAnalysis;
pub use embedding::EmbeddingTask;
pub use suggestion::{AssetSummary, GroupingSuggestion};

const MAX_JSON_ATTEMPTS: usize = 3;

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(eyre::eyre!("Default header values must be strings."));
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Sends a chat-completion request and parses a JSON object out of the first choice, retrying
/// when the model answers with something that is not JSON.
pub(crate) async fn chat_json(
	cfg: &zmage_config::LlmProviderConfig,
	messages: &[Value],
) -> Result<Value> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});

	for _ in 0..MAX_JSON_ATTEMPTS {
		let res = client
			.post(&url)
			.headers(auth_headers(&cfg.api_key, &cfg.default_headers)?)
			.json(&body)
			.send()
			.await?;
		let json: Value = res.error_for_status()?.json().await?;

		if let Ok(parsed) = parse_chat_json(json) {
			return Ok(parsed);
		}
	}

	Err(eyre::eyre!("Model response is not valid JSON after {MAX_JSON_ATTEMPTS} attempts."))
}

fn parse_chat_json(json: Value) -> Result<Value> {
	if let Some(content) = json
		.get("choices")
		.and_then(|v| v.as_array())
		.and_then(|arr| arr.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|msg| msg.get("content"))
		.and_then(|c| c.as_str())
	{
		let parsed: Value = serde_json::from_str(strip_code_fence(content))
			.map_err(|_| eyre::eyre!("Model content is not valid JSON."))?;

		return Ok(parsed);
	}

	Err(eyre::eyre!("Model response is missing message content."))
}

/// Models often wrap JSON answers in a Markdown code fence.
fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let without_open = trimmed
		.strip_prefix("```json")
		.or_else(|| trimmed.strip_prefix("```"))
		.unwrap_or(trimmed);

	without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_fenced_choice_content() {
		let json = serde_json::json!({
			"choices": [
				{ "message": { "content": "```json\n{\"title\": \"Dusk\"}\n```" } }
			]
		});
		let parsed = parse_chat_json(json).expect("parse failed");

		assert_eq!(parsed["title"], "Dusk");
	}

	#[test]
	fn rejects_non_json_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": "I cannot help with that." } }]
		});

		assert!(parse_chat_json(json).is_err());
		assert!(parse_chat_json(serde_json::json!({ "id": "x" })).is_err());
	}

	#[test]
	fn header_values_must_be_strings() {
		let mut headers = Map::new();

		headers.insert("x-team".to_string(), Value::from(7));

		assert!(auth_headers("key", &headers).is_err());

		let mut headers = Map::new();

		headers.insert("x-team".to_string(), Value::from("media"));

		let map = auth_headers("key", &headers).expect("headers failed");

		assert_eq!(map.get("x-team").and_then(|v| v.to_str().ok()), Some("media"));
		assert_eq!(map.get(AUTHORIZATION).and_then(|v| v.to_str().ok()), Some("Bearer key"));
	}
}
