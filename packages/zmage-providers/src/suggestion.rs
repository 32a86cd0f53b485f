use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// Upper bound on summaries shown to the model in one request.
pub const MAX_PROMPT_ASSETS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
	pub id: i64,
	pub title: Option<String>,
	pub description: Option<String>,
	pub tags: Vec<String>,
	#[serde(with = "zmage_domain::time_serde::option")]
	pub taken_at: Option<OffsetDateTime>,
	pub camera_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupingSuggestion {
	pub name: String,
	pub description: Option<String>,
	pub reason: Option<String>,
	pub asset_ids: Vec<i64>,
	pub confidence: Option<f32>,
}

pub async fn suggest_groupings(
	cfg: &zmage_config::LlmProviderConfig,
	assets: &[AssetSummary],
	existing_names: &[String],
) -> Result<Vec<GroupingSuggestion>> {
	let shown = &assets[..assets.len().min(MAX_PROMPT_ASSETS)];
	let existing =
		if existing_names.is_empty() { "none".to_string() } else { existing_names.join(", ") };
	let prompt = format!(
		"Suggest new photo albums for the assets below.\n\
Existing albums: {existing}\n\
Assets:\n{}\n\
Group assets that share a theme, event, time period or scene. Each album needs at least three \
assets and must not duplicate an existing album. Return at most five suggestions as JSON only:\n\
{{\"suggestions\": [{{\"name\": \"album name\", \"description\": \"album description\", \
\"reason\": \"why these assets belong together\", \"asset_ids\": [1, 2, 3], \"confidence\": 0.85}}]}}",
		serde_json::to_string_pretty(shown)?,
	);
	let messages = vec![serde_json::json!({ "role": "user", "content": prompt })];
	let json = crate::chat_json(cfg, &messages).await?;

	Ok(parse_suggestions(&json))
}

/// Keeps well-formed suggestions and drops the rest. Asset ids are de-duplicated in order.
fn parse_suggestions(json: &Value) -> Vec<GroupingSuggestion> {
	let items = json.get("suggestions").and_then(Value::as_array).cloned().unwrap_or_default();
	let mut out = Vec::with_capacity(items.len());

	for item in items {
		let Some(name) =
			item.get("name").and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
		else {
			continue;
		};
		let mut asset_ids: Vec<i64> = Vec::new();

		for id in item.get("asset_ids").and_then(Value::as_array).into_iter().flatten() {
			if let Some(id) = id.as_i64()
				&& !asset_ids.contains(&id)
			{
				asset_ids.push(id);
			}
		}

		let text = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

		out.push(GroupingSuggestion {
			name: name.to_string(),
			description: text("description"),
			reason: text("reason"),
			asset_ids,
			confidence: item.get("confidence").and_then(Value::as_f64).map(|c| c as f32),
		});
	}

	out
}
