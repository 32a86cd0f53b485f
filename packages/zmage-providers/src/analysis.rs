use base64::{Engine, engine::general_purpose::STANDARD};
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANALYSIS_PROMPT: &str = "\
Analyze this image and answer with a single JSON object using exactly these keys:
{\"title\": \"one-line descriptive title\", \
\"description\": \"two or three sentences covering scene, subject and mood\", \
\"tags\": [\"five or more specific, searchable tags\"], \
\"ocr_text\": \"all text visible in the image, or an empty string\"}
Return JSON only.";

/// Derived metadata for an image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAnalysis {
	pub title: Option<String>,
	pub description: Option<String>,
	pub tags: Vec<String>,
	pub ocr_text: Option<String>,
}

pub async fn analyze_image(
	cfg: &zmage_config::LlmProviderConfig,
	bytes: &[u8],
	mime: &str,
) -> Result<ImageAnalysis> {
	let data_url = format!("data:{mime};base64,{}", STANDARD.encode(bytes));
	let messages = vec![serde_json::json!({
		"role": "user",
		"content": [
			{ "type": "text", "text": ANALYSIS_PROMPT },
			{ "type": "image_url", "image_url": { "url": data_url } },
		],
	})];
	let json = crate::chat_json(cfg, &messages).await?;

	Ok(parse_analysis(&json))
}

/// Lenient field extraction. Missing or mistyped fields become empty rather than failing the run.
fn parse_analysis(json: &Value) -> ImageAnalysis {
	let text = |key: &str| {
		json.get(key)
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
	};
	let mut tags: Vec<String> = Vec::new();

	for tag in json.get("tags").and_then(Value::as_array).into_iter().flatten() {
		if let Some(tag) = tag.as_str().map(str::trim).filter(|s| !s.is_empty())
			&& !tags.iter().any(|existing| existing == tag)
		{
			tags.push(tag.to_string());
		}
	}

	ImageAnalysis {
		title: text("title"),
		description: text("description"),
		tags,
		ocr_text: text("ocr_text"),
	}
}
