use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub processing: Processing,
	#[serde(default)]
	pub search: Search,
	#[serde(default)]
	pub smart_rules: SmartRules,
	#[serde(default)]
	pub reconciliation: Reconciliation,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	pub qdrant: Qdrant,
	pub blob: Blob,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Qdrant {
	pub url: String,
	pub collection: String,
	pub vector_dim: u32,
}

#[derive(Debug, Deserialize)]
pub struct Blob {
	/// Filesystem directory that backs the object store. Object paths are resolved under it.
	pub root: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	pub analysis: LlmProviderConfig,
	pub suggestion: LlmProviderConfig,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
	/// Optional. Request body key used to forward the embedding task type, e.g. "task_type".
	/// The task type is omitted from the request when unset.
	pub task_field: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Processing {
	/// A processing claim older than this is treated as abandoned and may be claimed again.
	pub lease_seconds: i64,
}
impl Default for Processing {
	fn default() -> Self {
		Self { lease_seconds: 600 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Search {
	pub oversample_factor: u32,
	pub max_candidates: u32,
	pub default_page_size: u32,
	pub max_page_size: u32,
}
impl Default for Search {
	fn default() -> Self {
		Self {
			oversample_factor: 5,
			max_candidates: 2_000,
			default_page_size: 50,
			max_page_size: 200,
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SmartRules {
	pub max_results: u32,
}
impl Default for SmartRules {
	fn default() -> Self {
		Self { max_results: 500 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Reconciliation {
	pub suggestion_interval_hours: u32,
	pub suggestion_window_days: i64,
	pub suggestion_max_assets: u32,
	pub suggestion_min_assets: u32,
	pub suggestion_min_group_size: u32,
	pub cleanup_hour: u8,
	pub cleanup_minute: u8,
	pub trash_retention_days: i64,
	pub ignored_suggestion_retention_days: i64,
	pub sweep_batch_size: u32,
}
impl Default for Reconciliation {
	fn default() -> Self {
		Self {
			suggestion_interval_hours: 6,
			suggestion_window_days: 30,
			suggestion_max_assets: 100,
			suggestion_min_assets: 5,
			suggestion_min_group_size: 3,
			cleanup_hour: 3,
			cleanup_minute: 0,
			trash_retention_days: 30,
			ignored_suggestion_retention_days: 30,
			sweep_batch_size: 256,
		}
	}
}
