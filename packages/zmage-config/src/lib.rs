mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Blob, Config, EmbeddingProviderConfig, LlmProviderConfig, Postgres, Processing, Providers,
	Qdrant, Reconciliation, Search, Service, SmartRules, Storage,
};

use std::{fs, path::Path};

/// Upper bound on rows a smart-rule evaluation may return.
pub const SMART_RULES_RESULT_CAP: u32 = 500;
/// Lower bound on the semantic search oversample factor.
pub const MIN_OVERSAMPLE_FACTOR: u32 = 5;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.storage.qdrant.collection.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.qdrant.collection must be non-empty.".to_string(),
		});
	}
	if cfg.storage.blob.root.as_os_str().is_empty() {
		return Err(Error::Validation {
			message: "storage.blob.root must be non-empty.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.qdrant.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.qdrant.vector_dim."
				.to_string(),
		});
	}

	for (label, key) in [
		("embedding", &cfg.providers.embedding.api_key),
		("analysis", &cfg.providers.analysis.api_key),
		("suggestion", &cfg.providers.suggestion.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.processing.lease_seconds <= 0 {
		return Err(Error::Validation {
			message: "processing.lease_seconds must be greater than zero.".to_string(),
		});
	}
	if cfg.search.oversample_factor < MIN_OVERSAMPLE_FACTOR {
		return Err(Error::Validation {
			message: format!(
				"search.oversample_factor must be at least {MIN_OVERSAMPLE_FACTOR}."
			),
		});
	}
	if cfg.search.default_page_size == 0 {
		return Err(Error::Validation {
			message: "search.default_page_size must be greater than zero.".to_string(),
		});
	}
	if cfg.search.default_page_size > cfg.search.max_page_size {
		return Err(Error::Validation {
			message: "search.default_page_size must be at most search.max_page_size.".to_string(),
		});
	}
	if u64::from(cfg.search.max_candidates)
		< u64::from(cfg.search.max_page_size) * u64::from(cfg.search.oversample_factor)
	{
		return Err(Error::Validation {
			message: "search.max_candidates must be at least search.max_page_size multiplied by search.oversample_factor."
				.to_string(),
		});
	}
	if !(1..=SMART_RULES_RESULT_CAP).contains(&cfg.smart_rules.max_results) {
		return Err(Error::Validation {
			message: format!(
				"smart_rules.max_results must be in the range 1-{SMART_RULES_RESULT_CAP}."
			),
		});
	}

	let rec = &cfg.reconciliation;

	if rec.suggestion_interval_hours == 0 {
		return Err(Error::Validation {
			message: "reconciliation.suggestion_interval_hours must be greater than zero."
				.to_string(),
		});
	}
	if rec.suggestion_min_group_size == 0 {
		return Err(Error::Validation {
			message: "reconciliation.suggestion_min_group_size must be greater than zero."
				.to_string(),
		});
	}
	if rec.suggestion_max_assets < rec.suggestion_min_assets {
		return Err(Error::Validation {
			message: "reconciliation.suggestion_max_assets must be at least reconciliation.suggestion_min_assets."
				.to_string(),
		});
	}
	if rec.cleanup_hour >= 24 {
		return Err(Error::Validation {
			message: "reconciliation.cleanup_hour must be in the range 0-23.".to_string(),
		});
	}
	if rec.cleanup_minute >= 60 {
		return Err(Error::Validation {
			message: "reconciliation.cleanup_minute must be in the range 0-59.".to_string(),
		});
	}

	for (label, days) in [
		("reconciliation.suggestion_window_days", rec.suggestion_window_days),
		("reconciliation.trash_retention_days", rec.trash_retention_days),
		(
			"reconciliation.ignored_suggestion_retention_days",
			rec.ignored_suggestion_retention_days,
		),
	] {
		if days <= 0 {
			return Err(Error::Validation {
				message: format!("{label} must be greater than zero."),
			});
		}
	}

	if rec.sweep_batch_size == 0 {
		return Err(Error::Validation {
			message: "reconciliation.sweep_batch_size must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	if cfg
		.providers
		.embedding
		.task_field
		.as_deref()
		.map(|field| field.trim().is_empty())
		.unwrap_or(false)
	{
		cfg.providers.embedding.task_field = None;
	}

	cfg.service.log_level = cfg.service.log_level.trim().to_string();
}
