//! Deterministic stand-ins for the embedding, analysis and suggestion services.

use std::sync::{
	Mutex,
	atomic::{AtomicBool, AtomicUsize, Ordering},
};

use color_eyre::{Result, eyre};

use zmage_config::{EmbeddingProviderConfig, LlmProviderConfig};
use zmage_providers::{AssetSummary, EmbeddingTask, GroupingSuggestion, ImageAnalysis};
use zmage_service::{AnalysisProvider, BoxFuture, EmbeddingProvider, SuggestionProvider};

/// Bag-of-words embedding: every lowercase alphanumeric token adds one to a hashed bucket.
///
/// Texts sharing more tokens score closer under cosine, and identical texts embed identically,
/// which is enough to exercise ranking without a model.
pub struct HashEmbedding {
	dim: usize,
	calls: AtomicUsize,
	pub fail: AtomicBool,
}
impl HashEmbedding {
	pub fn new(dim: usize) -> Self {
		Self { dim, calls: AtomicUsize::new(0), fail: AtomicBool::new(false) }
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn vector(&self, text: &str) -> Vec<f32> {
		let mut vec = vec![0.0_f32; self.dim.max(1)];

		for token in text
			.split(|ch: char| !ch.is_alphanumeric())
			.filter(|token| !token.is_empty())
			.map(str::to_lowercase)
		{
			let digest = blake3::hash(token.as_bytes());
			let mut head = [0_u8; 8];

			head.copy_from_slice(&digest.as_bytes()[..8]);

			let bucket = (u64::from_le_bytes(head) % vec.len() as u64) as usize;

			vec[bucket] += 1.0;
		}

		if vec.iter().all(|value| *value == 0.0) {
			vec[0] = 1.0;
		}

		vec
	}
}
impl EmbeddingProvider for HashEmbedding {
	fn embed<'a>(
		&'a self,
		_cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
		_task: EmbeddingTask,
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		let out = if self.fail.load(Ordering::SeqCst) {
			Err(eyre::eyre!("Embedding service returned 503."))
		} else {
			Ok(texts.iter().map(|text| self.vector(text)).collect())
		};

		Box::pin(async move { out })
	}
}

/// Returns the same analysis for every image.
#[derive(Default)]
pub struct ScriptedAnalysis {
	analysis: Mutex<ImageAnalysis>,
	pub fail: AtomicBool,
}
impl ScriptedAnalysis {
	pub fn new(analysis: ImageAnalysis) -> Self {
		Self { analysis: Mutex::new(analysis), fail: AtomicBool::new(false) }
	}

	pub fn set(&self, analysis: ImageAnalysis) {
		*self.analysis.lock().unwrap_or_else(|err| err.into_inner()) = analysis;
	}
}
impl AnalysisProvider for ScriptedAnalysis {
	fn analyze<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		_bytes: &'a [u8],
		_mime: &'a str,
	) -> BoxFuture<'a, Result<ImageAnalysis>> {
		let out = if self.fail.load(Ordering::SeqCst) {
			Err(eyre::eyre!("Vision model timed out."))
		} else {
			Ok(self.analysis.lock().unwrap_or_else(|err| err.into_inner()).clone())
		};

		Box::pin(async move { out })
	}
}

type SuggestFn =
	dyn Fn(&[AssetSummary], &[String]) -> Result<Vec<GroupingSuggestion>> + Send + Sync;

/// Suggestion service driven by a closure. Each call's inputs are recorded.
pub struct ScriptedSuggestions {
	respond: Box<SuggestFn>,
	calls: Mutex<Vec<(Vec<AssetSummary>, Vec<String>)>>,
}
impl ScriptedSuggestions {
	pub fn new<F>(respond: F) -> Self
	where
		F: Fn(&[AssetSummary], &[String]) -> Result<Vec<GroupingSuggestion>>
			+ Send
			+ Sync
			+ 'static,
	{
		Self { respond: Box::new(respond), calls: Mutex::new(Vec::new()) }
	}

	pub fn fixed(suggestions: Vec<GroupingSuggestion>) -> Self {
		Self::new(move |_, _| Ok(suggestions.clone()))
	}

	pub fn none() -> Self {
		Self::fixed(Vec::new())
	}

	pub fn calls(&self) -> Vec<(Vec<AssetSummary>, Vec<String>)> {
		self.calls.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl SuggestionProvider for ScriptedSuggestions {
	fn suggest<'a>(
		&'a self,
		_cfg: &'a LlmProviderConfig,
		assets: &'a [AssetSummary],
		existing_names: &'a [String],
	) -> BoxFuture<'a, Result<Vec<GroupingSuggestion>>> {
		self.calls
			.lock()
			.unwrap_or_else(|err| err.into_inner())
			.push((assets.to_vec(), existing_names.to_vec()));

		let out = (self.respond)(assets, existing_names);

		Box::pin(async move { out })
	}
}
