use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, asset::AssetType};

/// Payload mirrored next to each vector record. Field names are part of the index wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPayload {
	pub asset_id: i64,
	pub title: Option<String>,
	pub tags: Vec<String>,
	pub asset_type: AssetType,
	pub folder_id: Option<i64>,
}

/// Checks the dimension and scales the vector to unit length.
pub fn l2_normalize(mut vec: Vec<f32>, expected_dim: usize) -> Result<Vec<f32>> {
	if vec.len() != expected_dim {
		return Err(Error::DimensionMismatch { expected: expected_dim, actual: vec.len() });
	}

	let norm = vec.iter().map(|v| f64::from(*v) * f64::from(*v)).sum::<f64>().sqrt();

	if norm == 0.0 || !norm.is_finite() {
		return Err(Error::DegenerateVector);
	}

	for value in &mut vec {
		*value = (f64::from(*value) / norm) as f32;
	}

	Ok(vec)
}

/// Cosine similarity. Zero when either side has no magnitude or the lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}

	let mut dot = 0.0_f64;
	let mut na = 0.0_f64;
	let mut nb = 0.0_f64;

	for (x, y) in a.iter().zip(b.iter()) {
		dot += f64::from(*x) * f64::from(*y);
		na += f64::from(*x) * f64::from(*x);
		nb += f64::from(*y) * f64::from(*y);
	}

	if na == 0.0 || nb == 0.0 {
		return 0.0;
	}

	(dot / (na.sqrt() * nb.sqrt())) as f32
}

/// Descending score order with NaN sorted last.
pub fn cmp_score_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
