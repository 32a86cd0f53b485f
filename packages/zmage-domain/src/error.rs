pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("Unknown {kind} value {value:?}.")]
	UnknownVariant { kind: &'static str, value: String },
	#[error("{path}: {message}")]
	InvalidRule { path: String, message: String },
	/// The document is well formed but a value in it is unusable.
	#[error("{path}: {message}")]
	InvalidRuleValue { path: String, message: String },
	#[error("Vector has {actual} components, expected {expected}.")]
	DimensionMismatch { expected: usize, actual: usize },
	#[error("Vector has zero or non-finite magnitude.")]
	DegenerateVector,
	#[error("Task cannot move from {from} to {to}.")]
	IllegalTaskTransition { from: &'static str, to: &'static str },
}
