pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("An asset with content hash {content_hash} already exists.")]
	DuplicateContent { content_hash: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Processing asset {asset_id} failed: {message}")]
	Processing { asset_id: i64, message: String },
	#[error("{service} is unavailable: {message}")]
	Unavailable { service: &'static str, message: String },
	#[error("Validation error: {message}")]
	Validation { message: String },
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Conflict: {message}")]
	Conflict { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
}
impl Error {
	pub(crate) fn not_found(what: &str, id: i64) -> Self {
		Self::NotFound { message: format!("{what} {id} does not exist.") }
	}

	pub(crate) fn blob_store(err: zmage_storage::Error) -> Self {
		Self::Unavailable { service: "Blob store", message: err.to_string() }
	}

	pub(crate) fn vector_index(err: zmage_storage::Error) -> Self {
		Self::Unavailable { service: "Vector index", message: err.to_string() }
	}
}

impl From<zmage_storage::Error> for Error {
	fn from(err: zmage_storage::Error) -> Self {
		match err {
			zmage_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			zmage_storage::Error::NotFound(message) => Self::NotFound { message },
			zmage_storage::Error::Conflict(message) => Self::Conflict { message },
			zmage_storage::Error::Qdrant(inner) =>
				Self::Unavailable { service: "Vector index", message: inner.to_string() },
			err @ zmage_storage::Error::Io { .. } =>
				Self::Unavailable { service: "Blob store", message: err.to_string() },
			err @ (zmage_storage::Error::Sqlx(_) | zmage_storage::Error::Decode(_)) =>
				Self::Storage { message: err.to_string() },
		}
	}
}

impl From<zmage_domain::Error> for Error {
	fn from(err: zmage_domain::Error) -> Self {
		match err {
			zmage_domain::Error::InvalidRule { .. }
			| zmage_domain::Error::InvalidRuleValue { .. } =>
				Self::Validation { message: err.to_string() },
			zmage_domain::Error::DimensionMismatch { .. } | zmage_domain::Error::DegenerateVector =>
				Self::Provider { message: err.to_string() },
			zmage_domain::Error::UnknownVariant { .. }
			| zmage_domain::Error::IllegalTaskTransition { .. } =>
				Self::InvalidRequest { message: err.to_string() },
		}
	}
}

impl From<color_eyre::Report> for Error {
	fn from(err: color_eyre::Report) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
