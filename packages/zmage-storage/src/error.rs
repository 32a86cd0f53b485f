#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Corrupt row: {0}")]
	Decode(String),
	#[error(transparent)]
	Qdrant(#[from] Box<qdrant_client::QdrantError>),
	#[error("Blob store I/O failed for {path:?}.")]
	Io { path: String, source: std::io::Error },
}
impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant(Box::new(err))
	}
}
impl From<zmage_domain::Error> for Error {
	fn from(err: zmage_domain::Error) -> Self {
		Self::Decode(err.to_string())
	}
}

/// Maps a unique-constraint violation to [`Error::Conflict`], passing other errors through.
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: &str) -> Error {
	if let sqlx::Error::Database(db_err) = &err
		&& db_err.is_unique_violation()
	{
		return Error::Conflict(message.to_string());
	}

	Error::Sqlx(err)
}
