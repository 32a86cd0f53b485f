use std::{
	io::ErrorKind,
	path::{Component, Path, PathBuf},
};

use tokio::fs;
use uuid::Uuid;

use crate::{Error, Result};

/// Object store backed by a local directory. Object paths are relative, `/`-separated keys.
pub struct FsBlobStore {
	pub root: PathBuf,
}
impl FsBlobStore {
	pub fn new(cfg: &zmage_config::Blob) -> Self {
		Self { root: cfg.root.clone() }
	}

	/// Writes the object through a temporary sibling and a rename, so readers never see a
	/// partially written blob. The file system keeps no content type; it is only logged.
	pub async fn put(&self, path: &str, bytes: &[u8], content_type: &str) -> Result<()> {
		let target = self.resolve(path)?;

		if let Some(parent) = target.parent() {
			fs::create_dir_all(parent).await.map_err(|err| io_error(path, err))?;
		}

		let tmp = target.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));

		fs::write(&tmp, bytes).await.map_err(|err| io_error(path, err))?;

		if let Err(err) = fs::rename(&tmp, &target).await {
			let _ = fs::remove_file(&tmp).await;

			return Err(io_error(path, err));
		}

		tracing::debug!(path, content_type, size = bytes.len(), "Blob written.");

		Ok(())
	}

	pub async fn get(&self, path: &str) -> Result<Vec<u8>> {
		let target = self.resolve(path)?;

		match fs::read(&target).await {
			Ok(bytes) => Ok(bytes),
			Err(err) if err.kind() == ErrorKind::NotFound =>
				Err(Error::NotFound(format!("Blob {path:?} does not exist."))),
			Err(err) => Err(io_error(path, err)),
		}
	}

	/// Returns whether an object was removed. Deleting a missing object is not an error.
	pub async fn delete(&self, path: &str) -> Result<bool> {
		let target = self.resolve(path)?;

		match fs::remove_file(&target).await {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
			Err(err) => Err(io_error(path, err)),
		}
	}

	pub async fn exists(&self, path: &str) -> Result<bool> {
		let target = self.resolve(path)?;

		fs::try_exists(&target).await.map_err(|err| io_error(path, err))
	}

	fn resolve(&self, path: &str) -> Result<PathBuf> {
		let relative = Path::new(path);

		if path.trim().is_empty() {
			return Err(Error::InvalidArgument("Blob path must be non-empty.".to_string()));
		}
		if !relative.components().all(|component| matches!(component, Component::Normal(_))) {
			return Err(Error::InvalidArgument(format!(
				"Blob path {path:?} must be relative and must not contain '..'."
			)));
		}

		Ok(self.root.join(relative))
	}
}

fn io_error(path: &str, source: std::io::Error) -> Error {
	Error::Io { path: path.to_string(), source }
}
