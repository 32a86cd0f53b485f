pub mod albums;
pub mod assets;
pub mod blob;
pub mod db;
pub mod models;
pub mod qdrant;
pub mod schema;
pub mod tasks;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;
