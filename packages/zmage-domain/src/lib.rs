pub mod album;
pub mod asset;
pub mod query;
pub mod rules;
pub mod task;
pub mod time_serde;
pub mod vector;

mod error;

pub use error::{Error, Result};
