pub mod scheduler;
pub mod worker;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use zmage_service::ZmageService;
use zmage_storage::{blob::FsBlobStore, db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = zmage_cli::VERSION,
	rename_all = "kebab",
	styles = zmage_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = zmage_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	let blobs = FsBlobStore::new(&config.storage.blob);
	let service = ZmageService::new(config, db, qdrant, blobs);

	worker::run_worker(&service).await
}
