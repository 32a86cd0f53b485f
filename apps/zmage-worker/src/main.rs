use clap::Parser;

use zmage_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = Args::parse();

	zmage_worker::run(args).await
}
