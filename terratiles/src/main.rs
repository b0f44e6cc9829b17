use anyhow::Result;
use clap::Parser;
use terratiles::{Settings, TerrainServer};

#[tokio::main]
async fn main() -> Result<()> {
	let settings = Settings::parse();

	env_logger::Builder::new()
		.filter_level(settings.logging_level)
		.format_timestamp(None)
		.init();

	TerrainServer::new(settings)?.serve().await
}
