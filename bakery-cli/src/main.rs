use anyhow::Result;
use bakery_cli::app;

#[tokio::main]
async fn main() -> Result<()> {
    app::run().await
}
