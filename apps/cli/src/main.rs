#[tokio::main]
async fn main() -> anyhow::Result<()> {
    notecards_cli::run().await
}
