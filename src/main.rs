use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    paperchat::run().await
}
