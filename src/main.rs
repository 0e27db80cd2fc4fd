use anyhow::Result;
use clap::Parser;

use tv_agent::daemon::{self, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    daemon::init_tracing();
    let cli = Cli::parse();
    daemon::run(cli).await
}
