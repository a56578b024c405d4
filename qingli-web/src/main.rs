use anyhow::Result;
use clap::Parser;
use qingli_web::{cli::Cli, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_dir = (!cli.no_log_file).then_some(cli.log_dir.as_path());
    let _guard = logging::init_tracing(&cli.log_level, log_dir)?;

    qingli_web::run(cli).await
}
