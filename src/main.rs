use clap::Parser;
use cloud_select::cli::{run_cli, Cli};
use env_logger::{Builder, Env};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    Builder::from_env(Env::default().default_filter_or(cli.global.log_level()))
        .format_timestamp(None)
        .init();

    if let Err(e) = run_cli(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
