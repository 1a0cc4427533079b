mod cli;
mod commands;

use clap::Parser;
use cli::Cli;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let defaults = match &cli.config {
        Some(path) => cbtainers_config::load_from(path)?,
        None => cbtainers_config::load_defaults()?,
    };
    let spec = cli.cluster_spec(&defaults);
    let settings = cli.settings(&defaults);

    if cli.teardown {
        commands::down::handle(&spec, &settings).await
    } else {
        commands::up::handle(&spec, settings, cli.json).await
    }
}
