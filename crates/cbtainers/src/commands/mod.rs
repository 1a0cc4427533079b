pub mod down;
pub mod up;

use cbtainers_container::DockerFabric;
use colored::Colorize;

/// Docker connection with a readable hint on failure
pub async fn connect() -> anyhow::Result<DockerFabric> {
    match DockerFabric::connect().await {
        Ok(fabric) => Ok(fabric),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker connection failed".red().bold());
            eprintln!();
            eprintln!("{}", e);
            Err(anyhow::anyhow!("could not connect to Docker"))
        }
    }
}
