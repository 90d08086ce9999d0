//! bitswap-peer - Bitswap message codec and responder
//!
//! Decodes captured Bitswap messages and answers want-lists from a block
//! directory, writing length-prefixed response frames.

use bitswap_core::config::Commands;
use bitswap_core::{run_inspect, run_respond, Config};
use std::error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Parse CLI arguments and build config
    let (config, command) = Config::from_cli()?;

    // Initialize logging
    init_logging(&config.log_level, config.log_pretty);

    match command {
        Commands::Inspect(cmd) => {
            let summary = run_inspect(&cmd).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Respond(cmd) => {
            tracing::info!("Answering {:?} from {:?}", cmd.input, config.blocks_dir);
            let summary = run_respond(&config, &cmd).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn init_logging(level: &str, pretty: bool) {
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(level));

    // Logs go to stderr so stdout stays machine readable
    if pretty {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
