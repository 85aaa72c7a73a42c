//! Log output setup.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `level`. With `json` set every event is written as
/// one JSON object per line.
pub fn init(level: &str, json: bool) -> Result<()> {
    let subscriber = tracing_subscriber::registry().with(filter(level));

    if json {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow!("Failed to init logging: {}", e))?;
    } else {
        subscriber
            .with(fmt::layer().with_target(false))
            .try_init()
            .map_err(|e| anyhow!("Failed to init logging: {}", e))?;
    }

    Ok(())
}
