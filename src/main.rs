use std::io;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ts3check::config::ConfigProvider;
use ts3check::plugin::{self, PluginExit};
use ts3check::query::TcpConnector;

/// Diagnostics go to stderr; stdout belongs to the agent section
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ts3check=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[cfg(not(feature = "developer"))]
fn config_provider() -> Box<dyn ConfigProvider> {
    Box::new(ts3check::config::FileConfig::from_env())
}

#[cfg(feature = "developer")]
fn config_provider() -> Box<dyn ConfigProvider> {
    tracing::warn!("Developer build: using compiled-in ServerQuery credentials");
    Box::new(ts3check::config::FixedConfig::developer())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_logging();
    info!("ts3check v{}", env!("CARGO_PKG_VERSION"));

    let provider = config_provider();
    match plugin::run(provider.as_ref(), &TcpConnector, io::stdout()).await {
        Ok(exit) => exit.into(),
        Err(e) => {
            // The plugin ran; only the report could not be delivered
            error!("{:#}", e);
            PluginExit::Completed.into()
        }
    }
}
