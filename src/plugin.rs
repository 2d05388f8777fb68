/// One plugin invocation: resolve config, open the report, run the session
///
/// Exit status is coarse: 1 means the plugin itself is
/// misconfigured, 0 means the report describes the server, however degraded.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::ExitCode;
use tracing::{error, info};

use crate::config::{self, ConfigProvider};
use crate::query::Connector;
use crate::report::Report;
use crate::session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginExit {
    /// The report describes the server
    Completed,
    /// The configuration could not be resolved
    Misconfigured,
}

impl PluginExit {
    pub fn code(self) -> u8 {
        match self {
            PluginExit::Completed => 0,
            PluginExit::Misconfigured => 1,
        }
    }
}

impl From<PluginExit> for ExitCode {
    fn from(exit: PluginExit) -> Self {
        ExitCode::from(exit.code())
    }
}

pub async fn run<P, K, W>(provider: &P, connector: &K, out: W) -> Result<PluginExit>
where
    P: ConfigProvider + ?Sized,
    K: Connector,
    W: Write,
{
    let config = match config::resolve(provider) {
        Ok(config) => config,
        Err(e) => {
            let code = e.code();
            error!("Configuration error {}: {:#}", code, anyhow::Error::new(e));
            // The exit status carries the failure even when stdout is gone
            if let Err(e) = Report::begin(out).and_then(|mut report| report.config_error(code)) {
                error!("Failed to write report: {}", e);
            }
            return Ok(PluginExit::Misconfigured);
        }
    };

    let mut report = Report::begin(out).context("Failed to write report header")?;
    report.config_ok().context("Failed to write report")?;

    let outcome = session::run(connector, &config, &mut report)
        .await
        .context("Failed to write report")?;
    info!("ServerQuery session finished: {:?}", outcome);

    Ok(PluginExit::Completed)
}
