/// Check_MK agent section writer
///
/// The report is append-only: the section header is written the moment a
/// report is opened, and every status line after it is flushed as soon as it
/// is known. Nothing is buffered for later, so a run that stops early still
/// leaves a well-formed prefix on stdout.

use std::io::{self, Write};

use crate::query::VersionInfo;
use crate::session::VirtualServerSnapshot;

/// Agent section header, always the first line
pub const SECTION_HEADER: &str = "<<<Teamspeak3>>>";

/// Placeholder for values that could not be read
const NONE: &str = "None";

pub struct Report<W: Write> {
    out: W,
}

impl<W: Write> Report<W> {
    /// Open a report and write the section header
    pub fn begin(out: W) -> io::Result<Self> {
        let mut report = Self { out };
        report.line(SECTION_HEADER)?;
        Ok(report)
    }

    pub fn config_ok(&mut self) -> io::Result<()> {
        self.line("ConfigError: No")
    }

    pub fn config_error(&mut self, code: u8) -> io::Result<()> {
        self.line(&format!("ConfigError: Yes, {}", code))
    }

    pub fn reachable(&mut self, reachable: bool) -> io::Result<()> {
        self.line(&format!("QueryPortReachable: {}", yes_no(reachable)))
    }

    pub fn auth(&mut self, success: bool) -> io::Result<()> {
        self.line(&format!("AuthSuccess: {}", yes_no(success)))
    }

    /// Version block; all three lines read `None` when the query failed
    pub fn version(&mut self, info: Option<&VersionInfo>) -> io::Result<()> {
        let (version, platform, build) = match info {
            Some(info) => (info.version.as_str(), info.platform.as_str(), info.build.as_str()),
            None => (NONE, NONE, NONE),
        };
        self.line(&format!("Version: {}", version))?;
        self.line(&format!("Platform: {}", platform))?;
        self.line(&format!("Build: {}", build))
    }

    pub fn virtual_server(&mut self, snapshot: &VirtualServerSnapshot) -> io::Result<()> {
        self.line(&format_virtual_server(snapshot))
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{}", line)?;
        self.out.flush()
    }
}

/// `VirtualServer: (port status clients max channels autostart in out)`
///
/// `status` is written verbatim. The collector splits on spaces, so a status
/// containing one would shift every later field; TeamSpeak only reports
/// single-word states.
pub fn format_virtual_server(snapshot: &VirtualServerSnapshot) -> String {
    format!(
        "VirtualServer: ({} {} {} {} {} {} {} {})",
        snapshot.port,
        snapshot.status,
        snapshot.clients_online,
        snapshot.max_clients,
        snapshot.channels_online,
        if snapshot.auto_start { "yes" } else { "no" },
        snapshot.ingress_bytes_total,
        snapshot.egress_bytes_total,
    )
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}
