/// ServerQuery session: the staged health conversation
///
/// Stages run strictly in order: connect → login → version → serverlist →
/// per-server traffic counters. A failing stage ends the conversation and
/// leaves a sentinel in the report, but it never fails the plugin: an
/// unreachable or broken server is a result to report, not a plugin error.

use std::io::{self, Write};
use tracing::{info, warn};

use crate::config::ServerQueryConfig;
use crate::query::{Connector, ServerQuery, VersionInfo, VirtualServer};
use crate::report::Report;


/// Where the session is in its conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Unconnected,
    Reachable,
    Authenticated,
    VersionKnown,
    Enumerated,
    Aborted,
}

/// How the conversation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Unreachable,
    AuthFailed,
    VersionUnknown,
    ListingFailed,
    Completed { servers: usize },
}

/// Per-virtual-server report data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualServerSnapshot {
    pub port: u16,
    pub status: String,
    pub clients_online: u32,
    pub max_clients: u32,
    pub channels_online: u32,
    pub auto_start: bool,
    /// 0 when the server could not report traffic (e.g. it is stopped)
    pub ingress_bytes_total: u64,
    pub egress_bytes_total: u64,
}

impl VirtualServerSnapshot {
    /// Snapshot from listing data alone, counters zeroed
    pub fn from_listing(server: &VirtualServer) -> Self {
        Self {
            port: server.port,
            status: server.status.clone(),
            clients_online: server.clients_online,
            max_clients: server.max_clients,
            channels_online: server.channels_online,
            auto_start: server.auto_start,
            ingress_bytes_total: 0,
            egress_bytes_total: 0,
        }
    }
}

/// An established ServerQuery connection and the state of the conversation.
/// Dropping the session drops the connection, which releases it.
pub struct QuerySession<C: ServerQuery> {
    conn: C,
    stage: Stage,
    selected: Option<u64>,
}

impl<C: ServerQuery> QuerySession<C> {
    /// Wrap a connection that is already reachable
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            stage: Stage::Reachable,
            selected: None,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(
            self.stage,
            Stage::Authenticated | Stage::VersionKnown | Stage::Enumerated
        )
    }

    /// Virtual server currently selected with `use`
    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    pub async fn authenticate(&mut self, user: &str, password: &str) -> bool {
        debug_assert_eq!(self.stage, Stage::Reachable);
        match self.conn.login(user, password).await {
            Ok(()) => {
                self.stage = Stage::Authenticated;
                true
            }
            Err(e) => {
                warn!("ServerQuery login failed: {}", e);
                self.stage = Stage::Aborted;
                false
            }
        }
    }

    pub async fn version(&mut self) -> Option<VersionInfo> {
        debug_assert_eq!(self.stage, Stage::Authenticated);
        match self.conn.version().await {
            Ok(info) => {
                self.stage = Stage::VersionKnown;
                Some(info)
            }
            Err(e) => {
                warn!("ServerQuery version query failed: {}", e);
                self.stage = Stage::Aborted;
                None
            }
        }
    }

    pub async fn enumerate(&mut self) -> Option<Vec<VirtualServer>> {
        debug_assert_eq!(self.stage, Stage::VersionKnown);
        match self.conn.server_list().await {
            Ok(servers) => {
                self.stage = Stage::Enumerated;
                Some(servers)
            }
            Err(e) => {
                warn!("ServerQuery server listing failed: {}", e);
                self.stage = Stage::Aborted;
                None
            }
        }
    }

    /// Select `server` and read its traffic counters. A server that cannot
    /// be selected or reports no counters keeps them at 0.
    pub async fn snapshot(&mut self, server: &VirtualServer) -> VirtualServerSnapshot {
        debug_assert_eq!(self.stage, Stage::Enumerated);
        let mut snapshot = VirtualServerSnapshot::from_listing(server);

        if let Err(e) = self.conn.use_server(server.id).await {
            warn!("Cannot select virtual server {} (port {}): {}", server.id, server.port, e);
            return snapshot;
        }
        self.selected = Some(server.id);

        match self.conn.connection_info().await {
            Ok(info) => {
                snapshot.ingress_bytes_total = info.bytes_received_total;
                snapshot.egress_bytes_total = info.bytes_sent_total;
            }
            Err(e) => {
                warn!(
                    "No connection info for virtual server {} ({}): {}",
                    server.id, server.status, e
                );
            }
        }

        snapshot
    }
}

/// Drive the whole conversation, writing each stage's result as it lands
pub async fn run<K, W>(
    connector: &K,
    config: &ServerQueryConfig,
    report: &mut Report<W>,
) -> io::Result<SessionOutcome>
where
    K: Connector,
    W: Write,
{
    let conn = match connector.connect(&config.server_address, config.timeout).await {
        Ok(conn) => conn,
        Err(e) => {
            warn!("ServerQuery at {} unreachable: {}", config.server_address, e);
            report.reachable(false)?;
            return Ok(SessionOutcome::Unreachable);
        }
    };
    report.reachable(true)?;

    let mut session = QuerySession::new(conn);

    let authenticated = session.authenticate(&config.username, &config.password).await;
    report.auth(authenticated)?;
    if !authenticated {
        return Ok(SessionOutcome::AuthFailed);
    }

    let version = session.version().await;
    report.version(version.as_ref())?;
    if version.is_none() {
        return Ok(SessionOutcome::VersionUnknown);
    }

    let Some(servers) = session.enumerate().await else {
        return Ok(SessionOutcome::ListingFailed);
    };
    info!("{} virtual server(s) listed", servers.len());

    for server in &servers {
        let snapshot = session.snapshot(server).await;
        report.virtual_server(&snapshot)?;
    }

    Ok(SessionOutcome::Completed {
        servers: servers.len(),
    })
}
