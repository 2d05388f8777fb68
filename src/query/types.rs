/// Typed views over ServerQuery reply records

use super::codec::Record;

/// Reply of the `version` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub platform: String,
    pub build: String,
}

impl VersionInfo {
    pub fn from_record(record: &Record) -> Self {
        Self {
            version: record.text("version"),
            platform: record.text("platform"),
            build: record.text("build"),
        }
    }
}

/// One entry of the `serverlist` reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualServer {
    pub id: u64,
    pub port: u16,
    pub status: String,
    pub clients_online: u32,
    pub max_clients: u32,
    pub channels_online: u32,
    pub auto_start: bool,
}

impl VirtualServer {
    pub fn from_record(record: &Record) -> Self {
        Self {
            id: record.number("virtualserver_id"),
            port: record.number("virtualserver_port"),
            status: record.text("virtualserver_status"),
            clients_online: record.number("virtualserver_clientsonline"),
            max_clients: record.number("virtualserver_maxclients"),
            channels_online: record.number("virtualserver_channelsonline"),
            auto_start: record.flag("virtualserver_autostart"),
        }
    }
}

/// Traffic counters from `serverrequestconnectioninfo`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub bytes_received_total: u64,
    pub bytes_sent_total: u64,
}

impl ConnectionInfo {
    pub fn from_record(record: &Record) -> Self {
        Self {
            bytes_received_total: record.number("connection_bytes_received_total"),
            bytes_sent_total: record.number("connection_bytes_sent_total"),
        }
    }
}
