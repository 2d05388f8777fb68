//! Shared test utilities: an in-process mock ServerQuery endpoint

#![allow(dead_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use ts3check::query::codec::{escape, unescape};

pub const WELCOME: &str = "TS3\n\rWelcome to the TeamSpeak 3 ServerQuery interface, type \"help\" for a list of commands and \"help <command>\" for information on a specific command.\n\r";

/// One virtual server hosted by the mock
#[derive(Clone, Debug)]
pub struct MockVirtualServer {
    pub id: u64,
    pub port: u16,
    pub status: &'static str,
    pub clients_online: u32,
    pub max_clients: u32,
    pub channels_online: u32,
    pub auto_start: bool,
    /// (received, sent); `None` behaves like a stopped server
    pub traffic: Option<(u64, u64)>,
}

impl MockVirtualServer {
    pub fn online(id: u64, port: u16, received: u64, sent: u64) -> Self {
        Self {
            id,
            port,
            status: "online",
            clients_online: 3,
            max_clients: 32,
            channels_online: 6,
            auto_start: true,
            traffic: Some((received, sent)),
        }
    }

    pub fn stopped(id: u64, port: u16) -> Self {
        Self {
            id,
            port,
            status: "offline",
            clients_online: 0,
            max_clients: 10,
            channels_online: 0,
            auto_start: false,
            traffic: None,
        }
    }

    fn record(&self) -> String {
        format!(
            "virtualserver_id={} virtualserver_port={} virtualserver_status={} \
             virtualserver_clientsonline={} virtualserver_queryclientsonline=1 \
             virtualserver_maxclients={} virtualserver_uptime=3600 \
             virtualserver_name={} virtualserver_autostart={} \
             virtualserver_channelsonline={}",
            self.id,
            self.port,
            self.status,
            self.clients_online,
            self.max_clients,
            escape(&format!("Server #{} | main", self.id)),
            if self.auto_start { 1 } else { 0 },
            self.channels_online,
        )
    }
}

/// Scripted behavior of the mock endpoint
#[derive(Clone, Debug)]
pub struct MockOptions {
    /// Banner sent on connect; `None` keeps the peer silent
    pub banner: Option<String>,
    pub user: String,
    pub password: String,
    pub version_fails: bool,
    pub list_fails: bool,
    pub servers: Vec<MockVirtualServer>,
}

impl Default for MockOptions {
    fn default() -> Self {
        Self {
            banner: Some(WELCOME.to_string()),
            user: "serveradmin".to_string(),
            password: "secret".to_string(),
            version_fails: false,
            list_fails: false,
            servers: Vec::new(),
        }
    }
}

/// Accepts a single connection and answers it per `MockOptions`
pub struct MockServer {
    addr: SocketAddr,
    handle: thread::JoinHandle<Vec<String>>,
}

impl MockServer {
    pub fn start(options: MockOptions) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let (stream, _) = match listener.accept() {
                Ok(conn) => conn,
                Err(_) => return Vec::new(),
            };
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();
            serve(stream, &options)
        });

        Self { addr, handle }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    /// Wait for the connection to end and return the commands received
    pub fn finish(self) -> Vec<String> {
        self.handle.join().expect("mock server thread panicked")
    }
}

fn serve(stream: TcpStream, options: &MockOptions) -> Vec<String> {
    let mut writer = stream.try_clone().unwrap();
    let reader = BufReader::new(stream);
    let mut commands = Vec::new();
    let mut selected: Option<u64> = None;

    match &options.banner {
        Some(banner) => {
            if writer.write_all(banner.as_bytes()).is_err() {
                return commands;
            }
        }
        None => {
            // Silent peer: hold the connection until the client gives up
            for line in reader.lines() {
                if line.is_err() {
                    break;
                }
            }
            return commands;
        }
    }

    for line in reader.lines() {
        let Ok(line) = line else { break };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        commands.push(line.clone());

        let mut parts = line.split(' ');
        let name = parts.next().unwrap_or_default();
        let args: Vec<(String, String)> = parts
            .filter_map(|token| token.split_once('='))
            .map(|(k, v)| (k.to_string(), unescape(v)))
            .collect();
        let arg = |key: &str| {
            args.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        };

        let reply = match name {
            "login" => {
                if arg("client_login_name") == options.user
                    && arg("client_login_password") == options.password
                {
                    ok()
                } else {
                    error(520, "invalid loginname or password")
                }
            }
            "version" => {
                if options.version_fails {
                    error(1281, "database empty result set")
                } else {
                    format!("version=3.13.7 build=1655727713 platform=Linux\n\r{}", ok())
                }
            }
            "serverlist" => {
                if options.list_fails {
                    error(2568, "insufficient client permissions")
                } else if options.servers.is_empty() {
                    error(1281, "database empty result set")
                } else {
                    let records: Vec<String> =
                        options.servers.iter().map(MockVirtualServer::record).collect();
                    format!("{}\n\r{}", records.join("|"), ok())
                }
            }
            "use" => {
                let sid: u64 = arg("sid").parse().unwrap_or(0);
                if options.servers.iter().any(|s| s.id == sid) {
                    selected = Some(sid);
                    ok()
                } else {
                    error(1024, "invalid serverID")
                }
            }
            "serverrequestconnectioninfo" => {
                let traffic = selected
                    .and_then(|sid| options.servers.iter().find(|s| s.id == sid))
                    .and_then(|s| s.traffic);
                match traffic {
                    Some((received, sent)) => format!(
                        "connection_filetransfer_bandwidth_sent=0 connection_packets_sent_total=42 \
                         connection_bytes_sent_total={} connection_packets_received_total=40 \
                         connection_bytes_received_total={}\n\r{}",
                        sent,
                        received,
                        ok()
                    ),
                    None => error(1033, "server is not running"),
                }
            }
            "quit" => {
                let _ = writer.write_all(ok().as_bytes());
                break;
            }
            _ => error(256, "command not found"),
        };

        if writer.write_all(reply.as_bytes()).is_err() {
            break;
        }
    }

    commands
}

fn ok() -> String {
    "error id=0 msg=ok\n\r".to_string()
}

fn error(id: u32, msg: &str) -> String {
    format!("error id={} msg={}\n\r", id, escape(msg))
}

/// Address with nothing listening on it
pub fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Fresh config directory under the system temp dir
pub fn config_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ts3check-{}-{}", std::process::id(), name));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
