/// ServerQuery TCP client
///
/// Speaks the line-oriented admin protocol: a `TS3` greeting on connect, then
/// one command per line, each answered by zero or more data lines and an
/// `error id=.. msg=..` status line. Every network step runs under its own
/// deadline so a peer that accepts TCP but never answers cannot stall the run.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::codec::{command, is_notification, parse_records, parse_status, Record};
use super::types::{ConnectionInfo, VersionInfo, VirtualServer};
use crate::redact;

/// First line every ServerQuery endpoint sends
const GREETING: &str = "TS3";

/// Longest reply line accepted. A `serverlist` of a large instance stays far below this.
pub const MAX_LINE_BYTES: u64 = 1 << 20;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {after:?} during {stage}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("peer is not a ServerQuery endpoint (greeting {0:?})")]
    NotServerQuery(String),

    #[error("server error {id}: {msg}")]
    Server { id: u32, msg: String },

    #[error("malformed reply to {0}")]
    Malformed(&'static str),

    #[error("reply line longer than {0} bytes")]
    LineTooLong(u64),

    #[error("connection closed by server")]
    Closed,
}

/// Byte stream a client can run on
pub trait Transport: AsyncRead + AsyncWrite + Unpin {
    /// Last-gasp release hook, called from `Drop`. Must not block.
    fn release(&self) {}
}

impl Transport for TcpStream {
    fn release(&self) {
        // Polite logout; the socket closes right after regardless
        let _ = self.try_write(b"quit\n");
    }
}

/// The protocol operations the query session needs
#[allow(async_fn_in_trait)]
pub trait ServerQuery {
    async fn login(&mut self, user: &str, password: &str) -> Result<(), QueryError>;
    async fn version(&mut self) -> Result<VersionInfo, QueryError>;
    async fn server_list(&mut self) -> Result<Vec<VirtualServer>, QueryError>;
    /// Make `id` the active virtual server for later commands
    async fn use_server(&mut self, id: u64) -> Result<(), QueryError>;
    /// Traffic counters of the active virtual server
    async fn connection_info(&mut self) -> Result<ConnectionInfo, QueryError>;
}

/// Opens ServerQuery connections
#[allow(async_fn_in_trait)]
pub trait Connector {
    type Connection: ServerQuery;

    async fn connect(&self, address: &str, deadline: Duration) -> Result<Self::Connection, QueryError>;
}

/// Connects over plain TCP
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Connection = QueryClient<TcpStream>;

    async fn connect(&self, address: &str, deadline: Duration) -> Result<Self::Connection, QueryError> {
        QueryClient::connect(address, deadline).await
    }
}

/// One ServerQuery connection. The stream is released when this is dropped.
pub struct QueryClient<S: Transport = TcpStream> {
    stream: BufStream<S>,
    deadline: Duration,
}

impl QueryClient<TcpStream> {
    pub async fn connect(address: &str, deadline: Duration) -> Result<Self, QueryError> {
        debug!("Connecting to ServerQuery at {}", address);
        let stream = timeout(deadline, TcpStream::connect(address))
            .await
            .map_err(|_| QueryError::Timeout { stage: "connect", after: deadline })??;
        Self::handshake(stream, deadline).await
    }
}

impl<S: Transport> QueryClient<S> {
    /// Wrap an open stream and consume the greeting
    pub async fn handshake(stream: S, deadline: Duration) -> Result<Self, QueryError> {
        let mut client = Self {
            stream: BufStream::new(stream),
            deadline,
        };

        let banner = timeout(deadline, client.read_line())
            .await
            .map_err(|_| QueryError::Timeout { stage: "greeting", after: deadline })??;
        if banner != GREETING {
            return Err(QueryError::NotServerQuery(banner));
        }

        let welcome = timeout(deadline, client.read_line())
            .await
            .map_err(|_| QueryError::Timeout { stage: "greeting", after: deadline })??;
        trace!("ServerQuery welcome: {}", welcome);

        Ok(client)
    }

    /// Run one command and collect the records of its reply
    pub async fn execute(&mut self, stage: &'static str, line: &str) -> Result<Vec<Record>, QueryError> {
        let deadline = self.deadline;
        timeout(deadline, self.round_trip(line))
            .await
            .map_err(|_| QueryError::Timeout { stage, after: deadline })?
    }

    async fn round_trip(&mut self, line: &str) -> Result<Vec<Record>, QueryError> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;

        let mut records = Vec::new();
        loop {
            let reply = self.read_line().await?;
            if reply.is_empty() || is_notification(&reply) {
                continue;
            }
            if let Some(status) = parse_status(&reply) {
                if status.is_ok() || status.is_empty_result() {
                    return Ok(records);
                }
                return Err(QueryError::Server {
                    id: status.id,
                    msg: status.msg,
                });
            }
            records.extend(parse_records(&reply));
        }
    }

    /// Read one line of at most `MAX_LINE_BYTES`. The server terminates lines
    /// with `\n\r`, so the `\r` shows up at the start of the following line.
    async fn read_line(&mut self) -> Result<String, QueryError> {
        let mut buf = Vec::new();
        let n = (&mut self.stream)
            .take(MAX_LINE_BYTES)
            .read_until(b'\n', &mut buf)
            .await?;
        if n == 0 {
            return Err(QueryError::Closed);
        }
        if n as u64 == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            return Err(QueryError::LineTooLong(MAX_LINE_BYTES));
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_matches(|c| c == '\r' || c == '\n')
            .to_string();
        trace!("ServerQuery <- {}", line);
        Ok(line)
    }
}

impl<S: Transport> ServerQuery for QueryClient<S> {
    async fn login(&mut self, user: &str, password: &str) -> Result<(), QueryError> {
        debug!("Logging in as {}", redact::login_name(user));
        let line = command(
            "login",
            &[("client_login_name", user), ("client_login_password", password)],
        );
        self.execute("login", &line).await.map(|_| ())
    }

    async fn version(&mut self) -> Result<VersionInfo, QueryError> {
        let records = self.execute("version", "version").await?;
        records
            .first()
            .map(VersionInfo::from_record)
            .ok_or(QueryError::Malformed("version"))
    }

    async fn server_list(&mut self) -> Result<Vec<VirtualServer>, QueryError> {
        let records = self.execute("serverlist", "serverlist").await?;
        Ok(records.iter().map(VirtualServer::from_record).collect())
    }

    async fn use_server(&mut self, id: u64) -> Result<(), QueryError> {
        let sid = id.to_string();
        let line = command("use", &[("sid", sid.as_str())]);
        self.execute("use", &line).await.map(|_| ())
    }

    async fn connection_info(&mut self) -> Result<ConnectionInfo, QueryError> {
        let records = self
            .execute("serverrequestconnectioninfo", "serverrequestconnectioninfo")
            .await?;
        records
            .first()
            .map(ConnectionInfo::from_record)
            .ok_or(QueryError::Malformed("serverrequestconnectioninfo"))
    }
}

impl<S: Transport> Drop for QueryClient<S> {
    fn drop(&mut self) {
        debug!("Releasing ServerQuery connection");
        self.stream.get_ref().release();
    }
}
