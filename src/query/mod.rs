mod client;
pub mod codec;
mod types;

pub use client::{Connector, QueryClient, QueryError, ServerQuery, TcpConnector, Transport};
pub use types::{ConnectionInfo, VersionInfo, VirtualServer};
