use std::fmt;
use std::net::SocketAddr;

use super::parsers::smtp::{SmtpReply, SmtpRequest};

/// Direction of data flow in a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server, the "sent" leg.
    ToServer,
    /// Server to client, the "received" leg.
    ToClient,
}

impl Direction {
    /// Return a string representation of the direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToServer => "sent",
            Direction::ToClient => "received",
        }
    }

    pub fn reverse(&self) -> Direction {
        match self {
            Direction::ToServer => Direction::ToClient,
            Direction::ToClient => Direction::ToServer,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a handler factory learns about the connection it serves.
#[derive(Debug, Clone)]
pub struct StreamContext {
    pub connection_id: u64,
    pub client: SocketAddr,
    pub server: SocketAddr,
    /// The registered port that selected the handler.
    pub service_port: u16,
}

/// Request half of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Smtp(SmtpRequest),
}

impl Request {
    pub fn as_smtp(&self) -> Option<&SmtpRequest> {
        match self {
            Request::Smtp(request) => Some(request),
        }
    }
}

/// Reply half of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Smtp(SmtpReply),
}

impl Reply {
    pub fn as_smtp(&self) -> Option<&SmtpReply> {
        match self {
            Reply::Smtp(reply) => Some(reply),
        }
    }
}

/// One request/reply pair recovered from a connection.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Capture time of the last packet that contributed, in seconds.
    pub timestamp: f64,
    pub protocol: &'static str,
    pub connection_id: u64,
    pub client: SocketAddr,
    pub server: SocketAddr,
    pub request: Request,
    pub reply: Reply,
}
