use std::{
    io::{Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info};

use crate::TyrantError;

use super::{ProtocolTransport, Request, ResponseCode};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1978;

/// Socket timeouts. `None` leaves the operating system default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Option<Duration>,
    pub read: Option<Duration>,
    pub write: Option<Duration>,
}

impl Timeouts {
    /// Same limit for connecting, reading and writing.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            connect: Some(timeout),
            read: Some(timeout),
            write: Some(timeout),
        }
    }
}

/// Where and how to open a [`Session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub timeouts: Timeouts,
    /// Disable Nagle's algorithm; requests are small and strictly sequential.
    pub nodelay: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            timeouts: Timeouts::default(),
            nodelay: true,
        }
    }
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// One persistent connection to a Tyrant server.
///
/// Exactly one request is in flight at a time: every command writes its
/// request and reads the complete reply before returning, and `&mut self`
/// keeps callers from interleaving. Independent work needs independent
/// sessions. An open key iteration (`iterinit`) is scoped to the session.
pub struct Session<S: Read + Write = TcpStream> {
    transport: ProtocolTransport<S>,
    endpoint: Option<(String, u16)>,
}

impl Session<TcpStream> {
    pub fn connect(config: &SessionConfig) -> Result<Self, TyrantError> {
        let stream = match config.timeouts.connect {
            Some(timeout) => connect_with_timeout(&config.host, config.port, timeout)?,
            None => TcpStream::connect((config.host.as_str(), config.port))?,
        };
        stream.set_nodelay(config.nodelay)?;
        stream.set_read_timeout(config.timeouts.read)?;
        stream.set_write_timeout(config.timeouts.write)?;

        info!("connected to {}:{}", config.host, config.port);
        Ok(Self {
            transport: ProtocolTransport::new(stream),
            endpoint: Some((config.host.clone(), config.port)),
        })
    }

    /// Shuts the socket down. The session cannot be used afterwards.
    pub fn close(self) -> Result<(), TyrantError> {
        info!("closing session to {}", self.describe());
        self.transport.get_ref().shutdown(Shutdown::Both)?;
        Ok(())
    }
}

fn connect_with_timeout(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<TcpStream, TyrantError> {
    let mut last = None;
    for addr in (host, port).to_socket_addrs()? {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!("connecting to {addr} failed: {e}");
                last = Some(e);
            }
        }
    }
    Err(match last {
        Some(e) => e.into(),
        None => std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("'{host}:{port}' did not resolve to any address"),
        )
        .into(),
    })
}

impl<S: Read + Write> Session<S> {
    /// Wraps an already connected stream.
    pub fn from_stream(stream: S) -> Self {
        Self {
            transport: ProtocolTransport::new(stream),
            endpoint: None,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.endpoint.as_ref().map(|(host, _)| host.as_str())
    }

    pub fn port(&self) -> Option<u16> {
        self.endpoint.as_ref().map(|(_, port)| *port)
    }

    pub fn get_ref(&self) -> &S {
        self.transport.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut S {
        self.transport.get_mut()
    }

    pub fn into_inner(self) -> S {
        self.transport.into_inner()
    }

    fn describe(&self) -> String {
        match &self.endpoint {
            Some((host, port)) => format!("{host}:{port}"),
            None => "<stream>".to_string(),
        }
    }

    /// Sends `request` and reads the status byte, mapping failures to errors.
    ///
    /// On success the transport is handed back positioned at the reply body.
    pub(crate) fn execute(
        &mut self,
        request: Request,
    ) -> Result<&mut ProtocolTransport<S>, TyrantError> {
        let opcode = request.opcode();
        debug!(
            "sending '{opcode}' with {} fields to {}",
            request.field_count(),
            self.describe()
        );
        self.transport.write_request(&request)?;

        if !request.expects_reply() {
            return Ok(&mut self.transport);
        }

        match self.transport.read_code()? {
            ResponseCode::Success => Ok(&mut self.transport),
            ResponseCode::NoRecord => Err(TyrantError::NotFound),
            ResponseCode::InvalidOperation if request.is_absent_on_failure() => {
                Err(TyrantError::NotFound)
            }
            code => {
                debug!("'{opcode}' failed with {code}");
                Err(TyrantError::Remote {
                    command: opcode,
                    code,
                })
            }
        }
    }
}
