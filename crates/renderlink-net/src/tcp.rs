use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, info};

use crate::error::{NetError, Result};

/// A bound TCP listening endpoint.
///
/// Workers bind one of these and accept their single control connection;
/// the relay binds one per configured link. Listen specs accept either a
/// full `host:port` address, `:port`, or a bare port number (the latter
/// two bind all interfaces).
pub struct TcpEndpoint {
    listener: TcpListener,
    addr: SocketAddr,
}

impl TcpEndpoint {
    /// Bind and listen on the given spec.
    pub fn bind(spec: &str) -> Result<Self> {
        let addr = normalize_spec(spec)?;
        let listener = TcpListener::bind(&addr).map_err(|e| NetError::Bind {
            addr: addr.clone(),
            source: e,
        })?;
        let addr = listener.local_addr().map_err(|e| NetError::Bind {
            addr,
            source: e,
        })?;
        info!(%addr, "listening");
        Ok(Self { listener, addr })
    }

    /// Accept one incoming connection (blocking).
    pub fn accept(&self) -> Result<TcpStream> {
        let (stream, peer) = self.listener.accept().map_err(NetError::Accept)?;
        stream.set_nodelay(true).map_err(NetError::Accept)?;
        debug!(%peer, "accepted connection");
        Ok(stream)
    }

    /// The address this endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Connect to a remote address (blocking).
pub fn connect(addr: &str) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).map_err(|e| NetError::Connect {
        addr: addr.to_string(),
        source: e,
    })?;
    stream.set_nodelay(true).map_err(|e| NetError::Connect {
        addr: addr.to_string(),
        source: e,
    })?;
    debug!(%addr, "connected");
    Ok(stream)
}

fn normalize_spec(spec: &str) -> Result<String> {
    let trimmed = spec.trim();
    if trimmed.is_empty() {
        return Err(NetError::BadSpec {
            spec: spec.to_string(),
            reason: "empty spec".to_string(),
        });
    }

    let addr = if let Some(port) = trimmed.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else if trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("0.0.0.0:{trimmed}")
    } else {
        trimmed.to_string()
    };

    // Validate up front so a typo fails as BadSpec, not a bind error.
    match addr.to_socket_addrs() {
        Ok(_) => Ok(addr),
        Err(e) => Err(NetError::BadSpec {
            spec: spec.to_string(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn bind_accept_connect_roundtrip() {
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr();

        let handle = std::thread::spawn(move || {
            let mut client = connect(&addr.to_string()).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = endpoint.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        handle.join().unwrap();
    }

    #[test]
    fn bare_port_binds_all_interfaces() {
        let endpoint = TcpEndpoint::bind("0").unwrap();
        assert!(endpoint.local_addr().ip().is_unspecified());
    }

    #[test]
    fn colon_port_binds_all_interfaces() {
        let endpoint = TcpEndpoint::bind(":0").unwrap();
        assert!(endpoint.local_addr().ip().is_unspecified());
    }

    #[test]
    fn empty_spec_is_rejected() {
        let result = TcpEndpoint::bind("  ");
        assert!(matches!(result, Err(NetError::BadSpec { .. })));
    }

    #[test]
    fn garbage_spec_is_rejected() {
        let result = TcpEndpoint::bind("not-an-address");
        assert!(matches!(result, Err(NetError::BadSpec { .. })));
    }

    #[test]
    fn connect_to_closed_port_reports_connect_error() {
        // Bind then drop to find a port that is very likely closed.
        let endpoint = TcpEndpoint::bind("127.0.0.1:0").unwrap();
        let addr = endpoint.local_addr().to_string();
        drop(endpoint);

        let result = connect(&addr);
        assert!(matches!(result, Err(NetError::Connect { .. })));
    }
}
