use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use renderlink_net::wait_either;
use tracing::{debug, info, warn};

/// Bytes moved per read; one read per ready side per wakeup.
const FORWARD_CHUNK: usize = 4096;

/// Why a link stopped forwarding.
#[derive(Debug)]
pub enum LinkOutcome {
    /// One side closed its stream; both endpoints were shut down.
    PeerClosed,
    /// No readiness event arrived within the idle window.
    IdleTimeout,
    /// A wakeup produced no bytes from either side — dead connection.
    Stalled,
    /// A read, write, or poll failed.
    Failed(std::io::Error),
}

impl LinkOutcome {
    /// True when the link ended without a transport failure.
    pub fn is_clean(&self) -> bool {
        !matches!(self, LinkOutcome::Failed(_))
    }
}

/// One established upstream/downstream pair, forwarded opaquely.
///
/// The link never inspects payload bytes, which is what lets it sit
/// between a control node and any worker regardless of protocol
/// content. Both directions share one readiness wait; within a
/// direction, bytes are forwarded in arrival order.
pub struct RelayLink {
    index: usize,
    upstream: TcpStream,
    downstream: TcpStream,
    idle_timeout: Duration,
}

impl RelayLink {
    pub fn new(
        index: usize,
        upstream: TcpStream,
        downstream: TcpStream,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            index,
            upstream,
            downstream,
            idle_timeout,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Forward until the link terminates; shuts down both endpoints on
    /// every exit path.
    pub fn run(mut self) -> LinkOutcome {
        let mut buf = [0u8; FORWARD_CHUNK];
        let outcome = loop {
            let ready = match wait_either(&self.upstream, &self.downstream, self.idle_timeout) {
                Ok(Some(ready)) => ready,
                Ok(None) => break LinkOutcome::IdleTimeout,
                Err(err) => break LinkOutcome::Failed(err),
            };

            let mut moved = 0usize;
            if ready.first {
                match forward(&mut self.upstream, &mut self.downstream, &mut buf) {
                    Ok(0) => break LinkOutcome::PeerClosed,
                    Ok(n) => moved += n,
                    Err(err) => break LinkOutcome::Failed(err),
                }
            }
            if ready.second {
                match forward(&mut self.downstream, &mut self.upstream, &mut buf) {
                    Ok(0) => break LinkOutcome::PeerClosed,
                    Ok(n) => moved += n,
                    Err(err) => break LinkOutcome::Failed(err),
                }
            }
            if moved == 0 {
                break LinkOutcome::Stalled;
            }
            debug!(link = self.index, moved, "forwarded");
        };

        // Both endpoints close together regardless of which side ended.
        let _ = self.upstream.shutdown(Shutdown::Both);
        let _ = self.downstream.shutdown(Shutdown::Both);
        match &outcome {
            LinkOutcome::Failed(err) => warn!(link = self.index, error = %err, "link failed"),
            other => info!(link = self.index, outcome = ?other, "link closed"),
        }
        outcome
    }
}

/// One read from `src`, written through to `dst`. A ready socket never
/// blocks on the read; `Ok(0)` is EOF.
fn forward(src: &mut TcpStream, dst: &mut TcpStream, buf: &mut [u8]) -> std::io::Result<usize> {
    let n = src.read(buf)?;
    if n > 0 {
        dst.write_all(&buf[..n])?;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    use super::*;

    /// A connected (client, server) TCP pair on loopback.
    fn tcp_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn forwards_bytes_both_directions() {
        let (mut control, relay_upstream) = tcp_pair();
        let (relay_downstream, mut worker) = tcp_pair();

        let link = RelayLink::new(0, relay_upstream, relay_downstream, Duration::from_secs(5));
        let handle = thread::spawn(move || link.run());

        control.write_all(b"to-worker").unwrap();
        let mut buf = [0u8; 9];
        worker.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"to-worker");

        worker.write_all(b"ack").unwrap();
        let mut buf = [0u8; 3];
        control.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ack");

        drop(control);
        let outcome = handle.join().unwrap();
        assert!(matches!(outcome, LinkOutcome::PeerClosed));
    }

    #[test]
    fn preserves_byte_order_across_many_writes() {
        let (mut control, relay_upstream) = tcp_pair();
        let (relay_downstream, mut worker) = tcp_pair();

        let link = RelayLink::new(0, relay_upstream, relay_downstream, Duration::from_secs(5));
        let handle = thread::spawn(move || link.run());

        let payload: Vec<u8> = (0..=255u8).cycle().take(64 * 1024).collect();
        let expected = payload.clone();
        let writer = thread::spawn(move || {
            for chunk in payload.chunks(1000) {
                control.write_all(chunk).unwrap();
            }
            control
        });

        let mut received = vec![0u8; expected.len()];
        worker.read_exact(&mut received).unwrap();
        assert_eq!(received, expected);

        drop(writer.join().unwrap());
        assert!(matches!(handle.join().unwrap(), LinkOutcome::PeerClosed));
    }

    #[test]
    fn peer_close_shuts_down_the_other_side() {
        let (control, relay_upstream) = tcp_pair();
        let (relay_downstream, mut worker) = tcp_pair();

        let link = RelayLink::new(0, relay_upstream, relay_downstream, Duration::from_secs(5));
        let handle = thread::spawn(move || link.run());

        drop(control);
        assert!(matches!(handle.join().unwrap(), LinkOutcome::PeerClosed));

        // The worker side observes EOF promptly.
        let mut buf = [0u8; 1];
        assert_eq!(worker.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn idle_link_times_out() {
        let (_control, relay_upstream) = tcp_pair();
        let (relay_downstream, _worker) = tcp_pair();

        let link = RelayLink::new(
            0,
            relay_upstream,
            relay_downstream,
            Duration::from_millis(50),
        );
        let start = Instant::now();
        let outcome = link.run();
        assert!(matches!(outcome, LinkOutcome::IdleTimeout));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn traffic_resets_the_idle_window() {
        let (mut control, relay_upstream) = tcp_pair();
        let (relay_downstream, mut worker) = tcp_pair();

        let link = RelayLink::new(
            0,
            relay_upstream,
            relay_downstream,
            Duration::from_millis(120),
        );
        let handle = thread::spawn(move || link.run());

        // Keep the link alive well past one idle window.
        for _ in 0..4 {
            thread::sleep(Duration::from_millis(60));
            control.write_all(b"ping").unwrap();
            let mut buf = [0u8; 4];
            worker.read_exact(&mut buf).unwrap();
        }

        drop(control);
        assert!(matches!(handle.join().unwrap(), LinkOutcome::PeerClosed));
    }
}
