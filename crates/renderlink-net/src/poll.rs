//! Readiness checks over raw descriptors.
//!
//! The dispatch loop asks "is a message waiting right now" with a zero
//! timeout; a relay link parks on both of its endpoints with the idle
//! window as the timeout. Both come down to `poll(2)`, so these helpers
//! return plain `io::Result` like the syscall they wrap.

use std::io;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Readiness of the two endpoints handed to [`wait_either`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyPair {
    pub first: bool,
    pub second: bool,
}

const READ_EVENTS: libc::c_short = libc::POLLIN | libc::POLLHUP | libc::POLLERR;

/// Check whether `stream` has data (or EOF) available without blocking.
pub fn readable_now<T: AsRawFd>(stream: &T) -> io::Result<bool> {
    let mut fds = [libc::pollfd {
        fd: stream.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    }];
    poll_retry(&mut fds, 0)?;
    Ok(fds[0].revents & READ_EVENTS != 0)
}

/// Wait until either endpoint becomes readable or `timeout` elapses.
///
/// Returns `None` on timeout. A hung-up or errored endpoint reports as
/// readable so the caller's next read observes the EOF or error.
pub fn wait_either<A: AsRawFd, B: AsRawFd>(
    a: &A,
    b: &B,
    timeout: Duration,
) -> io::Result<Option<ReadyPair>> {
    let mut fds = [
        libc::pollfd {
            fd: a.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: b.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let n = poll_retry(&mut fds, millis)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(ReadyPair {
        first: fds[0].revents & READ_EVENTS != 0,
        second: fds[1].revents & READ_EVENTS != 0,
    }))
}

fn poll_retry(fds: &mut [libc::pollfd], timeout_ms: libc::c_int) -> io::Result<libc::c_int> {
    loop {
        // SAFETY: `fds` points to a valid, writable pollfd array for the
        // length passed, and the descriptors are owned by the borrowed
        // streams for the duration of the call.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc >= 0 {
            return Ok(rc);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn idle_stream_is_not_readable() {
        let (left, _right) = UnixStream::pair().unwrap();
        assert!(!readable_now(&left).unwrap());
    }

    #[test]
    fn pending_bytes_report_readable() {
        let (left, mut right) = UnixStream::pair().unwrap();
        right.write_all(b"x").unwrap();
        assert!(readable_now(&left).unwrap());
    }

    #[test]
    fn closed_peer_reports_readable() {
        let (left, right) = UnixStream::pair().unwrap();
        drop(right);
        // EOF must surface as readiness so the caller's read sees it.
        assert!(readable_now(&left).unwrap());
    }

    #[test]
    fn wait_either_times_out_when_both_idle() {
        let (a, _a2) = UnixStream::pair().unwrap();
        let (b, _b2) = UnixStream::pair().unwrap();
        let ready = wait_either(&a, &b, Duration::from_millis(20)).unwrap();
        assert!(ready.is_none());
    }

    #[test]
    fn wait_either_reports_the_ready_side() {
        let (a, _a2) = UnixStream::pair().unwrap();
        let (b, mut b2) = UnixStream::pair().unwrap();
        b2.write_all(b"data").unwrap();

        let ready = wait_either(&a, &b, Duration::from_secs(1))
            .unwrap()
            .expect("one side has data");
        assert!(!ready.first);
        assert!(ready.second);
    }

    #[test]
    fn wait_either_reports_both_sides() {
        let (a, mut a2) = UnixStream::pair().unwrap();
        let (b, mut b2) = UnixStream::pair().unwrap();
        a2.write_all(b"1").unwrap();
        b2.write_all(b"2").unwrap();

        let ready = wait_either(&a, &b, Duration::from_secs(1))
            .unwrap()
            .expect("both sides have data");
        assert!(ready.first);
        assert!(ready.second);
    }
}
