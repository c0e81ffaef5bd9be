use std::{
    fmt::Display,
    os::unix::io::{AsRawFd, RawFd},
    time::Duration,
};

use nix::{
    errno::Errno,
    libc::c_int,
    poll::{poll, PollFd, PollFlags},
};
use tracing::trace;

use crate::{endpoint::Endpoint, error::Error};

/// What a poll reported for an endpoint.
///
/// When several conditions are reported at once, only the most important one is kept:
/// hangup wins over error, which wins over readable.
/// A hung up endpoint might still have bytes pending, but those are not worth reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The other side went away.
    Hangup,

    /// An error condition, or the descriptor is not valid.
    Error,

    /// There is something to read (or, for a listener, to accept).
    Readable,
}

impl Readiness {
    fn from_flags(flags: PollFlags) -> Option<Self> {
        if flags.contains(PollFlags::POLLHUP) {
            Some(Self::Hangup)
        } else if flags.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
            Some(Self::Error)
        } else if flags.intersects(Self::interest()) {
            Some(Self::Readable)
        } else {
            None
        }
    }

    // Hangup and error conditions are always reported, so reading is all we ask for.
    fn interest() -> PollFlags {
        PollFlags::POLLIN | PollFlags::POLLPRI
    }
}

impl Display for Readiness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Readiness::Hangup => write!(f, "hangup"),
            Readiness::Error => write!(f, "error"),
            Readiness::Readable => write!(f, "readable"),
        }
    }
}

/// Watches a set of endpoints and reports which are ready.
///
/// This is level-triggered: an endpoint which still has unread data is reported again
/// on the next poll. Reads are bounded in size, so this is what makes sure nothing is left behind.
///
/// Descriptors are only ever looked at here. Everywhere else, endpoints are referred to by [`Endpoint`].
#[derive(Debug, Default)]
pub struct Multiplexer {
    watched: Vec<(Endpoint, RawFd)>,
}

impl Multiplexer {
    /// An empty watch set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching the source under the given endpoint.
    pub fn register<S: AsRawFd>(&mut self, endpoint: Endpoint, source: &S) -> Result<(), Error> {
        if self.is_watched(endpoint) {
            return Err(Error::AlreadyWatched(endpoint));
        }

        let fd = source.as_raw_fd();
        trace!(%endpoint, fd, "Watching");
        self.watched.push((endpoint, fd));

        Ok(())
    }

    /// Stop watching the endpoint.
    /// Returns whether it was watched.
    pub fn unregister(&mut self, endpoint: Endpoint) -> bool {
        let before = self.watched.len();
        self.watched.retain(|(watched, _)| *watched != endpoint);

        before != self.watched.len()
    }

    /// Is this endpoint in the watch set?
    pub fn is_watched(&self, endpoint: Endpoint) -> bool {
        self.watched.iter().any(|(watched, _)| *watched == endpoint)
    }

    /// The number of watched endpoints.
    pub fn len(&self) -> usize {
        self.watched.len()
    }

    /// Whether nothing is watched.
    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }

    /// Wait at most `timeout` for any watched endpoint to become ready.
    ///
    /// Endpoints are reported in the order they were registered.
    /// A wait interrupted by a signal reports nothing, so the caller gets a chance to look at
    /// whatever the signal handler did.
    pub fn poll(&mut self, timeout: Duration) -> Result<Vec<(Endpoint, Readiness)>, Error> {
        let mut fds = self
            .watched
            .iter()
            .map(|(_, fd)| PollFd::new(*fd, Readiness::interest()))
            .collect::<Vec<_>>();

        let timeout = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);

        match poll(&mut fds, timeout) {
            Ok(0) | Err(Errno::EINTR) => return Ok(vec![]),
            Ok(_) => {}
            Err(e) => return Err(Error::Poll(e)),
        }

        let ready = self
            .watched
            .iter()
            .zip(fds.iter())
            .filter_map(|((endpoint, _), fd)| {
                fd.revents()
                    .and_then(Readiness::from_flags)
                    .map(|readiness| (*endpoint, readiness))
            })
            .collect();

        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use std::{io::Write, os::unix::net::UnixStream};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::endpoint::ConnectionId;

    const SHORT: Duration = Duration::from_millis(50);

    #[test]
    fn nothing_ready_times_out_empty() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new();
        mux.register(Endpoint::Device, &a).unwrap();

        assert!(mux.poll(SHORT).unwrap().is_empty());
    }

    #[test]
    fn pending_bytes_are_readable_until_drained() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new();
        mux.register(Endpoint::Device, &a).unwrap();

        b.write_all(b"hello").unwrap();

        // Not reading anything means it is reported again.
        for _ in 0..2 {
            assert_eq!(
                mux.poll(SHORT).unwrap(),
                vec![(Endpoint::Device, Readiness::Readable)]
            );
        }
    }

    #[test]
    fn hangup_wins_over_readable() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new();
        mux.register(Endpoint::Device, &a).unwrap();

        b.write_all(b"unread").unwrap();
        drop(b);

        assert_eq!(
            mux.poll(SHORT).unwrap(),
            vec![(Endpoint::Device, Readiness::Hangup)]
        );
    }

    #[test]
    fn only_ready_endpoints_are_reported() {
        let (quiet, _quiet_peer) = UnixStream::pair().unwrap();
        let (chatty, mut chatty_peer) = UnixStream::pair().unwrap();

        let mut mux = Multiplexer::new();
        let id = ConnectionId(7);
        mux.register(Endpoint::Device, &quiet).unwrap();
        mux.register(Endpoint::Connection(id), &chatty).unwrap();

        chatty_peer.write_all(b"x").unwrap();

        assert_eq!(
            mux.poll(SHORT).unwrap(),
            vec![(Endpoint::Connection(id), Readiness::Readable)]
        );
    }

    #[test]
    fn registering_twice_is_bad() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new();
        mux.register(Endpoint::Listener, &a).unwrap();

        assert!(matches!(
            mux.register(Endpoint::Listener, &a),
            Err(Error::AlreadyWatched(Endpoint::Listener))
        ));
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn unregistered_endpoints_are_not_polled() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut mux = Multiplexer::new();
        mux.register(Endpoint::Device, &a).unwrap();

        assert!(mux.unregister(Endpoint::Device));
        assert!(!mux.unregister(Endpoint::Device));

        b.write_all(b"ignored").unwrap();
        assert!(mux.poll(SHORT).unwrap().is_empty());
        assert!(mux.is_empty());
    }
}
