use std::io::{self, ErrorKind};

/// What an accept loop should do after `accept` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDisposition {
    /// The failure belonged to one pending connection; accept again.
    Retry,
    /// The process is out of descriptors or memory; back off, then accept again.
    Backoff,
    /// The listening socket itself is unusable; stop accepting on it.
    Fatal,
}

/// Classify an accept error.
pub fn classify_accept_error(err: &io::Error) -> AcceptDisposition {
    match err.kind() {
        ErrorKind::ConnectionAborted
        | ErrorKind::ConnectionReset
        | ErrorKind::ConnectionRefused
        | ErrorKind::Interrupted
        | ErrorKind::WouldBlock
        | ErrorKind::TimedOut
        | ErrorKind::PermissionDenied => AcceptDisposition::Retry,
        ErrorKind::OutOfMemory => AcceptDisposition::Backoff,
        ErrorKind::InvalidInput | ErrorKind::NotConnected | ErrorKind::Unsupported => {
            AcceptDisposition::Fatal
        }
        // EMFILE / ENFILE / ENOBUFS surface as uncategorized kinds.
        _ => AcceptDisposition::Backoff,
    }
}

/// Whether a receive/send error is an ordinary end of connection.
///
/// Peers that reset, abort or disappear mid-write are routine for cellular
/// trackers and are torn down without alerting.
pub fn is_teardown_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_and_abort_are_teardown() {
        assert!(is_teardown_error(&io::Error::from(ErrorKind::ConnectionReset)));
        assert!(is_teardown_error(&io::Error::from(ErrorKind::ConnectionAborted)));
        assert!(is_teardown_error(&io::Error::from(ErrorKind::BrokenPipe)));
    }

    #[test]
    fn other_errors_are_not_teardown() {
        assert!(!is_teardown_error(&io::Error::from(ErrorKind::InvalidData)));
        assert!(!is_teardown_error(&io::Error::other("boom")));
    }

    #[test]
    fn aborted_handshake_retries_accept() {
        let err = io::Error::from(ErrorKind::ConnectionAborted);
        assert_eq!(classify_accept_error(&err), AcceptDisposition::Retry);
    }

    #[test]
    fn descriptor_exhaustion_backs_off() {
        let err = io::Error::other("too many open files");
        assert_eq!(classify_accept_error(&err), AcceptDisposition::Backoff);
    }

    #[test]
    fn invalid_listener_is_fatal() {
        let err = io::Error::from(ErrorKind::InvalidInput);
        assert_eq!(classify_accept_error(&err), AcceptDisposition::Fatal);
    }
}
