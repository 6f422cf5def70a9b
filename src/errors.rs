//! Error taxonomy for update operations.
//!
//! Operations return `failure::Fallible`, with an `UpdateError` as root
//! cause whenever the failure has a well-known kind. The scheduler can
//! `downcast_ref::<UpdateError>()` to decide its retry policy.

/// Well-known failure kinds of the update lifecycle.
#[derive(Debug, Fail)]
pub(crate) enum UpdateError {
    /// External executable missing, or exited non-zero.
    #[fail(display = "tool invocation failed: {}", _0)]
    ToolInvocation(String),
    /// HTTP transport or status failure.
    #[fail(display = "network error: {}", _0)]
    Network(String),
    /// Channel name not present in the configured table.
    #[fail(display = "unknown channel '{}'", _0)]
    UnknownChannel(String),
    /// Version or release-notes file absent or unparseable.
    #[fail(display = "metadata missing: {}", _0)]
    MetadataMissing(String),
    /// Permission or I/O failure on staging/finalized trees.
    #[fail(display = "filesystem error: {}", _0)]
    Filesystem(String),
    /// Sync tool failed to extract an update into staging.
    #[fail(display = "fetch failed: {}", _0)]
    Fetch(String),
}

impl UpdateError {
    /// Wrap an I/O error on `what` as a filesystem error.
    pub(crate) fn fs(what: impl std::fmt::Display, err: std::io::Error) -> Self {
        UpdateError::Filesystem(format!("{}: {}", what, err))
    }
}

/// Return the `UpdateError` root cause of `err`, if any.
pub(crate) fn kind_of(err: &failure::Error) -> Option<&UpdateError> {
    err.downcast_ref::<UpdateError>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let e = UpdateError::UnknownChannel("foo".to_string());
        assert_eq!(e.to_string(), "unknown channel 'foo'");

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let e = UpdateError::fs("/data/x", io);
        assert_eq!(e.to_string(), "filesystem error: /data/x: gone");
    }

    #[test]
    fn kind_survives_conversion() {
        let err: failure::Error = UpdateError::Network("timeout".to_string()).into();
        match kind_of(&err) {
            Some(UpdateError::Network(msg)) => assert_eq!(msg, "timeout"),
            other => panic!("unexpected kind: {:?}", other),
        }

        let plain = format_err!("something else");
        assert!(kind_of(&plain).is_none());
    }
}
