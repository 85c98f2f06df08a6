//! Conversions from external infrastructure errors into domain errors.

use std::io::{Error as IoError, ErrorKind};

use ledgerlink_domain::LedgerError;
use reqwest::Error as HttpError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub LedgerError);

impl From<InfraError> for LedgerError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<LedgerError> for InfraError {
    fn from(value: LedgerError) -> Self {
        InfraError(value)
    }
}

trait IntoLedgerError {
    fn into_ledger(self) -> LedgerError;
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → LedgerError */
/* -------------------------------------------------------------------------- */

impl IntoLedgerError for HttpError {
    fn into_ledger(self) -> LedgerError {
        if self.is_timeout() {
            return LedgerError::Transport("HTTP request timed out".into());
        }

        if self.is_connect() {
            return LedgerError::Transport(format!("HTTP connection failure: {}", self));
        }

        if self.is_builder() {
            return LedgerError::Config(format!("invalid HTTP request: {}", self));
        }

        if self.is_decode() || self.is_body() {
            return LedgerError::Transport(format!("failed to read response body: {}", self));
        }

        LedgerError::Transport(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_ledger())
    }
}

/* -------------------------------------------------------------------------- */
/* std::io::Error → LedgerError */
/* -------------------------------------------------------------------------- */

impl IntoLedgerError for IoError {
    fn into_ledger(self) -> LedgerError {
        match self.kind() {
            ErrorKind::PermissionDenied => LedgerError::Storage(format!("permission denied: {}", self)),
            ErrorKind::NotFound => LedgerError::Storage(format!("path not found: {}", self)),
            _ => LedgerError::Storage(self.to_string()),
        }
    }
}

impl From<IoError> for InfraError {
    fn from(value: IoError) -> Self {
        InfraError(value.into_ledger())
    }
}

/// Map an I/O failure on `path` to a storage error naming the operation.
pub(crate) fn storage_error(action: &str, path: &std::path::Path, err: IoError) -> LedgerError {
    let mapped: LedgerError = InfraError::from(err).into();
    match mapped {
        LedgerError::Storage(message) => {
            LedgerError::Storage(format!("failed to {} {}: {}", action, path.display(), message))
        }
        other => other,
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::path::Path;

    use super::*;

    #[test]
    fn io_not_found_maps_to_storage_error() {
        let err = IoError::new(ErrorKind::NotFound, "tokens.json");
        let mapped: LedgerError = InfraError::from(err).into();
        match mapped {
            LedgerError::Storage(msg) => assert!(msg.contains("not found")),
            other => panic!("expected storage error, got {:?}", other),
        }
    }

    #[test]
    fn storage_error_names_action_and_path() {
        let err = IoError::new(ErrorKind::PermissionDenied, "denied");
        let mapped = storage_error("write", Path::new("/tmp/tokens.json"), err);
        assert!(matches!(
            mapped,
            LedgerError::Storage(ref msg)
                if msg.starts_with("failed to write /tmp/tokens.json") && msg.contains("permission")
        ));
    }

    #[test]
    fn refused_connection_maps_to_transport_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = reqwest::blocking::Client::builder().no_proxy().build().unwrap();
        let error = client.get(format!("http://127.0.0.1:{}/", port)).send().unwrap_err();

        let mapped: LedgerError = InfraError::from(error).into();
        assert!(matches!(mapped, LedgerError::Transport(_)), "got {:?}", mapped);
    }
}
