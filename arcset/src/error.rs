//! Crate-level error type.
//!
//! Component errors (`ParamError`, `SyncError`) stay in their modules and
//! convert into [`Error`] at the process boundary.

use std::io;
use std::process;

use crate::gate::SyncError;
use crate::graph::ParamError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing input edges.
    #[error(transparent)]
    Param(#[from] ParamError),

    /// The shared region could not be created, opened or sized.
    #[error("shared memory {op} failed: {source}")]
    BackingStore {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("installing signal handler failed: {0}")]
    Signal(#[source] io::Error),
}

impl Error {
    pub(crate) fn backing_store(op: &'static str, source: io::Error) -> Self {
        Error::BackingStore { op, source }
    }

    /// OS error number behind this error, if there is one.
    pub fn os_code(&self) -> Option<i32> {
        match self {
            Error::BackingStore { source, .. } => source.raw_os_error(),
            Error::Sync(SyncError::Primitive { source, .. }) => source.raw_os_error(),
            Error::Signal(source) => source.raw_os_error(),
            _ => None,
        }
    }

    /// Report on stderr and exit non-zero. Callers drop shared state first.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        if let Some(code) = self.os_code() {
            eprintln!("Code: {}", code);
        }
        process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_code_from_backing_store() {
        let fatal = Error::backing_store("open", io::Error::from_raw_os_error(libc::ENOENT));
        assert_eq!(fatal.os_code(), Some(libc::ENOENT));
        assert_eq!(Error::from(SyncError::Interrupted).os_code(), None);
    }

    #[test]
    fn test_param_error_has_no_os_code() {
        let err = Error::from(ParamError::NoEdges);
        assert_eq!(err.os_code(), None);
    }
}
