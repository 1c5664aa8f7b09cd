// Licensed under the Apache-2.0 license.

use std::io;

use thiserror::Error;

/// Errors reported by the DMA drivers. None of them are retried internally.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum DmaError {
    /// The device did not respond during the startup probe.
    #[error("DMA engine is not available")]
    Unsupported,
    /// The engine issued an address request to an invalid location.
    #[error("AXI decode error: invalid physical address")]
    InvalidAddress,
    /// DataMover internal error or AXI slave error.
    #[error("DMA internal error")]
    InternalError,
    /// An interrupt arrived without a completion or error status.
    #[error("interrupt from unknown source")]
    ProtocolViolation,
    /// The interrupt channel itself failed.
    #[error("interrupt channel failure: {0}")]
    Io(io::ErrorKind),
}

impl From<io::Error> for DmaError {
    fn from(err: io::Error) -> Self {
        DmaError::Io(err.kind())
    }
}
