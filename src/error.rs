//! Shared error types.
//!
//! Each subsystem keeps its own small enum next to its code (transport and
//! protocol errors live in `protocol`); the types here are the ones that
//! cross module boundaries: hardware sampling, storage, OTA, and the numeric
//! error codes the server records against an order.

use core::fmt;

// ---------------------------------------------------------------------------
// Server-facing error codes
// ---------------------------------------------------------------------------

/// Error codes reported to the server when a dose fails.
///
/// The numeric values are part of the wire contract; the server renders them
/// into the order's failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Unknown = 0,
    General = 1,
    /// The weight scale could not produce a measurement.
    WeightScale = 2,
    /// Pump energized but no weight change within the stall window.
    NoWeightChange = 3,
    /// Weight dropped well below the dose baseline (container removed).
    NegativeWeightChange = 4,
    /// Progress could not be reported before the target was reached.
    UnableToReportProgress = 5,
}

impl ErrorCode {
    /// The numeric code sent over the wire.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown error"),
            Self::General => write!(f, "general error"),
            Self::WeightScale => write!(f, "weight scale error"),
            Self::NoWeightChange => write!(f, "no weight change"),
            Self::NegativeWeightChange => write!(f, "negative weight change"),
            Self::UnableToReportProgress => write!(f, "unable to report progress"),
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware sampling errors
// ---------------------------------------------------------------------------

/// A single raw load-cell sample failed.  Any sample failure fails the whole
/// enclosing measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    /// The converter did not signal data-ready within the timeout.
    Timeout,
    /// The read itself failed.
    ReadFailed,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout waiting for sample"),
            Self::ReadFailed => write!(f, "sample read failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Value exceeds the fixed read-back buffer; rejected before writing.
    ValueTooLong,
    /// Generic I/O error from the storage backend.
    IoError,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::ValueTooLong => write!(f, "value too long"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ---------------------------------------------------------------------------
// OTA errors
// ---------------------------------------------------------------------------

/// A successful upgrade reboots the device, so only failures are ever
/// observed by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Download or flash write failed.
    Failed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "firmware upgrade failed"),
        }
    }
}
