//! The error taxonomy this engine distinguishes, layered on top of
//! `std::io::Error` so that every public function keeps returning
//! `io::Result<T>`.

use std::fmt;
use std::io;

/// The six kinds of failure the engine needs to tell apart.
///
/// Matches the taxonomy a caller must be able to distinguish: bad input
/// bytes are not the same failure as a read that never completed, and a
/// decoder rejecting its own bitstream is not the same as the container
/// directory being self-inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The primary magic bytes ("MSCF" or equivalent) were not found.
    InvalidSignature,
    /// Header/folder/file directory fields are self-inconsistent.
    CorruptDirectory,
    /// A decoder detected a violation in its own compressed bitstream.
    CorruptInput,
    /// The compression method code, or a variant of it, is not implemented.
    UnsupportedFormat,
    /// An I/O-adjacent boundary condition during extraction that is not a
    /// content problem (write failed, offset exceeds addressable range).
    DecompressionError,
    /// A file not present in the cabinet was requested.
    NotFound,
}

/// An error carrying one of the taxonomy's [`ErrorKind`]s and a message.
#[derive(Debug)]
pub struct CabError {
    kind: ErrorKind,
    message: String,
}

impl CabError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> CabError {
        CabError { kind, message: message.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for CabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CabError {}

impl From<CabError> for io::Error {
    fn from(err: CabError) -> io::Error {
        let kind = match err.kind {
            ErrorKind::InvalidSignature => io::ErrorKind::InvalidData,
            ErrorKind::CorruptDirectory => io::ErrorKind::InvalidData,
            ErrorKind::CorruptInput => io::ErrorKind::InvalidData,
            ErrorKind::UnsupportedFormat => io::ErrorKind::InvalidInput,
            ErrorKind::DecompressionError => io::ErrorKind::Other,
            ErrorKind::NotFound => io::ErrorKind::NotFound,
        };
        io::Error::new(kind, err)
    }
}

/// If `err` (or its source chain) is a [`CabError`], return its [`ErrorKind`].
pub fn kind_of(err: &io::Error) -> Option<ErrorKind> {
    err.get_ref()?.downcast_ref::<CabError>().map(CabError::kind)
}

macro_rules! invalid_signature {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::InvalidSignature,
            format!($fmt $(, $arg)*),
        )))
    };
}

macro_rules! corrupt_directory {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::CorruptDirectory,
            format!($fmt $(, $arg)*),
        )))
    };
}

macro_rules! corrupt_input {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::CorruptInput,
            format!($fmt $(, $arg)*),
        )))
    };
}

macro_rules! unsupported_format {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::UnsupportedFormat,
            format!($fmt $(, $arg)*),
        )))
    };
}

macro_rules! decompression_error {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::DecompressionError,
            format!($fmt $(, $arg)*),
        )))
    };
}

macro_rules! not_found {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::from($crate::error::CabError::new(
            $crate::error::ErrorKind::NotFound,
            format!($fmt $(, $arg)*),
        )))
    };
}

// `invalid_input` covers programmer-error-shaped conditions (bad arguments,
// unsupported builder state) that don't fit the content-driven taxonomy but
// that the teacher's call sites still expect to `invalid_input!(...)`.
macro_rules! invalid_input {
    ($fmt:expr $(, $arg:expr)*) => {
        return Err(::std::io::Error::new(
            ::std::io::ErrorKind::InvalidInput,
            format!($fmt $(, $arg)*),
        ))
    };
}

pub(crate) use corrupt_directory;
pub(crate) use corrupt_input;
pub(crate) use decompression_error;
pub(crate) use invalid_input;
pub(crate) use invalid_signature;
pub(crate) use not_found;
pub(crate) use unsupported_format;
