use embedded_io::ErrorKind;
use num_enum::IntoPrimitive;

/// Numeric code blinked on the status indicator after an unrecoverable error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoPrimitive)]
#[repr(u8)]
pub enum ErrorCode {
    StorageInit = 1,
    StorageFile = 2,
    StorageBuffer = 3,
    Converter = 4,
    Transfer = 5,
    Output = 6,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Storage fell behind acquisition")]
    Overrun,
    #[error("Transfer engine error")]
    Transfer,
    #[error("Transfer completed for the wrong buffer")]
    Desync,
    #[error("Storage medium did not initialize: {0:?}")]
    StorageInit(ErrorKind),
    #[error("Storage: {0:?}")]
    Storage(ErrorKind),
    #[error("Converter configuration failed")]
    Converter,
    #[error("Igniter output fault")]
    Output,
    #[error("No log file found")]
    NoLog,
    #[error("Log file names exhausted")]
    NamesExhausted,
    #[error("Text buffer overflow")]
    Format,
    #[error("Acquisition is running")]
    Busy,
}

impl Error {
    /// The code signalled for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::StorageInit(_) => ErrorCode::StorageInit,
            Error::Storage(_) | Error::NoLog | Error::NamesExhausted => {
                ErrorCode::StorageFile
            }
            Error::Overrun => ErrorCode::StorageBuffer,
            Error::Converter | Error::Busy | Error::Format => {
                ErrorCode::Converter
            }
            Error::Transfer | Error::Desync => ErrorCode::Transfer,
            Error::Output => ErrorCode::Output,
        }
    }
}

impl From<core::fmt::Error> for Error {
    fn from(_: core::fmt::Error) -> Self {
        Error::Format
    }
}

pub(crate) fn storage<E: embedded_io::Error>(error: E) -> Error {
    Error::Storage(error.kind())
}
