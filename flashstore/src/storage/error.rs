use core::fmt;

use crate::flash::FlashError;

/// File store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// Unexpected device response. Not retried.
    DeviceFail(FlashError),
    /// Device is mid-operation; try again later.
    Busy,
    /// No table at address 0. Expected on a blank chip; the store is usable
    /// with an empty table.
    NoFatFound,
    /// File table full, or no room left on the device.
    NoSpace,
    /// File index outside 1..=file_count.
    InvalidFile,
    /// Operation not allowed in the current session mode.
    WrongMode,
}

impl From<FlashError> for StoreError {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::Busy => StoreError::Busy,
            other => StoreError::DeviceFail(other),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::DeviceFail(e) => write!(f, "device failure: {}", e),
            StoreError::Busy => write!(f, "device busy"),
            StoreError::NoFatFound => write!(f, "no file table found"),
            StoreError::NoSpace => write!(f, "no space left"),
            StoreError::InvalidFile => write!(f, "invalid file index"),
            StoreError::WrongMode => write!(f, "wrong session mode"),
        }
    }
}
