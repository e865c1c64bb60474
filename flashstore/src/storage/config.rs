/// Runtime tuning for a `FlashStore`.
use crate::flash::SECTOR_SIZE;

/// Default distance before the erase frontier at which the next sector is
/// erased ahead of time.
pub const DEFAULT_LOOKAHEAD: u32 = 1024;

static_assertions::const_assert!(DEFAULT_LOOKAHEAD <= SECTOR_SIZE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Bytes before the erase frontier that trigger a look-ahead erase.
    pub lookahead: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lookahead: DEFAULT_LOOKAHEAD,
        }
    }
}

impl StoreConfig {
    pub fn with_lookahead(mut self, lookahead: u32) -> Self {
        self.lookahead = lookahead;
        self
    }
}
