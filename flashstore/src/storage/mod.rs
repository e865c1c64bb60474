mod buffer;
mod config;
mod error;
mod fat;
mod session;
mod store;

pub use buffer::BUFFER_SIZE;
pub use config::{StoreConfig, DEFAULT_LOOKAHEAD};
pub use error::StoreError;
pub use fat::{decode_record, encode_record, FileRecord, FileTable, DATA_START, FAT_ADDR, FAT_MAGIC, MAX_FILES,
    RECORD_LEN};
pub use session::Mode;
pub use store::FlashStore;
