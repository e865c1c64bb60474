/// On-flash file allocation table.
///
/// The table lives in the first sector of the chip and is rewritten in full
/// on every structural change. Layout (big-endian):
///
///   0..6     magic "FLASH\0"
///   6        file count
///   7        in-progress file (1-indexed, 0xFF = none)
///   8..      5-byte records, one per file:
///              [0..2] start address bits 23..8 (low byte is always 0)
///              [2..5] end address bits 23..0
///
/// Files occupy sector-aligned regions after the table sector, in
/// allocation order. Only the last file can be removed.
use log::warn;

use crate::flash::{align_up, wait_ready, Delay, FlashDevice, PAGE_SIZE, SECTOR_SIZE};
use super::error::StoreError;

/// Maximum number of files in the table.
pub const MAX_FILES: usize = 32;

/// Table identification bytes.
pub const FAT_MAGIC: [u8; 6] = *b"FLASH\0";

/// Address of the table sector.
pub const FAT_ADDR: u32 = 0;

/// First address available for file data.
pub const DATA_START: u32 = FAT_ADDR + SECTOR_SIZE;

/// In-progress marker value meaning "no file open".
pub const NO_FILE: u8 = 0xFF;

const HEADER_LEN: usize = FAT_MAGIC.len() + 2;
/// Size of one serialized record.
pub const RECORD_LEN: usize = 5;

/// Serialized size of a full table.
pub const FAT_MAX_BYTES: usize = HEADER_LEN + MAX_FILES * RECORD_LEN;

static_assertions::const_assert!(FAT_MAX_BYTES <= SECTOR_SIZE as usize);
static_assertions::const_assert!(MAX_FILES < NO_FILE as usize);

/// Location of one file on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileRecord {
    /// First byte of the file. Always sector aligned.
    pub start_addr: u32,
    /// One past the last written byte.
    pub end_addr: u32,
}

impl FileRecord {
    pub const fn empty() -> Self {
        Self { start_addr: 0, end_addr: 0 }
    }

    /// Bytes stored in the file.
    pub fn len(&self) -> u32 {
        self.end_addr.saturating_sub(self.start_addr)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A stored file starts on a sector boundary in the data area and does
    /// not end before it starts.
    fn is_valid(&self) -> bool {
        self.start_addr >= DATA_START
            && self.start_addr % SECTOR_SIZE == 0
            && self.end_addr >= self.start_addr
    }
}

/// Pack a record into its 5-byte on-flash form.
pub fn encode_record(rec: &FileRecord) -> [u8; RECORD_LEN] {
    let start = rec.start_addr & 0x00FF_FF00;
    let end = rec.end_addr & 0x00FF_FFFF;
    [
        ((start >> 16) & 0xFF) as u8,
        ((start >> 8) & 0xFF) as u8,
        ((end >> 16) & 0xFF) as u8,
        ((end >> 8) & 0xFF) as u8,
        (end & 0xFF) as u8,
    ]
}

/// Unpack a record.
pub fn decode_record(bytes: &[u8; RECORD_LEN]) -> FileRecord {
    let start = (u32::from(bytes[0]) << 16) | (u32::from(bytes[1]) << 8);
    let end = (u32::from(bytes[2]) << 16) | (u32::from(bytes[3]) << 8) | u32::from(bytes[4]);
    FileRecord { start_addr: start, end_addr: end }
}

/// In-memory file table, cached from flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTable {
    records: [FileRecord; MAX_FILES],
    count: usize,
    in_progress: Option<usize>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    /// Create an empty table.
    pub const fn new() -> Self {
        Self {
            records: [FileRecord::empty(); MAX_FILES],
            count: 0,
            in_progress: None,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == MAX_FILES
    }

    /// All files in allocation order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records[..self.count]
    }

    /// Look up a file by its 1-based index.
    pub fn get(&self, index: usize) -> Option<&FileRecord> {
        if index == 0 {
            return None;
        }
        self.records().get(index - 1)
    }

    /// File left open for writing when the table was last persisted.
    pub fn in_progress(&self) -> Option<usize> {
        self.in_progress
    }

    pub(crate) fn set_in_progress(&mut self, index: Option<usize>) {
        self.in_progress = index;
    }

    /// Where the next file would start: the first sector boundary at or after
    /// the last file's end.
    pub fn next_start(&self) -> u32 {
        match self.records().last() {
            Some(last) => align_up(last.end_addr),
            None => DATA_START,
        }
    }

    /// Append a record. Returns its 1-based index, or None if full.
    pub(crate) fn push(&mut self, record: FileRecord) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        self.records[self.count] = record;
        self.count += 1;
        Some(self.count)
    }

    /// Set the end address of file `index`.
    pub(crate) fn set_end(&mut self, index: usize, end_addr: u32) {
        if let Some(rec) = index.checked_sub(1).and_then(|i| self.records[..self.count].get_mut(i)) {
            rec.end_addr = end_addr;
        }
    }

    /// Drop the last record. No-op on an empty table.
    pub(crate) fn pop(&mut self) -> Option<FileRecord> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        let rec = self.records[self.count];
        self.records[self.count] = FileRecord::empty();
        Some(rec)
    }

    pub(crate) fn clear(&mut self) {
        self.records = [FileRecord::empty(); MAX_FILES];
        self.count = 0;
        self.in_progress = None;
    }

    /// Serialize into `out`. Returns the number of bytes used.
    pub fn encode(&self, out: &mut [u8; FAT_MAX_BYTES]) -> usize {
        out[..FAT_MAGIC.len()].copy_from_slice(&FAT_MAGIC);
        out[FAT_MAGIC.len()] = self.count as u8;
        out[FAT_MAGIC.len() + 1] = match self.in_progress {
            Some(index) => index as u8,
            None => NO_FILE,
        };

        for (i, rec) in self.records().iter().enumerate() {
            let off = HEADER_LEN + i * RECORD_LEN;
            out[off..off + RECORD_LEN].copy_from_slice(&encode_record(rec));
        }

        HEADER_LEN + self.count * RECORD_LEN
    }

    /// Load the table from flash.
    ///
    /// Returns `NoFatFound` if the magic does not match or the header or a
    /// record is corrupt, `Busy` if the chip is mid-operation, `DeviceFail` otherwise.
    pub fn load<D: FlashDevice + ?Sized>(dev: &mut D) -> Result<Self, StoreError> {
        let mut magic = [0u8; FAT_MAGIC.len()];
        dev.read_data(FAT_ADDR, &mut magic)?;
        if magic != FAT_MAGIC {
            return Err(StoreError::NoFatFound);
        }

        let mut header = [0u8; 2];
        dev.read_data(FAT_ADDR + FAT_MAGIC.len() as u32, &mut header)?;
        let count = header[0] as usize;
        if count > MAX_FILES {
            warn!("[fat] file count {} exceeds capacity, ignoring table", count);
            return Err(StoreError::NoFatFound);
        }

        let mut body = [0u8; MAX_FILES * RECORD_LEN];
        let body = &mut body[..count * RECORD_LEN];
        if !body.is_empty() {
            dev.read_data(FAT_ADDR + HEADER_LEN as u32, body)?;
        }

        let mut table = Self::new();
        let mut prev_end = DATA_START;
        for chunk in body.chunks_exact(RECORD_LEN) {
            let mut raw = [0u8; RECORD_LEN];
            raw.copy_from_slice(chunk);
            let rec = decode_record(&raw);
            if !rec.is_valid() || rec.start_addr < prev_end {
                warn!(
                    "[fat] record {} ({:#x}..{:#x}) is corrupt, ignoring table",
                    table.count + 1,
                    rec.start_addr,
                    rec.end_addr
                );
                return Err(StoreError::NoFatFound);
            }
            prev_end = rec.end_addr;
            table.records[table.count] = rec;
            table.count += 1;
        }

        table.in_progress = match header[1] {
            0 | NO_FILE => None,
            index if (index as usize) <= count => Some(index as usize),
            index => {
                warn!("[fat] in-progress marker {} out of range", index);
                None
            }
        };

        Ok(table)
    }

    /// Write the table to flash.
    ///
    /// Does not wait for the chip: returns `Busy` right away if an erase or
    /// program is still running. Once started, each page program waits for
    /// the previous one.
    pub fn flush<D, W>(&self, dev: &mut D, delay: &mut W) -> Result<(), StoreError>
    where
        D: FlashDevice + ?Sized,
        W: Delay + ?Sized,
    {
        if dev.busy() {
            return Err(StoreError::Busy);
        }
        dev.write_enable()?;
        dev.sector_erase(FAT_ADDR)?;

        let mut buf = [0u8; FAT_MAX_BYTES];
        let len = self.encode(&mut buf);

        let mut addr = FAT_ADDR;
        for chunk in buf[..len].chunks(PAGE_SIZE as usize) {
            wait_ready(dev, delay);
            dev.write_enable()?;
            dev.page_program(addr, chunk)?;
            addr += chunk.len() as u32;
        }

        Ok(())
    }
}
