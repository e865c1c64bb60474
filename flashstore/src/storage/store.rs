/// File store on raw NOR flash.
///
/// Owns the cached file table, the open-file session and the write buffer,
/// and drives the chip through `FlashDevice`. Every operation takes
/// `&mut self`; there is exactly one session at a time.
///
/// Write path: bytes are staged in a 1 KiB buffer and programmed a page at a
/// time. The sector holding the cursor is always erased before it is
/// programmed: `new_file` erases the first sector, each `write` erases the
/// next one early once the cursor is within `lookahead` bytes of the erase
/// frontier, and a flush that would still cross the frontier erases
/// synchronously. Data is only recorded in the table by `close`.
use log::{debug, info, trace, warn};

use crate::flash::{page_remaining, wait_ready, Delay, FlashDevice, SpinDelay, ADDRESS_LIMIT, SECTOR_SIZE};
use super::buffer::WriteBuffer;
use super::config::StoreConfig;
use super::error::StoreError;
use super::fat::{FileRecord, FileTable};
use super::session::{lookahead_due, Mode, Session};

pub struct FlashStore<D, W = SpinDelay> {
    dev: D,
    delay: W,
    config: StoreConfig,
    fat: FileTable,
    session: Session,
    buffer: WriteBuffer,
    interrupted: Option<usize>,
}

impl<D: FlashDevice> FlashStore<D> {
    /// Create a store that spin-waits on the chip's busy flag.
    pub fn new(dev: D, config: StoreConfig) -> Self {
        Self::with_delay(dev, config, SpinDelay)
    }
}

impl<D: FlashDevice, W: Delay> FlashStore<D, W> {
    /// Create a store that calls `delay` between busy polls.
    pub fn with_delay(dev: D, config: StoreConfig, delay: W) -> Self {
        Self {
            dev,
            delay,
            config,
            fat: FileTable::new(),
            session: Session::Idle,
            buffer: WriteBuffer::new(),
            interrupted: None,
        }
    }

    /// Bring up the chip and load the file table.
    ///
    /// `NoFatFound` leaves an empty table in place; the store is usable and
    /// `initialize_fat` (or the first `new_file`) writes a fresh table.
    pub fn init(&mut self, select: u8) -> Result<(), StoreError> {
        self.dev.init(select).map_err(StoreError::DeviceFail)?;
        self.session = Session::Idle;
        self.buffer.clear();
        self.read_fat()
    }

    fn read_fat(&mut self) -> Result<(), StoreError> {
        match FileTable::load(&mut self.dev) {
            Ok(mut table) => {
                self.interrupted = table.in_progress();
                if let Some(index) = self.interrupted {
                    warn!("[fat] file {} was never closed, its data is not recorded", index);
                }
                table.set_in_progress(None);
                info!("[fat] loaded {} files", table.len());
                self.fat = table;
                Ok(())
            }
            Err(StoreError::NoFatFound) => {
                info!("[fat] no table found");
                self.fat = FileTable::new();
                self.interrupted = None;
                Err(StoreError::NoFatFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist the table, waiting for the chip first.
    fn persist(&mut self) -> Result<(), StoreError> {
        wait_ready(&mut self.dev, &mut self.delay);
        self.fat.flush(&mut self.dev, &mut self.delay)
    }

    /// Usable size of the chip. The table format addresses 16 MiB.
    fn limit(&self) -> u32 {
        self.dev.capacity().min(ADDRESS_LIMIT)
    }

    /// Write an empty table, forgetting every file.
    pub fn initialize_fat(&mut self) -> Result<(), StoreError> {
        if self.session != Session::Idle {
            return Err(StoreError::WrongMode);
        }
        self.fat.clear();
        self.interrupted = None;
        self.persist()?;
        info!("[fat] initialized empty table");
        Ok(())
    }

    /// Snapshot of the file table.
    pub fn fat(&self) -> FileTable {
        self.fat.clone()
    }

    pub fn mode(&self) -> Mode {
        self.session.mode()
    }

    /// File that was open for writing when power was lost, as recorded by
    /// the table found at `init`. Its record holds no data.
    pub fn interrupted_file(&self) -> Option<usize> {
        self.interrupted
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn device(&self) -> &D {
        &self.dev
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.dev
    }

    /// Give the chip back without closing the session. Buffered data is
    /// dropped, just as on power loss.
    pub fn into_device(self) -> D {
        self.dev
    }

    /// Allocate a new file after the last one and open it for writing.
    /// Returns its 1-based index.
    pub fn new_file(&mut self) -> Result<usize, StoreError> {
        self.close()?;

        let start = self.fat.next_start();
        if start + SECTOR_SIZE > self.limit() {
            return Err(StoreError::NoSpace);
        }
        let index = self
            .fat
            .push(FileRecord { start_addr: start, end_addr: start })
            .ok_or(StoreError::NoSpace)?;
        self.fat.set_in_progress(Some(index));

        if let Err(e) = self.begin_write(index, start) {
            self.fat.pop();
            self.fat.set_in_progress(None);
            self.session = Session::Idle;
            return Err(e);
        }

        debug!("[store] file {} opened for writing at {:#x}", index, start);
        Ok(index)
    }

    fn begin_write(&mut self, index: usize, start: u32) -> Result<(), StoreError> {
        self.buffer.clear();

        wait_ready(&mut self.dev, &mut self.delay);
        self.dev.write_enable()?;
        self.dev.sector_erase(start)?;
        self.session = Session::write_at(index, start);

        self.persist()
    }

    /// Open file `index` (1-based) for reading.
    pub fn open_file(&mut self, index: usize) -> Result<(), StoreError> {
        self.close()?;

        let start = self.fat.get(index).ok_or(StoreError::InvalidFile)?.start_addr;
        self.session = Session::Read { file: index, cursor: start };

        // The last table write may still be programming
        wait_ready(&mut self.dev, &mut self.delay);
        Ok(())
    }

    /// Close the open file, if any. For a write session this flushes the
    /// buffer, records the file's end and persists the table.
    ///
    /// If the chip filled up, the file is closed with the bytes that fit and
    /// `NoSpace` is returned. Any other flush failure leaves the session
    /// open with the unwritten bytes still buffered, so `close` can be
    /// retried.
    pub fn close(&mut self) -> Result<(), StoreError> {
        match self.session {
            Session::Idle => Ok(()),
            Session::Read { .. } => {
                self.session = Session::Idle;
                Ok(())
            }
            Session::Write { file, .. } => {
                let flushed = match self.flush_buffer() {
                    Err(StoreError::NoSpace) => Err(StoreError::NoSpace),
                    Err(e) => return Err(e),
                    Ok(()) => Ok(()),
                };
                let Session::Write { cursor, .. } = self.session else {
                    return Err(StoreError::WrongMode);
                };

                self.fat.set_end(file, cursor);
                self.fat.set_in_progress(None);
                self.session = Session::Idle;
                self.persist()?;

                debug!("[store] closed file {} at {:#x}", file, cursor);
                flushed
            }
        }
    }

    /// Append `data` to the file open for writing.
    ///
    /// `Busy` means every byte was accepted but the look-ahead erase was
    /// skipped because the chip was still working; the next `write` tries
    /// again.
    pub fn write(&mut self, mut data: &[u8]) -> Result<(), StoreError> {
        if self.session.mode() != Mode::Write {
            return Err(StoreError::WrongMode);
        }

        while !data.is_empty() {
            let taken = self.buffer.fill(data);
            data = &data[taken..];
            if self.buffer.is_full() {
                self.flush_buffer()?;
            }
        }

        self.erase_ahead()
    }

    /// Erase the sector at the frontier if the cursor is close to it.
    /// Never waits.
    fn erase_ahead(&mut self) -> Result<(), StoreError> {
        let Session::Write { file, cursor, frontier } = self.session else {
            return Ok(());
        };
        if !lookahead_due(cursor, frontier, self.config.lookahead) || frontier + SECTOR_SIZE > self.limit() {
            return Ok(());
        }

        if self.dev.busy() {
            trace!("[store] look-ahead erase at {:#x} skipped, device busy", frontier);
            return Err(StoreError::Busy);
        }
        self.dev.write_enable()?;
        self.dev.sector_erase(frontier)?;
        self.session = Session::Write {
            file,
            cursor,
            frontier: frontier + SECTOR_SIZE,
        };
        Ok(())
    }

    /// Program the whole buffer at the cursor.
    ///
    /// If the chip runs out, the bytes that fit are programmed, the rest
    /// are dropped and `NoSpace` is returned. If a program fails, the bytes
    /// not yet programmed stay buffered and the cursor covers only what
    /// reached flash.
    fn flush_buffer(&mut self) -> Result<(), StoreError> {
        let Session::Write { file, mut cursor, mut frontier } = self.session else {
            return Err(StoreError::WrongMode);
        };
        if self.buffer.is_empty() {
            return Ok(());
        }

        let room = self.limit().saturating_sub(cursor) as usize;
        let overflow = self.buffer.len() > room;
        let len = self.buffer.len().min(room);
        let end = cursor + len as u32;

        while end > frontier {
            wait_ready(&mut self.dev, &mut self.delay);
            self.dev.write_enable()?;
            self.dev.sector_erase(frontier)?;
            frontier += SECTOR_SIZE;
            self.session = Session::Write { file, cursor, frontier };
        }

        // First chunk tops up the current page, the rest are whole pages
        let mut done = 0;
        let mut result = Ok(());
        while done < len {
            let chunk = (page_remaining(cursor) as usize).min(len - done);
            let data = &self.buffer.as_slice()[done..done + chunk];

            wait_ready(&mut self.dev, &mut self.delay);
            let step = match self.dev.write_enable() {
                Ok(()) => self.dev.page_program(cursor, data),
                Err(e) => Err(e),
            };
            if let Err(e) = step {
                result = Err(StoreError::from(e));
                break;
            }

            cursor += chunk as u32;
            done += chunk;
        }

        if overflow && result.is_ok() {
            warn!("[store] device full, dropped {} bytes of file {}", self.buffer.len() - done, file);
            self.buffer.clear();
            result = Err(StoreError::NoSpace);
        } else {
            self.buffer.consume(done);
        }
        self.session = Session::Write { file, cursor, frontier };
        result
    }

    /// Read from the file open for reading into `buf`. Returns the number of
    /// bytes read: at most `buf.len()`, clamped to what is left in the file,
    /// and 0 when no file is open for reading or the device read fails.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let Session::Read { file, cursor } = self.session else {
            return 0;
        };
        let Some(rec) = self.fat.get(file) else {
            return 0;
        };

        let n = (rec.end_addr.saturating_sub(cursor) as usize).min(buf.len());
        if n == 0 {
            return 0;
        }
        if let Err(e) = self.dev.fast_read(cursor, &mut buf[..n]) {
            warn!("[store] read of {} bytes at {:#x} failed: {}", n, cursor, e);
            return 0;
        }

        self.session = Session::Read {
            file,
            cursor: cursor + n as u32,
        };
        n
    }

    /// Bytes left to read in the open file; 0 outside a read session.
    pub fn peek(&self) -> u32 {
        match self.session {
            Session::Read { file, cursor } => self
                .fat
                .get(file)
                .map_or(0, |rec| rec.end_addr.saturating_sub(cursor)),
            _ => 0,
        }
    }

    /// Forget the most recently created file. The flash itself is untouched;
    /// the next `new_file` reuses the space.
    pub fn delete_last_file(&mut self) -> Result<(), StoreError> {
        if self.session != Session::Idle {
            return Err(StoreError::WrongMode);
        }
        if let Some(rec) = self.fat.pop() {
            debug!("[store] deleted file {} at {:#x}", self.fat.len() + 1, rec.start_addr);
        }
        self.persist()
    }

    /// Forget every file.
    pub fn delete_all_files(&mut self) -> Result<(), StoreError> {
        if self.session != Session::Idle {
            return Err(StoreError::WrongMode);
        }
        self.fat.clear();
        self.persist()?;
        debug!("[store] deleted all files");
        Ok(())
    }
}
