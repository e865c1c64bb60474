/// NOR flash device interface.
///
/// Abstracts the three primitives a serial NOR chip exposes (sector erase,
/// page program, read) plus the status register used for busy-polling.
/// The file store talks to hardware only through this trait; a RAM-backed
/// simulator implements it for tests.
use core::fmt;

use bitflags::bitflags;

#[cfg(any(test, feature = "mock-flash"))]
pub mod mock;

/// Smallest erasable unit (4 KiB sector).
pub const SECTOR_SIZE: u32 = 0x1000;

/// Programming granularity. A single program must stay inside one page.
pub const PAGE_SIZE: u32 = 0x100;

/// Highest address representable by the on-flash table format (24 bits).
pub const ADDRESS_LIMIT: u32 = 1 << 24;

bitflags! {
    /// Status register 1 of a SPI NOR chip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusRegister: u8 {
        /// Erase or program in progress.
        const BUSY = 0x01;
        /// Write-enable latch. Set by `write_enable`, cleared when an
        /// erase or program completes.
        const WEL = 0x02;
    }
}

/// Errors reported by a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// Device is mid-operation and ignored the command.
    Busy,
    /// Device did not answer (bad chip select, wrong JEDEC id, bus fault).
    NotResponding,
    /// Erase or program issued without the write-enable latch set.
    WriteDisabled,
    /// Address or length outside the device, or a program crossing a page.
    OutOfRange,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::Busy => write!(f, "flash busy"),
            FlashError::NotResponding => write!(f, "flash not responding"),
            FlashError::WriteDisabled => write!(f, "flash write-enable latch not set"),
            FlashError::OutOfRange => write!(f, "flash address out of range"),
        }
    }
}

/// Raw NOR flash access.
pub trait FlashDevice {
    /// Bring up the chip behind chip-select `select`.
    fn init(&mut self, select: u8) -> Result<(), FlashError>;

    /// Read status register 1.
    fn status(&mut self) -> StatusRegister;

    /// True while an erase or program is in progress.
    fn busy(&mut self) -> bool {
        self.status().contains(StatusRegister::BUSY)
    }

    /// Set the write-enable latch. Required before every erase and program.
    fn write_enable(&mut self) -> Result<(), FlashError>;

    /// Erase the sector containing `addr` (all bytes become 0xFF).
    fn sector_erase(&mut self, addr: u32) -> Result<(), FlashError>;

    /// Program up to one page. `data` must not cross a page boundary.
    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError>;

    /// Read `buf.len()` bytes starting at `addr`.
    fn read_data(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Read using the chip's fast-read command. Defaults to `read_data`.
    fn fast_read(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        self.read_data(addr, buf)
    }

    /// Total size in bytes.
    fn capacity(&self) -> u32;
}

/// Pause between two busy polls.
pub trait Delay {
    fn pause(&mut self);
}

/// Busy-wait delay for targets with nothing better to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpinDelay;

impl Delay for SpinDelay {
    fn pause(&mut self) {
        core::hint::spin_loop();
    }
}

/// Poll the device until it reports ready. Returns the number of polls that
/// found it busy. There is no timeout: NOR erase/program latency is bounded.
pub fn wait_ready<D: FlashDevice + ?Sized, W: Delay + ?Sized>(dev: &mut D, delay: &mut W) -> u32 {
    let mut polls = 0;
    while dev.busy() {
        polls += 1;
        delay.pause();
    }
    polls
}

/// Round `addr` up to the next sector boundary.
pub const fn align_up(addr: u32) -> u32 {
    (addr + SECTOR_SIZE - 1) & !(SECTOR_SIZE - 1)
}

/// Bytes left before the page containing `addr` ends.
pub const fn page_remaining(addr: u32) -> u32 {
    PAGE_SIZE - (addr % PAGE_SIZE)
}
