/// RAM-backed NOR flash simulator for testing.
///
/// Models the parts of a SPI NOR chip the file store depends on: erased
/// bytes read 0xFF, programming can only clear bits, erase and program need
/// the write-enable latch, programs may not cross a page, and the chip stays
/// busy for a configurable number of status polls after each erase or
/// program. Exported with the `mock-flash` feature.
use alloc::vec;
use alloc::vec::Vec;

use super::{Delay, FlashDevice, FlashError, StatusRegister, PAGE_SIZE, SECTOR_SIZE};

/// One command seen by the simulator, in issue order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    Erase(u32),
    Program { addr: u32, len: usize },
    Read { addr: u32, len: usize },
}

/// RAM-backed flash chip.
pub struct RamFlash {
    data: Vec<u8>,
    wel: bool,
    busy_polls: u32,
    erase_latency: u32,
    program_latency: u32,
    init_fault: Option<FlashError>,
    read_fault: Option<FlashError>,
    erase_fault: Option<FlashError>,
    program_fault: Option<FlashError>,
    programs_before_fault: u32,
    overwrites: usize,
    ops: Vec<FlashOp>,
}

impl RamFlash {
    /// Create a factory-fresh chip of `capacity` bytes (all 0xFF).
    pub fn new(capacity: u32) -> Self {
        Self {
            data: vec![0xFF; capacity as usize],
            wel: false,
            busy_polls: 0,
            erase_latency: 0,
            program_latency: 0,
            init_fault: None,
            read_fault: None,
            erase_fault: None,
            program_fault: None,
            programs_before_fault: 0,
            overwrites: 0,
            ops: Vec::new(),
        }
    }

    /// Status polls an erase stays busy for.
    pub fn set_erase_latency(&mut self, polls: u32) {
        self.erase_latency = polls;
    }

    /// Status polls a page program stays busy for.
    pub fn set_program_latency(&mut self, polls: u32) {
        self.program_latency = polls;
    }

    /// Report busy for the next `polls` status reads.
    pub fn force_busy(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Make `init` fail with `err`.
    pub fn set_init_fault(&mut self, err: Option<FlashError>) {
        self.init_fault = err;
    }

    /// Make every read fail with `err` until cleared.
    pub fn set_read_fault(&mut self, err: Option<FlashError>) {
        self.read_fault = err;
    }

    /// Make every sector erase fail with `err` until cleared.
    pub fn set_erase_fault(&mut self, err: Option<FlashError>) {
        self.erase_fault = err;
    }

    /// Make page programs fail with `err` until cleared. Earlier programs
    /// are kept; a failed program leaves its page untouched.
    pub fn set_program_fault(&mut self, err: Option<FlashError>) {
        self.set_program_fault_after(0, err);
    }

    /// Let `programs` more page programs succeed, then fail with `err`.
    pub fn set_program_fault_after(&mut self, programs: u32, err: Option<FlashError>) {
        self.program_fault = err;
        self.programs_before_fault = programs;
    }

    /// Bytes programmed onto cells that were not erased.
    pub fn overwrites(&self) -> usize {
        self.overwrites
    }

    /// Command log.
    pub fn ops(&self) -> &[FlashOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Addresses of every sector erase issued.
    pub fn erases(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                FlashOp::Erase(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    /// Read raw bytes (for test verification).
    pub fn read_raw(&self, offset: u32, len: usize) -> &[u8] {
        &self.data[offset as usize..offset as usize + len]
    }

    fn check_writable(&self) -> Result<(), FlashError> {
        if self.busy_polls > 0 {
            return Err(FlashError::Busy);
        }
        if !self.wel {
            return Err(FlashError::WriteDisabled);
        }
        Ok(())
    }

    fn check_range(&self, addr: u32, len: usize) -> Result<(), FlashError> {
        if addr as usize + len > self.data.len() {
            return Err(FlashError::OutOfRange);
        }
        Ok(())
    }
}

impl FlashDevice for RamFlash {
    fn init(&mut self, _select: u8) -> Result<(), FlashError> {
        match self.init_fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn status(&mut self) -> StatusRegister {
        let mut sr = StatusRegister::empty();
        if self.wel {
            sr |= StatusRegister::WEL;
        }
        if self.busy_polls > 0 {
            self.busy_polls -= 1;
            sr |= StatusRegister::BUSY;
        }
        sr
    }

    fn write_enable(&mut self) -> Result<(), FlashError> {
        if self.busy_polls > 0 {
            return Err(FlashError::Busy);
        }
        self.wel = true;
        Ok(())
    }

    fn sector_erase(&mut self, addr: u32) -> Result<(), FlashError> {
        if let Some(err) = self.erase_fault {
            return Err(err);
        }
        self.check_writable()?;
        self.check_range(addr, 1)?;

        let start = (addr & !(SECTOR_SIZE - 1)) as usize;
        self.data[start..start + SECTOR_SIZE as usize].fill(0xFF);
        self.ops.push(FlashOp::Erase(start as u32));
        self.wel = false;
        self.busy_polls = self.erase_latency;
        Ok(())
    }

    fn page_program(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        if let Some(err) = self.program_fault {
            if self.programs_before_fault == 0 {
                return Err(err);
            }
            self.programs_before_fault -= 1;
        }
        self.check_writable()?;
        self.check_range(addr, data.len())?;
        if data.len() > (PAGE_SIZE - addr % PAGE_SIZE) as usize {
            return Err(FlashError::OutOfRange);
        }

        let start = addr as usize;
        for (cell, &byte) in self.data[start..start + data.len()].iter_mut().zip(data) {
            if *cell != 0xFF {
                self.overwrites += 1;
            }
            *cell &= byte;
        }
        self.ops.push(FlashOp::Program { addr, len: data.len() });
        self.wel = false;
        self.busy_polls = self.program_latency;
        Ok(())
    }

    fn read_data(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), FlashError> {
        if let Some(err) = self.read_fault {
            return Err(err);
        }
        if self.busy_polls > 0 {
            return Err(FlashError::Busy);
        }
        self.check_range(addr, buf.len())?;

        let start = addr as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        self.ops.push(FlashOp::Read { addr, len: buf.len() });
        Ok(())
    }

    fn capacity(&self) -> u32 {
        self.data.len() as u32
    }
}

/// Delay that only counts how often it was asked to pause.
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub pauses: u32,
}

impl Delay for CountingDelay {
    fn pause(&mut self) {
        self.pauses += 1;
    }
}
