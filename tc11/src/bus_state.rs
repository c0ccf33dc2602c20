use common::constants::{IO_PAGE_START, UNIBUS_END};

use log::trace;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("non-existent memory at 0o{0:o}")]
    NonExistent(u32),
    #[error("odd address 0o{0:o} for word access")]
    Odd(u32),
}

// Host memory as seen from the Unibus. Separate from Bus so a mutable borrow
// can be handed to MMIO handlers for DMA.
pub struct BusState {
    mem: Vec<u8>,
}

impl BusState {
    pub const DEFAULT_SIZE: u32 = IO_PAGE_START;

    pub fn new() -> Self {
        Self::with_size(Self::DEFAULT_SIZE)
    }

    // Size in bytes; anything at or above it answers with NXM.
    pub fn with_size(size: u32) -> Self {
        assert!(size <= UNIBUS_END, "memory size 0o{size:o} exceeds the Unibus");
        assert!(size & 0x1 == 0);
        BusState {
            mem: vec![0; size as usize],
        }
    }

    pub fn size(&self) -> u32 {
        self.mem.len() as u32
    }

    fn check(&self, addr: u32, bytes: u32) -> Result<usize, BusError> {
        if addr + bytes > self.size() {
            return Err(BusError::NonExistent(addr));
        }
        Ok(addr as usize)
    }

    pub fn read_byte(&self, addr: u32) -> Result<u8, BusError> {
        let idx = self.check(addr, 1)?;
        Ok(self.mem[idx])
    }

    pub fn write_byte(&mut self, addr: u32, val: u8) -> Result<(), BusError> {
        trace!("Mem: writing {val:#o} to 0o{addr:o} (byte)");
        let idx = self.check(addr, 1)?;
        self.mem[idx] = val;
        Ok(())
    }

    pub fn read_word(&self, addr: u32) -> Result<u16, BusError> {
        if addr & 1 != 0 {
            return Err(BusError::Odd(addr));
        }
        let idx = self.check(addr, 2)?;
        Ok((self.mem[idx] as u16) | ((self.mem[idx + 1] as u16) << 8))
    }

    pub fn write_word(&mut self, addr: u32, val: u16) -> Result<(), BusError> {
        trace!("Mem: writing {val:#o} to 0o{addr:o} (word)");
        if addr & 1 != 0 {
            return Err(BusError::Odd(addr));
        }
        let idx = self.check(addr, 2)?;
        self.mem[idx] = val as u8;
        self.mem[idx + 1] = (val >> 8) as u8;
        Ok(())
    }

    pub fn load_words(&mut self, start: u32, words: &[u16]) -> Result<(), BusError> {
        for (i, word) in words.iter().enumerate() {
            self.write_word(start + 2 * i as u32, *word)?;
        }
        Ok(())
    }

    pub fn read_words(&self, start: u32, count: usize) -> Result<Vec<u16>, BusError> {
        (0..count)
            .map(|i| self.read_word(start + 2 * i as u32))
            .collect()
    }
}

impl Default for BusState {
    fn default() -> Self {
        Self::new()
    }
}
