//! dma.rs
//!
//! Component E: the 16-byte burst FIFO sitting between the FDC data
//! register and host RAM. Unlike the teacher's 8237 (`devices/dma.rs`,
//! four independent channels, word counts, page registers) the WD1772's
//! companion DMA is a single bespoke engine: one FIFO, one sector
//! counter, one 24-bit address register. The register-file conventions
//! (named bit constants, explicit mode-write side effects) are carried
//! over from the 8237 model; the transfer shape is not.

use crate::collab::MemoryBus;
use serde::{Deserialize, Serialize};

pub const FIFO_CAPACITY: usize = 16;
pub const SECTOR_BYTES: i32 = 512;

/// Mode-register bit that, when toggled, resets the DMA engine.
pub const MODE_RESET_TOGGLE_BIT: u16 = 0x100;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Direction {
    DiskToRam,
    RamToDisk,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dma {
    pub status: u16,
    pub mode: u16,
    pub sector_count: u16,
    pub bytes_in_sector: i32,
    fifo: [u8; FIFO_CAPACITY],
    fifo_size: usize,
    pub recent_ff8604_val: u16,
    /// 24-bit address, word-aligned (bit 0 always 0); high byte masked
    /// to 6 bits on 4 MB machines.
    address: u32,
    pub direction: Direction,
    pub error: bool,
    mem4mb: bool,
}

impl Dma {
    pub fn new(mem4mb: bool) -> Self {
        Dma {
            status: 0,
            mode: 0,
            sector_count: 0,
            bytes_in_sector: SECTOR_BYTES,
            fifo: [0; FIFO_CAPACITY],
            fifo_size: 0,
            recent_ff8604_val: 0,
            address: 0,
            direction: Direction::DiskToRam,
            error: false,
            mem4mb,
        }
    }

    pub fn address_mask(&self) -> u32 {
        if self.mem4mb {
            0x3F_FFFE
        } else {
            0xFF_FFFE
        }
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn set_address(&mut self, addr: u32) {
        self.address = addr & self.address_mask();
    }

    pub fn fifo_size(&self) -> usize {
        self.fifo_size
    }

    /// Full soft reset, as triggered by toggling mode bit 8 twice, or by
    /// a hard controller reset.
    pub fn reset(&mut self) {
        self.fifo_size = 0;
        self.fifo = [0; FIFO_CAPACITY];
        self.sector_count = 0;
        self.bytes_in_sector = SECTOR_BYTES;
        self.error = false;
    }

    /// Writes the DMA mode/status register, applying the bit-8-toggle
    /// reset rule.
    pub fn write_mode(&mut self, new_mode: u16) {
        if (new_mode ^ self.mode) & MODE_RESET_TOGGLE_BIT != 0 {
            self.reset();
        }
        self.mode = new_mode;
        self.direction = if new_mode & MODE_RESET_TOGGLE_BIT != 0 {
            Direction::RamToDisk
        } else {
            Direction::DiskToRam
        };
    }

    /// Disk -> RAM path. Pushes one byte into the FIFO, flushing to RAM
    /// every 16 bytes and rolling `bytes_in_sector`/`sector_count`.
    pub fn push_byte(&mut self, byte: u8, mem: &mut dyn MemoryBus) {
        if self.sector_count == 0 {
            log::warn!("dma: push with sector_count == 0, dropping byte and setting error bit");
            self.error = true;
            self.recent_ff8604_val = (self.recent_ff8604_val & 0xFF00) | byte as u16;
            return;
        }
        self.error = false;
        self.fifo[self.fifo_size] = byte;
        self.fifo_size += 1;
        if self.fifo_size == FIFO_CAPACITY {
            mem.safe_copy(self.address, &self.fifo);
            self.address = self.address.wrapping_add(FIFO_CAPACITY as u32) & self.address_mask();
            let last_two = ((self.fifo[14] as u16) << 8) | self.fifo[15] as u16;
            self.recent_ff8604_val = last_two;
            self.fifo_size = 0;
            self.bytes_in_sector -= FIFO_CAPACITY as i32;
            if self.bytes_in_sector <= 0 {
                self.sector_count = self.sector_count.saturating_sub(1);
                self.bytes_in_sector = SECTOR_BYTES;
            }
        }
    }

    /// RAM -> disk path. Pulls one byte from the FIFO, refilling from RAM
    /// 16 bytes at a time when the FIFO runs dry.
    pub fn pull_byte(&mut self, mem: &mut dyn MemoryBus) -> u8 {
        if self.fifo_size == 0 {
            if self.sector_count == 0 {
                log::warn!("dma: pull with sector_count == 0, returning 0 and setting error bit");
                self.error = true;
                return 0;
            }
            self.error = false;
            for slot in self.fifo.iter_mut() {
                *slot = mem.ram_read(self.address);
                self.address = self.address.wrapping_add(1) & self.address_mask();
            }
            self.fifo_size = FIFO_CAPACITY;
        }
        let byte = self.fifo[0];
        self.fifo.copy_within(1..FIFO_CAPACITY, 0);
        self.fifo_size -= 1;
        self.bytes_in_sector -= 1;
        if self.bytes_in_sector <= 0 {
            self.sector_count = self.sector_count.saturating_sub(1);
            self.bytes_in_sector = SECTOR_BYTES;
        }
        byte
    }

    /// Readable low 3 status bits: bit 0 = error (1 = ok), bit 1 =
    /// sector-count-nonzero, bit 2 = DRQ (always 0 from the CPU's view).
    /// Bits 3-15 echo `recent_ff8604_val`.
    pub fn status_word(&self) -> u16 {
        let mut bits = 0u16;
        if !self.error {
            bits |= 0x01;
        }
        if self.sector_count != 0 {
            bits |= 0x02;
        }
        (bits & 0x07) | (self.recent_ff8604_val & !0x07)
    }
}
