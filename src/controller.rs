//! controller.rs
//!
//! The aggregate owning every subsystem (Design Notes: "all state is
//! naturally a single owning aggregate with interior method dispatch").
//! Mirrors the shape of the teacher's `FloppyController`
//! (`devices/fdc/controller.rs`) - one struct holding registers, drives,
//! and the running command - but collaborators arrive as injected trait
//! objects instead of direct field access into sibling devices.

use crate::clock::{Clock, ClockConfig};
use crate::collab::{DiskImage, InterruptLine, MemoryBus, RandomSource};
use crate::command::{self, CommandState};
use crate::dma::Dma;
use crate::drive::{self, DriveConfig, DriveState, MAX_DRIVES};
use crate::error::{BusFault, BusResult};
use crate::registers::{self, Registers};

/// FDC-register select, decoded from DMA-mode bits 1-2 (§4.F).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FdcRegister {
    Status,
    Track,
    Sector,
    Data,
}

pub struct Controller {
    pub registers: Registers,
    pub dma: Dma,
    pub drives: [DriveState; MAX_DRIVES],
    pub clock: Clock,
    pub state: CommandState,
    /// True while the shared prelude has already armed the spin-up wait
    /// for the in-flight command; mirrors the teacher's `operation_init`
    /// flag, which exists for the same reason - a tick function has no
    /// other way to tell "first entry" from "still waiting".
    pub(crate) prelude_waiting: bool,
    /// Internal FDC-cycle clock. Advanced by the delay that was armed
    /// for the tick that just fired; there is no external `now_cycles()`
    /// collaborator inside the core (that facility lives on the host
    /// timer and is out of scope per the core's boundary).
    pub(crate) now_fdc: u64,
    pub(crate) last_armed_fdc: u32,
    /// Scratch buffer reused by Read/Write Sector and Read Address.
    pub(crate) sector_scratch: [u8; 512],
    /// Scratch buffer for a synthesized full-track image (Read Track).
    pub(crate) track_scratch: Vec<u8>,

    pub disk: Box<dyn DiskImage>,
    pub irq: Box<dyn InterruptLine>,
    pub rng: Box<dyn RandomSource>,
}

impl Controller {
    pub fn new(
        clock_config: ClockConfig,
        drive_configs: [DriveConfig; MAX_DRIVES],
        mem4mb: bool,
        disk: Box<dyn DiskImage>,
        irq: Box<dyn InterruptLine>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Controller {
            registers: Registers::default(),
            dma: Dma::new(mem4mb),
            drives: [DriveState::new(drive_configs[0]), DriveState::new(drive_configs[1])],
            clock: Clock::new(clock_config),
            state: CommandState::None,
            prelude_waiting: false,
            now_fdc: 0,
            last_armed_fdc: 0,
            sector_scratch: [0; 512],
            track_scratch: Vec::new(),
            disk,
            irq,
            rng,
        }
    }

    pub fn selected_drive_index(&self) -> Option<usize> {
        if self.registers.drive_select >= 0 {
            Some(self.registers.drive_select as usize)
        } else {
            None
        }
    }

    pub fn fdc_freq_hz(&self) -> u32 {
        self.clock.fdc_freq_hz()
    }

    pub(crate) fn now_fdc(&self) -> u64 {
        self.now_fdc
    }

    /// FDC cycles elapsed since the selected drive's last index pulse,
    /// `0` if no drive is selected or its phase is unknown.
    pub(crate) fn cycles_since_index(&self) -> u64 {
        match self.selected_drive_index() {
            Some(i) if self.drives[i].index_pulse_ref != 0 => {
                self.now_fdc.wrapping_sub(self.drives[i].index_pulse_ref)
            }
            _ => 0,
        }
    }

    pub(crate) fn selected_density(&self) -> crate::drive::Density {
        self.selected_drive_index()
            .map(|i| self.drives[i].density)
            .unwrap_or(crate::drive::Density::Dd)
    }

    /// FDC-cycle delay until the selected drive's next index pulse, or
    /// the dispatcher's idle poll interval if no drive is selected.
    pub(crate) fn next_index_delay(&self) -> u32 {
        match self.selected_drive_index() {
            Some(i) => {
                drive::next_index_delay(&self.drives[i], self.now_fdc, self.fdc_freq_hz()).min(u32::MAX as u64) as u32
            }
            None => crate::dispatcher::IDLE_POLL_CYCLES,
        }
    }

    /// Locates the next sector-ID field ahead of the selected drive's
    /// current rotational position (§4.D), returning the FDC-cycle delay
    /// until it arrives and the sector number found there. Falls back to
    /// a 9-sector track if no image is inserted, so a verify/search scan
    /// against an empty drive still makes forward progress toward its
    /// own timeout instead of panicking on a missing geometry.
    pub(crate) fn next_id_field(&self) -> (u32, u8) {
        let density = self.selected_density();
        let offset = crate::geometry::current_byte_offset(self.cycles_since_index(), density);
        let sectors_per_track = self
            .selected_drive_index()
            .and_then(|i| self.disk.disk_details(i))
            .map(|(spt, _)| spt)
            .unwrap_or(9);
        let found = crate::geometry::next_sector_id(offset, sectors_per_track, density);
        let delay = crate::geometry::bytes_to_cycles(found.bytes_until, density).min(u32::MAX as u64) as u32;
        (delay.max(1), found.sector)
    }

    /// Converts a millisecond delay (step rate, head-settle) to FDC
    /// cycles at the controller's current reference frequency.
    pub(crate) fn ms_to_fdc_cycles(&self, ms: u32) -> u32 {
        ((ms as u64 * self.fdc_freq_hz() as u64) / 1000).max(1) as u32
    }

    /// Advances every spinning drive's index phase and, for the
    /// currently selected drive, folds whole pulses into
    /// `index_pulse_counter` and the "interrupt on index" condition
    /// (§4.B/C). Establishes phase for a drive whose motor just turned
    /// on and has no reference yet.
    fn tick_index_all(&mut self) {
        let selected = self.selected_drive_index();
        let fdc_freq = self.fdc_freq_hz();
        for i in 0..MAX_DRIVES {
            if !self.drives[i].enabled || !self.drives[i].disk_inserted {
                continue;
            }
            if self.drives[i].index_pulse_ref == 0 {
                drive::init_index_phase(&mut self.drives[i], self.now_fdc, fdc_freq, self.rng.as_mut());
                continue;
            }
            let pulses = drive::tick_index(&mut self.drives[i], self.now_fdc, fdc_freq);
            if pulses > 0 && Some(i) == selected {
                self.registers.index_pulse_counter = self.registers.index_pulse_counter.saturating_add(pulses);
                if self.registers.interrupt_cond & registers::IRQ_COND_ON_INDEX != 0 {
                    self.irq.raise_irq();
                }
            }
        }
    }

    fn selected_index_signal(&self) -> bool {
        match self.selected_drive_index() {
            Some(i) => drive::index_signal(&self.drives[i], self.now_fdc, self.fdc_freq_hz()),
            None => false,
        }
    }

    fn selected_write_protected(&self) -> bool {
        match self.selected_drive_index() {
            Some(i) => self.disk.is_write_protected(i),
            None => true,
        }
    }

    /// Entry point for the host's deferred callback firing. `remaining`
    /// is the CPU-cycle credit the host reports was left when it fired
    /// (negative if late); see `Clock::fire`. Runs the active command
    /// until it reports a non-zero delay, then arms the clock for that
    /// many FDC cycles and returns the CPU-cycle delay to schedule.
    pub fn tick(&mut self, mem: &mut dyn MemoryBus, remaining_cpu_cycles: i64) -> u32 {
        self.clock.fire(remaining_cpu_cycles);
        self.now_fdc = self.now_fdc.wrapping_add(self.last_armed_fdc as u64);
        self.tick_index_all();

        let delay = self.run_command_until_wait(mem);
        self.last_armed_fdc = delay;
        self.clock.arm(delay)
    }

    /// Runs the active command until it reports a non-zero delay,
    /// ticking the index engine between zero-delay re-entries. Used both
    /// by `tick` (timer fire) and by the dispatcher admitting a command
    /// synchronously from a register write.
    pub(crate) fn run_command_until_wait(&mut self, mem: &mut dyn MemoryBus) -> u32 {
        let mut delay = command::step(self, mem);
        while delay == 0 {
            self.tick_index_all();
            delay = command::step(self, mem);
        }
        delay
    }

    /// Starts a brand new command, per the dispatcher's admission
    /// decision: sets BUSY, clears the command's error bits, marks the
    /// replace window open, and installs the initial sub-state.
    pub(crate) fn admit(&mut self, state: CommandState, clear_bits: u8) {
        self.registers.set_str_bit(registers::STR_BUSY, true);
        self.registers.set_str_bit(clear_bits, false);
        self.registers.replace_command_possible = true;
        self.prelude_waiting = false;
        self.state = state;
    }

    // -- register-file bus surface (§4.F, §6) --------------------------

    pub fn read_status(&mut self) -> u8 {
        let str_ = self
            .registers
            .read_str(self.selected_write_protected(), self.selected_index_signal());
        if self.registers.interrupt_cond & registers::IRQ_COND_IMMEDIATE == 0 {
            self.irq.clear_irq();
        }
        str_
    }

    pub fn read_track(&self) -> u8 {
        self.registers.tr
    }

    pub fn write_track(&mut self, value: u8) {
        self.registers.tr = value;
    }

    pub fn read_sector(&self) -> u8 {
        self.registers.sr
    }

    pub fn write_sector(&mut self, value: u8) {
        self.registers.sr = value;
    }

    pub fn read_data(&self) -> u8 {
        self.registers.dr
    }

    pub fn write_data(&mut self, value: u8) {
        self.registers.dr = value;
    }

    /// Writes the command register, applying the replace-admission rule
    /// of §4.F: Type IV always accepts; Type I/II accept while
    /// `replace_command_possible` and the new command shares the running
    /// one's type; a Type III never replaces a running command; a write
    /// rejected by this rule is silently dropped. Returns the CPU-cycle
    /// delay the host should (re-)schedule its callback for, if the
    /// write armed or re-armed the timer.
    pub fn write_command(&mut self, mem: &mut dyn MemoryBus, cr: u8) -> Option<u32> {
        crate::dispatcher::dispatch_command(self, mem, cr).map(|fdc_delay| {
            self.last_armed_fdc = fdc_delay;
            self.clock.arm(fdc_delay)
        })
    }

    pub fn set_drive_select(&mut self, drive: i8) {
        if self.registers.drive_select != drive {
            if let Some(i) = self.selected_drive_index() {
                self.drives[i].forget_index_phase();
            }
            self.registers.drive_select = drive;
        }
    }

    pub fn set_side_signal(&mut self, side: u8) {
        self.registers.side_signal = side & 1;
    }

    // -- DMA/address register surface (§6) -----------------------------

    /// Reads/writes the word-wide FF8604 register: the selected FDC
    /// register, or DMA sector count when mode bit 4 selects that path.
    pub fn read_ff8604(&mut self, sector_count_path: bool, fdc_reg: FdcRegister) -> u16 {
        if sector_count_path {
            self.dma.sector_count
        } else {
            match fdc_reg {
                FdcRegister::Status => self.read_status() as u16,
                FdcRegister::Track => self.read_track() as u16,
                FdcRegister::Sector => self.read_sector() as u16,
                FdcRegister::Data => self.read_data() as u16,
            }
        }
    }

    pub fn write_ff8604(
        &mut self,
        mem: &mut dyn MemoryBus,
        sector_count_path: bool,
        fdc_reg: FdcRegister,
        value: u16,
    ) -> Option<u32> {
        if sector_count_path {
            self.dma.sector_count = value;
            None
        } else {
            match fdc_reg {
                FdcRegister::Status => self.write_command(mem, value as u8),
                FdcRegister::Track => {
                    self.write_track(value as u8);
                    None
                }
                FdcRegister::Sector => {
                    self.write_sector(value as u8);
                    None
                }
                FdcRegister::Data => {
                    self.write_data(value as u8);
                    None
                }
            }
        }
    }

    pub fn read_ff8606(&self) -> u16 {
        self.dma.status_word()
    }

    pub fn write_ff8606(&mut self, mode: u16) {
        self.dma.write_mode(mode);
    }

    /// Byte access to the DMA address triplet (FF8609/0B/0D); word
    /// accesses to these addresses are a host decoding bug, not ours.
    pub fn read_dma_address_byte(&self, which: AddressByte) -> u8 {
        let addr = self.dma.address();
        match which {
            AddressByte::High => ((addr >> 16) & 0xFF) as u8,
            AddressByte::Mid => ((addr >> 8) & 0xFF) as u8,
            AddressByte::Low => (addr & 0xFF) as u8,
        }
    }

    pub fn write_dma_address_byte(&mut self, which: AddressByte, byte: u8) {
        let addr = self.dma.address();
        let new_addr = match which {
            AddressByte::High => (addr & 0x00_FFFF) | ((byte as u32) << 16),
            AddressByte::Mid => (addr & 0xFF_00FF) | ((byte as u32) << 8),
            AddressByte::Low => (addr & 0xFF_FF00) | (byte as u32 & 0xFE),
        };
        self.dma.set_address(new_addr);
    }

    /// Word access to a byte-only register is a host bus-decode error,
    /// not a guest fault (§6, §7 BusError).
    pub fn word_access_to_byte_register(addr: u32) -> BusResult<()> {
        Err(BusFault::ByteAccessToWordRegister(addr))
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AddressByte {
    High,
    Mid,
    Low,
}
