//! command/mod.rs
//!
//! Component G: the per-command nested state machines. Each command is a
//! flat enumeration of its own sub-states (Design Notes: "prefer a flat
//! enumeration per command with explicit transition tables"); the shared
//! pre/post phases (spin-up, head-settle, completion, motor-stop) are
//! reusable helpers in this module rather than duplicated per command.
//!
//! A tick function returns the FDC-cycle delay until it should run
//! again. A delay of 0 means "re-enter immediately" - the dispatcher
//! (`crate::dispatcher`) loops on a zero delay instead of arming the
//! clock for it.

pub mod motor;
pub mod type1;
pub mod type2;
pub mod type3;
pub mod type4;

use serde::{Deserialize, Serialize};

use crate::collab::MemoryBus;
use crate::controller::Controller;
use crate::registers::{self, STR_CRC_ERROR, STR_MOTOR_ON, STR_RNF, STR_SPIN_UP_RECORD_TYPE, STR_WPRT};

pub use motor::MotorStopState;
pub use type1::{RestoreState, SeekState, StepState, StepVariant};
pub use type2::{ReadSectorsState, WriteSectorsState};
pub use type3::{ReadAddressState, ReadTrackState, WriteTrackState};

/// A command's sub-state is either still in the shared prelude, or past
/// it and running its own body.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Phase<T> {
    Prelude,
    Body(T),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CommandState {
    None,
    Restore(RestoreState),
    Seek(SeekState),
    Step(StepState),
    ReadSectors(ReadSectorsState),
    WriteSectors(WriteSectorsState),
    ReadAddress(ReadAddressState),
    ReadTrack(ReadTrackState),
    WriteTrack(WriteTrackState),
    MotorStop(MotorStopState),
}

impl Default for CommandState {
    fn default() -> Self {
        CommandState::None
    }
}

/// Number of index-pulse revolutions the spin-up wait requires (§4.G).
pub const SPIN_UP_REVOLUTIONS: u32 = 6;
/// Head-settle delay after spin-up/seek, when CR's verify/head-load bit
/// asks for it (§4.G).
pub const HEAD_SETTLE_MS: u32 = 15;
/// Revolutions a sector/ID search or verify is allowed before giving up
/// with RNF (§4.G / §5 "Timeouts").
pub const SEARCH_TIMEOUT_REVOLUTIONS: u32 = 5;
/// Attempts Restore makes stepping out before giving up (§4.G).
pub const RESTORE_MAX_ATTEMPTS: u8 = 255;

/// Clears the error bits a fresh Type I/II/III command is responsible
/// for clearing in its prelude (§4.G "Common prelude... clear error bits
/// per type").
pub(crate) const TYPE_I_CLEAR_BITS: u8 = STR_RNF;
pub(crate) const TYPE_II_III_CLEAR_BITS: u8 = STR_RNF | STR_CRC_ERROR | STR_WPRT;

/// Runs one tick of the shared Type I/II/III prelude (§4.G "Common
/// prelude"). The dispatcher has already set STR.BUSY and cleared the
/// command's error bits, and set `replace_command_possible = true`,
/// before the command's first tick. Returns `Some(delay)` while the
/// prelude still has work to do; `None` once it has completed (STR
/// SPIN_UP set, `replace_command_possible` cleared) and the caller
/// should move its sub-state out of `Phase::Prelude`.
pub(crate) fn tick_prelude(ctrl: &mut Controller) -> Option<u32> {
    if !ctrl.prelude_waiting {
        let spin_up_disabled = ctrl.registers.cr & 0x08 != 0;
        let motor_on = ctrl.registers.str_bit(STR_MOTOR_ON);
        if !spin_up_disabled && !motor_on {
            ctrl.registers.set_str_bit(STR_SPIN_UP_RECORD_TYPE, false);
            ctrl.registers.index_pulse_counter = 0;
            ctrl.registers.set_str_bit(STR_MOTOR_ON, true);
            if let Some(i) = ctrl.selected_drive_index() {
                ctrl.drives[i].enabled = true;
            }
            ctrl.prelude_waiting = true;
        }
    }

    if ctrl.prelude_waiting {
        if ctrl.registers.index_pulse_counter < SPIN_UP_REVOLUTIONS {
            return Some(ctrl.next_index_delay());
        }
        ctrl.prelude_waiting = false;
    }

    ctrl.registers.set_str_bit(STR_SPIN_UP_RECORD_TYPE, true);
    ctrl.registers.replace_command_possible = false;
    None
}

/// Shared command completion (§4.G "Completion common"): clears BUSY,
/// optionally raises IRQ, and transitions into the internal MotorStop
/// command.
pub(crate) fn complete(ctrl: &mut Controller, raise_irq: bool) -> (CommandState, u32) {
    ctrl.registers.set_str_bit(registers::STR_BUSY, false);
    if raise_irq {
        ctrl.irq.raise_irq();
    }
    motor::enter(ctrl)
}

/// Convenience: fail the running command with RNF and complete.
pub(crate) fn fail_rnf(ctrl: &mut Controller) -> (CommandState, u32) {
    log::warn!("command: Record Not Found, CR={:02X} SR={:02X} TR={:02X}", ctrl.registers.cr, ctrl.registers.sr, ctrl.registers.tr);
    ctrl.registers.set_str_bit(STR_RNF, true);
    complete(ctrl, true)
}

/// Runs one tick of whatever command is currently active, returning the
/// FDC-cycle delay until the next tick. Dispatched from
/// `Controller::run_command_until_wait`. `mem` is only touched by the
/// commands that actually move bytes through the DMA FIFO.
pub(crate) fn step(ctrl: &mut Controller, mem: &mut dyn MemoryBus) -> u32 {
    let state = std::mem::replace(&mut ctrl.state, CommandState::None);
    let (next, delay) = match state {
        CommandState::None => (CommandState::None, crate::dispatcher::IDLE_POLL_CYCLES),
        CommandState::Restore(s) => type1::step_restore(ctrl, s),
        CommandState::Seek(s) => type1::step_seek(ctrl, s),
        CommandState::Step(s) => type1::step_step(ctrl, s),
        CommandState::ReadSectors(s) => type2::step_read(ctrl, s, mem),
        CommandState::WriteSectors(s) => type2::step_write(ctrl, s, mem),
        CommandState::ReadAddress(s) => type3::step_read_address(ctrl, s, mem),
        CommandState::ReadTrack(s) => type3::step_read_track(ctrl, s, mem),
        CommandState::WriteTrack(s) => type3::step_write_track(ctrl, s),
        CommandState::MotorStop(s) => motor::step(ctrl, s),
    };
    ctrl.state = next;
    delay
}

/// The command type a currently-running state belongs to, used by the
/// dispatcher's replace-admission check (§3 invariants).
pub(crate) fn command_type_of(state: &CommandState) -> Option<registers::CommandType> {
    match state {
        CommandState::None | CommandState::MotorStop(_) => None,
        CommandState::Restore(_) | CommandState::Seek(_) | CommandState::Step(_) => Some(registers::CommandType::TypeI),
        CommandState::ReadSectors(_) | CommandState::WriteSectors(_) => Some(registers::CommandType::TypeII),
        CommandState::ReadAddress(_) | CommandState::ReadTrack(_) | CommandState::WriteTrack(_) => {
            Some(registers::CommandType::TypeIII)
        }
    }
}
