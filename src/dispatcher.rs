//! dispatcher.rs
//!
//! Component H: decodes a freshly written command register, decides
//! whether it may replace a command already running, and builds the
//! initial sub-state. Everything here runs synchronously with the CPU's
//! register write; the returned FDC-cycle delay is what the caller arms
//! the timer for (`Controller::write_command`/`Controller::tick`).

use crate::collab::MemoryBus;
use crate::command::{self, CommandState, Phase};
use crate::controller::Controller;
use crate::registers::{self, CommandType, STR_BUSY};

/// Delay used while waiting for a drive/disk that isn't there yet, or
/// for an idle controller's background index tracking (§4.H).
pub const IDLE_POLL_CYCLES: u32 = 50_000;

/// Decodes and admits (or drops) a command-register write. Returns the
/// FDC-cycle delay to arm the timer for, if anything was admitted.
pub(crate) fn dispatch_command(ctrl: &mut Controller, mem: &mut dyn MemoryBus, cr: u8) -> Option<u32> {
    let new_type = registers::classify(cr);
    if matches!(new_type, CommandType::TypeIV) {
        log::trace!("dispatch_command: Force Interrupt, CR={:02X}", cr);
        return Some(command::type4::run(ctrl, cr));
    }

    if ctrl.registers.str_bit(STR_BUSY) {
        let running = command::command_type_of(&ctrl.state);
        let replaceable = ctrl.registers.replace_command_possible && running == Some(new_type);
        if !replaceable {
            log::warn!(
                "dispatch_command: dropping CR={:02X} ({:?}) while busy running {:?}",
                cr,
                new_type,
                running
            );
            return None;
        }
        log::debug!("dispatch_command: CR={:02X} replaces running {:?} command", cr, running);
    }

    log::trace!("dispatch_command: admitting CR={:02X} ({:?})", cr, new_type);
    ctrl.registers.cr = cr;
    ctrl.registers.command_type = new_type;
    ctrl.registers.status_is_type_i = matches!(new_type, CommandType::TypeI);

    let (state, clear_bits) = build_initial_state(cr, new_type);
    ctrl.admit(state, clear_bits);
    Some(ctrl.run_command_until_wait(mem))
}

fn build_initial_state(cr: u8, command_type: CommandType) -> (CommandState, u8) {
    let top4 = cr >> 4;
    match command_type {
        CommandType::TypeI => {
            let state = match top4 {
                0b0000 => CommandState::Restore(command::RestoreState { phase: Phase::Prelude }),
                0b0001 => CommandState::Seek(command::SeekState { phase: Phase::Prelude }),
                0b0010 | 0b0011 => CommandState::Step(command::StepState {
                    variant: command::StepVariant::Step,
                    phase: Phase::Prelude,
                }),
                0b0100 | 0b0101 => CommandState::Step(command::StepState {
                    variant: command::StepVariant::StepIn,
                    phase: Phase::Prelude,
                }),
                _ => CommandState::Step(command::StepState {
                    variant: command::StepVariant::StepOut,
                    phase: Phase::Prelude,
                }),
            };
            (state, command::TYPE_I_CLEAR_BITS)
        }
        CommandType::TypeII => {
            let write = top4 & 0b0010 != 0;
            let state = if write {
                CommandState::WriteSectors(command::WriteSectorsState { phase: Phase::Prelude })
            } else {
                CommandState::ReadSectors(command::ReadSectorsState { phase: Phase::Prelude })
            };
            (state, command::TYPE_II_III_CLEAR_BITS)
        }
        CommandType::TypeIII => {
            let state = match top4 {
                0b1100 => CommandState::ReadAddress(command::ReadAddressState::new()),
                0b1110 => CommandState::ReadTrack(command::ReadTrackState::new()),
                _ => CommandState::WriteTrack(command::WriteTrackState::new()),
            };
            (state, command::TYPE_II_III_CLEAR_BITS)
        }
        CommandType::TypeIV => unreachable!("handled by force_interrupt before reaching build_initial_state"),
    }
}

