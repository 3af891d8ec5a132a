//! command/type2.rs
//!
//! Type II commands: Read Sector(s) and Write Sector(s). Both share the
//! same search-for-ID-field loop as Type I's verify scan, but compare
//! the sector number (SR) instead of the track.

use serde::{Deserialize, Serialize};

use crate::collab::MemoryBus;
use crate::controller::Controller;
use crate::geometry;
use crate::registers::{STR_RNF, STR_WPRT};

use super::{CommandState, Phase, SEARCH_TIMEOUT_REVOLUTIONS};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReadWriteBody {
    Settling,
    Searching { arrived: bool },
    Transferring { index: u16 },
    Crc { index: u8 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadSectorsState {
    pub phase: Phase<ReadWriteBody>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteSectorsState {
    pub phase: Phase<ReadWriteBody>,
}

const CRC_BYTE_TIMES: u8 = 2;

enum SearchOutcome {
    Wait(bool, u32),
    Found,
    Failure,
}

/// One tick of "search for the next ID field matching SR" (§4.G step 2).
fn run_search(ctrl: &mut Controller, arrived: bool) -> SearchOutcome {
    if !arrived {
        if ctrl.registers.index_pulse_counter >= SEARCH_TIMEOUT_REVOLUTIONS {
            return SearchOutcome::Failure;
        }
        let (delay, sector) = ctrl.next_id_field();
        ctrl.registers.next_sector_id_sr = sector;
        return SearchOutcome::Wait(true, delay);
    }
    if ctrl.registers.next_sector_id_sr == ctrl.registers.sr {
        SearchOutcome::Found
    } else {
        SearchOutcome::Wait(false, 0)
    }
}

fn multi_sector(ctrl: &Controller) -> bool {
    ctrl.registers.cr & 0b0001_0000 != 0
}

fn head_load_settle(ctrl: &Controller) -> bool {
    ctrl.registers.cr & 0b0000_0100 != 0
}

pub(crate) fn step_read(
    ctrl: &mut Controller,
    mut state: ReadSectorsState,
    mem: &mut dyn MemoryBus,
) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::ReadSectors(state), delay);
            }
            if head_load_settle(ctrl) {
                ctrl.registers.index_pulse_counter = 0;
                state.phase = Phase::Body(ReadWriteBody::Settling);
                return (CommandState::ReadSectors(state), ctrl.ms_to_fdc_cycles(super::HEAD_SETTLE_MS));
            }
            ctrl.registers.index_pulse_counter = 0;
            state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
            (CommandState::ReadSectors(state), 0)
        }
        Phase::Body(ReadWriteBody::Settling) => {
            state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
            (CommandState::ReadSectors(state), 0)
        }
        Phase::Body(ReadWriteBody::Searching { arrived }) => match run_search(ctrl, arrived) {
            SearchOutcome::Wait(arrived, delay) => {
                state.phase = Phase::Body(ReadWriteBody::Searching { arrived });
                (CommandState::ReadSectors(state), delay)
            }
            SearchOutcome::Found => {
                let Some(i) = ctrl.selected_drive_index() else {
                    return super::fail_rnf(ctrl);
                };
                let track = ctrl.drives[i].head_track;
                let side = ctrl.registers.side_signal;
                let sector = ctrl.registers.sr;
                ctrl.disk.read_sector(i, sector, track, side, &mut ctrl.sector_scratch);
                let density = ctrl.selected_density();
                let delay = geometry::bytes_to_cycles(geometry::ID_FIELD_TO_DATA_BYTES, density) as u32;
                state.phase = Phase::Body(ReadWriteBody::Transferring { index: 0 });
                (CommandState::ReadSectors(state), delay.max(1))
            }
            SearchOutcome::Failure => super::fail_rnf(ctrl),
        },
        Phase::Body(ReadWriteBody::Transferring { index }) => {
            let density = ctrl.selected_density();
            if (index as usize) < ctrl.sector_scratch.len() {
                let byte = ctrl.sector_scratch[index as usize];
                ctrl.dma.push_byte(byte, mem);
                state.phase = Phase::Body(ReadWriteBody::Transferring { index: index + 1 });
                (CommandState::ReadSectors(state), geometry::bytes_to_cycles(1, density) as u32)
            } else {
                state.phase = Phase::Body(ReadWriteBody::Crc { index: 0 });
                (CommandState::ReadSectors(state), geometry::bytes_to_cycles(1, density) as u32)
            }
        }
        Phase::Body(ReadWriteBody::Crc { index }) => {
            if index + 1 < CRC_BYTE_TIMES {
                let density = ctrl.selected_density();
                state.phase = Phase::Body(ReadWriteBody::Crc { index: index + 1 });
                return (CommandState::ReadSectors(state), geometry::bytes_to_cycles(1, density) as u32);
            }
            ctrl.registers.set_str_bit(STR_RNF, false);
            if multi_sector(ctrl) {
                ctrl.registers.sr = ctrl.registers.sr.wrapping_add(1);
                ctrl.registers.index_pulse_counter = 0;
                state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
                return (CommandState::ReadSectors(state), 0);
            }
            super::complete(ctrl, true)
        }
    }
}

pub(crate) fn step_write(
    ctrl: &mut Controller,
    mut state: WriteSectorsState,
    mem: &mut dyn MemoryBus,
) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::WriteSectors(state), delay);
            }
            if let Some(i) = ctrl.selected_drive_index() {
                if ctrl.disk.is_write_protected(i) {
                    log::warn!("write_sectors: drive {} is write-protected, aborting", i);
                    ctrl.registers.set_str_bit(STR_WPRT, true);
                    return super::complete(ctrl, true);
                }
            }
            if head_load_settle(ctrl) {
                ctrl.registers.index_pulse_counter = 0;
                state.phase = Phase::Body(ReadWriteBody::Settling);
                return (CommandState::WriteSectors(state), ctrl.ms_to_fdc_cycles(super::HEAD_SETTLE_MS));
            }
            ctrl.registers.index_pulse_counter = 0;
            state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
            (CommandState::WriteSectors(state), 0)
        }
        Phase::Body(ReadWriteBody::Settling) => {
            state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
            (CommandState::WriteSectors(state), 0)
        }
        Phase::Body(ReadWriteBody::Searching { arrived }) => match run_search(ctrl, arrived) {
            SearchOutcome::Wait(arrived, delay) => {
                state.phase = Phase::Body(ReadWriteBody::Searching { arrived });
                (CommandState::WriteSectors(state), delay)
            }
            SearchOutcome::Found => {
                let density = ctrl.selected_density();
                let delay = geometry::bytes_to_cycles(geometry::ID_FIELD_TO_DATA_BYTES, density) as u32;
                state.phase = Phase::Body(ReadWriteBody::Transferring { index: 0 });
                (CommandState::WriteSectors(state), delay.max(1))
            }
            SearchOutcome::Failure => super::fail_rnf(ctrl),
        },
        Phase::Body(ReadWriteBody::Transferring { index }) => {
            let density = ctrl.selected_density();
            if (index as usize) < ctrl.sector_scratch.len() {
                // The sector was already committed to the image below;
                // the FIFO is still pulled byte-for-byte to reproduce the
                // bus load a real transfer would impose (§4.G).
                let byte = ctrl.dma.pull_byte(mem);
                ctrl.sector_scratch[index as usize] = byte;
                state.phase = Phase::Body(ReadWriteBody::Transferring { index: index + 1 });
                (CommandState::WriteSectors(state), geometry::bytes_to_cycles(1, density) as u32)
            } else {
                if let Some(i) = ctrl.selected_drive_index() {
                    let track = ctrl.drives[i].head_track;
                    let side = ctrl.registers.side_signal;
                    let sector = ctrl.registers.sr;
                    ctrl.disk.write_sector(i, sector, track, side, &ctrl.sector_scratch);
                }
                state.phase = Phase::Body(ReadWriteBody::Crc { index: 0 });
                (CommandState::WriteSectors(state), geometry::bytes_to_cycles(1, density) as u32)
            }
        }
        Phase::Body(ReadWriteBody::Crc { index }) => {
            if index + 1 < CRC_BYTE_TIMES {
                let density = ctrl.selected_density();
                state.phase = Phase::Body(ReadWriteBody::Crc { index: index + 1 });
                return (CommandState::WriteSectors(state), geometry::bytes_to_cycles(1, density) as u32);
            }
            ctrl.registers.set_str_bit(STR_RNF, false);
            if multi_sector(ctrl) {
                ctrl.registers.sr = ctrl.registers.sr.wrapping_add(1);
                ctrl.registers.index_pulse_counter = 0;
                state.phase = Phase::Body(ReadWriteBody::Searching { arrived: false });
                return (CommandState::WriteSectors(state), 0);
            }
            super::complete(ctrl, true)
        }
    }
}
