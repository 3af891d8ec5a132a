//! command/type3.rs
//!
//! Type III commands: Read Address, Read Track, Write Track. Unlike Type
//! II these don't search for a *specific* sector - Read Address reports
//! whatever ID field comes next, and Read Track streams the whole
//! synthesized track starting at the next index pulse.

use serde::{Deserialize, Serialize};

use crate::collab::MemoryBus;
use crate::controller::Controller;
use crate::geometry;
use crate::registers::STR_RNF;

use super::{CommandState, Phase};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReadAddressBody {
    Locating,
    Streaming { index: u8 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadAddressState {
    pub phase: Phase<ReadAddressBody>,
    header: [u8; 6],
}

impl ReadAddressState {
    pub fn new() -> Self {
        ReadAddressState { phase: Phase::Prelude, header: [0; 6] }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ReadTrackBody {
    WaitIndex,
    Streaming { index: u32 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReadTrackState {
    pub phase: Phase<ReadTrackBody>,
}

impl ReadTrackState {
    pub fn new() -> Self {
        ReadTrackState { phase: Phase::Prelude }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WriteTrackState {
    pub phase: Phase<()>,
}

impl WriteTrackState {
    pub fn new() -> Self {
        WriteTrackState { phase: Phase::Prelude }
    }
}

pub(crate) fn step_read_address(
    ctrl: &mut Controller,
    mut state: ReadAddressState,
    mem: &mut dyn MemoryBus,
) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::ReadAddress(state), delay);
            }
            let (delay, sector) = ctrl.next_id_field();
            ctrl.registers.next_sector_id_sr = sector;
            state.phase = Phase::Body(ReadAddressBody::Locating);
            (CommandState::ReadAddress(state), delay)
        }
        Phase::Body(ReadAddressBody::Locating) => {
            let Some(i) = ctrl.selected_drive_index() else {
                return super::fail_rnf(ctrl);
            };
            let track = ctrl.drives[i].head_track;
            let side = ctrl.registers.side_signal;
            let sector = ctrl.registers.next_sector_id_sr;
            let field = geometry::synth_id_field(track, side, sector);
            // The three A1 sync bytes and the FE address mark are not
            // transferred over DMA (§4.G); only the last six bytes are.
            state.header.copy_from_slice(&field[4..10]);
            ctrl.registers.sr = track;
            let density = ctrl.selected_density();
            state.phase = Phase::Body(ReadAddressBody::Streaming { index: 0 });
            (CommandState::ReadAddress(state), geometry::bytes_to_cycles(1, density).max(1) as u32)
        }
        Phase::Body(ReadAddressBody::Streaming { index }) => {
            let density = ctrl.selected_density();
            if (index as usize) < state.header.len() {
                let byte = state.header[index as usize];
                ctrl.dma.push_byte(byte, mem);
                state.phase = Phase::Body(ReadAddressBody::Streaming { index: index + 1 });
                (CommandState::ReadAddress(state), geometry::bytes_to_cycles(1, density).max(1) as u32)
            } else {
                ctrl.registers.set_str_bit(STR_RNF, false);
                super::complete(ctrl, true)
            }
        }
    }
}

/// Builds a full synthesized track image into `ctrl.track_scratch`, per
/// §4.G "Read Track": `GAP1 + for each sector(GAP2 + ID field w/ CRC +
/// GAP3a + GAP3b + SYNC + FB + 512 payload bytes + CRC + GAP4)`, padded
/// to `bytes_per_track` with 0x4E. If the selected side doesn't exist on
/// the image, the whole track is random bytes instead.
fn synth_track(ctrl: &mut Controller) {
    let density = ctrl.selected_density();
    let total = geometry::bytes_per_track(density) as usize;
    ctrl.track_scratch.clear();
    ctrl.track_scratch.resize(total, geometry::GAP5_FILL);

    let Some(i) = ctrl.selected_drive_index() else {
        fill_random(ctrl, total);
        return;
    };
    let side = ctrl.registers.side_signal;
    let Some((sectors_per_track, sides)) = ctrl.disk.disk_details(i) else {
        fill_random(ctrl, total);
        return;
    };
    if side >= sides {
        fill_random(ctrl, total);
        return;
    }

    let track = ctrl.drives[i].head_track;
    let mut pos = geometry::GAP1 as usize;
    for sector in 1..=sectors_per_track {
        if pos + geometry::TRACK_SECTOR_BLOCK_BYTES as usize > total {
            break;
        }
        pos += geometry::GAP2 as usize;
        let id_field = geometry::synth_id_field(track, side, sector);
        ctrl.track_scratch[pos..pos + id_field.len()].copy_from_slice(&id_field);
        pos += id_field.len();
        pos += geometry::GAP3A as usize + geometry::GAP3B as usize + geometry::DATA_SYNC_BYTES as usize;

        ctrl.track_scratch[pos] = geometry::DATA_ADDRESS_MARK;
        pos += 1;

        ctrl.disk.read_sector(i, sector, track, side, &mut ctrl.sector_scratch);
        ctrl.track_scratch[pos..pos + 512].copy_from_slice(&ctrl.sector_scratch);
        pos += 512;

        let crc = geometry::crc16_ccitt(&ctrl.track_scratch[pos - 513..pos]);
        ctrl.track_scratch[pos] = (crc >> 8) as u8;
        ctrl.track_scratch[pos + 1] = (crc & 0xFF) as u8;
        pos += 2;

        pos += geometry::GAP4 as usize;
    }
}

fn fill_random(ctrl: &mut Controller, total: usize) {
    for byte in ctrl.track_scratch[..total].iter_mut() {
        *byte = ctrl.rng.next_u32() as u8;
    }
}

pub(crate) fn step_read_track(
    ctrl: &mut Controller,
    mut state: ReadTrackState,
    mem: &mut dyn MemoryBus,
) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::ReadTrack(state), delay);
            }
            state.phase = Phase::Body(ReadTrackBody::WaitIndex);
            (CommandState::ReadTrack(state), ctrl.next_index_delay())
        }
        Phase::Body(ReadTrackBody::WaitIndex) => {
            synth_track(ctrl);
            let density = ctrl.selected_density();
            state.phase = Phase::Body(ReadTrackBody::Streaming { index: 0 });
            (CommandState::ReadTrack(state), geometry::bytes_to_cycles(1, density).max(1) as u32)
        }
        Phase::Body(ReadTrackBody::Streaming { index }) => {
            let density = ctrl.selected_density();
            if (index as usize) < ctrl.track_scratch.len() {
                let byte = ctrl.track_scratch[index as usize];
                ctrl.dma.push_byte(byte, mem);
                state.phase = Phase::Body(ReadTrackBody::Streaming { index: index + 1 });
                (CommandState::ReadTrack(state), geometry::bytes_to_cycles(1, density).max(1) as u32)
            } else {
                ctrl.registers.set_str_bit(STR_RNF, false);
                super::complete(ctrl, true)
            }
        }
    }
}

/// Write Track is an explicit non-goal (§1, §4.G): the controller
/// acknowledges the command, sets RNF, and completes without
/// interpreting the MFM stream the CPU would otherwise feed it.
pub(crate) fn step_write_track(ctrl: &mut Controller, state: WriteTrackState) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => match super::tick_prelude(ctrl) {
            Some(delay) => (CommandState::WriteTrack(state), delay),
            None => super::fail_rnf(ctrl),
        },
        Phase::Body(()) => super::fail_rnf(ctrl),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockConfig;
    use crate::collab::{DiskImage, InterruptLine, RandomSource};
    use crate::drive::{DriveConfig, MAX_DRIVES};

    struct FakeDisk;
    impl DiskImage for FakeDisk {
        fn read_sector(&mut self, _drive: usize, _sector: u8, _track: u8, _side: u8, buf: &mut [u8]) -> usize {
            for (i, b) in buf.iter_mut().enumerate() {
                *b = i as u8;
            }
            buf.len()
        }
        fn write_sector(&mut self, _drive: usize, _sector: u8, _track: u8, _side: u8, _buf: &[u8]) -> usize {
            512
        }
        fn disk_details(&self, _drive: usize) -> Option<(u8, u8)> {
            Some((9, 1))
        }
        fn is_write_protected(&self, _drive: usize) -> bool {
            false
        }
    }

    struct FakeIrq {
        raised: bool,
    }
    impl InterruptLine for FakeIrq {
        fn raise_irq(&mut self) {
            self.raised = true;
        }
        fn clear_irq(&mut self) {
            self.raised = false;
        }
    }

    struct FixedRng;
    impl RandomSource for FixedRng {
        fn next_u32(&mut self) -> u32 {
            0x5A
        }
    }

    struct FakeRam(Vec<u8>);
    impl MemoryBus for FakeRam {
        fn ram_read(&mut self, addr: u32) -> u8 {
            *self.0.get(addr as usize).unwrap_or(&0)
        }
        fn ram_write(&mut self, addr: u32, byte: u8) {
            if (addr as usize) < self.0.len() {
                self.0[addr as usize] = byte;
            }
        }
    }

    fn test_controller() -> Controller {
        let mut ctrl = Controller::new(
            ClockConfig::default(),
            [DriveConfig::default(), DriveConfig::default()],
            false,
            Box::new(FakeDisk),
            Box::new(FakeIrq { raised: false }),
            Box::new(FixedRng),
        );
        ctrl.set_drive_select(0);
        for i in 0..MAX_DRIVES {
            ctrl.drives[i].enabled = true;
        }
        ctrl.registers.set_str_bit(crate::registers::STR_MOTOR_ON, true);
        ctrl.dma.sector_count = u16::MAX;
        ctrl
    }

    #[test]
    fn synth_track_fills_random_when_side_missing() {
        let mut ctrl = test_controller();
        ctrl.registers.side_signal = 1; // FakeDisk only reports 1 side
        synth_track(&mut ctrl);
        assert!(ctrl.track_scratch.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn synth_track_embeds_id_fields_for_present_side() {
        let mut ctrl = test_controller();
        ctrl.registers.side_signal = 0;
        synth_track(&mut ctrl);
        let first_id_pos = geometry::GAP1 as usize + geometry::GAP2 as usize;
        assert_eq!(ctrl.track_scratch[first_id_pos], geometry::SYNC_MARK);
        assert_eq!(ctrl.track_scratch[first_id_pos + 3], geometry::ID_ADDRESS_MARK);
        assert_eq!(ctrl.track_scratch[first_id_pos + 6], 1); // first sector number
    }

    #[test]
    fn read_address_streams_six_bytes_and_sets_sr_to_track() {
        let mut ctrl = test_controller();
        ctrl.drives[0].head_track = 12;
        ctrl.registers.next_sector_id_sr = 3;
        let mut mem = FakeRam(vec![0; 64]);
        ctrl.dma.set_address(0);
        let mut state = ReadAddressState::new();
        state.phase = Phase::Body(ReadAddressBody::Locating);
        let (_next, delay) = step_read_address(&mut ctrl, state, &mut mem);
        assert!(delay > 0);
        assert_eq!(ctrl.registers.sr, 12);
    }

    #[test]
    fn write_track_acknowledges_and_sets_rnf() {
        let mut ctrl = test_controller();
        let state = WriteTrackState { phase: Phase::Body(()) };
        let (next, _delay) = step_write_track(&mut ctrl, state);
        assert!(matches!(next, CommandState::MotorStop(_)));
        assert!(ctrl.registers.str_bit(STR_RNF));
    }
}
