//! command/type1.rs
//!
//! Type I commands: Restore, Seek, Step/StepIn/StepOut. All three share
//! the same post-step verify scan, factored into `run_verify` below.

use serde::{Deserialize, Serialize};

use crate::controller::Controller;
use crate::registers::STR_RNF;

use super::{CommandState, Phase, SEARCH_TIMEOUT_REVOLUTIONS};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum RestoreBody {
    SteppingOut,
    Settling,
    Verifying { arrived: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestoreState {
    pub phase: Phase<RestoreBody>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SeekBody {
    Stepping,
    Settling,
    Verifying { arrived: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeekState {
    pub phase: Phase<SeekBody>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StepVariant {
    Step,
    StepIn,
    StepOut,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum StepBody {
    Stepping,
    Settling,
    Verifying { arrived: bool },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepState {
    pub variant: StepVariant,
    pub phase: Phase<StepBody>,
}

/// Outcome of one tick of the post-step verify scan (§4.G "Verify
/// identical to Restore"): compares the synthesized ID field's track
/// (taken from the drive's physical head position - this core has no
/// independent on-media track byte) against TR, for up to
/// `SEARCH_TIMEOUT_REVOLUTIONS` revolutions.
enum VerifyOutcome {
    Wait(bool, u32),
    Success,
    Failure,
}

fn run_verify(ctrl: &mut Controller, arrived: bool) -> VerifyOutcome {
    if !arrived {
        if ctrl.registers.index_pulse_counter >= SEARCH_TIMEOUT_REVOLUTIONS {
            return VerifyOutcome::Failure;
        }
        let (delay, sector) = ctrl.next_id_field();
        ctrl.registers.next_sector_id_sr = sector;
        return VerifyOutcome::Wait(true, delay);
    }
    let track_field = ctrl.selected_drive_index().map(|i| ctrl.drives[i].head_track);
    if track_field == Some(ctrl.registers.tr) {
        VerifyOutcome::Success
    } else {
        VerifyOutcome::Wait(false, 0)
    }
}

fn begin_verify_or_complete(ctrl: &mut Controller) -> Option<(bool, u32)> {
    if ctrl.registers.cr & 0x04 != 0 {
        ctrl.registers.index_pulse_counter = 0;
        let settle = ctrl.ms_to_fdc_cycles(super::HEAD_SETTLE_MS);
        Some((false, settle))
    } else {
        None
    }
}

pub(crate) fn step_restore(ctrl: &mut Controller, mut state: RestoreState) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::Restore(state), delay);
            }
            // TR is reused as the step-out attempt counter, preserving
            // the source's behavior where a mid-prelude command replace
            // can clobber it (see Open Question in the design notes).
            ctrl.registers.tr = 0xFF;
            state.phase = Phase::Body(RestoreBody::SteppingOut);
            (CommandState::Restore(state), 0)
        }
        Phase::Body(RestoreBody::SteppingOut) => {
            let Some(i) = ctrl.selected_drive_index() else {
                return super::fail_rnf(ctrl);
            };
            if ctrl.drives[i].head_track == 0 {
                ctrl.registers.tr = 0;
                if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                    state.phase = Phase::Body(RestoreBody::Verifying { arrived });
                    return (CommandState::Restore(state), delay);
                }
                return super::complete(ctrl, true);
            }
            ctrl.drives[i].step(-1);
            ctrl.registers.tr = ctrl.registers.tr.wrapping_sub(1);
            if ctrl.registers.tr == 0 {
                return super::fail_rnf(ctrl);
            }
            let rate = crate::registers::step_rate_ms(ctrl.registers.cr & 0b11);
            let delay = ctrl.ms_to_fdc_cycles(rate);
            (CommandState::Restore(state), delay)
        }
        Phase::Body(RestoreBody::Settling) => {
            if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                state.phase = Phase::Body(RestoreBody::Verifying { arrived });
                return (CommandState::Restore(state), delay);
            }
            super::complete(ctrl, true)
        }
        Phase::Body(RestoreBody::Verifying { arrived }) => match run_verify(ctrl, arrived) {
            VerifyOutcome::Wait(arrived, delay) => {
                state.phase = Phase::Body(RestoreBody::Verifying { arrived });
                (CommandState::Restore(state), delay)
            }
            VerifyOutcome::Success => {
                ctrl.registers.set_str_bit(STR_RNF, false);
                super::complete(ctrl, true)
            }
            VerifyOutcome::Failure => super::fail_rnf(ctrl),
        },
    }
}

pub(crate) fn step_seek(ctrl: &mut Controller, mut state: SeekState) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::Seek(state), delay);
            }
            state.phase = Phase::Body(SeekBody::Stepping);
            (CommandState::Seek(state), 0)
        }
        Phase::Body(SeekBody::Stepping) => {
            let Some(i) = ctrl.selected_drive_index() else {
                return super::fail_rnf(ctrl);
            };
            if ctrl.registers.tr == ctrl.registers.dr {
                if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                    state.phase = Phase::Body(SeekBody::Verifying { arrived });
                    return (CommandState::Seek(state), delay);
                }
                return super::complete(ctrl, true);
            }
            let direction: i8 = if ctrl.registers.dr > ctrl.registers.tr { 1 } else { -1 };
            ctrl.registers.step_direction = direction;
            ctrl.registers.tr = (ctrl.registers.tr as i16 + direction as i16).clamp(0, 255) as u8;
            ctrl.drives[i].step(direction);
            if direction < 0 && ctrl.drives[i].head_track == 0 {
                ctrl.registers.tr = 0;
            }
            let rate = crate::registers::step_rate_ms(ctrl.registers.cr & 0b11);
            let delay = ctrl.ms_to_fdc_cycles(rate);
            (CommandState::Seek(state), delay)
        }
        Phase::Body(SeekBody::Settling) => {
            if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                state.phase = Phase::Body(SeekBody::Verifying { arrived });
                return (CommandState::Seek(state), delay);
            }
            super::complete(ctrl, true)
        }
        Phase::Body(SeekBody::Verifying { arrived }) => match run_verify(ctrl, arrived) {
            VerifyOutcome::Wait(arrived, delay) => {
                state.phase = Phase::Body(SeekBody::Verifying { arrived });
                (CommandState::Seek(state), delay)
            }
            VerifyOutcome::Success => {
                ctrl.registers.set_str_bit(STR_RNF, false);
                super::complete(ctrl, true)
            }
            VerifyOutcome::Failure => super::fail_rnf(ctrl),
        },
    }
}

pub(crate) fn step_step(ctrl: &mut Controller, mut state: StepState) -> (CommandState, u32) {
    match state.phase {
        Phase::Prelude => {
            if let Some(delay) = super::tick_prelude(ctrl) {
                return (CommandState::Step(state), delay);
            }
            state.phase = Phase::Body(StepBody::Stepping);
            (CommandState::Step(state), 0)
        }
        Phase::Body(StepBody::Stepping) => {
            let Some(i) = ctrl.selected_drive_index() else {
                return super::fail_rnf(ctrl);
            };
            let direction = match state.variant {
                StepVariant::Step => ctrl.registers.step_direction,
                StepVariant::StepIn => 1,
                StepVariant::StepOut => -1,
            };
            ctrl.registers.step_direction = direction;
            ctrl.drives[i].step(direction);
            let track_update = ctrl.registers.cr & 0b0001_0000 != 0;
            if track_update {
                ctrl.registers.tr = (ctrl.registers.tr as i16 + direction as i16).clamp(0, 255) as u8;
                if direction < 0 && ctrl.drives[i].head_track == 0 {
                    ctrl.registers.tr = 0;
                }
            }
            if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                state.phase = Phase::Body(StepBody::Verifying { arrived });
                return (CommandState::Step(state), delay);
            }
            super::complete(ctrl, true)
        }
        Phase::Body(StepBody::Settling) => {
            if let Some((arrived, delay)) = begin_verify_or_complete(ctrl) {
                state.phase = Phase::Body(StepBody::Verifying { arrived });
                return (CommandState::Step(state), delay);
            }
            super::complete(ctrl, true)
        }
        Phase::Body(StepBody::Verifying { arrived }) => match run_verify(ctrl, arrived) {
            VerifyOutcome::Wait(arrived, delay) => {
                state.phase = Phase::Body(StepBody::Verifying { arrived });
                (CommandState::Step(state), delay)
            }
            VerifyOutcome::Success => {
                ctrl.registers.set_str_bit(STR_RNF, false);
                super::complete(ctrl, true)
            }
            VerifyOutcome::Failure => super::fail_rnf(ctrl),
        },
    }
}
