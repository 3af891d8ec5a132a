//! command/motor.rs
//!
//! The internal MotorStop command (§4.G "MotorStop (internal)"): every
//! command, successful or not, ends here rather than dropping straight
//! to idle, so the motor keeps spinning for a few seconds after the
//! last access the way the real drive's motor-off relay does.

use serde::{Deserialize, Serialize};

use crate::controller::Controller;
use crate::registers::STR_MOTOR_ON;

use super::CommandState;

/// Index pulses to wait before declaring the motor off (~1.8s at 300 RPM).
pub const MOTOR_STOP_REVOLUTIONS: u32 = 9;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct MotorStopState;

/// Enters MotorStop from any command's completion path, or directly from
/// a Type IV force-interrupt. Reuses `index_pulse_counter` as the
/// wait's revolution counter, the same way the shared prelude does for
/// spin-up.
pub(crate) fn enter(ctrl: &mut Controller) -> (CommandState, u32) {
    ctrl.registers.index_pulse_counter = 0;
    (CommandState::MotorStop(MotorStopState), ctrl.next_index_delay())
}

pub(crate) fn step(ctrl: &mut Controller, state: MotorStopState) -> (CommandState, u32) {
    if ctrl.registers.index_pulse_counter < MOTOR_STOP_REVOLUTIONS {
        return (CommandState::MotorStop(state), ctrl.next_index_delay());
    }
    log::trace!("motor_stop: {} index pulses elapsed, turning motor off", MOTOR_STOP_REVOLUTIONS);
    ctrl.registers.set_str_bit(STR_MOTOR_ON, false);
    if let Some(i) = ctrl.selected_drive_index() {
        ctrl.drives[i].enabled = false;
        ctrl.drives[i].forget_index_phase();
    }
    (CommandState::None, crate::dispatcher::IDLE_POLL_CYCLES)
}
