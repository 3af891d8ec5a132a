//! command/type4.rs
//!
//! Type IV - Force Interrupt. The odd one out: it runs synchronously from
//! the dispatcher rather than owning a `CommandState` variant, because it
//! never waits on anything and never shares a sub-state with any other
//! command (§4.G "Force Interrupt"). It still always ends by entering the
//! shared `MotorStop` state, the same as every other command's completion.

use crate::controller::Controller;
use crate::registers::{CommandType, IRQ_COND_IMMEDIATE, STR_BUSY};

/// Runs a Type IV command register write. Returns the FDC-cycle delay to
/// arm the timer for (the motor-off wait this always enters).
///
/// If a command was running, this only clears BUSY and leaves the rest of
/// STR untouched - it does not reach into the running command's
/// sub-state. If the controller was idle, it instead forces the Type I
/// "live signals" status view, matching real WD1772 behavior where an
/// idle Force Interrupt still switches STR's interpretation.
pub(crate) fn run(ctrl: &mut Controller, cr: u8) -> u32 {
    let was_running = ctrl.registers.str_bit(STR_BUSY);
    if was_running {
        ctrl.registers.set_str_bit(STR_BUSY, false);
    } else {
        ctrl.registers.status_is_type_i = true;
    }

    ctrl.registers.cr = cr;
    ctrl.registers.command_type = CommandType::TypeIV;
    ctrl.registers.interrupt_cond = cr & 0x0F;
    if ctrl.registers.interrupt_cond & IRQ_COND_IMMEDIATE != 0 {
        ctrl.irq.raise_irq();
    } else {
        ctrl.irq.clear_irq();
    }

    ctrl.prelude_waiting = false;
    let (state, delay) = super::motor::enter(ctrl);
    ctrl.state = state;
    delay
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockConfig;
    use crate::collab::{DiskImage, InterruptLine, RandomSource};
    use crate::command::CommandState;
    use crate::drive::DriveConfig;

    struct FakeDisk;
    impl DiskImage for FakeDisk {
        fn read_sector(&mut self, _drive: usize, _sector: u8, _track: u8, _side: u8, _buf: &mut [u8]) -> usize {
            0
        }
        fn write_sector(&mut self, _drive: usize, _sector: u8, _track: u8, _side: u8, _buf: &[u8]) -> usize {
            0
        }
        fn disk_details(&self, _drive: usize) -> Option<(u8, u8)> {
            None
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

    struct ZeroRng;
    impl RandomSource for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }
    }

    fn test_controller() -> Controller {
        Controller::new(
            ClockConfig::default(),
            [DriveConfig::default(), DriveConfig::default()],
            false,
            Box::new(FakeDisk),
            Box::new(FakeIrq { raised: false }),
            Box::new(ZeroRng),
        )
    }

    #[test]
    fn immediate_bit_latches_irq_until_cleared() {
        let mut ctrl = test_controller();
        ctrl.registers.set_str_bit(STR_BUSY, true);
        run(&mut ctrl, 0xD8); // Type IV, condition 0x8 = immediate
        assert!(!ctrl.registers.str_bit(STR_BUSY));
        assert_eq!(ctrl.registers.interrupt_cond, 0x8);

        run(&mut ctrl, 0xD0); // condition 0 clears it
        assert_eq!(ctrl.registers.interrupt_cond, 0x0);
    }

    #[test]
    fn idle_force_interrupt_switches_to_type_i_status_view() {
        let mut ctrl = test_controller();
        ctrl.registers.status_is_type_i = false;
        run(&mut ctrl, 0xD0);
        assert!(ctrl.registers.status_is_type_i);
    }

    #[test]
    fn always_enters_motor_stop() {
        let mut ctrl = test_controller();
        run(&mut ctrl, 0xD0);
        assert!(matches!(ctrl.state, CommandState::MotorStop(_)));
    }
}
