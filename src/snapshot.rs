//! snapshot.rs
//!
//! Flat serialization of every piece of controller state that isn't an
//! injected collaborator (§6 "Persistence"). The disk image, memory bus,
//! interrupt line, and RNG are owned by the host and are expected to be
//! re-supplied to `Controller::new` before `Snapshot::restore_into` runs;
//! this mirrors the teacher's broad `serde`/`serde_derive` use across its
//! device state (e.g. `machine_types.rs`'s manual `Deserialize` impl for
//! `FloppyDriveType`) rather than inventing a bespoke save format.

use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::command::CommandState;
use crate::controller::Controller;
use crate::dma::Dma;
use crate::drive::{DriveState, MAX_DRIVES};
use crate::registers::Registers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub registers: Registers,
    pub dma: Dma,
    pub drives: [DriveState; MAX_DRIVES],
    pub clock: Clock,
    pub state: CommandState,
    pub prelude_waiting: bool,
    pub now_fdc: u64,
    pub last_armed_fdc: u32,
    /// `[u8; 512]` on `Controller` itself; stored here as a `Vec` because
    /// serde's blanket array impls stop at length 32 and this crate pulls
    /// in no big-array helper crate for the sake of one snapshot field.
    pub sector_scratch: Vec<u8>,
    pub track_scratch: Vec<u8>,
}

impl Snapshot {
    /// Captures every field of `ctrl` the host is responsible for
    /// persisting. Collaborators (`disk`, `irq`, `rng`) are not part of
    /// the snapshot - they are the host's own state, re-supplied at
    /// `Controller::new` time.
    pub fn capture(ctrl: &Controller) -> Self {
        Snapshot {
            registers: ctrl.registers.clone(),
            dma: ctrl.dma.clone(),
            drives: ctrl.drives,
            clock: ctrl.clock,
            state: ctrl.state.clone(),
            prelude_waiting: ctrl.prelude_waiting,
            now_fdc: ctrl.now_fdc,
            last_armed_fdc: ctrl.last_armed_fdc,
            sector_scratch: ctrl.sector_scratch.to_vec(),
            track_scratch: ctrl.track_scratch.clone(),
        }
    }

    /// Restores `ctrl` to this snapshot's state. If a command was running
    /// when the snapshot was taken, re-arms the clock for the delay that
    /// was pending and returns the CPU-cycle count the host should
    /// schedule its deferred callback for; returns `None` if the
    /// controller was idle (§6: "restoring must re-establish timer
    /// arming if `command != None`").
    pub fn restore_into(self, ctrl: &mut Controller) -> Option<u32> {
        ctrl.registers = self.registers;
        ctrl.dma = self.dma;
        ctrl.drives = self.drives;
        ctrl.clock = self.clock;
        ctrl.state = self.state;
        ctrl.prelude_waiting = self.prelude_waiting;
        ctrl.now_fdc = self.now_fdc;
        ctrl.last_armed_fdc = self.last_armed_fdc;
        let n = self.sector_scratch.len().min(ctrl.sector_scratch.len());
        ctrl.sector_scratch[..n].copy_from_slice(&self.sector_scratch[..n]);
        ctrl.track_scratch = self.track_scratch;

        if matches!(ctrl.state, CommandState::None) {
            None
        } else {
            Some(ctrl.clock.arm(ctrl.last_armed_fdc))
        }
    }
}
