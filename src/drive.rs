//! drive.rs
//!
//! Components B and C: per-drive mechanical state, and the index-pulse
//! engine that derives angular position from the wall-clock FDC cycle
//! counter. There is no real rotating media here - `index_pulse_ref` is
//! just the FDC-cycle timestamp of the last pulse the engine synthesized.

use crate::clock::INDEX_PULSE_LEN_FDC_CYCLES;
use crate::collab::RandomSource;
use serde::{Deserialize, Serialize};

pub const MAX_DRIVES: usize = 2;
pub const MAX_HEAD_TRACK: u8 = 90;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Density {
    Dd = 1,
    Hd = 2,
    Ed = 4,
}

impl Density {
    pub fn factor(self) -> u32 {
        self as u32
    }
}

/// Static per-drive configuration, supplied by the host at construction.
#[derive(Clone, Copy, Debug)]
pub struct DriveConfig {
    pub present: bool,
    pub rpm_milli: u32,
    pub density: Density,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            present: true,
            rpm_milli: 300_000, // 300.000 RPM
            density: Density::Dd,
        }
    }
}

impl DriveConfig {
    /// Fallible constructor for host code building a `DriveConfig` from
    /// user-supplied or machine-config values. `rpm_milli == 0` would make
    /// `cycles_per_rev` divide by zero, so it is rejected here rather than
    /// silently clamped - the same spirit as the teacher's image-loading
    /// helpers (`devices/floppy_drive.rs`) returning `anyhow::Error` for a
    /// malformed input instead of limping on with bad state.
    pub fn try_new(present: bool, rpm_milli: u32, density: Density) -> anyhow::Result<Self> {
        if rpm_milli == 0 {
            return Err(anyhow::anyhow!("drive rpm must be nonzero"));
        }
        Ok(DriveConfig { present, rpm_milli, density })
    }
}

/// Mutable per-drive state (§3: "Per-drive state (array of two)").
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DriveState {
    pub enabled: bool,
    pub disk_inserted: bool,
    pub rpm_milli: u32,
    pub density: Density,
    pub head_track: u8,
    /// FDC-cycle timestamp of the last index pulse. `0` means unknown -
    /// the engine has not yet established a phase for this revolution.
    pub index_pulse_ref: u64,
}

impl DriveState {
    pub fn new(config: DriveConfig) -> Self {
        DriveState {
            enabled: false,
            disk_inserted: config.present,
            rpm_milli: config.rpm_milli,
            density: config.density,
            head_track: 0,
            index_pulse_ref: 0,
        }
    }

    /// Drive changes (deselect, disk swap) discard phase tracking so the
    /// next motor-on re-derives it fresh.
    pub fn forget_index_phase(&mut self) {
        self.index_pulse_ref = 0;
    }

    pub fn step(&mut self, direction: i8) {
        let next = self.head_track as i16 + direction as i16;
        self.head_track = next.clamp(0, MAX_HEAD_TRACK as i16) as u8;
    }
}

/// FDC cycles for one full revolution at this drive's configured RPM.
/// `cycles_per_rev = fdc_freq * 60_000 / rpm_milli`.
pub fn cycles_per_rev(fdc_freq_hz: u32, drive: &DriveState) -> u64 {
    (fdc_freq_hz as u64 * 60_000) / drive.rpm_milli.max(1) as u64
}

/// Establishes the index phase for a drive whose motor has just started
/// with no known reference: uniformly random offset within one
/// revolution, guaranteed non-zero so `index_pulse_ref == 0` keeps its
/// "unknown" meaning.
pub fn init_index_phase(drive: &mut DriveState, now: u64, fdc_freq_hz: u32, rng: &mut dyn RandomSource) {
    let period = cycles_per_rev(fdc_freq_hz, drive);
    let offset = if period > 1 {
        (rng.next_u32() as u64) % period
    } else {
        0
    };
    let ref_ts = now.wrapping_sub(offset);
    drive.index_pulse_ref = ref_ts.max(1);
}

/// Advances `index_pulse_ref` by whole elapsed revolutions and reports
/// whether at least one pulse fired. Call at least every 500 FDC cycles
/// while the drive's motor is on (§4.B/C).
pub fn tick_index(drive: &mut DriveState, now: u64, fdc_freq_hz: u32) -> u32 {
    if drive.index_pulse_ref == 0 {
        return 0;
    }
    let period = cycles_per_rev(fdc_freq_hz, drive);
    if period == 0 {
        return 0;
    }
    let mut pulses = 0u32;
    while now.wrapping_sub(drive.index_pulse_ref) >= period {
        drive.index_pulse_ref = drive.index_pulse_ref.wrapping_add(period);
        pulses += 1;
    }
    pulses
}

/// Instantaneous index signal: high for the first
/// `INDEX_PULSE_LEN_FDC_CYCLES` (scaled for the 16 MHz variant) of each
/// revolution.
pub fn index_signal(drive: &DriveState, now: u64, fdc_freq_hz: u32) -> bool {
    if !drive.enabled || !drive.disk_inserted || drive.index_pulse_ref == 0 {
        return false;
    }
    let pulse_len = scaled_pulse_len(fdc_freq_hz);
    now.wrapping_sub(drive.index_pulse_ref) < pulse_len
}

fn scaled_pulse_len(fdc_freq_hz: u32) -> u64 {
    // INDEX_PULSE_LEN_FDC_CYCLES is pre-converted at the 8 MHz reference;
    // scale proportionally for the 16 MHz variant.
    INDEX_PULSE_LEN_FDC_CYCLES * fdc_freq_hz as u64 / crate::clock::FDC_FREQ_HZ as u64
}

/// FDC cycles until the next index pulse. Never returns 0 or 1 - a wait
/// loop driven by this value (e.g. "force interrupt on index") must
/// always make forward progress, so an exhausted gap is reported as a
/// full revolution instead (see spec Open Question #2).
pub fn next_index_delay(drive: &DriveState, now: u64, fdc_freq_hz: u32) -> u64 {
    let period = cycles_per_rev(fdc_freq_hz, drive);
    if drive.index_pulse_ref == 0 {
        return period;
    }
    let elapsed = now.wrapping_sub(drive.index_pulse_ref) % period.max(1);
    let remaining = period.saturating_sub(elapsed);
    if remaining <= 1 {
        period
    } else {
        remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRng(u32);
    impl RandomSource for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }
    }

    fn drive() -> DriveState {
        let mut d = DriveState::new(DriveConfig::default());
        d.enabled = true;
        d.disk_inserted = true;
        d
    }

    #[test]
    fn try_new_rejects_zero_rpm() {
        assert!(DriveConfig::try_new(true, 0, Density::Dd).is_err());
        assert!(DriveConfig::try_new(true, 300_000, Density::Dd).is_ok());
    }

    #[test]
    fn init_index_phase_is_never_zero() {
        let mut d = drive();
        let mut rng = FixedRng(0);
        init_index_phase(&mut d, 100, 8_000_000, &mut rng);
        assert!(d.index_pulse_ref >= 1);
    }

    #[test]
    fn tick_index_counts_whole_revolutions() {
        let mut d = drive();
        let period = cycles_per_rev(8_000_000, &d);
        d.index_pulse_ref = 0;
        let mut rng = FixedRng(0);
        init_index_phase(&mut d, 0, 8_000_000, &mut rng);
        let start_ref = d.index_pulse_ref;
        let pulses = tick_index(&mut d, start_ref + period * 3, 8_000_000);
        assert_eq!(pulses, 3);
    }

    #[test]
    fn motor_off_suspends_index_ticks() {
        // Motor-off is modeled by the caller simply not calling tick_index;
        // verify the no-reference case is a safe no-op so callers that do
        // tick an unselected/off drive observe nothing.
        let mut d = drive();
        d.index_pulse_ref = 0;
        assert_eq!(tick_index(&mut d, 1_000_000, 8_000_000), 0);
    }

    #[test]
    fn index_signal_goes_low_after_pulse_length() {
        let mut d = drive();
        d.index_pulse_ref = 1000;
        assert!(index_signal(&d, 1000, 8_000_000));
        assert!(index_signal(&d, 1000 + INDEX_PULSE_LEN_FDC_CYCLES - 1, 8_000_000));
        assert!(!index_signal(&d, 1000 + INDEX_PULSE_LEN_FDC_CYCLES, 8_000_000));
    }

    #[test]
    fn next_index_delay_never_degenerate() {
        let mut d = drive();
        let period = cycles_per_rev(8_000_000, &d);
        d.index_pulse_ref = 1000;
        // Ask right at the boundary where remaining would be 0 or 1.
        let now = 1000 + period - 1;
        let delay = next_index_delay(&d, now, 8_000_000);
        assert_eq!(delay, period);
    }
}
