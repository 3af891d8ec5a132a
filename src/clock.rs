//! clock.rs
//!
//! Component A: converts between the FDC's 8 MHz reference clock and the
//! host CPU's clock, and tracks the single pending deferred callback the
//! whole controller is driven by (see Design Notes: "single callback
//! timer vs many timers"). The facade itself does not call `schedule_in`
//! - it only computes how many CPU cycles from now the next tick should
//! land; `Controller::tick` is responsible for actually arranging the
//! callback with the host.

use serde::{Deserialize, Serialize};

/// FDC reference clock, standard (DD/HD) drives.
pub const FDC_FREQ_HZ: u32 = 8_000_000;

/// Index pulse signal duration, pre-converted to FDC cycles at compile
/// time (3.71 ms @ 8 MHz). Scaled at runtime for the 16 MHz variant.
pub const INDEX_PULSE_LEN_FDC_CYCLES: u64 = 29_680; // 3.71ms * 8_000_000

/// A delay below which the fast-floppy option does not kick in, to avoid
/// collapsing already-tiny waits (e.g. CRC byte times) to zero.
const FAST_FLOPPY_THRESHOLD: u32 = 10;

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Host CPU clock, Hz.
    pub cpu_freq_hz: u32,
    /// Right-shift applied after the cpu/fdc ratio multiply, to model a
    /// CPU clocked at a power-of-two multiple of its nominal rate.
    pub cpu_freq_shift: u32,
    /// True for boards with a 16 MHz WD1772 variant (halves every FDC
    /// delay relative to the 8 MHz reference).
    pub fdc_hd_variant: bool,
    /// "Fast floppy" cheat: divides FDC delays over 10 cycles by 10.
    pub fast_floppy: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        ClockConfig {
            cpu_freq_hz: 8_000_000,
            cpu_freq_shift: 0,
            fdc_hd_variant: false,
            fast_floppy: false,
        }
    }
}

/// Owns the FDC's notion of "now" relative to CPU cycles, and the
/// overshoot carried from the previous callback fire.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Clock {
    config: ClockConfig,
    /// CPU cycles the previous callback fired late (positive) or early
    /// (negative) relative to its scheduled deadline. Folded into the
    /// next `arm()` so cadence stays constant across many re-arms.
    pending_cycles_over: i64,
    armed: bool,
}

impl Clock {
    pub fn new(config: ClockConfig) -> Self {
        Clock {
            config,
            pending_cycles_over: 0,
            armed: false,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// The FDC reference frequency in effect (doubled for the 16 MHz
    /// variant).
    pub fn fdc_freq_hz(&self) -> u32 {
        if self.config.fdc_hd_variant {
            FDC_FREQ_HZ * 2
        } else {
            FDC_FREQ_HZ
        }
    }

    /// `cpu = round(fdc * cpu_freq / fdc_freq) >> cpu_freq_shift`, halved
    /// again for the 16 MHz variant (folded into `fdc_freq_hz`).
    pub fn fdc_to_cpu_cycles(&self, fdc_cycles: u32) -> u32 {
        let fdc_freq = self.fdc_freq_hz() as u64;
        let cpu_freq = self.config.cpu_freq_hz as u64;
        let num = fdc_cycles as u64 * cpu_freq;
        let rounded = (num + fdc_freq / 2) / fdc_freq;
        ((rounded as u32) >> self.config.cpu_freq_shift).max(1)
    }

    /// Inverse of `fdc_to_cpu_cycles`.
    pub fn cpu_to_fdc_cycles(&self, cpu_cycles: u32) -> u32 {
        let fdc_freq = self.fdc_freq_hz() as u64;
        let cpu_freq = self.config.cpu_freq_hz as u64;
        let shifted = (cpu_cycles as u64) << self.config.cpu_freq_shift;
        let num = shifted * fdc_freq;
        let rounded = (num + cpu_freq / 2) / cpu_freq;
        (rounded as u32).max(1)
    }

    fn apply_fast_floppy(&self, fdc_delay: u32) -> u32 {
        if self.config.fast_floppy && fdc_delay > FAST_FLOPPY_THRESHOLD {
            (fdc_delay / 10).max(1)
        } else {
            fdc_delay
        }
    }

    /// Computes the CPU-cycle delay to hand to the host's `schedule_in`
    /// for a wait of `fdc_delay` FDC cycles, folding in fast-floppy
    /// scaling and the overshoot of the previous fire. Marks the clock
    /// armed.
    pub fn arm(&mut self, fdc_delay: u32) -> u32 {
        let scaled = self.apply_fast_floppy(fdc_delay);
        let mut cpu_cycles = self.fdc_to_cpu_cycles(scaled) as i64;
        cpu_cycles += self.pending_cycles_over;
        self.pending_cycles_over = 0;
        self.armed = true;
        cpu_cycles.max(1) as u32
    }

    /// Called when the host's deferred callback actually fires.
    /// `remaining_cpu_cycles` is however many cycles of "credit" the host
    /// reports were left on the clock at fire time (negative if the
    /// callback ran late). Stored so the next `arm()` compensates and
    /// cadence stays constant.
    pub fn fire(&mut self, remaining_cpu_cycles: i64) {
        self.armed = false;
        self.pending_cycles_over = -remaining_cpu_cycles;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.pending_cycles_over = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fdc_to_cpu_round_trip_is_close() {
        let clock = Clock::new(ClockConfig {
            cpu_freq_hz: 8_000_000,
            cpu_freq_shift: 0,
            fdc_hd_variant: false,
            fast_floppy: false,
        });
        // Same frequency: conversion should be the identity (within rounding).
        assert_eq!(clock.fdc_to_cpu_cycles(1000), 1000);
        assert_eq!(clock.cpu_to_fdc_cycles(1000), 1000);
    }

    #[test]
    fn sixteen_mhz_variant_halves_cpu_cycles() {
        let clock = Clock::new(ClockConfig {
            cpu_freq_hz: 8_000_000,
            cpu_freq_shift: 0,
            fdc_hd_variant: true,
            fast_floppy: false,
        });
        // Same FDC-cycle delay takes half as many CPU cycles at 16 MHz.
        assert_eq!(clock.fdc_to_cpu_cycles(1000), 500);
    }

    #[test]
    fn fast_floppy_divides_long_delays_by_ten() {
        let clock = Clock::new(ClockConfig {
            fast_floppy: true,
            ..ClockConfig::default()
        });
        assert_eq!(clock.apply_fast_floppy(1000), 100);
        // Short delays are left alone.
        assert_eq!(clock.apply_fast_floppy(5), 5);
    }

    #[test]
    fn overshoot_is_folded_into_next_arm() {
        let mut clock = Clock::new(ClockConfig::default());
        let first = clock.arm(1000);
        assert_eq!(first, 1000);
        // Callback fired 50 cycles late (remaining = -50).
        clock.fire(-50);
        let second = clock.arm(1000);
        assert_eq!(second, 1050);
    }

    #[test]
    fn arm_never_returns_zero() {
        let mut clock = Clock::new(ClockConfig::default());
        clock.fire(1000);
        // Huge negative overshoot must still clamp to at least 1 cycle.
        let next = clock.arm(1);
        assert!(next >= 1);
    }
}
