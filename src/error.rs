//! error.rs
//!
//! Error kinds surfaced by the register-file boundary. Guest-triggered
//! protocol errors (RNF, WPRT, DMA under/overrun) are never exceptions -
//! they are mapped to STR/DMA status bits (see `registers` and `dma`) and
//! observed by the CPU through ordinary reads. The only `Result`-returning
//! surface of this crate is the bus byte/word access boundary and
//! fallible construction.

use std::fmt;

/// A byte access landed on a register that is word-only on real hardware.
/// The host is expected to translate this into its own 68k bus-error
/// facility; this crate performs no state change when it occurs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BusFault {
    ByteAccessToWordRegister(u32),
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusFault::ByteAccessToWordRegister(addr) => {
                write!(f, "byte access to word-only register at {:#08X}", addr)
            }
        }
    }
}

impl std::error::Error for BusFault {}

pub type BusResult<T> = Result<T, BusFault>;
