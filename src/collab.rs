//! collab.rs
//!
//! Capability traits for the collaborators this core talks to but does
//! not implement. These enter the controller as injected trait objects,
//! never as process-wide singletons, so that host and test code can
//! substitute fakes without touching the state machine.

/// The disk image backend. `read_sector`/`write_sector` operate on
/// ordered, fixed 512-byte sectors; this core never decodes raw MFM.
pub trait DiskImage {
    /// Reads one sector into `buf`, returning the number of bytes copied
    /// (0 if the sector does not exist on the image).
    fn read_sector(&mut self, drive: usize, sector: u8, track: u8, side: u8, buf: &mut [u8]) -> usize;

    /// Writes one sector from `buf`, returning the number of bytes
    /// written (0 if the sector does not exist on the image).
    fn write_sector(&mut self, drive: usize, sector: u8, track: u8, side: u8, buf: &[u8]) -> usize;

    /// Static geometry of the inserted image: (sectors_per_track, sides).
    /// `None` if no image is inserted in `drive`.
    fn disk_details(&self, drive: usize) -> Option<(u8, u8)>;

    /// True if the image (or the physical drive) refuses writes.
    fn is_write_protected(&self, drive: usize) -> bool;
}

/// The host memory bus, reached only for DMA transfers.
pub trait MemoryBus {
    fn ram_read(&mut self, addr: u32) -> u8;
    fn ram_write(&mut self, addr: u32, byte: u8);

    /// Bulk copy into host RAM starting at `dst`. The host is the bounds
    /// authority: this core never validates `dst` against machine RAM
    /// size beyond the 24-bit/4 MB address masking already applied to
    /// the DMA address register (see `dma::Dma`).
    fn safe_copy(&mut self, dst: u32, src: &[u8]) {
        for (i, byte) in src.iter().enumerate() {
            self.ram_write(dst.wrapping_add(i as u32), *byte);
        }
    }
}

/// The interrupt controller.
pub trait InterruptLine {
    fn raise_irq(&mut self);
    fn clear_irq(&mut self);
}

/// An injectable source of randomness, used for the initial index-pulse
/// phase and the "missing side" track fill. Kept as a narrow trait (a
/// single `u32` generator) rather than pulling in a full RNG-trait
/// dependency, since that's all the two call sites in `drive` and
/// `command::type3` need.
pub trait RandomSource {
    fn next_u32(&mut self) -> u32;
}

/// The default `RandomSource`, backed by `rand`'s thread-local generator.
/// Hosts that need determinism (including this crate's own tests) should
/// supply their own seeded implementation instead.
#[derive(Default)]
pub struct ThreadRng;

impl RandomSource for ThreadRng {
    fn next_u32(&mut self) -> u32 {
        rand::Rng::gen(&mut rand::thread_rng())
    }
}
