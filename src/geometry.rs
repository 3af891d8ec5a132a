//! geometry.rs
//!
//! Component D: the synthesized IBM-layout track used by every command
//! that needs to know "what's under the head right now". No real MFM
//! decoding happens here - this is a fixed-layout clock, not a bitstream
//! parser (see spec.md Non-goals).

use crate::drive::Density;

pub const GAP1: u32 = 60;
pub const GAP2: u32 = 12;
pub const GAP3A: u32 = 22;
pub const GAP3B: u32 = 12;
pub const GAP4: u32 = 40;
pub const GAP5_FILL: u8 = 0x4E;

/// One raw on-media sector: ID field overhead + 512 payload bytes.
pub const RAW_SECTOR_BYTES: u32 = 614;

/// FDC cycles per MFM byte at DD (density factor 1); halves per
/// doubling of density.
pub const MFM_BYTE_CYCLES_DD: u32 = 256;

pub fn bytes_per_track(density: Density) -> u32 {
    6268 * density.factor()
}

/// `current_byte_offset = (fdc_cycles_since_index * density) / 256`.
pub fn current_byte_offset(fdc_cycles_since_index: u64, density: Density) -> u32 {
    ((fdc_cycles_since_index * density.factor() as u64) / MFM_BYTE_CYCLES_DD as u64) as u32
}

/// FDC cycles to transfer `bytes` MFM bytes at the given density.
pub fn bytes_to_cycles(bytes: u32, density: Density) -> u64 {
    (bytes as u64 * MFM_BYTE_CYCLES_DD as u64) / density.factor() as u64
}

/// Byte offset, from the start of the track, of sector `i` (0-indexed)'s
/// ID field.
fn sector_id_position(i: u32) -> u32 {
    GAP1 + GAP2 + i * RAW_SECTOR_BYTES
}

/// Result of searching forward from the current head position for the
/// next ID field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NextSectorId {
    /// Bytes (converted to FDC cycles by the caller) until the ID field.
    pub bytes_until: u32,
    /// 1-indexed sector number found there.
    pub sector: u8,
}

/// `next_sector_id_bytes()`: the smallest ID-field position strictly
/// after `current_byte_offset`, wrapping to sector 1 if the head is past
/// every sector on the track.
pub fn next_sector_id(current_byte_offset: u32, sectors_per_track: u8, density: Density) -> NextSectorId {
    for i in 0..sectors_per_track as u32 {
        let p = sector_id_position(i);
        if p > current_byte_offset {
            return NextSectorId {
                bytes_until: p - current_byte_offset,
                sector: (i + 1) as u8,
            };
        }
    }
    let wrap = bytes_per_track(density)
        .saturating_sub(current_byte_offset)
        + GAP1
        + GAP2;
    NextSectorId {
        bytes_until: wrap,
        sector: 1,
    }
}

/// Bytes from an ID field's start to the first data byte of its sector:
/// the rest of the 10-byte header (3 bytes, since the search above
/// already consumed sync+AM+track+side+sector+size+crc as "7 bytes" per
/// spec.md) plus GAP3a + GAP3b + SYNC + DAM = 41 bytes total, matching
/// spec.md §4.G step 2.
pub const ID_FIELD_TO_DATA_BYTES: u32 = 41;

/// Byte length of an ID field as streamed by Read Address: the three A1
/// sync bytes and the FE address mark are not transferred, leaving
/// track, side, sector, size, and a 2-byte CRC.
pub const READ_ADDRESS_STREAM_BYTES: u32 = 6;

// -- Read Track / Read Address field synthesis (§4.G) -------------------

pub const SYNC_MARK: u8 = 0xA1;
pub const ID_ADDRESS_MARK: u8 = 0xFE;
pub const DATA_ADDRESS_MARK: u8 = 0xFB;
/// Sector-size code for a fixed 512-byte sector, as carried in the ID
/// field's SIZE byte.
pub const SIZE_CODE_512: u8 = 2;

/// Sync bytes preceding the data address mark, derived from
/// `ID_FIELD_TO_DATA_BYTES` (41) minus GAP3a, GAP3b, and the 1-byte mark
/// itself: `41 - 22 - 12 - 1 = 6`.
pub const DATA_SYNC_BYTES: u32 = ID_FIELD_TO_DATA_BYTES - GAP3A - GAP3B - 1;

/// Full 10-byte ID field: three sync bytes, the address mark, track,
/// side, sector, size, and a 2-byte CRC.
pub const ID_FIELD_BYTES: u32 = 10;

/// CRC-16/CCITT (poly 0x1021, init 0xFFFF) as used by the WD1772 for both
/// ID-field and data-field check bytes.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}

/// Synthesizes a full 10-byte ID field (`A1 A1 A1 FE TRACK SIDE SECTOR
/// SIZE CRC_HI CRC_LO`) with the CRC computed over the first eight bytes.
pub fn synth_id_field(track: u8, side: u8, sector: u8) -> [u8; ID_FIELD_BYTES as usize] {
    let mut field = [SYNC_MARK, SYNC_MARK, SYNC_MARK, ID_ADDRESS_MARK, track, side, sector, SIZE_CODE_512, 0, 0];
    let crc = crc16_ccitt(&field[0..8]);
    field[8] = (crc >> 8) as u8;
    field[9] = (crc & 0xFF) as u8;
    field
}

/// Total on-media bytes one sector (ID field + its gaps + data field +
/// its gaps) occupies in a synthesized Read Track image.
pub const TRACK_SECTOR_BLOCK_BYTES: u32 =
    GAP2 + ID_FIELD_BYTES + GAP3A + GAP3B + DATA_SYNC_BYTES + 1 + 512 + 2 + GAP4;
