//! Packing and unpacking of global tile ids.
//!
//! Tiled stores the orientation of a placed tile in the three upper bits of
//! its 32 bit id. The remaining 29 bits are the actual (global or local) id.

use core::num::NonZeroU32;

use crate::{Error, Result};

pub const GID_HORIZONTAL_FLIP_FLAG: u32 = 0x80000000;
pub const GID_VERTICAL_FLIP_FLAG: u32   = 0x40000000;
pub const GID_DIAGONAL_FLIP_FLAG: u32   = 0x20000000;

pub const GID_FLIP_MASK: u32 = GID_HORIZONTAL_FLIP_FLAG | GID_VERTICAL_FLIP_FLAG | GID_DIAGONAL_FLIP_FLAG;

/// Orientation flags of a single tile.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Default, Hash)]
pub struct Flip {
    pub horizontal: bool,
    pub vertical: bool,
    pub diagonal: bool,
}

impl Flip {
    pub const NONE: Flip = Flip{ horizontal: false, vertical: false, diagonal: false };
}

/// Split a raw id into the unmasked id and its flip flags.
pub const fn decode(raw: u32) -> (u32, Flip) {
    (
        raw & !GID_FLIP_MASK,
        Flip {
            horizontal: raw & GID_HORIZONTAL_FLIP_FLAG != 0,
            vertical: raw & GID_VERTICAL_FLIP_FLAG != 0,
            diagonal: raw & GID_DIAGONAL_FLIP_FLAG != 0,
        },
    )
}

/// Inverse of [decode]. Bits of `id` overlapping the flag bits are dropped.
pub const fn encode(id: u32, flip: Flip) -> u32 {
    let mut raw = id & !GID_FLIP_MASK;
    if flip.horizontal { raw |= GID_HORIZONTAL_FLIP_FLAG; }
    if flip.vertical { raw |= GID_VERTICAL_FLIP_FLAG; }
    if flip.diagonal { raw |= GID_DIAGONAL_FLIP_FLAG; }
    raw
}

/// Global Tile ID
/// A GID acts as an index into any tileset referenced in the map.
/// An id of zero means "no tile", hence it is not representable.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
#[repr(transparent)]
pub struct GID(NonZeroU32);

impl GID {
    /// Wrap a raw id, including flip flags. Returns None for empty cells.
    pub fn from_raw(raw: u32) -> Option<Self> {
        if decode(raw).0 == 0 {
            return None;
        }
        NonZeroU32::new(raw).map(GID)
    }

    pub const fn as_raw(&self) -> u32 {
        self.0.get()
    }

    /// Turn this GID into an u32 for indexing.
    /// This function masks the bits used for tile flipping,
    /// to get the flip information use [GID::flip].
    pub const fn to_id(&self) -> u32 {
        decode(self.as_raw()).0
    }

    pub const fn flip(&self) -> Flip {
        decode(self.as_raw()).1
    }

    /// Return whether this tile is flipped horizontally or not
    pub fn flip_horizontal(&self) -> bool {
        self.flip().horizontal
    }

    /// Return whether this tile is flipped vertically or not
    pub fn flip_vertical(&self) -> bool {
        self.flip().vertical
    }

    /// Return whether this tile is flipped diagonally or not
    pub fn flip_diagonal(&self) -> bool {
        self.flip().diagonal
    }
}

impl std::str::FromStr for GID {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw: u32 = s.trim().parse()?;
        GID::from_raw(raw).ok_or_else(|| Error::ParseError(format!("'{}' is not a valid tile id", s).into()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gid_size_optimization() {
        use std::mem::size_of;
        assert_eq!(size_of::<Option<GID>>(), size_of::<u32>());
    }

    #[test]
    fn test_decode_flags() {
        let (id, flip) = decode(0x80000000 | 0x20000000 | 42);
        assert_eq!(id, 42);
        assert!(flip.horizontal);
        assert!(!flip.vertical);
        assert!(flip.diagonal);

        assert_eq!(decode(7), (7, Flip::NONE));
    }

    #[test]
    fn test_round_trip_samples() {
        let samples = [
            0u32, 1, 2, 0x1FFFFFFF, 0x20000000, 0x40000000, 0x80000000,
            0xFFFFFFFF, 0xA0000005, 0x60001234, 0xDEADBEEF, 123456789,
        ];
        for raw in samples {
            let (id, flip) = decode(raw);
            assert_eq!(encode(id, flip), raw, "round trip of {:#x}", raw);
        }
    }

    #[test]
    fn test_encode_drops_overlapping_bits() {
        let flip = Flip{ vertical: true, ..Flip::NONE };
        assert_eq!(encode(0xE0000003, flip), 0x40000003);
    }

    #[test]
    fn test_gid_parsing() {
        let gid: GID = "2147483653".parse().unwrap();
        assert_eq!(gid.to_id(), 5);
        assert!(gid.flip_horizontal());
        assert!("0".parse::<GID>().is_err());
        assert!(GID::from_raw(GID_FLIP_MASK).is_none());
    }
}
