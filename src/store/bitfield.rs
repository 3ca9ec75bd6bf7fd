use bytes::Bytes;

/// Per-piece completion vector, one bit per piece, most significant bit
/// first within each byte. Spare bits in the final byte stay zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bits: Vec<u8>,
    pieces: usize,
}

impl Bitfield {
    pub fn new(pieces: usize) -> Self {
        Bitfield {
            bits: vec![0; pieces.div_ceil(8)],
            pieces,
        }
    }

    /// Builds a bitfield of `pieces` bits from wire bytes. Surplus
    /// input is truncated, short input zero-padded, and spare bits in
    /// the final byte masked off.
    pub fn from_bytes(raw: &[u8], pieces: usize) -> Self {
        let mut field = Bitfield::new(pieces);
        let len = field.bits.len().min(raw.len());
        field.bits[..len].copy_from_slice(&raw[..len]);
        let spare = field.bits.len() * 8 - pieces;
        if spare > 0 {
            if let Some(last) = field.bits.last_mut() {
                *last &= 0xffu8 << spare;
            }
        }
        field
    }

    pub fn set(&mut self, piece: usize) {
        if piece < self.pieces {
            self.bits[piece / 8] |= 0x80 >> (piece % 8);
        }
    }

    pub fn has(&self, piece: usize) -> bool {
        piece < self.pieces && self.bits[piece / 8] & (0x80 >> (piece % 8)) != 0
    }

    /// Number of pieces the bitfield covers.
    pub fn len(&self) -> usize {
        self.pieces
    }

    pub fn is_empty(&self) -> bool {
        self.pieces == 0
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.count() == self.pieces
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_query() {
        let mut field = Bitfield::new(10);
        assert!(!field.has(0));
        field.set(0);
        field.set(9);
        assert!(field.has(0));
        assert!(field.has(9));
        assert!(!field.has(5));
        assert!(!field.has(10));
        assert_eq!(field.count(), 2);
        assert!(!field.is_complete());
        assert_eq!(field.to_bytes().as_ref(), &[0b1000_0000, 0b0100_0000]);
    }

    #[test]
    fn from_bytes_masks_spare_bits() {
        let field = Bitfield::from_bytes(&[0xff, 0xff], 10);
        assert_eq!(field.count(), 10);
        assert!(field.is_complete());
        assert_eq!(field.to_bytes().as_ref(), &[0xff, 0b1100_0000]);
    }

    #[test]
    fn from_bytes_pads_short_input() {
        let field = Bitfield::from_bytes(&[0x80], 16);
        assert!(field.has(0));
        assert!(!field.has(8));
        assert_eq!(field.count(), 1);
    }
}
