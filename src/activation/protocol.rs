//! Binary layout of the make-key event record.
//!
//! The record is undocumented. Every offset the window server reads is named
//! here so the layout can be audited and tested on its own.

/// Total record length in bytes
pub const RECORD_LEN: usize = 0xF8;
/// Offset of the 4-byte size marker
pub const SIZE_MARKER_OFFSET: usize = 0x04;
/// Offset of the phase tag that differs between the two messages
pub const PHASE_OFFSET: usize = 0x08;
/// Offset of the sentinel-filled region
pub const SENTINEL_OFFSET: usize = 0x20;
pub const SENTINEL_LEN: usize = 0x10;
pub const SENTINEL_BYTE: u8 = 0xFF;
/// Offset of the mode marker
pub const MODE_OFFSET: usize = 0x3A;
pub const MODE_MAKE_KEY: u8 = 0x10;
/// Offset of the little-endian window id
pub const WINDOW_ID_OFFSET: usize = 0x3C;

/// Which half of the two-message sequence a record is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Begin = 0x01,
    End = 0x02,
}

/// Make one window key within its application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MakeKeyCommand {
    pub window_id: u32,
}

impl MakeKeyCommand {
    pub fn new(window_id: u32) -> Self {
        Self { window_id }
    }

    pub fn to_bytes(&self, phase: Phase) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        write_at(&mut record, SIZE_MARKER_OFFSET, &(RECORD_LEN as u32).to_le_bytes());
        record[PHASE_OFFSET] = phase as u8;
        record[SENTINEL_OFFSET..SENTINEL_OFFSET + SENTINEL_LEN].fill(SENTINEL_BYTE);
        record[MODE_OFFSET] = MODE_MAKE_KEY;
        write_at(&mut record, WINDOW_ID_OFFSET, &self.window_id.to_le_bytes());
        record
    }

    /// Both records, in the order they must be sent
    pub fn sequence(&self) -> [[u8; RECORD_LEN]; 2] {
        [self.to_bytes(Phase::Begin), self.to_bytes(Phase::End)]
    }
}

fn write_at(record: &mut [u8; RECORD_LEN], offset: usize, bytes: &[u8]) {
    record[offset..offset + bytes.len()].copy_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout_matches_named_offsets() {
        let record = MakeKeyCommand::new(0x0A0B_0C0D).to_bytes(Phase::Begin);

        assert_eq!(record.len(), 248);
        assert_eq!(&record[0x3C..0x40], &[0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(&record[0x04..0x08], &248u32.to_le_bytes());
        assert_eq!(record[0x08], 0x01);
        assert_eq!(record[0x3A], 0x10);
        assert!(record[0x20..0x30].iter().all(|byte| *byte == 0xFF));
        assert_eq!(record[0x30], 0);
    }

    #[test]
    fn sequence_differs_only_in_phase_tag() {
        let [begin, end] = MakeKeyCommand::new(77).sequence();
        let differing: Vec<usize> = (0..RECORD_LEN).filter(|i| begin[*i] != end[*i]).collect();

        assert_eq!(differing, vec![PHASE_OFFSET]);
        assert_eq!(end[PHASE_OFFSET], Phase::End as u8);
    }
}
