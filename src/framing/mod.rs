//! ARINC 717/573 frame synchronization.
//!
//! A frame is four subframes, each one second of data at the recorder's word
//! rate. Subframes open with one of four 12-bit sync words that rotate in a
//! fixed per-mode order, which is what makes byte alignment and rate
//! detection possible on an otherwise opaque stream.

pub mod bytes;
pub mod synchronizer;

pub use bytes::ChunkBuffer;
pub use synchronizer::{FrameLocs, Frames, SyncOpts, Synchronizer, DEFAULT_OUTPUT_BUFFER_LEN};

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Recorder data rate in words per second.
pub type Wps = usize;

/// Word rates a recorder may run at, slowest first.
pub const WPS_CANDIDATES: [Wps; 6] = [64, 128, 256, 512, 1024, 2048];

/// Subframes in a frame, one second of data each.
pub const SUBFRAMES_PER_FRAME: usize = 4;

/// Whole frame length in bytes at the given word rate.
#[must_use]
pub const fn frame_len(wps: Wps) -> usize {
    wps * SUBFRAMES_PER_FRAME * 2
}

/// Subframe length in bytes at the given word rate.
#[must_use]
pub const fn subframe_len(wps: Wps) -> usize {
    wps * 2
}

/// Recording protocol variants, distinguished by their sync words.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Arinc573,
    Arinc717,
    Custom1,
}

impl Mode {
    /// All supported modes, in default search order.
    pub const ALL: [Mode; 3] = [Mode::Arinc573, Mode::Arinc717, Mode::Custom1];

    /// Sync words for this mode, one per subframe, in rotation order.
    #[must_use]
    pub const fn sync_words(&self) -> [u16; 4] {
        match self {
            Mode::Arinc573 => [0xe24, 0x1da, 0xe25, 0x1db],
            Mode::Arinc717 => [0x247, 0x5b8, 0xa47, 0xdb8],
            Mode::Custom1 => [0x0e0, 0x0e4, 0x0e8, 0x0ec],
        }
    }
}

impl Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Arinc573 => write!(f, "573"),
            Mode::Arinc717 => write!(f, "717"),
            Mode::Custom1 => write!(f, "custom-1"),
        }
    }
}

/// Location of one detected frame.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLoc {
    /// Absolute byte offset of the frame start within the input stream.
    pub offset: u64,
    /// Word rate verified at this offset.
    pub wps: Wps,
    /// Mode of the matched sync word.
    pub mode: Mode,
}

impl Display for FrameLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameLoc{{offset={}, wps={}, mode={}}}",
            self.offset, self.wps, self.mode
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_lengths() {
        assert_eq!(frame_len(64), 512);
        assert_eq!(frame_len(2048), 16384);
        assert_eq!(subframe_len(256), 512);
    }

    #[test]
    fn mode_names() {
        assert_eq!(Mode::Arinc573.to_string(), "573");
        assert_eq!(Mode::Arinc717.to_string(), "717");
        assert_eq!(Mode::Custom1.to_string(), "custom-1");
    }

    #[test]
    fn sync_words_rotate_within_a_mode() {
        for mode in Mode::ALL {
            let words = mode.sync_words();
            assert_eq!(words.len(), 4);
            for &word in &words {
                assert_eq!(word & !0x0fff, 0, "sync words are 12-bit values");
            }
        }
        assert_eq!(Mode::Arinc717.sync_words(), [0x247, 0x5b8, 0xa47, 0xdb8]);
    }
}
