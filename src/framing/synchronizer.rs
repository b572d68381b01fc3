use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use super::bytes::ChunkBuffer;
use super::{frame_len, subframe_len, FrameLoc, Mode, Wps, WPS_CANDIDATES};
use crate::words::read_word;
use crate::{Error, Result};

/// Default flush threshold for [`Synchronizer::process_into`].
pub const DEFAULT_OUTPUT_BUFFER_LEN: usize = 1024 * 1024;

/// Options controlling synchronization.
#[derive(Clone, Debug, TypedBuilder)]
pub struct SyncOpts {
    /// Modes to search for, in search order.
    #[builder(default = Mode::ALL.to_vec())]
    pub modes: Vec<Mode>,
    /// Candidate word rates. Rates are always tried slowest first so a slow
    /// recording is never mistaken for a faster one.
    #[builder(default = WPS_CANDIDATES.to_vec())]
    pub wps: Vec<Wps>,
    /// Word byte order of the stream.
    #[builder(default = true)]
    pub little_endian: bool,
    /// Only match sync words that open a frame, not any subframe.
    #[builder(default = false)]
    pub frames_only: bool,
    /// Flush threshold for [`Synchronizer::process_into`]. Affects write
    /// batching only, never which bytes are emitted.
    #[builder(default = DEFAULT_OUTPUT_BUFFER_LEN)]
    pub output_buffer_len: usize,
}

impl Default for SyncOpts {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A confirmed frame in the scan window.
#[derive(Debug, Clone, Copy)]
struct FrameHit {
    /// Offset within the current window.
    rel: usize,
    /// Absolute offset within the stream.
    abs: u64,
    wps: Wps,
    /// Index of the matched sync word in the flat mode table.
    word_idx: usize,
    /// Zero-based index of this frame among all confirmed frames.
    ordinal: u64,
}

/// Outcome of testing one window offset for a frame start.
enum Probe {
    Hit { wps: Wps, word_idx: usize },
    /// The word matched a sync word but no candidate rate could be checked
    /// against the bytes buffered so far.
    Undecided,
    Miss,
}

/// Synchronizer scans a chunked byte stream for ARINC 717/573 frames.
///
/// The stream need not be byte-aligned or start on a frame boundary, and the
/// word rate is inferred from the sync word spacing rather than configured.
/// Scanning advances byte by byte until a frame is verified, then frame by
/// frame for as long as sync holds, buffering no more than one maximum-rate
/// frame of history plus one input chunk.
pub struct Synchronizer {
    modes: Vec<Mode>,
    // sync words for all requested modes, 4 per mode, rotation order preserved
    sync_words: Vec<u16>,
    wps: Vec<Wps>,
    little_endian: bool,
    frames_only: bool,
    output_buffer_len: usize,
    min_frame_len: usize,
    max_frame_len: usize,

    buf: ChunkBuffer,
    // scan cursor within the window
    pos: usize,
    // absolute stream offset of the window start
    base: u64,
    frame_count: u64,
    eof: bool,
    // where the next frame starts if sync holds
    next_expected: Option<u64>,

    /// Count of confirmed frames per detected word rate.
    pub wps_hits: HashMap<Wps, u64>,
}

impl Synchronizer {
    /// Creates a new `Synchronizer`.
    ///
    /// # Panics
    /// If `opts` names no modes, no word rates, or a word rate of zero.
    #[must_use]
    pub fn new(opts: SyncOpts) -> Self {
        assert!(!opts.modes.is_empty(), "at least one mode is required");
        assert!(!opts.wps.is_empty(), "at least one word rate is required");
        assert!(
            opts.wps.iter().all(|&w| w > 0),
            "word rates must be positive"
        );

        let mut modes: Vec<Mode> = Vec::with_capacity(opts.modes.len());
        for mode in opts.modes {
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        let sync_words: Vec<u16> = modes.iter().flat_map(|m| m.sync_words()).collect();

        let mut wps = opts.wps;
        wps.sort_unstable();
        wps.dedup();
        let min_frame_len = frame_len(wps[0]);
        let max_frame_len = frame_len(wps[wps.len() - 1]);

        Synchronizer {
            modes,
            sync_words,
            wps,
            little_endian: opts.little_endian,
            frames_only: opts.frames_only,
            output_buffer_len: opts.output_buffer_len,
            min_frame_len,
            max_frame_len,
            buf: ChunkBuffer::new(),
            pos: 0,
            base: 0,
            frame_count: 0,
            eof: false,
            next_expected: None,
            wps_hits: HashMap::new(),
        }
    }

    /// Count of frames confirmed so far, emitted or not.
    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Return scan state to its initial empty value so the instance can be
    /// reused on a fresh stream. Configuration is unchanged.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.base = 0;
        self.frame_count = 0;
        self.eof = false;
        self.next_expected = None;
        self.wps_hits.clear();
    }

    /// Returns an iterator of the synchronized frames in `chunks`, each item
    /// one whole frame of `frame_len(wps)` bytes for the rate detected at its
    /// start. Unsynchronizable bytes are dropped silently.
    ///
    /// `start` and `stop` bound emission to confirmed frames with zero-based
    /// index in `[start, stop)`; frames before `start` are still scanned and
    /// counted, and input past `stop` frames is never consumed.
    ///
    /// Scan state carries over between calls; use [`Self::reset`] to start a
    /// fresh stream.
    ///
    /// # Errors
    /// [`Error::InvalidBounds`] when `stop <= start`, before any input is
    /// consumed.
    pub fn process<I>(
        &mut self,
        chunks: I,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<Frames<'_, I::IntoIter>>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        let start = start.unwrap_or(0);
        let stop = stop.unwrap_or(u64::MAX);
        if stop <= start {
            return Err(Error::InvalidBounds { start, stop });
        }
        Ok(Frames {
            sync: self,
            chunks: chunks.into_iter(),
            start,
            stop,
            done: false,
        })
    }

    /// Like [`Self::process`], but writes the emitted frames to `writer`,
    /// batching writes to about `output_buffer_len` bytes. Returns the number
    /// of bytes written.
    ///
    /// # Errors
    /// [`Error::InvalidBounds`] when `stop <= start`; [`Error::Io`] when the
    /// writer fails.
    pub fn process_into<I, W>(
        &mut self,
        chunks: I,
        writer: &mut W,
        start: Option<u64>,
        stop: Option<u64>,
    ) -> Result<u64>
    where
        I: IntoIterator<Item = Vec<u8>>,
        W: Write,
    {
        let flush_len = self.output_buffer_len;
        let mut pending: Vec<u8> = Vec::new();
        let mut written = 0u64;
        for frame in self.process(chunks, start, stop)? {
            pending.extend_from_slice(&frame);
            if pending.len() >= flush_len {
                writer.write_all(&pending)?;
                written += pending.len() as u64;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            writer.write_all(&pending)?;
            written += pending.len() as u64;
        }
        Ok(written)
    }

    /// Returns an iterator of [`FrameLoc`] records, one per confirmed frame
    /// start in `chunks`, unfiltered. Diagnostic companion to
    /// [`Self::process`], sharing the same scan state.
    pub fn identify<I>(&mut self, chunks: I) -> FrameLocs<'_, I::IntoIter>
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        FrameLocs {
            sync: self,
            chunks: chunks.into_iter(),
        }
    }

    /// Index of `word` in the flat sync word table, or `None`.
    fn match_word(&self, word: u16) -> Option<usize> {
        if self.frames_only {
            self.sync_words
                .iter()
                .step_by(4)
                .position(|&w| w == word)
                .map(|i| i * 4)
        } else {
            self.sync_words.iter().position(|&w| w == word)
        }
    }

    /// The next three subframe boundaries hold the following sync words of
    /// the matched mode's rotation. Three boundaries, not one, so a stray
    /// sync-word-valued sample does not pass for a frame.
    fn rotation_holds(&self, window: &[u8], offset: usize, wps: Wps, word_idx: usize) -> bool {
        let quad = word_idx / 4 * 4;
        (1..4).all(|k| {
            let expected = self.sync_words[quad + (word_idx + k) % 4];
            read_word(window, offset + subframe_len(wps) * k, self.little_endian) == expected
        })
    }

    /// Test `offset` for a verified frame start, slowest candidate rate
    /// first. Candidates whose whole frame is not yet buffered cannot be
    /// checked, which makes the offset undecided rather than a miss.
    fn frame_at(&self, window: &[u8], offset: usize) -> Probe {
        let word = read_word(window, offset, self.little_endian);
        let word_idx = match self.match_word(word) {
            Some(idx) => idx,
            None => return Probe::Miss,
        };
        let mut undecided = false;
        for &wps in &self.wps {
            if offset + frame_len(wps) > window.len() {
                // rates are ascending, nothing else fits either
                undecided = true;
                break;
            }
            if self.rotation_holds(window, offset, wps, word_idx) {
                return Probe::Hit { wps, word_idx };
            }
        }
        if undecided {
            Probe::Undecided
        } else {
            Probe::Miss
        }
    }

    /// Advance the scan cursor to the next confirmed frame in the window.
    ///
    /// Returns `None` when the window is exhausted or when an undecided
    /// offset needs more input. Holding the cursor on undecided offsets keeps
    /// emission independent of how the stream was chunked; once `eof` is set
    /// undecided offsets can never be confirmed and are skipped.
    fn scan_next(&mut self) -> Option<FrameHit> {
        self.buf.coalesce();
        let window = self.buf.as_slice();
        while self.pos + self.min_frame_len <= window.len() {
            match self.frame_at(window, self.pos) {
                Probe::Hit { wps, word_idx } => {
                    let rel = self.pos;
                    let abs = self.base + rel as u64;
                    match self.next_expected {
                        Some(expected) if expected == abs => {}
                        Some(expected) => {
                            debug!(
                                expected = expected,
                                offset = abs,
                                wps = wps,
                                "sync lost, reacquired"
                            );
                        }
                        None => {
                            debug!(
                                offset = abs,
                                wps = wps,
                                mode = %self.modes[word_idx / 4],
                                "sync acquired"
                            );
                        }
                    }
                    let flen = frame_len(wps);
                    self.next_expected = Some(abs + flen as u64);
                    self.pos = rel + flen;
                    let ordinal = self.frame_count;
                    self.frame_count += 1;
                    *self.wps_hits.entry(wps).or_insert(0) += 1;
                    return Some(FrameHit {
                        rel,
                        abs,
                        wps,
                        word_idx,
                        ordinal,
                    });
                }
                Probe::Undecided if !self.eof => {
                    trace!(
                        offset = self.base + self.pos as u64,
                        "sync word found, awaiting enough data to verify"
                    );
                    return None;
                }
                Probe::Undecided | Probe::Miss => self.pos += 1,
            }
        }
        None
    }

    /// Keep the retained window at one maximum-rate frame.
    ///
    /// Only called after a scan pass, so the dropped prefix is always behind
    /// the cursor and any sync word it held has already been ruled out.
    fn trim_window(&mut self) {
        let excess = self.buf.len().saturating_sub(self.max_frame_len);
        if excess > 0 {
            let dropped = self.buf.truncate(excess);
            debug_assert!(dropped <= self.pos);
            self.pos -= dropped;
            self.base += dropped as u64;
            trace!(
                dropped = dropped,
                offset = self.base,
                "dropped unsynchronizable bytes"
            );
        }
    }

    /// Scan until a frame is confirmed, pulling chunks as needed. `None`
    /// means the source is exhausted and no further frame can be confirmed.
    fn next_hit<I>(&mut self, chunks: &mut I) -> Option<FrameHit>
    where
        I: Iterator<Item = Vec<u8>>,
    {
        loop {
            if let Some(hit) = self.scan_next() {
                return Some(hit);
            }
            if self.eof {
                return None;
            }
            self.trim_window();
            loop {
                match chunks.next() {
                    Some(chunk) if chunk.is_empty() => {}
                    Some(chunk) => {
                        self.buf.add(chunk);
                        break;
                    }
                    None => {
                        trace!(
                            total = self.base + self.buf.len() as u64,
                            "input exhausted"
                        );
                        self.eof = true;
                        break;
                    }
                }
            }
        }
    }

    /// Copy a confirmed frame's bytes out of the window.
    fn frame_bytes(&mut self, hit: &FrameHit) -> Vec<u8> {
        self.buf.coalesce();
        let window = self.buf.as_slice();
        window[hit.rel..hit.rel + frame_len(hit.wps)].to_vec()
    }

    fn mode_of(&self, word_idx: usize) -> Mode {
        self.modes[word_idx / 4]
    }
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(SyncOpts::default())
    }
}

/// Iterates over synchronized frames, one `Vec<u8>` per frame. Created with
/// [`Synchronizer::process`].
pub struct Frames<'a, I>
where
    I: Iterator<Item = Vec<u8>>,
{
    sync: &'a mut Synchronizer,
    chunks: I,
    start: u64,
    stop: u64,
    done: bool,
}

impl<I> Iterator for Frames<'_, I>
where
    I: Iterator<Item = Vec<u8>>,
{
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let hit = match self.sync.next_hit(&mut self.chunks) {
                Some(hit) => hit,
                None => {
                    self.done = true;
                    break;
                }
            };
            if self.sync.frame_count >= self.stop {
                // bound reached, leave remaining input unconsumed
                self.done = true;
            }
            if hit.ordinal >= self.start {
                return Some(self.sync.frame_bytes(&hit));
            }
        }
        None
    }
}

/// Iterates over detected frame locations. Created with
/// [`Synchronizer::identify`].
pub struct FrameLocs<'a, I>
where
    I: Iterator<Item = Vec<u8>>,
{
    sync: &'a mut Synchronizer,
    chunks: I,
}

impl<I> Iterator for FrameLocs<'_, I>
where
    I: Iterator<Item = Vec<u8>>,
{
    type Item = FrameLoc;

    fn next(&mut self) -> Option<Self::Item> {
        let hit = self.sync.next_hit(&mut self.chunks)?;
        Some(FrameLoc {
            offset: hit.abs,
            wps: hit.wps,
            mode: self.sync.mode_of(hit.word_idx),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn push_word(out: &mut Vec<u8>, word: u16, little_endian: bool) {
        if little_endian {
            out.extend_from_slice(&word.to_le_bytes());
        } else {
            out.extend_from_slice(&word.to_be_bytes());
        }
    }

    /// A well-formed frame whose filler words can never match a sync word.
    fn test_frame(mode: Mode, wps: Wps, little_endian: bool) -> Vec<u8> {
        let sync_words = mode.sync_words();
        let mut out = Vec::with_capacity(frame_len(wps));
        for (subframe, &sync) in sync_words.iter().enumerate() {
            push_word(&mut out, sync, little_endian);
            for word in 1..wps {
                let filler = 0x0700 | ((subframe * 131 + word) & 0xff) as u16;
                push_word(&mut out, filler, little_endian);
            }
        }
        out
    }

    fn collect_frames(sync: &mut Synchronizer, stream: Vec<u8>) -> Vec<Vec<u8>> {
        sync.process(vec![stream], None, None)
            .expect("default bounds are valid")
            .collect()
    }

    #[test]
    fn finds_frame_after_garbage_prefix() {
        let frame = test_frame(Mode::Arinc717, 64, true);
        let mut stream = vec![0xff; 20];
        stream.extend_from_slice(&frame);

        let mut sync = Synchronizer::default();
        let frames = collect_frames(&mut sync, stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], frame);
        assert_eq!(sync.wps_hits.get(&64), Some(&1));
        assert_eq!(sync.frame_count(), 1);
    }

    #[test]
    fn emits_frame_split_across_many_chunks() {
        let frame = test_frame(Mode::Arinc573, 64, true);
        let mut stream = vec![0xff; 7];
        stream.extend_from_slice(&frame);

        let chunks: Vec<Vec<u8>> = stream.chunks(11).map(<[u8]>::to_vec).collect();
        let mut sync = Synchronizer::default();
        let frames: Vec<Vec<u8>> = sync.process(chunks, None, None).unwrap().collect();
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn undecidable_tail_is_dropped_at_end_of_input() {
        // a frame, then only the next frame's opening sync word
        let frame = test_frame(Mode::Arinc717, 64, true);
        let mut stream = frame.clone();
        push_word(&mut stream, 0x247, true);
        stream.extend_from_slice(&[0xff; 50]);

        let mut sync = Synchronizer::default();
        let frames = collect_frames(&mut sync, stream);
        assert_eq!(frames, vec![frame]);
        assert_eq!(sync.frame_count(), 1);
    }

    #[test]
    fn window_stays_bounded_while_unsynchronized() {
        let mut sync = Synchronizer::default();
        let chunk_len = 700;
        for _ in 0..100 {
            sync.buf.add(vec![0xff; chunk_len]);
            assert!(sync.buf.len() <= sync.max_frame_len + chunk_len);
            assert!(sync.scan_next().is_none());
            sync.trim_window();
            assert!(sync.buf.len() <= sync.max_frame_len);
        }
        assert_eq!(sync.base + sync.buf.len() as u64, (100 * chunk_len) as u64);
    }

    #[test]
    fn match_word_honors_frames_only() {
        let any = Synchronizer::default();
        assert_eq!(any.match_word(0x247), Some(4));
        assert_eq!(any.match_word(0x5b8), Some(5));
        assert_eq!(any.match_word(0x123), None);

        let frames_only = Synchronizer::new(SyncOpts::builder().frames_only(true).build());
        assert_eq!(frames_only.match_word(0x247), Some(4));
        assert_eq!(frames_only.match_word(0x5b8), None);
        assert_eq!(frames_only.match_word(0x0e0), Some(8));
    }

    #[test]
    fn identify_reports_offset_rate_and_mode() {
        let frame = test_frame(Mode::Arinc573, 64, true);
        let mut stream = vec![0xff; 5];
        stream.extend_from_slice(&frame);

        let mut sync = Synchronizer::default();
        let locs: Vec<FrameLoc> = sync.identify(vec![stream]).collect();
        assert_eq!(
            locs,
            vec![FrameLoc {
                offset: 5,
                wps: 64,
                mode: Mode::Arinc573,
            }]
        );
    }

    #[test]
    fn invalid_bounds_are_rejected_before_any_input_is_pulled() {
        let pulled = Cell::new(false);
        let chunks = std::iter::from_fn(|| {
            pulled.set(true);
            Some(vec![0u8; 16])
        })
        .take(4);

        let mut sync = Synchronizer::default();
        match sync.process(chunks, Some(5), Some(5)) {
            Err(Error::InvalidBounds { start: 5, stop: 5 }) => {}
            other => panic!("expected InvalidBounds, got {:?}", other.map(Iterator::count)),
        }
        assert!(!pulled.get());

        let mut sync = Synchronizer::default();
        assert!(matches!(
            sync.process(Vec::new(), None, Some(0)),
            Err(Error::InvalidBounds { start: 0, stop: 0 })
        ));
    }

    #[test]
    fn reset_returns_to_initial_state() {
        let frame = test_frame(Mode::Arinc717, 64, true);
        let mut sync = Synchronizer::default();
        let frames = collect_frames(&mut sync, frame);
        assert_eq!(frames.len(), 1);
        assert!(sync.eof);

        sync.reset();
        assert_eq!(sync.frame_count(), 0);
        assert!(sync.buf.is_empty());
        assert!(!sync.eof);
        assert_eq!(sync.pos, 0);
        assert_eq!(sync.base, 0);
        assert!(sync.next_expected.is_none());
        assert!(sync.wps_hits.is_empty());
    }

    #[test]
    #[should_panic(expected = "at least one mode is required")]
    fn new_panics_without_modes() {
        let _ = Synchronizer::new(SyncOpts::builder().modes(Vec::new()).build());
    }

    #[test]
    #[should_panic(expected = "word rates must be positive")]
    fn new_panics_on_zero_wps() {
        let _ = Synchronizer::new(SyncOpts::builder().wps(vec![0]).build());
    }

    #[test]
    fn wps_candidates_are_sorted_and_deduped() {
        let sync = Synchronizer::new(SyncOpts::builder().wps(vec![512, 64, 512, 128]).build());
        assert_eq!(sync.wps, vec![64, 128, 512]);
        assert_eq!(sync.min_frame_len, frame_len(64));
        assert_eq!(sync.max_frame_len, frame_len(512));
    }
}
