//! Bounded-memory score lookup in a streamed JSON feed.
//!
//! The feed is far larger than the RAM we want to spend on it, so it is never
//! parsed. Chunks are appended to a text window that only ever holds the
//! most recent [`DEFAULT_WINDOW_CAP`] bytes, and after every chunk the window
//! is searched for `"abbrev":"<TEAM>"` followed by `"score":<digits>`.
//!
//! This relies on the feed putting the team marker before its score and
//! within one window of it. Nothing checks that; if the feed layout changes,
//! the scan reports [`ScanOutcome::NotFound`] or picks up a neighbouring
//! score.

use log::{debug, info, warn};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

/// Bytes requested per read.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// Maximum size of the retained text window.
pub const DEFAULT_WINDOW_CAP: usize = 600;

/// Feed field holding the team abbreviation.
pub const TEAM_FIELD: &str = "abbrev";

const SCORE_MARKER: &str = "\"score\":";

/// Result of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Score(u32),
    /// The feed ended without the team in it; usually no game today.
    NotFound,
    /// The feed could not be opened or a read failed.
    NetworkError,
}

impl ScanOutcome {
    /// Integer form: the score, `-2` for not found, `-1` for a network error.
    pub fn sentinel(self) -> i64 {
        match self {
            Self::Score(score) => i64::from(score),
            Self::NotFound => -2,
            Self::NetworkError => -1,
        }
    }
}

/// Looks for one team's score in a byte stream.
#[derive(Debug, Clone)]
pub struct ScoreStreamScanner {
    key_marker: String,
    window_cap: usize,
    chunk_size: usize,
}

impl ScoreStreamScanner {
    /// Scanner for `team`, matched exactly as given.
    pub fn new(team: &str) -> Self {
        Self {
            key_marker: format!("\"{}\":\"{}\"", TEAM_FIELD, team),
            window_cap: DEFAULT_WINDOW_CAP,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Keep at most `cap` bytes of unmatched text between reads.
    pub fn with_window_cap(mut self, cap: usize) -> Self {
        self.window_cap = cap.max(1);
        self
    }

    /// Read the feed `size` bytes at a time.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Upper bound on the retained window, in bytes.
    pub fn window_cap(&self) -> usize {
        self.window_cap
    }

    /// Read `source` until the score is found or the stream ends.
    ///
    /// `source` is dropped on return, which closes it; nothing after the
    /// matching chunk is read.
    pub fn scan<R: Read>(&self, mut source: R) -> ScanOutcome {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut window = String::with_capacity(self.window_cap + self.chunk_size);
        let mut total = 0usize;

        loop {
            let n = match source.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Score feed read failed after {} bytes: {}", total, e);
                    return ScanOutcome::NetworkError;
                }
            };
            total += n;

            match std::str::from_utf8(&chunk[..n]) {
                Ok(text) => window.push_str(text),
                Err(e) => {
                    debug!("Skipping undecodable chunk at byte {}: {}", total - n, e);
                    continue;
                }
            }
            keep_tail(&mut window, self.window_cap);

            if let Some(score) = self.find_score(&window, false) {
                info!("Score found after {} bytes: {}", total, score);
                return ScanOutcome::Score(score);
            }
        }

        // Digits at the very end of the window are complete now.
        if let Some(score) = self.find_score(&window, true) {
            info!("Score found at end of feed: {}", score);
            return ScanOutcome::Score(score);
        }
        debug!("Team not found in {} bytes of feed", total);
        ScanOutcome::NotFound
    }

    /// Score following the first team marker in `window`.
    ///
    /// A digit run that reaches the end of the window may continue in the
    /// next chunk, so it only counts once the stream has ended.
    fn find_score(&self, window: &str, at_eof: bool) -> Option<u32> {
        let team_at = window.find(&self.key_marker)?;
        let after_team = &window[team_at + self.key_marker.len()..];
        let score_at = after_team.find(SCORE_MARKER)?;
        let value = &after_team[score_at + SCORE_MARKER.len()..];

        let digits = value.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 || (digits == value.len() && !at_eof) {
            return None;
        }
        value[..digits].parse().ok()
    }
}

/// Drop leading bytes until at most `cap` remain, cutting on a character
/// boundary.
fn keep_tail(window: &mut String, cap: usize) {
    if window.len() <= cap {
        return;
    }
    let mut start = window.len() - cap;
    while !window.is_char_boundary(start) {
        start += 1;
    }
    window.drain(..start);
}

/// Something that can be opened as a score feed stream.
pub trait ScoreFeed {
    type Reader: Read;

    fn open(&mut self) -> io::Result<Self::Reader>;
}

/// Open `feed` and scan it. Failing to open counts as a network error.
pub fn poll_score<F: ScoreFeed>(feed: &mut F, scanner: &ScoreStreamScanner) -> ScanOutcome {
    match feed.open() {
        Ok(reader) => scanner.scan(reader),
        Err(e) => {
            warn!("Could not open score feed: {}", e);
            ScanOutcome::NetworkError
        }
    }
}

/// Feed read from a local file (host builds and testing).
#[derive(Debug, Clone)]
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    /// Feed read from the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ScoreFeed for FileFeed {
    type Reader = File;

    fn open(&mut self) -> io::Result<File> {
        File::open(&self.path)
    }
}
