//! Per-track timestamp normalization
//!
//! Upstream timestamps are whatever the encoder or relay produced: they may
//! start at an arbitrary offset, jump backwards on encoder restarts, or leap
//! forwards across discontinuities. [`Stamp`] rewrites them into a clean,
//! monotonically-consistent timeline so every downstream consumer sees the
//! same clock.

use std::time::Instant;

/// Input deltas outside this range are treated as discontinuities
const MAX_DELTA_MS: i64 = 5000;

/// Composition offsets (pts - dts) beyond this are considered garbage
const MAX_CTS_MS: i64 = 5000;

/// Timestamp rewrite mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampMode {
    /// Output timestamps are relative to the first revised frame and advance
    /// by the input deltas; discontinuities contribute zero
    Relative,
    /// Output timestamps follow the local wall clock
    System,
}

/// Per-track clock normalizer
#[derive(Debug)]
pub struct Stamp {
    mode: StampMode,
    created: Instant,
    started: bool,
    last_dts_in: i64,
    relative: i64,
}

impl Stamp {
    pub fn new(mode: StampMode) -> Self {
        Self {
            mode,
            created: Instant::now(),
            started: false,
            last_dts_in: 0,
            relative: 0,
        }
    }

    /// Rewrite mode
    pub fn mode(&self) -> StampMode {
        self.mode
    }

    /// Rewrite a raw (dts, pts) pair into the normalized timeline.
    ///
    /// A pts of 0 means "same as dts". In relative mode the returned dts is
    /// non-decreasing across calls.
    pub fn revise(&mut self, dts: i64, pts: i64) -> (i64, i64) {
        let pts = if pts == 0 { dts } else { pts };
        let cts = {
            let diff = pts - dts;
            // B-frame reordering keeps pts >= dts; anything else is noise
            if !(0..=MAX_CTS_MS).contains(&diff) {
                0
            } else {
                diff
            }
        };

        let out_dts = match self.mode {
            StampMode::System => {
                if !self.started {
                    self.created = Instant::now();
                }
                self.created.elapsed().as_millis() as i64
            }
            StampMode::Relative => {
                if self.started {
                    let delta = dts - self.last_dts_in;
                    if (0..=MAX_DELTA_MS).contains(&delta) {
                        self.relative += delta;
                    }
                    // discontinuity: hold the output clock
                }
                self.relative
            }
        };

        self.started = true;
        self.last_dts_in = dts;
        (out_dts, out_dts + cts)
    }

    /// Re-anchor the relative clock (used when the source dictates a base
    /// timestamp)
    pub fn set_relative(&mut self, ts: i64) {
        self.relative = ts;
    }

    /// Current relative clock value
    pub fn relative(&self) -> i64 {
        self.relative
    }
}
