//! Access-unit reassembly
//!
//! Ingest may deliver one access unit as several fragments (one NAL unit
//! per RTP packet, or arbitrary slices of a PS demux). [`FrameMerger`]
//! accumulates fragments for one track and emits a single merged buffer
//! once a unit boundary is detected, encapsulated per the configured
//! [`MergeMode`].
//!
//! Boundary detection is codec-aware but deliberately shallow: a new unit
//! starts on a dts change, on a decodable or config frame, or on an
//! embedded start code in raw mode. Malformed input that never shows a
//! boundary is bounded by [`MAX_FRAME_CACHE`]: exceeding it forces a flush
//! so memory stays bounded.

use std::collections::VecDeque;

use bytes::{BufMut, Bytes, BytesMut};

use crate::media::frame::MediaFrame;

/// Pending-fragment ceiling; exceeding it forces a flush
pub const MAX_FRAME_CACHE: usize = 100;

/// Output encapsulation applied when merging fragments into a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Boundary-agnostic byte concatenation; used when reassembling an
    /// unstructured elementary stream whose boundaries are resolved by a
    /// downstream split pass
    RawConcat,
    /// Annex-B: every NAL unit prefixed with a 4-byte start code
    H264Prefix,
    /// ISO/MP4: 4-byte big-endian NAL length, no start code
    Mp4NalSize,
}

/// Callback receiving merged units: `(dts, pts, payload, keyframe)`
pub type OnMerged = Box<dyn FnMut(i64, i64, Bytes, bool) + Send + Sync>;

/// Per-track reassembly engine
pub struct FrameMerger {
    mode: MergeMode,
    cache: VecDeque<MediaFrame>,
    have_decode_able: bool,
    have_drop_able: bool,
    have_config: bool,
    cb: Option<OnMerged>,
}

impl FrameMerger {
    pub fn new(mode: MergeMode) -> Self {
        Self {
            mode,
            cache: VecDeque::new(),
            have_decode_able: false,
            have_drop_able: false,
            have_config: false,
            cb: None,
        }
    }

    /// Configured encapsulation mode
    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Number of fragments currently pending
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Feed one fragment.
    ///
    /// Frames of codecs that never fragment bypass the cache and are
    /// forwarded through `on_output` immediately. Otherwise the fragment is
    /// cached; when it starts a new unit the previous unit is emitted first.
    ///
    /// If `buffer` is supplied the merged unit is accumulated there and
    /// split off on emission, so the allocation is reused across calls; its
    /// presence also forces full encapsulation for single-fragment units.
    ///
    /// The callback is retained for [`flush`](Self::flush).
    pub fn input_frame<F>(
        &mut self,
        frame: MediaFrame,
        on_output: F,
        buffer: Option<&mut BytesMut>,
    ) -> bool
    where
        F: FnMut(i64, i64, Bytes, bool) + Send + Sync + 'static,
    {
        let mut cb: OnMerged = Box::new(on_output);
        let ret = self.input_inner(Some(frame), &mut cb, buffer);
        self.cb = Some(cb);
        ret
    }

    /// Drain any pending unit through the last-registered callback
    pub fn flush(&mut self) {
        if let Some(mut cb) = self.cb.take() {
            self.input_inner(None, &mut cb, None);
        }
        self.clear();
    }

    /// Reset the cache and seen-flags without emitting
    pub fn clear(&mut self) {
        self.cache.clear();
        self.have_decode_able = false;
        self.have_drop_able = false;
        self.have_config = false;
    }

    fn input_inner(
        &mut self,
        frame: Option<MediaFrame>,
        cb: &mut OnMerged,
        buffer: Option<&mut BytesMut>,
    ) -> bool {
        if let Some(f) = &frame {
            if !f.codec().needs_merge() {
                // Already a complete unit
                cb(f.dts(), f.pts(), f.data().clone(), true);
                return true;
            }
        }

        if self.will_flush(frame.as_ref()) {
            self.emit(cb, buffer);
        }

        let Some(frame) = frame else {
            return false;
        };

        if frame.decode_able() {
            self.have_decode_able = true;
        }
        if frame.drop_able() {
            self.have_drop_able = true;
        }
        if frame.config_frame() {
            self.have_config = true;
        }
        self.cache.push_back(frame);
        true
    }

    /// Decide whether the pending unit must be emitted before `frame` is
    /// cached. `None` signals end-of-stream and always drains.
    fn will_flush(&self, frame: Option<&MediaFrame>) -> bool {
        let Some(back) = self.cache.back() else {
            return false;
        };
        let Some(frame) = frame else {
            return true;
        };

        match self.mode {
            MergeMode::RawConcat => {
                // An embedded start code marks the next unit
                let new_unit = frame.prefix_size() > 0;
                new_unit || back.dts() != frame.dts() || self.cache.len() > MAX_FRAME_CACHE
            }
            MergeMode::H264Prefix | MergeMode::Mp4NalSize => {
                if frame.drop_able() && !self.have_config {
                    // Keep SEI attached to the next unit, not merged into a
                    // unit lacking its parameter sets
                    return true;
                }
                if !self.have_decode_able && !self.have_drop_able {
                    // Nothing decodable cached yet; a lone config frame is
                    // not a unit on its own
                    return self.cache.len() > MAX_FRAME_CACHE;
                }
                if back.dts() != frame.dts() || frame.decode_able() || frame.config_frame() {
                    return true;
                }
                self.cache.len() > MAX_FRAME_CACHE
            }
        }
    }

    /// Encapsulate one fragment into the output buffer
    fn do_merge(mode: MergeMode, merged: &mut BytesMut, frame: &MediaFrame) {
        match mode {
            MergeMode::RawConcat => {
                merged.extend_from_slice(frame.data());
            }
            MergeMode::H264Prefix => {
                if frame.prefix_size() == 0 {
                    merged.extend_from_slice(&[0x00, 0x00, 0x00, 0x01]);
                }
                merged.extend_from_slice(frame.data());
            }
            MergeMode::Mp4NalSize => {
                let nalu = &frame.data()[frame.prefix_size()..];
                merged.put_u32(nalu.len() as u32);
                merged.extend_from_slice(nalu);
            }
        }
    }

    /// Emit the pending unit: dts/pts from the first cached fragment, key
    /// flag if any fragment was key. Clears the cache and seen-flags.
    fn emit(&mut self, cb: &mut OnMerged, buffer: Option<&mut BytesMut>) {
        let Some(front) = self.cache.front() else {
            return;
        };
        let (dts, pts) = (front.dts(), front.pts());

        let mut have_key = false;
        let merged =
            if self.cache.len() != 1 || self.mode == MergeMode::Mp4NalSize || buffer.is_some() {
                let mut tmp;
                let merged = match buffer {
                    Some(buf) => buf,
                    None => {
                        let total: usize = self.cache.iter().map(|f| f.size() + 4).sum();
                        tmp = BytesMut::with_capacity(total);
                        &mut tmp
                    }
                };
                for frame in &self.cache {
                    Self::do_merge(self.mode, merged, frame);
                    if frame.keyframe() {
                        have_key = true;
                    }
                }
                merged.split().freeze()
            } else {
                // Single fragment outside MP4 mode goes out as-is
                have_key = front.keyframe();
                front.data().clone()
            };

        cb(dts, pts, merged, have_key);
        self.cache.clear();
        self.have_decode_able = false;
        self.have_drop_able = false;
        self.have_config = false;
    }
}

impl std::fmt::Debug for FrameMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameMerger")
            .field("mode", &self.mode)
            .field("cache_len", &self.cache.len())
            .field("have_decode_able", &self.have_decode_able)
            .field("have_drop_able", &self.have_drop_able)
            .field("have_config", &self.have_config)
            .finish()
    }
}
