//! GOP ring buffer
//!
//! Single-writer, multi-reader broadcast structure feeding every consumer
//! of a live stream. The writer appends merged frames; each reader owns an
//! independent cursor (a `broadcast::Receiver`). A bounded backlog of the
//! most recent groups of pictures is retained so a reader attaching
//! mid-stream can start from the last key frame instead of waiting for the
//! next one.
//!
//! Slow readers lag on their own receiver and surface `RecvError::Lagged`
//! on their side; the writer never blocks on them. Retention works on
//! sequence numbers, never on reader positions, so trimming the backlog is
//! decoupled from reader lifetime.

use std::collections::VecDeque;

use tokio::sync::broadcast;

use crate::media::frame::{MediaFrame, TrackType};

/// GOP-retaining broadcast ring
#[derive(Debug)]
pub struct GopRing {
    backlog: VecDeque<(u64, MediaFrame)>,
    /// Sequence numbers of video key frames still in the backlog
    key_seqs: VecDeque<u64>,
    next_seq: u64,
    gop_count: usize,
    max_frames: usize,
    tx: broadcast::Sender<MediaFrame>,
}

impl GopRing {
    /// `gop_count` groups of pictures are retained, capped at `max_frames`
    /// slots; `channel_capacity` bounds how far a live reader may lag
    pub fn new(gop_count: usize, max_frames: usize, channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            backlog: VecDeque::new(),
            key_seqs: VecDeque::new(),
            next_seq: 0,
            gop_count: gop_count.max(1),
            max_frames: max_frames.max(1),
            tx,
        }
    }

    /// Append a frame: it enters the retained backlog and is broadcast to
    /// every attached reader
    pub fn write(&mut self, frame: MediaFrame) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let is_key = frame.track_type() == TrackType::Video && frame.keyframe();
        if is_key {
            self.key_seqs.push_back(seq);
        }
        self.backlog.push_back((seq, frame.clone()));

        if is_key {
            // A new GOP begins; drop whole GOPs beyond the retention count
            while self.key_seqs.len() > self.gop_count {
                self.key_seqs.pop_front();
            }
            if let Some(&oldest) = self.key_seqs.front() {
                while self.backlog.front().is_some_and(|(s, _)| *s < oldest) {
                    self.backlog.pop_front();
                }
            }
        }

        while self.backlog.len() > self.max_frames {
            self.backlog.pop_front();
        }
        if let Some((min_seq, _)) = self.backlog.front() {
            while self.key_seqs.front().is_some_and(|k| k < min_seq) {
                self.key_seqs.pop_front();
            }
        }

        // No receivers attached yet is fine
        let _ = self.tx.send(frame);
    }

    /// Backlog starting at the most recent video key frame (the whole
    /// backlog if the stream has none, e.g. audio-only)
    pub fn catchup(&self) -> Vec<MediaFrame> {
        match self.key_seqs.back() {
            Some(&key) => self
                .backlog
                .iter()
                .filter(|(s, _)| *s >= key)
                .map(|(_, f)| f.clone())
                .collect(),
            None => self.backlog.iter().map(|(_, f)| f.clone()).collect(),
        }
    }

    /// Attach a new reader: returns its live cursor plus the key-frame
    /// aligned catch-up frames written before the attach point
    pub fn attach_reader(&self) -> (broadcast::Receiver<MediaFrame>, Vec<MediaFrame>) {
        (self.tx.subscribe(), self.catchup())
    }

    /// Backlog no older than `min_dts`, trimmed forward to the first video
    /// key frame so a decoder can start cleanly (untrimmed when the window
    /// holds no video key frame, e.g. audio-only)
    pub fn backlog_since(&self, min_dts: i64) -> Vec<MediaFrame> {
        let window: Vec<MediaFrame> = self
            .backlog
            .iter()
            .filter(|(_, f)| f.dts() >= min_dts)
            .map(|(_, f)| f.clone())
            .collect();
        match window
            .iter()
            .position(|f| f.track_type() == TrackType::Video && f.keyframe())
        {
            Some(pos) => window[pos..].to_vec(),
            None => window,
        }
    }

    /// Number of live readers
    pub fn reader_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Number of frames in the retained backlog
    pub fn frame_count(&self) -> usize {
        self.backlog.len()
    }

    /// dts of the newest retained frame
    pub fn latest_dts(&self) -> Option<i64> {
        self.backlog.back().map(|(_, f)| f.dts())
    }

    /// Timestamp span of the retained backlog in milliseconds
    pub fn backlog_duration(&self) -> Option<i64> {
        let first = self.backlog.front().map(|(_, f)| f.dts())?;
        let last = self.backlog.back().map(|(_, f)| f.dts())?;
        Some(last - first)
    }
}
