//! Fan-out orchestrator
//!
//! One [`MediaMuxer`] instance owns the full pipeline for one live source:
//! per-track timestamp normalization and access-unit reassembly, the
//! readiness barrier, the GOP ring, and the runtime-mutable set of output
//! consumers (protocol sinks, recorders, RTP push sessions).
//!
//! The hot frame path and every control operation marshal through the same
//! `RwLock`, so control calls from any task are safe against concurrent
//! delivery. Consumers never run on the hot path: sinks accept frames
//! synchronously and cheaply, RTP senders drain their own ring readers on
//! their own tasks, and a failing consumer is detached without disturbing
//! the rest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::media::frame::{CodecId, FrameFlags, MediaFrame, TrackType};
use crate::media::gop::GopRing;
use crate::media::h264;
use crate::media::merger::FrameMerger;
use crate::media::stamp::Stamp;
use crate::muxer::barrier::TrackBarrier;
use crate::muxer::config::MuxerConfig;
use crate::muxer::error::MuxerError;
use crate::muxer::recorder::{RecordParams, RecorderFactory, RecorderKind};
use crate::muxer::rtp::{self, RtpSender, SendRtpArgs};
use crate::muxer::sink::{FrameSink, TrackInfo, TrackListener};
use crate::stats::MuxerStats;

/// One reassembled access unit leaving a merger
struct MergedUnit {
    codec: CodecId,
    dts: i64,
    pts: i64,
    data: Bytes,
    keyframe: bool,
}

struct RecorderEntry {
    kind: RecorderKind,
    sink: Box<dyn FrameSink>,
    stop_timer: Option<JoinHandle<()>>,
}

struct RtpPushEntry {
    local_port: u16,
    handle: JoinHandle<()>,
}

type RtpDetachListener = Arc<dyn Fn(&str, &MuxerError) + Send + Sync>;

struct MuxerInner {
    barrier: TrackBarrier,
    stamps: HashMap<TrackType, Stamp>,
    mergers: HashMap<TrackType, FrameMerger>,
    ring: Option<GopRing>,
    sinks: HashMap<String, Box<dyn FrameSink>>,
    /// Keyed by recorder kind for `setup_record`, by resolved path for
    /// windowed `start_record` sessions
    recorders: HashMap<String, RecorderEntry>,
    /// Sessions per SSRC; more than one entry only with
    /// `allow_duplicate_ssrc`
    rtp_senders: HashMap<String, Vec<RtpPushEntry>>,
    recorder_factory: Option<RecorderFactory>,
    track_listener: Option<Weak<dyn TrackListener>>,
    rtp_detach_listener: Option<RtpDetachListener>,
    /// Units emitted by merger callbacks, drained after every merger call
    pending: Arc<Mutex<Vec<MergedUnit>>>,
    stats: MuxerStats,
    closed: bool,
}

impl MuxerInner {
    /// Drain merger output and route each unit through the ring and every
    /// attached consumer
    fn drain_pending(&mut self) {
        let units: Vec<MergedUnit> = self.pending.lock().unwrap().drain(..).collect();
        for unit in units {
            let prefix_size = match unit.codec.track_type() {
                TrackType::Video => h264::annexb_prefix_size(&unit.data),
                _ => 0,
            };
            let frame = MediaFrame::with_flags(
                unit.codec,
                unit.dts,
                unit.pts,
                unit.data,
                prefix_size,
                FrameFlags {
                    keyframe: unit.keyframe,
                    decode_able: true,
                    ..FrameFlags::default()
                },
            );
            self.dispatch(frame);
        }
    }

    /// Deliver one complete unit: ring first, then every sink and recorder.
    /// A failing consumer is detached; the rest still get the frame.
    fn dispatch(&mut self, frame: MediaFrame) {
        self.stats.units_out += 1;

        if let Some(ring) = &mut self.ring {
            ring.write(frame.clone());
        }

        let mut failed: Vec<String> = Vec::new();
        for (name, sink) in self.sinks.iter_mut() {
            if let Err(e) = sink.input_frame(&frame) {
                tracing::warn!(sink = %name, error = %e, "Sink failed, detaching");
                failed.push(name.clone());
            }
        }
        self.stats.sink_errors += failed.len() as u64;
        for name in failed {
            if let Some(mut sink) = self.sinks.remove(&name) {
                sink.on_reset();
            }
        }

        let mut failed_recorders: Vec<String> = Vec::new();
        for (name, entry) in self.recorders.iter_mut() {
            if let Err(e) = entry.sink.input_frame(&frame) {
                tracing::warn!(recorder = %name, error = %e, "Recorder failed, stopping");
                failed_recorders.push(name.clone());
            }
        }
        self.stats.sink_errors += failed_recorders.len() as u64;
        for name in failed_recorders {
            if let Some(mut entry) = self.recorders.remove(&name) {
                entry.sink.on_reset();
                if let Some(timer) = entry.stop_timer {
                    timer.abort();
                }
            }
        }
    }
}

/// Track-synchronized multi-protocol fan-out for one live source
pub struct MediaMuxer {
    config: MuxerConfig,
    inner: RwLock<MuxerInner>,
}

impl MediaMuxer {
    pub fn new(config: MuxerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            inner: RwLock::new(MuxerInner {
                barrier: TrackBarrier::new(),
                stamps: HashMap::new(),
                mergers: HashMap::new(),
                ring: None,
                sinks: HashMap::new(),
                recorders: HashMap::new(),
                rtp_senders: HashMap::new(),
                recorder_factory: None,
                track_listener: None,
                rtp_detach_listener: None,
                pending: Arc::new(Mutex::new(Vec::new())),
                stats: MuxerStats::new(),
                closed: false,
            }),
        })
    }

    pub fn config(&self) -> &MuxerConfig {
        &self.config
    }

    /// Register a track of the source. Returns false once the barrier has
    /// fired.
    pub async fn add_track(&self, info: TrackInfo) -> bool {
        let mut inner = self.inner.write().await;
        let track = info.track_type();
        let codec = info.codec;
        if !inner.barrier.add_track(info) {
            return false;
        }
        inner.stamps.insert(track, Stamp::new(self.config.stamp_mode));
        inner
            .mergers
            .insert(track, FrameMerger::new(self.config.merge_mode));
        tracing::debug!(track = %track, codec = %codec, "Track registered");
        true
    }

    /// Report one track ready. On the call that completes the set the
    /// one-time transition runs: the GOP ring is created, every attached
    /// consumer learns the track set, and the track listener is notified.
    /// Returns true exactly on that call.
    pub async fn set_track_ready(&self, track: TrackType) -> bool {
        let listener = {
            let mut inner = self.inner.write().await;
            if !inner.barrier.set_ready(track) {
                return false;
            }
            tracing::info!(
                tracks = inner.barrier.track_count(),
                "All tracks ready, fan-out active"
            );
            inner.ring = Some(GopRing::new(
                self.config.gop_count,
                self.config.gop_max_frames,
                self.config.ring_capacity,
            ));
            let tracks = inner.barrier.tracks();
            for sink in inner.sinks.values_mut() {
                sink.on_tracks(&tracks);
            }
            for entry in inner.recorders.values_mut() {
                entry.sink.on_tracks(&tracks);
            }
            inner.track_listener.clone()
        };
        if let Some(listener) = listener.and_then(|w| w.upgrade()) {
            listener.on_all_track_ready();
        }
        true
    }

    /// Feed one frame from the ingest layer. Frames arriving before the
    /// all-tracks-ready transition are not forwarded. Returns whether the
    /// frame entered the fan-out path.
    pub async fn input_frame(&self, frame: MediaFrame) -> bool {
        let mut inner = self.inner.write().await;
        inner.stats.frames_in += 1;
        if inner.closed || !inner.barrier.is_all_ready() {
            inner.stats.dropped_pre_ready += 1;
            tracing::trace!(
                track = %frame.track_type(),
                dts = frame.dts(),
                "Frame before activation, not forwarded"
            );
            return false;
        }

        let track = frame.track_type();
        let stamp_mode = self.config.stamp_mode;
        let stamp = inner
            .stamps
            .entry(track)
            .or_insert_with(|| Stamp::new(stamp_mode));
        let (dts, pts) = stamp.revise(frame.dts(), frame.pts());
        let frame = frame.restamped(dts, pts);

        if !frame.codec().needs_merge() {
            // Already a complete unit
            inner.dispatch(frame);
            return true;
        }

        let codec = frame.codec();
        let pending = inner.pending.clone();
        let merge_mode = self.config.merge_mode;
        let merger = inner
            .mergers
            .entry(track)
            .or_insert_with(|| FrameMerger::new(merge_mode));
        merger.input_frame(
            frame,
            move |dts, pts, data, keyframe| {
                pending.lock().unwrap().push(MergedUnit {
                    codec,
                    dts,
                    pts,
                    data,
                    keyframe,
                });
            },
            None,
        );
        inner.drain_pending();
        true
    }

    /// Attach a protocol sink. A sink attached after activation learns the
    /// track set and receives the key-frame aligned ring backlog
    /// immediately, so its viewers start without waiting for the next key
    /// frame.
    pub async fn attach_sink(&self, mut sink: Box<dyn FrameSink>) {
        let mut inner = self.inner.write().await;
        if inner.barrier.is_all_ready() {
            sink.on_tracks(&inner.barrier.tracks());
            if let Some(ring) = &inner.ring {
                for frame in ring.catchup() {
                    if let Err(e) = sink.input_frame(&frame) {
                        tracing::warn!(sink = sink.name(), error = %e, "Catch-up delivery failed");
                        break;
                    }
                }
            }
        }
        let name = sink.name().to_string();
        if inner.sinks.insert(name.clone(), sink).is_some() {
            tracing::debug!(sink = %name, "Replaced existing sink");
        } else {
            tracing::info!(sink = %name, "Sink attached");
        }
    }

    /// Detach a protocol sink by name
    pub async fn detach_sink(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        match inner.sinks.remove(name) {
            Some(mut sink) => {
                sink.on_reset();
                tracing::info!(sink = %name, "Sink detached");
                true
            }
            None => false,
        }
    }

    /// Register the factory used to create recorder sinks
    pub async fn set_recorder_factory(&self, factory: RecorderFactory) {
        self.inner.write().await.recorder_factory = Some(factory);
    }

    /// Register the listener for the all-tracks-ready transition
    pub async fn set_track_listener(&self, listener: Weak<dyn TrackListener>) {
        self.inner.write().await.track_listener = Some(listener);
    }

    /// Register the listener notified when an RTP push session detaches on
    /// its own error path
    pub async fn set_rtp_detach_listener<F>(&self, listener: F)
    where
        F: Fn(&str, &MuxerError) + Send + Sync + 'static,
    {
        self.inner.write().await.rtp_detach_listener = Some(Arc::new(listener));
    }

    /// Start or stop a recorder of the given kind.
    ///
    /// Starting is idempotent: a recorder already running is left alone and
    /// the call reports success. Stopping flushes and removes the recorder;
    /// stopping one that is not running reports false and mutates nothing.
    /// `max_duration` arms an auto-stop timer.
    pub async fn setup_record(
        self: &Arc<Self>,
        kind: RecorderKind,
        start: bool,
        custom_path: Option<PathBuf>,
        max_duration: Option<Duration>,
    ) -> bool {
        if !start {
            return self.stop_record_entry(kind.as_str()).await;
        }

        let mut inner = self.inner.write().await;
        if inner.closed {
            return false;
        }
        if inner.recorders.contains_key(kind.as_str()) {
            return true;
        }
        let path = custom_path.unwrap_or_else(|| self.config.record_root.join(kind.as_str()));
        let params = RecordParams { path, max_duration };
        let mut sink = match inner.recorder_factory.as_ref() {
            Some(factory) => match factory(kind, &params) {
                Ok(sink) => sink,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Recorder creation failed");
                    return false;
                }
            },
            None => {
                tracing::warn!(kind = %kind, "No recorder factory registered");
                return false;
            }
        };

        if inner.barrier.is_all_ready() {
            sink.on_tracks(&inner.barrier.tracks());
            if let Some(ring) = &inner.ring {
                for frame in ring.catchup() {
                    let _ = sink.input_frame(&frame);
                }
            }
        }

        let stop_timer = max_duration
            .map(|after| spawn_record_stop(Arc::downgrade(self), kind.as_str().to_string(), after));
        inner.recorders.insert(
            kind.as_str().to_string(),
            RecorderEntry {
                kind,
                sink,
                stop_timer,
            },
        );
        tracing::info!(kind = %kind, "Recorder started");
        true
    }

    /// Whether any recorder of the given kind is active
    pub async fn is_recording(&self, kind: RecorderKind) -> bool {
        self.inner
            .read()
            .await
            .recorders
            .values()
            .any(|e| e.kind == kind)
    }

    /// Start a windowed MP4 recording: the output opens with the ring
    /// backlog no older than `back_time_ms` and auto-stops after
    /// `forward_time_ms` (0 = record until stopped). Returns the resolved
    /// output path.
    pub async fn start_record(
        self: &Arc<Self>,
        file_path: impl AsRef<Path>,
        back_time_ms: u32,
        forward_time_ms: u32,
    ) -> Result<String, MuxerError> {
        let file_path = file_path.as_ref();
        let path = if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            self.config.record_root.join(file_path)
        };
        let resolved = path.display().to_string();

        let mut inner = self.inner.write().await;
        if inner.closed {
            return Err(MuxerError::Closed);
        }
        if !inner.barrier.is_all_ready() {
            return Err(MuxerError::NotReady);
        }
        if inner.recorders.contains_key(&resolved) {
            return Err(MuxerError::RecorderFailed(format!(
                "already recording to {}",
                resolved
            )));
        }

        let max_duration =
            (forward_time_ms > 0).then(|| Duration::from_millis(forward_time_ms as u64));
        let params = RecordParams {
            path,
            max_duration,
        };
        let factory = inner
            .recorder_factory
            .as_ref()
            .ok_or(MuxerError::NoRecorderFactory)?;
        let mut sink = factory(RecorderKind::Mp4, &params)?;

        sink.on_tracks(&inner.barrier.tracks());
        if let Some(ring) = &inner.ring {
            let min_dts = ring.latest_dts().unwrap_or(0) - back_time_ms as i64;
            for frame in ring.backlog_since(min_dts) {
                let _ = sink.input_frame(&frame);
            }
        }

        let stop_timer = max_duration
            .map(|after| spawn_record_stop(Arc::downgrade(self), resolved.clone(), after));
        inner.recorders.insert(
            resolved.clone(),
            RecorderEntry {
                kind: RecorderKind::Mp4,
                sink,
                stop_timer,
            },
        );
        tracing::info!(
            path = %resolved,
            back_time_ms,
            forward_time_ms,
            "Windowed recording started"
        );
        Ok(resolved)
    }

    /// Start an outbound RTP push session. The result — the bound local
    /// port, or the reason setup failed — is reported through `on_result`
    /// exactly once, after the bind/connect completes.
    pub async fn start_send_rtp<F>(self: &Arc<Self>, args: SendRtpArgs, on_result: F)
    where
        F: FnOnce(Result<u16, MuxerError>) + Send + 'static,
    {
        {
            let inner = self.inner.read().await;
            if inner.closed {
                on_result(Err(MuxerError::Closed));
                return;
            }
            if inner.ring.is_none() {
                on_result(Err(MuxerError::NotReady));
                return;
            }
            if !self.config.allow_duplicate_ssrc && inner.rtp_senders.contains_key(&args.ssrc) {
                on_result(Err(MuxerError::DuplicateSsrc(args.ssrc.clone())));
                return;
            }
        }

        let (sender, local_port) = match RtpSender::connect(&args).await {
            Ok(connected) => connected,
            Err(e) => {
                tracing::warn!(ssrc = %args.ssrc, error = %e, "RTP push setup failed");
                on_result(Err(e));
                return;
            }
        };

        let mut inner = self.inner.write().await;
        if !self.config.allow_duplicate_ssrc && inner.rtp_senders.contains_key(&args.ssrc) {
            on_result(Err(MuxerError::DuplicateSsrc(args.ssrc.clone())));
            return;
        }
        let Some(ring) = &inner.ring else {
            on_result(Err(MuxerError::NotReady));
            return;
        };
        let (rx, catchup) = ring.attach_reader();

        let ssrc = args.ssrc.clone();
        let muxer = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let reason = rtp::sender_loop(sender, catchup, rx).await;
            if let Some(muxer) = muxer.upgrade() {
                muxer.on_rtp_push_detach(&ssrc, local_port, reason).await;
            }
        });
        inner
            .rtp_senders
            .entry(args.ssrc.clone())
            .or_default()
            .push(RtpPushEntry { local_port, handle });
        tracing::info!(ssrc = %args.ssrc, port = local_port, "RTP push started");
        on_result(Ok(local_port));
    }

    /// Stop every RTP push session under the given SSRC; their ring readers
    /// are released before this returns. False if the SSRC is unknown.
    pub async fn stop_send_rtp(&self, ssrc: &str) -> bool {
        let entries = {
            let mut inner = self.inner.write().await;
            inner.rtp_senders.remove(ssrc)
        };
        match entries {
            Some(entries) => {
                for entry in entries {
                    entry.handle.abort();
                    let _ = entry.handle.await;
                }
                tracing::info!(ssrc = %ssrc, "RTP push stopped");
                true
            }
            None => false,
        }
    }

    /// Total readers across the ring (RTP senders hold ring readers) and
    /// every attached sink and recorder
    pub async fn total_reader_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.ring.as_ref().map(|r| r.reader_count()).unwrap_or(0)
            + inner
                .sinks
                .values()
                .map(|s| s.reader_count())
                .sum::<usize>()
            + inner
                .recorders
                .values()
                .map(|e| e.sink.reader_count())
                .sum::<usize>()
    }

    /// Whether the stream is currently converted to any output
    pub async fn is_enabled(&self) -> bool {
        let inner = self.inner.read().await;
        !inner.sinks.is_empty()
            || !inner.recorders.is_empty()
            || !inner.rtp_senders.is_empty()
            || inner
                .ring
                .as_ref()
                .map(|r| r.reader_count() > 0)
                .unwrap_or(false)
    }

    /// Reset per-track state and re-arm the readiness barrier; consumers
    /// are told the source reset but stay attached
    pub async fn reset_tracks(&self) {
        let mut inner = self.inner.write().await;
        inner.mergers.clear();
        inner.stamps.clear();
        inner.barrier.reset();
        for sink in inner.sinks.values_mut() {
            sink.on_reset();
        }
        for entry in inner.recorders.values_mut() {
            entry.sink.on_reset();
        }
        tracing::debug!("Tracks reset");
    }

    /// Close the muxer: drain partially merged units to the consumers,
    /// reset and drop every consumer, stop every RTP push session
    pub async fn close(&self) {
        let senders = {
            let mut inner = self.inner.write().await;
            if inner.closed {
                return;
            }
            inner.closed = true;

            let mut mergers = std::mem::take(&mut inner.mergers);
            for merger in mergers.values_mut() {
                merger.flush();
            }
            inner.drain_pending();
            inner.stamps.clear();

            for (_, mut sink) in inner.sinks.drain() {
                sink.on_reset();
            }
            for (_, mut entry) in inner.recorders.drain() {
                entry.sink.on_reset();
                if let Some(timer) = entry.stop_timer {
                    timer.abort();
                }
            }
            inner.ring = None;
            inner.rtp_senders.drain().collect::<Vec<_>>()
        };
        for (_, entries) in senders {
            for entry in entries {
                entry.handle.abort();
                let _ = entry.handle.await;
            }
        }
        tracing::info!("Muxer closed");
    }

    /// Snapshot of the running counters
    pub async fn stats(&self) -> MuxerStats {
        let inner = self.inner.read().await;
        let mut stats = inner.stats.clone();
        stats.sinks = inner.sinks.len();
        stats.recorders = inner.recorders.len();
        stats.rtp_senders = inner.rtp_senders.values().map(|v| v.len()).sum();
        stats
    }

    async fn stop_record_entry(&self, name: &str) -> bool {
        let entry = {
            let mut inner = self.inner.write().await;
            inner.recorders.remove(name)
        };
        match entry {
            Some(mut entry) => {
                entry.sink.on_reset();
                if let Some(timer) = entry.stop_timer {
                    timer.abort();
                }
                tracing::info!(recorder = %name, "Recorder stopped");
                true
            }
            None => false,
        }
    }

    async fn on_rtp_push_detach(&self, ssrc: &str, local_port: u16, reason: MuxerError) {
        let listener = {
            let mut inner = self.inner.write().await;
            let mut removed = false;
            let mut now_empty = false;
            if let Some(entries) = inner.rtp_senders.get_mut(ssrc) {
                let before = entries.len();
                entries.retain(|e| e.local_port != local_port);
                removed = before != entries.len();
                now_empty = entries.is_empty();
            }
            if now_empty {
                inner.rtp_senders.remove(ssrc);
            }
            if !removed {
                return;
            }
            tracing::warn!(ssrc = %ssrc, reason = %reason, "RTP push detached");
            inner.rtp_detach_listener.clone()
        };
        if let Some(listener) = listener {
            (listener.as_ref())(ssrc, &reason);
        }
    }
}

fn spawn_record_stop(muxer: Weak<MediaMuxer>, name: String, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(muxer) = muxer.upgrade() {
            tracing::info!(recorder = %name, "Recording window elapsed");
            muxer.stop_record_entry(&name).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex as StdMutex;

    use tokio::net::UdpSocket;
    use tokio::sync::oneshot;

    use super::*;

    type Frames = Arc<StdMutex<Vec<MediaFrame>>>;
    type Tracks = Arc<StdMutex<Vec<TrackInfo>>>;

    struct CollectSink {
        name: String,
        frames: Frames,
        tracks: Tracks,
        fail: bool,
        readers: usize,
    }

    impl CollectSink {
        fn new(name: &str) -> (Self, Frames, Tracks) {
            let frames: Frames = Arc::new(StdMutex::new(Vec::new()));
            let tracks: Tracks = Arc::new(StdMutex::new(Vec::new()));
            (
                Self {
                    name: name.to_string(),
                    frames: frames.clone(),
                    tracks: tracks.clone(),
                    fail: false,
                    readers: 0,
                },
                frames,
                tracks,
            )
        }

        fn failing(name: &str) -> Self {
            let (mut sink, _, _) = Self::new(name);
            sink.fail = true;
            sink
        }
    }

    impl FrameSink for CollectSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn on_tracks(&mut self, tracks: &[TrackInfo]) {
            *self.tracks.lock().unwrap() = tracks.to_vec();
        }

        fn input_frame(&mut self, frame: &MediaFrame) -> Result<(), MuxerError> {
            if self.fail {
                return Err(MuxerError::SinkRejected("test sink".into()));
            }
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn reader_count(&self) -> usize {
            self.readers
        }
    }

    fn aac(dts: i64) -> MediaFrame {
        MediaFrame::audio(CodecId::Aac, dts, Bytes::from_static(&[0xFF, 0xF1, 0x50]))
    }

    fn h264_nalu(dts: i64, first_byte: u8) -> MediaFrame {
        let mut v = vec![0, 0, 0, 1, first_byte];
        v.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
        MediaFrame::h264(dts, dts, Bytes::from(v))
    }

    async fn ready_muxer(config: MuxerConfig) -> Arc<MediaMuxer> {
        let muxer = MediaMuxer::new(config);
        muxer.add_track(TrackInfo::new(CodecId::H264)).await;
        muxer.set_track_ready(TrackType::Video).await;
        muxer
    }

    fn collect_factory(frames: Frames) -> RecorderFactory {
        Box::new(move |_kind, params| {
            let (mut sink, _, _) = CollectSink::new(&params.path.display().to_string());
            sink.frames = frames.clone();
            Ok(Box::new(sink) as Box<dyn FrameSink>)
        })
    }

    #[tokio::test]
    async fn test_no_delivery_until_all_tracks_ready() {
        let muxer = MediaMuxer::new(MuxerConfig::default());
        muxer.add_track(TrackInfo::new(CodecId::H264)).await;
        muxer.add_track(TrackInfo::new(CodecId::Aac)).await;

        let (sink, frames, _) = CollectSink::new("rtmp");
        muxer.attach_sink(Box::new(sink)).await;

        muxer.set_track_ready(TrackType::Video).await;
        assert!(!muxer.input_frame(aac(0)).await);
        assert!(!muxer.input_frame(aac(20)).await);
        assert!(frames.lock().unwrap().is_empty());

        muxer.set_track_ready(TrackType::Audio).await;
        assert!(muxer.input_frame(aac(40)).await);
        assert_eq!(frames.lock().unwrap().len(), 1);

        let stats = muxer.stats().await;
        assert_eq!(stats.dropped_pre_ready, 2);
        assert_eq!(stats.units_out, 1);
    }

    #[tokio::test]
    async fn test_tracks_announced_before_frames() {
        let muxer = MediaMuxer::new(MuxerConfig::default());
        muxer.add_track(TrackInfo::new(CodecId::H264)).await;

        let (sink, _, tracks) = CollectSink::new("rtsp");
        muxer.attach_sink(Box::new(sink)).await;
        assert!(tracks.lock().unwrap().is_empty());

        muxer.set_track_ready(TrackType::Video).await;
        let seen = tracks.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].codec, CodecId::H264);
    }

    #[tokio::test]
    async fn test_track_listener_fires_once() {
        struct Flag(AtomicBool);
        impl TrackListener for Flag {
            fn on_all_track_ready(&self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let muxer = MediaMuxer::new(MuxerConfig::default());
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let listener: Arc<dyn TrackListener> = flag.clone();
        muxer.set_track_listener(Arc::downgrade(&listener)).await;

        muxer.add_track(TrackInfo::new(CodecId::H264)).await;
        assert!(muxer.set_track_ready(TrackType::Video).await);
        assert!(flag.0.load(Ordering::SeqCst));

        // Repeat readiness is a no-op
        assert!(!muxer.set_track_ready(TrackType::Video).await);
    }

    #[tokio::test]
    async fn test_sink_failure_is_isolated() {
        let muxer = ready_muxer(MuxerConfig::default()).await;

        let (sink, frames, _) = CollectSink::new("healthy");
        muxer.attach_sink(Box::new(sink)).await;
        muxer.attach_sink(Box::new(CollectSink::failing("broken"))).await;

        muxer.input_frame(aac(0)).await;
        assert_eq!(frames.lock().unwrap().len(), 1);

        // The broken sink was detached; the healthy one keeps receiving
        muxer.input_frame(aac(20)).await;
        assert_eq!(frames.lock().unwrap().len(), 2);

        let stats = muxer.stats().await;
        assert_eq!(stats.sink_errors, 1);
        assert_eq!(stats.sinks, 1);
    }

    #[tokio::test]
    async fn test_merge_path_delivers_whole_units() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let (sink, frames, _) = CollectSink::new("rtmp");
        muxer.attach_sink(Box::new(sink)).await;

        muxer.input_frame(h264_nalu(0, 0x67)).await; // SPS
        muxer.input_frame(h264_nalu(0, 0x68)).await; // PPS
        muxer.input_frame(h264_nalu(0, 0x65)).await; // IDR
        assert!(frames.lock().unwrap().is_empty());

        // Next unit boundary flushes the first access unit
        muxer.input_frame(h264_nalu(40, 0x41)).await;
        let out = frames.lock().unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].keyframe());
        assert_eq!(out[0].dts(), 0);
        assert_eq!(out[0].size(), 24);
    }

    #[tokio::test]
    async fn test_late_sink_gets_keyframe_aligned_catchup() {
        let muxer = ready_muxer(MuxerConfig::default()).await;

        muxer.input_frame(h264_nalu(0, 0x65)).await;
        muxer.input_frame(h264_nalu(40, 0x41)).await; // flushes IDR unit
        muxer.input_frame(h264_nalu(80, 0x41)).await; // flushes P unit

        let (sink, frames, tracks) = CollectSink::new("late");
        muxer.attach_sink(Box::new(sink)).await;

        let out = frames.lock().unwrap();
        assert!(!out.is_empty());
        assert!(out[0].keyframe());
        assert_eq!(tracks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_recorder_never_started_is_false() {
        let muxer = ready_muxer(MuxerConfig::default()).await;

        let before = muxer.stats().await;
        assert!(!muxer.setup_record(RecorderKind::Mp4, false, None, None).await);

        let after = muxer.stats().await;
        assert_eq!(before.recorders, after.recorders);
        assert!(!muxer.is_recording(RecorderKind::Mp4).await);
    }

    #[tokio::test]
    async fn test_setup_record_without_factory_fails() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        assert!(!muxer.setup_record(RecorderKind::Mp4, true, None, None).await);
    }

    #[tokio::test]
    async fn test_setup_record_lifecycle() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let frames: Frames = Arc::new(StdMutex::new(Vec::new()));
        muxer.set_recorder_factory(collect_factory(frames.clone())).await;

        assert!(muxer.setup_record(RecorderKind::Mp4, true, None, None).await);
        assert!(muxer.is_recording(RecorderKind::Mp4).await);
        // Idempotent start
        assert!(muxer.setup_record(RecorderKind::Mp4, true, None, None).await);
        assert_eq!(muxer.stats().await.recorders, 1);

        muxer.input_frame(aac(0)).await;
        assert_eq!(frames.lock().unwrap().len(), 1);

        assert!(muxer.setup_record(RecorderKind::Mp4, false, None, None).await);
        assert!(!muxer.is_recording(RecorderKind::Mp4).await);
        assert!(!muxer.setup_record(RecorderKind::Mp4, false, None, None).await);

        // Detached recorder no longer receives
        muxer.input_frame(aac(20)).await;
        assert_eq!(frames.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_start_record_resolves_path_and_seeds_backlog() {
        let config = MuxerConfig::default().record_root("/tmp/livemux-test");
        let muxer = MediaMuxer::new(config);
        muxer.add_track(TrackInfo::new(CodecId::Aac)).await;
        muxer.set_track_ready(TrackType::Audio).await;

        let frames: Frames = Arc::new(StdMutex::new(Vec::new()));
        muxer.set_recorder_factory(collect_factory(frames.clone())).await;

        muxer.input_frame(aac(0)).await;
        muxer.input_frame(aac(20)).await;
        muxer.input_frame(aac(40)).await;

        let path = muxer.start_record("clip.mp4", 10_000, 0).await.unwrap();
        assert_eq!(path, "/tmp/livemux-test/clip.mp4");
        // The whole backlog fell inside the back-time window
        assert_eq!(frames.lock().unwrap().len(), 3);

        // Live frames keep flowing into the windowed recording
        muxer.input_frame(aac(60)).await;
        assert_eq!(frames.lock().unwrap().len(), 4);

        // Second recording to the same path is refused
        assert!(muxer.start_record("clip.mp4", 0, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_start_record_requires_ready_tracks() {
        let muxer = MediaMuxer::new(MuxerConfig::default());
        muxer.add_track(TrackInfo::new(CodecId::Aac)).await;
        let frames: Frames = Arc::new(StdMutex::new(Vec::new()));
        muxer.set_recorder_factory(collect_factory(frames)).await;

        let err = muxer.start_record("clip.mp4", 0, 0).await.err().unwrap();
        assert_eq!(err, MuxerError::NotReady);
    }

    #[tokio::test]
    async fn test_start_stop_send_rtp_leaves_reader_count_unchanged() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dst_port = receiver.local_addr().unwrap().port();

        let before = muxer.total_reader_count().await;

        let (tx, rx) = oneshot::channel();
        muxer
            .start_send_rtp(SendRtpArgs::new("127.0.0.1", dst_port, "9001"), move |res| {
                tx.send(res).unwrap();
            })
            .await;
        let port = rx.await.unwrap().unwrap();
        assert_ne!(port, 0);
        assert_eq!(muxer.total_reader_count().await, before + 1);

        assert!(muxer.stop_send_rtp("9001").await);
        assert_eq!(muxer.total_reader_count().await, before);
        assert!(!muxer.stop_send_rtp("9001").await);
    }

    #[tokio::test]
    async fn test_duplicate_ssrc_rejected() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dst_port = receiver.local_addr().unwrap().port();

        let (tx, rx) = oneshot::channel();
        muxer
            .start_send_rtp(SendRtpArgs::new("127.0.0.1", dst_port, "7"), move |res| {
                tx.send(res).unwrap();
            })
            .await;
        rx.await.unwrap().unwrap();

        let (tx, rx) = oneshot::channel();
        muxer
            .start_send_rtp(SendRtpArgs::new("127.0.0.1", dst_port, "7"), move |res| {
                tx.send(res).unwrap();
            })
            .await;
        assert!(matches!(
            rx.await.unwrap(),
            Err(MuxerError::DuplicateSsrc(_))
        ));
    }

    #[tokio::test]
    async fn test_send_rtp_before_ready_fails() {
        let muxer = MediaMuxer::new(MuxerConfig::default());
        let (tx, rx) = oneshot::channel();
        muxer
            .start_send_rtp(SendRtpArgs::new("127.0.0.1", 1, "5"), move |res| {
                tx.send(res).unwrap();
            })
            .await;
        assert!(matches!(rx.await.unwrap(), Err(MuxerError::NotReady)));
    }

    #[tokio::test]
    async fn test_two_rtp_sessions_receive_independently() {
        let muxer = ready_muxer(MuxerConfig::default()).await;

        let recv_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let recv_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port_a = recv_a.local_addr().unwrap().port();
        let port_b = recv_b.local_addr().unwrap().port();

        for (port, ssrc) in [(port_a, "101"), (port_b, "102")] {
            let (tx, rx) = oneshot::channel();
            muxer
                .start_send_rtp(SendRtpArgs::new("127.0.0.1", port, ssrc), move |res| {
                    tx.send(res).unwrap();
                })
                .await;
            rx.await.unwrap().unwrap();
        }

        muxer.input_frame(aac(0)).await;

        let mut buf = [0u8; 2048];
        for socket in [&recv_a, &recv_b] {
            let n = tokio::time::timeout(Duration::from_secs(1), socket.recv(&mut buf))
                .await
                .expect("session did not receive the frame")
                .unwrap();
            assert!(n > 12);
        }
    }

    #[tokio::test]
    async fn test_is_enabled_reflects_consumers() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        assert!(!muxer.is_enabled().await);

        let (sink, _, _) = CollectSink::new("rtmp");
        muxer.attach_sink(Box::new(sink)).await;
        assert!(muxer.is_enabled().await);

        assert!(muxer.detach_sink("rtmp").await);
        assert!(!muxer.is_enabled().await);
        assert!(!muxer.detach_sink("rtmp").await);
    }

    #[tokio::test]
    async fn test_total_reader_count_includes_sink_readers() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let (mut sink, _, _) = CollectSink::new("rtsp");
        sink.readers = 3;
        muxer.attach_sink(Box::new(sink)).await;

        assert_eq!(muxer.total_reader_count().await, 3);
    }

    #[tokio::test]
    async fn test_close_stops_everything() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let (sink, frames, _) = CollectSink::new("rtmp");
        muxer.attach_sink(Box::new(sink)).await;

        // A partially merged unit is drained to consumers on close
        muxer.input_frame(h264_nalu(0, 0x65)).await;
        muxer.close().await;
        assert_eq!(frames.lock().unwrap().len(), 1);

        assert!(!muxer.input_frame(aac(40)).await);
        assert!(!muxer.is_enabled().await);
    }

    #[tokio::test]
    async fn test_reset_tracks_rearms_barrier() {
        let muxer = ready_muxer(MuxerConfig::default()).await;
        let (sink, frames, _) = CollectSink::new("rtmp");
        muxer.attach_sink(Box::new(sink)).await;

        muxer.reset_tracks().await;

        // Delivery is gated again until the new track set completes
        assert!(!muxer.input_frame(aac(0)).await);
        assert!(frames.lock().unwrap().is_empty());

        muxer.add_track(TrackInfo::new(CodecId::Aac)).await;
        muxer.set_track_ready(TrackType::Audio).await;
        assert!(muxer.input_frame(aac(20)).await);
        assert_eq!(frames.lock().unwrap().len(), 1);
    }
}
