//! Outbound RTP push sessions
//!
//! Each push session holds its own ring-buffer reader and runs on its own
//! task: the hot frame path only writes the ring and never waits on a
//! remote endpoint. Merged units are packetized into plain RTP (RFC 3550
//! fixed header, RFC 4571 length framing on TCP) and pushed to the
//! configured destination until the session is stopped or errors out.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::broadcast;

use crate::media::frame::MediaFrame;
use crate::muxer::error::MuxerError;

/// Payload bytes per RTP packet
const MAX_PAYLOAD: usize = 1400;

/// A send stalled this long is classified as a timeout
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Media clock for the RTP timestamp field
const CLOCK_HZ_PER_MS: u64 = 90;

/// Destination and framing parameters for one RTP push session
#[derive(Debug, Clone)]
pub struct SendRtpArgs {
    /// Target host or address
    pub dst_url: String,
    /// Target port
    pub dst_port: u16,
    /// Session key; parsed as a decimal u32 for the wire
    pub ssrc: String,
    /// UDP (default) or TCP with RFC 4571 framing
    pub is_udp: bool,
    /// Local source port (0 = ephemeral)
    pub src_port: u16,
    /// RTP payload type
    pub payload_type: u8,
}

impl SendRtpArgs {
    pub fn new(dst_url: impl Into<String>, dst_port: u16, ssrc: impl Into<String>) -> Self {
        Self {
            dst_url: dst_url.into(),
            dst_port,
            ssrc: ssrc.into(),
            is_udp: true,
            src_port: 0,
            payload_type: 96,
        }
    }

    /// Use TCP instead of UDP
    pub fn tcp(mut self) -> Self {
        self.is_udp = false;
        self
    }

    /// Set the local source port
    pub fn src_port(mut self, port: u16) -> Self {
        self.src_port = port;
        self
    }

    /// Set the RTP payload type
    pub fn payload_type(mut self, pt: u8) -> Self {
        self.payload_type = pt;
        self
    }
}

enum RtpTransport {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

/// Connected outbound RTP writer for one SSRC
pub(crate) struct RtpSender {
    ssrc: u32,
    payload_type: u8,
    seq: u16,
    transport: RtpTransport,
}

impl RtpSender {
    /// Bind/connect per `args`; returns the sender and its bound local port
    pub(crate) async fn connect(args: &SendRtpArgs) -> Result<(Self, u16), MuxerError> {
        let ssrc: u32 = args
            .ssrc
            .parse()
            .map_err(|_| MuxerError::InvalidSsrc(args.ssrc.clone()))?;

        let (transport, local_port) = if args.is_udp {
            let socket = UdpSocket::bind(("0.0.0.0", args.src_port))
                .await
                .map_err(|e| MuxerError::Bind(e.to_string()))?;
            socket
                .connect((args.dst_url.as_str(), args.dst_port))
                .await
                .map_err(|e| MuxerError::Connect(e.to_string()))?;
            let port = socket
                .local_addr()
                .map_err(|e| MuxerError::Bind(e.to_string()))?
                .port();
            (RtpTransport::Udp(socket), port)
        } else {
            let stream = TcpStream::connect((args.dst_url.as_str(), args.dst_port))
                .await
                .map_err(|e| MuxerError::Connect(e.to_string()))?;
            let port = stream
                .local_addr()
                .map_err(|e| MuxerError::Connect(e.to_string()))?
                .port();
            (RtpTransport::Tcp(stream), port)
        };

        Ok((
            Self {
                ssrc,
                payload_type: args.payload_type,
                seq: 0,
                transport,
            },
            local_port,
        ))
    }

    pub(crate) fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Packetize and push one merged unit
    pub(crate) async fn send_frame(&mut self, frame: &MediaFrame) -> Result<(), MuxerError> {
        let data = frame.data();
        if data.is_empty() {
            return Ok(());
        }
        let timestamp = (frame.dts().max(0) as u64 * CLOCK_HZ_PER_MS) as u32;
        let chunks = data.len().div_ceil(MAX_PAYLOAD);
        for (i, chunk) in data.chunks(MAX_PAYLOAD).enumerate() {
            let marker = i + 1 == chunks;
            let packet = self.packetize(timestamp, marker, chunk);
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    fn packetize(&mut self, timestamp: u32, marker: bool, payload: &[u8]) -> Bytes {
        let mut packet = BytesMut::with_capacity(12 + payload.len());
        packet.put_u8(0x80); // V=2, no padding/extension/CSRC
        packet.put_u8(if marker {
            0x80 | self.payload_type
        } else {
            self.payload_type
        });
        packet.put_u16(self.seq);
        self.seq = self.seq.wrapping_add(1);
        packet.put_u32(timestamp);
        packet.put_u32(self.ssrc);
        packet.extend_from_slice(payload);
        packet.freeze()
    }

    async fn send_packet(&mut self, packet: &[u8]) -> Result<(), MuxerError> {
        let send = async {
            match &mut self.transport {
                RtpTransport::Udp(socket) => socket.send(packet).await.map(|_| ()),
                RtpTransport::Tcp(stream) => {
                    // RFC 4571: 2-byte length before each packet
                    stream.write_all(&(packet.len() as u16).to_be_bytes()).await?;
                    stream.write_all(packet).await
                }
            }
        };
        match tokio::time::timeout(SEND_TIMEOUT, send).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(MuxerError::SendFailed(e.to_string())),
            Err(_) => Err(MuxerError::Timeout),
        }
    }
}

/// Drive one push session: catch-up backlog first, then the live cursor.
/// Returns the detach reason once the session ends.
pub(crate) async fn sender_loop(
    mut sender: RtpSender,
    catchup: Vec<MediaFrame>,
    mut rx: broadcast::Receiver<MediaFrame>,
) -> MuxerError {
    for frame in catchup {
        if let Err(e) = sender.send_frame(&frame).await {
            return e;
        }
    }
    loop {
        match rx.recv().await {
            Ok(frame) => {
                if let Err(e) = sender.send_frame(&frame).await {
                    return e;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(
                    ssrc = sender.ssrc(),
                    skipped = skipped,
                    "RTP push fell behind the stream"
                );
                return MuxerError::Lagged;
            }
            Err(broadcast::error::RecvError::Closed) => return MuxerError::Closed,
        }
    }
}
