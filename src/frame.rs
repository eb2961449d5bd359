//! Wire codec for the ARQ data-link protocol.
//!
//! Every frame is a fixed-size byte block whose first byte is the type
//! code; the remaining bytes are positional fields, zero-padded to the
//! carrier mode's frame size. There are no delimiters and no length
//! field — a received frame's size is implied by the mode that carried it.
//!
//! ```text
//! [u8 type] [positional fields...] [zero padding to mode size]
//! ```
//!
//! Type codes (wire order):
//! - `10..=50`: burst data, frame index embedded as `type - 10`
//! - `60..=64`: burst/frame ACK, repeat request, NACKs
//! - `200/201`: CQ / QRV broadcast
//! - `210/211`: PING / PING-ACK
//! - `221..=223`: session open / heartbeat / close
//! - `225..=228`: data channel open + response (high/low bandwidth)
//! - `230..=240`: manual-mode data channel open
//! - `249`: stop transmission, `250`: beacon, `255`: test frame
//!
//! The codec validates structure only; semantic checks (destination CRC,
//! session state) belong to the dispatcher.

use bytes::Bytes;

use crate::callsign::{decode_grid, encode_grid, Callsign};
use crate::constants::RPT_MAX_MISSING;

/// First data-frame type code; the frame's burst index is `type - DATA_BASE`.
pub const DATA_BASE: u8 = 10;

/// Last data-frame type code, bounding bursts to 41 frames.
pub const DATA_MAX: u8 = 50;

/// Byte length of the fixed-layout signalling frames.
pub const SIGNALLING_FRAME_LEN: usize = 14;

/// Byte offset of the payload within a data frame.
pub const DATA_HEADER_LEN: usize = 8;

/// Frame type constants for the signalling frames.
pub mod frame_type {
    pub const BURST_ACK: u8 = 60;
    pub const FRAME_ACK: u8 = 61;
    pub const RPT_REQUEST: u8 = 62;
    pub const BURST_NACK: u8 = 63;
    pub const BURST_NACK_WATCHDOG: u8 = 64;
    pub const CQ: u8 = 200;
    pub const QRV: u8 = 201;
    pub const PING: u8 = 210;
    pub const PING_ACK: u8 = 211;
    pub const SESSION_OPEN: u8 = 221;
    pub const SESSION_HEARTBEAT: u8 = 222;
    pub const SESSION_CLOSE: u8 = 223;
    pub const CHANNEL_OPEN_HIGH: u8 = 225;
    pub const CHANNEL_ACK_HIGH: u8 = 226;
    pub const CHANNEL_OPEN_LOW: u8 = 227;
    pub const CHANNEL_ACK_LOW: u8 = 228;
    pub const CHANNEL_OPEN_MANUAL_MIN: u8 = 230;
    pub const CHANNEL_OPEN_MANUAL_MAX: u8 = 240;
    pub const STOP: u8 = 249;
    pub const BEACON: u8 = 250;
    pub const TEST: u8 = 255;
}

/// Bandwidth profile requested or granted by a data-channel open exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandwidthProfile {
    /// Three data modes, wide audio passband.
    High,
    /// Two data modes, 500 Hz passband.
    Low,
    /// Operator-forced single mode; the type byte carries the mode code.
    Manual(u8),
}

/// Errors from decoding a received byte block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame shorter than its layout requires.
    TooShort { frame_type: u8, len: usize },
    /// First byte is not a known type code.
    UnknownType(u8),
    /// A callsign field did not decode to a valid station.
    BadCallsign,
    /// A grid field did not decode to a valid locator.
    BadGrid,
    /// Data frame announced an impossible burst geometry.
    BadBurstGeometry { index: u8, n_frames: u8 },
}

impl std::fmt::Display for FrameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { frame_type, len } => {
                write!(f, "frame type {frame_type} too short: {len} bytes")
            }
            Self::UnknownType(t) => write!(f, "unknown frame type {t}"),
            Self::BadCallsign => write!(f, "invalid callsign field"),
            Self::BadGrid => write!(f, "invalid grid field"),
            Self::BadBurstGeometry { index, n_frames } => {
                write!(f, "frame index {index} outside burst of {n_frames}")
            }
        }
    }
}

impl std::error::Error for FrameError {}

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One data frame of a burst. `index` is zero-based within the burst.
    BurstData {
        index: u8,
        n_frames: u8,
        dxcrc: [u8; 3],
        mycrc: [u8; 3],
        payload: Bytes,
    },

    /// Burst acknowledged; carries the receiver's SNR and requested speed.
    BurstAck { dxcrc: [u8; 3], mycrc: [u8; 3], snr: u8, speed_level: u8 },

    /// Whole transfer acknowledged.
    FrameAck { dxcrc: [u8; 3], mycrc: [u8; 3], snr: u8, speed_level: u8 },

    /// Repeat request listing missing burst indices (1-based, up to 6).
    RptRequest { dxcrc: [u8; 3], mycrc: [u8; 3], missing: Vec<u8> },

    /// Burst negative-acknowledged (CRC failure on reassembly).
    BurstNack { dxcrc: [u8; 3], mycrc: [u8; 3], snr: u8, speed_level: u8 },

    /// Burst negative-acknowledged by the receive watchdog (timeout).
    BurstNackWatchdog { dxcrc: [u8; 3], mycrc: [u8; 3], snr: u8, speed_level: u8 },

    /// General call broadcast.
    Cq { callsign: Callsign, grid: String },

    /// "Ready to receive" reply to a CQ.
    Qrv { callsign: Callsign, grid: String },

    /// Directed ping.
    Ping { dxcrc: [u8; 3], mycrc: [u8; 3], callsign: Callsign },

    /// Ping response carrying the responder's grid.
    PingAck { dxcrc: [u8; 3], mycrc: [u8; 3], grid: String },

    /// Session open request.
    SessionOpen { dxcrc: [u8; 3], mycrc: [u8; 3], callsign: Callsign },

    /// Session keepalive.
    SessionHeartbeat { dxcrc: [u8; 3], mycrc: [u8; 3] },

    /// Session close.
    SessionClose { dxcrc: [u8; 3], mycrc: [u8; 3], callsign: Callsign },

    /// Data channel open request.
    ChannelOpen {
        profile: BandwidthProfile,
        dxcrc: [u8; 3],
        mycrc: [u8; 3],
        callsign: Callsign,
        n_frames_per_burst: u8,
    },

    /// Data channel open response; last byte carries the protocol version.
    ChannelOpenAck {
        profile: BandwidthProfile,
        dxcrc: [u8; 3],
        mycrc: [u8; 3],
        protocol_version: u8,
    },

    /// Remote stop of a running transmission.
    Stop { dxcrc: [u8; 3], mycrc: [u8; 3], callsign: Callsign },

    /// Periodic beacon with raw 4-character grid square.
    Beacon { callsign: Callsign, grid: String },

    /// Padding-only test frame.
    Test,
}

impl Frame {
    /// The wire type code of this frame.
    pub fn type_code(&self) -> u8 {
        match self {
            Frame::BurstData { index, .. } => DATA_BASE + index,
            Frame::BurstAck { .. } => frame_type::BURST_ACK,
            Frame::FrameAck { .. } => frame_type::FRAME_ACK,
            Frame::RptRequest { .. } => frame_type::RPT_REQUEST,
            Frame::BurstNack { .. } => frame_type::BURST_NACK,
            Frame::BurstNackWatchdog { .. } => frame_type::BURST_NACK_WATCHDOG,
            Frame::Cq { .. } => frame_type::CQ,
            Frame::Qrv { .. } => frame_type::QRV,
            Frame::Ping { .. } => frame_type::PING,
            Frame::PingAck { .. } => frame_type::PING_ACK,
            Frame::SessionOpen { .. } => frame_type::SESSION_OPEN,
            Frame::SessionHeartbeat { .. } => frame_type::SESSION_HEARTBEAT,
            Frame::SessionClose { .. } => frame_type::SESSION_CLOSE,
            Frame::ChannelOpen { profile, .. } => match profile {
                BandwidthProfile::High => frame_type::CHANNEL_OPEN_HIGH,
                BandwidthProfile::Low => frame_type::CHANNEL_OPEN_LOW,
                BandwidthProfile::Manual(mode) => *mode,
            },
            Frame::ChannelOpenAck { profile, .. } => match profile {
                BandwidthProfile::Low => frame_type::CHANNEL_ACK_LOW,
                _ => frame_type::CHANNEL_ACK_HIGH,
            },
            Frame::Stop { .. } => frame_type::STOP,
            Frame::Beacon { .. } => frame_type::BEACON,
            Frame::Test => frame_type::TEST,
        }
    }

    /// Encode this frame into its exact positional layout.
    ///
    /// Signalling frames come out at [`SIGNALLING_FRAME_LEN`] bytes; data
    /// frames at header + payload length. Padding to the carrier mode's
    /// frame size happens at the transmit gateway.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::BurstData { index, n_frames, dxcrc, mycrc, payload } => {
                let mut buf = Vec::with_capacity(DATA_HEADER_LEN + payload.len());
                buf.push(DATA_BASE + index);
                buf.push(*n_frames);
                buf.extend_from_slice(dxcrc);
                buf.extend_from_slice(mycrc);
                buf.extend_from_slice(payload);
                buf
            }
            Frame::BurstAck { dxcrc, mycrc, snr, speed_level }
            | Frame::FrameAck { dxcrc, mycrc, snr, speed_level }
            | Frame::BurstNack { dxcrc, mycrc, snr, speed_level }
            | Frame::BurstNackWatchdog { dxcrc, mycrc, snr, speed_level } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                buf[7] = *snr;
                buf[8] = *speed_level;
                buf
            }
            Frame::RptRequest { dxcrc, mycrc, missing } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                for (slot, idx) in buf[7..7 + RPT_MAX_MISSING]
                    .iter_mut()
                    .zip(missing.iter())
                {
                    *slot = *idx;
                }
                buf
            }
            Frame::Cq { callsign, grid } | Frame::Qrv { callsign, grid } => {
                let mut buf = vec![0u8; SIGNALLING_FRAME_LEN];
                buf[0] = self.type_code();
                buf[1..7].copy_from_slice(&callsign.to_bytes());
                // Structure was validated when the frame was built.
                let packed = encode_grid(grid).unwrap_or([0u8; 4]);
                buf[7..11].copy_from_slice(&packed);
                buf
            }
            Frame::Ping { dxcrc, mycrc, callsign } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                buf[7..13].copy_from_slice(&callsign.to_bytes());
                buf
            }
            Frame::PingAck { dxcrc, mycrc, grid } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                let ascii = grid.as_bytes();
                let n = ascii.len().min(6);
                buf[7..7 + n].copy_from_slice(&ascii[..n]);
                buf
            }
            Frame::SessionOpen { dxcrc, mycrc, callsign }
            | Frame::SessionClose { dxcrc, mycrc, callsign }
            | Frame::Stop { dxcrc, mycrc, callsign } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                buf[7..13].copy_from_slice(&callsign.to_bytes());
                buf
            }
            Frame::SessionHeartbeat { dxcrc, mycrc } => signalling(self.type_code(), dxcrc, mycrc),
            Frame::ChannelOpen { dxcrc, mycrc, callsign, n_frames_per_burst, .. } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                buf[7..13].copy_from_slice(&callsign.to_bytes());
                buf[13] = *n_frames_per_burst;
                buf
            }
            Frame::ChannelOpenAck { dxcrc, mycrc, protocol_version, .. } => {
                let mut buf = signalling(self.type_code(), dxcrc, mycrc);
                buf[13] = *protocol_version;
                buf
            }
            Frame::Beacon { callsign, grid } => {
                let mut buf = vec![0u8; SIGNALLING_FRAME_LEN];
                buf[0] = self.type_code();
                buf[1..7].copy_from_slice(&callsign.to_bytes());
                let ascii = grid.as_bytes();
                let n = ascii.len().min(4);
                buf[9..9 + n].copy_from_slice(&ascii[..n]);
                buf
            }
            Frame::Test => {
                let mut buf = vec![0u8; SIGNALLING_FRAME_LEN];
                buf[0] = self.type_code();
                buf
            }
        }
    }

    /// Decode a received byte block into a frame.
    ///
    /// Trailing zero padding is part of the input; data-frame payloads
    /// keep it (the reassembly layer strips it via the transfer length).
    pub fn decode(bytes: &[u8]) -> Result<Frame, FrameError> {
        let frame_type = *bytes.first().ok_or(FrameError::UnknownType(0))?;

        match frame_type {
            DATA_BASE..=DATA_MAX => {
                if bytes.len() <= DATA_HEADER_LEN {
                    return Err(FrameError::TooShort { frame_type, len: bytes.len() });
                }
                let index = frame_type - DATA_BASE;
                let n_frames = bytes[1];
                if n_frames == 0 || index >= n_frames {
                    return Err(FrameError::BadBurstGeometry { index, n_frames });
                }
                Ok(Frame::BurstData {
                    index,
                    n_frames,
                    dxcrc: crc_at(bytes, 2),
                    mycrc: crc_at(bytes, 5),
                    payload: Bytes::copy_from_slice(&bytes[DATA_HEADER_LEN..]),
                })
            }
            frame_type::BURST_ACK
            | frame_type::FRAME_ACK
            | frame_type::BURST_NACK
            | frame_type::BURST_NACK_WATCHDOG => {
                check_len(frame_type, bytes, 9)?;
                let dxcrc = crc_at(bytes, 1);
                let mycrc = crc_at(bytes, 4);
                let snr = bytes[7];
                let speed_level = bytes[8];
                Ok(match frame_type {
                    frame_type::BURST_ACK => Frame::BurstAck { dxcrc, mycrc, snr, speed_level },
                    frame_type::FRAME_ACK => Frame::FrameAck { dxcrc, mycrc, snr, speed_level },
                    frame_type::BURST_NACK => Frame::BurstNack { dxcrc, mycrc, snr, speed_level },
                    _ => Frame::BurstNackWatchdog { dxcrc, mycrc, snr, speed_level },
                })
            }
            frame_type::RPT_REQUEST => {
                check_len(frame_type, bytes, 13)?;
                let missing = bytes[7..13].iter().copied().filter(|b| *b != 0).collect();
                Ok(Frame::RptRequest {
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                    missing,
                })
            }
            frame_type::CQ | frame_type::QRV => {
                check_len(frame_type, bytes, 11)?;
                let callsign =
                    Callsign::from_bytes(&bytes[1..7]).map_err(|_| FrameError::BadCallsign)?;
                let grid = decode_grid(&bytes[7..11]).map_err(|_| FrameError::BadGrid)?;
                Ok(if frame_type == frame_type::CQ {
                    Frame::Cq { callsign, grid }
                } else {
                    Frame::Qrv { callsign, grid }
                })
            }
            frame_type::PING => {
                check_len(frame_type, bytes, 13)?;
                Ok(Frame::Ping {
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                    callsign: Callsign::from_bytes(&bytes[7..13])
                        .map_err(|_| FrameError::BadCallsign)?,
                })
            }
            frame_type::PING_ACK => {
                check_len(frame_type, bytes, 13)?;
                Ok(Frame::PingAck {
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                    grid: ascii_field(&bytes[7..13]),
                })
            }
            frame_type::SESSION_OPEN | frame_type::SESSION_CLOSE | frame_type::STOP => {
                check_len(frame_type, bytes, 13)?;
                let dxcrc = crc_at(bytes, 1);
                let mycrc = crc_at(bytes, 4);
                let callsign =
                    Callsign::from_bytes(&bytes[7..13]).map_err(|_| FrameError::BadCallsign)?;
                Ok(match frame_type {
                    frame_type::SESSION_OPEN => Frame::SessionOpen { dxcrc, mycrc, callsign },
                    frame_type::SESSION_CLOSE => Frame::SessionClose { dxcrc, mycrc, callsign },
                    _ => Frame::Stop { dxcrc, mycrc, callsign },
                })
            }
            frame_type::SESSION_HEARTBEAT => {
                check_len(frame_type, bytes, 7)?;
                Ok(Frame::SessionHeartbeat {
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                })
            }
            frame_type::CHANNEL_OPEN_HIGH
            | frame_type::CHANNEL_OPEN_LOW
            | frame_type::CHANNEL_OPEN_MANUAL_MIN..=frame_type::CHANNEL_OPEN_MANUAL_MAX => {
                check_len(frame_type, bytes, 14)?;
                let profile = match frame_type {
                    frame_type::CHANNEL_OPEN_HIGH => BandwidthProfile::High,
                    frame_type::CHANNEL_OPEN_LOW => BandwidthProfile::Low,
                    mode => BandwidthProfile::Manual(mode),
                };
                Ok(Frame::ChannelOpen {
                    profile,
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                    callsign: Callsign::from_bytes(&bytes[7..13])
                        .map_err(|_| FrameError::BadCallsign)?,
                    n_frames_per_burst: bytes[13],
                })
            }
            frame_type::CHANNEL_ACK_HIGH | frame_type::CHANNEL_ACK_LOW => {
                check_len(frame_type, bytes, 14)?;
                let profile = if frame_type == frame_type::CHANNEL_ACK_LOW {
                    BandwidthProfile::Low
                } else {
                    BandwidthProfile::High
                };
                Ok(Frame::ChannelOpenAck {
                    profile,
                    dxcrc: crc_at(bytes, 1),
                    mycrc: crc_at(bytes, 4),
                    protocol_version: bytes[13],
                })
            }
            frame_type::BEACON => {
                check_len(frame_type, bytes, 13)?;
                Ok(Frame::Beacon {
                    callsign: Callsign::from_bytes(&bytes[1..7])
                        .map_err(|_| FrameError::BadCallsign)?,
                    grid: ascii_field(&bytes[9..13]),
                })
            }
            frame_type::TEST => Ok(Frame::Test),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

/// Fresh signalling frame with type and both CRC tags filled in.
fn signalling(frame_type: u8, dxcrc: &[u8; 3], mycrc: &[u8; 3]) -> Vec<u8> {
    let mut buf = vec![0u8; SIGNALLING_FRAME_LEN];
    buf[0] = frame_type;
    buf[1..4].copy_from_slice(dxcrc);
    buf[4..7].copy_from_slice(mycrc);
    buf
}

fn crc_at(bytes: &[u8], offset: usize) -> [u8; 3] {
    [bytes[offset], bytes[offset + 1], bytes[offset + 2]]
}

fn check_len(frame_type: u8, bytes: &[u8], needed: usize) -> Result<(), FrameError> {
    if bytes.len() < needed {
        Err(FrameError::TooShort { frame_type, len: bytes.len() })
    } else {
        Ok(())
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(s: &str) -> Callsign {
        Callsign::parse(s).unwrap()
    }

    fn round_trip(frame: Frame) {
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded).unwrap();
        assert_eq!(decoded, frame, "round trip failed for {frame:?}");
    }

    #[test]
    fn test_signalling_round_trips() {
        let dxcrc = call("AA1AA").crc();
        let mycrc = call("BB2BB").crc();

        round_trip(Frame::BurstAck { dxcrc, mycrc, snr: 12, speed_level: 2 });
        round_trip(Frame::FrameAck { dxcrc, mycrc, snr: 0, speed_level: 0 });
        round_trip(Frame::BurstNack { dxcrc, mycrc, snr: 255, speed_level: 1 });
        round_trip(Frame::BurstNackWatchdog { dxcrc, mycrc, snr: 3, speed_level: 0 });
        round_trip(Frame::RptRequest { dxcrc, mycrc, missing: vec![2, 3, 5] });
        round_trip(Frame::SessionOpen { dxcrc, mycrc, callsign: call("BB2BB") });
        round_trip(Frame::SessionHeartbeat { dxcrc, mycrc });
        round_trip(Frame::SessionClose { dxcrc, mycrc, callsign: call("BB2BB") });
        round_trip(Frame::Stop { dxcrc, mycrc, callsign: call("BB2BB") });
        round_trip(Frame::Ping { dxcrc, mycrc, callsign: call("BB2BB") });
        round_trip(Frame::PingAck { dxcrc, mycrc, grid: "JN48EA".into() });
    }

    #[test]
    fn test_broadcast_round_trips() {
        round_trip(Frame::Cq { callsign: call("DN2LS"), grid: "JN48EA".into() });
        round_trip(Frame::Qrv { callsign: call("DL1ABC"), grid: "FN31".into() });
        round_trip(Frame::Beacon { callsign: call("DN2LS"), grid: "JN48".into() });
        round_trip(Frame::Test);
    }

    #[test]
    fn test_channel_open_round_trips() {
        let dxcrc = call("AA1AA").crc();
        let mycrc = call("BB2BB").crc();

        for profile in [BandwidthProfile::High, BandwidthProfile::Low, BandwidthProfile::Manual(234)] {
            round_trip(Frame::ChannelOpen {
                profile,
                dxcrc,
                mycrc,
                callsign: call("BB2BB"),
                n_frames_per_burst: 3,
            });
        }
        for profile in [BandwidthProfile::High, BandwidthProfile::Low] {
            round_trip(Frame::ChannelOpenAck { profile, dxcrc, mycrc, protocol_version: 4 });
        }
    }

    #[test]
    fn test_data_frame_round_trip() {
        let frame = Frame::BurstData {
            index: 2,
            n_frames: 3,
            dxcrc: call("AA1AA").crc(),
            mycrc: call("BB2BB").crc(),
            payload: Bytes::from_static(b"HELLO WORLD!!"),
        };
        assert_eq!(frame.type_code(), 12);
        round_trip(frame);
    }

    #[test]
    fn test_data_frame_keeps_padding() {
        let mut encoded = Frame::BurstData {
            index: 0,
            n_frames: 1,
            dxcrc: [1, 2, 3],
            mycrc: [4, 5, 6],
            payload: Bytes::from_static(b"x"),
        }
        .encode();
        encoded.extend_from_slice(&[0u8; 5]);

        match Frame::decode(&encoded).unwrap() {
            Frame::BurstData { payload, .. } => assert_eq!(&payload[..], b"x\0\0\0\0\0"),
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn test_bad_burst_geometry_rejected() {
        // index 5 in a burst of 3
        let mut bytes = vec![15u8, 3];
        bytes.extend_from_slice(&[0u8; 12]);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(FrameError::BadBurstGeometry { index: 5, n_frames: 3 })
        ));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(matches!(Frame::decode(&[199u8; 14]), Err(FrameError::UnknownType(199))));
        assert!(matches!(Frame::decode(&[0u8; 14]), Err(FrameError::UnknownType(0))));
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            Frame::decode(&[frame_type::BURST_ACK, 1, 2]),
            Err(FrameError::TooShort { .. })
        ));
    }

    #[test]
    fn test_rpt_missing_list_capped_at_six() {
        let frame = Frame::RptRequest {
            dxcrc: [0; 3],
            mycrc: [0; 3],
            missing: vec![1, 2, 3, 4, 5, 6],
        };
        let encoded = frame.encode();
        assert_eq!(&encoded[7..13], &[1, 2, 3, 4, 5, 6]);
        round_trip(frame);
    }

    #[test]
    fn test_signalling_frames_are_fixed_size() {
        let dxcrc = [9, 9, 9];
        let mycrc = [8, 8, 8];
        let frames = [
            Frame::BurstAck { dxcrc, mycrc, snr: 1, speed_level: 1 },
            Frame::SessionHeartbeat { dxcrc, mycrc },
            Frame::Stop { dxcrc, mycrc, callsign: call("AA1AA") },
            Frame::Test,
        ];
        for frame in frames {
            assert_eq!(frame.encode().len(), SIGNALLING_FRAME_LEN);
        }
    }
}
