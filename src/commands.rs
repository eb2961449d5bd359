//! Commands from the UI socket to the engine.
//!
//! The transmit worker drains these from its queue and drives the
//! protocol. `ArqRaw` is the bulk-transfer entry point: it opens a data
//! channel (if needed) and pushes the payload through the burst engine.

use bytes::Bytes;

use crate::callsign::Callsign;

/// A typed instruction from the UI.
#[derive(Debug, Clone)]
pub enum Command {
    /// Broadcast a general call.
    Cq,
    /// Abort the running transmission on both sides.
    Stop,
    /// Ping a station.
    Ping { dxcall: Callsign },
    /// Enable or disable the periodic beacon.
    Beacon { interval_secs: u64, enabled: bool },
    /// Transfer a raw payload to the connected or addressed station.
    ArqRaw {
        data: Bytes,
        /// Command-interface mode code; `MODE_AUTO` (255) lets the
        /// engine adapt, `230..=240` forces a manual channel opener.
        mode: u8,
        n_frames_per_burst: u8,
        uuid: String,
        /// Callsign (with SSID) to transmit under.
        mycall: Callsign,
    },
    /// Open an ARQ session with a station.
    Connect { dxcall: Callsign },
    /// Close the ARQ session.
    Disconnect,
    /// Emit a padding test frame.
    SendTestFrame,
}

impl Command {
    /// Command name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cq => "CQ",
            Self::Stop => "STOP",
            Self::Ping { .. } => "PING",
            Self::Beacon { .. } => "BEACON",
            Self::ArqRaw { .. } => "ARQ_RAW",
            Self::Connect { .. } => "CONNECT",
            Self::Disconnect => "DISCONNECT",
            Self::SendTestFrame => "SEND_TEST_FRAME",
        }
    }
}
