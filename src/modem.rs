//! Modem boundary: codec modes, bandwidth profiles and the transmit gateway.
//!
//! The engine never touches audio. It consumes decoded frames from an
//! inbound queue and hands outbound frames — tagged with the codec mode
//! that must carry them — to the modem through [`TransmitGateway`]. The
//! gateway enforces the half-duplex contract: `enqueue` blocks its caller
//! until the modem reports the carrier idle again.
//!
//! ```text
//! Engine workers                        Modem process/thread
//! ┌──────────────────┐                  ┌──────────────────────┐
//! │ enqueue(frame,…) │──mpsc TxRequest─►│ modulate, key PTT    │
//! │   (blocks)       │◄─transmitting=0──│ clear flag when done │
//! └──────────────────┘                  └──────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::constants::POLL_INTERVAL;

/// Codec modes of the underlying OFDM modem, ordered by robustness.
///
/// The discriminants are the modem's own mode identifiers and appear on
/// the command interface (`ARQ_RAW <mode>`), so they are fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreedvMode {
    /// Signalling mode: slow, robust, 14-byte payload.
    Datac0,
    /// Mid-rate data mode, 126-byte payload.
    Datac3,
    /// Fast data mode, 510-byte payload.
    Datac1,
}

impl FreedvMode {
    /// Decode a wire/command mode identifier.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            14 => Some(Self::Datac0),
            12 => Some(Self::Datac3),
            10 => Some(Self::Datac1),
            _ => None,
        }
    }

    /// The mode identifier used on the command interface.
    pub fn code(self) -> u8 {
        match self {
            Self::Datac0 => 14,
            Self::Datac3 => 12,
            Self::Datac1 => 10,
        }
    }

    /// Raw modem frame size in bytes, including the modem's CRC16.
    pub fn bytes_per_frame(self) -> usize {
        match self {
            Self::Datac0 => 16,
            Self::Datac3 => 128,
            Self::Datac1 => 512,
        }
    }

    /// Usable payload per frame: the modem claims 2 bytes for its CRC16.
    pub fn payload_per_frame(self) -> usize {
        self.bytes_per_frame() - 2
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Datac0 => "datac0",
            Self::Datac3 => "datac3",
            Self::Datac1 => "datac1",
        }
    }
}

impl std::fmt::Display for FreedvMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Mode code on the command interface meaning "engine picks the mode".
pub const MODE_AUTO: u8 = 255;

/// Data modes of the high-bandwidth profile, slowest first.
pub const MODE_LIST_HIGH_BW: &[FreedvMode] =
    &[FreedvMode::Datac0, FreedvMode::Datac3, FreedvMode::Datac1];

/// Burst timeouts (seconds) per speed level, high-bandwidth profile.
/// The trailing 30 s slot is carried for wire compatibility but no
/// speed level indexes it.
pub const TIME_LIST_HIGH_BW: &[u64] = &[3, 7, 8, 30];

/// Data modes of the low-bandwidth (500 Hz) profile.
pub const MODE_LIST_LOW_BW: &[FreedvMode] = &[FreedvMode::Datac0, FreedvMode::Datac3];

/// Burst timeouts (seconds) per speed level, low-bandwidth profile.
pub const TIME_LIST_LOW_BW: &[u64] = &[3, 7];

/// A request handed to the modem: one frame, repeated `copies` times.
#[derive(Debug, Clone)]
pub struct TxRequest {
    /// Frame bytes, already padded to `mode.payload_per_frame()`.
    pub frame: Bytes,
    /// Codec mode to modulate with.
    pub mode: FreedvMode,
    /// Number of identical emissions.
    pub copies: usize,
    /// Delay between emissions.
    pub repeat_delay: Duration,
}

/// A decoded frame delivered by the modem, with its SNR estimate.
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub data: Bytes,
    /// Receive SNR in dB, clamped by the modem to `0..=255`.
    pub snr: u8,
}

/// Data modes the modem should spend demodulator cycles on.
///
/// The signalling mode is always demodulated; the faster modes are
/// switched on only while a channel at that speed is live.
#[derive(Debug, Default)]
pub struct ListeningModes {
    datac3: AtomicBool,
    datac1: AtomicBool,
}

impl ListeningModes {
    /// Enable demodulation of the given data mode.
    pub fn enable(&self, mode: FreedvMode) {
        match mode {
            FreedvMode::Datac0 => {}
            FreedvMode::Datac3 => self.datac3.store(true, Ordering::SeqCst),
            FreedvMode::Datac1 => self.datac1.store(true, Ordering::SeqCst),
        }
    }

    /// Drop back to signalling-only listening.
    pub fn reset(&self) {
        self.datac3.store(false, Ordering::SeqCst);
        self.datac1.store(false, Ordering::SeqCst);
    }

    pub fn is_listening(&self, mode: FreedvMode) -> bool {
        match mode {
            FreedvMode::Datac0 => true,
            FreedvMode::Datac3 => self.datac3.load(Ordering::SeqCst),
            FreedvMode::Datac1 => self.datac1.load(Ordering::SeqCst),
        }
    }
}

/// Blocking gateway between the protocol workers and the modem.
#[derive(Clone)]
pub struct TransmitGateway {
    tx: Sender<TxRequest>,
    transmitting: Arc<AtomicBool>,
    // Serializes concurrent enqueue callers (heartbeat vs. burst engine)
    // so the busy flag always belongs to exactly one request.
    serial: Arc<std::sync::Mutex<()>>,
}

impl std::fmt::Debug for TransmitGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransmitGateway")
            .field("transmitting", &self.transmitting.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TransmitGateway {
    /// Create a gateway over the modem's request queue and busy flag.
    pub fn new(tx: Sender<TxRequest>, transmitting: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            transmitting,
            serial: Arc::new(std::sync::Mutex::new(())),
        }
    }

    /// Hand one frame to the modem and block until it is on the air.
    ///
    /// The frame is zero-padded to the mode's payload size before
    /// queuing. Returns once the modem clears the transmitting flag; if
    /// the modem side is gone the call returns immediately.
    pub fn enqueue(&self, frame: Vec<u8>, mode: FreedvMode, copies: usize, repeat_delay: Duration) {
        let _serial = self.serial.lock().expect("gateway serial lock");
        let mut padded = frame;
        let size = mode.payload_per_frame();
        if padded.len() < size {
            padded.resize(size, 0);
        }

        log::debug!(
            "enqueue_frame_for_tx: type={} mode={} copies={}",
            padded[0],
            mode,
            copies
        );

        self.transmitting.store(true, Ordering::SeqCst);
        if self
            .tx
            .send(TxRequest { frame: Bytes::from(padded), mode, copies, repeat_delay })
            .is_err()
        {
            log::warn!("transmit gateway: modem queue disconnected");
            self.transmitting.store(false, Ordering::SeqCst);
            return;
        }

        // Half-duplex: hold the caller until the modem is idle again.
        while self.transmitting.load(Ordering::SeqCst) {
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Send a signalling frame once at the signalling mode.
    pub fn enqueue_signalling(&self, frame: Vec<u8>) {
        self.enqueue(frame, FreedvMode::Datac0, 1, Duration::ZERO);
    }
}
