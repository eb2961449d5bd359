//! Shared engine state.
//!
//! The protocol workers (transmit, receive, watchdog, heartbeat, beacon)
//! share one explicitly-passed [`LinkState`]. Fields are partitioned by
//! owner: single-writer flags and counters are atomics readable from any
//! worker; the few genuinely cross-owner values (peer identity, receive
//! buffers, the per-burst reply channel) sit behind their own mutexes.
//! Only the IRS path writes the receive buffers and only the ISS path
//! reads burst replies, so lock contention is nil in practice.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::callsign::Callsign;
use crate::config::Config;
use crate::constants::HEARD_STATIONS_MAX;
use crate::modem::{
    FreedvMode, ListeningModes, MODE_LIST_HIGH_BW, MODE_LIST_LOW_BW, TIME_LIST_HIGH_BW,
    TIME_LIST_LOW_BW,
};
use crate::stats::TransferRate;

/// Seconds since the Unix epoch; the clock all protocol timers run on.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Lifecycle of the ARQ session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The far station of the current session or transfer.
#[derive(Debug, Clone, Default)]
pub struct Peer {
    pub callsign: Option<Callsign>,
    pub crc: [u8; 3],
    pub grid: String,
}

/// Active bandwidth profile: data modes and their burst timeouts.
#[derive(Debug, Clone, Copy)]
pub struct Profile {
    pub modes: &'static [FreedvMode],
    pub timings: &'static [u64],
}

impl Profile {
    pub fn high_bandwidth() -> Self {
        Self { modes: MODE_LIST_HIGH_BW, timings: TIME_LIST_HIGH_BW }
    }

    pub fn low_bandwidth() -> Self {
        Self { modes: MODE_LIST_LOW_BW, timings: TIME_LIST_LOW_BW }
    }

    pub fn for_config(low_bandwidth: bool) -> Self {
        if low_bandwidth {
            Self::low_bandwidth()
        } else {
            Self::high_bandwidth()
        }
    }

    /// Highest valid speed level for this profile.
    pub fn max_speed_level(&self) -> usize {
        self.modes.len() - 1
    }
}

/// Receive-side reassembly buffers.
///
/// `burst` holds the payload of each frame of the burst in flight, one
/// slot per expected frame; `frame` accumulates completed bursts until
/// the BOF/EOF markers bracket a full transfer.
#[derive(Debug, Default)]
pub struct RxBuffers {
    pub burst: Vec<Option<Vec<u8>>>,
    pub frame: Vec<u8>,
    pub bof_seen: bool,
    pub eof_seen: bool,
    /// Destination CRC carried by the last data frame, for SSID-aware
    /// reporting of the effective local callsign.
    pub received_mycall_crc: [u8; 3],
    /// Transfer start time for rate statistics.
    pub start_of_transmission: u64,
}

impl RxBuffers {
    pub fn clear(&mut self) {
        self.burst.clear();
        self.frame.clear();
        self.bof_seen = false;
        self.eof_seen = false;
        self.received_mycall_crc = [0; 3];
    }
}

/// What the dispatcher tells a waiting ISS burst about its fate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BurstReply {
    BurstAck { snr: u8, speed_level: u8 },
    BurstNack { snr: u8, speed_level: u8 },
    Rpt { missing: Vec<u8> },
    FrameAck,
}

/// One entry of the heard-stations log.
#[derive(Debug, Clone)]
pub struct HeardStation {
    pub callsign: String,
    pub grid: String,
    pub activity: &'static str,
    pub snr: u8,
    pub last_heard: u64,
}

/// Process-wide engine state, shared by all workers.
pub struct LinkState {
    // Station identity. The callsign can be overridden per transfer
    // (ARQ_RAW carries the SSID to answer under).
    pub mycall: Mutex<Callsign>,
    pub mygrid: Mutex<String>,
    pub low_bandwidth_mode: bool,
    pub respond_to_cq: bool,

    // TNC lifecycle flags.
    pub tnc_busy: AtomicBool,
    pub arq_state: AtomicBool,
    pub session_active: AtomicBool,
    pub session_status: Mutex<SessionStatus>,
    pub is_session_master: AtomicBool,
    pub is_irs: AtomicBool,
    pub file_transfer: AtomicBool,
    /// Peer requested or granted the low-bandwidth profile.
    pub peer_low_bandwidth: AtomicBool,

    // Rate adaptation.
    pub speed_level: AtomicUsize,
    pub profile: Mutex<Profile>,

    // Link observations.
    pub snr: AtomicU8,
    pub session_last_received: AtomicU64,
    pub data_channel_last_received: AtomicU64,

    // Watchdog counters.
    pub burst_nack_counter: AtomicU32,
    pub frame_received_counter: AtomicU32,
    pub rx_retries_per_burst: AtomicU32,

    // Cross-owner records.
    pub peer: Mutex<Peer>,
    pub rx: Mutex<RxBuffers>,
    /// Reply path of the burst currently awaiting ACK/NACK/RPT; installed
    /// by the ISS before each burst, consumed by the dispatcher.
    pub burst_reply: Mutex<Option<Sender<BurstReply>>>,
    pub transmission_uuid: Mutex<String>,
    pub stats: Mutex<TransferRate>,
    pub heard: Mutex<Vec<HeardStation>>,

    pub listening: ListeningModes,
}

impl std::fmt::Debug for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkState")
            .field("tnc_busy", &self.tnc_busy.load(Ordering::SeqCst))
            .field("arq_state", &self.arq_state.load(Ordering::SeqCst))
            .field("session_active", &self.session_active.load(Ordering::SeqCst))
            .field("speed_level", &self.speed_level.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl LinkState {
    pub fn new(config: &Config) -> Self {
        let profile = Profile::for_config(config.low_bandwidth_mode);
        let mycall = Callsign::parse(&config.mycallsign)
            .unwrap_or_else(|_| Callsign::parse("N0CALL").expect("fallback callsign"));

        Self {
            mycall: Mutex::new(mycall),
            mygrid: Mutex::new(config.mygrid.clone()),
            low_bandwidth_mode: config.low_bandwidth_mode,
            respond_to_cq: config.respond_to_cq,
            tnc_busy: AtomicBool::new(false),
            arq_state: AtomicBool::new(false),
            session_active: AtomicBool::new(false),
            session_status: Mutex::new(SessionStatus::Idle),
            is_session_master: AtomicBool::new(false),
            is_irs: AtomicBool::new(false),
            file_transfer: AtomicBool::new(false),
            peer_low_bandwidth: AtomicBool::new(false),
            speed_level: AtomicUsize::new(profile.max_speed_level()),
            profile: Mutex::new(profile),
            snr: AtomicU8::new(0),
            session_last_received: AtomicU64::new(0),
            data_channel_last_received: AtomicU64::new(0),
            burst_nack_counter: AtomicU32::new(0),
            frame_received_counter: AtomicU32::new(0),
            rx_retries_per_burst: AtomicU32::new(0),
            peer: Mutex::new(Peer::default()),
            rx: Mutex::new(RxBuffers::default()),
            burst_reply: Mutex::new(None),
            transmission_uuid: Mutex::new(String::new()),
            stats: Mutex::new(TransferRate::default()),
            heard: Mutex::new(Vec::new()),
            listening: ListeningModes::default(),
        }
    }

    // ========================================================================
    // Convenience accessors
    // ========================================================================

    pub fn mycall(&self) -> Callsign {
        self.mycall.lock().expect("mycall lock").clone()
    }

    pub fn mycall_crc(&self) -> [u8; 3] {
        self.mycall().crc()
    }

    pub fn mygrid(&self) -> String {
        self.mygrid.lock().expect("mygrid lock").clone()
    }

    pub fn peer_snapshot(&self) -> Peer {
        self.peer.lock().expect("peer lock").clone()
    }

    pub fn peer_callsign_string(&self) -> String {
        self.peer_snapshot()
            .callsign
            .map(|c| c.to_string())
            .unwrap_or_default()
    }

    pub fn session_status(&self) -> SessionStatus {
        *self.session_status.lock().expect("session status lock")
    }

    pub fn set_session_status(&self, status: SessionStatus) {
        *self.session_status.lock().expect("session status lock") = status;
    }

    pub fn profile_snapshot(&self) -> Profile {
        *self.profile.lock().expect("profile lock")
    }

    pub fn set_profile(&self, profile: Profile) {
        *self.profile.lock().expect("profile lock") = profile;
        self.speed_level
            .store(profile.max_speed_level(), Ordering::SeqCst);
    }

    /// Set the speed level, clamped to the active mode list.
    pub fn set_speed_level(&self, level: usize) {
        let max = self.profile_snapshot().max_speed_level();
        self.speed_level.store(level.min(max), Ordering::SeqCst);
    }

    /// The data mode selected by the current speed level.
    pub fn current_mode(&self) -> FreedvMode {
        let profile = self.profile_snapshot();
        let level = self.speed_level.load(Ordering::SeqCst).min(profile.max_speed_level());
        profile.modes[level]
    }

    /// The burst timeout (seconds) of the current speed level.
    pub fn current_burst_timeout(&self) -> u64 {
        let profile = self.profile_snapshot();
        let level = self.speed_level.load(Ordering::SeqCst).min(profile.timings.len() - 1);
        profile.timings[level]
    }

    pub fn touch_session(&self) {
        self.session_last_received.store(now_secs(), Ordering::SeqCst);
    }

    pub fn touch_data_channel(&self) {
        self.data_channel_last_received.store(now_secs(), Ordering::SeqCst);
    }

    pub fn transmission_uuid(&self) -> String {
        self.transmission_uuid.lock().expect("uuid lock").clone()
    }

    pub fn set_transmission_uuid(&self, uuid: &str) {
        *self.transmission_uuid.lock().expect("uuid lock") = uuid.to_string();
    }

    /// Install the reply channel for the burst about to be transmitted.
    pub fn install_burst_reply(&self, tx: Sender<BurstReply>) {
        *self.burst_reply.lock().expect("burst reply lock") = Some(tx);
    }

    /// Route one reply to the waiting burst, if any.
    pub fn send_burst_reply(&self, reply: BurstReply) {
        let guard = self.burst_reply.lock().expect("burst reply lock");
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(reply);
        }
    }

    pub fn clear_burst_reply(&self) {
        *self.burst_reply.lock().expect("burst reply lock") = None;
    }

    // ========================================================================
    // Heard stations
    // ========================================================================

    /// Record activity from a heard station, deduplicated by callsign.
    pub fn record_heard(&self, callsign: &Callsign, grid: &str, activity: &'static str, snr: u8) {
        let mut heard = self.heard.lock().expect("heard lock");
        let call = callsign.to_string();
        if let Some(entry) = heard.iter_mut().find(|e| e.callsign == call) {
            entry.activity = activity;
            entry.snr = snr;
            entry.last_heard = now_secs();
            if !grid.is_empty() {
                entry.grid = grid.to_string();
            }
            return;
        }
        if heard.len() >= HEARD_STATIONS_MAX {
            heard.remove(0);
        }
        heard.push(HeardStation {
            callsign: call,
            grid: grid.to_string(),
            activity,
            snr,
            last_heard: now_secs(),
        });
    }

    pub fn heard_stations(&self) -> Vec<HeardStation> {
        self.heard.lock().expect("heard lock").clone()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Reset every per-channel state: the single point all terminal paths
    /// (success, failure, stop, watchdog timeout) funnel through.
    /// Idempotent. The session, configuration and heard-stations log
    /// survive; everything tied to the data channel does not.
    pub fn arq_cleanup(&self) {
        log::debug!("arq_cleanup");

        self.rx.lock().expect("rx lock").clear();
        self.clear_burst_reply();

        self.listening.reset();

        self.is_irs.store(false, Ordering::SeqCst);
        self.peer_low_bandwidth.store(false, Ordering::SeqCst);
        self.burst_nack_counter.store(0, Ordering::SeqCst);
        self.frame_received_counter.store(0, Ordering::SeqCst);
        self.rx_retries_per_burst.store(0, Ordering::SeqCst);

        let profile = Profile::for_config(self.low_bandwidth_mode);
        self.set_profile(profile);

        if !self.session_active.load(Ordering::SeqCst) {
            self.tnc_busy.store(false, Ordering::SeqCst);
        }
        self.arq_state.store(false, Ordering::SeqCst);
        self.file_transfer.store(false, Ordering::SeqCst);
    }
}
