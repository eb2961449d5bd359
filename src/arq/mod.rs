//! The ARQ engine: workers, wiring and lifecycle.
//!
//! One engine owns five cooperating threads sharing a [`LinkState`]:
//!
//! ```text
//! UI commands ──► transmit worker ──► session / channel / burst engine ─┐
//! modem frames ─► receive worker ──► dispatcher ──► handlers           ─┤─► TransmitGateway ─► modem
//!                 watchdog (100 ms timers)                             ─┤
//!                 heartbeat producer (session keepalive)               ─┤
//!                 beacon worker                                        ─┘
//! ```
//!
//! The transmit worker executes one command at a time; a running transfer
//! occupies it until completion or failure, which is what serialises the
//! "at most one session, at most one transfer" protocol rules. Inbound
//! frames are serialised by the single receive worker.

pub mod channel;
pub mod dispatcher;
pub mod irs;
pub mod iss;
pub mod payload;
pub mod session;
pub mod watchdog;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::broadcast::{self, BeaconControl};
use crate::commands::Command;
use crate::config::Config;
use crate::events::EventSender;
use crate::modem::{RxFrame, TransmitGateway, TxRequest};
use crate::state::LinkState;

/// Everything a protocol handler needs, passed explicitly.
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub state: Arc<LinkState>,
    pub gateway: TransmitGateway,
    pub events: EventSender,
    pub shutdown: Arc<AtomicBool>,
    pub session_connect_max_retries: usize,
    pub data_channel_max_retries: usize,
    pub session_timeout: u64,
    pub transmission_timeout: u64,
}

/// The assembled data-link engine.
///
/// Construct with [`ArqEngine::spawn`]; feed decoded frames into the
/// sender returned by [`ArqEngine::frames`] and commands into
/// [`ArqEngine::commands`]. Dropping the engine stops all workers.
pub struct ArqEngine {
    command_tx: Sender<Command>,
    frame_tx: Sender<RxFrame>,
    state: Arc<LinkState>,
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for ArqEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArqEngine")
            .field("state", &self.state)
            .field("shutdown", &self.shutdown.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl ArqEngine {
    /// Start the engine workers.
    ///
    /// * `modem_tx` / `transmitting` — the modem's request queue and busy
    ///   flag, shared with whatever drives the audio side.
    /// * `event_tx` — consumer of the serialized UI event records.
    pub fn spawn(
        config: Config,
        modem_tx: Sender<TxRequest>,
        transmitting: Arc<AtomicBool>,
        event_tx: Sender<String>,
    ) -> Self {
        let state = Arc::new(LinkState::new(&config));
        let shutdown = Arc::new(AtomicBool::new(false));
        let ctx = EngineContext {
            state: Arc::clone(&state),
            gateway: TransmitGateway::new(modem_tx, transmitting),
            events: EventSender::new(event_tx),
            shutdown: Arc::clone(&shutdown),
            session_connect_max_retries: config.session_connect_max_retries,
            data_channel_max_retries: config.data_channel_max_retries,
            session_timeout: config.arq_session_timeout,
            transmission_timeout: config.transmission_timeout,
        };

        let (command_tx, command_rx) = mpsc::channel();
        let (frame_tx, frame_rx) = mpsc::channel();
        let beacon = Arc::new(BeaconControl::default());

        let mut handles = Vec::with_capacity(5);

        let tx_ctx = ctx.clone();
        let tx_beacon = Arc::clone(&beacon);
        handles.push(spawn_named("hflink-transmit", move || {
            transmit_worker(tx_ctx, command_rx, tx_beacon);
        }));

        let rx_ctx = ctx.clone();
        handles.push(spawn_named("hflink-receive", move || {
            receive_worker(rx_ctx, frame_rx);
        }));

        let wd_ctx = ctx.clone();
        handles.push(spawn_named("hflink-watchdog", move || {
            watchdog::run(wd_ctx);
        }));

        let hb_ctx = ctx.clone();
        handles.push(spawn_named("hflink-heartbeat", move || {
            session::heartbeat_producer(hb_ctx);
        }));

        let beacon_ctx = ctx.clone();
        handles.push(spawn_named("hflink-beacon", move || {
            broadcast::beacon_worker(beacon_ctx, beacon);
        }));

        log::info!(
            "engine started: mycall={} grid={} low_bandwidth={}",
            state.mycall(),
            state.mygrid(),
            config.low_bandwidth_mode
        );

        Self { command_tx, frame_tx, state, shutdown, handles }
    }

    /// Queue for UI commands.
    pub fn commands(&self) -> Sender<Command> {
        self.command_tx.clone()
    }

    /// Queue for decoded frames from the modem.
    pub fn frames(&self) -> Sender<RxFrame> {
        self.frame_tx.clone()
    }

    /// The shared engine state (read-mostly for UIs and tests).
    pub fn state(&self) -> &Arc<LinkState> {
        &self.state
    }

    /// Request worker shutdown. Blocking protocol waits observe this
    /// flag and unwind; a transfer in flight is abandoned.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.state.arq_state.store(false, Ordering::SeqCst);
        self.state.session_active.store(false, Ordering::SeqCst);
    }
}

impl Drop for ArqEngine {
    fn drop(&mut self) {
        self.shutdown();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Bounded polled wait: true as soon as `cond` holds, false on timeout
/// or engine shutdown. 10 ms granularity, like every non-gateway wait.
pub(crate) fn wait_for(
    ctx: &EngineContext,
    timeout: Duration,
    cond: impl Fn() -> bool,
) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if ctx.shutdown.load(Ordering::SeqCst) {
            return false;
        }
        if cond() {
            return true;
        }
        std::thread::sleep(crate::constants::POLL_INTERVAL);
    }
    cond()
}

/// Sleep in shutdown-aware 10 ms slices.
pub(crate) fn sliced_sleep(ctx: &EngineContext, duration: Duration) {
    let deadline = std::time::Instant::now() + duration;
    while std::time::Instant::now() < deadline {
        if ctx.shutdown.load(Ordering::SeqCst) {
            return;
        }
        std::thread::sleep(crate::constants::POLL_INTERVAL);
    }
}

fn spawn_named(name: &str, f: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .expect("spawn worker thread")
}

/// Dispatch UI commands for transmitting operations.
fn transmit_worker(ctx: EngineContext, command_rx: Receiver<Command>, beacon: Arc<BeaconControl>) {
    log::info!("transmit worker started");
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let command = match command_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(command) => command,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        log::debug!("transmit worker: {}", command.name());
        match command {
            Command::Cq => broadcast::transmit_cq(&ctx),
            Command::Stop => iss::stop_transmission(&ctx),
            Command::Ping { dxcall } => broadcast::transmit_ping(&ctx, &dxcall),
            Command::Beacon { interval_secs, enabled } => beacon.set(interval_secs, enabled),
            Command::ArqRaw { data, mode, n_frames_per_burst, uuid, mycall } => {
                channel::open_and_transmit(&ctx, data, mode, n_frames_per_burst, &uuid, mycall);
            }
            Command::Connect { dxcall } => {
                session::connect(&ctx, &dxcall);
            }
            Command::Disconnect => session::close_session(&ctx),
            Command::SendTestFrame => broadcast::send_test_frame(&ctx),
        }
    }
    log::info!("transmit worker shutting down");
}

/// Feed decoded frames through the dispatcher, one at a time.
fn receive_worker(ctx: EngineContext, frame_rx: Receiver<RxFrame>) {
    log::info!("receive worker started");
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        match frame_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(frame) => dispatcher::process_frame(&ctx, frame),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("receive worker shutting down");
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) struct TestHarness {
        pub ctx: EngineContext,
        /// Everything the engine handed to the stand-in modem.
        pub sent: Receiver<TxRequest>,
        /// Raw UI event records.
        pub events: Receiver<String>,
    }

    /// Context over a stand-in modem that accepts every frame instantly.
    pub(crate) fn test_harness(config: Config) -> TestHarness {
        let (modem_tx, modem_rx) = mpsc::channel::<TxRequest>();
        let (forward_tx, forward_rx) = mpsc::channel();
        let transmitting = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&transmitting);
        std::thread::spawn(move || {
            while let Ok(request) = modem_rx.recv() {
                let _ = forward_tx.send(request);
                flag.store(false, Ordering::SeqCst);
            }
        });

        let (event_tx, event_rx) = mpsc::channel();
        let ctx = EngineContext {
            state: Arc::new(LinkState::new(&config)),
            gateway: TransmitGateway::new(modem_tx, transmitting),
            events: EventSender::new(event_tx),
            shutdown: Arc::new(AtomicBool::new(false)),
            session_connect_max_retries: config.session_connect_max_retries,
            data_channel_max_retries: config.data_channel_max_retries,
            session_timeout: config.arq_session_timeout,
            transmission_timeout: config.transmission_timeout,
        };

        TestHarness { ctx, sent: forward_rx, events: event_rx }
    }
}
