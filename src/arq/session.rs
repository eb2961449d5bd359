//! ARQ session controller.
//!
//! A session is a long-lived pairing of two stations over which data
//! channels are opened. The initiating station (master) sends a session
//! open frame and retries until the far side answers with a heartbeat;
//! while connected, the master heartbeats every 3 seconds and the slave
//! answers each one, except during a file transfer where heartbeats
//! would collide with data bursts.
//!
//! ```text
//! idle ──connect()──► connecting ──heartbeat rx──► connected
//! connecting ──retries exhausted──► failed ──► disconnected
//! connected ──close()/close rx────► disconnecting ──► disconnected
//! connected ──session watchdog────► failed (timeout)
//! ```

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::callsign::Callsign;
use crate::constants::{CLOSE_COPIES, CLOSE_REPEAT_DELAY, CONNECT_ATTEMPT_TIMEOUT};
use crate::frame::Frame;
use crate::state::{Peer, SessionStatus};

use super::{sliced_sleep, wait_for, EngineContext};

/// Open a session with `dxcall` as master and wait for it to connect.
///
/// Returns true once connected. On retry exhaustion a close frame is
/// sent as best-effort far-side cleanup and the failure is surfaced.
pub(crate) fn connect(ctx: &EngineContext, dxcall: &Callsign) -> bool {
    let state = &ctx.state;

    {
        let mut peer = state.peer.lock().expect("peer lock");
        *peer = Peer {
            crc: dxcall.crc(),
            callsign: Some(dxcall.clone()),
            grid: String::new(),
        };
    }

    state.is_session_master.store(true, Ordering::SeqCst);
    state.set_session_status(SessionStatus::Connecting);
    ctx.events.session_state("connecting");
    log::info!("SESSION [{}]>> <<[{}]", state.mycall(), dxcall);

    let open_frame = Frame::SessionOpen {
        dxcrc: dxcall.crc(),
        mycrc: state.mycall_crc(),
        callsign: state.mycall(),
    };

    for attempt in 0..ctx.session_connect_max_retries {
        log::info!(
            "SESSION [{}]>>?<<[{}] attempt={}/{}",
            state.mycall(),
            dxcall,
            attempt + 1,
            ctx.session_connect_max_retries
        );
        ctx.gateway.enqueue_signalling(open_frame.encode());

        let connected = wait_for(ctx, CONNECT_ATTEMPT_TIMEOUT, || {
            state.session_active.load(Ordering::SeqCst)
        });
        if connected {
            ctx.events.session_state("connected");
            return true;
        }
    }

    // No answer. Try to clean up the far side in case it heard the open
    // frames but we cannot hear it.
    send_close_frame(ctx);

    state.is_session_master.store(false, Ordering::SeqCst);
    state.set_session_status(SessionStatus::Failed);
    ctx.events.session_failed("timeout");
    log::warn!("SESSION [{}]>>X<<[{}] timeout", state.mycall(), dxcall);

    state.set_session_status(SessionStatus::Disconnected);
    false
}

/// Inbound session open: assume the slave role and answer with a heartbeat.
pub(crate) fn received_session_opener(ctx: &EngineContext, mycrc: [u8; 3], callsign: Callsign) {
    let state = &ctx.state;

    state.is_session_master.store(false, Ordering::SeqCst);
    state.set_session_status(SessionStatus::Connecting);
    ctx.events.session_state("connecting");
    state.touch_session();

    {
        let mut peer = state.peer.lock().expect("peer lock");
        peer.crc = mycrc;
        peer.callsign = Some(callsign.clone());
    }
    let snr = state.snr.load(Ordering::SeqCst);
    state.record_heard(&callsign, "", "DATA-CHANNEL", snr);

    log::info!("SESSION [{}]>>|<<[{}]", state.mycall(), callsign);
    state.session_active.store(true, Ordering::SeqCst);
    state.tnc_busy.store(true, Ordering::SeqCst);
    state.set_session_status(SessionStatus::Connected);
    ctx.events.session_state("connected");

    transmit_heartbeat(ctx);
}

/// Inbound heartbeat: refresh the session and answer when appropriate.
pub(crate) fn received_session_heartbeat(ctx: &EngineContext, their_crc: [u8; 3]) {
    let state = &ctx.state;

    // Only the recorded peer may refresh the session.
    let peer = state.peer_snapshot();
    let valid = peer
        .callsign
        .as_ref()
        .map(|c| c.matches_crc(&their_crc).0)
        .unwrap_or(false);
    if !valid {
        return;
    }

    log::debug!("received session heartbeat");
    if let Some(callsign) = peer.callsign.as_ref() {
        state.record_heard(callsign, &peer.grid, "SESSION-HB", state.snr.load(Ordering::SeqCst));
    }

    state.session_active.store(true, Ordering::SeqCst);
    state.tnc_busy.store(true, Ordering::SeqCst);
    if state.session_status() != SessionStatus::Connected {
        state.set_session_status(SessionStatus::Connected);
        ctx.events.session_state("connected");
    }

    state.touch_session();
    state.touch_data_channel();

    // The slave answers each heartbeat, but never during a transfer:
    // an answer would collide with the data bursts.
    if !state.is_session_master.load(Ordering::SeqCst)
        && !state.file_transfer.load(Ordering::SeqCst)
    {
        transmit_heartbeat(ctx);
    }
}

/// Close the session locally: notify the UI, clean up, tell the far side.
pub(crate) fn close_session(ctx: &EngineContext) {
    let state = &ctx.state;

    state.set_session_status(SessionStatus::Disconnecting);
    log::info!(
        "SESSION [{}]<<X>>[{}]",
        state.mycall(),
        state.peer_callsign_string()
    );
    ctx.events.session_state("close");

    state.is_session_master.store(false, Ordering::SeqCst);
    state.session_active.store(false, Ordering::SeqCst);
    state.arq_cleanup();

    send_close_frame(ctx);
    state.set_session_status(SessionStatus::Disconnected);
}

/// Inbound close: honoured only from the session peer.
pub(crate) fn received_session_close(ctx: &EngineContext, their_crc: [u8; 3]) {
    let state = &ctx.state;

    let peer = state.peer_snapshot();
    let valid = peer
        .callsign
        .as_ref()
        .map(|c| c.matches_crc(&their_crc).0)
        .unwrap_or(false);
    if !valid {
        return;
    }

    state.set_session_status(SessionStatus::Disconnected);
    if let Some(callsign) = peer.callsign.as_ref() {
        state.record_heard(callsign, &peer.grid, "DATA-CHANNEL", state.snr.load(Ordering::SeqCst));
        log::info!("SESSION [{}]<<X>>[{}]", state.mycall(), callsign);
    }
    ctx.events.session_state("close");

    state.is_session_master.store(false, Ordering::SeqCst);
    state.session_active.store(false, Ordering::SeqCst);
    state.arq_cleanup();
}

/// Send one session heartbeat frame.
pub(crate) fn transmit_heartbeat(ctx: &EngineContext) {
    let state = &ctx.state;
    let frame = Frame::SessionHeartbeat {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

/// Send the session close frame, repeated for robustness.
fn send_close_frame(ctx: &EngineContext) {
    let state = &ctx.state;
    let frame = Frame::SessionClose {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        callsign: state.mycall(),
    };
    ctx.gateway.enqueue(
        frame.encode(),
        crate::modem::FreedvMode::Datac0,
        CLOSE_COPIES,
        CLOSE_REPEAT_DELAY,
    );
}

/// Master-side keepalive producer: one heartbeat every 3 seconds
/// (1 s guard before, 2 s after), paused during file transfers.
pub(crate) fn heartbeat_producer(ctx: EngineContext) {
    log::info!("heartbeat producer started");
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        let state = &ctx.state;
        let active = state.session_active.load(Ordering::SeqCst)
            && state.is_session_master.load(Ordering::SeqCst)
            && state.session_status() == SessionStatus::Connected
            && !state.file_transfer.load(Ordering::SeqCst);

        if active {
            sliced_sleep(&ctx, Duration::from_secs(1));
            if heartbeat_still_due(&ctx) {
                transmit_heartbeat(&ctx);
            }
            sliced_sleep(&ctx, Duration::from_secs(2));
        } else {
            std::thread::sleep(crate::constants::POLL_INTERVAL);
        }
    }
    log::info!("heartbeat producer shutting down");
}

/// Re-check the heartbeat conditions after the pre-send guard sleep;
/// a transfer may have started in the meantime.
fn heartbeat_still_due(ctx: &EngineContext) -> bool {
    let state = &ctx.state;
    state.session_active.load(Ordering::SeqCst)
        && state.session_status() == SessionStatus::Connected
        && !state.file_transfer.load(Ordering::SeqCst)
        && !ctx.shutdown.load(Ordering::SeqCst)
}
