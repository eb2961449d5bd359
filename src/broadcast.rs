//! Broadcast-class traffic: CQ, QRV, PING and the periodic beacon.
//!
//! These frames share the transmit gateway with the ARQ machinery but
//! carry no session state. They exist to make stations discoverable:
//! everything heard lands in the heard-stations log and is surfaced to
//! the UI.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;

use crate::arq::EngineContext;
use crate::callsign::Callsign;
use crate::frame::Frame;
use crate::modem::FreedvMode;
use crate::state::now_secs;

/// Shared on/off switch and cadence for the beacon worker.
#[derive(Debug, Default)]
pub struct BeaconControl {
    enabled: AtomicBool,
    interval_secs: AtomicU64,
}

impl BeaconControl {
    pub fn set(&self, interval_secs: u64, enabled: bool) {
        if enabled {
            self.interval_secs.store(interval_secs.max(1), Ordering::SeqCst);
        }
        self.enabled.store(enabled, Ordering::SeqCst);
        log::info!("beacon {} interval={interval_secs}s", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn interval(&self) -> u64 {
        self.interval_secs.load(Ordering::SeqCst)
    }
}

// ============================================================================
// CQ / QRV
// ============================================================================

pub(crate) fn transmit_cq(ctx: &EngineContext) {
    let state = &ctx.state;
    log::info!("CQ CQ CQ");
    ctx.events.cq_transmitting();

    let frame = Frame::Cq { callsign: state.mycall(), grid: state.mygrid() };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn received_cq(ctx: &EngineContext, callsign: &Callsign, grid: &str, snr: u8) {
    let state = &ctx.state;
    log::info!("CQ RCVD [{callsign}][{grid}] snr={snr}");

    ctx.events
        .cq_received(&state.mycall().to_string(), &callsign.to_string(), grid);
    state.record_heard(callsign, grid, "CQ CQ CQ", snr);

    if state.respond_to_cq {
        transmit_qrv(ctx);
    }
}

pub(crate) fn transmit_qrv(ctx: &EngineContext) {
    let state = &ctx.state;

    // Many stations may answer the same CQ; a random pause up to 2 s in
    // half-second steps makes at least one of them copyable.
    let slots = rand::rng().random_range(0..4u64);
    std::thread::sleep(Duration::from_millis(slots * 500));

    ctx.events.qrv_transmitting();
    log::info!("sending QRV");

    let frame = Frame::Qrv { callsign: state.mycall(), grid: state.mygrid() };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn received_qrv(ctx: &EngineContext, callsign: &Callsign, grid: &str, snr: u8) {
    log::info!("QRV RCVD [{callsign}][{grid}] snr={snr}");
    ctx.events.qrv_received(&callsign.to_string(), grid, snr);
    ctx.state.record_heard(callsign, grid, "QRV", snr);
}

// ============================================================================
// PING
// ============================================================================

pub(crate) fn transmit_ping(ctx: &EngineContext, dxcall: &Callsign) {
    let state = &ctx.state;

    {
        let mut peer = state.peer.lock().expect("peer lock");
        peer.callsign = Some(dxcall.clone());
        peer.crc = dxcall.crc();
    }

    ctx.events.ping_transmitting();
    log::info!("PING REQ [{}] >>> [{dxcall}]", state.mycall());

    let frame = Frame::Ping {
        dxcrc: dxcall.crc(),
        mycrc: state.mycall_crc(),
        callsign: state.mycall(),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn received_ping(
    ctx: &EngineContext,
    dest_crc: [u8; 3],
    their_crc: [u8; 3],
    callsign: &Callsign,
    snr: u8,
) {
    let state = &ctx.state;
    state.record_heard(callsign, "", "PING", snr);

    ctx.events.ping_event(
        "received",
        &uuid::Uuid::new_v4().to_string(),
        chrono::Utc::now().timestamp(),
        &state.mycall().to_string(),
        &callsign.to_string(),
        &state.peer_snapshot().grid,
        snr,
    );

    let (valid, mycallsign) = state.mycall().matches_crc(&dest_crc);
    if !valid {
        log::debug!("received_ping: ping not for this station");
        return;
    }

    // Remember who pinged us, unless a session already owns the peer slot.
    if !state.session_active.load(Ordering::SeqCst) {
        let mut peer = state.peer.lock().expect("peer lock");
        peer.callsign = Some(callsign.clone());
        peer.crc = their_crc;
    }

    log::info!("PING REQ [{mycallsign}] <<< [{callsign}] snr={snr}");

    let frame = Frame::PingAck {
        dxcrc: their_crc,
        mycrc: state.mycall_crc(),
        grid: state.mygrid(),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn received_ping_ack(ctx: &EngineContext, their_crc: [u8; 3], grid: &str, snr: u8) {
    let state = &ctx.state;

    let callsign = {
        let mut peer = state.peer.lock().expect("peer lock");
        peer.crc = their_crc;
        peer.grid = grid.to_string();
        peer.callsign.clone()
    };

    let dxcallsign = callsign.as_ref().map(|c| c.to_string()).unwrap_or_default();
    ctx.events.ping_event(
        "acknowledge",
        &uuid::Uuid::new_v4().to_string(),
        chrono::Utc::now().timestamp(),
        &state.mycall().to_string(),
        &dxcallsign,
        grid,
        snr,
    );

    if let Some(callsign) = callsign.as_ref() {
        state.record_heard(callsign, grid, "PING-ACK", snr);
    }
    log::info!("PING ACK [{}] >|< [{dxcallsign}] snr={snr}", state.mycall());

    state.tnc_busy.store(false, Ordering::SeqCst);
}

// ============================================================================
// Beacon
// ============================================================================

pub(crate) fn received_beacon(ctx: &EngineContext, callsign: &Callsign, grid: &str, snr: u8) {
    log::info!("BEACON RCVD [{callsign}][{grid}] snr={snr}");
    ctx.events.beacon_received(&callsign.to_string(), grid, snr);
    ctx.state.record_heard(callsign, grid, "BEACON", snr);
}

/// Beacon worker: while enabled and the TNC is quiet, emit one beacon
/// frame per interval. Pauses itself during sessions and transfers.
pub(crate) fn beacon_worker(ctx: EngineContext, control: Arc<BeaconControl>) {
    log::info!("beacon worker started");
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        if !control.is_enabled() {
            std::thread::sleep(Duration::from_millis(500));
            continue;
        }

        let state = &ctx.state;
        if !state.session_active.load(Ordering::SeqCst)
            && !state.file_transfer.load(Ordering::SeqCst)
        {
            let interval = control.interval();
            ctx.events.beacon_transmitting(interval);
            log::info!("sending beacon, interval={interval}s");

            let grid = state.mygrid();
            let frame = Frame::Beacon {
                callsign: state.mycall(),
                grid: grid.chars().take(4).collect(),
            };
            ctx.gateway.enqueue_signalling(frame.encode());
        }

        // Sleep out the interval, but react promptly to disable/shutdown.
        let deadline = now_secs() + control.interval();
        while now_secs() < deadline {
            if ctx.shutdown.load(Ordering::SeqCst) || !control.is_enabled() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
    log::info!("beacon worker shutting down");
}

// ============================================================================
// Test frame
// ============================================================================

/// Emit one padding-only frame at the mid-rate data mode.
pub(crate) fn send_test_frame(ctx: &EngineContext) {
    ctx.gateway
        .enqueue(Frame::Test.encode(), FreedvMode::Datac3, 1, Duration::ZERO);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arq::test_support::test_harness;
    use crate::config::Config;
    use crate::frame::frame_type;

    #[test]
    fn test_beacon_control() {
        let control = BeaconControl::default();
        assert!(!control.is_enabled());

        control.set(30, true);
        assert!(control.is_enabled());
        assert_eq!(control.interval(), 30);

        control.set(0, false);
        assert!(!control.is_enabled());
    }

    #[test]
    fn test_transmit_cq_emits_frame_and_event() {
        let harness = test_harness(Config::default());
        transmit_cq(&harness.ctx);

        let request = harness.sent.recv().unwrap();
        assert_eq!(request.frame[0], frame_type::CQ);

        let event: serde_json::Value =
            serde_json::from_str(&harness.events.recv().unwrap()).unwrap();
        assert_eq!(event["cq"], "transmitting");
    }

    #[test]
    fn test_received_ping_answers_when_addressed() {
        let harness = test_harness(Config::default());
        let ctx = &harness.ctx;
        let pinger = Callsign::parse("BB2BB").unwrap();
        let mycrc = ctx.state.mycall_crc();

        received_ping(ctx, mycrc, pinger.crc(), &pinger, 15);

        // ping:received event first, then the PING-ACK frame.
        let event: serde_json::Value =
            serde_json::from_str(&harness.events.recv().unwrap()).unwrap();
        assert_eq!(event["ping"], "received");

        let request = harness.sent.recv().unwrap();
        assert_eq!(request.frame[0], frame_type::PING_ACK);
        assert_eq!(&request.frame[1..4], pinger.crc());
    }

    #[test]
    fn test_received_ping_for_other_station_not_answered() {
        let harness = test_harness(Config::default());
        let pinger = Callsign::parse("BB2BB").unwrap();
        let other = Callsign::parse("CC3CC").unwrap();

        received_ping(&harness.ctx, other.crc(), pinger.crc(), &pinger, 15);

        // Heard + event, but no frame on the air.
        assert!(harness.sent.try_recv().is_err());
        assert_eq!(harness.ctx.state.heard_stations().len(), 1);
    }

    #[test]
    fn test_received_ping_ack_captures_grid_and_idles() {
        let harness = test_harness(Config::default());
        let ctx = &harness.ctx;
        let peer_call = Callsign::parse("BB2BB").unwrap();
        transmit_ping(ctx, &peer_call);
        ctx.state.tnc_busy.store(true, Ordering::SeqCst);

        received_ping_ack(ctx, peer_call.crc(), "JN48EA", 9);

        assert_eq!(ctx.state.peer_snapshot().grid, "JN48EA");
        assert!(!ctx.state.tnc_busy.load(Ordering::SeqCst));
    }
}
