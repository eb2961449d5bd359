//! Cooperative protocol timers.
//!
//! One thread wakes every 100 ms and pets three watchdogs; the session
//! heartbeat producer (the fourth timer of the protocol) lives in the
//! session module. Checks take the current time as a parameter so tests
//! can drive them with synthetic clocks.

use std::sync::atomic::Ordering;

use crate::constants::{RX_MAX_RETRIES_PER_BURST, WATCHDOG_INTERVAL};
use crate::state::now_secs;

use super::{irs, iss, session, EngineContext};

/// Timer loop, run by the watchdog thread.
pub(crate) fn run(ctx: EngineContext) {
    log::info!("watchdog started");
    loop {
        if ctx.shutdown.load(Ordering::SeqCst) {
            break;
        }
        std::thread::sleep(WATCHDOG_INTERVAL);

        let now = now_secs();
        burst_watchdog(&ctx, now);
        data_channel_watchdog(&ctx, now);
        session_watchdog(&ctx, now);
    }
    log::info!("watchdog shutting down");
}

/// IRS-side burst timer.
///
/// A silent channel past the speed level's burst timeout counts as a
/// frame timeout: the sender is told with a watchdog NACK, and every
/// second consecutive timeout steps the speed level down one notch.
/// A channel that times out [`RX_MAX_RETRIES_PER_BURST`] times is dead.
pub(crate) fn burst_watchdog(ctx: &EngineContext, now: u64) {
    let state = &ctx.state;
    if !state.is_irs.load(Ordering::SeqCst) || !state.arq_state.load(Ordering::SeqCst) {
        return;
    }

    let deadline =
        state.data_channel_last_received.load(Ordering::SeqCst) + state.current_burst_timeout();
    if now <= deadline {
        return;
    }

    log::warn!(
        "frame timeout attempt={}/{} speed_level={}",
        state.rx_retries_per_burst.load(Ordering::SeqCst),
        RX_MAX_RETRIES_PER_BURST,
        state.speed_level.load(Ordering::SeqCst)
    );

    state.frame_received_counter.store(0, Ordering::SeqCst);
    let nacks = state.burst_nack_counter.fetch_add(1, Ordering::SeqCst) + 1;
    if nacks >= 2 {
        state.burst_nack_counter.store(0, Ordering::SeqCst);
        let level = state.speed_level.load(Ordering::SeqCst);
        state.set_speed_level(level.saturating_sub(1));
    }
    state.listening.enable(state.current_mode());

    irs::send_burst_nack_watchdog(ctx, 0);
    state.touch_data_channel();

    let timeouts = state.rx_retries_per_burst.fetch_add(1, Ordering::SeqCst) + 1;
    if timeouts >= RX_MAX_RETRIES_PER_BURST {
        iss::stop_transmission(ctx);
        state.arq_cleanup();
    }
}

/// Data-channel keepalive: a transfer with no inbound frame for the
/// transmission timeout has died on the air.
pub(crate) fn data_channel_watchdog(ctx: &EngineContext, now: u64) {
    let state = &ctx.state;
    if !state.arq_state.load(Ordering::SeqCst) || !state.tnc_busy.load(Ordering::SeqCst) {
        return;
    }

    let deadline =
        state.data_channel_last_received.load(Ordering::SeqCst) + ctx.transmission_timeout;
    if now <= deadline {
        return;
    }

    state.data_channel_last_received.store(0, Ordering::SeqCst);
    log::info!(
        "DATA [{}]<<T>>[{}]",
        state.mycall(),
        state.peer_callsign_string()
    );
    ctx.events.transmission_failed(state, None);
    state.arq_cleanup();
}

/// Session keepalive: while no transfer runs, heartbeats must keep the
/// session fresh or it is declared dead.
pub(crate) fn session_watchdog(ctx: &EngineContext, now: u64) {
    let state = &ctx.state;
    if !state.session_active.load(Ordering::SeqCst)
        || !state.tnc_busy.load(Ordering::SeqCst)
        || state.file_transfer.load(Ordering::SeqCst)
    {
        return;
    }

    let deadline = state.session_last_received.load(Ordering::SeqCst) + ctx.session_timeout;
    if now <= deadline {
        return;
    }

    log::info!(
        "SESSION [{}]<<T>>[{}]",
        state.mycall(),
        state.peer_callsign_string()
    );
    ctx.events.session_failed("timeout");
    session::close_session(ctx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arq::test_support::test_harness;
    use crate::frame::{frame_type, Frame};
    use crate::state::now_secs;

    #[test]
    fn test_burst_watchdog_idle_when_not_irs() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        ctx.state.arq_state.store(true, Ordering::SeqCst);

        burst_watchdog(&ctx, now_secs() + 1000);
        assert!(harness.sent.try_recv().is_err());
    }

    #[test]
    fn test_burst_watchdog_speed_down_every_second_timeout() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        let state = &ctx.state;

        state.arq_state.store(true, Ordering::SeqCst);
        state.tnc_busy.store(true, Ordering::SeqCst);
        state.is_irs.store(true, Ordering::SeqCst);
        state.set_speed_level(2);

        let mut now = now_secs();
        let mut levels = Vec::new();
        for _ in 0..5 {
            // Put the last-received stamp far enough in the past.
            state.data_channel_last_received.store(now.saturating_sub(100), Ordering::SeqCst);
            burst_watchdog(&ctx, now);
            levels.push(state.speed_level.load(Ordering::SeqCst));
            now += 100;
        }

        // Speed drops by one on the 2nd and 4th timeout, floors at 0.
        assert_eq!(levels, vec![2, 1, 1, 0, 0]);

        // Every timeout emitted a watchdog NACK carrying the speed byte.
        let mut nack_speeds = Vec::new();
        while let Ok(request) = harness.sent.try_recv() {
            let decoded = Frame::decode(&request.frame).unwrap();
            if let Frame::BurstNackWatchdog { speed_level, .. } = decoded {
                assert_eq!(request.frame[0], frame_type::BURST_NACK_WATCHDOG);
                nack_speeds.push(speed_level);
            }
        }
        assert_eq!(nack_speeds.len(), 5);
    }

    #[test]
    fn test_burst_watchdog_respects_fresh_channel() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        let state = &ctx.state;

        state.arq_state.store(true, Ordering::SeqCst);
        state.is_irs.store(true, Ordering::SeqCst);
        let now = now_secs();
        state.data_channel_last_received.store(now, Ordering::SeqCst);

        burst_watchdog(&ctx, now + 1);
        assert!(harness.sent.try_recv().is_err(), "no NACK before the burst timeout");
    }

    #[test]
    fn test_data_channel_watchdog_tears_down_dead_channel() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        let state = &ctx.state;

        state.arq_state.store(true, Ordering::SeqCst);
        state.tnc_busy.store(true, Ordering::SeqCst);
        let now = now_secs();
        state.data_channel_last_received.store(now.saturating_sub(400), Ordering::SeqCst);

        data_channel_watchdog(&ctx, now);

        assert!(!state.arq_state.load(Ordering::SeqCst));
        let event: serde_json::Value =
            serde_json::from_str(&harness.events.try_recv().unwrap()).unwrap();
        assert_eq!(event["arq"], "transmission");
        assert_eq!(event["status"], "failed");
    }

    #[test]
    fn test_session_watchdog_quiet_during_transfer() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        let state = &ctx.state;

        state.session_active.store(true, Ordering::SeqCst);
        state.tnc_busy.store(true, Ordering::SeqCst);
        state.file_transfer.store(true, Ordering::SeqCst);
        state.session_last_received.store(0, Ordering::SeqCst);

        session_watchdog(&ctx, now_secs());
        assert!(harness.events.try_recv().is_err());
        assert!(state.session_active.load(Ordering::SeqCst));
    }

    #[test]
    fn test_session_watchdog_closes_idle_session() {
        let harness = test_harness(Default::default());
        let ctx = harness.ctx.clone();
        let state = &ctx.state;

        state.session_active.store(true, Ordering::SeqCst);
        state.tnc_busy.store(true, Ordering::SeqCst);
        let now = now_secs();
        state.session_last_received.store(now.saturating_sub(60), Ordering::SeqCst);

        session_watchdog(&ctx, now);

        assert!(!state.session_active.load(Ordering::SeqCst));
        let event: serde_json::Value =
            serde_json::from_str(&harness.events.try_recv().unwrap()).unwrap();
        assert_eq!(event["arq"], "session");
        assert_eq!(event["status"], "failed");
        assert_eq!(event["reason"], "timeout");
    }
}
