//! Data channel controller.
//!
//! Opens a bulk-transfer channel over an established session (or
//! standalone), negotiating the bandwidth profile. The requester asks
//! for high bandwidth unless configured low; the responder grants low
//! bandwidth whenever either side wants it — a downgrade is always
//! acceptable, an upgrade never is. The open response carries the
//! protocol version; a mismatch aborts before any data moves.

use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;

use crate::callsign::Callsign;
use crate::constants::{ARQ_PROTOCOL_VERSION, CONNECT_ATTEMPT_TIMEOUT};
use crate::frame::{frame_type, BandwidthProfile, Frame};
use crate::modem::MODE_AUTO;
use crate::state::{now_secs, Profile};

use super::{iss, sliced_sleep, wait_for, EngineContext};

/// Entry point for the `ARQ_RAW` command: open a data channel to the
/// recorded peer, then push `data` through the burst engine.
pub(crate) fn open_and_transmit(
    ctx: &EngineContext,
    data: Bytes,
    mode: u8,
    n_frames_per_burst: u8,
    uuid: &str,
    mycall: Callsign,
) -> bool {
    let state = &ctx.state;

    // The transfer may run under a different SSID than the session.
    *state.mycall.lock().expect("mycall lock") = mycall;

    state.tnc_busy.store(true, Ordering::SeqCst);
    state.file_transfer.store(true, Ordering::SeqCst);
    state.set_transmission_uuid(uuid);

    // Give a heartbeat already in flight towards us time to land.
    if state.session_active.load(Ordering::SeqCst) {
        sliced_sleep(ctx, Duration::from_millis(500));
    }

    if !open_data_channel(ctx, mode, n_frames_per_burst) {
        return false;
    }

    iss::transmit(ctx, &data, mode, n_frames_per_burst);
    true
}

/// Open-retry loop: request the channel until the far side grants it.
fn open_data_channel(ctx: &EngineContext, mode: u8, n_frames_per_burst: u8) -> bool {
    let state = &ctx.state;

    state.is_irs.store(false, Ordering::SeqCst);
    state.touch_data_channel();

    let profile = if (frame_type::CHANNEL_OPEN_MANUAL_MIN..=frame_type::CHANNEL_OPEN_MANUAL_MAX)
        .contains(&mode)
    {
        BandwidthProfile::Manual(mode)
    } else if state.low_bandwidth_mode && mode == MODE_AUTO {
        log::debug!("requesting low bandwidth mode");
        BandwidthProfile::Low
    } else {
        log::debug!("requesting high bandwidth mode");
        BandwidthProfile::High
    };

    let open_frame = Frame::ChannelOpen {
        profile,
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        callsign: state.mycall(),
        n_frames_per_burst,
    };

    for attempt in 0..ctx.data_channel_max_retries {
        ctx.events.transmission_state("opening");
        log::info!(
            "ARQ | DATA | TX | [{}]>> <<[{}] attempt={}/{}",
            state.mycall(),
            state.peer_callsign_string(),
            attempt + 1,
            ctx.data_channel_max_retries
        );

        ctx.gateway.enqueue_signalling(open_frame.encode());

        let opened = wait_for(ctx, CONNECT_ATTEMPT_TIMEOUT, || {
            state.arq_state.load(Ordering::SeqCst)
        });
        if opened {
            return true;
        }
    }

    log::warn!(
        "ARQ | TX | DATA [{}]>>X<<[{}]",
        state.mycall(),
        state.peer_callsign_string()
    );
    ctx.events.transmission_failed(state, Some("unknown"));
    state.arq_cleanup();

    // The far side may have heard the open frames without us hearing the
    // response; close the session to clean it up too.
    super::session::close_session(ctx);
    false
}

/// Inbound channel open request: become IRS and grant a profile.
pub(crate) fn received_channel_opener(
    ctx: &EngineContext,
    request: BandwidthProfile,
    dest_crc: [u8; 3],
    their_crc: [u8; 3],
    callsign: Callsign,
    _n_frames_per_burst: u8,
) {
    let state = &ctx.state;

    state.file_transfer.store(true, Ordering::SeqCst);
    state.is_irs.store(true, Ordering::SeqCst);
    ctx.events.transmission_state("opening");

    {
        let mut peer = state.peer.lock().expect("peer lock");
        peer.crc = their_crc;
        peer.callsign = Some(callsign.clone());
    }

    // Only an explicit high-bandwidth request keeps the wide profile;
    // low-bandwidth and manual requests run on the narrow mode set.
    let peer_low = request != BandwidthProfile::High;
    state.peer_low_bandwidth.store(peer_low, Ordering::SeqCst);
    if let BandwidthProfile::Manual(mode) = request {
        log::debug!("manual mode channel request: {mode}");
    }
    state.set_profile(if peer_low {
        Profile::low_bandwidth()
    } else {
        Profile::high_bandwidth()
    });
    state.listening.enable(state.current_mode());

    let snr = state.snr.load(Ordering::SeqCst);
    state.record_heard(&callsign, "", "DATA-CHANNEL", snr);

    let (valid, mycallsign) = state.mycall().matches_crc(&dest_crc);
    if !valid {
        // Channel request for another station.
        state.arq_cleanup();
        return;
    }

    log::info!("ARQ | DATA | RX | [{mycallsign}]>> <<[{callsign}]");

    state.arq_state.store(true, Ordering::SeqCst);
    state.tnc_busy.store(true, Ordering::SeqCst);
    state.stats.lock().expect("stats lock").reset();
    state.touch_data_channel();

    // Downgrade whenever either side wants the narrow profile.
    let grant_low = state.low_bandwidth_mode || peer_low;
    let ack = Frame::ChannelOpenAck {
        profile: if grant_low {
            BandwidthProfile::Low
        } else {
            BandwidthProfile::High
        },
        dxcrc: their_crc,
        mycrc: state.mycall_crc(),
        protocol_version: ARQ_PROTOCOL_VERSION,
    };
    if grant_low && !peer_low {
        state.set_profile(Profile::low_bandwidth());
        state.listening.enable(state.current_mode());
    }
    log::debug!(
        "responding with {} bandwidth mode",
        if grant_low { "low" } else { "high" }
    );
    ctx.gateway.enqueue_signalling(ack.encode());

    log::info!("ARQ | DATA | RX | [{mycallsign}]>>|<<[{callsign}] snr={snr}");

    state.rx.lock().expect("rx lock").start_of_transmission = now_secs();
    state.touch_data_channel();
}

/// Inbound channel open response: adopt the granted profile or abort on
/// a protocol version mismatch.
pub(crate) fn received_channel_ack(
    ctx: &EngineContext,
    granted: BandwidthProfile,
    protocol_version: u8,
) {
    let state = &ctx.state;

    if protocol_version != ARQ_PROTOCOL_VERSION {
        log::warn!(
            "protocol version mismatch: received={protocol_version} own={}",
            ARQ_PROTOCOL_VERSION
        );
        state.tnc_busy.store(false, Ordering::SeqCst);
        state.arq_state.store(false, Ordering::SeqCst);
        ctx.events
            .transmission_failed(state, Some("protocol version mismatch"));
        state.arq_cleanup();
        return;
    }

    ctx.events.transmission_state("opened");

    let low = granted == BandwidthProfile::Low;
    state.peer_low_bandwidth.store(low, Ordering::SeqCst);
    state.set_profile(if low {
        Profile::low_bandwidth()
    } else {
        Profile::high_bandwidth()
    });
    log::debug!(
        "{} bandwidth mode granted",
        if low { "low" } else { "high" }
    );

    let peer = state.peer_snapshot();
    if let Some(callsign) = peer.callsign.as_ref() {
        state.record_heard(callsign, &peer.grid, "DATA-CHANNEL", state.snr.load(Ordering::SeqCst));
        log::info!("ARQ | DATA | TX | [{}]>>|<<[{}]", state.mycall(), callsign);
    }

    // Transmission starts the moment the ARQ flag goes up.
    state.arq_state.store(true, Ordering::SeqCst);
    state.touch_data_channel();
}
