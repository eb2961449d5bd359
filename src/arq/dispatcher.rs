//! Inbound frame router.
//!
//! Every decoded frame passes one destination gate, then fans out by
//! type. Broadcast-class frames (CQ, QRV, PING, beacon) are accepted
//! regardless of their destination; everything else must carry our
//! CRC-24 tag (any SSID) or it is silently dropped — a misdirected frame
//! is another conversation, not an error.

use std::sync::atomic::Ordering;

use crate::broadcast;
use crate::frame::{Frame, FrameError};
use crate::modem::RxFrame;
use crate::state::BurstReply;

use super::{channel, irs, iss, session, EngineContext};

/// Classify and route one decoded frame from the modem.
pub(crate) fn process_frame(ctx: &EngineContext, rx_frame: RxFrame) {
    let state = &ctx.state;
    state.snr.store(rx_frame.snr, Ordering::SeqCst);
    let snr = rx_frame.snr;

    let frame = match Frame::decode(&rx_frame.data) {
        Ok(frame) => frame,
        Err(FrameError::UnknownType(t)) => {
            log::warn!("unknown frame type {t}");
            return;
        }
        Err(err) => {
            log::debug!("dropping undecodable frame: {err}");
            return;
        }
    };

    if let Some(dest) = destination_crc(&frame) {
        let (valid, _) = state.mycall().matches_crc(&dest);
        if !valid {
            log::debug!("frame type {} not for this station", frame.type_code());
            return;
        }
    }

    log::debug!("rx frame type {} snr={snr}", frame.type_code());
    match frame {
        Frame::BurstData { index, n_frames, dxcrc, mycrc: _, payload } => {
            irs::data_frame_received(ctx, index, n_frames, dxcrc, snr, payload);
        }

        Frame::BurstAck { snr: peer_snr, speed_level, .. } => {
            if state.arq_state.load(Ordering::SeqCst) {
                record_channel_peer(ctx, snr);
                state.touch_data_channel();
                state.send_burst_reply(BurstReply::BurstAck { snr: peer_snr, speed_level });
            }
        }

        Frame::FrameAck { .. } => {
            if state.arq_state.load(Ordering::SeqCst) {
                record_channel_peer(ctx, snr);
                state.touch_data_channel();
                state.touch_session();
                state.send_burst_reply(BurstReply::FrameAck);
            }
        }

        Frame::RptRequest { missing, .. } => {
            if state.arq_state.load(Ordering::SeqCst) && state.tnc_busy.load(Ordering::SeqCst) {
                record_channel_peer(ctx, snr);
                state.touch_data_channel();
                state.send_burst_reply(BurstReply::Rpt { missing });
            }
        }

        Frame::BurstNack { snr: peer_snr, speed_level, .. }
        | Frame::BurstNackWatchdog { snr: peer_snr, speed_level, .. } => {
            if state.arq_state.load(Ordering::SeqCst) {
                record_channel_peer(ctx, snr);
                state.touch_data_channel();
                state.send_burst_reply(BurstReply::BurstNack { snr: peer_snr, speed_level });
            }
        }

        Frame::Cq { callsign, grid } => broadcast::received_cq(ctx, &callsign, &grid, snr),
        Frame::Qrv { callsign, grid } => broadcast::received_qrv(ctx, &callsign, &grid, snr),
        Frame::Ping { dxcrc, mycrc, callsign } => {
            broadcast::received_ping(ctx, dxcrc, mycrc, &callsign, snr);
        }
        Frame::PingAck { mycrc, grid, .. } => {
            broadcast::received_ping_ack(ctx, mycrc, &grid, snr);
        }

        Frame::SessionOpen { mycrc, callsign, .. } => {
            session::received_session_opener(ctx, mycrc, callsign);
        }
        Frame::SessionHeartbeat { mycrc, .. } => session::received_session_heartbeat(ctx, mycrc),
        Frame::SessionClose { mycrc, .. } => session::received_session_close(ctx, mycrc),

        Frame::ChannelOpen { profile, dxcrc, mycrc, callsign, n_frames_per_burst } => {
            channel::received_channel_opener(ctx, profile, dxcrc, mycrc, callsign, n_frames_per_burst);
        }
        Frame::ChannelOpenAck { profile, protocol_version, .. } => {
            channel::received_channel_ack(ctx, profile, protocol_version);
        }

        Frame::Stop { .. } => iss::received_stop(ctx),
        Frame::Beacon { callsign, grid } => broadcast::received_beacon(ctx, &callsign, &grid, snr),
        Frame::Test => log::debug!("test frame received"),
    }
}

/// The destination tag a frame must carry to pass the gate, if any.
fn destination_crc(frame: &Frame) -> Option<[u8; 3]> {
    match frame {
        // Broadcast class: anyone may hear these.
        Frame::Cq { .. }
        | Frame::Qrv { .. }
        | Frame::Ping { .. }
        | Frame::Beacon { .. }
        | Frame::Test => None,

        Frame::BurstData { dxcrc, .. }
        | Frame::BurstAck { dxcrc, .. }
        | Frame::FrameAck { dxcrc, .. }
        | Frame::RptRequest { dxcrc, .. }
        | Frame::BurstNack { dxcrc, .. }
        | Frame::BurstNackWatchdog { dxcrc, .. }
        | Frame::PingAck { dxcrc, .. }
        | Frame::SessionOpen { dxcrc, .. }
        | Frame::SessionHeartbeat { dxcrc, .. }
        | Frame::SessionClose { dxcrc, .. }
        | Frame::ChannelOpen { dxcrc, .. }
        | Frame::ChannelOpenAck { dxcrc, .. }
        | Frame::Stop { dxcrc, .. } => Some(*dxcrc),
    }
}

/// Log the channel peer into the heard-stations list.
fn record_channel_peer(ctx: &EngineContext, snr: u8) {
    let peer = ctx.state.peer_snapshot();
    if let Some(callsign) = peer.callsign.as_ref() {
        ctx.state.record_heard(callsign, &peer.grid, "DATA-CHANNEL", snr);
    }
}
