//! Burst engine, receiving side (Information Receiving Station).
//!
//! Data frames land in a slot buffer sized by the burst geometry the
//! sender announces in every frame. A completed burst is appended to the
//! frame buffer — unless its bytes already sit at the tail, which means
//! the previous ACK was lost and only the ACK needs repeating. Gaps are
//! reported with a repeat request as soon as the last frame of a burst
//! arrives. When the BOF and EOF markers bracket a verified payload, the
//! transfer is delivered to the UI and acknowledged as a whole.

use std::sync::atomic::Ordering;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;

use crate::callsign::payload_crc32;
use crate::constants::{
    FRAME_ACK_COPIES, FRAME_ACK_REPEAT_DELAY, RPT_MAX_MISSING, RX_TAIL_SEARCH_AREA,
};
use crate::frame::Frame;
use crate::modem::FreedvMode;
use crate::state::now_secs;

use super::{payload, EngineContext};

/// Handle one inbound data frame (types 10–50).
pub(crate) fn data_frame_received(
    ctx: &EngineContext,
    index: u8,
    n_frames: u8,
    dest_crc: [u8; 3],
    snr: u8,
    frame_payload: Bytes,
) {
    let state = &ctx.state;

    let (valid, _mycallsign) = state.mycall().matches_crc(&dest_crc);
    if !valid {
        // Data channel for another station.
        state.arq_cleanup();
        return;
    }

    // Unsolicited data while fully idle is noise.
    if !state.arq_state.load(Ordering::SeqCst) && !state.tnc_busy.load(Ordering::SeqCst) {
        return;
    }

    state.file_transfer.store(true, Ordering::SeqCst);
    state.tnc_busy.store(true, Ordering::SeqCst);
    state.arq_state.store(true, Ordering::SeqCst);
    state.touch_data_channel();

    let burst_complete;
    let last_of_burst = index == n_frames - 1;
    {
        let mut rx = state.rx.lock().expect("rx lock");
        rx.received_mycall_crc = dest_crc;

        // The slot count always mirrors the advertised burst size.
        if rx.burst.len() != usize::from(n_frames) {
            rx.burst = vec![None; usize::from(n_frames)];
        }
        rx.burst[usize::from(index)] = Some(frame_payload.to_vec());
        burst_complete = rx.burst.iter().all(Option::is_some);
    }

    let peer = state.peer_snapshot();
    if let Some(callsign) = peer.callsign.as_ref() {
        state.record_heard(callsign, &peer.grid, "DATA-CHANNEL", snr);
    }

    if burst_complete {
        store_completed_burst(ctx, &frame_payload, snr);
    } else if last_of_burst {
        // The tail arrived but earlier slots are empty: every missing
        // frame is known now, ask for exactly those.
        request_missing_frames(ctx);
    }
    // Otherwise: mid-burst, keep collecting.

    check_transfer_complete(ctx, snr);
}

/// Append a completed burst to the frame buffer, deduplicating against
/// the tail, and acknowledge it.
fn store_completed_burst(ctx: &EngineContext, triggering_payload: &[u8], snr: u8) {
    let state = &ctx.state;

    let mut rx = state.rx.lock().expect("rx lock");
    let assembled: Vec<u8> = rx
        .burst
        .iter()
        .flat_map(|slot| slot.as_deref().unwrap_or_default())
        .copied()
        .collect();

    if rx.frame.ends_with(&assembled) {
        // The burst arrived before but our ACK did not; repeat it.
        log::info!("ARQ | RX | burst already received - sending ACK again");
        rx.burst.clear();
    } else {
        // A duplicate may straddle the tail if the previous append was
        // only partially covered by a lost signalling round. Search the
        // last stretch of the buffer and replace instead of growing.
        let search_start = rx.frame.len().saturating_sub(RX_TAIL_SEARCH_AREA);
        let found = rfind(&rx.frame[search_start..], &assembled);
        if let Some(pos) = found {
            log::warn!(
                "ARQ | RX | replacing existing buffer data at tail offset {pos}"
            );
            rx.frame.truncate(search_start + pos);
        }
        rx.frame.extend_from_slice(&assembled);
    }

    let bof_eof_pending = !rx.bof_seen && !rx.eof_seen;
    let frame_len = rx.frame.len();
    let started = rx.start_of_transmission;
    drop(rx);

    // Acknowledge mid-transfer bursts only; a burst carrying the EOF is
    // acknowledged once, as a whole, by the completion path.
    if bof_eof_pending && !contains(triggering_payload, payload::EOF) {
        let speed_up = state.frame_received_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if speed_up >= 2 {
            state.frame_received_counter.store(0, Ordering::SeqCst);
            let level = state.speed_level.load(Ordering::SeqCst);
            state.set_speed_level(level + 1);
        }
        state.listening.enable(state.current_mode());

        log::info!("ARQ | RX | sending burst ACK");
        send_burst_ack(ctx, snr);
        state.rx_retries_per_burst.store(0, Ordering::SeqCst);

        let elapsed = now_secs().saturating_sub(started) as f64;
        state
            .stats
            .lock()
            .expect("stats lock")
            .update_rx(frame_len, elapsed);
    }
}

/// Emit a repeat request for the empty burst slots.
fn request_missing_frames(ctx: &EngineContext) {
    let state = &ctx.state;

    let missing: Vec<u8> = {
        let rx = state.rx.lock().expect("rx lock");
        rx.burst
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| (i + 1) as u8)
            .take(RPT_MAX_MISSING)
            .collect()
    };

    log::info!("ARQ | RX | requesting frames {missing:?}");
    let frame = Frame::RptRequest {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        missing,
    };
    ctx.gateway.enqueue_signalling(frame.encode());

    let (frame_len, started) = {
        let rx = state.rx.lock().expect("rx lock");
        (rx.frame.len(), rx.start_of_transmission)
    };
    let elapsed = now_secs().saturating_sub(started) as f64;
    state
        .stats
        .lock()
        .expect("stats lock")
        .update_rx(frame_len, elapsed);
}

/// Deliver the transfer once BOF and EOF bracket a complete buffer.
fn check_transfer_complete(ctx: &EngineContext, snr: u8) {
    let state = &ctx.state;

    let section = {
        let mut rx = state.rx.lock().expect("rx lock");

        let bof = payload::find_bof(&rx.frame);
        let eof = payload::find_eof(&rx.frame);

        // Size and ratio are known as soon as the header went past.
        if let Some(bof) = bof {
            let start = bof + payload::BOF.len();
            if let Some(section) = rx.frame.get(start..) {
                if let Some(parsed) = payload::parse_section(section) {
                    let mut stats = state.stats.lock().expect("stats lock");
                    stats.total_bytes = parsed.length as usize;
                    stats.compression_factor = f64::from(parsed.compression_ratio) / 10.0;
                }
            }
        }

        let (Some(bof), Some(eof)) = (bof, eof) else {
            return;
        };
        if eof <= bof || !rx.burst.iter().all(Option::is_some) {
            return;
        }

        rx.bof_seen = true;
        rx.eof_seen = true;
        let section = rx.frame[bof + payload::BOF.len()..eof].to_vec();
        section
    };

    let delivered = deliver_payload(ctx, &section, snr);
    if !delivered {
        log::info!("ARQ | RX | sending NACK");
        send_burst_nack(ctx, snr);
    }

    state.touch_session();
    state.arq_cleanup();
}

/// Verify, decompress and hand the payload to the UI.
///
/// Returns false when the payload must be negative-acknowledged.
fn deliver_payload(ctx: &EngineContext, section: &[u8], snr: u8) -> bool {
    let state = &ctx.state;

    let Some(parsed) = payload::parse_section(section) else {
        log::warn!("ARQ | RX | transfer section shorter than its header");
        ctx.events.transmission_failed(state, None);
        return false;
    };

    let computed = payload_crc32(&parsed.compressed);
    if parsed.crc != computed {
        ctx.events.transmission_failed(state, None);
        log::warn!(
            "ARQ | RX | DATA FRAME NOT SUCCESSFULLY RECEIVED: expected crc {:02x?}, got {:02x?}",
            parsed.crc,
            computed
        );
        return false;
    }

    let data = match payload::decompress(&parsed.compressed) {
        Ok(data) => data,
        Err(err) => {
            // CRC passed but the stream is unusable; retransmission
            // cannot improve on that, so fail without a NACK.
            log::error!("ARQ | RX | decompression failed: {err}");
            ctx.events.transmission_failed(state, None);
            return true;
        }
    };

    {
        let mut stats = state.stats.lock().expect("stats lock");
        stats.compression_factor = data.len() as f64 / parsed.compressed.len().max(1) as f64;
    }

    let uuid = uuid::Uuid::new_v4().to_string();
    state.set_transmission_uuid(&uuid);
    let timestamp = chrono::Utc::now().timestamp();

    let received_crc = state.rx.lock().expect("rx lock").received_mycall_crc;
    let (_, effective_mycall) = state.mycall().matches_crc(&received_crc);
    let peer = state.peer_snapshot();

    log::info!("ARQ | RX | DATA FRAME SUCCESSFULLY RECEIVED");
    ctx.events.transmission_received(
        &uuid,
        timestamp,
        &effective_mycall.to_string(),
        &peer.callsign.map(|c| c.to_string()).unwrap_or_default(),
        &peer.grid,
        &BASE64.encode(&data),
    );

    log::info!("ARQ | RX | SENDING DATA FRAME ACK snr={snr}");
    send_frame_ack(ctx, snr);

    let (frame_len, started) = {
        let rx = state.rx.lock().expect("rx lock");
        (rx.frame.len(), rx.start_of_transmission)
    };
    let elapsed = now_secs().saturating_sub(started) as f64;
    state
        .stats
        .lock()
        .expect("stats lock")
        .update_rx(frame_len, elapsed);

    true
}

// ============================================================================
// Signalling frame senders
// ============================================================================

/// Current speed level as the wire byte every 60/61/63/64 frame carries.
fn speed_byte(ctx: &EngineContext) -> u8 {
    ctx.state.speed_level.load(Ordering::SeqCst).min(255) as u8
}

pub(crate) fn send_burst_ack(ctx: &EngineContext, snr: u8) {
    let state = &ctx.state;
    let frame = Frame::BurstAck {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        snr,
        speed_level: speed_byte(ctx),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn send_frame_ack(ctx: &EngineContext, snr: u8) {
    let state = &ctx.state;
    let frame = Frame::FrameAck {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        snr,
        speed_level: speed_byte(ctx),
    };
    ctx.gateway.enqueue(
        frame.encode(),
        FreedvMode::Datac0,
        FRAME_ACK_COPIES,
        FRAME_ACK_REPEAT_DELAY,
    );
}

pub(crate) fn send_burst_nack(ctx: &EngineContext, snr: u8) {
    let state = &ctx.state;
    let frame = Frame::BurstNack {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        snr,
        speed_level: speed_byte(ctx),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

pub(crate) fn send_burst_nack_watchdog(ctx: &EngineContext, snr: u8) {
    let state = &ctx.state;
    let frame = Frame::BurstNackWatchdog {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        snr,
        speed_level: speed_byte(ctx),
    };
    ctx.gateway.enqueue_signalling(frame.encode());
}

// ============================================================================
// Byte-hunting helpers
// ============================================================================

/// Last occurrence of `needle` in `haystack`.
fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).rev().find(|&i| &haystack[i..i + needle.len()] == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
