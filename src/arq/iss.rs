//! Burst engine, sending side (Information Sending Station).
//!
//! The wire buffer (compressed payload wrapped in BOF/EOF, see
//! [`super::payload`]) is sliced into bursts of up to `n` data frames.
//! Each burst is transmitted, then the engine parks on a fresh reply
//! channel until the dispatcher routes in the receiver's verdict:
//!
//! - burst ACK: advance and continue at the peer's requested speed
//! - burst NACK (explicit or watchdog): retransmit, budget permitting
//! - repeat request: resend only the listed frames, keep waiting
//! - frame ACK: the whole transfer arrived, stop
//!
//! The wait is bounded only by the ARQ-state flag; pacing comes from the
//! receiver's watchdog NACKs, not from a local timer.

use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::constants::{STOP_COPIES, STOP_REPEAT_DELAY, TX_MAX_RETRIES_PER_BURST};
use crate::frame::{Frame, DATA_BASE, DATA_HEADER_LEN, DATA_MAX};
use crate::modem::{FreedvMode, MODE_AUTO};
use crate::state::BurstReply;

use super::{payload, EngineContext};

/// Transmit one payload over the open data channel.
pub(crate) fn transmit(ctx: &EngineContext, data: &Bytes, mode_code: u8, n_frames_per_burst: u8) {
    let state = &ctx.state;

    state.file_transfer.store(true, Ordering::SeqCst);
    state.set_speed_level(state.profile_snapshot().max_speed_level());

    let fixed_mode = if mode_code == MODE_AUTO {
        None
    } else {
        FreedvMode::from_code(mode_code)
    };
    let burst_size = usize::from(n_frames_per_burst).clamp(1, usize::from(DATA_MAX - DATA_BASE + 1));

    let (wire, factor) = payload::assemble(data);
    {
        let mut stats = state.stats.lock().expect("stats lock");
        stats.reset();
        stats.total_bytes = data.len();
        stats.compression_factor = factor;
    }

    ctx.events.transmission_progress("transmitting", state);
    log::info!(
        "ARQ | TX | DATACHANNEL bytes={} compressed={}",
        data.len(),
        wire.len()
    );

    let tx_start = Instant::now();
    let dxcrc = state.peer_snapshot().crc;

    let mut position = 0usize;
    let mut retries: u32 = 0;
    let mut success = false;
    let mut budget_exhausted = false;

    'transfer: while state.arq_state.load(Ordering::SeqCst) && !ctx.shutdown.load(Ordering::SeqCst)
    {
        let data_mode = fixed_mode.unwrap_or_else(|| state.current_mode());
        let capacity = data_mode.payload_per_frame() - DATA_HEADER_LEN;
        let mycrc = state.mycall_crc();

        let burst = fragment_burst(&wire, position, capacity, burst_size, dxcrc, mycrc);
        log::info!(
            "ARQ | TX | FRAMES mode={} fpb={} retry={}",
            data_mode,
            burst.len(),
            retries
        );

        let (reply_tx, reply_rx) = mpsc::channel();
        state.install_burst_reply(reply_tx);

        for frame in &burst {
            ctx.gateway
                .enqueue(frame.clone(), data_mode, 1, Duration::ZERO);
        }

        // Park until the dispatcher delivers this burst's verdict.
        loop {
            if !state.arq_state.load(Ordering::SeqCst) || ctx.shutdown.load(Ordering::SeqCst) {
                break 'transfer;
            }
            let reply = match reply_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(reply) => reply,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break 'transfer,
            };

            match reply {
                BurstReply::FrameAck => {
                    log::debug!("arq_transmit: frame ACK received, transfer complete");
                    position = wire.len();
                    success = true;
                    break 'transfer;
                }
                BurstReply::BurstAck { snr, speed_level } => {
                    // The receiver's speed request is authoritative.
                    state.set_speed_level(usize::from(speed_level));
                    log::debug!("burst ACK: snr={snr} speed_level={speed_level}");
                    retries = 0;
                    position = (position + burst.len() * capacity).min(wire.len());

                    let elapsed = tx_start.elapsed().as_secs_f64();
                    state
                        .stats
                        .lock()
                        .expect("stats lock")
                        .update_tx(position, wire.len(), elapsed);
                    ctx.events.transmission_progress("transmitting", state);

                    if position >= wire.len() {
                        // Everything is out; only the frame ACK is missing.
                        continue;
                    }
                    break;
                }
                BurstReply::BurstNack { snr, speed_level } => {
                    state.set_speed_level(usize::from(speed_level));
                    retries += 1;
                    log::warn!(
                        "burst NACK: snr={snr} speed_level={speed_level} retry={retries}/{}",
                        TX_MAX_RETRIES_PER_BURST
                    );
                    if retries >= TX_MAX_RETRIES_PER_BURST {
                        budget_exhausted = true;
                        break 'transfer;
                    }
                    break; // retransmit the same burst
                }
                BurstReply::Rpt { missing } => {
                    log::info!("ARQ | TX | repeating frames {missing:?}");
                    for idx in missing {
                        let Some(frame) = idx
                            .checked_sub(1)
                            .and_then(|i| burst.get(usize::from(i)))
                        else {
                            continue;
                        };
                        ctx.gateway
                            .enqueue(frame.clone(), data_mode, 1, Duration::ZERO);
                    }
                    // Same burst, keep waiting for its ACK.
                }
            }
        }
    }

    state.clear_burst_reply();

    {
        let elapsed = tx_start.elapsed().as_secs_f64();
        state
            .stats
            .lock()
            .expect("stats lock")
            .update_tx(position, wire.len().max(1), elapsed);
    }

    if success {
        ctx.events.transmission_progress("transmitted", state);
        let stats = state.stats.lock().expect("stats lock").clone();
        log::info!(
            "ARQ | TX | DATA TRANSMITTED bytes_per_minute={} bits_per_second={}",
            stats.bytes_per_minute,
            stats.bits_per_second
        );
    } else if budget_exhausted {
        ctx.events.transmission_failed(state, None);
        log::warn!("ARQ | TX | TRANSMISSION FAILED OR TIMED OUT");
        stop_transmission(ctx);
    }
    // A stop or teardown that cleared the ARQ flag has already reported.

    state.arq_cleanup();
}

/// Slice one burst out of the wire buffer.
///
/// Every frame carries the full ARQ header and exactly `capacity`
/// payload bytes; the final frame of the buffer is zero-padded. When the
/// buffer is exhausted the burst degrades to a single padding frame so a
/// lost frame ACK can still be re-triggered.
fn fragment_burst(
    wire: &[u8],
    position: usize,
    capacity: usize,
    max_frames: usize,
    dxcrc: [u8; 3],
    mycrc: [u8; 3],
) -> Vec<Vec<u8>> {
    let remaining = wire.len().saturating_sub(position);
    let n_frames = remaining.div_ceil(capacity).clamp(1, max_frames);

    (0..n_frames)
        .map(|i| {
            let start = (position + i * capacity).min(wire.len());
            let end = (start + capacity).min(wire.len());
            let mut chunk = wire[start..end].to_vec();
            chunk.resize(capacity, 0);

            Frame::BurstData {
                index: i as u8,
                n_frames: n_frames as u8,
                dxcrc,
                mycrc,
                payload: Bytes::from(chunk),
            }
            .encode()
        })
        .collect()
}

/// Abort the running transmission and tell the far side.
pub(crate) fn stop_transmission(ctx: &EngineContext) {
    let state = &ctx.state;
    log::warn!("stopping transmission");

    let frame = Frame::Stop {
        dxcrc: state.peer_snapshot().crc,
        mycrc: state.mycall_crc(),
        callsign: state.mycall(),
    };
    ctx.gateway
        .enqueue(frame.encode(), FreedvMode::Datac0, STOP_COPIES, STOP_REPEAT_DELAY);

    state.tnc_busy.store(false, Ordering::SeqCst);
    state.arq_state.store(false, Ordering::SeqCst);
    ctx.events.transmission_stopped(state);
    state.arq_cleanup();
}

/// The far side stopped the transmission.
pub(crate) fn received_stop(ctx: &EngineContext) {
    let state = &ctx.state;
    log::warn!("transmission stopped by far side");

    state.tnc_busy.store(false, Ordering::SeqCst);
    state.arq_state.store(false, Ordering::SeqCst);
    ctx.events.transmission_stopped(state);
    state.arq_cleanup();
}
