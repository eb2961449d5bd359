//! Event queue toward the UI socket.
//!
//! Every record is a JSON object tagged `freedata: "tnc-message"` plus a
//! category key (`arq`, `ping`, `cq`, `qrv`, `beacon`) and a status. The
//! engine serializes here and pushes the string onto an mpsc channel;
//! whoever owns the socket drains it. Senders never block and ignore a
//! disconnected consumer — a UI going away must not stall the protocol.

use std::sync::mpsc::Sender;

use serde_json::json;

use crate::state::LinkState;

/// Handle for emitting UI events from any worker.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<String>,
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender").finish_non_exhaustive()
    }
}

impl EventSender {
    pub fn new(tx: Sender<String>) -> Self {
        Self { tx }
    }

    /// Serialize and queue one event record.
    pub fn emit(&self, mut value: serde_json::Value) {
        if let Some(map) = value.as_object_mut() {
            map.insert("freedata".to_string(), json!("tnc-message"));
        }
        log::debug!("socket event: {value}");
        let _ = self.tx.send(value.to_string());
    }

    // ========================================================================
    // Session events
    // ========================================================================

    pub fn session_state(&self, status: &str) {
        self.emit(json!({ "arq": "session", "status": status }));
    }

    pub fn session_failed(&self, reason: &str) {
        self.emit(json!({ "arq": "session", "status": "failed", "reason": reason }));
    }

    // ========================================================================
    // Transmission events
    // ========================================================================

    pub fn transmission_state(&self, status: &str) {
        self.emit(json!({ "arq": "transmission", "status": status }));
    }

    pub fn transmission_progress(&self, status: &str, state: &LinkState) {
        let stats = state.stats.lock().expect("stats lock").clone();
        self.emit(json!({
            "arq": "transmission",
            "status": status,
            "uuid": state.transmission_uuid(),
            "percent": stats.percent,
            "bytesperminute": stats.bytes_per_minute,
        }));
    }

    pub fn transmission_failed(&self, state: &LinkState, reason: Option<&str>) {
        let stats = state.stats.lock().expect("stats lock").clone();
        let mut value = json!({
            "arq": "transmission",
            "status": "failed",
            "uuid": state.transmission_uuid(),
            "percent": stats.percent,
            "bytesperminute": stats.bytes_per_minute,
        });
        if let Some(reason) = reason {
            value["reason"] = json!(reason);
        }
        self.emit(value);
    }

    /// A complete payload was reassembled and verified.
    #[allow(clippy::too_many_arguments)]
    pub fn transmission_received(
        &self,
        uuid: &str,
        timestamp: i64,
        mycallsign: &str,
        dxcallsign: &str,
        dxgrid: &str,
        base64_data: &str,
    ) {
        self.emit(json!({
            "arq": "transmission",
            "status": "received",
            "uuid": uuid,
            "timestamp": timestamp,
            "mycallsign": mycallsign,
            "dxcallsign": dxcallsign,
            "dxgrid": dxgrid,
            "data": base64_data,
        }));
    }

    pub fn transmission_stopped(&self, state: &LinkState) {
        self.emit(json!({
            "arq": "transmission",
            "status": "stopped",
            "uuid": state.transmission_uuid(),
            "mycallsign": state.mycall().to_string(),
            "dxcallsign": state.peer_callsign_string(),
        }));
    }

    // ========================================================================
    // Broadcast events
    // ========================================================================

    pub fn ping_transmitting(&self) {
        self.emit(json!({ "ping": "transmitting" }));
    }

    #[allow(clippy::too_many_arguments)]
    pub fn ping_event(
        &self,
        status: &str,
        uuid: &str,
        timestamp: i64,
        mycallsign: &str,
        dxcallsign: &str,
        dxgrid: &str,
        snr: u8,
    ) {
        self.emit(json!({
            "ping": status,
            "uuid": uuid,
            "timestamp": timestamp,
            "mycallsign": mycallsign,
            "dxcallsign": dxcallsign,
            "dxgrid": dxgrid,
            "snr": snr.to_string(),
        }));
    }

    pub fn cq_transmitting(&self) {
        self.emit(json!({ "cq": "transmitting" }));
    }

    pub fn cq_received(&self, mycallsign: &str, dxcallsign: &str, dxgrid: &str) {
        self.emit(json!({
            "cq": "received",
            "mycallsign": mycallsign,
            "dxcallsign": dxcallsign,
            "dxgrid": dxgrid,
        }));
    }

    pub fn qrv_transmitting(&self) {
        self.emit(json!({ "qrv": "transmitting" }));
    }

    pub fn qrv_received(&self, dxcallsign: &str, dxgrid: &str, snr: u8) {
        self.emit(json!({
            "qrv": "received",
            "dxcallsign": dxcallsign,
            "dxgrid": dxgrid,
            "snr": snr.to_string(),
        }));
    }

    pub fn beacon_transmitting(&self, interval: u64) {
        self.emit(json!({ "beacon": "transmitting", "interval": interval }));
    }

    pub fn beacon_received(&self, dxcallsign: &str, dxgrid: &str, snr: u8) {
        self.emit(json!({
            "beacon": "received",
            "dxcallsign": dxcallsign,
            "dxgrid": dxgrid,
            "snr": snr.to_string(),
        }));
    }
}
