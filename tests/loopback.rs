//! End-to-end protocol scenarios over an in-memory simulated channel.
//!
//! Two engines are cross-wired through stand-in modems: whatever one
//! station's gateway transmits is delivered into the other station's
//! receive queue, through a per-path filter that can drop or duplicate
//! frames to simulate a bad HF channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use hflink::frame::frame_type;
use hflink::{ArqEngine, Callsign, Command, Config, Frame, RxFrame, TxRequest, MODE_AUTO};

/// How many copies of a transmitted frame reach the far side.
type Filter = Box<dyn FnMut(&[u8]) -> usize + Send>;

struct Station {
    engine: ArqEngine,
    events: Receiver<String>,
}

fn pass_all() -> Filter {
    Box::new(|_| 1)
}

/// Swallow data frames (types 10..=50), deliver everything else.
fn drop_data_frames() -> Filter {
    Box::new(|frame| usize::from(!(10..=50).contains(&frame[0])))
}

fn station(config: Config) -> (Station, Receiver<TxRequest>, Arc<AtomicBool>) {
    let (modem_tx, modem_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let transmitting = Arc::new(AtomicBool::new(false));
    let engine = ArqEngine::spawn(config, modem_tx, Arc::clone(&transmitting), event_tx);
    (Station { engine, events: event_rx }, modem_rx, transmitting)
}

/// Simulated one-way radio path. Returns the log of delivered type codes.
fn spawn_path(
    modem_rx: Receiver<TxRequest>,
    transmitting: Arc<AtomicBool>,
    far_side: Sender<RxFrame>,
    mut filter: Filter,
) -> Arc<Mutex<Vec<u8>>> {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&delivered);

    std::thread::spawn(move || {
        while let Ok(request) = modem_rx.recv() {
            for copy in 0..request.copies.max(1) {
                if copy > 0 {
                    // Keep signalling repeats, compress their spacing.
                    std::thread::sleep(request.repeat_delay.min(Duration::from_millis(20)));
                }
                for _ in 0..filter(&request.frame) {
                    log.lock().unwrap().push(request.frame[0]);
                    let _ = far_side.send(RxFrame { data: request.frame.clone(), snr: 30 });
                }
            }
            transmitting.store(false, Ordering::SeqCst);
        }
    });

    delivered
}

/// A station transmitting into the void; frames land in the returned queue.
fn lone_station(config: Config) -> (Station, Receiver<TxRequest>) {
    let (station, modem_rx, transmitting) = station(config);
    let (collect_tx, collect_rx) = mpsc::channel();

    std::thread::spawn(move || {
        while let Ok(request) = modem_rx.recv() {
            transmitting.store(false, Ordering::SeqCst);
            if collect_tx.send(request).is_err() {
                break;
            }
        }
    });

    (station, collect_rx)
}

struct LinkedPair {
    a: Station,
    b: Station,
    a_to_b: Arc<Mutex<Vec<u8>>>,
    b_to_a: Arc<Mutex<Vec<u8>>>,
}

fn linked_pair(
    a_config: Config,
    b_config: Config,
    a_filter: Filter,
    b_filter: Filter,
) -> LinkedPair {
    let (a, a_modem_rx, a_flag) = station(a_config);
    let (b, b_modem_rx, b_flag) = station(b_config);

    let a_to_b = spawn_path(a_modem_rx, a_flag, b.engine.frames(), a_filter);
    let b_to_a = spawn_path(b_modem_rx, b_flag, a.engine.frames(), b_filter);

    LinkedPair { a, b, a_to_b, b_to_a }
}

fn config(call: &str) -> Config {
    Config {
        mycallsign: call.to_string(),
        mygrid: "JN48EA".to_string(),
        respond_to_cq: false,
        ..Config::default()
    }
}

/// Drain a station's events until one matches, or time out.
fn wait_event(
    station: &Station,
    timeout: Duration,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Option<serde_json::Value> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match station.events.recv_timeout(Duration::from_millis(50)) {
            Ok(raw) => {
                let event: serde_json::Value = serde_json::from_str(&raw).expect("event is JSON");
                if pred(&event) {
                    return Some(event);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => return None,
        }
    }
    None
}

fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Deterministic incompressible-ish payload.
fn pseudo_random(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}

fn transfer(pair: &LinkedPair, payload: &[u8], n_frames_per_burst: u8) -> serde_json::Value {
    pair.a
        .engine
        .commands()
        .send(Command::ArqRaw {
            data: payload.to_vec().into(),
            mode: MODE_AUTO,
            n_frames_per_burst,
            uuid: uuid::Uuid::new_v4().to_string(),
            mycall: Callsign::parse("DN2LS").unwrap(),
        })
        .unwrap();

    wait_event(&pair.b, Duration::from_secs(30), |e| {
        e["arq"] == "transmission" && e["status"] == "received"
    })
    .expect("receiver delivers the payload")
}

fn connect(pair: &LinkedPair) {
    pair.a
        .engine
        .commands()
        .send(Command::Connect { dxcall: Callsign::parse("DL1ABC").unwrap() })
        .unwrap();

    wait_event(&pair.a, Duration::from_secs(10), |e| {
        e["arq"] == "session" && e["status"] == "connected"
    })
    .expect("initiator reaches connected");
}

// ============================================================================
// Session scenarios
// ============================================================================

#[test]
fn test_session_open_happy_path() {
    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), pass_all(), pass_all());

    pair.a
        .engine
        .commands()
        .send(Command::Connect { dxcall: Callsign::parse("DL1ABC").unwrap() })
        .unwrap();

    // Both sides report connecting, then connected.
    let connecting = wait_event(&pair.a, Duration::from_secs(5), |e| e["arq"] == "session")
        .expect("initiator session event");
    assert_eq!(connecting["status"], "connecting");

    wait_event(&pair.a, Duration::from_secs(10), |e| {
        e["arq"] == "session" && e["status"] == "connected"
    })
    .expect("initiator connected");
    wait_event(&pair.b, Duration::from_secs(10), |e| {
        e["arq"] == "session" && e["status"] == "connected"
    })
    .expect("responder connected");

    assert!(pair.a.engine.state().session_active.load(Ordering::SeqCst));
    assert!(pair.b.engine.state().session_active.load(Ordering::SeqCst));
    assert!(pair.a.engine.state().is_session_master.load(Ordering::SeqCst));
    assert!(!pair.b.engine.state().is_session_master.load(Ordering::SeqCst));

    // Orderly teardown.
    pair.a.engine.commands().send(Command::Disconnect).unwrap();
    wait_event(&pair.b, Duration::from_secs(5), |e| {
        e["arq"] == "session" && e["status"] == "close"
    })
    .expect("responder sees the close");
    assert!(wait_until(Duration::from_secs(2), || {
        !pair.b.engine.state().session_active.load(Ordering::SeqCst)
    }));
}

#[test]
fn test_session_open_timeout_against_absent_station() {
    let (station, sent) = lone_station(config("DN2LS"));

    station
        .engine
        .commands()
        .send(Command::Connect { dxcall: Callsign::parse("DL1ABC").unwrap() })
        .unwrap();

    let failed = wait_event(&station, Duration::from_secs(15), |e| {
        e["arq"] == "session" && e["status"] == "failed"
    })
    .expect("session open fails");
    assert_eq!(failed["reason"], "timeout");

    // Three open attempts, then one (repeated) close frame.
    let mut types = Vec::new();
    while let Ok(request) = sent.try_recv() {
        types.push(request.frame[0]);
    }
    assert_eq!(
        types,
        vec![
            frame_type::SESSION_OPEN,
            frame_type::SESSION_OPEN,
            frame_type::SESSION_OPEN,
            frame_type::SESSION_CLOSE,
        ]
    );
    assert!(!station.engine.state().session_active.load(Ordering::SeqCst));
}

// ============================================================================
// Transfer scenarios
// ============================================================================

#[test]
fn test_single_burst_transfer() {
    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), pass_all(), pass_all());
    connect(&pair);

    let received = transfer(&pair, b"HELLO WORLD!!", 1);

    let data = BASE64.decode(received["data"].as_str().unwrap()).unwrap();
    assert_eq!(data, b"HELLO WORLD!!");
    assert_eq!(received["dxcallsign"], "DN2LS");
    assert!(received["uuid"].as_str().is_some_and(|u| !u.is_empty()));

    // The sender reports completion.
    wait_event(&pair.a, Duration::from_secs(10), |e| {
        e["arq"] == "transmission" && e["status"] == "transmitted"
    })
    .expect("sender reports transmitted");

    // Exactly one data frame went over, and a frame ACK came back.
    assert!(wait_until(Duration::from_secs(2), || {
        pair.b_to_a.lock().unwrap().contains(&frame_type::FRAME_ACK)
    }));
    let sent = pair.a_to_b.lock().unwrap();
    assert_eq!(sent.iter().filter(|t| (10..=50).contains(*t)).count(), 1);
}

#[test]
fn test_multi_burst_transfer_round_trips() {
    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), pass_all(), pass_all());
    connect(&pair);

    let payload = pseudo_random(1500);
    let received = transfer(&pair, &payload, 1);

    let data = BASE64.decode(received["data"].as_str().unwrap()).unwrap();
    assert_eq!(data, payload);

    // Mid-transfer bursts were acknowledged individually.
    assert!(pair.b_to_a.lock().unwrap().contains(&frame_type::BURST_ACK));
}

#[test]
fn test_lost_middle_frame_recovers_via_repeat_request() {
    // Drop the first copy of data frame index 1 (type 11) from A to B.
    let mut dropped = false;
    let lossy: Filter = Box::new(move |frame| {
        if frame[0] == 11 && !dropped {
            dropped = true;
            return 0;
        }
        1
    });

    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), lossy, pass_all());
    connect(&pair);

    let payload = pseudo_random(4096);
    let received = transfer(&pair, &payload, 3);

    let data = BASE64.decode(received["data"].as_str().unwrap()).unwrap();
    assert_eq!(data, payload);

    // The receiver asked for the missing frame instead of a full retry.
    assert!(pair.b_to_a.lock().unwrap().contains(&frame_type::RPT_REQUEST));
}

#[test]
fn test_duplicated_data_frames_do_not_corrupt_payload() {
    // Every data frame arrives twice, as if a lost burst ACK had forced
    // a blind retransmission. The tail dedup must keep the buffer clean.
    let duplicating: Filter = Box::new(|frame| {
        if (10..=50).contains(&frame[0]) {
            2
        } else {
            1
        }
    });

    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), duplicating, pass_all());
    connect(&pair);

    let payload = pseudo_random(900);
    let received = transfer(&pair, &payload, 1);

    let data = BASE64.decode(received["data"].as_str().unwrap()).unwrap();
    assert_eq!(data, payload);
}

#[test]
fn test_remote_stop_aborts_transfer() {
    // B never receives data frames, so A's transfer parks mid-burst.
    let pair = linked_pair(config("DN2LS"), config("DL1ABC"), drop_data_frames(), pass_all());

    // Standalone channel (no session): address the peer via ping first.
    pair.a
        .engine
        .commands()
        .send(Command::Ping { dxcall: Callsign::parse("DL1ABC").unwrap() })
        .unwrap();
    wait_event(&pair.a, Duration::from_secs(5), |e| e["ping"] == "acknowledge")
        .expect("ping acknowledged");

    pair.a
        .engine
        .commands()
        .send(Command::ArqRaw {
            data: pseudo_random(2000).into(),
            mode: MODE_AUTO,
            n_frames_per_burst: 1,
            uuid: "stop-test-uuid".to_string(),
            mycall: Callsign::parse("DN2LS").unwrap(),
        })
        .unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        pair.a.engine.state().arq_state.load(Ordering::SeqCst)
    }));

    // Far side (or operator) pulls the plug: a stop frame arrives.
    let stop = Frame::Stop {
        dxcrc: Callsign::parse("DN2LS").unwrap().crc(),
        mycrc: Callsign::parse("DL1ABC").unwrap().crc(),
        callsign: Callsign::parse("DL1ABC").unwrap(),
    };
    pair.a
        .engine
        .frames()
        .send(RxFrame { data: stop.encode().into(), snr: 20 })
        .unwrap();

    wait_event(&pair.a, Duration::from_secs(5), |e| {
        e["arq"] == "transmission" && e["status"] == "stopped"
    })
    .expect("stop surfaces to the UI");

    assert!(wait_until(Duration::from_secs(2), || {
        let state = pair.a.engine.state();
        !state.arq_state.load(Ordering::SeqCst) && !state.tnc_busy.load(Ordering::SeqCst)
    }));
}

#[test]
fn test_protocol_version_mismatch_aborts_channel() {
    let mut a_config = config("DN2LS");
    a_config.data_channel_max_retries = 1;
    let (station, sent) = lone_station(a_config);

    // Record the peer, then start a transfer into silence.
    station
        .engine
        .commands()
        .send(Command::Ping { dxcall: Callsign::parse("DL1ABC").unwrap() })
        .unwrap();
    station
        .engine
        .commands()
        .send(Command::ArqRaw {
            data: b"payload".to_vec().into(),
            mode: MODE_AUTO,
            n_frames_per_burst: 1,
            uuid: "version-test-uuid".to_string(),
            mycall: Callsign::parse("DN2LS").unwrap(),
        })
        .unwrap();

    // Wait for the channel open request, then answer with a bad version.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        assert!(Instant::now() < deadline, "no channel open request seen");
        if let Ok(request) = sent.recv_timeout(Duration::from_millis(100)) {
            if request.frame[0] == frame_type::CHANNEL_OPEN_HIGH {
                break;
            }
        }
    }

    let bad_ack = Frame::ChannelOpenAck {
        profile: hflink::BandwidthProfile::High,
        dxcrc: Callsign::parse("DN2LS").unwrap().crc(),
        mycrc: Callsign::parse("DL1ABC").unwrap().crc(),
        protocol_version: 99,
    };
    station
        .engine
        .frames()
        .send(RxFrame { data: bad_ack.encode().into(), snr: 12 })
        .unwrap();

    let failed = wait_event(&station, Duration::from_secs(5), |e| {
        e["arq"] == "transmission" && e["status"] == "failed"
    })
    .expect("mismatch surfaces as a failed transfer");
    assert_eq!(failed["reason"], "protocol version mismatch");

    assert!(wait_until(Duration::from_secs(1), || {
        !station.engine.state().arq_state.load(Ordering::SeqCst)
    }));
}
