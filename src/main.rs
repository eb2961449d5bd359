//! Loopback demo: two engines wired back-to-back over a perfect channel.
//!
//! Spawns an initiating station and an answering station, connects a
//! session, transfers a payload through the full ARQ path and prints
//! every UI event both sides emit. Useful for watching the protocol run
//! without a modem or a radio.
//!
//! ```sh
//! hflink --mycall DN2LS --dxcall DL1ABC --message "HELLO WORLD!!"
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;

use hflink::{ArqEngine, Callsign, Command, Config, RxFrame, TxRequest, MODE_AUTO};

#[derive(Parser, Debug)]
#[command(name = "hflink", about = "ARQ data-link engine loopback demo")]
struct Args {
    /// Callsign of the initiating station.
    #[arg(long, default_value = "DN2LS")]
    mycall: String,

    /// Callsign of the answering station.
    #[arg(long, default_value = "DL1ABC")]
    dxcall: String,

    /// Grid locator used by both stations.
    #[arg(long, default_value = "JN48EA")]
    grid: String,

    /// Payload to transfer.
    #[arg(long, default_value = "HELLO WORLD!!")]
    message: String,

    /// Data frames per burst.
    #[arg(long, default_value_t = 1)]
    frames_per_burst: u8,

    /// Overall demo timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

/// One simulated station: an engine plus its event drain.
struct Station {
    name: &'static str,
    engine: ArqEngine,
    events: Receiver<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let initiator_config = Config {
        mycallsign: args.mycall.clone(),
        mygrid: args.grid.clone(),
        ..Config::default()
    };
    let responder_config = Config {
        mycallsign: args.dxcall.clone(),
        mygrid: args.grid.clone(),
        ..Config::default()
    };

    // Build both stations, then cross-wire their modem queues.
    let (initiator, initiator_modem_rx, initiator_flag) = build_station("ISS", initiator_config);
    let (responder, responder_modem_rx, responder_flag) = build_station("IRS", responder_config);

    spawn_channel(initiator_modem_rx, initiator_flag, responder.engine.frames());
    spawn_channel(responder_modem_rx, responder_flag, initiator.engine.frames());

    let dxcall = Callsign::parse(&args.dxcall)?;
    let mycall = Callsign::parse(&args.mycall)?;
    let commands = initiator.engine.commands();

    println!("== connecting {} -> {}", args.mycall, args.dxcall);
    commands.send(Command::Connect { dxcall })?;

    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    wait_for_event(&initiator, &responder, deadline, |event| {
        event["arq"] == "session" && event["status"] == "connected"
    })?;

    println!("== transferring {} bytes", args.message.len());
    commands.send(Command::ArqRaw {
        data: args.message.clone().into_bytes().into(),
        mode: MODE_AUTO,
        n_frames_per_burst: args.frames_per_burst,
        uuid: uuid::Uuid::new_v4().to_string(),
        mycall,
    })?;

    let received = wait_for_event(&initiator, &responder, deadline, |event| {
        event["arq"] == "transmission" && event["status"] == "received"
    })?;

    use base64::Engine as _;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(received["data"].as_str().unwrap_or_default())?;
    println!(
        "== delivered: {:?}",
        String::from_utf8_lossy(&decoded)
    );
    if decoded != args.message.as_bytes() {
        bail!("delivered payload does not match input");
    }

    println!("== disconnecting");
    commands.send(Command::Disconnect)?;
    wait_for_event(&initiator, &responder, deadline, |event| {
        event["arq"] == "session" && event["status"] == "close"
    })?;

    println!("== done");
    Ok(())
}

/// Spawn one engine with a private modem queue and event drain.
fn build_station(
    name: &'static str,
    config: Config,
) -> (Station, Receiver<TxRequest>, Arc<AtomicBool>) {
    let (modem_tx, modem_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let transmitting = Arc::new(AtomicBool::new(false));

    let engine = ArqEngine::spawn(config, modem_tx, Arc::clone(&transmitting), event_tx);
    (Station { name, engine, events: event_rx }, modem_rx, transmitting)
}

/// Perfect radio channel: every transmitted copy arrives at the far side.
fn spawn_channel(
    modem_rx: Receiver<TxRequest>,
    transmitting: Arc<AtomicBool>,
    far_side: Sender<RxFrame>,
) {
    std::thread::spawn(move || {
        while let Ok(request) = modem_rx.recv() {
            for copy in 0..request.copies.max(1) {
                if copy > 0 {
                    std::thread::sleep(request.repeat_delay);
                }
                let _ = far_side.send(RxFrame { data: request.frame.clone(), snr: 30 });
            }
            transmitting.store(false, Ordering::SeqCst);
        }
    });
}

/// Print events from both stations until one matches `pred`.
fn wait_for_event(
    a: &Station,
    b: &Station,
    deadline: Instant,
    pred: impl Fn(&serde_json::Value) -> bool,
) -> Result<serde_json::Value> {
    while Instant::now() < deadline {
        for station in [a, b] {
            while let Ok(raw) = station.events.try_recv() {
                println!("[{}] {raw}", station.name);
                let event: serde_json::Value = serde_json::from_str(&raw)?;
                if pred(&event) {
                    return Ok(event);
                }
            }
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    bail!("timed out waiting for event");
}
