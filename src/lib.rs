// Library modules
pub mod arq;
pub mod broadcast;
pub mod callsign;
pub mod commands;
pub mod config;
pub mod constants;
pub mod events;
pub mod frame;
pub mod modem;
pub mod state;
pub mod stats;

// Re-export commonly used types
pub use arq::ArqEngine;
pub use broadcast::BeaconControl;
pub use callsign::{Callsign, CallsignError};
pub use commands::Command;
pub use config::Config;
pub use events::EventSender;
pub use frame::{BandwidthProfile, Frame, FrameError};
pub use modem::{FreedvMode, ListeningModes, RxFrame, TransmitGateway, TxRequest, MODE_AUTO};
pub use state::{HeardStation, LinkState, SessionStatus};
pub use stats::TransferRate;
