//! Protocol constants for the hflink ARQ engine.
//!
//! This module centralizes the retry budgets, timer values and signalling
//! repeat counts of the data-link protocol. Constants are grouped by
//! domain. Changing any of these changes on-air behaviour, so they live
//! in one place rather than scattered through the state machines.

use std::time::Duration;

// ============================================================================
// Protocol identity
// ============================================================================

/// ARQ protocol version carried in the last byte of every data-channel
/// open response. Peers with a different version abort the channel.
pub const ARQ_PROTOCOL_VERSION: u8 = 4;

// ============================================================================
// Retry budgets
// ============================================================================

/// Session open attempts before the connection is declared failed.
pub const SESSION_CONNECT_MAX_RETRIES: usize = 3;

/// Data channel open attempts before the transfer is declared failed.
pub const DATA_CHANNEL_MAX_RETRIES: usize = 5;

/// Transmit-side retries of the same burst before the transfer fails.
pub const TX_MAX_RETRIES_PER_BURST: u32 = 50;

/// Receive-side watchdog timeouts within one channel before it is torn down.
pub const RX_MAX_RETRIES_PER_BURST: u32 = 50;

// ============================================================================
// Timers
// ============================================================================

/// How long each session/channel open attempt waits for a response.
pub const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

/// Idle session lifetime. A connected session with no inbound frame for
/// this long is declared dead by the session watchdog.
pub const SESSION_TIMEOUT_SECS: u64 = 30;

/// Idle data-channel lifetime during a transfer.
pub const TRANSMISSION_TIMEOUT_SECS: u64 = 360;

/// Watchdog wake interval.
pub const WATCHDOG_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity of all bounded polling waits.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Signalling robustness
// ============================================================================

/// Frame-ACK repeat count and inter-copy delay.
pub const FRAME_ACK_COPIES: usize = 3;
pub const FRAME_ACK_REPEAT_DELAY: Duration = Duration::from_millis(100);

/// Session-close repeat count and inter-copy delay.
pub const CLOSE_COPIES: usize = 5;
pub const CLOSE_REPEAT_DELAY: Duration = Duration::from_millis(250);

/// Stop-transmission repeat count and inter-copy delay.
pub const STOP_COPIES: usize = 2;
pub const STOP_REPEAT_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// Receive-side buffer handling
// ============================================================================

/// How far back from the tail of the frame buffer a freshly completed
/// burst is searched for before appending. Guards against duplicate
/// bursts straddling the buffer tail after a lost signalling frame.
pub const RX_TAIL_SEARCH_AREA: usize = 510;

/// Maximum number of missing frame indices a repeat request can carry.
pub const RPT_MAX_MISSING: usize = 6;

/// Maximum entries kept in the heard-stations log.
pub const HEARD_STATIONS_MAX: usize = 255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budgets_are_positive() {
        assert!(SESSION_CONNECT_MAX_RETRIES >= 1);
        assert!(DATA_CHANNEL_MAX_RETRIES >= 1);
        assert!(TX_MAX_RETRIES_PER_BURST >= 1);
    }

    #[test]
    fn test_watchdog_faster_than_shortest_burst_timeout() {
        // The shortest per-speed burst timeout is 3 s; the watchdog must
        // wake often enough to catch it promptly.
        assert!(WATCHDOG_INTERVAL < Duration::from_secs(3));
    }
}
