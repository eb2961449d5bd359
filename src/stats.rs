//! Transfer-rate accounting for the UI.
//!
//! Tracks percent-complete, bits per second and bytes per minute for the
//! direction currently active. Reset on every data-channel open.

/// Rolling statistics of the transfer in progress.
#[derive(Debug, Clone, Default)]
pub struct TransferRate {
    /// Uncompressed transfer size in bytes.
    pub total_bytes: usize,
    /// Compression factor (original / compressed) of the payload.
    pub compression_factor: f64,
    /// Percent of the transfer completed, 0..=100.
    pub percent: u8,
    pub bits_per_second: u64,
    pub bytes_per_minute: u64,
}

impl TransferRate {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Update from the receive side: `received` raw bytes accumulated in
    /// `elapsed_secs` since the channel opened. The compression factor
    /// scales received (compressed) bytes up to the uncompressed total.
    pub fn update_rx(&mut self, received: usize, elapsed_secs: f64) {
        let total = self.total_bytes.max(1) as f64;
        let factor = if self.compression_factor > 0.0 {
            self.compression_factor
        } else {
            1.0
        };
        self.percent = (((received as f64 * factor / total) * 100.0) as u64).min(100) as u8;
        self.update_rate(received, elapsed_secs);
    }

    /// Update from the transmit side: `sent` of `buffer_len` wire bytes.
    pub fn update_tx(&mut self, sent: usize, buffer_len: usize, elapsed_secs: f64) {
        let total = buffer_len.max(1) as f64;
        self.percent = (((sent as f64 / total) * 100.0) as u64).min(100) as u8;
        self.update_rate(sent, elapsed_secs);
    }

    fn update_rate(&mut self, transferred: usize, elapsed_secs: f64) {
        if transferred > 0 && elapsed_secs > 0.0 {
            self.bits_per_second = ((transferred * 8) as f64 / elapsed_secs) as u64;
            self.bytes_per_minute = (transferred as f64 / (elapsed_secs / 60.0)) as u64;
        } else {
            self.bits_per_second = 0;
            self.bytes_per_minute = 0;
        }
    }
}
