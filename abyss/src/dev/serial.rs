//! Serial device driver.
//!
//! COM1 of the machine is wired to the standard output of the host.
use std::io::Write;

/// A sink writing into COM1.
pub struct Com1Sink {
    _p: (),
}

impl Com1Sink {
    /// Create a new sink.
    pub const fn new() -> Self {
        Self { _p: () }
    }
}

impl Default for Com1Sink {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Write for Com1Sink {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let mut out = std::io::stdout().lock();
        out.write_all(s.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|_| core::fmt::Error)
    }
}
