//! Deferred network output records and template expansion.
//!
//! The real-time side only copies a fixed-size [`NrtOutput`] onto a queue.
//! A non-real-time consumer expands the template and does the socket work.

use core::fmt::{self, Write};

use serde::{Deserialize, Serialize};

use crate::consts::{FMT_TEXT_LEN, IP_HOST_LEN, NANOS_PER_SEC, NRT_OUTPUT_MAGIC};
use crate::fsm::matrix::{NetTarget, Transport};

/// One deferred network message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NrtOutput {
    pub magic: u16,
    /// State whose entry produced the message.
    pub state: u16,
    /// Output column (0-based among output columns).
    pub column: u16,
    /// Cell value that triggered the message.
    pub trigger_value: i32,
    pub internal_ts_ns: u64,
    pub external_ts_ns: u64,
    pub transport: Transport,
    pub host: heapless::String<IP_HOST_LEN>,
    pub port: u16,
    pub template: heapless::String<FMT_TEXT_LEN>,
}

impl NrtOutput {
    /// Build a record for `target`. Copies are bounded by the fixed capacities.
    pub fn new(
        transport: Transport,
        target: &NetTarget,
        state: u16,
        column: u16,
        trigger_value: i32,
        internal_ts_ns: u64,
        external_ts_ns: u64,
    ) -> Self {
        Self {
            magic: NRT_OUTPUT_MAGIC,
            state,
            column,
            trigger_value,
            internal_ts_ns,
            external_ts_ns,
            transport,
            host: target.host.clone(),
            port: target.port,
            template: target.template.clone(),
        }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == NRT_OUTPUT_MAGIC
    }

    /// Expand the template into an owned string.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.template.len() + 32);
        // Writing into a String cannot fail.
        let _ = expand_template(
            &self.template,
            self.trigger_value,
            self.internal_ts_ns,
            self.state,
            self.column,
            &mut out,
        );
        out
    }
}

/// Expand a packet template.
///
/// | Directive | Expands to |
/// |---|---|
/// | `%v` | trigger value |
/// | `%t` | timestamp in seconds, six decimals |
/// | `%T` | timestamp in nanoseconds |
/// | `%s` | state |
/// | `%c` | output column |
/// | `%%` | a literal `%` |
///
/// Any other directive character is consumed and produces nothing, as does
/// a trailing lone `%`.
pub fn expand_template<W: Write>(
    template: &str,
    value: i32,
    ts_ns: u64,
    state: u16,
    column: u16,
    out: &mut W,
) -> fmt::Result {
    let mut chars = template.chars();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            out.write_char(ch)?;
            continue;
        }
        match chars.next() {
            Some('v') => write!(out, "{value}")?,
            Some('t') => {
                let secs = ts_ns / NANOS_PER_SEC;
                let micros = (ts_ns % NANOS_PER_SEC) / 1_000;
                write!(out, "{secs}.{micros:06}")?
            }
            Some('T') => write!(out, "{ts_ns}")?,
            Some('s') => write!(out, "{state}")?,
            Some('c') => write!(out, "{column}")?,
            Some('%') => out.write_char('%')?,
            Some(_) | None => {}
        }
    }
    Ok(())
}
