//! Diagnostic sink: the one piece of the external driver interface (§6) this
//! crate specifies. The upstream command-line tool, file I/O, and rich
//! diagnostic formatting live outside this crate; we only need somewhere to
//! report errors and warnings while lowering, since the emitter's policy
//! (§7) is to keep going after a recoverable error so it can surface as many
//! diagnostics as possible in one pass.

use std::fmt;

/// Sink for diagnostics produced while lowering a translation unit.
///
/// Implementations decide how `error`/`warning` are surfaced (printed,
/// collected, forwarded to a host IDE, ...). The emitter only requires that
/// `had_error` accurately reflects whether `error` was ever called, since a
/// caller must discard the SPIR-V output when it has.
pub trait DiagnosticSink {
    fn error(&mut self, message: fmt::Arguments);
    fn warning(&mut self, message: fmt::Arguments);
    fn had_error(&self) -> bool;
}

/// Default sink: logs through the `log` crate and additionally buffers the
/// messages, so both a human watching stderr and a caller inspecting the
/// sink afterwards see the same diagnostics.
#[derive(Default)]
pub struct VecDiagnosticSink {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl VecDiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagnosticSink for VecDiagnosticSink {
    fn error(&mut self, message: fmt::Arguments) {
        let text = message.to_string();
        log::error!("{}", text);
        self.errors.push(text);
    }

    fn warning(&mut self, message: fmt::Arguments) {
        let text = message.to_string();
        log::warn!("{}", text);
        self.warnings.push(text);
    }

    fn had_error(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Convenience macro mirroring the ergonomics of `emitError("...", args...)`
/// in the original implementation.
macro_rules! emit_error {
    ($sink:expr, $($arg:tt)*) => {
        $sink.error(format_args!($($arg)*))
    };
}

macro_rules! emit_warning {
    ($sink:expr, $($arg:tt)*) => {
        $sink.warning(format_args!($($arg)*))
    };
}

pub(crate) use emit_error;
pub(crate) use emit_warning;
