//! Host built-ins: output, the clock, and diagnostics.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use elle_common::Opcode;

/// One interpreted instruction, reported before it executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEvent<'e> {
    pub function: &'e str,
    pub offset: usize,
    pub opcode: Opcode,
    /// Operand stack depth before the instruction.
    pub depth: usize,
    /// Number of active frames, this one included.
    pub call_depth: usize,
}

/// The services a running program can reach.
pub trait Host {
    /// PRINT_STRING: write the bytes as-is.
    fn print_string(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// PRINT_INT64: write the signed decimal value, no separator.
    fn print_int64(&mut self, value: i64) -> io::Result<()>;

    /// CURRENT_TIME: milliseconds since the Unix epoch.
    fn current_time_millis(&mut self) -> i64;

    /// Verbose VM messages.
    fn diagnostic(&mut self, _message: &str) {}

    /// Instruction trace.
    fn trace(&mut self, _event: &TraceEvent<'_>) {}
}

/// Host backed by the process's stdout, stderr and system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdHost;

impl Host for StdHost {
    fn print_string(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(bytes)
    }

    fn print_int64(&mut self, value: i64) -> io::Result<()> {
        write!(io::stdout().lock(), "{value}")
    }

    fn current_time_millis(&mut self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as i64)
    }

    fn diagnostic(&mut self, message: &str) {
        let _ = io::stdout().flush();
        eprintln!("{message}");
    }

    fn trace(&mut self, event: &TraceEvent<'_>) {
        let _ = io::stdout().flush();
        eprintln!(
            "[{}] {}+{} {} depth {}",
            event.call_depth,
            event.function,
            event.offset,
            event.opcode.mnemonic(),
            event.depth
        );
    }
}

/// An owned copy of a [`TraceEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub function: String,
    pub offset: usize,
    pub opcode: Opcode,
    pub depth: usize,
    pub call_depth: usize,
}

#[derive(Debug, Default)]
struct Recording {
    output: Vec<u8>,
    diagnostics: Vec<String>,
    trace: Vec<TraceRecord>,
    clock: i64,
    fail_output: bool,
}

/// Host that records everything in memory. Clones share one recording, so a
/// test can keep a handle after moving the host into a VM.
#[derive(Debug, Default, Clone)]
pub struct RecordingHost {
    inner: Rc<RefCell<Recording>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything printed so far.
    pub fn output(&self) -> Vec<u8> {
        self.inner.borrow().output.clone()
    }

    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.inner.borrow().output).into_owned()
    }

    pub fn diagnostics(&self) -> Vec<String> {
        self.inner.borrow().diagnostics.clone()
    }

    pub fn trace_records(&self) -> Vec<TraceRecord> {
        self.inner.borrow().trace.clone()
    }

    /// Value returned by CURRENT_TIME.
    pub fn set_clock(&self, millis: i64) {
        self.inner.borrow_mut().clock = millis;
    }

    /// Make every print fail.
    pub fn fail_output(&self, fail: bool) {
        self.inner.borrow_mut().fail_output = fail;
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut rec = self.inner.borrow_mut();
        if rec.fail_output {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "output closed"));
        }
        rec.output.extend_from_slice(bytes);
        Ok(())
    }
}

impl Host for RecordingHost {
    fn print_string(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write(bytes)
    }

    fn print_int64(&mut self, value: i64) -> io::Result<()> {
        self.write(value.to_string().as_bytes())
    }

    fn current_time_millis(&mut self) -> i64 {
        self.inner.borrow().clock
    }

    fn diagnostic(&mut self, message: &str) {
        self.inner.borrow_mut().diagnostics.push(message.to_string());
    }

    fn trace(&mut self, event: &TraceEvent<'_>) {
        self.inner.borrow_mut().trace.push(TraceRecord {
            function: event.function.to_string(),
            offset: event.offset,
            opcode: event.opcode,
            depth: event.depth,
            call_depth: event.call_depth,
        });
    }
}
