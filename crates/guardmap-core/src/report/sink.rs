//! Where report lines go.
//!
//! Writers in this crate produce lines one at a time into a [`LineSink`].
//! [`Report`](super::Report) keeps them in memory; [`StreamSink`] writes each
//! one through as soon as it is produced, so a long dump starts printing
//! right away and whatever was written before a fatal error stays written.

use std::io::{self, Write};

use crate::error::GuardError;

/// Receiver for report output, one line per call
pub trait LineSink
{
    /// Accept one line, without its trailing newline.
    fn push_line(&mut self, line: String);

    /// Accept the `Error:` line that ends a report cut short by a fatal
    /// failure.
    fn abort(&mut self, err: &GuardError);

    /// `true` once nothing more can be delivered. Long walks stop early.
    fn is_closed(&self) -> bool
    {
        false
    }
}

pub(super) fn error_line(err: &GuardError) -> String
{
    format!("Error: {err}")
}

/// Line sink writing straight through to an [`io::Write`]
///
/// The first write error closes the sink; later lines are dropped and the
/// error comes back from [`StreamSink::finish`].
#[derive(Debug)]
pub struct StreamSink<W: Write>
{
    writer: W,
    lines: usize,
    aborted: bool,
    error: Option<io::Error>,
}

impl<W: Write> StreamSink<W>
{
    pub fn new(writer: W) -> Self
    {
        Self {
            writer,
            lines: 0,
            aborted: false,
            error: None,
        }
    }

    /// Lines written so far.
    pub fn lines(&self) -> usize
    {
        self.lines
    }

    /// `true` if the report ended with a fatal error line.
    pub fn is_aborted(&self) -> bool
    {
        self.aborted
    }

    /// Flush and hand back the writer.
    ///
    /// ## Errors
    ///
    /// The first error hit while writing, or the flush error.
    pub fn finish(mut self) -> io::Result<W>
    {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> LineSink for StreamSink<W>
{
    fn push_line(&mut self, line: String)
    {
        if self.error.is_some() {
            return;
        }
        match writeln!(self.writer, "{line}") {
            Ok(()) => self.lines += 1,
            Err(err) => self.error = Some(err),
        }
    }

    fn abort(&mut self, err: &GuardError)
    {
        self.push_line(error_line(err));
        self.aborted = true;
    }

    fn is_closed(&self) -> bool
    {
        self.error.is_some()
    }
}
