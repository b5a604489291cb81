//! Where emitted states go

use std::io::{self, Stdout, Write};

use serde::Serialize;

use crate::canonical::Snapshot;

/// Receiver of emitted states
pub trait Sink {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()>;
}

impl<S: Sink + ?Sized> Sink for &mut S {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        (**self).emit(snapshot)
    }
}

impl Sink for Vec<Snapshot> {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.push(snapshot.clone());
        Ok(())
    }
}

#[derive(Serialize)]
struct Tagged<'a, T: ?Sized> {
    path: &'a str,
    state: &'a T,
}

/// Writes one JSON document per line and flushes after each
///
/// Each line goes out in a single `write_all`, so several sinks sharing
/// stdout from different threads never interleave within a line.
#[derive(Debug)]
pub struct LineSink<W: Write> {
    writer: W,
    label: Option<String>,
    line: Vec<u8>,
}

impl LineSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            label: None,
            line: Vec::new(),
        }
    }

    /// Wrap every record as `{"path": label, "state": record}`
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Write any serializable record as one line
    pub fn write_record<T: Serialize + ?Sized>(&mut self, record: &T) -> io::Result<()> {
        self.line.clear();
        let encoded = match &self.label {
            Some(path) => serde_json::to_writer(
                &mut self.line,
                &Tagged { path: path.as_str(), state: record },
            ),
            None => serde_json::to_writer(&mut self.line, record),
        };
        encoded.map_err(io::Error::from)?;
        self.line.push(b'\n');

        self.writer.write_all(&self.line)?;
        self.writer.flush()
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for LineSink<W> {
    fn emit(&mut self, snapshot: &Snapshot) -> io::Result<()> {
        self.write_record(snapshot)
    }
}
