//! Forward-only line scanner with one line of lookahead
//!
//! Benchmark logs are read exactly once, front to back. The scanner hands
//! out the current line through [`LineScanner::peek`] and moves on with
//! [`LineScanner::advance`]; reading past the end yields `None` forever.

use crate::error::{CardlogError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Sequential line reader over any buffered source
#[derive(Debug)]
pub struct LineScanner<R> {
    reader: R,
    origin: PathBuf,
    current: Option<String>,
    loaded: bool,
    exhausted: bool,
    line_number: u64,
}

impl LineScanner<BufReader<File>> {
    /// Open a log file for scanning
    ///
    /// A missing file is reported as [`CardlogError::FileNotFound`], any other
    /// failure as [`CardlogError::Io`]. The file handle is closed when the
    /// scanner is dropped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CardlogError::from_io(path, e))?;
        tracing::debug!("Opened log {}", path.display());
        Ok(Self::with_origin(BufReader::new(file), path))
    }
}

impl<R: BufRead> LineScanner<R> {
    /// Scan an in-memory or already opened source
    pub fn new(reader: R) -> Self {
        Self::with_origin(reader, "<memory>")
    }

    fn with_origin(reader: R, origin: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            origin: origin.into(),
            current: None,
            loaded: false,
            exhausted: false,
            line_number: 0,
        }
    }

    /// Where the lines come from, for diagnostics
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// 1-based number of the line returned by the last `peek`, 0 before the first read
    pub fn line_number(&self) -> u64 {
        self.line_number
    }

    /// Look at the current line without consuming it
    ///
    /// Returns `Ok(None)` once the end of the source has been reached.
    /// Invalid UTF-8 is replaced rather than rejected, since logs may carry
    /// raw card output.
    pub fn peek(&mut self) -> Result<Option<&str>> {
        if !self.loaded {
            self.load()?;
        }
        Ok(self.current.as_deref())
    }

    /// Drop the current line; the next `peek` reads a fresh one
    pub fn advance(&mut self) {
        self.current = None;
        self.loaded = false;
    }

    /// Consume and return the current line
    pub fn next_line(&mut self) -> Result<Option<String>> {
        if !self.loaded {
            self.load()?;
        }
        self.loaded = false;
        Ok(self.current.take())
    }

    fn load(&mut self) -> Result<()> {
        self.loaded = true;
        if self.exhausted {
            self.current = None;
            return Ok(());
        }

        let mut buf = Vec::new();
        let read = self
            .reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| CardlogError::from_io(&self.origin, e))?;

        if read == 0 {
            self.exhausted = true;
            self.current = None;
            return Ok(());
        }

        while matches!(buf.last(), Some(b'\n' | b'\r')) {
            buf.pop();
        }
        self.line_number += 1;
        self.current = Some(String::from_utf8_lossy(&buf).into_owned());
        Ok(())
    }
}
