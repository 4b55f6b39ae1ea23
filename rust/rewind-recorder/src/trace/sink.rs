//! Append-only log output with a running digest.

use crate::trace::record::Record;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::io::{self, Write};

pub struct LogSink<W: Write> {
    out: W,
    hasher: Sha256,
    records: u64,
    line: String,
}

impl<W: Write> LogSink<W> {
    pub fn new(out: W) -> Self {
        LogSink {
            out,
            hasher: Sha256::new(),
            records: 0,
            line: String::new(),
        }
    }

    /// Write a group of records with a single write call.
    pub fn write_group(&mut self, group: &[Record]) -> io::Result<()> {
        if group.is_empty() {
            return Ok(());
        }
        self.line.clear();
        for record in group {
            // Formatting into a String cannot fail.
            let _ = writeln!(self.line, "{}", record);
        }
        self.commit()?;
        self.records += group.len() as u64;
        Ok(())
    }

    /// Write a `--` comment line. Comments do not count as records.
    pub fn write_comment(&mut self, text: &str) -> io::Result<()> {
        self.line.clear();
        let _ = writeln!(self.line, "-- {}", text);
        self.commit()
    }

    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Flush and return the writer, record count and `sha256:<hex>` digest
    /// of everything written.
    pub fn finish(mut self) -> io::Result<(W, u64, String)> {
        self.out.flush()?;
        let digest = format!("sha256:{:x}", self.hasher.finalize());
        Ok((self.out, self.records, digest))
    }

    fn commit(&mut self) -> io::Result<()> {
        self.out.write_all(self.line.as_bytes())?;
        self.hasher.update(self.line.as_bytes());
        Ok(())
    }
}
