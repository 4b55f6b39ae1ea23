//! Structural checks over a finished trace log.
//!
//! A log is well formed when every line parses, every reference names a live
//! token, no token is defined twice while live, and frames are popped in
//! the order they were pushed. References inside a run of consecutive
//! definition records may point at any token the run defines, which is how
//! the encoder writes cyclic structures. A `POP_FRAME` names the code object
//! of the frame it leaves, which must be the innermost pushed one.

use crate::registry::Token;
use crate::trace::record::{Record, RecordParseError, COMMENT_PREFIX, DEALLOC};
use serde::Serialize;
use std::collections::HashSet;

/// Counts gathered while verifying a log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogStats {
    pub records: u64,
    pub definitions: u64,
    pub references: u64,
    pub deallocations: u64,
    pub frames_pushed: u64,
    pub frames_popped: u64,
    pub max_depth: u64,
    pub comments: u64,
    /// Tokens still live at the end of the log.
    pub live_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: RecordParseError,
    },
    #[error("line {line}: reference to undefined token {token}")]
    UndefinedReference { line: usize, token: Token },
    #[error("line {line}: reference to deallocated token {token}")]
    StaleReference { line: usize, token: Token },
    #[error("line {line}: token {token} defined while already live")]
    Redefinition { line: usize, token: Token },
    #[error("line {line}: POP_FRAME without a matching PUSH_FRAME")]
    UnbalancedPop { line: usize },
    #[error("line {line}: POP_FRAME of code {found}, innermost frame runs code {expected}")]
    MismatchedPop {
        line: usize,
        expected: Token,
        found: Token,
    },
}

#[derive(Default)]
struct Checker {
    live: HashSet<Token>,
    retired: HashSet<Token>,
    /// Pending definition run: (line, record).
    group: Vec<(usize, Record)>,
    /// Code reference of every open frame, innermost last.
    frames: Vec<Option<Token>>,
    stats: LogStats,
}

impl Checker {
    fn resolve(&self, line: usize, token: Token) -> Result<(), VerifyError> {
        if self.live.contains(&token) {
            Ok(())
        } else if self.retired.contains(&token) {
            Err(VerifyError::StaleReference { line, token })
        } else {
            Err(VerifyError::UndefinedReference { line, token })
        }
    }

    /// Close the pending definition run.
    fn close_group(&mut self) -> Result<(), VerifyError> {
        let group = std::mem::take(&mut self.group);
        let mut defined = HashSet::new();
        for (line, record) in &group {
            if let Some(token) = record.subject() {
                if self.live.contains(&token) || !defined.insert(token) {
                    return Err(VerifyError::Redefinition { line: *line, token });
                }
            }
        }
        for (line, record) in &group {
            for token in record.references() {
                self.stats.references += 1;
                if !defined.contains(&token) {
                    self.resolve(*line, token)?;
                }
            }
        }
        for token in defined {
            self.retired.remove(&token);
            self.live.insert(token);
        }
        Ok(())
    }

    fn event(&mut self, line: usize, record: &Record) -> Result<(), VerifyError> {
        for token in record.references() {
            self.stats.references += 1;
            self.resolve(line, token)?;
        }
        match record.name() {
            "PUSH_FRAME" => {
                self.stats.frames_pushed += 1;
                self.frames.push(record.references().next());
                self.stats.max_depth = self.stats.max_depth.max(self.frames.len() as u64);
            }
            "POP_FRAME" => {
                let pushed = self
                    .frames
                    .pop()
                    .ok_or(VerifyError::UnbalancedPop { line })?;
                if let (Some(expected), Some(found)) = (pushed, record.references().next()) {
                    if expected != found {
                        return Err(VerifyError::MismatchedPop {
                            line,
                            expected,
                            found,
                        });
                    }
                }
                self.stats.frames_popped += 1;
            }
            DEALLOC => {
                if let Some(token) = record.subject() {
                    self.resolve(line, token)?;
                    self.live.remove(&token);
                    self.retired.insert(token);
                    self.stats.deallocations += 1;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Check a complete log and count what it contains.
pub fn verify_log(text: &str) -> Result<LogStats, VerifyError> {
    let mut checker = Checker::default();
    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        if raw.starts_with(COMMENT_PREFIX) {
            checker.stats.comments += 1;
            continue;
        }
        let record = Record::parse(raw).map_err(|source| VerifyError::Parse { line, source })?;
        checker.stats.records += 1;
        if record.is_definition() {
            checker.stats.definitions += 1;
            checker.group.push((line, record));
            continue;
        }
        checker.close_group()?;
        checker.event(line, &record)?;
    }
    checker.close_group()?;
    checker.stats.live_tokens = checker.live.len();
    Ok(checker.stats)
}
