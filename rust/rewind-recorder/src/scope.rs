//! Which call frames get traced.
//!
//! Tracing is usually restricted to frames whose source lives under a base
//! directory, so library code is skipped. Each active frame carries its own
//! decision on a [`ScopeStack`]; returning from a frame restores the caller's
//! decision exactly, however in-scope and out-of-scope calls interleave.

use std::path::{Path, PathBuf};

/// Source-location predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    base_dir: Option<PathBuf>,
}

impl ScopeFilter {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        ScopeFilter { base_dir }
    }

    /// A filter admitting every frame.
    pub fn everything() -> Self {
        ScopeFilter { base_dir: None }
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    /// Whether a frame executing code from `filename` is traced. The match is
    /// on whole path components: `/src/app` admits `/src/app/main.py` but not
    /// `/src/application.py`.
    pub fn admits(&self, filename: &str) -> bool {
        match &self.base_dir {
            Some(base) => Path::new(filename).starts_with(base),
            None => true,
        }
    }
}

/// Per-frame trace decisions, innermost last.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<bool>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, traced: bool) {
        self.frames.push(traced);
    }

    /// Decision of the frame being left. `None` when the frame was entered
    /// before the session started.
    pub fn pop(&mut self) -> Option<bool> {
        self.frames.pop()
    }

    /// Decision of the innermost frame; `false` when no frame is known.
    pub fn current(&self) -> bool {
        self.frames.last().copied().unwrap_or(false)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
