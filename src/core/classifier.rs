// src/core/classifier.rs

//! # Output Classifier
//!
//! Watches the output of the build tool line by line for the "tests failed" marker.
//!
//! - [`LineClassifier`] is the two-method contract: feed it lines, ask whether it matched.
//! - [`TestFailureClassifier`] sets a sticky flag on the first line containing the marker
//!   (case-insensitive) and keeps a bounded window of the most recent lines.
//! - [`ClassifyingWriter`] sits between a process and the console: every byte is mirrored
//!   unmodified to the console, and each completed line is handed to a classifier.

use crate::{
    constants::{OUTPUT_WINDOW_CAPACITY, TESTS_FAILED_MARKER},
    models::Charset,
};
use std::collections::VecDeque;
use std::io::{self, Write};

/// Longest partial line held back while waiting for a line terminator.
const MAX_PENDING_LINE: usize = 64 * 1024;

/// A line-oriented matcher over process output.
pub trait LineClassifier {
    /// Inspects one completed line (raw bytes, line terminator included or not).
    fn write_line(&mut self, line: &[u8]);

    /// Whether any line seen so far matched. Once true, stays true.
    fn did_match(&self) -> bool;
}

/// Detects the build tool's "tests failed" report.
#[derive(Debug)]
pub struct TestFailureClassifier {
    charset: Charset,
    tests_failed: bool,
    recent: VecDeque<String>,
    capacity: usize,
}

impl TestFailureClassifier {
    /// Creates a classifier with the default look-back window.
    pub fn new(charset: Charset) -> Self {
        Self::with_capacity(charset, OUTPUT_WINDOW_CAPACITY)
    }

    /// Creates a classifier remembering at most `capacity` recent lines.
    pub fn with_capacity(charset: Charset, capacity: usize) -> Self {
        Self {
            charset,
            tests_failed: false,
            recent: VecDeque::with_capacity(capacity.min(OUTPUT_WINDOW_CAPACITY)),
            capacity,
        }
    }

    /// Whether the failed-tests marker has been seen.
    pub fn did_tests_fail(&self) -> bool {
        self.tests_failed
    }

    /// The most recent lines, oldest first. The orchestrator logs them when a target
    /// exits non-zero.
    pub fn recent_lines(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    fn remember(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(line);
    }
}

impl LineClassifier for TestFailureClassifier {
    fn write_line(&mut self, line: &[u8]) {
        let decoded = self.charset.decode(line);
        let text = decoded.trim_end_matches(&['\r', '\n'][..]);

        if !self.tests_failed && text.to_lowercase().contains(TESTS_FAILED_MARKER) {
            log::debug!("Tests-failed marker found in line: {}", text);
            self.tests_failed = true;
        }
        self.remember(text.to_string());
    }

    fn did_match(&self) -> bool {
        self.tests_failed
    }
}

/// A writer that mirrors bytes to `inner` and feeds completed lines to a classifier.
#[derive(Debug)]
pub struct ClassifyingWriter<W: Write, C: LineClassifier> {
    inner: W,
    classifier: C,
    pending: Vec<u8>,
}

impl<W: Write, C: LineClassifier> ClassifyingWriter<W, C> {
    /// Wraps `inner`, feeding completed lines to `classifier`.
    pub fn new(inner: W, classifier: C) -> Self {
        Self {
            inner,
            classifier,
            pending: Vec::new(),
        }
    }

    /// The classifier, for inspecting results mid-stream.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Classifies any unterminated last line, flushes, and returns the classifier.
    pub fn finish(mut self) -> io::Result<C> {
        if !self.pending.is_empty() {
            self.classifier.write_line(&self.pending);
            self.pending.clear();
        }
        self.inner.flush()?;
        Ok(self.classifier)
    }
}

impl<W: Write, C: LineClassifier> Write for ClassifyingWriter<W, C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write_all(buf)?;

        for chunk in buf.split_inclusive(|b| *b == b'\n') {
            self.pending.extend_from_slice(chunk);
            if chunk.ends_with(b"\n") || self.pending.len() >= MAX_PENDING_LINE {
                self.classifier.write_line(&self.pending);
                self.pending.clear();
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
