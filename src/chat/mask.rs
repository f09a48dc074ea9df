// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Redaction of sensitive values in logs and previews
//!
//! Values collected from sensitive interactive fields are registered once in
//! a process-wide list. [`MaskingMakeWriter`] wraps the tracing writer so every
//! formatted log line passes through that list before it is written, whichever
//! module emitted it.

use std::io::{self, Write};
use std::sync::RwLock;

use tracing_subscriber::fmt::MakeWriter;

/// Replacement text for masked values
pub const MASK: &str = "********";

static SECRETS: RwLock<SecretMasker> = RwLock::new(SecretMasker::new());

/// List of values that must never reach a log line.
///
/// The transcript keeps raw values; only rendered output is masked.
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
    secrets: Vec<String>,
}

impl SecretMasker {
    pub const fn new() -> Self {
        Self {
            secrets: Vec::new(),
        }
    }

    /// Remember a value. Empty and duplicate values are ignored.
    pub fn add(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value.is_empty() || self.secrets.contains(&value) {
            return;
        }
        self.secrets.push(value);
        // Longest first so a secret containing another is replaced whole.
        self.secrets.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Replace every known secret in `text` with [`MASK`]
    pub fn mask(&self, text: &str) -> String {
        let mut masked = text.to_string();
        for secret in &self.secrets {
            if masked.contains(secret.as_str()) {
                masked = masked.replace(secret.as_str(), MASK);
            }
        }
        masked
    }
}

/// Add `value` to the process-wide mask list
pub fn register_secret(value: impl Into<String>) {
    let mut secrets = SECRETS.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    secrets.add(value);
}

/// Mask every registered secret in `text`
pub fn mask_secrets(text: &str) -> String {
    let secrets = SECRETS.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    if secrets.is_empty() {
        return text.to_string();
    }
    secrets.mask(text)
}

/// Tracing writer factory that redacts registered secrets.
///
/// Each event is buffered whole and masked when the writer is flushed or
/// dropped, so a secret is never split across two writes.
#[derive(Debug, Clone)]
pub struct MaskingMakeWriter<M> {
    inner: M,
}

impl<M> MaskingMakeWriter<M> {
    pub fn new(inner: M) -> Self {
        Self { inner }
    }
}

impl<'a, M> MakeWriter<'a> for MaskingMakeWriter<M>
where
    M: MakeWriter<'a>,
{
    type Writer = MaskingWriter<M::Writer>;

    fn make_writer(&'a self) -> Self::Writer {
        MaskingWriter {
            inner: self.inner.make_writer(),
            buffer: Vec::new(),
        }
    }
}

/// Writer handed out by [`MaskingMakeWriter`]
pub struct MaskingWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> MaskingWriter<W> {
    fn flush_masked(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        self.inner.write_all(mask_secrets(&text).as_bytes())?;
        self.inner.flush()
    }
}

impl<W: Write> Write for MaskingWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_masked()
    }
}

impl<W: Write> Drop for MaskingWriter<W> {
    fn drop(&mut self) {
        let _ = self.flush_masked();
    }
}
