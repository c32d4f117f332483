//! Handle lifecycle.
//!
//! A [`Session`] owns the three releasable handles of a run. Slots are
//! filled in acquisition order (runtime, host, domain) and emptied in the
//! reverse order by [`Session::release_all`], which also runs from `Drop`
//! so an early return or a panic still tears everything down. Assembly
//! and entry-point handles are never tracked here: they borrow from the
//! domain and are gone before the session is released.
//!
//! ```text
//!   acquire:  runtime ──► host ──► domain
//!   release:  domain  ──► host ──► runtime
//! ```

use crate::host::{ClrBackend, Release};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Kind of a tracked handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Runtime,
    Host,
    Domain,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Runtime => write!(f, "runtime"),
            Self::Host => write!(f, "host"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// Owner of every releasable handle acquired during one run.
///
/// Slots are public so a pipeline can borrow one handle while filling the
/// next; fill them in acquisition order.
pub struct Session<B: ClrBackend> {
    pub runtime: Option<B::Runtime>,
    pub host: Option<B::Host>,
    pub domain: Option<B::Domain>,
}

impl<B: ClrBackend> Session<B> {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self {
            runtime: None,
            host: None,
            domain: None,
        }
    }

    /// Handles currently held, in acquisition order.
    pub fn held(&self) -> Vec<HandleKind> {
        let mut held = Vec::with_capacity(3);
        if self.runtime.is_some() {
            held.push(HandleKind::Runtime);
        }
        if self.host.is_some() {
            held.push(HandleKind::Host);
        }
        if self.domain.is_some() {
            held.push(HandleKind::Domain);
        }
        held
    }

    /// Releases every held handle in reverse acquisition order.
    ///
    /// Best-effort: a failed release is logged and teardown continues.
    /// Returns the handles released by this call; a second call releases
    /// nothing.
    pub fn release_all(&mut self) -> Vec<HandleKind> {
        let mut released = Vec::with_capacity(3);
        if release_slot(&mut self.domain, HandleKind::Domain) {
            released.push(HandleKind::Domain);
        }
        if release_slot(&mut self.host, HandleKind::Host) {
            released.push(HandleKind::Host);
        }
        if release_slot(&mut self.runtime, HandleKind::Runtime) {
            released.push(HandleKind::Runtime);
        }
        if !released.is_empty() {
            debug!(count = released.len(), "teardown complete");
        }
        released
    }
}

impl<B: ClrBackend> Default for Session<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: ClrBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

fn release_slot<H: Release>(slot: &mut Option<H>, kind: HandleKind) -> bool {
    let Some(handle) = slot.take() else {
        return false;
    };
    match handle.release() {
        Ok(()) => debug!(handle = %kind, "released"),
        Err(e) => warn!(handle = %kind, error = %e, "release failed"),
    }
    true
}
