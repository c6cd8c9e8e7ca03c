//! Content-addressed duplicate ledger
//!
//! `check_and_reserve` is the single compare-and-set point of the
//! pipeline: two concurrent calls with the same fingerprint never both
//! observe `New`. Entries live in memory for fast lookup and are written
//! through to the [`Sink`] on commit.

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use spectra_model::{Fingerprint, JobId, LedgerEntry, ScopeId, TraceId};

use crate::sink::{Sink, SinkError};

/// Errors raised by ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Write-through to the durable sink failed
    #[error("ledger sink error: {0}")]
    Sink(#[from] SinkError),

    /// Entry serialization failed
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Slot state for a `(scope, fingerprint)` key
#[derive(Debug, Clone, Copy)]
enum Slot {
    /// A job holds the reservation and is still running
    InFlight(JobId),
    /// A trace was registered for this fingerprint
    Committed(TraceId),
}

/// Outcome of [`DuplicateLedger::check_and_reserve`]
#[derive(Debug)]
pub enum Outcome {
    /// The fingerprint is new in this scope; the caller holds the reservation
    New(Reservation),
    /// Another job holds the reservation; attach to its result
    InFlight(JobId),
    /// A trace already exists for this fingerprint
    Existing(TraceId),
}

/// Exclusive claim on a `(scope, fingerprint)` key
///
/// Must be either committed or released; dropping it without doing so
/// leaves the slot blocked for the rest of the session.
#[derive(Debug)]
pub struct Reservation {
    scope: ScopeId,
    fingerprint: Fingerprint,
}

impl Reservation {
    /// The scope this reservation belongs to
    #[inline]
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// The reserved fingerprint
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Content-addressed fingerprint store with atomic reservations
pub struct DuplicateLedger {
    entries: DashMap<(ScopeId, Fingerprint), Slot>,
    sink: Arc<dyn Sink>,
}

impl DuplicateLedger {
    /// Create a ledger backed by the given sink
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            entries: DashMap::new(),
            sink,
        }
    }

    /// Atomically claim a fingerprint within a scope
    ///
    /// Exactly one concurrent caller observes [`Outcome::New`]; the rest
    /// see [`Outcome::InFlight`] until the winner commits or releases.
    #[must_use]
    pub fn check_and_reserve(
        &self,
        fingerprint: Fingerprint,
        scope: ScopeId,
        job: JobId,
    ) -> Outcome {
        match self.entries.entry((scope, fingerprint)) {
            Entry::Occupied(occupied) => match *occupied.get() {
                Slot::Committed(trace_id) => Outcome::Existing(trace_id),
                Slot::InFlight(holder) => Outcome::InFlight(holder),
            },
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight(job));
                tracing::debug!(fingerprint = %fingerprint.short(), %job, "ledger reservation taken");
                Outcome::New(Reservation { scope, fingerprint })
            }
        }
    }

    /// Commit a reservation to a registered trace
    ///
    /// The entry becomes visible to future `check_and_reserve` calls as
    /// `Existing` and is written through to the sink. A sink failure is
    /// logged but does not undo the in-memory commit: the trace is
    /// already registered, so dedup must keep honoring it.
    pub async fn commit(&self, reservation: Reservation, trace_id: TraceId) -> Result<(), LedgerError> {
        let key = (reservation.scope, reservation.fingerprint);
        self.entries.insert(key, Slot::Committed(trace_id));

        let record = LedgerEntry {
            fingerprint: reservation.fingerprint,
            trace_id,
            scope: reservation.scope,
            created_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record)?;
        let sink_key = format!("ledger/{}", reservation.fingerprint);
        if let Err(error) = self.sink.put(reservation.scope, &sink_key, bytes).await {
            tracing::warn!(%error, fingerprint = %reservation.fingerprint.short(), "ledger write-through failed");
        }
        Ok(())
    }

    /// Release a reservation whose job failed
    ///
    /// The slot becomes free so another submission of the same payload
    /// can try again.
    pub fn release(&self, reservation: Reservation) {
        let key = (reservation.scope, reservation.fingerprint);
        if let Entry::Occupied(occupied) = self.entries.entry(key) {
            if matches!(occupied.get(), Slot::InFlight(_)) {
                occupied.remove();
            }
        }
    }

    /// Look up the committed trace for a fingerprint, if any
    #[must_use]
    pub fn resolve(&self, fingerprint: Fingerprint, scope: ScopeId) -> Option<TraceId> {
        match self.entries.get(&(scope, fingerprint)).map(|slot| *slot.value()) {
            Some(Slot::Committed(trace_id)) => Some(trace_id),
            _ => None,
        }
    }

    /// Drop every entry for a scope, in memory and in the sink
    ///
    /// Other scopes are unaffected.
    pub async fn purge(&self, scope: ScopeId) -> Result<(), LedgerError> {
        self.entries.retain(|(entry_scope, _), _| *entry_scope != scope);
        self.sink.purge(scope).await?;
        tracing::info!(%scope, "ledger scope purged");
        Ok(())
    }

    /// Number of ledger slots across all scopes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds no slots
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
