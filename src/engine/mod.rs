mod conflict;
mod error;
mod mutations;
mod queries;
mod transitions;

pub use conflict::{Candidate, ConflictEntry, ConflictResult};
pub use error::{EngineError, FieldError};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::clock::Clock;
use crate::index::ConsultantState;
use crate::journal::Journal;
use crate::model::*;
use crate::recurrence;

pub type SharedConsultantState = Arc<RwLock<ConsultantState>>;
pub type SharedSchedule = Arc<RwLock<Schedule>>;

// ── Group-commit journal channel ─────────────────────────

pub(super) enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group
/// commit: buffer every immediately-available append, one fsync for the
/// batch, then answer all senders.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            JournalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(JournalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            flush_and_respond(&mut journal, &mut batch);
                            handle_non_append(&mut journal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut journal, &mut batch);
                }
            }
            other => handle_non_append(&mut journal, other),
        }
    }
}

fn flush_and_respond(
    journal: &mut Journal,
    batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>,
) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE)
        .record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next
    // batch (these callers are told the batch failed either way).
    let flush_err = journal.flush_sync().err();
    let result: io::Result<()> = match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    };

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { .. } => unreachable!(),
    }
}

// ── The scheduling service ───────────────────────────────

/// The scheduling engine: validates requests, expands recurrence, runs
/// conflict detection against per-consultant partitions, and commits
/// journal + index as one unit. Same-consultant writes serialize on the
/// partition lock; different consultants proceed in parallel.
pub struct Scheduler {
    /// Per-consultant partitions, created lazily on first write.
    pub(super) consultants: DashMap<Ulid, SharedConsultantState>,
    pub(super) schedules: DashMap<Ulid, SharedSchedule>,
    /// Reverse lookups: entity id → consultant id.
    pub(super) window_owner: DashMap<Ulid, Ulid>,
    pub(super) assignment_owner: DashMap<Ulid, Ulid>,
    /// Schedule → its assignment ids.
    pub(super) schedule_assignments: DashMap<Ulid, Vec<Ulid>>,
    journal_tx: mpsc::Sender<JournalCommand>,
    /// Every committing operation holds this for read across its journal
    /// append; compaction holds it for write so no append can land between
    /// the snapshot cut and the file swap. Acquired before any entity lock.
    pub(super) compact_gate: RwLock<()>,
    pub(super) clock: Arc<dyn Clock>,
}

/// Expand a window into its index entries over the window's own bounds.
/// Journaled windows were validated on the write path, so expansion
/// failure on replay degrades to an empty entry set.
pub(super) fn window_entries(window: &AvailabilityWindow) -> Vec<IndexEntry> {
    match recurrence::expand(window, window.start_date, window.end_date) {
        Ok(occurrences) => occurrences
            .map(|o| IndexEntry {
                ref_id: window.id,
                span: o.span(),
                kind: EntryKind::Availability(window.availability_type),
            })
            .collect(),
        Err(e) => {
            tracing::error!("stored window {} failed to expand: {e}", window.id);
            Vec::new()
        }
    }
}

/// Apply a consultant-owned event to its partition (no locking — the
/// caller holds the partition lock).
pub(super) fn apply_to_owner(cs: &mut ConsultantState, event: &Event) {
    match event {
        Event::WindowUpserted { window } => {
            cs.rebuild_ref(window.id, window_entries(window));
            cs.windows.insert(window.id, window.clone());
        }
        Event::WindowDeleted { id, .. } => {
            cs.remove_ref(*id);
            cs.windows.remove(id);
        }
        Event::AssignmentUpserted { assignment } => {
            if assignment.status.blocks_time() {
                cs.rebuild_ref(
                    assignment.id,
                    vec![IndexEntry {
                        ref_id: assignment.id,
                        span: assignment.span(),
                        kind: EntryKind::Booking(assignment.status),
                    }],
                );
            } else {
                // Terminal assignments stop occupying time.
                cs.remove_ref(assignment.id);
            }
            cs.assignments.insert(assignment.id, assignment.clone());
        }
        Event::AssignmentDeleted { id, .. } => {
            cs.remove_ref(*id);
            cs.assignments.remove(id);
        }
        // Schedule events carry no per-consultant state.
        Event::ScheduleUpserted { .. } | Event::ScheduleDeleted { .. } => {}
    }
}

/// Consultant a journal event belongs to, if any.
fn event_owner(event: &Event) -> Option<Ulid> {
    match event {
        Event::WindowUpserted { window } => Some(window.owner_id),
        Event::WindowDeleted { owner_id, .. } => Some(*owner_id),
        Event::AssignmentUpserted { assignment } => Some(assignment.consultant_id),
        Event::AssignmentDeleted { consultant_id, .. } => Some(*consultant_id),
        Event::ScheduleUpserted { .. } | Event::ScheduleDeleted { .. } => None,
    }
}

impl Scheduler {
    /// Replay the journal at `journal_path` and start the group-commit
    /// writer task. Must run inside a tokio runtime.
    pub fn new(journal_path: PathBuf, clock: Arc<dyn Clock>) -> io::Result<Self> {
        let events = Journal::replay(&journal_path)?;
        let journal = Journal::open(&journal_path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let engine = Self {
            consultants: DashMap::new(),
            schedules: DashMap::new(),
            window_owner: DashMap::new(),
            assignment_owner: DashMap::new(),
            schedule_assignments: DashMap::new(),
            journal_tx,
            compact_gate: RwLock::new(()),
            clock,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds. Never use blocking_write here: this may run inside an
        // async context.
        for event in &events {
            match event {
                Event::ScheduleUpserted { schedule } => {
                    engine
                        .schedules
                        .insert(schedule.id, Arc::new(RwLock::new(schedule.clone())));
                }
                Event::ScheduleDeleted { id } => {
                    engine.schedules.remove(id);
                    engine.schedule_assignments.remove(id);
                }
                other => {
                    if let Some(owner) = event_owner(other) {
                        let cs = engine.consultant(owner);
                        let mut guard = cs.try_write().expect("replay: uncontended write");
                        apply_to_owner(&mut guard, other);
                        engine.register(other);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Get or lazily create a consultant's partition.
    pub(super) fn consultant(&self, owner_id: Ulid) -> SharedConsultantState {
        let cs = self
            .consultants
            .entry(owner_id)
            .or_insert_with(|| Arc::new(RwLock::new(ConsultantState::new(owner_id))))
            .value()
            .clone();
        metrics::gauge!(crate::observability::CONSULTANTS_ACTIVE)
            .set(self.consultants.len() as f64);
        cs
    }

    pub(super) fn try_consultant(&self, owner_id: &Ulid) -> Option<SharedConsultantState> {
        self.consultants.get(owner_id).map(|e| e.value().clone())
    }

    /// Maintain the reverse-lookup maps for a committed event.
    pub(super) fn register(&self, event: &Event) {
        match event {
            Event::WindowUpserted { window } => {
                self.window_owner.insert(window.id, window.owner_id);
            }
            Event::WindowDeleted { id, .. } => {
                self.window_owner.remove(id);
            }
            Event::AssignmentUpserted { assignment } => {
                self.assignment_owner
                    .insert(assignment.id, assignment.consultant_id);
                let mut ids = self
                    .schedule_assignments
                    .entry(assignment.schedule_id)
                    .or_default();
                if !ids.contains(&assignment.id) {
                    ids.push(assignment.id);
                }
            }
            Event::AssignmentDeleted { id, schedule_id, .. } => {
                self.assignment_owner.remove(id);
                if let Some(mut ids) = self.schedule_assignments.get_mut(schedule_id) {
                    ids.retain(|a| a != id);
                }
            }
            Event::ScheduleUpserted { .. } | Event::ScheduleDeleted { .. } => {}
        }
    }

    /// Write an event to the journal via the background group-commit writer.
    pub(super) async fn journal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    /// Journal-append + apply + reverse-map upkeep in one call. The caller
    /// holds the partition lock; nothing is applied if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        cs: &mut ConsultantState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.journal_append(event).await?;
        apply_to_owner(cs, event);
        self.register(event);
        Ok(())
    }

    /// Lookup window id → owner partition, write-locked.
    pub(super) async fn resolve_window_write(
        &self,
        id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ConsultantState>), EngineError> {
        let owner = self
            .window_owner
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))?;
        let cs = self
            .try_consultant(&owner)
            .ok_or(EngineError::NotFound(owner))?;
        Ok((owner, cs.write_owned().await))
    }

    /// Lookup assignment id → owner partition, write-locked.
    pub(super) async fn resolve_assignment_write(
        &self,
        id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<ConsultantState>), EngineError> {
        let owner = self
            .assignment_owner
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))?;
        let cs = self
            .try_consultant(&owner)
            .ok_or(EngineError::NotFound(owner))?;
        Ok((owner, cs.write_owned().await))
    }

    /// Rewrite the journal with a minimal snapshot of the current state.
    /// The write side of the gate quiesces all committing operations until
    /// the rewritten file has replaced the old one, so no acknowledged
    /// append ever lands in the discarded file.
    pub async fn compact_journal(&self) -> Result<(), EngineError> {
        let _gate = self.compact_gate.write().await;
        let mut events = Vec::new();

        let schedules: Vec<SharedSchedule> =
            self.schedules.iter().map(|e| e.value().clone()).collect();
        for schedule in schedules {
            let guard = schedule.read().await;
            events.push(Event::ScheduleUpserted { schedule: guard.clone() });
        }
        let partitions: Vec<SharedConsultantState> =
            self.consultants.iter().map(|e| e.value().clone()).collect();
        for cs in partitions {
            let guard = cs.read().await;
            for window in guard.windows.values() {
                events.push(Event::WindowUpserted { window: window.clone() });
            }
            for assignment in guard.assignments.values() {
                events.push(Event::AssignmentUpserted { assignment: assignment.clone() });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.journal_tx
            .send(JournalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Store("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Store("journal writer dropped response".into()))?
            .map_err(|e| EngineError::Store(e.to_string()))
    }

    pub async fn journal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Count an operation outcome and its latency for the RED metrics.
pub(super) fn record_op(op: &'static str, started: std::time::Instant, err: Option<&EngineError>) {
    metrics::histogram!(crate::observability::OP_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
    let status = match err {
        None => "ok",
        Some(EngineError::Conflict(_)) => {
            metrics::counter!(crate::observability::CONFLICTS_TOTAL, "op" => op).increment(1);
            "conflict"
        }
        Some(EngineError::StaleVersion { .. }) => {
            metrics::counter!(crate::observability::STALE_VERSIONS_TOTAL).increment(1);
            "stale"
        }
        Some(_) => "error",
    };
    metrics::counter!(crate::observability::OPS_TOTAL, "op" => op, "status" => status)
        .increment(1);
}
