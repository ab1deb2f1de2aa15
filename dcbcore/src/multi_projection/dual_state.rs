//! Safe/unsafe dual view of one multi projection.

use std::collections::{BTreeMap, HashSet};

use tracing::{trace, warn};

use crate::domain::{Domain, DomainTypes};
use crate::errors::ProjectionResult;
use crate::event::{sort_and_dedup, Event};
use crate::multi_projection::{MultiProjectionState, MultiProjectorEntry};
use crate::payload::PayloadUnion;
use crate::types::{EventId, SortableUniqueId};

#[derive(Debug, Clone)]
struct ProjectionView<M> {
    payload: M,
    version: u64,
    last_sortable_unique_id: Option<SortableUniqueId>,
    last_event_id: Option<EventId>,
    events_processed: u64,
}

impl<M> ProjectionView<M> {
    fn accepts_in_order(&self, id: &SortableUniqueId) -> bool {
        self.last_sortable_unique_id
            .as_ref()
            .map_or(true, |last| id > last)
    }
}

/// Folds `events` onto `view`. The last folded id never moves backwards.
fn fold<'e, D: Domain>(
    mut view: ProjectionView<D::MultiState>,
    events: impl IntoIterator<Item = &'e Event<D::Event>>,
    projector: &MultiProjectorEntry<D>,
    domain: &DomainTypes<D>,
    threshold: &SortableUniqueId,
) -> ProjectionResult<ProjectionView<D::MultiState>> {
    for event in events {
        view.payload = projector.apply(view.payload, event, domain, threshold)?;
        view.version += 1;
        view.events_processed += 1;
        if view.accepts_in_order(event.sortable_unique_id()) {
            view.last_sortable_unique_id = Some(event.sortable_unique_id().clone());
            view.last_event_id = Some(event.id());
        }
    }
    Ok(view)
}

type BufferKey = (SortableUniqueId, EventId);

fn buffer_key<E: PayloadUnion>(event: &Event<E>) -> BufferKey {
    (event.sortable_unique_id().clone(), event.id())
}

fn sort_by_key<E: PayloadUnion>(events: &mut [&Event<E>]) {
    events.sort_by(|a, b| {
        a.sortable_unique_id()
            .cmp(b.sortable_unique_id())
            .then_with(|| a.id().cmp(&b.id()))
    });
}

/// Safe and unsafe views of one multi projection.
///
/// Events newer than the threshold wait in a buffer ordered by sortable id.
/// Each call to [`Self::add_events`] or [`Self::promote`] moves the buffered
/// events at or before the threshold into the safe view. The safe view always
/// equals its starting point (empty, or a restored snapshot) folded with every
/// safe event in sortable-id order: an event that lands behind the safe
/// position triggers a rebuild from the retained safe events instead of being
/// folded late. The unsafe view is the safe view plus the buffer, folded in
/// order.
///
/// A batch is applied all-or-nothing. If the projector fails on any event,
/// neither view, the buffer nor the set of received events changes, so the
/// same batch fails again on redelivery instead of being dropped.
pub struct DualStateProjection<D: Domain> {
    projector: MultiProjectorEntry<D>,
    base: ProjectionView<D::MultiState>,
    safe_events: BTreeMap<BufferKey, Event<D::Event>>,
    safe: ProjectionView<D::MultiState>,
    unsafe_view: ProjectionView<D::MultiState>,
    buffer: BTreeMap<BufferKey, Event<D::Event>>,
    received: HashSet<EventId>,
    snapshot_watermark: Option<SortableUniqueId>,
    applied_snapshot_version: Option<String>,
    threshold: SortableUniqueId,
}

impl<D: Domain> DualStateProjection<D> {
    /// An empty projection.
    pub fn new(projector: MultiProjectorEntry<D>) -> Self {
        let view = ProjectionView {
            payload: projector.initial_payload(),
            version: 0,
            last_sortable_unique_id: None,
            last_event_id: None,
            events_processed: 0,
        };
        Self::starting_from(projector, view, None, None, SortableUniqueId::zero())
    }

    /// Resumes from a snapshotted safe state.
    ///
    /// Events at or before the snapshot's last folded id are ignored from now
    /// on; they are already contained in the payload.
    pub fn from_snapshot(
        projector: MultiProjectorEntry<D>,
        state: MultiProjectionState<D::MultiState>,
    ) -> Self {
        let watermark = state.last_sortable_unique_id.clone();
        let view = ProjectionView {
            payload: state.payload,
            version: state.version,
            last_sortable_unique_id: state.last_sortable_unique_id,
            last_event_id: state.last_event_id,
            events_processed: state.events_processed,
        };
        Self::starting_from(
            projector,
            view,
            watermark,
            Some(state.projector_version),
            state.safe_window_threshold,
        )
    }

    fn starting_from(
        projector: MultiProjectorEntry<D>,
        base: ProjectionView<D::MultiState>,
        snapshot_watermark: Option<SortableUniqueId>,
        applied_snapshot_version: Option<String>,
        threshold: SortableUniqueId,
    ) -> Self {
        Self {
            projector,
            safe_events: BTreeMap::new(),
            safe: base.clone(),
            unsafe_view: base.clone(),
            base,
            buffer: BTreeMap::new(),
            received: HashSet::new(),
            snapshot_watermark,
            applied_snapshot_version,
            threshold,
        }
    }

    /// Name of the projector.
    pub const fn projector_name(&self) -> &'static str {
        self.projector.name()
    }

    /// Adds a batch of events and advances the safe view to `threshold`.
    ///
    /// Duplicates (by event id) and events already covered by a restored
    /// snapshot are skipped. Returns the number of newly accepted events.
    pub fn add_events(
        &mut self,
        mut events: Vec<Event<D::Event>>,
        threshold: &SortableUniqueId,
        domain: &DomainTypes<D>,
    ) -> ProjectionResult<usize> {
        sort_and_dedup(&mut events);
        events.retain(|event| {
            !self.received.contains(&event.id())
                && !self
                    .snapshot_watermark
                    .as_ref()
                    .is_some_and(|watermark| event.sortable_unique_id() <= watermark)
        });
        let accepted = events.len();
        self.advance(events, threshold, domain)?;
        Ok(accepted)
    }

    /// Moves buffered events at or before `threshold` into the safe view.
    ///
    /// The effective threshold never moves backwards, so a narrower window
    /// later on cannot un-finalize events. Returns the number of buffered
    /// events that became safe.
    pub fn promote(
        &mut self,
        threshold: &SortableUniqueId,
        domain: &DomainTypes<D>,
    ) -> ProjectionResult<usize> {
        self.advance(Vec::new(), threshold, domain)
    }

    /// Folds `fresh` (sorted, unseen events) into both views and promotes the
    /// buffer up to `threshold`. Nothing is committed unless every fold
    /// succeeds.
    fn advance(
        &mut self,
        fresh: Vec<Event<D::Event>>,
        threshold: &SortableUniqueId,
        domain: &DomainTypes<D>,
    ) -> ProjectionResult<usize> {
        let threshold = if *threshold > self.threshold {
            threshold.clone()
        } else {
            self.threshold.clone()
        };
        let (fresh_safe, fresh_pending): (Vec<_>, Vec<_>) = fresh
            .into_iter()
            .partition(|event| *event.sortable_unique_id() <= threshold);
        let promoted: Vec<BufferKey> = self
            .buffer
            .keys()
            .take_while(|(id, _)| *id <= threshold)
            .cloned()
            .collect();

        if promoted.is_empty() && fresh_safe.is_empty() && fresh_pending.is_empty() {
            self.threshold = threshold;
            return Ok(0);
        }

        let mut promotable: Vec<&Event<D::Event>> = promoted
            .iter()
            .filter_map(|key| self.buffer.get(key))
            .chain(&fresh_safe)
            .collect();
        sort_by_key(&mut promotable);

        let rebuild_safe = promotable
            .first()
            .is_some_and(|first| !self.safe.accepts_in_order(first.sortable_unique_id()));
        let safe = if rebuild_safe {
            warn!(
                projector = self.projector.name(),
                safe_events = self.safe_events.len() + promotable.len(),
                "event arrived behind the safe view; rebuilding it in order"
            );
            let mut ordered: Vec<&Event<D::Event>> = self
                .safe_events
                .values()
                .chain(promotable.iter().copied())
                .collect();
            sort_by_key(&mut ordered);
            fold(self.base.clone(), ordered, &self.projector, domain, &threshold)?
        } else {
            fold(self.safe.clone(), promotable, &self.projector, domain, &threshold)?
        };

        let fresh_in_order = fresh_safe
            .iter()
            .chain(&fresh_pending)
            .all(|event| self.unsafe_view.accepts_in_order(event.sortable_unique_id()));
        let unsafe_view = if !rebuild_safe && fresh_in_order {
            fold(
                self.unsafe_view.clone(),
                fresh_safe.iter().chain(&fresh_pending),
                &self.projector,
                domain,
                &threshold,
            )?
        } else {
            trace!(
                projector = self.projector.name(),
                buffered = self.buffer.len() - promoted.len() + fresh_pending.len(),
                "out-of-order arrival; rebuilding unsafe view"
            );
            let mut pending: Vec<&Event<D::Event>> = self
                .buffer
                .values()
                .skip(promoted.len())
                .chain(&fresh_pending)
                .collect();
            sort_by_key(&mut pending);
            fold(safe.clone(), pending, &self.projector, domain, &threshold)?
        };

        for event in fresh_safe.iter().chain(&fresh_pending) {
            self.received.insert(event.id());
        }
        for key in &promoted {
            if let Some(event) = self.buffer.remove(key) {
                self.safe_events.insert(key.clone(), event);
            }
        }
        for event in fresh_safe {
            self.safe_events.insert(buffer_key(&event), event);
        }
        for event in fresh_pending {
            self.buffer.insert(buffer_key(&event), event);
        }
        self.safe = safe;
        self.unsafe_view = unsafe_view;
        self.threshold = threshold;
        Ok(promoted.len())
    }

    fn state(
        &self,
        view: &ProjectionView<D::MultiState>,
        is_safe_state: bool,
    ) -> MultiProjectionState<D::MultiState> {
        MultiProjectionState {
            projector_name: self.projector.name().to_string(),
            projector_version: self.projector.version().to_string(),
            payload: view.payload.clone(),
            version: view.version,
            last_sortable_unique_id: view.last_sortable_unique_id.clone(),
            last_event_id: view.last_event_id,
            events_processed: view.events_processed,
            safe_window_threshold: self.threshold.clone(),
            is_safe_state,
            applied_snapshot_version: self.applied_snapshot_version.clone(),
        }
    }

    /// The final view: only events at or before the threshold.
    pub fn safe_state(&self) -> MultiProjectionState<D::MultiState> {
        self.state(&self.safe, true)
    }

    /// The latest view: safe view plus every buffered event.
    pub fn unsafe_state(&self) -> MultiProjectionState<D::MultiState> {
        self.state(&self.unsafe_view, false)
    }

    /// Threshold the safe view has been advanced to.
    pub const fn safe_window_threshold(&self) -> &SortableUniqueId {
        &self.threshold
    }

    /// Number of events waiting inside the window.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Newest event folded into the safe view.
    pub fn safe_position(&self) -> Option<&SortableUniqueId> {
        self.safe.last_sortable_unique_id.as_ref()
    }

    /// `true` once the projection has seen an event at or after `id`.
    pub fn is_received(&self, id: &SortableUniqueId) -> bool {
        self.unsafe_view
            .last_sortable_unique_id
            .as_ref()
            .is_some_and(|last| last >= id)
    }
}
