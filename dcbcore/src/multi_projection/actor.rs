//! Multi-projection actor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::config::MultiProjectionConfig;
use crate::domain::{Domain, DomainTypes};
use crate::errors::{ProjectionResult, SnapshotError, SnapshotResult};
use crate::event::{Event, SerializedEvent};
use crate::event_store::EventStore;
use crate::multi_projection::{
    safe_window_threshold, DualStateProjection, LagTracker, MultiProjectionState,
};
use crate::types::SortableUniqueId;

/// Number of events read per page during catch-up.
const CATCH_UP_PAGE_SIZE: usize = 1_000;

/// Where a batch of events came from.
///
/// Only live stream deliveries feed the observed-lag estimate; catch-up reads
/// are historical and would inflate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Live delivery from a subscription
    Stream,
    /// Historical read from the event store
    CatchUp,
    /// Origin not known
    Unknown,
}

/// Owns one multi projection and advances it as events arrive.
///
/// The actor computes the safe-window threshold for every batch from its
/// configuration (and, when dynamic widening is enabled, from the lag it has
/// observed on the stream), then hands the batch to a [`DualStateProjection`].
pub struct MultiProjectionActor<D: Domain> {
    domain: Arc<DomainTypes<D>>,
    config: MultiProjectionConfig,
    projection: DualStateProjection<D>,
    lag: LagTracker,
}

impl<D: Domain> MultiProjectionActor<D> {
    /// Creates an actor for the registered projector `projector_name`.
    pub fn new(
        domain: Arc<DomainTypes<D>>,
        projector_name: &str,
        config: MultiProjectionConfig,
    ) -> ProjectionResult<Self> {
        let projector = domain.multi_projectors().get(projector_name)?.clone();
        Ok(Self {
            projection: DualStateProjection::new(projector),
            domain,
            config,
            lag: LagTracker::new(),
        })
    }

    /// Name of the projector this actor drives.
    pub const fn projector_name(&self) -> &'static str {
        self.projection.projector_name()
    }

    /// Adds events using the current clock.
    pub fn add_events(
        &mut self,
        events: Vec<Event<D::Event>>,
        source: EventSource,
    ) -> ProjectionResult<usize> {
        self.add_events_at(events, source, Utc::now())
    }

    /// Adds events as if delivered at `now`.
    pub fn add_events_at(
        &mut self,
        events: Vec<Event<D::Event>>,
        source: EventSource,
        now: DateTime<Utc>,
    ) -> ProjectionResult<usize> {
        if source == EventSource::Stream && !events.is_empty() {
            if let Some(dynamic) = self.config.dynamic.as_ref() {
                self.lag
                    .observe(events.iter().map(Event::sortable_unique_id), now, dynamic);
            }
        }
        let threshold = self.safe_window_threshold_at(now);
        self.add_events_with_threshold(events, &threshold)
    }

    /// Adds events against an explicit threshold, bypassing the clock.
    pub fn add_events_with_threshold(
        &mut self,
        events: Vec<Event<D::Event>>,
        threshold: &SortableUniqueId,
    ) -> ProjectionResult<usize> {
        self.projection.add_events(events, threshold, &self.domain)
    }

    /// Decodes serialized events through the event registry, then adds them.
    pub fn add_serialized_events(
        &mut self,
        events: Vec<SerializedEvent>,
        source: EventSource,
    ) -> ProjectionResult<usize> {
        let events = events
            .into_iter()
            .map(|event| event.into_event(self.domain.events()))
            .collect::<Result<Vec<_>, _>>()?;
        self.add_events(events, source)
    }

    /// Reads every event after the safe position from `store` and adds it.
    #[instrument(skip(self, store), fields(projector = self.projector_name()))]
    pub async fn catch_up(
        &mut self,
        store: &dyn EventStore<Event = D::Event>,
    ) -> ProjectionResult<usize> {
        let mut since = self.projection.safe_position().cloned();
        let mut total = 0;
        loop {
            let page = store
                .read_all_events(since.as_ref(), Some(CATCH_UP_PAGE_SIZE))
                .await?;
            let Some(last) = page.last() else {
                break;
            };
            since = Some(last.sortable_unique_id().clone());
            let full_page = page.len() == CATCH_UP_PAGE_SIZE;
            total += self.add_events(page, EventSource::CatchUp)?;
            if !full_page {
                break;
            }
        }
        debug!(accepted = total, "catch-up finished");
        Ok(total)
    }

    /// Moves buffered events that have left the window into the safe view.
    #[instrument(skip(self), fields(projector = self.projector_name()))]
    pub fn promote(&mut self) -> ProjectionResult<usize> {
        let threshold = self.safe_window_threshold();
        self.projection.promote(&threshold, &self.domain)
    }

    /// Safe view, or the unsafe view when `can_get_unsafe` is set.
    pub fn state(&self, can_get_unsafe: bool) -> MultiProjectionState<D::MultiState> {
        if can_get_unsafe {
            self.projection.unsafe_state()
        } else {
            self.projection.safe_state()
        }
    }

    /// Threshold for the current clock.
    pub fn safe_window_threshold(&self) -> SortableUniqueId {
        self.safe_window_threshold_at(Utc::now())
    }

    /// Threshold for the instant `now`.
    pub fn safe_window_threshold_at(&self, now: DateTime<Utc>) -> SortableUniqueId {
        safe_window_threshold(now, &self.config, &self.lag)
    }

    /// `true` once the projection has seen an event at or after `id`.
    pub fn is_sortable_unique_id_received(&self, id: &SortableUniqueId) -> bool {
        self.projection.is_received(id)
    }

    /// The state to persist: always the safe view.
    pub fn snapshot_state(&self) -> MultiProjectionState<D::MultiState> {
        self.projection.safe_state()
    }

    /// Replaces the projection with a snapshotted safe state.
    ///
    /// # Errors
    /// `SnapshotError::VersionMismatch` if the snapshot was produced by
    /// another projector version; the caller should rebuild from the log.
    pub fn restore(&mut self, state: MultiProjectionState<D::MultiState>) -> SnapshotResult<()> {
        let projector = self
            .domain
            .multi_projectors()
            .get(self.projector_name())
            .map_err(|error| SnapshotError::Storage(error.to_string()))?
            .clone();
        if state.projector_name != projector.name()
            || state.projector_version != projector.version()
        {
            return Err(SnapshotError::VersionMismatch {
                projector: state.projector_name,
                stored: state.projector_version,
                current: projector.version().to_string(),
            });
        }
        info!(
            projector = projector.name(),
            version = state.version,
            "multi projection restored from snapshot"
        );
        self.projection = DualStateProjection::from_snapshot(projector, state);
        Ok(())
    }
}
