//! Snapshot save, load, offload and invalidation against the in-memory stores.

use std::sync::Arc;

use dcbcore::config::{MaxSnapshotBytes, OffloadThresholdBytes};
use dcbcore::snapshot::{SnapshotBody, SnapshotKey, SnapshotKind};
use dcbcore::{
    CommandExecutor, DomainTypes, MultiProjectionActor, MultiProjectionConfig, MultiProjector,
    SafeWindowMs, Snapshot, SnapshotConfig, SnapshotError, SnapshotManager, SnapshotStore,
    TagProjector, TagType, TagVersion,
};
use dcbcore_examples::classroom::{
    domain_types, ClassRoomDomain, ClassRoomEvent, ClassRoomId, ClassRoomRosterProjector,
    ClassRoomTagState, CreateClassRoom, CreateStudent, EnrollStudentInClassRoom, StudentId,
    StudentProjector, StudentTag,
};
use dcbcore_memory::{InMemoryBlobStorage, InMemoryEventStore, InMemorySnapshotStore};

type Executor = CommandExecutor<ClassRoomDomain, InMemoryEventStore<ClassRoomEvent>>;

struct Fixture {
    domain: Arc<DomainTypes<ClassRoomDomain>>,
    executor: Executor,
    records: InMemorySnapshotStore,
    blobs: InMemoryBlobStorage,
}

impl Fixture {
    async fn enrolled() -> Self {
        let domain = Arc::new(domain_types().unwrap());
        let executor = CommandExecutor::new(InMemoryEventStore::new(), Arc::clone(&domain));
        let fixture = Self {
            domain,
            executor,
            records: InMemorySnapshotStore::new(),
            blobs: InMemoryBlobStorage::new(),
        };
        fixture
            .executor
            .execute(&CreateStudent::new(student("S1"), "Ann", 2))
            .await
            .unwrap();
        fixture
            .executor
            .execute(&CreateClassRoom::new(room("C1"), "Algebra", 3))
            .await
            .unwrap();
        fixture.enrol("S1", "C1").await;
        fixture
    }

    async fn enrol(&self, student_id: &str, class_room_id: &str) {
        self.executor
            .execute(&EnrollStudentInClassRoom::new(student(student_id), room(class_room_id)))
            .await
            .unwrap();
    }

    fn manager(&self, config: SnapshotConfig) -> SnapshotManager<ClassRoomDomain> {
        SnapshotManager::new(Arc::clone(&self.domain), Arc::new(self.records.clone()))
            .with_blob_storage(Arc::new(self.blobs.clone()))
            .with_config(config)
    }

    async fn roster(&self) -> MultiProjectionActor<ClassRoomDomain> {
        let mut actor = MultiProjectionActor::new(
            Arc::clone(&self.domain),
            ClassRoomRosterProjector::NAME,
            final_immediately(),
        )
        .unwrap();
        actor.catch_up(self.executor.store()).await.unwrap();
        actor
    }
}

fn student(id: &str) -> StudentId {
    StudentId::try_new(id).unwrap()
}

fn room(id: &str) -> ClassRoomId {
    ClassRoomId::try_new(id).unwrap()
}

fn final_immediately() -> MultiProjectionConfig {
    MultiProjectionConfig::default().with_safe_window(SafeWindowMs::try_new(0).unwrap())
}

fn offload_everything() -> SnapshotConfig {
    SnapshotConfig {
        offload_threshold: OffloadThresholdBytes::try_new(1).unwrap(),
        ..SnapshotConfig::default()
    }
}

#[tokio::test]
async fn tag_state_round_trips() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(SnapshotConfig::default());
    let tag = StudentTag(student("S1")).to_tag();
    let state = fixture
        .executor
        .get_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap();

    let record = manager.save(&Snapshot::TagState(state.clone())).await.unwrap();
    assert_eq!(record.payload_type, "StudentState");
    assert_eq!(record.version, 2);
    assert!(!record.body.is_offloaded());

    let restored = manager
        .load_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored, state);
    assert_eq!(restored.version, TagVersion::new(2));
}

#[tokio::test]
async fn missing_snapshots_load_as_none() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(SnapshotConfig::default());

    let tag = StudentTag(student("S404")).to_tag();
    assert!(manager
        .load_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap()
        .is_none());
    assert!(manager
        .load_multi_projection(ClassRoomRosterProjector::NAME)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn a_restored_roster_continues_from_its_snapshot() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(SnapshotConfig::default());
    let saved = fixture.roster().await.snapshot_state();
    manager
        .save(&Snapshot::MultiProjection(saved.clone()))
        .await
        .unwrap();

    fixture
        .executor
        .execute(&CreateStudent::new(student("S2"), "Bob", 1))
        .await
        .unwrap();
    fixture.enrol("S2", "C1").await;

    let snapshot = manager
        .load_multi_projection(ClassRoomRosterProjector::NAME)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(snapshot.payload, saved.payload);
    assert_eq!(snapshot.version, saved.version);
    assert_eq!(snapshot.safe_window_threshold, saved.safe_window_threshold);
    assert_eq!(snapshot.applied_snapshot_version.as_deref(), Some("1"));

    let mut actor = MultiProjectionActor::new(
        Arc::clone(&fixture.domain),
        ClassRoomRosterProjector::NAME,
        final_immediately(),
    )
    .unwrap();
    actor.restore(snapshot).unwrap();
    // Only the two events written after the snapshot are read.
    assert_eq!(actor.catch_up(fixture.executor.store()).await.unwrap(), 2);
    actor.promote().unwrap();

    let state = actor.state(false);
    let students = &state.payload.as_roster().unwrap().class_rooms["C1"].students;
    assert_eq!(students.iter().collect::<Vec<_>>(), ["S1", "S2"]);
}

#[tokio::test]
async fn large_bodies_are_offloaded_and_deleted_with_their_record() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(offload_everything());
    let roster = fixture.roster().await.snapshot_state();

    let record = manager
        .save(&Snapshot::MultiProjection(roster.clone()))
        .await
        .unwrap();
    assert!(matches!(
        record.body,
        SnapshotBody::Offloaded { ref provider, .. } if provider == "memory"
    ));
    insta::assert_debug_snapshot!(fixture.blobs.keys(), @r###"
    [
        "multi-projection/ClassRoomRoster/1/_",
    ]
    "###);

    let restored = manager
        .load_multi_projection(ClassRoomRosterProjector::NAME)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(restored.payload, roster.payload);

    assert!(manager.delete(&record.key).await.unwrap());
    assert!(fixture.blobs.keys().is_empty());
    assert!(fixture.records.is_empty());
}

#[tokio::test]
async fn an_offloaded_body_without_its_blob_is_reported() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(offload_everything());
    let roster = fixture.roster().await.snapshot_state();
    manager.save(&Snapshot::MultiProjection(roster)).await.unwrap();

    let inline_only =
        SnapshotManager::new(Arc::clone(&fixture.domain), Arc::new(fixture.records.clone()));
    let error = inline_only
        .load_multi_projection(ClassRoomRosterProjector::NAME)
        .await
        .unwrap_err();
    assert!(matches!(error, SnapshotError::BlobNotFound { .. }));
}

#[tokio::test]
async fn a_snapshot_from_another_projector_version_is_rejected() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(SnapshotConfig::default());
    let tag = StudentTag(student("S1")).to_tag();
    let state = fixture
        .executor
        .get_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap();
    let mut record = manager.save(&Snapshot::TagState(state)).await.unwrap();

    record.key = SnapshotKey::tag_state("Student:S1", StudentProjector::NAME, "0");
    fixture.records.upsert(record).await.unwrap();

    let error = manager
        .load_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap_err();
    insta::assert_snapshot!(error, @"Snapshot of 'StudentProjector' has version '0' but the registered version is '1'");

    // The log is still the source of truth.
    let rebuilt = fixture
        .executor
        .get_tag_state(&tag, StudentProjector::NAME)
        .await
        .unwrap();
    assert!(rebuilt
        .payload
        .as_state()
        .and_then(ClassRoomTagState::as_student)
        .is_some_and(|ann| ann.is_enrolled_in("C1")));
}

#[tokio::test]
async fn an_actor_refuses_a_state_from_another_projector_version() {
    let fixture = Fixture::enrolled().await;
    let mut state = fixture.roster().await.snapshot_state();
    state.projector_version = "0".to_string();

    let mut actor = MultiProjectionActor::new(
        Arc::clone(&fixture.domain),
        ClassRoomRosterProjector::NAME,
        final_immediately(),
    )
    .unwrap();
    assert!(matches!(
        actor.restore(state),
        Err(SnapshotError::VersionMismatch { ref stored, .. }) if stored == "0"
    ));
}

#[tokio::test]
async fn oversized_snapshots_are_refused() {
    let fixture = Fixture::enrolled().await;
    let manager = fixture.manager(SnapshotConfig {
        max_snapshot_bytes: Some(MaxSnapshotBytes::try_new(8).unwrap()),
        ..SnapshotConfig::default()
    });
    let roster = fixture.roster().await.snapshot_state();

    let error = manager
        .save(&Snapshot::MultiProjection(roster))
        .await
        .unwrap_err();
    assert!(matches!(error, SnapshotError::TooLarge { limit: 8, .. }));
    assert!(fixture
        .records
        .list(Some(SnapshotKind::MultiProjection))
        .await
        .unwrap()
        .is_empty());
}
