//! Class room example application
//!
//! Walks through the whole write and read path:
//! - registering students and class rooms
//! - enrolling with a two-tag consistency boundary
//! - rejecting an enrolment into a full class room
//! - building the roster multi projection and snapshotting it
//! - listing the tag state of every student from one multi projection

use std::sync::Arc;

use dcbcore::{
    CommandError, CommandExecutor, MultiProjectionActor, MultiProjectionConfig, MultiProjector,
    ProjectionError, SafeWindowMs, Snapshot, SnapshotError, SnapshotManager, TagProjector, TagType,
};
use dcbcore_examples::classroom::{
    domain_types, ClassRoomDomain, ClassRoomEvent, ClassRoomId, ClassRoomRosterProjector,
    ClassRoomTag, CreateClassRoom, CreateStudent, EnrollStudentInClassRoom, StudentId,
    StudentProjector, StudentStatesProjector, StudentTag,
};
use dcbcore_memory::{InMemoryBlobStorage, InMemoryEventStore, InMemorySnapshotStore};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum DemoError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

fn student(id: &str) -> Result<StudentId, DemoError> {
    StudentId::try_new(id).map_err(|error| DemoError::InvalidId(error.to_string()))
}

fn class_room(id: &str) -> Result<ClassRoomId, DemoError> {
    ClassRoomId::try_new(id).map_err(|error| DemoError::InvalidId(error.to_string()))
}

#[tokio::main]
async fn main() -> Result<(), DemoError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting class room example");

    let domain = Arc::new(domain_types().map_err(|error| DemoError::Config(error.to_string()))?);
    let store = InMemoryEventStore::<ClassRoomEvent>::new();
    let executor = CommandExecutor::new(store.clone(), Arc::clone(&domain));

    let ann = student("S1")?;
    let bob = student("S2")?;
    let algebra = class_room("C1")?;

    executor
        .execute(&CreateStudent::new(ann.clone(), "Ann", 2))
        .await?;
    executor
        .execute(&CreateStudent::new(bob.clone(), "Bob", 1))
        .await?;
    executor
        .execute(&CreateClassRoom::new(algebra.clone(), "Algebra", 1))
        .await?;

    info!("Enrolling Ann in Algebra");
    let enrolled = executor
        .execute(&EnrollStudentInClassRoom::new(ann.clone(), algebra.clone()))
        .await?;
    for write in &enrolled.tag_writes {
        info!(tag = %write.tag, version = %write.version, "tag advanced");
    }

    info!("Enrolling Bob in the now full class room");
    match executor
        .execute(&EnrollStudentInClassRoom::new(bob.clone(), algebra.clone()))
        .await
    {
        Ok(_) => warn!("enrolment into a full class room was accepted"),
        Err(error) => info!(%error, "enrolment correctly rejected"),
    }

    let ann_state = executor
        .get_tag_state(&StudentTag(ann).to_tag(), StudentProjector::NAME)
        .await?;
    info!(version = %ann_state.version, payload = ?ann_state.payload, "Ann's tag state");
    let algebra_tag = ClassRoomTag(algebra).to_tag();
    info!(tag = %algebra_tag, "class room tag in use");

    // A zero window makes every committed event final immediately.
    let config = MultiProjectionConfig::default().with_safe_window(
        SafeWindowMs::try_new(0).map_err(|error| DemoError::Config(error.to_string()))?,
    );
    let mut roster = MultiProjectionActor::<ClassRoomDomain>::new(
        Arc::clone(&domain),
        ClassRoomRosterProjector::NAME,
        config,
    )?;
    let accepted = roster.catch_up(&store).await?;
    roster.promote()?;
    let state = roster.state(false);
    info!(accepted, version = state.version, "roster caught up");
    if let Some(roster) = state.payload.as_roster() {
        for (id, entry) in &roster.class_rooms {
            info!(class_room = %id, name = %entry.name, students = ?entry.students, "roster entry");
        }
    }

    let mut students = MultiProjectionActor::<ClassRoomDomain>::new(
        Arc::clone(&domain),
        <StudentStatesProjector as MultiProjector<ClassRoomDomain>>::NAME,
        config,
    )?;
    students.catch_up(&store).await?;
    students.promote()?;
    for tag_state in StudentStatesProjector::tag_states::<ClassRoomDomain>(&students.state(false))? {
        info!(tag = %tag_state.tag(), version = %tag_state.version, payload = ?tag_state.payload, "student tag state");
    }

    let snapshots =
        SnapshotManager::new(Arc::clone(&domain), Arc::new(InMemorySnapshotStore::new()))
            .with_blob_storage(Arc::new(InMemoryBlobStorage::new()));
    let record = snapshots
        .save(&Snapshot::MultiProjection(roster.snapshot_state()))
        .await?;
    info!(
        original = record.original_size_bytes,
        compressed = record.compressed_size_bytes,
        "roster snapshot saved"
    );
    if let Some(restored) = snapshots
        .load_multi_projection(ClassRoomRosterProjector::NAME)
        .await?
    {
        info!(version = restored.version, "roster snapshot restored");
    }

    info!("Class room example completed successfully");
    Ok(())
}
