//! End-to-end scenarios over the class room domain and the in-memory store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use dcbcore::{
    CommandContext, CommandError, CommandExecutor, CommandHandler, CommandResult, DomainTypes,
    Event, EventId, EventMetadata, EventOrNone, EventSource, EventStore, ExecutionContext,
    MultiProjectionActor, MultiProjectionConfig, MultiProjector, SafeWindowMs, SortableUniqueId,
    TagProjector, TagStateCache, TagType, TagVersion,
};
use dcbcore_examples::classroom::{
    domain_types, ClassRoomCreated, ClassRoomDomain, ClassRoomEvent, ClassRoomId,
    ClassRoomProjector, ClassRoomRosterProjector, ClassRoomTag, ClassRoomTagState,
    CreateClassRoom, CreateStudent, DropStudentFromClassRoom, EnrollStudentInClassRoom,
    StudentDirectoryProjector, StudentId, StudentProjector, StudentTag,
};
use dcbcore_memory::InMemoryEventStore;
use dcbcore_testing::init_tracing;
use proptest::prelude::*;

type Store = InMemoryEventStore<ClassRoomEvent>;
type Executor = CommandExecutor<ClassRoomDomain, Store>;

fn domain() -> Arc<DomainTypes<ClassRoomDomain>> {
    Arc::new(domain_types().unwrap())
}

fn executor() -> Executor {
    CommandExecutor::new(Store::new(), domain())
}

fn student(id: &str) -> StudentId {
    StudentId::try_new(id).unwrap()
}

fn room(id: &str) -> ClassRoomId {
    ClassRoomId::try_new(id).unwrap()
}

async fn seed(executor: &Executor, students: &[(&str, u32)], rooms: &[(&str, u32)]) {
    for (id, max_class_count) in students {
        executor
            .execute(&CreateStudent::new(student(id), format!("student {id}"), *max_class_count))
            .await
            .unwrap();
    }
    for (id, max_students) in rooms {
        executor
            .execute(&CreateClassRoom::new(room(id), format!("room {id}"), *max_students))
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn creating_a_student_yields_a_version_one_tag_state() {
    init_tracing();
    let executor = executor();

    let result = executor
        .execute(&CreateStudent::new(student("S1"), "Ann", 2))
        .await
        .unwrap();

    assert_eq!(result.events.len(), 1);
    let event = result.event().unwrap();
    assert_eq!(event.event_type(), "StudentCreated");
    assert_eq!(event.tags(), ["Student:S1".to_string()]);
    assert_eq!(result.tag_version("Student:S1"), Some(TagVersion::new(1)));

    let state = executor
        .get_tag_state(&StudentTag(student("S1")).to_tag(), StudentProjector::NAME)
        .await
        .unwrap();
    assert_eq!(state.version, TagVersion::new(1));
    let ann = state.payload.as_state().and_then(ClassRoomTagState::as_student).unwrap();
    assert_eq!(ann.name, "Ann");
    assert!(ann.enrolled_class_room_ids.is_empty());
}

#[tokio::test]
async fn creating_the_same_student_twice_is_rejected() {
    let executor = executor();
    seed(&executor, &[("S1", 2)], &[]).await;

    let error = executor
        .execute(&CreateStudent::new(student("S1"), "Ann again", 2))
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        CommandError::BusinessRuleViolation(ref message) if message == "student S1 already exists"
    ));
    assert_eq!(executor.store().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_enrolments_respect_the_class_count() {
    init_tracing();
    let executor = Arc::new(executor());
    seed(&executor, &[("S1", 1)], &[("C1", 10)]).await;

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let executor = Arc::clone(&executor);
            tokio::spawn(async move {
                executor
                    .execute(&EnrollStudentInClassRoom::new(student("S1"), room("C1")))
                    .await
            })
        })
        .collect();
    let outcomes: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_ok()).count(), 1);
    for outcome in &outcomes {
        match outcome {
            Ok(result) => assert_eq!(result.events[0].event_type(), "StudentEnrolledInClassRoom"),
            Err(CommandError::BusinessRuleViolation(message)) => {
                assert_eq!(message, "maximum class count reached");
            }
            Err(CommandError::ConcurrencyConflict { tags }) => {
                assert!(tags.contains(&"Student:S1".to_string()));
            }
            Err(other) => panic!("unexpected failure: {other:?}"),
        }
    }

    let latest = executor
        .store()
        .get_latest_tag_state(&StudentTag(student("S1")).to_tag())
        .await
        .unwrap();
    assert_eq!(latest.version, TagVersion::new(2));
}

/// Runs an enrolment, and lets a rival command commit between Reserve and
/// Commit.
struct EnrollWhileRivalCommits {
    enrol: EnrollStudentInClassRoom,
    rival: Executor,
    rival_enrol: EnrollStudentInClassRoom,
}

#[async_trait]
impl CommandHandler<ClassRoomDomain> for EnrollWhileRivalCommits {
    async fn handle(
        &self,
        ctx: &mut CommandContext<'_, ClassRoomDomain>,
    ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
        let decided = self.enrol.handle(ctx).await?;
        self.rival.execute(&self.rival_enrol).await?;
        Ok(decided)
    }
}

#[tokio::test]
async fn a_moved_student_tag_surfaces_as_a_conflict() {
    let executor = executor();
    seed(&executor, &[("S1", 2)], &[("C1", 5), ("C2", 5)]).await;

    let racing = EnrollWhileRivalCommits {
        enrol: EnrollStudentInClassRoom::new(student("S1"), room("C1")),
        rival: CommandExecutor::new(executor.store().clone(), domain()),
        rival_enrol: EnrollStudentInClassRoom::new(student("S1"), room("C2")),
    };
    let error = executor.execute(&racing).await.unwrap_err();

    assert!(error.is_retryable());
    match error {
        CommandError::ConcurrencyConflict { tags } => assert_eq!(tags, vec!["Student:S1"]),
        other => panic!("expected a conflict, got {other:?}"),
    }
    // create S1, create C1, create C2, the rival's enrolment
    assert_eq!(executor.store().len(), 4);
}

#[tokio::test]
async fn enrolling_into_a_full_class_room_writes_nothing() {
    let executor = executor();
    seed(&executor, &[("S1", 2), ("S2", 2)], &[("C1", 1)]).await;
    executor
        .execute(&EnrollStudentInClassRoom::new(student("S2"), room("C1")))
        .await
        .unwrap();
    let class_room_tag = ClassRoomTag(room("C1")).to_tag();
    let before = executor
        .get_tag_state(&class_room_tag, ClassRoomProjector::NAME)
        .await
        .unwrap();
    let logged = executor.store().len();

    let error = executor
        .execute(&EnrollStudentInClassRoom::new(student("S1"), room("C1")))
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CommandError::BusinessRuleViolation(ref message) if message == "class room is full (1/1)"
    ));
    assert_eq!(executor.store().len(), logged);
    let after = executor
        .get_tag_state(&class_room_tag, ClassRoomProjector::NAME)
        .await
        .unwrap();
    assert_eq!(after, before);
    assert!(matches!(
        after.payload.as_state(),
        Some(ClassRoomTagState::FilledClassRoomState(_))
    ));
}

#[tokio::test]
async fn an_enrolment_advances_both_tags_atomically() {
    let executor = executor();
    seed(&executor, &[("S1", 2)], &[("C1", 3)]).await;

    let result = executor
        .execute(&EnrollStudentInClassRoom::new(student("S1"), room("C1")))
        .await
        .unwrap();

    assert_eq!(result.tag_version("Student:S1"), Some(TagVersion::new(2)));
    assert_eq!(result.tag_version("ClassRoom:C1"), Some(TagVersion::new(2)));
    let event = result.event().unwrap();
    assert!(event.has_tag("Student:S1"));
    assert!(event.has_tag("ClassRoom:C1"));
}

#[tokio::test]
async fn enrolling_an_unknown_student_is_rejected() {
    let executor = executor();
    seed(&executor, &[], &[("C1", 3)]).await;

    let error = executor
        .execute(&EnrollStudentInClassRoom::new(student("S9"), room("C1")))
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "Business rule violation: student S9 does not exist");
}

#[tokio::test]
async fn dropping_frees_the_seat_and_is_a_no_op_when_repeated() {
    let executor = executor();
    seed(&executor, &[("S1", 2)], &[("C1", 1)]).await;
    executor
        .execute(&EnrollStudentInClassRoom::new(student("S1"), room("C1")))
        .await
        .unwrap();

    let drop = DropStudentFromClassRoom::new(student("S1"), room("C1"));
    let dropped = executor
        .execute_with_retry(&drop, &ExecutionContext::new())
        .await
        .unwrap();
    assert_eq!(dropped.events[0].event_type(), "StudentDroppedFromClassRoom");

    let again = executor
        .execute_with_retry(&drop, &ExecutionContext::new())
        .await
        .unwrap();
    assert!(again.is_no_op());

    let class_room = executor
        .get_tag_state(&ClassRoomTag(room("C1")).to_tag(), ClassRoomProjector::NAME)
        .await
        .unwrap();
    assert!(matches!(
        class_room.payload.as_state(),
        Some(ClassRoomTagState::AvailableClassRoomState(state)) if state.available_seats() == 1
    ));
}

#[tokio::test]
async fn the_tag_cache_follows_new_writes() {
    let cache = Arc::new(TagStateCache::new());
    let executor = CommandExecutor::new(Store::new(), domain()).with_tag_cache(Arc::clone(&cache));
    seed(&executor, &[("S1", 3)], &[("C1", 3), ("C2", 3)]).await;

    let tag = StudentTag(student("S1")).to_tag();
    executor.get_tag_state(&tag, StudentProjector::NAME).await.unwrap();
    assert!(cache.get("Student:S1", StudentProjector::NAME).is_some());

    for class_room in ["C1", "C2"] {
        executor
            .execute(&EnrollStudentInClassRoom::new(student("S1"), room(class_room)))
            .await
            .unwrap();
    }

    let state = executor.get_tag_state(&tag, StudentProjector::NAME).await.unwrap();
    assert_eq!(state.version, TagVersion::new(3));
    assert_eq!(
        state.payload.as_state().and_then(ClassRoomTagState::as_student).unwrap().enrolled_class_room_ids,
        vec!["C1", "C2"]
    );
    assert_eq!(cache.get("Student:S1", StudentProjector::NAME), Some(state));
}

#[tokio::test]
async fn read_models_catch_up_from_the_store() {
    let executor = executor();
    seed(&executor, &[("S1", 2), ("S2", 2)], &[("C1", 3)]).await;
    for id in ["S1", "S2"] {
        executor
            .execute(&EnrollStudentInClassRoom::new(student(id), room("C1")))
            .await
            .unwrap();
    }

    let config = MultiProjectionConfig::default().with_safe_window(SafeWindowMs::try_new(0).unwrap());
    let mut roster =
        MultiProjectionActor::new(domain(), ClassRoomRosterProjector::NAME, config).unwrap();
    let mut directory =
        MultiProjectionActor::new(domain(), StudentDirectoryProjector::NAME, config).unwrap();
    assert_eq!(roster.catch_up(executor.store()).await.unwrap(), 5);
    directory.catch_up(executor.store()).await.unwrap();
    roster.promote().unwrap();
    directory.promote().unwrap();

    let roster = roster.state(false);
    let students = &roster.payload.as_roster().unwrap().class_rooms["C1"].students;
    assert_eq!(students.iter().collect::<Vec<_>>(), ["S1", "S2"]);

    let directory = directory.state(false);
    let entry = &directory.payload.as_directory().unwrap().students["S2"];
    assert_eq!(entry.name, "student S2");
    assert!(entry.class_room_ids.contains("C1"));
}

fn created_at(class_room_id: &str, at: chrono::DateTime<Utc>) -> Event<ClassRoomEvent> {
    Event::new(
        EventId::new(),
        SortableUniqueId::generate(at),
        ClassRoomCreated {
            class_room_id: room(class_room_id),
            name: "Algebra".to_string(),
            max_students: 3,
        }
        .into(),
        vec![format!("ClassRoom:{class_room_id}")],
        EventMetadata::new(),
    )
}

#[test]
fn recent_events_stay_out_of_the_safe_view_until_the_window_passes() {
    let now = Utc::now();
    let config = MultiProjectionConfig::default()
        .with_safe_window(SafeWindowMs::try_new(5 * 60 * 1000).unwrap());
    let mut roster =
        MultiProjectionActor::new(domain(), ClassRoomRosterProjector::NAME, config).unwrap();

    roster
        .add_events_at(
            vec![created_at("C1", now - Duration::minutes(2))],
            EventSource::Stream,
            now,
        )
        .unwrap();

    let safe = roster.state(false);
    assert!(safe.payload.as_roster().unwrap().class_rooms.is_empty());
    assert_eq!(safe.version, 0);
    let unsafe_view = roster.state(true);
    assert!(unsafe_view.payload.as_roster().unwrap().class_rooms.contains_key("C1"));

    roster
        .add_events_at(Vec::new(), EventSource::Stream, now + Duration::minutes(4))
        .unwrap();
    let safe = roster.state(false);
    assert_eq!(safe.version, 1);
    assert!(safe.payload.as_roster().unwrap().class_rooms.contains_key("C1"));
}

proptest! {
    #[test]
    fn the_safe_threshold_never_moves_backwards(offsets in prop::collection::vec(-600i64..600, 1..20)) {
        let now = Utc::now();
        let config = MultiProjectionConfig::default()
            .with_safe_window(SafeWindowMs::try_new(60_000).unwrap());
        let mut roster =
            MultiProjectionActor::new(domain(), ClassRoomRosterProjector::NAME, config).unwrap();

        let mut previous = SortableUniqueId::zero();
        for offset in offsets {
            roster
                .add_events_at(Vec::new(), EventSource::Unknown, now + Duration::seconds(offset))
                .unwrap();
            let threshold = roster.state(false).safe_window_threshold;
            prop_assert!(threshold >= previous);
            previous = threshold;
        }
    }
}
