//! Tag projectors.

use dcbcore::{Event, TagProjector, TagStatePayload};

use super::events::ClassRoomEvent;
use super::states::{AvailableClassRoomState, ClassRoomTagState, FilledClassRoomState, StudentState};
use super::ClassRoomDomain;

/// Folds the events of a `Student:{id}` tag.
pub struct StudentProjector;

impl TagProjector<ClassRoomDomain> for StudentProjector {
    const NAME: &'static str = "StudentProjector";
    const VERSION: &'static str = "1";

    fn project(
        current: TagStatePayload<ClassRoomTagState>,
        event: &Event<ClassRoomEvent>,
    ) -> TagStatePayload<ClassRoomTagState> {
        let student = current.as_state().and_then(ClassRoomTagState::as_student).cloned();
        let next = match (student, event.payload()) {
            (_, ClassRoomEvent::StudentCreated(created)) => StudentState {
                student_id: created.student_id.to_string(),
                name: created.name.clone(),
                max_class_count: created.max_class_count,
                enrolled_class_room_ids: Vec::new(),
            },
            (Some(mut state), ClassRoomEvent::StudentEnrolledInClassRoom(enrolled)) => {
                let class_room_id = enrolled.class_room_id.to_string();
                if !state.is_enrolled_in(&class_room_id) {
                    state.enrolled_class_room_ids.push(class_room_id);
                }
                state
            }
            (Some(mut state), ClassRoomEvent::StudentDroppedFromClassRoom(dropped)) => {
                let class_room_id = dropped.class_room_id.to_string();
                state
                    .enrolled_class_room_ids
                    .retain(|id| *id != class_room_id);
                state
            }
            _ => return current,
        };
        TagStatePayload::State(next.into())
    }
}

/// Folds the events of a `ClassRoom:{id}` tag.
///
/// The state switches to [`FilledClassRoomState`] when the last seat is taken
/// and back to [`AvailableClassRoomState`] when a seat frees up.
pub struct ClassRoomProjector;

impl TagProjector<ClassRoomDomain> for ClassRoomProjector {
    const NAME: &'static str = "ClassRoomProjector";
    const VERSION: &'static str = "1";

    fn project(
        current: TagStatePayload<ClassRoomTagState>,
        event: &Event<ClassRoomEvent>,
    ) -> TagStatePayload<ClassRoomTagState> {
        if let ClassRoomEvent::ClassRoomCreated(created) = event.payload() {
            return TagStatePayload::State(
                AvailableClassRoomState {
                    class_room_id: created.class_room_id.to_string(),
                    name: created.name.clone(),
                    max_students: created.max_students,
                    enrolled_student_ids: Vec::new(),
                }
                .into(),
            );
        }

        let (class_room_id, name, max_students, mut students) = match current.as_state() {
            Some(ClassRoomTagState::AvailableClassRoomState(state)) => (
                state.class_room_id.clone(),
                state.name.clone(),
                state.max_students,
                state.enrolled_student_ids.clone(),
            ),
            Some(ClassRoomTagState::FilledClassRoomState(state)) => (
                state.class_room_id.clone(),
                state.name.clone(),
                state.max_students,
                state.enrolled_student_ids.clone(),
            ),
            _ => return current,
        };
        match event.payload() {
            ClassRoomEvent::StudentEnrolledInClassRoom(enrolled) => {
                let student_id = enrolled.student_id.to_string();
                if !students.contains(&student_id) {
                    students.push(student_id);
                }
            }
            ClassRoomEvent::StudentDroppedFromClassRoom(dropped) => {
                let student_id = dropped.student_id.to_string();
                students.retain(|id| *id != student_id);
            }
            _ => return current,
        }

        let next = if students.len() >= max_students as usize {
            FilledClassRoomState {
                class_room_id,
                name,
                max_students,
                enrolled_student_ids: students,
            }
            .into()
        } else {
            AvailableClassRoomState {
                class_room_id,
                name,
                max_students,
                enrolled_student_ids: students,
            }
            .into()
        };
        TagStatePayload::State(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classroom::events::{
        ClassRoomCreated, StudentCreated, StudentDroppedFromClassRoom, StudentEnrolledInClassRoom,
    };
    use crate::classroom::types::{ClassRoomId, StudentId};
    use dcbcore::types::SortableUniqueIdGenerator;
    use dcbcore::{EventId, EventMetadata};

    fn events(payloads: Vec<ClassRoomEvent>) -> Vec<Event<ClassRoomEvent>> {
        let ids = SortableUniqueIdGenerator::new();
        payloads
            .into_iter()
            .map(|payload| {
                Event::new(
                    EventId::new(),
                    ids.next_id(),
                    payload,
                    Vec::<String>::new(),
                    EventMetadata::new(),
                )
            })
            .collect()
    }

    fn fold<P: TagProjector<ClassRoomDomain>>(events: &[Event<ClassRoomEvent>]) -> TagStatePayload<ClassRoomTagState> {
        events
            .iter()
            .fold(TagStatePayload::Empty, |state, event| P::project(state, event))
    }

    fn student(id: &str) -> StudentId {
        StudentId::try_new(id).unwrap()
    }

    fn room(id: &str) -> ClassRoomId {
        ClassRoomId::try_new(id).unwrap()
    }

    fn enrolled(student_id: &str, class_room_id: &str) -> ClassRoomEvent {
        StudentEnrolledInClassRoom {
            student_id: student(student_id),
            class_room_id: room(class_room_id),
        }
        .into()
    }

    #[test]
    fn student_tracks_enrolments() {
        let log = events(vec![
            StudentCreated {
                student_id: student("S1"),
                name: "Ann".to_string(),
                max_class_count: 2,
            }
            .into(),
            enrolled("S1", "C1"),
            enrolled("S1", "C2"),
            StudentDroppedFromClassRoom {
                student_id: student("S1"),
                class_room_id: room("C1"),
            }
            .into(),
        ]);
        let state = fold::<StudentProjector>(&log);
        let student = state.as_state().and_then(ClassRoomTagState::as_student).unwrap();
        assert_eq!(student.enrolled_class_room_ids, vec!["C2"]);
        assert!(student.can_enroll());
    }

    #[test]
    fn events_before_creation_leave_the_student_empty() {
        let state = fold::<StudentProjector>(&events(vec![enrolled("S1", "C1")]));
        assert!(state.is_empty());
    }

    #[test]
    fn class_room_fills_and_frees_up() {
        let mut log = vec![
            ClassRoomCreated {
                class_room_id: room("C1"),
                name: "Algebra".to_string(),
                max_students: 2,
            }
            .into(),
            enrolled("S1", "C1"),
            enrolled("S2", "C1"),
        ];
        let filled = fold::<ClassRoomProjector>(&events(log.clone()));
        assert!(matches!(
            filled.as_state(),
            Some(ClassRoomTagState::FilledClassRoomState(state)) if state.enrolled_student_ids == ["S1", "S2"]
        ));

        log.push(
            StudentDroppedFromClassRoom {
                student_id: student("S1"),
                class_room_id: room("C1"),
            }
            .into(),
        );
        let available = fold::<ClassRoomProjector>(&events(log));
        match available.as_state() {
            Some(ClassRoomTagState::AvailableClassRoomState(state)) => {
                assert_eq!(state.available_seats(), 1);
            }
            other => panic!("expected an available class room, got {other:?}"),
        }
    }
}
