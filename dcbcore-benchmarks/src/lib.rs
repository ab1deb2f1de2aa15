//! dcbcore Benchmarks
//!
//! Criterion benchmarks for the dcbcore kernel: sortable id generation, event
//! store writes and tag reads, the command cycle, and tag and multi
//! projection folding. Run them with `cargo bench -p dcbcore-benchmarks`.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]

use std::sync::Arc;

use dcbcore::types::SortableUniqueIdGenerator;
use dcbcore::{DomainTypes, Event, EventId, EventMetadata};
use dcbcore_examples::classroom::{
    domain_types, ClassRoomCreated, ClassRoomDomain, ClassRoomEvent, ClassRoomId, StudentCreated,
    StudentEnrolledInClassRoom, StudentId,
};

/// The registered class room domain.
///
/// # Panics
/// If the domain registrations conflict.
pub fn domain() -> Arc<DomainTypes<ClassRoomDomain>> {
    Arc::new(domain_types().expect("class room domain registers cleanly"))
}

/// Identifier `prefix-n`.
///
/// # Panics
/// If `prefix` is blank.
pub fn student_id(prefix: &str, n: usize) -> StudentId {
    StudentId::try_new(format!("{prefix}-{n}")).expect("non-empty id")
}

/// Identifier `prefix-n`.
///
/// # Panics
/// If `prefix` is blank.
pub fn class_room_id(prefix: &str, n: usize) -> ClassRoomId {
    ClassRoomId::try_new(format!("{prefix}-{n}")).expect("non-empty id")
}

/// A class room with `students` students created and enrolled, in log order.
pub fn enrolment_log(class_room: &ClassRoomId, students: usize) -> Vec<Event<ClassRoomEvent>> {
    let ids = SortableUniqueIdGenerator::new();
    let class_room_tag = format!("ClassRoom:{class_room}");
    let event = |payload: ClassRoomEvent, tags: Vec<String>| {
        Event::new(EventId::new(), ids.next_id(), payload, tags, EventMetadata::new())
    };

    let mut log = Vec::with_capacity(students * 2 + 1);
    log.push(event(
        ClassRoomCreated {
            class_room_id: class_room.clone(),
            name: "Bench".to_string(),
            max_students: u32::try_from(students).unwrap_or(u32::MAX),
        }
        .into(),
        vec![class_room_tag.clone()],
    ));
    for n in 0..students {
        let student = student_id("bench", n);
        let student_tag = format!("Student:{student}");
        log.push(event(
            StudentCreated {
                student_id: student.clone(),
                name: format!("Student {n}"),
                max_class_count: 5,
            }
            .into(),
            vec![student_tag.clone()],
        ));
        log.push(event(
            StudentEnrolledInClassRoom {
                student_id: student,
                class_room_id: class_room.clone(),
            }
            .into(),
            vec![student_tag, class_room_tag.clone()],
        ));
    }
    log
}
