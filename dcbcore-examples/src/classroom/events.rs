//! Events of the class room domain.

use serde::{Deserialize, Serialize};

use super::types::{ClassRoomId, StudentId};

/// A student was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentCreated {
    /// The new student
    pub student_id: StudentId,
    /// Display name
    pub name: String,
    /// How many class rooms the student may attend at once
    pub max_class_count: u32,
}

/// A class room was opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoomCreated {
    /// The new class room
    pub class_room_id: ClassRoomId,
    /// Display name
    pub name: String,
    /// Number of seats
    pub max_students: u32,
}

/// A student took a seat. Tagged with both the student and the class room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentEnrolledInClassRoom {
    /// The enrolling student
    pub student_id: StudentId,
    /// The class room
    pub class_room_id: ClassRoomId,
}

/// A student gave a seat back. Tagged with both the student and the class room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDroppedFromClassRoom {
    /// The leaving student
    pub student_id: StudentId,
    /// The class room
    pub class_room_id: ClassRoomId,
}

dcbcore::payload_union! {
    /// Every event of the class room domain.
    pub enum ClassRoomEvent {
        StudentCreated,
        ClassRoomCreated,
        StudentEnrolledInClassRoom,
        StudentDroppedFromClassRoom,
    }
}
