//! Tag-state payloads.
//!
//! A class room is either [`AvailableClassRoomState`] or, once every seat is
//! taken, [`FilledClassRoomState`]. Commands match on the variant instead of
//! comparing counters.

use serde::{Deserialize, Serialize};

/// Projected state of one student.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentState {
    /// Student id
    pub student_id: String,
    /// Display name
    pub name: String,
    /// Enrolment limit
    pub max_class_count: u32,
    /// Class rooms the student currently attends, in enrolment order
    pub enrolled_class_room_ids: Vec<String>,
}

impl StudentState {
    /// `true` if the student may take another seat.
    pub fn can_enroll(&self) -> bool {
        self.enrolled_class_room_ids.len() < self.max_class_count as usize
    }

    /// `true` if the student attends `class_room_id`.
    pub fn is_enrolled_in(&self, class_room_id: &str) -> bool {
        self.enrolled_class_room_ids
            .iter()
            .any(|id| id == class_room_id)
    }
}

/// A class room with at least one free seat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableClassRoomState {
    /// Class room id
    pub class_room_id: String,
    /// Display name
    pub name: String,
    /// Number of seats
    pub max_students: u32,
    /// Students holding a seat
    pub enrolled_student_ids: Vec<String>,
}

impl AvailableClassRoomState {
    /// Seats still free.
    pub fn available_seats(&self) -> u32 {
        let taken = u32::try_from(self.enrolled_student_ids.len()).unwrap_or(u32::MAX);
        self.max_students.saturating_sub(taken)
    }
}

/// A class room without free seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilledClassRoomState {
    /// Class room id
    pub class_room_id: String,
    /// Display name
    pub name: String,
    /// Number of seats
    pub max_students: u32,
    /// Students holding a seat
    pub enrolled_student_ids: Vec<String>,
}

dcbcore::payload_union! {
    /// Every tag-state payload of the class room domain.
    #[derive(Serialize, Deserialize)]
    pub enum ClassRoomTagState {
        StudentState,
        AvailableClassRoomState,
        FilledClassRoomState,
    }
}

impl ClassRoomTagState {
    /// The student state, if this is one.
    pub fn as_student(&self) -> Option<&StudentState> {
        match self {
            Self::StudentState(state) => Some(state),
            _ => None,
        }
    }

    /// Enrolled students of either class room variant.
    pub fn class_room_students(&self) -> Option<&[String]> {
        match self {
            Self::AvailableClassRoomState(state) => Some(&state.enrolled_student_ids),
            Self::FilledClassRoomState(state) => Some(&state.enrolled_student_ids),
            Self::StudentState(_) => None,
        }
    }
}
