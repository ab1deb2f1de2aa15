//! Consistency tags.

use dcbcore::TagType;

use super::types::{ClassRoomId, StudentId};

/// `Student:{id}`; guards a student's enrolment count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentTag(pub StudentId);

impl TagType for StudentTag {
    const GROUP: &'static str = "Student";

    fn content(&self) -> String {
        self.0.to_string()
    }
}

/// `ClassRoom:{id}`; guards a class room's seats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRoomTag(pub ClassRoomId);

impl TagType for ClassRoomTag {
    const GROUP: &'static str = "ClassRoom";

    fn content(&self) -> String {
        self.0.to_string()
    }
}
