//! Multi projections: read models across many tags.

use std::collections::{BTreeMap, BTreeSet};

use dcbcore::{
    DomainTypes, Event, GenericTagMultiProjector, MultiProjector, PayloadUnion, ProjectionError,
    ProjectionResult, SortableUniqueId, Tag, TagGroupProjection, TagGroupStates,
};
use serde::{Deserialize, Serialize};

use super::events::ClassRoomEvent;
use super::projectors::{ClassRoomProjector, StudentProjector};
use super::states::ClassRoomTagState;
use super::tags::{ClassRoomTag, StudentTag};
use super::ClassRoomDomain;

/// One class room in the roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Display name
    pub name: String,
    /// Number of seats
    pub max_students: u32,
    /// Students holding a seat
    pub students: BTreeSet<String>,
}

/// Every class room with its students.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoomRoster {
    /// Class room id -> entry
    pub class_rooms: BTreeMap<String, RosterEntry>,
}

/// One student in the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Display name
    pub name: String,
    /// Class rooms the student attends
    pub class_room_ids: BTreeSet<String>,
}

/// Every student with the class rooms they attend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentDirectory {
    /// Student id -> entry
    pub students: BTreeMap<String, DirectoryEntry>,
}

/// Current state of every student tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentStates(pub TagGroupStates<ClassRoomTagState>);

/// Current state of every class room tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassRoomStates(pub TagGroupStates<ClassRoomTagState>);

dcbcore::payload_union! {
    /// Every multi-projection payload of the class room domain.
    pub enum ClassRoomReadModel {
        ClassRoomRoster,
        StudentDirectory,
        StudentStates,
        ClassRoomStates,
    }
}

fn mismatch(projector: &str, payload: &ClassRoomReadModel) -> ProjectionError {
    ProjectionError::PayloadMismatch {
        projector: projector.to_string(),
        payload_type: payload.type_name().to_string(),
    }
}

/// Builds [`ClassRoomRoster`] from every event tagged with a class room.
pub struct ClassRoomRosterProjector;

impl MultiProjector<ClassRoomDomain> for ClassRoomRosterProjector {
    const NAME: &'static str = "ClassRoomRoster";
    const VERSION: &'static str = "1";

    fn initial_payload() -> ClassRoomReadModel {
        ClassRoomRoster::default().into()
    }

    fn project(
        payload: ClassRoomReadModel,
        event: &Event<ClassRoomEvent>,
        _tags: &[Tag],
        _domain: &DomainTypes<ClassRoomDomain>,
        _safe_window_threshold: &SortableUniqueId,
    ) -> ProjectionResult<ClassRoomReadModel> {
        let mut roster = match payload {
            ClassRoomReadModel::ClassRoomRoster(roster) => roster,
            other => return Err(mismatch(Self::NAME, &other)),
        };
        match event.payload() {
            ClassRoomEvent::ClassRoomCreated(created) => {
                let entry = roster
                    .class_rooms
                    .entry(created.class_room_id.to_string())
                    .or_default();
                entry.name.clone_from(&created.name);
                entry.max_students = created.max_students;
            }
            ClassRoomEvent::StudentEnrolledInClassRoom(enrolled) => {
                roster
                    .class_rooms
                    .entry(enrolled.class_room_id.to_string())
                    .or_default()
                    .students
                    .insert(enrolled.student_id.to_string());
            }
            ClassRoomEvent::StudentDroppedFromClassRoom(dropped) => {
                let class_room_id = dropped.class_room_id.to_string();
                if let Some(entry) = roster.class_rooms.get_mut(&class_room_id) {
                    entry.students.remove(&dropped.student_id.to_string());
                }
            }
            ClassRoomEvent::StudentCreated(_) => {}
        }
        Ok(roster.into())
    }

    fn tag_groups() -> &'static [&'static str] {
        &["ClassRoom"]
    }
}

/// Builds [`StudentDirectory`] from every event tagged with a student.
pub struct StudentDirectoryProjector;

impl MultiProjector<ClassRoomDomain> for StudentDirectoryProjector {
    const NAME: &'static str = "StudentDirectory";
    const VERSION: &'static str = "1";

    fn initial_payload() -> ClassRoomReadModel {
        StudentDirectory::default().into()
    }

    fn project(
        payload: ClassRoomReadModel,
        event: &Event<ClassRoomEvent>,
        _tags: &[Tag],
        _domain: &DomainTypes<ClassRoomDomain>,
        _safe_window_threshold: &SortableUniqueId,
    ) -> ProjectionResult<ClassRoomReadModel> {
        let mut directory = match payload {
            ClassRoomReadModel::StudentDirectory(directory) => directory,
            other => return Err(mismatch(Self::NAME, &other)),
        };
        match event.payload() {
            ClassRoomEvent::StudentCreated(created) => {
                directory
                    .students
                    .entry(created.student_id.to_string())
                    .or_default()
                    .name
                    .clone_from(&created.name);
            }
            ClassRoomEvent::StudentEnrolledInClassRoom(enrolled) => {
                directory
                    .students
                    .entry(enrolled.student_id.to_string())
                    .or_default()
                    .class_room_ids
                    .insert(enrolled.class_room_id.to_string());
            }
            ClassRoomEvent::StudentDroppedFromClassRoom(dropped) => {
                if let Some(entry) = directory.students.get_mut(&dropped.student_id.to_string()) {
                    entry.class_room_ids.remove(&dropped.class_room_id.to_string());
                }
            }
            ClassRoomEvent::ClassRoomCreated(_) => {}
        }
        Ok(directory.into())
    }

    fn tag_groups() -> &'static [&'static str] {
        &["Student"]
    }
}

/// Every student tag, projected by [`StudentProjector`].
pub struct StudentTagGroup;

impl TagGroupProjection<ClassRoomDomain> for StudentTagGroup {
    const NAME: &'static str = "GenericTagMultiProjector_StudentProjector_Student";
    type Projector = StudentProjector;
    type Tag = StudentTag;

    fn wrap(states: TagGroupStates<ClassRoomTagState>) -> ClassRoomReadModel {
        StudentStates(states).into()
    }

    fn unwrap(
        payload: ClassRoomReadModel,
    ) -> Result<TagGroupStates<ClassRoomTagState>, ClassRoomReadModel> {
        match payload {
            ClassRoomReadModel::StudentStates(StudentStates(states)) => Ok(states),
            other => Err(other),
        }
    }

    fn states(payload: &ClassRoomReadModel) -> Option<&TagGroupStates<ClassRoomTagState>> {
        match payload {
            ClassRoomReadModel::StudentStates(StudentStates(states)) => Some(states),
            _ => None,
        }
    }
}

/// Every class room tag, projected by [`ClassRoomProjector`].
pub struct ClassRoomTagGroup;

impl TagGroupProjection<ClassRoomDomain> for ClassRoomTagGroup {
    const NAME: &'static str = "GenericTagMultiProjector_ClassRoomProjector_ClassRoom";
    type Projector = ClassRoomProjector;
    type Tag = ClassRoomTag;

    fn wrap(states: TagGroupStates<ClassRoomTagState>) -> ClassRoomReadModel {
        ClassRoomStates(states).into()
    }

    fn unwrap(
        payload: ClassRoomReadModel,
    ) -> Result<TagGroupStates<ClassRoomTagState>, ClassRoomReadModel> {
        match payload {
            ClassRoomReadModel::ClassRoomStates(ClassRoomStates(states)) => Ok(states),
            other => Err(other),
        }
    }

    fn states(payload: &ClassRoomReadModel) -> Option<&TagGroupStates<ClassRoomTagState>> {
        match payload {
            ClassRoomReadModel::ClassRoomStates(ClassRoomStates(states)) => Some(states),
            _ => None,
        }
    }
}

/// Tag states of every student.
pub type StudentStatesProjector = GenericTagMultiProjector<StudentTagGroup>;

/// Tag states of every class room.
pub type ClassRoomStatesProjector = GenericTagMultiProjector<ClassRoomTagGroup>;

impl ClassRoomReadModel {
    /// The roster, if this is one.
    pub fn as_roster(&self) -> Option<&ClassRoomRoster> {
        match self {
            Self::ClassRoomRoster(roster) => Some(roster),
            _ => None,
        }
    }

    /// The directory, if this is one.
    pub fn as_directory(&self) -> Option<&StudentDirectory> {
        match self {
            Self::StudentDirectory(directory) => Some(directory),
            _ => None,
        }
    }
}
