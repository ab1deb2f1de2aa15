//! Class room enrolment domain.
//!
//! - [`types`]: validated identifiers
//! - [`tags`]: the `Student` and `ClassRoom` consistency tags
//! - [`events`] and [`states`]: payload unions
//! - [`projectors`]: tag projectors for students and class rooms
//! - [`read_models`]: the roster and directory multi projections, plus the
//!   tag states of every student and class room
//! - [`commands`]: create, enrol and drop

pub mod commands;
pub mod events;
pub mod projectors;
pub mod read_models;
pub mod states;
pub mod tags;
pub mod types;

pub use commands::{
    CreateClassRoom, CreateStudent, DropStudentFromClassRoom, EnrollStudentInClassRoom,
};
pub use events::{
    ClassRoomCreated, ClassRoomEvent, StudentCreated, StudentDroppedFromClassRoom,
    StudentEnrolledInClassRoom,
};
pub use projectors::{ClassRoomProjector, StudentProjector};
pub use read_models::{
    ClassRoomReadModel, ClassRoomRoster, ClassRoomRosterProjector, ClassRoomStates,
    ClassRoomStatesProjector, ClassRoomTagGroup, StudentDirectory, StudentDirectoryProjector,
    StudentStates, StudentStatesProjector, StudentTagGroup,
};
pub use states::{AvailableClassRoomState, ClassRoomTagState, FilledClassRoomState, StudentState};
pub use tags::{ClassRoomTag, StudentTag};
pub use types::{ClassRoomId, StudentId};

use dcbcore::{Domain, DomainTypes, RegistryResult};

/// Marker type binding the payload unions of this domain.
pub struct ClassRoomDomain;

impl Domain for ClassRoomDomain {
    type Event = ClassRoomEvent;
    type TagState = ClassRoomTagState;
    type MultiState = ClassRoomReadModel;
}

/// Registers every type, tag group and projector of the domain.
///
/// # Errors
/// Never fails for this domain; the signature mirrors the builder so a
/// conflicting registration added later surfaces at startup.
pub fn domain_types() -> RegistryResult<DomainTypes<ClassRoomDomain>> {
    DomainTypes::builder()
        .event::<StudentCreated>()
        .event::<ClassRoomCreated>()
        .event::<StudentEnrolledInClassRoom>()
        .event::<StudentDroppedFromClassRoom>()
        .tag::<StudentTag>()
        .tag::<ClassRoomTag>()
        .tag_projector::<StudentProjector>()
        .tag_projector::<ClassRoomProjector>()
        .tag_state::<StudentState>()
        .tag_state::<AvailableClassRoomState>()
        .tag_state::<FilledClassRoomState>()
        .multi_projector::<ClassRoomRosterProjector>()
        .multi_projector::<StudentDirectoryProjector>()
        .multi_projector::<StudentStatesProjector>()
        .multi_projector::<ClassRoomStatesProjector>()
        .multi_state::<ClassRoomRoster>()
        .multi_state::<StudentDirectory>()
        .multi_state::<StudentStates>()
        .multi_state::<ClassRoomStates>()
        .build()
}
