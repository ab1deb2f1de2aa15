//! Commands of the class room domain.
//!
//! Enrolment is the interesting one: the event is gated on both the
//! `Student:{id}` and the `ClassRoom:{id}` tag, so two enrolments racing for
//! the last seat (or for the student's last free slot) cannot both commit.

use async_trait::async_trait;
use dcbcore::{
    require, CommandContext, CommandError, CommandHandler, CommandResult, EventOrNone, TagType,
};

use super::events::{
    ClassRoomCreated, ClassRoomEvent, StudentCreated, StudentDroppedFromClassRoom,
    StudentEnrolledInClassRoom,
};
use super::projectors::{ClassRoomProjector, StudentProjector};
use super::states::{ClassRoomTagState, StudentState};
use super::tags::{ClassRoomTag, StudentTag};
use super::types::{ClassRoomId, StudentId};
use super::ClassRoomDomain;

fn validate_registration(name: &str, limit: u32, limit_field: &str) -> CommandResult<()> {
    if name.trim().is_empty() {
        return Err(CommandError::ValidationFailed("name must not be empty".to_string()));
    }
    if limit == 0 {
        return Err(CommandError::ValidationFailed(format!(
            "{limit_field} must be at least 1"
        )));
    }
    Ok(())
}

async fn load_student(
    ctx: &mut CommandContext<'_, ClassRoomDomain>,
    tag: &StudentTag,
) -> CommandResult<StudentState> {
    let state = ctx.get_tag_state::<StudentProjector>(&tag.to_tag()).await?;
    state
        .payload
        .as_state()
        .and_then(ClassRoomTagState::as_student)
        .cloned()
        .ok_or_else(|| {
            CommandError::BusinessRuleViolation(format!("student {} does not exist", tag.0))
        })
}

/// Registers a new student.
#[derive(Debug, Clone)]
pub struct CreateStudent {
    student_id: StudentId,
    name: String,
    max_class_count: u32,
}

impl CreateStudent {
    /// A student that may attend up to `max_class_count` class rooms.
    pub fn new(student_id: StudentId, name: impl Into<String>, max_class_count: u32) -> Self {
        Self {
            student_id,
            name: name.into(),
            max_class_count,
        }
    }
}

#[async_trait]
impl CommandHandler<ClassRoomDomain> for CreateStudent {
    fn command_name(&self) -> &'static str {
        "CreateStudent"
    }

    fn validate(&self) -> CommandResult<()> {
        validate_registration(&self.name, self.max_class_count, "max_class_count")
    }

    async fn handle(
        &self,
        ctx: &mut CommandContext<'_, ClassRoomDomain>,
    ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
        let tag = StudentTag(self.student_id.clone()).to_tag();
        require!(
            !ctx.tag_exists(&tag).await?,
            format!("student {} already exists", self.student_id)
        );
        Ok(EventOrNone::event(
            StudentCreated {
                student_id: self.student_id.clone(),
                name: self.name.trim().to_string(),
                max_class_count: self.max_class_count,
            },
            [tag],
        ))
    }
}

/// Opens a new class room.
#[derive(Debug, Clone)]
pub struct CreateClassRoom {
    class_room_id: ClassRoomId,
    name: String,
    max_students: u32,
}

impl CreateClassRoom {
    /// A class room with `max_students` seats.
    pub fn new(class_room_id: ClassRoomId, name: impl Into<String>, max_students: u32) -> Self {
        Self {
            class_room_id,
            name: name.into(),
            max_students,
        }
    }
}

#[async_trait]
impl CommandHandler<ClassRoomDomain> for CreateClassRoom {
    fn command_name(&self) -> &'static str {
        "CreateClassRoom"
    }

    fn validate(&self) -> CommandResult<()> {
        validate_registration(&self.name, self.max_students, "max_students")
    }

    async fn handle(
        &self,
        ctx: &mut CommandContext<'_, ClassRoomDomain>,
    ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
        let tag = ClassRoomTag(self.class_room_id.clone()).to_tag();
        require!(
            !ctx.tag_exists(&tag).await?,
            format!("class room {} already exists", self.class_room_id)
        );
        Ok(EventOrNone::event(
            ClassRoomCreated {
                class_room_id: self.class_room_id.clone(),
                name: self.name.trim().to_string(),
                max_students: self.max_students,
            },
            [tag],
        ))
    }
}

/// Gives a student a seat in a class room.
///
/// Not idempotent: after a conflict the caller re-runs it so the rules are
/// checked against the winner's event.
#[derive(Debug, Clone)]
pub struct EnrollStudentInClassRoom {
    student_id: StudentId,
    class_room_id: ClassRoomId,
}

impl EnrollStudentInClassRoom {
    /// Enrols `student_id` in `class_room_id`.
    pub const fn new(student_id: StudentId, class_room_id: ClassRoomId) -> Self {
        Self {
            student_id,
            class_room_id,
        }
    }
}

#[async_trait]
impl CommandHandler<ClassRoomDomain> for EnrollStudentInClassRoom {
    fn command_name(&self) -> &'static str {
        "EnrollStudentInClassRoom"
    }

    async fn handle(
        &self,
        ctx: &mut CommandContext<'_, ClassRoomDomain>,
    ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
        let student_tag = StudentTag(self.student_id.clone());
        let class_room_tag = ClassRoomTag(self.class_room_id.clone());

        let student = load_student(ctx, &student_tag).await?;
        require!(student.can_enroll(), "maximum class count reached");
        require!(
            !student.is_enrolled_in(&self.class_room_id.to_string()),
            format!(
                "student {} is already enrolled in class room {}",
                self.student_id, self.class_room_id
            )
        );

        let class_room = ctx
            .get_tag_state::<ClassRoomProjector>(&class_room_tag.to_tag())
            .await?;
        match class_room.payload.as_state() {
            Some(ClassRoomTagState::AvailableClassRoomState(_)) => {}
            Some(ClassRoomTagState::FilledClassRoomState(filled)) => {
                return Err(CommandError::BusinessRuleViolation(format!(
                    "class room is full ({}/{})",
                    filled.enrolled_student_ids.len(),
                    filled.max_students
                )));
            }
            _ => {
                return Err(CommandError::BusinessRuleViolation(format!(
                    "class room {} does not exist",
                    self.class_room_id
                )));
            }
        }

        Ok(EventOrNone::event(
            StudentEnrolledInClassRoom {
                student_id: self.student_id.clone(),
                class_room_id: self.class_room_id.clone(),
            },
            [student_tag.to_tag(), class_room_tag.to_tag()],
        ))
    }
}

/// Frees a student's seat. Dropping a student who is not enrolled writes
/// nothing.
#[derive(Debug, Clone)]
pub struct DropStudentFromClassRoom {
    student_id: StudentId,
    class_room_id: ClassRoomId,
}

impl DropStudentFromClassRoom {
    /// Drops `student_id` from `class_room_id`.
    pub const fn new(student_id: StudentId, class_room_id: ClassRoomId) -> Self {
        Self {
            student_id,
            class_room_id,
        }
    }
}

#[async_trait]
impl CommandHandler<ClassRoomDomain> for DropStudentFromClassRoom {
    fn command_name(&self) -> &'static str {
        "DropStudentFromClassRoom"
    }

    fn is_idempotent(&self) -> bool {
        true
    }

    async fn handle(
        &self,
        ctx: &mut CommandContext<'_, ClassRoomDomain>,
    ) -> CommandResult<EventOrNone<ClassRoomEvent>> {
        let student_tag = StudentTag(self.student_id.clone());
        let class_room_tag = ClassRoomTag(self.class_room_id.clone());

        let student = load_student(ctx, &student_tag).await?;
        if !student.is_enrolled_in(&self.class_room_id.to_string()) {
            return Ok(EventOrNone::none());
        }
        // Reserve the class room too; the seat count changes with this event.
        ctx.get_tag_state_by_convention(&class_room_tag.to_tag())
            .await?;

        Ok(EventOrNone::event(
            StudentDroppedFromClassRoom {
                student_id: self.student_id.clone(),
                class_room_id: self.class_room_id.clone(),
            },
            [student_tag.to_tag(), class_room_tag.to_tag()],
        ))
    }
}
