//! Declarative macros for command handlers and payload unions.

/// Checks a business rule inside a command handler.
///
/// If the condition is false the handler returns a `BusinessRuleViolation`
/// error with the provided message.
///
/// # Example
///
/// ```ignore
/// use dcbcore::require;
///
/// async fn handle(&self, ctx: &mut CommandContext<'_, ClassroomDomain>) -> CommandResult<EventOrNone<ClassroomEvent>> {
///     let student = ctx.get_tag_state::<StudentProjector>(&self.student_tag()).await?;
///     require!(student.version() > 0, "student does not exist");
///     // ...
/// }
/// ```
#[macro_export]
macro_rules! require {
    ($condition:expr, $message:expr) => {
        if !$condition {
            return Err($crate::CommandError::BusinessRuleViolation(
                $message.to_string(),
            ));
        }
    };
}

/// Declares a closed payload sum over existing structs.
///
/// Each listed type becomes a tuple variant of the same name, gains a
/// `PayloadVariant` impl whose `TYPE_NAME` is the type's identifier, and
/// converts into the enum with `From`. The listed types must implement
/// `Debug`, `Clone`, `PartialEq`, `Serialize` and `Deserialize`.
///
/// # Example
///
/// ```ignore
/// dcbcore::payload_union! {
///     /// Every event of the class room domain.
///     pub enum ClassroomEvent {
///         StudentCreated,
///         ClassRoomCreated,
///     }
/// }
/// ```
#[macro_export]
macro_rules! payload_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$variant_meta:meta])* $variant:ident ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        $vis enum $name {
            $( $(#[$variant_meta])* $variant($variant) ),+
        }

        impl $crate::PayloadUnion for $name {
            fn type_name(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => <$variant as $crate::PayloadVariant>::TYPE_NAME ),+
                }
            }

            fn encode(&self) -> ::std::result::Result<::std::vec::Vec<u8>, $crate::__private::serde_json::Error> {
                match self {
                    $( Self::$variant(inner) => $crate::__private::serde_json::to_vec(inner) ),+
                }
            }
        }

        $(
            impl ::std::convert::From<$variant> for $name {
                fn from(payload: $variant) -> Self {
                    Self::$variant(payload)
                }
            }

            impl $crate::PayloadVariant for $variant {
                const TYPE_NAME: &'static str = stringify!($variant);
            }
        )+
    };
}
