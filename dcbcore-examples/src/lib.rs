//! Reference domain for `dcbcore`
//!
//! Students enrol in class rooms. A student may attend a bounded number of
//! class rooms and a class room seats a bounded number of students, so one
//! enrolment is gated on two independent consistency tags at once. That is
//! the situation dynamic consistency boundaries are built for.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
// Allow nutype macros to work with current MSRV
#![allow(clippy::incompatible_msrv)]
// These are examples, so we don't need to be as pedantic
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::use_self)]

/// Students, class rooms and enrolments
pub mod classroom;
