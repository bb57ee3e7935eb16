//! Patient appointment domain (event-sourced).
//!
//! Pure deterministic logic: scheduling, attendance and cancellation of
//! appointments. An attended or cancelled appointment accepts no further
//! commands.

pub mod appointment;

pub use appointment::{
    APPOINTMENT_TAG, Appointment, AppointmentAttended, AppointmentCancelled, AppointmentCommand, AppointmentEvent,
    AppointmentMissed, AppointmentScheduled, AppointmentTarget, CancelAppointment, Closed, MarkAttended, MarkMissed,
    Open, PATIENT_TAG, ScheduleAppointment,
};
