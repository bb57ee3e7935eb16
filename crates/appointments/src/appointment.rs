use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tagstream_core::{DomainError, DomainResult, EventSourcedState, Lifecycle, Tag, TagSet};
use tagstream_events::{Command, Event, TargetIdentifier};

pub const APPOINTMENT_TAG: &str = "Appointment";
pub const PATIENT_TAG: &str = "Patient";

/// Non-terminal sub-states.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Open {
    Scheduled,
    Missed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Closed {
    Attended,
    Cancelled { reason: String },
}

/// Appointment state rebuilt from events tagged with the appointment id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Appointment {
    lifecycle: Lifecycle<Open, Closed>,
    patient_id: Option<String>,
}

impl Appointment {
    pub fn lifecycle(&self) -> &Lifecycle<Open, Closed> {
        &self.lifecycle
    }

    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref()
    }
}

// --- commands ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleAppointment {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub purpose: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkAttended {
    pub appointment_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkMissed {
    pub appointment_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub appointment_id: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentCommand {
    Schedule(ScheduleAppointment),
    MarkAttended(MarkAttended),
    MarkMissed(MarkMissed),
    Cancel(CancelAppointment),
}

impl AppointmentCommand {
    pub fn appointment_id(&self) -> &str {
        match self {
            AppointmentCommand::Schedule(c) => &c.appointment_id,
            AppointmentCommand::MarkAttended(c) => &c.appointment_id,
            AppointmentCommand::MarkMissed(c) => &c.appointment_id,
            AppointmentCommand::Cancel(c) => &c.appointment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentTarget(pub String);

impl TargetIdentifier for AppointmentTarget {
    fn correlation_tags(&self) -> DomainResult<Vec<Tag>> {
        Ok(vec![Tag::new(APPOINTMENT_TAG, self.0.clone())?])
    }
}

impl Command for AppointmentCommand {
    type Target = AppointmentTarget;

    fn command_type(&self) -> &'static str {
        match self {
            AppointmentCommand::Schedule(_) => "appointments.schedule",
            AppointmentCommand::MarkAttended(_) => "appointments.mark_attended",
            AppointmentCommand::MarkMissed(_) => "appointments.mark_missed",
            AppointmentCommand::Cancel(_) => "appointments.cancel",
        }
    }

    fn target(&self) -> AppointmentTarget {
        AppointmentTarget(self.appointment_id().to_string())
    }
}

// --- events ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentScheduled {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub purpose: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentAttended {
    pub appointment_id: String,
    pub patient_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentMissed {
    pub appointment_id: String,
    pub patient_id: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentCancelled {
    pub appointment_id: String,
    pub patient_id: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentEvent {
    Scheduled(AppointmentScheduled),
    Attended(AppointmentAttended),
    Missed(AppointmentMissed),
    Cancelled(AppointmentCancelled),
}

impl AppointmentEvent {
    pub const SCHEDULED: &'static str = "appointments.appointment.scheduled";
    pub const ATTENDED: &'static str = "appointments.appointment.attended";
    pub const MISSED: &'static str = "appointments.appointment.missed";
    pub const CANCELLED: &'static str = "appointments.appointment.cancelled";

    pub fn appointment_id(&self) -> &str {
        match self {
            AppointmentEvent::Scheduled(e) => &e.appointment_id,
            AppointmentEvent::Attended(e) => &e.appointment_id,
            AppointmentEvent::Missed(e) => &e.appointment_id,
            AppointmentEvent::Cancelled(e) => &e.appointment_id,
        }
    }

    pub fn patient_id(&self) -> &str {
        match self {
            AppointmentEvent::Scheduled(e) => &e.patient_id,
            AppointmentEvent::Attended(e) => &e.patient_id,
            AppointmentEvent::Missed(e) => &e.patient_id,
            AppointmentEvent::Cancelled(e) => &e.patient_id,
        }
    }
}

impl Event for AppointmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AppointmentEvent::Scheduled(_) => Self::SCHEDULED,
            AppointmentEvent::Attended(_) => Self::ATTENDED,
            AppointmentEvent::Missed(_) => Self::MISSED,
            AppointmentEvent::Cancelled(_) => Self::CANCELLED,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AppointmentEvent::Scheduled(e) => e.occurred_at,
            AppointmentEvent::Attended(e) => e.occurred_at,
            AppointmentEvent::Missed(e) => e.occurred_at,
            AppointmentEvent::Cancelled(e) => e.occurred_at,
        }
    }

    fn tags(&self) -> DomainResult<TagSet> {
        Ok(TagSet::new()
            .with(Tag::new(APPOINTMENT_TAG, self.appointment_id())?)
            .with(Tag::new(PATIENT_TAG, self.patient_id())?))
    }

    fn event_types() -> &'static [&'static str] {
        &[Self::SCHEDULED, Self::ATTENDED, Self::MISSED, Self::CANCELLED]
    }
}

// --- state machine ---

impl EventSourcedState for Appointment {
    type Command = AppointmentCommand;
    type Event = AppointmentEvent;
    type Error = DomainError;

    fn initial() -> Self {
        Self::default()
    }

    fn evolve(self, event: &AppointmentEvent) -> Self {
        let lifecycle = match event {
            AppointmentEvent::Scheduled(_) => Lifecycle::Active(Open::Scheduled),
            AppointmentEvent::Missed(_) => Lifecycle::Active(Open::Missed),
            AppointmentEvent::Attended(_) => Lifecycle::Terminal(Closed::Attended),
            AppointmentEvent::Cancelled(e) => Lifecycle::Terminal(Closed::Cancelled {
                reason: e.reason.clone(),
            }),
        };
        Self {
            lifecycle,
            patient_id: Some(event.patient_id().to_string()),
        }
    }

    fn decide(&self, command: &AppointmentCommand) -> DomainResult<Vec<AppointmentEvent>> {
        let entity = format!("appointment {}", command.appointment_id());

        match command {
            AppointmentCommand::Schedule(cmd) => {
                self.lifecycle.ensure_not_terminal(&entity)?;
                self.lifecycle.require_unset(&entity)?;
                Tag::new(PATIENT_TAG, cmd.patient_id.clone())?;
                if cmd.doctor_id.trim().is_empty() {
                    return Err(DomainError::validation("doctor is required"));
                }
                if cmd.purpose.trim().is_empty() {
                    return Err(DomainError::validation("purpose is required"));
                }
                Ok(vec![AppointmentEvent::Scheduled(AppointmentScheduled {
                    appointment_id: cmd.appointment_id.clone(),
                    patient_id: cmd.patient_id.clone(),
                    doctor_id: cmd.doctor_id.clone(),
                    scheduled_for: cmd.scheduled_for,
                    purpose: cmd.purpose.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            AppointmentCommand::MarkAttended(cmd) => {
                self.lifecycle.require_active(&entity)?;
                Ok(vec![AppointmentEvent::Attended(AppointmentAttended {
                    appointment_id: cmd.appointment_id.clone(),
                    patient_id: self.known_patient()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            AppointmentCommand::MarkMissed(cmd) => {
                if *self.lifecycle.require_active(&entity)? == Open::Missed {
                    return Err(DomainError::duplicate(format!("{entity} is already marked missed")));
                }
                Ok(vec![AppointmentEvent::Missed(AppointmentMissed {
                    appointment_id: cmd.appointment_id.clone(),
                    patient_id: self.known_patient()?,
                    occurred_at: cmd.occurred_at,
                })])
            }
            AppointmentCommand::Cancel(cmd) => {
                self.lifecycle.require_active(&entity)?;
                if cmd.reason.trim().is_empty() {
                    return Err(DomainError::validation("cancellation reason is required"));
                }
                Ok(vec![AppointmentEvent::Cancelled(AppointmentCancelled {
                    appointment_id: cmd.appointment_id.clone(),
                    patient_id: self.known_patient()?,
                    reason: cmd.reason.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl Appointment {
    fn known_patient(&self) -> DomainResult<String> {
        self.patient_id
            .clone()
            .ok_or_else(|| DomainError::not_found("appointment has no patient"))
    }
}
