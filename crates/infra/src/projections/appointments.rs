//! Appointment records keyed by appointment id, listable per patient and per
//! doctor and day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use tagstream_appointments::AppointmentEvent;
use tagstream_core::Position;
use tagstream_events::{Event, EventEnvelope, Projection, ProjectionError, decode};

use crate::projections::lookup::{Directory, Lookup};
use crate::query::{QueryResult, found};
use crate::read_model::ReadModelStore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    Missed,
    Attended,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub doctor_name: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub purpose: String,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub updated_at: DateTime<Utc>,
    /// Log position of the last event folded into this record.
    pub last_position: Position,
}

pub struct AppointmentsProjection<S, D> {
    store: S,
    doctors: Lookup<D>,
}

impl<S, D> AppointmentsProjection<S, D>
where
    S: ReadModelStore<String, AppointmentRecord>,
    D: Directory,
{
    pub const NAME: &'static str = "appointments";

    pub fn new(store: S, doctors: Lookup<D>) -> Self {
        Self { store, doctors }
    }

    fn set_status(
        &self,
        position: Position,
        appointment_id: &str,
        status: AppointmentStatus,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), ProjectionError> {
        let Some(mut record) = self.store.get(&appointment_id.to_string())? else {
            warn!(projection = Self::NAME, appointment_id, "status change for unknown appointment dropped");
            return Ok(());
        };
        if record.last_position >= position {
            return Ok(());
        }
        record.status = status;
        record.cancellation_reason = reason;
        record.updated_at = at;
        record.last_position = position;
        self.store.upsert(appointment_id.to_string(), record)?;
        Ok(())
    }
}

impl<S, D> Projection for AppointmentsProjection<S, D>
where
    S: ReadModelStore<String, AppointmentRecord>,
    D: Directory,
{
    fn name(&self) -> &str {
        Self::NAME
    }

    fn event_types(&self) -> &[&'static str] {
        AppointmentEvent::event_types()
    }

    fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let position = envelope.position();
        match decode::<AppointmentEvent>(envelope.clone())?.into_payload() {
            AppointmentEvent::Scheduled(e) => {
                let existing = self.store.get(&e.appointment_id)?;
                if existing.as_ref().is_some_and(|r| r.last_position >= position) {
                    return Ok(());
                }
                let doctor_name = self.doctors.resolve(
                    &e.doctor_id,
                    existing.as_ref().and_then(|r| r.doctor_name.as_deref()),
                );
                let record = AppointmentRecord {
                    appointment_id: e.appointment_id.clone(),
                    patient_id: e.patient_id,
                    doctor_id: e.doctor_id,
                    doctor_name,
                    scheduled_for: e.scheduled_for,
                    purpose: e.purpose,
                    status: AppointmentStatus::Scheduled,
                    cancellation_reason: None,
                    updated_at: e.occurred_at,
                    last_position: position,
                };
                self.store.upsert(e.appointment_id, record)?;
                Ok(())
            }
            AppointmentEvent::Missed(e) => {
                self.set_status(position, &e.appointment_id, AppointmentStatus::Missed, None, e.occurred_at)
            }
            AppointmentEvent::Attended(e) => {
                self.set_status(position, &e.appointment_id, AppointmentStatus::Attended, None, e.occurred_at)
            }
            AppointmentEvent::Cancelled(e) => self.set_status(
                position,
                &e.appointment_id,
                AppointmentStatus::Cancelled,
                Some(e.reason),
                e.occurred_at,
            ),
        }
    }

    fn reset(&self) -> Result<(), ProjectionError> {
        self.store.clear()?;
        Ok(())
    }
}

pub struct AppointmentsQuery<S> {
    store: S,
}

impl<S> AppointmentsQuery<S>
where
    S: ReadModelStore<String, AppointmentRecord>,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn appointment(&self, appointment_id: &str) -> QueryResult<AppointmentRecord> {
        found(self.store.get(&appointment_id.to_string())?, || {
            format!("appointment {appointment_id}")
        })
    }

    /// A patient's appointments, earliest first.
    pub fn for_patient(&self, patient_id: &str) -> QueryResult<Vec<AppointmentRecord>> {
        self.filtered(|r| r.patient_id == patient_id)
    }

    /// A doctor's agenda for one calendar day (UTC).
    pub fn for_doctor_on(&self, doctor_id: &str, day: NaiveDate) -> QueryResult<Vec<AppointmentRecord>> {
        self.filtered(|r| r.doctor_id == doctor_id && r.scheduled_for.date_naive() == day)
    }

    fn filtered<F>(&self, keep: F) -> QueryResult<Vec<AppointmentRecord>>
    where
        F: Fn(&AppointmentRecord) -> bool,
    {
        let mut records: Vec<AppointmentRecord> = self.store.list()?.into_iter().filter(|r| keep(r)).collect();
        records.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.appointment_id.cmp(&b.appointment_id))
        });
        Ok(records)
    }
}
