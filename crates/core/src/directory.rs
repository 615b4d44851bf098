//! Directory lookups for patients, physicians, and catalog services.
//!
//! The praxis core never owns directory data; it validates foreign keys and
//! specialty matching through this narrow interface. Deployments back it
//! with whatever master-data service they run. `StaticDirectory` is a
//! map-backed implementation for embedding and tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::billing::CurrencyCode;

/// A physician as the directory knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicianRecord {
    pub id: Uuid,
    pub specialty_id: Uuid,
    pub active: bool,
}

/// A billable catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub specialty_id: Uuid,
    pub base_amount: f64,
    pub currency: CurrencyCode,
    pub active: bool,
}

/// A patient reference. The directory only vouches for existence; all
/// demographic detail stays outside this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
}

/// Read-only master-data lookups consumed by the command handlers.
pub trait Directory: Send + Sync {
    fn physician(&self, id: Uuid) -> Option<PhysicianRecord>;
    fn service(&self, id: Uuid) -> Option<ServiceRecord>;
    fn patient(&self, id: Uuid) -> Option<PatientRecord>;
}

/// An in-process `Directory` backed by pre-loaded records.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    physicians: HashMap<Uuid, PhysicianRecord>,
    services: HashMap<Uuid, ServiceRecord>,
    patients: HashMap<Uuid, PatientRecord>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_physician(mut self, record: PhysicianRecord) -> Self {
        self.physicians.insert(record.id, record);
        self
    }

    pub fn with_service(mut self, record: ServiceRecord) -> Self {
        self.services.insert(record.id, record);
        self
    }

    pub fn with_patient(mut self, record: PatientRecord) -> Self {
        self.patients.insert(record.id, record);
        self
    }
}

impl Directory for StaticDirectory {
    fn physician(&self, id: Uuid) -> Option<PhysicianRecord> {
        self.physicians.get(&id).cloned()
    }

    fn service(&self, id: Uuid) -> Option<ServiceRecord> {
        self.services.get(&id).cloned()
    }

    fn patient(&self, id: Uuid) -> Option<PatientRecord> {
        self.patients.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_directory_resolves_loaded_records() {
        let physician = PhysicianRecord {
            id: Uuid::new_v4(),
            specialty_id: Uuid::new_v4(),
            active: true,
        };
        let directory = StaticDirectory::new().with_physician(physician.clone());

        assert_eq!(directory.physician(physician.id), Some(physician));
        assert_eq!(directory.physician(Uuid::new_v4()), None);
    }
}
