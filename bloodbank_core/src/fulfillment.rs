//! Request fulfillment: serve blood requests from the ledger, or point the
//! recipient at compatible donors when stock cannot.

use crate::compat::compatible_donor_types;
use crate::directory::DonorDirectory;
use crate::ledger::{Dispense, Ledger};
use crate::requests::RequestLog;
use crate::{BloodRequest, BloodType, Component, Error, RequestStatus, Result, Urgency};
use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

/// A donor the recipient may contact. Suggestions never touch the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DonorContact {
    pub donor_id: String,
    pub name: String,
    pub contact: String,
    pub blood_type: BloodType,
    /// Past the minimum interval since their last donation
    pub eligible: bool,
}

/// Why a request was refused before looking at stock levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    BloodTypeBlocked,
    EntireStockBlocked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FulfillmentOutcome {
    /// Served from the record of this component
    Fulfilled { component: Component },
    /// Refused by an administrative block; nothing consumed, no suggestions
    Blocked { reason: BlockReason },
    /// Not enough stock; compatible donors to contact instead
    Pending { contacts: Vec<DonorContact> },
}

/// The recorded request plus what happened to it
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FulfillmentReport {
    pub request: BloodRequest,
    pub outcome: FulfillmentOutcome,
}

impl FulfillmentReport {
    pub fn is_fulfilled(&self) -> bool {
        self.request.status == RequestStatus::Fulfilled
    }
}

/// Fulfillment engine over a ledger, a request log and a donor directory
pub struct FulfillmentEngine<'a, D: DonorDirectory> {
    ledger: &'a Ledger,
    requests: &'a RequestLog,
    donors: &'a D,
    donation_interval_days: i64,
}

impl<'a, D: DonorDirectory> FulfillmentEngine<'a, D> {
    pub fn new(ledger: &'a Ledger, requests: &'a RequestLog, donors: &'a D) -> Self {
        Self {
            ledger,
            requests,
            donors,
            donation_interval_days: 90,
        }
    }

    pub fn with_donation_interval(mut self, days: i64) -> Self {
        self.donation_interval_days = days;
        self
    }

    /// Process one blood request.
    ///
    /// The request is always recorded, FULFILLED or PENDING. A blocked type
    /// or fully blocked stock short-circuits without consuming anything.
    /// If the request cannot be recorded nothing is consumed either.
    pub fn fulfill(
        &self,
        recipient_id: &str,
        blood_type: BloodType,
        units: u32,
        urgency: Urgency,
        today: NaiveDate,
    ) -> Result<FulfillmentReport> {
        if units == 0 {
            return Err(Error::Validation("request: units must be positive".into()));
        }
        if recipient_id.trim().is_empty() {
            return Err(Error::Validation("request: recipient id must not be empty".into()));
        }

        let id = Uuid::new_v4();
        let build = |dispensed: &Dispense| BloodRequest {
            id,
            recipient_id: recipient_id.to_string(),
            blood_type,
            units,
            urgency,
            status: match dispensed {
                Dispense::Consumed(_) => RequestStatus::Fulfilled,
                _ => RequestStatus::Pending,
            },
        };

        // The request is logged under the ledger lock; a failed append puts
        // the consumed units back.
        let dispensed = self
            .ledger
            .dispense_recorded(blood_type, units, |dispensed| self.requests.record(&build(dispensed)))?;
        let request = build(&dispensed);

        let outcome = match dispensed {
            Dispense::Consumed(component) => FulfillmentOutcome::Fulfilled { component },
            Dispense::TypeBlocked => FulfillmentOutcome::Blocked {
                reason: BlockReason::BloodTypeBlocked,
            },
            Dispense::StockBlocked => FulfillmentOutcome::Blocked {
                reason: BlockReason::EntireStockBlocked,
            },
            Dispense::Unavailable => FulfillmentOutcome::Pending {
                contacts: self.compatible_donors(blood_type, today)?,
            },
        };

        tracing::info!(
            "Request {} from {} for {} units of {} ({}): {:?}",
            request.id,
            recipient_id,
            units,
            blood_type,
            urgency,
            request.status
        );
        Ok(FulfillmentReport { request, outcome })
    }

    /// Donors able to supply a recipient of `blood_type`, in directory order
    pub fn compatible_donors(&self, blood_type: BloodType, today: NaiveDate) -> Result<Vec<DonorContact>> {
        let types = compatible_donor_types(blood_type);
        let donors = self.donors.find_by_blood_types(types)?;

        let contacts: Vec<DonorContact> = donors
            .into_iter()
            .filter_map(|profile| {
                let donor_type = profile.blood_type.filter(|t| types.contains(t))?;
                Some(DonorContact {
                    eligible: profile.is_eligible_to_donate(today, self.donation_interval_days),
                    donor_id: profile.id,
                    name: profile.name,
                    contact: profile.contact,
                    blood_type: donor_type,
                })
            })
            .collect();

        tracing::debug!("{} compatible donors for {}", contacts.len(), blood_type);
        Ok(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Profile, RoleDetails};
    use std::path::Path;

    /// In-memory directory
    struct Donors(Vec<Profile>);

    impl DonorDirectory for Donors {
        fn find_by_blood_types(&self, types: &[BloodType]) -> Result<Vec<Profile>> {
            Ok(self
                .0
                .iter()
                .filter(|p| p.blood_type.is_some_and(|t| types.contains(&t)))
                .cloned()
                .collect())
        }
    }

    fn donor(id: &str, blood_type: Option<BloodType>, last_donation: Option<NaiveDate>) -> Profile {
        Profile {
            id: id.into(),
            name: format!("Donor {}", id),
            age: 35,
            blood_type,
            contact: "5551234567".into(),
            details: RoleDetails::Donor { last_donation },
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    fn fixture(dir: &Path, inventory: &str) -> (Ledger, RequestLog) {
        let path = dir.join("inventory.csv");
        std::fs::write(&path, inventory).unwrap();
        (
            Ledger::open(path).unwrap(),
            RequestLog::new(dir.join("requests.csv")),
        )
    }

    #[test]
    fn test_fulfilled_from_stock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(temp_dir.path(), "A+,Plasma,10,2025-01-01,0,AVAILABLE\n");
        let donors = Donors(vec![]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let report = engine
            .fulfill("R1", BloodType::APos, 4, Urgency::High, today())
            .unwrap();

        assert!(report.is_fulfilled());
        assert_eq!(
            report.outcome,
            FulfillmentOutcome::Fulfilled {
                component: Component::Plasma
            }
        );
        let record = ledger.get(BloodType::APos, Component::Plasma).unwrap();
        assert_eq!(record.units, 6);
        assert_eq!(record.reserved, 0);

        let logged = log.for_recipient("R1").unwrap();
        assert_eq!(logged, vec![report.request]);
    }

    #[test]
    fn test_no_stock_suggests_compatible_donors() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(temp_dir.path(), "");
        let donors = Donors(vec![
            donor("D1", Some(BloodType::ONeg), None),
            donor("D2", Some(BloodType::AbPos), None),
            donor("D3", None, None),
            donor("D4", Some(BloodType::BNeg), Some(today() - chrono::Duration::days(10))),
            donor("D5", Some(BloodType::AbNeg), None),
        ]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let report = engine
            .fulfill("R1", BloodType::AbNeg, 2, Urgency::Medium, today())
            .unwrap();

        assert_eq!(report.request.status, RequestStatus::Pending);
        let contacts = match report.outcome {
            FulfillmentOutcome::Pending { contacts } => contacts,
            other => panic!("expected pending, got {:?}", other),
        };
        let ids: Vec<_> = contacts.iter().map(|c| c.donor_id.as_str()).collect();
        assert_eq!(ids, vec!["D1", "D4", "D5"]);
        assert!(contacts[0].eligible);
        assert!(!contacts[1].eligible);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_blocked_type_records_pending_without_consuming() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(
            temp_dir.path(),
            "B+,WholeBlood,10,2025-01-01,0,BLOCKED\nB+,Plasma,10,2025-01-01,0,AVAILABLE\n",
        );
        let donors = Donors(vec![donor("D1", Some(BloodType::BPos), None)]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let report = engine
            .fulfill("R1", BloodType::BPos, 1, Urgency::Low, today())
            .unwrap();

        assert_eq!(
            report.outcome,
            FulfillmentOutcome::Blocked {
                reason: BlockReason::BloodTypeBlocked
            }
        );
        assert_eq!(report.request.status, RequestStatus::Pending);
        assert_eq!(ledger.get(BloodType::BPos, Component::Plasma).unwrap().units, 10);
        assert_eq!(log.all().unwrap().len(), 1);
    }

    #[test]
    fn test_fully_blocked_stock() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(temp_dir.path(), "O-,Plasma,10,2025-01-01,0,AVAILABLE\n");
        ledger.block_all().unwrap();
        let donors = Donors(vec![]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let report = engine
            .fulfill("R1", BloodType::APos, 1, Urgency::High, today())
            .unwrap();
        assert_eq!(
            report.outcome,
            FulfillmentOutcome::Blocked {
                reason: BlockReason::EntireStockBlocked
            }
        );
    }

    #[test]
    fn test_unrecordable_request_consumes_nothing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(temp_dir.path(), "A+,Plasma,10,2025-01-01,0,AVAILABLE\n");
        // A directory where the log file should be makes every append fail
        std::fs::create_dir(temp_dir.path().join("requests.csv")).unwrap();
        let donors = Donors(vec![]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let result = engine.fulfill("R1", BloodType::APos, 4, Urgency::High, today());
        assert!(result.unwrap_err().is_storage());

        assert_eq!(ledger.get(BloodType::APos, Component::Plasma).unwrap().units, 10);
        ledger.reload().unwrap();
        assert_eq!(ledger.get(BloodType::APos, Component::Plasma).unwrap().units, 10);
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("inventory.csv")).unwrap(),
            "A+,Plasma,10,2025-01-01,0,AVAILABLE\n"
        );
    }

    #[test]
    fn test_zero_units_rejected_before_recording() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (ledger, log) = fixture(temp_dir.path(), "");
        let donors = Donors(vec![]);
        let engine = FulfillmentEngine::new(&ledger, &log, &donors);

        let result = engine.fulfill("R1", BloodType::APos, 0, Urgency::High, today());
        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(log.all().unwrap().is_empty());
    }
}
