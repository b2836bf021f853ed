//! Donor and recipient profiles, as external collaborators of the core.
//!
//! The core only needs three capabilities: find donors by blood type, load a
//! profile by id, and write a profile back (used when a typing test resolves
//! a blood type). [`CsvProfileStore`] provides all three over `donors.csv` and
//! `recipients.csv`.

use crate::{table, BloodType, Error, Profile, Result, Role, RoleDetails, Urgency};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Lookup of donors by blood type
pub trait DonorDirectory {
    /// Donors whose known type is one of `types`, in directory order.
    /// Untyped donors are never returned.
    fn find_by_blood_types(&self, types: &[BloodType]) -> Result<Vec<Profile>>;
}

/// Lookup of any profile by id
pub trait ProfileDirectory {
    fn load_by_id(&self, role: Role, id: &str) -> Result<Option<Profile>>;
}

pub trait ProfileWriter {
    /// Insert or replace the profile with the same role and id
    fn save_profile(&self, profile: &Profile) -> Result<()>;
}

// ============================================================================
// CSV rows
// ============================================================================

/// `id,name,age,bloodType,contact,lastDonationDate`
#[derive(Debug, Serialize, Deserialize)]
struct DonorRow {
    id: String,
    name: String,
    age: u32,
    blood_type: String,
    contact: String,
    last_donation: Option<NaiveDate>,
}

/// `id,name,age,bloodType,contact,urgency`
#[derive(Debug, Serialize, Deserialize)]
struct RecipientRow {
    id: String,
    name: String,
    age: u32,
    blood_type: String,
    contact: String,
    urgency: Urgency,
}

fn blood_type_text(blood_type: Option<BloodType>) -> String {
    blood_type
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| crate::types::UNKNOWN_BLOOD_TYPE.to_string())
}

impl TryFrom<DonorRow> for Profile {
    type Error = Error;

    fn try_from(row: DonorRow) -> Result<Self> {
        Ok(Profile {
            blood_type: BloodType::parse_group(&row.blood_type)?,
            id: row.id,
            name: row.name,
            age: row.age,
            contact: row.contact,
            details: RoleDetails::Donor {
                last_donation: row.last_donation,
            },
        })
    }
}

impl TryFrom<RecipientRow> for Profile {
    type Error = Error;

    fn try_from(row: RecipientRow) -> Result<Self> {
        Ok(Profile {
            blood_type: BloodType::parse_group(&row.blood_type)?,
            id: row.id,
            name: row.name,
            age: row.age,
            contact: row.contact,
            details: RoleDetails::Recipient {
                urgency: row.urgency,
            },
        })
    }
}

fn donor_row(profile: &Profile, last_donation: Option<NaiveDate>) -> DonorRow {
    DonorRow {
        id: profile.id.clone(),
        name: profile.name.clone(),
        age: profile.age,
        blood_type: blood_type_text(profile.blood_type),
        contact: profile.contact.clone(),
        last_donation,
    }
}

fn recipient_row(profile: &Profile, urgency: Urgency) -> RecipientRow {
    RecipientRow {
        id: profile.id.clone(),
        name: profile.name.clone(),
        age: profile.age,
        blood_type: blood_type_text(profile.blood_type),
        contact: profile.contact.clone(),
        urgency,
    }
}

// ============================================================================
// Store
// ============================================================================

/// Profile store over the donor and recipient CSV files
#[derive(Clone, Debug)]
pub struct CsvProfileStore {
    donors_path: PathBuf,
    recipients_path: PathBuf,
}

impl CsvProfileStore {
    pub fn new(donors_path: impl Into<PathBuf>, recipients_path: impl Into<PathBuf>) -> Self {
        Self {
            donors_path: donors_path.into(),
            recipients_path: recipients_path.into(),
        }
    }

    pub fn donors(&self) -> Result<Vec<Profile>> {
        table::read_rows::<DonorRow>(&self.donors_path)?
            .into_iter()
            .map(Profile::try_from)
            .collect()
    }

    pub fn recipients(&self) -> Result<Vec<Profile>> {
        table::read_rows::<RecipientRow>(&self.recipients_path)?
            .into_iter()
            .map(Profile::try_from)
            .collect()
    }
}

impl DonorDirectory for CsvProfileStore {
    fn find_by_blood_types(&self, types: &[BloodType]) -> Result<Vec<Profile>> {
        Ok(self
            .donors()?
            .into_iter()
            .filter(|p| p.blood_type.is_some_and(|t| types.contains(&t)))
            .collect())
    }
}

impl ProfileDirectory for CsvProfileStore {
    fn load_by_id(&self, role: Role, id: &str) -> Result<Option<Profile>> {
        let profiles = match role {
            Role::Donor => self.donors()?,
            Role::Recipient => self.recipients()?,
        };
        Ok(profiles.into_iter().find(|p| p.id == id))
    }
}

impl ProfileWriter for CsvProfileStore {
    fn save_profile(&self, profile: &Profile) -> Result<()> {
        profile.validate()?;

        let inserted = match profile.details {
            RoleDetails::Donor { last_donation } => {
                let row = donor_row(profile, last_donation);
                table::update_rows(&self.donors_path, |rows: &mut Vec<DonorRow>| {
                    Ok(upsert(rows, row, |r| r.id == profile.id))
                })?
            }
            RoleDetails::Recipient { urgency } => {
                let row = recipient_row(profile, urgency);
                table::update_rows(&self.recipients_path, |rows: &mut Vec<RecipientRow>| {
                    Ok(upsert(rows, row, |r| r.id == profile.id))
                })?
            }
        };

        tracing::info!(
            "{} {} profile {}",
            if inserted { "Registered" } else { "Updated" },
            profile.role(),
            profile.id
        );
        Ok(())
    }
}

/// Replace the first matching row in place, or append. Returns true on append.
fn upsert<T>(rows: &mut Vec<T>, row: T, matches: impl Fn(&T) -> bool) -> bool {
    match rows.iter().position(matches) {
        Some(i) => {
            rows[i] = row;
            false
        }
        None => {
            rows.push(row);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &std::path::Path) -> CsvProfileStore {
        CsvProfileStore::new(dir.join("donors.csv"), dir.join("recipients.csv"))
    }

    #[test]
    fn test_reads_positional_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("donors.csv"),
            "D1,Ada,30,O-,5551234567,2024-05-01\nD2,Bob,41,UNKNOWN,bob@example.org,\n",
        )
        .unwrap();
        std::fs::write(
            temp_dir.path().join("recipients.csv"),
            "R1,Cy,55,AB-,5559876543,High\n",
        )
        .unwrap();
        let store = store(temp_dir.path());

        let donors = store.donors().unwrap();
        assert_eq!(donors.len(), 2);
        assert_eq!(donors[0].blood_type, Some(BloodType::ONeg));
        assert_eq!(
            donors[0].details,
            RoleDetails::Donor {
                last_donation: NaiveDate::from_ymd_opt(2024, 5, 1)
            }
        );
        assert_eq!(donors[1].blood_type, None);

        let recipient = store.load_by_id(Role::Recipient, "R1").unwrap().unwrap();
        assert_eq!(recipient.details, RoleDetails::Recipient { urgency: Urgency::High });
        assert!(store.load_by_id(Role::Donor, "R1").unwrap().is_none());
    }

    #[test]
    fn test_find_by_blood_types_skips_unknown() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join("donors.csv"),
            "D1,Ada,30,O-,5551234567,\nD2,Bob,41,UNKNOWN,bob@example.org,\nD3,Eve,22,A+,5550000000,\n",
        )
        .unwrap();
        let store = store(temp_dir.path());

        let found = store
            .find_by_blood_types(&[BloodType::ANeg, BloodType::ONeg])
            .unwrap();
        let ids: Vec<_> = found.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["D1"]);
    }

    #[test]
    fn test_save_profile_upserts_in_place() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store(temp_dir.path());

        let mut donor = Profile {
            id: "D1".into(),
            name: "Ada".into(),
            age: 30,
            blood_type: None,
            contact: "5551234567".into(),
            details: RoleDetails::Donor { last_donation: None },
        };
        store.save_profile(&donor).unwrap();
        donor.blood_type = Some(BloodType::BPos);
        store.save_profile(&donor).unwrap();

        let contents = std::fs::read_to_string(temp_dir.path().join("donors.csv")).unwrap();
        assert_eq!(contents, "D1,Ada,30,B+,5551234567,\n");
    }

    #[test]
    fn test_save_profile_validates() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store(temp_dir.path());
        let minor = Profile {
            id: "R2".into(),
            name: "Kid".into(),
            age: 12,
            blood_type: None,
            contact: "5551234567".into(),
            details: RoleDetails::Recipient {
                urgency: Urgency::Low,
            },
        };

        assert!(matches!(store.save_profile(&minor), Err(Error::Validation(_))));
        assert!(!temp_dir.path().join("recipients.csv").exists());
    }
}
