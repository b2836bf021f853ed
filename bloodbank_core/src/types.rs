//! Core domain types for the blood bank.
//!
//! This module defines:
//! - Blood types, components and stock status
//! - Inventory records held by the ledger
//! - Blood requests and typing test requests
//! - Donor and recipient profiles

use crate::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Spelling used on disk and in the CLI for a blood type that has not been typed yet.
pub const UNKNOWN_BLOOD_TYPE: &str = "UNKNOWN";

// ============================================================================
// Blood Types and Components
// ============================================================================

/// ABO/Rh blood type
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BloodType {
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "AB+")]
    AbPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "O-")]
    ONeg,
}

impl BloodType {
    pub const ALL: [BloodType; 8] = [
        BloodType::APos,
        BloodType::ANeg,
        BloodType::BPos,
        BloodType::BNeg,
        BloodType::AbPos,
        BloodType::AbNeg,
        BloodType::OPos,
        BloodType::ONeg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BloodType::APos => "A+",
            BloodType::ANeg => "A-",
            BloodType::BPos => "B+",
            BloodType::BNeg => "B-",
            BloodType::AbPos => "AB+",
            BloodType::AbNeg => "AB-",
            BloodType::OPos => "O+",
            BloodType::ONeg => "O-",
        }
    }

    /// Parse a profile blood group, where `UNKNOWN` maps to `None`.
    pub fn parse_group(s: &str) -> Result<Option<BloodType>> {
        if s.trim().eq_ignore_ascii_case(UNKNOWN_BLOOD_TYPE) {
            Ok(None)
        } else {
            s.parse().map(Some)
        }
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BloodType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_uppercase();
        BloodType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| Error::Validation(format!("Invalid blood type: {:?}", s)))
    }
}

/// Blood component held in inventory
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    WholeBlood,
    Plasma,
    Platelets,
}

impl Component {
    pub const ALL: [Component; 3] = [Component::WholeBlood, Component::Plasma, Component::Platelets];

    pub fn as_str(&self) -> &'static str {
        match self {
            Component::WholeBlood => "WholeBlood",
            Component::Plasma => "Plasma",
            Component::Platelets => "Platelets",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Component {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "wholeblood" => Ok(Component::WholeBlood),
            "plasma" => Ok(Component::Plasma),
            "platelets" => Ok(Component::Platelets),
            _ => Err(Error::Validation(format!("Invalid component: {:?}", s))),
        }
    }
}

/// Administrative availability of an inventory record
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Available,
    Blocked,
}

// ============================================================================
// Inventory
// ============================================================================

/// One ledger row, keyed by (blood type, component).
///
/// Field order matches the persisted `inventory.csv` layout.
/// `units` is the free, allocable stock; reserving moves units into `reserved`,
/// so the stock physically on hand is `units + reserved`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRecord {
    pub blood_type: BloodType,
    pub component: Component,
    pub units: u32,
    pub expiration: NaiveDate,
    pub reserved: u32,
    pub status: StockStatus,
}

impl InventoryRecord {
    pub fn new(blood_type: BloodType, component: Component, units: u32, expiration: NaiveDate) -> Self {
        Self {
            blood_type,
            component,
            units,
            expiration,
            reserved: 0,
            status: StockStatus::Available,
        }
    }

    pub fn key(&self) -> (BloodType, Component) {
        (self.blood_type, self.component)
    }

    /// Units physically held, free plus earmarked.
    pub fn on_hand(&self) -> u32 {
        self.units.saturating_add(self.reserved)
    }

    pub fn is_available(&self) -> bool {
        self.status == StockStatus::Available
    }

    pub fn is_blocked(&self) -> bool {
        self.status == StockStatus::Blocked
    }
}

// ============================================================================
// Requests
// ============================================================================

/// Clinical urgency attached to a blood request or recipient
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Urgency {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        };
        f.write_str(s)
    }
}

impl FromStr for Urgency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            _ => Err(Error::Validation(format!(
                "Invalid urgency {:?}: expected Low, Medium or High",
                s
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Fulfilled,
    Pending,
}

/// A recorded blood request. Immutable once appended to the request log.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BloodRequest {
    pub id: Uuid,
    pub recipient_id: String,
    pub blood_type: BloodType,
    pub units: u32,
    pub urgency: Urgency,
    pub status: RequestStatus,
}

// ============================================================================
// Typing Tests
// ============================================================================

/// Which profile file a subject lives in
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Donor,
    Recipient,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Donor => f.write_str("Donor"),
            Role::Recipient => f.write_str("Recipient"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "donor" => Ok(Role::Donor),
            "recipient" => Ok(Role::Recipient),
            _ => Err(Error::Validation(format!("Invalid role: {:?}", s))),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestStatus {
    Pending,
    Completed,
}

/// Blood typing request for a subject whose type is still unknown
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRequest {
    pub id: Uuid,
    pub subject_id: String,
    pub role: Role,
    pub requested_on: NaiveDate,
    pub status: TestStatus,
    pub resolved_type: Option<BloodType>,
}

impl TestRequest {
    pub fn is_pending(&self) -> bool {
        self.status == TestStatus::Pending
    }
}

// ============================================================================
// Profiles
// ============================================================================

/// Role-specific profile data
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum RoleDetails {
    Donor { last_donation: Option<NaiveDate> },
    Recipient { urgency: Urgency },
}

/// A donor or recipient, as seen by the inventory core.
///
/// `blood_type` is `None` while the subject is untyped (`UNKNOWN` on disk).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub age: u32,
    pub blood_type: Option<BloodType>,
    pub contact: String,
    pub details: RoleDetails,
}

impl Profile {
    pub fn role(&self) -> Role {
        match self.details {
            RoleDetails::Donor { .. } => Role::Donor,
            RoleDetails::Recipient { .. } => Role::Recipient,
        }
    }

    /// Whether a donor may give blood again on `today`.
    ///
    /// Recipients are never eligible.
    pub fn is_eligible_to_donate(&self, today: NaiveDate, interval_days: i64) -> bool {
        match self.details {
            RoleDetails::Donor { last_donation: None } => true,
            RoleDetails::Donor {
                last_donation: Some(last),
            } => (today - last).num_days() >= interval_days,
            RoleDetails::Recipient { .. } => false,
        }
    }

    /// Registration rules: adults only, contact is a 10-digit phone or an email.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Validation("Profile id must not be empty".into()));
        }
        if self.age < 18 {
            return Err(Error::Validation(format!(
                "Profile {} must be 18 or older (got {})",
                self.id, self.age
            )));
        }
        if !is_valid_contact(&self.contact) {
            return Err(Error::Validation(format!(
                "Profile {} contact must be a 10-digit phone or an email address",
                self.id
            )));
        }
        Ok(())
    }
}

fn is_valid_contact(contact: &str) -> bool {
    if contact.len() == 10 && contact.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    let email_char = |c: char| c.is_ascii_alphanumeric() || "+_.-".contains(c);
    match contact.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && local.chars().all(email_char)
                && domain.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
        }
        None => false,
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| Error::Validation(format!("Invalid date {:?} (expected YYYY-MM-DD): {}", s, e)))?;
    if date.year() < 1900 {
        return Err(Error::Validation(format!("Implausible date: {}", date)));
    }
    Ok(date)
}
