//! Inventory ledger: per-(blood type, component) stock records.
//!
//! The ledger is an in-memory indexed table mirrored to `inventory.csv`.
//! Every mutation is one read-modify-write over the whole table:
//!
//! 1. take the in-memory write guard
//! 2. take the `inventory.csv.lock` file lock
//! 3. re-read the full table from disk
//! 4. apply the change to that copy
//! 5. rewrite the full table atomically
//! 6. publish the copy as the new in-memory state
//!
//! A failed write leaves both disk and memory at the pre-mutation state.
//! Readers share the read guard and never see a partial rewrite.

use crate::config::InventoryConfig;
use crate::table::{self, TableLock};
use crate::{BloodType, Component, Error, InventoryRecord, Result, StockStatus};
use chrono::NaiveDate;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Outcomes
// ============================================================================

/// Why a well-formed ledger operation was not applied
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Rejection {
    /// No record for the requested key
    NotFound,
    /// Record exists but is administratively blocked
    Blocked,
    InsufficientUnits { available: u32, requested: u32 },
    InsufficientReserved { reserved: u32, requested: u32 },
    /// `block_type` found no AVAILABLE record of that type
    NothingToBlock,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotFound => write!(f, "no matching inventory record"),
            Rejection::Blocked => write!(f, "stock is blocked"),
            Rejection::InsufficientUnits {
                available,
                requested,
            } => write!(f, "insufficient units ({} available, {} requested)", available, requested),
            Rejection::InsufficientReserved {
                reserved,
                requested,
            } => write!(f, "insufficient reserved units ({} reserved, {} requested)", reserved, requested),
            Rejection::NothingToBlock => write!(f, "no available stock of that type"),
        }
    }
}

/// Result of a ledger operation whose failure is ordinary control flow
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    Rejected(Rejection),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }

    /// Convert a rejection into `Error::NotFound` / `Error::Precondition`.
    pub fn into_result(self, context: &str) -> Result<()> {
        match self {
            Outcome::Applied => Ok(()),
            Outcome::Rejected(Rejection::NotFound) => {
                Err(Error::NotFound(format!("{}: no matching inventory record", context)))
            }
            Outcome::Rejected(reason) => Err(Error::Precondition(format!("{}: {}", context, reason))),
        }
    }
}

/// Result of dispensing a request from stock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispense {
    /// Units were taken from the record of this component
    Consumed(Component),
    /// Some record of the requested type is blocked
    TypeBlocked,
    /// The whole inventory is blocked
    StockBlocked,
    /// No single available record holds enough units
    Unavailable,
}

// ============================================================================
// Table
// ============================================================================

/// Inventory rows in storage order, indexed by key
#[derive(Clone, Debug, Default, PartialEq)]
struct InventoryTable {
    rows: Vec<InventoryRecord>,
    index: HashMap<(BloodType, Component), usize>,
}

impl InventoryTable {
    fn load(path: &Path) -> Result<Self> {
        let rows: Vec<InventoryRecord> = table::read_rows(path)?;
        Self::from_rows(rows)
    }

    fn from_rows(rows: Vec<InventoryRecord>) -> Result<Self> {
        let mut index = HashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            if index.insert(row.key(), i).is_some() {
                return Err(Error::Validation(format!(
                    "Duplicate inventory record for {} {}",
                    row.blood_type, row.component
                )));
            }
        }
        Ok(Self { rows, index })
    }

    fn get(&self, blood_type: BloodType, component: Component) -> Option<&InventoryRecord> {
        self.index
            .get(&(blood_type, component))
            .map(|&i| &self.rows[i])
    }

    fn get_mut(&mut self, blood_type: BloodType, component: Component) -> Option<&mut InventoryRecord> {
        match self.index.get(&(blood_type, component)) {
            Some(&i) => Some(&mut self.rows[i]),
            None => None,
        }
    }

    fn insert(&mut self, record: InventoryRecord) {
        self.index.insert(record.key(), self.rows.len());
        self.rows.push(record);
    }

    fn is_type_blocked(&self, blood_type: BloodType) -> bool {
        self.rows
            .iter()
            .any(|r| r.blood_type == blood_type && r.is_blocked())
    }

    fn is_fully_blocked(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(InventoryRecord::is_blocked)
    }

    /// Check an available record for `requested` free units.
    fn check_usable(&self, blood_type: BloodType, component: Component, requested: u32) -> Option<Rejection> {
        match self.get(blood_type, component) {
            None => Some(Rejection::NotFound),
            Some(r) if r.is_blocked() => Some(Rejection::Blocked),
            Some(r) if r.units < requested => Some(Rejection::InsufficientUnits {
                available: r.units,
                requested,
            }),
            Some(_) => None,
        }
    }
}

/// `current + units`, or a validation error if the count would overflow
fn checked_units(current: u32, units: u32, op: &str) -> Result<u32> {
    current.checked_add(units).ok_or_else(|| {
        Error::Validation(format!("{}: {} + {} units exceeds capacity", op, current, units))
    })
}

fn validate_quantity(units: u32, op: &str) -> Result<()> {
    if units == 0 {
        return Err(Error::Validation(format!("{}: units must be positive", op)));
    }
    Ok(())
}

// ============================================================================
// Ledger
// ============================================================================

/// The inventory record store. Owns every inventory mutation rule.
pub struct Ledger {
    path: PathBuf,
    table: RwLock<InventoryTable>,
    policy: InventoryConfig,
}

impl Ledger {
    /// Open the ledger backed by `path` with default warning thresholds
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, InventoryConfig::default())
    }

    pub fn open_with(path: impl Into<PathBuf>, policy: InventoryConfig) -> Result<Self> {
        let path = path.into();
        let table = InventoryTable::load(&path)?;
        tracing::info!("Opened inventory ledger {:?} ({} records)", path, table.rows.len());
        Ok(Self {
            path,
            table: RwLock::new(table),
            policy,
        })
    }

    /// Re-read the persisted table, discarding in-memory state.
    ///
    /// This is the recovery step after a storage error.
    pub fn reload(&self) -> Result<()> {
        let mut guard = self.table.write();
        let _lock = TableLock::acquire(&self.path)?;
        *guard = InventoryTable::load(&self.path)?;
        tracing::info!("Reloaded inventory ledger {:?}", self.path);
        Ok(())
    }

    /// Run one full read-modify-write cycle.
    ///
    /// An error from `f` aborts before anything is written.
    fn mutate<R>(&self, op: &str, f: impl FnOnce(&mut InventoryTable) -> Result<R>) -> Result<R> {
        self.mutate_then(op, f, |_| Ok(()))
    }

    /// Read-modify-write cycle with a follow-up write to another store.
    ///
    /// `commit` runs after the inventory is persisted, still under both
    /// locks. If it fails the previous table is written back and the commit
    /// error is returned, so neither store records a half-applied change.
    fn mutate_then<R>(
        &self,
        op: &str,
        f: impl FnOnce(&mut InventoryTable) -> Result<R>,
        commit: impl FnOnce(&R) -> Result<()>,
    ) -> Result<R> {
        let mut guard = self.table.write();
        let _lock = TableLock::acquire(&self.path)?;

        let before = InventoryTable::load(&self.path)?;
        let mut table = before.clone();
        let result = f(&mut table)?;

        if let Err(e) = table::write_rows(&self.path, &table.rows) {
            tracing::error!("{} failed to persist inventory: {}", op, e);
            return Err(e);
        }

        if let Err(e) = commit(&result) {
            tracing::error!("{} failed after persisting inventory, rolling back: {}", op, e);
            match table::write_rows(&self.path, &before.rows) {
                Ok(()) => *guard = before,
                Err(rollback) => {
                    tracing::error!("{} rollback failed, inventory kept new state: {}", op, rollback);
                    *guard = table;
                }
            }
            return Err(e);
        }

        *guard = table;
        Ok(result)
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Add units for a (type, component), creating the record if absent.
    ///
    /// Expiration is last-write-wins. Status and reservations are untouched.
    /// A total on hand past `u32::MAX` is a validation error.
    pub fn restock(
        &self,
        blood_type: BloodType,
        component: Component,
        units: u32,
        expiration: NaiveDate,
    ) -> Result<InventoryRecord> {
        let record = self.mutate("restock", |table| {
            if let Some(record) = table.get_mut(blood_type, component) {
                let total = record
                    .units
                    .checked_add(units)
                    .filter(|total| total.checked_add(record.reserved).is_some())
                    .ok_or_else(|| {
                        Error::Validation(format!(
                            "restock: {} more units of {} {} exceeds capacity (on hand {})",
                            units,
                            blood_type,
                            component,
                            record.on_hand()
                        ))
                    })?;
                record.units = total;
                record.expiration = expiration;
                Ok(record.clone())
            } else {
                let record = InventoryRecord::new(blood_type, component, units, expiration);
                table.insert(record.clone());
                Ok(record)
            }
        })?;

        tracing::info!(
            "Restocked {} {} with {} units (now {}, expires {})",
            blood_type,
            component,
            units,
            record.units,
            expiration
        );
        Ok(record)
    }

    /// Signed-delta variant of [`Ledger::restock`] for text front ends.
    ///
    /// Negative deltas are rejected before anything is read or written.
    pub fn restock_delta(
        &self,
        blood_type: BloodType,
        component: Component,
        delta: i64,
        expiration: NaiveDate,
    ) -> Result<InventoryRecord> {
        let units = u32::try_from(delta).map_err(|_| {
            Error::Validation(format!("restock: units must be between 0 and {} (got {})", u32::MAX, delta))
        })?;
        self.restock(blood_type, component, units, expiration)
    }

    /// Earmark units: moves `units` from free stock into `reserved`.
    pub fn reserve(&self, blood_type: BloodType, component: Component, units: u32) -> Result<Outcome> {
        validate_quantity(units, "reserve")?;
        let outcome = self.mutate("reserve", |table| {
            if let Some(reason) = table.check_usable(blood_type, component, units) {
                return Ok(Outcome::Rejected(reason));
            }
            if let Some(record) = table.get_mut(blood_type, component) {
                record.reserved = checked_units(record.reserved, units, "reserve")?;
                record.units -= units;
            }
            Ok(Outcome::Applied)
        })?;

        log_outcome("reserve", blood_type, component, units, &outcome);
        Ok(outcome)
    }

    /// Return reserved units to free stock.
    ///
    /// Allowed on blocked records since it never decrements usable stock.
    pub fn release(&self, blood_type: BloodType, component: Component, units: u32) -> Result<Outcome> {
        validate_quantity(units, "release")?;
        let outcome = self.mutate("release", |table| match table.get_mut(blood_type, component) {
            None => Ok(Outcome::Rejected(Rejection::NotFound)),
            Some(r) if r.reserved < units => Ok(Outcome::Rejected(Rejection::InsufficientReserved {
                reserved: r.reserved,
                requested: units,
            })),
            Some(r) => {
                r.units = checked_units(r.units, units, "release")?;
                r.reserved -= units;
                Ok(Outcome::Applied)
            }
        })?;

        log_outcome("release", blood_type, component, units, &outcome);
        Ok(outcome)
    }

    /// Take units out of free stock. Reservations are untouched.
    pub fn consume(&self, blood_type: BloodType, component: Component, units: u32) -> Result<Outcome> {
        validate_quantity(units, "consume")?;
        let outcome = self.mutate("consume", |table| {
            if let Some(reason) = table.check_usable(blood_type, component, units) {
                return Ok(Outcome::Rejected(reason));
            }
            if let Some(record) = table.get_mut(blood_type, component) {
                record.units -= units;
            }
            Ok(Outcome::Applied)
        })?;

        log_outcome("consume", blood_type, component, units, &outcome);
        Ok(outcome)
    }

    /// Serve a request for `units` of a blood type from any component.
    ///
    /// Refuses when the type or the whole stock is blocked. Otherwise consumes
    /// from the first record, in storage order, that is available and holds
    /// enough free units; other records are left untouched. The block check
    /// and the consumption happen in the same critical section.
    pub fn dispense(&self, blood_type: BloodType, units: u32) -> Result<Dispense> {
        self.dispense_recorded(blood_type, units, |_| Ok(()))
    }

    /// [`Ledger::dispense`] plus a record of the result written under the
    /// same lock.
    ///
    /// If `record` fails the consumed units are written back and its error
    /// is returned.
    pub fn dispense_recorded(
        &self,
        blood_type: BloodType,
        units: u32,
        record: impl FnOnce(&Dispense) -> Result<()>,
    ) -> Result<Dispense> {
        validate_quantity(units, "dispense")?;
        let apply = |table: &mut InventoryTable| -> Result<Dispense> {
            if table.is_type_blocked(blood_type) {
                return Ok(Dispense::TypeBlocked);
            }
            if table.is_fully_blocked() {
                return Ok(Dispense::StockBlocked);
            }
            let found = table
                .rows
                .iter_mut()
                .find(|r| r.blood_type == blood_type && r.is_available() && r.units >= units);
            Ok(match found {
                Some(record) => {
                    record.units -= units;
                    Dispense::Consumed(record.component)
                }
                None => Dispense::Unavailable,
            })
        };
        let result = self.mutate_then("dispense", apply, record)?;

        tracing::info!("Dispense {} units of {}: {:?}", units, blood_type, result);
        Ok(result)
    }

    /// Mark one record BLOCKED.
    ///
    /// The record must be available and hold at least `units` free units, but
    /// the quantity is only a precondition: units and reservations are left
    /// as they are.
    pub fn block(&self, blood_type: BloodType, component: Component, units: u32) -> Result<Outcome> {
        let outcome = self.mutate("block", |table| {
            if let Some(reason) = table.check_usable(blood_type, component, units) {
                return Ok(Outcome::Rejected(reason));
            }
            if let Some(record) = table.get_mut(blood_type, component) {
                record.status = StockStatus::Blocked;
            }
            Ok(Outcome::Applied)
        })?;

        log_outcome("block", blood_type, component, units, &outcome);
        Ok(outcome)
    }

    /// Block every available record of a type, across components
    pub fn block_type(&self, blood_type: BloodType) -> Result<Outcome> {
        let outcome = self.mutate("block_type", |table| {
            let mut blocked = 0;
            for record in table
                .rows
                .iter_mut()
                .filter(|r| r.blood_type == blood_type && r.is_available())
            {
                record.status = StockStatus::Blocked;
                blocked += 1;
            }
            if blocked == 0 {
                Ok(Outcome::Rejected(Rejection::NothingToBlock))
            } else {
                tracing::debug!("Blocked {} records of {}", blocked, blood_type);
                Ok(Outcome::Applied)
            }
        })?;

        if outcome.is_applied() {
            tracing::info!("Blocked all {} stock", blood_type);
        } else {
            tracing::warn!("block_type {} rejected: nothing available", blood_type);
        }
        Ok(outcome)
    }

    /// Block the whole inventory unconditionally
    pub fn block_all(&self) -> Result<()> {
        let count = self.mutate("block_all", |table| {
            for record in &mut table.rows {
                record.status = StockStatus::Blocked;
            }
            Ok(table.rows.len())
        })?;
        tracing::info!("Blocked entire stock ({} records)", count);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// True if any record of the type is blocked
    pub fn is_blocked(&self, blood_type: BloodType) -> bool {
        self.table.read().is_type_blocked(blood_type)
    }

    /// True iff the ledger is non-empty and every record is blocked
    pub fn is_fully_blocked(&self) -> bool {
        self.table.read().is_fully_blocked()
    }

    pub fn get(&self, blood_type: BloodType, component: Component) -> Option<InventoryRecord> {
        self.table.read().get(blood_type, component).cloned()
    }

    /// All records in storage order
    pub fn records(&self) -> Vec<InventoryRecord> {
        self.table.read().rows.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().rows.is_empty()
    }

    /// Listing of all records with derived warnings, as of `today`
    pub fn snapshot(&self, today: NaiveDate) -> Snapshot {
        let table = self.table.read();
        let entries = table
            .rows
            .iter()
            .map(|record| SnapshotEntry {
                warnings: warnings_for(record, today, &self.policy),
                record: record.clone(),
            })
            .collect();
        Snapshot {
            taken_on: today,
            entries,
        }
    }
}

fn log_outcome(op: &str, blood_type: BloodType, component: Component, units: u32, outcome: &Outcome) {
    match outcome {
        Outcome::Applied => tracing::info!("{} {} units of {} {}", op, units, blood_type, component),
        Outcome::Rejected(reason) => tracing::warn!(
            "{} {} units of {} {} rejected: {}",
            op,
            units,
            blood_type,
            component,
            reason
        ),
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Read-only notice derived from a record; never stored
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockWarning {
    LowStock { units: u32 },
    ExpiringSoon { on: NaiveDate, days_left: i64 },
    Blocked,
    Reserved { units: u32 },
}

impl fmt::Display for StockWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StockWarning::LowStock { units } => write!(f, "WARNING: low stock ({} units)", units),
            StockWarning::ExpiringSoon { on, days_left } => {
                write!(f, "ALERT: expiring on {} ({} days left)", on, days_left)
            }
            StockWarning::Blocked => write!(f, "NOTICE: currently BLOCKED"),
            StockWarning::Reserved { units } => write!(f, "NOTE: {} units reserved", units),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SnapshotEntry {
    pub record: InventoryRecord,
    pub warnings: Vec<StockWarning>,
}

/// Immutable, storage-ordered listing of the ledger
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub taken_on: NaiveDate,
    pub entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn warnings_for(record: &InventoryRecord, today: NaiveDate, policy: &InventoryConfig) -> Vec<StockWarning> {
    let mut warnings = Vec::new();
    if record.units < policy.low_stock_threshold {
        warnings.push(StockWarning::LowStock {
            units: record.units,
        });
    }
    if record.is_blocked() {
        warnings.push(StockWarning::Blocked);
    }
    if record.reserved > 0 {
        warnings.push(StockWarning::Reserved {
            units: record.reserved,
        });
    }
    let days_left = (record.expiration - today).num_days();
    if (0..=policy.near_expiry_days).contains(&days_left) {
        warnings.push(StockWarning::ExpiringSoon {
            on: record.expiration,
            days_left,
        });
    }
    warnings
}
