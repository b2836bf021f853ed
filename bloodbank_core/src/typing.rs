//! Blood typing tests for donors and recipients with an unknown blood type.
//!
//! A test request is created PENDING and completed exactly once, when an
//! administrator enters the lab result. Completion writes the resolved type
//! back into the subject's profile.

use crate::directory::{ProfileDirectory, ProfileWriter};
use crate::{table, BloodType, Error, Result, Role, TestRequest, TestStatus};
use chrono::NaiveDate;
use std::path::PathBuf;
use uuid::Uuid;

/// Typing workflow over `tests.csv` and a profile store
pub struct TypingWorkflow<'a, P> {
    tests_path: PathBuf,
    profiles: &'a P,
}

impl<'a, P: ProfileDirectory + ProfileWriter> TypingWorkflow<'a, P> {
    pub fn new(tests_path: impl Into<PathBuf>, profiles: &'a P) -> Self {
        Self {
            tests_path: tests_path.into(),
            profiles,
        }
    }

    /// Open a PENDING test for a subject whose blood type is still unknown.
    ///
    /// Outstanding requests for the same subject are not deduplicated.
    pub fn request_test(&self, subject_id: &str, role: Role, today: NaiveDate) -> Result<TestRequest> {
        let profile = self
            .profiles
            .load_by_id(role, subject_id)?
            .ok_or_else(|| Error::NotFound(format!("{} {}", role, subject_id)))?;

        if let Some(known) = profile.blood_type {
            return Err(Error::Precondition(format!(
                "{} {} already has blood type {}",
                role, subject_id, known
            )));
        }

        let test = TestRequest {
            id: Uuid::new_v4(),
            subject_id: subject_id.to_string(),
            role,
            requested_on: today,
            status: TestStatus::Pending,
            resolved_type: None,
        };
        table::update_rows(&self.tests_path, |rows: &mut Vec<TestRequest>| {
            rows.push(test.clone());
            Ok(())
        })?;

        tracing::info!("Typing test {} requested for {} {}", test.id, role, subject_id);
        Ok(test)
    }

    /// Record the lab result for a pending test.
    ///
    /// The updated profile is built and validated before the test is marked
    /// COMPLETED, so a profile that would be refused leaves the test pending.
    /// The test is persisted first, then the profile is saved. If that last
    /// write fails the error is returned and the test stays completed; the
    /// caller reloads before acting on it.
    pub fn complete_test(&self, test_id: Uuid, resolved: BloodType) -> Result<TestRequest> {
        let (completed, profile) = table::update_rows(&self.tests_path, |rows: &mut Vec<TestRequest>| {
            let test = rows
                .iter_mut()
                .find(|t| t.id == test_id)
                .ok_or_else(|| Error::NotFound(format!("typing test {}", test_id)))?;

            if test.status == TestStatus::Completed {
                return Err(Error::Precondition(format!(
                    "typing test {} is already completed",
                    test_id
                )));
            }
            let mut profile = self
                .profiles
                .load_by_id(test.role, &test.subject_id)?
                .ok_or_else(|| {
                    Error::NotFound(format!(
                        "{} {} for typing test {}",
                        test.role, test.subject_id, test_id
                    ))
                })?;
            profile.blood_type = Some(resolved);
            profile.validate()?;

            test.status = TestStatus::Completed;
            test.resolved_type = Some(resolved);
            Ok((test.clone(), profile))
        })?;

        self.profiles.save_profile(&profile)?;

        tracing::info!(
            "Typing test {} completed: {} {} is {}",
            test_id,
            completed.role,
            completed.subject_id,
            resolved
        );
        Ok(completed)
    }

    pub fn all_tests(&self) -> Result<Vec<TestRequest>> {
        table::read_rows(&self.tests_path)
    }

    pub fn pending_tests(&self) -> Result<Vec<TestRequest>> {
        Ok(self
            .all_tests()?
            .into_iter()
            .filter(TestRequest::is_pending)
            .collect())
    }

    /// Report history for one subject, oldest first
    pub fn tests_for(&self, subject_id: &str) -> Result<Vec<TestRequest>> {
        Ok(self
            .all_tests()?
            .into_iter()
            .filter(|t| t.subject_id == subject_id)
            .collect())
    }
}
