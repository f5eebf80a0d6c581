//! Operator session.
//!
//! Who is operating the station, and therefore which (day, purpose)
//! combinations they may scan for. A [`ScanContext`] can only be obtained
//! through [`SessionContext::select`], so the classifier never runs for a
//! combination the operator is not allowed to record.

use rollcall_protocol::{purposes_for, Day, PermissionProfile, PermissionTable};

use crate::error::PermissionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    user: Option<String>,
    profile: Option<PermissionProfile>,
}

impl SessionContext {
    pub fn new(user: Option<String>, table: &PermissionTable) -> Self {
        let profile = user.as_deref().and_then(|u| table.get(u)).cloned();
        Self { user, profile }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn profile(&self) -> Option<&PermissionProfile> {
        self.profile.as_ref()
    }

    /// Days the operator can select. Operators without a profile see every day.
    pub fn available_days(&self) -> Vec<Day> {
        match &self.profile {
            Some(profile) if self.user.is_some() => profile.days(),
            _ => Day::ALL.to_vec(),
        }
    }

    /// Purposes the operator can select on `day`, in catalogue order.
    /// Nobody signed in means nothing is scannable.
    pub fn available_purposes(&self, day: Day) -> Vec<&'static str> {
        if self.user.is_none() {
            return Vec::new();
        }
        match &self.profile {
            Some(profile) => profile.purposes(day),
            None => purposes_for(day).to_vec(),
        }
    }

    /// First selectable (day, purpose), if any.
    pub fn default_selection(&self) -> Option<(Day, &'static str)> {
        self.available_days().into_iter().find_map(|day| {
            self.available_purposes(day)
                .first()
                .map(|purpose| (day, *purpose))
        })
    }

    pub fn select(&self, day: Day, purpose: &str) -> Result<ScanContext, PermissionError> {
        let user = self.user.clone().ok_or(PermissionError::NoOperator)?;
        if !self.available_days().contains(&day) {
            return Err(PermissionError::DayNotAllowed { user, day });
        }
        if !self.available_purposes(day).iter().any(|p| *p == purpose) {
            return Err(PermissionError::PurposeNotAllowed {
                user,
                day,
                purpose: purpose.to_string(),
            });
        }
        Ok(ScanContext {
            day,
            purpose: purpose.to_string(),
            operator: user,
        })
    }
}

/// Active (day, purpose) a station scans for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanContext {
    day: Day,
    purpose: String,
    operator: String,
}

impl ScanContext {
    pub fn day(&self) -> Day {
        self.day
    }

    pub fn purpose(&self) -> &str {
        &self.purpose
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }
}
