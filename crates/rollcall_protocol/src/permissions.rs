//! Station operator permissions.
//!
//! A profile limits which days and purposes an operator may scan for. The
//! built-in table mirrors the event's staffing: kit desk, sergeants-at-arms,
//! food counters, transport and one unrestricted coordinator.

use crate::catalogue::purposes_for;
use crate::types::Day;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Wildcard purpose marker accepted in configuration files.
pub const ALL_PURPOSES: &str = "ALL";

/// Purposes an operator may scan for.
///
/// Serialized as a plain list of purpose names; a list containing `"ALL"`
/// means every purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub enum PurposeScope {
    All,
    Only(BTreeSet<String>),
}

impl PurposeScope {
    pub fn allows(&self, purpose: &str) -> bool {
        match self {
            PurposeScope::All => true,
            PurposeScope::Only(purposes) => purposes.contains(purpose),
        }
    }
}

impl From<Vec<String>> for PurposeScope {
    fn from(values: Vec<String>) -> Self {
        if values.iter().any(|v| v == ALL_PURPOSES) {
            PurposeScope::All
        } else {
            PurposeScope::Only(values.into_iter().collect())
        }
    }
}

impl From<PurposeScope> for Vec<String> {
    fn from(scope: PurposeScope) -> Self {
        match scope {
            PurposeScope::All => vec![ALL_PURPOSES.to_string()],
            PurposeScope::Only(purposes) => purposes.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionProfile {
    pub allowed_days: BTreeSet<Day>,
    pub allowed_purposes: PurposeScope,
}

impl PermissionProfile {
    pub fn new(days: impl IntoIterator<Item = Day>, purposes: &[&str]) -> Self {
        Self {
            allowed_days: days.into_iter().collect(),
            allowed_purposes: purposes
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .into(),
        }
    }

    pub fn unrestricted() -> Self {
        Self {
            allowed_days: Day::ALL.into_iter().collect(),
            allowed_purposes: PurposeScope::All,
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self.allowed_purposes, PurposeScope::All)
    }

    /// Days the operator can pick. An `ALL` purpose scope opens every day.
    pub fn days(&self) -> Vec<Day> {
        if self.is_unrestricted() {
            return Day::ALL.to_vec();
        }
        self.allowed_days.iter().copied().collect()
    }

    /// Catalogued purposes for `day` that this profile allows, in catalogue order.
    pub fn purposes(&self, day: Day) -> Vec<&'static str> {
        purposes_for(day)
            .iter()
            .copied()
            .filter(|p| self.allowed_purposes.allows(p))
            .collect()
    }

    pub fn allows(&self, day: Day, purpose: &str) -> bool {
        self.days().contains(&day) && self.allowed_purposes.allows(purpose)
    }
}

/// Operator name -> profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionTable {
    profiles: BTreeMap<String, PermissionProfile>,
}

impl PermissionTable {
    pub fn builtin() -> Self {
        let every_day = Day::ALL;
        let mut profiles = BTreeMap::new();
        profiles.insert("Kit".to_string(), PermissionProfile::new([Day::One], &["Kit"]));
        profiles.insert(
            "Seargent".to_string(),
            PermissionProfile::new(every_day, &["Attendance"]),
        );
        profiles.insert(
            "Food".to_string(),
            PermissionProfile::new(every_day, &["Breakfast", "Lunch", "Dinner", "High Tea"]),
        );
        profiles.insert(
            "Transport".to_string(),
            PermissionProfile::new(every_day, &["Pickup 1", "Pickup 2", "Pickup", "Drop"]),
        );
        profiles.insert(
            "Kumar".to_string(),
            PermissionProfile::new(every_day, &[ALL_PURPOSES]),
        );
        Self { profiles }
    }

    pub fn get(&self, user: &str) -> Option<&PermissionProfile> {
        self.profiles.get(user)
    }

    pub fn insert(&mut self, user: impl Into<String>, profile: PermissionProfile) {
        self.profiles.insert(user.into(), profile);
    }

    /// Overlay `overrides` on top of this table; overriding profiles replace whole entries.
    pub fn merged(mut self, overrides: &PermissionTable) -> Self {
        for (user, profile) in &overrides.profiles {
            self.profiles.insert(user.clone(), profile.clone());
        }
        self
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
