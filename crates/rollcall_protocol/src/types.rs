use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Conference day (1..=4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Day {
    One,
    Two,
    Three,
    Four,
}

impl Day {
    pub const ALL: [Day; 4] = [Day::One, Day::Two, Day::Three, Day::Four];

    pub fn number(self) -> u8 {
        match self {
            Day::One => 1,
            Day::Two => 2,
            Day::Three => 3,
            Day::Four => 4,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Day::One),
            2 => Some(Day::Two),
            3 => Some(Day::Three),
            4 => Some(Day::Four),
            _ => None,
        }
    }
}

impl TryFrom<u8> for Day {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Day::from_number(value).ok_or_else(|| format!("Invalid day: {}. Expected 1-4", value))
    }
}

impl From<Day> for u8 {
    fn from(day: Day) -> Self {
        day.number()
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl FromStr for Day {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("day")
            .or_else(|| trimmed.strip_prefix("Day"))
            .unwrap_or(trimmed)
            .trim();
        let n: u8 = digits
            .parse()
            .map_err(|_| format!("Invalid day: '{}'. Expected 1-4", s))?;
        Day::try_from(n)
    }
}

/// Delegate identifier as printed on the badge QR code.
///
/// Always normalized (trimmed, uppercase), whether it came from a decoder,
/// manual entry or the roster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DelegateId(String);

impl DelegateId {
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for DelegateId {
    fn from(value: String) -> Self {
        Self::normalize(&value)
    }
}

impl From<&str> for DelegateId {
    fn from(value: &str) -> Self {
        Self::normalize(value)
    }
}

impl From<DelegateId> for String {
    fn from(id: DelegateId) -> Self {
        id.0
    }
}

impl fmt::Display for DelegateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster entry. Owned by the roster store and immutable for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub id: DelegateId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl Delegate {
    pub fn new(id: impl Into<DelegateId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            organization: None,
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }
}

/// Logical uniqueness key of a scan: at most one committed event per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScanKey {
    pub delegate_id: DelegateId,
    pub day: Day,
    pub purpose: String,
}

impl ScanKey {
    pub fn new(delegate_id: DelegateId, day: Day, purpose: impl Into<String>) -> Self {
        Self {
            delegate_id,
            day,
            purpose: purpose.into(),
        }
    }
}

impl fmt::Display for ScanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/day {}/{}", self.delegate_id, self.day, self.purpose)
    }
}

/// One attendance scan.
///
/// `id` is assigned by the record store on commit; events waiting in the
/// offline queue never carry one, and the persisted queue layout omits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub delegate_id: DelegateId,
    pub day: Day,
    pub purpose: String,
    pub timestamp: DateTime<Utc>,
}

impl ScanEvent {
    pub fn new(
        delegate_id: DelegateId,
        day: Day,
        purpose: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            delegate_id,
            day,
            purpose: purpose.into(),
            timestamp,
        }
    }

    pub fn key(&self) -> ScanKey {
        ScanKey::new(self.delegate_id.clone(), self.day, self.purpose.clone())
    }

    pub fn matches(&self, key: &ScanKey) -> bool {
        self.delegate_id == key.delegate_id && self.day == key.day && self.purpose == key.purpose
    }

    pub fn is_committed(&self) -> bool {
        self.id.is_some()
    }

    pub fn committed(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Same event with the store id stripped, as held by the offline queue.
    pub fn pending(mut self) -> Self {
        self.id = None;
        self
    }

    /// Pending events compare by key and timestamp; ids are ignored.
    pub fn same_scan(&self, other: &ScanEvent) -> bool {
        self.delegate_id == other.delegate_id
            && self.day == other.day
            && self.purpose == other.purpose
            && self.timestamp == other.timestamp
    }
}
