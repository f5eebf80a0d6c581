//! Shared vocabulary for rollcall.
//!
//! Everything in here is plain data: delegates, conference days, the purpose
//! catalogue, scan events and the permission table. No I/O lives in this crate;
//! stores, queues and the classifier are in `rollcall_station` and `rollcall_db`.

pub mod catalogue;
pub mod defaults;
pub mod paths;
pub mod permissions;
pub mod types;

pub use catalogue::{is_catalogued, purposes_for, PURPOSES_BY_DAY};
pub use permissions::{PermissionProfile, PermissionTable, PurposeScope, ALL_PURPOSES};
pub use types::{Day, Delegate, DelegateId, ScanEvent, ScanKey};
