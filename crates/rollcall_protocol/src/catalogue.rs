//! Purpose catalogue: which scan purposes exist on which conference day.

use crate::types::Day;

/// Purposes per day, in display order. Index 0 is day 1.
pub const PURPOSES_BY_DAY: [&[&str]; 4] = [
    &[
        "Pickup 1",
        "Pickup 2",
        "Attendance",
        "Lunch",
        "High Tea",
        "Kit",
        "Dinner",
        "Drop",
    ],
    &[
        "Pickup",
        "Attendance",
        "Breakfast",
        "Lunch",
        "High Tea",
        "Dinner",
        "Drop",
    ],
    &[
        "Pickup",
        "Attendance",
        "Breakfast",
        "Lunch",
        "High Tea",
        "Dinner",
        "Drop",
    ],
    &["Pickup", "Attendance", "Breakfast", "Lunch", "Drop"],
];

pub fn purposes_for(day: Day) -> &'static [&'static str] {
    PURPOSES_BY_DAY[usize::from(day.number() - 1)]
}

pub fn is_catalogued(day: Day, purpose: &str) -> bool {
    purposes_for(day).contains(&purpose)
}
