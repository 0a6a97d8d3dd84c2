//! Host parameter names the engine reads and writes.

pub const NUMBER: &str = "Number";
pub const NAME: &str = "Name";
pub const AREA: &str = "Area";

pub const SUPPLY_AIRFLOW: &str = "Design Supply Airflow";
pub const EXHAUST_AIRFLOW: &str = "Design Exhaust Airflow";
pub const SUPPLY_SYSTEM: &str = "Supply System Name";
pub const EXHAUST_SYSTEM: &str = "Exhaust System Name";
pub const AIR_CHANGE_RATE: &str = "Air Change Rate";

/// Per-element yes/no switch. On terminals it marks the terminal as part of
/// automatic rebalancing; on spaces and annotations it marks the pair side as
/// up to date.
pub const UPDATER_ENABLED: &str = "Updater Enabled";

pub const ANNOTATION_NUMBER: &str = "Space Number";
pub const ANNOTATION_NAME: &str = "Space Name";
pub const SHOW_SUPPLY: &str = "Show Supply";
pub const SHOW_EXHAUST: &str = "Show Exhaust";
pub const LEADER_LENGTH: &str = "Leader Length";

pub const TERMINAL_FLOW: &str = "Flow";
pub const TERMINAL_CLASSIFICATION: &str = "System Classification";

/// Values mirrored between a space and its annotation, as
/// `(space parameter, annotation parameter)`. Read left-to-right for
/// space→annotation and right-to-left for annotation→space.
pub const PAIR_PARAMETERS: &[(&str, &str)] = &[
    (NUMBER, ANNOTATION_NUMBER),
    (NAME, ANNOTATION_NAME),
    (SUPPLY_AIRFLOW, SUPPLY_AIRFLOW),
    (EXHAUST_AIRFLOW, EXHAUST_AIRFLOW),
    (SUPPLY_SYSTEM, SUPPLY_SYSTEM),
    (EXHAUST_SYSTEM, EXHAUST_SYSTEM),
    (AIR_CHANGE_RATE, AIR_CHANGE_RATE),
];

/// Parameters a terminal must carry for rebalancing.
pub const TERMINAL_PARAMETERS: &[&str] = &[TERMINAL_FLOW, TERMINAL_CLASSIFICATION, UPDATER_ENABLED];

pub fn space_side() -> impl Iterator<Item = &'static str> {
    PAIR_PARAMETERS.iter().map(|(space, _)| *space)
}

pub fn annotation_side() -> impl Iterator<Item = &'static str> {
    PAIR_PARAMETERS.iter().map(|(_, annotation)| *annotation)
}

/// The pair table read annotation→space.
pub fn reversed_pairs() -> Vec<(&'static str, &'static str)> {
    PAIR_PARAMETERS.iter().map(|&(s, a)| (a, s)).collect()
}
