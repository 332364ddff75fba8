use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Granularity in which a calendar entry's age window is expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", from = "String")]
pub enum AgeUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl AgeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Days => "DAYS",
            Self::Weeks => "WEEKS",
            Self::Months => "MONTHS",
            Self::Years => "YEARS",
        }
    }
}

/// Unrecognized units are read as raw days rather than rejected.
impl From<&str> for AgeUnit {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "WEEKS" => Self::Weeks,
            "MONTHS" => Self::Months,
            "YEARS" => Self::Years,
            _ => Self::Days,
        }
    }
}

impl From<String> for AgeUnit {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl fmt::Display for AgeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Gender {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "M" | "m" => Some(Self::Male),
            "F" | "f" => Some(Self::Female),
            _ => None,
        }
    }
}

/// Vaccine metadata the engine needs; everything else lives with the owning flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vaccine {
    pub id: Uuid,
    #[serde(default)]
    pub name: String,
    /// `None` means the vaccine applies to every child
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default = "default_doses_required")]
    pub doses_required: i32,
}

fn default_doses_required() -> i32 {
    1
}

/// Links a vaccine to a calendar entry, optionally pinning the dose number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseAssignment {
    pub vaccine: Vaccine,
    #[serde(default, deserialize_with = "floor_dose_number")]
    pub dose_number: Option<i32>,
}

/// Accepts any JSON number; fractional dose numbers are floored
fn floor_dose_number<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<f64>::deserialize(deserializer)?;
    Ok(value.map(|number| number.floor() as i32))
}

/// A configured age window for one or more vaccine doses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEntry {
    pub id: Uuid,
    pub age_unit: AgeUnit,
    #[serde(default)]
    pub specific_age: Option<i32>,
    #[serde(default)]
    pub min_age: i32,
    /// Unbounded when absent
    #[serde(default)]
    pub max_age: Option<i32>,
    #[serde(default)]
    pub doses: Vec<DoseAssignment>,
}

/// Child-level compliance flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceStatus {
    #[serde(rename = "A_JOUR")]
    UpToDate,
    #[serde(rename = "PAS_A_JOUR")]
    NotUpToDate,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpToDate => "A_JOUR",
            Self::NotUpToDate => "PAS_A_JOUR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A_JOUR" => Some(Self::UpToDate),
            "PAS_A_JOUR" => Some(Self::NotUpToDate),
            _ => None,
        }
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: Uuid,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub status: ComplianceStatus,
}

impl Child {
    pub fn new(id: Uuid, birth_date: NaiveDate, gender: Gender) -> Self {
        Self {
            id,
            birth_date,
            gender,
            status: ComplianceStatus::UpToDate,
        }
    }
}

/// Identifies one dose of one vaccine under one calendar entry, scoped to a child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseKey {
    pub vaccine_id: Uuid,
    pub calendar_id: Uuid,
    pub dose: i32,
}

/// The five mutually exclusive states a dose key can occupy.
///
/// `Due` and `Late` are produced by rebuilds; the other three belong to
/// external flows and are only ever read here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoseState {
    Due,
    Late,
    Overdue,
    Scheduled,
    Completed,
}

impl DoseState {
    pub const ALL: [DoseState; 5] = [
        Self::Due,
        Self::Late,
        Self::Overdue,
        Self::Scheduled,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Late => "late",
            Self::Overdue => "overdue",
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == value)
    }

    /// States written by a rebuild
    pub fn is_computed(&self) -> bool {
        matches!(self, Self::Due | Self::Late)
    }

    /// States that suppress any computed entry for the same key
    pub fn takes_precedence(&self) -> bool {
        matches!(self, Self::Overdue | Self::Scheduled | Self::Completed)
    }
}

impl fmt::Display for DoseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a child's vaccination buckets.
///
/// `date` is the target date for `Due` (scheduled for) and `Late` (due date);
/// external states may carry their own event date or none at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRecord {
    #[serde(flatten)]
    pub key: DoseKey,
    pub state: DoseState,
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl BucketRecord {
    pub fn new(key: DoseKey, state: DoseState, date: Option<NaiveDate>) -> Self {
        Self { key, state, date }
    }
}

/// A child together with every bucket row currently stored for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildProfile {
    pub child: Child,
    pub records: Vec<BucketRecord>,
}
