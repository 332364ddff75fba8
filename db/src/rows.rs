//! Raw rows as stored in PostgreSQL and their conversion to engine types.

use chrono::NaiveDate;
use sqlx::FromRow;
use uuid::Uuid;
use vaccination_engine::{
    AgeUnit, BucketRecord, CalendarEntry, Child, ComplianceStatus, DoseAssignment, DoseKey,
    DoseState, Gender, StoreError, Vaccine,
};

/// One calendar entry joined with one of its dose assignments.
///
/// Entries without assignments come back once with the dose columns null.
#[derive(Debug, Clone, FromRow)]
pub struct CalendarDoseRow {
    pub calendar_id: Uuid,
    pub age_unit: String,
    pub specific_age: Option<i32>,
    pub min_age: i32,
    pub max_age: Option<i32>,
    pub vaccine_id: Option<Uuid>,
    pub dose_number: Option<i32>,
    pub vaccine_name: Option<String>,
    pub vaccine_gender: Option<String>,
    pub doses_required: Option<i32>,
}

impl CalendarDoseRow {
    fn assignment(&self) -> Result<Option<DoseAssignment>, StoreError> {
        let Some(vaccine_id) = self.vaccine_id else {
            return Ok(None);
        };
        let gender = self
            .vaccine_gender
            .as_deref()
            .map(|code| {
                Gender::from_code(code).ok_or_else(|| {
                    StoreError::corrupt(format!("vaccine {vaccine_id} has gender {code:?}"))
                })
            })
            .transpose()?;

        Ok(Some(DoseAssignment {
            vaccine: Vaccine {
                id: vaccine_id,
                name: self.vaccine_name.clone().unwrap_or_default(),
                gender,
                doses_required: self.doses_required.unwrap_or(1),
            },
            dose_number: self.dose_number,
        }))
    }
}

/// Folds joined rows, already ordered by entry, into calendar entries
pub fn group_calendar(rows: Vec<CalendarDoseRow>) -> Result<Vec<CalendarEntry>, StoreError> {
    let mut entries: Vec<CalendarEntry> = Vec::new();

    for row in rows {
        let assignment = row.assignment()?;
        let same_entry = entries.last().map_or(false, |last| last.id == row.calendar_id);
        if !same_entry {
            entries.push(CalendarEntry {
                id: row.calendar_id,
                age_unit: AgeUnit::from(row.age_unit.as_str()),
                specific_age: row.specific_age,
                min_age: row.min_age,
                max_age: row.max_age,
                doses: Vec::new(),
            });
        }
        if let (Some(assignment), Some(entry)) = (assignment, entries.last_mut()) {
            entry.doses.push(assignment);
        }
    }

    Ok(entries)
}

#[derive(Debug, Clone, FromRow)]
pub struct ChildRow {
    pub id: Uuid,
    pub birth_date: NaiveDate,
    pub gender: String,
    pub status: String,
}

impl TryFrom<ChildRow> for Child {
    type Error = StoreError;

    fn try_from(row: ChildRow) -> Result<Self, Self::Error> {
        let gender = Gender::from_code(&row.gender).ok_or_else(|| {
            StoreError::corrupt(format!("child {} has gender {:?}", row.id, row.gender))
        })?;
        let status = ComplianceStatus::parse(&row.status).ok_or_else(|| {
            StoreError::corrupt(format!("child {} has status {:?}", row.id, row.status))
        })?;

        Ok(Child {
            id: row.id,
            birth_date: row.birth_date,
            gender,
            status,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct BucketRow {
    pub vaccine_id: Uuid,
    pub calendar_id: Uuid,
    pub dose: i32,
    pub state: String,
    pub event_date: Option<NaiveDate>,
}

impl TryFrom<BucketRow> for BucketRecord {
    type Error = StoreError;

    fn try_from(row: BucketRow) -> Result<Self, Self::Error> {
        let state = DoseState::parse(&row.state)
            .ok_or_else(|| StoreError::corrupt(format!("unknown bucket state {:?}", row.state)))?;

        Ok(BucketRecord::new(
            DoseKey {
                vaccine_id: row.vaccine_id,
                calendar_id: row.calendar_id,
                dose: row.dose,
            },
            state,
            row.event_date,
        ))
    }
}

/// Column arrays for a single `UNNEST` insert
#[derive(Debug, Default)]
pub struct BucketColumns {
    pub vaccine_ids: Vec<Uuid>,
    pub calendar_ids: Vec<Uuid>,
    pub doses: Vec<i32>,
    pub states: Vec<String>,
    pub dates: Vec<Option<NaiveDate>>,
}

impl BucketColumns {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a BucketRecord>) -> Self {
        let mut columns = Self::default();
        for record in records {
            columns.vaccine_ids.push(record.key.vaccine_id);
            columns.calendar_ids.push(record.key.calendar_id);
            columns.doses.push(record.key.dose);
            columns.states.push(record.state.as_str().to_string());
            columns.dates.push(record.date);
        }
        columns
    }

    pub fn is_empty(&self) -> bool {
        self.doses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(calendar: u128, vaccine: Option<u128>, dose_number: Option<i32>) -> CalendarDoseRow {
        CalendarDoseRow {
            calendar_id: Uuid::from_u128(calendar),
            age_unit: "MONTHS".to_string(),
            specific_age: Some(2),
            min_age: 1,
            max_age: Some(4),
            vaccine_id: vaccine.map(Uuid::from_u128),
            dose_number,
            vaccine_name: vaccine.map(|id| format!("vaccine-{id}")),
            vaccine_gender: None,
            doses_required: Some(3),
        }
    }

    #[test]
    fn test_group_calendar_keeps_order_and_empty_entries() {
        let entries = group_calendar(vec![
            row(1, Some(10), Some(1)),
            row(1, Some(11), None),
            row(2, None, None),
            row(3, Some(10), Some(2)),
        ])
        .unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].doses.len(), 2);
        assert_eq!(entries[0].age_unit, AgeUnit::Months);
        assert_eq!(entries[0].doses[1].dose_number, None);
        assert!(entries[1].doses.is_empty());
        assert_eq!(entries[2].doses[0].vaccine.id, Uuid::from_u128(10));
        assert_eq!(entries[2].doses[0].vaccine.doses_required, 3);
    }

    #[test]
    fn test_unknown_age_unit_reads_as_days() {
        let mut unusual = row(1, Some(10), Some(1));
        unusual.age_unit = "QUARTERS".to_string();

        let entries = group_calendar(vec![unusual]).unwrap();
        assert_eq!(entries[0].age_unit, AgeUnit::Days);
    }

    #[test]
    fn test_bad_vaccine_gender_is_corrupt() {
        let mut bad = row(1, Some(10), Some(1));
        bad.vaccine_gender = Some("X".to_string());

        assert!(matches!(group_calendar(vec![bad]), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_child_row_conversion() {
        let child = Child::try_from(ChildRow {
            id: Uuid::from_u128(5),
            birth_date: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
            gender: "F".to_string(),
            status: "PAS_A_JOUR".to_string(),
        })
        .unwrap();

        assert_eq!(child.gender, Gender::Female);
        assert_eq!(child.status, ComplianceStatus::NotUpToDate);

        let invalid = Child::try_from(ChildRow {
            id: Uuid::from_u128(5),
            birth_date: NaiveDate::from_ymd_opt(2023, 6, 30).unwrap(),
            gender: "F".to_string(),
            status: "UNKNOWN".to_string(),
        });
        assert!(invalid.is_err());
    }

    #[test]
    fn test_bucket_row_conversion() {
        let record = BucketRecord::try_from(BucketRow {
            vaccine_id: Uuid::from_u128(1),
            calendar_id: Uuid::from_u128(2),
            dose: 3,
            state: "scheduled".to_string(),
            event_date: None,
        })
        .unwrap();
        assert_eq!(record.state, DoseState::Scheduled);
        assert_eq!(record.key.dose, 3);

        let unknown = BucketRecord::try_from(BucketRow {
            vaccine_id: Uuid::from_u128(1),
            calendar_id: Uuid::from_u128(2),
            dose: 3,
            state: "cancelled".to_string(),
            event_date: None,
        });
        assert!(unknown.is_err());
    }

    #[test]
    fn test_bucket_columns() {
        let key = DoseKey {
            vaccine_id: Uuid::from_u128(1),
            calendar_id: Uuid::from_u128(2),
            dose: 1,
        };
        let records = [
            BucketRecord::new(key, DoseState::Due, NaiveDate::from_ymd_opt(2024, 2, 1)),
            BucketRecord::new(DoseKey { dose: 2, ..key }, DoseState::Late, None),
        ];

        let columns = BucketColumns::from_records(&records);
        assert_eq!(columns.doses, vec![1, 2]);
        assert_eq!(columns.states, vec!["due", "late"]);
        assert!(!columns.is_empty());
        assert!(BucketColumns::from_records(&Vec::<BucketRecord>::new()).is_empty());
    }
}
