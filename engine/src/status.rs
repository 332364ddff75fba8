use crate::models::{BucketRecord, ComplianceStatus, DoseState};

/// A child is up to date unless something is late or overdue.
pub fn aggregate(late_count: usize, overdue_count: usize) -> ComplianceStatus {
    if late_count == 0 && overdue_count == 0 {
        ComplianceStatus::UpToDate
    } else {
        ComplianceStatus::NotUpToDate
    }
}

/// Status of a full record set, counting every `Late` and `Overdue` row
pub fn status_of<'a>(records: impl IntoIterator<Item = &'a BucketRecord>) -> ComplianceStatus {
    let (late, overdue) = records
        .into_iter()
        .fold((0, 0), |(late, overdue), record| match record.state {
            DoseState::Late => (late + 1, overdue),
            DoseState::Overdue => (late, overdue + 1),
            _ => (late, overdue),
        });

    aggregate(late, overdue)
}
