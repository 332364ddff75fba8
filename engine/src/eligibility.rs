use crate::models::{Gender, Vaccine};

/// A vaccine without a gender restriction applies to every child.
pub fn is_eligible(vaccine: &Vaccine, child_gender: Gender) -> bool {
    vaccine.gender.map_or(true, |gender| gender == child_gender)
}
