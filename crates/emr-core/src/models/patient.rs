//! Patient registry models.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Category-specific patient details.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "patient_type")]
pub enum PatientKind {
    Employee {
        personal_number: String,
        /// e.g. "Staff", "Contract"
        employee_type: Option<String>,
        division: Option<String>,
        location: Option<String>,
    },
    Retiree {
        personal_number: String,
        retirement_date: Option<NaiveDate>,
        former_division: Option<String>,
        former_location: Option<String>,
    },
    Dependent {
        /// Personal number of the employee or retiree sponsoring this patient
        sponsor_personal_number: String,
        /// "Employee Dependent" or "Retiree Dependent"
        dependent_type: Option<String>,
        relationship_to_sponsor: Option<String>,
    },
    NonNpa {
        non_npa_type: String,
        organization: Option<String>,
        access_valid_from: Option<NaiveDate>,
        access_valid_until: Option<NaiveDate>,
    },
}

impl PatientKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatientKind::Employee { .. } => "Employee",
            PatientKind::Retiree { .. } => "Retiree",
            PatientKind::Dependent { .. } => "Dependent",
            PatientKind::NonNpa { .. } => "NonNpa",
        }
    }

    /// Personal number for employees and retirees.
    pub fn personal_number(&self) -> Option<&str> {
        match self {
            PatientKind::Employee {
                personal_number, ..
            }
            | PatientKind::Retiree {
                personal_number, ..
            } => Some(personal_number),
            _ => None,
        }
    }

    pub fn sponsor_personal_number(&self) -> Option<&str> {
        match self {
            PatientKind::Dependent {
                sponsor_personal_number,
                ..
            } => Some(sponsor_personal_number),
            _ => None,
        }
    }

    /// Check the kind-specific required fields.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            PatientKind::Employee {
                personal_number, ..
            }
            | PatientKind::Retiree {
                personal_number, ..
            } if personal_number.trim().is_empty() => {
                Err(format!("{} requires a personal number", self.as_str()))
            }
            PatientKind::Dependent {
                sponsor_personal_number,
                ..
            } if sponsor_personal_number.trim().is_empty() => {
                Err("Dependent requires a sponsor personal number".to_string())
            }
            PatientKind::NonNpa {
                non_npa_type,
                access_valid_from: Some(from),
                access_valid_until: Some(until),
                ..
            } if !non_npa_type.trim().is_empty() && until < from => {
                Err("access_valid_until is before access_valid_from".to_string())
            }
            PatientKind::NonNpa { non_npa_type, .. } if non_npa_type.trim().is_empty() => {
                Err("NonNpa requires a category".to_string())
            }
            _ => Ok(()),
        }
    }

    /// Whether a non-NPA patient's access window covers `today`.
    ///
    /// Other kinds always have access; open-ended bounds are unbounded.
    pub fn is_access_valid(&self, today: NaiveDate) -> bool {
        match self {
            PatientKind::NonNpa {
                access_valid_from,
                access_valid_until,
                ..
            } => {
                access_valid_from.map_or(true, |from| from <= today)
                    && access_valid_until.map_or(true, |until| today <= until)
            }
            _ => true,
        }
    }
}

/// A registered patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    pub title: Option<String>,
    pub surname: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub marital_status: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub genotype: Option<String>,
    pub nok_first_name: Option<String>,
    pub nok_last_name: Option<String>,
    pub nok_relationship: Option<String>,
    pub nok_phone: Option<String>,
    pub kind: PatientKind,
    pub created_at: String,
    pub updated_at: String,
}

impl Patient {
    pub fn new(surname: String, first_name: String, kind: PatientKind) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: None,
            surname,
            first_name,
            last_name: None,
            gender: None,
            marital_status: None,
            date_of_birth: None,
            email: None,
            phone: None,
            address: None,
            blood_group: None,
            genotype: None,
            nok_first_name: None,
            nok_last_name: None,
            nok_relationship: None,
            nok_phone: None,
            kind,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn full_name(&self) -> String {
        [
            self.title.as_deref(),
            Some(self.first_name.as_str()),
            self.last_name.as_deref(),
            Some(self.surname.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Age in completed years on `today`, if date of birth is known.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        self.date_of_birth.map(|dob| age_on(dob, today))
    }

    pub fn validate(&self, today: NaiveDate) -> Result<(), String> {
        if self.surname.trim().is_empty() || self.first_name.trim().is_empty() {
            return Err("surname and first_name are required".to_string());
        }
        if let Some(dob) = self.date_of_birth {
            if dob > today {
                return Err(format!("date_of_birth {dob} is in the future"));
            }
        }
        self.kind.validate()
    }
}

/// Completed years between `date_of_birth` and `today`; 0 for future dates.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> u32 {
    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }
    years.max(0) as u32
}
