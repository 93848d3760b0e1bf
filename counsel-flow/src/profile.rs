use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Grade point average tagged with the scale it was reported on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gpa {
    pub value: f64,
    pub scale: f64,
}

impl Gpa {
    pub fn new(value: f64, scale: f64) -> Self {
        Self { value, scale }
    }

    /// Convert to the 4.0 scale used by the scoring tables.
    pub fn normalized(&self) -> f64 {
        if self.scale <= 0.0 {
            return 0.0;
        }
        (self.value / self.scale * 4.0).clamp(0.0, 4.0)
    }
}

/// Structured academic background extracted from a user's free-form messages.
///
/// Every field is optional: a message that yields nothing still produces a
/// valid profile carrying only the source text it was extracted from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub target_institution: Option<String>,
    pub target_country: Option<String>,
    pub field_of_study: Option<String>,
    pub gpa: Option<Gpa>,
    /// Standardized test name (uppercase) to reported score.
    pub test_scores: BTreeMap<String, f64>,
    pub certifications: BTreeSet<String>,
    pub extracurriculars: Vec<String>,
    pub internships: Vec<String>,
    /// Raw message text the fields were extracted from, kept for provenance.
    pub source_text: String,
}

impl Profile {
    pub fn from_raw(raw: &str) -> Self {
        Self {
            source_text: raw.to_string(),
            ..Default::default()
        }
    }

    /// True when at least one structured field was extracted.
    pub fn has_signal(&self) -> bool {
        self.target_institution.is_some()
            || self.target_country.is_some()
            || self.field_of_study.is_some()
            || self.gpa.is_some()
            || !self.test_scores.is_empty()
            || !self.certifications.is_empty()
            || !self.extracurriculars.is_empty()
            || !self.internships.is_empty()
    }

    /// Field-wise merge: a field present in `newer` replaces the old value,
    /// absent fields are retained. Test scores merge per test name and
    /// certifications accumulate; activity lists are replaced wholesale when
    /// the newer message mentions any. Source text is appended, never
    /// replaced.
    pub fn merged_with(&self, newer: &Profile) -> Profile {
        let mut test_scores = self.test_scores.clone();
        for (name, score) in &newer.test_scores {
            test_scores.insert(name.clone(), *score);
        }

        let mut certifications = self.certifications.clone();
        certifications.extend(newer.certifications.iter().cloned());

        let source_text = if self.source_text.is_empty() {
            newer.source_text.clone()
        } else if newer.source_text.is_empty() {
            self.source_text.clone()
        } else {
            format!("{}\n{}", self.source_text, newer.source_text)
        };

        Profile {
            target_institution: newer
                .target_institution
                .clone()
                .or_else(|| self.target_institution.clone()),
            target_country: newer
                .target_country
                .clone()
                .or_else(|| self.target_country.clone()),
            field_of_study: newer
                .field_of_study
                .clone()
                .or_else(|| self.field_of_study.clone()),
            gpa: newer.gpa.or(self.gpa),
            test_scores,
            certifications,
            extracurriculars: if newer.extracurriculars.is_empty() {
                self.extracurriculars.clone()
            } else {
                newer.extracurriculars.clone()
            },
            internships: if newer.internships.is_empty() {
                self.internships.clone()
            } else {
                newer.internships.clone()
            },
            source_text,
        }
    }

    /// Structural equality ignoring the provenance text. Used to detect
    /// follow-up turns that carry no new profile information.
    pub fn same_fields(&self, other: &Profile) -> bool {
        self.target_institution == other.target_institution
            && self.target_country == other.target_country
            && self.field_of_study == other.field_of_study
            && self.gpa == other.gpa
            && self.test_scores == other.test_scores
            && self.certifications == other.certifications
            && self.extracurriculars == other.extracurriculars
            && self.internships == other.internships
    }
}
