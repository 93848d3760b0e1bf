//! Best-effort extraction of a structured [`Profile`] from free-form text.
//!
//! Extraction never fails: anything the patterns cannot pick up simply stays
//! absent, and the raw message text is always retained on the profile.

use regex::Regex;
use std::sync::OnceLock;

use crate::profile::{Gpa, Profile};

/// Parse `raw_text` into a [`Profile`], merging over `prior` when supplied.
pub fn normalize(raw_text: &str, prior: Option<&Profile>) -> Profile {
    let mut extracted = Profile::from_raw(raw_text);

    extracted.target_institution = extract_institution(raw_text);
    extracted.target_country = extract_country(raw_text);
    extracted.field_of_study = extract_field(raw_text);
    extracted.gpa = extract_gpa(raw_text);
    extract_test_scores(raw_text, &mut extracted);
    extract_certifications(raw_text, &mut extracted);
    extract_activities(raw_text, &mut extracted);

    match prior {
        Some(prior) => prior.merged_with(&extracted),
        None => extracted,
    }
}

fn re(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

fn extract_institution(text: &str) -> Option<String> {
    static OF_FORM: OnceLock<Regex> = OnceLock::new();
    static NAMED_FORM: OnceLock<Regex> = OnceLock::new();
    static ACRONYMS: OnceLock<Regex> = OnceLock::new();

    if let Some(m) = re(
        &OF_FORM,
        r"\b(?:University|Institute|College) of [A-Z][A-Za-z]+(?: [A-Z][A-Za-z]+){0,3}",
    )
    .find(text)
    {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = re(
        &NAMED_FORM,
        r"\b[A-Z][A-Za-z&.'-]+(?: [A-Z][A-Za-z&.'-]+){0,3} (?:University|College|Institute|Polytechnic)\b",
    )
    .find(text)
    {
        return Some(m.as_str().to_string());
    }
    re(
        &ACRONYMS,
        r"\b(NUS|NTU|MIT|UBC|UCL|LSE|KAIST|HKUST|NYU|UCLA|Caltech|ETH Zurich)\b",
    )
    .find(text)
    .map(|m| m.as_str().to_string())
}

fn extract_country(text: &str) -> Option<String> {
    static COUNTRIES: OnceLock<Regex> = OnceLock::new();
    static UK_SHORT: OnceLock<Regex> = OnceLock::new();

    let found = re(
        &COUNTRIES,
        r"(?i)\b(singapore|canada|united states|usa|united kingdom|australia|germany|netherlands|france|japan|south korea|switzerland|ireland|sweden)\b",
    )
    .find(text)
    .map(|m| m.as_str().to_lowercase());

    let canonical = match found.as_deref() {
        Some("usa") => Some("United States"),
        Some(name) => return Some(title_case(name)),
        None => None,
    };
    if let Some(name) = canonical {
        return Some(name.to_string());
    }

    // "UK" only counts when written in capitals; lowercase "uk" shows up
    // inside too many ordinary words.
    re(&UK_SHORT, r"\bU\.?K\.?\b")
        .find(text)
        .map(|_| "United Kingdom".to_string())
}

fn extract_field(text: &str) -> Option<String> {
    static FIELDS: OnceLock<Regex> = OnceLock::new();
    re(
        &FIELDS,
        r"(?i)\b(computer science|data science|software engineering|electrical engineering|mechanical engineering|civil engineering|biomedical engineering|engineering|business administration|business|economics|finance|medicine|law|psychology|biology|chemistry|physics|mathematics|architecture|design|nursing|education)\b",
    )
    .find(text)
    .map(|m| title_case(m.as_str()))
}

fn extract_gpa(text: &str) -> Option<Gpa> {
    static LABELED: OnceLock<Regex> = OnceLock::new();
    static BARE_RATIO: OnceLock<Regex> = OnceLock::new();

    if let Some(caps) = re(
        &LABELED,
        r"(?i)\bGPA\b[^0-9]{0,12}([0-9]+(?:\.[0-9]+)?)\s*(?:/\s*([0-9]+(?:\.[0-9]+)?))?",
    )
    .captures(text)
    {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let scale = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_else(|| infer_scale(value));
        return Some(Gpa::new(value, scale));
    }

    re(
        &BARE_RATIO,
        r"\b([0-9]+(?:\.[0-9]+)?)\s*/\s*(4\.0|4\.3|4|5|10|20|100)\b",
    )
    .captures(text)
    .and_then(|caps| {
        let value: f64 = caps.get(1)?.as_str().parse().ok()?;
        let scale: f64 = caps.get(2)?.as_str().parse().ok()?;
        (value <= scale).then(|| Gpa::new(value, scale))
    })
}

fn infer_scale(value: f64) -> f64 {
    if value <= 4.3 {
        4.0
    } else if value <= 5.0 {
        5.0
    } else if value <= 10.0 {
        10.0
    } else {
        100.0
    }
}

fn extract_test_scores(text: &str, profile: &mut Profile) {
    static TESTS: OnceLock<Regex> = OnceLock::new();
    let pattern = re(
        &TESTS,
        r"(?i)\b(SAT|ACT|GRE|GMAT|TOEFL|IELTS|PTE|DUOLINGO)\b[^0-9]{0,12}([0-9]{1,4}(?:\.[0-9]+)?)",
    );
    for caps in pattern.captures_iter(text) {
        let name = caps[1].to_uppercase();
        let Ok(score) = caps[2].parse::<f64>() else {
            continue;
        };
        if score <= max_score_for(&name) {
            profile.test_scores.entry(name).or_insert(score);
        }
    }
}

fn max_score_for(test: &str) -> f64 {
    match test {
        "IELTS" => 9.0,
        "TOEFL" => 120.0,
        "SAT" => 1600.0,
        "ACT" => 36.0,
        "GRE" => 340.0,
        "GMAT" => 805.0,
        "PTE" => 90.0,
        "DUOLINGO" => 160.0,
        _ => f64::MAX,
    }
}

fn extract_certifications(text: &str, profile: &mut Profile) {
    static CERTS: OnceLock<Regex> = OnceLock::new();
    let pattern = re(
        &CERTS,
        r"(?i)\b(AP [A-Z][A-Za-z]+(?: [A-Z][A-Za-z]+)?|IB Diploma|A-Levels?|AWS Certified [A-Za-z ]+|CFA|ACCA|PMP|DELF|DALF|HSK [1-6]|JLPT N[1-5])\b",
    );
    for caps in pattern.captures_iter(text) {
        profile.certifications.insert(caps[1].trim().to_string());
    }
}

const INTERNSHIP_HINTS: &[&str] = &[
    "intern",
    "work experience",
    "part-time",
    "research assistant",
    "worked at",
    "employment",
];

const ACTIVITY_HINTS: &[&str] = &[
    "club",
    "volunteer",
    "charity",
    "president",
    "lead",
    "captain",
    "olympiad",
    "society",
    "debate",
    "hackathon",
    "ngo",
    "community",
    "competition",
    "orchestra",
    "sport",
];

fn extract_activities(text: &str, profile: &mut Profile) {
    for clause in text.split(['.', ';', '\n', '!', '?', '•']) {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        let lower = clause.to_lowercase();
        if mentions(&lower, INTERNSHIP_HINTS) {
            profile.internships.push(clause.to_string());
        } else if mentions(&lower, ACTIVITY_HINTS) {
            profile.extracurriculars.push(clause.to_string());
        }
    }
}

/// Word-prefix match so that "lead" catches "leadership" but not "deadline".
/// Multi-word hints fall back to a plain substring check.
fn mentions(lower: &str, hints: &[&str]) -> bool {
    hints.iter().any(|hint| {
        if hint.contains(' ') {
            lower.contains(hint)
        } else {
            lower
                .split_whitespace()
                .any(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).starts_with(hint))
        }
    })
}

fn title_case(words: &str) -> String {
    words
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
