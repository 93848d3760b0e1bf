//! Static reference data the analysis stages score against: the scholarship
//! catalog, per-country cost tables, and institution-to-country hints.
//!
//! Figures are planning-grade estimates in USD, not live quotes; every stage
//! that uses them says so in its output assumptions.

/// One scholarship the matcher can recommend.
pub struct ScholarshipSpec {
    pub name: &'static str,
    /// Country the award is tied to, or "Any".
    pub host_country: &'static str,
    /// Lowercase field keywords; empty means open to all fields.
    pub fields: &'static [&'static str],
    /// Minimum GPA on the 4.0 scale; 0.0 means no requirement.
    pub min_gpa: f64,
    /// Required standardized tests and minimum scores.
    pub required_tests: &'static [(&'static str, f64)],
    pub values_extracurriculars: bool,
    pub values_internships: bool,
    /// Typical annual award value.
    pub award_usd: f64,
}

static CATALOG: [ScholarshipSpec; 10] = [
    ScholarshipSpec {
        name: "Global Merit Scholarship",
        host_country: "Any",
        fields: &[],
        min_gpa: 3.7,
        required_tests: &[("SAT", 1450.0)],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 25000.0,
    },
    ScholarshipSpec {
        name: "ASEAN Undergraduate Scholarship",
        host_country: "Singapore",
        fields: &[],
        min_gpa: 3.6,
        required_tests: &[("IELTS", 6.5)],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 18000.0,
    },
    ScholarshipSpec {
        name: "Science & Technology Excellence Award",
        host_country: "Any",
        fields: &[
            "computer science",
            "data science",
            "software engineering",
            "engineering",
            "physics",
            "mathematics",
        ],
        min_gpa: 3.5,
        required_tests: &[("SAT", 1400.0)],
        values_extracurriculars: false,
        values_internships: true,
        award_usd: 20000.0,
    },
    ScholarshipSpec {
        name: "Commonwealth Shared Scholarship",
        host_country: "United Kingdom",
        fields: &[],
        min_gpa: 3.4,
        required_tests: &[("IELTS", 6.5)],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 22000.0,
    },
    ScholarshipSpec {
        name: "DAAD Study Grant",
        host_country: "Germany",
        fields: &[],
        min_gpa: 3.2,
        required_tests: &[],
        values_extracurriculars: false,
        values_internships: true,
        award_usd: 10000.0,
    },
    ScholarshipSpec {
        name: "Maple Leaf International Entrance Scholarship",
        host_country: "Canada",
        fields: &[],
        min_gpa: 3.5,
        required_tests: &[("IELTS", 6.5)],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 15000.0,
    },
    ScholarshipSpec {
        name: "STEM Leadership Award",
        host_country: "Any",
        fields: &[
            "computer science",
            "data science",
            "engineering",
            "biology",
            "chemistry",
            "physics",
            "mathematics",
        ],
        min_gpa: 3.3,
        required_tests: &[],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 12000.0,
    },
    ScholarshipSpec {
        name: "Future Innovators Bursary",
        host_country: "Any",
        fields: &[],
        min_gpa: 2.8,
        required_tests: &[],
        values_extracurriculars: false,
        values_internships: false,
        award_usd: 8000.0,
    },
    ScholarshipSpec {
        name: "Global Citizen Community Award",
        host_country: "Any",
        fields: &[],
        min_gpa: 3.0,
        required_tests: &[],
        values_extracurriculars: true,
        values_internships: false,
        award_usd: 9000.0,
    },
    ScholarshipSpec {
        name: "Research Apprentice Fellowship",
        host_country: "Any",
        fields: &[
            "computer science",
            "data science",
            "engineering",
            "biology",
            "physics",
            "mathematics",
        ],
        min_gpa: 3.4,
        required_tests: &[("GRE", 310.0)],
        values_extracurriculars: false,
        values_internships: true,
        award_usd: 16000.0,
    },
];

pub fn scholarship_catalog() -> &'static [ScholarshipSpec] {
    &CATALOG
}

static COUNTRY_TUITION_USD: [(&str, f64); 13] = [
    ("united states", 35000.0),
    ("canada", 25000.0),
    ("united kingdom", 30000.0),
    ("australia", 28000.0),
    ("germany", 8000.0),
    ("netherlands", 12000.0),
    ("france", 10000.0),
    ("singapore", 20000.0),
    ("japan", 15000.0),
    ("south korea", 12000.0),
    ("switzerland", 17000.0),
    ("ireland", 14000.0),
    ("sweden", 13000.0),
];

const DEFAULT_TUITION_USD: f64 = 25000.0;
const DEFAULT_LIVING_USD: f64 = 12000.0;

pub fn base_tuition_usd(country: &str) -> f64 {
    let country = country.to_lowercase();
    COUNTRY_TUITION_USD
        .iter()
        .find(|(name, _)| country.contains(name))
        .map(|(_, cost)| *cost)
        .unwrap_or(DEFAULT_TUITION_USD)
}

pub fn field_multiplier(field: &str) -> f64 {
    let field = field.to_lowercase();
    let table: [(&str, f64); 9] = [
        ("medicine", 1.5),
        ("mba", 1.4),
        ("law", 1.3),
        ("business", 1.2),
        ("engineering", 1.1),
        ("computer science", 1.1),
        ("arts", 0.9),
        ("humanities", 0.9),
        ("education", 0.8),
    ];
    table
        .iter()
        .find(|(name, _)| field.contains(name))
        .map(|(_, multiplier)| *multiplier)
        .unwrap_or(1.0)
}

/// Annual living costs. Cities are checked before countries so "London"
/// beats the United Kingdom baseline.
pub fn living_cost_usd(location: &str) -> f64 {
    let location = location.to_lowercase();
    let table: [(&str, f64); 20] = [
        ("new york", 20000.0),
        ("california", 18000.0),
        ("london", 15000.0),
        ("sydney", 20000.0),
        ("toronto", 15000.0),
        ("vancouver", 16000.0),
        ("tokyo", 15000.0),
        ("united states", 15000.0),
        ("canada", 12000.0),
        ("united kingdom", 12000.0),
        ("australia", 18000.0),
        ("germany", 10000.0),
        ("netherlands", 11000.0),
        ("france", 9000.0),
        ("singapore", 14000.0),
        ("japan", 12000.0),
        ("south korea", 10000.0),
        ("switzerland", 22000.0),
        ("ireland", 13000.0),
        ("sweden", 12000.0),
    ];
    table
        .iter()
        .find(|(name, _)| location.contains(name))
        .map(|(_, cost)| *cost)
        .unwrap_or(DEFAULT_LIVING_USD)
}

/// Typical annual (grant, loan) support available to international students.
pub fn government_support_usd(country: &str) -> (f64, f64) {
    let country = country.to_lowercase();
    let table: [(&str, (f64, f64)); 7] = [
        ("united states", (6000.0, 12000.0)),
        ("canada", (3000.0, 8000.0)),
        ("united kingdom", (0.0, 10000.0)),
        ("australia", (0.0, 7000.0)),
        ("germany", (500.0, 5000.0)),
        ("france", (400.0, 4000.0)),
        ("netherlands", (300.0, 6000.0)),
    ];
    table
        .iter()
        .find(|(name, _)| country.contains(name))
        .map(|(_, support)| *support)
        .unwrap_or((0.0, 0.0))
}

/// Country a well-known institution sits in, for profiles that name a school
/// but not a country.
pub fn institution_country(institution: &str) -> Option<&'static str> {
    let institution = institution.to_lowercase();
    let table: [(&str, &str); 14] = [
        ("nus", "Singapore"),
        ("ntu", "Singapore"),
        ("nanyang", "Singapore"),
        ("mit", "United States"),
        ("caltech", "United States"),
        ("nyu", "United States"),
        ("toronto", "Canada"),
        ("ubc", "Canada"),
        ("ucla", "United States"),
        ("ucl", "United Kingdom"),
        ("lse", "United Kingdom"),
        ("eth", "Switzerland"),
        ("kaist", "South Korea"),
        ("oxford", "United Kingdom"),
    ];
    table
        .iter()
        .find(|(name, _)| institution.contains(name))
        .map(|(_, country)| *country)
}

/// The `n` lowest-tuition destinations, excluding the student's current
/// target. Used by the contingency planner.
pub fn cheapest_alternatives(exclude: Option<&str>, n: usize) -> Vec<(&'static str, f64)> {
    let exclude = exclude.map(str::to_lowercase);
    let mut countries: Vec<(&'static str, f64)> = COUNTRY_TUITION_USD.to_vec();
    countries.sort_by(|a, b| a.1.total_cmp(&b.1));
    countries
        .into_iter()
        .filter(|(name, _)| exclude.as_deref() != Some(*name))
        .take(n)
        .collect()
}
