use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

const ID_LEN: usize = 20;

// Document ids follow the document-store convention: 20 random alphanumerics.
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Parent,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Parent => "parent",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "parent" | "p" => Some(Role::Parent),
            "admin" | "a" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// The caller on whose behalf operations run. Supplied by the identity
/// provider; never verified here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn parent(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Parent,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// Developmental domain a question assesses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Physical,
    Cognitive,
    Emotional,
    Social,
    Language,
    // Legacy or unrecognised values from stored documents
    #[serde(other)]
    Unknown,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Physical,
        Category::Cognitive,
        Category::Emotional,
        Category::Social,
        Category::Language,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Physical => "physical",
            Category::Cognitive => "cognitive",
            Category::Emotional => "emotional",
            Category::Social => "social",
            Category::Language => "language",
            Category::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "physical" | "motor" => Some(Category::Physical),
            "cognitive" => Some(Category::Cognitive),
            "emotional" => Some(Category::Emotional),
            "social" => Some(Category::Social),
            "language" | "speech" => Some(Category::Language),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Physical => "Physical",
            Category::Cognitive => "Cognitive",
            Category::Emotional => "Emotional",
            Category::Social => "Social",
            Category::Language => "Language",
            Category::Unknown => "Unknown",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Category::Physical => "🏃",
            Category::Cognitive => "🧠",
            Category::Emotional => "💗",
            Category::Social => "👥",
            Category::Language => "💬",
            Category::Unknown => "•",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Category::Physical => "blue",
            Category::Cognitive => "purple",
            Category::Emotional => "pink",
            Category::Social => "green",
            Category::Language => "orange",
            Category::Unknown => "gray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Excellent,
    Good,
    NeedsAttention,
    ConsultDoctor,
    #[serde(other)]
    Unknown,
}

impl RecommendationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Excellent => "excellent",
            RecommendationStatus::Good => "good",
            RecommendationStatus::NeedsAttention => "needs_attention",
            RecommendationStatus::ConsultDoctor => "consult_doctor",
            RecommendationStatus::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "excellent" => Some(RecommendationStatus::Excellent),
            "good" => Some(RecommendationStatus::Good),
            "needs_attention" | "attention" => Some(RecommendationStatus::NeedsAttention),
            "consult_doctor" | "doctor" => Some(RecommendationStatus::ConsultDoctor),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RecommendationStatus::Excellent => "Excellent",
            RecommendationStatus::Good => "Good",
            RecommendationStatus::NeedsAttention => "Needs Attention",
            RecommendationStatus::ConsultDoctor => "Consult Doctor",
            RecommendationStatus::Unknown => "Unknown",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            RecommendationStatus::Excellent => "green",
            RecommendationStatus::Good => "blue",
            RecommendationStatus::NeedsAttention => "yellow",
            RecommendationStatus::ConsultDoctor => "red",
            RecommendationStatus::Unknown => "gray",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    #[serde(other)]
    Unknown,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
            Urgency::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" | "l" => Some(Urgency::Low),
            "medium" | "m" => Some(Urgency::Medium),
            "high" | "h" => Some(Urgency::High),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
            Urgency::Unknown => "Unknown",
        }
    }
}

/// Inclusive score range on the 0–100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: u32,
    pub max: u32,
}

impl ScoreRange {
    pub const FULL: ScoreRange = ScoreRange { min: 0, max: 100 };

    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, score: u32) -> bool {
        self.min <= score && score <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub text: String,
    pub category: Category,
    pub options: Vec<String>,
    pub expected_answer_index: usize,
    // Stored for compatibility; scoring is unweighted.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl Question {
    pub fn is_correct(&self, selected_option: usize) -> bool {
        selected_option == self.expected_answer_index
    }

    pub fn expected_option(&self) -> Option<&str> {
        self.options
            .get(self.expected_answer_index)
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub score_range: ScoreRange,
    pub status: RecommendationStatus,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_steps: Option<Vec<String>>,
    pub urgency: Urgency,
}

impl Recommendation {
    pub const FALLBACK_ID: &'static str = "default";

    /// Synthesized when a test carries no recommendations at all.
    pub fn fallback() -> Self {
        Self {
            id: Self::FALLBACK_ID.to_string(),
            score_range: ScoreRange::FULL,
            status: RecommendationStatus::Good,
            title: "Assessment Complete".to_string(),
            message: "The assessment has been completed. Keep following your child's \
                      development and talk to your pediatrician if anything worries you."
                .to_string(),
            tips: vec![],
            next_steps: None,
            urgency: Urgency::Low,
        }
    }
}

// A test template, authored by an administrator for a target age
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub age_in_months: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub recommendations: Vec<Recommendation>,
    pub is_active: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Test {
    pub fn question(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAnswer {
    pub question_id: String,
    pub selected_option: usize,
    pub is_correct: bool,
}

/// An in-progress attempt. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub test_id: String,
    pub child_id: String,
    pub current_question_index: usize,
    pub answers: Vec<TestAnswer>,
    pub started_at: DateTime<Utc>,
    pub is_completed: bool,
}

impl TestSession {
    pub fn answer_for(&self, question_id: &str) -> Option<&TestAnswer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub id: String,
    pub child_id: String,
    pub parent_id: String,
    pub test_id: String,
    pub age_in_months: u32,
    pub answers: Vec<TestAnswer>,
    pub score: u32,
    pub total_questions: usize,
    pub correct_answers: usize,
    // Snapshot taken at submit time; independent of later template edits
    pub recommendation: Recommendation,
    pub submitted_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Child {
    pub id: String,
    pub parent_id: String,
    pub name: String,
    pub birth_date: NaiveDate,
}

impl Child {
    /// Completed months of age on `today`; zero for future birth dates.
    pub fn age_in_months(&self, today: NaiveDate) -> u32 {
        let born = self.birth_date;
        let mut months =
            (today.year() - born.year()) * 12 + today.month() as i32 - born.month() as i32;
        if today.day() < born.day() {
            months -= 1;
        }
        months.max(0) as u32
    }
}

// === Authoring input ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub text: String,
    pub category: Category,
    pub options: Vec<String>,
    pub expected_answer_index: usize,
    #[serde(default)]
    pub weight: Option<u32>,
}

impl QuestionDraft {
    pub fn into_question(self, id: String) -> Question {
        Question {
            id,
            text: self.text,
            category: self.category,
            options: self.options,
            expected_answer_index: self.expected_answer_index,
            weight: self.weight.unwrap_or_else(default_weight),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationDraft {
    pub score_range: ScoreRange,
    pub status: RecommendationStatus,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub next_steps: Option<Vec<String>>,
    #[serde(default = "default_urgency")]
    pub urgency: Urgency,
}

fn default_urgency() -> Urgency {
    Urgency::Low
}

impl RecommendationDraft {
    pub fn into_recommendation(self, id: String) -> Recommendation {
        Recommendation {
            id,
            score_range: self.score_range,
            status: self.status,
            title: self.title,
            message: self.message,
            tips: self.tips,
            next_steps: self.next_steps,
            urgency: self.urgency,
        }
    }
}

/// A full template as authored, e.g. imported from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDraft {
    pub age_in_months: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<QuestionDraft>,
    #[serde(default)]
    pub recommendations: Vec<RecommendationDraft>,
}

// Partial update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub age_in_months: Option<u32>,
    pub is_active: Option<bool>,
}

impl TestUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.age_in_months.is_none()
            && self.is_active.is_none()
    }

    pub fn apply(&self, test: &mut Test) {
        if let Some(title) = &self.title {
            test.title = title.clone();
        }
        if let Some(description) = &self.description {
            test.description = description.clone();
        }
        if let Some(age) = self.age_in_months {
            test.age_in_months = age;
        }
        if let Some(active) = self.is_active {
            test.is_active = active;
        }
    }
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod id_tests {
        use super::*;

        #[test]
        fn generated_ids_are_alphanumeric() {
            let id = generate_id();
            assert_eq!(id.len(), 20);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }

        #[test]
        fn generated_ids_differ() {
            assert_ne!(generate_id(), generate_id());
        }
    }

    mod enum_tests {
        use super::*;

        #[test]
        fn role_from_str() {
            assert_eq!(Role::from_str("admin"), Some(Role::Admin));
            assert_eq!(Role::from_str("PARENT"), Some(Role::Parent));
            assert_eq!(Role::from_str("nurse"), None);
        }

        #[test]
        fn category_from_str_aliases() {
            assert_eq!(Category::from_str("motor"), Some(Category::Physical));
            assert_eq!(Category::from_str("Language"), Some(Category::Language));
            assert_eq!(Category::from_str("unknown"), None);
        }

        #[test]
        fn category_round_trips_through_as_str() {
            for category in Category::ALL {
                assert_eq!(Category::from_str(category.as_str()), Some(category));
            }
        }

        #[test]
        fn legacy_category_decodes_to_unknown() {
            let category: Category = serde_json::from_str("\"fine_motor\"").unwrap();
            assert_eq!(category, Category::Unknown);
            assert_eq!(category.label(), "Unknown");
            assert_eq!(category.color(), "gray");
        }

        #[test]
        fn status_serializes_snake_case() {
            let json = serde_json::to_string(&RecommendationStatus::NeedsAttention).unwrap();
            assert_eq!(json, "\"needs_attention\"");
        }

        #[test]
        fn status_from_str_accepts_dashes() {
            assert_eq!(
                RecommendationStatus::from_str("consult-doctor"),
                Some(RecommendationStatus::ConsultDoctor)
            );
        }

        #[test]
        fn unknown_urgency_decodes_to_unknown() {
            let urgency: Urgency = serde_json::from_str("\"critical\"").unwrap();
            assert_eq!(urgency, Urgency::Unknown);
        }
    }

    mod range_tests {
        use super::*;

        #[test]
        fn contains_is_inclusive() {
            let range = ScoreRange::new(40, 60);
            assert!(range.contains(40));
            assert!(range.contains(60));
            assert!(!range.contains(39));
            assert!(!range.contains(61));
        }

        #[test]
        fn inverted_range_contains_nothing() {
            let range = ScoreRange::new(60, 40);
            assert!(!range.contains(50));
        }
    }

    mod question_tests {
        use super::*;

        #[test]
        fn missing_weight_defaults_to_one() {
            let json = r#"{
                "id": "q1",
                "text": "Does your child wave goodbye?",
                "category": "social",
                "options": ["Yes", "No"],
                "expectedAnswerIndex": 0
            }"#;
            let q: Question = serde_json::from_str(json).unwrap();
            assert_eq!(q.weight, 1);
            assert_eq!(q.expected_option(), Some("Yes"));
        }

        #[test]
        fn is_correct_compares_index() {
            let q = QuestionDraft {
                text: "Stacks two blocks".to_string(),
                category: Category::Physical,
                options: vec!["Yes".into(), "Sometimes".into(), "No".into()],
                expected_answer_index: 1,
                weight: None,
            }
            .into_question("q".to_string());
            assert!(q.is_correct(1));
            assert!(!q.is_correct(0));
            assert_eq!(q.weight, 1);
        }
    }

    mod recommendation_tests {
        use super::*;

        #[test]
        fn fallback_is_good_and_low() {
            let rec = Recommendation::fallback();
            assert_eq!(rec.title, "Assessment Complete");
            assert_eq!(rec.status, RecommendationStatus::Good);
            assert_eq!(rec.urgency, Urgency::Low);
            assert_eq!(rec.score_range, ScoreRange::FULL);
            assert!(rec.tips.is_empty());
        }

        #[test]
        fn draft_urgency_defaults_to_low() {
            let json = r#"{
                "scoreRange": {"min": 0, "max": 59},
                "status": "needs_attention",
                "title": "Keep practising",
                "message": "Some skills are still emerging."
            }"#;
            let draft: RecommendationDraft = serde_json::from_str(json).unwrap();
            let rec = draft.into_recommendation("r1".to_string());
            assert_eq!(rec.urgency, Urgency::Low);
            assert!(rec.next_steps.is_none());
        }
    }

    mod child_tests {
        use super::*;

        fn child_born(y: i32, m: u32, d: u32) -> Child {
            Child {
                id: "c1".to_string(),
                parent_id: "p1".to_string(),
                name: "Ada".to_string(),
                birth_date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            }
        }

        #[test]
        fn age_counts_completed_months() {
            let child = child_born(2025, 1, 15);
            let today = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
            assert_eq!(child.age_in_months(today), 6);
        }

        #[test]
        fn age_before_monthly_anniversary() {
            let child = child_born(2025, 1, 15);
            let today = NaiveDate::from_ymd_opt(2025, 7, 14).unwrap();
            assert_eq!(child.age_in_months(today), 5);
        }

        #[test]
        fn age_across_years() {
            let child = child_born(2023, 11, 1);
            let today = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
            assert_eq!(child.age_in_months(today), 15);
        }

        #[test]
        fn future_birth_date_is_zero() {
            let child = child_born(2030, 1, 1);
            let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
            assert_eq!(child.age_in_months(today), 0);
        }
    }

    mod draft_tests {
        use super::*;

        #[test]
        fn demo_template_parses() {
            let draft: TestDraft =
                serde_json::from_str(include_str!("../demos/12-months.json")).unwrap();
            assert_eq!(draft.age_in_months, 12);
            assert_eq!(draft.questions.len(), 5);
            assert_eq!(draft.recommendations.len(), 3);
            assert_eq!(draft.recommendations[0].urgency, Urgency::High);
            assert!(draft.questions.iter().all(|q| q.weight.is_none()));
        }
    }

    mod update_tests {
        use super::*;

        #[test]
        fn empty_update_detected() {
            assert!(TestUpdate::default().is_empty());
            let update = TestUpdate {
                is_active: Some(false),
                ..Default::default()
            };
            assert!(!update.is_empty());
        }
    }

    mod json_output_tests {
        use super::*;

        #[test]
        fn ok_has_no_error() {
            let out = JsonOutput::ok(3);
            assert!(out.success);
            assert_eq!(out.data, Some(3));
            assert!(out.error.is_none());
        }

        #[test]
        fn err_has_no_data() {
            let out = JsonOutput::<()>::err("boom");
            assert!(!out.success);
            assert!(out.data.is_none());
            assert_eq!(out.error.as_deref(), Some("boom"));
        }
    }
}
