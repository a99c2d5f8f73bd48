use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScoringError {
    #[error("Test {test_id} has no questions to score")]
    NoQuestions { test_id: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("No active test session")]
    NoActiveSession,

    #[error("Test session is already completed")]
    SessionCompleted,

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Test {0} has no questions")]
    EmptyTest(String),

    #[error("Session belongs to child {expected}, not {actual}")]
    ChildMismatch { expected: String, actual: String },
}

#[derive(Error, Debug)]
pub enum MilestoneError {
    #[error("Only administrators may {0}")]
    Forbidden(&'static str),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Test not found: {0}")]
    TestNotFound(String),

    #[error("Question not found: {0}")]
    QuestionNotFound(String),

    #[error("Recommendation not found: {0}")]
    RecommendationNotFound(String),

    #[error("Result not found: {0}")]
    ResultNotFound(String),

    #[error("Child not found: {0}")]
    ChildNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

pub type Result<T, E = MilestoneError> = std::result::Result<T, E>;
