use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::SessionError;
use crate::models::{Test, TestAnswer, TestSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NoSession,
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub answered: usize,
    pub total: usize,
    pub current_question_index: usize,
}

/// Holds at most one test attempt. Owned by whoever drives the UI and
/// passed around explicitly; starting a new attempt discards the old one.
#[derive(Debug, Default)]
pub struct SessionManager {
    current: Option<TestSession>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&TestSession> {
        self.current.as_ref()
    }

    pub fn state(&self) -> SessionState {
        match &self.current {
            None => SessionState::NoSession,
            Some(s) if s.is_completed => SessionState::Completed,
            Some(_) => SessionState::Active,
        }
    }

    pub fn start(&mut self, test: &Test, child_id: &str) -> &TestSession {
        self.start_at(test, child_id, Utc::now())
    }

    pub fn start_at(&mut self, test: &Test, child_id: &str, now: DateTime<Utc>) -> &TestSession {
        if let (SessionState::Active, Some(previous)) = (self.state(), &self.current) {
            tracing::info!(
                test_id = %previous.test_id,
                answered = previous.answers.len(),
                "discarding unfinished session"
            );
        }

        self.current.insert(TestSession {
            test_id: test.id.clone(),
            child_id: child_id.to_string(),
            current_question_index: 0,
            answers: Vec::new(),
            started_at: now,
            is_completed: false,
        })
    }

    /// Records an answer, replacing any earlier answer to the same question.
    ///
    /// Returns `Ok(None)` when `question_id` is not part of `test`; such
    /// answers are dropped so that a template edited mid-session cannot
    /// break the attempt.
    pub fn answer_question(
        &mut self,
        test: &Test,
        question_id: &str,
        selected_option: usize,
    ) -> Result<Option<&TestAnswer>, SessionError> {
        let session = self.active_mut()?;

        let Some(question) = test.question(question_id) else {
            tracing::warn!(test_id = %test.id, question_id, "ignoring answer to unknown question");
            return Ok(None);
        };

        let answer = TestAnswer {
            question_id: question.id.clone(),
            selected_option,
            is_correct: question.is_correct(selected_option),
        };

        let idx = match session
            .answers
            .iter()
            .position(|a| a.question_id == answer.question_id)
        {
            Some(idx) => {
                session.answers[idx] = answer;
                idx
            }
            None => {
                session.answers.push(answer);
                session.answers.len() - 1
            }
        };

        Ok(Some(&session.answers[idx]))
    }

    pub fn mark_completed(&mut self) -> Result<(), SessionError> {
        self.active_mut()?.is_completed = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn next_question(&mut self, question_count: usize) -> Result<usize, SessionError> {
        let current = self.active()?.current_question_index;
        self.go_to_question(current.saturating_add(1), question_count)
    }

    pub fn previous_question(&mut self, question_count: usize) -> Result<usize, SessionError> {
        let current = self.active()?.current_question_index;
        self.go_to_question(current.saturating_sub(1), question_count)
    }

    /// Moves the question pointer, clamped to the test's questions.
    pub fn go_to_question(
        &mut self,
        index: usize,
        question_count: usize,
    ) -> Result<usize, SessionError> {
        let session = self.active_mut()?;
        session.current_question_index = index.min(question_count.saturating_sub(1));
        Ok(session.current_question_index)
    }

    pub fn progress(&self, test: &Test) -> Option<SessionProgress> {
        self.current.as_ref().map(|s| SessionProgress {
            answered: s
                .answers
                .iter()
                .filter(|a| test.question(&a.question_id).is_some())
                .count(),
            total: test.question_count(),
            current_question_index: s.current_question_index,
        })
    }

    /// The session, provided it is still open for answers or submission.
    pub fn active(&self) -> Result<&TestSession, SessionError> {
        match &self.current {
            None => Err(SessionError::NoActiveSession),
            Some(s) if s.is_completed => Err(SessionError::SessionCompleted),
            Some(s) => Ok(s),
        }
    }

    fn active_mut(&mut self) -> Result<&mut TestSession, SessionError> {
        match &mut self.current {
            None => Err(SessionError::NoActiveSession),
            Some(s) if s.is_completed => Err(SessionError::SessionCompleted),
            Some(s) => Ok(s),
        }
    }
}
