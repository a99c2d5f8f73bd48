//! Percentage scoring of a test attempt.
//!
//! Every question counts once. `Question::weight` is carried in the data
//! model but not applied here; weighted scoring would change historical
//! results and is left unimplemented.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::ScoringError;
use crate::models::{Test, TestAnswer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Score {
    pub correct_count: usize,
    pub total_questions: usize,
    pub percentage: u32,
}

/// Scores `answers` against the full question set of `test`.
///
/// Unanswered questions count as incorrect, and answers whose question is
/// no longer part of the test are ignored. Fails for a test without
/// questions.
pub fn score(test: &Test, answers: &[TestAnswer]) -> Result<Score, ScoringError> {
    let total_questions = test.questions.len();
    if total_questions == 0 {
        return Err(ScoringError::NoQuestions {
            test_id: test.id.clone(),
        });
    }

    let known: HashSet<&str> = test.questions.iter().map(|q| q.id.as_str()).collect();
    let correct_count = answers
        .iter()
        .filter(|a| a.is_correct && known.contains(a.question_id.as_str()))
        .count()
        .min(total_questions);

    Ok(Score {
        correct_count,
        total_questions,
        percentage: percentage(correct_count, total_questions),
    })
}

// round(100 * correct / total) with halves rounded up, in integers
fn percentage(correct: usize, total: usize) -> u32 {
    ((200 * correct + total) / (2 * total)) as u32
}
