//! Display view of a stored result.
//!
//! A result is a self-contained snapshot. The template only adds question
//! texts and the per-category breakdown, so a missing or edited template
//! degrades the report instead of failing it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Category, Recommendation, Test, TestResult};

pub const UNKNOWN_TEST: &str = "Unknown test";
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBreakdown {
    pub category: Category,
    pub label: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub correct: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerLine {
    pub question_id: String,
    pub question: String,
    pub category: &'static str,
    pub selected: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultReport {
    pub result_id: String,
    pub test_id: String,
    pub test_title: String,
    pub template_available: bool,
    pub score: u32,
    pub correct_answers: usize,
    pub total_questions: usize,
    pub status: &'static str,
    pub status_color: &'static str,
    pub recommendation: Recommendation,
    pub categories: Vec<CategoryBreakdown>,
    pub answers: Vec<AnswerLine>,
    pub completed_at: DateTime<Utc>,
}

pub fn build_report(result: &TestResult, template: Option<&Test>) -> ResultReport {
    let answers = result
        .answers
        .iter()
        .map(|answer| {
            let question = template.and_then(|t| t.question(&answer.question_id));
            AnswerLine {
                question_id: answer.question_id.clone(),
                question: question
                    .map(|q| q.text.clone())
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                category: question.map_or(UNKNOWN_LABEL, |q| q.category.label()),
                selected: question
                    .and_then(|q| q.options.get(answer.selected_option))
                    .cloned()
                    .unwrap_or_else(|| format!("Option {}", answer.selected_option + 1)),
                is_correct: answer.is_correct,
            }
        })
        .collect();

    ResultReport {
        result_id: result.id.clone(),
        test_id: result.test_id.clone(),
        test_title: template.map_or_else(|| UNKNOWN_TEST.to_string(), |t| t.title.clone()),
        template_available: template.is_some(),
        score: result.score,
        correct_answers: result.correct_answers,
        total_questions: result.total_questions,
        status: result.recommendation.status.label(),
        status_color: result.recommendation.status.color(),
        recommendation: result.recommendation.clone(),
        categories: template
            .map(|t| category_breakdown(result, t))
            .unwrap_or_default(),
        answers,
        completed_at: result.completed_at,
    }
}

/// Correct answers per developmental category, in category order.
/// Answers to questions the template no longer has are left out.
pub fn category_breakdown(result: &TestResult, template: &Test) -> Vec<CategoryBreakdown> {
    let mut tally: BTreeMap<Category, (usize, usize)> = BTreeMap::new();
    for question in &template.questions {
        tally.entry(question.category).or_default().1 += 1;
    }
    for answer in result.answers.iter().filter(|a| a.is_correct) {
        if let Some(question) = template.question(&answer.question_id) {
            tally.entry(question.category).or_default().0 += 1;
        }
    }

    tally
        .into_iter()
        .map(|(category, (correct, total))| CategoryBreakdown {
            category,
            label: category.label(),
            icon: category.icon(),
            color: category.color(),
            correct,
            total,
        })
        .collect()
}
