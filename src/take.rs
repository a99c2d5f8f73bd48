use std::error::Error;
use std::io::{BufRead, Write};

use milestones::models::{TestResult, TestSession};
use milestones::{ChildRegistry, MilestoneError, Orchestrator, TestStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Answer(usize),
    Next,
    Previous,
    Submit,
    Quit,
    Help,
}

impl Command {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim().to_lowercase();
        if let Ok(n) = line.parse::<usize>() {
            return Some(Command::Answer(n));
        }
        match line.as_str() {
            "n" | "next" => Some(Command::Next),
            "p" | "prev" | "previous" => Some(Command::Previous),
            "s" | "submit" => Some(Command::Submit),
            "q" | "quit" | "exit" => Some(Command::Quit),
            "?" | "h" | "help" => Some(Command::Help),
            _ => None,
        }
    }
}

const HELP: &str = "Answer with an option number, or: n(ext), p(revious), s(ubmit), q(uit)";

/// Runs one test session on a line-based terminal. Returns `None` when the
/// user quits without submitting. The session is cleared either way.
pub fn take_interactive<S, R, W>(
    orchestrator: &mut Orchestrator<S>,
    test_id: &str,
    child_id: &str,
    mut input: R,
    mut out: W,
) -> Result<Option<TestResult>, Box<dyn Error>>
where
    S: TestStore + ChildRegistry,
    R: BufRead,
    W: Write,
{
    orchestrator.start_test(test_id, child_id)?;
    let test = orchestrator
        .session_test()
        .cloned()
        .ok_or_else(|| MilestoneError::TestNotFound(test_id.to_string()))?;
    let total = test.question_count();

    writeln!(out, "{} ({} questions)", test.title, total)?;
    writeln!(out, "{}", HELP)?;

    let mut line = String::new();
    loop {
        let session: TestSession = orchestrator.session().active()?.clone();
        let index = session.current_question_index;
        let question = &test.questions[index];
        let previous = session.answer_for(&question.id).map(|a| a.selected_option);

        let answered = orchestrator
            .session()
            .progress(&test)
            .map_or(0, |p| p.answered);

        writeln!(out)?;
        writeln!(
            out,
            "Question {}/{} [{} {}]  answered {}/{}",
            index + 1,
            total,
            question.category.icon(),
            question.category.label(),
            answered,
            total
        )?;
        writeln!(out, "{}", question.text)?;
        for (i, option) in question.options.iter().enumerate() {
            let marker = if previous == Some(i) { "*" } else { " " };
            writeln!(out, " {}{}. {}", marker, i + 1, option)?;
        }
        write!(out, "> ")?;
        out.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            orchestrator.clear_session();
            writeln!(out)?;
            return Ok(None);
        }

        match Command::parse(&line) {
            Some(Command::Answer(n)) if (1..=question.options.len()).contains(&n) => {
                orchestrator.answer_question(&question.id, n - 1)?;
                if index + 1 < total {
                    orchestrator.next_question()?;
                } else if answered + usize::from(previous.is_none()) == total {
                    writeln!(out, "All questions answered. Enter 's' to submit.")?;
                }
            }
            Some(Command::Answer(_)) => {
                writeln!(out, "Choose an option between 1 and {}.", question.options.len())?;
            }
            Some(Command::Next) => {
                orchestrator.next_question()?;
            }
            Some(Command::Previous) => {
                orchestrator.previous_question()?;
            }
            Some(Command::Submit) => match orchestrator.submit_test(child_id) {
                Ok(result) => {
                    orchestrator.clear_session();
                    return Ok(Some(result));
                }
                Err(MilestoneError::Store(e)) => {
                    writeln!(out, "Could not save the result ({}). Enter 's' to retry.", e)?;
                }
                Err(e) => return Err(e.into()),
            },
            Some(Command::Quit) => {
                orchestrator.clear_session();
                return Ok(None);
            }
            Some(Command::Help) | None => {
                writeln!(out, "{}", HELP)?;
            }
        }
    }
}

/// Answers questions in order from `picks` (0-based, `None` skips) and
/// submits.
pub fn take_with_answers<S: TestStore + ChildRegistry>(
    orchestrator: &mut Orchestrator<S>,
    test_id: &str,
    child_id: &str,
    picks: &[Option<usize>],
) -> Result<TestResult, MilestoneError> {
    orchestrator.start_test(test_id, child_id)?;
    let question_ids: Vec<String> = orchestrator
        .session_test()
        .map(|t| t.questions.iter().map(|q| q.id.clone()).collect())
        .unwrap_or_default();

    if picks.len() > question_ids.len() {
        tracing::warn!(
            given = picks.len(),
            questions = question_ids.len(),
            "extra answers ignored"
        );
    }

    for (question_id, pick) in question_ids.iter().zip(picks) {
        if let Some(option) = pick {
            orchestrator.answer_question(question_id, *option)?;
        }
    }

    let result = orchestrator.submit_test(child_id);
    if result.is_ok() {
        orchestrator.clear_session();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use milestones::models::{
        Actor, Category, QuestionDraft, RecommendationDraft, RecommendationStatus, ScoreRange,
        TestDraft, Urgency,
    };
    use milestones::Database;
    use std::io::Cursor;

    fn setup() -> (Orchestrator<Database>, String, String) {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");

        let mut admin = Orchestrator::new(db, Actor::admin("admin"));
        let draft = TestDraft {
            age_in_months: 12,
            title: "12 month milestones".to_string(),
            description: String::new(),
            questions: (0..4)
                .map(|i| QuestionDraft {
                    text: format!("Question {}", i),
                    category: Category::Cognitive,
                    options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    expected_answer_index: i,
                    weight: None,
                })
                .collect(),
            recommendations: vec![
                RecommendationDraft {
                    score_range: ScoreRange::new(0, 59),
                    status: RecommendationStatus::NeedsAttention,
                    title: "Needs attention".to_string(),
                    message: "Practise together".to_string(),
                    tips: vec![],
                    next_steps: None,
                    urgency: Urgency::Medium,
                },
                RecommendationDraft {
                    score_range: ScoreRange::new(60, 100),
                    status: RecommendationStatus::Good,
                    title: "Good".to_string(),
                    message: "On track".to_string(),
                    tips: vec![],
                    next_steps: None,
                    urgency: Urgency::Low,
                },
            ],
        };
        let test_id = admin.create_test(draft).unwrap().item.id;

        let mut parent = Orchestrator::new(admin.into_store(), Actor::parent("parent"));
        parent.refresh_tests().unwrap();
        let child_id = parent
            .add_child("Ada", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
            .unwrap()
            .id;
        (parent, test_id, child_id)
    }

    #[test]
    fn parse_commands() {
        assert_eq!(Command::parse("2\n"), Some(Command::Answer(2)));
        assert_eq!(Command::parse(" N "), Some(Command::Next));
        assert_eq!(Command::parse("prev"), Some(Command::Previous));
        assert_eq!(Command::parse("s"), Some(Command::Submit));
        assert_eq!(Command::parse("quit"), Some(Command::Quit));
        assert_eq!(Command::parse("banana"), None);
    }

    #[test]
    fn interactive_answers_and_submits() {
        let (mut o, test_id, child_id) = setup();
        let input = Cursor::new("1\n2\n4\n4\ns\n");
        let mut out = Vec::new();

        let result = take_interactive(&mut o, &test_id, &child_id, input, &mut out)
            .unwrap()
            .unwrap();
        assert_eq!(result.score, 75);
        assert_eq!(result.recommendation.status, RecommendationStatus::Good);
        assert!(o.session().current().is_none());

        let transcript = String::from_utf8(out).unwrap();
        assert!(transcript.contains("Question 4/4"));
        assert!(transcript.contains("All questions answered"));
    }

    #[test]
    fn interactive_navigation_and_reanswer() {
        let (mut o, test_id, child_id) = setup();
        // Answer q1 wrong, go back, fix it, then submit with the rest unanswered
        let input = Cursor::new("2\np\n1\ns\n");
        let result = take_interactive(&mut o, &test_id, &child_id, input, Vec::new())
            .unwrap()
            .unwrap();
        assert_eq!(result.answers.len(), 1);
        assert_eq!(result.correct_answers, 1);
        assert_eq!(result.score, 25);
    }

    #[test]
    fn interactive_rejects_out_of_range_option() {
        let (mut o, test_id, child_id) = setup();
        let mut out = Vec::new();
        let input = Cursor::new("7\ns\n");
        let result = take_interactive(&mut o, &test_id, &child_id, input, &mut out)
            .unwrap()
            .unwrap();
        assert!(result.answers.is_empty());
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("Choose an option between 1 and 4."));
    }

    #[test]
    fn interactive_quit_stores_nothing() {
        let (mut o, test_id, child_id) = setup();
        let input = Cursor::new("1\nq\n");
        let result = take_interactive(&mut o, &test_id, &child_id, input, Vec::new()).unwrap();
        assert!(result.is_none());
        assert!(o.session().current().is_none());
        assert!(o.results(None).unwrap().is_empty());
    }

    #[test]
    fn interactive_eof_quits() {
        let (mut o, test_id, child_id) = setup();
        let result =
            take_interactive(&mut o, &test_id, &child_id, Cursor::new(""), Vec::new()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn scripted_answers() {
        let (mut o, test_id, child_id) = setup();
        let result =
            take_with_answers(&mut o, &test_id, &child_id, &[Some(0), Some(1), Some(9), Some(3)])
                .unwrap();
        assert_eq!(result.score, 75);

        let result =
            take_with_answers(&mut o, &test_id, &child_id, &[Some(9), Some(9), Some(9), Some(9)])
                .unwrap();
        assert_eq!(result.score, 0);
        assert_eq!(
            result.recommendation.status,
            RecommendationStatus::NeedsAttention
        );
    }

    #[test]
    fn scripted_skips() {
        let (mut o, test_id, child_id) = setup();
        let result =
            take_with_answers(&mut o, &test_id, &child_id, &[Some(0), None, Some(2)]).unwrap();
        assert_eq!(result.answers.len(), 2);
        assert_eq!(result.score, 50);
    }
}
