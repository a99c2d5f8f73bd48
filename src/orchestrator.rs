//! Composition root for milestone tests: template authoring, the current
//! test session, scoring and result history.

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::error::{MilestoneError, Result, SessionError, StoreError};
use crate::models::{
    generate_id, Actor, Category, Child, Question, QuestionDraft, Recommendation,
    RecommendationDraft, RecommendationStatus, Test, TestAnswer, TestDraft, TestResult,
    TestSession, TestUpdate, Urgency,
};
use crate::recommend::{match_recommendation, validate_ranges, RangeWarning};
use crate::report::{build_report, ResultReport};
use crate::scoring;
use crate::session::SessionManager;
use crate::store::{ChildRegistry, TestStore};

/// Outcome of an authoring operation. Range warnings never block a save.
#[derive(Debug, Clone, Serialize)]
pub struct Authored<T: Serialize> {
    pub item: T,
    pub warnings: Vec<RangeWarning>,
}

pub struct Orchestrator<S> {
    store: S,
    actor: Actor,
    // Latest snapshot of active templates, youngest target age first
    tests: Vec<Test>,
    session: SessionManager,
}

// Logs store failures where they cross into the orchestrator
fn logged<T>(operation: &'static str, result: std::result::Result<T, StoreError>) -> Result<T> {
    result.map_err(|e| {
        tracing::error!(operation, error = %e, "store operation failed");
        MilestoneError::Store(e)
    })
}

impl<S: TestStore + ChildRegistry> Orchestrator<S> {
    pub fn new(store: S, actor: Actor) -> Self {
        Self {
            store,
            actor,
            tests: Vec::new(),
            session: SessionManager::new(),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Reloads the active templates from the store. On failure the previous
    /// snapshot stays in place.
    pub fn refresh_tests(&mut self) -> Result<&[Test]> {
        self.tests = logged("list_tests", self.store.list_tests(true))?;
        Ok(&self.tests)
    }

    pub fn active_tests(&self) -> &[Test] {
        &self.tests
    }

    /// Every template including deactivated ones. Admin only.
    pub fn all_tests(&self) -> Result<Vec<Test>> {
        self.require_admin("list inactive tests")?;
        logged("list_tests", self.store.list_tests(false))
    }

    /// Looks a template up by id, active or not.
    pub fn find_test(&self, id: &str) -> Result<Option<Test>> {
        logged("get_test", self.store.get_test(id))
    }

    fn require_admin(&self, action: &'static str) -> Result<()> {
        if self.actor.is_admin() {
            Ok(())
        } else {
            tracing::warn!(actor = %self.actor.id, action, "rejected non-admin authoring");
            Err(MilestoneError::Forbidden(action))
        }
    }

    fn snapshot_test(&self, id: &str) -> Option<&Test> {
        self.tests.iter().find(|t| t.id == id)
    }

    // Mirrors a successful write into the snapshot
    fn apply_to_snapshot(&mut self, test: &Test) {
        self.tests.retain(|t| t.id != test.id);
        if test.is_active {
            self.tests.push(test.clone());
            self.tests
                .sort_by(|a, b| (a.age_in_months, a.created_at).cmp(&(b.age_in_months, b.created_at)));
        }
    }

    fn load_for_edit(&self, test_id: &str) -> Result<Test> {
        logged("get_test", self.store.get_test(test_id))?
            .ok_or_else(|| MilestoneError::TestNotFound(test_id.to_string()))
    }

    fn save(&mut self, mut test: Test) -> Result<Test> {
        test.updated_at = Utc::now();
        if !logged("update_test", self.store.update_test(&test))? {
            return Err(MilestoneError::TestNotFound(test.id));
        }
        self.apply_to_snapshot(&test);
        Ok(test)
    }

    fn range_warnings(test: &Test) -> Vec<RangeWarning> {
        let warnings = validate_ranges(&test.recommendations);
        for warning in &warnings {
            tracing::warn!(test_id = %test.id, %warning, "recommendation ranges");
        }
        warnings
    }

    // === Authoring ===

    pub fn create_test(&mut self, draft: TestDraft) -> Result<Authored<Test>> {
        self.require_admin("create tests")?;
        validate_title(&draft.title)?;
        for question in &draft.questions {
            validate_question(question)?;
        }
        for rec in &draft.recommendations {
            validate_recommendation(rec)?;
        }

        let now = Utc::now();
        let test = Test {
            id: generate_id(),
            age_in_months: draft.age_in_months,
            title: draft.title.trim().to_string(),
            description: draft.description,
            questions: draft
                .questions
                .into_iter()
                .map(|q| q.into_question(generate_id()))
                .collect(),
            recommendations: draft
                .recommendations
                .into_iter()
                .map(|r| r.into_recommendation(generate_id()))
                .collect(),
            is_active: true,
            created_by: self.actor.id.clone(),
            created_at: now,
            updated_at: now,
        };

        logged("create_test", self.store.create_test(&test))?;
        self.apply_to_snapshot(&test);
        tracing::info!(test_id = %test.id, age = test.age_in_months, "test created");

        let warnings = Self::range_warnings(&test);
        Ok(Authored {
            item: test,
            warnings,
        })
    }

    pub fn update_test(&mut self, test_id: &str, update: TestUpdate) -> Result<Test> {
        self.require_admin("edit tests")?;
        if let Some(title) = &update.title {
            validate_title(title)?;
        }

        let mut test = self.load_for_edit(test_id)?;
        update.apply(&mut test);
        let test = self.save(test)?;
        tracing::info!(test_id, "test updated");
        Ok(test)
    }

    /// Soft delete: the template stays readable for historical results.
    pub fn delete_test(&mut self, test_id: &str) -> Result<Test> {
        self.require_admin("delete tests")?;
        let mut test = self.load_for_edit(test_id)?;
        test.is_active = false;
        let test = self.save(test)?;
        tracing::info!(test_id, "test deactivated");
        Ok(test)
    }

    pub fn add_question(&mut self, test_id: &str, draft: QuestionDraft) -> Result<Question> {
        self.require_admin("edit questions")?;
        validate_question(&draft)?;

        let mut test = self.load_for_edit(test_id)?;
        let question = draft.into_question(generate_id());
        test.questions.push(question.clone());
        self.save(test)?;
        tracing::info!(test_id, question_id = %question.id, "question added");
        Ok(question)
    }

    pub fn update_question(
        &mut self,
        test_id: &str,
        question_id: &str,
        draft: QuestionDraft,
    ) -> Result<Question> {
        self.require_admin("edit questions")?;
        validate_question(&draft)?;

        let mut test = self.load_for_edit(test_id)?;
        let slot = test
            .questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| MilestoneError::QuestionNotFound(question_id.to_string()))?;
        *slot = draft.into_question(question_id.to_string());
        let question = slot.clone();
        self.save(test)?;
        Ok(question)
    }

    pub fn remove_question(&mut self, test_id: &str, question_id: &str) -> Result<()> {
        self.require_admin("edit questions")?;
        let mut test = self.load_for_edit(test_id)?;
        let before = test.questions.len();
        test.questions.retain(|q| q.id != question_id);
        if test.questions.len() == before {
            return Err(MilestoneError::QuestionNotFound(question_id.to_string()));
        }
        self.save(test)?;
        tracing::info!(test_id, question_id, "question removed");
        Ok(())
    }

    /// Appends a recommendation. List order decides overlapping ranges, so
    /// new entries always go last.
    pub fn add_recommendation(
        &mut self,
        test_id: &str,
        draft: RecommendationDraft,
    ) -> Result<Authored<Recommendation>> {
        self.require_admin("edit recommendations")?;
        validate_recommendation(&draft)?;

        let mut test = self.load_for_edit(test_id)?;
        let rec = draft.into_recommendation(generate_id());
        test.recommendations.push(rec.clone());
        let test = self.save(test)?;
        Ok(Authored {
            item: rec,
            warnings: Self::range_warnings(&test),
        })
    }

    /// Edits in place, keeping the entry's position in the list.
    pub fn update_recommendation(
        &mut self,
        test_id: &str,
        recommendation_id: &str,
        draft: RecommendationDraft,
    ) -> Result<Authored<Recommendation>> {
        self.require_admin("edit recommendations")?;
        validate_recommendation(&draft)?;

        let mut test = self.load_for_edit(test_id)?;
        let slot = test
            .recommendations
            .iter_mut()
            .find(|r| r.id == recommendation_id)
            .ok_or_else(|| MilestoneError::RecommendationNotFound(recommendation_id.to_string()))?;
        *slot = draft.into_recommendation(recommendation_id.to_string());
        let rec = slot.clone();
        let test = self.save(test)?;
        Ok(Authored {
            item: rec,
            warnings: Self::range_warnings(&test),
        })
    }

    pub fn remove_recommendation(
        &mut self,
        test_id: &str,
        recommendation_id: &str,
    ) -> Result<Vec<RangeWarning>> {
        self.require_admin("edit recommendations")?;
        let mut test = self.load_for_edit(test_id)?;
        let before = test.recommendations.len();
        test.recommendations.retain(|r| r.id != recommendation_id);
        if test.recommendations.len() == before {
            return Err(MilestoneError::RecommendationNotFound(
                recommendation_id.to_string(),
            ));
        }
        let test = self.save(test)?;
        Ok(Self::range_warnings(&test))
    }

    // === Test session ===

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The template behind the current session, if it is still loaded.
    pub fn session_test(&self) -> Option<&Test> {
        self.session
            .current()
            .and_then(|s| self.snapshot_test(&s.test_id))
    }

    pub fn start_test(&mut self, test_id: &str, child_id: &str) -> Result<&TestSession> {
        let child = self.own_child(child_id)?;
        let test = self
            .tests
            .iter()
            .find(|t| t.id == test_id)
            .ok_or_else(|| SessionError::TestNotFound(test_id.to_string()))?;
        if test.questions.is_empty() {
            return Err(SessionError::EmptyTest(test_id.to_string()).into());
        }

        tracing::info!(test_id, child_id, "test session started");
        Ok(self.session.start(test, &child.id))
    }

    pub fn answer_question(
        &mut self,
        question_id: &str,
        selected_option: usize,
    ) -> Result<Option<TestAnswer>> {
        let session = self.session.active()?;
        let Some(test) = self.tests.iter().find(|t| t.id == session.test_id) else {
            tracing::warn!(test_id = %session.test_id, "session test no longer loaded; answer ignored");
            return Ok(None);
        };

        Ok(self
            .session
            .answer_question(test, question_id, selected_option)?
            .cloned())
    }

    pub fn next_question(&mut self) -> Result<usize> {
        let count = self.session_question_count()?;
        Ok(self.session.next_question(count)?)
    }

    pub fn previous_question(&mut self) -> Result<usize> {
        let count = self.session_question_count()?;
        Ok(self.session.previous_question(count)?)
    }

    pub fn go_to_question(&mut self, index: usize) -> Result<usize> {
        let count = self.session_question_count()?;
        Ok(self.session.go_to_question(index, count)?)
    }

    fn session_question_count(&self) -> Result<usize> {
        let session = self.session.active()?;
        self.snapshot_test(&session.test_id)
            .map(Test::question_count)
            .ok_or_else(|| SessionError::TestNotFound(session.test_id.clone()).into())
    }

    /// Scores the current session and stores the result.
    ///
    /// The session is marked completed only once the result is stored; a
    /// failed write leaves it active so the caller can retry.
    pub fn submit_test(&mut self, child_id: &str) -> Result<TestResult> {
        let session = self.session.active()?;
        if session.child_id != child_id {
            return Err(SessionError::ChildMismatch {
                expected: session.child_id.clone(),
                actual: child_id.to_string(),
            }
            .into());
        }
        let child = self.own_child(child_id)?;

        let test = self
            .snapshot_test(&session.test_id)
            .ok_or_else(|| SessionError::TestNotFound(session.test_id.clone()))?;

        let answers: Vec<TestAnswer> = session
            .answers
            .iter()
            .filter(|a| test.question(&a.question_id).is_some())
            .cloned()
            .collect();
        let score = scoring::score(test, &answers)?;
        let recommendation = match_recommendation(&test.recommendations, score.percentage);

        let now = Utc::now();
        let result = TestResult {
            id: generate_id(),
            child_id: child_id.to_string(),
            parent_id: child.parent_id,
            test_id: test.id.clone(),
            age_in_months: test.age_in_months,
            answers,
            score: score.percentage,
            total_questions: score.total_questions,
            correct_answers: score.correct_count,
            recommendation,
            submitted_at: now,
            completed_at: now,
            created_at: now,
        };

        logged("create_result", self.store.create_result(&result))?;
        self.session.mark_completed()?;

        tracing::info!(
            result_id = %result.id,
            test_id = %result.test_id,
            child_id,
            score = result.score,
            status = result.recommendation.status.as_str(),
            "test submitted"
        );
        Ok(result)
    }

    pub fn clear_session(&mut self) {
        self.session.clear();
    }

    // === Children and results ===

    pub fn add_child(&self, name: &str, birth_date: NaiveDate) -> Result<Child> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MilestoneError::Validation("child name is empty".to_string()));
        }
        let child = Child {
            id: generate_id(),
            parent_id: self.actor.id.clone(),
            name: name.to_string(),
            birth_date,
        };
        logged("add_child", self.store.add_child(&child))?;
        tracing::info!(child_id = %child.id, "child registered");
        Ok(child)
    }

    pub fn children(&self) -> Result<Vec<Child>> {
        logged("children_of", self.store.children_of(&self.actor.id))
    }

    // Admins may act on any registered child
    fn own_child(&self, child_id: &str) -> Result<Child> {
        logged("get_child", self.store.get_child(child_id))?
            .filter(|c| c.parent_id == self.actor.id || self.actor.is_admin())
            .ok_or_else(|| MilestoneError::ChildNotFound(child_id.to_string()))
    }

    /// Results for the current parent's children, newest first. With a
    /// filter, only that child's results.
    pub fn results(&self, child_id: Option<&str>) -> Result<Vec<TestResult>> {
        let child_ids: Vec<String> = match child_id {
            Some(id) => vec![self.own_child(id)?.id],
            None => self.children()?.into_iter().map(|c| c.id).collect(),
        };
        logged("list_results", self.store.list_results(&child_ids))
    }

    pub fn latest_result(&self, child_id: Option<&str>) -> Result<Option<TestResult>> {
        Ok(self.results(child_id)?.into_iter().next())
    }

    /// Builds the display report for a stored result. The template is
    /// optional: a deactivated, deleted or unreadable template only drops
    /// the supplementary detail.
    pub fn result_report(&self, result_id: &str) -> Result<ResultReport> {
        let result = logged("get_result", self.store.get_result(result_id))?
            .ok_or_else(|| MilestoneError::ResultNotFound(result_id.to_string()))?;
        match self.own_child(&result.child_id) {
            Ok(_) => {}
            Err(MilestoneError::ChildNotFound(_)) => {
                return Err(MilestoneError::ResultNotFound(result_id.to_string()))
            }
            Err(e) => return Err(e),
        }

        let template = match self.store.get_test(&result.test_id) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(test_id = %result.test_id, error = %e, "template unavailable for report");
                None
            }
        };

        Ok(build_report(&result, template.as_ref()))
    }

    /// The active test closest to, without exceeding, the child's age.
    /// Falls back to the youngest test when the child is younger than all.
    pub fn suggested_test(&self, child_id: &str, today: NaiveDate) -> Result<Option<&Test>> {
        let age = self.own_child(child_id)?.age_in_months(today);
        let candidates = self.tests.iter().filter(|t| !t.questions.is_empty());
        Ok(candidates
            .clone()
            .filter(|t| t.age_in_months <= age)
            .last()
            .or_else(|| candidates.min_by_key(|t| t.age_in_months)))
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(MilestoneError::Validation("title is empty".to_string()));
    }
    Ok(())
}

fn validate_question(draft: &QuestionDraft) -> Result<()> {
    if draft.text.trim().is_empty() {
        return Err(MilestoneError::Validation("question text is empty".to_string()));
    }
    if draft.category == Category::Unknown {
        let known: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();
        return Err(MilestoneError::Validation(format!(
            "category must be one of {}",
            known.join(", ")
        )));
    }
    if draft.options.len() < 2 {
        return Err(MilestoneError::Validation(
            "a question needs at least two options".to_string(),
        ));
    }
    if draft.options.iter().any(|o| o.trim().is_empty()) {
        return Err(MilestoneError::Validation("options must not be blank".to_string()));
    }
    if draft.expected_answer_index >= draft.options.len() {
        return Err(MilestoneError::Validation(format!(
            "expected answer {} is not one of the {} options",
            draft.expected_answer_index,
            draft.options.len()
        )));
    }
    if draft.weight == Some(0) {
        return Err(MilestoneError::Validation("weight must be at least 1".to_string()));
    }
    Ok(())
}

fn validate_recommendation(draft: &RecommendationDraft) -> Result<()> {
    if draft.title.trim().is_empty() {
        return Err(MilestoneError::Validation(
            "recommendation title is empty".to_string(),
        ));
    }
    if draft.status == RecommendationStatus::Unknown {
        return Err(MilestoneError::Validation(
            "recommendation status is not recognised".to_string(),
        ));
    }
    if draft.urgency == Urgency::Unknown {
        return Err(MilestoneError::Validation(
            "recommendation urgency is not recognised".to_string(),
        ));
    }
    let range = draft.score_range;
    if range.min > range.max || range.max > 100 {
        return Err(MilestoneError::Validation(format!(
            "score range {}-{} is not within 0-100",
            range.min, range.max
        )));
    }
    Ok(())
}
