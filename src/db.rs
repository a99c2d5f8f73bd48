use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection};
use std::path::Path;

use crate::error::StoreError;
use crate::models::{Child, Test, TestResult};
use crate::store::{ChildRegistry, TestStore};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed document store. Tests and results are kept as JSON
/// documents, with the fields used for filtering and ordering copied into
/// indexed columns.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tests (
                id TEXT PRIMARY KEY,
                age_in_months INTEGER NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS test_results (
                id TEXT PRIMARY KEY,
                child_id TEXT NOT NULL,
                parent_id TEXT NOT NULL,
                test_id TEXT NOT NULL,
                completed_at TEXT NOT NULL,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS children (
                id TEXT PRIMARY KEY,
                parent_id TEXT NOT NULL,
                name TEXT NOT NULL,
                birth_date TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_tests_active_age ON tests(is_active, age_in_months);
            CREATE INDEX IF NOT EXISTS idx_results_child ON test_results(child_id);
            CREATE INDEX IF NOT EXISTS idx_results_completed ON test_results(completed_at);
            CREATE INDEX IF NOT EXISTS idx_children_parent ON children(parent_id);
            "#,
        )?;

        Ok(())
    }

    fn decode_all<T: serde::de::DeserializeOwned>(docs: Vec<String>) -> Result<Vec<T>, StoreError> {
        docs.iter()
            .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
            .collect()
    }
}

// Fixed-width so that lexical order in SQLite matches chronological order
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl TestStore for Database {
    fn create_test(&self, test: &Test) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO tests (id, age_in_months, is_active, created_at, updated_at, doc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                test.id,
                test.age_in_months,
                test.is_active,
                timestamp(&test.created_at),
                timestamp(&test.updated_at),
                serde_json::to_string(test)?
            ],
        )?;
        Ok(())
    }

    fn update_test(&self, test: &Test) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            r#"
            UPDATE tests
            SET age_in_months = ?1, is_active = ?2, updated_at = ?3, doc = ?4
            WHERE id = ?5
            "#,
            params![
                test.age_in_months,
                test.is_active,
                timestamp(&test.updated_at),
                serde_json::to_string(test)?,
                test.id
            ],
        )?;
        Ok(rows > 0)
    }

    fn get_test(&self, id: &str) -> Result<Option<Test>, StoreError> {
        let doc = self
            .conn
            .query_row("SELECT doc FROM tests WHERE id = ?1", params![id], |row| {
                row.get::<_, String>(0)
            });

        match doc {
            Ok(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_tests(&self, active_only: bool) -> Result<Vec<Test>, StoreError> {
        let sql = if active_only {
            "SELECT doc FROM tests WHERE is_active = 1 ORDER BY age_in_months, created_at"
        } else {
            "SELECT doc FROM tests ORDER BY age_in_months, created_at"
        };

        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let docs = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Self::decode_all(docs)
    }

    fn create_result(&self, result: &TestResult) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO test_results (id, child_id, parent_id, test_id, completed_at, doc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                result.id,
                result.child_id,
                result.parent_id,
                result.test_id,
                timestamp(&result.completed_at),
                serde_json::to_string(result)?
            ],
        )?;
        Ok(())
    }

    fn get_result(&self, id: &str) -> Result<Option<TestResult>, StoreError> {
        let doc = self.conn.query_row(
            "SELECT doc FROM test_results WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        );

        match doc {
            Ok(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn list_results(&self, child_ids: &[String]) -> Result<Vec<TestResult>, StoreError> {
        if child_ids.is_empty() {
            return Ok(vec![]);
        }

        let placeholders = vec!["?"; child_ids.len()].join(", ");
        let sql = format!(
            r#"
            SELECT doc FROM test_results
            WHERE child_id IN ({})
            ORDER BY completed_at DESC, id
            "#,
            placeholders
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(child_ids.iter()), |row| {
            row.get::<_, String>(0)
        })?;
        let docs = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Self::decode_all(docs)
    }
}

fn child_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Child> {
    let birth_str: String = row.get(3)?;
    let birth_date = NaiveDate::parse_from_str(&birth_str, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Child {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        birth_date,
    })
}

impl ChildRegistry for Database {
    fn add_child(&self, child: &Child) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO children (id, parent_id, name, birth_date) VALUES (?1, ?2, ?3, ?4)",
            params![
                child.id,
                child.parent_id,
                child.name,
                child.birth_date.format(DATE_FORMAT).to_string()
            ],
        )?;
        Ok(())
    }

    fn get_child(&self, id: &str) -> Result<Option<Child>, StoreError> {
        let child = self.conn.query_row(
            "SELECT id, parent_id, name, birth_date FROM children WHERE id = ?1",
            params![id],
            child_from_row,
        );

        match child {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn children_of(&self, parent_id: &str) -> Result<Vec<Child>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, parent_id, name, birth_date
            FROM children
            WHERE parent_id = ?1
            ORDER BY birth_date, name
            "#,
        )?;

        let rows = stmt.query_map(params![parent_id], child_from_row)?;
        let children = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Category, Question, Recommendation, RecommendationStatus, ScoreRange, TestAnswer, Urgency,
    };
    use chrono::Duration;

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn make_test(id: &str, age: u32) -> Test {
        let now = Utc::now();
        Test {
            id: id.to_string(),
            age_in_months: age,
            title: format!("{} month check", age),
            description: "Routine check".to_string(),
            questions: vec![Question {
                id: "q1".to_string(),
                text: "Sits without support?".to_string(),
                category: Category::Physical,
                options: vec!["Yes".into(), "No".into()],
                expected_answer_index: 0,
                weight: 1,
            }],
            recommendations: vec![Recommendation {
                id: "r1".to_string(),
                score_range: ScoreRange::FULL,
                status: RecommendationStatus::Good,
                title: "On track".to_string(),
                message: "Keep playing together.".to_string(),
                tips: vec!["Tummy time".to_string()],
                next_steps: Some(vec!["Check again in 3 months".to_string()]),
                urgency: Urgency::Low,
            }],
            is_active: true,
            created_by: "admin-1".to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    fn make_result(id: &str, child_id: &str, completed_at: DateTime<Utc>) -> TestResult {
        TestResult {
            id: id.to_string(),
            child_id: child_id.to_string(),
            parent_id: "parent-1".to_string(),
            test_id: "t1".to_string(),
            age_in_months: 6,
            answers: vec![TestAnswer {
                question_id: "q1".to_string(),
                selected_option: 0,
                is_correct: true,
            }],
            score: 100,
            total_questions: 1,
            correct_answers: 1,
            recommendation: Recommendation::fallback(),
            submitted_at: completed_at,
            completed_at,
            created_at: completed_at,
        }
    }

    fn make_child(id: &str, parent: &str, born: &str) -> Child {
        Child {
            id: id.to_string(),
            parent_id: parent.to_string(),
            name: format!("Child {}", id),
            birth_date: NaiveDate::parse_from_str(born, DATE_FORMAT).unwrap(),
        }
    }

    mod init_tests {
        use super::*;

        #[test]
        fn init_creates_tables() {
            let db = setup_db();
            for table in ["tests", "test_results", "children"] {
                let count: i64 = db
                    .conn
                    .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })
                    .unwrap();
                assert_eq!(count, 0);
            }
        }

        #[test]
        fn init_is_idempotent() {
            let db = setup_db();
            db.init().unwrap();
            db.init().unwrap();
        }
    }

    mod test_template_tests {
        use super::*;

        #[test]
        fn create_and_get_round_trips_document() {
            let db = setup_db();
            let test = make_test("t1", 6);
            db.create_test(&test).unwrap();

            let loaded = db.get_test("t1").unwrap().unwrap();
            assert_eq!(loaded, test);
        }

        #[test]
        fn get_test_not_found() {
            let db = setup_db();
            assert!(db.get_test("missing").unwrap().is_none());
        }

        #[test]
        fn duplicate_id_fails() {
            let db = setup_db();
            db.create_test(&make_test("t1", 6)).unwrap();
            assert!(db.create_test(&make_test("t1", 9)).is_err());
        }

        #[test]
        fn list_sorted_by_age() {
            let db = setup_db();
            db.create_test(&make_test("t24", 24)).unwrap();
            db.create_test(&make_test("t6", 6)).unwrap();
            db.create_test(&make_test("t12", 12)).unwrap();

            let ages: Vec<u32> = db
                .list_tests(true)
                .unwrap()
                .iter()
                .map(|t| t.age_in_months)
                .collect();
            assert_eq!(ages, vec![6, 12, 24]);
        }

        #[test]
        fn list_active_excludes_deactivated() {
            let db = setup_db();
            db.create_test(&make_test("t6", 6)).unwrap();
            let mut t12 = make_test("t12", 12);
            db.create_test(&t12).unwrap();

            t12.is_active = false;
            assert!(db.update_test(&t12).unwrap());

            let active = db.list_tests(true).unwrap();
            assert_eq!(active.len(), 1);
            assert_eq!(active[0].id, "t6");

            let all = db.list_tests(false).unwrap();
            assert_eq!(all.len(), 2);

            // Still readable by id
            assert!(!db.get_test("t12").unwrap().unwrap().is_active);
        }

        #[test]
        fn update_changes_sort_column() {
            let db = setup_db();
            db.create_test(&make_test("a", 6)).unwrap();
            let mut b = make_test("b", 12);
            db.create_test(&b).unwrap();

            b.age_in_months = 3;
            db.update_test(&b).unwrap();

            let ids: Vec<String> = db.list_tests(true).unwrap().into_iter().map(|t| t.id).collect();
            assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
        }

        #[test]
        fn update_missing_returns_false() {
            let db = setup_db();
            assert!(!db.update_test(&make_test("ghost", 6)).unwrap());
        }

        #[test]
        fn corrupt_document_is_an_encoding_error() {
            let db = setup_db();
            db.conn
                .execute(
                    "INSERT INTO tests (id, age_in_months, created_at, updated_at, doc) VALUES ('bad', 1, '', '', '{')",
                    [],
                )
                .unwrap();
            let err = db.get_test("bad").unwrap_err();
            assert!(matches!(err, StoreError::Encoding(_)));
        }
    }

    mod result_tests {
        use super::*;

        #[test]
        fn create_and_get_result() {
            let db = setup_db();
            let result = make_result("r1", "c1", Utc::now());
            db.create_result(&result).unwrap();
            assert_eq!(db.get_result("r1").unwrap().unwrap(), result);
            assert!(db.get_result("r2").unwrap().is_none());
        }

        #[test]
        fn list_results_newest_first() {
            let db = setup_db();
            let now = Utc::now();
            db.create_result(&make_result("old", "c1", now - Duration::days(30)))
                .unwrap();
            db.create_result(&make_result("new", "c1", now)).unwrap();
            db.create_result(&make_result("mid", "c1", now - Duration::days(3)))
                .unwrap();

            let ids: Vec<String> = db
                .list_results(&["c1".to_string()])
                .unwrap()
                .into_iter()
                .map(|r| r.id)
                .collect();
            assert_eq!(ids, vec!["new", "mid", "old"]);
        }

        #[test]
        fn list_results_scoped_to_children() {
            let db = setup_db();
            let now = Utc::now();
            db.create_result(&make_result("a", "c1", now)).unwrap();
            db.create_result(&make_result("b", "c2", now)).unwrap();
            db.create_result(&make_result("c", "c3", now)).unwrap();

            let results = db
                .list_results(&["c1".to_string(), "c3".to_string()])
                .unwrap();
            assert_eq!(results.len(), 2);
            assert!(results.iter().all(|r| r.child_id != "c2"));
        }

        #[test]
        fn list_results_no_children_is_empty() {
            let db = setup_db();
            db.create_result(&make_result("a", "c1", Utc::now())).unwrap();
            assert!(db.list_results(&[]).unwrap().is_empty());
        }

        #[test]
        fn duplicate_submissions_are_both_kept() {
            let db = setup_db();
            let now = Utc::now();
            db.create_result(&make_result("a", "c1", now)).unwrap();
            db.create_result(&make_result("b", "c1", now)).unwrap();
            assert_eq!(db.list_results(&["c1".to_string()]).unwrap().len(), 2);
        }
    }

    mod child_tests {
        use super::*;

        #[test]
        fn add_and_get_child() {
            let db = setup_db();
            let child = make_child("c1", "p1", "2025-02-10");
            db.add_child(&child).unwrap();
            assert_eq!(db.get_child("c1").unwrap().unwrap(), child);
            assert!(db.get_child("c2").unwrap().is_none());
        }

        #[test]
        fn children_of_parent_only() {
            let db = setup_db();
            db.add_child(&make_child("c1", "p1", "2024-05-01")).unwrap();
            db.add_child(&make_child("c2", "p2", "2024-06-01")).unwrap();
            db.add_child(&make_child("c3", "p1", "2023-01-01")).unwrap();

            let ids: Vec<String> = db
                .children_of("p1")
                .unwrap()
                .into_iter()
                .map(|c| c.id)
                .collect();
            assert_eq!(ids, vec!["c3", "c1"]);
            assert!(db.children_of("p9").unwrap().is_empty());
        }
    }
}
