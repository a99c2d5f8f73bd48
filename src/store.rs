//! Repository seams between the orchestrator and the document store.

use crate::error::StoreError;
use crate::models::{Child, Test, TestResult};

/// Test templates and results, keyed by generated document ids.
pub trait TestStore {
    fn create_test(&self, test: &Test) -> Result<(), StoreError>;

    /// Replaces the stored document. Returns false if no such test exists.
    fn update_test(&self, test: &Test) -> Result<bool, StoreError>;

    fn get_test(&self, id: &str) -> Result<Option<Test>, StoreError>;

    /// Templates ordered by target age, youngest first.
    fn list_tests(&self, active_only: bool) -> Result<Vec<Test>, StoreError>;

    fn create_result(&self, result: &TestResult) -> Result<(), StoreError>;

    fn get_result(&self, id: &str) -> Result<Option<TestResult>, StoreError>;

    /// Results for any of `child_ids`, most recently completed first.
    fn list_results(&self, child_ids: &[String]) -> Result<Vec<TestResult>, StoreError>;
}

pub trait ChildRegistry {
    fn add_child(&self, child: &Child) -> Result<(), StoreError>;

    fn get_child(&self, id: &str) -> Result<Option<Child>, StoreError>;

    fn children_of(&self, parent_id: &str) -> Result<Vec<Child>, StoreError>;
}
