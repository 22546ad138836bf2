//! History queries and deletion, coordinated with the task queue.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::{AssetCleaner, HistoryError, HistoryFilter, HistoryRecord, HistoryStore};
use crate::queue::{SubmitOutcome, TaskQueue};
use crate::task::{TriggerOrigin, WorkItem};

/// What a delete removes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeleteMode {
    /// The record and its log only.
    Record,
    /// The output files only; the record stays.
    Files,
    /// Record and output files.
    #[default]
    Both,
}

impl DeleteMode {
    fn removes_record(self) -> bool {
        matches!(self, DeleteMode::Record | DeleteMode::Both)
    }

    fn removes_files(self) -> bool {
        matches!(self, DeleteMode::Files | DeleteMode::Both)
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteReport {
    pub task_id: String,
    pub record_removed: bool,
    pub files_removed: bool,
    /// Why output files were left in place, if they were.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files_kept: Option<String>,
}

/// Read and delete access to history.
pub struct HistoryService {
    store: Arc<dyn HistoryStore>,
    queue: Arc<TaskQueue>,
    cleaner: Arc<dyn AssetCleaner>,
}

impl HistoryService {
    pub fn new(
        store: Arc<dyn HistoryStore>,
        queue: Arc<TaskQueue>,
        cleaner: Arc<dyn AssetCleaner>,
    ) -> Self {
        Self {
            store,
            queue,
            cleaner,
        }
    }

    pub fn store(&self) -> &Arc<dyn HistoryStore> {
        &self.store
    }

    /// One page of records plus the total matching the filter.
    pub fn list(&self, filter: &HistoryFilter) -> Result<(Vec<HistoryRecord>, i64), HistoryError> {
        let records = self.store.list(filter)?;
        let total = self.store.count(filter)?;
        Ok((records, total))
    }

    pub fn get(&self, task_id: &str) -> Result<HistoryRecord, HistoryError> {
        self.store
            .get(task_id)?
            .ok_or_else(|| HistoryError::NotFound(task_id.to_string()))
    }

    pub fn log(&self, task_id: &str) -> Result<Vec<String>, HistoryError> {
        self.store
            .log(task_id)?
            .ok_or_else(|| HistoryError::NotFound(task_id.to_string()))
    }

    /// Delete a record and/or the output it alone owns.
    ///
    /// Rejected with [`HistoryError::TaskActive`] while the task is queued
    /// or running.
    pub fn delete(&self, task_id: &str, mode: DeleteMode) -> Result<DeleteReport, HistoryError> {
        if self.queue.is_active(task_id) {
            return Err(HistoryError::TaskActive(task_id.to_string()));
        }

        let record = self.get(task_id)?;
        let mut report = DeleteReport {
            task_id: task_id.to_string(),
            record_removed: false,
            files_removed: false,
            files_kept: None,
        };

        if mode.removes_files() {
            match record.output_dir() {
                None => report.files_kept = Some("record has no output directory".to_string()),
                Some(dir) => {
                    let refs = self.store.count_output_refs(dir)?;
                    if refs > 1 {
                        report.files_kept = Some(format!(
                            "{} other records reference {}",
                            refs - 1,
                            dir.display()
                        ));
                    } else {
                        report.files_removed = self
                            .cleaner
                            .remove(dir)
                            .map_err(|e| HistoryError::Cleanup(format!("{}: {}", dir.display(), e)))?;
                    }
                }
            }
        }

        if mode.removes_record() {
            self.store.delete(task_id)?;
            report.record_removed = true;
        }

        crate::metrics::HISTORY_DELETES.inc();
        info!(
            task_id = %task_id,
            mode = ?mode,
            files_removed = report.files_removed,
            "History record deleted"
        );
        Ok(report)
    }

    /// Delete several records. Each id is handled independently.
    pub fn delete_many(
        &self,
        task_ids: &[String],
        mode: DeleteMode,
    ) -> Vec<(String, Result<DeleteReport, HistoryError>)> {
        task_ids
            .iter()
            .map(|id| {
                let result = self.delete(id, mode);
                if let Err(ref e) = result {
                    warn!(task_id = %id, error = %e, "Bulk delete entry failed");
                }
                (id.clone(), result)
            })
            .collect()
    }

    /// Resubmit a record's sources as a forced manual work item.
    pub fn redo(&self, task_id: &str) -> Result<SubmitOutcome, HistoryError> {
        let record = self.get(task_id)?;
        let item = WorkItem::new(record.task.paths.clone(), TriggerOrigin::Manual)
            .with_optional_preset(record.task.preset.clone())
            .forced();

        let outcome = self.queue.submit(item)?;
        info!(task_id = %task_id, outcome = ?outcome, "Redo submitted");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{FsAssetCleaner, SqliteHistoryStore};
    use crate::queue::{ExecutorConfig, QueueJournal, SqliteQueueJournal};
    use crate::rules::{MemoryRuleStore, RuleResolver};
    use crate::task::TaskState;
    use crate::testing::fixtures;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        service: HistoryService,
        store: Arc<SqliteHistoryStore>,
        queue: Arc<TaskQueue>,
        journal: Arc<SqliteQueueJournal>,
        dir: TempDir,
    }

    fn create_test_service() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SqliteHistoryStore::in_memory().unwrap());
        let journal = Arc::new(SqliteQueueJournal::in_memory().unwrap());
        let queue = Arc::new(TaskQueue::new(
            RuleResolver::new(Arc::new(MemoryRuleStore::default())),
            store.clone(),
            journal.clone(),
            &ExecutorConfig::default(),
        ));
        let service = HistoryService::new(
            store.clone(),
            queue.clone(),
            Arc::new(FsAssetCleaner::confined_to(dir.path())),
        );
        Fixture {
            service,
            store,
            queue,
            journal,
            dir,
        }
    }

    fn output_dir(f: &Fixture, name: &str) -> String {
        let dir = f.dir.path().join("library").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("movie.nfo"), b"<movie/>").unwrap();
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn test_delete_both_removes_record_and_files() {
        let f = create_test_service();
        let out = output_dir(&f, "ABC-123");
        let task = fixtures::succeeded_task("/inbox/ABC-123.mp4", &out);
        f.store.append(&task, &["line".to_string()]).unwrap();

        let report = f.service.delete(&task.id, DeleteMode::Both).unwrap();
        assert!(report.record_removed);
        assert!(report.files_removed);
        assert!(!PathBuf::from(&out).exists());
        assert!(matches!(
            f.service.get(&task.id),
            Err(HistoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_record_keeps_files() {
        let f = create_test_service();
        let out = output_dir(&f, "ABC-123");
        let task = fixtures::succeeded_task("/inbox/ABC-123.mp4", &out);
        f.store.append(&task, &[]).unwrap();

        let report = f.service.delete(&task.id, DeleteMode::Record).unwrap();
        assert!(report.record_removed);
        assert!(!report.files_removed);
        assert!(PathBuf::from(&out).exists());
    }

    #[test]
    fn test_delete_files_keeps_record() {
        let f = create_test_service();
        let out = output_dir(&f, "ABC-123");
        let task = fixtures::succeeded_task("/inbox/ABC-123.mp4", &out);
        f.store.append(&task, &[]).unwrap();

        let report = f.service.delete(&task.id, DeleteMode::Files).unwrap();
        assert!(!report.record_removed);
        assert!(report.files_removed);
        assert!(f.service.get(&task.id).is_ok());
    }

    #[test]
    fn test_shared_output_is_kept() {
        let f = create_test_service();
        let out = output_dir(&f, "ABC-123");
        let first = fixtures::succeeded_task("/inbox/ABC-123.mp4", &out);
        let second = fixtures::succeeded_task("/inbox/again/ABC-123.mp4", &out);
        f.store.append(&first, &[]).unwrap();
        f.store.append(&second, &[]).unwrap();

        let report = f.service.delete(&first.id, DeleteMode::Both).unwrap();
        assert!(report.record_removed);
        assert!(!report.files_removed);
        assert!(report.files_kept.unwrap().contains("1 other records"));
        assert!(PathBuf::from(&out).exists());
    }

    #[test]
    fn test_delete_active_task_rejected() {
        let f = create_test_service();
        let outcome = f.queue.submit(fixtures::work_item("/inbox/a.mp4")).unwrap();
        let result = f.service.delete(outcome.task_id(), DeleteMode::Both);
        assert!(matches!(result, Err(HistoryError::TaskActive(_))));
        assert!(f.queue.is_active(outcome.task_id()));
    }

    #[test]
    fn test_delete_many_reports_each() {
        let f = create_test_service();
        let task = fixtures::finished_task(
            "/inbox/a.mp4",
            TaskState::Skipped {
                reason: "recent".into(),
            },
        );
        f.store.append(&task, &[]).unwrap();

        let results = f
            .service
            .delete_many(&[task.id.clone(), "missing".to_string()], DeleteMode::Record);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(HistoryError::NotFound(_))));
    }

    #[test]
    fn test_redo_is_forced_manual() {
        let f = create_test_service();
        let mut task = fixtures::succeeded_task("/inbox/ABC-123.mp4", "/library/ABC-123");
        task.origin = TriggerOrigin::Watch;
        task.preset = None;
        f.store.append(&task, &[]).unwrap();

        let outcome = f.service.redo(&task.id).unwrap();
        assert!(outcome.is_queued());
        let requeued = f.queue.active_task(outcome.task_id()).unwrap();
        assert_eq!(requeued.origin, TriggerOrigin::Manual);
        assert!(requeued.force);
        assert_eq!(requeued.paths, task.paths);
        assert_eq!(f.journal.load().unwrap().len(), 1);
    }

    #[test]
    fn test_list_and_log() {
        let f = create_test_service();
        let task = fixtures::succeeded_task("/inbox/a.mp4", "/library/a");
        f.store
            .append(&task, &["one".to_string(), "two".to_string()])
            .unwrap();

        let (records, total) = f.service.list(&HistoryFilter::new()).unwrap();
        assert_eq!(total, 1);
        assert_eq!(records[0].task_id(), task.id);
        assert_eq!(f.service.log(&task.id).unwrap(), vec!["one", "two"]);
        assert!(matches!(
            f.service.log("missing"),
            Err(HistoryError::NotFound(_))
        ));
    }
}
