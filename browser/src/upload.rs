//! Batch upload progress.
//!
//! [`UploadState`] is a plain reducer: every change goes through
//! [`UploadState::apply`]. [`UploadTracker`] owns one state, drives a batch
//! through any [`FileBrowserProvider`], and publishes every transition on a
//! `watch` channel for whoever renders progress.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::http::RequestOptions;
use crate::provider::FileBrowserProvider;
use crate::types::UploadFile;

/// Name and size of a file in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub name: String,
    pub size: u64,
}

impl From<&UploadFile> for UploadedFile {
    fn from(file: &UploadFile) -> Self {
        Self {
            name: file.name.clone(),
            size: file.size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub file: UploadedFile,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAction {
    Start(Vec<UploadedFile>),
    StartFile { file: UploadedFile, index: usize },
    FinishFile(UploadedFile),
    Error { file: UploadedFile, message: String },
    Abort,
    Finish,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    pub active: bool,
    pub total_files: usize,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    /// 1-based number of the file in flight; 0 before the first one.
    pub current_file_num: usize,
    pub current_file: Option<UploadedFile>,
    pub files: Vec<UploadedFile>,
    pub completed_files: Vec<UploadedFile>,
    pub errors: Vec<UploadFailure>,
    pub aborted: bool,
    pub done: bool,
}

impl UploadState {
    pub fn apply(&mut self, action: UploadAction) {
        match action {
            UploadAction::Start(files) => {
                *self = Self {
                    active: true,
                    total_files: files.len(),
                    total_bytes: files.iter().map(|file| file.size).sum(),
                    files,
                    ..Self::default()
                };
            }
            UploadAction::StartFile { file, index } => {
                if self.active {
                    self.current_file_num = index + 1;
                    self.current_file = Some(file);
                }
            }
            UploadAction::FinishFile(file) => {
                self.uploaded_bytes += file.size;
                self.completed_files.push(file);
            }
            UploadAction::Error { file, message } => {
                self.errors.push(UploadFailure { file, message });
            }
            UploadAction::Abort => {
                self.active = false;
                self.aborted = true;
            }
            UploadAction::Finish => {
                self.active = false;
                self.done = true;
            }
        }
    }

    /// Fraction of bytes uploaded, in `0.0..=1.0`.
    pub fn fraction_uploaded(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.done { 1.0 } else { 0.0 };
        }
        self.uploaded_bytes as f64 / self.total_bytes as f64
    }
}

/// Runs one upload batch at a time and publishes its progress.
#[derive(Clone)]
pub struct UploadTracker {
    state: Arc<watch::Sender<UploadState>>,
}

impl Default for UploadTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(UploadState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    pub(crate) fn dispatch(&self, action: UploadAction) {
        self.state.send_modify(|state| state.apply(action));
    }

    /// Upload `files` into `directory_path`, one after another.
    ///
    /// Returns `None` without doing anything if a batch is already active.
    /// A failed file is recorded and the batch moves on; cancelling `signal`
    /// stops the batch before the next file starts, or mid-request.
    #[instrument(skip_all, fields(directory = directory_path, files = files.len()))]
    pub async fn upload_files(
        &self,
        provider: &dyn FileBrowserProvider,
        directory_path: &str,
        files: Vec<UploadFile>,
        signal: CancellationToken,
    ) -> Option<UploadState> {
        let summaries: Vec<UploadedFile> = files.iter().map(UploadedFile::from).collect();
        let started = self.state.send_if_modified(|state| {
            if state.active {
                return false;
            }
            state.apply(UploadAction::Start(summaries));
            true
        });
        if !started {
            debug!("upload already in progress, ignoring batch");
            return None;
        }

        let batch = ActiveBatch {
            tracker: self,
            settled: false,
        };
        let options = RequestOptions::with_signal(signal.clone());
        for (index, file) in files.iter().enumerate() {
            if signal.is_cancelled() {
                return Some(batch.settle(UploadAction::Abort));
            }

            let summary = UploadedFile::from(file);
            self.dispatch(UploadAction::StartFile {
                file: summary.clone(),
                index,
            });

            match provider
                .upload_file_to_directory(directory_path, file, &options)
                .await
            {
                Ok(()) => self.dispatch(UploadAction::FinishFile(summary)),
                Err(err) if err.is_abort() => {
                    return Some(batch.settle(UploadAction::Abort));
                }
                Err(err) => self.dispatch(UploadAction::Error {
                    file: summary,
                    message: err.to_string(),
                }),
            }
        }

        Some(batch.settle(UploadAction::Finish))
    }
}

/// A started batch; aborts it on drop unless it was settled.
struct ActiveBatch<'a> {
    tracker: &'a UploadTracker,
    settled: bool,
}

impl ActiveBatch<'_> {
    fn settle(mut self, action: UploadAction) -> UploadState {
        self.settled = true;
        self.tracker.dispatch(action);
        self.tracker.state()
    }
}

impl Drop for ActiveBatch<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("upload batch dropped before settling");
            self.tracker.dispatch(UploadAction::Abort);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockFileBrowserProvider;

    fn file(name: &str, size: usize) -> UploadFile {
        UploadFile::from_bytes(name, vec![b'x'; size], "text/plain")
    }

    #[test]
    fn test_reducer_transitions() {
        let f1 = UploadedFile {
            name: "f1".to_owned(),
            size: 10,
        };
        let f2 = UploadedFile {
            name: "f2".to_owned(),
            size: 32,
        };
        let mut state = UploadState::default();

        state.apply(UploadAction::Start(vec![f1.clone(), f2.clone()]));
        assert!(state.active);
        assert_eq!(state.total_files, 2);
        assert_eq!(state.total_bytes, 42);
        assert_eq!(state.uploaded_bytes, 0);

        state.apply(UploadAction::StartFile {
            file: f1.clone(),
            index: 0,
        });
        assert_eq!(state.current_file_num, 1);
        state.apply(UploadAction::FinishFile(f1.clone()));
        assert_eq!(state.uploaded_bytes, 10);
        assert_eq!(state.completed_files, [f1]);

        state.apply(UploadAction::Abort);
        assert!(!state.active);
        assert!(state.aborted);
        assert!(!state.done);

        state.apply(UploadAction::StartFile { file: f2, index: 1 });
        assert_eq!(state.current_file_num, 1, "no file starts after abort");
    }

    #[test]
    fn test_start_resets_previous_batch() {
        let mut state = UploadState::default();
        state.apply(UploadAction::Start(vec![UploadedFile {
            name: "old".to_owned(),
            size: 5,
        }]));
        state.apply(UploadAction::Error {
            file: UploadedFile {
                name: "old".to_owned(),
                size: 5,
            },
            message: "boom".to_owned(),
        });
        state.apply(UploadAction::Finish);

        state.apply(UploadAction::Start(Vec::new()));
        assert!(state.errors.is_empty());
        assert!(!state.done);
        assert_eq!(state.total_bytes, 0);
    }

    #[tokio::test]
    async fn test_batch_uploads_every_file() {
        let provider = MockFileBrowserProvider::new();
        let tracker = UploadTracker::new();

        let state = tracker
            .upload_files(
                &provider,
                "uploads/",
                vec![file("a.txt", 3), file("b.txt", 4)],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(state.done);
        assert!(!state.active);
        assert_eq!(state.uploaded_bytes, 7);
        assert_eq!(state.completed_files.len(), 2);
        assert!(provider.contains("uploads/a.txt"));
        assert!(provider.contains("uploads/b.txt"));
    }

    #[tokio::test]
    async fn test_failed_file_does_not_stop_batch() {
        let provider = MockFileBrowserProvider::new();
        provider.fail_on("uploads/a.txt");
        let tracker = UploadTracker::new();

        let state = tracker
            .upload_files(
                &provider,
                "uploads/",
                vec![file("a.txt", 3), file("b.txt", 4)],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(state.done);
        assert_eq!(state.errors.len(), 1);
        assert_eq!(state.errors[0].file.name, "a.txt");
        assert_eq!(state.completed_files.len(), 1);
        assert_eq!(state.uploaded_bytes, 4);
        assert!(provider.contains("uploads/b.txt"));
    }

    #[tokio::test]
    async fn test_cancel_stops_before_next_file() {
        let provider = MockFileBrowserProvider::new();
        let signal = CancellationToken::new();
        provider.cancel_after_upload("uploads/a.txt", signal.clone());
        let tracker = UploadTracker::new();

        let state = tracker
            .upload_files(
                &provider,
                "uploads/",
                vec![file("a.txt", 3), file("b.txt", 4), file("c.txt", 5)],
                signal,
            )
            .await
            .unwrap();

        assert!(state.aborted);
        assert!(!state.active);
        assert!(!state.done);
        assert_eq!(state.current_file_num, 1);
        assert_eq!(state.completed_files.len(), 1);
        assert!(!provider.contains("uploads/b.txt"));
    }

    #[tokio::test]
    async fn test_second_batch_ignored_while_active() {
        let provider = MockFileBrowserProvider::new();
        let tracker = UploadTracker::new();
        tracker.dispatch(UploadAction::Start(vec![UploadedFile {
            name: "in-flight.bin".to_owned(),
            size: 1,
        }]));

        let result = tracker
            .upload_files(
                &provider,
                "",
                vec![file("b.txt", 1)],
                CancellationToken::new(),
            )
            .await;

        assert!(result.is_none());
        assert!(provider.is_empty());
        assert_eq!(tracker.state().files[0].name, "in-flight.bin");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_releases_tracker() {
        let provider = MockFileBrowserProvider::new();
        provider.stall_upload("uploads/a.txt");
        let tracker = UploadTracker::new();

        let stalled = tokio::time::timeout(
            std::time::Duration::from_secs(1),
            tracker.upload_files(
                &provider,
                "uploads/",
                vec![file("a.txt", 3)],
                CancellationToken::new(),
            ),
        )
        .await;
        assert!(stalled.is_err());

        let state = tracker.state();
        assert!(!state.active);
        assert!(state.aborted);

        let state = tracker
            .upload_files(
                &provider,
                "uploads/",
                vec![file("b.txt", 4)],
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(state.done);
        assert!(provider.contains("uploads/b.txt"));
        assert!(!provider.contains("uploads/a.txt"));
    }

    #[tokio::test]
    async fn test_subscribers_see_final_state() {
        let provider = MockFileBrowserProvider::new();
        let tracker = UploadTracker::new();
        let receiver = tracker.subscribe();

        tracker
            .upload_files(
                &provider,
                "",
                vec![file("a.txt", 2)],
                CancellationToken::new(),
            )
            .await;

        let seen = receiver.borrow().clone();
        assert!(seen.done);
        assert!((seen.fraction_uploaded() - 1.0).abs() < f64::EPSILON);
    }
}
