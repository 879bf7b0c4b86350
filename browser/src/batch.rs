//! Operations over several paths at once.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, instrument};

use crate::error::{FileBrowserError, Result};
use crate::http::RequestOptions;
use crate::provider::FileBrowserProvider;

/// Per-path results of a batch, in input order.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, FileBrowserError)>,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every path concurrently. One failure does not stop the others.
#[instrument(skip_all, fields(paths = paths.len()))]
pub async fn delete_files(
    provider: Arc<dyn FileBrowserProvider>,
    paths: Vec<String>,
    options: &RequestOptions,
) -> BatchOutcome {
    let mut tasks = JoinSet::new();
    for (index, path) in paths.iter().cloned().enumerate() {
        let provider = Arc::clone(&provider);
        let options = options.clone();
        tasks.spawn(async move { (index, provider.delete_file(&path, &options).await) });
    }

    let mut results: Vec<Option<Result<()>>> = paths.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => results[index] = Some(result),
            Err(err) => debug!(%err, "delete task did not complete"),
        }
    }

    let mut outcome = BatchOutcome::default();
    for (path, result) in paths.into_iter().zip(results) {
        match result {
            Some(Ok(())) => outcome.succeeded.push(path),
            Some(Err(err)) => outcome.failed.push((path, err)),
            None => outcome.failed.push((
                path,
                FileBrowserError::Transport("delete task did not complete".to_owned()),
            )),
        }
    }
    outcome
}
