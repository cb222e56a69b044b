//! Scenario harness: fixture lifecycle plus poll assertions
//!
//! A [`Scenario`] applies its fixture files, runs an async body, and always
//! deletes the fixtures afterwards, whether the body passed, failed or
//! panicked. Inside the body, [`Expectation`]s poll a resource until its
//! condition is decided and turn the outcome into a `Result`.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::FutureExt;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::condition::Condition;
use crate::fetch::{KubeFetcher, ObjectKey, ResourceFetcher};
use crate::manifest::{apply_file, delete_file};
use crate::poll::{PollExecutor, PollReport, PollSpec};
use crate::Error;

/// One resource/condition pair to wait for
#[derive(Clone, Debug)]
pub struct Expectation {
    /// Object to poll
    pub key: ObjectKey,
    /// Condition the object must reach
    pub condition: Condition,
    /// Poll timing
    pub spec: PollSpec,
}

impl Expectation {
    /// Expect `condition` on the object at `namespace/name`
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        condition: Condition,
        spec: PollSpec,
    ) -> Self {
        Self {
            key: ObjectKey::new(namespace, name),
            condition,
            spec,
        }
    }

    /// Poll through an explicit fetcher and map the outcome to a `Result`
    pub async fn eventually_with<F>(
        &self,
        fetcher: &F,
        cancel: &CancellationToken,
    ) -> Result<PollReport, Error>
    where
        F: ResourceFetcher + ?Sized,
    {
        let report = PollExecutor::new(self.spec)
            .run(cancel, &self.key, fetcher, &self.condition)
            .await;

        if report.outcome.is_success() {
            info!(
                kind = %self.condition.kind(),
                key = %report.key,
                attempts = report.attempts,
                elapsed_ms = report.elapsed.as_millis(),
                "expectation met"
            );
        } else {
            warn!(
                kind = %self.condition.kind(),
                key = %report.key,
                outcome = %report.outcome,
                attempts = report.attempts,
                elapsed_ms = report.elapsed.as_millis(),
                "expectation not met"
            );
        }
        report.into_result()
    }

    /// Poll the cluster through `client` and map the outcome to a `Result`
    pub async fn eventually(
        &self,
        client: &Client,
        cancel: &CancellationToken,
    ) -> Result<PollReport, Error> {
        let fetcher = KubeFetcher::new(client.clone(), self.condition.kind());
        self.eventually_with(&fetcher, cancel).await
    }
}

/// Applies and removes fixtures around a test body
#[async_trait]
pub trait FixtureStore: Send + Sync {
    /// Create everything in the file
    async fn apply(&self, path: &Path) -> Result<(), Error>;

    /// Remove everything in the file
    async fn delete(&self, path: &Path) -> Result<(), Error>;
}

#[async_trait]
impl FixtureStore for Client {
    async fn apply(&self, path: &Path) -> Result<(), Error> {
        apply_file(self, path).await
    }

    async fn delete(&self, path: &Path) -> Result<(), Error> {
        delete_file(self, path).await
    }
}

/// One end-to-end test case with guaranteed fixture cleanup
pub struct Scenario<S = Client> {
    name: String,
    store: S,
    fixtures: Vec<PathBuf>,
    cleanup_only: Vec<PathBuf>,
}

impl<S: FixtureStore> Scenario<S> {
    /// Create a scenario backed by `store` (usually a kube `Client`)
    pub fn new(name: impl Into<String>, store: S) -> Self {
        Self {
            name: name.into(),
            store,
            fixtures: Vec::new(),
            cleanup_only: Vec::new(),
        }
    }

    /// Apply `path` before the body runs and delete it afterwards
    pub fn fixture(mut self, path: impl Into<PathBuf>) -> Self {
        self.fixtures.push(path.into());
        self
    }

    /// Delete `path` afterwards; the body itself is expected to create it
    pub fn cleanup_only(mut self, path: impl Into<PathBuf>) -> Self {
        self.cleanup_only.push(path.into());
        self
    }

    /// Run the scenario.
    ///
    /// Fixtures are applied in order and deleted in reverse order. Cleanup runs
    /// regardless of how the body ends, including when applying a fixture
    /// fails partway. The body's error takes precedence over a cleanup error.
    pub async fn run<F, Fut>(&self, body: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), Error>>,
    {
        info!(scenario = %self.name, fixtures = self.fixtures.len(), "starting scenario");

        let result = match self.setup().await {
            Ok(()) => match AssertUnwindSafe(body()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::scenario(
                    &self.name,
                    format!("PANIC: {}", panic_message(panic.as_ref())),
                )),
            },
            Err(e) => Err(e),
        };

        let cleanup = self.teardown().await;

        match (result, cleanup) {
            (Ok(()), Ok(())) => {
                info!(scenario = %self.name, "scenario passed");
                Ok(())
            }
            (Ok(()), Err(e)) => {
                error!(scenario = %self.name, error = %e, "scenario cleanup failed");
                Err(e)
            }
            (Err(e), cleanup) => {
                if let Err(cleanup_err) = cleanup {
                    warn!(
                        scenario = %self.name,
                        error = %cleanup_err,
                        "cleanup failed after scenario failure"
                    );
                }
                error!(scenario = %self.name, error = %e, "scenario failed");
                Err(e)
            }
        }
    }

    async fn setup(&self) -> Result<(), Error> {
        for path in &self.fixtures {
            self.store.apply(path).await?;
        }
        Ok(())
    }

    /// Delete everything, continuing past failures and returning the first one
    async fn teardown(&self) -> Result<(), Error> {
        let mut first_error = None;
        for path in self.cleanup_only.iter().chain(self.fixtures.iter().rev()) {
            if let Err(e) = self.store.delete(path).await {
                warn!(
                    scenario = %self.name,
                    path = %path.display(),
                    error = %e,
                    "failed to delete fixture"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
