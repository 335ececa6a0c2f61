//! One scheduler cycle: launch the port, run the workflow, tear down.
//!
//! The session is closed on every exit path. An interruption wins the race
//! against the workflow, and the close still runs before control returns. A
//! panic inside the workflow is contained by running the cycle on its own
//! task; the port's `Drop` then releases the browser.

use crate::features::notifier::Notifier;
use crate::features::scheduler::shutdown_requested;
use crate::features::session::{Session, SessionSettings};
use crate::features::workflow::{CycleReport, ProbeReport, Workflow, WorkflowError};
use crate::scraping::port::PortLauncher;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// How a guarded cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed(WorkflowError),
    Interrupted,
    Panicked,
}

impl CycleOutcome {
    /// Authentication or case-page failure after retries.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CycleOutcome::Failed(e) if e.is_fatal_for_cycle())
    }
}

pub struct CycleRunner {
    launcher: Arc<dyn PortLauncher>,
    notifier: Arc<dyn Notifier>,
    settings: SessionSettings,
    workflow: Workflow,
}

impl CycleRunner {
    pub fn new(
        launcher: Arc<dyn PortLauncher>,
        notifier: Arc<dyn Notifier>,
        settings: SessionSettings,
        workflow: Workflow,
    ) -> Self {
        Self {
            launcher,
            notifier,
            settings,
            workflow,
        }
    }

    async fn open_session(&self) -> Result<Session, WorkflowError> {
        let port = self.launcher.launch().await?;
        Ok(Session::new(
            port,
            self.notifier.clone(),
            self.settings.clone(),
        ))
    }

    /// Runs the workflow once, racing it against `shutdown`.
    pub async fn run_once(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<CycleReport, WorkflowError> {
        let mut session = self.open_session().await?;
        let result = tokio::select! {
            result = self.workflow.run(&mut session) => result,
            _ = shutdown_requested(&mut shutdown) => {
                warn!("Interrupted, closing session");
                Err(WorkflowError::Interrupted)
            }
        };
        session.close().await;
        result
    }

    /// `--probe`: list locations and their first queue, then tear down.
    pub async fn probe(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<ProbeReport, WorkflowError> {
        let mut session = self.open_session().await?;
        let result = tokio::select! {
            result = self.workflow.probe(&mut session) => result,
            _ = shutdown_requested(&mut shutdown) => Err(WorkflowError::Interrupted),
        };
        session.close().await;
        result
    }

    /// [`run_once`](Self::run_once) on a dedicated task, with every failure
    /// mode folded into a [`CycleOutcome`].
    pub async fn run_guarded(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> CycleOutcome {
        let task = tokio::spawn(async move { self.run_once(shutdown).await });
        match task.await {
            Ok(Ok(report)) => CycleOutcome::Completed(report),
            Ok(Err(WorkflowError::Interrupted)) => CycleOutcome::Interrupted,
            Ok(Err(e)) => {
                error!("Cycle aborted: {}", e);
                CycleOutcome::Failed(e)
            }
            Err(e) if e.is_panic() => {
                error!("Cycle panicked: {}", e);
                CycleOutcome::Panicked
            }
            Err(e) => {
                info!("Cycle task cancelled: {}", e);
                CycleOutcome::Interrupted
            }
        }
    }
}
