//! Background task supervision
//!
//! Long-lived tasks are spawned here and report how they ended on a
//! channel, so the agent can log failures instead of losing them.

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{Error, Result};

/// How a supervised task ended
#[derive(Debug)]
pub struct TaskExit {
    pub name: &'static str,
    pub outcome: Result<()>,
}

pub struct Supervisor {
    exit_tx: mpsc::Sender<TaskExit>,
    exit_rx: mpsc::Receiver<TaskExit>,
    spawned: usize,
    reported: usize,
}

impl Supervisor {
    pub fn new() -> Self {
        let (exit_tx, exit_rx) = mpsc::channel(16);
        Self {
            exit_tx,
            exit_rx,
            spawned: 0,
            reported: 0,
        }
    }

    /// Spawn `task`; its result (or panic) is reported as a `TaskExit`
    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let exit_tx = self.exit_tx.clone();
        let inner = tokio::spawn(task);

        tokio::spawn(async move {
            let outcome = match inner.await {
                Ok(outcome) => outcome,
                Err(e) => Err(Error::Internal(format!("task {} aborted: {}", name, e))),
            };
            let _ = exit_tx.send(TaskExit { name, outcome }).await;
        });

        self.spawned += 1;
    }

    /// Next task to finish, or `None` once every spawned task has reported
    pub async fn next_exit(&mut self) -> Option<TaskExit> {
        if self.pending() == 0 {
            return None;
        }
        let exit = self.exit_rx.recv().await?;
        self.reported += 1;
        Some(exit)
    }

    /// Tasks spawned but not yet reported
    pub fn pending(&self) -> usize {
        self.spawned - self.reported
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}
