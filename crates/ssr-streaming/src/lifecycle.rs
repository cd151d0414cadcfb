//! Render lifecycle checkpoints shared by both renderers.

use std::time::Instant;

use ssr_core::{LifecyclePhase, RenderError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of a render's lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleSnapshot {
    /// Current phase.
    pub phase: LifecyclePhase,
    /// When rendering began.
    pub started_at: Instant,
    /// When the shell was produced.
    pub shell_ready_at: Option<Instant>,
    /// When every suspended region settled.
    pub all_ready_at: Option<Instant>,
    /// When an abort was observed.
    pub aborted_at: Option<Instant>,
    /// Error that prevented the shell.
    pub shell_error: Option<RenderError>,
    /// Errors after the shell that no boundary caught.
    pub stream_errors: Vec<RenderError>,
}

impl LifecycleSnapshot {
    fn new() -> Self {
        Self {
            phase: LifecyclePhase::Start,
            started_at: Instant::now(),
            shell_ready_at: None,
            all_ready_at: None,
            aborted_at: None,
            shell_error: None,
            stream_errors: Vec::new(),
        }
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.phase,
            LifecyclePhase::AllReady | LifecyclePhase::Aborted | LifecyclePhase::Error(_)
        )
    }
}

/// Write side, owned by the render task.
#[derive(Debug)]
pub(crate) struct LifecycleWriter {
    tx: watch::Sender<LifecycleSnapshot>,
}

impl LifecycleWriter {
    pub(crate) fn shell_ready(&self) {
        self.tx.send_modify(|s| {
            if s.phase == LifecyclePhase::Start {
                s.phase = LifecyclePhase::ShellReady;
                s.shell_ready_at = Some(Instant::now());
            }
        });
    }

    pub(crate) fn all_ready(&self) {
        self.tx.send_modify(|s| {
            if s.phase == LifecyclePhase::ShellReady {
                s.phase = LifecyclePhase::AllReady;
                s.all_ready_at = Some(Instant::now());
            }
        });
    }

    pub(crate) fn shell_error(&self, error: RenderError) {
        self.tx.send_modify(|s| {
            if s.phase == LifecyclePhase::Start {
                s.phase = LifecyclePhase::Error(error.to_string());
                s.shell_error = Some(error);
            }
        });
    }

    pub(crate) fn stream_error(&self, error: RenderError) {
        self.tx.send_modify(|s| s.stream_errors.push(error));
    }

    pub(crate) fn aborted(&self) {
        self.tx.send_modify(|s| {
            if !s.is_terminal() {
                s.phase = LifecyclePhase::Aborted;
                s.aborted_at = Some(Instant::now());
            }
        });
    }
}

/// Read side of a render's lifecycle.
#[derive(Debug, Clone)]
pub struct RenderLifecycle {
    rx: watch::Receiver<LifecycleSnapshot>,
}

impl RenderLifecycle {
    pub(crate) fn channel() -> (LifecycleWriter, Self) {
        let (tx, rx) = watch::channel(LifecycleSnapshot::new());
        (LifecycleWriter { tx }, Self { rx })
    }

    /// Current state.
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the shell.
    ///
    /// Resolves `Ok` once the shell has been produced, even if the render
    /// was aborted afterwards.
    pub async fn shell_ready(&self) -> Result<(), RenderError> {
        let snapshot = self.wait_until(|s| s.phase != LifecyclePhase::Start).await;
        if snapshot.shell_ready_at.is_some() {
            return Ok(());
        }
        Err(snapshot.shell_error.unwrap_or(RenderError::Aborted))
    }

    /// Wait for every suspended region to settle.
    pub async fn all_ready(&self) -> Result<(), RenderError> {
        let snapshot = self.wait_until(LifecycleSnapshot::is_terminal).await;
        match snapshot.phase {
            LifecyclePhase::AllReady => Ok(()),
            _ => Err(snapshot.shell_error.unwrap_or(RenderError::Aborted)),
        }
    }

    async fn wait_until(&self, done: impl Fn(&LifecycleSnapshot) -> bool) -> LifecycleSnapshot {
        let mut rx = self.rx.clone();
        let result = rx.wait_for(|s| done(s)).await.map(|s| s.clone());
        match result {
            Ok(snapshot) => snapshot,
            // The render task is gone without finishing.
            Err(_) => {
                let mut snapshot = self.rx.borrow().clone();
                if !snapshot.is_terminal() {
                    snapshot.phase = LifecyclePhase::Aborted;
                }
                snapshot
            }
        }
    }
}

/// Stops a render.
///
/// Aborting is idempotent and never fails. The render task stops at its
/// next await point and nothing more reaches the transport.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Abort the render.
    pub fn abort(&self) {
        self.token.cancel();
    }

    /// Whether the render was aborted.
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shell_then_all_ready() {
        let (writer, lifecycle) = RenderLifecycle::channel();

        writer.shell_ready();
        lifecycle.shell_ready().await.unwrap();
        writer.all_ready();
        lifecycle.all_ready().await.unwrap();

        let snapshot = lifecycle.snapshot();
        assert_eq!(snapshot.phase, LifecyclePhase::AllReady);
        assert!(snapshot.shell_ready_at.unwrap() <= snapshot.all_ready_at.unwrap());
    }

    #[tokio::test]
    async fn test_all_ready_cannot_precede_shell() {
        let (writer, lifecycle) = RenderLifecycle::channel();

        writer.all_ready();
        assert_eq!(lifecycle.snapshot().phase, LifecyclePhase::Start);
    }

    #[tokio::test]
    async fn test_shell_error_surfaces_to_both_waits() {
        let (writer, lifecycle) = RenderLifecycle::channel();

        writer.shell_error(RenderError::shell(anyhow::anyhow!("layout broke")));

        assert!(matches!(lifecycle.shell_ready().await, Err(RenderError::ShellRender(_))));
        assert!(matches!(lifecycle.all_ready().await, Err(RenderError::ShellRender(_))));
    }

    #[tokio::test]
    async fn test_abort_after_shell_keeps_shell_ready() {
        let (writer, lifecycle) = RenderLifecycle::channel();

        writer.shell_ready();
        writer.aborted();

        assert!(lifecycle.shell_ready().await.is_ok());
        assert!(matches!(lifecycle.all_ready().await, Err(RenderError::Aborted)));
        assert!(lifecycle.snapshot().aborted_at.is_some());
    }

    #[tokio::test]
    async fn test_dropped_writer_reads_as_aborted() {
        let (writer, lifecycle) = RenderLifecycle::channel();
        drop(writer);

        assert!(matches!(lifecycle.shell_ready().await, Err(RenderError::Aborted)));
    }

    #[test]
    fn test_abort_handle_is_idempotent() {
        let handle = AbortHandle::new(CancellationToken::new());
        handle.abort();
        handle.abort();
        assert!(handle.is_aborted());
    }
}
