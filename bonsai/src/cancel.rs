//! Cooperative cancellation shared by the orchestrator, gate loop and child processes.
//!
//! Ctrl-C is routed through [`CancelToken::interrupt`]. While an interactive
//! child owns the terminal the interrupt belongs to that child: it is only
//! recorded, and the session ends normally. Anywhere else it cancels.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::debug;

/// Returned when work stops because a [`CancelToken`] fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cancelled")]
pub struct Cancelled;

/// Cloneable flag checked at every blocking call boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    foreground: Arc<AtomicUsize>,
    interrupted: Arc<AtomicBool>,
}

/// Marks an interactive child as owning the terminal until dropped.
#[derive(Debug)]
pub struct ForegroundGuard {
    foreground: Arc<AtomicUsize>,
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        self.foreground.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// User interrupt: recorded while a foreground child runs, cancels otherwise.
    pub fn interrupt(&self) {
        if self.foreground.load(Ordering::SeqCst) > 0 {
            self.interrupted.store(true, Ordering::SeqCst);
        } else {
            self.cancel();
        }
    }

    pub fn foreground(&self) -> ForegroundGuard {
        self.foreground.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(false, Ordering::SeqCst);
        ForegroundGuard {
            foreground: Arc::clone(&self.foreground),
        }
    }

    /// Whether an interrupt arrived during the last foreground child. Resets the record.
    pub fn take_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once the token has fired.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }
}

/// True when `err` (or anything in its chain) is a [`Cancelled`].
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.downcast_ref::<Cancelled>().is_some())
}

/// Route Ctrl-C to `token`. Call once per process.
pub fn install_interrupt_handler(token: &CancelToken) -> Result<()> {
    let token = token.clone();
    ctrlc::set_handler(move || {
        debug!("interrupt received");
        token.interrupt();
    })
    .context("install interrupt handler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn detects_cancelled_through_context() {
        let err = anyhow::Error::new(Cancelled).context("run skill");
        assert!(is_cancelled(&err));
        assert!(!is_cancelled(&anyhow::anyhow!("boom")));
    }

    #[test]
    fn interrupt_outside_foreground_cancels() {
        let token = CancelToken::new();
        token.interrupt();
        assert!(token.is_cancelled());
        assert!(!token.take_interrupt());
    }

    #[test]
    fn interrupt_during_foreground_is_only_recorded() {
        let token = CancelToken::new();
        {
            let _guard = token.foreground();
            token.clone().interrupt();
            assert!(!token.is_cancelled());
        }
        assert!(token.take_interrupt());
        assert!(!token.take_interrupt());

        token.interrupt();
        assert!(token.is_cancelled());
    }
}
