//! Execution
//!
//! Progress reporting and cooperative cancellation for long running loops.
use crate::errors::ShapleyError;
use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress and decides about cancellation.
pub trait ExecutionMonitor {
    /// Report progress, `fraction` lies within `[0, 1]`.
    fn set_progress(&self, fraction: f64, message: &str);

    /// Return `ShapleyError::Canceled` if the execution should stop.
    fn check_canceled(&self) -> Result<(), ShapleyError>;
}

/// Monitor that ignores progress and never cancels.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ExecutionMonitor for NoopMonitor {
    fn set_progress(&self, _fraction: f64, _message: &str) {}

    fn check_canceled(&self) -> Result<(), ShapleyError> {
        Ok(())
    }
}

/// Monitor that logs progress and can be canceled from another thread.
#[derive(Debug, Default, Clone)]
pub struct CancelFlag {
    canceled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl ExecutionMonitor for CancelFlag {
    fn set_progress(&self, fraction: f64, message: &str) {
        debug!("{:.1}% {}", fraction * 100.0, message);
    }

    fn check_canceled(&self) -> Result<(), ShapleyError> {
        if self.is_canceled() {
            Err(ShapleyError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Maps the progress of a sub task onto the range `[offset, offset + fraction]` of its parent.
pub struct SubProgress<'a, M: ExecutionMonitor + ?Sized> {
    parent: &'a M,
    offset: f64,
    fraction: f64,
}

impl<'a, M: ExecutionMonitor + ?Sized> SubProgress<'a, M> {
    pub fn new(parent: &'a M, offset: f64, fraction: f64) -> Self {
        SubProgress {
            parent,
            offset,
            fraction,
        }
    }
}

impl<M: ExecutionMonitor + ?Sized> ExecutionMonitor for SubProgress<'_, M> {
    fn set_progress(&self, fraction: f64, message: &str) {
        self.parent
            .set_progress(self.offset + fraction.clamp(0.0, 1.0) * self.fraction, message);
    }

    fn check_canceled(&self) -> Result<(), ShapleyError> {
        self.parent.check_canceled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<f64>>,
    }

    impl ExecutionMonitor for Recorder {
        fn set_progress(&self, fraction: f64, _message: &str) {
            self.progress.lock().unwrap().push(fraction);
        }

        fn check_canceled(&self) -> Result<(), ShapleyError> {
            Ok(())
        }
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let handle = flag.clone();
        assert!(flag.check_canceled().is_ok());
        std::thread::spawn(move || handle.cancel()).join().unwrap();
        assert_eq!(flag.check_canceled(), Err(ShapleyError::Canceled));
    }

    #[test]
    fn test_sub_progress() {
        let recorder = Recorder::default();
        let sub = SubProgress::new(&recorder, 0.5, 0.5);
        sub.set_progress(0.0, "");
        sub.set_progress(0.5, "");
        sub.set_progress(2.0, "");
        assert_eq!(*recorder.progress.lock().unwrap(), vec![0.5, 0.75, 1.0]);
    }
}
