//! Render progress reporting.
//!
//! Renderers report percentages through a `RenderProgress` handle. The handle
//! drops updates smaller than one percent and never blocks: the receiving
//! side forwards values to the progress channel at its own pace.

use tokio::sync::mpsc;

/// Minimum change worth forwarding.
const MIN_STEP: f64 = 1.0;

/// Sender half handed to a renderer.
#[derive(Debug)]
pub struct RenderProgress {
    tx: Option<mpsc::Sender<f64>>,
    last: Option<f64>,
}

impl RenderProgress {
    /// Create a sender/receiver pair with the given buffer.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<f64>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx: Some(tx),
                last: None,
            },
            rx,
        )
    }

    /// A handle that discards every update.
    pub fn disabled() -> Self {
        Self { tx: None, last: None }
    }

    /// Report progress in `[0, 100]`.
    ///
    /// Returns whether the value was forwarded.
    pub fn report(&mut self, percent: f64) -> bool {
        if !percent.is_finite() {
            return false;
        }
        let percent = percent.clamp(0.0, 100.0);

        let due = match self.last {
            None => true,
            Some(last) => percent - last >= MIN_STEP || (percent >= 100.0 && last < 100.0),
        };
        if !due {
            return false;
        }

        let Some(tx) = &self.tx else {
            return false;
        };
        // Full buffer: drop this value, a later one will catch up.
        if tx.try_send(percent).is_ok() {
            self.last = Some(percent);
            return true;
        }
        false
    }

    /// Report completion.
    pub fn finish(&mut self) {
        self.report(100.0);
    }

    /// Last forwarded value.
    pub fn last(&self) -> Option<f64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_steps_are_dropped() {
        let (mut progress, mut rx) = RenderProgress::channel(16);

        assert!(progress.report(0.0));
        assert!(!progress.report(0.4));
        assert!(progress.report(1.2));
        assert!(!progress.report(1.9));
        assert!(progress.report(50.0));
        // Going backwards is never forwarded
        assert!(!progress.report(20.0));
        progress.finish();

        let mut seen = Vec::new();
        while let Ok(v) = rx.try_recv() {
            seen.push(v);
        }
        assert_eq!(seen, vec![0.0, 1.2, 50.0, 100.0]);
    }

    #[test]
    fn test_full_buffer_does_not_block() {
        let (mut progress, _rx) = RenderProgress::channel(1);
        assert!(progress.report(10.0));
        assert!(!progress.report(20.0));
        assert_eq!(progress.last(), Some(10.0));
    }

    #[test]
    fn test_disabled_handle() {
        let mut progress = RenderProgress::disabled();
        assert!(!progress.report(50.0));
    }
}
