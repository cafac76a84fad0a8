//! Progress reporting for long-running file operations.
//!
//! A listener is passed explicitly into every file operation, so concurrent
//! operations report to independent sinks.

/// Receives progress updates from file operations.
pub trait ProgressListener {
    /// Called with a completion percentage in `0..=100` and a status message.
    fn on_progress(&self, percent: u8, message: &str);
}

impl<F> ProgressListener for F
where
    F: Fn(u8, &str),
{
    fn on_progress(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Listener that discards every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_progress(&self, _percent: u8, _message: &str) {}
}

/// Percentage of `total` covered by `done`, clamped to 100.
///
/// An empty total counts as complete.
pub fn percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) as u128 * 100 / total as u128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(200, 200), 100);
        assert_eq!(percent(300, 200), 100);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn test_percent_large_values() {
        assert_eq!(percent(u64::MAX / 2, u64::MAX), 49);
    }

    #[test]
    fn test_closure_listener() {
        let events = RefCell::new(Vec::new());
        let listener = |p: u8, m: &str| events.borrow_mut().push((p, m.to_string()));

        listener.on_progress(10, "working");
        listener.on_progress(100, "done");

        assert_eq!(
            events.into_inner(),
            vec![(10, "working".to_string()), (100, "done".to_string())]
        );
    }
}
