//! Progress reporting for long operations.

/// Receives `(percent, message)` checkpoints. Percentages handed to a sink by
/// this crate never decrease within one operation.
pub trait Progress {
    fn report(&mut self, percent: u8, message: &str);
}

impl<F: FnMut(u8, &str)> Progress for F {
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u8, _message: &str) {}
}

/// Wraps a sink so it only ever sees non-decreasing percentages capped at 100.
pub(crate) struct Monotonic<'a> {
    inner: &'a mut dyn Progress,
    last: u8,
}

impl<'a> Monotonic<'a> {
    pub(crate) fn new(inner: &'a mut dyn Progress) -> Self {
        Self { inner, last: 0 }
    }

    pub(crate) fn step(&mut self, percent: u8, message: &str) {
        self.last = self.last.max(percent.min(100));
        log::debug!("[{:>3}%] {message}", self.last);
        self.inner.report(self.last, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let mut seen = Vec::new();
        let mut sink = |p: u8, m: &str| seen.push((p, m.to_string()));
        let mut progress = Monotonic::new(&mut sink);
        progress.step(10, "a");
        progress.step(5, "b");
        progress.step(250, "c");
        assert_eq!(
            seen,
            [(10, "a".into()), (10, "b".into()), (100, "c".to_string())]
        );
    }
}
