use tokio::time::Instant;
use tracing::trace;

/// Traces how long a range operation took when dropped.
pub(crate) struct ScopedTimer {
    start: Instant,
    op: &'static str,
    node: String,
    keys: usize,
}

impl ScopedTimer {
    pub(crate) fn new(
        op: &'static str,
        node: &str,
        keys: usize,
    ) -> Self {
        Self {
            start: Instant::now(),
            op,
            node: node.to_string(),
            keys,
        }
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        trace!(
            target: "timing",
            node = %self.node,
            keys = self.keys,
            "[TIMING] {} took {} ms",
            self.op,
            elapsed.as_millis()
        );
    }
}
