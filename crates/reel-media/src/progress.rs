//! Render progress.

use serde::{Deserialize, Serialize};

/// Stages of a render, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    Bake,
    Merge,
    Mux,
    Done,
}

impl RenderStage {
    /// Overall progress window `[from, to)` covered by this stage.
    fn window(&self) -> (u8, u8) {
        match self {
            RenderStage::Bake => (5, 70),
            RenderStage::Merge => (70, 85),
            RenderStage::Mux => (85, 99),
            RenderStage::Done => (100, 100),
        }
    }

    /// Map `done` of `total` units in this stage onto 0-100.
    pub fn overall(&self, done: usize, total: usize) -> u8 {
        let (from, to) = self.window();
        if total == 0 || from == to {
            return from;
        }
        let frac = (done.min(total) as f64) / (total as f64);
        from + ((to - from) as f64 * frac).round() as u8
    }
}

/// Receives render progress. Implementations must be cheap; they are called
/// inline between encoder runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, stage: RenderStage, percent: u8);
}

/// Sink that drops every report.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _stage: RenderStage, _percent: u8) {}
}

impl<F> ProgressSink for F
where
    F: Fn(RenderStage, u8) + Send + Sync,
{
    fn report(&self, stage: RenderStage, percent: u8) {
        self(stage, percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_windows_are_monotonic() {
        assert_eq!(RenderStage::Bake.overall(0, 4), 5);
        assert_eq!(RenderStage::Bake.overall(4, 4), 70);
        assert!(RenderStage::Merge.overall(1, 2) > RenderStage::Bake.overall(4, 4));
        assert_eq!(RenderStage::Done.overall(0, 0), 100);
    }

    #[test]
    fn test_closure_sink() {
        let seen = std::sync::Mutex::new(Vec::new());
        let sink = |stage: RenderStage, pct: u8| seen.lock().unwrap().push((stage, pct));
        sink.report(RenderStage::Mux, 90);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(RenderStage::Mux, 90)]);
    }
}
