//! In-memory metric capture for tests

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Captures every metric recorded on the current thread while inside [`MetricCapture::record`]
pub struct MetricCapture {
    recorder: DebuggingRecorder,
    snapshotter: Snapshotter,
}

impl Default for MetricCapture {
    fn default() -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        Self {
            recorder,
            snapshotter,
        }
    }
}

impl MetricCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with this capture as the recorder of the current thread
    pub fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(&self.recorder, f)
    }

    /// Current value of the gauge with exactly these labels
    pub fn gauge(&self, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
        match self.find(name, labels)? {
            DebugValue::Gauge(value) => Some(value.into_inner()),
            _ => None,
        }
    }

    /// Current value of the counter with exactly these labels
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> Option<u64> {
        match self.find(name, labels)? {
            DebugValue::Counter(value) => Some(value),
            _ => None,
        }
    }

    /// Number of series recorded under `name`, whatever their labels
    pub fn series(&self, name: &str) -> usize {
        self.snapshotter
            .snapshot()
            .into_vec()
            .iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .count()
    }

    fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<DebugValue> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(composite, _, _, value)| {
                let key = composite.key();
                let matches = key.name() == name
                    && key.labels().count() == labels.len()
                    && labels.iter().all(|(label, expected)| {
                        key.labels()
                            .any(|l| l.key() == *label && l.value() == *expected)
                    });
                matches.then_some(value)
            })
    }
}
