use std::time::Duration;

/// Tracks the last `window` round-trip samples and reports their mean as
/// the current latency estimate. Mirrors `legume.pingsampler.PingSampler`.
#[derive(Debug, Clone)]
pub struct PingSampler {
    window: usize,
    samples: Vec<f64>,
}

impl PingSampler {
    pub fn new(window: usize) -> PingSampler {
        PingSampler { window: window.max(1), samples: Vec::new() }
    }

    /// Records a round-trip sample in seconds. `rtt_seconds` is a signed
    /// value, not a `Duration`: samples are typically computed by comparing
    /// a send timestamp against a reply timestamp, and a stale or
    /// out-of-order reply can yield a negative delta. Such samples are
    /// dropped rather than allowed to poison the estimate.
    pub fn add_sample(&mut self, rtt_seconds: f64) {
        if rtt_seconds < 0.0 {
            return;
        }
        self.samples.push(rtt_seconds);
        if self.samples.len() > self.window {
            self.samples.remove(0);
        }
    }

    /// The mean of the current window, or zero seconds if no sample has
    /// been recorded yet.
    pub fn get_ping(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let mean = self.samples.iter().sum::<f64>() / self.samples.len() as f64;
        Duration::from_secs_f64(mean)
    }

    pub fn has_estimate(&self) -> bool {
        !self.samples.is_empty()
    }
}

impl Default for PingSampler {
    fn default() -> Self {
        PingSampler::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sampler_has_no_estimate() {
        let sampler = PingSampler::default();
        assert!(!sampler.has_estimate());
        assert_eq!(sampler.get_ping(), Duration::ZERO);
    }

    #[test]
    fn averages_over_the_window() {
        let mut sampler = PingSampler::new(4);
        for ms in [0.100, 0.200, 0.300, 0.400] {
            sampler.add_sample(ms);
        }
        assert_eq!(sampler.get_ping(), Duration::from_millis(250));
    }

    #[test]
    fn window_slides_and_drops_oldest() {
        let mut sampler = PingSampler::new(2);
        sampler.add_sample(0.100);
        sampler.add_sample(0.200);
        sampler.add_sample(0.300);
        assert_eq!(sampler.get_ping(), Duration::from_millis(250));
    }

    #[test]
    fn negative_samples_are_ignored() {
        let mut sampler = PingSampler::new(4);
        sampler.add_sample(0.100);
        let before = sampler.get_ping();
        sampler.add_sample(-0.050);
        assert_eq!(sampler.samples.len(), 1);
        assert_eq!(sampler.get_ping(), before);
    }
}
