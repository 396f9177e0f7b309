//! Flush timing, compiled in with the `render_metrics` feature.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Wall-clock time of each phase of one [`HwCanvas::flush`](crate::hw::HwCanvas::flush).
#[derive(Debug, Clone, Copy, Default)]
pub struct FlushTimings {
    /// Clip depths, attachment needs and sub layer targets.
    pub prepare: Duration,
    /// Geometry and fragment data written to the stage buffer, pipelines looked up.
    pub generate_command: Duration,
    /// Stage and static buffers copied to the GPU.
    pub upload: Duration,
    /// Render passes encoded and submitted, sub layers first.
    pub encode_and_submit: Duration,
    pub total: Duration,
}

const ROLLING_WINDOW: Duration = Duration::from_secs(1);
const MAX_ROLLING_SAMPLES: usize = 16_384;

#[derive(Debug, Clone, Copy)]
struct FlushSample {
    finished_at: Instant,
    duration: Duration,
}

/// Cumulative and rolling one-second flush statistics of a canvas.
#[derive(Debug)]
pub struct FlushMetrics {
    flush_count: u64,
    total_duration: Duration,
    first_started_at: Option<Instant>,
    last_finished_at: Option<Instant>,
    rolling: VecDeque<FlushSample>,
    rolling_duration: Duration,
    last: FlushTimings,
}

impl Default for FlushMetrics {
    fn default() -> Self {
        Self {
            flush_count: 0,
            total_duration: Duration::ZERO,
            first_started_at: None,
            last_finished_at: None,
            rolling: VecDeque::new(),
            rolling_duration: Duration::ZERO,
            last: FlushTimings::default(),
        }
    }
}

impl FlushMetrics {
    fn pop_oldest(&mut self) {
        if let Some(oldest) = self.rolling.pop_front() {
            self.rolling_duration = self.rolling_duration.saturating_sub(oldest.duration);
        }
    }

    pub fn record(&mut self, started_at: Instant, timings: FlushTimings) {
        let finished_at = started_at + timings.total;
        self.first_started_at.get_or_insert(started_at);
        self.last_finished_at = Some(finished_at);
        self.flush_count += 1;
        self.total_duration += timings.total;
        self.last = timings;

        if self.rolling.len() == MAX_ROLLING_SAMPLES {
            self.pop_oldest();
        }
        self.rolling.push_back(FlushSample {
            finished_at,
            duration: timings.total,
        });
        self.rolling_duration += timings.total;
        while self
            .rolling
            .front()
            .is_some_and(|oldest| finished_at.saturating_duration_since(oldest.finished_at) > ROLLING_WINDOW)
        {
            self.pop_oldest();
        }
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn last_timings(&self) -> FlushTimings {
        self.last
    }

    /// Flushes per second between the start of the first flush and the end of the last.
    pub fn average_flushes_per_second(&self) -> f64 {
        let (Some(first), Some(last)) = (self.first_started_at, self.last_finished_at) else {
            return 0.0;
        };
        let elapsed = last.saturating_duration_since(first).as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.flush_count as f64 / elapsed
    }

    pub fn average_flush_duration(&self) -> Duration {
        if self.flush_count == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_duration.as_secs_f64() / self.flush_count as f64)
    }

    pub fn rolling_one_second_flush_count(&self) -> usize {
        self.rolling.len()
    }

    pub fn rolling_one_second_average_duration(&self) -> Duration {
        if self.rolling.is_empty() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.rolling_duration.as_secs_f64() / self.rolling.len() as f64)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timings(ms: u64) -> FlushTimings {
        FlushTimings {
            total: Duration::from_millis(ms),
            ..FlushTimings::default()
        }
    }

    #[test]
    fn nothing_recorded_reads_as_zero() {
        let metrics = FlushMetrics::default();
        assert_eq!(metrics.flush_count(), 0);
        assert_eq!(metrics.average_flushes_per_second(), 0.0);
        assert_eq!(metrics.average_flush_duration(), Duration::ZERO);
        assert_eq!(metrics.rolling_one_second_average_duration(), Duration::ZERO);
    }

    #[test]
    fn averages_cover_every_flush() {
        let mut metrics = FlushMetrics::default();
        let start = Instant::now();
        metrics.record(start, timings(10));
        metrics.record(start + Duration::from_millis(20), timings(15));

        assert_eq!(metrics.flush_count(), 2);
        assert_eq!(metrics.average_flush_duration(), Duration::from_secs_f64(0.0125));
        assert!((metrics.average_flushes_per_second() - 2.0 / 0.035).abs() < 1e-9);
        assert_eq!(metrics.last_timings().total, Duration::from_millis(15));
    }

    #[test]
    fn rolling_window_keeps_the_last_second() {
        let mut metrics = FlushMetrics::default();
        let start = Instant::now();
        metrics.record(start, timings(10));
        metrics.record(start + Duration::from_millis(500), timings(20));
        metrics.record(start + Duration::from_millis(1_300), timings(30));

        assert_eq!(metrics.rolling_one_second_flush_count(), 2);
        assert_eq!(metrics.rolling_one_second_average_duration(), Duration::from_millis(25));

        metrics.reset();
        assert_eq!(metrics.flush_count(), 0);
        assert_eq!(metrics.rolling_one_second_flush_count(), 0);
    }
}
