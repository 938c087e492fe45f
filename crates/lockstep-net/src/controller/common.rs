//! Pacing shared by both controller variants.

use std::collections::VecDeque;
use std::time::Instant;

use crate::config::ControllerConfig;

/// Rolling mean of the last `window` per-`Tss::update` wall-clock
/// durations, in milliseconds, plus the carry-over remainder that drives
/// the fixed-step accumulator.
#[derive(Debug)]
pub struct Pacing {
    remainder_ms: f64,
    load_samples: VecDeque<f64>,
    window: usize,
}

impl Pacing {
    pub fn new(window: usize) -> Self {
        Self { remainder_ms: 0.0, load_samples: VecDeque::with_capacity(window), window }
    }

    fn record_sample(&mut self, duration_ms: f64) {
        self.load_samples.push_back(duration_ms);
        while self.load_samples.len() > self.window {
            self.load_samples.pop_front();
        }
    }

    /// `mean(last window update durations) / target_elapsed_ms`.
    pub fn current_load(&self, target_elapsed_ms: f64) -> f64 {
        if self.load_samples.is_empty() {
            return 0.0;
        }
        let mean = self.load_samples.iter().sum::<f64>() / self.load_samples.len() as f64;
        mean / target_elapsed_ms
    }

    pub fn safe_load(&self, target_elapsed_ms: f64, load_buffer_factor: f64) -> f64 {
        self.current_load(target_elapsed_ms) * load_buffer_factor
    }
}

/// Drives `step` forward by however many fixed-size ticks `dt_ms` (plus the
/// carried remainder) calls for, sampling each tick's wall-clock cost into
/// `pacing`. Returns the number of ticks executed.
///
/// `adjusted_speed` scales the target period: a value above 1.0 makes each
/// tick "cheaper" in elapsed-time terms, advancing the simulation faster to
/// catch up; below 1.0 slows it to shed load.
pub fn drive_ticks(pacing: &mut Pacing, config: &ControllerConfig, dt_ms: f64, adjusted_speed: f64, mut step: impl FnMut()) -> u32 {
    let target_elapsed_ms = config.target_elapsed_ms();
    let adjusted_speed = adjusted_speed.max(0.01);
    let target_period = target_elapsed_ms / adjusted_speed;

    // Frameskip compensation bounds how far a single call can catch up --
    // it never invents elapsed time that didn't occur, only caps it.
    let max_skip = config.max_frameskip_per_update_ms;
    let mut elapsed = dt_ms + pacing.remainder_ms;
    elapsed = elapsed.min(target_period + max_skip).max(0.0);

    let call_start = Instant::now();
    let mut ticks = 0u32;
    while elapsed >= target_period && call_start.elapsed().as_secs_f64() * 1000.0 < target_period {
        let tick_start = Instant::now();
        step();
        elapsed -= target_period;
        ticks += 1;
        pacing.record_sample(tick_start.elapsed().as_secs_f64() * 1000.0);
    }

    pacing.remainder_ms = elapsed.min(target_period);
    ticks
}
