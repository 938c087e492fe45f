//! Controller configuration, mirroring the ambient defaults-layer pattern
//! the engine's tick loop uses for its own `TickConfig`.

/// Tunables recognized by both controller variants. All fields have
/// defaults derived from `target_tps = 60`.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Target simulation ticks per second.
    pub target_tps: u32,
    /// How often (ms) a client sends `Synchronize` to the server.
    pub sync_interval_ms: u32,
    /// How often (in simulation frames) peers exchange `HashCheck`.
    pub hash_interval_frames: i64,
    /// Multiplier applied to the rolling load estimate before comparing it
    /// against 1.0 in `adjust_speed`.
    pub load_buffer_factor: f64,
    /// Cap on the frameskip compensation applied in a single `update` call.
    pub max_frameskip_per_update_ms: f64,
    /// How far ahead of `current_frame` a command may target before
    /// rejection.
    pub max_command_lead_frames: i64,
    /// Length of the client's `frame_diff_samples` ring.
    pub max_frame_diff_samples: usize,
    /// Length of the rolling load-estimator window.
    pub load_sample_window: usize,
    /// TSS delays for a client-side TSS.
    pub client_tss_delays: Vec<i64>,
    /// TSS delays for a server-side TSS in a multiplayer session.
    pub server_tss_delays_multiplayer: Vec<i64>,
    /// TSS delays for a server-side TSS when running single-player
    /// (no rollback needed, since there is nothing to reconcile against).
    pub server_tss_delays_single_player: Vec<i64>,
}

impl ControllerConfig {
    /// Milliseconds per simulation tick at `target_tps`.
    pub fn target_elapsed_ms(&self) -> f64 {
        1000.0 / self.target_tps as f64
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        let target_tps = 60;
        let target_elapsed_ms = 1000.0 / target_tps as f64;
        let frames_for = |ms: f64| (ms / target_elapsed_ms).ceil() as i64;

        Self {
            target_tps,
            sync_interval_ms: 500,
            hash_interval_frames: (10_000.0 / target_elapsed_ms).ceil() as i64,
            load_buffer_factor: 1.8,
            max_frameskip_per_update_ms: target_elapsed_ms / 10.0,
            max_command_lead_frames: 50,
            max_frame_diff_samples: 5,
            load_sample_window: 30,
            client_tss_delays: vec![frames_for(50.0), frames_for(500.0)],
            server_tss_delays_multiplayer: vec![frames_for(50.0), frames_for(250.0)],
            server_tss_delays_single_player: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let config = ControllerConfig::default();
        assert_eq!(config.target_tps, 60);
        assert_eq!(config.sync_interval_ms, 500);
        assert_eq!(config.max_command_lead_frames, 50);
        assert_eq!(config.load_sample_window, 30);
        assert!((config.load_buffer_factor - 1.8).abs() < f64::EPSILON);
        assert_eq!(config.server_tss_delays_single_player, Vec::<i64>::new());
    }

    #[test]
    fn hash_interval_is_about_ten_seconds() {
        let config = ControllerConfig::default();
        let approx_seconds = config.hash_interval_frames as f64 / config.target_tps as f64;
        assert!((approx_seconds - 10.0).abs() < 0.2);
    }
}
