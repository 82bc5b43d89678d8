//! Fixed-rate pacing for the server loop.

/// Game ticks per second when nothing else is configured.
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Upper bound on ticks yielded by one [`ServerTickSchedule::accumulate`]
/// call. Time beyond this is dropped so a stalled host does not replay a
/// long backlog in one burst.
const MAX_CATCH_UP_TICKS: u32 = 10;

/// Turns wall-clock time into a count of game ticks to run.
#[derive(Debug, Clone)]
pub struct ServerTickSchedule {
    tick_rate: u32,
    tick_secs: f64,
    carry_secs: f64,
    total_ticks: u64,
    dropped_ticks: u64,
}

impl ServerTickSchedule {
    /// A schedule at [`DEFAULT_TICK_RATE`].
    pub fn new() -> Self {
        Self::with_tick_rate(DEFAULT_TICK_RATE)
    }

    /// A schedule at `hz` ticks per second. Zero is treated as one.
    pub fn with_tick_rate(hz: u32) -> Self {
        let tick_rate = hz.max(1);
        Self {
            tick_rate,
            tick_secs: 1.0 / f64::from(tick_rate),
            carry_secs: 0.0,
            total_ticks: 0,
            dropped_ticks: 0,
        }
    }

    /// Adds elapsed time and returns how many ticks are now due.
    pub fn accumulate(&mut self, dt_secs: f64) -> u32 {
        self.carry_secs += dt_secs.max(0.0);
        let mut due = 0u32;
        while self.carry_secs >= self.tick_secs {
            self.carry_secs -= self.tick_secs;
            due += 1;
        }

        if due > MAX_CATCH_UP_TICKS {
            let dropped = due - MAX_CATCH_UP_TICKS;
            tracing::warn!(dropped, "Server fell behind, skipping ticks");
            self.dropped_ticks += u64::from(dropped);
            due = MAX_CATCH_UP_TICKS;
        }
        self.total_ticks += u64::from(due);
        due
    }

    /// Configured ticks per second.
    pub fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    /// Length of one tick in seconds.
    pub fn tick_secs(&self) -> f64 {
        self.tick_secs
    }

    /// Ticks yielded since creation.
    pub fn total_ticks(&self) -> u64 {
        self.total_ticks
    }

    /// Ticks skipped because the host fell too far behind.
    pub fn dropped_ticks(&self) -> u64 {
        self.dropped_ticks
    }
}

impl Default for ServerTickSchedule {
    fn default() -> Self {
        Self::new()
    }
}
