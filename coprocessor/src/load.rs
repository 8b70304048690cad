/// Idle/busy accounting of the estimation loop.
///
/// All tick arithmetic wraps, the hardware counter is free running.
#[derive(Debug, Clone)]
pub struct LoadMonitor {
    timer_rate: u32,
    last_idle_start: u32,
    last_idle_end: u32,
    idle_counts: u32,
    running_counts: u32,
    previous_sequence: Option<u32>,
    dropped_cycles: u32,
}

/// Load fields of the periodic update response
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct LoadReport {
    /// Share of the last cycle spent processing, 0..100
    pub load_percent: f32,
    /// Last wait for data, in 100 us units
    pub idle_time: u32,
    /// Last processing time, in 100 us units
    pub run_time: u32,
    pub dropped_cycles: u32,
}

impl LoadMonitor {
    pub fn new(timer_rate: u32) -> Self {
        LoadMonitor {
            timer_rate,
            last_idle_start: 0,
            last_idle_end: 0,
            idle_counts: 0,
            running_counts: 0,
            previous_sequence: None,
            dropped_cycles: 0,
        }
    }

    /// Start measuring from `now`
    pub fn start(&mut self, now: u32) {
        self.last_idle_start = now;
        self.last_idle_end = now;
    }

    /// Processing finished, waiting for data starts
    pub fn begin_idle(&mut self, now: u32) {
        self.running_counts = now.wrapping_sub(self.last_idle_end);
        self.last_idle_start = now;
    }

    /// Data arrived, processing starts
    pub fn end_idle(&mut self, now: u32) {
        self.idle_counts = now.wrapping_sub(self.last_idle_start);
        self.last_idle_end = now;
    }

    /// Check the block counter for a gap. Returns true when blocks were
    /// skipped since the previous cycle.
    pub fn observe_sequence(&mut self, sequence: u32) -> bool {
        let previous = self.previous_sequence.replace(sequence);
        let Some(previous) = previous else {
            return false;
        };
        let gap = sequence.wrapping_sub(previous);
        if gap == 1 {
            return false;
        }
        self.dropped_cycles = self.dropped_cycles.saturating_add(gap.saturating_sub(1));
        true
    }

    /// Forget the previous block counter, e.g. after blocks were consumed
    /// outside the main loop
    pub fn resync(&mut self) {
        self.previous_sequence = None;
    }

    pub fn idle_counts(&self) -> u32 {
        self.idle_counts
    }

    pub fn running_counts(&self) -> u32 {
        self.running_counts
    }

    pub fn dropped_cycles(&self) -> u32 {
        self.dropped_cycles
    }

    pub fn report(&self) -> LoadReport {
        let total = self.idle_counts as u64 + self.running_counts as u64;
        let load_percent = if total == 0 {
            0.0
        } else {
            (self.running_counts as f64 / total as f64 * 100.0) as f32
        };
        let ticks_per_unit = (self.timer_rate / 10_000).max(1);
        LoadReport {
            load_percent,
            idle_time: self.idle_counts / ticks_per_unit,
            run_time: self.running_counts / ticks_per_unit,
            dropped_cycles: self.dropped_cycles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_plus_running_is_elapsed() {
        let mut monitor = LoadMonitor::new(1_000_000);
        monitor.start(1_000);

        let mut previous_end = 1_000u32;
        for (busy, wait) in [(300u32, 12_200u32), (9_000, 3_500), (0, 12_500)] {
            let idle_start = previous_end + busy;
            monitor.begin_idle(idle_start);
            let idle_end = idle_start + wait;
            monitor.end_idle(idle_end);

            assert_eq!(
                monitor.idle_counts() + monitor.running_counts(),
                idle_end - previous_end,
                "no ticks may be lost between cycles"
            );
            previous_end = idle_end;
        }
    }

    #[test]
    fn test_counter_wraparound() {
        let mut monitor = LoadMonitor::new(1_000_000);
        monitor.start(u32::MAX - 100);
        monitor.begin_idle(u32::MAX - 50);
        monitor.end_idle(49);
        assert_eq!(monitor.running_counts(), 50);
        assert_eq!(monitor.idle_counts(), 100);
    }

    #[test]
    fn test_report_units() {
        let mut monitor = LoadMonitor::new(1_000_000);
        monitor.start(0);
        monitor.begin_idle(2_500);
        monitor.end_idle(12_500);
        let report = monitor.report();
        assert!((report.load_percent - 20.0).abs() < 1e-4, "got {}", report.load_percent);
        // 100 ticks per 100 us at 1 MHz
        assert_eq!(report.run_time, 25);
        assert_eq!(report.idle_time, 100);
    }

    #[test]
    fn test_report_before_first_cycle() {
        let monitor = LoadMonitor::new(1_000_000);
        assert_eq!(monitor.report(), LoadReport::default());
    }

    #[test]
    fn test_sequence_gaps_count_dropped_cycles() {
        let mut monitor = LoadMonitor::new(1_000_000);
        assert!(!monitor.observe_sequence(10));
        assert!(!monitor.observe_sequence(11));
        assert!(monitor.observe_sequence(14), "two blocks were skipped");
        assert_eq!(monitor.dropped_cycles(), 2);
        assert!(!monitor.observe_sequence(15));

        monitor.resync();
        assert!(!monitor.observe_sequence(400), "first block after resync is never a gap");
        assert_eq!(monitor.dropped_cycles(), 2);
    }

    #[test]
    fn test_sequence_wraps() {
        let mut monitor = LoadMonitor::new(1_000_000);
        monitor.observe_sequence(u32::MAX);
        assert!(!monitor.observe_sequence(0));
    }
}
