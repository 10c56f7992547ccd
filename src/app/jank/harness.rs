use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::app::adb::device::DeviceDriver;
use crate::app::error::AppError;
use crate::app::jank::framestats::{FrameStats, FrameStatsMonitor};
use crate::app::models::{IterationRecord, IterationStatus, JankReport};

pub struct StepContext<'a> {
    pub device: &'a dyn DeviceDriver,
    pub trace_id: &'a str,
}

pub type StepFn = Box<dyn Fn(&StepContext) -> Result<(), AppError>>;

/// Ordered step descriptor for one jank test. The harness owns the order:
/// `before` once, then per iteration reset → body → collect → `after_loop`,
/// then `after_test` once.
pub struct JankTest {
    pub name: &'static str,
    pub expected_frames: u64,
    pub before: StepFn,
    pub body: StepFn,
    pub after_loop: StepFn,
    pub after_test: StepFn,
}

pub struct JankRunner {
    iterations: u32,
    jank_threshold_pct: f64,
    settle: Duration,
}

impl JankRunner {
    pub fn new(iterations: u32, jank_threshold_pct: f64, settle: Duration) -> Self {
        Self {
            iterations: iterations.max(1),
            jank_threshold_pct,
            settle,
        }
    }

    /// Runs one test. A `before` failure aborts the test; body and monitor
    /// failures are recorded per iteration, and the cleanup hooks run
    /// regardless so every iteration starts from the same baseline.
    pub fn run(
        &self,
        test: &JankTest,
        ctx: &StepContext<'_>,
        monitor: &dyn FrameStatsMonitor,
    ) -> Result<JankReport, AppError> {
        let started_at_utc = Utc::now().to_rfc3339();
        info!(trace_id = %ctx.trace_id, test = test.name, iterations = self.iterations, "jank test starting");

        (test.before)(ctx)?;

        let mut iterations = Vec::new();
        for index in 0..self.iterations {
            let start = Instant::now();
            let outcome = self.run_iteration(test, ctx, monitor);
            if let Err(err) = (test.after_loop)(ctx) {
                warn!(trace_id = %ctx.trace_id, test = test.name, index, error = %err, "after_loop failed");
            }

            let record = match outcome {
                Ok(stats) => {
                    let shortfall = stats.total_frames < test.expected_frames;
                    let too_janky = stats.jank_pct > self.jank_threshold_pct;
                    let error = if shortfall {
                        Some(format!(
                            "rendered {} frames, expected at least {}",
                            stats.total_frames, test.expected_frames
                        ))
                    } else if too_janky {
                        Some(format!(
                            "{:.2}% janky frames exceeds the {:.2}% threshold",
                            stats.jank_pct, self.jank_threshold_pct
                        ))
                    } else {
                        None
                    };
                    IterationRecord {
                        index,
                        status: if error.is_none() {
                            IterationStatus::Pass
                        } else {
                            IterationStatus::Fail
                        },
                        duration_ms: start.elapsed().as_millis(),
                        total_frames: stats.total_frames,
                        janky_frames: stats.janky_frames,
                        jank_pct: stats.jank_pct,
                        error,
                    }
                }
                Err(err) => IterationRecord {
                    index,
                    status: IterationStatus::Fail,
                    duration_ms: start.elapsed().as_millis(),
                    total_frames: 0,
                    janky_frames: 0,
                    jank_pct: 0.0,
                    error: Some(err.to_string()),
                },
            };
            iterations.push(record);
        }

        (test.after_test)(ctx)?;

        let passed = iterations
            .iter()
            .all(|record| record.status == IterationStatus::Pass);
        info!(trace_id = %ctx.trace_id, test = test.name, passed, "jank test finished");

        Ok(JankReport {
            test: test.name.to_string(),
            serial: ctx.device.serial().to_string(),
            expected_frames: test.expected_frames,
            iterations,
            passed,
            started_at_utc,
        })
    }

    fn run_iteration(
        &self,
        test: &JankTest,
        ctx: &StepContext<'_>,
        monitor: &dyn FrameStatsMonitor,
    ) -> Result<FrameStats, AppError> {
        monitor.reset(ctx.trace_id)?;
        (test.body)(ctx)?;
        if !self.settle.is_zero() {
            // Let the triggered window animation run to completion before
            // sampling the counters.
            std::thread::sleep(self.settle);
        }
        monitor.collect(ctx.trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::jank::framestats::FrameStats;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct ScriptedDevice;

    impl DeviceDriver for ScriptedDevice {
        fn serial(&self) -> &str {
            "TEST-SERIAL"
        }
        fn wake_up(&self, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn press_back(&self, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn press_home(&self, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn tap(&self, _x: i32, _y: i32, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn launch_activity(&self, _component: &str, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn select_ime(&self, _component: &str, _trace_id: &str) -> Result<(), AppError> {
            Ok(())
        }
        fn dumpsys(&self, _service_args: &[&str], _trace_id: &str) -> Result<String, AppError> {
            Ok(String::new())
        }
    }

    struct ScriptedMonitor {
        log: Arc<Mutex<Vec<String>>>,
        stats: Vec<FrameStats>,
        collects: AtomicUsize,
    }

    impl ScriptedMonitor {
        fn new(log: Arc<Mutex<Vec<String>>>, stats: Vec<FrameStats>) -> Self {
            Self {
                log,
                stats,
                collects: AtomicUsize::new(0),
            }
        }
    }

    impl FrameStatsMonitor for ScriptedMonitor {
        fn reset(&self, _trace_id: &str) -> Result<(), AppError> {
            self.log.lock().expect("log").push("reset".to_string());
            Ok(())
        }

        fn collect(&self, _trace_id: &str) -> Result<FrameStats, AppError> {
            self.log.lock().expect("log").push("collect".to_string());
            let index = self.collects.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .stats
                .get(index.min(self.stats.len().saturating_sub(1)))
                .cloned()
                .expect("scripted stats"))
        }
    }

    fn stats(total: u64, janky: u64, pct: f64) -> FrameStats {
        FrameStats {
            total_frames: total,
            janky_frames: janky,
            jank_pct: pct,
            percentile_ms: BTreeMap::new(),
        }
    }

    fn logging_step(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> StepFn {
        let log = Arc::clone(log);
        Box::new(move |_ctx| {
            log.lock().expect("log").push(name.to_string());
            Ok(())
        })
    }

    fn logging_test(log: &Arc<Mutex<Vec<String>>>, expected_frames: u64) -> JankTest {
        JankTest {
            name: "scripted",
            expected_frames,
            before: logging_step(log, "before"),
            body: logging_step(log, "body"),
            after_loop: logging_step(log, "after_loop"),
            after_test: logging_step(log, "after_test"),
        }
    }

    #[test]
    fn hooks_run_in_the_mandated_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let test = logging_test(&log, 10);
        let monitor = ScriptedMonitor::new(Arc::clone(&log), vec![stats(12, 0, 0.0)]);
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let runner = JankRunner::new(2, 5.0, Duration::ZERO);
        let report = runner.run(&test, &ctx, &monitor).expect("report");

        assert_eq!(
            *log.lock().expect("log"),
            vec![
                "before",
                "reset", "body", "collect", "after_loop",
                "reset", "body", "collect", "after_loop",
                "after_test",
            ]
        );
        assert!(report.passed);
        assert_eq!(report.iterations.len(), 2);
        assert_eq!(report.serial, "TEST-SERIAL");
    }

    #[test]
    fn before_failure_aborts_the_test() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut test = logging_test(&log, 10);
        test.before = Box::new(|ctx| Err(AppError::device("launch failed", ctx.trace_id)));
        let monitor = ScriptedMonitor::new(Arc::clone(&log), vec![stats(12, 0, 0.0)]);
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let err = JankRunner::new(1, 5.0, Duration::ZERO)
            .run(&test, &ctx, &monitor)
            .expect_err("abort");
        assert_eq!(err.code, "ERR_DEVICE");
        assert!(log.lock().expect("log").is_empty());
    }

    #[test]
    fn body_failure_still_runs_the_cleanup_hooks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut test = logging_test(&log, 10);
        test.body = Box::new(|ctx| Err(AppError::device("tap failed", ctx.trace_id)));
        let monitor = ScriptedMonitor::new(Arc::clone(&log), vec![stats(12, 0, 0.0)]);
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let report = JankRunner::new(1, 5.0, Duration::ZERO)
            .run(&test, &ctx, &monitor)
            .expect("report");

        assert_eq!(
            *log.lock().expect("log"),
            vec!["before", "reset", "after_loop", "after_test"]
        );
        assert!(!report.passed);
        assert_eq!(report.failures(), 1);
    }

    #[test]
    fn frame_shortfall_fails_the_iteration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let test = logging_test(&log, 10);
        let monitor = ScriptedMonitor::new(Arc::clone(&log), vec![stats(6, 0, 0.0)]);
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let report = JankRunner::new(1, 5.0, Duration::ZERO)
            .run(&test, &ctx, &monitor)
            .expect("report");
        assert!(!report.passed);
        let record = &report.iterations[0];
        assert_eq!(record.total_frames, 6);
        assert!(record.error.as_deref().unwrap().contains("expected at least 10"));
    }

    #[test]
    fn jank_over_threshold_fails_the_iteration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let test = logging_test(&log, 10);
        let monitor = ScriptedMonitor::new(Arc::clone(&log), vec![stats(20, 4, 20.0)]);
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let report = JankRunner::new(1, 5.0, Duration::ZERO)
            .run(&test, &ctx, &monitor)
            .expect("report");
        assert!(!report.passed);
        assert!(report.iterations[0]
            .error
            .as_deref()
            .unwrap()
            .contains("threshold"));
    }

    #[test]
    fn mixed_iterations_report_individual_verdicts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let test = logging_test(&log, 10);
        let monitor = ScriptedMonitor::new(
            Arc::clone(&log),
            vec![stats(14, 0, 0.0), stats(4, 2, 50.0), stats(11, 0, 0.0)],
        );
        let device = ScriptedDevice;
        let ctx = StepContext {
            device: &device,
            trace_id: "t",
        };

        let report = JankRunner::new(3, 5.0, Duration::ZERO)
            .run(&test, &ctx, &monitor)
            .expect("report");
        assert!(!report.passed);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.iterations[0].status, IterationStatus::Pass);
        assert_eq!(report.iterations[1].status, IterationStatus::Fail);
        assert_eq!(report.iterations[2].status, IterationStatus::Pass);
    }
}
