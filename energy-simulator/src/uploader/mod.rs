//! Periodic generation with batched delivery.
//!
//! The loop is the only owner of the buffer. Cancellation is cooperative: a
//! signal task cancels the token, and the loop notices it on its next poll,
//! performs one final flush and terminates.

use std::time::Duration;

use energy_client::domain::Measurement;
use rand::Rng;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::generator::RecordGenerator;
use crate::sinks::BatchSink;

#[derive(Debug, Clone)]
pub struct UploaderConfig {
    pub generation_interval: Duration,
    pub flush_interval: Duration,
    /// How often the loop wakes up to check timers and cancellation.
    pub poll_interval: Duration,
    /// Total run time; `None` runs until cancelled.
    pub time_budget: Option<Duration>,
    /// Stop this long before the budget runs out so the final flush fits.
    pub budget_margin: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            generation_interval: Duration::from_secs(3),
            flush_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            time_budget: None,
            budget_margin: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Flushing,
    Stopping,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered { records: usize, key: Option<String> },
    /// The sink failed; the buffer still holds `retained` records.
    Failed { retained: usize },
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub generated: bool,
    pub flush: Option<FlushOutcome>,
    pub stopped: Option<StopReason>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub generated: u64,
    pub delivered: u64,
    pub flushes: u64,
    pub failed_flushes: u64,
    /// Records still buffered after termination (final flush failed).
    pub undelivered: usize,
    pub stop_reason: Option<StopReason>,
}

pub struct UploaderLoop<R, S> {
    generator: RecordGenerator<R>,
    sink: S,
    config: UploaderConfig,
    state: LoopState,
    buffer: Vec<Measurement>,
    started_at: Option<Instant>,
    last_generated: Option<Instant>,
    last_flush: Option<Instant>,
    summary: RunSummary,
}

impl<R, S> UploaderLoop<R, S>
where
    R: Rng + Send,
    S: BatchSink,
{
    pub fn new(generator: RecordGenerator<R>, sink: S, config: UploaderConfig) -> Self {
        Self {
            generator,
            sink,
            config,
            state: LoopState::Idle,
            buffer: Vec::new(),
            started_at: None,
            last_generated: None,
            last_flush: None,
            summary: RunSummary::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn buffer(&self) -> &[Measurement] {
        &self.buffer
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Idle -> Running. Interval timers count from `now`.
    pub fn start(&mut self, now: Instant) {
        if self.state != LoopState::Idle {
            return;
        }
        self.started_at = Some(now);
        self.last_generated = Some(now);
        self.last_flush = Some(now);
        self.state = LoopState::Running;
        tracing::info!(
            generation_interval_ms = self.config.generation_interval.as_millis() as u64,
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "simulation started"
        );
    }

    /// One scheduler step. Once the loop has terminated, ticks do nothing.
    pub async fn tick(&mut self, now: Instant, cancel: &CancellationToken) -> TickReport {
        match self.state {
            LoopState::Idle => self.start(now),
            LoopState::Running => {}
            LoopState::Flushing | LoopState::Stopping | LoopState::Terminated => {
                return TickReport::default();
            }
        }

        if cancel.is_cancelled() {
            return self.stop(StopReason::Cancelled).await;
        }
        if self.budget_exhausted(now) {
            tracing::info!("approaching time budget, uploading data and exiting");
            return self.stop(StopReason::BudgetExhausted).await;
        }

        let mut report = TickReport::default();

        if elapsed(now, self.last_generated) >= self.config.generation_interval {
            let m = self.generator.generate();
            tracing::debug!(
                site_id = %m.site_id,
                energy_generated = m.energy_generated,
                energy_consumed = m.energy_consumed,
                "generated measurement"
            );
            metrics::counter!("simulator_generated_records_total").increment(1);
            self.buffer.push(m);
            self.summary.generated += 1;
            self.last_generated = Some(now);
            report.generated = true;
        }

        if elapsed(now, self.last_flush) >= self.config.flush_interval {
            report.flush = Some(self.flush_buffer().await);
            // A failed flush waits for the next interval, no retry in between.
            self.last_flush = Some(now);
        }

        metrics::gauge!("simulator_buffered_records").set(self.buffer.len() as f64);
        report
    }

    /// Drive the loop on the tokio clock until cancelled or out of budget.
    pub async fn run(mut self, cancel: CancellationToken) -> RunSummary {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.start(Instant::now());
        loop {
            ticker.tick().await;
            let report = self.tick(Instant::now(), &cancel).await;
            if report.stopped.is_some() {
                break;
            }
        }

        tracing::info!(
            generated = self.summary.generated,
            delivered = self.summary.delivered,
            failed_flushes = self.summary.failed_flushes,
            undelivered = self.summary.undelivered,
            "final data flushed, exiting"
        );
        self.summary
    }

    fn budget_exhausted(&self, now: Instant) -> bool {
        match self.config.time_budget {
            Some(budget) => elapsed(now, self.started_at) + self.config.budget_margin >= budget,
            None => false,
        }
    }

    async fn stop(&mut self, reason: StopReason) -> TickReport {
        self.state = LoopState::Stopping;
        tracing::info!(?reason, buffered = self.buffer.len(), "stopping, flushing remaining data");

        let outcome = self.flush_buffer().await;

        self.summary.undelivered = self.buffer.len();
        self.summary.stop_reason = Some(reason);
        self.state = LoopState::Terminated;

        TickReport {
            generated: false,
            flush: Some(outcome),
            stopped: Some(reason),
        }
    }

    async fn flush_buffer(&mut self) -> FlushOutcome {
        let resume = self.state;
        self.state = LoopState::Flushing;

        let outcome = match self.sink.flush(&self.buffer).await {
            Ok(key) => {
                let records = self.buffer.len();
                self.buffer = Vec::new();
                self.summary.flushes += 1;
                self.summary.delivered += records as u64;
                metrics::counter!("simulator_flushed_records_total").increment(records as u64);
                FlushOutcome::Delivered { records, key }
            }
            Err(e) => {
                let retained = self.buffer.len();
                self.summary.failed_flushes += 1;
                metrics::counter!("simulator_flush_errors_total").increment(1);
                tracing::error!(error = %e, retained, "failed to flush batch, keeping buffer");
                FlushOutcome::Failed { retained }
            }
        };

        self.state = resume;
        outcome
    }
}

fn elapsed(now: Instant, since: Option<Instant>) -> Duration {
    since.map_or(Duration::ZERO, |t| now.saturating_duration_since(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::GeneratorConfig;
    use crate::sinks::SinkError;
    use rand::{rngs::StdRng, SeedableRng};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    };

    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<Vec<Measurement>>>>,
        fail: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<Vec<Measurement>> {
            self.calls.lock().unwrap().clone()
        }

        fn set_failing(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl BatchSink for RecordingSink {
        async fn flush(&self, batch: &[Measurement]) -> Result<Option<String>, SinkError> {
            self.calls.lock().unwrap().push(batch.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                return Err(SinkError::Io {
                    path: "unreachable".to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "sink down"),
                });
            }
            Ok((!batch.is_empty()).then(|| format!("batch-{}", batch.len())))
        }
    }

    const TICK: Duration = Duration::from_secs(1);

    fn uploader(
        sink: RecordingSink,
        generation_ticks: u32,
        flush_ticks: u32,
    ) -> UploaderLoop<StdRng, RecordingSink> {
        let generator = RecordGenerator::with_rng(GeneratorConfig::default(), StdRng::seed_from_u64(7));
        let config = UploaderConfig {
            generation_interval: TICK * generation_ticks,
            flush_interval: TICK * flush_ticks,
            poll_interval: TICK,
            time_budget: None,
            budget_margin: Duration::ZERO,
        };
        UploaderLoop::new(generator, sink, config)
    }

    #[tokio::test]
    async fn buffer_grows_by_one_per_generation_tick() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 1_000);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);
        assert_eq!(up.state(), LoopState::Running);

        for n in 1..=25u32 {
            let report = up.tick(t0 + TICK * n, &cancel).await;
            assert!(report.generated);
            assert!(report.flush.is_none());
        }

        assert_eq!(up.buffer().len(), 25);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn flushes_three_records_after_three_ticks() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 3);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        for n in 1..=2u32 {
            let report = up.tick(t0 + TICK * n, &cancel).await;
            assert!(report.flush.is_none());
        }
        let report = up.tick(t0 + TICK * 3, &cancel).await;

        assert_eq!(
            report.flush,
            Some(FlushOutcome::Delivered {
                records: 3,
                key: Some("batch-3".to_string())
            })
        );
        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 3);
        assert!(up.buffer().is_empty());
        assert_eq!(up.state(), LoopState::Running);
    }

    #[tokio::test]
    async fn flushed_batch_matches_buffer_contents() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 4);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        for n in 1..=3u32 {
            up.tick(t0 + TICK * n, &cancel).await;
        }
        let before_flush = up.buffer().to_vec();
        up.tick(t0 + TICK * 4, &cancel).await;

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][..3], before_flush[..]);
        assert_eq!(calls[0].len(), before_flush.len() + 1);
    }

    #[tokio::test]
    async fn cancellation_flushes_pending_records_once_and_stops() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 100);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        up.tick(t0 + TICK, &cancel).await;
        up.tick(t0 + TICK * 2, &cancel).await;
        assert_eq!(up.buffer().len(), 2);

        cancel.cancel();
        let report = up.tick(t0 + TICK * 3, &cancel).await;
        assert_eq!(report.stopped, Some(StopReason::Cancelled));
        assert!(!report.generated);
        assert_eq!(up.state(), LoopState::Terminated);

        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);

        // Terminated loops ignore further ticks.
        let after = up.tick(t0 + TICK * 200, &cancel).await;
        assert_eq!(after, TickReport::default());
        assert_eq!(sink.calls().len(), 1);
        assert_eq!(up.summary().generated, 2);
    }

    #[tokio::test]
    async fn cancellation_with_empty_buffer_still_calls_sink() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 10, 100);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        cancel.cancel();
        let report = up.tick(t0 + TICK, &cancel).await;

        assert_eq!(
            report.flush,
            Some(FlushOutcome::Delivered {
                records: 0,
                key: None
            })
        );
        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].is_empty());
    }

    #[tokio::test]
    async fn sink_failure_keeps_buffer_and_loop_resumes() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 2);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        sink.set_failing(true);
        up.tick(t0 + TICK, &cancel).await;
        let report = up.tick(t0 + TICK * 2, &cancel).await;
        assert_eq!(report.flush, Some(FlushOutcome::Failed { retained: 2 }));
        assert_eq!(up.buffer().len(), 2);
        assert_eq!(up.state(), LoopState::Running);

        // Next tick carries on generating, no flush until the interval passes again.
        sink.set_failing(false);
        let report = up.tick(t0 + TICK * 3, &cancel).await;
        assert!(report.generated);
        assert!(report.flush.is_none());
        assert_eq!(up.buffer().len(), 3);

        let report = up.tick(t0 + TICK * 4, &cancel).await;
        assert_eq!(
            report.flush,
            Some(FlushOutcome::Delivered {
                records: 4,
                key: Some("batch-4".to_string())
            })
        );
        assert!(up.buffer().is_empty());
        assert_eq!(up.summary().failed_flushes, 1);
        assert_eq!(up.summary().delivered, 4);
    }

    #[tokio::test]
    async fn failed_final_flush_reports_undelivered_records() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink.clone(), 1, 100);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        up.tick(t0 + TICK, &cancel).await;
        sink.set_failing(true);
        cancel.cancel();
        let report = up.tick(t0 + TICK * 2, &cancel).await;

        assert_eq!(report.flush, Some(FlushOutcome::Failed { retained: 1 }));
        assert_eq!(up.state(), LoopState::Terminated);
        assert_eq!(up.summary().undelivered, 1);
    }

    #[tokio::test]
    async fn stops_when_budget_margin_is_reached() {
        let sink = RecordingSink::default();
        let generator = RecordGenerator::with_rng(GeneratorConfig::default(), StdRng::seed_from_u64(1));
        let config = UploaderConfig {
            generation_interval: TICK,
            flush_interval: TICK * 100,
            poll_interval: TICK,
            time_budget: Some(TICK * 10),
            budget_margin: TICK * 3,
        };
        let mut up = UploaderLoop::new(generator, sink.clone(), config);
        let cancel = CancellationToken::new();
        let t0 = Instant::now();
        up.start(t0);

        for n in 1..=6u32 {
            let report = up.tick(t0 + TICK * n, &cancel).await;
            assert!(report.stopped.is_none());
        }
        let report = up.tick(t0 + TICK * 7, &cancel).await;

        assert_eq!(report.stopped, Some(StopReason::BudgetExhausted));
        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 6);
    }

    #[tokio::test]
    async fn first_tick_starts_an_idle_loop() {
        let sink = RecordingSink::default();
        let mut up = uploader(sink, 1, 3);
        assert_eq!(up.state(), LoopState::Idle);

        let report = up.tick(Instant::now(), &CancellationToken::new()).await;
        assert_eq!(up.state(), LoopState::Running);
        assert!(!report.generated);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_after_cancellation_with_final_flush() {
        let sink = RecordingSink::default();
        let up = uploader(sink.clone(), 1, 60);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2_200)).await;
            trigger.cancel();
        });

        let summary = up.run(cancel).await;

        assert_eq!(summary.stop_reason, Some(StopReason::Cancelled));
        let calls = sink.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len() as u64, summary.generated);
        assert_eq!(summary.delivered, summary.generated);
        assert_eq!(summary.undelivered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_delivers_everything_within_budget() {
        let sink = RecordingSink::default();
        let generator = RecordGenerator::with_rng(GeneratorConfig::default(), StdRng::seed_from_u64(3));
        let config = UploaderConfig {
            generation_interval: Duration::from_secs(1),
            flush_interval: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            time_budget: Some(Duration::from_secs(20)),
            budget_margin: Duration::from_secs(5),
        };
        let up = UploaderLoop::new(generator, sink.clone(), config);

        let summary = up.run(CancellationToken::new()).await;

        assert_eq!(summary.stop_reason, Some(StopReason::BudgetExhausted));
        assert!(summary.generated > 0);
        assert_eq!(summary.delivered, summary.generated);
        let calls = sink.calls();
        assert!(calls.len() >= 2, "periodic flushes plus the final one");
        let flushed: usize = calls.iter().map(Vec::len).sum();
        assert_eq!(flushed as u64, summary.generated);
    }
}
