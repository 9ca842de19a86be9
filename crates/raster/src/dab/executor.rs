//! Worker pool that renders dabs off the painting thread
//!
//! Requests are numbered on submission and fanned out to the workers over a
//! job channel. Results come back in completion order and wait in a reorder
//! buffer until every earlier dab has been delivered or dropped, so the
//! compositor always sees dabs in stroke order.

use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use glam::{IVec2, Vec2};
use tracing::{debug, trace, warn};

use super::{
    DabRenderingResources, DabRequest, DabShape, FixedDab, RenderError, RenderedDab, ResourceFactory, dab_origin,
};
use crate::color::{Color, ColorSpace};
use crate::constants::AVERAGE_OPACITY_EXPONENT;
use crate::stats::RollingMean;
use impasto_config::EngineConfig;

/// Sub-pixel phases closer than this share a cached dab
const CACHE_PHASE_STEPS: f32 = 8.0;

struct Job {
    seq: u64,
    request: DabRequest,
}

struct JobResult {
    seq: u64,
    outcome: Result<(Arc<FixedDab>, IVec2), RenderError>,
    elapsed: Duration,
}

/// Compositing parameters fixed at submission
#[derive(Debug, Clone, Copy)]
struct Submission {
    opacity: f32,
    flow: f32,
    average_opacity: f32,
    position: Vec2,
}

enum Slot {
    Rendering(Submission),
    Rendered(Submission, Arc<FixedDab>, IVec2),
    /// Reuses the buffer rendered for dab `source`
    Cached { submission: Submission, source: u64 },
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
struct CacheKey {
    shape: DabShape,
    color: Color,
    softness: f32,
    phase: (i32, i32),
}

impl CacheKey {
    fn of(request: &DabRequest) -> Self {
        let fract = request.position - request.position.floor();
        Self {
            shape: request.shape,
            color: request.color.clone(),
            softness: request.softness,
            phase: (
                (fract.x * CACHE_PHASE_STEPS) as i32,
                (fract.y * CACHE_PHASE_STEPS) as i32,
            ),
        }
    }
}

/// Running opacity of a stroke: jumps up immediately, decays slowly
#[inline]
fn blend_average_opacity(opacity: f32, average: f32) -> f32 {
    if average < opacity {
        opacity
    } else {
        AVERAGE_OPACITY_EXPONENT * opacity + (1.0 - AVERAGE_OPACITY_EXPONENT) * average
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_worker(
    index: usize,
    factory: Arc<dyn ResourceFactory>,
    color_space: &'static dyn ColorSpace,
    jobs: Receiver<Job>,
    results: Sender<JobResult>,
) {
    let mut resources = factory.create();
    for job in jobs.iter() {
        let started = Instant::now();
        let rendered = catch_unwind(AssertUnwindSafe(|| resources.render(&job.request, color_space)));
        let outcome = match rendered {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("Dab worker {} panicked on dab {}: {}", index, job.seq, message);
                resources = factory.create();
                Err(RenderError::WorkerPanic(message))
            }
        };
        let result = JobResult {
            seq: job.seq,
            outcome,
            elapsed: started.elapsed(),
        };
        if results.send(result).is_err() {
            break;
        }
    }
    trace!("Dab worker {} exiting", index);
}

/// Asynchronous dab renderer with in-order delivery
pub struct DabRenderingExecutor {
    color_space: &'static dyn ColorSpace,
    jobs: Option<Sender<Job>>,
    results: Receiver<JobResult>,
    workers: Vec<JoinHandle<()>>,
    /// Undelivered dabs keyed by submission number
    slots: BTreeMap<u64, Slot>,
    ready: VecDeque<RenderedDab>,
    next_seq: u64,
    next_delivery: u64,
    in_flight: usize,
    average_opacity: f32,
    cache_enabled: bool,
    last_key: Option<(CacheKey, u64)>,
    last_source: Option<(u64, Arc<FixedDab>)>,
    /// Submitting thread's own resources; vets samples that hit the cache
    gate: DabRenderingResources,
    dab_size: RollingMean,
    render_time_ms: RollingMean,
}

impl DabRenderingExecutor {
    /// Start `config.worker_threads` workers rendering for a device in
    /// `color_space`. Each worker builds its own resources from `factory`.
    pub fn new<F>(
        color_space: &'static dyn ColorSpace,
        factory: F,
        config: &EngineConfig,
        cache_enabled: bool,
    ) -> Self
    where
        F: ResourceFactory + 'static,
    {
        let factory: Arc<dyn ResourceFactory> = Arc::new(factory);
        let gate = factory.create();
        let (job_tx, job_rx) = unbounded::<Job>();
        let (result_tx, result_rx) = unbounded::<JobResult>();

        let count = config.resolved_worker_threads().max(1);
        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let factory = Arc::clone(&factory);
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("dab-worker-{index}"))
                .spawn(move || run_worker(index, factory, color_space, jobs, results));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => warn!("Failed to spawn dab worker {}: {}", index, e),
            }
        }
        debug!(
            "DabRenderingExecutor started {} workers for {} (cache {})",
            workers.len(),
            color_space.id(),
            if cache_enabled { "on" } else { "off" }
        );

        Self {
            color_space,
            jobs: Some(job_tx),
            results: result_rx,
            workers,
            slots: BTreeMap::new(),
            ready: VecDeque::new(),
            next_seq: 0,
            next_delivery: 0,
            in_flight: 0,
            average_opacity: 0.0,
            cache_enabled,
            last_key: None,
            last_source: None,
            gate,
            dab_size: RollingMean::new(config.dab_size_window),
            render_time_ms: RollingMean::new(config.render_time_window),
        }
    }

    pub fn color_space(&self) -> &'static dyn ColorSpace {
        self.color_space
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a dab for rendering. Never blocks.
    pub fn add_dab(&mut self, request: DabRequest, opacity: f32, flow: f32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.average_opacity = blend_average_opacity(opacity, self.average_opacity);
        let submission = Submission {
            opacity,
            flow,
            average_opacity: self.average_opacity,
            position: request.position,
        };

        if self.cache_enabled {
            let key = CacheKey::of(&request);
            let hit = match &self.last_key {
                Some((last, source)) if *last == key => Some(*source),
                _ => None,
            };
            if let Some(source) = hit {
                if !self.gate.brush().can_paint_for(&request.info) {
                    trace!("Dab {} refused by brush", seq);
                    self.slots.insert(seq, Slot::Failed);
                    self.deliver();
                    return;
                }
                trace!("Dab {} reuses dab {}", seq, source);
                self.slots.insert(seq, Slot::Cached { submission, source });
                self.deliver();
                return;
            }
            self.last_key = Some((key, seq));
        }

        let sent = self
            .jobs
            .as_ref()
            .is_some_and(|jobs| jobs.send(Job { seq, request }).is_ok());
        if sent {
            self.in_flight += 1;
            self.slots.insert(seq, Slot::Rendering(submission));
        } else {
            warn!("Dropping dab {}: no rendering workers", seq);
            self.slots.insert(seq, Slot::Failed);
            self.deliver();
        }
    }

    fn accept(&mut self, result: JobResult) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.render_time_ms
            .push(result.elapsed.as_secs_f64() * 1000.0);
        let Some(slot) = self.slots.get_mut(&result.seq) else {
            return;
        };
        let Slot::Rendering(submission) = *slot else {
            return;
        };
        *slot = match result.outcome {
            Ok((dab, offset)) => {
                self.dab_size
                    .push(dab.width().max(dab.height()) as f64);
                Slot::Rendered(submission, dab, offset)
            }
            Err(e) => {
                warn!("Dropping dab {}: {}", result.seq, e);
                Slot::Failed
            }
        };
    }

    /// Move every dab whose predecessors are settled into the ready queue
    fn deliver(&mut self) {
        loop {
            match self.slots.get(&self.next_delivery) {
                None | Some(Slot::Rendering(_)) => break,
                Some(_) => {}
            }
            let seq = self.next_delivery;
            self.next_delivery += 1;
            let Some(slot) = self.slots.remove(&seq) else {
                break;
            };
            match slot {
                Slot::Rendered(submission, dab, offset) => {
                    self.last_source = Some((seq, Arc::clone(&dab)));
                    self.ready.push_back(RenderedDab {
                        dab,
                        offset,
                        opacity: submission.opacity,
                        flow: submission.flow,
                        average_opacity: submission.average_opacity,
                        seq,
                    });
                }
                Slot::Cached { submission, source } => match &self.last_source {
                    Some((rendered, dab)) if *rendered == source => {
                        let offset = dab_origin(submission.position, dab.width(), dab.height());
                        self.ready.push_back(RenderedDab {
                            dab: Arc::clone(dab),
                            offset,
                            opacity: submission.opacity,
                            flow: submission.flow,
                            average_opacity: submission.average_opacity,
                            seq,
                        });
                    }
                    _ => warn!("Dropping cached dab {}: dab {} was not rendered", seq, source),
                },
                Slot::Failed | Slot::Rendering(_) => {}
            }
        }
    }

    fn pump(&mut self) {
        while let Ok(result) = self.results.try_recv() {
            self.accept(result);
        }
        self.deliver();
    }

    /// Whether rendered dabs are waiting. Never blocks.
    pub fn has_prepared_dabs(&mut self) -> bool {
        self.pump();
        !self.ready.is_empty()
    }

    /// Hand over every deliverable dab in submission order. Never blocks.
    pub fn take_ready_dabs(&mut self) -> Vec<RenderedDab> {
        self.pump();
        self.ready.drain(..).collect()
    }

    /// Block until every submitted dab is rendered or dropped
    pub fn wait_for_done(&mut self) {
        while self.in_flight > 0 {
            match self.results.recv() {
                Ok(result) => self.accept(result),
                Err(_) => {
                    warn!(
                        "Dab workers disconnected with {} dabs in flight",
                        self.in_flight
                    );
                    for slot in self.slots.values_mut() {
                        if matches!(slot, Slot::Rendering(_)) {
                            *slot = Slot::Failed;
                        }
                    }
                    self.in_flight = 0;
                }
            }
        }
        self.deliver();
    }

    /// Submitted dabs not yet handed over by [`take_ready_dabs`](Self::take_ready_dabs)
    pub fn pending_count(&self) -> usize {
        self.slots.len() + self.ready.len()
    }

    /// Mean side of recently rendered dab buffers, in pixels
    pub fn average_dab_size(&self) -> f64 {
        self.dab_size.mean()
    }

    pub fn average_dab_rendering_time(&self) -> Duration {
        Duration::from_secs_f64(self.render_time_ms.mean().max(0.0) / 1000.0)
    }

    /// Whether every delivered dab owns its buffer. With the dab cache on,
    /// consecutive dabs may share one and must be copied before mutation.
    pub fn dabs_have_separate_original(&self) -> bool {
        !self.cache_enabled
    }

    /// Running opacity after the last submitted dab
    pub fn average_opacity(&self) -> f32 {
        self.average_opacity
    }

    pub fn reset_average_opacity(&mut self) {
        self.average_opacity = 0.0;
    }
}

impl Drop for DabRenderingExecutor {
    fn drop(&mut self) {
        // Closing the job channel ends every worker loop
        self.jobs = None;
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Dab worker terminated abnormally");
            }
        }
        debug!("DabRenderingExecutor stopped");
    }
}
