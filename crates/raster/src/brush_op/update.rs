//! Periodic compositing of rendered dabs

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::BrushOp;
use crate::constants::{MAX_PATCH_SIZE, MIN_PATCH_SIZE, PATCH_STEP};
use crate::dab::RenderedDab;
use crate::error::RasterError;
use crate::geometry::Rect;

/// Statistics of one compositing pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateStats {
    /// Dabs composited
    pub dabs: usize,
    /// Patches they were split into
    pub rects: usize,
    /// Wall time of compositing, mirroring included
    pub composite_time: Duration,
    /// Period chosen for the next pass
    pub period: Duration,
    pub forced: bool,
}

/// Next polling period: 20× the per-dab render time or 1.5× the last
/// compositing time, whichever is longer, within `[min, max]`
pub fn adapt_update_period(render_time: Duration, update_time: Duration, min: Duration, max: Duration) -> Duration {
    let by_render = render_time * 20;
    let by_update = update_time * 3 / 2;
    by_render.max(by_update).clamp(min, max.max(min))
}

/// Merge intersecting rectangles until all are pairwise disjoint
fn merge_overlapping(mut rects: Vec<Rect>) -> Vec<Rect> {
    loop {
        let mut pair = None;
        'search: for i in 0..rects.len() {
            for j in i + 1..rects.len() {
                if rects[i].intersects(&rects[j]) {
                    pair = Some((i, j));
                    break 'search;
                }
            }
        }
        let Some((i, j)) = pair else {
            return rects;
        };
        let absorbed = rects.swap_remove(j);
        rects[i] = rects[i].union(&absorbed);
    }
}

/// Partition the footprints of `dabs` into pairwise disjoint patches.
///
/// The patch grid is sized so that about `ideal_rects` patches cover the
/// batch, but never smaller than one dab or one spacing step. Inside each
/// cell only the footprints are kept, so pixels no dab touches are never
/// part of a patch.
pub fn split_dabs_into_rects(dabs: &[RenderedDab], ideal_rects: usize, diameter: f64, spacing: f64) -> Vec<Rect> {
    let footprints: Vec<Rect> = dabs
        .iter()
        .map(RenderedDab::rect)
        .filter(|r| !r.is_empty())
        .collect();
    let Some(bounds) = footprints.iter().copied().reduce(|a, b| a.union(&b)) else {
        return Vec::new();
    };

    let by_area = (bounds.area() as f64 / ideal_rects.max(1) as f64).sqrt();
    let wanted = by_area.max(diameter).max(spacing).max(MIN_PATCH_SIZE as f64).ceil() as i32;
    let patch = ((wanted + PATCH_STEP - 1) / PATCH_STEP * PATCH_STEP).min(MAX_PATCH_SIZE);

    let mut rects = Vec::new();
    for y in (bounds.y..bounds.bottom()).step_by(patch as usize) {
        for x in (bounds.x..bounds.right()).step_by(patch as usize) {
            let cell = Rect::new(x, y, patch, patch);
            let pieces: Vec<Rect> = footprints
                .iter()
                .map(|f| f.intersection(&cell))
                .filter(|r| !r.is_empty())
                .collect();
            rects.extend(merge_overlapping(pieces));
        }
    }
    trace!(
        "Split {} dabs into {} rects (patch {}px)",
        dabs.len(),
        rects.len(),
        patch
    );
    rects
}

impl BrushOp {
    /// Composite the dabs rendered so far and return the delay until the
    /// next call.
    ///
    /// With `force_last_update` every queued dab is waited for and
    /// composited; otherwise only dabs that are already rendered are.
    pub fn do_asynchronous_update(&mut self, force_last_update: bool) -> Result<Duration, RasterError> {
        if force_last_update {
            self.executor.wait_for_done();
        }
        if !self.executor.has_prepared_dabs() {
            return Ok(self.update_period);
        }
        let started = Instant::now();
        let dabs = self.executor.take_ready_dabs();

        let diameter = self.executor.average_dab_size();
        let spacing = self.spacing_mean.mean();
        let rects = split_dabs_into_rects(&dabs, rayon::current_num_threads(), diameter, spacing);

        self.painter.blt_fixed(&rects, &dabs)?;
        self.painter.add_dirty_rects(&rects);
        let average_opacity = dabs.last().map(|d| d.average_opacity);
        let (dab_count, rect_count) = (dabs.len(), rects.len());
        self.render_mirror_dabs(dabs, rects)?;
        if let Some(opacity) = average_opacity {
            self.painter.set_average_opacity(opacity);
        }

        let composite_time = started.elapsed();
        let previous = self.update_period;
        self.update_period = adapt_update_period(
            self.executor.average_dab_rendering_time(),
            composite_time,
            Duration::from_millis(self.config.min_update_period_ms),
            Duration::from_millis(self.config.max_update_period_ms),
        );
        if self.update_period != previous {
            debug!(
                "Update period {:?} -> {:?} after {} dabs in {:?}",
                previous, self.update_period, dab_count, composite_time
            );
        }
        self.last_update = UpdateStats {
            dabs: dab_count,
            rects: rect_count,
            composite_time,
            period: self.update_period,
            forced: force_last_update,
        };
        Ok(self.update_period)
    }

    /// Replay a composited batch at each mirrored position
    fn render_mirror_dabs(&mut self, mut dabs: Vec<RenderedDab>, mut rects: Vec<Rect>) -> Result<(), RasterError> {
        for direction in self.painter.mirror().passes() {
            for dab in &mut dabs {
                self.painter.mirror_dab(dab, direction);
            }
            for rect in &mut rects {
                *rect = self.painter.mirror_rect(*rect, direction);
            }
            self.painter.blt_fixed(&rects, &dabs)?;
            self.painter.add_dirty_rects(&rects);
        }
        Ok(())
    }
}
