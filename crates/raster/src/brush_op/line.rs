//! Dab placement along stroke segments

use tracing::trace;

use super::BrushOp;
use crate::device::{PaintDevice, read_device, write_device};
use crate::error::RasterError;
use crate::paint_info::{DistanceInfo, PaintInfo};
use crate::painter::Painter;

impl BrushOp {
    /// Paint the segment from `from` to `to`.
    ///
    /// Dabs are placed wherever the accumulated distance reaches the current
    /// spacing or the accumulated time reaches the airbrush interval,
    /// whichever comes first. Progress past the last dab is kept in
    /// `distance` for the next segment. The first segment of a stroke
    /// starts with a dab at `from`.
    pub fn paint_line(
        &mut self,
        from: &PaintInfo,
        to: &PaintInfo,
        distance: &mut DistanceInfo,
    ) -> Result<(), RasterError> {
        if self.settings.sharpness && self.brush.width() == 1 && self.brush.height() == 1 {
            return self.paint_sharp_line(from, to, distance);
        }

        if !distance.has_last_dab() {
            self.place_dab(from, distance);
        }

        // Progress is kept in pixels and milliseconds so long segments stay
        // on the spacing grid
        let length = from.pos.distance(to.pos) as f64;
        let duration = (to.time - from.time).max(0.0) as f64;
        let mut walked = 0.0f64;
        let mut elapsed = 0.0f64;
        loop {
            let by_distance = (length > 0.0)
                .then(|| walked + distance.distance_to_next_dab() as f64)
                .filter(|&at| at <= length);
            let by_time = distance
                .time_to_next_dab()
                .filter(|_| duration > 0.0)
                .map(|remaining| elapsed + remaining as f64)
                .filter(|&at| at <= duration);

            let t = match (by_distance, by_time) {
                (Some(at), time) if time.is_none_or(|when| at / length <= when / duration) => {
                    walked = at;
                    elapsed = at / length * duration;
                    at / length
                }
                (_, Some(when)) => {
                    elapsed = when;
                    walked = when / duration * length;
                    when / duration
                }
                (_, None) => {
                    distance.advance((length - walked) as f32, (duration - elapsed) as f32);
                    break;
                }
            };
            let info = PaintInfo::mix(t as f32, from, to);
            self.place_dab(&info, distance);
        }
        Ok(())
    }

    fn place_dab(&mut self, info: &PaintInfo, distance: &mut DistanceInfo) {
        let spacing = self.paint_at(info);
        let timing = self.update_timing(info);
        distance.register_dab(*info, spacing, timing);
    }

    /// One pixel line through a scratch device, then composited with mirrors
    fn paint_sharp_line(
        &mut self,
        from: &PaintInfo,
        to: &PaintInfo,
        distance: &mut DistanceInfo,
    ) -> Result<(), RasterError> {
        let mut cache = match self.line_cache.take() {
            Some(cache) => cache,
            None => {
                let space = read_device(self.painter.device()).color_space();
                let device = PaintDevice::new(space, "line cache", &self.config)?;
                Painter::new(device.into_shared())
            }
        };
        let result = self.draw_through_cache(&mut cache, from, to);
        self.line_cache = Some(cache);
        result?;

        distance.advance(from.pos.distance(to.pos), (to.time - from.time).max(0.0));
        Ok(())
    }

    fn draw_through_cache(&mut self, cache: &mut Painter, from: &PaintInfo, to: &PaintInfo) -> Result<(), RasterError> {
        write_device(cache.device()).clear();
        cache.set_paint_color(self.painter.paint_color().clone());
        let rect = cache.draw_dda_line(from.pos, to.pos)?;
        cache.take_dirty_rects();

        let source = read_device(cache.device());
        self.painter.bit_blt(rect.x, rect.y, &source, rect)?;
        self.painter.render_mirror_mask(rect, &source)?;
        trace!("Sharp line {:?} -> {:?} in {:?}", from.pos, to.pos, rect);
        Ok(())
    }
}
