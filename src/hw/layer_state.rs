//! Save/restore bookkeeping of one layer: clip bounds per scope, the clip draws recorded in
//! each scope, and the depth counter that orders draws against clips.

use crate::geometry::Rect;

/// Clip draws are referenced by the id their layer handed out, not owned here.
pub type ClipId = u32;

#[derive(Debug, Clone, Default)]
struct ClipStackValue {
    clip_draws: Vec<ClipId>,
    clip_bounds: Rect,
}

/// A clip only covers the draws recorded before its scope closes, so its depth is handed
/// out when the scope is popped (or at flush for scopes still open) and is always larger
/// than the depth of every draw it clips.
#[derive(Debug, Clone)]
pub struct HwLayerState {
    start_depth: u32,
    draw_depth: u32,
    clip_stack: Vec<ClipStackValue>,
    assigned: Vec<(ClipId, u32)>,
}

impl HwLayerState {
    pub fn new(start_depth: u32) -> Self {
        Self {
            start_depth,
            draw_depth: 0,
            clip_stack: vec![ClipStackValue::default()],
            assigned: Vec::new(),
        }
    }

    /// Canvas save depth at which this layer was opened.
    pub fn start_depth(&self) -> u32 {
        self.start_depth
    }

    /// Number of open scopes, the layer's own included.
    pub fn self_depth(&self) -> u32 {
        self.clip_stack.len() as u32
    }

    /// Canvas save depth of the innermost open scope.
    pub fn current_depth(&self) -> u32 {
        self.start_depth + self.self_depth() - 1
    }

    pub fn save(&mut self) {
        let bounds = self.current_clip_bounds();
        self.clip_stack.push(ClipStackValue {
            clip_draws: Vec::new(),
            clip_bounds: bounds,
        });
    }

    pub fn restore(&mut self) {
        if self.clip_stack.len() > 1 {
            self.pop_clip_stack();
        }
    }

    /// Pops scopes until the canvas save depth is `save_count`. The layer's base scope
    /// is never popped.
    pub fn restore_to_count(&mut self, save_count: u32) {
        while self.clip_stack.len() > 1 && self.current_depth() > save_count {
            self.pop_clip_stack();
        }
    }

    pub fn save_clip_op(&mut self, clip: ClipId) {
        if let Some(top) = self.clip_stack.last_mut() {
            top.clip_draws.push(clip);
        }
    }

    /// Replaces the current bounds when `reset`, otherwise intersects with them.
    pub fn save_clip_bounds(&mut self, bounds: &Rect, reset: bool) {
        let Some(top) = self.clip_stack.last_mut() else {
            return;
        };
        if reset {
            top.clip_bounds = *bounds;
        } else if !top.clip_bounds.intersect(bounds) {
            top.clip_bounds.set_empty();
        }
    }

    pub fn current_clip_bounds(&self) -> Rect {
        self.clip_stack
            .last()
            .map_or_else(Rect::empty, |top| top.clip_bounds)
    }

    /// The most recent clip still in effect.
    pub fn last_clip_draw(&self) -> Option<ClipId> {
        self.clip_stack
            .iter()
            .rev()
            .find_map(|value| value.clip_draws.last().copied())
    }

    pub fn next_draw_depth(&mut self) -> u32 {
        self.draw_depth += 1;
        self.draw_depth
    }

    pub fn draw_depth(&self) -> u32 {
        self.draw_depth
    }

    /// Assigns depths to the clips of every scope that is still open, innermost first.
    pub fn flush_clip_depth(&mut self) {
        for index in (0..self.clip_stack.len()).rev() {
            let clips = std::mem::take(&mut self.clip_stack[index].clip_draws);
            for clip in clips.into_iter().rev() {
                let depth = self.next_draw_depth();
                self.assigned.push((clip, depth));
            }
        }
    }

    /// Depths handed out since the last call.
    pub fn take_clip_depths(&mut self) -> Vec<(ClipId, u32)> {
        std::mem::take(&mut self.assigned)
    }

    fn pop_clip_stack(&mut self) {
        if let Some(value) = self.clip_stack.pop() {
            for clip in value.clip_draws.into_iter().rev() {
                let depth = self.next_draw_depth();
                self.assigned.push((clip, depth));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clips_get_depths_above_the_draws_they_cover() {
        let mut state = HwLayerState::new(1);
        state.save();
        state.save_clip_op(7);
        let inside = state.next_draw_depth();
        let inside2 = state.next_draw_depth();
        state.restore();
        let after = state.next_draw_depth();

        let depths = state.take_clip_depths();
        assert_eq!(depths, vec![(7, 3)]);
        assert!(inside < 3 && inside2 < 3);
        assert_eq!(after, 4);
    }

    #[test]
    fn later_clips_in_a_scope_get_lower_depths() {
        let mut state = HwLayerState::new(1);
        state.save();
        state.save_clip_op(1);
        state.save_clip_op(2);
        state.restore();
        assert_eq!(state.take_clip_depths(), vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn flush_covers_open_scopes_innermost_first() {
        let mut state = HwLayerState::new(1);
        state.save_clip_op(1);
        state.save();
        state.save_clip_op(2);
        state.next_draw_depth();
        state.flush_clip_depth();
        assert_eq!(state.take_clip_depths(), vec![(2, 2), (1, 3)]);

        // Nothing left to hand out twice.
        state.flush_clip_depth();
        assert!(state.take_clip_depths().is_empty());
    }

    #[test]
    fn last_clip_draw_searches_outer_scopes() {
        let mut state = HwLayerState::new(1);
        assert_eq!(state.last_clip_draw(), None);
        state.save_clip_op(3);
        state.save();
        assert_eq!(state.last_clip_draw(), Some(3));
        state.save_clip_op(4);
        assert_eq!(state.last_clip_draw(), Some(4));
        state.restore();
        assert_eq!(state.last_clip_draw(), Some(3));
    }

    #[test]
    fn clip_bounds_are_scoped() {
        let mut state = HwLayerState::new(1);
        state.save_clip_bounds(&Rect::from_wh(100.0, 100.0), true);
        state.save();
        state.save_clip_bounds(&Rect::new(10.0, 10.0, 50.0, 50.0), false);
        assert_eq!(state.current_clip_bounds(), Rect::new(10.0, 10.0, 50.0, 50.0));
        state.save_clip_bounds(&Rect::new(200.0, 200.0, 300.0, 300.0), false);
        assert!(state.current_clip_bounds().is_empty());
        state.restore();
        assert_eq!(state.current_clip_bounds(), Rect::from_wh(100.0, 100.0));
    }

    #[test]
    fn restore_to_count_is_relative_to_the_start_depth() {
        let mut state = HwLayerState::new(3);
        assert_eq!(state.current_depth(), 3);
        state.save();
        state.save();
        assert_eq!(state.current_depth(), 5);
        state.restore_to_count(4);
        assert_eq!(state.self_depth(), 2);
        state.restore_to_count(1);
        assert_eq!(state.self_depth(), 1);
        state.restore();
        assert_eq!(state.self_depth(), 1);
    }
}
