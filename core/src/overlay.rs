//! Positioned highlight decorations layered behind the editable text.
//! Decorations are pure overlays: they intercept no input, sit behind the
//! glyphs, and are rebuilt from scratch whenever stored geometry goes
//! stale (resize or edit).

use std::ops::Range;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::matching::find_occurrences;
use crate::surface::{EditorSurface, Rect};
use crate::{Category, HighlightStyle, PipelineError, Timings};

/// One rectangle of a decoration, with its animated width state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    /// Content-space rectangle (scroll folded back in, like the source
    /// text it tracks).
    pub rect: Rect,
    /// Current rendered width; grows from zero to `full_width`.
    pub width: f32,
    pub full_width: f32,
}

/// Groups every segment belonging to one occurrence of a matched span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wrapper {
    pub text: String,
    pub style: HighlightStyle,
    pub segments: Vec<Segment>,
}

/// Handle to the wrappers created by one `decorate` call. Handles from
/// before a `clear` are stale and animate to nothing.
#[derive(Debug, Clone)]
pub struct DecorationHandle {
    wrappers: Range<usize>,
    generation: u64,
}

/// The overlay root attached to one editor view.
#[derive(Debug)]
pub struct OverlayLayer {
    wrappers: Vec<Wrapper>,
    generation: u64,
    pointer_events: bool,
    z_index: i32,
}

impl OverlayLayer {
    /// Attaches a fresh overlay root to the surface. The handle owns every
    /// decoration created through it; dropping or clearing it removes them
    /// all in one step.
    pub fn attach(surface: &EditorSurface) -> Result<Self, PipelineError> {
        if surface.metrics().wrap_columns == 0 {
            return Err(PipelineError::Layout("overlay container has no width".into()));
        }
        Ok(Self {
            wrappers: Vec::new(),
            generation: 0,
            pointer_events: false,
            z_index: 0,
        })
    }

    /// Decorations never intercept clicks or typing.
    pub fn intercepts_input(&self) -> bool {
        self.pointer_events
    }

    /// Decorations render behind the live text glyphs.
    pub fn renders_behind_text(&self) -> bool {
        self.z_index <= 0
    }

    pub fn wrappers(&self) -> &[Wrapper] {
        &self.wrappers
    }

    pub fn is_empty(&self) -> bool {
        self.wrappers.is_empty()
    }

    /// Builds one wrapper per literal occurrence of `text` on the surface,
    /// with one zero-width segment per visual-line rectangle. Returns
    /// `None` when the text cannot be located or measured.
    pub fn decorate(
        &mut self,
        surface: &EditorSurface,
        text: &str,
        category: Category,
    ) -> Option<DecorationHandle> {
        let first = self.wrappers.len();
        for (index, node) in surface.nodes().iter().enumerate() {
            let base = surface.node_offset(index);
            for occurrence in find_occurrences(node, text) {
                let global = base + occurrence.start..base + occurrence.end;
                let rects = surface.layout_rects(global);
                if rects.is_empty() {
                    continue;
                }
                let segments = rects
                    .into_iter()
                    .map(|rect| Segment {
                        rect: Rect {
                            top: rect.top + surface.scroll_top,
                            left: rect.left + surface.scroll_left,
                            ..rect
                        },
                        width: 0.0,
                        full_width: rect.width,
                    })
                    .collect();
                self.wrappers.push(Wrapper {
                    text: text.to_string(),
                    style: category.style(),
                    segments,
                });
            }
        }
        if self.wrappers.len() == first {
            return None;
        }
        Some(DecorationHandle {
            wrappers: first..self.wrappers.len(),
            generation: self.generation,
        })
    }

    /// Grows every segment of the handle from zero to its full width in
    /// uniform time steps. The final step forces the exact target width so
    /// rounding in the step count never leaves a sliver. Stale handles
    /// (from before a `clear`) are ignored.
    pub async fn animate(&mut self, handle: &DecorationHandle, timings: &Timings) {
        if handle.generation != self.generation {
            return;
        }
        let fractions = growth_fractions(timings.animation_duration_ms, timings.animation_step_ms);
        let step = Duration::from_millis(timings.animation_step_ms);
        let last = fractions.len().saturating_sub(1);
        for (index, fraction) in fractions.iter().enumerate() {
            for wrapper in &mut self.wrappers[handle.wrappers.clone()] {
                for segment in &mut wrapper.segments {
                    segment.width = if *fraction >= 1.0 {
                        segment.full_width
                    } else {
                        segment.full_width * fraction
                    };
                }
            }
            if index < last {
                tokio::time::sleep(step).await;
            }
        }
    }

    /// Removes every decoration in one step and invalidates outstanding
    /// handles. Used on every edit and on viewport resize.
    pub fn clear(&mut self) {
        self.wrappers.clear();
        self.generation += 1;
    }
}

/// Progress fractions for the width-grow animation: one per uniform time
/// step, ending in an exact 1.0 regardless of how the duration divides.
pub fn growth_fractions(duration_ms: u64, step_ms: u64) -> Vec<f32> {
    if duration_ms == 0 || step_ms == 0 {
        return vec![1.0];
    }
    let steps = duration_ms as f32 / step_ms as f32;
    let whole = steps.floor() as u64;
    let mut fractions: Vec<f32> = (1..=whole).map(|s| (s as f32 / steps).min(1.0)).collect();
    if fractions.last().map_or(true, |f| *f < 1.0) {
        fractions.push(1.0);
    }
    fractions
}
