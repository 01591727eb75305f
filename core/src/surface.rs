//! Model of the live editable text container.
//! Decorations never live inside the text itself; they are measured
//! against this surface and positioned in a separate layer, so typing and
//! cursor position are never disturbed by analysis.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::PipelineError;

/// Monospace geometry of the editing area.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceMetrics {
    pub char_width: f32,
    pub line_height: f32,
    pub wrap_columns: usize,
}

impl Default for SurfaceMetrics {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            line_height: 20.0,
            wrap_columns: 80,
        }
    }
}

/// An on-screen rectangle in container-relative coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

/// The live text container: ordered text nodes plus viewport state.
#[derive(Debug, Clone)]
pub struct EditorSurface {
    nodes: Vec<String>,
    metrics: SurfaceMetrics,
    pub scroll_top: f32,
    pub scroll_left: f32,
}

impl EditorSurface {
    pub fn new(metrics: SurfaceMetrics) -> Result<Self, PipelineError> {
        if metrics.wrap_columns == 0 {
            return Err(PipelineError::Layout("wrap width is zero columns".into()));
        }
        if metrics.char_width <= 0.0 || metrics.line_height <= 0.0 {
            return Err(PipelineError::Layout("non-positive glyph metrics".into()));
        }
        Ok(Self {
            nodes: Vec::new(),
            metrics,
            scroll_top: 0.0,
            scroll_left: 0.0,
        })
    }

    pub fn from_text(text: &str, metrics: SurfaceMetrics) -> Result<Self, PipelineError> {
        let mut surface = Self::new(metrics)?;
        surface.nodes.push(text.to_string());
        Ok(surface)
    }

    pub fn metrics(&self) -> &SurfaceMetrics {
        &self.metrics
    }

    /// Viewport resize. Stored decoration geometry goes stale; callers must
    /// rebuild their overlay layer afterwards.
    pub fn set_wrap_columns(&mut self, columns: usize) -> Result<(), PipelineError> {
        if columns == 0 {
            return Err(PipelineError::Layout("wrap width is zero columns".into()));
        }
        self.metrics.wrap_columns = columns;
        Ok(())
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn push_node(&mut self, text: &str) {
        self.nodes.push(text.to_string());
    }

    /// Replaces the whole buffer with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.nodes.clear();
        self.nodes.push(text.to_string());
    }

    /// The rendered text, node contents concatenated in order.
    pub fn text(&self) -> String {
        self.nodes.concat()
    }

    /// Byte offset of a node's first byte within the concatenated text.
    pub fn node_offset(&self, index: usize) -> usize {
        self.nodes.iter().take(index).map(String::len).sum()
    }

    /// Measures the on-screen rectangles covered by a byte range of the
    /// concatenated text: one rectangle per visual line the range crosses,
    /// in viewport coordinates (scroll already subtracted). Hard breaks and
    /// soft wraps at the column limit both start a new line.
    pub fn layout_rects(&self, range: Range<usize>) -> Vec<Rect> {
        let text = self.text();
        let mut covered: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
        let mut row = 0usize;
        let mut col = 0usize;
        let mut byte = 0usize;

        for grapheme in text.graphemes(true) {
            let start = byte;
            byte += grapheme.len();
            if grapheme.contains('\n') {
                row += 1;
                col = 0;
                continue;
            }
            if col >= self.metrics.wrap_columns {
                row += 1;
                col = 0;
            }
            if start >= range.start && start < range.end {
                covered
                    .entry(row)
                    .and_modify(|(min, max)| {
                        *min = (*min).min(col);
                        *max = (*max).max(col);
                    })
                    .or_insert((col, col));
            }
            col += 1;
        }

        covered
            .into_iter()
            .map(|(row, (min_col, max_col))| Rect {
                top: row as f32 * self.metrics.line_height - self.scroll_top,
                left: min_col as f32 * self.metrics.char_width - self.scroll_left,
                width: (max_col - min_col + 1) as f32 * self.metrics.char_width,
                height: self.metrics.line_height,
            })
            .collect()
    }
}
