//! Two-column comparison view model.
//! Rows carry side-specific markers; spans that originated from a matched
//! rewrite pair share a synchronization id so hovering one highlights all
//! of them, including a counterpart living in an embedded frame.

use serde::{Deserialize, Serialize};

use crate::reconcile::{DiffKind, DiffUnit};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Original,
    Improved,
}

/// Visual gutter marker for one row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowMarker {
    Neutral,
    Added,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiffRow {
    pub marker: RowMarker,
    pub text: String,
    pub sync_id: Option<usize>,
}

/// Record of a hover event to forward across a frame boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FrameMessage {
    pub sync_id: Option<usize>,
    pub entering: bool,
}

/// The rendered comparison: two parallel row lists plus hover state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffView {
    pub original: Vec<DiffRow>,
    pub improved: Vec<DiffRow>,
    hovered: Option<usize>,
}

impl DiffView {
    /// Lays the aligned units out into two columns. Changed and removed
    /// units get a removed marker on the original side; changed and added
    /// units get an added marker on the improved side. Marked rows are
    /// then paired positionally: the i-th marked row on the left shares a
    /// sync id with the i-th on the right, and trailing rows on the longer
    /// side get none.
    pub fn build(units: &[DiffUnit]) -> Self {
        let mut original = Vec::new();
        let mut improved = Vec::new();
        for unit in units {
            match unit.kind {
                DiffKind::Unchanged => {
                    original.push(DiffRow {
                        marker: RowMarker::Neutral,
                        text: unit.original.clone(),
                        sync_id: None,
                    });
                    improved.push(DiffRow {
                        marker: RowMarker::Neutral,
                        text: unit.improved.clone(),
                        sync_id: None,
                    });
                }
                DiffKind::Changed => {
                    original.push(DiffRow {
                        marker: RowMarker::Removed,
                        text: unit.original.clone(),
                        sync_id: None,
                    });
                    improved.push(DiffRow {
                        marker: RowMarker::Added,
                        text: unit.improved.clone(),
                        sync_id: None,
                    });
                }
                DiffKind::Removed => {
                    original.push(DiffRow {
                        marker: RowMarker::Removed,
                        text: unit.original.clone(),
                        sync_id: None,
                    });
                }
                DiffKind::Added => {
                    improved.push(DiffRow {
                        marker: RowMarker::Added,
                        text: unit.improved.clone(),
                        sync_id: None,
                    });
                }
            }
        }

        let mut view = Self {
            original,
            improved,
            hovered: None,
        };
        view.assign_sync_ids();
        view
    }

    fn assign_sync_ids(&mut self) {
        let left: Vec<usize> = marked_indices(&self.original);
        let right: Vec<usize> = marked_indices(&self.improved);
        for (id, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            self.original[*l].sync_id = Some(id);
            self.improved[*r].sync_id = Some(id);
        }
    }

    pub fn hovered(&self) -> Option<usize> {
        self.hovered
    }

    /// Pointer entered an element carrying `sync_id`: every row sharing
    /// the id lights up, and the event is replayed for an embedded frame.
    pub fn pointer_enter(&mut self, sync_id: usize) -> (Vec<(Side, usize)>, FrameMessage) {
        self.hovered = Some(sync_id);
        let mut hits = Vec::new();
        for (index, row) in self.original.iter().enumerate() {
            if row.sync_id == Some(sync_id) {
                hits.push((Side::Original, index));
            }
        }
        for (index, row) in self.improved.iter().enumerate() {
            if row.sync_id == Some(sync_id) {
                hits.push((Side::Improved, index));
            }
        }
        (
            hits,
            FrameMessage {
                sync_id: Some(sync_id),
                entering: true,
            },
        )
    }

    pub fn pointer_leave(&mut self) -> FrameMessage {
        self.hovered = None;
        FrameMessage {
            sync_id: None,
            entering: false,
        }
    }

    pub fn is_highlighted(&self, side: Side, index: usize) -> bool {
        let rows = match side {
            Side::Original => &self.original,
            Side::Improved => &self.improved,
        };
        match (self.hovered, rows.get(index).and_then(|r| r.sync_id)) {
            (Some(hovered), Some(id)) => hovered == id,
            _ => false,
        }
    }
}

fn marked_indices(rows: &[DiffRow]) -> Vec<usize> {
    rows.iter()
        .enumerate()
        .filter(|(_, row)| row.marker != RowMarker::Neutral)
        .map(|(index, _)| index)
        .collect()
}
