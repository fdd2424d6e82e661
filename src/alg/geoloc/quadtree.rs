//! Inverse lookup through a spatial index of the grid cells.

use crate::alg::geoloc::grid::GeolocGrid;
use crate::alg::geoloc::info::GeorefConvention;
use crate::alg::geoloc::quad::Quad;
use crate::alg::geoloc::sampler::ForwardSampler;
use crate::errors::{GeolocError, Result};

const LEAF_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
struct CellEntry {
    i: f64,
    j: f64,
    quad: Quad,
    bbox: [f64; 4],
}

impl CellEntry {
    fn center(&self, axis: usize) -> f64 {
        (self.bbox[axis] + self.bbox[axis + 2]) / 2.0
    }
}

#[derive(Debug)]
enum Node {
    Leaf { bbox: [f64; 4], cells: Vec<usize> },
    Branch { bbox: [f64; 4], children: Box<[Node; 2]> },
}

fn bbox_contains(bbox: &[f64; 4], x: f64, y: f64) -> bool {
    x >= bbox[0] && x <= bbox[2] && y >= bbox[1] && y <= bbox[3]
}

impl Node {
    fn bbox(&self) -> &[f64; 4] {
        match self {
            Node::Leaf { bbox, .. } | Node::Branch { bbox, .. } => bbox,
        }
    }

    fn build(entries: &[CellEntry], mut ids: Vec<usize>) -> Node {
        let bbox = ids.iter().map(|&id| entries[id].bbox).fold(
            [f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY],
            |acc, b| [acc[0].min(b[0]), acc[1].min(b[1]), acc[2].max(b[2]), acc[3].max(b[3])],
        );
        if ids.len() <= LEAF_CAPACITY {
            ids.sort_unstable();
            return Node::Leaf { bbox, cells: ids };
        }

        let axis = if bbox[2] - bbox[0] >= bbox[3] - bbox[1] { 0 } else { 1 };
        ids.sort_by(|&a, &b| entries[a].center(axis).total_cmp(&entries[b].center(axis)));
        let high = ids.split_off(ids.len() / 2);
        Node::Branch {
            bbox,
            children: Box::new([Node::build(entries, ids), Node::build(entries, high)]),
        }
    }

    /// First result of `solve` over the cells whose bounding box holds
    /// `(x, y)`, in traversal order.
    fn find(
        &self,
        entries: &[CellEntry],
        x: f64,
        y: f64,
        solve: &dyn Fn(&CellEntry) -> Option<(f64, f64)>,
    ) -> Option<(f64, f64)> {
        if !bbox_contains(self.bbox(), x, y) {
            return None;
        }
        match self {
            Node::Leaf { cells, .. } => cells
                .iter()
                .map(|&id| &entries[id])
                .filter(|cell| bbox_contains(&cell.bbox, x, y))
                .find_map(solve),
            Node::Branch { children, .. } => children
                .iter()
                .find_map(|child| child.find(entries, x, y, solve)),
        }
    }

    fn count(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Branch { children, .. } => 1 + children.iter().map(Node::count).sum::<usize>(),
        }
    }
}

/// Balanced tree over the georeferenced quadrilaterals of the grid cells.
#[derive(Debug)]
pub struct CellQuadtree {
    grid: GeolocGrid,
    entries: Vec<CellEntry>,
    root: Node,
}

impl CellQuadtree {
    /// Indexes every cell whose four corners can be evaluated. Cells
    /// running past the antimeridian are indexed on both sides of it.
    pub fn build(grid: &GeolocGrid) -> Result<Self> {
        let sampler = ForwardSampler::new(grid);
        let (w, h) = (grid.width() as i64, grid.height() as i64);
        let (first, last_i, last_j) = match grid.convention() {
            GeorefConvention::TopLeftCorner => (0, w - 1, h - 1),
            GeorefConvention::PixelCenter => (-1, w - 1, h - 1),
        };

        let mut entries = Vec::new();
        for j in first..=last_j {
            for i in first..=last_i {
                let (fi, fj) = (i as f64, j as f64);
                let Some(quad) = sampler.cell(fi, fj) else {
                    continue;
                };
                let mut push = |quad: Quad| {
                    entries.push(CellEntry {
                        i: fi,
                        j: fj,
                        quad,
                        bbox: quad.bbox(),
                    })
                };
                push(quad);
                if grid.normalizes_longitude() {
                    if let Some(wrapped) = quad.wrapped() {
                        push(wrapped);
                    }
                }
            }
        }

        if entries.is_empty() {
            return Err(GeolocError::SolverFailed(
                "no valid cell in geolocation arrays".to_string(),
            ));
        }
        let root = Node::build(&entries, (0..entries.len()).collect());
        tracing::debug!(cells = entries.len(), nodes = root.count(), "quadtree built");
        Ok(CellQuadtree {
            grid: grid.clone(),
            entries,
            root,
        })
    }

    /// Number of indexed cells.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fractional grid index of `(x, y)`. When the point lies on an edge
    /// shared by several cells the first one visited wins. Cells whose
    /// inverse does not map back onto `(x, y)` are skipped.
    pub fn locate(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        let sampler = ForwardSampler::new(&self.grid);
        self.root.find(&self.entries, x, y, &|cell| {
            sampler.solve_in_quad(&cell.quad, cell.i, cell.j, x, y)
        })
    }
}
