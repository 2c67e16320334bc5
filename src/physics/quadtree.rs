use eframe::egui::{Vec2, vec2};

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 12;

pub(super) type CellId = usize;

#[derive(Clone, Copy, Debug)]
pub(super) struct Square {
    pub(super) center: Vec2,
    pub(super) half: f32,
}

impl Square {
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let (min, max) = points.iter().fold(
            (Vec2::splat(f32::INFINITY), Vec2::splat(f32::NEG_INFINITY)),
            |(min, max), point| (min.min(*point), max.max(*point)),
        );
        if !(min.is_finite() && max.is_finite()) {
            return None;
        }

        let span = (max - min).max_elem().max(1.0);
        Some(Self {
            center: (min + max) * 0.5,
            half: span * 0.5 + 1.0,
        })
    }

    pub(super) fn width(self) -> f32 {
        self.half * 2.0
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        let offset = (point - self.center).abs();
        offset.x <= self.half && offset.y <= self.half
    }

    /// Squared gap between two squares; zero when they touch or overlap.
    pub(super) fn gap_sq(self, other: Self) -> f32 {
        let reach = Vec2::splat(self.half + other.half);
        let gap = ((self.center - other.center).abs() - reach).max(Vec2::ZERO);
        gap.length_sq()
    }

    fn quadrant(self, point: Vec2) -> usize {
        usize::from(point.x >= self.center.x) | (usize::from(point.y >= self.center.y) << 1)
    }

    fn child(self, quadrant: usize) -> Self {
        let quarter = self.half * 0.5;
        let sign = |bit: usize| if quadrant & bit == 0 { -quarter } else { quarter };
        Self {
            center: self.center + vec2(sign(1), sign(2)),
            half: quarter,
        }
    }
}

pub(super) struct Cell {
    pub(super) bounds: Square,
    pub(super) centroid: Vec2,
    pub(super) count: usize,
    /// Point indices; only leaves hold any.
    pub(super) points: Vec<usize>,
    children: [Option<CellId>; 4],
}

impl Cell {
    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }
}

/// Barnes–Hut tree stored as a flat arena; cell 0 is the root.
pub(super) struct QuadTree {
    cells: Vec<Cell>,
}

struct Pending {
    bounds: Square,
    indices: Vec<usize>,
    depth: usize,
    parent: Option<(CellId, usize)>,
}

impl QuadTree {
    pub(super) const ROOT: CellId = 0;

    pub(super) fn build(points: &[Vec2]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let bounds = Square::enclosing(points)?;
        let mut cells = Vec::new();
        let mut pending = vec![Pending {
            bounds,
            indices: (0..points.len()).collect(),
            depth: 0,
            parent: None,
        }];

        while let Some(Pending {
            bounds,
            indices,
            depth,
            parent,
        }) = pending.pop()
        {
            let id = cells.len();
            if let Some((parent, quadrant)) = parent {
                let parent: &mut Cell = &mut cells[parent];
                parent.children[quadrant] = Some(id);
            }

            let count = indices.len();
            let centroid = indices
                .iter()
                .fold(Vec2::ZERO, |sum, &index| sum + points[index])
                / count as f32;

            let mut buckets: [Vec<usize>; 4] = Default::default();
            if depth < MAX_DEPTH && count > LEAF_CAPACITY {
                for &index in &indices {
                    buckets[bounds.quadrant(points[index])].push(index);
                }
            }
            // Coincident points never split; they stay together in one leaf.
            let occupied = buckets.iter().filter(|bucket| !bucket.is_empty()).count();
            let leaf = occupied <= 1;

            cells.push(Cell {
                bounds,
                centroid,
                count,
                points: if leaf { indices } else { Vec::new() },
                children: [None; 4],
            });

            if leaf {
                continue;
            }
            for (quadrant, bucket) in buckets.into_iter().enumerate() {
                if bucket.is_empty() {
                    continue;
                }
                pending.push(Pending {
                    bounds: bounds.child(quadrant),
                    indices: bucket,
                    depth: depth + 1,
                    parent: Some((id, quadrant)),
                });
            }
        }

        Some(Self { cells })
    }

    pub(super) fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }

    pub(super) fn children(&self, id: CellId) -> impl Iterator<Item = CellId> + '_ {
        self.cells[id].children.iter().flatten().copied()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cells.len()
    }
}
