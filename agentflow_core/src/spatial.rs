//! Spatial index over live agent positions.
//!
//! The index is a derived cache: an R*-tree bulk-loaded from position
//! snapshots once per tick. Agents stay the source of truth. Queries return
//! candidate slots ranked by snapshot position. An agent evaluated earlier in
//! the same tick may have moved or been removed since, so callers re-check
//! liveness and live distance before acting on a candidate.

use crate::agent::{Agent, AgentId};
use crate::bounds::Bounds;
use nalgebra::Vector2;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// Lightweight position-only record so the tree never clones full agents.
#[derive(Clone, Debug)]
pub struct AgentLocation {
    /// Index into the environment's agent vector at rebuild time
    pub slot: usize,
    pub id: AgentId,
    pub type_index: usize,
    pub position: [f64; 2],
}

impl RTreeObject for AgentLocation {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.position)
    }
}

impl PointDistance for AgentLocation {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.position[0] - point[0];
        let dy = self.position[1] - point[1];
        dx * dx + dy * dy
    }
}

/// Agent-type predicate applied to query candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFilter {
    Any,
    /// Only agents of this type
    Only(usize),
    /// Every type except this one
    Except(usize),
}

impl TypeFilter {
    pub fn accepts(&self, type_index: usize) -> bool {
        match *self {
            TypeFilter::Any => true,
            TypeFilter::Only(t) => type_index == t,
            TypeFilter::Except(t) => type_index != t,
        }
    }
}

/// A query hit, measured against the snapshot position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub slot: usize,
    pub id: AgentId,
    pub type_index: usize,
    pub distance: f64,
}

/// R*-tree over agent positions with torus-aware queries.
#[derive(Debug)]
pub struct SpatialIndex {
    tree: RTree<AgentLocation>,
    bounds: Bounds,
    type_counts: Vec<usize>,
}

impl SpatialIndex {
    /// Creates an empty index.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            tree: RTree::new(),
            bounds,
            type_counts: Vec::new(),
        }
    }

    /// Rebuilds from the live agents via bulk_load (O(n log n)).
    pub fn rebuild(&mut self, agents: &[Agent]) {
        self.type_counts.clear();
        let locations: Vec<AgentLocation> = agents
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_alive())
            .map(|(slot, a)| {
                if self.type_counts.len() <= a.type_index {
                    self.type_counts.resize(a.type_index + 1, 0);
                }
                self.type_counts[a.type_index] += 1;
                AgentLocation {
                    slot,
                    id: a.id,
                    type_index: a.type_index,
                    position: [a.position.x, a.position.y],
                }
            })
            .collect();
        self.tree = RTree::bulk_load(locations);
    }

    /// Number of indexed agents.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Returns true if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Number of indexed agents of one type.
    pub fn count_of_type(&self, type_index: usize) -> usize {
        self.type_counts.get(type_index).copied().unwrap_or(0)
    }

    fn candidates_exist(&self, filter: TypeFilter) -> bool {
        match filter {
            TypeFilter::Any => !self.is_empty(),
            TypeFilter::Only(t) => self.count_of_type(t) > 0,
            TypeFilter::Except(t) => self.len() > self.count_of_type(t),
        }
    }

    /// Query-point images to search: the point itself, plus its translates by
    /// one world extent on each axis under wraparound.
    fn images(&self, center: Vector2<f64>) -> Vec<[f64; 2]> {
        if !self.bounds.wraparound {
            return vec![[center.x, center.y]];
        }
        let (w, h) = (self.bounds.width, self.bounds.height);
        let mut images = Vec::with_capacity(9);
        for sx in [0.0, w, -w] {
            for sy in [0.0, h, -h] {
                images.push([center.x + sx, center.y + sy]);
            }
        }
        images
    }

    /// Nearest indexed agent passing `filter` and `accept`, excluding `exclude`.
    ///
    /// Candidates are visited in ascending snapshot distance; `accept` is the
    /// caller's liveness re-check, so an agent removed earlier this tick is
    /// skipped in favor of the next-nearest one.
    pub fn nearest(
        &self,
        center: Vector2<f64>,
        filter: TypeFilter,
        exclude: Option<AgentId>,
        accept: impl FnMut(&AgentLocation) -> bool,
    ) -> Option<Neighbor> {
        self.nearest_k(center, filter, exclude, 1, accept).into_iter().next()
    }

    /// Up to `k` nearest indexed agents passing `filter` and `accept`,
    /// excluding `exclude`, ordered by snapshot distance then id.
    pub fn nearest_k(
        &self,
        center: Vector2<f64>,
        filter: TypeFilter,
        exclude: Option<AgentId>,
        k: usize,
        mut accept: impl FnMut(&AgentLocation) -> bool,
    ) -> Vec<Neighbor> {
        if k == 0 || !self.candidates_exist(filter) {
            return Vec::new();
        }

        let mut best: Vec<(f64, &AgentLocation)> = Vec::with_capacity(k * 2);
        for image in self.images(center) {
            if best.len() >= k && self.bounds.wraparound {
                let worst = best[k - 1].0;
                if self.bounds.rect_distance_2(image) > worst {
                    continue;
                }
            }
            let hits = self
                .tree
                .nearest_neighbor_iter_with_distance_2(&image)
                .filter(|(loc, _)| Some(loc.id) != exclude && filter.accepts(loc.type_index))
                .filter(|(loc, _)| accept(loc))
                .take(k);
            for (loc, d2) in hits {
                best.push((d2, loc));
            }
            // An agent reached through several images keeps its shortest distance
            best.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
            let mut seen = Vec::with_capacity(best.len());
            best.retain(|(_, loc)| {
                if seen.contains(&loc.slot) {
                    return false;
                }
                seen.push(loc.slot);
                true
            });
            best.truncate(k);
        }

        best.into_iter()
            .map(|(d2, loc)| Neighbor {
                slot: loc.slot,
                id: loc.id,
                type_index: loc.type_index,
                distance: d2.sqrt(),
            })
            .collect()
    }

    /// All indexed agents within `radius` of `center` passing `filter`,
    /// excluding `exclude`, ordered by distance then id.
    pub fn within_radius(
        &self,
        center: Vector2<f64>,
        radius: f64,
        filter: TypeFilter,
        exclude: Option<AgentId>,
    ) -> Vec<Neighbor> {
        if radius.is_nan() || radius < 0.0 || !self.candidates_exist(filter) {
            return Vec::new();
        }

        let r2 = radius * radius;
        let (x_offsets, x_len) = self.wrap_offsets(center.x, radius, self.bounds.width);
        let (y_offsets, y_len) = self.wrap_offsets(center.y, radius, self.bounds.height);
        // Envelopes of translated query windows can only overlap when the
        // window is at least as wide as the world.
        let needs_dedup = (x_len > 1 && radius * 2.0 >= self.bounds.width)
            || (y_len > 1 && radius * 2.0 >= self.bounds.height);
        let mut hits = Vec::new();

        for &xoff in &x_offsets[..x_len] {
            for &yoff in &y_offsets[..y_len] {
                let translated = [center.x + xoff, center.y + yoff];
                for loc in self.tree.locate_within_distance(translated, r2) {
                    if Some(loc.id) == exclude || !filter.accepts(loc.type_index) {
                        continue;
                    }
                    hits.push(Neighbor {
                        slot: loc.slot,
                        id: loc.id,
                        type_index: loc.type_index,
                        distance: loc.distance_2(&translated).sqrt(),
                    });
                }
            }
        }

        if needs_dedup {
            // The same agent may have been found through several images;
            // keep only its shortest distance.
            hits.sort_by(|a, b| a.slot.cmp(&b.slot).then(a.distance.total_cmp(&b.distance)));
            hits.dedup_by_key(|n| n.slot);
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id.cmp(&b.id)));
        hits
    }

    fn wrap_offsets(&self, coord: f64, radius: f64, size: f64) -> ([f64; 3], usize) {
        let mut offsets = [0.0; 3];
        let mut len = 1usize;
        if !self.bounds.wraparound {
            return (offsets, len);
        }
        if coord < radius {
            offsets[len] = size;
            len += 1;
        }
        if coord + radius >= size {
            offsets[len] = -size;
            len += 1;
        }
        (offsets, len)
    }
}
