use bevy::prelude::*;

#[cfg(feature = "multi_threaded")]
use rayon::prelude::*;

use crate::{color::VertexColor, settings::PropagationSettings};


const MAX_CELLS_PER_AXIS: usize = 128;


/// Uniform grid over the LOD0 bounding box for nearest-vertex queries.
pub struct VertexGrid<'a> {
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    min: Vec3,
    cell_size: f32,
    dims: [usize; 3],
    cells: Vec<Vec<u32>>,
}

impl<'a> VertexGrid<'a> {
    pub fn new(
        positions: &'a [Vec3],
        normals: &'a [Vec3],
        vertices_per_cell: usize,
    ) -> Option<Self> {
        if positions.is_empty() {
            return None;
        }

        let (min, max) = positions.iter().fold(
            (Vec3::splat(f32::MAX), Vec3::splat(f32::MIN)),
            |(min, max), p| (min.min(*p), max.max(*p)),
        );
        let extent = (max - min).max(Vec3::splat(1e-4));

        let target_cells = (positions.len() / vertices_per_cell.max(1)).max(1) as f32;
        let cell_size = (extent.x * extent.y * extent.z / target_cells)
            .cbrt()
            .max(extent.max_element() / MAX_CELLS_PER_AXIS as f32)
            .max(1e-4);

        let dims = [extent.x, extent.y, extent.z]
            .map(|e| ((e / cell_size).ceil() as usize).clamp(1, MAX_CELLS_PER_AXIS));

        let mut grid = Self {
            positions,
            normals,
            min,
            cell_size,
            dims,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };
        for (index, position) in positions.iter().enumerate() {
            let cell = grid.cell_of(*position);
            let flat = grid.flat(cell);
            grid.cells[flat].push(index as u32);
        }
        Some(grid)
    }

    fn cell_of(&self, point: Vec3) -> [usize; 3] {
        let local = (point - self.min) / self.cell_size;
        let mut cell = [0; 3];
        for axis in 0..3 {
            cell[axis] = (local[axis].floor().max(0.0) as usize).min(self.dims[axis] - 1);
        }
        cell
    }

    fn flat(&self, [x, y, z]: [usize; 3]) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Every LOD0 vertex in the cells at Chebyshev distance `ring` from `center`.
    fn ring(&self, center: [usize; 3], ring: usize, mut visit: impl FnMut(usize)) {
        let r = ring as isize;
        let c = center.map(|v| v as isize);
        let lo = |axis: usize| (c[axis] - r).max(0);
        let hi = |axis: usize| (c[axis] + r).min(self.dims[axis] as isize - 1);

        for z in lo(2)..=hi(2) {
            for y in lo(1)..=hi(1) {
                let on_shell = (z - c[2]).abs() == r || (y - c[1]).abs() == r;
                let xs: Vec<isize> = if on_shell {
                    (lo(0)..=hi(0)).collect()
                } else {
                    [c[0] - r, c[0] + r]
                        .into_iter()
                        .filter(|x| *x >= 0 && *x < self.dims[0] as isize)
                        .collect()
                };

                for x in xs {
                    let cell = [x as usize, y as usize, z as usize];
                    for index in &self.cells[self.flat(cell)] {
                        visit(*index as usize);
                    }
                }
            }
        }
    }

    /// Best LOD0 match for a point: the nearest vertex, or the best aligned normal among
    /// vertices within `grace` of the nearest one. Ties go to the shorter distance.
    pub fn nearest(&self, point: Vec3, normal: Option<Vec3>, grace: f32) -> Option<usize> {
        let center = self.cell_of(point);
        let max_ring = self.dims.iter().copied().max().unwrap_or(1);
        let grace = grace.max(0.0);

        let mut candidates: Vec<(usize, f32)> = Vec::new();
        let mut best = f32::MAX;
        for ring in 0..=max_ring {
            self.ring(center, ring, |index| {
                let distance = self.positions[index].distance(point);
                best = best.min(distance);
                candidates.push((index, distance));
            });

            // cells beyond this ring are at least `ring * cell_size` away
            if !candidates.is_empty() && best + grace <= ring as f32 * self.cell_size {
                break;
            }
        }

        let shortest = |a: &(usize, f32), b: &(usize, f32)| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0));

        let normal = normal
            .map(Vec3::normalize_or_zero)
            .filter(|n| *n != Vec3::ZERO && !self.normals.is_empty());
        let Some(normal) = normal else {
            return candidates.iter().min_by(|a, b| shortest(a, b)).map(|(index, _)| *index);
        };

        candidates
            .iter()
            .filter(|(_, distance)| *distance <= best + grace)
            .map(|candidate| {
                let alignment = self
                    .normals
                    .get(candidate.0)
                    .map_or(-1.0, |n| n.normalize_or_zero().dot(normal));
                (candidate, alignment)
            })
            .min_by(|(a, a_alignment), (b, b_alignment)| {
                if (a_alignment - b_alignment).abs() <= 1e-6 {
                    shortest(a, b)
                } else {
                    b_alignment.total_cmp(a_alignment)
                }
            })
            .map(|((index, _), _)| *index)
    }
}


/// Maps higher LODs onto LOD0 and copies LOD0's final colors across.
pub struct LodPropagator<'a> {
    grid: VertexGrid<'a>,
    settings: &'a PropagationSettings,
}

impl<'a> LodPropagator<'a> {
    pub fn new(
        lod0_positions: &'a [Vec3],
        lod0_normals: &'a [Vec3],
        settings: &'a PropagationSettings,
    ) -> Option<Self> {
        VertexGrid::new(lod0_positions, lod0_normals, settings.vertices_per_cell)
            .map(|grid| Self { grid, settings })
    }

    /// LOD0 source of every vertex of a higher LOD.
    pub fn map_lod(&self, positions: &[Vec3], normals: &[Vec3]) -> Vec<Option<usize>> {
        let grace = self.settings.normal_grace_distance;
        let use_normals = self.settings.use_normal_similarity;
        let lookup = |index: usize| {
            let normal = if use_normals {
                normals.get(index).copied()
            } else {
                None
            };
            self.grid.nearest(positions[index], normal, grace)
        };

        #[cfg(feature = "multi_threaded")]
        let mapping = (0..positions.len()).into_par_iter().map(lookup).collect();

        #[cfg(not(feature = "multi_threaded"))]
        let mapping = (0..positions.len()).map(lookup).collect();

        mapping
    }

    /// Overwrites `colors` from LOD0; returns how many vertices changed.
    pub fn propagate(
        &self,
        lod0_colors: &[VertexColor],
        positions: &[Vec3],
        normals: &[Vec3],
        colors: &mut [VertexColor],
    ) -> usize {
        let mapping = self.map_lod(positions, normals);

        let mut changed = 0;
        for (index, (color, source)) in colors.iter_mut().zip(mapping).enumerate() {
            let propagated = source
                .or_else(|| (index < lod0_colors.len()).then_some(index))
                .and_then(|source| lod0_colors.get(source))
                .copied()
                .unwrap_or(*color);

            if propagated != *color {
                *color = propagated;
                changed += 1;
            }
        }
        changed
    }
}
