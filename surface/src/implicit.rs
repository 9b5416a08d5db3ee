//! Implicit surface extraction from an oriented point cloud.
//!
//! The oriented samples induce a signed distance field (distance to the
//! nearest tangent planes, inverse-distance weighted). The field is
//! evaluated on a uniform grid of 2^depth cells covering the cloud's
//! bounding cube, restricted to cells near the samples, and the zero level
//! set is extracted with surface nets: one vertex per sign-crossing cell,
//! one quad per sign-crossing grid edge. Each vertex carries a density
//! scalar — the accumulated kernel weight of nearby samples — which the
//! trimming stage thresholds.

use crate::mesh::TriangleMesh;
use crate::spatial::{build_tree, IndexedPoint};
use nalgebra::{Point3, Vector3};
use photomesh_core::PointCloud;
use rayon::prelude::*;
use rstar::RTree;
use std::collections::{HashMap, HashSet};

/// Bounding-cube expansion on each side.
const BBOX_MARGIN: f32 = 0.05;
/// Samples consulted per field evaluation.
const FIELD_NEIGHBORS: usize = 8;
/// Samples consulted per vertex color lookup.
const COLOR_NEIGHBORS: usize = 4;
/// Cells marked around each sample's cell, per axis.
const CELL_DILATION: i32 = 2;

const CORNER_OFFSETS: [(i32, i32, i32); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (0, 1, 0),
    (1, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (0, 1, 1),
    (1, 1, 1),
];

const EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Reconstruct a triangle mesh from an oriented (and optionally colored)
/// point cloud at the given grid depth.
///
/// Returns the mesh and one density value per vertex. Both are empty when
/// the cloud has no normals, too few points, or zero spatial extent.
pub fn reconstruct_surface(pc: &PointCloud, depth: usize) -> (TriangleMesh, Vec<f32>) {
    let Some(normals) = &pc.normals else {
        return (TriangleMesh::new(), Vec::new());
    };
    if pc.len() < 4 {
        return (TriangleMesh::new(), Vec::new());
    }

    let (min, max) = bounds(&pc.points);
    let extent = max - min;
    let longest = extent.x.max(extent.y).max(extent.z);
    if longest <= 0.0 || !longest.is_finite() {
        return (TriangleMesh::new(), Vec::new());
    }

    let side = longest * (1.0 + 2.0 * BBOX_MARGIN);
    let res = 1i32 << depth.min(10);
    let cell = side / res as f32;
    let center = min + extent * 0.5;
    let origin = center - Vector3::repeat(side * 0.5);

    let tree = build_tree(&pc.points);
    let h2 = (2.0 * cell) * (2.0 * cell);

    // Cells worth inspecting: a dilated neighborhood of every sample.
    let mut candidates: HashSet<(i32, i32, i32)> = HashSet::new();
    for p in &pc.points {
        let cx = ((p.x - origin.x) / cell).floor() as i32;
        let cy = ((p.y - origin.y) / cell).floor() as i32;
        let cz = ((p.z - origin.z) / cell).floor() as i32;
        for dx in -CELL_DILATION..=CELL_DILATION {
            for dy in -CELL_DILATION..=CELL_DILATION {
                for dz in -CELL_DILATION..=CELL_DILATION {
                    let c = (cx + dx, cy + dy, cz + dz);
                    if c.0 >= 0 && c.0 < res && c.1 >= 0 && c.1 < res && c.2 >= 0 && c.2 < res {
                        candidates.insert(c);
                    }
                }
            }
        }
    }

    let mut cells: Vec<(i32, i32, i32)> = candidates.into_iter().collect();
    cells.sort_unstable();

    // Evaluate the field at every involved lattice corner, in parallel.
    let mut corner_set: HashSet<(i32, i32, i32)> = HashSet::new();
    for &(i, j, k) in &cells {
        for &(oi, oj, ok) in &CORNER_OFFSETS {
            corner_set.insert((i + oi, j + oj, k + ok));
        }
    }
    let corner_keys: Vec<(i32, i32, i32)> = corner_set.into_iter().collect();
    let corner_values: Vec<(f32, f32)> = corner_keys
        .par_iter()
        .map(|&(i, j, k)| {
            let pos = Point3::new(
                origin.x + i as f32 * cell,
                origin.y + j as f32 * cell,
                origin.z + k as f32 * cell,
            );
            eval_field(&tree, &pc.points, normals, &pos, h2)
        })
        .collect();
    let field: HashMap<(i32, i32, i32), (f32, f32)> =
        corner_keys.into_iter().zip(corner_values).collect();

    // One vertex per sign-crossing cell, at the mean of its edge crossings.
    let mut mesh = TriangleMesh::new();
    let mut densities = Vec::new();
    let mut cell_vertex: HashMap<(i32, i32, i32), usize> = HashMap::new();
    let mut vertex_colors = pc.colors.as_ref().map(|_| Vec::new());

    for &(i, j, k) in &cells {
        let mut values = [0.0f32; 8];
        let mut density_sum = 0.0f32;
        for (c, &(oi, oj, ok)) in CORNER_OFFSETS.iter().enumerate() {
            let (v, d) = field[&(i + oi, j + oj, k + ok)];
            values[c] = v;
            density_sum += d;
        }

        let inside = values.map(|v| v < 0.0);
        if inside.iter().all(|&b| b) || inside.iter().all(|&b| !b) {
            continue;
        }

        let corner_pos = |c: usize| {
            let (oi, oj, ok) = CORNER_OFFSETS[c];
            Point3::new(
                origin.x + (i + oi) as f32 * cell,
                origin.y + (j + oj) as f32 * cell,
                origin.z + (k + ok) as f32 * cell,
            )
        };

        let mut sum = Vector3::zeros();
        let mut crossings = 0usize;
        for &(a, b) in &EDGES {
            if inside[a] != inside[b] {
                let va = values[a];
                let vb = values[b];
                let t = va / (va - vb);
                let pa = corner_pos(a);
                let pb = corner_pos(b);
                sum += pa.coords + (pb.coords - pa.coords) * t;
                crossings += 1;
            }
        }
        if crossings == 0 {
            continue;
        }

        let vertex = Point3::from(sum / crossings as f32);
        if let (Some(out), Some(colors)) = (&mut vertex_colors, &pc.colors) {
            out.push(sample_color(&tree, colors, &vertex));
        }

        cell_vertex.insert((i, j, k), mesh.vertices.len());
        mesh.vertices.push(vertex);
        densities.push(density_sum / 8.0);
    }

    // One quad (two triangles) per sign-crossing lattice edge, connecting
    // the vertices of the four cells around it. Winding follows the field
    // gradient so front faces point outward.
    for &(i, j, k) in &cells {
        let base = [i, j, k];
        if !cell_vertex.contains_key(&(i, j, k)) {
            continue;
        }
        let v0 = field[&(i, j, k)].0;

        for axis in 0..3 {
            let mut end = base;
            end[axis] += 1;
            let v1 = field[&(end[0], end[1], end[2])].0;
            if (v0 < 0.0) == (v1 < 0.0) {
                continue;
            }

            let b = (axis + 1) % 3;
            let c = (axis + 2) % 3;
            let quad_offsets = [(-1, -1), (0, -1), (0, 0), (-1, 0)];

            let mut vids = [0usize; 4];
            let mut complete = true;
            for (m, &(db, dc)) in quad_offsets.iter().enumerate() {
                let mut q = base;
                q[b] += db;
                q[c] += dc;
                match cell_vertex.get(&(q[0], q[1], q[2])) {
                    Some(&idx) => vids[m] = idx,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            if v0 < 0.0 {
                mesh.faces.push([vids[0], vids[1], vids[2]]);
                mesh.faces.push([vids[0], vids[2], vids[3]]);
            } else {
                mesh.faces.push([vids[0], vids[3], vids[2]]);
                mesh.faces.push([vids[0], vids[2], vids[1]]);
            }
        }
    }

    mesh.colors = vertex_colors;
    (mesh, densities)
}

/// Remove every vertex whose density falls below the given quantile of the
/// density distribution, drop unreferenced vertices, and refresh normals.
pub fn trim_by_density(mesh: &mut TriangleMesh, densities: &[f32], q: f32) {
    if mesh.vertices.is_empty() || densities.len() != mesh.vertices.len() {
        return;
    }

    let cutoff = quantile(densities, q);
    let remove: Vec<bool> = densities.iter().map(|&d| d < cutoff).collect();
    mesh.remove_vertices_by_mask(&remove);
    mesh.remove_unreferenced_vertices();
    if !mesh.is_empty() {
        mesh.compute_vertex_normals();
    }
}

/// Quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f32], q: f32) -> f32 {
    assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let pos = q.clamp(0.0, 1.0) as f64 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        let t = (pos - lo as f64) as f32;
        sorted[lo] * (1.0 - t) + sorted[hi] * t
    }
}

fn bounds(points: &[Point3<f32>]) -> (Point3<f32>, Point3<f32>) {
    let mut min = points[0];
    let mut max = points[0];
    for p in points {
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);
        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }
    (min, max)
}

/// Signed distance to the inverse-distance-weighted blend of the nearest
/// tangent planes, plus the kernel-weighted sample support at this position.
fn eval_field(
    tree: &RTree<IndexedPoint>,
    points: &[Point3<f32>],
    normals: &[Vector3<f32>],
    pos: &Point3<f32>,
    h2: f32,
) -> (f32, f32) {
    let query = [pos.x, pos.y, pos.z];
    let mut wsum = 0.0f32;
    let mut fsum = 0.0f32;
    let mut density = 0.0f32;

    for nb in tree.nearest_neighbor_iter(&query).take(FIELD_NEIGHBORS) {
        let idx = nb.0;
        let d = *pos - points[idx];
        let d2 = d.norm_squared();
        let w = 1.0 / (d2 + 1e-9);
        fsum += w * normals[idx].dot(&d);
        wsum += w;
        density += (-d2 / (2.0 * h2)).exp();
    }

    if wsum > 0.0 {
        (fsum / wsum, density)
    } else {
        (1.0, 0.0)
    }
}

fn sample_color(
    tree: &RTree<IndexedPoint>,
    colors: &[Point3<f32>],
    pos: &Point3<f32>,
) -> Point3<f32> {
    let query = [pos.x, pos.y, pos.z];
    let mut wsum = 0.0f32;
    let mut sum = Vector3::zeros();
    for nb in tree.nearest_neighbor_iter(&query).take(COLOR_NEIGHBORS) {
        let d2 = (*pos - nb.1).norm_squared();
        let w = 1.0 / (d2 + 1e-9);
        sum += colors[nb.0].coords * w;
        wsum += w;
    }
    if wsum > 0.0 {
        Point3::from(sum / wsum)
    } else {
        Point3::new(0.5, 0.5, 0.5)
    }
}
