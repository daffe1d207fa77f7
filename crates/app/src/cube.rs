//! Procedural cube mesh data.
//!
//! Stands in for the asset pipeline: a unit cube with per-face normals and
//! a distinct color per face.

use glam::{Vec2, Vec3};

use helio_rhi::vertex::Vertex;

/// Face definitions: outward normal, two in-plane axes, and a face color.
const FACES: [(Vec3, Vec3, Vec3, Vec3); 6] = [
    // +X
    (Vec3::X, Vec3::Y, Vec3::Z, Vec3::new(0.9, 0.2, 0.2)),
    // -X
    (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z, Vec3::new(0.5, 0.1, 0.1)),
    // +Y
    (Vec3::Y, Vec3::Z, Vec3::X, Vec3::new(0.2, 0.9, 0.2)),
    // -Y
    (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X, Vec3::new(0.1, 0.5, 0.1)),
    // +Z
    (Vec3::Z, Vec3::Y, Vec3::NEG_X, Vec3::new(0.2, 0.2, 0.9)),
    // -Z
    (Vec3::NEG_Z, Vec3::Y, Vec3::X, Vec3::new(0.1, 0.1, 0.5)),
];

/// Builds the vertex and index data for a unit cube centered at the origin.
///
/// 24 vertices (4 per face, so each face has its own normal) and 36 indices.
pub fn cube_geometry() -> (Vec<Vertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, up, right, color) in FACES {
        let base = vertices.len() as u32;
        let center = normal * 0.5;

        let corners = [
            center - up * 0.5 - right * 0.5,
            center - up * 0.5 + right * 0.5,
            center + up * 0.5 + right * 0.5,
            center + up * 0.5 - right * 0.5,
        ];
        let uvs = [
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];

        for (corner, uv) in corners.into_iter().zip(uvs) {
            vertices.push(Vertex::new(corner, color, normal, uv));
        }

        indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    (vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let (vertices, indices) = cube_geometry();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
    }

    #[test]
    fn test_indices_in_range() {
        let (vertices, indices) = cube_geometry();
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_vertices_on_unit_cube() {
        let (vertices, _) = cube_geometry();
        for vertex in &vertices {
            let p = vertex.position;
            // Every corner coordinate is +/- 0.5
            for coord in [p.x, p.y, p.z] {
                assert!((coord.abs() - 0.5).abs() < 1e-6);
            }
            // Normals are unit length and axis-aligned
            assert!((vertex.normal.length() - 1.0).abs() < 1e-6);
        }
    }
}
