//! Procedural meshes for the preview object.
//!
//! Every primitive is emitted as a flat triangle list (no index buffer) with a
//! normal per vertex, wound counter-clockwise when seen from outside. Curved
//! primitives walk a parametric grid once and derive both the position and the
//! normal from the same unit direction, so the two buffers never drift apart.

use std::f32::consts::PI;

use glam::Vec3;
use shaderbundle::GeometryKind;
use tracing::warn;

pub const CUBE_SIZE: f32 = 1.0;
pub const SPHERE_RADIUS: f32 = 1.0;
pub const SPHERE_WIDTH_SEGMENTS: u32 = 32;
pub const SPHERE_HEIGHT_SEGMENTS: u32 = 16;
pub const PLANE_WIDTH: f32 = 2.0;
pub const PLANE_HEIGHT: f32 = 2.0;
pub const CYLINDER_RADIUS: f32 = 0.5;
pub const CYLINDER_HEIGHT: f32 = 1.5;
pub const CYLINDER_SEGMENTS: u32 = 32;
pub const TORUS_MAJOR_RADIUS: f32 = 0.6;
pub const TORUS_MINOR_RADIUS: f32 = 0.3;
pub const TORUS_MAJOR_SEGMENTS: u32 = 16;
pub const TORUS_MINOR_SEGMENTS: u32 = 16;

const MAX_SEGMENTS: u32 = 256;

/// A mesh recipe with concrete parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometrySpec {
    /// Axis-aligned cube with edge length `size`.
    Cube { size: f32 },
    /// UV sphere; `width_segments` around the equator, `height_segments` pole to pole.
    Sphere {
        radius: f32,
        width_segments: u32,
        height_segments: u32,
    },
    /// Single quad in the XY plane facing +Z.
    Plane { width: f32, height: f32 },
    /// Capped cylinder around the Y axis.
    Cylinder {
        radius: f32,
        height: f32,
        segments: u32,
    },
    /// Ring around the Z axis; `major_segments` along the ring, `minor_segments` around the tube.
    Torus {
        major_radius: f32,
        minor_radius: f32,
        major_segments: u32,
        minor_segments: u32,
    },
}

impl GeometrySpec {
    /// The default recipe for a geometry tag.
    pub fn from_kind(kind: GeometryKind) -> Self {
        match kind {
            GeometryKind::Cube => Self::Cube { size: CUBE_SIZE },
            GeometryKind::Sphere => Self::Sphere {
                radius: SPHERE_RADIUS,
                width_segments: SPHERE_WIDTH_SEGMENTS,
                height_segments: SPHERE_HEIGHT_SEGMENTS,
            },
            GeometryKind::Plane => Self::Plane {
                width: PLANE_WIDTH,
                height: PLANE_HEIGHT,
            },
            GeometryKind::Cylinder => Self::Cylinder {
                radius: CYLINDER_RADIUS,
                height: CYLINDER_HEIGHT,
                segments: CYLINDER_SEGMENTS,
            },
            GeometryKind::Torus => Self::Torus {
                major_radius: TORUS_MAJOR_RADIUS,
                minor_radius: TORUS_MINOR_RADIUS,
                major_segments: TORUS_MAJOR_SEGMENTS,
                minor_segments: TORUS_MINOR_SEGMENTS,
            },
        }
    }

    /// Default recipe by name; unknown names give the cube.
    pub fn from_name(name: &str) -> Self {
        Self::from_kind(GeometryKind::from_name(name))
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Cube { .. } => GeometryKind::Cube,
            Self::Sphere { .. } => GeometryKind::Sphere,
            Self::Plane { .. } => GeometryKind::Plane,
            Self::Cylinder { .. } => GeometryKind::Cylinder,
            Self::Torus { .. } => GeometryKind::Torus,
        }
    }
}

impl Default for GeometrySpec {
    fn default() -> Self {
        Self::from_kind(GeometryKind::default())
    }
}

/// Triangle-list buffers; `vertices[i]` and `normals[i]` describe the same vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vec3>,
    pub normals: Vec<Vec3>,
}

impl MeshData {
    fn with_triangles(triangles: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(triangles * 3),
            normals: Vec::with_capacity(triangles * 3),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    fn push_triangle(&mut self, positions: [Vec3; 3], normals: [Vec3; 3]) {
        self.vertices.extend_from_slice(&positions);
        self.normals.extend_from_slice(&normals);
    }
}

/// Builds the mesh for `spec`. Pure and infallible; out-of-range parameters
/// are clamped with a warning.
pub fn generate(spec: &GeometrySpec) -> MeshData {
    match *spec {
        GeometrySpec::Cube { size } => generate_cube(size),
        GeometrySpec::Sphere {
            radius,
            width_segments,
            height_segments,
        } => generate_sphere(radius, width_segments, height_segments),
        GeometrySpec::Plane { width, height } => generate_plane(width, height),
        GeometrySpec::Cylinder {
            radius,
            height,
            segments,
        } => generate_cylinder(radius, height, segments),
        GeometrySpec::Torus {
            major_radius,
            minor_radius,
            major_segments,
            minor_segments,
        } => generate_torus(major_radius, minor_radius, major_segments, minor_segments),
    }
}

fn positive(value: f32, what: &str) -> f32 {
    if value > 0.0 {
        value
    } else {
        warn!(what, value, "geometry parameter must be > 0.0, clamping to 0.001");
        0.001
    }
}

fn segments(value: u32, min: u32, what: &str) -> u32 {
    let clamped = value.clamp(min, MAX_SEGMENTS);
    if clamped != value {
        warn!(what, value, clamped, "geometry segment count out of range");
    }
    clamped
}

fn generate_cube(size: f32) -> MeshData {
    let s = positive(size, "cube size") * 0.5;
    let mut mesh = MeshData::with_triangles(12);

    // v0=BL, v1=BR, v2=TR, v3=TL seen from outside the face.
    let mut quad = |v0: Vec3, v1: Vec3, v2: Vec3, v3: Vec3, normal: Vec3| {
        mesh.push_triangle([v0, v1, v2], [normal; 3]);
        mesh.push_triangle([v0, v2, v3], [normal; 3]);
    };

    quad(
        Vec3::new(-s, -s, s),
        Vec3::new(s, -s, s),
        Vec3::new(s, s, s),
        Vec3::new(-s, s, s),
        Vec3::Z,
    );
    quad(
        Vec3::new(s, -s, -s),
        Vec3::new(-s, -s, -s),
        Vec3::new(-s, s, -s),
        Vec3::new(s, s, -s),
        Vec3::NEG_Z,
    );
    quad(
        Vec3::new(-s, s, s),
        Vec3::new(s, s, s),
        Vec3::new(s, s, -s),
        Vec3::new(-s, s, -s),
        Vec3::Y,
    );
    quad(
        Vec3::new(-s, -s, -s),
        Vec3::new(s, -s, -s),
        Vec3::new(s, -s, s),
        Vec3::new(-s, -s, s),
        Vec3::NEG_Y,
    );
    quad(
        Vec3::new(s, -s, s),
        Vec3::new(s, -s, -s),
        Vec3::new(s, s, -s),
        Vec3::new(s, s, s),
        Vec3::X,
    );
    quad(
        Vec3::new(-s, -s, -s),
        Vec3::new(-s, -s, s),
        Vec3::new(-s, s, s),
        Vec3::new(-s, s, -s),
        Vec3::NEG_X,
    );

    mesh
}

fn generate_sphere(radius: f32, width_segments: u32, height_segments: u32) -> MeshData {
    let radius = positive(radius, "sphere radius");
    let columns = segments(width_segments, 3, "sphere width segments");
    let rows = segments(height_segments, 2, "sphere height segments");

    let stride = columns as usize + 1;
    let mut directions = Vec::with_capacity(stride * (rows as usize + 1));
    for row in 0..=rows {
        let theta = row as f32 / rows as f32 * PI;
        for column in 0..=columns {
            let phi = column as f32 / columns as f32 * 2.0 * PI;
            directions.push(Vec3::new(
                -phi.cos() * theta.sin(),
                theta.cos(),
                phi.sin() * theta.sin(),
            ));
        }
    }
    let at = |column: u32, row: u32| directions[row as usize * stride + column as usize];

    let mut mesh = MeshData::with_triangles((2 * rows as usize - 2) * columns as usize);
    for row in 0..rows {
        for column in 0..columns {
            let a = at(column + 1, row);
            let b = at(column, row);
            let c = at(column, row + 1);
            let d = at(column + 1, row + 1);

            // a and b coincide on the north pole row, c and d on the south pole row.
            if row != 0 {
                mesh.push_triangle([a * radius, b * radius, d * radius], [a, b, d]);
            }
            if row != rows - 1 {
                mesh.push_triangle([b * radius, c * radius, d * radius], [b, c, d]);
            }
        }
    }

    mesh
}

fn generate_plane(width: f32, height: f32) -> MeshData {
    let hw = positive(width, "plane width") * 0.5;
    let hh = positive(height, "plane height") * 0.5;

    let bl = Vec3::new(-hw, -hh, 0.0);
    let br = Vec3::new(hw, -hh, 0.0);
    let tr = Vec3::new(hw, hh, 0.0);
    let tl = Vec3::new(-hw, hh, 0.0);

    let mut mesh = MeshData::with_triangles(2);
    mesh.push_triangle([bl, br, tr], [Vec3::Z; 3]);
    mesh.push_triangle([bl, tr, tl], [Vec3::Z; 3]);
    mesh
}

fn generate_cylinder(radius: f32, height: f32, segment_count: u32) -> MeshData {
    let radius = positive(radius, "cylinder radius");
    let half_height = positive(height, "cylinder height") * 0.5;
    let segment_count = segments(segment_count, 3, "cylinder segments");

    let directions: Vec<Vec3> = (0..=segment_count)
        .map(|i| {
            let theta = i as f32 / segment_count as f32 * 2.0 * PI;
            Vec3::new(theta.sin(), 0.0, theta.cos())
        })
        .collect();
    let top = Vec3::new(0.0, half_height, 0.0);
    let bottom = Vec3::new(0.0, -half_height, 0.0);

    let mut mesh = MeshData::with_triangles(4 * segment_count as usize);
    for pair in directions.windows(2) {
        let (here, next) = (pair[0], pair[1]);
        let a = here * radius + top;
        let b = here * radius + bottom;
        let c = next * radius + bottom;
        let d = next * radius + top;

        mesh.push_triangle([a, b, d], [here, here, next]);
        mesh.push_triangle([b, c, d], [here, next, next]);
        mesh.push_triangle([top, a, d], [Vec3::Y; 3]);
        mesh.push_triangle([bottom, c, b], [Vec3::NEG_Y; 3]);
    }

    mesh
}

fn generate_torus(
    major_radius: f32,
    minor_radius: f32,
    major_segments: u32,
    minor_segments: u32,
) -> MeshData {
    let major_radius = positive(major_radius, "torus major radius");
    let minor_radius = positive(minor_radius, "torus minor radius");
    let major_segments = segments(major_segments, 3, "torus major segments");
    let minor_segments = segments(minor_segments, 3, "torus minor segments");

    let stride = major_segments as usize + 1;
    let mut centers = Vec::with_capacity(stride * (minor_segments as usize + 1));
    let mut directions = Vec::with_capacity(centers.capacity());
    for ring in 0..=minor_segments {
        let v = ring as f32 / minor_segments as f32 * 2.0 * PI;
        for step in 0..=major_segments {
            let u = step as f32 / major_segments as f32 * 2.0 * PI;
            centers.push(Vec3::new(major_radius * u.cos(), major_radius * u.sin(), 0.0));
            directions.push(Vec3::new(v.cos() * u.cos(), v.cos() * u.sin(), v.sin()));
        }
    }
    let vertex = |step: u32, ring: u32| {
        let index = ring as usize * stride + step as usize;
        (centers[index] + directions[index] * minor_radius, directions[index])
    };

    let mut mesh = MeshData::with_triangles(2 * major_segments as usize * minor_segments as usize);
    for ring in 1..=minor_segments {
        for step in 1..=major_segments {
            let (pa, na) = vertex(step - 1, ring);
            let (pb, nb) = vertex(step - 1, ring - 1);
            let (pc, nc) = vertex(step, ring - 1);
            let (pd, nd) = vertex(step, ring);

            mesh.push_triangle([pa, pb, pd], [na, nb, nd]);
            mesh.push_triangle([pb, pc, pd], [nb, nc, nd]);
        }
    }

    mesh
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_defaults() -> Vec<GeometrySpec> {
        GeometryKind::ALL
            .into_iter()
            .map(GeometrySpec::from_kind)
            .collect()
    }

    #[test]
    fn buffers_are_aligned_triangle_lists() {
        for spec in all_defaults() {
            let mesh = generate(&spec);
            assert_eq!(mesh.vertices.len(), mesh.normals.len(), "{spec:?}");
            assert!(mesh.vertex_count() > 0, "{spec:?}");
            assert_eq!(mesh.vertex_count() % 3, 0, "{spec:?}");
        }
    }

    #[test]
    fn default_vertex_counts() {
        let counts: Vec<(GeometryKind, usize)> = all_defaults()
            .iter()
            .map(|spec| (spec.kind(), generate(spec).vertex_count()))
            .collect();
        assert_eq!(
            counts,
            vec![
                (GeometryKind::Cube, 36),
                (GeometryKind::Sphere, 2880),
                (GeometryKind::Plane, 6),
                (GeometryKind::Cylinder, 384),
                (GeometryKind::Torus, 1536),
            ]
        );
    }

    #[test]
    fn curved_normals_are_unit_length() {
        for kind in [GeometryKind::Sphere, GeometryKind::Cylinder, GeometryKind::Torus] {
            let mesh = generate(&GeometrySpec::from_kind(kind));
            for normal in &mesh.normals {
                assert!((normal.length() - 1.0).abs() < 1e-5, "{kind}: {normal:?}");
            }
        }
    }

    #[test]
    fn triangles_wind_counter_clockwise_from_outside() {
        for spec in all_defaults() {
            let mesh = generate(&spec);
            for (positions, normals) in mesh.vertices.chunks(3).zip(mesh.normals.chunks(3)) {
                let face = (positions[1] - positions[0]).cross(positions[2] - positions[0]);
                assert!(face.length() > 1e-7, "{spec:?} emitted a degenerate triangle");
                let outward = normals[0] + normals[1] + normals[2];
                assert!(face.dot(outward) > 0.0, "{spec:?} triangle {positions:?}");
            }
        }
    }

    #[test]
    fn sphere_positions_sit_on_radius() {
        let mesh = generate(&GeometrySpec::Sphere {
            radius: 2.5,
            width_segments: 8,
            height_segments: 6,
        });
        for (position, normal) in mesh.vertices.iter().zip(&mesh.normals) {
            assert!((position.length() - 2.5).abs() < 1e-4);
            assert!((*position / 2.5 - *normal).length() < 1e-5);
        }
        assert_eq!(mesh.triangle_count(), 2 * 8 * 6 - 2 * 8);
    }

    #[test]
    fn torus_defaults_match_recipe() {
        assert_eq!(
            GeometrySpec::from_name("Torus"),
            GeometrySpec::Torus {
                major_radius: 0.6,
                minor_radius: 0.3,
                major_segments: 16,
                minor_segments: 16,
            }
        );
    }

    #[test]
    fn unknown_names_fall_back_to_cube() {
        assert_eq!(GeometrySpec::from_name("icosahedron"), GeometrySpec::from_name("cube"));
        assert_eq!(generate(&GeometrySpec::from_name("")).vertex_count(), 36);
    }

    #[test]
    fn degenerate_parameters_are_clamped() {
        let mesh = generate(&GeometrySpec::Cylinder {
            radius: -1.0,
            height: 0.0,
            segments: 1,
        });
        assert_eq!(mesh.vertex_count(), 4 * 3 * 3);
    }

    #[test]
    fn generation_is_deterministic() {
        for spec in all_defaults() {
            assert_eq!(generate(&spec), generate(&spec));
        }
    }
}
