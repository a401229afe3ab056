// Scene data: vertex layout, uniforms, mesh loading and the camera
//
// Everything here is plain CPU data; the renderer uploads it.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem::{offset_of, size_of};
use std::path::Path;
use crate::config::CameraConfig;

/// Interleaved vertex as read by the vertex shader
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct Vertex {
    pub pos: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, tex_coord) as u32,
            },
        ]
    }
}

// Bitwise equality, so vertices can key a HashMap during deduplication
impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        bytemuck::bytes_of(self).hash(state);
    }
}

/// Matches the `UniformBufferObject` block in model.vert
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Two stacked, textured quads
    pub fn quads() -> Self {
        let corners = [
            ([-0.5, -0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
            ([0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
            ([0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
            ([-0.5, 0.5], [1.0, 1.0, 1.0], [0.0, 1.0]),
        ];

        let vertices = [0.0, -0.5]
            .iter()
            .flat_map(|&z| {
                corners.iter().map(move |&([x, y], color, uv)| Vertex {
                    pos: Vec3::new(x, y, z),
                    color: Vec3::from(color),
                    tex_coord: Vec2::from(uv),
                })
            })
            .collect();

        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4],
        }
    }

    pub fn load_obj(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open model {:?}", path))?;
        let mesh = Self::from_obj_reader(&mut BufReader::new(file))
            .with_context(|| format!("Failed to load model {:?}", path))?;

        log::info!(
            "Loaded model {:?}: {} vertices, {} indices",
            path,
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(mesh)
    }

    /// Parse OBJ text; material libraries are ignored
    pub fn from_obj_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let (models, _materials) =
            tobj::load_obj_buf(reader, &Self::load_options(), |_| Ok(Default::default()))
                .context("Failed to parse OBJ data")?;
        Self::from_models(&models)
    }

    fn load_options() -> tobj::LoadOptions {
        tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        }
    }

    fn from_models(models: &[tobj::Model]) -> Result<Self> {
        let mut mesh = Self::default();
        let mut unique: HashMap<Vertex, u32> = HashMap::new();

        for model in models {
            let source = &model.mesh;
            for &index in &source.indices {
                let i = index as usize;
                let pos = source
                    .positions
                    .get(3 * i..3 * i + 3)
                    .with_context(|| format!("Vertex index {} out of range", index))?;

                // OBJ puts v = 0 at the bottom, Vulkan samples top-down
                let tex_coord = match source.texcoords.get(2 * i..2 * i + 2) {
                    Some(uv) => Vec2::new(uv[0], 1.0 - uv[1]),
                    None => Vec2::ZERO,
                };

                let vertex = Vertex {
                    pos: Vec3::new(pos[0], pos[1], pos[2]),
                    color: Vec3::ONE,
                    tex_coord,
                };

                let next = mesh.vertices.len() as u32;
                let slot = *unique.entry(vertex).or_insert_with(|| {
                    mesh.vertices.push(vertex);
                    next
                });
                mesh.indices.push(slot);
            }
        }

        if mesh.indices.is_empty() {
            anyhow::bail!("Model contains no triangles");
        }
        Ok(mesh)
    }
}

/// Fixed camera looking at a model spinning around +Z
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    /// Radians per second
    pub spin_rate: f32,
}

impl From<&CameraConfig> for Camera {
    fn from(config: &CameraConfig) -> Self {
        Self {
            eye: Vec3::from(config.eye),
            target: Vec3::from(config.target),
            up: Vec3::from(config.up),
            fov_y: config.fov_y_degrees.to_radians(),
            near: config.near,
            far: config.far,
            spin_rate: config.rotation_degrees_per_second.to_radians(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

impl Camera {
    pub fn uniforms(&self, elapsed_secs: f32, extent: vk::Extent2D) -> UniformBufferObject {
        let aspect = extent.width as f32 / extent.height.max(1) as f32;

        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        UniformBufferObject {
            model: Mat4::from_rotation_z(elapsed_secs * self.spin_rate),
            view: Mat4::look_at_rh(self.eye, self.target, self.up),
            proj,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;
    use std::io::Cursor;

    #[test]
    fn vertex_layout_matches_shader() {
        assert_eq!(size_of::<Vertex>(), 32);

        let binding = Vertex::binding_description();
        assert_eq!(binding.stride, 32);

        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 192);
    }

    #[test]
    fn quads_are_two_squares() {
        let mesh = Mesh::quads();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.indices.len(), 12);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
        assert_eq!(mesh.vertices[4].pos.z, -0.5);
    }

    const QUAD_OBJ: &str = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
f 1/1 2/2 3/3 4/4
";

    #[test]
    fn obj_faces_are_triangulated_and_deduplicated() {
        let mesh = Mesh::from_obj_reader(&mut Cursor::new(QUAD_OBJ)).unwrap();
        assert_eq!(mesh.indices.len(), 6);
        assert_eq!(mesh.vertices.len(), 4);
        assert!(mesh.vertices.iter().all(|v| v.color == Vec3::ONE));
    }

    #[test]
    fn obj_texture_v_is_flipped() {
        let mesh = Mesh::from_obj_reader(&mut Cursor::new(QUAD_OBJ)).unwrap();
        let origin = mesh
            .vertices
            .iter()
            .find(|v| v.pos == Vec3::ZERO)
            .unwrap();
        assert_eq!(origin.tex_coord, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn shared_corners_are_reused_across_faces() {
        let obj = "\
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3
f 1 3 4
";
        let mesh = Mesh::from_obj_reader(&mut Cursor::new(obj)).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn obj_file_loads_like_text() {
        let path = std::env::temp_dir().join(format!("vk-viewer-{}-quad.obj", std::process::id()));
        std::fs::write(&path, QUAD_OBJ).unwrap();
        let from_file = Mesh::load_obj(&path);
        std::fs::remove_file(&path).unwrap();

        let from_file = from_file.unwrap();
        let from_text = Mesh::from_obj_reader(&mut Cursor::new(QUAD_OBJ)).unwrap();
        assert_eq!(from_file.vertices, from_text.vertices);
        assert_eq!(from_file.indices, from_text.indices);
    }

    #[test]
    fn missing_obj_file_is_an_error() {
        let err = Mesh::load_obj(Path::new("definitely/not/here/model.obj")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to open model"));
    }

    #[test]
    fn empty_obj_is_rejected() {
        assert!(Mesh::from_obj_reader(&mut Cursor::new("# nothing\n")).is_err());
    }

    #[test]
    fn model_spins_around_z() {
        let camera = Camera::default();
        let extent = vk::Extent2D { width: 800, height: 600 };

        let start = camera.uniforms(0.0, extent);
        assert_eq!(start.model, Mat4::IDENTITY);

        // 90 degrees per second: one second is a quarter turn
        let turned = camera.uniforms(1.0, extent).model * Vec4::X;
        assert!((turned - Vec4::Y).abs().max_element() < 1e-5);
    }

    #[test]
    fn projection_flips_y_and_uses_aspect() {
        let camera = Camera::default();
        let ubo = camera.uniforms(0.0, vk::Extent2D { width: 800, height: 600 });

        let expected = Mat4::perspective_rh(45f32.to_radians(), 800.0 / 600.0, 0.1, 10.0);
        assert!(ubo.proj.y_axis.y < 0.0);
        assert_eq!(ubo.proj.y_axis.y, -expected.y_axis.y);
        assert_eq!(ubo.proj.x_axis.x, expected.x_axis.x);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let ubo = Camera::default().uniforms(0.0, vk::Extent2D { width: 800, height: 0 });
        assert!(ubo.proj.x_axis.x.is_finite());
    }

    #[test]
    fn view_looks_at_target() {
        let camera = Camera::default();
        let ubo = camera.uniforms(0.0, vk::Extent2D { width: 1, height: 1 });
        let target = ubo.view * camera.target.extend(1.0);
        // Right-handed view space looks down -Z
        assert!(target.x.abs() < 1e-5 && target.y.abs() < 1e-5);
        assert!(target.z < 0.0);
    }
}
