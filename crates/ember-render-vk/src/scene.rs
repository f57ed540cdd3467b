// SPDX-License-Identifier: CEPL-1.0
use bytemuck::{Pod, Zeroable};
use ember_render::Demo;
use glam::{Mat4, Vec3};

/// Which shader pair and vertex layout a demo draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneKind {
    /// Positions generated in the vertex shader, black fragments.
    Triangle,
    /// Indexed coloured geometry in clip space.
    Colored,
    /// Indexed coloured geometry transformed by a push-constant MVP.
    Mesh,
    /// One quad drawn once per instance with a per-instance offset and tint.
    Instanced,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Instance {
    pub offset: [f32; 2],
    pub tint: [f32; 3],
}

/// Where each stream lives inside the single geometry buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneDesc {
    pub kind: SceneKind,
    pub vertex_offset: u64,
    pub index_offset: u64,
    pub instance_offset: u64,
    pub vertex_count: u32,
    pub index_count: u32,
    pub instance_count: u32,
}

impl SceneDesc {
    pub fn uses_buffer(&self) -> bool {
        self.kind != SceneKind::Triangle
    }
}

/// CPU-side geometry ready for upload.
pub struct SceneData {
    pub desc: SceneDesc,
    pub bytes: Vec<u8>,
}

const ALIGN: usize = 16;

fn append<T: Pod>(bytes: &mut Vec<u8>, items: &[T]) -> u64 {
    let start = bytes.len().next_multiple_of(ALIGN);
    bytes.resize(start, 0);
    bytes.extend_from_slice(bytemuck::cast_slice(items));
    start as u64
}

fn pack(kind: SceneKind, vertices: &[Vertex], indices: &[u16], instances: &[Instance]) -> SceneData {
    let mut bytes = Vec::new();
    let vertex_offset = append(&mut bytes, vertices);
    let index_offset = append(&mut bytes, indices);
    let instance_offset = if instances.is_empty() {
        0
    } else {
        append(&mut bytes, instances)
    };
    SceneData {
        desc: SceneDesc {
            kind,
            vertex_offset,
            index_offset,
            instance_offset,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            instance_count: instances.len().max(1) as u32,
        },
        bytes,
    }
}

const TRI_VERTS: [Vertex; 3] = [
    Vertex {
        pos: [0.0, -0.6, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        pos: [0.5, 0.4, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        pos: [-0.5, 0.4, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];
const TRI_IDXS: [u16; 3] = [0, 1, 2];

fn cube() -> (Vec<Vertex>, Vec<u16>) {
    let mut verts = Vec::with_capacity(8);
    for i in 0..8u8 {
        let bit = |b: u8| if i & (1 << b) != 0 { 1.0 } else { 0.0 };
        let (x, y, z) = (bit(0), bit(1), bit(2));
        verts.push(Vertex {
            pos: [x - 0.5, y - 0.5, z - 0.5],
            color: [x, y, z],
        });
    }
    #[rustfmt::skip]
    let idx = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    (verts, idx)
}

pub const GRID: u32 = 8;
const QUAD_HALF: f32 = 0.08;

fn quad_and_grid() -> (Vec<Vertex>, Vec<u16>, Vec<Instance>) {
    let h = QUAD_HALF;
    let verts = vec![
        Vertex {
            pos: [-h, -h, 0.0],
            color: [1.0, 1.0, 1.0],
        },
        Vertex {
            pos: [h, -h, 0.0],
            color: [0.8, 0.8, 0.8],
        },
        Vertex {
            pos: [h, h, 0.0],
            color: [0.6, 0.6, 0.6],
        },
        Vertex {
            pos: [-h, h, 0.0],
            color: [0.8, 0.8, 0.8],
        },
    ];
    let idx = vec![0, 1, 2, 2, 3, 0];

    let step = 2.0 / GRID as f32;
    let last = (GRID - 1) as f32;
    let mut instances = Vec::with_capacity((GRID * GRID) as usize);
    for row in 0..GRID {
        for col in 0..GRID {
            let (fx, fy) = (col as f32, row as f32);
            instances.push(Instance {
                offset: [-1.0 + step * (fx + 0.5), -1.0 + step * (fy + 0.5)],
                tint: [fx / last, fy / last, 1.0 - fx / last],
            });
        }
    }
    (verts, idx, instances)
}

pub fn scene_kind(demo: Demo) -> SceneKind {
    match demo {
        Demo::Triangle => SceneKind::Triangle,
        Demo::Dynamic | Demo::Resizable => SceneKind::Colored,
        Demo::Model => SceneKind::Mesh,
        Demo::Instanced => SceneKind::Instanced,
    }
}

/// Geometry for `demo`. The shader-generated triangle carries no bytes.
pub fn scene_for(demo: Demo) -> SceneData {
    match scene_kind(demo) {
        SceneKind::Triangle => SceneData {
            desc: SceneDesc {
                kind: SceneKind::Triangle,
                vertex_offset: 0,
                index_offset: 0,
                instance_offset: 0,
                vertex_count: 3,
                index_count: 0,
                instance_count: 1,
            },
            bytes: Vec::new(),
        },
        SceneKind::Colored => pack(SceneKind::Colored, &TRI_VERTS, &TRI_IDXS, &[]),
        SceneKind::Mesh => {
            let (v, i) = cube();
            pack(SceneKind::Mesh, &v, &i, &[])
        }
        SceneKind::Instanced => {
            let (v, i, inst) = quad_and_grid();
            pack(SceneKind::Instanced, &v, &i, &inst)
        }
    }
}

/// Model-view-projection for the cube at a given aspect ratio, in Vulkan clip
/// space (y down, depth 0..1).
pub fn model_mvp(aspect: f32) -> Mat4 {
    let model = Mat4::from_rotation_y(0.6) * Mat4::from_rotation_x(0.4);
    let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 3.5), Vec3::ZERO, Vec3::Y);
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
    proj.y_axis.y *= -1.0;
    proj * view * model
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn triangle_demo_uploads_nothing() {
        let s = scene_for(Demo::Triangle);
        assert!(!s.desc.uses_buffer());
        assert!(s.bytes.is_empty());
        assert_eq!(s.desc.vertex_count, 3);
    }

    #[test]
    fn streams_are_aligned_and_inside_the_buffer() {
        for demo in [Demo::Dynamic, Demo::Model, Demo::Instanced] {
            let s = scene_for(demo);
            let d = s.desc;
            assert!(d.uses_buffer());
            assert_eq!(d.vertex_offset % ALIGN as u64, 0);
            assert_eq!(d.index_offset % ALIGN as u64, 0);
            assert_eq!(d.instance_offset % ALIGN as u64, 0);
            let idx_end = d.index_offset + d.index_count as u64 * 2;
            assert!(idx_end <= s.bytes.len() as u64, "{demo:?}");
            assert!(d.index_offset >= d.vertex_offset + d.vertex_count as u64 * 24);
        }
    }

    #[test]
    fn indices_reference_existing_vertices() {
        for demo in [Demo::Resizable, Demo::Model, Demo::Instanced] {
            let s = scene_for(demo);
            let d = s.desc;
            let start = d.index_offset as usize;
            let idx: Vec<u16> = s.bytes[start..start + d.index_count as usize * 2]
                .chunks_exact(2)
                .map(bytemuck::pod_read_unaligned)
                .collect();
            assert_eq!(idx.len() % 3, 0);
            assert!(idx.iter().all(|&i| (i as u32) < d.vertex_count), "{demo:?}");
        }
    }

    #[test]
    fn instanced_grid_fills_clip_space() {
        let s = scene_for(Demo::Instanced);
        assert_eq!(s.desc.instance_count, GRID * GRID);
        let start = s.desc.instance_offset as usize;
        let end = start + s.desc.instance_count as usize * std::mem::size_of::<Instance>();
        let inst: Vec<Instance> = s.bytes[start..end]
            .chunks_exact(std::mem::size_of::<Instance>())
            .map(bytemuck::pod_read_unaligned)
            .collect();
        assert_eq!(inst.len() as u32, GRID * GRID);
        for i in inst {
            assert!(i.offset[0].abs() + QUAD_HALF <= 1.0);
            assert!(i.offset[1].abs() + QUAD_HALF <= 1.0);
        }
    }

    #[test]
    fn cube_lands_in_front_of_the_camera() {
        let mvp = model_mvp(16.0 / 9.0);
        let (_, idx) = cube();
        assert_eq!(idx.len(), 36);
        for v in cube().0 {
            let clip = mvp * Vec4::new(v.pos[0], v.pos[1], v.pos[2], 1.0);
            let ndc = clip.truncate() / clip.w;
            assert!(clip.w > 0.0);
            assert!((0.0..=1.0).contains(&ndc.z), "{ndc:?}");
            assert!(ndc.x.abs() <= 1.0 && ndc.y.abs() <= 1.0, "{ndc:?}");
        }
    }
}
