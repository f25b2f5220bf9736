//! Binary glTF 2.0 (GLB) encoding.
//!
//! Layout: a 12-byte header, a JSON chunk padded with spaces and a BIN chunk
//! padded with zeros, both to 4-byte boundaries. All vertex attributes share
//! one buffer; each primitive gets its own `UNSIGNED_INT` index accessor.
//! Texture images follow the geometry in the same buffer.

use crate::gltf::{self, AccessorType};
use crate::{Material, Mesh, MeshError, TextureImage};

const GLB_MAGIC: u32 = 0x4654_6C67;
const GLB_VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

/// Accumulates buffer views and accessors over one binary buffer.
#[derive(Default)]
struct BufferBuilder {
    bin: Vec<u8>,
    views: Vec<gltf::BufferView>,
    accessors: Vec<gltf::Accessor>,
}

impl BufferBuilder {
    fn pad(&mut self) {
        while self.bin.len() % 4 != 0 {
            self.bin.push(0);
        }
    }

    fn push_view(&mut self, bytes: &[u8], target: Option<u32>) -> usize {
        self.pad();
        self.views.push(gltf::BufferView {
            buffer: 0,
            byte_offset: self.bin.len(),
            byte_length: bytes.len(),
            target,
        });
        self.bin.extend_from_slice(bytes);
        self.views.len() - 1
    }

    fn push_accessor(
        &mut self,
        bytes: &[u8],
        target: u32,
        component_type: u32,
        count: usize,
        kind: AccessorType,
    ) -> &mut gltf::Accessor {
        let buffer_view = self.push_view(bytes, Some(target));
        self.accessors.push(gltf::Accessor {
            buffer_view,
            component_type,
            count,
            kind,
            min: None,
            max: None,
        });
        let last = self.accessors.len() - 1;
        &mut self.accessors[last]
    }

    fn vec3(&mut self, values: &[[f32; 3]], with_bounds: bool) -> usize {
        let bytes: Vec<u8> = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        let accessor = self.push_accessor(
            &bytes,
            gltf::TARGET_ARRAY_BUFFER,
            gltf::COMPONENT_FLOAT,
            values.len(),
            AccessorType::Vec3,
        );
        if with_bounds {
            let (min, max) = bounds(values);
            accessor.min = Some(min.to_vec());
            accessor.max = Some(max.to_vec());
        }
        self.accessors.len() - 1
    }

    fn vec2(&mut self, values: &[[f32; 2]]) -> usize {
        let bytes: Vec<u8> = values.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
        self.push_accessor(
            &bytes,
            gltf::TARGET_ARRAY_BUFFER,
            gltf::COMPONENT_FLOAT,
            values.len(),
            AccessorType::Vec2,
        );
        self.accessors.len() - 1
    }

    fn indices(&mut self, indices: &[u32]) -> usize {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        self.push_accessor(
            &bytes,
            gltf::TARGET_ELEMENT_ARRAY_BUFFER,
            gltf::COMPONENT_UNSIGNED_INT,
            indices.len(),
            AccessorType::Scalar,
        );
        self.accessors.len() - 1
    }
}

fn bounds(values: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for v in values {
        for axis in 0..3 {
            min[axis] = min[axis].min(v[axis]);
            max[axis] = max[axis].max(v[axis]);
        }
    }
    (min, max)
}

fn material(material: &Material) -> gltf::Material {
    gltf::Material {
        name: material.name.clone(),
        pbr_metallic_roughness: gltf::PbrMetallicRoughness {
            base_color_factor: material.base_color,
            base_color_texture: material
                .base_color_texture
                .map(|index| gltf::TextureInfo { index }),
            metallic_factor: 0.0,
            roughness_factor: 1.0,
        },
        alpha_mode: (material.base_color[3] < 1.0).then_some(gltf::AlphaMode::Blend),
        double_sided: false,
    }
}

/// Build the glTF JSON document and binary buffer for a mesh.
///
/// Texture `i` samples image `i`; materials refer to textures by index.
pub fn build(
    mesh: &Mesh,
    materials: &[Material],
    textures: &[TextureImage],
) -> Result<(gltf::Root, Vec<u8>), MeshError> {
    if mesh.primitives.is_empty() || mesh.positions.is_empty() {
        return Err(MeshError::Empty);
    }

    let mut buffer = BufferBuilder::default();
    let attributes = gltf::Attributes {
        position: buffer.vec3(&mesh.positions, true),
        normal: mesh.normals.as_deref().map(|n| buffer.vec3(n, false)),
        tex_coord: mesh.uvs.as_deref().map(|uv| buffer.vec2(uv)),
    };

    let primitives = mesh
        .primitives
        .iter()
        .map(|primitive| gltf::Primitive {
            attributes,
            indices: buffer.indices(&primitive.indices),
            material: primitive.material,
            mode: gltf::MODE_TRIANGLES,
        })
        .collect();

    let images: Vec<gltf::Image> = textures
        .iter()
        .map(|texture| gltf::Image {
            buffer_view: buffer.push_view(&texture.data, None),
            mime_type: texture.mime_type,
        })
        .collect();
    buffer.pad();

    let root = gltf::Root {
        asset: gltf::Asset::default(),
        scene: 0,
        scenes: vec![gltf::Scene { nodes: vec![0] }],
        nodes: vec![gltf::Node {
            name: mesh.primitives.iter().find_map(|p| p.name.clone()),
            mesh: 0,
        }],
        meshes: vec![gltf::Mesh { primitives }],
        accessors: buffer.accessors,
        buffer_views: buffer.views,
        buffers: vec![gltf::Buffer {
            byte_length: buffer.bin.len(),
        }],
        materials: materials.iter().map(material).collect(),
        textures: (0..images.len())
            .map(|source| gltf::Texture { sampler: 0, source })
            .collect(),
        samplers: if images.is_empty() {
            Vec::new()
        } else {
            vec![gltf::Sampler::default()]
        },
        images,
    };

    Ok((root, buffer.bin))
}

/// Encode a mesh as a GLB byte vector.
pub fn encode(
    mesh: &Mesh,
    materials: &[Material],
    textures: &[TextureImage],
) -> Result<Vec<u8>, MeshError> {
    let (document, bin) = build(mesh, materials, textures)?;

    let mut json_chunk = serde_json::to_vec(&document)?;
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }

    let total = 12 + 8 + json_chunk.len() + 8 + bin.len();
    let total = u32::try_from(total).map_err(|_| MeshError::TooLarge(format!("{total} bytes")))?;

    let mut out = Vec::with_capacity(total as usize);
    out.extend_from_slice(&GLB_MAGIC.to_le_bytes());
    out.extend_from_slice(&GLB_VERSION.to_le_bytes());
    out.extend_from_slice(&total.to_le_bytes());
    out.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_JSON.to_le_bytes());
    out.extend_from_slice(&json_chunk);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin);
    Ok(out)
}
