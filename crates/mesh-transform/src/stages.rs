//! The stages of the OBJ to GLB pipeline.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use image::imageops::FilterType;
use pipeline_common::{Stage, StageError};
use tracing::{debug, warn};

use crate::obj::{self, ObjData, VertexRef};
use crate::{Material, Mesh, MeshDocument, MeshError, Primitive, TextureImage, glb};

/// Parse the OBJ (and its material libraries) into the document mesh.
pub struct Decode;

impl Stage<MeshDocument> for Decode {
    fn name(&self) -> &'static str {
        "decode"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let source = std::fs::read_to_string(&doc.source)
            .map_err(|e| MeshError::io("reading OBJ", &doc.source, e))?;
        let data = obj::parse_obj(&source)?;
        if data.triangle_count() == 0 {
            return Err(MeshError::Empty.into());
        }

        let mut library = Vec::new();
        for lib in &data.material_libs {
            let path = doc.source_dir().join(lib);
            match std::fs::read_to_string(&path) {
                Ok(text) => {
                    let mtl_dir = path.parent().unwrap_or_else(|| Path::new("."));
                    library.extend(obj::parse_mtl(&text).into_iter().map(|mut material| {
                        material.diffuse_map = material.diffuse_map.map(|map| mtl_dir.join(map));
                        material
                    }));
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Material library not readable"),
            }
        }

        let (mesh, materials) = build_mesh(&data, &library);
        debug!(
            vertices = mesh.vertex_count(),
            triangles = mesh.triangle_count(),
            materials = materials.len(),
            "Decoded OBJ"
        );
        doc.mesh = mesh;
        doc.materials = materials;
        Ok(())
    }
}

/// Convert OBJ face corners into an indexed mesh, one vertex per distinct
/// position/uv/normal combination.
fn build_mesh(data: &ObjData, library: &[Material]) -> (Mesh, Vec<Material>) {
    let corners = || data.groups.iter().flat_map(|g| g.triangles.iter().flatten());
    let has_uvs = corners().any(|c| c.tex_coord.is_some());
    let has_normals = corners().all(|c| c.normal.is_some());

    let mut mesh = Mesh {
        normals: has_normals.then(Vec::new),
        uvs: has_uvs.then(Vec::new),
        ..Mesh::default()
    };
    let mut materials: Vec<Material> = Vec::new();
    let mut material_slots: HashMap<&str, usize> = HashMap::new();
    let mut vertex_slots: HashMap<VertexRef, u32> = HashMap::new();

    for group in &data.groups {
        let material = group.material.as_deref().map(|name| {
            *material_slots.entry(name).or_insert_with(|| {
                let found = library.iter().find(|m| m.name == name).cloned();
                materials.push(found.unwrap_or_else(|| Material::named(name)));
                materials.len() - 1
            })
        });

        let mut indices = Vec::with_capacity(group.triangles.len() * 3);
        for corner in group.triangles.iter().flatten() {
            let index = *vertex_slots.entry(*corner).or_insert_with(|| {
                mesh.positions.push(data.positions[corner.position]);
                if let Some(normals) = mesh.normals.as_mut() {
                    normals.push(corner.normal.map_or([0.0; 3], |n| data.normals[n]));
                }
                if let Some(uvs) = mesh.uvs.as_mut() {
                    uvs.push(corner.tex_coord.map_or([0.0; 2], |t| data.tex_coords[t]));
                }
                (mesh.positions.len() - 1) as u32
            });
            indices.push(index);
        }

        mesh.primitives.push(Primitive {
            name: group.name.clone(),
            material,
            indices,
        });
    }

    (mesh, materials)
}

/// Translate the mesh so its bounding box is centred on the origin.
pub struct Center;

impl Stage<MeshDocument> for Center {
    fn name(&self) -> &'static str {
        "center"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let Some((min, max)) = doc.mesh.bounds() else {
            return Ok(());
        };
        let center = [0, 1, 2].map(|axis| (min[axis] + max[axis]) / 2.0);
        for p in &mut doc.mesh.positions {
            for axis in 0..3 {
                p[axis] -= center[axis];
            }
        }
        Ok(())
    }
}

/// Merge vertices whose attributes are bit-identical.
pub struct Dedup;

impl Stage<MeshDocument> for Dedup {
    fn name(&self) -> &'static str {
        "dedup"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let removed = doc.mesh.merge_vertices(|m, v| {
            (
                m.positions[v].map(f32::to_bits),
                m.normals.as_ref().map(|n| n[v].map(f32::to_bits)),
                m.uvs.as_ref().map(|uv| uv[v].map(f32::to_bits)),
            )
        });
        debug!(removed, "Deduplicated vertices");
        Ok(())
    }
}

/// Merge primitives drawn with the same material.
pub struct Join;

impl Stage<MeshDocument> for Join {
    fn name(&self) -> &'static str {
        "join"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let before = doc.mesh.primitives.len();
        let mut joined: Vec<Primitive> = Vec::with_capacity(before);
        let mut slots: HashMap<Option<usize>, usize> = HashMap::new();

        for primitive in doc.mesh.primitives.drain(..) {
            match slots.get(&primitive.material) {
                Some(&slot) => joined[slot].indices.extend(primitive.indices),
                None => {
                    slots.insert(primitive.material, joined.len());
                    joined.push(primitive);
                }
            }
        }

        debug!(before, after = joined.len(), "Joined primitives");
        doc.mesh.primitives = joined;
        Ok(())
    }
}

/// Merge vertices closer than `tolerance` and drop triangles that collapse.
pub struct Weld {
    tolerance: f32,
}

impl Weld {
    pub fn new(tolerance: f32) -> Self {
        Self {
            tolerance: tolerance.max(f32::EPSILON),
        }
    }
}

impl Stage<MeshDocument> for Weld {
    fn name(&self) -> &'static str {
        "weld"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let tolerance = self.tolerance;
        let quantize = move |value: f32| (value / tolerance).round() as i64;

        let removed = doc.mesh.merge_vertices(|m, v| {
            (
                m.positions[v].map(quantize),
                m.normals.as_ref().map(|n| n[v].map(quantize)),
                m.uvs.as_ref().map(|uv| uv[v].map(quantize)),
            )
        });

        let mut degenerate = 0usize;
        for primitive in &mut doc.mesh.primitives {
            let before = primitive.indices.len();
            primitive.indices = primitive
                .indices
                .chunks_exact(3)
                .filter(|t| t[0] != t[1] && t[1] != t[2] && t[0] != t[2])
                .flatten()
                .copied()
                .collect();
            degenerate += (before - primitive.indices.len()) / 3;
        }

        debug!(removed, degenerate, "Welded vertices");
        Ok(())
    }
}

/// Remove empty primitives, unreferenced vertices and unused materials.
pub struct Prune;

impl Stage<MeshDocument> for Prune {
    fn name(&self) -> &'static str {
        "prune"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let mesh = &mut doc.mesh;
        mesh.primitives.retain(|p| !p.indices.is_empty());
        if mesh.primitives.is_empty() {
            return Err(MeshError::Empty.into());
        }

        // Vertices, in first-use order.
        let mut remap = vec![u32::MAX; mesh.positions.len()];
        let mut keep = Vec::new();
        for primitive in &mut mesh.primitives {
            for index in &mut primitive.indices {
                let slot = &mut remap[*index as usize];
                if *slot == u32::MAX {
                    *slot = keep.len() as u32;
                    keep.push(*index as usize);
                }
                *index = *slot;
            }
        }
        let dropped_vertices = mesh.positions.len() - keep.len();
        mesh.retain_vertices(&keep);

        let mut material_remap: HashMap<usize, usize> = HashMap::new();
        let mut materials = Vec::new();
        for primitive in &mut mesh.primitives {
            if let Some(old) = primitive.material {
                let new = *material_remap.entry(old).or_insert_with(|| {
                    materials.push(doc.materials[old].clone());
                    materials.len() - 1
                });
                primitive.material = Some(new);
            }
        }
        let dropped_materials = doc.materials.len() - materials.len();
        doc.materials = materials;

        debug!(dropped_vertices, dropped_materials, "Pruned document");
        Ok(())
    }
}

/// Load each material's diffuse map for embedding.
///
/// PNG and JPEG images within `max_size` are embedded byte for byte. Other
/// decodable formats, and larger images (scaled to fit, aspect kept), are
/// re-encoded as PNG. A texture that cannot be read or decoded is skipped and
/// its material keeps the base colour.
pub struct Textures {
    max_size: u32,
}

impl Textures {
    pub fn new(max_size: u32) -> Self {
        Self {
            max_size: max_size.max(1),
        }
    }
}

impl Stage<MeshDocument> for Textures {
    fn name(&self) -> &'static str {
        "texture"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        // Materials sharing a file share one embedded image.
        let mut loaded: HashMap<PathBuf, Option<usize>> = HashMap::new();

        for material in &mut doc.materials {
            let Some(path) = material.diffuse_map.as_ref() else {
                continue;
            };
            let slot = match loaded.get(path) {
                Some(slot) => *slot,
                None => {
                    let slot = match load_texture(path, self.max_size) {
                        Ok(texture) => {
                            debug!(
                                path = %path.display(),
                                width = texture.width,
                                height = texture.height,
                                mime_type = texture.mime_type,
                                bytes = texture.data.len(),
                                "Loaded texture"
                            );
                            doc.textures.push(texture);
                            Some(doc.textures.len() - 1)
                        }
                        Err(e) => {
                            warn!(material = %material.name, error = %e, "Texture skipped");
                            None
                        }
                    };
                    loaded.insert(path.clone(), slot);
                    slot
                }
            };
            material.base_color_texture = slot;
        }
        Ok(())
    }
}

fn load_texture(path: &Path, max_size: u32) -> Result<TextureImage, MeshError> {
    let bytes = std::fs::read(path).map_err(|e| MeshError::io("reading texture", path, e))?;
    let format = image::guess_format(&bytes).map_err(|e| MeshError::image(path, e))?;
    let decoded = image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| MeshError::image(path, e))?;

    let (width, height) = (decoded.width(), decoded.height());
    let fits = width <= max_size && height <= max_size;
    let embeddable = match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        _ => None,
    };
    if let Some(mime_type) = embeddable
        && fits
    {
        return Ok(TextureImage {
            source: path.to_path_buf(),
            mime_type,
            width,
            height,
            data: bytes,
        });
    }

    let image = if fits {
        decoded
    } else {
        decoded.resize(max_size, max_size, FilterType::Triangle)
    };
    let mut data = Cursor::new(Vec::new());
    image
        .write_to(&mut data, ImageFormat::Png)
        .map_err(|e| MeshError::image(path, e))?;

    Ok(TextureImage {
        source: path.to_path_buf(),
        mime_type: "image/png",
        width: image.width(),
        height: image.height(),
        data: data.into_inner(),
    })
}

/// Generate area-weighted smooth normals when the mesh has none.
pub struct Normals;

impl Stage<MeshDocument> for Normals {
    fn name(&self) -> &'static str {
        "normals"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let mesh = &mut doc.mesh;
        if mesh.normals.is_some() {
            return Ok(());
        }

        let mut normals = vec![[0.0f32; 3]; mesh.positions.len()];
        for triangle in mesh.primitives.iter().flat_map(|p| p.indices.chunks_exact(3)) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.positions[triangle[i] as usize]);
            let ab = sub(b, a);
            let ac = sub(c, a);
            // Unnormalised cross product weights by triangle area.
            let face = cross(ab, ac);
            for &vertex in triangle {
                let n = &mut normals[vertex as usize];
                for axis in 0..3 {
                    n[axis] += face[axis];
                }
            }
        }

        for n in &mut normals {
            *n = normalize(*n);
        }
        mesh.normals = Some(normals);
        Ok(())
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn normalize(v: [f32; 3]) -> [f32; 3] {
    let len = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if len <= f32::EPSILON {
        return [0.0, 1.0, 0.0];
    }
    [v[0] / len, v[1] / len, v[2] / len]
}

/// Encode the document as a GLB container.
pub struct Serialize;

impl Stage<MeshDocument> for Serialize {
    fn name(&self) -> &'static str {
        "serialize"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let bytes = glb::encode(&doc.mesh, &doc.materials, &doc.textures)?;
        debug!(bytes = bytes.len(), "Serialized GLB");
        doc.glb = Some(bytes);
        Ok(())
    }
}

/// Write the encoded GLB next to a temporary file, then move it into place.
pub struct Write;

impl Stage<MeshDocument> for Write {
    fn name(&self) -> &'static str {
        "write"
    }

    fn apply(&mut self, doc: &mut MeshDocument) -> Result<(), StageError> {
        let bytes = doc.glb.as_ref().ok_or(MeshError::MissingInput("write"))?;
        let partial = doc.output.with_extension("glb.part");

        std::fs::write(&partial, bytes).map_err(|e| MeshError::io("writing GLB", &partial, e))?;
        std::fs::rename(&partial, &doc.output)
            .map_err(|e| MeshError::io("renaming GLB", &doc.output, e))?;
        Ok(())
    }
}
