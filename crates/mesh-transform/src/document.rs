//! Mesh document model shared by all stages.

use std::path::{Path, PathBuf};

/// A surface material: base colour plus an optional diffuse texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    /// Linear RGBA base colour.
    pub base_color: [f32; 4],
    /// Diffuse map (`map_Kd`) as written in the MTL, resolved against the
    /// MTL's directory by the `decode` stage.
    pub diffuse_map: Option<PathBuf>,
    /// Index into [`MeshDocument::textures`], set by the `texture` stage.
    pub base_color_texture: Option<usize>,
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_color: [1.0, 1.0, 1.0, 1.0],
            diffuse_map: None,
            base_color_texture: None,
        }
    }
}

/// An encoded image ready to be embedded in the GLB buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub source: PathBuf,
    /// `image/png` or `image/jpeg`.
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// A triangle list drawn with one material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Primitive {
    pub name: Option<String>,
    /// Index into [`MeshDocument::materials`].
    pub material: Option<usize>,
    /// Triangle list; length is always a multiple of three.
    pub indices: Vec<u32>,
}

impl Primitive {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Indexed triangle mesh with a shared vertex pool.
///
/// `normals` and `uvs`, when present, have exactly one entry per position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub primitives: Vec<Primitive>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(Primitive::triangle_count).sum()
    }

    /// Axis-aligned bounds as `(min, max)`, or `None` for an empty mesh.
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        let first = *self.positions.first()?;
        let mut min = first;
        let mut max = first;
        for p in &self.positions[1..] {
            for axis in 0..3 {
                min[axis] = min[axis].min(p[axis]);
                max[axis] = max[axis].max(p[axis]);
            }
        }
        Some((min, max))
    }

    /// Rebuild the vertex pool keeping the first vertex for each key and
    /// rewriting every index through the resulting remap table.
    ///
    /// Returns the number of vertices removed.
    pub(crate) fn merge_vertices<K, F>(&mut self, mut key: F) -> usize
    where
        K: std::hash::Hash + Eq,
        F: FnMut(&Mesh, usize) -> K,
    {
        let mut seen = std::collections::HashMap::with_capacity(self.positions.len());
        let mut remap = Vec::with_capacity(self.positions.len());
        let mut keep = Vec::new();

        for vertex in 0..self.positions.len() {
            let next = keep.len() as u32;
            let target = *seen.entry(key(self, vertex)).or_insert(next);
            if target == next {
                keep.push(vertex);
            }
            remap.push(target);
        }

        let removed = self.positions.len() - keep.len();
        if removed > 0 {
            self.retain_vertices(&keep);
            for primitive in &mut self.primitives {
                for index in &mut primitive.indices {
                    *index = remap[*index as usize];
                }
            }
        }
        removed
    }

    /// Keep only the listed vertices, in the given order.
    pub(crate) fn retain_vertices(&mut self, keep: &[usize]) {
        self.positions = keep.iter().map(|&v| self.positions[v]).collect();
        if let Some(normals) = &self.normals {
            self.normals = Some(keep.iter().map(|&v| normals[v]).collect());
        }
        if let Some(uvs) = &self.uvs {
            self.uvs = Some(keep.iter().map(|&v| uvs[v]).collect());
        }
    }
}

/// The document threaded through the OBJ to GLB pipeline.
#[derive(Debug, Clone)]
pub struct MeshDocument {
    /// OBJ file being converted.
    pub source: PathBuf,
    /// Destination GLB path.
    pub output: PathBuf,
    pub mesh: Mesh,
    pub materials: Vec<Material>,
    /// Embedded images, referenced by [`Material::base_color_texture`].
    pub textures: Vec<TextureImage>,
    /// Encoded GLB, filled by the `serialize` stage.
    pub glb: Option<Vec<u8>>,
}

impl MeshDocument {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            mesh: Mesh::default(),
            materials: Vec::new(),
            textures: Vec::new(),
            glb: None,
        }
    }

    /// Directory relative paths inside the OBJ (e.g. `mtllib`) resolve against.
    pub fn source_dir(&self) -> &Path {
        self.source.parent().unwrap_or_else(|| Path::new("."))
    }
}
