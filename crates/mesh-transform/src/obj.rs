//! Wavefront OBJ and MTL parsing.
//!
//! Supports `v`, `vt`, `vn`, `f` (any polygon, fan-triangulated, with
//! positive or negative indices in the `v`, `v/vt`, `v//vn` and `v/vt/vn`
//! forms), `o`, `g`, `usemtl` and `mtllib`. Other statements are ignored.

use std::path::PathBuf;

use crate::{Material, MeshError};

/// Resolved, zero-based reference to the attributes of one face corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexRef {
    pub position: usize,
    pub tex_coord: Option<usize>,
    pub normal: Option<usize>,
}

/// Consecutive faces sharing an object/group name and material.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FaceGroup {
    pub name: Option<String>,
    pub material: Option<String>,
    pub triangles: Vec<[VertexRef; 3]>,
}

/// Raw OBJ content.
#[derive(Debug, Clone, Default)]
pub struct ObjData {
    pub positions: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub groups: Vec<FaceGroup>,
    pub material_libs: Vec<String>,
}

impl ObjData {
    pub fn triangle_count(&self) -> usize {
        self.groups.iter().map(|g| g.triangles.len()).sum()
    }
}

/// Parse OBJ source text.
pub fn parse_obj(source: &str) -> Result<ObjData, MeshError> {
    let mut data = ObjData::default();
    let mut name: Option<String> = None;
    let mut material: Option<String> = None;

    for (number, raw) in source.lines().enumerate() {
        let line_no = number + 1;
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            continue;
        }

        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        match keyword {
            "v" => {
                let [x, y, z] = parse_floats::<3>(&mut tokens, line_no)?;
                data.positions.push([x, y, z]);
            }
            "vt" => {
                let u = parse_float(tokens.next(), line_no)?;
                let v = tokens
                    .next()
                    .map(|t| parse_float(Some(t), line_no))
                    .transpose()?
                    .unwrap_or(0.0);
                // OBJ's texture origin is bottom-left, glTF's is top-left.
                data.tex_coords.push([u, 1.0 - v]);
            }
            "vn" => {
                let [x, y, z] = parse_floats::<3>(&mut tokens, line_no)?;
                data.normals.push([x, y, z]);
            }
            "f" => {
                let corners = tokens
                    .map(|t| parse_corner(t, &data, line_no))
                    .collect::<Result<Vec<_>, _>>()?;
                if corners.len() < 3 {
                    return Err(MeshError::parse(line_no, "face needs at least 3 vertices"));
                }

                let group = current_group(&mut data.groups, &name, &material);
                for i in 1..corners.len() - 1 {
                    group.triangles.push([corners[0], corners[i], corners[i + 1]]);
                }
            }
            "o" | "g" => {
                let rest: Vec<&str> = tokens.collect();
                name = (!rest.is_empty()).then(|| rest.join(" "));
            }
            "usemtl" => {
                material = tokens.next().map(str::to_string);
            }
            "mtllib" => {
                data.material_libs.extend(tokens.map(str::to_string));
            }
            _ => {}
        }
    }

    Ok(data)
}

/// Parse MTL source text, keeping name, diffuse colour, opacity and diffuse map.
///
/// Map paths are returned as written; callers resolve them.
pub fn parse_mtl(source: &str) -> Vec<Material> {
    let mut materials: Vec<Material> = Vec::new();

    for raw in source.lines() {
        let line = strip_comment(raw).trim();
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        match keyword {
            "newmtl" => {
                let name = tokens.collect::<Vec<_>>().join(" ");
                materials.push(Material::named(name));
            }
            "Kd" => {
                let rgb: Vec<f32> = tokens.filter_map(|t| t.parse().ok()).collect();
                if let (Some(current), [r, g, b, ..]) = (materials.last_mut(), rgb.as_slice()) {
                    current.base_color[0] = *r;
                    current.base_color[1] = *g;
                    current.base_color[2] = *b;
                }
            }
            "d" => {
                if let (Some(current), Some(alpha)) = (
                    materials.last_mut(),
                    tokens.next().and_then(|t| t.parse::<f32>().ok()),
                ) {
                    current.base_color[3] = alpha.clamp(0.0, 1.0);
                }
            }
            "map_Kd" => {
                // Options (`-s 1 1 1`, `-clamp on`, ...) precede the file name.
                if let (Some(current), Some(file)) = (materials.last_mut(), tokens.last()) {
                    current.diffuse_map = Some(PathBuf::from(file.replace('\\', "/")));
                }
            }
            "Tr" => {
                if let (Some(current), Some(transparency)) = (
                    materials.last_mut(),
                    tokens.next().and_then(|t| t.parse::<f32>().ok()),
                ) {
                    current.base_color[3] = (1.0 - transparency).clamp(0.0, 1.0);
                }
            }
            _ => {}
        }
    }

    materials
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn current_group<'a>(
    groups: &'a mut Vec<FaceGroup>,
    name: &Option<String>,
    material: &Option<String>,
) -> &'a mut FaceGroup {
    let reuse = groups
        .last()
        .is_some_and(|g| &g.name == name && &g.material == material);
    if !reuse {
        groups.push(FaceGroup {
            name: name.clone(),
            material: material.clone(),
            triangles: Vec::new(),
        });
    }
    // A group was pushed above if none matched.
    let last = groups.len() - 1;
    &mut groups[last]
}

fn parse_float(token: Option<&str>, line: usize) -> Result<f32, MeshError> {
    let token = token.ok_or_else(|| MeshError::parse(line, "missing number"))?;
    token
        .parse::<f32>()
        .map_err(|_| MeshError::parse(line, format!("invalid number '{token}'")))
}

fn parse_floats<'a, const N: usize>(
    tokens: &mut impl Iterator<Item = &'a str>,
    line: usize,
) -> Result<[f32; N], MeshError> {
    let mut out = [0.0; N];
    for slot in &mut out {
        *slot = parse_float(tokens.next(), line)?;
    }
    Ok(out)
}

fn parse_corner(token: &str, data: &ObjData, line: usize) -> Result<VertexRef, MeshError> {
    let mut parts = token.split('/');
    let position = parts
        .next()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| MeshError::parse(line, format!("invalid face vertex '{token}'")))?;
    let tex_coord = parts.next().filter(|p| !p.is_empty());
    let normal = parts.next().filter(|p| !p.is_empty());

    Ok(VertexRef {
        position: resolve_index(position, data.positions.len(), line)?,
        tex_coord: tex_coord
            .map(|t| resolve_index(t, data.tex_coords.len(), line))
            .transpose()?,
        normal: normal
            .map(|n| resolve_index(n, data.normals.len(), line))
            .transpose()?,
    })
}

/// Resolve a 1-based (or negative, relative) OBJ index against `len` elements.
fn resolve_index(token: &str, len: usize, line: usize) -> Result<usize, MeshError> {
    let raw: i64 = token
        .parse()
        .map_err(|_| MeshError::parse(line, format!("invalid index '{token}'")))?;

    let resolved = match raw {
        0 => None,
        r if r > 0 => Some(r as usize - 1),
        r => (len as i64 + r).try_into().ok(),
    };

    resolved
        .filter(|&i| i < len)
        .ok_or_else(|| MeshError::parse(line, format!("index {raw} out of range (have {len})")))
}
