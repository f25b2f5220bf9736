//! # Mesh Transform
//!
//! In-process conversion of Wavefront OBJ meshes into binary glTF (GLB).
//!
//! The conversion is a fixed sequence of stages run by
//! [`pipeline_common::StagedPipeline`]:
//!
//! | # | Stage | Effect |
//! |---|-------|--------|
//! | 1 | `decode` | parse OBJ (and referenced MTL materials) into a [`Mesh`] |
//! | 2 | `center` | translate the mesh so its bounding box is centred on the origin |
//! | 3 | `dedup` | merge bit-identical vertices |
//! | 4 | `join` | merge primitives sharing a material |
//! | 5 | `weld` | merge vertices within a tolerance, drop degenerate triangles |
//! | 6 | `prune` | drop unreferenced vertices, empty primitives and unused materials |
//! | 7 | `texture` | load `map_Kd` images, re-encoding formats glTF cannot carry |
//! | 8 | `normals` | generate smooth normals when the source has none |
//! | 9 | `serialize` | encode the GLB container with embedded images |
//! | 10 | `write` | write the GLB to the output path |
//!

use std::path::PathBuf;
use std::sync::Arc;

use pipeline_common::{PipelineContext, StagedPipeline};
use thiserror::Error;

mod document;
pub mod glb;
pub mod gltf;
pub mod obj;
pub mod stages;

pub use document::{Material, Mesh, MeshDocument, Primitive, TextureImage};

/// Default weld tolerance in model units.
pub const DEFAULT_WELD_TOLERANCE: f32 = 1e-4;

/// Largest texture edge, in pixels, embedded without resizing.
pub const DEFAULT_MAX_TEXTURE_SIZE: u32 = 8192;

/// Errors produced by mesh stages.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("I/O error ({op}) for {path}: {source}", path = .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("OBJ parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Mesh contains no faces")]
    Empty,

    #[error("Stage '{0}' requires output from an earlier stage")]
    MissingInput(&'static str),

    #[error("Image error for {path}: {source}", path = .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Mesh too large for GLB: {0}")]
    TooLarge(String),
}

impl MeshError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn image(path: impl Into<PathBuf>, source: image::ImageError) -> Self {
        Self::Image {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Build the OBJ to GLB pipeline with the default stage list.
pub fn obj_to_glb_pipeline(context: Arc<PipelineContext>) -> StagedPipeline<MeshDocument> {
    StagedPipeline::new(context)
        .add_stage(stages::Decode)
        .add_stage(stages::Center)
        .add_stage(stages::Dedup)
        .add_stage(stages::Join)
        .add_stage(stages::Weld::new(DEFAULT_WELD_TOLERANCE))
        .add_stage(stages::Prune)
        .add_stage(stages::Textures::new(DEFAULT_MAX_TEXTURE_SIZE))
        .add_stage(stages::Normals)
        .add_stage(stages::Serialize)
        .add_stage(stages::Write)
}
