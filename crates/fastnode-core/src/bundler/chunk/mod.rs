//! Chunk assembly core: turns a linked, tree-shaken module graph into the
//! concrete set of output chunks (`link`), decides what each chunk exposes
//! (`generateExports`), spawns signature-preserving wrapper chunks
//! (`generateFacades`), concatenates and deconflicts module bodies
//! (`preRender`), assigns final filenames (`generateId`), and emits
//! format-specific code plus an optional source map (`render`).
//!
//! Everything here operates over the arena-indexed [`model::LinkGraph`]
//! rather than the `ModuleGraph`/`Chunk` pair already exported from
//! [`super::chunks`]; the two live side by side under different names
//! (`bundler::chunks::Chunk` vs. `bundler::chunk::chunk_entity::Chunk`) since
//! they model distinct stages of the pipeline.

mod chunk_entity;
mod coordinator;
mod deconflict;
mod dependency_linker;
mod diagnostics;
mod export_namer;
mod facade_builder;
mod finaliser;
mod hash_builder;
mod id_generator;
mod model;
mod name_allocator;
mod options;
mod path_util;
mod renderer;

pub use chunk_entity::{
    Chunk, ChunkPhase, DependencyDeclaration, DynamicResolution, ExportMode, ImportSpecifier,
    ReexportSpecifier, RenderedExport, RenderedModuleInfo,
};
pub use coordinator::{assign_modules_to_chunks, ChunkCoordinator};
pub use deconflict::{names_used_by_imports, Deconflicter};
pub use dependency_linker::{set_up_chunk_imports_and_exports_for_module, DependencyLinker};
pub use diagnostics::{ChunkError, Diagnostic, WarnSink};
pub use export_namer::ExportNamer;
pub use facade_builder::{can_module_be_facade, generate_facades};
pub use finaliser::{Addons, Finaliser, RenderOutput};
pub use hash_builder::{hash8, HashBuilder};
pub use id_generator::{generate_id, generate_id_preserve_modules};
pub use model::{
    ChunkId, DepTarget, DynamicTarget, ExternalModule, ExternalModuleId, ImportBinding,
    LinkGraph, LinkedModule, ModuleDep, ModuleId, PreserveSignature, ReexportDescription,
    RenderName, Variable, VariableId, VariableKind,
};
pub use name_allocator::{legalize_identifier, NameAllocator};
pub use options::{substitute_pattern, ChunkOutputOptions, GlobalsOption, OutputFormat};
pub use renderer::Renderer;
