//! `generateFacades` — signature-preserving wrapper chunks.

use rustc_hash::FxHashSet as HashSet;

use super::chunk_entity::{Chunk, ChunkPhase, ExportMode};
use super::diagnostics::{Diagnostic, WarnSink};
use super::export_namer::ExportNamer;
use super::model::{ChunkId, DepTarget, LinkGraph, ModuleId};
use super::name_allocator::legalize_identifier;
use super::options::ChunkOutputOptions;

/// One facade a module requires: `None` is the module's own (empty-name)
/// public facade, `Some(name)` an additional named chunk the user requested
/// via `output.manualChunks`/`chunkFileNames` overrides.
type FacadeName = Option<String>;

/// `canModuleBeFacade` — every variable this chunk exposes must appear
/// somewhere in the module's own export-name map, i.e. the chunk's public
/// surface is a subset of (or equal to) the module's declared signature.
#[must_use]
pub fn can_module_be_facade(chunk: &Chunk, graph: &LinkGraph, module_id: ModuleId) -> bool {
    let module = graph.module(module_id);
    chunk
        .exports
        .iter()
        .all(|v| !module.export_names_for(*v).is_empty() || graph.variable(*v).is_external())
}

fn required_facade_names(graph: &LinkGraph, module_id: ModuleId) -> Vec<FacadeName> {
    let module = graph.module(module_id);
    let mut names: Vec<FacadeName> = module.user_chunk_names.iter().cloned().map(Some).collect();
    if module.user_chunk_names.is_empty() && module.is_user_defined_entry_point {
        names.push(None);
    }
    names.extend(module.chunk_file_names.iter().cloned().map(Some));
    if names.is_empty() {
        names.push(None);
    }
    names
}

/// Builds every facade chunk required by `chunk`'s entry modules.
///
/// Returns the newly created facade chunks (the caller appends them to its
/// chunk arena and assigns their final `ChunkId`s); `chunk` itself may be
/// mutated in place to become the facade for the first entry module it can
/// host, preferring to reuse the code chunk over
/// spawning an empty wrapper whenever the public surface allows it.
pub fn generate_facades(
    chunk_id: ChunkId,
    chunk: &mut Chunk,
    graph: &mut LinkGraph,
    options: &ChunkOutputOptions,
    warn: &mut impl WarnSink,
) -> Vec<Chunk> {
    let mut spawned = Vec::new();
    let entry_modules = chunk.entry_modules.clone();

    for module_id in entry_modules {
        if graph.module(module_id).facade_chunk.is_some() {
            continue;
        }
        let required = required_facade_names(graph, module_id);
        let mut names = required.into_iter();

        if chunk.facade_module.is_none() {
            if let Some(first) = names.next() {
                if can_module_be_facade(chunk, graph, module_id) {
                    chunk.facade_module = Some(module_id);
                    chunk.name = first.unwrap_or_else(|| chunk.name.clone());
                    graph.module_mut(module_id).facade_chunk = Some(chunk_id);
                } else {
                    let module = graph.module(module_id);
                    if matches!(
                        module.preserve_signature,
                        super::model::PreserveSignature::Strict | super::model::PreserveSignature::AllowExtension
                    ) && module.is_user_defined_entry_point
                    {
                        warn.warn(Diagnostic::EmptyFacade {
                            module_id: module.path.clone(),
                        });
                    }
                    spawned.push(make_facade_chunk(chunk_id, chunk, module_id, first, graph, options));
                }
            }
        }

        for name in names {
            spawned.push(make_facade_chunk(chunk_id, chunk, module_id, name, graph, options));
        }
    }

    spawned
}

/// Builds a wrapper chunk whose sole dependency is the real code chunk,
/// installing the facaded module's own declared export names onto it (the
/// same `installFacadeNames` rule [`ExportNamer`] applies to a hosting
/// chunk) so a chunk spawned here still carries a non-empty public surface.
fn make_facade_chunk(
    code_chunk_id: ChunkId,
    code_chunk: &Chunk,
    module_id: ModuleId,
    name: FacadeName,
    graph: &mut LinkGraph,
    options: &ChunkOutputOptions,
) -> Chunk {
    let (chunk_name, variable_name, manual_chunk_alias, exports) = {
        let module = graph.module(module_id);
        let chunk_name = name
            .or_else(|| module.manual_chunk_alias.clone())
            .unwrap_or_else(|| super::path_util::file_stem(&module.path));
        let variable_name = legalize_identifier(&chunk_name);
        let exports: HashSet<_> = module.export_names_by_variable.keys().copied().collect();
        (chunk_name, variable_name, module.manual_chunk_alias.clone(), exports)
    };

    let mut chunk = Chunk {
        id: 0, // reassigned by the coordinator once pushed into the arena
        file_id: None,
        name: chunk_name,
        file_name: None,
        variable_name,
        manual_chunk_alias,
        ordered_modules: Vec::new(),
        entry_modules: vec![module_id],
        facade_module: Some(module_id),
        dependencies: vec![DepTarget::Chunk(code_chunk_id)],
        dynamic_dependencies: Vec::new(),
        imports: Default::default(),
        exports,
        exports_by_name: Default::default(),
        sorted_export_names: None,
        star_external_reexports: Default::default(),
        export_mode: ExportMode::None,
        needs_exports_shim: false,
        exec_index: code_chunk.exec_index,
        is_empty: true,
        indent_string: code_chunk.indent_string,
        rendered_source: None,
        rendered_module_sources: Default::default(),
        rendered_dependencies: Vec::new(),
        rendered_exports: Vec::new(),
        rendered_hash: None,
        rendered_modules: Vec::new(),
        dynamic_import_resolutions: Vec::new(),
        phase: ChunkPhase::FacadesGenerated,
    };

    ExportNamer::new(options).generate_exports(&mut chunk, graph);
    chunk
}
