//! `ChunkCoordinator` — owns the chunk arena for one bundle run and drives
//! every chunk through its phase lifecycle: construction, `link`,
//! `generateExports`, `generateFacades`, `preRender`, `generateId`, `render`.
//!
//! Every other file in this module implements one phase in isolation and
//! takes exactly the state it needs; this is the one place that knows the
//! full sequence and owns the `Vec<Chunk>` all of them index into.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::chunk_entity::{Chunk, ChunkPhase, ExportMode};
use super::dependency_linker::set_up_chunk_imports_and_exports_for_module;
use super::diagnostics::{ChunkError, WarnSink};
use super::export_namer::ExportNamer;
use super::facade_builder::generate_facades as build_facades;
use super::finaliser::{Addons, Finaliser, RenderOutput};
use super::hash_builder::HashBuilder;
use super::id_generator::{generate_id, generate_id_preserve_modules};
use super::model::{ChunkId, DepTarget, LinkGraph, ModuleId};
use super::options::ChunkOutputOptions;
use super::path_util;
use super::renderer::Renderer;

/// Groups included modules into chunks, one group per distinct manual
/// chunk alias or per distinct set of entry points that reach a module,
/// preserving execution order within each group.
///
/// In the common (non-preserve-modules) case every module reachable from
/// exactly one entry point collapses into that entry's chunk; a manual
/// chunk alias or being shared by more than one entry are the only things
/// that split a module out into a chunk of its own.
#[must_use]
pub fn assign_modules_to_chunks(graph: &LinkGraph, preserve_modules: bool) -> Vec<Vec<ModuleId>> {
    if preserve_modules {
        return graph
            .modules
            .iter()
            .filter(|m| m.included)
            .map(|m| vec![m.id])
            .collect();
    }

    // For each entry, forward-DFS its static dependency graph and record
    // which entries can reach which module. A module reached by exactly one
    // entry joins that entry's chunk; a module reached by more than one
    // (a shared dependency) gets split into its own chunk keyed by the
    // exact set of entries sharing it, so no module's code is duplicated
    // across chunks.
    let entries: Vec<ModuleId> = graph
        .modules
        .iter()
        .filter(|m| m.included && m.is_entry_point)
        .map(|m| m.id)
        .collect();

    let mut reached_by: HashMap<ModuleId, Vec<ModuleId>> = HashMap::default();
    for &entry in &entries {
        let mut seen = HashSet::default();
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            reached_by.entry(id).or_default().push(entry);
            for dep in &graph.module(id).dependencies {
                if let super::model::ModuleDep::Module(dep_id) = dep {
                    if graph.module(*dep_id).included {
                        stack.push(*dep_id);
                    }
                }
            }
        }
    }

    let mut by_key: HashMap<String, Vec<ModuleId>> = HashMap::default();
    let mut order: Vec<String> = Vec::new();
    for module in &graph.modules {
        if !module.included {
            continue;
        }
        let key = if let Some(alias) = &module.manual_chunk_alias {
            format!("alias:{alias}")
        } else if let Some(mut entries) = reached_by.get(&module.id).cloned() {
            entries.sort_unstable();
            entries.dedup();
            format!("entries:{entries:?}")
        } else {
            format!("orphan:{}", module.id)
        };
        if !by_key.contains_key(&key) {
            order.push(key.clone());
        }
        by_key.entry(key).or_default().push(module.id);
    }

    order
        .into_iter()
        .map(|key| {
            let mut modules = by_key.remove(&key).unwrap_or_default();
            modules.sort_by_key(|&m| graph.module(m).exec_index);
            modules
        })
        .collect()
}

/// Owns the full `Vec<Chunk>` arena plus the shared [`LinkGraph`] for one
/// bundle run.
pub struct ChunkCoordinator<'a> {
    options: &'a ChunkOutputOptions,
    pub chunks: Vec<Chunk>,
}

impl<'a> ChunkCoordinator<'a> {
    #[must_use]
    pub fn new(options: &'a ChunkOutputOptions) -> Self {
        Self {
            options,
            chunks: Vec::new(),
        }
    }

    /// Constructs the initial chunk arena from a partition of the module
    /// graph, assigning `module.chunk` back-references and deriving each
    /// chunk's entry modules, `execIndex`, and starting `variableName`.
    pub fn construct(&mut self, graph: &mut LinkGraph, groups: Vec<Vec<ModuleId>>) {
        self.chunks.clear();
        for (id, modules) in groups.into_iter().enumerate() {
            for &m in &modules {
                graph.module_mut(m).chunk = Some(id);
            }
            let entry_modules: Vec<ModuleId> = modules.iter().copied().filter(|&m| graph.module(m).is_entry_point).collect();
            let exec_index = modules.iter().map(|&m| graph.module(m).exec_index).min();
            let name = entry_modules
                .first()
                .map(|&m| path_util::file_stem(&graph.module(m).path))
                .or_else(|| modules.first().map(|&m| path_util::file_stem(&graph.module(m).path)))
                .unwrap_or_else(|| format!("chunk{id}"));
            let variable_name = super::name_allocator::legalize_identifier(&name);

            self.chunks.push(Chunk {
                id,
                file_id: None,
                name,
                file_name: None,
                variable_name,
                manual_chunk_alias: modules.first().and_then(|&m| graph.module(m).manual_chunk_alias.clone()),
                ordered_modules: modules,
                entry_modules,
                facade_module: None,
                dependencies: Vec::new(),
                dynamic_dependencies: Vec::new(),
                imports: HashSet::default(),
                exports: HashSet::default(),
                exports_by_name: HashMap::default(),
                sorted_export_names: None,
                star_external_reexports: HashSet::default(),
                export_mode: ExportMode::None,
                needs_exports_shim: false,
                exec_index: Chunk::recompute_exec_index(exec_index),
                is_empty: true,
                indent_string: self.options.indent_string(),
                rendered_source: None,
                rendered_module_sources: HashMap::default(),
                rendered_dependencies: Vec::new(),
                rendered_exports: Vec::new(),
                rendered_hash: None,
                rendered_modules: Vec::new(),
                dynamic_import_resolutions: Vec::new(),
                phase: ChunkPhase::Constructed,
            });
        }
    }

    /// `link()`: populates each chunk's static/dynamic
    /// dependency edges from its modules' resolved bindings, then runs
    /// `setUpChunkImportsAndExportsForModule` per module in execution order.
    pub fn link(&mut self, graph: &mut LinkGraph) {
        for chunk in &mut self.chunks {
            let mut deps: Vec<DepTarget> = Vec::new();
            let mut dyn_deps: Vec<DepTarget> = Vec::new();
            for &module_id in &chunk.ordered_modules {
                for dep in graph.module(module_id).dependencies.clone() {
                    let target = match dep {
                        super::model::ModuleDep::Module(m) => {
                            let Some(other_chunk) = graph.module(m).chunk else { continue };
                            if other_chunk == chunk.id {
                                continue;
                            }
                            DepTarget::Chunk(other_chunk)
                        }
                        super::model::ModuleDep::External(ext) => DepTarget::External(ext),
                    };
                    if !deps.contains(&target) {
                        deps.push(target);
                    }
                }
                for dyn_target in graph.module(module_id).dynamic_dependencies.clone() {
                    let target = match dyn_target {
                        super::model::DynamicTarget::Module(m) => graph
                            .module(m)
                            .chunk
                            .filter(|&c| c != chunk.id)
                            .map(DepTarget::Chunk),
                        super::model::DynamicTarget::External(ext) => Some(DepTarget::External(ext)),
                        super::model::DynamicTarget::Unresolved(_) => None,
                    };
                    if let Some(target) = target {
                        if !dyn_deps.contains(&target) {
                            dyn_deps.push(target);
                        }
                    }
                }
            }
            chunk.dependencies = deps;
            chunk.dynamic_dependencies = dyn_deps;
        }

        for chunk_id in 0..self.chunks.len() {
            let modules = self.chunks[chunk_id].ordered_modules.clone();
            for module_id in modules {
                set_up_chunk_imports_and_exports_for_module(
                    &mut self.chunks[chunk_id],
                    graph,
                    module_id,
                    self.options.preserve_modules,
                );
            }
            self.chunks[chunk_id].phase = ChunkPhase::Linked;
        }

        // Cross-register: a variable a consuming chunk imports must appear
        // in its origin chunk's own `exports` set, otherwise the origin
        // would never assign it an export name or a dependency declaration
        // — unless modules are preserved and the variable is a namespace,
        // in which case the namespace is referenced directly rather than
        // re-exported.
        let mut to_export: Vec<(ChunkId, super::model::VariableId)> = Vec::new();
        for chunk in &self.chunks {
            for &var_id in &chunk.imports {
                let resolved = super::model::Variable::deref_default(var_id, &graph.variables);
                if self.options.preserve_modules && graph.variable(resolved).is_namespace() {
                    continue;
                }
                let origin_module = graph.variable(resolved).origin_module;
                if let Some(origin_chunk) = graph.module(origin_module).chunk {
                    if origin_chunk != chunk.id {
                        to_export.push((origin_chunk, resolved));
                    }
                }
            }
        }
        for (chunk_id, var_id) in to_export {
            self.chunks[chunk_id].exports.insert(var_id);
        }
    }

    /// `generateExports` driver, run once per chunk after `link`.
    pub fn generate_exports(&mut self, graph: &mut LinkGraph) {
        let namer = ExportNamer::new(self.options);
        for chunk in &mut self.chunks {
            namer.generate_exports(chunk, graph);
            chunk.phase = ChunkPhase::ExportsGenerated;
        }
    }

    /// `generateFacades` driver: runs over every chunk, appending any
    /// spawned wrapper chunks to the arena with freshly assigned ids.
    pub fn generate_facades(&mut self, graph: &mut LinkGraph, warn: &mut impl WarnSink) {
        let mut spawned: Vec<Chunk> = Vec::new();
        for chunk_id in 0..self.chunks.len() {
            let mut chunk = std::mem::replace(&mut self.chunks[chunk_id], placeholder_chunk(chunk_id));
            let mut new_chunks = build_facades(chunk_id, &mut chunk, graph, self.options, warn);
            chunk.phase = ChunkPhase::FacadesGenerated;
            self.chunks[chunk_id] = chunk;
            spawned.append(&mut new_chunks);
        }
        // `make_facade_chunk` always points its lone dependency at the real
        // code chunk's original id, which never moves, so no dependency
        // rewriting is needed once the facade gets its own id here. Its
        // `facade_module` back-reference is only valid once the facade has
        // its final id, so it's recorded on the graph here rather than in
        // `facade_builder`.
        for mut chunk in spawned {
            chunk.id = self.chunks.len();
            if let Some(module_id) = chunk.facade_module {
                graph.module_mut(module_id).facade_chunk = Some(chunk.id);
            }
            self.chunks.push(chunk);
        }
    }

    /// `preRender` driver: precomputes transitive-dependency closures,
    /// export-mode/exec-index lookup maps, then runs `Renderer::pre_render`
    /// per chunk.
    pub fn pre_render(&mut self, graph: &mut LinkGraph, warn: &mut impl WarnSink) {
        let closures = Renderer::transitive_dependency_closures(&self.chunks);
        let export_modes: HashMap<ChunkId, ExportMode> =
            self.chunks.iter().map(|c| (c.id, c.export_mode)).collect();
        let exec_indices: HashMap<ChunkId, usize> = self.chunks.iter().map(|c| (c.id, c.exec_index)).collect();

        let renderer = Renderer::new(self.options);
        for chunk in &mut self.chunks {
            renderer.pre_render(chunk, graph, &closures, &export_modes, &exec_indices, warn);
        }
    }

    /// `generateId` driver: assigns every chunk's `file_id` in execution
    /// order so that earlier (lower `execIndex`) chunks claim shorter
    /// disambiguated names first and the iteration order stays
    /// deterministic across runs.
    pub fn assign_ids(&mut self, graph: &LinkGraph, output_dir: &str) {
        let mut order: Vec<ChunkId> = (0..self.chunks.len()).collect();
        order.sort_by_key(|&id| self.chunks[id].exec_index);

        let mut existing_names: HashSet<String> = HashSet::default();
        for &chunk_id in &order {
            let id = if self.options.preserve_modules {
                let module_path = self.chunks[chunk_id]
                    .ordered_modules
                    .first()
                    .map(|&m| graph.module(m).path.clone())
                    .unwrap_or_default();
                generate_id_preserve_modules(&module_path, output_dir, self.options, &existing_names)
            } else {
                // Computed eagerly (not lazily via `hash_of`) so the digest
                // can be cached onto `rendered_hash` right after, letting
                // later-`execIndex` dependents absorb it into their own hash.
                let hash = self.content_hash(chunk_id, graph);
                let id = generate_id(&self.chunks[chunk_id], graph, self.options, &existing_names, true, || hash.clone());
                self.chunks[chunk_id].rendered_hash = Some(hash);
                id
            };
            existing_names.insert(id.clone());
            let full_path = path_util::join(output_dir, &id).display().to_string();
            self.chunks[chunk_id].file_id = Some(full_path);
            self.chunks[chunk_id].file_name = Some(id);
            self.chunks[chunk_id].phase = ChunkPhase::IdAssigned;
        }
    }

    /// `computeContentHashWithDependencies` / `renderedHash`: a chunk's
    /// content hash absorbs its own rendered source plus, transitively, the
    /// id-stable (hash-free) filename and rendered hash of every reachable
    /// sibling chunk and the render path of every reachable external — so
    /// that changing a leaf dependency's content invalidates every
    /// ancestor's cache-busted filename, not just the leaf's own.
    fn content_hash(&self, chunk_id: ChunkId, graph: &LinkGraph) -> String {
        if let Some(hash) = &self.chunks[chunk_id].rendered_hash {
            return hash.clone();
        }
        let mut builder = HashBuilder::new();
        builder.update_str(self.options.format.as_str());
        builder.update_str(self.chunks[chunk_id].rendered_source.as_deref().unwrap_or(""));

        let mut closure: Vec<DepTarget> = self.chunks[chunk_id].dependencies.clone();
        closure.extend(self.chunks[chunk_id].dynamic_dependencies.iter().copied());
        closure.sort_by_key(|d| match d {
            DepTarget::Chunk(id) => (0u8, *id, String::new()),
            DepTarget::External(id) => (1u8, 0, graph.external(*id).source_id.clone()),
        });

        for dep in closure {
            match dep {
                DepTarget::Chunk(id) if id != chunk_id => {
                    let existing = HashSet::default();
                    let dep_name = generate_id(&self.chunks[id], graph, self.options, &existing, false, String::new);
                    builder.update_str(&dep_name);
                    if let Some(hash) = &self.chunks[id].rendered_hash {
                        builder.update_str(hash);
                    }
                }
                DepTarget::External(id) => {
                    let ext = graph.external(id);
                    builder.update_str(":");
                    builder.update_str(ext.render_path.as_deref().unwrap_or(&ext.source_id));
                }
                DepTarget::Chunk(_) => {}
            }
        }
        builder.digest8()
    }

    /// `render` driver: finalises every chunk in `execIndex` order so that
    /// each chunk's dependencies have already had their `file_id` filled in
    /// (required to relativise `import`/`require` specifiers).
    pub fn render_all(
        &mut self,
        graph: &LinkGraph,
        addons: &Addons,
        output_dir: &str,
        render_chunk_hook: Option<&dyn Fn(&str) -> Result<String, String>>,
        warn: &mut impl WarnSink,
    ) -> Result<HashMap<ChunkId, RenderOutput>, ChunkError> {
        let finaliser = Finaliser::new(self.options);
        let mut outputs = HashMap::default();
        let snapshot: Vec<Chunk> = self
            .chunks
            .iter()
            .map(clone_chunk_for_snapshot)
            .collect();
        for chunk in &mut self.chunks {
            let dir = chunk
                .file_id
                .as_deref()
                .and_then(|f| std::path::Path::new(f).parent())
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| output_dir.to_string());
            let out = finaliser.render(chunk, graph, &snapshot, &dir, addons, render_chunk_hook, warn)?;
            outputs.insert(chunk.id, out);
        }
        Ok(outputs)
    }

    /// Runs every phase in sequence for a freshly constructed arena.
    pub fn run_all(&mut self, graph: &mut LinkGraph, output_dir: &str, addons: &Addons, warn: &mut impl WarnSink) -> Result<HashMap<ChunkId, RenderOutput>, ChunkError> {
        self.link(graph);
        self.generate_exports(graph);
        self.generate_facades(graph, warn);
        self.pre_render(graph, warn);
        self.assign_ids(graph, output_dir);
        self.render_all(graph, addons, output_dir, None, warn)
    }
}

/// Shallow clone good enough for the finaliser's `chunks: &[Chunk]` lookups
/// (`file_id`, `export_mode`) without needing `Chunk: Clone` on the hot path
/// (rendered sources can be large; `render_all` never reads them off the
/// snapshot).
fn clone_chunk_for_snapshot(chunk: &Chunk) -> Chunk {
    Chunk {
        id: chunk.id,
        file_id: chunk.file_id.clone(),
        name: chunk.name.clone(),
        file_name: chunk.file_name.clone(),
        variable_name: chunk.variable_name.clone(),
        manual_chunk_alias: chunk.manual_chunk_alias.clone(),
        ordered_modules: chunk.ordered_modules.clone(),
        entry_modules: chunk.entry_modules.clone(),
        facade_module: chunk.facade_module,
        dependencies: chunk.dependencies.clone(),
        dynamic_dependencies: chunk.dynamic_dependencies.clone(),
        imports: chunk.imports.clone(),
        exports: chunk.exports.clone(),
        exports_by_name: chunk.exports_by_name.clone(),
        sorted_export_names: chunk.sorted_export_names.clone(),
        star_external_reexports: chunk.star_external_reexports.clone(),
        export_mode: chunk.export_mode,
        needs_exports_shim: chunk.needs_exports_shim,
        exec_index: chunk.exec_index,
        is_empty: chunk.is_empty,
        indent_string: chunk.indent_string,
        rendered_source: None,
        rendered_module_sources: HashMap::default(),
        rendered_dependencies: Vec::new(),
        rendered_exports: Vec::new(),
        rendered_hash: chunk.rendered_hash.clone(),
        rendered_modules: Vec::new(),
        dynamic_import_resolutions: Vec::new(),
        phase: chunk.phase,
    }
}

fn placeholder_chunk(id: ChunkId) -> Chunk {
    Chunk {
        id,
        file_id: None,
        name: String::new(),
        file_name: None,
        variable_name: String::new(),
        manual_chunk_alias: None,
        ordered_modules: Vec::new(),
        entry_modules: Vec::new(),
        facade_module: None,
        dependencies: Vec::new(),
        dynamic_dependencies: Vec::new(),
        imports: HashSet::default(),
        exports: HashSet::default(),
        exports_by_name: HashMap::default(),
        sorted_export_names: None,
        star_external_reexports: HashSet::default(),
        export_mode: ExportMode::None,
        needs_exports_shim: false,
        exec_index: 0,
        is_empty: true,
        indent_string: "\t",
        rendered_source: None,
        rendered_module_sources: HashMap::default(),
        rendered_dependencies: Vec::new(),
        rendered_exports: Vec::new(),
        rendered_hash: None,
        rendered_modules: Vec::new(),
        dynamic_import_resolutions: Vec::new(),
        phase: ChunkPhase::Constructed,
    }
}
