//! `preRender` — concatenates module sources, decides dynamic
//! import resolutions, deconflicts identifiers, and populates
//! `renderedSource`/`renderedDependencies`/`renderedExports`.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::chunk_entity::{Chunk, ChunkPhase, DynamicResolution, ExportMode};
use super::deconflict::Deconflicter;
use super::dependency_linker::DependencyLinker;
use super::diagnostics::{Diagnostic, WarnSink};
use super::model::{ChunkId, DepTarget, DynamicTarget, LinkGraph, VariableKind};
use super::options::ChunkOutputOptions;

/// Interop identifiers reserved in cjs/umd/iife output in addition to the
/// format-agnostic `exports` shim name.
const CJS_RESERVED: &[&str] = &["require", "module", "__filename", "__dirname", "_interopDefault"];

pub struct Renderer<'a> {
    options: &'a ChunkOutputOptions,
}

impl<'a> Renderer<'a> {
    #[must_use]
    pub fn new(options: &'a ChunkOutputOptions) -> Self {
        Self { options }
    }

    /// Precomputes, for every chunk, the set of `Chunk`/`External` deps
    /// transitively reachable via `dependencies` (not `dynamicDependencies`
    /// — dynamic edges are runtime-lazy and must not be front-loaded).
    /// Circularity is impossible by construction (invariant 6 plus acyclic
    /// module execution order), so plain DFS needs no visited-on-this-path
    /// guard beyond the standard "already collected" check.
    #[must_use]
    pub fn transitive_dependency_closures(chunks: &[Chunk]) -> HashMap<ChunkId, Vec<DepTarget>> {
        let mut closures = HashMap::default();
        for chunk in chunks {
            let mut seen: HashSet<DepTarget> = HashSet::default();
            let mut stack: Vec<DepTarget> = chunk.dependencies.clone();
            while let Some(dep) = stack.pop() {
                if !seen.insert(dep) {
                    continue;
                }
                if let DepTarget::Chunk(id) = dep {
                    if id != chunk.id {
                        stack.extend(chunks[id].dependencies.iter().copied());
                    }
                }
            }
            seen.remove(&DepTarget::Chunk(chunk.id));
            closures.insert(chunk.id, seen.into_iter().collect());
        }
        closures
    }

    pub fn pre_render(
        &self,
        chunk: &mut Chunk,
        graph: &mut LinkGraph,
        dependency_closures: &HashMap<ChunkId, Vec<DepTarget>>,
        export_modes: &HashMap<ChunkId, ExportMode>,
        exec_indices: &HashMap<ChunkId, usize>,
        warn: &mut impl WarnSink,
    ) {
        // Step 1: transitive hoisting.
        if self.options.hoist_transitive_imports
            && !self.options.preserve_modules
            && (chunk.is_facade_chunk() || chunk.is_entry_chunk())
        {
            let direct: Vec<ChunkId> = chunk
                .dependencies
                .iter()
                .filter_map(|d| if let DepTarget::Chunk(id) = d { Some(*id) } else { None })
                .collect();
            let mut extra = Vec::new();
            for id in direct {
                if let Some(closure) = dependency_closures.get(&id) {
                    extra.extend(closure.iter().copied());
                }
            }
            for dep in extra {
                if dep != DepTarget::Chunk(chunk.id) && !chunk.dependencies.contains(&dep) {
                    chunk.dependencies.push(dep);
                }
            }
        }

        // Step 2: sort dependencies by execIndex. Externals have no
        // execIndex of their own; they sort after every chunk dependency,
        // stably by encounter order (`sort_by_key` is stable).
        chunk.dependencies.sort_by_key(|d| match d {
            DepTarget::Chunk(id) => exec_indices.get(id).copied().unwrap_or(usize::MAX - 1),
            DepTarget::External(_) => usize::MAX,
        });

        // Step 3: prepare dynamic imports.
        self.prepare_dynamic_imports(chunk, graph, export_modes);

        // Step 4: identifier render resolutions.
        let reserved = self.reserved_names(chunk, graph);
        chunk.needs_exports_shim = chunk.exports.iter().any(|v| graph.variable(*v).is_export_shim());
        let mut deconflicter = Deconflicter::new(reserved);
        deconflicter.deconflict(graph, &chunk.ordered_modules);

        // Step 5: module concatenation.
        let separator = self.options.separator();
        let mut bundle = String::new();
        let mut rendered_module_sources = HashMap::default();
        for &module_id in &chunk.ordered_modules {
            let rendered = self.render_module_body(graph, module_id);
            if !bundle.is_empty() && !rendered.is_empty() {
                bundle.push_str(separator);
            }
            if !rendered.is_empty() {
                bundle.push_str(&rendered);
            }
            rendered_module_sources.insert(module_id, rendered);
        }

        // Step 6: exports shim.
        if chunk.needs_exports_shim {
            let shim_name = self.shim_name(chunk, graph);
            let decl = self.options.declaration_keyword();
            let prefix = format!("{decl} {shim_name} = void 0;{separator}");
            bundle = format!("{prefix}{bundle}");
        }

        // Step 7: trim (non-compact only keeps the meaningful content; we
        // always trim surrounding whitespace since the separator already
        // encodes the desired blank-line convention).
        if !self.options.compact {
            bundle = bundle.trim().to_string();
        }
        chunk.rendered_hash = None;

        // Step 8: empty bundle diagnostic.
        chunk.is_empty = chunk.ordered_modules.iter().all(|m| !graph.module(*m).included);
        if bundle.is_empty() && chunk.exports_by_name.is_empty() && chunk.dependencies.is_empty() {
            warn.warn(Diagnostic::EmptyBundle {
                chunk_name: chunk.name.clone(),
            });
        }

        chunk.rendered_source = Some(bundle);
        chunk.rendered_module_sources = rendered_module_sources;
        chunk.rendered_modules = chunk
            .ordered_modules
            .iter()
            .map(|&m| super::chunk_entity::RenderedModuleInfo {
                module_id: m,
                rendered_length: chunk
                    .rendered_module_sources
                    .get(&m)
                    .map(String::len)
                    .unwrap_or(0),
            })
            .collect();

        // Step 9: dependency/export declarations. External render paths are
        // set by the caller via `ExternalModule::set_render_path` before
        // `generate_id`/`render`; the linker only reads them here.
        let linker = DependencyLinker::new(self.options);
        chunk.rendered_dependencies = linker.get_chunk_dependency_declarations(chunk, graph, warn);
        chunk.rendered_exports = linker.get_chunk_export_declarations(chunk, graph, self.options.format);

        chunk.phase = ChunkPhase::PreRendered;
    }

    fn prepare_dynamic_imports(&self, chunk: &mut Chunk, graph: &LinkGraph, export_modes: &HashMap<ChunkId, ExportMode>) {
        let mut resolutions = Vec::new();
        for &module_id in &chunk.ordered_modules {
            let targets = graph.module(module_id).dynamic_dependencies.clone();
            for target in targets {
                let resolution = match &target {
                    DynamicTarget::Module(m) => {
                        if graph.module(*m).chunk == Some(chunk.id) {
                            DynamicResolution::Named {
                                namespace_variable: graph
                                    .module(*m)
                                    .namespace_variable
                                    .unwrap_or(usize::MAX),
                            }
                        } else if let Some(target_chunk) = graph.module(*m).chunk {
                            DynamicResolution::Chunk(export_modes.get(&target_chunk).copied().unwrap_or_default())
                        } else {
                            DynamicResolution::Auto
                        }
                    }
                    DynamicTarget::External(_) | DynamicTarget::Unresolved(_) => DynamicResolution::Auto,
                };
                resolutions.push((module_id, target, resolution));
            }
        }
        chunk.dynamic_import_resolutions = resolutions;
    }

    fn reserved_names(&self, chunk: &Chunk, graph: &LinkGraph) -> Vec<String> {
        let mut names = vec!["exports".to_string()];
        if chunk.needs_exports_shim {
            names.push(self.shim_name(chunk, graph));
        }
        if matches!(self.options.format, super::options::OutputFormat::Cjs) {
            names.extend(CJS_RESERVED.iter().map(|s| s.to_string()));
        }
        names
    }

    fn shim_name(&self, _chunk: &Chunk, _graph: &LinkGraph) -> String {
        "_missingExportShim".to_string()
    }

    /// Substitutes every local variable's render name into the module's
    /// pre-rendered source text. Mirrors `bundler::scope::ScopeHoistContext`'s
    /// text-level renaming, generalised to the arena-indexed `Variable` model.
    fn render_module_body(&self, graph: &LinkGraph, module_id: super::model::ModuleId) -> String {
        let module = graph.module(module_id);
        let mut source = module.rendered_source.clone();
        for &var_id in &module.local_variables {
            let var = graph.variable(var_id);
            if let VariableKind::SyntheticNamedExport { .. } | VariableKind::ExportShim = var.kind {
                continue;
            }
            let rendered = var.rendered_name();
            if rendered != var.preferred_name() {
                source = replace_identifier(&source, var.preferred_name(), rendered);
            }
        }
        source
    }
}

/// Whole-word identifier substitution (no string/comment awareness, matching
/// the existing scope-hoisting renamer's simplifying assumption that
/// identifiers never appear inside template literals being renamed).
fn replace_identifier(source: &str, old_name: &str, new_name: &str) -> String {
    if old_name.is_empty() || old_name == new_name || source.is_empty() {
        return source.to_string();
    }
    let mut result = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let old_bytes = old_name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes.len() >= i + old_bytes.len() && &bytes[i..i + old_bytes.len()] == old_bytes {
            let start_ok = i == 0 || !is_ident_char(bytes[i - 1] as char);
            let end_ok = i + old_bytes.len() >= bytes.len() || !is_ident_char(bytes[i + old_bytes.len()] as char);
            if start_ok && end_ok {
                result.push_str(new_name);
                i += old_bytes.len();
                continue;
            }
        }
        result.push(bytes[i] as char);
        i += 1;
    }
    result
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::super::chunk_entity::empty_chunk;
    use super::super::model::{empty_module, LinkGraph, VariableKind};
    use super::*;

    fn opts() -> ChunkOutputOptions {
        ChunkOutputOptions::default()
    }

    #[test]
    fn concatenates_included_modules_with_separator() {
        let mut g = LinkGraph::new();
        let m1 = g.push_module(|id| {
            let mut m = empty_module(id, "a.js");
            m.rendered_source = "const a = 1;".into();
            m
        });
        let m2 = g.push_module(|id| {
            let mut m = empty_module(id, "b.js");
            m.rendered_source = "const b = 2;".into();
            m
        });
        g.module_mut(m1).chunk = Some(0);
        g.module_mut(m2).chunk = Some(0);

        let mut chunk = empty_chunk(0);
        chunk.ordered_modules = vec![m1, m2];

        let options = opts();
        let renderer = Renderer::new(&options);
        let closures = HashMap::default();
        let modes = HashMap::default();
        let mut warnings: Vec<Diagnostic> = Vec::new();
        renderer.pre_render(&mut chunk, &mut g, &closures, &modes, &HashMap::default(), &mut warnings);

        let source = chunk.rendered_source.unwrap();
        assert!(source.contains("const a = 1;"));
        assert!(source.contains("const b = 2;"));
        assert!(source.contains("\n\n"));
    }

    #[test]
    fn deconflicted_name_is_substituted_into_rendered_source() {
        let mut g = LinkGraph::new();
        let m1 = g.push_module(|id| {
            let mut m = empty_module(id, "a.js");
            m.rendered_source = "const helper = 1;".into();
            m
        });
        let m2 = g.push_module(|id| {
            let mut m = empty_module(id, "b.js");
            m.rendered_source = "const helper = 2;".into();
            m
        });
        let v1 = g.push_variable("helper", VariableKind::Local { is_reassigned: false }, m1);
        let v2 = g.push_variable("helper", VariableKind::Local { is_reassigned: false }, m2);
        g.module_mut(m1).local_variables.push(v1);
        g.module_mut(m2).local_variables.push(v2);
        g.module_mut(m1).chunk = Some(0);
        g.module_mut(m2).chunk = Some(0);

        let mut chunk = empty_chunk(0);
        chunk.ordered_modules = vec![m1, m2];

        let options = opts();
        let renderer = Renderer::new(&options);
        let closures = HashMap::default();
        let modes = HashMap::default();
        let mut warnings: Vec<Diagnostic> = Vec::new();
        renderer.pre_render(&mut chunk, &mut g, &closures, &modes, &HashMap::default(), &mut warnings);

        let source = chunk.rendered_source.unwrap();
        assert!(source.contains("const helper = 1;"));
        assert!(source.contains("const helper$1 = 2;"));
    }

    #[test]
    fn empty_chunk_with_no_exports_or_deps_warns() {
        let mut g = LinkGraph::new();
        let mut chunk = empty_chunk(0);
        chunk.ordered_modules = Vec::new();

        let options = opts();
        let renderer = Renderer::new(&options);
        let closures = HashMap::default();
        let modes = HashMap::default();
        let mut warnings: Vec<Diagnostic> = Vec::new();
        renderer.pre_render(&mut chunk, &mut g, &closures, &modes, &HashMap::default(), &mut warnings);

        assert_eq!(warnings.len(), 1);
        assert!(matches!(warnings[0], Diagnostic::EmptyBundle { .. }));
    }

    #[test]
    fn exports_shim_is_prepended_when_needed() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let shim = g.push_variable("missing", VariableKind::ExportShim, m);
        g.module_mut(m).chunk = Some(0);

        let mut chunk = empty_chunk(0);
        chunk.ordered_modules = vec![m];
        chunk.exports.insert(shim);
        chunk.exports_by_name.insert("missing".into(), shim);

        let options = opts();
        let renderer = Renderer::new(&options);
        let closures = HashMap::default();
        let modes = HashMap::default();
        let mut warnings: Vec<Diagnostic> = Vec::new();
        renderer.pre_render(&mut chunk, &mut g, &closures, &modes, &HashMap::default(), &mut warnings);

        assert!(chunk.needs_exports_shim);
        assert!(chunk.rendered_source.unwrap().contains("_missingExportShim = void 0;"));
    }

    #[test]
    fn transitive_closure_unions_direct_dependencies_of_dependencies() {
        let mut a = empty_chunk(0);
        let mut b = empty_chunk(1);
        let c = empty_chunk(2);
        a.dependencies = vec![DepTarget::Chunk(1)];
        b.dependencies = vec![DepTarget::Chunk(2)];
        let _ = &mut a;
        let _ = &mut b;
        let chunks = vec![a, b, c];
        let closures = Renderer::transitive_dependency_closures(&chunks);
        assert!(closures[&0].contains(&DepTarget::Chunk(2)));
    }
}
