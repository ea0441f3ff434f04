//! `getChunkDependencyDeclarations` / `getChunkExportDeclarations` and
//! `setUpChunkImportsAndExportsForModule`.

use rustc_hash::FxHashMap as HashMap;

use super::chunk_entity::{Chunk, DependencyDeclaration, ImportSpecifier, RenderedExport, ReexportSpecifier};
use super::diagnostics::{Diagnostic, WarnSink};
use super::model::{DepTarget, LinkGraph, ModuleId, PreserveSignature, VariableKind};
use super::options::{ChunkOutputOptions, OutputFormat};

/// `setUpChunkImportsAndExportsForModule`. Called once per
/// module while `link()`-ing a chunk, in ordered-module order.
pub fn set_up_chunk_imports_and_exports_for_module(
    chunk: &mut Chunk,
    graph: &mut LinkGraph,
    module_id: ModuleId,
    preserve_modules: bool,
) {
    // Cross-registering an imported variable onto its origin chunk's own
    // `exports` (so that chunk assigns it an export name too) happens at
    // the coordinator level, which holds every chunk at once and can apply
    // the `preserve_modules`/namespace exception; this function only
    // records the local half of the edge.
    let _ = preserve_modules;
    let imports = graph.module(module_id).imports.clone();
    for binding in &imports {
        let var_id = binding.variable;
        let origin = graph.variable(var_id).origin_module;
        let crosses_boundary = graph.module(origin).chunk != Some(chunk.id);
        if !crosses_boundary {
            continue;
        }
        let resolved = super::model::Variable::deref_default(var_id, &graph.variables);
        chunk.imports.insert(resolved);
    }

    let module = graph.module(module_id);
    let must_expose_signature = (module.is_entry_point
        && !matches!(module.preserve_signature, PreserveSignature::False))
        || is_dynamically_imported_from_outside(graph, module_id);

    if must_expose_signature {
        let export_pairs: Vec<(super::model::VariableId, Vec<String>)> = module
            .export_names_by_variable
            .iter()
            .map(|(v, names)| (*v, names.clone()))
            .collect();
        for (var_id, _names) in export_pairs {
            chunk.exports.insert(var_id);
            if graph.variable(var_id).is_synthetic_named_export() {
                if let VariableKind::SyntheticNamedExport { original } = graph.variable(var_id).kind {
                    chunk.imports.insert(original);
                }
            }
        }
    }

    let star_externals = graph.module(module_id).star_reexport_externals.clone();
    for ext in star_externals {
        chunk.star_external_reexports.insert(ext);
    }
}

pub(super) fn is_dynamically_imported_from_outside(graph: &LinkGraph, module_id: ModuleId) -> bool {
    for module in &graph.modules {
        if module.chunk == graph.module(module_id).chunk {
            continue;
        }
        for target in &module.dynamic_dependencies {
            if let super::model::DynamicTarget::Module(m) = target {
                if *m == module_id {
                    return true;
                }
            }
        }
    }
    false
}

/// Builds the per-dependency declarations consumed by the finaliser.
pub struct DependencyLinker<'a> {
    options: &'a ChunkOutputOptions,
}

impl<'a> DependencyLinker<'a> {
    #[must_use]
    pub fn new(options: &'a ChunkOutputOptions) -> Self {
        Self { options }
    }

    pub fn get_chunk_dependency_declarations(
        &self,
        chunk: &mut Chunk,
        graph: &LinkGraph,
        warn: &mut impl WarnSink,
    ) -> Vec<DependencyDeclaration> {
        let mut reexports_by_dep: HashMap<DepTarget, Vec<ReexportSpecifier>> = HashMap::default();
        let mut imports_by_dep: HashMap<DepTarget, Vec<ImportSpecifier>> = HashMap::default();

        for external in &chunk.star_external_reexports {
            reexports_by_dep
                .entry(DepTarget::External(*external))
                .or_default()
                .push(ReexportSpecifier {
                    imported: "*".to_string(),
                    reexported: "*".to_string(),
                    needs_live_binding: self.options.external_live_bindings,
                    is_star: true,
                });
        }

        let export_names = chunk.export_names().to_vec();
        for name in &export_names {
            let Some(&var_id) = chunk.exports_by_name.get(name) else {
                continue;
            };
            let var = graph.variable(var_id);
            if var.is_synthetic_named_export() {
                continue;
            }
            let origin_module = var.origin_module;
            if graph.module(origin_module).chunk == Some(chunk.id) {
                continue;
            }
            let origin_export_name = graph
                .module(origin_module)
                .export_names_for(var_id)
                .first()
                .cloned()
                .unwrap_or_else(|| var.preferred_name().to_string());
            let target = dep_target_for(graph, origin_module);
            let needs_live_binding = match target {
                DepTarget::Chunk(_) => var.is_reassigned(),
                DepTarget::External(_) => self.options.external_live_bindings,
            };
            reexports_by_dep.entry(target).or_default().push(ReexportSpecifier {
                imported: origin_export_name,
                reexported: name.clone(),
                needs_live_binding,
                is_star: false,
            });
        }

        for &var_id in &chunk.imports {
            let resolved = super::model::Variable::deref_default(var_id, &graph.variables);
            let var = graph.variable(resolved);
            let origin_module = var.origin_module;
            if graph.module(origin_module).chunk == Some(chunk.id) {
                continue;
            }
            let target = dep_target_for(graph, origin_module);
            let imported = match target {
                DepTarget::Chunk(_) => graph
                    .module(origin_module)
                    .export_names_for(resolved)
                    .first()
                    .cloned()
                    .unwrap_or_else(|| var.preferred_name().to_string()),
                DepTarget::External(_) => var.preferred_name().to_string(),
            };
            let local = var.rendered_name().to_string();
            let specifiers = imports_by_dep.entry(target).or_default();
            if !specifiers.iter().any(|s| s.imported == imported && s.local == local) {
                specifiers.push(ImportSpecifier { imported, local });
            }
        }

        let mut declarations = Vec::with_capacity(chunk.dependencies.len());
        for &target in &chunk.dependencies {
            let (exports_names, exports_default, named_exports_mode, global_name) =
                self.dependency_shape(graph, target, warn);
            declarations.push(DependencyDeclaration {
                target,
                id: None,
                exports_names,
                exports_default,
                named_exports_mode,
                global_name,
                imports: imports_by_dep.remove(&target).unwrap_or_default(),
                reexports: reexports_by_dep.remove(&target).unwrap_or_default(),
            });
        }
        declarations
    }

    fn dependency_shape(
        &self,
        graph: &LinkGraph,
        target: DepTarget,
        warn: &mut impl WarnSink,
    ) -> (bool, bool, bool, Option<String>) {
        match target {
            DepTarget::Chunk(_) => (true, false, true, None),
            DepTarget::External(id) => {
                let ext = graph.external(id);
                let exports_default = ext.declarations.iter().any(|d| d == "default");
                let global_name = if matches!(self.options.format, OutputFormat::Umd | OutputFormat::Iife) {
                    self.global_name(ext, warn)
                } else {
                    None
                };
                (ext.exports_names || ext.exports_namespace, exports_default, true, global_name)
            }
        }
    }

    fn global_name(&self, external: &super::model::ExternalModule, warn: &mut impl WarnSink) -> Option<String> {
        if let Some(name) = self.options.globals.get(&external.source_id) {
            return Some(name);
        }
        if external.exports_names || external.exports_namespace {
            let guess = external.variable_name.clone();
            warn.warn(Diagnostic::MissingGlobalName {
                external_id: external.source_id.clone(),
                guess: guess.clone(),
            });
            Some(guess)
        } else {
            None
        }
    }

    /// `getChunkExportDeclarations` (export declarations).
    pub fn get_chunk_export_declarations(&self, chunk: &Chunk, graph: &LinkGraph, format: OutputFormat) -> Vec<RenderedExport> {
        let mut out = Vec::new();
        for name in chunk.exports_by_name.keys() {
            if name.starts_with('*') {
                continue;
            }
            let var_id = chunk.exports_by_name[name];
            let var = graph.variable(var_id);
            let local = var.rendered_name().to_string();
            let hoist_source = super::model::Variable::deref_default(var_id, &graph.variables);
            let hoisted = graph.variable(hoist_source).is_function_declaration
                && graph.module(var.origin_module).chunk == Some(chunk.id);
            let uninitialized = var.is_export_shim();
            let expression = if let VariableKind::SyntheticNamedExport { original } = var.kind {
                let orig_name = graph.variable(original).rendered_name().to_string();
                if matches!(format, OutputFormat::Es) && name != "default" {
                    Some(format!("{orig_name}$synthetic"))
                } else {
                    Some(orig_name)
                }
            } else {
                None
            };
            out.push(RenderedExport {
                local,
                exported: name.clone(),
                hoisted,
                uninitialized,
                expression,
            });
        }
        out.sort_by(|a, b| a.exported.cmp(&b.exported));
        out
    }
}

fn dep_target_for(graph: &LinkGraph, module_id: ModuleId) -> DepTarget {
    match graph.module(module_id).chunk {
        Some(chunk_id) => DepTarget::Chunk(chunk_id),
        None => unreachable!("origin module must be assigned to a chunk before dependency linking"),
    }
}
