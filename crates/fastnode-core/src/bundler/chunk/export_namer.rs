//! `generateExports` — deciding the public names under which a chunk's
//! live exports are exposed.

use rustc_hash::FxHashSet as HashSet;

use super::chunk_entity::{Chunk, ExportMode};
use super::dependency_linker::is_dynamically_imported_from_outside;
use super::model::{LinkGraph, ModuleId, PreserveSignature, VariableId};
use super::name_allocator::NameAllocator;
use super::options::ChunkOutputOptions;

/// Assigns export names for every variable a chunk exposes.
///
/// Facade and entry chunks install their entry modules' own declared export
/// names first, so a signature-preserving facade's public surface is
/// byte-for-byte what the original entry module exported — unless the
/// module opts out with `preserveSignature: false` and isn't reached by a
/// dynamic import from outside its chunk, in which case it falls through to
/// the same treatment as any other export below. Non-facade (internal)
/// chunks then either keep remaining exports' readable names or mangle them
/// to short `NameAllocator`-style identifiers, depending on
/// [`ChunkOutputOptions::mangles_internal_exports`].
pub struct ExportNamer<'a> {
    options: &'a ChunkOutputOptions,
}

impl<'a> ExportNamer<'a> {
    #[must_use]
    pub fn new(options: &'a ChunkOutputOptions) -> Self {
        Self { options }
    }

    pub fn generate_exports(&self, chunk: &mut Chunk, graph: &mut LinkGraph) {
        let mut allocator = NameAllocator::new();
        let mut assigned: HashSet<VariableId> = HashSet::default();

        if chunk.is_facade_chunk() || chunk.is_entry_chunk() {
            self.install_facade_names(chunk, graph, &mut allocator, &mut assigned);
        }

        let remaining: Vec<VariableId> = chunk
            .exports
            .iter()
            .copied()
            .filter(|v| !assigned.contains(v))
            .collect();

        let mangle = self.options.mangles_internal_exports();
        for var_id in remaining {
            let name = if mangle {
                allocator.allocate(&format!("e{}", var_id))
            } else {
                let preferred = graph.variable(var_id).preferred_name().to_string();
                allocator.allocate(&preferred)
            };
            self.record_export(chunk, graph, var_id, name);
            assigned.insert(var_id);
        }

        self.recompute_export_mode(chunk);
        chunk.invalidate_export_name_cache();
    }

    fn install_facade_names(
        &self,
        chunk: &mut Chunk,
        graph: &mut LinkGraph,
        allocator: &mut NameAllocator,
        assigned: &mut HashSet<VariableId>,
    ) {
        let entry_modules = chunk.entry_modules.clone();
        for module_id in entry_modules {
            if !self.facade_names_installable(graph, module_id) {
                continue;
            }
            let export_pairs: Vec<(VariableId, String)> = {
                let module = graph.module(module_id);
                let mut pairs = Vec::new();
                for (&var_id, names) in &module.export_names_by_variable {
                    for name in names {
                        pairs.push((var_id, name.clone()));
                    }
                }
                pairs.sort_by(|a, b| a.1.cmp(&b.1));
                pairs
            };
            for (var_id, name) in export_pairs {
                if !chunk.exports.contains(&var_id) || assigned.contains(&var_id) {
                    continue;
                }
                let unique = allocator.allocate(&name);
                self.record_export(chunk, graph, var_id, unique);
                assigned.insert(var_id);
            }
        }
    }

    /// Only install an entry module's own declared export names onto its
    /// hosting/facade chunk if the facade preserves that module's signature
    /// or is reached through a dynamic import from outside its chunk;
    /// `preserveSignature: false` entries fall through to the ordinary
    /// (possibly mangled) naming below instead.
    fn facade_names_installable(&self, graph: &LinkGraph, module_id: ModuleId) -> bool {
        let module = graph.module(module_id);
        !matches!(module.preserve_signature, PreserveSignature::False)
            || is_dynamically_imported_from_outside(graph, module_id)
    }

    fn record_export(&self, chunk: &mut Chunk, graph: &mut LinkGraph, var_id: VariableId, name: String) {
        chunk.exports_by_name.insert(name.clone(), var_id);
        graph.variable_mut(var_id).export_name = Some(name);
    }

    /// `default` (a single default export, no named ones), `named` (one or
    /// more named exports, default included as `"default"` if present), or
    /// `none` for an empty export table.
    fn recompute_export_mode(&self, chunk: &mut Chunk) {
        chunk.export_mode = match chunk.exports_by_name.len() {
            0 => ExportMode::None,
            1 if chunk.exports_by_name.contains_key("default") => ExportMode::Default,
            _ => ExportMode::Named,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::super::chunk_entity::empty_chunk;
    use super::super::model::{empty_module, LinkGraph, VariableKind};
    use super::*;

    #[test]
    fn facade_chunk_reuses_entry_module_export_names() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let v = g.push_variable("x", VariableKind::Local { is_reassigned: false }, m);
        g.module_mut(m).export_names_by_variable.insert(v, vec!["foo".into()]);

        let mut chunk = empty_chunk(0);
        chunk.entry_modules.push(m);
        chunk.facade_module = Some(m);
        chunk.exports.insert(v);

        let opts = ChunkOutputOptions::default();
        ExportNamer::new(&opts).generate_exports(&mut chunk, &mut g);

        assert_eq!(chunk.exports_by_name.get("foo"), Some(&v));
        assert_eq!(g.variable(v).export_name.as_deref(), Some("foo"));
    }

    #[test]
    fn internal_exports_mangle_under_es_by_default() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let v = g.push_variable("longInternalName", VariableKind::Local { is_reassigned: false }, m);

        let mut chunk = empty_chunk(0);
        chunk.exports.insert(v);

        let opts = ChunkOutputOptions::default();
        ExportNamer::new(&opts).generate_exports(&mut chunk, &mut g);

        let name = g.variable(v).export_name.clone().unwrap();
        assert_ne!(name, "longInternalName");
        assert!(matches!(chunk.export_mode, ExportMode::Named));
    }

    #[test]
    fn cjs_format_keeps_readable_internal_export_names() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let v = g.push_variable("readable", VariableKind::Local { is_reassigned: false }, m);

        let mut chunk = empty_chunk(0);
        chunk.exports.insert(v);

        let opts = ChunkOutputOptions {
            format: super::super::options::OutputFormat::Cjs,
            ..Default::default()
        };
        ExportNamer::new(&opts).generate_exports(&mut chunk, &mut g);

        assert_eq!(g.variable(v).export_name.as_deref(), Some("readable"));
    }

    #[test]
    fn preserve_signature_false_skips_facade_name_install() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| {
            let mut module = empty_module(id, "a.js");
            module.preserve_signature = super::super::model::PreserveSignature::False;
            module
        });
        let v = g.push_variable("x", VariableKind::Local { is_reassigned: false }, m);
        g.module_mut(m).export_names_by_variable.insert(v, vec!["foo".into()]);

        let mut chunk = empty_chunk(0);
        chunk.entry_modules.push(m);
        chunk.facade_module = Some(m);
        chunk.exports.insert(v);

        let opts = ChunkOutputOptions {
            format: super::super::options::OutputFormat::Cjs,
            ..Default::default()
        };
        ExportNamer::new(&opts).generate_exports(&mut chunk, &mut g);

        assert_eq!(g.variable(v).export_name.as_deref(), Some("x"));
        assert!(!chunk.exports_by_name.contains_key("foo"));
    }
}
