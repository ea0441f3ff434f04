//! The `Chunk` core entity and its phase lifecycle.

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use super::model::{ChunkId, DepTarget, DynamicTarget, ExternalModuleId, ModuleId, VariableId};

/// How a `dynamicImport()` call site resolves at render time, decided once
/// by `prepareDynamicImports` and consumed later by the finaliser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicResolution {
    /// Target module lives in this chunk; resolves to its namespace object.
    Named { namespace_variable: VariableId },
    /// Target lives in another chunk; mirrors that chunk's `exportMode`.
    Chunk(ExportMode),
    /// External or unresolved; left to the format's native `import()`.
    Auto,
}

/// `exportMode` — how a chunk's export table is structured at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    #[default]
    None,
    Named,
    Default,
}

/// Lifecycle phase. Each phase is idempotent within itself but not
/// re-entrant; the coordinator enforces strict sequencing per chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChunkPhase {
    Constructed,
    Linked,
    ExportsGenerated,
    FacadesGenerated,
    PreRendered,
    IdAssigned,
    Rendered,
}

/// One rendered export's declaration-time facts (hoisted/uninitialized are
/// needed by the finaliser to decide `var`/`function` emission order).
#[derive(Debug, Clone)]
pub struct RenderedExport {
    pub local: String,
    pub exported: String,
    pub hoisted: bool,
    pub uninitialized: bool,
    /// For synthetic named exports: the original local expression instead
    /// of a plain identifier.
    pub expression: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ImportSpecifier {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone)]
pub struct ReexportSpecifier {
    pub imported: String,
    pub reexported: String,
    pub needs_live_binding: bool,
    /// `export * from '...'`.
    pub is_star: bool,
}

/// One dependency's full declaration, as produced by `getChunkDependencyDeclarations`.
#[derive(Debug, Clone)]
pub struct DependencyDeclaration {
    pub target: DepTarget,
    /// Filled with the final relative path at render time.
    pub id: Option<String>,
    pub exports_names: bool,
    pub exports_default: bool,
    pub named_exports_mode: bool,
    /// `umd`/`iife` only.
    pub global_name: Option<String>,
    pub imports: Vec<ImportSpecifier>,
    pub reexports: Vec<ReexportSpecifier>,
}

/// Summary metadata about one rendered module, used for the
/// `renderedModules[*].renderedLength` round-trip invariant.
#[derive(Debug, Clone)]
pub struct RenderedModuleInfo {
    pub module_id: ModuleId,
    pub rendered_length: usize,
}

/// The output-file unit: an ordered set of modules plus everything needed
/// to render them into one artifact.
#[derive(Debug)]
pub struct Chunk {
    pub id: ChunkId,
    /// Final filename; `None` until `generate_id`.
    pub file_id: Option<String>,
    pub name: String,
    pub file_name: Option<String>,
    pub variable_name: String,
    pub manual_chunk_alias: Option<String>,

    pub ordered_modules: Vec<ModuleId>,
    pub entry_modules: Vec<ModuleId>,
    pub facade_module: Option<ModuleId>,

    pub dependencies: Vec<DepTarget>,
    pub dynamic_dependencies: Vec<DepTarget>,

    pub imports: HashSet<VariableId>,
    pub exports: HashSet<VariableId>,
    pub exports_by_name: HashMap<String, VariableId>,
    pub(crate) sorted_export_names: Option<Vec<String>>,
    /// Externals reexported wholesale (`export * from 'pkg'`) by any module
    /// in this chunk; keyed outside `exports_by_name` since there is no
    /// single `Variable` to name a statically-unenumerable star reexport.
    pub star_external_reexports: HashSet<ExternalModuleId>,

    pub export_mode: ExportMode,
    pub needs_exports_shim: bool,

    pub exec_index: usize,
    pub is_empty: bool,

    pub indent_string: &'static str,
    pub rendered_source: Option<String>,
    pub rendered_module_sources: HashMap<ModuleId, String>,
    pub rendered_dependencies: Vec<DependencyDeclaration>,
    pub rendered_exports: Vec<RenderedExport>,
    pub rendered_hash: Option<String>,
    pub rendered_modules: Vec<RenderedModuleInfo>,

    /// One entry per dynamic-import call site reachable from this chunk's
    /// modules, keyed by the originating module and its resolved target.
    pub dynamic_import_resolutions: Vec<(ModuleId, DynamicTarget, DynamicResolution)>,

    pub phase: ChunkPhase,
}

impl Chunk {
    /// `getChunkName` — best-effort human name, falling back to the variable
    /// name when no explicit name was assigned.
    #[must_use]
    pub fn chunk_name(&self) -> &str {
        &self.name
    }

    /// `getExportNames()` — sorted, deduplicated (by construction, since
    /// `exports_by_name` is a map) list of export names.
    #[must_use]
    pub fn export_names(&mut self) -> &[String] {
        if self.sorted_export_names.is_none() {
            let mut names: Vec<String> = self.exports_by_name.keys().cloned().collect();
            names.sort();
            self.sorted_export_names = Some(names);
        }
        self.sorted_export_names.as_deref().unwrap()
    }

    pub fn invalidate_export_name_cache(&mut self) {
        self.sorted_export_names = None;
    }

    #[must_use]
    pub fn get_variable_export_name(&self, variable: VariableId) -> Option<&str> {
        self.exports_by_name
            .iter()
            .find(|(_, v)| **v == variable)
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn get_import_ids(&self) -> Vec<DepTarget> {
        self.dependencies.clone()
    }

    #[must_use]
    pub fn get_dynamic_import_ids(&self) -> Vec<DepTarget> {
        self.dynamic_dependencies.clone()
    }

    /// Invariant 6: a chunk never appears in its own dependencies.
    #[must_use]
    pub fn dependencies_are_acyclic(&self) -> bool {
        !self.dependencies.contains(&DepTarget::Chunk(self.id))
            && !self.dynamic_dependencies.contains(&DepTarget::Chunk(self.id))
    }

    #[must_use]
    pub fn is_entry_chunk(&self) -> bool {
        !self.entry_modules.is_empty()
    }

    #[must_use]
    pub fn is_facade_chunk(&self) -> bool {
        self.ordered_modules.is_empty() && self.facade_module.is_some()
    }

    /// Invariant 3: a chunk's `execIndex` equals its first ordered module's,
    /// or +inf (`usize::MAX`) for an empty chunk.
    #[must_use]
    pub fn recompute_exec_index(modules_exec_index: Option<usize>) -> usize {
        modules_exec_index.unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkDep {
    pub chunk: ChunkId,
}

#[derive(Debug, Clone, Copy)]
pub struct ExternalDep {
    pub external: ExternalModuleId,
}

/// Test-only fixture shared across the `chunk` submodule's test code.
#[cfg(test)]
pub(crate) fn empty_chunk(id: ChunkId) -> Chunk {
    Chunk {
        id,
        file_id: None,
        name: format!("chunk{id}"),
        file_name: None,
        variable_name: format!("chunk{id}"),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_names_are_sorted_and_deduped_by_map_identity() {
        let mut c = empty_chunk(0);
        c.exports_by_name.insert("b".into(), 1);
        c.exports_by_name.insert("a".into(), 0);
        assert_eq!(c.export_names(), &["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn chunk_never_self_references() {
        let mut c = empty_chunk(0);
        assert!(c.dependencies_are_acyclic());
        c.dependencies.push(DepTarget::Chunk(0));
        assert!(!c.dependencies_are_acyclic());
    }

    #[test]
    fn phase_ordering_is_total() {
        assert!(ChunkPhase::Constructed < ChunkPhase::Linked);
        assert!(ChunkPhase::PreRendered < ChunkPhase::Rendered);
    }
}
