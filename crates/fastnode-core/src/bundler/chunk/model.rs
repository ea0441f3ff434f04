//! Arena-indexed data model for the chunk assembly core.
//!
//! Modules, external modules, variables and chunks all cross-reference each
//! other (Module -> Chunk, Variable -> Module, Chunk -> Variable...). Rather
//! than modelling that with `Rc`/`Weak`, every entity lives in a flat `Vec`
//! owned by a `LinkGraph` and is referenced by a stable integer index. A
//! "pointer" between entities is just one of these indices; back-references
//! are reads, never ownership, which keeps the whole graph `Send`.

use rustc_hash::FxHashMap as HashMap;

/// Index into [`LinkGraph::modules`].
pub type ModuleId = usize;
/// Index into [`LinkGraph::externals`].
pub type ExternalModuleId = usize;
/// Index into [`LinkGraph::variables`].
pub type VariableId = usize;
/// Index into the chunk list held by the coordinator.
pub type ChunkId = usize;

/// Either side of a dependency edge: a sibling output chunk, or an external
/// module left un-bundled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepTarget {
    Chunk(ChunkId),
    External(ExternalModuleId),
}

/// The resolution target of a `dynamicImport()` call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicTarget {
    Module(ModuleId),
    External(ExternalModuleId),
    /// The specifier could not be statically resolved (kept verbatim).
    Unresolved(String),
}

/// `preserveSignature` classification of an entry module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreserveSignature {
    False,
    #[default]
    Strict,
    /// The core treats this identically to `Strict` (see DESIGN.md).
    AllowExtension,
}

/// A reexport entry recorded on a module: `export { name } from './other'`.
#[derive(Debug, Clone)]
pub struct ReexportDescription {
    pub local_name: String,
    pub origin_module: ModuleId,
}

/// One resolved import binding on a module: `import { imported as local }`.
#[derive(Debug, Clone)]
pub struct ImportBinding {
    pub imported_name: String,
    pub local_name: String,
    pub variable: VariableId,
}

/// A static or dynamic dependency edge out of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleDep {
    Module(ModuleId),
    External(ExternalModuleId),
}

/// The already-parsed-and-tree-shaken Module entity the chunk core reads
/// from. Populated once, ahead of `ChunkCoordinator::construct`, from the
/// resolved module graph plus tree-shaking results; never mutated by
/// anything downstream except the `chunk`/`facade_chunk` back-references
/// and variable render-name assignment.
#[derive(Debug, Clone)]
pub struct LinkedModule {
    pub id: ModuleId,
    /// Stable absolute path or virtual id (e.g. `"\0virtual:foo"`).
    pub path: String,
    /// Total order consistent with dependency execution (post-toposort index).
    pub exec_index: usize,
    /// Whether tree-shaking kept this module in the bundle at all.
    pub included: bool,
    pub imports: Vec<ImportBinding>,
    pub dependencies: Vec<ModuleDep>,
    pub dynamic_dependencies: Vec<DynamicTarget>,
    /// Variable -> export names under which this module exposes it.
    pub export_names_by_variable: HashMap<VariableId, Vec<String>>,
    /// name -> reexport source, for `export { x } from './other'`.
    pub reexport_descriptions: HashMap<String, ReexportDescription>,
    /// Externals this module re-exports wholesale via `export * from 'pkg'`,
    /// where the named set cannot be statically enumerated.
    pub star_reexport_externals: Vec<ExternalModuleId>,
    /// Locally declared variables owned by this module (includes the
    /// namespace variable and any synthetic/shim variables it hosts).
    pub local_variables: Vec<VariableId>,
    pub namespace_variable: Option<VariableId>,
    pub is_entry_point: bool,
    pub is_user_defined_entry_point: bool,
    pub preserve_signature: PreserveSignature,
    pub manual_chunk_alias: Option<String>,
    pub user_chunk_names: Vec<String>,
    pub chunk_file_names: Vec<String>,
    pub uses_top_level_await: bool,
    /// Source to render for this module's body (post-treeshake, pre-hoist).
    pub rendered_source: String,
    /// Back-reference, assigned once at chunk construction.
    pub chunk: Option<ChunkId>,
    /// Back-reference to the facade chunk exposing this module's signature.
    pub facade_chunk: Option<ChunkId>,
}

impl LinkedModule {
    /// `getExportNamesByVariable()`.
    #[must_use]
    pub fn export_names_for(&self, variable: VariableId) -> &[String] {
        self.export_names_by_variable
            .get(&variable)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn is_empty_module(&self) -> bool {
        !self.included
    }
}

/// An external (un-bundled) module: `import x from 'lodash'`.
#[derive(Debug, Clone)]
pub struct ExternalModule {
    pub id: ExternalModuleId,
    /// The original specifier, e.g. `"lodash"` or `"node:fs"`.
    pub source_id: String,
    /// Set by `setRenderPath` once the final relative path is known.
    pub render_path: Option<String>,
    pub renormalize_render_path: bool,
    /// Legal identifier used to reference this external's namespace.
    pub variable_name: String,
    pub exports_names: bool,
    pub exports_namespace: bool,
    /// Named exports known to be exposed (includes `"default"` if relevant).
    pub declarations: Vec<String>,
}

impl ExternalModule {
    #[must_use]
    pub fn new(id: ExternalModuleId, source_id: impl Into<String>, variable_name: String) -> Self {
        Self {
            id,
            source_id: source_id.into(),
            render_path: None,
            renormalize_render_path: false,
            variable_name,
            exports_names: true,
            exports_namespace: false,
            declarations: Vec::new(),
        }
    }

    pub fn set_render_path(&mut self, path: impl Into<String>, renormalize: bool) {
        self.render_path = Some(path.into());
        self.renormalize_render_path = renormalize;
    }
}

/// An explicit render-name override: either a bare identifier or a
/// `(object, property)` member access (used for non-identifier cjs exports).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderName {
    Unset,
    Name(String),
    Member(String, String),
}

impl RenderName {
    #[must_use]
    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            RenderName::Name(n) => Some(n),
            _ => None,
        }
    }
}

/// The tagged-sum `Variable` variants: each answers `getName`,
/// `setRenderNames`, `isReassigned`, `originModule` and (if exported)
/// `exportName`.
#[derive(Debug, Clone)]
pub enum VariableKind {
    Local { is_reassigned: bool },
    /// `export default expr` — delegates most behaviour to `original` unless
    /// the default itself needs a distinct local name (anonymous default).
    ExportDefault { original: Option<VariableId> },
    /// The `import * as ns` / `module.exports` namespace object for a module.
    Namespace,
    /// A named export synthesised on demand from a module's default export
    /// (`import { foo } from './only-has-default'` style interop).
    SyntheticNamedExport { original: VariableId },
    /// Stands in for a named export that does not exist on the target
    /// module; renders as `undefined`.
    ExportShim,
    /// A binding hosted on an [`ExternalModule`].
    External { external: ExternalModuleId },
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub kind: VariableKind,
    pub origin_module: ModuleId,
    pub export_name: Option<String>,
    pub render_name: RenderName,
    /// Set when the declaration backing this variable is a function
    /// declaration (including an anonymous `export default function () {}`).
    /// Drives `RenderedExport::hoisted` — only a hoisted function can be
    /// exported before its declaration runs.
    pub is_function_declaration: bool,
}

impl Variable {
    #[must_use]
    pub fn is_reassigned(&self) -> bool {
        matches!(self.kind, VariableKind::Local { is_reassigned: true })
    }

    #[must_use]
    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, VariableKind::Namespace)
    }

    #[must_use]
    pub fn is_synthetic_named_export(&self) -> bool {
        matches!(self.kind, VariableKind::SyntheticNamedExport { .. })
    }

    #[must_use]
    pub fn is_export_shim(&self) -> bool {
        matches!(self.kind, VariableKind::ExportShim)
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        matches!(self.kind, VariableKind::External { .. })
    }

    /// Dereferences `ExportDefault` to its original variable, if any.
    /// All other variants return themselves.
    #[must_use]
    pub fn deref_default(id: VariableId, arena: &[Variable]) -> VariableId {
        match &arena[id].kind {
            VariableKind::ExportDefault {
                original: Some(orig),
            } => *orig,
            _ => id,
        }
    }

    /// `getName()` — the name this variable would render under absent any
    /// deconfliction rename.
    #[must_use]
    pub fn preferred_name(&self) -> &str {
        &self.name
    }

    pub fn set_render_name(&mut self, name: RenderName) {
        self.render_name = name;
    }

    /// The name actually emitted in rendered code: the deconflicted
    /// render-name if one was assigned, else the preferred name.
    #[must_use]
    pub fn rendered_name(&self) -> &str {
        match &self.render_name {
            RenderName::Name(n) => n,
            _ => &self.name,
        }
    }
}

/// Owns every module, external module and variable for one bundle run.
/// The chunk core treats this as a read-only external collaborator except
/// for the `chunk`/`facade_chunk` back-references and variable render-names,
/// which are written exactly once by the owning chunk's phases.
#[derive(Debug, Default)]
pub struct LinkGraph {
    pub modules: Vec<LinkedModule>,
    pub externals: Vec<ExternalModule>,
    pub variables: Vec<Variable>,
}

impl LinkGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(&self, id: ModuleId) -> &LinkedModule {
        &self.modules[id]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut LinkedModule {
        &mut self.modules[id]
    }

    pub fn external(&self, id: ExternalModuleId) -> &ExternalModule {
        &self.externals[id]
    }

    pub fn external_mut(&mut self, id: ExternalModuleId) -> &mut ExternalModule {
        &mut self.externals[id]
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id]
    }

    pub fn variable_mut(&mut self, id: VariableId) -> &mut Variable {
        &mut self.variables[id]
    }

    pub fn push_module(&mut self, build: impl FnOnce(ModuleId) -> LinkedModule) -> ModuleId {
        let id = self.modules.len();
        self.modules.push(build(id));
        id
    }

    pub fn push_external(&mut self, source_id: impl Into<String>, variable_name: String) -> ExternalModuleId {
        let id = self.externals.len();
        self.externals.push(ExternalModule::new(id, source_id, variable_name));
        id
    }

    pub fn push_variable(
        &mut self,
        name: impl Into<String>,
        kind: VariableKind,
        origin_module: ModuleId,
    ) -> VariableId {
        let id = self.variables.len();
        self.variables.push(Variable {
            id,
            name: name.into(),
            kind,
            origin_module,
            export_name: None,
            render_name: RenderName::Unset,
            is_function_declaration: false,
        });
        id
    }
}

/// Test-only fixture builder shared across the `chunk` submodule's test code.
#[cfg(test)]
pub(crate) fn empty_module(id: ModuleId, path: &str) -> LinkedModule {
    LinkedModule {
        id,
        path: path.to_string(),
        exec_index: id,
        included: true,
        imports: Vec::new(),
        dependencies: Vec::new(),
        dynamic_dependencies: Vec::new(),
        export_names_by_variable: HashMap::default(),
        reexport_descriptions: HashMap::default(),
        star_reexport_externals: Vec::new(),
        local_variables: Vec::new(),
        namespace_variable: None,
        is_entry_point: false,
        is_user_defined_entry_point: false,
        preserve_signature: PreserveSignature::Strict,
        manual_chunk_alias: None,
        user_chunk_names: Vec::new(),
        chunk_file_names: Vec::new(),
        uses_top_level_await: false,
        rendered_source: String::new(),
        chunk: None,
        facade_chunk: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deref_default_follows_original() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let local = g.push_variable("x", VariableKind::Local { is_reassigned: false }, m);
        let def = g.push_variable(
            "default",
            VariableKind::ExportDefault {
                original: Some(local),
            },
            m,
        );
        assert_eq!(Variable::deref_default(def, &g.variables), local);
        assert_eq!(Variable::deref_default(local, &g.variables), local);
    }

    #[test]
    fn rendered_name_falls_back_to_preferred() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let v = g.push_variable("x", VariableKind::Local { is_reassigned: false }, m);
        assert_eq!(g.variable(v).rendered_name(), "x");
        g.variable_mut(v).set_render_name(RenderName::Name("x$1".into()));
        assert_eq!(g.variable(v).rendered_name(), "x$1");
    }
}
