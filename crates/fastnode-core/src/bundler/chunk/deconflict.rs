//! Cross-module identifier deconfliction.
//!
//! Generalises the line-based renaming `bundler::scope::ScopeHoistContext`
//! performs during scope hoisting to operate over the arena-indexed
//! [`super::model::Variable`] model: instead of rewriting source text
//! directly, this pass only decides render names; the renderer substitutes
//! them when it concatenates module bodies.

use rustc_hash::FxHashSet as HashSet;

use super::model::{LinkGraph, ModuleId, RenderName, VariableId, VariableKind};
use super::name_allocator::NameAllocator;

/// Identifiers the cjs/umd/iife interop runtime reserves at the top of every
/// chunk, mirroring the constants `ScopeHoistContext` already treats as
/// untouchable globals.
const INTEROP_RESERVED: &[&str] = &[
    "exports",
    "require",
    "module",
    "__filename",
    "__dirname",
    "_interopDefault",
    "_interopNamespace",
];

/// Deconflicts every variable visible to a chunk, in module order, writing
/// the chosen render name back onto each [`super::model::Variable`].
///
/// `reserved_names` should already contain anything the surrounding output
/// format reserves (global names for external dependencies, the chunk's own
/// exported name in `umd`/`iife`, and so on); `INTEROP_RESERVED` is merged in
/// unconditionally since every format's addons may reference them.
pub struct Deconflicter {
    allocator: NameAllocator,
}

impl Deconflicter {
    #[must_use]
    pub fn new(reserved_names: impl IntoIterator<Item = String>) -> Self {
        let mut allocator = NameAllocator::new();
        allocator.reserve_all(reserved_names);
        allocator.reserve_all(INTEROP_RESERVED.iter().map(|s| s.to_string()));
        Self { allocator }
    }

    /// Deconflicts all variables owned by `modules`, plus every external's
    /// namespace variable name reachable from them, in the given order.
    /// Order matters: the first module to claim a name wins it, walking
    /// `orderedModules` front-to-back.
    pub fn deconflict(&mut self, graph: &mut LinkGraph, modules: &[ModuleId]) {
        for &module_id in modules {
            self.deconflict_module(graph, module_id);
        }
    }

    fn deconflict_module(&mut self, graph: &mut LinkGraph, module_id: ModuleId) {
        let local_vars = graph.module(module_id).local_variables.clone();
        for var_id in local_vars {
            self.deconflict_variable(graph, var_id);
        }
    }

    fn deconflict_variable(&mut self, graph: &mut LinkGraph, var_id: VariableId) {
        if !matches!(graph.variable(var_id).render_name, RenderName::Unset) {
            return;
        }
        // Synthetic named exports and `export default` delegate their
        // rendered identity to the variable they derive from; they never
        // claim a name of their own.
        let (skip, preferred) = {
            let v = graph.variable(var_id);
            match &v.kind {
                VariableKind::SyntheticNamedExport { .. } | VariableKind::ExportShim => {
                    (true, String::new())
                }
                _ => (false, v.preferred_name().to_string()),
            }
        };
        if skip {
            return;
        }
        let name = self.allocator.allocate(&preferred);
        graph.variable_mut(var_id).set_render_name(RenderName::Name(name));
    }

    /// Reserves a set of names without allocating anything, used to block
    /// out facade/export identifiers decided earlier in the pipeline so
    /// deconfliction never collides with them.
    pub fn reserve(&mut self, names: impl IntoIterator<Item = String>) {
        self.allocator.reserve_all(names);
    }

    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.allocator.is_reserved(name)
    }
}

/// Collects every name already claimed by sibling chunks' dependency
/// declarations, so a chunk being deconflicted never shadows an imported
/// binding it is about to reference by render-name.
#[must_use]
pub fn names_used_by_imports(graph: &LinkGraph, import_variables: &[VariableId]) -> HashSet<String> {
    import_variables
        .iter()
        .map(|&id| graph.variable(id).rendered_name().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::model::{empty_module, LinkGraph, VariableKind};
    use super::*;

    #[test]
    fn colliding_locals_across_modules_get_ascending_suffixes() {
        let mut g = LinkGraph::new();
        let m1 = g.push_module(|id| empty_module(id, "a.js"));
        let m2 = g.push_module(|id| empty_module(id, "b.js"));
        let v1 = g.push_variable("helper", VariableKind::Local { is_reassigned: false }, m1);
        let v2 = g.push_variable("helper", VariableKind::Local { is_reassigned: false }, m2);
        g.module_mut(m1).local_variables.push(v1);
        g.module_mut(m2).local_variables.push(v2);

        let mut d = Deconflicter::new(Vec::new());
        d.deconflict(&mut g, &[m1, m2]);

        assert_eq!(g.variable(v1).rendered_name(), "helper");
        assert_eq!(g.variable(v2).rendered_name(), "helper$1");
    }

    #[test]
    fn interop_reserved_names_are_never_assigned() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let v = g.push_variable("exports", VariableKind::Local { is_reassigned: false }, m);
        g.module_mut(m).local_variables.push(v);

        let mut d = Deconflicter::new(Vec::new());
        d.deconflict(&mut g, &[m]);

        assert_ne!(g.variable(v).rendered_name(), "exports");
    }

    #[test]
    fn synthetic_named_exports_are_left_unset() {
        let mut g = LinkGraph::new();
        let m = g.push_module(|id| empty_module(id, "a.js"));
        let original = g.push_variable("dflt", VariableKind::Local { is_reassigned: false }, m);
        let shim = g.push_variable(
            "named",
            VariableKind::SyntheticNamedExport { original },
            m,
        );
        g.module_mut(m).local_variables.push(original);
        g.module_mut(m).local_variables.push(shim);

        let mut d = Deconflicter::new(Vec::new());
        d.deconflict(&mut g, &[m]);

        assert_eq!(g.variable(shim).render_name, RenderName::Unset);
    }
}
