//! Configuration options consumed by the chunk assembly core.

use rustc_hash::FxHashMap as HashMap;

/// The six output module formats the finaliser can target.
///
/// Modelled as an enum dispatch rather than a format string, per Design
/// Notes: each finaliser implementation takes the same argument record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputFormat {
    #[default]
    Es,
    Cjs,
    Amd,
    Umd,
    Iife,
    System,
}

impl OutputFormat {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Es => "es",
            OutputFormat::Cjs => "cjs",
            OutputFormat::Amd => "amd",
            OutputFormat::Umd => "umd",
            OutputFormat::Iife => "iife",
            OutputFormat::System => "system",
        }
    }

    /// Whether this format can express top-level await natively.
    #[must_use]
    pub fn supports_top_level_await(self) -> bool {
        matches!(self, OutputFormat::Es | OutputFormat::System)
    }

    /// Whether `minifyInternalExports` defaults to on for this format absent
    /// an explicit option (es/system mangle by default; others don't).
    #[must_use]
    pub fn mangles_exports_by_default(self) -> bool {
        matches!(self, OutputFormat::Es | OutputFormat::System)
    }
}

/// How the `globals` option resolves an external id to a global variable
/// name, for `umd`/`iife` output.
pub enum GlobalsOption {
    Map(HashMap<String, String>),
    Func(Box<dyn Fn(&str) -> Option<String> + Send + Sync>),
}

impl GlobalsOption {
    #[must_use]
    pub fn get(&self, external_id: &str) -> Option<String> {
        match self {
            GlobalsOption::Map(m) => m.get(external_id).cloned(),
            GlobalsOption::Func(f) => f(external_id),
        }
    }
}

impl Default for GlobalsOption {
    fn default() -> Self {
        GlobalsOption::Map(HashMap::default())
    }
}

impl std::fmt::Debug for GlobalsOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GlobalsOption::Map(m) => f.debug_tuple("Map").field(m).finish(),
            GlobalsOption::Func(_) => f.write_str("Func(..)"),
        }
    }
}

/// Full set of render-affecting options the chunk core consumes.
#[derive(Debug)]
pub struct ChunkOutputOptions {
    pub format: OutputFormat,
    pub compact: bool,
    /// Force mangled internal export names regardless of format. `None`
    /// defers to `format.mangles_exports_by_default() || compact`.
    pub minify_internal_exports: Option<bool>,
    pub prefer_const: bool,
    pub freeze: bool,
    pub namespace_to_string_tag: bool,
    pub hoist_transitive_imports: bool,
    pub external_live_bindings: bool,
    pub interop: bool,
    /// Overrides the `import()` call site. `es`-only; a warning otherwise.
    pub dynamic_import_function: Option<String>,
    pub entry_file_names: String,
    pub chunk_file_names: String,
    pub globals: GlobalsOption,
    pub sourcemap: bool,
    pub sourcemap_file: Option<String>,
    pub sourcemap_exclude_sources: bool,
    pub sourcemap_path_transform: Option<Box<dyn Fn(&str) -> String + Send + Sync>>,
    /// Graph-level: disables facade/transitive-hoisting and selects
    /// preserve-module id derivation.
    pub preserve_modules: bool,
}

impl Default for ChunkOutputOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Es,
            compact: false,
            minify_internal_exports: None,
            prefer_const: true,
            freeze: true,
            namespace_to_string_tag: false,
            hoist_transitive_imports: true,
            external_live_bindings: true,
            interop: true,
            dynamic_import_function: None,
            entry_file_names: "[name].js".to_string(),
            chunk_file_names: "[name]-[hash].js".to_string(),
            globals: GlobalsOption::default(),
            sourcemap: false,
            sourcemap_file: None,
            sourcemap_exclude_sources: false,
            sourcemap_path_transform: None,
            preserve_modules: false,
        }
    }
}

impl ChunkOutputOptions {
    /// Whether internal exports should render under mangled (short) names.
    #[must_use]
    pub fn mangles_internal_exports(&self) -> bool {
        self.minify_internal_exports
            .unwrap_or_else(|| self.format.mangles_exports_by_default() || self.compact)
    }

    #[must_use]
    pub fn indent_string(&self) -> &'static str {
        if self.compact {
            ""
        } else {
            "\t"
        }
    }

    #[must_use]
    pub fn separator(&self) -> &'static str {
        if self.compact {
            ""
        } else {
            "\n\n"
        }
    }

    #[must_use]
    pub fn declaration_keyword(&self) -> &'static str {
        if self.prefer_const {
            "const"
        } else {
            "var"
        }
    }
}

/// Substitute `[name]`, `[hash]`, `[format]`, `[ext]`, `[extname]`
/// placeholders in a filename pattern.
#[must_use]
pub fn substitute_pattern(
    pattern: &str,
    name: &str,
    hash: Option<&str>,
    format: OutputFormat,
    ext: Option<&str>,
    extname: Option<&str>,
) -> String {
    let mut out = pattern.replace("[name]", name).replace("[format]", format.as_str());
    if let Some(h) = hash {
        out = out.replace("[hash]", h);
    }
    if let Some(e) = ext {
        out = out.replace("[ext]", e);
    }
    if let Some(e) = extname {
        out = out.replace("[extname]", e);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn es_and_system_mangle_by_default() {
        assert!(OutputFormat::Es.mangles_exports_by_default());
        assert!(OutputFormat::System.mangles_exports_by_default());
        assert!(!OutputFormat::Cjs.mangles_exports_by_default());
    }

    #[test]
    fn only_es_and_system_support_tla() {
        assert!(OutputFormat::Es.supports_top_level_await());
        assert!(OutputFormat::System.supports_top_level_await());
        for f in [OutputFormat::Cjs, OutputFormat::Amd, OutputFormat::Umd, OutputFormat::Iife] {
            assert!(!f.supports_top_level_await());
        }
    }

    #[test]
    fn substitute_pattern_fills_all_placeholders() {
        let out = substitute_pattern(
            "[name]-[hash].[format].[ext]",
            "main",
            Some("abcd1234"),
            OutputFormat::Es,
            Some("js"),
            None,
        );
        assert_eq!(out, "main-abcd1234.es.js");
    }

    #[test]
    fn mangles_internal_exports_respects_explicit_override() {
        let mut opts = ChunkOutputOptions {
            format: OutputFormat::Cjs,
            ..Default::default()
        };
        assert!(!opts.mangles_internal_exports());
        opts.minify_internal_exports = Some(true);
        assert!(opts.mangles_internal_exports());
    }
}
