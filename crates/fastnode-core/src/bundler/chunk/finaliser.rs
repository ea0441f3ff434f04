//! `render` — format-specific prologues/epilogues, dynamic
//! import lowering, `import.meta` rewriting, and the final `{ code, map }`.

use super::chunk_entity::{Chunk, ChunkPhase, DynamicResolution, ExportMode, RenderedExport};
use super::diagnostics::{ChunkError, Diagnostic, WarnSink};
use super::model::{DepTarget, DynamicTarget, LinkGraph};
use super::name_allocator::legalize_identifier;
use super::options::{ChunkOutputOptions, OutputFormat};
use super::path_util;

/// Addon strings contributed by the `output.banner`/`footer`/`intro`/`outro`
/// options, joined into the hash and spliced around the rendered body.
#[derive(Debug, Clone, Default)]
pub struct Addons {
    pub banner: String,
    pub footer: String,
    pub intro: String,
    pub outro: String,
}

#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub code: String,
    pub map: Option<String>,
}

/// Everything the format-specific finalisers need, gathered once by `render`.
struct FinaliseArgs<'a> {
    source: &'a str,
    dependencies: &'a [super::chunk_entity::DependencyDeclaration],
    exports: &'a [RenderedExport],
    has_exports: bool,
    addons: &'a Addons,
    is_entry_facade: bool,
    named_exports_mode: bool,
    uses_top_level_await: bool,
    keyword: &'static str,
    variable_name: &'a str,
}

pub struct Finaliser<'a> {
    options: &'a ChunkOutputOptions,
}

impl<'a> Finaliser<'a> {
    #[must_use]
    pub fn new(options: &'a ChunkOutputOptions) -> Self {
        Self { options }
    }

    /// `render(options, addons, outputChunkMeta, pluginDriver) -> { code, map }`.
    ///
    /// `output_dir` is the directory the final chunk file will live in
    /// (needed to relativise dependency ids); `render_chunk_hook` mirrors
    /// `bundler::plugin::PluginContainer::render_chunk`, kept synchronous
    /// here since nothing downstream of it needs to suspend.
    pub fn render(
        &self,
        chunk: &mut Chunk,
        graph: &LinkGraph,
        chunks: &[Chunk],
        output_dir: &str,
        addons: &Addons,
        render_chunk_hook: Option<&dyn Fn(&str) -> Result<String, String>>,
        warn: &mut impl WarnSink,
    ) -> Result<RenderOutput, ChunkError> {
        let strip_ext = matches!(self.options.format, OutputFormat::Amd);
        let is_umd_or_iife = matches!(self.options.format, OutputFormat::Umd | OutputFormat::Iife);

        // Fill each dependency's final relative id.
        for dep in &mut chunk.rendered_dependencies {
            let target_path = match dep.target {
                DepTarget::Chunk(id) => chunks[id].file_id.clone().unwrap_or_default(),
                DepTarget::External(ext_id) => graph.external(ext_id).render_path.clone().unwrap_or_default(),
            };
            let mut rel = path_util::relative_path(output_dir, &target_path);
            if strip_ext {
                rel = path_util::strip_js_ext(&rel);
            }
            dep.id = Some(rel);
            if let DepTarget::Chunk(id) = dep.target {
                dep.named_exports_mode = chunks[id].export_mode != ExportMode::Default;
            }
            if is_umd_or_iife && dep.global_name.is_none() {
                if let DepTarget::External(ext_id) = dep.target {
                    let external = graph.external(ext_id);
                    let guess = legalize_identifier(&external.variable_name);
                    warn.warn(Diagnostic::MissingGlobalName {
                        external_id: external.source_id.clone(),
                        guess: guess.clone(),
                    });
                    dep.global_name = Some(guess);
                }
            }
        }

        let mut source = chunk.rendered_source.clone().unwrap_or_default();
        source = self.finalise_dynamic_imports(chunk, graph, chunks, &source, strip_ext, output_dir);
        source = self.finalise_import_metas(&source);

        let uses_tla = chunk
            .ordered_modules
            .iter()
            .any(|m| graph.module(*m).uses_top_level_await);
        if uses_tla && !self.options.format.supports_top_level_await() {
            return Err(ChunkError::InvalidTlaFormat {
                format: self.options.format.as_str(),
            });
        }

        let has_exports = !chunk.rendered_exports.is_empty()
            || chunk.rendered_dependencies.iter().any(|d| !d.reexports.is_empty());

        let args = FinaliseArgs {
            source: &source,
            dependencies: &chunk.rendered_dependencies,
            exports: &chunk.rendered_exports,
            has_exports,
            addons,
            is_entry_facade: chunk.is_facade_chunk(),
            named_exports_mode: chunk.export_mode != ExportMode::Default,
            uses_top_level_await: uses_tla,
            keyword: self.options.declaration_keyword(),
            variable_name: &chunk.variable_name,
        };

        let mut code = match self.options.format {
            OutputFormat::Es => finalise_es(&args),
            OutputFormat::Cjs => finalise_cjs(&args, self.options),
            OutputFormat::Amd => finalise_amd(&args),
            OutputFormat::Umd => finalise_umd(&args, self.options),
            OutputFormat::Iife => finalise_iife(&args, self.options),
            OutputFormat::System => finalise_system(&args),
        };

        code = format!("{}{}{}{}", addons.banner, addons.intro, code, addons.outro);
        code.push_str(&addons.footer);

        if let Some(hook) = render_chunk_hook {
            if let Ok(transformed) = hook(&code) {
                code = transformed;
            }
        }

        if !self.options.compact {
            code.push('\n');
        }

        let map = if self.options.sourcemap {
            Some(self.build_source_map(chunk, graph, output_dir))
        } else {
            None
        };

        chunk.phase = ChunkPhase::Rendered;
        Ok(RenderOutput { code, map })
    }

    fn finalise_dynamic_imports(
        &self,
        chunk: &Chunk,
        graph: &LinkGraph,
        chunks: &[Chunk],
        source: &str,
        strip_ext: bool,
        output_dir: &str,
    ) -> String {
        if chunk.dynamic_import_resolutions.is_empty() {
            return source.to_string();
        }
        let mut queue: std::collections::VecDeque<&(super::model::ModuleId, DynamicTarget, DynamicResolution)> =
            chunk.dynamic_import_resolutions.iter().collect();

        let mut result = String::with_capacity(source.len());
        let mut rest = source;
        while let Some(pos) = rest.find("import(") {
            result.push_str(&rest[..pos]);
            let after = &rest[pos + "import(".len()..];
            let Some(close) = find_matching_paren(after) else {
                result.push_str("import(");
                rest = after;
                continue;
            };
            let arg = after[..close].trim();
            let Some((_, target, resolution)) = queue.pop_front() else {
                result.push_str("import(");
                result.push_str(arg);
                result.push(')');
                rest = &after[close + 1..];
                continue;
            };
            let replacement = match resolution {
                DynamicResolution::Named { .. } => format!("Promise.resolve({arg})"),
                DynamicResolution::Chunk(_) => {
                    // Best-effort: point at the literal target chunk file
                    // when the target module is known and already placed.
                    if let DynamicTarget::Module(m) = target {
                        if let Some(target_chunk) = graph.module(*m).chunk {
                            let mut rel = path_util::relative_path(
                                output_dir,
                                chunks[target_chunk].file_id.as_deref().unwrap_or(""),
                            );
                            if strip_ext {
                                rel = path_util::strip_js_ext(&rel);
                            }
                            format!("import('{rel}')")
                        } else {
                            format!("import({arg})")
                        }
                    } else {
                        format!("import({arg})")
                    }
                }
                DynamicResolution::Auto => format!("import({arg})"),
            };
            result.push_str(&replacement);
            rest = &after[close + 1..];
        }
        result.push_str(rest);
        result
    }

    fn finalise_import_metas(&self, source: &str) -> String {
        let replacement = match self.options.format {
            OutputFormat::Es | OutputFormat::System => return source.to_string(),
            OutputFormat::Cjs | OutputFormat::Amd => {
                "require('url').pathToFileURL(__filename).href"
            }
            OutputFormat::Umd | OutputFormat::Iife => {
                "(document.currentScript && document.currentScript.src || new URL('', document.baseURI).href)"
            }
        };
        source.replace("import.meta.url", replacement)
    }

    fn build_source_map(&self, chunk: &Chunk, graph: &LinkGraph, output_dir: &str) -> String {
        let sources: Vec<String> = chunk
            .ordered_modules
            .iter()
            .map(|&m| path_util::relative_path(output_dir, &graph.module(m).path))
            .collect();
        let sources_json = sources
            .iter()
            .map(|s| format!("\"{}\"", s.replace('"', "\\\"")))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            r#"{{"version":3,"file":null,"sources":[{sources_json}],"names":[],"mappings":""}}"#
        )
    }
}

fn find_matching_paren(s: &str) -> Option<usize> {
    let mut depth = 1i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn export_block_es(exports: &[RenderedExport]) -> String {
    if exports.is_empty() {
        return String::new();
    }
    let specifiers: Vec<String> = exports
        .iter()
        .map(|e| {
            if let Some(expr) = &e.expression {
                format!("{expr} as {}", e.exported)
            } else if e.local == e.exported {
                e.local.clone()
            } else {
                format!("{} as {}", e.local, e.exported)
            }
        })
        .collect();
    format!("export {{ {} }};", specifiers.join(", "))
}

fn import_block_es(dep: &super::chunk_entity::DependencyDeclaration) -> String {
    let id = dep.id.clone().unwrap_or_default();
    let mut pieces = Vec::new();
    let default_name = dep.imports.iter().find(|s| s.imported == "default").map(|s| s.local.clone());
    let named: Vec<String> = dep
        .imports
        .iter()
        .filter(|s| s.imported != "default" && s.imported != "*")
        .map(|s| {
            if s.imported == s.local {
                s.local.clone()
            } else {
                format!("{} as {}", s.imported, s.local)
            }
        })
        .collect();
    let namespace = dep.imports.iter().find(|s| s.imported == "*").map(|s| s.local.clone());

    if let Some(ns) = namespace {
        pieces.push(format!("* as {ns}"));
    }
    if let Some(d) = default_name {
        pieces.push(d);
    }
    if !named.is_empty() {
        pieces.push(format!("{{ {} }}", named.join(", ")));
    }
    if pieces.is_empty() && dep.reexports.is_empty() {
        return format!("import '{id}';");
    }
    if pieces.is_empty() {
        String::new()
    } else {
        format!("import {} from '{id}';", pieces.join(", "))
    }
}

fn reexport_block_es(dep: &super::chunk_entity::DependencyDeclaration) -> String {
    if dep.reexports.is_empty() {
        return String::new();
    }
    let id = dep.id.clone().unwrap_or_default();
    if dep.reexports.iter().any(|r| r.is_star) {
        return format!("export * from '{id}';");
    }
    let specifiers: Vec<String> = dep
        .reexports
        .iter()
        .map(|r| {
            if r.imported == r.reexported {
                r.imported.clone()
            } else {
                format!("{} as {}", r.imported, r.reexported)
            }
        })
        .collect();
    format!("export {{ {} }} from '{id}';", specifiers.join(", "))
}

fn finalise_es(args: &FinaliseArgs) -> String {
    let mut lines = Vec::new();
    for dep in args.dependencies {
        let imp = import_block_es(dep);
        if !imp.is_empty() {
            lines.push(imp);
        }
        let reexp = reexport_block_es(dep);
        if !reexp.is_empty() {
            lines.push(reexp);
        }
    }
    if !lines.is_empty() {
        lines.push(String::new());
    }
    let mut body = lines.join("\n");
    body.push_str(args.source);
    let export_block = export_block_es(args.exports);
    if !export_block.is_empty() {
        if !body.is_empty() && !body.ends_with('\n') {
            body.push_str("\n\n");
        }
        body.push_str(&export_block);
    }
    body
}

fn finalise_cjs(args: &FinaliseArgs, options: &ChunkOutputOptions) -> String {
    let mut out = String::new();
    out.push_str("'use strict';\n\n");
    for dep in args.dependencies {
        let id = dep.id.clone().unwrap_or_default();
        let interop_needed = options.interop && dep.exports_default && !dep.named_exports_mode;
        for spec in &dep.imports {
            if spec.imported == "default" && interop_needed {
                out.push_str(&format!(
                    "{} {} = _interopDefault(require('{id}'));\n",
                    args.keyword, spec.local
                ));
            } else if spec.imported == "*" {
                out.push_str(&format!("{} {} = require('{id}');\n", args.keyword, spec.local));
            } else {
                out.push_str(&format!(
                    "{} {} = require('{id}').{};\n",
                    args.keyword, spec.local, spec.imported
                ));
            }
        }
        if dep.imports.is_empty() {
            out.push_str(&format!("require('{id}');\n"));
        }
    }
    out.push('\n');
    out.push_str(args.source);
    if args.has_exports {
        out.push_str("\n\n");
        out.push_str("Object.defineProperty(exports, '__esModule', { value: true });\n");
        for export in args.exports {
            let value = export.expression.as_deref().unwrap_or(&export.local);
            out.push_str(&format!(
                "Object.defineProperty(exports, '{}', {{ enumerable: true, get: function () {{ return {}; }} }});\n",
                export.exported, value
            ));
        }
        for dep in args.dependencies {
            let id = dep.id.clone().unwrap_or_default();
            for reexport in &dep.reexports {
                if reexport.is_star {
                    out.push_str(&format!(
                        "Object.keys(require('{id}')).forEach(function (k) {{ if (k !== 'default' && !exports.hasOwnProperty(k)) exports[k] = require('{id}')[k]; }});\n"
                    ));
                } else if reexport.needs_live_binding {
                    out.push_str(&format!(
                        "Object.defineProperty(exports, '{}', {{ enumerable: true, get: function () {{ return require('{id}').{}; }} }});\n",
                        reexport.reexported, reexport.imported
                    ));
                } else {
                    out.push_str(&format!(
                        "exports.{} = require('{id}').{};\n",
                        reexport.reexported, reexport.imported
                    ));
                }
            }
        }
    }
    out
}

fn finalise_amd(args: &FinaliseArgs) -> String {
    let dep_ids: Vec<String> = args.dependencies.iter().filter_map(|d| d.id.clone()).map(|id| format!("'{id}'")).collect();
    let dep_params: Vec<&str> = args
        .dependencies
        .iter()
        .flat_map(|d| d.imports.iter().map(|s| s.local.as_str()))
        .collect();
    let factory_params = dep_params.join(", ");
    let deps_str = if dep_ids.is_empty() { String::new() } else { format!("[{}], ", dep_ids.join(", ")) };
    let export_lines = if args.has_exports {
        args.exports
            .iter()
            .map(|e| format!("exports.{} = {};", e.exported, e.expression.as_deref().unwrap_or(&e.local)))
            .collect::<Vec<_>>()
            .join("\n")
    } else {
        String::new()
    };
    format!(
        "define({deps_str}(function ({factory_params}) {{ 'use strict';\n\n{}\n\n{export_lines}\n\n}}));",
        args.source
    )
}

fn finalise_umd(args: &FinaliseArgs, options: &ChunkOutputOptions) -> String {
    let global_deps: Vec<String> = args
        .dependencies
        .iter()
        .map(|d| d.global_name.clone().unwrap_or_else(|| "undefined".to_string()))
        .collect();
    let amd_ids: Vec<String> = args.dependencies.iter().filter_map(|d| d.id.clone()).map(|id| format!("'{id}'")).collect();
    let cjs_requires: Vec<String> = args.dependencies.iter().filter_map(|d| d.id.clone()).map(|id| format!("require('{id}')")).collect();
    let factory_params: Vec<&str> = args
        .dependencies
        .iter()
        .flat_map(|d| d.imports.iter().map(|s| s.local.as_str()))
        .collect();
    let variable_name = args.variable_name;
    let _ = options;
    format!(
        "(function (global, factory) {{\n\
\ttypeof exports === 'object' && typeof module !== 'undefined' ? factory({cjs}) :\n\
\ttypeof define === 'function' && define.amd ? define([{amd}], factory) :\n\
\t(global = typeof globalThis !== 'undefined' ? globalThis : global || self, factory({globals_access}));\n\
}})(this, (function ({params}) {{ 'use strict';\n\n{body}\n\n{exports}\n\n}}));",
        cjs = cjs_requires.join(", "),
        amd = amd_ids.join(", "),
        globals_access = global_deps.iter().map(|g| format!("global.{g}")).collect::<Vec<_>>().join(", "),
        params = factory_params.join(", "),
        body = args.source,
        exports = args
            .exports
            .iter()
            .map(|e| format!("global.{variable_name} = global.{variable_name} || {{}};\nglobal.{variable_name}.{} = {};", e.exported, e.expression.as_deref().unwrap_or(&e.local)))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

fn finalise_iife(args: &FinaliseArgs, options: &ChunkOutputOptions) -> String {
    let global_deps: Vec<String> = args
        .dependencies
        .iter()
        .map(|d| d.global_name.clone().unwrap_or_else(|| "undefined".to_string()))
        .collect();
    let factory_params: Vec<&str> = args
        .dependencies
        .iter()
        .flat_map(|d| d.imports.iter().map(|s| s.local.as_str()))
        .collect();
    let variable_name = args.variable_name;
    let assignment = if args.is_entry_facade && args.has_exports {
        format!(
            "var {variable_name} = (function ({}) {{ 'use strict';\n\n{}\n\nreturn {{ {} }};\n\n}}({}));",
            factory_params.join(", "),
            args.source,
            args.exports
                .iter()
                .map(|e| format!("{}: {}", e.exported, e.expression.as_deref().unwrap_or(&e.local)))
                .collect::<Vec<_>>()
                .join(", "),
            global_deps.join(", "),
        )
    } else {
        format!(
            "(function ({}) {{ 'use strict';\n\n{}\n\n}}({}));",
            factory_params.join(", "),
            args.source,
            global_deps.join(", "),
        )
    };
    let _ = options;
    assignment
}

fn finalise_system(args: &FinaliseArgs) -> String {
    let dep_ids: Vec<String> = args.dependencies.iter().filter_map(|d| d.id.clone()).map(|id| format!("'{id}'")).collect();
    let setters: Vec<String> = args
        .dependencies
        .iter()
        .map(|d| {
            let assignments: Vec<String> = d
                .imports
                .iter()
                .map(|s| format!("{} = module.{};", s.local, s.imported))
                .collect();
            format!("function (module) {{ {} }}", assignments.join(" "))
        })
        .collect();
    let export_call = if args.has_exports {
        format!(
            "exports({{ {} }});",
            args.exports
                .iter()
                .map(|e| format!("{}: {}", e.exported, e.expression.as_deref().unwrap_or(&e.local)))
                .collect::<Vec<_>>()
                .join(", ")
        )
    } else {
        String::new()
    };
    let exec_prefix = if args.uses_top_level_await { "async " } else { "" };
    format!(
        "System.register([{deps}], (function (exports) {{\n\
\t'use strict';\n\
\treturn {{\n\
\t\tsetters: [{setters}],\n\
\t\texecute: ({exec_prefix}function () {{\n\
\t\t\t{export_call}\n\
\t\t\t{}\n\
\t\t}})\n\
\t}};\n\
}}));",
        args.source,
        deps = dep_ids.join(", "),
        setters = setters.join(", "),
    )
}
