//! `generateId` / `generateIdPreserveModules`.

use rustc_hash::FxHashSet as HashSet;

use super::chunk_entity::Chunk;
use super::model::LinkGraph;
use super::name_allocator::NameAllocator;
use super::options::{substitute_pattern, ChunkOutputOptions};
use super::path_util;

/// Picks `entryFileNames` for a chunk that is itself (or hosts) a
/// user-defined entry point with no manual chunk alias, `chunkFileNames`
/// otherwise, so only explicit, user-authored entries get the "clean"
/// name pattern.
#[must_use]
fn pattern_for<'a>(chunk: &Chunk, graph: &LinkGraph, options: &'a ChunkOutputOptions) -> &'a str {
    let is_user_entry_facade = chunk.facade_module.is_some_and(|m| graph.module(m).is_user_defined_entry_point)
        || chunk
            .entry_modules
            .iter()
            .any(|&m| graph.module(m).is_user_defined_entry_point);
    if is_user_entry_facade {
        &options.entry_file_names
    } else {
        &options.chunk_file_names
    }
}

/// Ordinary (non-preserve-modules) id assignment.
///
/// `hash_of` computes the content hash on demand so the caller controls
/// exactly when the (possibly expensive, dependency-closure-walking) hash
/// is evaluated; it is skipped entirely when `include_hash` is false.
pub fn generate_id(
    chunk: &Chunk,
    graph: &LinkGraph,
    options: &ChunkOutputOptions,
    existing_names: &HashSet<String>,
    include_hash: bool,
    hash_of: impl FnOnce() -> String,
) -> String {
    let pattern = pattern_for(chunk, graph, options);
    let name = if chunk.name.is_empty() { &chunk.variable_name } else { &chunk.name };
    let hash = if include_hash && pattern.contains("[hash]") {
        Some(hash_of())
    } else {
        None
    };
    let candidate = substitute_pattern(pattern, name, hash.as_deref(), options.format, None, None);
    NameAllocator::make_unique(&candidate, existing_names)
}

/// `preserveModules` id derivation: the filename tracks the source module's
/// own path rather than a chunk name/hash pattern.
pub fn generate_id_preserve_modules(
    module_path: &str,
    base: &str,
    options: &ChunkOutputOptions,
    existing_names: &HashSet<String>,
) -> String {
    let candidate = if module_path.starts_with('\0') {
        // Virtual module id: no real filesystem location to relativise
        // against, so it's namespaced under `_virtual/` instead.
        let basename = path_util::file_stem(module_path.trim_start_matches('\0'));
        format!("_virtual/{}", path_util::normalize(&basename))
    } else if std::path::Path::new(module_path).is_absolute() {
        let ext = path_util::extension(module_path);
        let name = path_util::file_stem(module_path);
        let pattern: &str = if !options.entry_file_names.is_empty() && options.entry_file_names != "[name].js" {
            &options.entry_file_names
        } else if path_util::is_recognised_js_extension(&ext) {
            "[name].js"
        } else {
            "[name][extname].js"
        };
        let extname = if ext.is_empty() { String::new() } else { format!(".{ext}") };
        let rendered = substitute_pattern(pattern, &name, None, options.format, Some(&ext), Some(&extname));
        let dir = std::path::Path::new(module_path)
            .parent()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let full = if dir.is_empty() { rendered } else { format!("{dir}/{rendered}") };
        path_util::relative_path(base, &full).trim_start_matches("./").to_string()
    } else {
        path_util::normalize(module_path)
    };
    NameAllocator::make_unique(&candidate, existing_names)
}
