//! Path relativisation and extension handling for chunk filenames.

use std::path::{Path, PathBuf};

/// Extensions treated as "recognised JS" for preserve-modules naming.
const JS_EXTENSIONS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs", "mts", "cts"];

#[must_use]
pub fn is_recognised_js_extension(ext: &str) -> bool {
    JS_EXTENSIONS.contains(&ext)
}

/// Normalise a path to forward slashes and collapse `.`/`..` components
/// without touching the filesystem.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for seg in path.replace('\\', "/").split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                if out.last().is_some_and(|s| *s != "..") {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    let mut result = out.join("/");
    if path.starts_with('/') {
        result.insert(0, '/');
    }
    result
}

/// Compute a POSIX-style relative path from `from_dir` to `to_path`, always
/// prefixed with `./` or `../` (never a bare bare-specifier-looking path),
/// matching the convention import specifiers require.
#[must_use]
pub fn relative_path(from_dir: &str, to_path: &str) -> String {
    let from = normalize(from_dir);
    let to = normalize(to_path);

    let from_parts: Vec<&str> = from.split('/').filter(|s| !s.is_empty()).collect();
    let to_parts: Vec<&str> = to.split('/').filter(|s| !s.is_empty()).collect();

    let mut common = 0;
    while common < from_parts.len()
        && common < to_parts.len().saturating_sub(1)
        && from_parts[common] == to_parts[common]
    {
        common += 1;
    }

    let up = from_parts.len() - common;
    let mut segs: Vec<String> = std::iter::repeat("..".to_string()).take(up).collect();
    segs.extend(to_parts[common..].iter().map(|s| (*s).to_string()));

    let joined = segs.join("/");
    if joined.starts_with('.') {
        joined
    } else {
        format!("./{joined}")
    }
}

/// Strip a trailing `.js`/`.mjs`/`.cjs` extension (used for AMD ids, which
/// must not carry a file extension).
#[must_use]
pub fn strip_js_ext(path: &str) -> String {
    for ext in [".mjs", ".cjs", ".js"] {
        if let Some(stripped) = path.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    path.to_string()
}

/// Get the file stem (no directories, no extension) of a path, used as the
/// `[name]` placeholder substitution.
#[must_use]
pub fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

/// Get the extension (without the leading dot), or empty string.
#[must_use]
pub fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

/// Join output-relative segments into a normalised path (used for
/// `_virtual/<basename>` construction).
#[must_use]
pub fn join(base: &str, rest: &str) -> PathBuf {
    Path::new(base).join(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_sibling_file() {
        assert_eq!(relative_path("dist", "dist/chunk-a.js"), "./chunk-a.js");
    }

    #[test]
    fn relative_path_nested_up() {
        assert_eq!(
            relative_path("dist/nested", "dist/chunk-a.js"),
            "../chunk-a.js"
        );
    }

    #[test]
    fn strip_js_ext_only_strips_known_extensions() {
        assert_eq!(strip_js_ext("foo.js"), "foo");
        assert_eq!(strip_js_ext("foo.json"), "foo.json");
    }

    #[test]
    fn normalize_collapses_dot_segments() {
        assert_eq!(normalize("a/./b/../c"), "a/c");
    }

    #[test]
    fn relative_path_against_empty_target_does_not_panic() {
        assert_eq!(relative_path("dist", ""), "..");
    }
}
