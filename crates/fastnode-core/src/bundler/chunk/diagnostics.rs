//! Diagnostic taxonomy for the chunk assembly core.
//!
//! Warnings funnel through a caller-supplied sink and never abort the
//! pipeline; fatal diagnostics are returned as an error the caller must
//! surface. Mirrors the split `error.rs` (crate-level `thiserror` enum) vs.
//! `bundler::BundleError` (subsystem-local plain struct) convention already
//! used elsewhere in this crate: the chunk core is a library seam, so it
//! gets its own small error type rather than folding into `crate::Error`.

use std::fmt;

/// A non-fatal diagnostic, funnelled through [`WarnSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `umd`/`iife` external has exports but no `globals` mapping entry;
    /// the finaliser falls back to a best-effort guess.
    MissingGlobalName { external_id: String, guess: String },
    /// A signature-preserving entry module could not reuse its code chunk
    /// as its own facade (disjoint exposed set), so an empty facade chunk
    /// with no module body was generated instead.
    EmptyFacade { module_id: String },
    /// A chunk rendered with no included modules, no exports and no
    /// dependencies.
    EmptyBundle { chunk_name: String },
    /// An option combination that the finaliser ignores rather than
    /// honouring, e.g. `dynamicImportFunction` with a non-`es` format.
    InvalidOption { message: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::MissingGlobalName { external_id, guess } => write!(
                f,
                "MISSING_GLOBAL_NAME: no `globals` entry for external '{external_id}', guessing '{guess}'"
            ),
            Diagnostic::EmptyFacade { module_id } => write!(
                f,
                "EMPTY_FACADE: entry module '{module_id}' could not reuse its chunk as a signature-preserving facade"
            ),
            Diagnostic::EmptyBundle { chunk_name } => {
                write!(f, "EMPTY_BUNDLE: chunk '{chunk_name}' has no modules, exports or dependencies")
            }
            Diagnostic::InvalidOption { message } => write!(f, "INVALID_OPTION: {message}"),
        }
    }
}

/// Accumulates warnings emitted during `preRender`/`render`. The graph
/// layer owns the sink in the real pipeline; tests use a plain `Vec`.
pub trait WarnSink {
    fn warn(&mut self, diagnostic: Diagnostic);
}

impl WarnSink for Vec<Diagnostic> {
    fn warn(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Fatal conditions the core can raise. Unlike [`Diagnostic`], these abort
/// the current chunk's render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    /// A module uses top-level await but the target format cannot express
    /// it (anything but `es`/`system`).
    InvalidTlaFormat { format: &'static str },
    /// `getVariableExportName` was asked about a variable this chunk never
    /// exported — an internal-consistency bug, not a user error.
    InternalMissingExportName { variable_name: String },
}

impl fmt::Display for ChunkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkError::InvalidTlaFormat { format } => write!(
                f,
                "INVALID_TLA_FORMAT: top-level await is not supported for output format '{format}'"
            ),
            ChunkError::InternalMissingExportName { variable_name } => write!(
                f,
                "internal error: no export name recorded for variable '{variable_name}'"
            ),
        }
    }
}

impl std::error::Error for ChunkError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warn_sink_accumulates_into_a_vec() {
        let mut sink: Vec<Diagnostic> = Vec::new();
        sink.warn(Diagnostic::EmptyBundle {
            chunk_name: "chunk-a".into(),
        });
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn tla_format_error_displays_format_name() {
        let err = ChunkError::InvalidTlaFormat { format: "cjs" };
        assert!(err.to_string().contains("cjs"));
    }
}
