//! Security gate: filesystem allowlists and the evaluate origin gate
//!
//! Read paths must resolve, after symlink resolution, under the input,
//! output, or log directory. Write paths are limited to the output and log
//! directories. Arbitrary-script execution is disabled unless configured,
//! and then only for frames whose origin matches the allowlist.

use std::path::{Path, PathBuf};

use url::Url;

use crate::envelope::error::ToolError;

/// Execution-time budget for one `browser.evaluate` invocation.
pub const EVALUATE_TIME_BUDGET_MS: u64 = 5_000;

/// Output-byte budget for one `browser.evaluate` invocation.
pub const EVALUATE_OUTPUT_BUDGET_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone)]
pub struct SecurityGate {
    read_roots: Vec<PathBuf>,
    write_roots: Vec<PathBuf>,
    allow_evaluate: bool,
    evaluate_origins: Vec<String>,
}

impl SecurityGate {
    /// Build the gate from configured directories. The output and log
    /// directories are both readable and writable; the input directory is
    /// read-only.
    pub fn new(
        input_dir: &Path,
        output_dir: &Path,
        log_dir: &Path,
        allow_evaluate: bool,
        evaluate_origins: Vec<String>,
    ) -> Self {
        Self {
            read_roots: vec![input_dir.to_path_buf(), output_dir.to_path_buf(), log_dir.to_path_buf()],
            write_roots: vec![output_dir.to_path_buf(), log_dir.to_path_buf()],
            allow_evaluate,
            evaluate_origins,
        }
    }

    /// Validate a read path. Returns the resolved absolute path.
    pub fn resolve_read(&self, path: &Path) -> Result<PathBuf, ToolError> {
        resolve_under(path, &self.read_roots, "read")
    }

    /// Validate a write path. The file itself need not exist, but its
    /// parent directory must resolve under a write root.
    pub fn resolve_write(&self, path: &Path) -> Result<PathBuf, ToolError> {
        resolve_under(path, &self.write_roots, "write")
    }

    pub fn evaluate_enabled(&self) -> bool {
        self.allow_evaluate
    }

    /// Check a frame origin against the evaluate allowlist.
    ///
    /// Accepts the literal `*` or an exact `scheme://host[:port]` match.
    pub fn check_evaluate_origin(&self, frame_url: &str) -> Result<(), ToolError> {
        if !self.allow_evaluate {
            return Err(ToolError::permission(
                "script execution is disabled; set ALLOW_EVALUATE=true to enable it",
            ));
        }
        let origin = origin_of(frame_url).ok_or_else(|| {
            ToolError::permission(format!("cannot determine origin of frame url '{frame_url}'"))
        })?;
        let allowed = self
            .evaluate_origins
            .iter()
            .any(|entry| entry == "*" || entry.trim_end_matches('/') == origin);
        if allowed {
            Ok(())
        } else {
            Err(ToolError::permission(format!(
                "origin is not allowed for script execution: {origin}"
            )))
        }
    }
}

/// Extract `scheme://host[:port]` (default ports elided) from a URL.
pub fn origin_of(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{}://{}:{}", url.scheme(), host, port)),
        None => Some(format!("{}://{}", url.scheme(), host)),
    }
}

/// Canonicalize `path` and require the result to live under one of `roots`.
///
/// For not-yet-existing files the deepest existing ancestor is
/// canonicalized and the remaining components are re-applied, so a
/// `..`-laden path cannot escape by naming a file that does not exist yet.
fn resolve_under(path: &Path, roots: &[PathBuf], mode: &str) -> Result<PathBuf, ToolError> {
    let resolved = canonicalize_lenient(path)
        .map_err(|e| ToolError::permission(format!("cannot resolve {mode} path '{}': {e}", path.display())))?;

    for root in roots {
        if let Ok(root) = canonicalize_lenient(root) {
            if resolved.starts_with(&root) {
                return Ok(resolved);
            }
        }
    }
    Err(ToolError::permission(format!(
        "{mode} path '{}' is outside the allowed directories",
        path.display()
    )))
}

fn canonicalize_lenient(path: &Path) -> std::io::Result<PathBuf> {
    if let Ok(real) = path.canonicalize() {
        return Ok(real);
    }
    // Walk up to the deepest existing ancestor, canonicalize it, then
    // re-append the missing tail. Rejects tails that still contain `..`.
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no existing ancestor",
                ));
            }
        }
    }
    let mut real = existing.canonicalize()?;
    for part in tail.iter().rev() {
        if part == ".." || part == "." {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "path traversal in non-existent segment",
            ));
        }
        real.push(part);
    }
    Ok(real)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(root: &Path) -> SecurityGate {
        let input = root.join("input");
        let output = root.join("output");
        let logs = root.join("logs");
        for d in [&input, &output, &logs] {
            std::fs::create_dir_all(d).unwrap();
        }
        SecurityGate::new(&input, &output, &logs, true, vec!["https://example.com".into()])
    }

    #[test]
    fn write_inside_output_is_allowed() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = gate(tmp.path());
        let target = tmp.path().join("output/report.txt");
        assert!(gate.resolve_write(&target).is_ok());
    }

    #[test]
    fn write_into_input_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = gate(tmp.path());
        let target = tmp.path().join("input/overwrite.txt");
        let err = gate.resolve_write(&target).unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::Permission);
    }

    #[test]
    fn traversal_out_of_root_is_denied() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = gate(tmp.path());
        let sneaky = tmp.path().join("output/../outside.txt");
        assert!(gate.resolve_write(&sneaky).is_err());
        let deep = tmp.path().join("output/missing/../../outside.txt");
        assert!(gate.resolve_write(&deep).is_err());
    }

    #[test]
    fn read_allows_all_three_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = gate(tmp.path());
        std::fs::write(tmp.path().join("input/seed.json"), b"{}").unwrap();
        assert!(gate.resolve_read(&tmp.path().join("input/seed.json")).is_ok());
        assert!(gate.resolve_read(&tmp.path().join("logs/session.log")).is_ok());
    }

    #[test]
    fn evaluate_origin_exact_and_wildcard() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = gate(tmp.path());
        assert!(gate.check_evaluate_origin("https://example.com/page?q=1").is_ok());
        assert!(gate.check_evaluate_origin("https://evil.example.net/").is_err());

        let wild = SecurityGate::new(
            &tmp.path().join("input"),
            &tmp.path().join("output"),
            &tmp.path().join("logs"),
            true,
            vec!["*".into()],
        );
        assert!(wild.check_evaluate_origin("https://anything.test/").is_ok());
    }

    #[test]
    fn evaluate_disabled_is_permission_error() {
        let tmp = tempfile::tempdir().unwrap();
        let gate = SecurityGate::new(
            &tmp.path().join("input"),
            &tmp.path().join("output"),
            &tmp.path().join("logs"),
            false,
            vec!["*".into()],
        );
        let err = gate.check_evaluate_origin("https://example.com/").unwrap_err();
        assert_eq!(err.code(), crate::envelope::error::ErrorCode::Permission);
    }

    #[test]
    fn origin_keeps_explicit_port() {
        assert_eq!(origin_of("http://localhost:8080/x").as_deref(), Some("http://localhost:8080"));
        assert_eq!(origin_of("https://example.com/x").as_deref(), Some("https://example.com"));
    }
}
