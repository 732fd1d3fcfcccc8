//! Path resolution for import specifiers.
//!
//! A specifier plus the importing module's directory map to a canonical
//! module key, and a fixed candidate list locates the file on disk. The
//! canonical key doubles as the module's identity everywhere else in the
//! bundler.

use anyhow::{Result, anyhow};
use std::path::{Path, PathBuf};

/// The two accepted source extensions. Both dialects parse with the same
/// grammar; the pair is fixed so candidate probing stays stable.
pub const PRIMARY_EXT: &str = "lua";
pub const SECONDARY_EXT: &str = "luau";

#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// Canonical normalised path; the module's primary identifier.
    pub key: String,
    /// Same path, for file-system access.
    pub path: PathBuf,
    /// Canonical directory the module resolves its own imports against.
    pub directory: String,
}

#[derive(Debug)]
pub struct PathResolver {
    /// Entry directory; `@/` specifiers resolve against this.
    root: String,
}

impl PathResolver {
    pub fn new(root: &str) -> Self {
        Self {
            root: normalize_path(root),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Resolve the entry file itself. The entry must name an existing file
    /// directly; candidate probing applies only to imports.
    pub fn resolve_entry(&self, entry_path: &Path) -> Result<ResolvedModule> {
        let key = normalize_path(&entry_path.to_string_lossy());
        if !entry_path.is_file() {
            return Err(anyhow!("entry file not found: {}", key));
        }
        Ok(make_resolved(key))
    }

    /// Map a specifier plus the importing module's directory to a module on
    /// disk.
    pub fn resolve(&self, specifier: &str, importer_dir: &str) -> Result<ResolvedModule> {
        let joined = if let Some(rest) = specifier.strip_prefix("@/") {
            join(&self.root, rest)
        } else if let Some(rest) = specifier.strip_prefix("./") {
            join(importer_dir, rest)
        } else {
            // `../` specifiers keep their parent hops; bare specifiers are
            // plain relatives. Both resolve against the importer.
            join(importer_dir, specifier)
        };
        let base = normalize_path(&joined);

        for candidate in candidates(&base) {
            let path = PathBuf::from(&candidate);
            if path.is_file() {
                log::debug!("resolved '{}' -> {}", specifier, candidate);
                return Ok(make_resolved(candidate));
            }
        }
        Err(anyhow!("unresolved import '{}'", specifier))
    }
}

fn make_resolved(key: String) -> ResolvedModule {
    let directory = parent_dir(&key);
    ResolvedModule {
        path: PathBuf::from(&key),
        directory,
        key,
    }
}

/// The fixed candidate list: the path itself, then each extension, then the
/// `init` file of a directory with each extension.
fn candidates(base: &str) -> [String; 5] {
    [
        base.to_string(),
        format!("{}.{}", base, PRIMARY_EXT),
        format!("{}.{}", base, SECONDARY_EXT),
        format!("{}/init.{}", base, PRIMARY_EXT),
        format!("{}/init.{}", base, SECONDARY_EXT),
    ]
}

fn join(dir: &str, rest: &str) -> String {
    if dir.is_empty() {
        rest.to_string()
    } else {
        format!("{}/{}", dir, rest)
    }
}

/// The directory part of a normalised key; empty for a bare file name.
pub fn parent_dir(key: &str) -> String {
    match key.rfind('/') {
        Some(0) => "/".to_string(),
        Some(pos) => key[..pos].to_string(),
        None => String::new(),
    }
}

/// The file stem used as the module's display name.
pub fn display_name(key: &str) -> String {
    let file = key.rsplit('/').next().unwrap_or(key);
    match file.rfind('.') {
        Some(pos) if pos > 0 => file[..pos].to_string(),
        _ => file.to_string(),
    }
}

/// Canonicalise a path string: forward slashes only, no doubled or trailing
/// separators, `.` dropped and `..` cancelled segment-wise. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let forward = path.replace('\\', "/");
    let absolute = forward.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in forward.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(&last) if last != "..") {
                    segments.pop();
                } else if !absolute {
                    // Above a relative root; the hop has to stay.
                    segments.push("..");
                }
            }
            _ => segments.push(segment),
        }
    }
    let mut joined = segments.join("/");
    if absolute {
        joined.insert(0, '/');
    }
    if joined.is_empty() {
        if absolute { "/".to_string() } else { ".".to_string() }
    } else {
        joined
    }
}
