//! Module discovery and the file-level dependency graph.
//!
//! Depth-first discovery from the entry file. Each newly found module is
//! read, run through `define` substitution, split into surface declarations
//! and cleaned source, parsed, and appended to the ordered module list
//! before its own imports are followed, so `file_seq` reflects discovery
//! order and the entry module is always first.

use anyhow::{Context, Result};
use cow_utils::CowUtils;
use indexmap::{IndexMap, IndexSet};
use log::{debug, info};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use rustc_hash::FxHashMap;
use std::fs;
use std::path::Path;

use crate::ast::Block;
use crate::extractor::{self, ExportDecl, ImportDecl};
use crate::parser;
use crate::resolver::{self, PathResolver, ResolvedModule};

#[derive(Debug)]
pub struct Module {
    /// Canonical normalised path; the primary identifier.
    pub key: String,
    /// Basename, used as a prefix in synthetic statement ids.
    pub display_name: String,
    /// Canonical directory its relative imports resolve against.
    pub directory: String,
    pub imports: Vec<ImportDecl>,
    /// Resolved module key per import declaration, parallel to `imports`.
    pub import_keys: Vec<String>,
    pub exports: Vec<ExportDecl>,
    /// Top-level statements of the cleaned source.
    pub body: Block,
    /// 1-based discovery index; the entry module is 1.
    pub file_seq: usize,
    pub is_entry: bool,
}

impl Module {
    /// All exported names in declaration order.
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.exports
            .iter()
            .flat_map(|decl| decl.names.iter().map(String::as_str))
    }
}

#[derive(Debug)]
pub struct ModuleGraph {
    pub modules: Vec<Module>,
    key_index: FxHashMap<String, usize>,
}

impl ModuleGraph {
    pub fn get(&self, key: &str) -> Option<&Module> {
        self.key_index.get(key).map(|&idx| &self.modules[idx])
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.key_index.get(key).copied()
    }

    pub fn entry(&self) -> &Module {
        &self.modules[0]
    }

    /// Indices of the imported (non-entry) modules whose exports `idx`
    /// directly imports. Self-edges are kept so a self-import shows up as a
    /// cycle.
    pub fn imported_deps(&self, idx: usize) -> IndexSet<usize> {
        let mut deps = IndexSet::new();
        for key in &self.modules[idx].import_keys {
            if let Some(&target) = self.key_index.get(key.as_str()) {
                if !self.modules[target].is_entry {
                    deps.insert(target);
                }
            }
        }
        deps
    }

    /// Modules participating in any file-level import cycle. The entry
    /// module is not part of the file-level graph.
    pub fn circular_modules(&self) -> IndexSet<usize> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut nodes: FxHashMap<usize, NodeIndex> = FxHashMap::default();
        for (idx, module) in self.modules.iter().enumerate() {
            if !module.is_entry {
                nodes.insert(idx, graph.add_node(idx));
            }
        }
        for (&idx, &node) in &nodes {
            for dep in self.imported_deps(idx) {
                if let Some(&dep_node) = nodes.get(&dep) {
                    graph.add_edge(node, dep_node, ());
                }
            }
        }

        let mut circular = IndexSet::new();
        for component in tarjan_scc(&graph) {
            let in_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.contains_edge(n, n));
            if in_cycle {
                for node in component {
                    circular.insert(graph[node]);
                }
            }
        }
        // Deterministic order regardless of SCC traversal order.
        circular.sort();
        circular
    }
}

/// Discover every module reachable from the entry file.
pub fn discover(entry_path: &Path, defines: &IndexMap<String, String>) -> Result<ModuleGraph> {
    let entry_dir = entry_path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let resolver = PathResolver::new(&entry_dir);
    let entry = resolver.resolve_entry(entry_path)?;
    info!("entry module: {}", entry.key);

    let mut graph = ModuleGraph {
        modules: Vec::new(),
        key_index: FxHashMap::default(),
    };
    load_module(&mut graph, &resolver, defines, entry, true)?;
    info!("discovered {} modules", graph.modules.len());
    Ok(graph)
}

fn load_module(
    graph: &mut ModuleGraph,
    resolver: &PathResolver,
    defines: &IndexMap<String, String>,
    resolved: ResolvedModule,
    is_entry: bool,
) -> Result<()> {
    if graph.key_index.contains_key(&resolved.key) {
        return Ok(());
    }
    debug!("loading module {}", resolved.key);

    let raw = fs::read_to_string(&resolved.path)
        .with_context(|| format!("{}: failed to read module source", resolved.key))?;
    let mut src = normalize_line_endings(raw);
    if is_entry {
        src = strip_shebang(src);
    }
    let src = apply_defines(&src, defines);

    let extracted = extractor::extract(&src)
        .with_context(|| format!("{}: invalid import/export syntax", resolved.key))?;
    let body = parser::parse(&extracted.cleaned_src)
        .with_context(|| format!("{}: failed to parse module", resolved.key))?;

    let idx = graph.modules.len();
    graph.key_index.insert(resolved.key.clone(), idx);
    graph.modules.push(Module {
        display_name: resolver::display_name(&resolved.key),
        directory: resolved.directory.clone(),
        imports: extracted.imports,
        import_keys: Vec::new(),
        exports: extracted.exports,
        body,
        file_seq: idx + 1,
        is_entry,
        key: resolved.key.clone(),
    });

    for decl_idx in 0..graph.modules[idx].imports.len() {
        let specifier = graph.modules[idx].imports[decl_idx].source_specifier.clone();
        let target = resolver
            .resolve(&specifier, &resolved.directory)
            .with_context(|| format!("in module {}", resolved.key))?;
        graph.modules[idx].import_keys.push(target.key.clone());
        load_module(graph, resolver, defines, target, false)?;
    }
    Ok(())
}

/// Literal string-for-string substitution of each defined name, before any
/// parsing. Replacements can change token structure; that hazard is the
/// caller's to manage.
pub fn apply_defines(src: &str, defines: &IndexMap<String, String>) -> String {
    let mut out = src.to_string();
    for (name, value) in defines {
        out = out.cow_replace(name.as_str(), value.as_str()).into_owned();
    }
    out
}

/// CRLF and bare CR both become LF so bundles are identical across
/// platforms.
fn normalize_line_endings(content: String) -> String {
    content
        .cow_replace("\r\n", "\n")
        .cow_replace('\r', "\n")
        .into_owned()
}

/// Blank a leading `#!` line, keeping byte positions intact.
fn strip_shebang(src: String) -> String {
    if !src.starts_with('#') {
        return src;
    }
    let line_end = src.find('\n').unwrap_or(src.len());
    let mut bytes = src.into_bytes();
    for byte in &mut bytes[..line_end] {
        *byte = b' ';
    }
    String::from_utf8(bytes).expect("shebang line was ascii")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discovery_order_and_file_seq() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "main.lua", "import a from \"./a\"\nimport b from \"./b\"\nprint(a, b)\n");
        write(dir, "a.lua", "import c from \"./c\"\nexport local a = c + 1\n");
        write(dir, "b.lua", "export local b = 2\n");
        write(dir, "c.lua", "export local c = 3\n");

        let graph = discover(&dir.join("main.lua"), &IndexMap::new()).unwrap();
        let names: Vec<_> = graph.modules.iter().map(|m| m.display_name.clone()).collect();
        // Depth-first: main, a, then a's dep c, then b.
        assert_eq!(names, vec!["main", "a", "c", "b"]);
        let seqs: Vec<_> = graph.modules.iter().map(|m| m.file_seq).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(graph.modules[0].is_entry);
        assert!(!graph.modules[1].is_entry);
    }

    #[test]
    fn test_unresolved_import_names_the_importer() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "main.lua", "import gone from \"./missing\"\nprint(gone)\n");

        let err = discover(&dir.join("main.lua"), &IndexMap::new()).unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("unresolved import"), "{}", message);
        assert!(message.contains("main.lua"), "{}", message);
    }

    #[test]
    fn test_defines_applied_before_parsing() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "main.lua", "local level = LOG_LEVEL\nprint(level)\n");

        let mut defines = IndexMap::new();
        defines.insert("LOG_LEVEL".to_string(), "3".to_string());
        let graph = discover(&dir.join("main.lua"), &defines).unwrap();
        assert_eq!(
            crate::emit::format_beautiful(&graph.modules[0].body),
            "local level = 3\nprint(level)\n"
        );
    }

    #[test]
    fn test_circular_modules_detected() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "main.lua", "import ping from \"./a\"\nprint(ping())\n");
        write(
            dir,
            "a.lua",
            "import pong from \"./b\"\nexport local function ping() return pong end\n",
        );
        write(
            dir,
            "b.lua",
            "import ping from \"./a\"\nexport local function pong() return ping end\n",
        );
        write(dir, "c.lua", "export local lone = 1\n");

        let graph = discover(&dir.join("main.lua"), &IndexMap::new()).unwrap();
        let circular = graph.circular_modules();
        let names: Vec<_> = circular
            .iter()
            .map(|&idx| graph.modules[idx].display_name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_shebang_stripped_from_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        write(dir, "main.lua", "#!/usr/bin/env lua\nprint(\"ok\")\n");

        let graph = discover(&dir.join("main.lua"), &IndexMap::new()).unwrap();
        assert_eq!(graph.modules[0].body.len(), 1);
    }
}
