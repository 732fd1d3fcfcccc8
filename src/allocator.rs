//! Name allocation and rename planning.
//!
//! Every top-level binding in the bundle gets a globally unique identifier
//! through a stable suffix scheme: the first claim of `x` keeps `x`, later
//! claims get `x2`, `x3`, ... Exports of imported modules claim first (in
//! discovery order), then entry exports, then non-exported locals as items
//! are built. A module that uses a plain name equal to a foreign export it
//! never imported forces that export to move instead (the conflict
//! cascade), so user-visible spellings win over accidental collisions.

use anyhow::{Result, anyhow};
use indexmap::{IndexMap, IndexSet};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::Stmt;
use crate::graph::ModuleGraph;
use crate::ident_deps::{self, pure_chain};

/// Soft guard on replacement probing; exhausting it is surfaced as an
/// error rather than emitting a broken bundle.
const MAX_RENAME_PROBES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// `function f` / `local function f`
    Function,
    /// `function t.a.b` / `function t:m`
    Method,
    /// `local a, b = ...`
    LocalBinding,
    /// `t.a.b = ...`
    MemberAssignment,
    /// Anything else; carries no declared name.
    Statement,
}

/// One top-level statement of one module, the unit the orderer works with.
#[derive(Debug)]
pub struct Item {
    pub module_idx: usize,
    pub file_seq: usize,
    /// 1-based position inside the module body.
    pub stmt_seq: usize,
    pub kind: ItemKind,
    /// Original declared simple names (`Function`, `LocalBinding`).
    pub declared: Vec<String>,
    /// Original declared path (`Method`, `MemberAssignment`).
    pub declared_path: Option<(String, Vec<String>)>,
    /// Free identifiers and dotted paths the statement references.
    pub deps: IndexSet<String>,
    /// Process-wide id, `<display_name>:<stmt_seq>`.
    pub unique_id: String,
    pub stmt: Stmt,
}

/// Per-module rewrite tables consumed by the rewriter and the orderer.
#[derive(Debug, Default)]
pub struct ModuleMaps {
    /// `alias -> globally unique exporter name`.
    pub alias_map: IndexMap<String, String>,
    /// Domain of `alias_map`.
    pub alias_set: IndexSet<String>,
    /// `original name -> chosen unique name` for this module's own
    /// top-level bindings. Identity entries are kept: they stop the chain
    /// before the global fallback can misfire on the owner's own
    /// references.
    pub local_rewrite: IndexMap<String, String>,
}

impl ModuleMaps {
    /// The reference-rewrite chain: alias, then local, then the global
    /// fallback.
    pub fn resolve<'a>(&'a self, name: &'a str, global_rename: &'a IndexMap<String, String>) -> &'a str {
        if let Some(unique) = self.alias_map.get(name) {
            return unique;
        }
        if let Some(unique) = self.local_rewrite.get(name) {
            return unique;
        }
        if let Some(unique) = global_rename.get(name) {
            return unique;
        }
        name
    }
}

/// The full rename plan for one bundle invocation. Bundler-scoped, never
/// ambient.
#[derive(Debug)]
pub struct LinkPlan {
    pub items: Vec<Item>,
    /// Indexed by module index.
    pub maps: Vec<ModuleMaps>,
    /// `module key -> original export name -> unique name`.
    pub exported_unique: IndexMap<String, IndexMap<String, String>>,
    /// Fallback rewrite for non-imported, non-exported identifiers.
    pub global_rename: IndexMap<String, String>,
    pub used_names: IndexSet<String>,
    /// Final names that differ from their original spelling; the
    /// `automangle` mode shortens exactly these.
    pub synthetic_names: IndexSet<String>,
}

#[derive(Debug)]
struct MarkedExport {
    owner_idx: usize,
    original: String,
    /// True when a local declaration kept the old spelling for itself.
    kept_by_local: bool,
}

struct Allocator<'a> {
    graph: &'a ModuleGraph,
    used: IndexSet<String>,
    maps: Vec<ModuleMaps>,
    exported_unique: IndexMap<String, IndexMap<String, String>>,
    /// unique name -> owning (module, original) while the claim stands.
    export_owner: FxHashMap<String, (usize, String)>,
    marked: IndexMap<String, MarkedExport>,
    global_rename: IndexMap<String, String>,
    items: Vec<Item>,
}

/// Build the complete rename plan for the discovered module set.
pub fn plan(graph: &ModuleGraph) -> Result<LinkPlan> {
    let mut allocator = Allocator {
        graph,
        used: IndexSet::new(),
        maps: graph.modules.iter().map(|_| ModuleMaps::default()).collect(),
        exported_unique: graph
            .modules
            .iter()
            .map(|m| (m.key.clone(), IndexMap::new()))
            .collect(),
        export_owner: FxHashMap::default(),
        marked: IndexMap::new(),
        global_rename: IndexMap::new(),
        items: Vec::new(),
    };

    allocator.claim_exports();
    allocator.bind_aliases();
    allocator.build_items();
    allocator.process_marked_exports()?;

    let synthetic_names = allocator
        .maps
        .iter()
        .flat_map(|maps| {
            maps.local_rewrite
                .iter()
                .filter(|(original, unique)| original != unique)
                .map(|(_, unique)| unique.clone())
        })
        .collect();

    Ok(LinkPlan {
        items: allocator.items,
        maps: allocator.maps,
        exported_unique: allocator.exported_unique,
        global_rename: allocator.global_rename,
        used_names: allocator.used,
        synthetic_names,
    })
}

fn claim(used: &mut IndexSet<String>, base: &str) -> String {
    if used.insert(base.to_string()) {
        return base.to_string();
    }
    let mut counter = 2usize;
    loop {
        let candidate = format!("{}{}", base, counter);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        counter += 1;
    }
}

impl<'a> Allocator<'a> {
    /// Priority rule: imported modules first in discovery order, the entry
    /// module last, so an imported export keeps its spelling over a
    /// same-named entry export.
    fn claim_exports(&mut self) {
        let graph = self.graph;
        let order = graph
            .modules
            .iter()
            .enumerate()
            .filter(|(_, m)| !m.is_entry)
            .map(|(idx, _)| idx)
            .chain(
                graph
                    .modules
                    .iter()
                    .enumerate()
                    .filter(|(_, m)| m.is_entry)
                    .map(|(idx, _)| idx),
            )
            .collect::<Vec<_>>();

        for idx in order {
            let module = &graph.modules[idx];
            for name in module.export_names() {
                if self.exported_unique[&module.key].contains_key(name) {
                    continue;
                }
                let unique = claim(&mut self.used, name);
                debug!("export {}::{} -> {}", module.display_name, name, unique);
                self.maps[idx]
                    .local_rewrite
                    .insert(name.to_string(), unique.clone());
                self.export_owner.insert(unique.clone(), (idx, name.to_string()));
                self.exported_unique[&module.key].insert(name.to_string(), unique);
            }
        }
    }

    /// `import n as a from m'` binds `a` to `exported_unique[m'][n]`. A
    /// binding whose target exports no such name is dead; the alias then
    /// resolves as a plain identifier.
    fn bind_aliases(&mut self) {
        for (idx, module) in self.graph.modules.iter().enumerate() {
            for (decl, target_key) in module.imports.iter().zip(&module.import_keys) {
                for binding in &decl.bindings {
                    let unique = self
                        .exported_unique
                        .get(target_key.as_str())
                        .and_then(|exports| exports.get(binding.name.as_str()));
                    match unique {
                        Some(unique) => {
                            self.maps[idx]
                                .alias_map
                                .insert(binding.alias.clone(), unique.clone());
                            self.maps[idx].alias_set.insert(binding.alias.clone());
                        }
                        None => warn!(
                            "{}: '{}' is not exported by {}",
                            module.key, binding.name, target_key
                        ),
                    }
                }
            }
        }
    }

    fn build_items(&mut self) {
        let graph = self.graph;
        for idx in 0..graph.modules.len() {
            let module = &graph.modules[idx];
            let mut module_claimed: FxHashSet<String> = FxHashSet::default();

            for (i, stmt) in module.body.iter().enumerate() {
                let stmt_seq = i + 1;
                let (kind, declared, declared_path) = classify(stmt);

                for name in &declared {
                    self.claim_local(idx, name, &mut module_claimed);
                }

                let deps = ident_deps::statement_deps(stmt);
                self.mark_conflicts(idx, &deps);

                self.items.push(Item {
                    module_idx: idx,
                    file_seq: module.file_seq,
                    stmt_seq,
                    kind,
                    declared,
                    declared_path,
                    deps,
                    unique_id: format!("{}:{}", module.display_name, stmt_seq),
                    stmt: stmt.clone(),
                });
            }
        }
    }

    /// Claim a unique name for one non-exported top-level binding.
    fn claim_local(&mut self, idx: usize, name: &str, module_claimed: &mut FxHashSet<String>) {
        let graph = self.graph;
        let module = &graph.modules[idx];
        if self.exported_unique[&module.key].contains_key(name) {
            // The export claim already covers this declaration.
            return;
        }
        if !module_claimed.insert(name.to_string()) {
            // A second declaration of the same name reuses the first claim.
            return;
        }

        if !self.used.contains(name) {
            self.used.insert(name.to_string());
            self.maps[idx]
                .local_rewrite
                .insert(name.to_string(), name.to_string());
            return;
        }

        // The spelling is taken. If a foreign export holds it and this
        // module never imported it under that name, the local keeps the
        // spelling and the export is marked to move.
        if let Some((owner_idx, original)) = self.export_owner.remove(name) {
            let imported_here = self.maps[idx]
                .alias_map
                .get(name)
                .is_some_and(|u| u.as_str() == name);
            if owner_idx != idx && !imported_here {
                debug!(
                    "local '{}' in {} evicts export of {}",
                    name, module.display_name, graph.modules[owner_idx].display_name
                );
                self.marked.insert(
                    name.to_string(),
                    MarkedExport {
                        owner_idx,
                        original,
                        kept_by_local: true,
                    },
                );
                self.maps[idx]
                    .local_rewrite
                    .insert(name.to_string(), name.to_string());
                return;
            }
            self.export_owner.insert(name.to_string(), (owner_idx, original));
        } else if let Some(mark) = self.marked.get_mut(name) {
            if !mark.kept_by_local {
                // The export is already moving; this local takes over the
                // spelling.
                mark.kept_by_local = true;
                self.maps[idx]
                    .local_rewrite
                    .insert(name.to_string(), name.to_string());
                return;
            }
        }

        let unique = claim(&mut self.used, name);
        self.maps[idx]
            .local_rewrite
            .insert(name.to_string(), unique.clone());
        self.global_rename.insert(name.to_string(), unique);
    }

    /// Conflict-cascade marking: a dep equal to a foreign export's unique
    /// name, used without importing it, forces that export to rename.
    fn mark_conflicts(&mut self, idx: usize, deps: &IndexSet<String>) {
        for dep in deps {
            if dep.contains('.') {
                continue;
            }
            let Some((owner_idx, _)) = self.export_owner.get(dep.as_str()) else {
                continue;
            };
            if *owner_idx == idx {
                continue;
            }
            if self.maps[idx].alias_map.get(dep.as_str()).is_some_and(|u| u == dep) {
                // Legitimate use through an import of that very export.
                continue;
            }
            let (owner_idx, original) = self.export_owner.remove(dep.as_str()).expect("just seen");
            let graph = self.graph;
            debug!(
                "plain use of '{}' in {} forces export of {} to rename",
                dep, graph.modules[idx].display_name, graph.modules[owner_idx].display_name
            );
            self.marked.insert(
                dep.clone(),
                MarkedExport {
                    owner_idx,
                    original,
                    kept_by_local: false,
                },
            );
        }
    }

    /// Rename every marked export, re-checking each candidate against all
    /// recorded deps so the chase terminates on a stable assignment.
    fn process_marked_exports(&mut self) -> Result<()> {
        let marked = std::mem::take(&mut self.marked);
        for (old_unique, mark) in marked {
            let owner_key = self.graph.modules[mark.owner_idx].key.clone();
            let chosen = self.pick_replacement(&old_unique, &mark)?;

            self.used.insert(chosen.clone());
            if !mark.kept_by_local {
                self.used.shift_remove(&old_unique);
            }

            self.exported_unique[&owner_key].insert(mark.original.clone(), chosen.clone());
            self.maps[mark.owner_idx]
                .local_rewrite
                .insert(mark.original.clone(), chosen.clone());
            for maps in &mut self.maps {
                for unique in maps.alias_map.values_mut() {
                    if *unique == old_unique {
                        *unique = chosen.clone();
                    }
                }
            }
        }
        Ok(())
    }

    fn pick_replacement(&self, old_unique: &str, mark: &MarkedExport) -> Result<String> {
        let mut counter = 2usize;
        for _ in 0..MAX_RENAME_PROBES {
            let candidate = format!("{}{}", mark.original, counter);
            counter += 1;
            if self.used.contains(&candidate) {
                continue;
            }
            let clashes = self.items.iter().any(|item| {
                item.deps.contains(&candidate)
                    && !self.maps[item.module_idx]
                        .alias_map
                        .get(&candidate)
                        .is_some_and(|u| u.as_str() == old_unique)
            });
            if !clashes {
                return Ok(candidate);
            }
        }
        Err(anyhow!(
            "name exhaustion while renaming export '{}' of {}",
            mark.original,
            self.graph.modules[mark.owner_idx].key
        ))
    }
}

/// Classify one top-level statement into its item kind and declared names.
fn classify(stmt: &Stmt) -> (ItemKind, Vec<String>, Option<(String, Vec<String>)>) {
    match stmt {
        Stmt::Function { name, .. } if name.is_simple() => {
            (ItemKind::Function, vec![name.base.clone()], None)
        }
        Stmt::Function { name, .. } => {
            let segments = name.segments().iter().map(|s| s.to_string()).collect();
            (ItemKind::Method, Vec::new(), Some((name.base.clone(), segments)))
        }
        Stmt::LocalFunction { name, .. } => (ItemKind::Function, vec![name.clone()], None),
        Stmt::Local { names, .. } => (ItemKind::LocalBinding, names.clone(), None),
        Stmt::Assign { targets, .. } if targets.len() == 1 => match pure_chain(&targets[0]) {
            Some((base, segments)) if !segments.is_empty() => {
                (ItemKind::MemberAssignment, Vec::new(), Some((base, segments)))
            }
            _ => (ItemKind::Statement, Vec::new(), None),
        },
        _ => (ItemKind::Statement, Vec::new(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use indexmap::IndexMap as Defines;
    use std::path::Path;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    fn plan_project(files: &[(&str, &str)]) -> (crate::graph::ModuleGraph, LinkPlan) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, content) in files {
            write(tmp.path(), name, content);
        }
        let graph = graph::discover(&tmp.path().join("main.lua"), &Defines::new()).unwrap();
        let plan = plan(&graph).unwrap();
        // The graph owns no paths beyond discovery; the tempdir may go.
        (graph, plan)
    }

    #[test]
    fn test_unique_suffix_scheme() {
        let mut used = IndexSet::new();
        assert_eq!(claim(&mut used, "x"), "x");
        assert_eq!(claim(&mut used, "x"), "x2");
        assert_eq!(claim(&mut used, "x"), "x3");
        assert_eq!(claim(&mut used, "y"), "y");
    }

    #[test]
    fn test_imported_export_keeps_name_over_entry() {
        let (graph, plan) = plan_project(&[
            (
                "main.lua",
                "import helper from \"./util\"\nexport local helper2 = 0\nlocal helper3 = helper\nprint(helper3, helper2)\n",
            ),
            ("util.lua", "export local helper = 1\n"),
        ]);
        let util_key = &graph.modules[1].key;
        assert_eq!(plan.exported_unique[util_key]["helper"], "helper");
    }

    #[test]
    fn test_duplicate_exports_get_suffixes() {
        let (graph, plan) = plan_project(&[
            (
                "main.lua",
                "import value from \"./a\"\nimport value as bValue from \"./b\"\nprint(value, bValue)\n",
            ),
            ("a.lua", "export local value = 1\n"),
            ("b.lua", "export local value = 2\n"),
        ]);
        let a_key = &graph.modules[1].key;
        let b_key = &graph.modules[2].key;
        assert_eq!(plan.exported_unique[a_key]["value"], "value");
        assert_eq!(plan.exported_unique[b_key]["value"], "value2");
        // The entry's aliases point at the final names.
        assert_eq!(plan.maps[0].alias_map["value"], "value");
        assert_eq!(plan.maps[0].alias_map["bValue"], "value2");
    }

    #[test]
    fn test_conflict_cascade_renames_export() {
        // Module b never imports a's `config`, so its own local keeps the
        // spelling and the export moves to config2.
        let (graph, plan) = plan_project(&[
            (
                "main.lua",
                "import config as appConfig from \"./a\"\nimport describe from \"./b\"\nprint(appConfig, describe())\n",
            ),
            ("a.lua", "export local config = {limit = 1}\n"),
            (
                "b.lua",
                "local config = {limit = 2}\nexport local function describe() return config.limit end\n",
            ),
        ]);
        let a_key = &graph.modules[1].key;
        assert_eq!(plan.exported_unique[a_key]["config"], "config2");
        // b's local kept its original spelling.
        let b_idx = 2;
        assert_eq!(plan.maps[b_idx].local_rewrite["config"], "config");
        // The entry alias follows the renamed export.
        assert_eq!(plan.maps[0].alias_map["appConfig"], "config2");
    }

    #[test]
    fn test_unaliased_import_is_allowed_export_use() {
        let (graph, plan) = plan_project(&[
            (
                "main.lua",
                "import config from \"./a\"\nprint(config.limit)\n",
            ),
            ("a.lua", "export local config = {limit = 1}\n"),
        ]);
        let a_key = &graph.modules[1].key;
        // No cascade: the entry's use of `config` goes through its import.
        assert_eq!(plan.exported_unique[a_key]["config"], "config");
    }

    #[test]
    fn test_non_exported_locals_share_the_namespace() {
        let (_graph, plan) = plan_project(&[
            (
                "main.lua",
                "import run from \"./a\"\nlocal buffer = {}\nprint(run(buffer))\n",
            ),
            (
                "a.lua",
                "local buffer = {}\nexport local function run(b) return b or buffer end\n",
            ),
        ]);
        // Entry items are built first, so the entry's `buffer` wins the
        // spelling and a's local moves to buffer2.
        assert_eq!(plan.maps[0].local_rewrite["buffer"], "buffer");
        assert_eq!(plan.maps[1].local_rewrite["buffer"], "buffer2");
        assert_eq!(plan.global_rename["buffer"], "buffer2");
    }

    #[test]
    fn test_classify_kinds() {
        let block = crate::parser::parse(
            "function f() end\nfunction T:m() end\nlocal a, b = 1, 2\nT.x = 1\nprint(1)\n",
        )
        .unwrap();
        let kinds: Vec<_> = block.iter().map(|s| classify(s).0).collect();
        assert_eq!(
            kinds,
            vec![
                ItemKind::Function,
                ItemKind::Method,
                ItemKind::LocalBinding,
                ItemKind::MemberAssignment,
                ItemKind::Statement
            ]
        );
    }
}
