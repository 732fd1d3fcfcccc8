//! Emission ordering.
//!
//! Imported modules are laid out in discovery order, each preceded by the
//! modules it imports from; inside a module, statements keep their source
//! order unless a dependency has to be pulled earlier. Entry-module
//! statements are appended verbatim at the end, never reordered. Both the
//! file-level and the item-level walks break cycles with in-progress and
//! emitted sets over stable keys; declarations of modules on a file-level
//! cycle become forward-pull targets so cross-module cycles still come out
//! declaration-before-use where possible.

use indexmap::{IndexMap, IndexSet};
use log::debug;
use rustc_hash::FxHashSet;

use crate::allocator::{Item, ItemKind, LinkPlan};
use crate::graph::ModuleGraph;

/// Produce the final item order as indices into `plan.items`.
pub fn order(plan: &LinkPlan, graph: &ModuleGraph) -> Vec<usize> {
    let mut decl_by_name: IndexMap<String, usize> = IndexMap::new();
    for (idx, item) in plan.items.iter().enumerate() {
        for name in declared_names(plan, item) {
            decl_by_name.entry(name).or_insert(idx);
        }
    }

    let circular = graph.circular_modules();
    let mut forward_decls: IndexSet<String> = IndexSet::new();
    for (idx, item) in plan.items.iter().enumerate() {
        if circular.contains(&item.module_idx) {
            for name in declared_names(plan, item) {
                if decl_by_name.get(&name) == Some(&idx) {
                    forward_decls.insert(name);
                }
            }
        }
    }
    if !forward_decls.is_empty() {
        debug!("forward-pull declarations: {:?}", forward_decls);
    }

    let mut items_by_module: Vec<Vec<usize>> = vec![Vec::new(); graph.modules.len()];
    for (idx, item) in plan.items.iter().enumerate() {
        items_by_module[item.module_idx].push(idx);
    }

    let mut orderer = Orderer {
        plan,
        graph,
        decl_by_name,
        forward_decls,
        items_by_module,
        emitted_modules: FxHashSet::default(),
        in_progress_modules: FxHashSet::default(),
        emitted_items: FxHashSet::default(),
        adding_stack: FxHashSet::default(),
        output: Vec::new(),
    };

    for idx in 0..graph.modules.len() {
        if !graph.modules[idx].is_entry {
            orderer.add_module(idx);
        }
    }
    for idx in 0..graph.modules.len() {
        if graph.modules[idx].is_entry {
            // Entry statements anchor the end of the file in source order.
            for &item_idx in &orderer.items_by_module[idx].clone() {
                orderer.emitted_items.insert(item_idx);
                orderer.output.push(item_idx);
            }
        }
    }
    orderer.output
}

/// The names an item registers in the dependency lookup, spelled as the
/// rewriter spells them in the output.
fn declared_names(plan: &LinkPlan, item: &Item) -> Vec<String> {
    let maps = &plan.maps[item.module_idx];
    match item.kind {
        ItemKind::Function | ItemKind::LocalBinding => item
            .declared
            .iter()
            .map(|name| {
                maps.local_rewrite
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| name.clone())
            })
            .collect(),
        ItemKind::Method | ItemKind::MemberAssignment => {
            let Some((base, segments)) = &item.declared_path else {
                return Vec::new();
            };
            let final_base = maps.resolve(base, &plan.global_rename);
            vec![format!("{}.{}", final_base, segments.join("."))]
        }
        ItemKind::Statement => Vec::new(),
    }
}

struct Orderer<'a> {
    plan: &'a LinkPlan,
    graph: &'a ModuleGraph,
    decl_by_name: IndexMap<String, usize>,
    forward_decls: IndexSet<String>,
    items_by_module: Vec<Vec<usize>>,
    emitted_modules: FxHashSet<usize>,
    in_progress_modules: FxHashSet<usize>,
    emitted_items: FxHashSet<usize>,
    adding_stack: FxHashSet<usize>,
    output: Vec<usize>,
}

impl<'a> Orderer<'a> {
    fn add_module(&mut self, module_idx: usize) {
        if self.emitted_modules.contains(&module_idx) {
            return;
        }
        if !self.in_progress_modules.insert(module_idx) {
            // Cycle at file level; emission order so far has to do.
            return;
        }
        for dep in self.graph.imported_deps(module_idx) {
            if dep != module_idx {
                self.add_module(dep);
            }
        }
        self.in_progress_modules.remove(&module_idx);
        self.emitted_modules.insert(module_idx);

        for item_idx in self.items_by_module[module_idx].clone() {
            self.add_item(item_idx);
        }
    }

    fn add_item(&mut self, item_idx: usize) {
        if self.emitted_items.contains(&item_idx) {
            return;
        }
        if !self.adding_stack.insert(item_idx) {
            // Declaration cycle inside one module; rely on the order
            // achieved so far.
            return;
        }

        let plan = self.plan;
        let item = &plan.items[item_idx];
        let maps = &plan.maps[item.module_idx];
        for dep in &item.deps {
            let resolved = resolve_dep(maps, &plan.global_rename, dep);
            let Some(&target) = self.decl_by_name.get(&resolved) else {
                continue;
            };
            if target == item_idx || self.emitted_items.contains(&target) {
                continue;
            }
            if plan.items[target].module_idx == item.module_idx {
                // In-file dependencies always pull their declaration
                // earlier.
                self.add_item(target);
            } else if self.forward_decls.contains(&resolved) {
                // Cross-module only inside a file-level cycle; otherwise
                // ordering is handled at file granularity.
                self.add_item(target);
            }
        }

        self.adding_stack.remove(&item_idx);
        self.emitted_items.insert(item_idx);
        self.output.push(item_idx);
    }
}

/// Resolve a recorded dependency to its emitted spelling. Dotted paths
/// resolve their base segment through the same chain the rewriter uses.
fn resolve_dep(
    maps: &crate::allocator::ModuleMaps,
    global_rename: &IndexMap<String, String>,
    dep: &str,
) -> String {
    match dep.split_once('.') {
        Some((base, rest)) => {
            format!("{}.{}", maps.resolve(base, global_rename), rest)
        }
        None => maps.resolve(dep, global_rename).to_string(),
    }
}
