//! Identifier shortening for minified output.
//!
//! Runs on the re-parsed bundle, so the scope bookkeeping it needs is
//! exactly the top-level declarations of the emitted program. `mangle`
//! shortens every top-level declared simple name; `auto` shortens only the
//! names the bundler itself synthesised, leaving user-authored spellings
//! alone. References that resolve to no top-level declaration are never
//! touched.

use indexmap::{IndexMap, IndexSet};
use log::debug;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::allocator::ModuleMaps;
use crate::ast::{Expr, FuncBody, Stmt, TableField};
use crate::ast_rewriter;
use crate::lua_stdlib;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MangleMode {
    #[default]
    None,
    Mangle,
    Auto,
}

/// Shorten top-level declared names across the whole program, in place.
pub fn mangle_program(stmts: &mut [Stmt], mode: MangleMode, synthetic_names: &IndexSet<String>) {
    if mode == MangleMode::None {
        return;
    }

    let declared = top_level_declarations(stmts);
    let mut taken = all_identifiers(stmts);

    let mut renames = IndexMap::new();
    let mut generator = ShortNames::new();
    for name in declared {
        if mode == MangleMode::Auto && !synthetic_names.contains(&name) {
            continue;
        }
        let short = generator.next_free(&taken);
        if short.len() >= name.len() {
            // Nothing gained; keep the original spelling.
            continue;
        }
        debug!("mangle {} -> {}", name, short);
        taken.insert(short.clone());
        renames.insert(name, short);
    }

    if renames.is_empty() {
        return;
    }
    let mut maps = ModuleMaps::default();
    maps.local_rewrite = renames;
    let no_global = IndexMap::new();
    for stmt in stmts {
        ast_rewriter::rewrite_statement(stmt, &maps, &no_global);
    }
}

/// Top-level declared simple names, in declaration order.
fn top_level_declarations(stmts: &[Stmt]) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = FxHashSet::default();
    for stmt in stmts {
        match stmt {
            Stmt::Local { names: decl, .. } => {
                for name in decl {
                    if seen.insert(name.clone()) {
                        names.push(name.clone());
                    }
                }
            }
            Stmt::LocalFunction { name, .. } => {
                if seen.insert(name.clone()) {
                    names.push(name.clone());
                }
            }
            Stmt::Function { name, .. } if name.is_simple() => {
                if seen.insert(name.base.clone()) {
                    names.push(name.base.clone());
                }
            }
            _ => {}
        }
    }
    names
}

/// Every identifier appearing anywhere in the program, bindings included.
/// A short name colliding with any of these could capture or be captured.
fn all_identifiers(stmts: &[Stmt]) -> FxHashSet<String> {
    let mut set = FxHashSet::default();
    for stmt in stmts {
        collect_stmt(stmt, &mut set);
    }
    set
}

fn collect_stmt(stmt: &Stmt, set: &mut FxHashSet<String>) {
    match stmt {
        Stmt::Expr(expr) => collect_expr(expr, set),
        Stmt::Local { names, exprs } => {
            set.extend(names.iter().cloned());
            for expr in exprs {
                collect_expr(expr, set);
            }
        }
        Stmt::Assign { targets, values } => {
            for expr in targets.iter().chain(values) {
                collect_expr(expr, set);
            }
        }
        Stmt::Function { name, body } => {
            set.insert(name.base.clone());
            collect_body(body, set);
        }
        Stmt::LocalFunction { name, body } => {
            set.insert(name.clone());
            collect_body(body, set);
        }
        Stmt::Return(exprs) => {
            for expr in exprs {
                collect_expr(expr, set);
            }
        }
        Stmt::Break => {}
        Stmt::Do(body) => {
            for stmt in body {
                collect_stmt(stmt, set);
            }
        }
        Stmt::While { cond, body } | Stmt::Repeat { cond, body } => {
            collect_expr(cond, set);
            for stmt in body {
                collect_stmt(stmt, set);
            }
        }
        Stmt::If { arms, else_body } => {
            for arm in arms {
                collect_expr(&arm.cond, set);
                for stmt in &arm.body {
                    collect_stmt(stmt, set);
                }
            }
            if let Some(body) = else_body {
                for stmt in body {
                    collect_stmt(stmt, set);
                }
            }
        }
        Stmt::NumericFor {
            var,
            start,
            stop,
            step,
            body,
        } => {
            set.insert(var.clone());
            collect_expr(start, set);
            collect_expr(stop, set);
            if let Some(step) = step {
                collect_expr(step, set);
            }
            for stmt in body {
                collect_stmt(stmt, set);
            }
        }
        Stmt::GenericFor { vars, exprs, body } => {
            set.extend(vars.iter().cloned());
            for expr in exprs {
                collect_expr(expr, set);
            }
            for stmt in body {
                collect_stmt(stmt, set);
            }
        }
    }
}

fn collect_expr(expr: &Expr, set: &mut FxHashSet<String>) {
    match expr {
        Expr::Nil | Expr::True | Expr::False | Expr::Vararg => {}
        Expr::Number(_) | Expr::Str(_) => {}
        Expr::Name(name) => {
            set.insert(name.clone());
        }
        Expr::Member { base, .. } => collect_expr(base, set),
        Expr::Index { base, index } => {
            collect_expr(base, set);
            collect_expr(index, set);
        }
        Expr::Call { func, args } => {
            collect_expr(func, set);
            for arg in args {
                collect_expr(arg, set);
            }
        }
        Expr::MethodCall { base, args, .. } => {
            collect_expr(base, set);
            for arg in args {
                collect_expr(arg, set);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, set);
            collect_expr(rhs, set);
        }
        Expr::Unary { operand, .. } => collect_expr(operand, set),
        Expr::Function(body) => collect_body(body, set),
        Expr::Table(fields) => {
            for field in fields {
                match field {
                    TableField::Item(value) | TableField::Named { value, .. } => {
                        collect_expr(value, set)
                    }
                    TableField::Keyed { key, value } => {
                        collect_expr(key, set);
                        collect_expr(value, set);
                    }
                }
            }
        }
        Expr::Paren(inner) => collect_expr(inner, set),
    }
}

fn collect_body(body: &FuncBody, set: &mut FxHashSet<String>) {
    set.extend(body.params.iter().cloned());
    for stmt in &body.body {
        collect_stmt(stmt, set);
    }
}

/// `a`..`z`, then `a0`..`z9`, `aa`..`zz`, and so on; keywords and standard
/// globals are never produced.
struct ShortNames {
    counter: usize,
}

impl ShortNames {
    fn new() -> Self {
        Self { counter: 0 }
    }

    fn next_free(&mut self, taken: &FxHashSet<String>) -> String {
        loop {
            let candidate = nth_short_name(self.counter);
            self.counter += 1;
            if lua_stdlib::is_keyword(&candidate)
                || lua_stdlib::is_std_global(&candidate)
                || taken.contains(&candidate)
            {
                continue;
            }
            return candidate;
        }
    }
}

fn nth_short_name(mut n: usize) -> String {
    const FIRST: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
    const REST: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut name = String::new();
    name.push(FIRST[n % FIRST.len()] as char);
    n /= FIRST.len();
    while n > 0 {
        n -= 1;
        name.push(REST[n % REST.len()] as char);
        n /= REST.len();
    }
    name
}
