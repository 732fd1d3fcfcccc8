//! Identifier rewriting over one module's statements.
//!
//! At every reference the chain is: alias map, then the module's local
//! rewrite map, then the bundle-wide fallback, else untouched (a Lua
//! builtin or a free global is not the rewriter's problem). Names bound in
//! an enclosing lexical scope inside the statement (parameters, nested
//! locals, loop variables) are never rewritten, so a renamed top-level
//! binding cannot capture or be captured by a shadowing scope.

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::allocator::ModuleMaps;
use crate::ast::{Expr, FuncBody, Stmt, TableField};

/// Rewrite one top-level statement in place.
pub fn rewrite_statement(
    stmt: &mut Stmt,
    maps: &ModuleMaps,
    global_rename: &IndexMap<String, String>,
) {
    let mut rewriter = Rewriter {
        maps,
        global_rename,
        scopes: Vec::new(),
    };
    rewriter.stmt(stmt, true);
}

struct Rewriter<'a> {
    maps: &'a ModuleMaps,
    global_rename: &'a IndexMap<String, String>,
    scopes: Vec<FxHashSet<String>>,
}

impl<'a> Rewriter<'a> {
    fn bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    /// Reference-site rewrite.
    fn name(&self, name: &mut String) {
        if self.bound(name) {
            return;
        }
        if let Some(resolved) = self.lookup(name) {
            *name = resolved;
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(unique) = self.maps.alias_map.get(name) {
            return Some(unique.clone());
        }
        if let Some(unique) = self.maps.local_rewrite.get(name) {
            if unique.as_str() != name {
                return Some(unique.clone());
            }
            // An identity claim stops the global fallback.
            return None;
        }
        self.global_rename.get(name).cloned()
    }

    /// Declaration-site rewrite for this module's own top-level bindings.
    fn decl_name(&self, name: &mut String) {
        if let Some(unique) = self.maps.local_rewrite.get(name.as_str()) {
            if unique != name {
                *name = unique.clone();
            }
        }
    }

    fn stmt(&mut self, stmt: &mut Stmt, top: bool) {
        match stmt {
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Local { names, exprs } => {
                for expr in exprs {
                    self.expr(expr);
                }
                if top {
                    for name in names {
                        self.decl_name(name);
                    }
                } else {
                    for name in names {
                        self.bind(name);
                    }
                }
            }
            Stmt::Assign { targets, values } => {
                for target in targets {
                    self.expr(target);
                }
                for value in values {
                    self.expr(value);
                }
            }
            Stmt::Function { name, body } => {
                if top && name.is_simple() {
                    self.decl_name(&mut name.base);
                } else {
                    // The base of a dotted declaration, like the target of
                    // a nested `function f()`, is a reference.
                    self.name(&mut name.base);
                }
                self.func_body(body);
            }
            Stmt::LocalFunction { name, body } => {
                if top {
                    self.decl_name(name);
                    self.func_body(body);
                } else {
                    self.bind(name);
                    self.scopes.push(FxHashSet::from_iter([name.clone()]));
                    self.func_body(body);
                    self.scopes.pop();
                }
            }
            Stmt::Return(exprs) => {
                for expr in exprs {
                    self.expr(expr);
                }
            }
            Stmt::Break => {}
            Stmt::Do(body) => self.block(body),
            Stmt::While { cond, body } => {
                self.expr(cond);
                self.block(body);
            }
            Stmt::Repeat { body, cond } => {
                self.scopes.push(FxHashSet::default());
                for stmt in body.iter_mut() {
                    self.stmt(stmt, false);
                }
                self.expr(cond);
                self.scopes.pop();
            }
            Stmt::If { arms, else_body } => {
                for arm in arms {
                    self.expr(&mut arm.cond);
                    self.block(&mut arm.body);
                }
                if let Some(body) = else_body {
                    self.block(body);
                }
            }
            Stmt::NumericFor {
                var,
                start,
                stop,
                step,
                body,
            } => {
                self.expr(start);
                self.expr(stop);
                if let Some(step) = step {
                    self.expr(step);
                }
                self.scopes.push(FxHashSet::from_iter([var.clone()]));
                for stmt in body.iter_mut() {
                    self.stmt(stmt, false);
                }
                self.scopes.pop();
            }
            Stmt::GenericFor { vars, exprs, body } => {
                for expr in exprs {
                    self.expr(expr);
                }
                self.scopes.push(vars.iter().cloned().collect());
                for stmt in body.iter_mut() {
                    self.stmt(stmt, false);
                }
                self.scopes.pop();
            }
        }
    }

    fn block(&mut self, stmts: &mut [Stmt]) {
        self.scopes.push(FxHashSet::default());
        for stmt in stmts {
            self.stmt(stmt, false);
        }
        self.scopes.pop();
    }

    fn func_body(&mut self, body: &mut FuncBody) {
        self.scopes.push(body.params.iter().cloned().collect());
        for stmt in &mut body.body {
            self.stmt(stmt, false);
        }
        self.scopes.pop();
    }

    fn expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Nil | Expr::True | Expr::False | Expr::Vararg => {}
            Expr::Number(_) | Expr::Str(_) => {}
            Expr::Name(name) => self.name(name),
            Expr::Member { base, .. } => self.expr(base),
            Expr::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
            Expr::Call { func, args } => {
                self.expr(func);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::MethodCall { base, args, .. } => {
                self.expr(base);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs);
                self.expr(rhs);
            }
            Expr::Unary { operand, .. } => self.expr(operand),
            Expr::Function(body) => self.func_body(body),
            Expr::Table(fields) => {
                for field in fields {
                    match field {
                        TableField::Item(value) | TableField::Named { value, .. } => {
                            self.expr(value)
                        }
                        TableField::Keyed { key, value } => {
                            self.expr(key);
                            self.expr(value);
                        }
                    }
                }
            }
            Expr::Paren(inner) => self.expr(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::format_beautiful;
    use crate::parser::parse;

    fn rewrite(src: &str, maps: &ModuleMaps, global: &IndexMap<String, String>) -> String {
        let mut block = parse(src).unwrap();
        for stmt in &mut block {
            rewrite_statement(stmt, maps, global);
        }
        format_beautiful(&block)
    }

    fn maps_with_local(pairs: &[(&str, &str)]) -> ModuleMaps {
        let mut maps = ModuleMaps::default();
        for (original, unique) in pairs {
            maps.local_rewrite
                .insert(original.to_string(), unique.to_string());
        }
        maps
    }

    #[test]
    fn test_alias_wins_over_local_map() {
        let mut maps = maps_with_local(&[("v", "wrong")]);
        maps.alias_map.insert("v".to_string(), "veryLongName".to_string());
        maps.alias_set.insert("v".to_string());
        let out = rewrite("print(v)", &maps, &IndexMap::new());
        assert_eq!(out, "print(veryLongName)\n");
    }

    #[test]
    fn test_declaration_and_references_renamed_together() {
        let maps = maps_with_local(&[("config", "config2")]);
        let out = rewrite(
            "local config = {}\nconfig.limit = 1\nprint(config.limit)",
            &maps,
            &IndexMap::new(),
        );
        assert_eq!(out, "local config2 = {}\nconfig2.limit = 1\nprint(config2.limit)\n");
    }

    #[test]
    fn test_identity_entry_blocks_global_fallback() {
        let maps = maps_with_local(&[("buffer", "buffer")]);
        let mut global = IndexMap::new();
        global.insert("buffer".to_string(), "buffer2".to_string());
        let out = rewrite("print(buffer)", &maps, &global);
        assert_eq!(out, "print(buffer)\n");
    }

    #[test]
    fn test_global_fallback_applies_without_local_claim() {
        let maps = ModuleMaps::default();
        let mut global = IndexMap::new();
        global.insert("buffer".to_string(), "buffer2".to_string());
        let out = rewrite("print(buffer)", &maps, &global);
        assert_eq!(out, "print(buffer2)\n");
    }

    #[test]
    fn test_shadowed_parameter_is_untouched() {
        let maps = maps_with_local(&[("config", "config2")]);
        let out = rewrite(
            "local config = {}\nlocal function use(config) return config end",
            &maps,
            &IndexMap::new(),
        );
        // The parameter and its use stay; only the top-level binding moves.
        assert_eq!(
            out,
            "local config2 = {}\nlocal function use(config)\n    return config\nend\n"
        );
    }

    #[test]
    fn test_nested_local_shadows() {
        let maps = maps_with_local(&[("x", "x2")]);
        let out = rewrite(
            "local x = 1\ndo\n    local x = 2\n    print(x)\nend\nprint(x)",
            &maps,
            &IndexMap::new(),
        );
        assert_eq!(
            out,
            "local x2 = 1\ndo\n    local x = 2\n    print(x)\nend\nprint(x2)\n"
        );
    }

    #[test]
    fn test_method_declaration_base_follows_rename() {
        let maps = maps_with_local(&[("T", "T2")]);
        let out = rewrite(
            "local T = {}\nT.__index = T\nfunction T:make()\n    return setmetatable({}, T)\nend",
            &maps,
            &IndexMap::new(),
        );
        assert_eq!(
            out,
            "local T2 = {}\nT2.__index = T2\nfunction T2:make()\n    return setmetatable({}, T2)\nend\n"
        );
    }

    #[test]
    fn test_table_keys_are_not_references() {
        let maps = maps_with_local(&[("limit", "limit2")]);
        let out = rewrite("local t = {limit = limit}", &maps, &IndexMap::new());
        // The field name stays; the value is a reference and moves.
        assert_eq!(out, "local t = {limit = limit2}\n");
    }

    #[test]
    fn test_rewriter_reaches_loop_headers() {
        let maps = maps_with_local(&[("items", "items2"), ("count", "count2")]);
        let out = rewrite(
            "for i = 1, count do print(i) end\nfor _, v in ipairs(items) do print(v) end",
            &maps,
            &IndexMap::new(),
        );
        assert_eq!(
            out,
            "for i = 1, count2 do\n    print(i)\nend\nfor _, v in ipairs(items2) do\n    print(v)\nend\n"
        );
    }
}
