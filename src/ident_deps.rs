//! Free-identifier extraction for a single top-level statement.
//!
//! One recursive traversal collecting every free simple identifier plus
//! every qualified member path whose base chain is entirely identifiers and
//! constant-string indexes. Names bound by an enclosing lexical scope
//! inside the statement (parameters, nested locals, loop variables) are not
//! free and are not reported; that keeps the conflict cascade and the
//! orderer blind to names that can never escape.

use indexmap::IndexSet;
use rustc_hash::FxHashSet;

use crate::ast::{Expr, FuncBody, Stmt, TableField, is_identifier, literal_string_value};

/// The set of identifier names and dotted member paths a statement depends
/// on. Unordered in meaning; the set iterates in first-seen order so
/// downstream passes stay deterministic.
pub fn statement_deps(stmt: &Stmt) -> IndexSet<String> {
    let mut collector = DepCollector {
        deps: IndexSet::new(),
        scopes: Vec::new(),
    };
    collector.stmt(stmt, true);
    collector.deps
}

/// Decompose `base.a.b` / `base["a"].b` into its base identifier and
/// segments, provided the whole chain is identifiers and constant-string
/// indexes. Used both for dependency keys and for classifying member
/// assignments.
pub fn pure_chain(expr: &Expr) -> Option<(String, Vec<String>)> {
    match expr {
        Expr::Name(name) => Some((name.clone(), Vec::new())),
        Expr::Member { base, name } => {
            let (root, mut segments) = pure_chain(base)?;
            segments.push(name.clone());
            Some((root, segments))
        }
        Expr::Index { base, index } => {
            let key = match index.as_ref() {
                Expr::Str(lexeme) => literal_string_value(lexeme)?,
                _ => return None,
            };
            if !is_identifier(&key) {
                return None;
            }
            let (root, mut segments) = pure_chain(base)?;
            segments.push(key);
            Some((root, segments))
        }
        _ => None,
    }
}

struct DepCollector {
    deps: IndexSet<String>,
    scopes: Vec<FxHashSet<String>>,
}

impl DepCollector {
    fn bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn record_name(&mut self, name: &str) {
        if !self.bound(name) {
            self.deps.insert(name.to_string());
        }
    }

    /// Record a member/index access: the full dotted path when the chain is
    /// pure, plus the base identifier either way.
    fn record_access(&mut self, expr: &Expr) {
        if let Some((base, segments)) = pure_chain(expr) {
            if !self.bound(&base) {
                if !segments.is_empty() {
                    self.deps.insert(format!("{}.{}", base, segments.join(".")));
                }
                self.deps.insert(base);
            }
            return;
        }
        match expr {
            Expr::Member { base, .. } => self.expr(base),
            Expr::Index { base, index } => {
                self.expr(base);
                self.expr(index);
            }
            other => self.expr(other),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Nil | Expr::True | Expr::False | Expr::Vararg => {}
            Expr::Number(_) | Expr::Str(_) => {}
            Expr::Name(name) => self.record_name(name),
            Expr::Member { .. } | Expr::Index { .. } => self.record_access(expr),
            Expr::Call { func, args } => {
                // The call records the path; the base is not re-recorded.
                self.record_access(func);
                for arg in args {
                    self.expr(arg);
                }
            }
            Expr::MethodCall { base, method, args } => {
                if let Some((root, mut segments)) = pure_chain(base) {
                    if !self.bound(&root) {
                        segments.push(method.clone());
                        self.deps.insert(format!("{}.{}", root, segments.join(".")));
                        self.deps.insert(root);
                    }
                } else {
                    self.expr(base);
                }
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

    fn func_body(&mut self, body: &FuncBody) {
        self.scopes.push(body.params.iter().cloned().collect());
        for stmt in &body.body {
            self.stmt(stmt, false);
        }
        self.scopes.pop();
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.scopes.push(FxHashSet::default());
        for stmt in stmts {
            self.stmt(stmt, false);
        }
        self.scopes.pop();
    }

    fn stmt(&mut self, stmt: &Stmt, top: bool) {
        match stmt {
            Stmt::Expr(expr) => self.expr(expr),
            Stmt::Local { names, exprs } => {
                for expr in exprs {
                    self.expr(expr);
                }
                // Top-level declarations are what other statements depend
                // on; only nested locals shadow.
                if !top {
                    for name in names {
                        self.bind(name);
                    }
                }
            }
            Stmt::Assign { targets, values } => {
                for target in targets {
                    self.record_access(target);
                }
                for value in values {
                    self.expr(value);
                }
            }
            Stmt::Function { name, body } => {
                if !name.is_simple() {
                    // A dotted declaration reads its base table.
                    self.record_name(&name.base);
                } else if !top {
                    // Nested `function f()` assigns to whatever `f` is in
                    // scope.
                    self.record_name(&name.base);
                }
                self.func_body(body);
            }
            Stmt::LocalFunction { name, body } => {
                if !top {
                    self.bind(name);
                }
                self.scopes.push(FxHashSet::from_iter([name.clone()]));
                self.func_body(body);
                self.scopes.pop();
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
                // Locals of the body stay visible in the condition.
                self.scopes.push(FxHashSet::default());
                for stmt in body {
                    self.stmt(stmt, false);
                }
                self.expr(cond);
                self.scopes.pop();
            }
            Stmt::If { arms, else_body } => {
                for arm in arms {
                    self.expr(&arm.cond);
                    self.block(&arm.body);
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
                for stmt in body {
                    self.stmt(stmt, false);
                }
                self.scopes.pop();
            }
            Stmt::GenericFor { vars, exprs, body } => {
                for expr in exprs {
                    self.expr(expr);
                }
                self.scopes.push(vars.iter().cloned().collect());
                for stmt in body {
                    self.stmt(stmt, false);
                }
                self.scopes.pop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn deps_of(src: &str) -> Vec<String> {
        let block = parse(src).unwrap();
        assert_eq!(block.len(), 1, "expected a single statement");
        statement_deps(&block[0]).into_iter().collect()
    }

    #[test]
    fn test_simple_reference() {
        assert_eq!(deps_of("print(add(2, 3))"), vec!["print", "add"]);
    }

    #[test]
    fn test_dotted_path_recorded_with_base() {
        let deps = deps_of("T.__index = T");
        assert!(deps.contains(&"T.__index".to_string()));
        assert!(deps.contains(&"T".to_string()));
    }

    #[test]
    fn test_constant_string_index_joins_path() {
        let deps = deps_of("x = conf[\"limits\"].max");
        assert!(deps.contains(&"conf.limits.max".to_string()));
        assert!(deps.contains(&"conf".to_string()));
    }

    #[test]
    fn test_non_literal_index_yields_no_path() {
        let deps = deps_of("x = conf[key].max");
        assert!(!deps.iter().any(|d| d.starts_with("conf.")));
        assert!(deps.contains(&"conf".to_string()));
        assert!(deps.contains(&"key".to_string()));
    }

    #[test]
    fn test_method_call_records_path() {
        let deps = deps_of("queue:push(job)");
        assert!(deps.contains(&"queue.push".to_string()));
        assert!(deps.contains(&"queue".to_string()));
        assert!(deps.contains(&"job".to_string()));
    }

    #[test]
    fn test_parameters_are_not_free() {
        let deps = deps_of("local function wrap(config) return config end");
        assert!(!deps.contains(&"config".to_string()));
    }

    #[test]
    fn test_nested_locals_shadow() {
        let deps = deps_of("do local helper = 1 print(helper) end");
        assert!(!deps.contains(&"helper".to_string()));
        assert!(deps.contains(&"print".to_string()));
    }

    #[test]
    fn test_function_bodies_are_entered() {
        let deps = deps_of("local function make() return setmetatable({}, T) end");
        assert!(deps.contains(&"setmetatable".to_string()));
        assert!(deps.contains(&"T".to_string()));
    }

    #[test]
    fn test_method_declaration_reads_its_base() {
        let deps = deps_of("function T:make() return T end");
        assert!(deps.contains(&"T".to_string()));
    }

    #[test]
    fn test_repeat_scope_reaches_condition() {
        let deps = deps_of("repeat local done = step() until done");
        assert!(deps.contains(&"step".to_string()));
        assert!(!deps.contains(&"done".to_string()));
    }
}
