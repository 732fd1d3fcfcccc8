//! Source emission.
//!
//! Two back ends over one walker: `format_beautiful` (one statement per
//! line, indented) and `format_mini` (minimal whitespace). Both are
//! precedence-aware so no parentheses are invented or lost, and both guard
//! token juxtaposition so the output lexes back to the same token stream.

use crate::ast::{BinOp, Expr, FuncBody, FuncName, Stmt, TableField, UNARY_PRECEDENCE, UnOp};

const INDENT: &str = "    ";

#[derive(Clone, Copy, PartialEq)]
enum Layout {
    Beautiful,
    Mini,
}

pub fn format_beautiful<'a, I>(stmts: I) -> String
where
    I: IntoIterator<Item = &'a Stmt>,
{
    format_with(stmts, Layout::Beautiful)
}

pub fn format_mini<'a, I>(stmts: I) -> String
where
    I: IntoIterator<Item = &'a Stmt>,
{
    format_with(stmts, Layout::Mini)
}

fn format_with<'a, I>(stmts: I, layout: Layout) -> String
where
    I: IntoIterator<Item = &'a Stmt>,
{
    let mut printer = Printer {
        out: String::new(),
        layout,
        indent: 0,
        at_line_start: true,
        stmt_boundary: false,
    };
    for stmt in stmts {
        printer.stmt(stmt);
        printer.newline();
    }
    if layout == Layout::Beautiful && !printer.out.ends_with('\n') && !printer.out.is_empty() {
        printer.out.push('\n');
    }
    printer.out
}

struct Printer {
    out: String,
    layout: Layout,
    indent: usize,
    at_line_start: bool,
    stmt_boundary: bool,
}

/// Whether two adjacent characters would fuse into a different token.
fn needs_separator(prev: char, next: char) -> bool {
    let ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    (ident(prev) && ident(next))
        || (prev.is_ascii_digit() && next == '.')
        || (prev == '.' && next == '.')
        || (prev == '-' && next == '-')
        || (prev == '[' && next == '[')
}

impl Printer {
    fn push(&mut self, text: &str) {
        let first = match text.chars().next() {
            Some(c) => c,
            None => return,
        };
        match self.layout {
            Layout::Beautiful => {
                if self.at_line_start {
                    if !self.out.is_empty() {
                        self.out.push('\n');
                    }
                    for _ in 0..self.indent {
                        self.out.push_str(INDENT);
                    }
                    self.at_line_start = false;
                }
            }
            Layout::Mini => {
                if self.stmt_boundary {
                    // `f() (g)()` would continue the previous call; a
                    // semicolon keeps the statements apart.
                    if first == '(' {
                        self.out.push(';');
                    }
                    self.stmt_boundary = false;
                }
            }
        }
        if let Some(prev) = self.out.chars().last() {
            if needs_separator(prev, first) {
                self.out.push(' ');
            }
        }
        self.out.push_str(text);
    }

    fn word(&mut self, text: &str) {
        self.push(text);
    }

    fn punct(&mut self, text: &str) {
        self.push(text);
    }

    /// Binary operators and `=`; padded in beautiful output.
    fn op(&mut self, text: &str) {
        if self.layout == Layout::Beautiful {
            if !self.out.ends_with(' ') && !self.at_line_start {
                self.out.push(' ');
            }
            self.out.push_str(text);
            self.out.push(' ');
        } else {
            self.push(text);
        }
    }

    fn comma(&mut self) {
        match self.layout {
            Layout::Beautiful => self.out.push_str(", "),
            Layout::Mini => self.push(","),
        }
    }

    fn newline(&mut self) {
        match self.layout {
            Layout::Beautiful => self.at_line_start = true,
            Layout::Mini => self.stmt_boundary = true,
        }
    }

    fn block(&mut self, stmts: &[Stmt]) {
        self.indent += 1;
        self.newline();
        for stmt in stmts {
            self.stmt(stmt);
            self.newline();
        }
        self.indent -= 1;
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Expr(expr) => self.expr(expr, 0),
            Stmt::Local { names, exprs } => {
                self.word("local");
                self.name_list(names);
                if !exprs.is_empty() {
                    self.op("=");
                    self.expr_list(exprs);
                }
            }
            Stmt::Assign { targets, values } => {
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        self.comma();
                    }
                    self.expr(target, 0);
                }
                self.op("=");
                self.expr_list(values);
            }
            Stmt::Function { name, body } => {
                self.word("function");
                self.func_name(name);
                self.func_rest(body, name.method.is_some());
            }
            Stmt::LocalFunction { name, body } => {
                self.word("local");
                self.word("function");
                self.word(name);
                self.func_rest(body, false);
            }
            Stmt::Return(exprs) => {
                self.word("return");
                if !exprs.is_empty() {
                    self.expr_list(exprs);
                }
            }
            Stmt::Break => self.word("break"),
            Stmt::Do(body) => {
                self.word("do");
                self.block(body);
                self.word("end");
            }
            Stmt::While { cond, body } => {
                self.word("while");
                self.expr(cond, 0);
                self.word("do");
                self.block(body);
                self.word("end");
            }
            Stmt::Repeat { body, cond } => {
                self.word("repeat");
                self.block(body);
                self.word("until");
                self.expr(cond, 0);
            }
            Stmt::If { arms, else_body } => {
                for (i, arm) in arms.iter().enumerate() {
                    self.word(if i == 0 { "if" } else { "elseif" });
                    self.expr(&arm.cond, 0);
                    self.word("then");
                    self.block(&arm.body);
                }
                if let Some(body) = else_body {
                    self.word("else");
                    self.block(body);
                }
                self.word("end");
            }
            Stmt::NumericFor {
                var,
                start,
                stop,
                step,
                body,
            } => {
                self.word("for");
                self.word(var);
                self.op("=");
                self.expr(start, 0);
                self.comma();
                self.expr(stop, 0);
                if let Some(step) = step {
                    self.comma();
                    self.expr(step, 0);
                }
                self.word("do");
                self.block(body);
                self.word("end");
            }
            Stmt::GenericFor { vars, exprs, body } => {
                self.word("for");
                self.name_list(vars);
                self.word("in");
                self.expr_list(exprs);
                self.word("do");
                self.block(body);
                self.word("end");
            }
        }
    }

    fn func_name(&mut self, name: &FuncName) {
        self.word(&name.base);
        for segment in &name.path {
            self.punct(".");
            self.word(segment);
        }
        if let Some(method) = &name.method {
            self.punct(":");
            self.word(method);
        }
    }

    /// Parameter list, body and `end`. `skip_self` drops the implicit first
    /// parameter the parser adds to `function t:m()` declarations.
    fn func_rest(&mut self, body: &FuncBody, skip_self: bool) {
        self.punct("(");
        let params: &[String] = if skip_self && !body.params.is_empty() {
            &body.params[1..]
        } else {
            &body.params
        };
        for (i, param) in params.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.word(param);
        }
        if body.is_vararg {
            if !params.is_empty() {
                self.comma();
            }
            self.punct("...");
        }
        self.punct(")");
        self.block(&body.body);
        self.word("end");
    }

    fn name_list(&mut self, names: &[String]) {
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.word(name);
        }
    }

    fn expr_list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.expr(expr, 0);
        }
    }

    fn expr(&mut self, expr: &Expr, min_prec: u8) {
        match expr {
            Expr::Nil => self.word("nil"),
            Expr::True => self.word("true"),
            Expr::False => self.word("false"),
            Expr::Vararg => self.punct("..."),
            Expr::Number(lexeme) | Expr::Str(lexeme) => self.word(lexeme),
            Expr::Name(name) => self.word(name),
            Expr::Member { base, name } => {
                self.prefix(base);
                self.punct(".");
                self.word(name);
            }
            Expr::Index { base, index } => {
                self.prefix(base);
                self.punct("[");
                self.expr(index, 0);
                self.punct("]");
            }
            Expr::Call { func, args } => {
                self.prefix(func);
                self.call_args(args);
            }
            Expr::MethodCall { base, method, args } => {
                self.prefix(base);
                self.punct(":");
                self.word(method);
                self.call_args(args);
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                let wrap = prec < min_prec;
                if wrap {
                    self.punct("(");
                }
                let (left_ctx, right_ctx) = if op.is_right_assoc() {
                    (prec + 1, prec)
                } else {
                    (prec, prec + 1)
                };
                self.expr(lhs, left_ctx);
                match op {
                    BinOp::And | BinOp::Or => self.word(op.as_str()),
                    _ => self.op(op.as_str()),
                }
                self.expr(rhs, right_ctx);
                if wrap {
                    self.punct(")");
                }
            }
            Expr::Unary { op, operand } => {
                let wrap = UNARY_PRECEDENCE < min_prec;
                if wrap {
                    self.punct("(");
                }
                match op {
                    UnOp::Not => self.word("not"),
                    UnOp::Neg => self.punct("-"),
                    UnOp::Len => self.punct("#"),
                }
                self.expr(operand, UNARY_PRECEDENCE);
                if wrap {
                    self.punct(")");
                }
            }
            Expr::Function(body) => {
                self.word("function");
                self.func_rest(body, false);
            }
            Expr::Table(fields) => {
                self.punct("{");
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        self.comma();
                    }
                    match field {
                        TableField::Item(value) => self.expr(value, 0),
                        TableField::Named { name, value } => {
                            self.word(name);
                            self.op("=");
                            self.expr(value, 0);
                        }
                        TableField::Keyed { key, value } => {
                            self.punct("[");
                            self.expr(key, 0);
                            self.punct("]");
                            self.op("=");
                            self.expr(value, 0);
                        }
                    }
                }
                self.punct("}");
            }
            Expr::Paren(inner) => {
                self.punct("(");
                self.expr(inner, 0);
                self.punct(")");
            }
        }
    }

    /// A call or member base must be a prefix expression; anything else is
    /// wrapped to stay parseable.
    fn prefix(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(_)
            | Expr::Member { .. }
            | Expr::Index { .. }
            | Expr::Call { .. }
            | Expr::MethodCall { .. }
            | Expr::Paren(_) => self.expr(expr, 0),
            _ => {
                self.punct("(");
                self.expr(expr, 0);
                self.punct(")");
            }
        }
    }

    fn call_args(&mut self, args: &[Expr]) {
        self.punct("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.comma();
            }
            self.expr(arg, 0);
        }
        self.punct(")");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn beautiful(src: &str) -> String {
        format_beautiful(&parse(src).unwrap())
    }

    fn mini(src: &str) -> String {
        format_mini(&parse(src).unwrap())
    }

    #[test]
    fn test_beautiful_round_trips() {
        let src = "local x = 1\nfunction add(a, b)\n    return a + b\nend\nprint(add(x, 2))\n";
        assert_eq!(beautiful(src), src);
    }

    #[test]
    fn test_method_and_member() {
        let src = "local T = {}\nT.__index = T\nfunction T:make()\n    return setmetatable({}, T)\nend\n";
        assert_eq!(beautiful(src), src);
    }

    #[test]
    fn test_precedence_parens_preserved() {
        assert_eq!(beautiful("x = (1 + 2) * 3"), "x = (1 + 2) * 3\n");
        assert_eq!(beautiful("x = 1 + 2 * 3"), "x = 1 + 2 * 3\n");
        assert_eq!(beautiful("x = -y ^ 2"), "x = -y ^ 2\n");
        assert_eq!(beautiful("x = a .. b .. c"), "x = a .. b .. c\n");
        assert_eq!(beautiful("x = (a .. b) .. c"), "x = (a .. b) .. c\n");
    }

    #[test]
    fn test_mini_is_reparseable() {
        let src = "local x = 10\nlocal msg = \"hi\"\nif x > 1 then print(msg .. 1 .. x) end";
        let compact = mini(src);
        assert!(compact.len() < src.len());
        let reparsed = parse(&compact).unwrap();
        assert_eq!(reparsed, parse(src).unwrap());
    }

    #[test]
    fn test_mini_statement_boundary() {
        let compact = mini("f()\n(g)()");
        assert!(compact.contains(';'));
        assert!(parse(&compact).is_ok());
    }

    #[test]
    fn test_mini_concat_number_spacing() {
        let compact = mini("x = 1 .. 2");
        assert_eq!(parse(&compact).unwrap(), parse("x = 1 .. 2").unwrap());
    }
}
