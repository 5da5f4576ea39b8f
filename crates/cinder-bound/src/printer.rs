//! C#-like pseudo-code printer for bound trees.
//!
//! Output is for humans (the CLI, test failure messages and snapshot-style
//! assertions); it is not meant to be reparsed.
//!
//! ```text
//! bool MoveNext()
//! {
//!     cachedState = this.state;
//!     switch (cachedState)
//!     {
//!         case 0:
//!             goto initial_0;
//!     }
//!     return false;
//! initial_0:
//!     this.state = -1;
//!     ...
//! }
//! ```
//!
//! Labels are outdented one level so jump targets stand out.

use crate::factory::{BoundTables, SynthesizedMethod};
use crate::tree::{BoundCatchBlock, BoundExpr, BoundStatement, Callee, Literal};
use cinder_common::limits::MAX_PRINT_DEPTH;
use std::fmt::Write as _;

pub struct BoundPrinter<'a> {
    tables: &'a BoundTables,
    parameters: &'a [String],
    output: String,
    indent_level: u32,
    indent_str: &'static str,
    depth: u32,
}

impl<'a> BoundPrinter<'a> {
    pub const fn new(tables: &'a BoundTables) -> Self {
        Self {
            tables,
            parameters: &[],
            output: String::new(),
            indent_level: 0,
            indent_str: "    ",
            depth: 0,
        }
    }

    /// Print a single statement.
    pub fn emit_to_string(tables: &BoundTables, statement: &BoundStatement) -> String {
        let mut printer = BoundPrinter::new(tables);
        printer.emit_statement(statement);
        printer.finish()
    }

    /// Print a method signature followed by its body.
    pub fn method_to_string(tables: &BoundTables, method: &SynthesizedMethod) -> String {
        let mut printer = BoundPrinter::new(tables);
        printer.emit_method(method);
        printer.finish()
    }

    pub fn set_indent_level(&mut self, level: u32) {
        self.indent_level = level;
    }

    pub fn finish(self) -> String {
        self.output
    }

    // =========================================================================
    // Methods
    // =========================================================================

    pub fn emit_method(&mut self, method: &'a SynthesizedMethod) {
        self.parameters = &method.parameters;
        self.write_indent();
        if method.is_static {
            self.write("static ");
        }
        if !method.return_type.is_empty() {
            self.write(&method.return_type);
            self.write(" ");
        }
        self.write(&method.name);
        self.write("(");
        for (i, param) in method.parameters.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.write("int ");
            self.write(param);
        }
        self.write(")");
        self.write_line();
        match &method.body {
            Some(BoundStatement::Block(statements)) => self.emit_braced(statements),
            Some(other) => self.emit_braced(std::slice::from_ref(other)),
            None => {
                self.write_indent();
                self.write("{ }");
                self.write_line();
            }
        }
        self.parameters = &[];
    }

    // =========================================================================
    // Statements
    // =========================================================================

    pub fn emit_statement(&mut self, statement: &BoundStatement) {
        if self.depth >= MAX_PRINT_DEPTH {
            self.write_indent();
            self.write("...");
            self.write_line();
            return;
        }
        self.depth += 1;
        self.emit_statement_inner(statement);
        self.depth -= 1;
    }

    fn emit_statement_inner(&mut self, statement: &BoundStatement) {
        let tables = self.tables;
        match statement {
            BoundStatement::Block(statements) => self.emit_braced(statements),
            BoundStatement::Expression(expr) => {
                self.write_indent();
                self.emit_expr(expr);
                self.write(";");
                self.write_line();
            }
            BoundStatement::Label(label) => {
                self.decrease_indent();
                self.write_indent();
                self.write(tables.label_name(*label));
                self.write(":");
                self.write_line();
                self.increase_indent();
            }
            BoundStatement::Goto(label) => {
                self.write_indent();
                self.write("goto ");
                self.write(tables.label_name(*label));
                self.write(";");
                self.write_line();
            }
            BoundStatement::ConditionalGoto {
                condition,
                jump_if_true,
                label,
            } => {
                self.write_indent();
                self.write("if (");
                if *jump_if_true {
                    self.emit_expr(condition);
                } else {
                    self.write("!(");
                    self.emit_expr(condition);
                    self.write(")");
                }
                self.write(") goto ");
                self.write(tables.label_name(*label));
                self.write(";");
                self.write_line();
            }
            BoundStatement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.write_indent();
                self.write("if (");
                self.emit_expr(condition);
                self.write(")");
                self.write_line();
                self.emit_nested(then_branch);
                if let Some(else_branch) = else_branch {
                    self.write_indent();
                    self.write("else");
                    self.write_line();
                    self.emit_nested(else_branch);
                }
            }
            BoundStatement::Switch {
                expression,
                sections,
            } => {
                self.write_indent();
                self.write("switch (");
                self.emit_expr(expression);
                self.write(")");
                self.write_line();
                self.write_indent();
                self.write("{");
                self.write_line();
                self.increase_indent();
                for section in sections {
                    for value in &section.values {
                        self.write_indent();
                        let _ = write!(self.output, "case {value}:");
                        self.write_line();
                    }
                    self.increase_indent();
                    for statement in &section.body {
                        self.emit_statement(statement);
                    }
                    self.decrease_indent();
                }
                self.decrease_indent();
                self.write_indent();
                self.write("}");
                self.write_line();
            }
            BoundStatement::Try {
                try_block,
                catch_blocks,
                finally_block,
                prefer_fault_handler,
                ..
            } => {
                self.write_indent();
                self.write("try");
                self.write_line();
                self.emit_nested(try_block);
                for catch in catch_blocks {
                    self.emit_catch(catch);
                }
                if let Some(finally_block) = finally_block {
                    self.write_indent();
                    self.write(if *prefer_fault_handler { "fault" } else { "finally" });
                    self.write_line();
                    self.emit_nested(finally_block);
                }
            }
            BoundStatement::YieldReturn { expr, .. } => {
                self.write_indent();
                self.write("yield return ");
                self.emit_expr(expr);
                self.write(";");
                self.write_line();
            }
            BoundStatement::YieldBreak => {
                self.write_indent();
                self.write("yield break;");
                self.write_line();
            }
            BoundStatement::Return(expr) => {
                self.write_indent();
                match expr {
                    Some(expr) => {
                        self.write("return ");
                        self.emit_expr(expr);
                        self.write(";");
                    }
                    None => self.write("return;"),
                }
                self.write_line();
            }
            BoundStatement::Throw(expr) => {
                self.write_indent();
                self.write("throw ");
                self.emit_expr(expr);
                self.write(";");
                self.write_line();
            }
        }
    }

    fn emit_catch(&mut self, catch: &BoundCatchBlock) {
        let tables = self.tables;
        self.write_indent();
        match catch.local {
            Some(local) => {
                self.write("catch (");
                self.write(tables.local_name(local));
                self.write(")");
            }
            None => self.write("catch"),
        }
        self.write_line();
        self.emit_nested(&catch.body);
    }

    /// Print a statement that must appear braced (try/if bodies).
    fn emit_nested(&mut self, statement: &BoundStatement) {
        match statement {
            BoundStatement::Block(statements) => self.emit_braced(statements),
            other => self.emit_braced(std::slice::from_ref(other)),
        }
    }

    fn emit_braced(&mut self, statements: &[BoundStatement]) {
        self.write_indent();
        self.write("{");
        self.write_line();
        self.increase_indent();
        for statement in statements {
            self.emit_statement(statement);
        }
        self.decrease_indent();
        self.write_indent();
        self.write("}");
        self.write_line();
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    pub fn emit_expr(&mut self, expr: &BoundExpr) {
        let tables = self.tables;
        match expr {
            BoundExpr::Literal(literal) => match literal {
                Literal::Null => self.write("null"),
                Literal::Bool(value) => self.write(if *value { "true" } else { "false" }),
                Literal::Int(value) => {
                    let _ = write!(self.output, "{value}");
                }
                Literal::Str(value) => {
                    let _ = write!(self.output, "{value:?}");
                }
            },
            BoundExpr::Local(local) => self.write(tables.local_name(*local)),
            BoundExpr::Parameter(index) => {
                match self.parameters.get(*index as usize) {
                    Some(name) => self.output.push_str(name),
                    None => {
                        let _ = write!(self.output, "arg{index}");
                    }
                }
            }
            BoundExpr::This => self.write("this"),
            BoundExpr::Field { receiver, field } => {
                self.emit_operand(receiver);
                self.write(".");
                self.write(tables.field_name(*field));
            }
            BoundExpr::Assign { target, value } => {
                self.emit_expr(target);
                self.write(" = ");
                self.emit_expr(value);
            }
            BoundExpr::Binary { op, left, right } => {
                self.emit_operand(left);
                self.write(" ");
                self.write(op.as_str());
                self.write(" ");
                self.emit_operand(right);
            }
            BoundExpr::Not(operand) => {
                self.write("!");
                self.emit_operand(operand);
            }
            BoundExpr::Call {
                receiver,
                callee,
                args,
            } => {
                if let Some(receiver) = receiver {
                    self.emit_operand(receiver);
                    self.write(".");
                }
                match callee {
                    Callee::Synthesized(method) => self.write(tables.method_name(*method)),
                    Callee::Host(name) => self.write(name),
                }
                self.emit_args(args);
            }
            BoundExpr::New { type_name, args } => {
                self.write("new ");
                self.write(type_name);
                self.emit_args(args);
            }
        }
    }

    /// Parenthesize compound subexpressions.
    fn emit_operand(&mut self, expr: &BoundExpr) {
        if matches!(expr, BoundExpr::Binary { .. } | BoundExpr::Assign { .. }) {
            self.write("(");
            self.emit_expr(expr);
            self.write(")");
        } else {
            self.emit_expr(expr);
        }
    }

    fn emit_args(&mut self, args: &[BoundExpr]) {
        self.write("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.write(", ");
            }
            self.emit_expr(arg);
        }
        self.write(")");
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn write_line(&mut self) {
        self.output.push('\n');
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent_level {
            self.output.push_str(self.indent_str);
        }
    }

    const fn increase_indent(&mut self) {
        self.indent_level += 1;
    }

    const fn decrease_indent(&mut self) {
        if self.indent_level > 0 {
            self.indent_level -= 1;
        }
    }
}

#[cfg(test)]
#[path = "../tests/printer_tests.rs"]
mod tests;
