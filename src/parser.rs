//! A small, unadorned recursive-descent parser over a `Tokenization`,
//! producing the flat pre-order `ParseTree` the evaluator/executor walk.
//!
//! This is not the general grammar/parser "seed" engine the rest of this
//! repo's source tree once built towards — there is no grammar DSL, no
//! packrat cache, no left-recursion analysis. It exists only to turn real
//! `.lox` source into a real `ParseTreeSpan`, with one hand-written
//! function per grammar rule, mirroring the precedence table: assignment,
//! `or`, `and`, equality, comparison, term, factor, unary, call, primary.

use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::parse_tree::{ParseNode, ParseTree, ParseTreeSpan};
use crate::token::{TokenCategory, Tokenization};
use crate::ward::{NameId, NameWard};

/// Names of every rule the parser can produce, interned once up front so
/// dispatch in `eval`/`exec` is a `NameId` comparison against these.
pub struct Rules {
    pub lox: NameId,

    pub decl_var: NameId,
    pub decl_fun: NameId,
    pub decl_class: NameId,
    pub decl_stmt: NameId,

    pub stmt_print: NameId,
    pub stmt_if: NameId,
    pub stmt_while: NameId,
    pub stmt_for: NameId,
    pub stmt_return: NameId,
    pub stmt_block: NameId,
    pub stmt_expr: NameId,

    pub expr_assign: NameId,
    pub expr_or: NameId,
    pub expr_and: NameId,
    pub expr_eq: NameId,
    pub expr_neq: NameId,
    pub expr_lt: NameId,
    pub expr_gt: NameId,
    pub expr_lte: NameId,
    pub expr_gte: NameId,
    pub expr_add: NameId,
    pub expr_sub: NameId,
    pub expr_mul: NameId,
    pub expr_div: NameId,
    pub expr_not: NameId,
    pub expr_neg: NameId,
    pub expr_call: NameId,
    pub expr_member: NameId,
    pub expr_primary: NameId,

    pub atom_true: NameId,
    pub atom_false: NameId,
    pub atom_none: NameId,
    pub atom_this: NameId,
    pub atom_super: NameId,
    pub atom_number: NameId,
    pub atom_string: NameId,
    pub atom_identifier: NameId,
}

impl Rules {
    pub fn new(ward: &mut NameWard) -> Self {
        let lox = ward.path(&["Lox"]);
        macro_rules! rule {
            ($($seg:expr),+) => {
                ward.path(&[$($seg),+])
            };
        }
        Self {
            lox,
            decl_var: rule!("Lox", "Decl", "Var"),
            decl_fun: rule!("Lox", "Decl", "Fun"),
            decl_class: rule!("Lox", "Decl", "Class"),
            decl_stmt: rule!("Lox", "Decl", "Stmt"),

            stmt_print: rule!("Lox", "Stmt", "Print"),
            stmt_if: rule!("Lox", "Stmt", "If"),
            stmt_while: rule!("Lox", "Stmt", "While"),
            stmt_for: rule!("Lox", "Stmt", "For"),
            stmt_return: rule!("Lox", "Stmt", "Return"),
            stmt_block: rule!("Lox", "Stmt", "Block"),
            stmt_expr: rule!("Lox", "Stmt", "Expr"),

            expr_assign: rule!("Lox", "Expr", "Assign"),
            expr_or: rule!("Lox", "Expr", "Or"),
            expr_and: rule!("Lox", "Expr", "And"),
            expr_eq: rule!("Lox", "Expr", "Binary", "Eq"),
            expr_neq: rule!("Lox", "Expr", "Binary", "Neq"),
            expr_lt: rule!("Lox", "Expr", "Binary", "Lt"),
            expr_gt: rule!("Lox", "Expr", "Binary", "Gt"),
            expr_lte: rule!("Lox", "Expr", "Binary", "Lte"),
            expr_gte: rule!("Lox", "Expr", "Binary", "Gte"),
            expr_add: rule!("Lox", "Expr", "Binary", "Add"),
            expr_sub: rule!("Lox", "Expr", "Binary", "Sub"),
            expr_mul: rule!("Lox", "Expr", "Binary", "Mul"),
            expr_div: rule!("Lox", "Expr", "Binary", "Div"),
            expr_not: rule!("Lox", "Expr", "Unary", "Not"),
            expr_neg: rule!("Lox", "Expr", "Unary", "Neg"),
            expr_call: rule!("Lox", "Expr", "Call"),
            expr_member: rule!("Lox", "Expr", "Member"),
            expr_primary: rule!("Lox", "Expr", "Primary"),

            atom_true: rule!("Lox", "Atom", "True"),
            atom_false: rule!("Lox", "Atom", "False"),
            atom_none: rule!("Lox", "Atom", "None"),
            atom_this: rule!("Lox", "Atom", "This"),
            atom_super: rule!("Lox", "Atom", "Super"),
            atom_number: rule!("Lox", "Atom", "Number"),
            atom_string: rule!("Lox", "Atom", "String"),
            atom_identifier: rule!("Lox", "Atom", "Identifier"),
        }
    }
}

/// Growable pre-order node buffer plus a cursor into the token stream.
struct Builder<'a> {
    tokenization: &'a Tokenization,
    rules: &'a Rules,
    pos: usize,
    nodes: Vec<ParseNode>,
}

/// Marks where in `nodes` a rule's children start, so the caller can close
/// it out with the correct `subtree_size`/`num_children` once known.
struct Mark(usize);

impl<'a> Builder<'a> {
    fn len(&self) -> usize {
        self.tokenization.len()
    }

    fn peek_category(&self) -> Option<TokenCategory> {
        if self.pos < self.len() {
            Some(self.tokenization.category_at(self.pos))
        } else {
            None
        }
    }

    fn peek_text(&self) -> Option<&str> {
        if self.pos < self.len() {
            Some(self.tokenization.text_at(self.pos))
        } else {
            None
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.len()
    }

    fn check(&self, text: &str) -> bool {
        self.peek_text() == Some(text)
    }

    fn advance(&mut self) -> usize {
        let here = self.pos;
        self.pos += 1;
        here
    }

    fn expect(&mut self, text: &str) -> LoxResult<usize> {
        if self.check(text) {
            Ok(self.advance())
        } else {
            Err(self.error(format!(
                "expected '{}', found {}",
                text,
                self.peek_text().unwrap_or("<eof>")
            )))
        }
    }

    fn error(&self, message: impl Into<String>) -> LoxError {
        let err = LoxError::minor(message);
        if self.pos < self.len() {
            err.at(self.pos)
        } else {
            err
        }
    }

    /// Begin a rule: records where its children will start.
    fn open(&self) -> Mark {
        Mark(self.nodes.len())
    }

    /// Close a rule opened at `mark`, inserting its own node before its
    /// children and filling in `subtree_size`/`num_children` from what was
    /// pushed since. `token_begin`/`token_length` describe the whole rule's
    /// token span.
    fn close(
        &mut self,
        mark: Mark,
        rule_name_id: NameId,
        token_begin: usize,
        token_length: usize,
        num_children: usize,
    ) {
        let subtree_size = self.nodes.len() - mark.0 + 1;
        self.nodes.insert(
            mark.0,
            ParseNode { rule_name_id, token_begin, token_length, subtree_size, num_children },
        );
    }
}

/// Parse a whole source file's tokens into a `ParseTree` rooted at `Lox`.
pub fn parse(tokenization: &Tokenization, ward: &mut NameWard, rules: &Rules) -> LoxResult<Rc<ParseTree>> {
    let mut b = Builder { tokenization, rules, pos: 0, nodes: Vec::new() };
    let mark = b.open();
    let mut num_children = 0;
    while !b.at_end() {
        parse_decl(&mut b, ward)?;
        num_children += 1;
    }
    let length = tokenization.len();
    b.close(mark, rules.lox, 0, length, num_children);
    let tree = ParseTree { nodes: std::mem::take(&mut b.nodes), tokens: (0..tokenization.len())
        .map(|i| tokenization.token_id_at(i))
        .collect() };
    Ok(Rc::new(tree))
}

fn parse_decl(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    if b.check("var") {
        parse_var_decl(b, ward)
    } else if b.check("fun") {
        parse_fun_decl(b, ward, b.rules.decl_fun)
    } else if b.check("class") {
        parse_class_decl(b, ward)
    } else {
        let mark = b.open();
        let begin = b.pos;
        parse_stmt(b, ward)?;
        b.close(mark, b.rules.decl_stmt, begin, b.pos - begin, 1);
        Ok(())
    }
}

fn parse_var_decl(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("var")?;
    parse_identifier_atom(b, ward)?;
    let mut num_children = 1;
    if b.check("=") {
        b.advance();
        parse_expr(b, ward)?;
        num_children += 1;
    }
    b.expect(";")?;
    b.close(mark, b.rules.decl_var, begin, b.pos - begin, num_children);
    Ok(())
}

fn parse_fun_decl(b: &mut Builder, ward: &mut NameWard, rule: NameId) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    if b.check("fun") {
        b.advance();
    }
    parse_identifier_atom(b, ward)?; // name
    let mut num_children = 1;
    b.expect("(")?;
    while !b.check(")") {
        parse_identifier_atom(b, ward)?; // parameter
        num_children += 1;
        if b.check(",") {
            b.advance();
        } else {
            break;
        }
    }
    b.expect(")")?;
    parse_block(b, ward)?; // body
    num_children += 1;
    b.close(mark, rule, begin, b.pos - begin, num_children);
    Ok(())
}

fn parse_class_decl(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("class")?;
    parse_identifier_atom(b, ward)?; // name
    let mut num_children = 1;
    if b.check("<") {
        b.advance();
        parse_identifier_atom(b, ward)?; // superclass name
        num_children += 1;
    }
    b.expect("{")?;
    while !b.check("}") {
        parse_fun_decl(b, ward, b.rules.decl_fun)?; // method (no leading `fun`)
        num_children += 1;
    }
    b.expect("}")?;
    b.close(mark, b.rules.decl_class, begin, b.pos - begin, num_children);
    Ok(())
}

fn parse_stmt(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    if b.check("print") {
        let mark = b.open();
        let begin = b.pos;
        b.advance();
        parse_expr(b, ward)?;
        b.expect(";")?;
        b.close(mark, b.rules.stmt_print, begin, b.pos - begin, 1);
        Ok(())
    } else if b.check("if") {
        parse_if_stmt(b, ward)
    } else if b.check("while") {
        parse_while_stmt(b, ward)
    } else if b.check("for") {
        parse_for_stmt(b, ward)
    } else if b.check("return") {
        let mark = b.open();
        let begin = b.pos;
        b.advance();
        let mut num_children = 0;
        if !b.check(";") {
            parse_expr(b, ward)?;
            num_children = 1;
        }
        b.expect(";")?;
        b.close(mark, b.rules.stmt_return, begin, b.pos - begin, num_children);
        Ok(())
    } else if b.check("{") {
        parse_block(b, ward)
    } else {
        let mark = b.open();
        let begin = b.pos;
        parse_expr(b, ward)?;
        b.expect(";")?;
        b.close(mark, b.rules.stmt_expr, begin, b.pos - begin, 1);
        Ok(())
    }
}

fn parse_block(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("{")?;
    let mut num_children = 0;
    while !b.check("}") {
        parse_decl(b, ward)?;
        num_children += 1;
    }
    b.expect("}")?;
    b.close(mark, b.rules.stmt_block, begin, b.pos - begin, num_children);
    Ok(())
}

fn parse_if_stmt(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("if")?;
    b.expect("(")?;
    parse_expr(b, ward)?;
    b.expect(")")?;
    parse_stmt(b, ward)?;
    let mut num_children = 2;
    if b.check("else") {
        b.advance();
        parse_stmt(b, ward)?;
        num_children += 1;
    }
    b.close(mark, b.rules.stmt_if, begin, b.pos - begin, num_children);
    Ok(())
}

fn parse_while_stmt(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("while")?;
    b.expect("(")?;
    parse_expr(b, ward)?;
    b.expect(")")?;
    parse_stmt(b, ward)?;
    b.close(mark, b.rules.stmt_while, begin, b.pos - begin, 2);
    Ok(())
}

/// Desugars nothing at parse time; the executor desugars `for` into the
/// equivalent `while`, so the parser just records the three
/// (possibly absent) clauses plus the body as up to 4 children, in a fixed
/// order: init?, cond?, incr?, body. Absent clauses are recorded with a
/// zero-length marker child so the executor can tell slots apart by
/// position rather than by count.
fn parse_for_stmt(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    b.expect("for")?;
    b.expect("(")?;

    if b.check(";") {
        parse_empty_slot(b, ward, b.rules.decl_stmt);
        b.advance();
    } else if b.check("var") {
        parse_var_decl(b, ward)?;
    } else {
        let smark = b.open();
        let sbegin = b.pos;
        parse_expr(b, ward)?;
        b.expect(";")?;
        b.close(smark, b.rules.stmt_expr, sbegin, b.pos - sbegin, 1);
    }

    if b.check(";") {
        parse_empty_slot(b, ward, b.rules.expr_primary);
    } else {
        parse_expr(b, ward)?;
    }
    b.expect(";")?;

    if b.check(")") {
        parse_empty_slot(b, ward, b.rules.expr_primary);
    } else {
        parse_expr(b, ward)?;
    }
    b.expect(")")?;

    parse_stmt(b, ward)?;

    b.close(mark, b.rules.stmt_for, begin, b.pos - begin, 4);
    Ok(())
}

/// A zero-length placeholder node used for an omitted `for` clause.
fn parse_empty_slot(b: &mut Builder, _ward: &mut NameWard, rule: NameId) {
    let mark = b.open();
    b.close(mark, rule, b.pos, 0, 0);
}

// ---- expressions, by ascending precedence (assign binds loosest) ----

fn parse_expr(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    parse_assign(b, ward)
}

fn parse_assign(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    parse_or(b, ward)?;
    if b.check("=") {
        b.advance();
        parse_assign(b, ward)?;
        b.close(mark, b.rules.expr_assign, begin, b.pos - begin, 2);
    }
    Ok(())
}

macro_rules! left_assoc_binary {
    ($name:ident, $next:ident, $rule_of:expr) => {
        fn $name(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
            let mark = b.open();
            let begin = b.pos;
            $next(b, ward)?;
            loop {
                let op = match b.peek_text() {
                    Some(t) => t.to_string(),
                    None => break,
                };
                let rule = $rule_of(b, &op);
                match rule {
                    Some(rule) => {
                        b.advance();
                        $next(b, ward)?;
                        b.close(mark, rule, begin, b.pos - begin, 2);
                    }
                    None => break,
                }
            }
            Ok(())
        }
    };
}

left_assoc_binary!(parse_or, parse_and, |b: &Builder, op: &str| if op == "or" { Some(b.rules.expr_or) } else { None });
left_assoc_binary!(parse_and, parse_equality, |b: &Builder, op: &str| if op == "and" { Some(b.rules.expr_and) } else { None });
left_assoc_binary!(parse_equality, parse_comparison, |b: &Builder, op: &str| match op {
    "==" => Some(b.rules.expr_eq),
    "!=" => Some(b.rules.expr_neq),
    _ => None,
});
left_assoc_binary!(parse_comparison, parse_term, |b: &Builder, op: &str| match op {
    "<" => Some(b.rules.expr_lt),
    ">" => Some(b.rules.expr_gt),
    "<=" => Some(b.rules.expr_lte),
    ">=" => Some(b.rules.expr_gte),
    _ => None,
});
left_assoc_binary!(parse_term, parse_factor, |b: &Builder, op: &str| match op {
    "+" => Some(b.rules.expr_add),
    "-" => Some(b.rules.expr_sub),
    _ => None,
});
left_assoc_binary!(parse_factor, parse_unary, |b: &Builder, op: &str| match op {
    "*" => Some(b.rules.expr_mul),
    "/" => Some(b.rules.expr_div),
    _ => None,
});

fn parse_unary(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    if b.check("!") {
        b.advance();
        parse_unary(b, ward)?;
        b.close(mark, b.rules.expr_not, begin, b.pos - begin, 1);
        Ok(())
    } else if b.check("-") {
        b.advance();
        parse_unary(b, ward)?;
        b.close(mark, b.rules.expr_neg, begin, b.pos - begin, 1);
        Ok(())
    } else {
        parse_call(b, ward)
    }
}

fn parse_call(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let mark = b.open();
    let begin = b.pos;
    parse_primary(b, ward)?;
    loop {
        if b.check("(") {
            b.advance();
            let mut num_children = 1; // callee
            while !b.check(")") {
                parse_expr(b, ward)?;
                num_children += 1;
                if b.check(",") {
                    b.advance();
                } else {
                    break;
                }
            }
            b.expect(")")?;
            b.close(mark, b.rules.expr_call, begin, b.pos - begin, num_children);
        } else if b.check(".") {
            b.advance();
            parse_identifier_atom(b, ward)?;
            b.close(mark, b.rules.expr_member, begin, b.pos - begin, 2);
        } else {
            break;
        }
    }
    Ok(())
}

fn parse_primary(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    if b.check("(") {
        let mark = b.open();
        let begin = b.pos;
        b.advance();
        parse_expr(b, ward)?;
        b.expect(")")?;
        b.close(mark, b.rules.expr_primary, begin, b.pos - begin, 1);
        return Ok(());
    }
    parse_atom(b, ward)
}

fn parse_atom(b: &mut Builder, ward: &mut NameWard) -> LoxResult<()> {
    let category = b.peek_category();
    let text = b.peek_text().map(|s| s.to_string());
    match (category, text.as_deref()) {
        (_, Some("true")) => single_token_atom(b, b.rules.atom_true),
        (_, Some("false")) => single_token_atom(b, b.rules.atom_false),
        (_, Some("none")) => single_token_atom(b, b.rules.atom_none),
        (_, Some("this")) => single_token_atom(b, b.rules.atom_this),
        (_, Some("super")) => single_token_atom(b, b.rules.atom_super),
        (Some(TokenCategory::Number), _) => single_token_atom(b, b.rules.atom_number),
        (Some(TokenCategory::String), _) => single_token_atom(b, b.rules.atom_string),
        (Some(TokenCategory::Identifier), _) => parse_identifier_atom(b, ward),
        _ => Err(b.error(format!("unexpected token {}", text.unwrap_or_else(|| "<eof>".to_string())))),
    }
}

fn parse_identifier_atom(b: &mut Builder, _ward: &mut NameWard) -> LoxResult<()> {
    single_token_atom(b, b.rules.atom_identifier)
}

fn single_token_atom(b: &mut Builder, rule: NameId) -> LoxResult<()> {
    if b.at_end() {
        return Err(b.error("unexpected end of input"));
    }
    let mark = b.open();
    let begin = b.pos;
    b.advance();
    b.close(mark, rule, begin, 1, 0);
    Ok(())
}

/// Convenience: parse `source` through tokenization and produce the whole
/// `ParseTreeSpan`.
pub fn parse_source(
    tokenization: &Tokenization,
    ward: &mut NameWard,
    rules: &Rules,
) -> LoxResult<ParseTreeSpan> {
    let tree = parse(tokenization, ward, rules)?;
    Ok(ParseTreeSpan::whole(tree))
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::token::tokenize;
    use crate::util::SourceText;

    fn parse_str(src: &str) -> (NameWard, Rules, ParseTreeSpan) {
        let mut ward = NameWard::new();
        let rules = Rules::new(&mut ward);
        let source = SourceText::new("<test>", src);
        let tokenization = tokenize(&source).expect("tokenizes");
        let span = parse_source(&tokenization, &mut ward, &rules).expect("parses");
        (ward, rules, span)
    }

    #[test]
    fn parses_a_print_statement_into_one_decl_child() {
        let (_ward, rules, span) = parse_str("print 1 + 2;");
        assert_eq!(span.rule_name_id(), rules.lox);
        assert_eq!(span.num_children(), 1);
        let decl = span.child(0).unwrap();
        assert_eq!(decl.rule_name_id(), rules.decl_stmt);
        let print_stmt = decl.child(0).unwrap();
        assert_eq!(print_stmt.rule_name_id(), rules.stmt_print);
        let add = print_stmt.child(0).unwrap();
        assert_eq!(add.rule_name_id(), rules.expr_add);
    }

    #[test]
    fn respects_precedence_of_mul_over_add() {
        let (_ward, rules, span) = parse_str("print 1 + 2 * 3;");
        let print_stmt = span.child(0).unwrap().child(0).unwrap();
        let add = print_stmt.child(0).unwrap();
        assert_eq!(add.rule_name_id(), rules.expr_add);
        let rhs = add.child(1).unwrap();
        assert_eq!(rhs.rule_name_id(), rules.expr_mul);
    }

    #[test]
    fn parses_fun_decl_with_parameters_and_block_body() {
        let (_ward, rules, span) = parse_str("fun add(a, b) { return a + b; }");
        let decl = span.child(0).unwrap();
        assert_eq!(decl.rule_name_id(), rules.decl_fun);
        // name, a, b, body = 4 children
        assert_eq!(decl.num_children(), 4);
    }

    #[test]
    fn parses_class_with_superclass_and_method() {
        let (_ward, rules, span) = parse_str("class B < A { greet() { print \"hi\"; } }");
        let decl = span.child(0).unwrap();
        assert_eq!(decl.rule_name_id(), rules.decl_class);
        assert_eq!(decl.num_children(), 3); // name, superclass, method
    }

    #[test]
    fn parses_for_loop_with_all_four_slots() {
        let (_ward, rules, span) = parse_str("for (var i = 0; i < 3; i = i + 1) print i;");
        let decl = span.child(0).unwrap();
        let for_stmt = decl.child(0).unwrap();
        assert_eq!(for_stmt.rule_name_id(), rules.stmt_for);
        assert_eq!(for_stmt.num_children(), 4);
    }

    #[test]
    fn member_access_and_call_chain() {
        let (_ward, rules, span) = parse_str("a.b().c;");
        let decl = span.child(0).unwrap();
        let expr_stmt = decl.child(0).unwrap();
        assert_eq!(expr_stmt.rule_name_id(), rules.stmt_expr);
        let outer = expr_stmt.child(0).unwrap();
        assert_eq!(outer.rule_name_id(), rules.expr_member);
    }
}
