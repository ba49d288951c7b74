//! Statement and declaration execution. Every statement transitions
//! `Normal -> Normal` on completion or `Normal -> Returning` on `return`;
//! iterating forms (`Block`, `If`, `While`, `For`) propagate a `Returning`
//! straight back up instead of continuing.

use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::eval::{eval_expr, Ctx};
use crate::parse_tree::ParseTreeSpan;
use crate::pool::ObjectRef;
use crate::scope::ScopeHandle;
use crate::util::Trace;
use crate::value::Value;

/// Print a statement/declaration dispatch trace line when the caller opted
/// into `Trace::Default` or above, behind a `cfg(debug_assertions)`-gated
/// `println!` call site.
#[cfg(debug_assertions)]
fn trace_dispatch(ctx: &Ctx, what: &str, span: &ParseTreeSpan) {
    if ctx.trace.at_least(Trace::Default) {
        println!("[trace] {} at token {} ('{}')", what, span.first_token(), ctx.tokenization.text_at(span.first_token()));
    }
}
#[cfg(not(debug_assertions))]
fn trace_dispatch(_ctx: &Ctx, _what: &str, _span: &ParseTreeSpan) {}

#[derive(Clone)]
pub enum Flow {
    Normal,
    Returning(ObjectRef),
}

impl Flow {
    fn is_returning(&self) -> bool {
        matches!(self, Flow::Returning(_))
    }
}

/// Run every declaration at the top of a parsed source file in order,
/// stopping early (without error) if a bare top-level `return` fires.
pub fn exec_program(ctx: &Ctx, scope: &ScopeHandle, program: &ParseTreeSpan) -> LoxResult<()> {
    for decl in program.children() {
        if exec_decl(ctx, scope, &decl)?.is_returning() {
            break;
        }
    }
    Ok(())
}

pub fn exec_decl(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<Flow> {
    let r = ctx.rules;
    let rule = span.rule_name_id();
    trace_dispatch(ctx, "declaration", span);

    if rule == r.decl_var {
        let name_span = span.child(0).expect("var decl has a name");
        let name_id = ctx.tokenization.token_id_at(name_span.first_token());
        let value = match span.child(1) {
            Some(initializer) => eval_expr(ctx, scope, &initializer)?,
            None => ctx.pool.make(Value::None),
        };
        scope.define(name_id, value).map_err(|e| e.at(name_span.first_token()))?;
        return Ok(Flow::Normal);
    }
    if rule == r.decl_fun {
        define_function(ctx, scope, span, scope.clone())?;
        return Ok(Flow::Normal);
    }
    if rule == r.decl_class {
        exec_class_decl(ctx, scope, span)?;
        return Ok(Flow::Normal);
    }
    if rule == r.decl_stmt {
        let stmt = span.child(0).expect("decl-stmt wraps one statement");
        return exec_stmt(ctx, scope, &stmt);
    }

    Err(LoxError::assert(format!("unhandled declaration rule at token {}", span.first_token())))
}

/// Define `fun name(params) { body }` into `define_into`: pre-define the
/// name as `none` first so the function's own body can reference itself
/// recursively, then overwrite it with the real closure.
fn define_function(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan, closure: ScopeHandle) -> LoxResult<()> {
    let name_span = span.child(0).expect("fun decl has a name");
    let name_id = ctx.tokenization.token_id_at(name_span.first_token());
    let name_text: Rc<str> = Rc::from(ctx.tokenization.text_at(name_span.first_token()));

    scope.define(name_id, ctx.pool.make(Value::None)).map_err(|e| e.at(name_span.first_token()))?;
    let function = ctx.pool.make(Value::Function(Rc::new(crate::value::FunctionData {
        span: span.clone(),
        closure,
        name_id,
        name: name_text,
    })));
    scope.assign(name_id, function).map_err(|e| e.at(name_span.first_token()))?;
    Ok(())
}

fn exec_class_decl(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<()> {
    let name_span = span.child(0).expect("class decl has a name");
    let name_id = ctx.tokenization.token_id_at(name_span.first_token());
    let name_text: Rc<str> = Rc::from(ctx.tokenization.text_at(name_span.first_token()));
    scope.define(name_id, ctx.pool.make(Value::None)).map_err(|e| e.at(name_span.first_token()))?;

    let mut rest = span.children().skip(1);
    let mut superclass: Option<ObjectRef> = None;
    let mut first_method = rest.next();

    if let Some(maybe_super) = &first_method {
        if maybe_super.rule_name_id() == ctx.rules.atom_identifier {
            let super_id = ctx.tokenization.token_id_at(maybe_super.first_token());
            let super_value = scope.get(super_id).map_err(|e| e.at(maybe_super.first_token()))?;
            super_value.get().as_class().map_err(|e| e.at(maybe_super.first_token()))?;
            superclass = Some(super_value);
            first_method = rest.next();
        }
    }

    // Methods close over a child arm of the declaring scope; when there is
    // a superclass, that arm also carries `super` so `super.name` resolves
    // through ordinary scope lookup.
    let method_closure = match &superclass {
        Some(sup) => {
            let arm = scope.make_child();
            arm.define(ctx.tokenization.super_id(), sup.clone())
                .expect("fresh arm never already defines 'super'");
            arm
        }
        None => scope.clone(),
    };

    let mut methods = std::collections::HashMap::new();
    for method_span in first_method.into_iter().chain(rest) {
        let method_name_span = method_span.child(0).expect("method has a name");
        let method_name_id = ctx.tokenization.token_id_at(method_name_span.first_token());
        let method_name_text: Rc<str> = Rc::from(ctx.tokenization.text_at(method_name_span.first_token()));
        let method_value = ctx.pool.make(Value::Function(Rc::new(crate::value::FunctionData {
            span: method_span.clone(),
            closure: method_closure.clone(),
            name_id: method_name_id,
            name: method_name_text,
        })));
        methods.insert(method_name_id, method_value);
    }

    let class = ctx.pool.make(Value::Class(Rc::new(crate::value::ClassData {
        name_id,
        name: name_text,
        methods,
        superclass,
    })));
    scope.assign(name_id, class).map_err(|e| e.at(name_span.first_token()))?;
    Ok(())
}

pub fn exec_stmt(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<Flow> {
    let r = ctx.rules;
    let rule = span.rule_name_id();
    trace_dispatch(ctx, "statement", span);

    if rule == r.stmt_print {
        let value = eval_expr(ctx, scope, &span.child(0).expect("print has an expression"))?;
        let text = crate::value::stringify(&value.get());
        let mut out = ctx.stdout.borrow_mut();
        writeln!(out, "{}", text).map_err(|e| LoxError::fatal(format!("write to stdout failed: {}", e)))?;
        return Ok(Flow::Normal);
    }
    if rule == r.stmt_expr {
        eval_expr(ctx, scope, &span.child(0).expect("expr-stmt has an expression"))?;
        return Ok(Flow::Normal);
    }
    if rule == r.stmt_return {
        let value = match span.child(0) {
            Some(expr) => eval_expr(ctx, scope, &expr)?,
            None => ctx.pool.make(Value::None),
        };
        return Ok(Flow::Returning(value));
    }
    if rule == r.stmt_block {
        let inner = scope.make_child();
        for decl in span.children() {
            let flow = exec_decl(ctx, &inner, &decl)?;
            if flow.is_returning() {
                return Ok(flow);
            }
        }
        return Ok(Flow::Normal);
    }
    if rule == r.stmt_if {
        let cond = eval_expr(ctx, scope, &span.child(0).expect("if has a condition"))?;
        if cond.get().is_truthy() {
            return exec_stmt(ctx, scope, &span.child(1).expect("if has a then-branch"));
        } else if let Some(else_branch) = span.child(2) {
            return exec_stmt(ctx, scope, &else_branch);
        }
        return Ok(Flow::Normal);
    }
    if rule == r.stmt_while {
        let cond_span = span.child(0).expect("while has a condition");
        let body_span = span.child(1).expect("while has a body");
        loop {
            let cond = eval_expr(ctx, scope, &cond_span)?;
            if !cond.get().is_truthy() {
                return Ok(Flow::Normal);
            }
            let flow = exec_stmt(ctx, scope, &body_span)?;
            if flow.is_returning() {
                return Ok(flow);
            }
        }
    }
    if rule == r.stmt_for {
        return exec_for(ctx, scope, span);
    }

    Err(LoxError::assert(format!("unhandled statement rule at token {}", span.first_token())))
}

/// `for (init; cond; incr) body` desugars to running `init` in a new scope
/// that encloses the whole loop, then looping `while(cond) { body; incr }`
/// in that same scope. A `none`/empty condition slot means "always true",
/// per the Lox convention this crate's design notes settled on.
fn exec_for(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<Flow> {
    let init_span = span.child(0).expect("for has an init slot");
    let cond_span = span.child(1).expect("for has a condition slot");
    let incr_span = span.child(2).expect("for has an increment slot");
    let body_span = span.child(3).expect("for has a body");

    let loop_scope = scope.make_child();
    if init_span.token_range().1 > 0 {
        if init_span.rule_name_id() == ctx.rules.decl_var {
            exec_decl(ctx, &loop_scope, &init_span)?;
        } else {
            exec_stmt(ctx, &loop_scope, &init_span)?;
        }
    }

    loop {
        let proceed = if cond_span.token_range().1 > 0 {
            eval_expr(ctx, &loop_scope, &cond_span)?.get().is_truthy()
        } else {
            true
        };
        if !proceed {
            return Ok(Flow::Normal);
        }

        let flow = exec_stmt(ctx, &loop_scope, &body_span)?;
        if flow.is_returning() {
            return Ok(flow);
        }

        if incr_span.token_range().1 > 0 {
            eval_expr(ctx, &loop_scope, &incr_span)?;
        }
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::parser::{parse_source, Rules};
    use crate::pool::Pool;
    use crate::token::tokenize;
    use crate::util::SourceText;
    use crate::ward::NameWard;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn run(src: &str) -> String {
        let mut ward = NameWard::new();
        let rules = Rules::new(&mut ward);
        let source = SourceText::new("<test>", src);
        let tokenization = tokenize(&source).expect("tokenizes");
        let program = parse_source(&tokenization, &mut ward, &rules).expect("parses");
        let pool = Pool::new();
        let buffer: Rc<RefCell<Vec<u8>>> = Rc::new(RefCell::new(Vec::new()));
        let stdout: Rc<RefCell<dyn std::io::Write>> = buffer.clone();
        let ctx = Ctx {
            pool: &pool,
            tokenization: &tokenization,
            rules: &rules,
            stdout: &stdout,
            trace: crate::util::Trace::None,
        };
        let root = ScopeHandle::new_root();
        exec_program(&ctx, &root, &program).expect("executes");
        String::from_utf8(buffer.borrow().clone()).expect("output is valid utf-8")
    }

    #[test]
    fn arithmetic_print() {
        assert_eq!(run("print 1 + 2;"), "3\n");
    }

    #[test]
    fn string_concatenation() {
        assert_eq!(run(r#"var a = "hi"; var b = " there"; print a + b;"#), "hi there\n");
    }

    #[test]
    fn recursive_fibonacci() {
        assert_eq!(
            run("fun fib(n){ if (n<2) return n; return fib(n-1)+fib(n-2);} print fib(10);"),
            "55\n"
        );
    }

    #[test]
    fn closures_share_mutable_captured_state() {
        assert_eq!(
            run("fun make(){var c=0; fun inc(){c=c+1; return c;} return inc;} var f=make(); print f(); print f(); print f();"),
            "1\n2\n3\n"
        );
    }

    #[test]
    fn single_inheritance_dispatches_inherited_methods() {
        assert_eq!(run(r#"class A{ greet(){ print "hi";}} class B < A {} B().greet();"#), "hi\n");
    }

    #[test]
    fn bound_methods_mutate_instance_state() {
        assert_eq!(
            run("class Counter{ init(){this.n=0;} bump(){this.n=this.n+1; return this.n;}} var c=Counter(); print c.bump(); print c.bump();"),
            "1\n2\n"
        );
    }

    #[test]
    fn for_loop_with_missing_condition_runs_until_explicit_return() {
        assert_eq!(
            run("fun f(){ for(var i=0;;i=i+1){ if (i>=3) return i; } } print f();"),
            "3\n"
        );
    }

    #[test]
    fn while_loop_propagates_return_out_of_its_body() {
        assert_eq!(run("fun f(){ while(true){ return 42; } } print f();"), "42\n");
    }

    #[test]
    fn super_dispatches_to_the_parent_classs_method() {
        assert_eq!(
            run(r#"class A{ greet(){ print "base";}} class B < A { greet(){ super.greet(); print "derived"; }} B().greet();"#),
            "base\nderived\n"
        );
    }
}
