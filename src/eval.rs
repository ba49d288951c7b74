//! Expression evaluation. Walks a `ParseTreeSpan`, dispatching on the
//! node's rule-name identifier.

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::parse_tree::ParseTreeSpan;
use crate::parser::Rules;
use crate::pool::{ObjectRef, Pool};
use crate::scope::ScopeHandle;
use crate::token::{decode_number, decode_string, Tokenization};
use crate::util::Trace;
use crate::value::{self, Value};

/// Everything evaluation and execution need, grouped into one `Copy`
/// bundle of references so it threads through the recursive walk without
/// a method on a god object.
#[derive(Clone)]
pub struct Ctx<'a> {
    pub pool: &'a Pool,
    pub tokenization: &'a Tokenization,
    pub rules: &'a Rules,
    pub stdout: &'a Rc<RefCell<dyn Write>>,
    pub trace: Trace,
}

impl<'a> Ctx<'a> {
    fn token_text(&self, span: &ParseTreeSpan) -> &'a str {
        self.tokenization.text_at(span.first_token())
    }
}

pub fn eval_expr(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<ObjectRef> {
    let r = ctx.rules;
    let rule = span.rule_name_id();

    if rule == r.atom_true {
        return Ok(ctx.pool.make(Value::Bool(true)));
    }
    if rule == r.atom_false {
        return Ok(ctx.pool.make(Value::Bool(false)));
    }
    if rule == r.atom_none {
        return Ok(ctx.pool.make(Value::None));
    }
    if rule == r.atom_number {
        let text = ctx.token_text(span);
        let n = decode_number(text).map_err(|e| e.at(span.first_token()))?;
        return Ok(ctx.pool.make(Value::Double(n)));
    }
    if rule == r.atom_string {
        let raw = ctx.token_text(span);
        let body = &raw[1..raw.len() - 1];
        return Ok(ctx.pool.make(Value::String(Rc::from(decode_string(body).as_str()))));
    }
    if rule == r.atom_this {
        let token_id = ctx.tokenization.this_id();
        return scope.get(token_id).map_err(|e| e.at(span.first_token()));
    }
    if rule == r.atom_super {
        // `super` alone (outside `super.name`) is not a valid expression;
        // member access handles the `super.name` form directly.
        return Err(LoxError::minor("'super' must be followed by '.' and a method name").at(span.first_token()));
    }
    if rule == r.atom_identifier {
        let token_id = ctx.tokenization.token_id_at(span.first_token());
        return scope.get(token_id).map_err(|e| e.at(span.first_token()));
    }
    if rule == r.expr_primary {
        return eval_expr(ctx, scope, &span.child(0).expect("primary has one child"));
    }
    if rule == r.expr_not {
        let operand = eval_expr(ctx, scope, &span.child(0).expect("unary has an operand"))?;
        return value::inv(ctx.pool, &operand);
    }
    if rule == r.expr_neg {
        let operand = eval_expr(ctx, scope, &span.child(0).expect("unary has an operand"))?;
        return value::neg(ctx.pool, &operand);
    }
    if rule == r.expr_and {
        let lhs = eval_expr(ctx, scope, &span.child(0).expect("binary has a left operand"))?;
        if !lhs.get().is_truthy() {
            return Ok(lhs);
        }
        return eval_expr(ctx, scope, &span.child(1).expect("binary has a right operand"));
    }
    if rule == r.expr_or {
        let lhs = eval_expr(ctx, scope, &span.child(0).expect("binary has a left operand"))?;
        if lhs.get().is_truthy() {
            return Ok(lhs);
        }
        return eval_expr(ctx, scope, &span.child(1).expect("binary has a right operand"));
    }
    if let Some(op) = binary_arith_op(ctx, rule) {
        let lhs = eval_expr(ctx, scope, &span.child(0).expect("binary has a left operand"))?;
        let rhs = eval_expr(ctx, scope, &span.child(1).expect("binary has a right operand"))?;
        return op(ctx.pool, &lhs, &rhs).map_err(|e| e.at(span.first_token()));
    }
    if rule == r.expr_assign {
        return eval_assign(ctx, scope, span);
    }
    if rule == r.expr_call {
        return eval_call(ctx, scope, span);
    }
    if rule == r.expr_member {
        return eval_member(ctx, scope, span);
    }

    Err(LoxError::assert(format!("unhandled expression rule at token {}", span.first_token())))
}

type BinaryOp = fn(&Pool, &ObjectRef, &ObjectRef) -> LoxResult<ObjectRef>;

fn binary_arith_op(ctx: &Ctx, rule: crate::ward::NameId) -> Option<BinaryOp> {
    let r = ctx.rules;
    if rule == r.expr_add {
        Some(value::add)
    } else if rule == r.expr_sub {
        Some(value::sub)
    } else if rule == r.expr_mul {
        Some(value::mul)
    } else if rule == r.expr_div {
        Some(value::div)
    } else if rule == r.expr_lt {
        Some(value::lt)
    } else if rule == r.expr_gt {
        Some(value::gt)
    } else if rule == r.expr_lte {
        Some(value::lte)
    } else if rule == r.expr_gte {
        Some(value::gte)
    } else if rule == r.expr_eq {
        Some(value::eq)
    } else if rule == r.expr_neq {
        Some(value::neq)
    } else {
        None
    }
}

fn eval_assign(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<ObjectRef> {
    let lhs = span.child(0).expect("assign has a left-hand side");
    let rhs_span = span.child(1).expect("assign has a right-hand side");
    let rhs = eval_expr(ctx, scope, &rhs_span)?;

    if lhs.rule_name_id() == ctx.rules.atom_identifier {
        let token_id = ctx.tokenization.token_id_at(lhs.first_token());
        scope.assign(token_id, rhs.clone()).map_err(|e| e.at(lhs.first_token()))?;
        return Ok(rhs);
    }
    if lhs.rule_name_id() == ctx.rules.expr_member {
        let object_span = lhs.child(0).expect("member has an object");
        let name_span = lhs.child(1).expect("member has a name");
        let object = eval_expr(ctx, scope, &object_span)?;
        let instance = object.get().as_instance().map_err(|e| e.at(object_span.first_token()))?;
        let name_id = ctx.tokenization.token_id_at(name_span.first_token());
        instance.fields.borrow_mut().insert(name_id, rhs.clone());
        return Ok(rhs);
    }
    Err(LoxError::major("left-hand side of '=' is not assignable").at(lhs.first_token()))
}

fn eval_call(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<ObjectRef> {
    let mut children = span.children();
    let callee_span = children.next().expect("call has a callee");
    let callee = eval_expr(ctx, scope, &callee_span)?;

    let mut args = Vec::with_capacity(span.num_children() - 1);
    for arg_span in children {
        args.push(eval_expr(ctx, scope, &arg_span)?);
    }

    call_value(ctx, &callee, &args).map_err(|e| e.at(callee_span.first_token()))
}

/// Call a callable `Value` (function, builtin, or class constructor) with
/// already-evaluated arguments. Shared by `Call` expressions and by the
/// implicit `init` call made when constructing an instance.
pub fn call_value(ctx: &Ctx, callee: &ObjectRef, args: &[ObjectRef]) -> LoxResult<ObjectRef> {
    match callee.get() {
        Value::Function(f) => {
            if f.arity() != args.len() {
                return Err(LoxError::minor(format!(
                    "expected {} argument(s), found {}",
                    f.arity(),
                    args.len()
                )));
            }
            let call_scope = f.closure.make_child();
            for (index, arg) in args.iter().enumerate() {
                let param_span = f.parameter_name(index);
                let param_token = ctx.tokenization.token_id_at(param_span.first_token());
                call_scope.define(param_token, arg.clone())?;
            }
            match crate::exec::exec_stmt(ctx, &call_scope, &f.body())? {
                crate::exec::Flow::Returning(value) => Ok(value),
                crate::exec::Flow::Normal => Ok(ctx.pool.make(Value::None)),
            }
        }
        Value::BuiltinFunction(b) => {
            if b.arity != args.len() {
                return Err(LoxError::minor(format!(
                    "expected {} argument(s), found {}",
                    b.arity,
                    args.len()
                )));
            }
            (b.func)(ctx.pool, args)
        }
        Value::Class(class) => {
            let instance = Rc::new(crate::value::InstanceData {
                class: callee.clone(),
                fields: RefCell::new(std::collections::HashMap::new()),
            });
            let instance_ref = ctx.pool.make(Value::Instance(instance.clone()));
            let init = ctx.tokenization.find_interned("init").and_then(|id| lookup_method(&class, id));
            if let Some(init) = init {
                let bound = bind_method(ctx, &init, &instance_ref);
                call_value(ctx, &bound, args)?;
            } else if !args.is_empty() {
                return Err(LoxError::minor(format!(
                    "class has no 'init' method but {} argument(s) were given",
                    args.len()
                )));
            }
            Ok(instance_ref)
        }
        other => Err(LoxError::major(format!("{} is not callable", other.type_name()))),
    }
}

fn lookup_method(class: &Rc<crate::value::ClassData>, name_id: crate::token::TokenId) -> Option<ObjectRef> {
    let mut current = Some(class.clone());
    while let Some(c) = current {
        if let Some(method) = c.methods.get(&name_id) {
            return Some(method.clone());
        }
        current = c.superclass.as_ref().map(|s| s.get().as_class().expect("superclass field is a class"));
    }
    None
}

/// Build a bound method: a fresh child arm of the method's own closure
/// (not of the instance) with `this` defined, so the instance itself never
/// holds a strong reference back into its own method closures.
fn bind_method(ctx: &Ctx, method: &ObjectRef, instance: &ObjectRef) -> ObjectRef {
    let f = match method.get() {
        Value::Function(f) => f,
        _ => unreachable!("method table holds only function values"),
    };
    let bound_closure = f.closure.make_child();
    let this_id = ctx.tokenization.this_id();
    bound_closure
        .define(this_id, instance.clone())
        .expect("fresh arm never already defines 'this'");
    ctx.pool.make(Value::Function(Rc::new(crate::value::FunctionData {
        span: f.span.clone(),
        closure: bound_closure,
        name_id: f.name_id,
        name: f.name.clone(),
    })))
}

fn eval_member(ctx: &Ctx, scope: &ScopeHandle, span: &ParseTreeSpan) -> LoxResult<ObjectRef> {
    let object_span = span.child(0).expect("member has an object");
    let name_span = span.child(1).expect("member has a name");
    let name_id = ctx.tokenization.token_id_at(name_span.first_token());

    if object_span.rule_name_id() == ctx.rules.atom_super {
        let this_value = scope.get(ctx.tokenization.this_id()).map_err(|e| e.at(object_span.first_token()))?;
        let super_value = scope.get(ctx.tokenization.super_id()).map_err(|e| {
            LoxError::major("'super' used outside a subclass method").at(object_span.first_token())
        })?;
        let superclass = super_value.get().as_class().map_err(|e| e.at(object_span.first_token()))?;
        let method = lookup_method(&superclass, name_id).ok_or_else(|| {
            LoxError::minor(format!("undefined method '{}'", ctx.tokenization.text_at(name_span.first_token())))
                .at(name_span.first_token())
        })?;
        return Ok(bind_method(ctx, &method, &this_value));
    }

    let object = eval_expr(ctx, scope, &object_span)?;
    let instance = object.get().as_instance().map_err(|e| e.at(object_span.first_token()))?;

    if let Some(value) = instance.fields.borrow().get(&name_id) {
        return Ok(value.clone());
    }
    let class = instance.class.get().as_class().expect("instance class field is a class");
    if let Some(method) = lookup_method(&class, name_id) {
        return Ok(bind_method(ctx, &method, &object));
    }
    Err(LoxError::minor(format!(
        "undefined property '{}'",
        ctx.tokenization.text_at(name_span.first_token())
    ))
    .at(name_span.first_token()))
}
