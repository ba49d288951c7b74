//! The dynamic `Value` union and its operators: unary/binary arithmetic,
//! comparison, equality, truthiness, and stringification. Every operator
//! is strictly typed — there is no coercion between variants.
//!
//! Compound variants (`Function`, `BuiltinFunction`, `Class`, `Instance`)
//! wrap their payload in an `Rc` so cloning a `Value` out of a pool slot is
//! always cheap, and so `==` between two such values can be reference
//! identity via `Rc::ptr_eq` rather than a deep comparison.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::parse_tree::ParseTreeSpan;
use crate::pool::{ObjectRef, Pool};
use crate::scope::ScopeHandle;
use crate::token::TokenId;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Double(f64),
    String(Rc<str>),
    Function(Rc<FunctionData>),
    BuiltinFunction(Rc<BuiltinData>),
    Class(Rc<ClassData>),
    Instance(Rc<InstanceData>),
}

pub struct FunctionData {
    pub span: ParseTreeSpan,
    pub closure: ScopeHandle,
    pub name_id: TokenId,
    pub name: Rc<str>,
}

impl FunctionData {
    /// Children of the definition span are `[name, param_0, .., param_{k-1}, body]`.
    pub fn arity(&self) -> usize {
        self.span.num_children() - 2
    }

    pub fn parameter_name(&self, index: usize) -> ParseTreeSpan {
        self.span.child(1 + index).expect("parameter index in range")
    }

    pub fn body(&self) -> ParseTreeSpan {
        let last = self.span.num_children() - 1;
        self.span.child(last).expect("function body child present")
    }
}

pub type NativeFn = dyn Fn(&Pool, &[ObjectRef]) -> LoxResult<ObjectRef>;

pub struct BuiltinData {
    pub name_id: TokenId,
    pub name: Rc<str>,
    pub arity: usize,
    pub func: Box<NativeFn>,
}

/// `methods` and `fields` are keyed by the identifier's `TokenId`, not by
/// `NameId` — member names are plain identifiers, not grammar rule names.
pub struct ClassData {
    pub name_id: TokenId,
    pub name: Rc<str>,
    pub methods: HashMap<TokenId, ObjectRef>,
    pub superclass: Option<ObjectRef>,
}

pub struct InstanceData {
    pub class: ObjectRef,
    pub fields: std::cell::RefCell<HashMap<TokenId, ObjectRef>>,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::None | Value::Bool(false))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "boolean",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Function(_) => "function",
            Value::BuiltinFunction(_) => "builtin-function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
        }
    }

    pub fn as_double(&self) -> LoxResult<f64> {
        match self {
            Value::Double(d) => Ok(*d),
            other => Err(LoxError::major(format!("expected a double, found {}", other.type_name()))),
        }
    }

    pub fn as_class(&self) -> LoxResult<Rc<ClassData>> {
        match self {
            Value::Class(c) => Ok(c.clone()),
            other => Err(LoxError::major(format!("expected a class, found {}", other.type_name()))),
        }
    }

    pub fn as_instance(&self) -> LoxResult<Rc<InstanceData>> {
        match self {
            Value::Instance(i) => Ok(i.clone()),
            other => Err(LoxError::major(format!("expected an instance, found {}", other.type_name()))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::BuiltinFunction(a), Value::BuiltinFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", stringify(self))
    }
}

/// Render the shortest trailing-zero-trimmed decimal for a finite double,
/// or the usual `inf`/`-inf`/`NaN` spellings otherwise.
fn stringify_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }
    let mut s = format!("{}", d);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

pub fn stringify(value: &Value) -> String {
    match value {
        Value::None => "none".to_string(),
        Value::Bool(b) => if *b { "true" } else { "false" }.to_string(),
        Value::Double(d) => stringify_double(*d),
        Value::String(s) => s.to_string(),
        Value::Function(f) => format!("<function {}>", f.name),
        Value::BuiltinFunction(b) => format!("<builtin-function '{}'>", b.name),
        Value::Class(c) => format!("<class {}>", c.name),
        Value::Instance(i) => {
            let class_value = i.class.get();
            let class = class_value.as_class().expect("instance class field is a class");
            format!("<instance of {}>", class.name)
        }
    }
}

pub fn neg(pool: &Pool, x: &ObjectRef) -> LoxResult<ObjectRef> {
    let d = x.get().as_double()?;
    Ok(pool.make(Value::Double(-d)))
}

pub fn inv(pool: &Pool, x: &ObjectRef) -> LoxResult<ObjectRef> {
    Ok(pool.make(Value::Bool(!x.get().is_truthy())))
}

macro_rules! binary_double {
    ($name:ident, $op:tt, $wrap:expr) => {
        pub fn $name(pool: &Pool, l: &ObjectRef, r: &ObjectRef) -> LoxResult<ObjectRef> {
            let lv = l.get().as_double()?;
            let rv = r.get().as_double()?;
            Ok(pool.make($wrap(lv $op rv)))
        }
    };
}

binary_double!(sub, -, Value::Double);
binary_double!(mul, *, Value::Double);
binary_double!(div, /, Value::Double);
binary_double!(lt, <, Value::Bool);
binary_double!(gt, >, Value::Bool);
binary_double!(lte, <=, Value::Bool);
binary_double!(gte, >=, Value::Bool);

pub fn add(pool: &Pool, l: &ObjectRef, r: &ObjectRef) -> LoxResult<ObjectRef> {
    let lv = l.get();
    let rv = r.get();
    match (&lv, &rv) {
        (Value::Double(a), Value::Double(b)) => Ok(pool.make(Value::Double(a + b))),
        (Value::String(a), Value::String(b)) => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            Ok(pool.make(Value::String(Rc::from(joined))))
        }
        _ => Err(LoxError::major(format!(
            "'+' requires two doubles or two strings, found {} and {}",
            lv.type_name(),
            rv.type_name()
        ))),
    }
}

pub fn eq(pool: &Pool, l: &ObjectRef, r: &ObjectRef) -> LoxResult<ObjectRef> {
    Ok(pool.make(Value::Bool(l.get() == r.get())))
}

pub fn neq(pool: &Pool, l: &ObjectRef, r: &ObjectRef) -> LoxResult<ObjectRef> {
    Ok(pool.make(Value::Bool(l.get() != r.get())))
}

#[cfg(test)]
mod __tests__ {
    use super::*;

    #[test]
    fn truthiness_matches_lox_rules() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Bool(true).is_truthy());
        assert!(Value::Double(0.0).is_truthy());
        assert!(Value::String(Rc::from("")).is_truthy());
    }

    #[test]
    fn stringifies_doubles_without_trailing_zeros() {
        assert_eq!(stringify_double(3.0), "3");
        assert_eq!(stringify_double(3.5), "3.5");
        assert_eq!(stringify_double(3.140), "3.14");
    }

    #[test]
    fn addition_concatenates_strings_and_sums_doubles() {
        let pool = Pool::new();
        let a = pool.make(Value::Double(1.0));
        let b = pool.make(Value::Double(2.0));
        let sum = add(&pool, &a, &b).unwrap();
        assert_eq!(sum.get().as_double().unwrap(), 3.0);

        let s1 = pool.make(Value::String(Rc::from("hi")));
        let s2 = pool.make(Value::String(Rc::from(" there")));
        let joined = add(&pool, &s1, &s2).unwrap();
        match joined.get() {
            Value::String(s) => assert_eq!(&*s, "hi there"),
            _ => panic!("expected string"),
        }
    }

    #[test]
    fn addition_rejects_mixed_operand_types() {
        let pool = Pool::new();
        let a = pool.make(Value::Double(1.0));
        let b = pool.make(Value::String(Rc::from("x")));
        assert!(add(&pool, &a, &b).is_err());
    }

    #[test]
    fn equality_is_reference_identity_for_instances() {
        let pool = Pool::new();
        let class = Rc::new(ClassData {
            name_id: crate::token::TokenId(0),
            name: Rc::from("Widget"),
            methods: HashMap::new(),
            superclass: None,
        });
        let class_ref = pool.make(Value::Class(class));
        let instance = Rc::new(InstanceData {
            class: class_ref.clone(),
            fields: std::cell::RefCell::new(HashMap::new()),
        });
        let a = pool.make(Value::Instance(instance.clone()));
        let b = pool.make(Value::Instance(instance));
        let c = pool.make(Value::Instance(Rc::new(InstanceData {
            class: class_ref,
            fields: std::cell::RefCell::new(HashMap::new()),
        })));
        assert!(eq(&pool, &a, &b).unwrap().get().is_truthy());
        assert!(!eq(&pool, &a, &c).unwrap().get().is_truthy());
    }
}
