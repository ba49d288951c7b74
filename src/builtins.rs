//! Native builtin functions, declared as Lox function signatures and paired
//! by position with Rust closures. The embedded Lox source carries only
//! empty bodies — the bodies are never executed, only their parsed
//! signatures are read off to learn each builtin's arity.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::{BufRead, Read, Write};
use std::rc::Rc;

use crate::error::{LoxError, LoxResult};
use crate::parser::{parse_source, Rules};
use crate::pool::{ObjectRef, Pool};
use crate::token::{tokenize, TokenId, Tokenization};
use crate::util::SourceText;
use crate::value::{BuiltinData, Value};
use crate::ward::NameWard;

const BUILTINS_SOURCE: &str = r#"
fun clock() {}
fun getc() {}
fun chr(ascii_code) {}
fun exit(exit_code) {}
fun print_error(text) {}
"#;

/// Parse [`BUILTINS_SOURCE`] and check that each declaration's name and
/// parameter count match `names` in order, returning each arity. Only the
/// shape of the signatures is used; the function bodies are discarded.
fn builtin_arities(names: &[&str]) -> LoxResult<Vec<usize>> {
    let mut ward = NameWard::new();
    let rules = Rules::new(&mut ward);
    let source = SourceText::new("builtins.lox", BUILTINS_SOURCE);
    let tokenization = tokenize(&source)?;
    let program = parse_source(&tokenization, &mut ward, &rules)?;

    let mut arities = Vec::with_capacity(names.len());
    let mut decls = program.children();
    for name in names {
        let decl = decls
            .next()
            .ok_or_else(|| LoxError::assert(format!("missing builtin declaration for '{}'", name)))?;
        let name_span = decl.child(0).expect("fun decl has a name");
        let found = tokenization.text_at(name_span.first_token());
        if found != *name {
            return Err(LoxError::assert(format!(
                "expected builtin declaration '{}', found '{}'",
                name, found
            )));
        }
        arities.push(decl.num_children() - 2);
    }
    Ok(arities)
}

/// Build the `clock`, `getc`, `chr`, `exit`, `print_error` builtins, keyed
/// by their `TokenId` in `tokenization` so the resulting table can be
/// merged directly into a session's root scope. `stdin` backs `getc`;
/// `stderr` backs `print_error`'s diagnostic output.
pub fn make_builtins(
    pool: &Pool,
    tokenization: &mut Tokenization,
    stdin: Rc<RefCell<dyn BufRead>>,
    stderr: Rc<RefCell<dyn Write>>,
) -> LoxResult<HashMap<TokenId, ObjectRef>> {
    let names = ["clock", "getc", "chr", "exit", "print_error"];
    let arities = builtin_arities(&names)?;

    let mut table = HashMap::new();

    let clock_id = tokenization.intern_identifier("clock");
    table.insert(
        clock_id,
        make_one(pool, clock_id, "clock", arities[0], move |pool, args| {
            expect_arity("clock", args, 0)?;
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_err(|e| LoxError::fatal(format!("system clock is before the epoch: {}", e)))?;
            Ok(pool.make(Value::Double(now.as_secs_f64())))
        }),
    );

    let getc_id = tokenization.intern_identifier("getc");
    table.insert(
        getc_id,
        make_one(pool, getc_id, "getc", arities[1], move |pool, args| {
            expect_arity("getc", args, 0)?;
            let mut byte = [0u8; 1];
            let read = stdin
                .borrow_mut()
                .read(&mut byte)
                .map_err(|e| LoxError::fatal(format!("read from stdin failed: {}", e)))?;
            let code = if read == 0 { -1.0 } else { byte[0] as f64 };
            Ok(pool.make(Value::Double(code)))
        }),
    );

    let chr_id = tokenization.intern_identifier("chr");
    table.insert(
        chr_id,
        make_one(pool, chr_id, "chr", arities[2], move |pool, args| {
            expect_arity("chr", args, 1)?;
            let code = args[0].get().as_double()?;
            if code.fract() != 0.0 || code < 0.0 || code > 255.0 {
                return Err(LoxError::minor(format!(
                    "'chr' expects an integer in 0..255, found {}",
                    code
                )));
            }
            let ch = (code as u8) as char;
            Ok(pool.make(Value::String(Rc::from(ch.to_string().as_str()))))
        }),
    );

    let exit_id = tokenization.intern_identifier("exit");
    table.insert(
        exit_id,
        make_one(pool, exit_id, "exit", arities[3], move |_pool, args| {
            expect_arity("exit", args, 1)?;
            let code = args[0].get().as_double()?;
            std::process::exit(code as i32);
        }),
    );

    let print_error_id = tokenization.intern_identifier("print_error");
    table.insert(
        print_error_id,
        make_one(pool, print_error_id, "print_error", arities[4], move |pool, args| {
            expect_arity("print_error", args, 1)?;
            let text = match args[0].get() {
                Value::String(s) => s,
                other => return Err(LoxError::minor(format!("print_error expects a string, found {}", other.type_name()))),
            };
            writeln!(stderr.borrow_mut(), "ERROR: {}", text)
                .map_err(|e| LoxError::fatal(format!("write to stderr failed: {}", e)))?;
            Ok(pool.make(Value::None))
        }),
    );

    Ok(table)
}

fn expect_arity(name: &str, args: &[ObjectRef], expected: usize) -> LoxResult<()> {
    if args.len() != expected {
        return Err(LoxError::minor(format!(
            "'{}' expects {} argument(s), found {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn make_one(
    pool: &Pool,
    name_id: TokenId,
    name: &str,
    arity: usize,
    func: impl Fn(&Pool, &[ObjectRef]) -> LoxResult<ObjectRef> + 'static,
) -> ObjectRef {
    pool.make(Value::BuiltinFunction(Rc::new(BuiltinData {
        name_id,
        name: Rc::from(name),
        arity,
        func: Box::new(func),
    })))
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use crate::eval::call_value;

    fn fresh_tokenization() -> Tokenization {
        let source = SourceText::new("<builtins-test>", "");
        tokenize(&source).expect("tokenizes")
    }

    #[test]
    fn clock_returns_a_nonnegative_double_with_no_arguments() {
        let pool = Pool::new();
        let mut tokenization = fresh_tokenization();
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let stderr: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::new()));
        let table = make_builtins(&pool, &mut tokenization, stdin, stderr).unwrap();
        let clock_id = tokenization.find_interned("clock").unwrap();
        let clock = table.get(&clock_id).unwrap();
        let result = match clock.get() {
            Value::BuiltinFunction(b) => (b.func)(&pool, &[]).unwrap(),
            _ => panic!("expected a builtin function"),
        };
        assert!(result.get().as_double().unwrap() >= 0.0);
    }

    #[test]
    fn chr_converts_an_ascii_code_to_a_one_character_string() {
        let pool = Pool::new();
        let mut tokenization = fresh_tokenization();
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let stderr: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::new()));
        let table = make_builtins(&pool, &mut tokenization, stdin, stderr).unwrap();
        let chr_id = tokenization.find_interned("chr").unwrap();
        let chr = table.get(&chr_id).unwrap();
        let arg = pool.make(Value::Double(65.0));
        let mut ward = NameWard::new();
        let rules = Rules::new(&mut ward);
        let stdout: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::new()));
        let ctx = crate::eval::Ctx {
            pool: &pool,
            tokenization: &tokenization,
            rules: &rules,
            stdout: &stdout,
            trace: crate::util::Trace::None,
        };
        let result = call_value(&ctx, chr, &[arg]).unwrap();
        match result.get() {
            Value::String(s) => assert_eq!(&*s, "A"),
            _ => panic!("expected a string"),
        }
    }

    #[test]
    fn getc_returns_minus_one_at_end_of_input() {
        let pool = Pool::new();
        let mut tokenization = fresh_tokenization();
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let stderr: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::new()));
        let table = make_builtins(&pool, &mut tokenization, stdin, stderr).unwrap();
        let getc_id = tokenization.find_interned("getc").unwrap();
        let getc = table.get(&getc_id).unwrap();
        let result = match getc.get() {
            Value::BuiltinFunction(b) => (b.func)(&pool, &[]).unwrap(),
            _ => panic!("expected a builtin function"),
        };
        assert_eq!(result.get().as_double().unwrap(), -1.0);
    }

    #[test]
    fn print_error_writes_a_prefixed_line_to_the_stderr_sink() {
        let pool = Pool::new();
        let mut tokenization = fresh_tokenization();
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let stderr: Rc<RefCell<dyn Write>> = buffer.clone();
        let table = make_builtins(&pool, &mut tokenization, stdin, stderr).unwrap();
        let print_error_id = tokenization.find_interned("print_error").unwrap();
        let print_error = table.get(&print_error_id).unwrap();
        let text = pool.make(Value::String(Rc::from("boom")));
        match print_error.get() {
            Value::BuiltinFunction(b) => (b.func)(&pool, &[text]).unwrap(),
            _ => panic!("expected a builtin function"),
        };
        let written = String::from_utf8(buffer.borrow().clone()).unwrap();
        assert_eq!(written, "ERROR: boom\n");
    }

    #[test]
    fn chr_rejects_codes_outside_0_255_or_non_integers() {
        let pool = Pool::new();
        let mut tokenization = fresh_tokenization();
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let stderr: Rc<RefCell<dyn Write>> = Rc::new(RefCell::new(Vec::new()));
        let table = make_builtins(&pool, &mut tokenization, stdin, stderr).unwrap();
        let chr_id = tokenization.find_interned("chr").unwrap();
        let chr = match table.get(&chr_id).unwrap().get() {
            Value::BuiltinFunction(b) => b,
            _ => panic!("expected a builtin function"),
        };
        assert!((chr.func)(&pool, &[pool.make(Value::Double(300.0))]).is_err());
        assert!((chr.func)(&pool, &[pool.make(Value::Double(65.5))]).is_err());
        assert!((chr.func)(&pool, &[pool.make(Value::Double(-1.0))]).is_err());
    }

    #[test]
    fn arity_mismatch_against_the_embedded_signature_is_an_assertion() {
        let names = ["clock", "getc", "chr", "exit", "print_error"];
        assert_eq!(builtin_arities(&names).unwrap(), vec![0, 0, 1, 1, 1]);
    }
}
