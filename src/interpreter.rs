//! `Session`: ties tokenizer, parser, object pool, scope, and executor
//! together into the single entry point a host program actually calls.
//! Carries no CLI and no config-file layer — trace level and the three
//! I/O sinks are plain constructor arguments.

use std::cell::RefCell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use crate::builtins::make_builtins;
use crate::error::LoxResult;
use crate::eval::Ctx;
use crate::exec::exec_program;
use crate::parse_tree::ParseTreeSpan;
use crate::parser::{parse_source, Rules};
use crate::pool::Pool;
use crate::scope::ScopeHandle;
use crate::token::{tokenize_with_trace, Tokenization};
use crate::util::{SourceText, Trace};
use crate::ward::NameWard;

/// A single run of one Lox program: owns its own tokenization, parse tree,
/// object pool, and scope cactus. Nothing here is reused across runs —
/// build a fresh `Session` per program.
pub struct Session {
    trace: Trace,
    stdin: Rc<RefCell<dyn BufRead>>,
    stdout: Rc<RefCell<dyn Write>>,
    stderr: Rc<RefCell<dyn Write>>,
}

impl Session {
    /// A session reading real stdin and writing real stdout/stderr, with
    /// tracing off.
    pub fn new() -> Self {
        Self {
            trace: Trace::None,
            stdin: Rc::new(RefCell::new(std::io::BufReader::new(std::io::stdin()))),
            stdout: Rc::new(RefCell::new(std::io::stdout())),
            stderr: Rc::new(RefCell::new(std::io::stderr())),
        }
    }

    /// A session with caller-supplied I/O sinks, for embedding or testing.
    pub fn with_sinks(
        stdin: Rc<RefCell<dyn BufRead>>,
        stdout: Rc<RefCell<dyn Write>>,
        stderr: Rc<RefCell<dyn Write>>,
    ) -> Self {
        Self { trace: Trace::None, stdin, stdout, stderr }
    }

    pub fn set_trace(&mut self, trace: Trace) {
        self.trace = trace;
    }

    /// Tokenize, parse, and run one program to completion, discarding its
    /// return value. This is the crate's primary entry point.
    pub fn run_str(&self, filename: impl Into<String>, source_text: &str) -> LoxResult<()> {
        let source = SourceText::new(filename, source_text);
        let (tokenization, program, pool, root, rules) = self.load(&source)?;
        let ctx = self.ctx(&pool, &tokenization, &rules);
        exec_program(&ctx, &root, &program)
    }

    /// Like `run_str`, but on failure the error's token position is
    /// resolved against `source` and folded into the returned message —
    /// `"<SEVERITY>: <message> at <line>:<column>"` — since a bare
    /// `LoxError` only carries a token index, not a location.
    pub fn run_str_located(&self, filename: impl Into<String>, source_text: &str) -> Result<(), String> {
        let source = SourceText::new(filename, source_text);
        self.run_located(&source)
    }

    fn run_located(&self, source: &SourceText) -> Result<(), String> {
        let (tokenization, program, pool, root, rules) =
            self.load(source).map_err(|e| self.locate(source, None, &e))?;
        let ctx = self.ctx(&pool, &tokenization, &rules);
        exec_program(&ctx, &root, &program).map_err(|e| self.locate(source, Some(&tokenization), &e))
    }

    fn locate(&self, source: &SourceText, tokenization: Option<&Tokenization>, err: &crate::error::LoxError) -> String {
        let position = match (tokenization, err.token_index) {
            (Some(tokenization), Some(index)) if index < tokenization.len() => {
                Some(tokenization.position_of(source, index))
            }
            _ => None,
        };
        match position {
            Some(position) => format!("{}: {} at {}", err.severity, err.message, position),
            None => format!("{}: {}", err.severity, err.message),
        }
    }

    /// Tokenize and parse `source`, returning its root span (and the
    /// `NameWard` that gives rule-name ids meaning) without executing it.
    /// Used by `dump_tree` and by callers that only want to validate a
    /// program's syntax.
    pub fn parse_only(&self, source: &SourceText) -> LoxResult<(Tokenization, NameWard, ParseTreeSpan)> {
        let mut ward = NameWard::new();
        let rules = Rules::new(&mut ward);
        let tokenization = tokenize_with_trace(source, self.trace)?;
        let program = parse_source(&tokenization, &mut ward, &rules)?;
        Ok((tokenization, ward, program))
    }

    fn load(&self, source: &SourceText) -> LoxResult<(Tokenization, ParseTreeSpan, Pool, ScopeHandle, Rules)> {
        let mut ward = NameWard::new();
        let rules = Rules::new(&mut ward);
        let mut tokenization = tokenize_with_trace(source, self.trace)?;
        let program = parse_source(&tokenization, &mut ward, &rules)?;

        let pool = Pool::new();
        let root = ScopeHandle::new_root();
        let builtins = make_builtins(&pool, &mut tokenization, self.stdin.clone(), self.stderr.clone())?;
        for (name_id, value) in builtins {
            root.define(name_id, value)?;
        }
        Ok((tokenization, program, pool, root, rules))
    }

    fn ctx<'a>(&'a self, pool: &'a Pool, tokenization: &'a Tokenization, rules: &'a Rules) -> Ctx<'a> {
        Ctx { pool, tokenization, rules, stdout: &self.stdout, trace: self.trace }
    }

    /// Render `source`'s parse tree with `ptree`, for debugging a failed
    /// parse or a surprising evaluation result.
    pub fn dump_tree(&self, source: &SourceText) -> LoxResult<String> {
        let (tokenization, ward, program) = self.parse_only(source)?;
        let tree = crate::debug_tree::DebugTree::build(&tokenization, &ward, &program);
        let mut buffer = Vec::new();
        ptree::write_tree(&tree, &mut buffer).map_err(|e| crate::error::LoxError::fatal(format!("failed to render parse tree: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| crate::error::LoxError::fatal(format!("rendered tree was not utf-8: {}", e)))
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod __tests__ {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn session_with_buffers() -> (Session, Rc<RefCell<Vec<u8>>>, Rc<RefCell<Vec<u8>>>) {
        let stdout = Rc::new(RefCell::new(Vec::new()));
        let stderr = Rc::new(RefCell::new(Vec::new()));
        let stdin: Rc<RefCell<dyn BufRead>> = Rc::new(RefCell::new(std::io::empty()));
        let stdout_sink: Rc<RefCell<dyn Write>> = stdout.clone();
        let stderr_sink: Rc<RefCell<dyn Write>> = stderr.clone();
        (Session::with_sinks(stdin, stdout_sink, stderr_sink), stdout, stderr)
    }

    #[test]
    fn run_str_executes_a_program_to_completion() {
        let (session, stdout, _stderr) = session_with_buffers();
        session.run_str("<test>", "print 1 + 2;").unwrap();
        assert_eq!(String::from_utf8(stdout.borrow().clone()).unwrap(), "3\n");
    }

    #[test]
    fn run_str_located_formats_a_runtime_error_with_its_position() {
        let (session, _stdout, _stderr) = session_with_buffers();
        let err = session.run_str_located("<test>", "print 1 + \"x\";").unwrap_err();
        assert!(err.starts_with("MAJOR:"), "unexpected message: {}", err);
        assert!(err.contains("at "), "message should carry a location: {}", err);
    }

    #[test]
    fn dump_tree_renders_the_root_rule_name() {
        let (session, _stdout, _stderr) = session_with_buffers();
        let source = SourceText::new("<test>", "print 1;");
        let rendered = session.dump_tree(&source).unwrap();
        assert!(rendered.contains("Lox"), "rendered tree: {}", rendered);
    }
}
