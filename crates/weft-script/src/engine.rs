//! Rhai-backed interpreter engine.
//!
//! Compiles script source into a cached `AST` and runs it with the
//! namespace capabilities registered as native functions. Each run gets a
//! fresh engine whose bindings close over that run's namespace, so nothing
//! leaks between runs.
//!
//! Script-visible surface:
//!
//! ```text
//! write(value)            write(value, tag)
//! header(key, value)      set_setting(name, value)
//! load(filename)          load(filename, type)
//! exit()                  script_name()
//! elem(tag)               elem(tag, text)      node.append(child)
//! script(code)
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use rhai::{AST, Dynamic, Engine, EvalAltResult, Position};

use crate::error::{ScriptError, ScriptResult};
use crate::interpreter::{Artifact, Interpreter};
use crate::markup::MarkupNode;
use crate::namespace::{ExecutionNamespace, RunOutcome, WriteValue};

/// Client-script code as a distinct script-visible value, so `write` can
/// serialize it inside a script element.
#[derive(Debug, Clone)]
pub struct ScriptCode(pub String);

pub struct RhaiInterpreter;

impl RhaiInterpreter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RhaiInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(ns: &Arc<Mutex<ExecutionNamespace>>) -> MutexGuard<'_, ExecutionNamespace> {
    ns.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Terminate evaluation; the driver maps this to `RunOutcome::Halted`.
fn terminated() -> Box<EvalAltResult> {
    EvalAltResult::ErrorTerminated(Dynamic::UNIT, Position::NONE).into()
}

/// `exit` is a reserved keyword in rhai, so `exit()` is claimed via custom
/// syntax rather than a registered function. The compiling engine needs the
/// same syntax for the parse to succeed; its handler never runs.
const EXIT_SYNTAX: [&str; 3] = ["exit", "(", ")"];

fn compile_engine() -> Engine {
    let mut engine = Engine::new();
    engine
        .register_custom_syntax(EXIT_SYNTAX, false, |_context, _inputs| Err(terminated()))
        .expect("exit syntax is well-formed");
    engine
}

fn bind_capabilities(engine: &mut Engine, script_name: &str, ns: &Arc<Mutex<ExecutionNamespace>>) {
    engine.register_type_with_name::<MarkupNode>("Markup");
    engine.register_type_with_name::<ScriptCode>("ScriptCode");

    engine.register_fn("elem", |tag: &str| MarkupNode::element(tag));
    engine.register_fn("elem", |tag: &str, text: &str| {
        MarkupNode::element_with_text(tag, text)
    });
    engine.register_fn("append", |node: MarkupNode, child: MarkupNode| node.append(child));
    engine.register_fn("script", |code: &str| ScriptCode(code.to_string()));

    {
        let ns = ns.clone();
        engine.register_fn("write", move |text: &str| {
            lock(&ns).write(WriteValue::Text(text.to_string()), None);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |text: &str, tag: &str| {
            lock(&ns).write(WriteValue::Text(text.to_string()), Some(tag));
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |node: MarkupNode| {
            lock(&ns).write(WriteValue::Markup(node), None);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |node: MarkupNode, tag: &str| {
            lock(&ns).write(WriteValue::Markup(node), Some(tag));
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |code: ScriptCode| {
            lock(&ns).write(WriteValue::Script(code.0), None);
        });
    }
    {
        // Script code ignores the tag; it always lands in a script element.
        let ns = ns.clone();
        engine.register_fn("write", move |code: ScriptCode, _tag: &str| {
            lock(&ns).write(WriteValue::Script(code.0), None);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |value: Dynamic| {
            lock(&ns).write(WriteValue::Other(value.to_string()), None);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("write", move |value: Dynamic, tag: &str| {
            lock(&ns).write(WriteValue::Other(value.to_string()), Some(tag));
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("header", move |key: &str, value: &str| {
            lock(&ns).header(key, value);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("set_setting", move |name: &str, value: &str| {
            lock(&ns).set_setting(name, value);
        });
    }
    {
        let ns = ns.clone();
        engine.register_fn("load", move |filename: &str| lock(&ns).load(filename, None));
    }
    {
        let ns = ns.clone();
        engine.register_fn("load", move |filename: &str, kind: &str| {
            lock(&ns).load(filename, Some(kind))
        });
    }
    {
        let ns = ns.clone();
        engine
            .register_custom_syntax(EXIT_SYNTAX, false, move |_context, _inputs| {
                lock(&ns).exit();
                Err(terminated())
            })
            .expect("exit syntax is well-formed");
    }
    {
        let name = script_name.to_string();
        engine.register_fn("script_name", move || name.clone());
    }
}

impl Interpreter for RhaiInterpreter {
    fn compile(&self, name: &str, source: &str) -> ScriptResult<Artifact> {
        let engine = compile_engine();
        let ast = engine
            .compile(source)
            .map_err(|e| ScriptError::compile(name, e.to_string()))?;
        Ok(Artifact::new(ast))
    }

    fn run(
        &self,
        name: &str,
        artifact: &Artifact,
        namespace: &mut ExecutionNamespace,
    ) -> ScriptResult<RunOutcome> {
        let Some(ast) = artifact.downcast_ref::<AST>() else {
            return Err(ScriptError::execution(name, "artifact is not a rhai AST"));
        };

        // The namespace moves behind a mutex for the duration of the run
        // and is recovered before any result is returned, faulted or not.
        let shared = Arc::new(Mutex::new(std::mem::take(namespace)));
        let mut engine = Engine::new();
        bind_capabilities(&mut engine, name, &shared);

        let result = engine.run_ast(ast);

        drop(engine);
        *namespace = Arc::try_unwrap(shared)
            .map_err(|_| ScriptError::execution(name, "namespace still shared after run"))?
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match result {
            Ok(()) => Ok(RunOutcome::Completed),
            Err(err) => match *err {
                EvalAltResult::ErrorTerminated(..) => Ok(RunOutcome::Halted),
                other => Err(ScriptError::execution(name, other.to_string())),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::HtmlFormatter;
    use encoding_rs::UTF_8;

    fn run_script(source: &str) -> ScriptResult<ExecutionNamespace> {
        let interp = RhaiInterpreter::new();
        let artifact = interp.compile("test.weft", source)?;
        let mut ns = ExecutionNamespace::new("test.weft", UTF_8, Arc::new(HtmlFormatter));
        interp.run("test.weft", &artifact, &mut ns)?;
        Ok(ns)
    }

    #[test]
    fn plain_write_appends_output() {
        let ns = run_script(r#"write("hello"); write(" world");"#).unwrap();
        assert_eq!(ns.output(), b"hello world");
        assert!(!ns.is_halted());
    }

    #[test]
    fn tagged_write_wraps_text() {
        let ns = run_script(r#"write("title", "h1");"#).unwrap();
        assert_eq!(ns.output(), b"<h1>title</h1>");
    }

    #[test]
    fn markup_values_serialize_through_the_formatter() {
        let ns = run_script(r#"write(elem("p", "hi"), "div");"#).unwrap();
        assert_eq!(ns.output(), b"<div><p>hi</p></div>");
    }

    #[test]
    fn nested_markup_builds_and_serializes() {
        let ns = run_script(
            r#"
            let list = elem("ul");
            list = list.append(elem("li", "one"));
            list = list.append(elem("li", "two"));
            write(list);
            "#,
        )
        .unwrap();
        assert_eq!(ns.output(), b"<ul><li>one</li><li>two</li></ul>");
    }

    #[test]
    fn script_code_lands_in_a_script_element() {
        let ns = run_script(r#"write(script("alert(1)"));"#).unwrap();
        assert_eq!(ns.output(), b"<script>alert(1)</script>");
    }

    #[test]
    fn other_values_stringify() {
        let ns = run_script(r#"write(42, "span");"#).unwrap();
        assert_eq!(ns.output(), b"<span>42</span>");
    }

    #[test]
    fn exit_halts_and_keeps_prior_output() {
        let ns = run_script(r#"write("A"); exit(); write("B");"#).unwrap();
        assert!(ns.is_halted());
        assert_eq!(ns.output(), b"A");
    }

    #[test]
    fn headers_set_before_exit_survive() {
        let ns = run_script(r#"header("X-Early", "yes"); exit(); header("X-Late", "no");"#)
            .unwrap();
        let keys: Vec<_> = ns.headers().iter().map(|(k, _)| k.as_str()).collect();
        assert!(keys.contains(&"X-Early"));
        assert!(!keys.contains(&"X-Late"));
    }

    #[test]
    fn encoding_setting_applies_to_later_writes() {
        let ns = run_script(
            r#"
            write("é");
            set_setting("encoding", "latin-1");
            write("é");
            "#,
        )
        .unwrap();
        assert_eq!(ns.output(), &[0xc3, 0xa9, 0xe9]);
    }

    #[test]
    fn unrecognized_setting_does_not_raise() {
        let ns = run_script(r#"set_setting("theme", "dark"); write("ok");"#).unwrap();
        assert_eq!(ns.output(), b"ok");
    }

    #[test]
    fn load_returns_empty() {
        let ns = run_script(r#"write(load("fragment.html"));"#).unwrap();
        assert_eq!(ns.output(), b"");
    }

    #[test]
    fn script_name_is_visible() {
        let ns = run_script(r#"write(script_name());"#).unwrap();
        assert_eq!(ns.output(), b"test.weft");
    }

    #[test]
    fn compile_error_is_reported() {
        let interp = RhaiInterpreter::new();
        let err = interp.compile("bad.weft", r#"write("unclosed"#).unwrap_err();
        assert!(matches!(err, ScriptError::Compile { .. }));
    }

    #[test]
    fn runtime_fault_is_an_execution_error() {
        let err = run_script(r#"no_such_function();"#).unwrap_err();
        assert!(matches!(err, ScriptError::Execution { .. }));
    }

    #[test]
    fn faulted_run_still_returns_partial_state() {
        let interp = RhaiInterpreter::new();
        let artifact = interp
            .compile("test.weft", r#"write("partial"); no_such_function();"#)
            .unwrap();
        let mut ns = ExecutionNamespace::new("test.weft", UTF_8, Arc::new(HtmlFormatter));
        let err = interp.run("test.weft", &artifact, &mut ns).unwrap_err();
        assert!(matches!(err, ScriptError::Execution { .. }));
        assert_eq!(ns.output(), b"partial");
    }
}
