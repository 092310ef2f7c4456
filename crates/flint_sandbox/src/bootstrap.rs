//! Script text run inside every fresh context.
//!
//! The hardening script evaluates to a function. The sandbox calls it once
//! with the native bridge callbacks, so the callbacks never appear on the
//! global object.

use flint_core::{Capability, NAMESPACES};
use flint_ts::emit::calls_main;
use std::collections::BTreeMap;

/// Globals replaced with trap accessors; touching one is a capability violation
pub const TRAPPED_GLOBALS: &[&str] = &[
    "process",
    "require",
    "fetch",
    "XMLHttpRequest",
    "WebSocket",
    "Deno",
    "eval",
    "Function",
    "WebAssembly",
    "importScripts",
    "module",
    "exports",
    "global",
    "window",
    "self",
];

/// Console methods captured into the execution result
pub const CONSOLE_METHODS: &[&str] = &["log", "info", "warn", "error", "debug"];

/// Script name for the hardening script
pub const BOOTSTRAP_SCRIPT_NAME: &str = "[flint:bootstrap]";

/// Script name for the custom function prelude
pub const PRELUDE_SCRIPT_NAME: &str = "[flint:custom]";

/// Script name for the program
pub const PROGRAM_SCRIPT_NAME: &str = "[flint:main]";

/// Members of each capability namespace, e.g. `notes -> [get, list, ...]`
#[must_use]
pub fn namespace_members() -> BTreeMap<&'static str, Vec<&'static str>> {
    let mut members: BTreeMap<&'static str, Vec<&'static str>> =
        NAMESPACES.iter().map(|ns| (*ns, Vec::new())).collect();
    for capability in Capability::ALL {
        members.entry(capability.namespace()).or_default().push(capability.member());
    }
    members
}

/// The hardening script
///
/// Evaluates to `(call, log, violation, namespaces, traps, bindings) => void`:
///
/// - `call(name, args)` dispatches a capability and returns a promise
/// - `log(level, message)` records console output
/// - `violation(name)` reports a forbidden global and terminates
#[must_use]
pub fn bootstrap_script() -> String {
    format!(
        r#"(call, log, violation, namespaces, traps, bindings) => {{
  const g = globalThis;
  const define = Object.defineProperty;
  const freeze = Object.freeze;
  const deepFreeze = (value) => {{
    if (value !== null && typeof value === "object" && !Object.isFrozen(value)) {{
      for (const key of Object.keys(value)) deepFreeze(value[key]);
      freeze(value);
    }}
    return value;
  }};
  const constant = (name, value) => {{
    delete g[name];
    define(g, name, {{ value, writable: false, enumerable: false, configurable: false }});
  }};

  for (const ns of Object.keys(namespaces)) {{
    const target = {{}};
    for (const member of namespaces[ns]) {{
      const name = ns + "." + member;
      target[member] = (...args) => call(name, args.map((a) => (a === undefined ? null : a)));
    }}
    constant(ns, freeze(target));
  }}

  const render = (value) => {{
    if (typeof value === "string") return value;
    try {{
      const text = JSON.stringify(value);
      return text === undefined ? String(value) : text;
    }} catch (_) {{
      return String(value);
    }}
  }};
  const sink = {{}};
  for (const level of {console_methods}) {{
    sink[level] = (...args) => {{ log(level, args.map(render).join(" ")); }};
  }}
  constant("console", freeze(sink));

  for (const name of Object.keys(bindings)) constant(name, deepFreeze(bindings[name]));

  delete g.Deno;
  delete g.__bootstrap;

  const sealConstructor = (proto) => define(proto, "constructor", {{
    value: undefined, writable: false, enumerable: false, configurable: false,
  }});
  const AsyncFunction = (async function () {{}}).constructor;
  const GeneratorFunction = (function* () {{}}).constructor;
  const AsyncGeneratorFunction = (async function* () {{}}).constructor;
  sealConstructor(Function.prototype);
  sealConstructor(AsyncFunction.prototype);
  sealConstructor(GeneratorFunction.prototype);
  sealConstructor(AsyncGeneratorFunction.prototype);

  for (const name of traps) {{
    delete g[name];
    define(g, name, {{
      get() {{ return violation(name); }},
      set(_) {{ violation(name); }},
      enumerable: false,
      configurable: false,
    }});
  }}
}}"#,
        console_methods = js_string_array(CONSOLE_METHODS),
    )
}

/// Wrap erased program text as an async body
///
/// The program starts on the first line of the wrapper, so stack positions
/// line up with the submitted source. When the body falls off the end and a
/// `main` function exists that the program never calls itself, its awaited
/// result is the program's result.
#[must_use]
pub fn wrap_program(code: &str) -> String {
    if calls_main(code) {
        format!("(async () => {{{code}\n;return undefined;\n}})()")
    } else {
        format!("(async () => {{{code}\n;return typeof main === \"function\" ? await main() : undefined;\n}})()")
    }
}

fn js_string_array(items: &[&str]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("\"{item}\"")).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_members_cover_every_capability() {
        let members = namespace_members();
        assert_eq!(members.len(), NAMESPACES.len());
        assert_eq!(members["notes"], vec!["get", "list", "create", "update", "remove", "search"]);
        assert_eq!(members["vaults"], vec!["current", "list"]);
        assert_eq!(members["links"], vec!["backlinks"]);
        let total: usize = members.values().map(Vec::len).sum();
        assert_eq!(total, Capability::ALL.len());
    }

    #[test]
    fn test_bootstrap_is_a_function_expression() {
        let script = bootstrap_script();
        assert!(script.starts_with("(call, log, violation, namespaces, traps, bindings) =>"));
        assert!(script.contains(r#"["log", "info", "warn", "error", "debug"]"#));
        assert!(script.contains("delete g.Deno;"));
        assert!(script.trim_end().ends_with('}'));
    }

    #[test]
    fn test_wrap_program_keeps_first_line() {
        let wrapped = wrap_program("const x = 1;\nreturn x;");
        assert!(wrapped.starts_with("(async () => {const x = 1;\n"));
        assert!(wrapped.ends_with("})()"));
        assert_eq!(wrapped.lines().count(), 4);
    }

    #[test]
    fn test_wrap_program_invokes_main_once() {
        let auto = wrap_program("async function main() { return 1; }");
        assert!(auto.contains("await main()"));
        let explicit = wrap_program("async function main() { return 1; }\nreturn await main();");
        assert_eq!(explicit.matches("main()").count(), 1);
        assert!(explicit.ends_with(";return undefined;\n})()"));
    }

    #[test]
    fn test_trapped_globals_include_network_and_eval() {
        for name in ["fetch", "eval", "Function", "process", "require"] {
            assert!(TRAPPED_GLOBALS.contains(&name));
        }
    }
}
