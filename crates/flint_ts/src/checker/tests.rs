use super::*;
use crate::parser::{parse_declarations, parse_program};

const LIB: &str = include_str!("../../ambient/lib.d.ts");
const NOTES: &str = include_str!("../../ambient/notes.d.ts");
const VAULTS: &str = include_str!("../../ambient/vaults.d.ts");

fn codes_for(source: &str) -> Vec<u32> {
    issues_for(source).into_iter().map(|i| i.code).collect()
}

fn issues_for(source: &str) -> Vec<Issue> {
    let main = parse_program(source);
    assert!(main.issues.is_empty(), "syntax errors: {:?}", main.issues);
    let lib = parse_declarations(LIB);
    let notes = parse_declarations(NOTES);
    let vaults = parse_declarations(VAULTS);
    let files = [
        CheckFile {
            name: "main.ts",
            text: source,
            program: &main.program,
        },
        CheckFile {
            name: "lib.d.ts",
            text: LIB,
            program: &lib.program,
        },
        CheckFile {
            name: "notes.d.ts",
            text: NOTES,
            program: &notes.program,
        },
        CheckFile {
            name: "vaults.d.ts",
            text: VAULTS,
            program: &vaults.program,
        },
    ];
    check_program(&files)
}

#[test]
fn test_clean_program() {
    let source = r#"
const note = await notes.get("abc");
if (note) {
    console.log(note.title.toUpperCase());
}
const total: number = [1, 2, 3].length;
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_unguarded_nullable_access() {
    let source = r#"
const note = await notes.get("abc");
console.log(note.title);
"#;
    assert_eq!(codes_for(source), vec![18047]);
}

#[test]
fn test_optional_chain_is_allowed() {
    let source = r#"
const note = await notes.get("abc");
const title: string | undefined = note?.title;
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_undeclared_name() {
    assert_eq!(codes_for("const env = process.env;"), vec![2304]);
}

#[test]
fn test_wrong_arity() {
    assert_eq!(codes_for(r#"await notes.get("a", "b");"#), vec![2554]);
}

#[test]
fn test_argument_type_mismatch() {
    assert_eq!(codes_for("await notes.get(42);"), vec![2345]);
}

#[test]
fn test_excess_property() {
    let source = r#"await notes.create({ title: "t", colour: "red" });"#;
    assert_eq!(codes_for(source), vec![2353]);
}

#[test]
fn test_implicit_any_parameter() {
    assert_eq!(codes_for("function double(x) { return x * 2; }"), vec![7006]);
}

#[test]
fn test_contextual_callback_parameter_is_typed() {
    let source = r#"
const list = await notes.list();
const titles = list.map((n) => n.title);
const first: string | undefined = titles[0];
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_assign_to_const() {
    assert_eq!(codes_for("const a = 1;\na = 2;"), vec![2588]);
}

#[test]
fn test_not_assignable() {
    assert_eq!(codes_for(r#"const n: number = "one";"#), vec![2322]);
}

#[test]
fn test_missing_property() {
    let source = r#"
const vault = await vaults.current();
console.log(vault.colour);
"#;
    assert_eq!(codes_for(source), vec![2339]);
}

#[test]
fn test_typeof_narrowing() {
    let source = r#"
function size(value: string | number): number {
    if (typeof value === "string") {
        return value.length;
    }
    return value;
}
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_missing_return() {
    let source = r#"
function pick(flag: boolean): string {
    if (flag) {
        return "yes";
    }
}
"#;
    assert_eq!(codes_for(source), vec![2366]);
}

#[test]
fn test_not_all_paths_return() {
    let source = r#"
function pick(flag: boolean) {
    if (flag) {
        return "yes";
    }
}
"#;
    assert_eq!(codes_for(source), vec![7030]);
}

#[test]
fn test_unreachable_code_is_warning() {
    let source = r#"
function f(): number {
    return 1;
    console.log("never");
}
"#;
    let issues = issues_for(source);
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, 7027);
}

#[test]
fn test_hoisted_function_call() {
    let source = r#"
const n: number = helper(2);
function helper(x: number): number {
    return x + 1;
}
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_used_before_declaration() {
    assert_eq!(codes_for("console.log(later);\nconst later = 1;"), vec![2448]);
}

#[test]
fn test_destructuring_with_defaults() {
    let source = r#"
const { title, tags = [] } = await notes.create({ title: "t" });
const upper: string = title.toUpperCase();
const count: number = tags.length;
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_issues_only_in_main_file() {
    for issue in issues_for("const x: string = 1;") {
        assert!(issue.span.end as usize <= "const x: string = 1;".len());
    }
}

#[test]
fn test_check_depth_limit() {
    let source = "1 + 2;";
    let main = parse_program(source);
    let files = [CheckFile {
        name: "main.ts",
        text: source,
        program: &main.program,
    }];
    let mut checker = Checker::new(&files);
    checker.depth = MAX_CHECK_DEPTH;
    let crate::ast::StmtKind::Expr(expr) = &main.program.body[0].kind else {
        panic!("expected expression statement");
    };
    assert!(matches!(checker.check_expr(expr, None), Type::Any));
    assert_eq!(checker.depth, MAX_CHECK_DEPTH);
    assert!(checker.issues.iter().any(|i| i.code == codes::NESTING_TOO_DEEP));
}

#[test]
fn test_definitely_null_value() {
    let issues = issues_for("const missing = null;\nconst n = missing.length;");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].code, codes::NULLISH_VALUE);
    assert_eq!(issues[0].message, "The value 'null' cannot be used here.");
    assert_eq!(codes_for("const u = undefined;\nu.x;"), vec![18050]);
    assert_eq!(codes_for("const f = null;\nf();"), vec![18050]);
    assert_eq!(codes_for("function g(s: string | null) { return s.length; }"), vec![18047]);
}

#[test]
fn test_instanceof_narrows_caught_value() {
    let source = r#"
async function main() {
    try {
        await notes.get("a");
    } catch (e) {
        if (e instanceof Error) {
            const message: string = e.message;
            return message;
        }
        return "unknown failure";
    }
    return "ok";
}
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_instanceof_false_branch() {
    let unknown = r#"
try {
    throw new Error("x");
} catch (e) {
    if (!(e instanceof Error)) {
        console.log(e.message);
    }
}
"#;
    assert_eq!(codes_for(unknown), vec![18046]);
    let split = r#"
function describe(x: Error | string): string {
    if (x instanceof Error) {
        return x.message;
    }
    return x.toUpperCase();
}
"#;
    assert_eq!(codes_for(split), Vec::<u32>::new());
    let wrong = r#"
function describe(x: Error | string): string {
    if (x instanceof Error) {
        return x.toUpperCase();
    }
    return x.message;
}
"#;
    assert_eq!(codes_for(wrong), vec![2339, 2339]);
}

#[test]
fn test_type_predicate_functions() {
    let source = r#"
function isNote(x: unknown): x is Note {
    return x !== undefined;
}
const found: unknown = await notes.get("a");
if (isNote(found)) {
    const title: string = found.title;
}
const isNumber = (x: unknown): x is number => typeof x === "number";
const mixed: (number | string)[] = [1, "a", 2];
const numbers = mixed.filter((x): x is number => typeof x === "number");
const first: string | number | undefined = numbers[0];
function check(value: string | null): string {
    if (isText(value)) {
        return value;
    }
    return "none";
}
function isText(value: string | null): value is string {
    return value !== null;
}
console.log(isNumber(3));
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_type_predicate_false_branch() {
    let source = r#"
function isText(value: string | null): value is string {
    return value !== null;
}
function len(value: string | null): number {
    if (!isText(value)) {
        return value.length;
    }
    return value.length;
}
"#;
    assert_eq!(codes_for(source), vec![18050]);
}

#[test]
fn test_constructor_as_callback() {
    let source = r#"
const labels: string[] = [1, 2, 3].map(String);
const counts = ["1", "2"].map(Number);
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
}

#[test]
fn test_promise_void_resolve() {
    let source = r#"
await new Promise<void>(resolve => resolve());
const n: number = await new Promise<number>(resolve => resolve(1));
const nested: number = await new Promise<number>(resolve => resolve(Promise.resolve(2)));
"#;
    assert_eq!(codes_for(source), Vec::<u32>::new());
    assert_eq!(codes_for("await new Promise<number>(resolve => resolve());"), vec![2554]);
}
