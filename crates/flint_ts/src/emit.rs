//! Type-erasure emit and source maps.
//!
//! Erased ranges become spaces so every remaining character keeps its line
//! and column. With that layout the source map is an identity map.

use crate::lexer::tokenize;
use crate::parser::Erasure;
use flint_core::diagnostic::{SourceMap, SOURCE_FILE_NAME};

/// Name of the generated file in source maps
pub const EMITTED_FILE_NAME: &str = "main.js";

/// Blank the erased ranges of `source`
///
/// Newlines inside a range are kept. A statement erasure starts with `;` so
/// a following line that begins with `(` or `[` is not parsed as a call on
/// the previous statement.
#[must_use]
pub fn erase_types(source: &str, erasures: &[Erasure]) -> String {
    let mut ranges: Vec<Erasure> = erasures
        .iter()
        .copied()
        .filter(|e| (e.span.end as usize) <= source.len() && !e.span.is_empty())
        .collect();
    ranges.sort_by_key(|e| (e.span.start, std::cmp::Reverse(e.span.end)));

    let mut out = String::with_capacity(source.len());
    let mut pos = 0usize;
    for erasure in ranges {
        let start = erasure.span.start as usize;
        let end = erasure.span.end as usize;
        if end <= pos {
            // nested inside an earlier range
            continue;
        }
        let start = start.max(pos);
        out.push_str(&source[pos..start]);
        let mut first = erasure.statement;
        for ch in source[start..end].chars() {
            match ch {
                '\n' | '\r' => out.push(ch),
                _ if first => {
                    out.push(';');
                    first = false;
                }
                _ => out.push(' '),
            }
        }
        pos = end;
    }
    out.push_str(&source[pos..]);
    out
}

/// Identity source map: line N of the output maps to line N, column 0 of
/// the source
#[must_use]
pub fn identity_source_map(source: &str) -> SourceMap {
    let lines = source.split('\n').count();
    let mut mappings = String::with_capacity(lines * 5);
    for line in 0..lines {
        if line == 0 {
            // generated column 0, source 0, line 0, column 0
            mappings.push_str("AAAA");
        } else {
            // same columns, source line advances by one
            mappings.push_str(";AACA");
        }
    }
    SourceMap {
        version: 3,
        file: EMITTED_FILE_NAME.to_string(),
        sources: vec![SOURCE_FILE_NAME.to_string()],
        sources_content: vec![source.to_string()],
        names: Vec::new(),
        mappings,
    }
}

/// Whether the program calls `main` itself
///
/// Any call site other than the declaration counts, including calls from
/// other functions.
#[must_use]
pub fn calls_main(code: &str) -> bool {
    let (tokens, _) = tokenize(code);
    tokens.iter().enumerate().any(|(i, token)| {
        if !token.is_word("main") {
            return false;
        }
        let prev = i.checked_sub(1).and_then(|j| tokens.get(j));
        if prev.is_some_and(|p| p.is_word("function") || p.is_punct(".") || p.is_punct("?.")) {
            return false;
        }
        match tokens.get(i + 1) {
            Some(next) if next.is_punct("(") => true,
            Some(next) if next.is_punct("?.") => tokens.get(i + 2).is_some_and(|t| t.is_punct("(")),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn emit(source: &str) -> String {
        let parsed = parse_program(source);
        assert!(parsed.issues.is_empty(), "{:?}", parsed.issues);
        erase_types(source, &parsed.erasures)
    }

    #[test]
    fn test_annotation_blanked() {
        let source = "const x: number = 1;";
        let out = emit(source);
        assert_eq!(out, "const x         = 1;");
        assert_eq!(out.len(), source.len());
    }

    #[test]
    fn test_interface_statement_keeps_lines() {
        let source = "interface A {\n  a: string;\n}\nconst b = 1;";
        let out = emit(source);
        assert_eq!(out.lines().count(), source.lines().count());
        assert!(out.starts_with(';'));
        assert!(out.ends_with("const b = 1;"));
    }

    #[test]
    fn test_statement_erasure_prefix_by_hand() {
        let erasures = [Erasure {
            span: crate::span::Span::new(0, 10),
            statement: true,
        }];
        assert_eq!(erase_types("type A = 1\n(f)()", &erasures), ";         \n(f)()");
    }

    #[test]
    fn test_nested_ranges_are_skipped() {
        let erasures = [
            Erasure {
                span: crate::span::Span::new(1, 6),
                statement: false,
            },
            Erasure {
                span: crate::span::Span::new(2, 4),
                statement: false,
            },
        ];
        assert_eq!(erase_types("a12345b", &erasures), "a     b");
    }

    #[test]
    fn test_identity_map() {
        let map = identity_source_map("a\nb\nc");
        assert_eq!(map.version, 3);
        assert_eq!(map.mappings, "AAAA;AACA;AACA");
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["sources"][0], "main.ts");
        assert!(json.get("sourcesContent").is_some());
    }

    proptest::proptest! {
        #[test]
        fn prop_erasure_preserves_layout(
            names in proptest::collection::vec("v_[a-z]{1,8}", 1..6),
            types in proptest::collection::vec(proptest::sample::select(vec!["number", "string", "Note | null", "string[]"]), 6),
        ) {
            let source: String = names
                .iter()
                .zip(types.iter())
                .map(|(n, t)| format!("let {n}: {t} = undefined as unknown as {t};\n"))
                .collect();
            let parsed = parse_program(&source);
            proptest::prop_assert!(parsed.issues.is_empty());
            let out = erase_types(&source, &parsed.erasures);
            proptest::prop_assert_eq!(out.len(), source.len());
            proptest::prop_assert_eq!(out.lines().count(), source.lines().count());
            for (line, original) in out.lines().zip(source.lines()) {
                proptest::prop_assert!(line.starts_with("let "));
                let name_end = original.find(':').unwrap_or(0);
                proptest::prop_assert_eq!(&line[..name_end], &original[..name_end]);
            }
        }
    }

    #[test]
    fn test_calls_main() {
        assert!(!calls_main("async function main() { return 1; }"));
        assert!(calls_main("async function main() { return 1; }
return await main();"));
        assert!(calls_main("main();
function main() {}"));
        assert!(calls_main("const main = async () => 1;
console.log(await main?.());"));
        assert!(!calls_main("const r = { main: 1 };
r.main;
obj.main();"));
        assert!(!calls_main("const s = \"main()\";"));
    }
}
