//! Strict type checker.
//!
//! Checks one program against a set of ambient declaration files. Every
//! strictness rule is always on. Symbols are declared eagerly (hoisted per
//! block) but typed lazily, so a function may call a helper declared further
//! down the file and interfaces may reference each other in any order.

mod call;
mod expr;
mod narrow;
mod relate;
mod resolve;
mod stmt;

use crate::ast::{Declarator, FunctionDecl, Program, Stmt, TypeAliasDecl, VarKind};
use crate::diagnostics::{codes, DeclOrigin, Issue};
use crate::span::{LineIndex, Span};
use crate::types::{InterfaceType, Origin, Type, TypeParamDef};
use once_cell::unsync::OnceCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Checker recursion limit; declarations checked on demand nest inside their use sites
const MAX_CHECK_DEPTH: u32 = 4 * crate::parser::MAX_NESTING_DEPTH;

pub(crate) use narrow::Facts;

/// One file taking part in a check; index 0 is the checked program
#[derive(Debug, Clone, Copy)]
pub struct CheckFile<'a> {
    /// Name used in related information
    pub name: &'a str,
    /// Source text
    pub text: &'a str,
    /// Parsed tree
    pub program: &'a Program,
}

/// Check `files[0]` against the declarations in the remaining files
///
/// Only issues located in the checked program are returned; problems in
/// declaration files are logged and dropped.
#[must_use]
pub fn check_program<'a>(files: &'a [CheckFile<'a>]) -> Vec<Issue> {
    let mut checker = Checker::new(files);
    checker.run();
    checker.finish()
}

pub(crate) type ScopeId = usize;
pub(crate) type SymbolId = usize;

#[derive(Debug, Clone)]
pub(crate) enum TypeSym<'a> {
    Interface(Rc<InterfaceType>),
    Alias(AliasRef<'a>),
    Param(Rc<TypeParamDef>),
    Concrete(Type),
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AliasRef<'a> {
    decl: &'a TypeAliasDecl,
    scope: ScopeId,
    file: u16,
}

#[derive(Debug, Default)]
pub(crate) struct Scope<'a> {
    parent: Option<ScopeId>,
    values: HashMap<String, SymbolId>,
    types: HashMap<String, TypeSym<'a>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SymbolKind {
    Const,
    Let,
    Var,
    Function,
    Param,
    Catch,
    Namespace,
}

impl SymbolKind {
    fn from_var(kind: VarKind) -> Self {
        match kind {
            VarKind::Const => Self::Const,
            VarKind::Let => Self::Let,
            VarKind::Var => Self::Var,
        }
    }

    /// Narrowings survive into closures
    fn is_stable(self) -> bool {
        matches!(self, Self::Const | Self::Param | Self::Function | Self::Namespace)
    }
}

#[derive(Debug, Clone)]
pub(crate) enum DeclRef<'a> {
    Declarator(&'a Declarator),
    Function(Vec<&'a FunctionDecl>),
    Namespace(&'a [Stmt]),
    Preset,
}

#[derive(Debug, Clone)]
pub(crate) enum SymState {
    Unresolved,
    Resolving,
    Resolved(Type),
}

#[derive(Debug, Clone)]
pub(crate) struct Symbol<'a> {
    name: String,
    kind: SymbolKind,
    file: u16,
    span: Span,
    scope: ScopeId,
    func_depth: u32,
    in_async: bool,
    decl: DeclRef<'a>,
    state: SymState,
}

/// Per-function checking state
#[derive(Debug, Clone, Default)]
pub(crate) struct FnCtx {
    is_async: bool,
    /// Annotated return type, unwrapped from `Promise` for async functions
    declared_ret: Option<Type>,
    /// Contextual return type for unannotated callbacks
    ctx_ret: Option<Type>,
    returns: Vec<Type>,
    bare_returns: Vec<Span>,
}

#[derive(Debug)]
struct PendingInterface<'a> {
    decls: Vec<&'a crate::ast::InterfaceDecl>,
    scope: ScopeId,
    file: u16,
}

#[derive(Debug, Default)]
pub(crate) struct LibTypes {
    array: Option<Rc<InterfaceType>>,
    string: Option<Rc<InterfaceType>>,
    number: Option<Rc<InterfaceType>>,
    boolean: Option<Rc<InterfaceType>>,
    function: Option<Rc<InterfaceType>>,
    object: Option<Rc<InterfaceType>>,
    promise: Option<Rc<InterfaceType>>,
    regexp: Option<Rc<InterfaceType>>,
    map: Option<Rc<InterfaceType>>,
    set: Option<Rc<InterfaceType>>,
}

/// Context saved while a declaration elsewhere in the file is typed
struct Detached {
    scope: ScopeId,
    file: u16,
    func_depth: u32,
    facts: Facts,
    fn_stack: Vec<FnCtx>,
    issues: Vec<Issue>,
}

pub(crate) struct Checker<'a> {
    files: &'a [CheckFile<'a>],
    line_indexes: Vec<OnceCell<LineIndex>>,
    scopes: Vec<Scope<'a>>,
    symbols: Vec<Symbol<'a>>,
    scope: ScopeId,
    file: u16,
    func_depth: u32,
    fn_stack: Vec<FnCtx>,
    facts: Facts,
    issues: Vec<Issue>,
    resolved_issues: Vec<Issue>,
    pending_interfaces: HashMap<usize, PendingInterface<'a>>,
    alias_cache: HashMap<(u16, u32), Type>,
    resolving_aliases: HashSet<(u16, u32)>,
    checked_decls: HashSet<(u16, u32)>,
    checked_fns: HashSet<(u16, u32)>,
    next_param_id: u32,
    relate_stack: Vec<(Type, Type)>,
    lib: LibTypes,
    /// Expressions and statements currently being checked
    depth: u32,
}

impl<'a> Checker<'a> {
    fn new(files: &'a [CheckFile<'a>]) -> Self {
        Self {
            files,
            line_indexes: files.iter().map(|_| OnceCell::new()).collect(),
            scopes: Vec::new(),
            symbols: Vec::new(),
            scope: 0,
            file: 0,
            func_depth: 0,
            fn_stack: Vec::new(),
            facts: Facts::default(),
            issues: Vec::new(),
            resolved_issues: Vec::new(),
            pending_interfaces: HashMap::new(),
            alias_cache: HashMap::new(),
            resolving_aliases: HashSet::new(),
            checked_decls: HashSet::new(),
            checked_fns: HashSet::new(),
            next_param_id: 0,
            relate_stack: Vec::new(),
            lib: LibTypes::default(),
            depth: 0,
        }
    }

    fn run(&mut self) {
        let files = self.files;
        let global = self.push_scope(None);
        self.scope = global;
        for (index, file) in files.iter().enumerate().skip(1) {
            self.file = index as u16;
            self.hoist(&file.program.body);
        }
        self.lib = self.lookup_lib();

        let Some(main) = files.first() else {
            return;
        };
        self.file = 0;
        self.scope = self.push_scope(Some(global));
        self.func_depth = 1;
        self.fn_stack.push(FnCtx {
            is_async: true,
            ..FnCtx::default()
        });
        self.hoist(&main.program.body);
        self.check_statements(&main.program.body);
        self.fn_stack.pop();
    }

    fn finish(mut self) -> Vec<Issue> {
        let mut issues = std::mem::take(&mut self.issues);
        issues.append(&mut self.resolved_issues);
        issues.sort_by_key(|issue| (issue.span.start, issue.code));
        issues.dedup_by(|a, b| a.code == b.code && a.span == b.span);
        issues
    }

    fn lookup_lib(&self) -> LibTypes {
        let find = |name: &str| match self.scopes[0].types.get(name) {
            Some(TypeSym::Interface(decl)) => Some(decl.clone()),
            _ => None,
        };
        LibTypes {
            array: find("Array"),
            string: find("String"),
            number: find("Number"),
            boolean: find("Boolean"),
            function: find("Function"),
            object: find("Object"),
            promise: find("Promise"),
            regexp: find("RegExp"),
            map: find("Map"),
            set: find("Set"),
        }
    }

    // ---- issues ----

    pub(crate) fn report(&mut self, issue: Issue) {
        if self.file == 0 {
            self.issues.push(issue);
        } else {
            let name = self.files.get(self.file as usize).map_or("?", |f| f.name);
            tracing::debug!(file = name, code = issue.code, message = %issue.message, "dropping declaration file issue");
        }
    }

    pub(crate) fn error(&mut self, code: u32, span: Span, message: impl Into<String>) {
        self.report(Issue::error(code, span, message));
    }

    /// Enter one more expression or statement; false once the limit is reached
    pub(crate) fn descend(&mut self, span: Span) -> bool {
        if self.depth >= MAX_CHECK_DEPTH {
            self.error(
                codes::NESTING_TOO_DEEP,
                span,
                format!("Expression or statement nested more than {MAX_CHECK_DEPTH} levels deep."),
            );
            return false;
        }
        self.depth += 1;
        true
    }

    pub(crate) fn ascend(&mut self) {
        self.depth -= 1;
    }

    /// Source text of a span in the current file
    pub(crate) fn text(&self, span: Span) -> &'a str {
        let files = self.files;
        files
            .get(self.file as usize)
            .and_then(|f| f.text.get(span.start as usize..span.end as usize))
            .unwrap_or("")
    }

    /// Resolve a declaration site to a quoted location
    pub(crate) fn locate(&self, origin: Origin) -> Option<DeclOrigin> {
        let files = self.files;
        let file = files.get(origin.file as usize)?;
        let index = self.line_indexes[origin.file as usize].get_or_init(|| LineIndex::new(file.text));
        Some(DeclOrigin::locate(file.name, file.text, index, origin.span))
    }

    pub(crate) fn origin(&self, span: Span) -> Origin {
        Origin { file: self.file, span }
    }

    // ---- scopes ----

    pub(crate) fn push_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        self.scopes.push(Scope {
            parent,
            ..Scope::default()
        });
        self.scopes.len() - 1
    }

    /// Enter a child scope of the current one, returning the scope to restore
    pub(crate) fn enter_scope(&mut self) -> ScopeId {
        let saved = self.scope;
        self.scope = self.push_scope(Some(saved));
        saved
    }

    pub(crate) fn lookup_value(&self, name: &str) -> Option<SymbolId> {
        let mut scope = Some(self.scope);
        while let Some(id) = scope {
            if let Some(sym) = self.scopes[id].values.get(name) {
                return Some(*sym);
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    pub(crate) fn lookup_type(&self, name: &str) -> Option<TypeSym<'a>> {
        let mut scope = Some(self.scope);
        while let Some(id) = scope {
            if let Some(sym) = self.scopes[id].types.get(name) {
                return Some(sym.clone());
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    /// Closest visible value name differing only in case
    pub(crate) fn similar_value(&self, name: &str) -> Option<String> {
        let lower = name.to_lowercase();
        let mut scope = Some(self.scope);
        while let Some(id) = scope {
            if let Some(found) = self.scopes[id]
                .values
                .keys()
                .find(|k| k.as_str() != name && k.to_lowercase() == lower)
            {
                return Some(found.clone());
            }
            scope = self.scopes[id].parent;
        }
        None
    }

    pub(crate) fn declare_symbol(
        &mut self,
        name: &str,
        kind: SymbolKind,
        span: Span,
        decl: DeclRef<'a>,
        state: SymState,
    ) -> SymbolId {
        let id = self.symbols.len();
        let in_async = self.fn_stack.last().is_some_and(|f| f.is_async);
        self.symbols.push(Symbol {
            name: name.to_string(),
            kind,
            file: self.file,
            span,
            scope: self.scope,
            func_depth: self.func_depth,
            in_async,
            decl,
            state,
        });
        self.scopes[self.scope].values.insert(name.to_string(), id);
        id
    }

    pub(crate) fn set_symbol_type(&mut self, id: SymbolId, ty: Type) {
        self.symbols[id].state = SymState::Resolved(ty);
    }

    pub(crate) fn new_type_param(&mut self, name: &str) -> Rc<TypeParamDef> {
        self.next_param_id += 1;
        Rc::new(TypeParamDef {
            id: self.next_param_id,
            name: name.to_string(),
            constraint: OnceCell::new(),
            default: OnceCell::new(),
        })
    }

    // ---- lazy symbol typing ----

    /// Declared type of a symbol, typing its declaration on first use
    pub(crate) fn symbol_type(&mut self, id: SymbolId) -> Type {
        match &self.symbols[id].state {
            SymState::Resolved(ty) => return ty.clone(),
            SymState::Resolving => return Type::Any,
            SymState::Unresolved => {}
        }
        self.symbols[id].state = SymState::Resolving;
        let sym = self.symbols[id].clone();
        let saved = self.detach(sym.scope, sym.file, sym.func_depth, sym.in_async);
        let ty = match sym.decl {
            DeclRef::Declarator(decl) => {
                self.check_declarator(decl, crate::ast::VarKind::from(sym.kind));
                match &self.symbols[id].state {
                    SymState::Resolved(ty) => ty.clone(),
                    _ => Type::Any,
                }
            }
            DeclRef::Function(decls) => self.function_symbol_type(id, &decls),
            DeclRef::Namespace(body) => self.namespace_type(body),
            DeclRef::Preset => Type::Any,
        };
        self.attach(saved);
        if !matches!(self.symbols[id].state, SymState::Resolved(_)) {
            self.symbols[id].state = SymState::Resolved(ty.clone());
        }
        match &self.symbols[id].state {
            SymState::Resolved(ty) => ty.clone(),
            _ => ty,
        }
    }

    fn detach(&mut self, scope: ScopeId, file: u16, func_depth: u32, in_async: bool) -> Detached {
        let saved = Detached {
            scope: self.scope,
            file: self.file,
            func_depth: self.func_depth,
            facts: std::mem::take(&mut self.facts),
            fn_stack: std::mem::take(&mut self.fn_stack),
            issues: std::mem::take(&mut self.issues),
        };
        self.scope = scope;
        self.file = file;
        self.func_depth = func_depth;
        self.fn_stack.push(FnCtx {
            is_async: in_async,
            ..FnCtx::default()
        });
        saved
    }

    fn attach(&mut self, saved: Detached) {
        let mut produced = std::mem::replace(&mut self.issues, saved.issues);
        self.resolved_issues.append(&mut produced);
        self.scope = saved.scope;
        self.file = saved.file;
        self.func_depth = saved.func_depth;
        self.facts = saved.facts;
        self.fn_stack = saved.fn_stack;
    }

    /// Run `f` with the same lexical position but no narrowing and a
    /// fresh issue buffer whose contents are kept regardless of speculation
    pub(crate) fn with_detached<T>(&mut self, scope: ScopeId, file: u16, f: impl FnOnce(&mut Self) -> T) -> T {
        let depth = self.func_depth;
        let in_async = self.fn_stack.last().is_some_and(|c| c.is_async);
        let saved = self.detach(scope, file, depth, in_async);
        let out = f(self);
        self.attach(saved);
        out
    }
}

impl From<SymbolKind> for VarKind {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Const => VarKind::Const,
            SymbolKind::Var => VarKind::Var,
            _ => VarKind::Let,
        }
    }
}

#[cfg(test)]
mod tests;
