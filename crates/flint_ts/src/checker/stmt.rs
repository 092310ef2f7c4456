//! Statements, declarations, functions and reachability.

use super::expr::widen_for;
use super::narrow::literal_of;
use super::resolve::param_display_name;
use super::{Checker, DeclRef, FnCtx, SymState, SymbolId, SymbolKind};
use crate::ast::{
    Declarator, Expr, FnBody, ForHead, ForInit, Function, FunctionDecl, Ident, Pattern, PatternKind, Stmt, StmtKind,
    VarKind,
};
use crate::diagnostics::{codes, Issue};
use crate::span::Span;
use crate::types::{
    awaited, non_nullable, promise_arg, remove_undefined, union, widen, ObjectType, SigParam, Signature, Type,
};
use std::rc::Rc;

impl<'a> Checker<'a> {
    /// Check a statement list; returns whether its end is reachable
    pub(crate) fn check_statements(&mut self, stmts: &'a [Stmt]) -> bool {
        let mut reachable = true;
        let mut reported = false;
        for stmt in stmts {
            if !reachable && !reported && is_executable(stmt) {
                self.report(Issue::warning(codes::UNREACHABLE_CODE, stmt.span, "Unreachable code detected."));
                reported = true;
            }
            let falls = self.check_stmt(stmt);
            reachable &= falls;
        }
        reachable
    }

    fn check_block(&mut self, stmts: &'a [Stmt]) -> bool {
        let saved = self.enter_scope();
        self.hoist(stmts);
        let falls = self.check_statements(stmts);
        self.scope = saved;
        falls
    }

    fn check_stmt(&mut self, stmt: &'a Stmt) -> bool {
        if !self.descend(stmt.span) {
            return true;
        }
        let completes = self.check_stmt_kind(stmt);
        self.ascend();
        completes
    }

    fn check_stmt_kind(&mut self, stmt: &'a Stmt) -> bool {
        match &stmt.kind {
            StmtKind::Var(decl) => {
                if !decl.declare {
                    for d in &decl.decls {
                        self.check_declarator(d, decl.kind);
                    }
                }
                true
            }
            StmtKind::Function(func) => {
                self.check_function_stmt(func);
                true
            }
            StmtKind::Expr(expr) => {
                self.check_expr(expr, None);
                true
            }
            StmtKind::Block(stmts) => self.check_block(stmts),
            StmtKind::If { test, cons, alt } => {
                let cond = self.condition(test);
                let saved = std::mem::replace(&mut self.facts, cond.when_true);
                let cons_falls = self.check_stmt(cons);
                let after_cons = std::mem::replace(&mut self.facts, cond.when_false);
                let alt_falls = match alt {
                    Some(alt) => self.check_stmt(alt),
                    None => true,
                };
                let after_alt = std::mem::take(&mut self.facts);
                self.facts = match (cons_falls, alt_falls) {
                    (true, true) => after_cons.join(&after_alt),
                    (true, false) => after_cons,
                    (false, true) => after_alt,
                    (false, false) => saved,
                };
                cons_falls || alt_falls
            }
            StmtKind::For { init, test, update, body } => {
                let saved_scope = self.enter_scope();
                match init {
                    Some(ForInit::Var(decl)) => {
                        self.hoist_var(decl);
                        for d in &decl.decls {
                            self.check_declarator(d, decl.kind);
                        }
                    }
                    Some(ForInit::Expr(expr)) => {
                        self.check_expr(expr, None);
                    }
                    None => {}
                }
                let updates: Vec<&Expr> = update.iter().collect();
                self.invalidate_assigned(&[body.as_ref()], &updates);
                let exit = match test {
                    Some(test) => {
                        let cond = self.condition(test);
                        self.facts = cond.when_true;
                        Some(cond.when_false)
                    }
                    None => None,
                };
                self.check_stmt(body);
                if let Some(update) = update {
                    self.check_expr(update, None);
                }
                self.scope = saved_scope;
                match exit {
                    Some(facts) => {
                        self.facts = facts;
                        self.invalidate_assigned(&[body.as_ref()], &updates);
                        true
                    }
                    None => {
                        self.invalidate_assigned(&[body.as_ref()], &updates);
                        contains_break(body, None)
                    }
                }
            }
            StmtKind::ForOf { head, iter, body } => {
                let iterable = self.check_expr(iter, None);
                let elem = self.iter_elem(&iterable, iter, iter.span);
                self.check_loop_head(head, elem, body);
                true
            }
            StmtKind::ForIn { head, object, body } => {
                self.check_expr(object, None);
                self.check_loop_head(head, Type::String, body);
                true
            }
            StmtKind::While { test, body } => {
                self.invalidate_assigned(&[body.as_ref()], &[test]);
                let cond = self.condition(test);
                self.facts = cond.when_true;
                self.check_stmt(body);
                self.facts = cond.when_false;
                self.invalidate_assigned(&[body.as_ref()], &[test]);
                !is_true_literal(test) || contains_break(body, None)
            }
            StmtKind::DoWhile { body, test } => {
                self.invalidate_assigned(&[body.as_ref()], &[test]);
                self.check_stmt(body);
                let cond = self.condition(test);
                self.facts = cond.when_false;
                self.invalidate_assigned(&[body.as_ref()], &[test]);
                !is_true_literal(test) || contains_break(body, None)
            }
            StmtKind::Switch { discriminant, cases } => self.check_switch(discriminant, cases),
            StmtKind::Try {
                block,
                param,
                handler,
                finalizer,
            } => {
                let block_falls = self.check_block(block);
                let block_stmts: Vec<&Stmt> = block.iter().collect();
                self.invalidate_assigned(&block_stmts, &[]);
                let handler_falls = match handler {
                    Some(handler) => {
                        let saved = self.enter_scope();
                        if let Some(param) = param {
                            self.bind_pattern(param, &Type::Unknown, SymbolKind::Catch, true);
                        }
                        self.hoist(handler);
                        let falls = self.check_statements(handler);
                        self.scope = saved;
                        let handler_stmts: Vec<&Stmt> = handler.iter().collect();
                        self.invalidate_assigned(&handler_stmts, &[]);
                        falls
                    }
                    None => false,
                };
                let finally_falls = match finalizer {
                    Some(finalizer) => self.check_block(finalizer),
                    None => true,
                };
                (block_falls || handler_falls) && finally_falls
            }
            StmtKind::Throw(expr) => {
                self.check_expr(expr, None);
                false
            }
            StmtKind::Return(value) => {
                self.check_return(value.as_ref(), stmt.span);
                false
            }
            StmtKind::Break(_) | StmtKind::Continue(_) => false,
            StmtKind::Labeled { label, body } => {
                let falls = self.check_stmt(body);
                falls || contains_break(body, Some(label.name.as_str()))
            }
            StmtKind::Interface(decl) => {
                if let Some(super::TypeSym::Interface(shell)) = self.scopes[self.scope].types.get(&decl.name.name).cloned() {
                    self.ensure_filled(&shell);
                }
                true
            }
            StmtKind::TypeAlias(decl) => {
                self.check_alias_decl(decl);
                true
            }
            StmtKind::Namespace { .. } | StmtKind::Empty => true,
        }
    }

    fn check_loop_head(&mut self, head: &'a ForHead, elem: Type, body: &'a Stmt) {
        let saved = self.enter_scope();
        self.invalidate_assigned(&[body], &[]);
        match head {
            ForHead::Decl(kind, pattern) => self.bind_pattern(pattern, &elem, SymbolKind::from_var(*kind), true),
            ForHead::Expr(target) => {
                if let Some(key) = self.ref_key(target) {
                    self.facts.invalidate(&key);
                }
                let declared = self.check_expr(target, None);
                self.check_assignable(&elem, &declared, None, target.span);
            }
        }
        self.check_stmt(body);
        self.scope = saved;
        self.invalidate_assigned(&[body], &[]);
    }

    fn check_switch(&mut self, discriminant: &'a Expr, cases: &'a [crate::ast::SwitchCase]) -> bool {
        let disc_ty = self.check_expr(discriminant, None);
        let key = self.ref_key(discriminant);
        let saved_scope = self.enter_scope();
        for case in cases {
            self.hoist(&case.body);
        }
        let all: Vec<&Stmt> = cases.iter().flat_map(|c| c.body.iter()).collect();
        let entry = self.facts.clone();
        let mut has_default = false;
        let mut last_falls = false;
        for case in cases {
            let mut facts = entry.clone();
            match &case.test {
                Some(test) => {
                    let test_ty = self.check_expr(test, None);
                    self.check_overlap(&disc_ty, &test_ty, "===", test.span);
                    if let (Some(key), Some(lit)) = (&key, literal_of(test)) {
                        facts.insert(key.clone(), super::narrow::narrow_literal(&disc_ty, &lit, true));
                    }
                }
                None => has_default = true,
            }
            // a clause reached by fallthrough sees both paths
            self.facts = if last_falls { self.facts.join(&facts) } else { facts };
            last_falls = self.check_statements(&case.body);
        }
        self.scope = saved_scope;
        self.facts = entry;
        self.invalidate_assigned(&all, &[]);
        let breaks = cases.iter().any(|c| c.body.iter().any(|s| contains_break(s, None)));
        !has_default || last_falls || breaks
    }

    fn check_return(&mut self, value: Option<&'a Expr>, span: Span) {
        let (is_async, declared, ctx_ret) = match self.fn_stack.last() {
            Some(ctx) => (ctx.is_async, ctx.declared_ret.clone(), ctx.ctx_ret.clone()),
            None => (false, None, None),
        };
        match value {
            Some(expr) => {
                let ctx = declared.as_ref().or(ctx_ret.as_ref());
                let mut ty = self.check_expr(expr, ctx);
                if is_async {
                    ty = awaited(&ty);
                }
                if let Some(declared) = &declared {
                    self.check_assignable(&ty, declared, Some(expr), expr.span);
                }
                let ty = widen_for(&ty, ctx);
                if let Some(ctx) = self.fn_stack.last_mut() {
                    ctx.returns.push(ty);
                }
            }
            None => {
                if let Some(declared) = &declared {
                    if !accepts_undefined(declared) {
                        self.error(
                            codes::NOT_ASSIGNABLE,
                            span,
                            format!("Type 'undefined' is not assignable to type '{declared}'."),
                        );
                    }
                }
                if let Some(ctx) = self.fn_stack.last_mut() {
                    ctx.bare_returns.push(span);
                }
            }
        }
    }

    // ---- declarations ----

    /// Check one declarator and record the types of the names it binds
    pub(crate) fn check_declarator(&mut self, decl: &'a Declarator, kind: VarKind) {
        if !self.checked_decls.insert((self.file, decl.span.start)) {
            return;
        }
        let single = match &decl.pattern.kind {
            PatternKind::Ident(id) => self.lookup_value(&id.name),
            _ => None,
        };
        if let Some(id) = single {
            if matches!(self.symbols[id].state, SymState::Unresolved) {
                self.symbols[id].state = SymState::Resolving;
            }
        }

        let declared = decl.ty.as_ref().map(|t| self.resolve_type(t));
        let init_ty = decl.init.as_ref().map(|e| self.check_expr(e, declared.as_ref()));
        let ty = match (&declared, &init_ty, &decl.init) {
            (Some(declared), Some(init_ty), Some(init)) => {
                self.check_assignable(init_ty, declared, Some(init), pattern_span(&decl.pattern));
                declared.clone()
            }
            (Some(declared), _, _) => declared.clone(),
            (None, Some(init_ty), _) => {
                if kind == VarKind::Const {
                    init_ty.clone()
                } else {
                    widen(init_ty)
                }
            }
            (None, None, _) => Type::Any,
        };
        let sym_kind = SymbolKind::from_var(kind);
        self.bind_pattern(&decl.pattern, &ty, sym_kind, false);

        if let (Some(id), Some(declared), Some(init_ty)) = (single, &declared, &init_ty) {
            let narrowed = self.assigned_type(declared, init_ty);
            if narrowed != *declared {
                self.facts.insert((id, Vec::new()), narrowed);
            }
        }
    }

    /// Bind the names of a pattern; `declare` creates new symbols, otherwise
    /// the hoisted ones are typed
    pub(crate) fn bind_pattern(&mut self, pattern: &'a Pattern, ty: &Type, kind: SymbolKind, declare: bool) {
        match &pattern.kind {
            PatternKind::Ident(id) => {
                if declare {
                    self.declare_symbol(&id.name, kind, id.span, DeclRef::Preset, SymState::Resolved(ty.clone()));
                } else if let Some(sym) = self.lookup_value(&id.name) {
                    self.set_symbol_type(sym, ty.clone());
                }
            }
            PatternKind::Object { props, rest } => {
                let base = non_nullable(ty);
                let mut used = Vec::new();
                for prop in props {
                    let name = prop.key.static_name();
                    let prop_ty = match &name {
                        _ if base.is_any() => Type::Any,
                        Some(name) => match self.lookup_property(&base, name, true) {
                            Some(p) => p.read_type(),
                            None => {
                                self.error(
                                    codes::NO_PROPERTY,
                                    prop.key.span(),
                                    format!("Property '{name}' does not exist on type '{base}'."),
                                );
                                Type::Any
                            }
                        },
                        None => Type::Any,
                    };
                    if let Some(name) = name {
                        used.push(name);
                    }
                    let prop_ty = self.apply_default(prop_ty, prop.default.as_ref());
                    self.bind_pattern(&prop.value, &prop_ty, kind, declare);
                }
                if let Some(rest) = rest {
                    let rest_ty = match self.object_view(&base) {
                        Some(view) => {
                            let props = view.props.into_iter().filter(|(k, _)| !used.contains(k)).collect();
                            Type::Object(Rc::new(ObjectType::with_props(props)))
                        }
                        None => Type::Any,
                    };
                    self.bind_pattern(rest, &rest_ty, kind, declare);
                }
            }
            PatternKind::Array { elems, rest } => {
                let base = non_nullable(ty);
                for (i, elem) in elems.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let elem_ty = match &base {
                        Type::Tuple(items) => items.get(i).cloned().unwrap_or(Type::Undefined),
                        Type::Array(item) => (**item).clone(),
                        Type::Any => Type::Any,
                        other => match self.iterated(other) {
                            Some(elem_ty) => elem_ty,
                            None => {
                                self.error(
                                    codes::NOT_ITERABLE,
                                    pattern.span,
                                    format!("Type '{other}' must have a '[Symbol.iterator]()' method that returns an iterator."),
                                );
                                Type::Any
                            }
                        },
                    };
                    let elem_ty = self.apply_default(elem_ty, elem.default.as_ref());
                    self.bind_pattern(&elem.pattern, &elem_ty, kind, declare);
                }
                if let Some(rest) = rest {
                    let rest_ty = match &base {
                        Type::Tuple(items) => Type::Tuple(items.iter().skip(elems.len()).cloned().collect()),
                        Type::Array(_) => base.clone(),
                        _ => Type::array(Type::Any),
                    };
                    self.bind_pattern(rest, &rest_ty, kind, declare);
                }
            }
        }
    }

    fn apply_default(&mut self, ty: Type, default: Option<&'a Expr>) -> Type {
        let Some(default) = default else {
            return ty;
        };
        let base = remove_undefined(&ty);
        let default_ty = self.check_expr(default, Some(&base));
        if !ty.is_any() {
            self.check_assignable(&default_ty, &base, Some(default), default.span);
        }
        if ty.is_any() {
            ty
        } else {
            union(vec![base, widen(&default_ty)])
        }
    }

    // ---- functions ----

    fn check_function_stmt(&mut self, decl: &'a FunctionDecl) {
        if decl.func.body.is_none() {
            return;
        }
        if let Some(id) = self.lookup_value(&decl.name.name) {
            self.symbol_type(id);
        }
        if !self.checked_fns.contains(&(self.file, decl.func.span.start)) {
            self.check_function_decl(decl);
        }
    }

    fn check_function_decl(&mut self, decl: &'a FunctionDecl) -> Type {
        self.checked_fns.insert((self.file, decl.func.span.start));
        let (scope, file) = (self.scope, self.file);
        self.with_detached(scope, file, |c| c.check_function(&decl.func, None, Some(&decl.name)))
    }

    /// Type of a function declaration symbol, including overloads
    pub(crate) fn function_symbol_type(&mut self, id: SymbolId, decls: &[&'a FunctionDecl]) -> Type {
        let signatures: Vec<&'a FunctionDecl> = decls.iter().copied().filter(|d| d.func.body.is_none()).collect();
        if !signatures.is_empty() {
            let sigs: Vec<Rc<Signature>> = signatures
                .iter()
                .map(|d| Rc::new(self.resolve_signature(&d.func)))
                .collect();
            return if sigs.len() == 1 {
                Type::Function(Rc::clone(&sigs[0]))
            } else {
                Type::Object(Rc::new(ObjectType {
                    calls: sigs,
                    ..ObjectType::default()
                }))
            };
        }
        let Some(implementation) = decls.first().copied() else {
            return Type::Any;
        };
        let func = &implementation.func;
        let fully_annotated = func.ret.is_some() && func.params.iter().all(|p| p.ty.is_some());
        if fully_annotated {
            // recursive calls see the declared signature
            let sig = self.resolve_signature(func);
            self.set_symbol_type(id, Type::Function(Rc::new(sig)));
        }
        self.check_function_decl(implementation)
    }

    /// First call signature of a contextual type
    fn context_signature(&mut self, ctx: &Type) -> Option<Rc<Signature>> {
        let ctx = non_nullable(ctx);
        let sigs = self.call_signatures(&ctx);
        sigs.into_iter().next()
    }

    /// Check a function body and return the function type
    pub(crate) fn check_function(&mut self, func: &'a Function, ctx: Option<&Type>, name: Option<&'a Ident>) -> Type {
        let ctx_sig = ctx.and_then(|c| self.context_signature(c));
        let saved_scope = self.enter_scope();
        let type_params = self.declare_type_params(&func.type_params);

        if let Some(name) = name {
            if self.lookup_value(&name.name).is_none() {
                self.declare_symbol(&name.name, SymbolKind::Function, name.span, DeclRef::Preset, SymState::Resolved(Type::Any));
            }
        }

        let mut params = Vec::with_capacity(func.params.len());
        for (i, p) in func.params.iter().enumerate() {
            let contextual = ctx_sig.as_ref().and_then(|sig| match sig.params.get(i) {
                Some(sp) if sp.rest => Some(if p.rest { sp.ty.clone() } else { sig.param_type_at(i).unwrap_or(Type::Any) }),
                _ if p.rest => sig.param_type_at(i).map(Type::array),
                _ => sig.param_type_at(i),
            });
            let ty = if let Some(node) = &p.ty {
                self.resolve_type(node)
            } else if let Some(ty) = contextual {
                ty
            } else if let Some(default) = &p.default {
                let ty = self.check_expr(default, None);
                widen(&ty)
            } else {
                self.report_implicit_any(&p.pattern);
                if p.rest { Type::array(Type::Any) } else { Type::Any }
            };
            let binding = if p.default.is_some() {
                if p.ty.is_some() {
                    let default = p.default.as_ref();
                    self.apply_default(ty.clone(), default)
                } else {
                    remove_undefined(&ty)
                }
            } else if p.optional {
                union(vec![ty.clone(), Type::Undefined])
            } else {
                ty.clone()
            };
            self.bind_pattern(&p.pattern, &binding, SymbolKind::Param, true);
            params.push(SigParam {
                name: param_display_name(&p.pattern),
                ty,
                optional: p.optional || p.default.is_some(),
                rest: p.rest,
            });
        }

        let declared_ret = func.ret.as_ref().map(|t| self.resolve_type(t));
        let unwrapped = declared_ret.as_ref().map(|r| {
            if func.is_async {
                promise_arg(r).unwrap_or_else(|| r.clone())
            } else {
                r.clone()
            }
        });
        let ctx_ret = match (&declared_ret, &ctx_sig) {
            (None, Some(sig)) if !matches!(sig.ret, Type::Void) => {
                Some(if func.is_async { awaited(&sig.ret) } else { sig.ret.clone() })
            }
            _ => None,
        };

        let ret = match &func.body {
            None => declared_ret.clone().unwrap_or(Type::Any),
            Some(body) => {
                self.fn_stack.push(FnCtx {
                    is_async: func.is_async,
                    declared_ret: unwrapped.clone(),
                    ctx_ret: ctx_ret.clone(),
                    ..FnCtx::default()
                });
                self.func_depth += 1;
                let closure_facts = self.closure_facts();
                let outer_facts = std::mem::replace(&mut self.facts, closure_facts);
                let falls = match body {
                    FnBody::Block(stmts) => {
                        self.hoist(stmts);
                        self.check_statements(stmts)
                    }
                    FnBody::Expr(expr) => {
                        let ctx = unwrapped.as_ref().or(ctx_ret.as_ref());
                        let mut ty = self.check_expr(expr, ctx);
                        if func.is_async {
                            ty = awaited(&ty);
                        }
                        if let Some(declared) = &unwrapped {
                            self.check_assignable(&ty, declared, Some(expr), expr.span);
                        }
                        let ty = widen_for(&ty, ctx);
                        if let Some(fn_ctx) = self.fn_stack.last_mut() {
                            fn_ctx.returns.push(ty);
                        }
                        false
                    }
                };
                self.facts = outer_facts;
                self.func_depth -= 1;
                let fn_ctx = self.fn_stack.pop().unwrap_or_default();
                self.function_return(func, name, unwrapped.as_ref(), declared_ret.as_ref(), fn_ctx, falls)
            }
        };
        let predicate = self.type_predicate(func);
        self.scope = saved_scope;
        Type::Function(Rc::new(Signature {
            type_params,
            params,
            ret,
            predicate,
            origin: Some(self.origin(func.span)),
        }))
    }

    fn report_implicit_any(&mut self, pattern: &'a Pattern) {
        match &pattern.kind {
            PatternKind::Ident(id) => self.error(
                codes::IMPLICIT_ANY_PARAMETER,
                id.span,
                format!("Parameter '{}' implicitly has an 'any' type.", id.name),
            ),
            _ => {
                let mut names = Vec::new();
                super::resolve::pattern_names(pattern, &mut names);
                for (name, span) in names {
                    self.error(
                        codes::IMPLICIT_ANY_BINDING,
                        span,
                        format!("Binding element '{name}' implicitly has an 'any' type."),
                    );
                }
            }
        }
    }

    /// Return type of a checked body, reporting missing returns
    fn function_return(
        &mut self,
        func: &'a Function,
        name: Option<&'a Ident>,
        unwrapped: Option<&Type>,
        declared: Option<&Type>,
        fn_ctx: FnCtx,
        falls: bool,
    ) -> Type {
        let is_block = matches!(func.body, Some(FnBody::Block(_)));
        let has_value = !fn_ctx.returns.is_empty();
        let anchor = name.map_or(Span::new(func.span.start, func.span.start + 1), |n| n.span);

        if let (Some(declared), Some(unwrapped)) = (declared, unwrapped) {
            if is_block && falls && !accepts_undefined(unwrapped) {
                let span = func.ret.as_ref().map_or(anchor, |r| r.span);
                self.error(
                    codes::LACKS_RETURN,
                    span,
                    "Function lacks ending return statement and return type does not include 'undefined'.",
                );
            }
            return declared.clone();
        }

        if has_value {
            for span in &fn_ctx.bare_returns {
                self.error(codes::NOT_ALL_PATHS_RETURN, *span, "Not all code paths return a value.");
            }
            if is_block && falls {
                self.error(codes::NOT_ALL_PATHS_RETURN, anchor, "Not all code paths return a value.");
            }
        }
        let mut inferred = if has_value { union(fn_ctx.returns) } else { Type::Void };
        if has_value && (falls || !fn_ctx.bare_returns.is_empty()) {
            inferred = union(vec![inferred, Type::Undefined]);
        }
        if func.is_async {
            self.promise_of(inferred)
        } else {
            inferred
        }
    }
}

fn accepts_undefined(ty: &Type) -> bool {
    ty.members()
        .iter()
        .any(|m| matches!(m, Type::Any | Type::Unknown | Type::Void | Type::Undefined))
}

fn is_executable(stmt: &Stmt) -> bool {
    !matches!(
        stmt.kind,
        StmtKind::Function(_) | StmtKind::Interface(_) | StmtKind::TypeAlias(_) | StmtKind::Empty | StmtKind::Namespace { .. }
    ) && !matches!(&stmt.kind, StmtKind::Var(decl) if decl.kind == VarKind::Var && decl.decls.iter().all(|d| d.init.is_none()))
}

fn is_true_literal(expr: &Expr) -> bool {
    matches!(expr.kind, crate::ast::ExprKind::Bool(true))
}

fn pattern_span(pattern: &Pattern) -> Span {
    match &pattern.kind {
        PatternKind::Ident(id) => id.span,
        _ => pattern.span,
    }
}

/// Whether a `break` (optionally targeting `label`) leaves `stmt`
fn contains_break(stmt: &Stmt, label: Option<&str>) -> bool {
    match &stmt.kind {
        StmtKind::Break(None) => label.is_none(),
        StmtKind::Break(Some(target)) => label.is_none_or(|l| l == target.name),
        StmtKind::Block(stmts) => stmts.iter().any(|s| contains_break(s, label)),
        StmtKind::If { cons, alt, .. } => {
            contains_break(cons, label) || alt.as_ref().is_some_and(|a| contains_break(a, label))
        }
        StmtKind::Labeled { body, .. } => contains_break(body, label),
        StmtKind::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            block.iter().any(|s| contains_break(s, label))
                || handler.iter().flatten().any(|s| contains_break(s, label))
                || finalizer.iter().flatten().any(|s| contains_break(s, label))
        }
        // unlabeled breaks inside nested loops and switches stay there
        StmtKind::For { body, .. }
        | StmtKind::ForOf { body, .. }
        | StmtKind::ForIn { body, .. }
        | StmtKind::While { body, .. }
        | StmtKind::DoWhile { body, .. } => label.is_some() && contains_break(body, label),
        StmtKind::Switch { cases, .. } => {
            label.is_some() && cases.iter().any(|c| c.body.iter().any(|s| contains_break(s, label)))
        }
        _ => false,
    }
}
