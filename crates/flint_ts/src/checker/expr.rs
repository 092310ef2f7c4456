//! Expression typing.

use super::narrow::{falsy, truthy};
use super::SymbolKind;
use super::Checker;
use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, LogicalOp, ObjectProp, TypeKind, UnaryOp};
use crate::diagnostics::{codes, Issue};
use crate::span::Span;
use crate::types::{awaited, non_nullable, union, widen, ObjectType, Property, Type};
use std::rc::Rc;

const TYPEOF_TAGS: &[&str] = &["string", "number", "bigint", "boolean", "symbol", "undefined", "object", "function"];

/// Whether a contextual type asks for literal types to be kept
pub(crate) fn wants_literals(ctx: Option<&Type>) -> bool {
    ctx.is_some_and(|t| t.members().iter().any(Type::is_literal))
}

pub(crate) fn widen_for(ty: &Type, ctx: Option<&Type>) -> Type {
    if wants_literals(ctx) {
        ty.clone()
    } else {
        widen(ty)
    }
}

impl<'a> Checker<'a> {
    /// Type of an expression, with an optional contextual type
    pub(crate) fn check_expr(&mut self, expr: &'a Expr, ctx: Option<&Type>) -> Type {
        if !self.descend(expr.span) {
            return Type::Any;
        }
        let ty = self.check_expr_kind(expr, ctx);
        self.ascend();
        ty
    }

    fn check_expr_kind(&mut self, expr: &'a Expr, ctx: Option<&Type>) -> Type {
        match &expr.kind {
            ExprKind::Ident(name) => self.check_ident(name, expr.span),
            ExprKind::Number(n) => Type::NumLit(*n),
            ExprKind::Str(s) => Type::str_lit(s),
            ExprKind::Bool(b) => Type::BoolLit(*b),
            ExprKind::Null => Type::Null,
            ExprKind::This => {
                self.error(
                    codes::IMPLICIT_THIS,
                    expr.span,
                    "'this' implicitly has type 'any' because it does not have a type annotation.",
                );
                Type::Any
            }
            ExprKind::Template { exprs, .. } => {
                for e in exprs {
                    self.check_expr(e, None);
                }
                Type::String
            }
            ExprKind::Regex { .. } => match &self.lib.regexp {
                Some(decl) => Type::Named {
                    decl: decl.clone(),
                    args: Rc::from([]),
                },
                None => Type::Any,
            },
            ExprKind::Array(elems) => self.check_array_literal(elems, ctx, false),
            ExprKind::Object(props) => self.check_object_literal(props, ctx, false),
            ExprKind::Function { name, func } => self.check_function(func, ctx, name.as_ref()),
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => {
                let (ty, short) = self.chain(expr);
                if short {
                    union(vec![ty, Type::Undefined])
                } else {
                    ty
                }
            }
            ExprKind::New { callee, type_args, args } => self.check_new(expr, callee, type_args, args),
            ExprKind::Unary { op, arg } => self.check_unary(*op, arg),
            ExprKind::Update { arg, .. } => self.check_update(arg),
            ExprKind::Binary { op, left, right } => self.check_binary_parts(*op, left, right, expr.span).0,
            ExprKind::Logical { op, left, right } => self.check_logical(*op, left, right, ctx),
            ExprKind::Assign { op, target, value } => self.check_assign(*op, target, value, expr.span),
            ExprKind::Conditional { test, cons, alt } => {
                let cond = self.condition(test);
                let saved = std::mem::replace(&mut self.facts, cond.when_true);
                let a = self.check_expr(cons, ctx);
                self.facts = cond.when_false;
                let b = self.check_expr(alt, ctx);
                self.facts = saved;
                union(vec![a, b])
            }
            ExprKind::Await(arg) => {
                if !self.fn_stack.last().is_some_and(|f| f.is_async) {
                    self.error(
                        codes::AWAIT_OUTSIDE_ASYNC,
                        expr.span,
                        "'await' expressions are only allowed within async functions and at the top levels of modules.",
                    );
                }
                let ty = self.check_expr(arg, ctx);
                awaited(&ty)
            }
            ExprKind::Spread(arg) => self.check_expr(arg, None),
            ExprKind::Sequence(list) => {
                let mut last = Type::Undefined;
                for e in list {
                    last = self.check_expr(e, None);
                }
                last
            }
            ExprKind::As { expr: inner, ty } => {
                if matches!(&ty.kind, TypeKind::Ref { name, args } if name == "const" && args.is_empty()) {
                    return self.check_const(inner);
                }
                let target = self.resolve_type(ty);
                self.check_expr(inner, Some(&target));
                target
            }
            ExprKind::Satisfies { expr: inner, ty } => {
                let target = self.resolve_type(ty);
                let source = self.check_expr(inner, Some(&target));
                if !self.check_excess(inner, &target) && !self.is_assignable(&source, &target) {
                    self.error(
                        codes::DOES_NOT_SATISFY,
                        inner.span,
                        format!("Type '{source}' does not satisfy the expected type '{target}'."),
                    );
                }
                source
            }
            ExprKind::NonNull(inner) => {
                let ty = self.check_expr(inner, ctx);
                non_nullable(&ty)
            }
            ExprKind::Invalid => Type::Any,
        }
    }

    /// `x as const`: literal types everywhere, tuples for arrays
    fn check_const(&mut self, expr: &'a Expr) -> Type {
        match &expr.kind {
            ExprKind::Array(elems) => self.check_array_literal(elems, None, true),
            ExprKind::Object(props) => self.check_object_literal(props, None, true),
            _ => self.check_expr(expr, None),
        }
    }

    fn check_ident(&mut self, name: &str, span: Span) -> Type {
        if name == "undefined" {
            return Type::Undefined;
        }
        let Some(id) = self.lookup_value(name) else {
            match self.similar_value(name) {
                Some(similar) => {
                    let issue = Issue::error(
                        codes::CANNOT_FIND_NAME_SUGGEST,
                        span,
                        format!("Cannot find name '{name}'. Did you mean '{similar}'?"),
                    )
                    .with_suggestion(format!("Replace '{name}' with '{similar}'."));
                    self.report(issue);
                }
                None => self.error(codes::CANNOT_FIND_NAME, span, format!("Cannot find name '{name}'.")),
            }
            return Type::Any;
        };
        let sym = &self.symbols[id];
        if matches!(sym.kind, SymbolKind::Const | SymbolKind::Let)
            && sym.file == self.file
            && sym.func_depth == self.func_depth
            && span.start < sym.span.start
        {
            self.error(
                codes::USED_BEFORE_DECLARATION,
                span,
                format!("Block-scoped variable '{name}' used before its declaration."),
            );
        }
        if let Some(ty) = self.facts.get(&(id, Vec::new())) {
            return ty.clone();
        }
        self.symbol_type(id)
    }

    // ---- access chains ----

    /// Type of a member, index or call chain; the flag is set when an
    /// optional link may short-circuit the whole chain to `undefined`
    pub(crate) fn chain(&mut self, expr: &'a Expr) -> (Type, bool) {
        match &expr.kind {
            ExprKind::Member { object, prop, optional } => {
                let (obj_ty, short) = self.chain_link(object, *optional);
                if let Some(ty) = self.narrowed(expr) {
                    return (ty, short);
                }
                let ty = self.property_of(&obj_ty, object, &prop.name, prop.span, false);
                (ty, short)
            }
            ExprKind::Index { object, index, optional } => {
                let (obj_ty, short) = self.chain_link(object, *optional);
                let index_ty = self.check_expr(index, None);
                if let Some(ty) = self.narrowed(expr) {
                    return (ty, short);
                }
                let ty = self.element_of(&obj_ty, object, &index_ty, index.span, false);
                (ty, short)
            }
            ExprKind::Call {
                callee,
                type_args,
                args,
                optional,
            } => self.check_call(expr, callee, type_args, args, *optional),
            _ => (self.check_expr(expr, None), false),
        }
    }

    /// Object of one chain link, with nullish members removed after `?.`
    pub(crate) fn chain_link(&mut self, object: &'a Expr, optional: bool) -> (Type, bool) {
        let (ty, mut short) = match &object.kind {
            ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Call { .. } => self.chain(object),
            _ => (self.check_expr(object, None), false),
        };
        if optional {
            if ty.is_possibly_nullish() {
                short = true;
            }
            return (non_nullable(&ty), short);
        }
        (ty, short)
    }

    pub(crate) fn report_possibly_nullish(&mut self, expr: &'a Expr, ty: &Type, suggestion: Option<String>) {
        if ty.is_possibly_nullish() && ty.is_nullish_only() {
            self.report_nullish_value(expr, ty);
            return;
        }
        let (code, what) = match (ty.has_null(), ty.has_undefined()) {
            (true, true) => (codes::POSSIBLY_NULLISH, "'null' or 'undefined'"),
            (true, false) => (codes::POSSIBLY_NULL, "'null'"),
            _ => (codes::POSSIBLY_UNDEFINED, "'undefined'"),
        };
        let text = self.text(expr.span);
        let message = if text.len() <= 60 && !text.contains('\n') {
            format!("'{text}' is possibly {what}.")
        } else {
            format!("Object is possibly {what}.")
        };
        let mut issue = Issue::error(code, expr.span, message);
        if let Some(suggestion) = suggestion {
            issue = issue.with_suggestion(suggestion);
        }
        self.report(issue);
    }

    /// A value that is always `null` or `undefined`
    pub(crate) fn report_nullish_value(&mut self, expr: &'a Expr, ty: &Type) {
        let what = if ty.has_null() { "null" } else { "undefined" };
        self.error(codes::NULLISH_VALUE, expr.span, format!("The value '{what}' cannot be used here."));
    }

    /// Strip and report nullish members of an accessed object
    fn accessible(&mut self, ty: &Type, object: &'a Expr, access: &str) -> Option<Type> {
        match ty {
            Type::Any => return None,
            Type::Unknown => {
                let text = self.text(object.span);
                self.error(codes::UNKNOWN_ACCESS, object.span, format!("'{text}' is of type 'unknown'."));
                return None;
            }
            _ => {}
        }
        if ty.is_possibly_nullish() {
            let text = self.text(object.span);
            let suggestion = format!("Use optional chaining ('{text}?{access}') or check '{text}' first.");
            self.report_possibly_nullish(object, ty, Some(suggestion));
            let base = non_nullable(ty);
            if matches!(base, Type::Never) {
                return None;
            }
            return Some(base);
        }
        Some(ty.clone())
    }

    /// Type of `object.name`; `write` returns the declared type and rejects read-only members
    pub(crate) fn property_of(&mut self, obj_ty: &Type, object: &'a Expr, name: &str, span: Span, write: bool) -> Type {
        let Some(base) = self.accessible(obj_ty, object, &format!(".{name}")) else {
            return Type::Any;
        };
        match self.lookup_property(&base, name, true) {
            Some(prop) => {
                if write && prop.readonly {
                    self.error(
                        codes::READONLY_PROPERTY,
                        span,
                        format!("Cannot assign to '{name}' because it is a read-only property."),
                    );
                }
                prop.read_type()
            }
            None => {
                self.error(
                    codes::NO_PROPERTY,
                    span,
                    format!("Property '{name}' does not exist on type '{base}'."),
                );
                Type::Any
            }
        }
    }

    /// Type of `object[index]`
    pub(crate) fn element_of(&mut self, obj_ty: &Type, object: &'a Expr, index_ty: &Type, span: Span, write: bool) -> Type {
        let Some(base) = self.accessible(obj_ty, object, "[...]") else {
            return Type::Any;
        };
        if index_ty.is_any() {
            return Type::Any;
        }
        match (&base, index_ty) {
            (Type::Tuple(elems), Type::NumLit(n)) => {
                let index = *n as usize;
                match elems.get(index) {
                    Some(ty) if n.fract() == 0.0 && *n >= 0.0 => ty.clone(),
                    _ => {
                        self.error(
                            codes::TUPLE_OUT_OF_RANGE,
                            span,
                            format!(
                                "Tuple type '{base}' of length '{}' has no element at index '{}'.",
                                elems.len(),
                                crate::ast::format_number(*n)
                            ),
                        );
                        Type::Any
                    }
                }
            }
            (Type::Tuple(elems), idx) if idx.is_number_like() => union(elems.to_vec()),
            (Type::Array(elem), idx) if idx.is_number_like() => (**elem).clone(),
            (Type::String | Type::StrLit(_), idx) if idx.is_number_like() => Type::String,
            _ => {
                if let Type::StrLit(key) = index_ty {
                    if let Some(prop) = self.lookup_property(&base, key, true) {
                        if write && prop.readonly {
                            self.error(
                                codes::READONLY_PROPERTY,
                                span,
                                format!("Cannot assign to '{key}' because it is a read-only property."),
                            );
                        }
                        return prop.read_type();
                    }
                }
                let view = self.object_view(&base);
                let found = view.and_then(|view| {
                    if index_ty.is_number_like() {
                        view.number_index.or(view.string_index.map(|(t, _)| t))
                    } else if index_ty.is_string_like() {
                        view.string_index.map(|(t, _)| t)
                    } else {
                        None
                    }
                });
                match found {
                    Some(ty) => ty,
                    None => {
                        self.error(
                            codes::IMPLICIT_ANY_INDEX,
                            span,
                            format!(
                                "Element implicitly has an 'any' type because expression of type '{index_ty}' can't be used to index type '{base}'."
                            ),
                        );
                        Type::Any
                    }
                }
            }
        }
    }

    // ---- operators ----

    fn check_unary(&mut self, op: UnaryOp, arg: &'a Expr) -> Type {
        match op {
            UnaryOp::Not => {
                self.check_expr(arg, None);
                Type::Boolean
            }
            UnaryOp::Typeof => {
                self.check_expr(arg, None);
                union(TYPEOF_TAGS.iter().map(|t| Type::str_lit(t)).collect())
            }
            UnaryOp::Void => {
                self.check_expr(arg, None);
                Type::Undefined
            }
            UnaryOp::Delete => {
                self.check_expr(arg, None);
                Type::Boolean
            }
            UnaryOp::Neg | UnaryOp::Plus | UnaryOp::BitNot => {
                let ty = self.check_expr(arg, None);
                if matches!(op, UnaryOp::Neg) {
                    if let Type::NumLit(n) = ty {
                        return Type::NumLit(-n);
                    }
                }
                if !matches!(op, UnaryOp::Plus) && ty.is_possibly_nullish() {
                    self.report_possibly_nullish(arg, &ty, None);
                } else if !matches!(op, UnaryOp::Plus) && !ty.is_any() && !non_nullable(&ty).is_number_like() {
                    self.error(
                        codes::ARITHMETIC_OPERAND,
                        arg.span,
                        "An arithmetic operand must be of type 'any', 'number', 'bigint' or an enum type.",
                    );
                }
                Type::Number
            }
        }
    }

    fn check_update(&mut self, arg: &'a Expr) -> Type {
        let declared = self.assign_target(arg);
        let current = self.check_expr(arg, None);
        if current.is_possibly_nullish() {
            self.report_possibly_nullish(arg, &current, None);
        } else if !current.is_any() && !current.is_number_like() {
            self.error(
                codes::ARITHMETIC_OPERAND,
                arg.span,
                "An arithmetic operand must be of type 'any', 'number', 'bigint' or an enum type.",
            );
        }
        if let Some(key) = self.ref_key(arg) {
            self.facts.invalidate(&key);
            if declared.is_some_and(|d| matches!(d, Type::Union(_))) {
                self.facts.insert(key, Type::Number);
            }
        }
        Type::Number
    }

    /// Operator result along with both operand types
    pub(crate) fn check_binary_parts(&mut self, op: BinaryOp, left: &'a Expr, right: &'a Expr, span: Span) -> (Type, Type, Type) {
        let lt = self.check_expr(left, None);
        let rt = self.check_expr(right, None);
        let result = self.binary_result(op, &lt, &rt, left, right, span);
        (result, lt, rt)
    }

    fn binary_result(&mut self, op: BinaryOp, lt: &Type, rt: &Type, left: &'a Expr, right: &'a Expr, span: Span) -> Type {
        match op {
            BinaryOp::Add => {
                if lt.is_any() || rt.is_any() {
                    return Type::Any;
                }
                let l_str = !lt.is_possibly_nullish() && lt.is_string_like();
                let r_str = !rt.is_possibly_nullish() && rt.is_string_like();
                if l_str || r_str {
                    return Type::String;
                }
                for (side, ty) in [(left, lt), (right, rt)] {
                    if ty.is_possibly_nullish() {
                        self.report_possibly_nullish(side, ty, None);
                        return Type::Any;
                    }
                }
                if lt.is_number_like() && rt.is_number_like() {
                    return Type::Number;
                }
                self.error(
                    codes::BAD_OPERANDS,
                    span,
                    format!("Operator '+' cannot be applied to types '{lt}' and '{rt}'."),
                );
                Type::Any
            }
            op if op.is_arithmetic() => {
                for (side, ty, code, which) in [
                    (left, lt, codes::ARITHMETIC_LEFT, "left"),
                    (right, rt, codes::ARITHMETIC_RIGHT, "right"),
                ] {
                    if ty.is_any() {
                        continue;
                    }
                    if ty.is_possibly_nullish() {
                        self.report_possibly_nullish(side, ty, None);
                    } else if !ty.is_number_like() {
                        self.error(
                            code,
                            side.span,
                            format!(
                                "The {which}-hand side of an arithmetic operation must be of type 'any', 'number', 'bigint' or an enum type."
                            ),
                        );
                    }
                }
                Type::Number
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let mut nullish = false;
                for (side, ty) in [(left, lt), (right, rt)] {
                    if !ty.is_any() && ty.is_possibly_nullish() {
                        self.report_possibly_nullish(side, ty, None);
                        nullish = true;
                    }
                }
                let ok = lt.is_any()
                    || rt.is_any()
                    || nullish
                    || (lt.is_number_like() && rt.is_number_like())
                    || (lt.is_string_like() && rt.is_string_like());
                if !ok {
                    self.error(
                        codes::BAD_OPERANDS,
                        span,
                        format!("Operator '{}' cannot be applied to types '{lt}' and '{rt}'.", op.as_str()),
                    );
                }
                Type::Boolean
            }
            BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::LooseEq | BinaryOp::LooseNe => {
                self.check_overlap(lt, rt, op.as_str(), span);
                Type::Boolean
            }
            _ => Type::Boolean,
        }
    }

    fn check_logical(&mut self, op: LogicalOp, left: &'a Expr, right: &'a Expr, ctx: Option<&Type>) -> Type {
        match op {
            LogicalOp::And => {
                let cond = self.condition(left);
                let saved = std::mem::replace(&mut self.facts, cond.when_true);
                let rt = self.check_expr(right, ctx);
                self.facts = saved;
                self.and_type(&cond.ty, &rt)
            }
            LogicalOp::Or => {
                let cond = self.condition(left);
                let saved = std::mem::replace(&mut self.facts, cond.when_false);
                let rt = self.check_expr(right, ctx);
                self.facts = saved;
                if cond.ty.is_any() {
                    return Type::Any;
                }
                union(vec![truthy(&cond.ty), rt])
            }
            LogicalOp::Nullish => {
                let lt = self.check_expr(left, ctx);
                let rt = self.check_expr(right, ctx);
                if lt.is_any() {
                    return Type::Any;
                }
                union(vec![non_nullable(&lt), rt])
            }
        }
    }

    /// Declared type of an assignment target, reporting const and read-only targets
    fn assign_target(&mut self, target: &'a Expr) -> Option<Type> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let Some(id) = self.lookup_value(name) else {
                    self.error(codes::CANNOT_FIND_NAME, target.span, format!("Cannot find name '{name}'."));
                    return None;
                };
                match self.symbols[id].kind {
                    SymbolKind::Const => {
                        self.error(
                            codes::ASSIGN_TO_CONST,
                            target.span,
                            format!("Cannot assign to '{name}' because it is a constant."),
                        );
                        None
                    }
                    SymbolKind::Function | SymbolKind::Namespace => {
                        self.error(
                            codes::INVALID_ASSIGNMENT_TARGET,
                            target.span,
                            format!("Cannot assign to '{name}' because it is not a variable."),
                        );
                        None
                    }
                    _ => Some(self.symbol_type(id)),
                }
            }
            ExprKind::Member { object, prop, optional: false } => {
                let (obj_ty, _) = self.chain_link(object, false);
                Some(self.property_of(&obj_ty, object, &prop.name, prop.span, true))
            }
            ExprKind::Index { object, index, optional: false } => {
                let (obj_ty, _) = self.chain_link(object, false);
                let index_ty = self.check_expr(index, None);
                Some(self.element_of(&obj_ty, object, &index_ty, index.span, true))
            }
            _ => {
                self.error(
                    codes::INVALID_ASSIGNMENT_TARGET,
                    target.span,
                    "The left-hand side of an assignment expression must be a variable or a property access.",
                );
                None
            }
        }
    }

    fn check_assign(&mut self, op: AssignOp, target: &'a Expr, value: &'a Expr, span: Span) -> Type {
        let declared = self.assign_target(target);
        let key = self.ref_key(target);
        let result = match op {
            AssignOp::Assign => {
                let vt = self.check_expr(value, declared.as_ref());
                if let Some(declared) = &declared {
                    self.check_assignable(&vt, declared, Some(value), target.span);
                }
                vt
            }
            AssignOp::Compound(bin) => {
                let current = self.check_expr(target, None);
                let vt = self.check_expr(value, None);
                let result = self.binary_result(bin, &current, &vt, target, value, span);
                if let Some(declared) = &declared {
                    self.check_assignable(&result, declared, None, target.span);
                }
                result
            }
            AssignOp::Logical(logical) => {
                let current = self.check_expr(target, None);
                let vt = self.check_expr(value, declared.as_ref());
                if let Some(declared) = &declared {
                    self.check_assignable(&vt, declared, Some(value), target.span);
                }
                match logical {
                    LogicalOp::Nullish => union(vec![non_nullable(&current), vt]),
                    LogicalOp::Or => union(vec![truthy(&current), vt]),
                    LogicalOp::And => union(vec![falsy(&current), vt]),
                }
            }
        };
        if let Some(key) = key {
            self.facts.invalidate(&key);
            if let Some(declared) = &declared {
                let narrowed = self.assigned_type(declared, &result);
                if !narrowed.is_any() && narrowed != *declared {
                    self.facts.insert(key, narrowed);
                }
            }
        }
        result
    }

    /// Declared type narrowed by an assigned value
    pub(crate) fn assigned_type(&mut self, declared: &Type, assigned: &Type) -> Type {
        let Type::Union(members) = declared else {
            return declared.clone();
        };
        if assigned.is_any() {
            return declared.clone();
        }
        let sources = assigned.members();
        let kept: Vec<Type> = members
            .iter()
            .filter(|m| sources.iter().any(|s| self.is_assignable(s, m)))
            .cloned()
            .collect();
        if kept.is_empty() {
            declared.clone()
        } else {
            union(kept)
        }
    }

    // ---- literals ----

    /// Element context from an array-ish contextual type
    fn element_context(&mut self, ctx: Option<&Type>, index: usize) -> Option<Type> {
        let ctx = non_nullable(ctx?);
        let mut found = Vec::new();
        for member in ctx.members() {
            match member {
                Type::Array(elem) => found.push((*elem).clone()),
                Type::Tuple(elems) => {
                    if let Some(t) = elems.get(index) {
                        found.push(t.clone());
                    }
                }
                Type::Any => return Some(Type::Any),
                _ => {}
            }
        }
        if found.is_empty() {
            None
        } else {
            Some(union(found))
        }
    }

    fn check_array_literal(&mut self, elems: &'a [Option<Expr>], ctx: Option<&Type>, as_const: bool) -> Type {
        let tuple_ctx = ctx.is_some_and(|c| non_nullable(c).members().iter().any(|m| matches!(m, Type::Tuple(_))));
        let mut types = Vec::with_capacity(elems.len());
        let mut spread = false;
        for (i, elem) in elems.iter().enumerate() {
            let elem_ctx = self.element_context(ctx, i);
            match elem {
                None => types.push(Type::Undefined),
                Some(Expr {
                    kind: ExprKind::Spread(inner),
                    span,
                }) => {
                    spread = true;
                    let ty = self.check_expr(inner, ctx);
                    let elem_ty = self.iter_elem(&ty, inner, *span);
                    types.push(elem_ty);
                }
                Some(e) => {
                    let ty = if as_const {
                        self.check_const(e)
                    } else {
                        self.check_expr(e, elem_ctx.as_ref())
                    };
                    types.push(ty);
                }
            }
        }
        if (as_const || tuple_ctx) && !spread {
            return Type::Tuple(types.into());
        }
        if types.is_empty() {
            return match self.element_context(ctx, 0) {
                Some(elem) => Type::array(elem),
                None => Type::array(Type::Any),
            };
        }
        let elem_ctx = self.element_context(ctx, 0);
        let elem = widen_for(&union(types), elem_ctx.as_ref());
        Type::array(elem)
    }

    /// Contextual type of one property in an object literal
    fn property_context(&mut self, ctx: Option<&Type>, name: &str) -> Option<Type> {
        let ctx = non_nullable(ctx?);
        if ctx.is_any() {
            return Some(Type::Any);
        }
        let mut found = Vec::new();
        for member in ctx.members() {
            if matches!(member, Type::Object(_) | Type::Named { .. }) {
                if let Some(prop) = self.lookup_property(&member, name, true) {
                    found.push(prop.ty);
                }
            }
        }
        if found.is_empty() {
            None
        } else {
            Some(union(found))
        }
    }

    fn check_object_literal(&mut self, props: &'a [ObjectProp], ctx: Option<&Type>, as_const: bool) -> Type {
        let mut obj = ObjectType::default();
        let mut computed = Vec::new();
        for prop in props {
            match prop {
                ObjectProp::KeyValue { key, value } => {
                    let name = key.static_name();
                    if let crate::ast::PropKey::Computed(expr) = key {
                        if name.is_none() {
                            self.check_expr(expr, None);
                        }
                    }
                    let prop_ctx = match &name {
                        Some(name) => self.property_context(ctx, name),
                        None => None,
                    };
                    let ty = if as_const {
                        self.check_const(value)
                    } else {
                        let ty = self.check_expr(value, prop_ctx.as_ref());
                        widen_for(&ty, prop_ctx.as_ref())
                    };
                    match name {
                        Some(name) => {
                            obj.props.insert(
                                name,
                                Property {
                                    readonly: as_const,
                                    origin: Some(self.origin(key.span())),
                                    ..Property::new(ty)
                                },
                            );
                        }
                        None => computed.push(ty),
                    }
                }
                ObjectProp::Shorthand(ident) => {
                    let ty = self.check_ident(&ident.name, ident.span);
                    let prop_ctx = self.property_context(ctx, &ident.name);
                    let ty = if as_const { ty } else { widen_for(&ty, prop_ctx.as_ref()) };
                    obj.props.insert(
                        ident.name.clone(),
                        Property {
                            readonly: as_const,
                            origin: Some(self.origin(ident.span)),
                            ..Property::new(ty)
                        },
                    );
                }
                ObjectProp::Spread(expr) => {
                    let ty = self.check_expr(expr, None);
                    let ty = non_nullable(&ty);
                    if ty.is_any() {
                        obj.string_index = Some((Type::Any, false));
                        continue;
                    }
                    if let Some(view) = self.object_view(&ty) {
                        for (name, prop) in view.props {
                            obj.props.insert(name, prop);
                        }
                        if obj.string_index.is_none() {
                            obj.string_index = view.string_index;
                        }
                    }
                }
                ObjectProp::Method { key, func } => {
                    let name = key.static_name();
                    let prop_ctx = match &name {
                        Some(name) => self.property_context(ctx, name),
                        None => None,
                    };
                    let ty = self.check_function(func, prop_ctx.as_ref(), None);
                    if let Some(name) = name {
                        obj.props.insert(
                            name,
                            Property {
                                origin: Some(self.origin(key.span())),
                                ..Property::new(ty)
                            },
                        );
                    }
                }
            }
        }
        if !computed.is_empty() && obj.string_index.is_none() {
            let mut all = computed;
            all.extend(obj.props.values().map(|p| p.ty.clone()));
            obj.string_index = Some((union(all), false));
        }
        Type::Object(Rc::new(obj))
    }

    // ---- iteration ----

    /// Element type produced by iterating a value
    pub(crate) fn iter_elem(&mut self, ty: &Type, expr: &'a Expr, span: Span) -> Type {
        let base = if ty.is_possibly_nullish() && !ty.is_any() {
            self.report_possibly_nullish(expr, ty, None);
            non_nullable(ty)
        } else {
            ty.clone()
        };
        match self.iterated(&base) {
            Some(elem) => elem,
            None => {
                self.error(
                    codes::NOT_ITERABLE,
                    span,
                    format!("Type '{base}' must have a '[Symbol.iterator]()' method that returns an iterator."),
                );
                Type::Any
            }
        }
    }

    pub(crate) fn iterated(&mut self, ty: &Type) -> Option<Type> {
        match ty {
            Type::Any | Type::Never => Some(Type::Any),
            Type::Array(elem) => Some((**elem).clone()),
            Type::Tuple(elems) => Some(union(elems.to_vec())),
            Type::String | Type::StrLit(_) => Some(Type::String),
            Type::Union(members) => {
                let mut out = Vec::new();
                for m in members.iter() {
                    out.push(self.iterated(m)?);
                }
                Some(union(out))
            }
            Type::Param(p) => {
                let constraint = p.constraint.get()?.clone();
                self.iterated(&constraint)
            }
            Type::Named { decl, args } => {
                let is = |lib: &Option<Rc<crate::types::InterfaceType>>| lib.as_ref().is_some_and(|d| Rc::ptr_eq(d, decl));
                if is(&self.lib.map) {
                    return Some(Type::Tuple(args.to_vec().into()));
                }
                if is(&self.lib.set) {
                    return args.first().cloned();
                }
                let view = self.object_view(ty)?;
                if view.props.contains_key("length") {
                    view.number_index
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}
