//! Calls, overload selection and generic inference.

use super::Checker;
use crate::ast::{Expr, ExprKind, FnBody, ObjectProp, TypeNode};
use crate::diagnostics::{codes, Issue};
use crate::span::Span;
use crate::types::{non_nullable, substitute, substitute_signature, union, widen, Signature, Type};
use std::collections::HashMap;
use std::rc::Rc;

type Candidates = HashMap<u32, Vec<Type>>;

impl<'a> Checker<'a> {
    pub(crate) fn check_call(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        type_args: &'a [TypeNode],
        args: &'a [Expr],
        optional: bool,
    ) -> (Type, bool) {
        let (mut callee_ty, mut short) = self.chain_link(callee, false);
        if optional {
            if callee_ty.is_possibly_nullish() {
                short = true;
            }
            callee_ty = non_nullable(&callee_ty);
        } else if callee_ty.is_possibly_nullish() && callee_ty.is_nullish_only() {
            self.report_nullish_value(callee, &callee_ty);
            callee_ty = Type::Any;
        } else if !callee_ty.is_any() && callee_ty.is_possibly_nullish() {
            let text = self.text(callee.span);
            let (code, what) = if callee_ty.has_null() && !callee_ty.has_undefined() {
                (codes::CALL_POSSIBLY_NULL, "'null'")
            } else {
                (codes::CALL_POSSIBLY_UNDEFINED, "'undefined'")
            };
            let issue = Issue::error(code, callee.span, format!("Cannot invoke an object which is possibly {what}."))
                .with_suggestion(format!("Use '{text}?.()' or check '{text}' first."));
            self.report(issue);
            callee_ty = non_nullable(&callee_ty);
        }
        let ret = self.invoke(expr, callee, &callee_ty, type_args, args, false);
        (ret, short)
    }

    pub(crate) fn check_new(&mut self, expr: &'a Expr, callee: &'a Expr, type_args: &'a [TypeNode], args: &'a [Expr]) -> Type {
        let callee_ty = self.check_expr(callee, None);
        self.invoke(expr, callee, &callee_ty, type_args, args, true)
    }

    fn invoke(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        callee_ty: &Type,
        type_args: &'a [TypeNode],
        args: &'a [Expr],
        construct: bool,
    ) -> Type {
        match callee_ty {
            Type::Any | Type::Never => {
                self.check_args_loosely(args);
                return Type::Any;
            }
            Type::Unknown => {
                let text = self.text(callee.span);
                self.error(codes::UNKNOWN_ACCESS, callee.span, format!("'{text}' is of type 'unknown'."));
                self.check_args_loosely(args);
                return Type::Any;
            }
            _ => {}
        }
        let sigs = if construct {
            self.construct_signatures(callee_ty)
        } else {
            self.call_signatures(callee_ty)
        };
        if sigs.is_empty() {
            let (code, message) = if construct {
                (
                    codes::NOT_CONSTRUCTABLE,
                    format!("This expression is not constructable.\n  Type '{callee_ty}' has no construct signatures."),
                )
            } else {
                (
                    codes::NOT_CALLABLE,
                    format!("This expression is not callable.\n  Type '{callee_ty}' has no call signatures."),
                )
            };
            self.error(code, callee.span, message);
            self.check_args_loosely(args);
            return Type::Any;
        }
        let explicit: Vec<Type> = type_args.iter().map(|t| self.resolve_type(t)).collect();
        self.resolve_overloads(expr, callee, &sigs, &explicit, args)
    }

    fn check_args_loosely(&mut self, args: &'a [Expr]) {
        for arg in args {
            self.check_expr(arg, None);
        }
    }

    fn resolve_overloads(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        sigs: &[Rc<Signature>],
        explicit: &[Type],
        args: &'a [Expr],
    ) -> Type {
        let has_spread = args.iter().any(|a| matches!(a.kind, ExprKind::Spread(_)));
        let fits = |sig: &Signature| {
            has_spread
                || (args.len() >= sig.min_args() && sig.max_args().is_none_or(|max| args.len() <= max))
        };
        let candidates: Vec<&Rc<Signature>> = sigs.iter().filter(|s| fits(s)).collect();
        match candidates.as_slice() {
            [] => {
                let sig = closest_arity(sigs, args.len());
                self.apply_signature(expr, callee, &sig, explicit, args)
            }
            [only] => {
                let sig = Rc::clone(only);
                self.apply_signature(expr, callee, &sig, explicit, args)
            }
            many => {
                let many: Vec<Rc<Signature>> = many.iter().map(|s| Rc::clone(s)).collect();
                for sig in &many {
                    let mark = self.issues.len();
                    let facts = self.facts.clone();
                    let ret = self.apply_signature(expr, callee, sig, explicit, args);
                    if self.issues.len() == mark {
                        return ret;
                    }
                    self.issues.truncate(mark);
                    self.facts = facts;
                }
                let last = many.last().cloned().unwrap_or_else(|| Rc::clone(&sigs[0]));
                self.apply_signature(expr, callee, &last, explicit, args)
            }
        }
    }

    fn report_arity(&mut self, sig: &Signature, args: &'a [Expr], span: Span) {
        let got = args.len();
        let min = sig.min_args();
        let (code, expected) = match sig.max_args() {
            None => (codes::ARGUMENT_COUNT_AT_LEAST, format!("at least {min}")),
            Some(max) if max == min => (codes::ARGUMENT_COUNT, min.to_string()),
            Some(max) => (codes::ARGUMENT_COUNT, format!("{min}-{max}")),
        };
        let span = if got > sig.params.len() && sig.max_args().is_some() {
            args[sig.params.len()].span.to(args[got - 1].span)
        } else {
            span
        };
        self.error(code, span, format!("Expected {expected} arguments, but got {got}."));
    }

    /// Check arguments against one signature and return its result type
    fn apply_signature(
        &mut self,
        expr: &'a Expr,
        callee: &'a Expr,
        sig: &Rc<Signature>,
        explicit: &[Type],
        args: &'a [Expr],
    ) -> Type {
        let has_spread = args.iter().any(|a| matches!(a.kind, ExprKind::Spread(_)));
        if !has_spread
            && (args.len() < sig.min_args() || sig.max_args().is_some_and(|max| args.len() > max))
        {
            self.report_arity(sig, args, expr.span);
        }

        let mut arg_types: Vec<Option<Type>> = vec![None; args.len()];
        let sig: Rc<Signature> = if sig.type_params.is_empty() {
            Rc::clone(sig)
        } else {
            let map = if explicit.is_empty() {
                self.infer(sig, args, &mut arg_types)
            } else {
                if explicit.len() != sig.type_params.len() {
                    self.error(
                        codes::TYPE_ARGUMENT_COUNT,
                        callee.span,
                        format!(
                            "Expected {} type arguments, but got {}.",
                            sig.type_params.len(),
                            explicit.len()
                        ),
                    );
                }
                sig.type_params
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let ty = explicit
                            .get(i)
                            .cloned()
                            .or_else(|| p.default.get().cloned())
                            .unwrap_or(Type::Unknown);
                        (p.id, ty)
                    })
                    .collect()
            };
            let mut instantiated = substitute_signature(sig, &map);
            instantiated.type_params.clear();
            Rc::new(instantiated)
        };

        for (i, arg) in args.iter().enumerate() {
            let param = sig.param_type_at(i);
            if let ExprKind::Spread(inner) = &arg.kind {
                let ty = self.check_expr(inner, None);
                let elem = self.iter_elem(&ty, inner, arg.span);
                if let Some(param) = param {
                    if !self.is_assignable(&elem, &param) {
                        self.report_argument(callee, &sig, &elem, &param, arg.span);
                    }
                }
                continue;
            }
            let Some(param) = param else {
                if arg_types[i].is_none() {
                    self.check_expr(arg, None);
                }
                continue;
            };
            let arg_ty = match arg_types[i].take() {
                Some(ty) => ty,
                None => self.check_expr(arg, Some(&param)),
            };
            if self.check_excess(arg, &param) {
                continue;
            }
            if !self.is_assignable(&arg_ty, &param) {
                self.report_argument(callee, &sig, &arg_ty, &param, arg.span);
            }
        }
        sig.ret.clone()
    }

    fn report_argument(&mut self, callee: &'a Expr, sig: &Signature, arg: &Type, param: &Type, span: Span) {
        let mut message = format!("Argument of type '{arg}' is not assignable to parameter of type '{param}'.");
        if let Some(detail) = self.not_assignable_message(arg, param).split_once('\n').map(|(_, d)| d.to_string()) {
            message.push('\n');
            message.push_str(&detail);
        }
        let mut issue = Issue::error(codes::ARGUMENT_NOT_ASSIGNABLE, span, message);
        if let Some(located) = sig.origin.and_then(|o| self.locate(o)) {
            let name = callee_name(self.text(callee.span));
            issue = issue.with_related(format!("'{name}' is declared here."), located);
        }
        self.report(issue);
    }

    /// Infer type arguments; argument types computed along the way are
    /// stored so they are not checked twice
    fn infer(&mut self, sig: &Signature, args: &'a [Expr], arg_types: &mut [Option<Type>]) -> HashMap<u32, Type> {
        let ids: Vec<u32> = sig.type_params.iter().map(|p| p.id).collect();
        let placeholder: HashMap<u32, Type> = sig
            .type_params
            .iter()
            .map(|p| (p.id, p.constraint_or_unknown()))
            .collect();
        let mut cands: Candidates = HashMap::new();

        for pass in 0..2 {
            for (i, arg) in args.iter().enumerate() {
                if matches!(arg.kind, ExprKind::Spread(_)) || is_context_sensitive(arg) != (pass == 1) {
                    continue;
                }
                let Some(param) = sig.param_type_at(i) else {
                    continue;
                };
                let ctx = if pass == 0 {
                    substitute(&param, &placeholder)
                } else {
                    let partial = self.fix(sig, &cands, false);
                    substitute(&param, &partial)
                };
                let ty = self.check_expr(arg, Some(&ctx));
                match (&param, &ty) {
                    (Type::Function(_), Type::Named { .. }) => {
                        if let Some(call) = self.call_signatures(&ty).first() {
                            infer_from(&param, &Type::Function(call.clone()), &ids, &mut cands);
                        }
                    }
                    _ => infer_from(&param, &ty, &ids, &mut cands),
                }
                arg_types[i] = Some(ty);
            }
        }
        self.fix(sig, &cands, true)
    }

    /// Settle candidates into type arguments; `complete` fills the rest
    /// from defaults and constraints
    fn fix(&mut self, sig: &Signature, cands: &Candidates, complete: bool) -> HashMap<u32, Type> {
        let mut map = HashMap::new();
        for p in &sig.type_params {
            match cands.get(&p.id) {
                Some(found) if !found.is_empty() => {
                    let joined = union(found.clone());
                    let keep_literals = p
                        .constraint
                        .get()
                        .is_some_and(|c| c.members().iter().any(|m| matches!(m, Type::String | Type::Number | Type::Boolean) || m.is_literal()));
                    let ty = if keep_literals { joined } else { widen(&joined) };
                    map.insert(p.id, ty);
                }
                _ if complete => {
                    let ty = p
                        .default
                        .get()
                        .cloned()
                        .or_else(|| p.constraint.get().cloned())
                        .unwrap_or(Type::Unknown);
                    map.insert(p.id, ty);
                }
                _ => {}
            }
        }
        map
    }
}

fn closest_arity(sigs: &[Rc<Signature>], count: usize) -> Rc<Signature> {
    let distance = |s: &Rc<Signature>| {
        let min = s.min_args();
        let max = s.max_args().unwrap_or(usize::MAX);
        if count < min {
            min - count
        } else {
            count.saturating_sub(max)
        }
    };
    let mut best = Rc::clone(&sigs[0]);
    for sig in sigs.iter().skip(1) {
        if distance(sig) < distance(&best) {
            best = Rc::clone(sig);
        }
    }
    best
}

/// `notes.get(...)` is declared as `get`
fn callee_name(text: &str) -> &str {
    text.rsplit('.').next().unwrap_or(text).trim()
}

/// Arguments whose type depends on the contextual type
fn is_context_sensitive(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Function { func, .. } => {
            func.params.iter().any(|p| p.ty.is_none())
                || matches!(&func.body, Some(FnBody::Expr(body)) if is_context_sensitive(body))
        }
        ExprKind::Object(props) => props.iter().any(|p| match p {
            ObjectProp::KeyValue { value, .. } => is_context_sensitive(value),
            ObjectProp::Method { func, .. } => func.params.iter().any(|p| p.ty.is_none()),
            _ => false,
        }),
        ExprKind::Array(elems) => elems.iter().flatten().any(is_context_sensitive),
        _ => false,
    }
}

fn is_naked(ty: &Type, ids: &[u32]) -> bool {
    matches!(ty, Type::Param(p) if ids.contains(&p.id))
}

fn same_shape(param: &Type, arg: &Type) -> bool {
    match (param, arg) {
        (Type::Array(_) | Type::Tuple(_), Type::Array(_) | Type::Tuple(_)) => true,
        (Type::Named { decl: a, .. }, Type::Named { decl: b, .. }) => Rc::ptr_eq(a, b),
        (Type::Function(_), Type::Function(_)) => true,
        (Type::Object(_), Type::Object(_) | Type::Named { .. }) => true,
        _ => false,
    }
}

/// Collect inference candidates by walking a parameter type against an argument type
fn infer_from(param: &Type, arg: &Type, ids: &[u32], cands: &mut Candidates) {
    if !param.has_params() {
        return;
    }
    match (param, arg) {
        (Type::Param(p), _) if ids.contains(&p.id) => {
            if !arg.is_any() || cands.get(&p.id).is_none_or(Vec::is_empty) {
                cands.entry(p.id).or_default().push(arg.clone());
            }
        }
        (Type::Union(members), _) => {
            let naked: Vec<&Type> = members.iter().filter(|m| is_naked(m, ids)).collect();
            let shaped: Vec<&Type> = members.iter().filter(|m| !is_naked(m, ids)).collect();
            for am in arg.members() {
                if shaped.iter().any(|m| **m == am) {
                    continue;
                }
                let mut matched = false;
                for pm in &shaped {
                    if same_shape(pm, &am) {
                        infer_from(pm, &am, ids, cands);
                        matched = true;
                    }
                }
                if !matched {
                    for pm in &naked {
                        infer_from(pm, &am, ids, cands);
                    }
                }
            }
        }
        (Type::Array(pe), Type::Array(ae)) => infer_from(pe, ae, ids, cands),
        (Type::Array(pe), Type::Tuple(aes)) => infer_from(pe, &union(aes.to_vec()), ids, cands),
        (Type::Tuple(ps), Type::Tuple(aes)) => {
            for (p, a) in ps.iter().zip(aes.iter()) {
                infer_from(p, a, ids, cands);
            }
        }
        (Type::Named { decl: pd, args: pa }, Type::Named { decl: ad, args: aa }) if Rc::ptr_eq(pd, ad) => {
            for (p, a) in pa.iter().zip(aa.iter()) {
                infer_from(p, a, ids, cands);
            }
        }
        (Type::Function(ps), Type::Function(asig)) => infer_signature(ps, asig, ids, cands),
        (Type::Function(ps), Type::Object(obj)) => {
            if let Some(asig) = obj.calls.first() {
                infer_signature(ps, asig, ids, cands);
            }
        }
        (Type::Object(po), Type::Object(ao)) => {
            for (name, prop) in &po.props {
                if let Some(aprop) = ao.props.get(name) {
                    infer_from(&prop.ty, &aprop.ty, ids, cands);
                }
            }
            if let Some((index, _)) = &po.string_index {
                for aprop in ao.props.values() {
                    infer_from(index, &aprop.ty, ids, cands);
                }
                if let Some((aindex, _)) = &ao.string_index {
                    infer_from(index, aindex, ids, cands);
                }
            }
        }
        _ => {}
    }
}

fn infer_signature(param: &Signature, arg: &Signature, ids: &[u32], cands: &mut Candidates) {
    for (i, p) in param.params.iter().enumerate() {
        if let Some(a) = arg.param_type_at(i) {
            if !a.is_any() {
                infer_from(&p.ty, &a, ids, cands);
            }
        }
    }
    infer_from(&param.ret, &arg.ret, ids, cands);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeParamDef;
    use once_cell::unsync::OnceCell;

    fn param(id: u32) -> Type {
        Type::Param(Rc::new(TypeParamDef {
            id,
            name: format!("T{id}"),
            constraint: OnceCell::new(),
            default: OnceCell::new(),
        }))
    }

    #[test]
    fn test_infer_through_arrays() {
        let mut cands = Candidates::new();
        infer_from(&Type::array(param(1)), &Type::array(Type::String), &[1], &mut cands);
        assert_eq!(cands[&1], vec![Type::String]);
    }

    #[test]
    fn test_infer_union_prefers_shape() {
        // U | U[] against string[] infers U = string
        let p = union(vec![param(2), Type::array(param(2))]);
        let mut cands = Candidates::new();
        infer_from(&p, &Type::array(Type::String), &[2], &mut cands);
        assert_eq!(cands[&2], vec![Type::String]);
    }

    #[test]
    fn test_infer_skips_fixed_members() {
        let p = union(vec![param(3), Type::Undefined]);
        let mut cands = Candidates::new();
        infer_from(&p, &union(vec![Type::Number, Type::Undefined]), &[3], &mut cands);
        assert_eq!(cands[&3], vec![Type::Number]);
    }

    #[test]
    fn test_callee_name() {
        assert_eq!(callee_name("notes.get"), "get");
        assert_eq!(callee_name("helper"), "helper");
    }
}
