//! Assignability, excess properties and comparability.

use super::Checker;
use crate::ast::{Expr, ExprKind, ObjectProp};
use crate::diagnostics::{codes, Issue};
use crate::span::Span;
use crate::types::{non_nullable, substitute_signature, Signature, Type};
use std::collections::HashMap;
use std::rc::Rc;

const MAX_RELATE_DEPTH: usize = 48;

impl<'a> Checker<'a> {
    /// Whether `source` can be assigned to `target`
    pub(crate) fn is_assignable(&mut self, source: &Type, target: &Type) -> bool {
        if source == target {
            return true;
        }
        match (source, target) {
            (_, Type::Any | Type::Unknown) | (Type::Any | Type::Never, _) => return true,
            (Type::Awaited(_), _) | (_, Type::Awaited(_)) => return true,
            _ => {}
        }
        if let Type::Union(members) = source {
            return members.iter().all(|m| self.is_assignable(m, target));
        }
        if let Type::Union(members) = target {
            if members.iter().any(|m| m == source) {
                return true;
            }
            return members.iter().any(|m| self.is_assignable(source, m));
        }
        match (source, target) {
            (Type::Undefined, Type::Void) => true,
            (Type::StrLit(_), Type::String) | (Type::NumLit(_), Type::Number) | (Type::BoolLit(_), Type::Boolean) => {
                true
            }
            (Type::Param(p), _) => match p.constraint.get() {
                Some(constraint) => {
                    let constraint = constraint.clone();
                    self.is_assignable(&constraint, target)
                }
                None => false,
            },
            (_, Type::Param(_)) => false,
            (Type::Array(s), Type::Array(t)) => self.is_assignable(s, t),
            (Type::Tuple(s), Type::Array(t)) => s.iter().all(|e| self.is_assignable(e, t)),
            (Type::Array(_), Type::Tuple(_)) => false,
            (Type::Tuple(s), Type::Tuple(t)) => {
                if s.len() > t.len() {
                    return false;
                }
                t.iter().enumerate().all(|(i, te)| match s.get(i) {
                    Some(se) => self.is_assignable(se, te),
                    None => te.has_undefined(),
                })
            }
            (Type::Named { decl: a, args: aa }, Type::Named { decl: b, args: ba }) if Rc::ptr_eq(a, b) => {
                aa.iter().zip(ba.iter()).all(|(s, t)| self.is_assignable(s, t))
            }
            (Type::Function(s), Type::Function(t)) => {
                let (s, t) = (s.clone(), t.clone());
                self.guarded(source, target, |c| c.signature_assignable(&s, &t))
            }
            (Type::Named { .. } | Type::Object(_), Type::Function(t)) => {
                let t = t.clone();
                let calls = self.call_signatures(source);
                !calls.is_empty() && self.guarded(source, target, |c| calls.iter().any(|s| c.signature_assignable(s, &t)))
            }
            (
                _,
                Type::Null
                | Type::Undefined
                | Type::Void
                | Type::Never
                | Type::String
                | Type::Number
                | Type::Boolean
                | Type::StrLit(_)
                | Type::NumLit(_)
                | Type::BoolLit(_),
            ) => false,
            (Type::Null | Type::Undefined | Type::Void | Type::Unknown, _) => false,
            _ => self.guarded(source, target, |c| c.structurally_assignable(source, target)),
        }
    }

    fn guarded(&mut self, source: &Type, target: &Type, f: impl FnOnce(&mut Self) -> bool) -> bool {
        if self.relate_stack.len() > MAX_RELATE_DEPTH
            || self.relate_stack.iter().any(|(s, t)| s == source && t == target)
        {
            return true;
        }
        self.relate_stack.push((source.clone(), target.clone()));
        let out = f(self);
        self.relate_stack.pop();
        out
    }

    fn structurally_assignable(&mut self, source: &Type, target: &Type) -> bool {
        let Some(target_view) = self.object_view(target) else {
            return false;
        };
        let Some(source_view) = self.object_view(source) else {
            return false;
        };
        for (name, tprop) in &target_view.props {
            match self.lookup_property(source, name, false) {
                Some(sprop) => {
                    if sprop.optional && !tprop.optional {
                        return false;
                    }
                    if !self.is_assignable(&sprop.read_type(), &tprop.read_type()) {
                        return false;
                    }
                }
                None if tprop.optional => {}
                None => return false,
            }
        }
        if let Some((index_ty, _)) = &target_view.string_index {
            for prop in source_view.props.values() {
                if !self.is_assignable(&prop.read_type(), index_ty) {
                    return false;
                }
            }
            if let Some((source_index, _)) = &source_view.string_index {
                if !self.is_assignable(source_index, index_ty) {
                    return false;
                }
            }
        }
        if let Some(index_ty) = &target_view.number_index {
            if let Some(source_index) = source_view.number_index.as_ref().or(source_view.string_index.as_ref().map(|(t, _)| t)) {
                if !self.is_assignable(source_index, index_ty) {
                    return false;
                }
            }
        }
        for tsig in &target_view.calls {
            let mut found = false;
            for ssig in &source_view.calls {
                if self.signature_assignable(ssig, tsig) {
                    found = true;
                    break;
                }
            }
            if !found {
                return false;
            }
        }
        for tsig in &target_view.constructs {
            if !source_view.constructs.iter().any(|s| s.params.len() <= tsig.params.len()) {
                return false;
            }
        }
        true
    }

    /// Function compatibility with generics erased to `any`
    pub(crate) fn signature_assignable(&mut self, source: &Signature, target: &Signature) -> bool {
        let source = erase_generics(source);
        let target = erase_generics(target);
        if source.min_args() > target.max_args().unwrap_or(usize::MAX) {
            return false;
        }
        let count = source.params.len().max(target.params.len());
        for i in 0..count {
            if let (Some(sp), Some(tp)) = (source.param_type_at(i), target.param_type_at(i)) {
                if !self.is_assignable(&tp, &sp) {
                    return false;
                }
            }
        }
        matches!(target.ret, Type::Void) || self.is_assignable(&source.ret, &target.ret)
    }

    /// Report 2322 unless `source` is assignable; `expr` enables the excess property check
    pub(crate) fn check_assignable(&mut self, source: &Type, target: &Type, expr: Option<&'a Expr>, span: Span) -> bool {
        if let Some(expr) = expr {
            if self.check_excess(expr, target) {
                return false;
            }
        }
        if self.is_assignable(source, target) {
            return true;
        }
        let message = self.not_assignable_message(source, target);
        self.error(codes::NOT_ASSIGNABLE, span, message);
        false
    }

    pub(crate) fn not_assignable_message(&mut self, source: &Type, target: &Type) -> String {
        let mut message = format!("Type '{source}' is not assignable to type '{target}'.");
        if let Some(detail) = self.assign_detail(source, target) {
            message.push_str("\n  ");
            message.push_str(&detail);
        }
        message
    }

    /// First structural reason an object is not assignable
    fn assign_detail(&mut self, source: &Type, target: &Type) -> Option<String> {
        if source.is_possibly_nullish() && !target.is_possibly_nullish() && !source.is_nullish_only() {
            let base = non_nullable(source);
            if self.is_assignable(&base, target) {
                let missing = match (source.has_null(), source.has_undefined()) {
                    (true, true) => "'null | undefined'",
                    (true, false) => "'null'",
                    _ => "'undefined'",
                };
                return Some(format!("Type {missing} is not assignable to type '{target}'."));
            }
        }
        if matches!(target, Type::Union(_)) {
            return None;
        }
        let target_view = match target {
            Type::Object(_) | Type::Named { .. } => self.object_view(target)?,
            _ => return None,
        };
        self.object_view(source)?;
        for (name, tprop) in &target_view.props {
            match self.lookup_property(source, name, false) {
                None if !tprop.optional => {
                    return Some(format!(
                        "Property '{name}' is missing in type '{source}' but required in type '{target}'."
                    ));
                }
                Some(sprop) if !self.is_assignable(&sprop.read_type(), &tprop.read_type()) => {
                    return Some(format!(
                        "Types of property '{name}' are incompatible. Type '{}' is not assignable to type '{}'.",
                        sprop.read_type(),
                        tprop.read_type()
                    ));
                }
                _ => {}
            }
        }
        None
    }

    /// Report the first property an object literal adds beyond `target`
    pub(crate) fn check_excess(&mut self, expr: &'a Expr, target: &Type) -> bool {
        match &expr.kind {
            ExprKind::Object(props) => self.check_object_excess(props, target),
            ExprKind::Array(elems) => {
                let target = non_nullable(target);
                let mut found = false;
                for (i, elem) in elems.iter().enumerate() {
                    let Some(elem) = elem else { continue };
                    let elem_target = match &target {
                        Type::Array(t) => (**t).clone(),
                        Type::Tuple(ts) => match ts.get(i) {
                            Some(t) => t.clone(),
                            None => continue,
                        },
                        _ => return false,
                    };
                    found |= self.check_excess(elem, &elem_target);
                }
                found
            }
            ExprKind::As { .. } | ExprKind::Satisfies { .. } => false,
            _ => false,
        }
    }

    fn check_object_excess(&mut self, props: &'a [ObjectProp], target: &Type) -> bool {
        let target = non_nullable(target);
        let mut known: HashMap<String, Type> = HashMap::new();
        for member in target.members() {
            if matches!(member, Type::Any | Type::Unknown | Type::Param(_) | Type::Awaited(_)) {
                return false;
            }
            let Some(view) = self.object_view(&member) else {
                continue;
            };
            if view.string_index.is_some() || matches!(member, Type::Function(_)) || !view.calls.is_empty() {
                return false;
            }
            if view.props.is_empty() && matches!(&member, Type::Object(_)) {
                // `object` and `{}` accept anything
                return false;
            }
            for (name, prop) in view.props {
                known
                    .entry(name)
                    .and_modify(|ty| *ty = crate::types::union(vec![ty.clone(), prop.ty.clone()]))
                    .or_insert(prop.ty);
            }
        }
        if known.is_empty() && !matches!(target, Type::Object(_) | Type::Named { .. }) {
            return false;
        }
        for prop in props {
            let (name, span, value) = match prop {
                ObjectProp::KeyValue { key, value } => match key.static_name() {
                    Some(name) => (name, key.span(), Some(value)),
                    None => continue,
                },
                ObjectProp::Shorthand(ident) => (ident.name.clone(), ident.span, None),
                ObjectProp::Method { key, .. } => match key.static_name() {
                    Some(name) => (name, key.span(), None),
                    None => continue,
                },
                ObjectProp::Spread(_) => continue,
            };
            match known.get(&name) {
                None => {
                    let message = format!(
                        "Object literal may only specify known properties, and '{name}' does not exist in type '{target}'."
                    );
                    self.report(Issue::error(codes::EXCESS_PROPERTY, span, message));
                    return true;
                }
                Some(prop_ty) => {
                    if let Some(value) = value {
                        let prop_ty = prop_ty.clone();
                        if self.check_excess(value, &prop_ty) {
                            return true;
                        }
                    }
                }
            }
        }
        false
    }

    /// Report 2367 when an equality can never hold
    pub(crate) fn check_overlap(&mut self, left: &Type, right: &Type, op: &str, span: Span) {
        if comparable(left, right) {
            return;
        }
        let message = format!(
            "This comparison appears to be unintentional because the types '{left}' and '{right}' have no overlap."
        );
        self.report(Issue::error(codes::NO_OVERLAP, span, message).with_suggestion(format!(
            "Check the operands of '{op}'; one side can never equal the other."
        )));
    }
}

fn erase_generics(sig: &Signature) -> Signature {
    if sig.type_params.is_empty() {
        return sig.clone();
    }
    let map = sig.type_params.iter().map(|p| (p.id, Type::Any)).collect();
    let mut out = substitute_signature(sig, &map);
    out.type_params.clear();
    out
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Prim {
    String,
    Number,
    Boolean,
}

fn prim(ty: &Type) -> Option<Prim> {
    match ty {
        Type::String | Type::StrLit(_) => Some(Prim::String),
        Type::Number | Type::NumLit(_) => Some(Prim::Number),
        Type::Boolean | Type::BoolLit(_) => Some(Prim::Boolean),
        _ => None,
    }
}

/// Whether two types can hold an equal value; only primitive mismatches are rejected
pub(crate) fn comparable(left: &Type, right: &Type) -> bool {
    let strip = |ty: &Type| -> Vec<Type> {
        ty.members()
            .into_iter()
            .filter(|m| !matches!(m, Type::Null | Type::Undefined | Type::Void))
            .collect()
    };
    let l = strip(left);
    let r = strip(right);
    if l.is_empty() || r.is_empty() {
        return true;
    }
    if l.iter().chain(r.iter()).any(|m| prim(m).is_none()) {
        return true;
    }
    l.iter().any(|a| {
        r.iter().any(|b| {
            if prim(a) != prim(b) {
                return false;
            }
            !(a.is_literal() && b.is_literal() && a != b)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparable_literals() {
        assert!(comparable(&Type::str_lit("a"), &Type::String));
        assert!(!comparable(&Type::str_lit("a"), &Type::str_lit("b")));
        assert!(!comparable(&Type::Number, &Type::String));
        assert!(comparable(&Type::Number, &Type::Null));
    }

    #[test]
    fn test_comparable_ignores_objects() {
        let obj = Type::Object(Rc::default());
        assert!(comparable(&obj, &Type::String));
        let mixed = crate::types::union(vec![Type::String, Type::Undefined]);
        assert!(comparable(&mixed, &Type::Undefined));
    }
}
