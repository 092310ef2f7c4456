//! Control-flow narrowing.
//!
//! A fact records the narrowed type of a reference: a symbol plus a
//! property path such as `note.folder`. Conditions produce one fact set for
//! each outcome; branches merge by joining the sets they fall through with.

use super::{Checker, SymbolId};
use crate::ast::{AssignOp, BinaryOp, Expr, ExprKind, ForHead, ForInit, FnBody, LogicalOp, ObjectProp, Stmt, StmtKind, UnaryOp};
use crate::types::{filter_union, non_nullable, union, Type};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Symbol plus property path
pub(crate) type RefKey = (SymbolId, Vec<String>);

/// Narrowed reference types at one program point
#[derive(Debug, Clone, Default)]
pub(crate) struct Facts {
    map: HashMap<RefKey, Type>,
}

impl Facts {
    pub(crate) fn get(&self, key: &RefKey) -> Option<&Type> {
        self.map.get(key)
    }

    pub(crate) fn insert(&mut self, key: RefKey, ty: Type) {
        self.map.insert(key, ty);
    }

    /// Forget a reference and everything reached through it
    pub(crate) fn invalidate(&mut self, key: &RefKey) {
        self.map
            .retain(|k, _| !(k.0 == key.0 && k.1.len() >= key.1.len() && k.1[..key.1.len()] == key.1[..]));
    }

    pub(crate) fn retain(&mut self, keep: impl Fn(&RefKey) -> bool) {
        self.map.retain(|k, _| keep(k));
    }

    /// Facts holding on both paths, widened to the union of both types
    #[must_use]
    pub(crate) fn join(&self, other: &Facts) -> Facts {
        let map = self
            .map
            .iter()
            .filter_map(|(key, a)| other.map.get(key).map(|b| (key.clone(), union(vec![a.clone(), b.clone()]))))
            .collect();
        Facts { map }
    }
}

/// Members that survive a truthy test
pub(crate) fn truthy(ty: &Type) -> Type {
    match ty {
        Type::Any | Type::Unknown => ty.clone(),
        _ => union(
            ty.members()
                .into_iter()
                .filter_map(|m| match m {
                    Type::Null | Type::Undefined | Type::Void | Type::BoolLit(false) => None,
                    Type::Boolean => Some(Type::BoolLit(true)),
                    Type::StrLit(s) if s.is_empty() => None,
                    Type::NumLit(n) if n == 0.0 || n.is_nan() => None,
                    other => Some(other),
                })
                .collect(),
        ),
    }
}

/// Members that survive a falsy test
pub(crate) fn falsy(ty: &Type) -> Type {
    match ty {
        Type::Any | Type::Unknown => ty.clone(),
        _ => union(
            ty.members()
                .into_iter()
                .filter_map(|m| match m {
                    other @ (Type::Null | Type::Undefined | Type::Void | Type::BoolLit(false)) => Some(other),
                    Type::Boolean => Some(Type::BoolLit(false)),
                    Type::String => Some(Type::str_lit("")),
                    Type::StrLit(s) if s.is_empty() => Some(Type::StrLit(s)),
                    Type::Number => Some(Type::Number),
                    Type::NumLit(n) if n == 0.0 || n.is_nan() => Some(Type::NumLit(n)),
                    other @ (Type::Param(_) | Type::Awaited(_)) => Some(other),
                    _ => None,
                })
                .collect(),
        ),
    }
}

fn typeof_matches(ty: &Type, tag: &str) -> Option<bool> {
    Some(match ty {
        Type::String | Type::StrLit(_) => tag == "string",
        Type::Number | Type::NumLit(_) => tag == "number",
        Type::Boolean | Type::BoolLit(_) => tag == "boolean",
        Type::Undefined | Type::Void => tag == "undefined",
        Type::Null => tag == "object",
        Type::Function(_) => tag == "function",
        Type::Object(obj) if !obj.calls.is_empty() => tag == "function",
        Type::Object(_) | Type::Array(_) | Type::Tuple(_) | Type::Named { .. } => tag == "object",
        _ => return None,
    })
}

fn typeof_type(tag: &str) -> Option<Type> {
    Some(match tag {
        "string" => Type::String,
        "number" => Type::Number,
        "boolean" => Type::Boolean,
        "undefined" => Type::Undefined,
        "object" => union(vec![Type::Object(Rc::default()), Type::Null]),
        _ => return None,
    })
}

/// Narrow by `typeof x === tag`
pub(crate) fn narrow_typeof(ty: &Type, tag: &str, positive: bool) -> Type {
    if matches!(ty, Type::Any | Type::Unknown) {
        return if positive {
            typeof_type(tag).unwrap_or_else(|| ty.clone())
        } else {
            ty.clone()
        };
    }
    filter_union(ty, |m| typeof_matches(m, tag).map_or(true, |hit| hit == positive))
}

/// Narrow by `x === null` (or `undefined`, or `== null` when `loose`)
pub(crate) fn narrow_nullish(ty: &Type, null: bool, loose: bool, positive: bool) -> Type {
    let hit = |m: &Type| match m {
        Type::Null => null || loose,
        Type::Undefined | Type::Void => !null || loose,
        _ => false,
    };
    if matches!(ty, Type::Any | Type::Unknown) {
        return if positive {
            match (null, loose) {
                (_, true) => union(vec![Type::Null, Type::Undefined]),
                (true, false) => Type::Null,
                (false, false) => Type::Undefined,
            }
        } else if loose {
            non_nullable(ty)
        } else {
            ty.clone()
        };
    }
    filter_union(ty, |m| hit(m) == positive)
}

/// Narrow by equality with a literal
pub(crate) fn narrow_literal(ty: &Type, lit: &Type, positive: bool) -> Type {
    if positive {
        let compatible = ty.members().iter().any(|m| {
            m == lit
                || matches!(
                    (m, lit),
                    (Type::String, Type::StrLit(_))
                        | (Type::Number, Type::NumLit(_))
                        | (Type::Boolean, Type::BoolLit(_))
                        | (Type::Any | Type::Unknown, _)
                )
        });
        if compatible {
            lit.clone()
        } else {
            ty.clone()
        }
    } else {
        match (ty, lit) {
            (Type::Boolean, Type::BoolLit(b)) => Type::BoolLit(!b),
            _ => filter_union(ty, |m| m != lit),
        }
    }
}

/// Literal type of an expression usable as a narrowing discriminant
pub(crate) fn literal_of(expr: &Expr) -> Option<Type> {
    match &expr.kind {
        ExprKind::Str(s) => Some(Type::str_lit(s)),
        ExprKind::Number(n) => Some(Type::NumLit(*n)),
        ExprKind::Bool(b) => Some(Type::BoolLit(*b)),
        ExprKind::Unary { op: UnaryOp::Neg, arg } => match arg.kind {
            ExprKind::Number(n) => Some(Type::NumLit(-n)),
            _ => None,
        },
        ExprKind::Template { quasis, exprs } if exprs.is_empty() => quasis.first().map(|s| Type::str_lit(s)),
        _ => None,
    }
}

fn is_undefined_expr(expr: &Expr) -> bool {
    matches!(&expr.kind, ExprKind::Ident(name) if name == "undefined")
        || matches!(&expr.kind, ExprKind::Unary { op: UnaryOp::Void, .. })
}

/// Outcome of a condition: its type and the facts for each branch
pub(crate) struct Condition {
    pub(crate) ty: Type,
    pub(crate) when_true: Facts,
    pub(crate) when_false: Facts,
}

impl<'a> Checker<'a> {
    /// Reference key of an identifier or a static property chain
    pub(crate) fn ref_key(&self, expr: &Expr) -> Option<RefKey> {
        match &expr.kind {
            ExprKind::Ident(name) => self.lookup_value(name).map(|id| (id, Vec::new())),
            ExprKind::Member { object, prop, .. } => {
                let (id, mut path) = self.ref_key(object)?;
                path.push(prop.name.clone());
                Some((id, path))
            }
            ExprKind::Index { object, index, .. } => {
                let name = match &index.kind {
                    ExprKind::Str(s) => s.clone(),
                    ExprKind::Number(n) => crate::ast::format_number(*n),
                    _ => return None,
                };
                let (id, mut path) = self.ref_key(object)?;
                path.push(name);
                Some((id, path))
            }
            _ => None,
        }
    }

    pub(crate) fn narrowed(&self, expr: &Expr) -> Option<Type> {
        let key = self.ref_key(expr)?;
        self.facts.get(&key).cloned()
    }

    /// Current type of a reference without reporting anything
    fn silent_ref_type(&mut self, key: &RefKey) -> Option<Type> {
        let root = (key.0, Vec::new());
        let mut ty = match self.facts.get(&root) {
            Some(ty) => ty.clone(),
            None => self.symbol_type(key.0),
        };
        for i in 0..key.1.len() {
            let prefix = (key.0, key.1[..=i].to_vec());
            ty = match self.facts.get(&prefix) {
                Some(t) => t.clone(),
                None => {
                    let base = non_nullable(&ty);
                    self.lookup_property(&base, &key.1[i], true)?.read_type()
                }
            };
        }
        Some(ty)
    }

    /// Mark every proper prefix of a reference as non-nullish
    fn narrow_prefixes(&mut self, key: &RefKey, facts: &mut Facts) {
        let saved = std::mem::replace(&mut self.facts, facts.clone());
        for len in 0..key.1.len() {
            let prefix = (key.0, key.1[..len].to_vec());
            if let Some(ty) = self.silent_ref_type(&prefix) {
                let narrowed = non_nullable(&ty);
                self.facts.insert(prefix, narrowed);
            }
        }
        *facts = std::mem::replace(&mut self.facts, saved);
    }

    fn with_fact(&mut self, key: &RefKey, ty: Type) -> Facts {
        let mut facts = self.facts.clone();
        facts.insert(key.clone(), ty);
        facts
    }

    /// Check a condition and compute the facts for both outcomes
    pub(crate) fn condition(&mut self, expr: &'a Expr) -> Condition {
        match &expr.kind {
            ExprKind::Unary { op: UnaryOp::Not, arg } => {
                let inner = self.condition(arg);
                Condition {
                    ty: Type::Boolean,
                    when_true: inner.when_false,
                    when_false: inner.when_true,
                }
            }
            ExprKind::Logical { op: LogicalOp::And, left, right } => {
                let lhs = self.condition(left);
                let saved = std::mem::replace(&mut self.facts, lhs.when_true);
                let rhs = self.condition(right);
                self.facts = saved;
                Condition {
                    ty: self.and_type(&lhs.ty, &rhs.ty),
                    when_false: lhs.when_false.join(&rhs.when_false),
                    when_true: rhs.when_true,
                }
            }
            ExprKind::Logical { op: LogicalOp::Or, left, right } => {
                let lhs = self.condition(left);
                let saved = std::mem::replace(&mut self.facts, lhs.when_false);
                let rhs = self.condition(right);
                self.facts = saved;
                Condition {
                    ty: union(vec![truthy(&lhs.ty), rhs.ty.clone()]),
                    when_true: lhs.when_true.join(&rhs.when_true),
                    when_false: rhs.when_false,
                }
            }
            ExprKind::Binary { op, left, right }
                if matches!(op, BinaryOp::StrictEq | BinaryOp::StrictNe | BinaryOp::LooseEq | BinaryOp::LooseNe) =>
            {
                self.equality_condition(expr, *op, left, right)
            }
            ExprKind::Binary { op: BinaryOp::In, left, right } => {
                let ty = self.check_expr(expr, None);
                let (Some(key), ExprKind::Str(prop)) = (self.ref_key(right), &left.kind) else {
                    return self.no_facts(ty);
                };
                let Some(current) = self.silent_ref_type(&key) else {
                    return self.no_facts(ty);
                };
                let members = current.members();
                let mut yes = Vec::new();
                let mut no = Vec::new();
                for m in members {
                    match self.lookup_property(&m, prop, false) {
                        Some(p) if !p.optional => yes.push(m),
                        Some(_) => {
                            yes.push(m.clone());
                            no.push(m);
                        }
                        None => no.push(m),
                    }
                }
                Condition {
                    ty,
                    when_true: self.with_fact(&key, union(yes)),
                    when_false: self.with_fact(&key, union(no)),
                }
            }
            ExprKind::Binary { op: BinaryOp::Instanceof, left, right } => {
                let (ty, _, ctor) = self.check_binary_parts(BinaryOp::Instanceof, left, right, expr.span);
                let Some(key) = self.ref_key(left) else {
                    return self.no_facts(ty);
                };
                let Some(current) = self.silent_ref_type(&key) else {
                    return self.no_facts(ty);
                };
                let instance = union(self.construct_signatures(&ctor).iter().map(|sig| sig.ret.clone()).collect());
                if matches!(instance, Type::Never) {
                    return self.no_facts(ty);
                }
                let (yes, no) = self.narrow_to_type(&current, &instance);
                let mut when_true = self.with_fact(&key, yes);
                self.narrow_prefixes(&key, &mut when_true);
                Condition {
                    ty,
                    when_true,
                    when_false: self.with_fact(&key, no),
                }
            }
            ExprKind::Call { callee, args, .. } if is_array_is_array(callee) && args.len() == 1 => {
                let ty = self.check_expr(expr, None);
                let Some(key) = self.ref_key(&args[0]) else {
                    return self.no_facts(ty);
                };
                let Some(current) = self.silent_ref_type(&key) else {
                    return self.no_facts(ty);
                };
                let is_array = |m: &Type| matches!(m, Type::Array(_) | Type::Tuple(_));
                let yes = if matches!(current, Type::Any | Type::Unknown) {
                    Type::array(Type::Any)
                } else {
                    filter_union(&current, is_array)
                };
                let no = filter_union(&current, |m| !is_array(m));
                Condition {
                    ty,
                    when_true: self.with_fact(&key, yes),
                    when_false: self.with_fact(&key, no),
                }
            }
            ExprKind::Call {
                callee,
                args,
                optional: false,
                ..
            } if matches!(callee.kind, ExprKind::Ident(_)) => {
                let ty = self.check_expr(expr, None);
                let callee_ty = self.check_expr(callee, None);
                let predicate = match self.call_signatures(&callee_ty).as_slice() {
                    [sig] => sig.predicate.clone(),
                    _ => None,
                };
                let Some((index, asserted)) = predicate.filter(|(_, t)| !t.has_params()) else {
                    return self.no_facts(ty);
                };
                let Some(key) = args.get(index).and_then(|arg| self.ref_key(arg)) else {
                    return self.no_facts(ty);
                };
                let Some(current) = self.silent_ref_type(&key) else {
                    return self.no_facts(ty);
                };
                let (yes, no) = self.narrow_to_type(&current, &asserted);
                let mut when_true = self.with_fact(&key, yes);
                self.narrow_prefixes(&key, &mut when_true);
                Condition {
                    ty,
                    when_true,
                    when_false: self.with_fact(&key, no),
                }
            }
            ExprKind::Assign { op: AssignOp::Assign, target, .. } => {
                let ty = self.check_expr(expr, None);
                match self.ref_key(target) {
                    Some(key) => self.truthiness_facts(&key, &ty),
                    None => self.no_facts(ty),
                }
            }
            ExprKind::Ident(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let ty = self.check_expr(expr, None);
                match self.ref_key(expr) {
                    Some(key) => self.truthiness_facts(&key, &ty),
                    None => self.no_facts(ty),
                }
            }
            _ => {
                let ty = self.check_expr(expr, None);
                self.no_facts(ty)
            }
        }
    }

    /// Split `ty` into the part that is a `target` and the rest
    ///
    /// Used for `value instanceof C`, with `target` the type `new C` produces,
    /// and for calls to `x is T` functions.
    pub(crate) fn narrow_to_type(&mut self, ty: &Type, target: &Type) -> (Type, Type) {
        if matches!(ty, Type::Any | Type::Unknown) {
            return (target.clone(), ty.clone());
        }
        let mut yes = Vec::new();
        let mut no = Vec::new();
        for m in ty.members() {
            if m.is_nullish_only() && !target.is_possibly_nullish() {
                no.push(m);
            } else if self.is_assignable(&m, target) {
                yes.push(m);
            } else if self.is_assignable(target, &m) {
                yes.push(target.clone());
                no.push(m);
            } else {
                no.push(m);
            }
        }
        if yes.is_empty() {
            yes.push(target.clone());
        }
        (union(yes), union(no))
    }

    fn no_facts(&self, ty: Type) -> Condition {
        Condition {
            ty,
            when_true: self.facts.clone(),
            when_false: self.facts.clone(),
        }
    }

    fn truthiness_facts(&mut self, key: &RefKey, ty: &Type) -> Condition {
        let mut when_true = self.with_fact(key, truthy(ty));
        self.narrow_prefixes(key, &mut when_true);
        Condition {
            ty: ty.clone(),
            when_true,
            when_false: self.with_fact(key, falsy(ty)),
        }
    }

    /// `a && b` result type
    pub(crate) fn and_type(&self, left: &Type, right: &Type) -> Type {
        if left.is_any() {
            return Type::Any;
        }
        union(vec![falsy(left), right.clone()])
    }

    fn equality_condition(&mut self, expr: &'a Expr, op: BinaryOp, left: &'a Expr, right: &'a Expr) -> Condition {
        let (ty, left_ty, right_ty) = self.check_binary_parts(op, left, right, expr.span);
        let loose = matches!(op, BinaryOp::LooseEq | BinaryOp::LooseNe);
        let positive = matches!(op, BinaryOp::StrictEq | BinaryOp::LooseEq);

        // typeof x === "tag"
        for (a, b) in [(left, right), (right, left)] {
            if let (ExprKind::Unary { op: UnaryOp::Typeof, arg }, ExprKind::Str(tag)) = (&a.kind, &b.kind) {
                let Some(key) = self.ref_key(arg) else {
                    return self.no_facts(ty);
                };
                let Some(current) = self.silent_ref_type(&key) else {
                    return self.no_facts(ty);
                };
                let yes = narrow_typeof(&current, tag, true);
                let no = narrow_typeof(&current, tag, false);
                let (t, f) = if positive { (yes, no) } else { (no, yes) };
                let mut when_true = self.with_fact(&key, t);
                if tag != "undefined" {
                    self.narrow_prefixes(&key, &mut when_true);
                }
                return Condition {
                    ty,
                    when_true,
                    when_false: self.with_fact(&key, f),
                };
            }
        }

        let (reference, reference_ty, other) = if self.ref_key(left).is_some() {
            (left, left_ty, right)
        } else if self.ref_key(right).is_some() {
            (right, right_ty, left)
        } else {
            return self.no_facts(ty);
        };
        let Some(key) = self.ref_key(reference) else {
            return self.no_facts(ty);
        };

        let narrow = |positive: bool| -> Option<Type> {
            if matches!(other.kind, ExprKind::Null) {
                Some(narrow_nullish(&reference_ty, true, loose, positive))
            } else if is_undefined_expr(other) {
                Some(narrow_nullish(&reference_ty, false, loose, positive))
            } else {
                literal_of(other).map(|lit| narrow_literal(&reference_ty, &lit, positive))
            }
        };
        let (Some(yes), Some(no)) = (narrow(true), narrow(false)) else {
            return self.no_facts(ty);
        };
        let (t, f) = if positive { (yes, no) } else { (no, yes) };

        let mut when_true = self.with_fact(&key, t.clone());
        let mut when_false = self.with_fact(&key, f.clone());
        // a property compared against null or a literal implies its owner exists
        let nullish_other = matches!(other.kind, ExprKind::Null) || is_undefined_expr(other);
        if !t.is_possibly_nullish() || !nullish_other {
            self.narrow_prefixes(&key, &mut when_true);
        }
        if !f.is_possibly_nullish() && nullish_other {
            self.narrow_prefixes(&key, &mut when_false);
        }
        if let Some(lit) = literal_of(other) {
            self.narrow_discriminant(&key, &lit, positive, &mut when_true, &mut when_false);
        }
        Condition {
            ty,
            when_true,
            when_false,
        }
    }

    /// `x.kind === "a"` narrows `x` itself when it is a union of objects
    fn narrow_discriminant(&mut self, key: &RefKey, lit: &Type, positive: bool, when_true: &mut Facts, when_false: &mut Facts) {
        let Some((prop, owner_path)) = key.1.split_last() else {
            return;
        };
        let owner = (key.0, owner_path.to_vec());
        let Some(owner_ty) = self.silent_ref_type(&owner) else {
            return;
        };
        let members = non_nullable(&owner_ty).members();
        if members.len() < 2 {
            return;
        }
        let mut matching = Vec::new();
        let mut others = Vec::new();
        for m in members {
            match self.lookup_property(&m, prop, false).map(|p| p.ty) {
                Some(prop_ty) if prop_ty.is_literal() || matches!(prop_ty, Type::Union(_)) => {
                    let may_equal = prop_ty.members().iter().any(|p| p == lit);
                    let must_equal = prop_ty == *lit;
                    if may_equal {
                        matching.push(m.clone());
                    }
                    if !must_equal {
                        others.push(m);
                    }
                }
                _ => {
                    matching.push(m.clone());
                    others.push(m);
                }
            }
        }
        let (t, f) = if positive { (matching, others) } else { (others, matching) };
        when_true.insert(owner.clone(), union(t));
        when_false.insert(owner, union(f));
    }

    /// Drop facts about names assigned anywhere inside the given statements
    pub(crate) fn invalidate_assigned(&mut self, stmts: &[&Stmt], exprs: &[&Expr]) {
        let mut names = HashSet::new();
        for stmt in stmts {
            assigned_in_stmt(stmt, &mut names);
        }
        for expr in exprs {
            assigned_in_expr(expr, &mut names);
        }
        if names.is_empty() {
            return;
        }
        let symbols = &self.symbols;
        self.facts.retain(|key| !names.contains(&symbols[key.0].name));
    }

    /// Facts visible inside a closure created here
    pub(crate) fn closure_facts(&self) -> Facts {
        let mut facts = self.facts.clone();
        let symbols = &self.symbols;
        facts.retain(|key| symbols[key.0].kind.is_stable());
        facts
    }
}

fn is_array_is_array(callee: &Expr) -> bool {
    matches!(&callee.kind, ExprKind::Member { object, prop, .. }
        if prop.name == "isArray" && matches!(&object.kind, ExprKind::Ident(n) if n == "Array"))
}

fn root_name(expr: &Expr) -> Option<&str> {
    match &expr.kind {
        ExprKind::Ident(name) => Some(name),
        ExprKind::Member { object, .. } | ExprKind::Index { object, .. } => root_name(object),
        _ => None,
    }
}

fn assigned_in_stmt(stmt: &Stmt, names: &mut HashSet<String>) {
    match &stmt.kind {
        StmtKind::Var(decl) => {
            for d in &decl.decls {
                if let Some(init) = &d.init {
                    assigned_in_expr(init, names);
                }
            }
        }
        StmtKind::Function(_) | StmtKind::Interface(_) | StmtKind::TypeAlias(_) | StmtKind::Namespace { .. } => {}
        StmtKind::Expr(e) | StmtKind::Throw(e) => assigned_in_expr(e, names),
        StmtKind::Return(e) => {
            if let Some(e) = e {
                assigned_in_expr(e, names);
            }
        }
        StmtKind::Block(body) => body.iter().for_each(|s| assigned_in_stmt(s, names)),
        StmtKind::If { test, cons, alt } => {
            assigned_in_expr(test, names);
            assigned_in_stmt(cons, names);
            if let Some(alt) = alt {
                assigned_in_stmt(alt, names);
            }
        }
        StmtKind::For { init, test, update, body } => {
            match init {
                Some(ForInit::Var(decl)) => {
                    for d in &decl.decls {
                        if let Some(init) = &d.init {
                            assigned_in_expr(init, names);
                        }
                    }
                }
                Some(ForInit::Expr(e)) => assigned_in_expr(e, names),
                None => {}
            }
            for e in [test, update].into_iter().flatten() {
                assigned_in_expr(e, names);
            }
            assigned_in_stmt(body, names);
        }
        StmtKind::ForOf { head, iter: e, body } | StmtKind::ForIn { head, object: e, body } => {
            if let ForHead::Expr(target) = head {
                if let Some(name) = root_name(target) {
                    names.insert(name.to_string());
                }
            }
            assigned_in_expr(e, names);
            assigned_in_stmt(body, names);
        }
        StmtKind::While { test, body } | StmtKind::DoWhile { body, test } => {
            assigned_in_expr(test, names);
            assigned_in_stmt(body, names);
        }
        StmtKind::Switch { discriminant, cases } => {
            assigned_in_expr(discriminant, names);
            for case in cases {
                if let Some(test) = &case.test {
                    assigned_in_expr(test, names);
                }
                case.body.iter().for_each(|s| assigned_in_stmt(s, names));
            }
        }
        StmtKind::Try { block, handler, finalizer, .. } => {
            for body in [Some(block), handler.as_ref(), finalizer.as_ref()].into_iter().flatten() {
                body.iter().for_each(|s| assigned_in_stmt(s, names));
            }
        }
        StmtKind::Labeled { body, .. } => assigned_in_stmt(body, names),
        StmtKind::Break(_) | StmtKind::Continue(_) | StmtKind::Empty => {}
    }
}

fn assigned_in_expr(expr: &Expr, names: &mut HashSet<String>) {
    match &expr.kind {
        ExprKind::Assign { target, value, .. } => {
            if let Some(name) = root_name(target) {
                names.insert(name.to_string());
            }
            assigned_in_expr(target, names);
            assigned_in_expr(value, names);
        }
        ExprKind::Update { arg, .. } => {
            if let Some(name) = root_name(arg) {
                names.insert(name.to_string());
            }
        }
        ExprKind::Template { exprs, .. } | ExprKind::Sequence(exprs) => {
            exprs.iter().for_each(|e| assigned_in_expr(e, names));
        }
        ExprKind::Array(elems) => elems.iter().flatten().for_each(|e| assigned_in_expr(e, names)),
        ExprKind::Object(props) => {
            for prop in props {
                match prop {
                    ObjectProp::KeyValue { value, .. } | ObjectProp::Spread(value) => assigned_in_expr(value, names),
                    ObjectProp::Shorthand(_) | ObjectProp::Method { .. } => {}
                }
            }
        }
        ExprKind::Function { func, .. } => match &func.body {
            Some(FnBody::Block(body)) => body.iter().for_each(|s| assigned_in_stmt(s, names)),
            Some(FnBody::Expr(e)) => assigned_in_expr(e, names),
            None => {}
        },
        ExprKind::Member { object, .. } => assigned_in_expr(object, names),
        ExprKind::Index { object, index, .. } => {
            assigned_in_expr(object, names);
            assigned_in_expr(index, names);
        }
        ExprKind::Call { callee, args, .. } | ExprKind::New { callee, args, .. } => {
            assigned_in_expr(callee, names);
            args.iter().for_each(|e| assigned_in_expr(e, names));
        }
        ExprKind::Unary { arg, .. }
        | ExprKind::Await(arg)
        | ExprKind::Spread(arg)
        | ExprKind::NonNull(arg)
        | ExprKind::As { expr: arg, .. }
        | ExprKind::Satisfies { expr: arg, .. } => assigned_in_expr(arg, names),
        ExprKind::Binary { left, right, .. } | ExprKind::Logical { left, right, .. } => {
            assigned_in_expr(left, names);
            assigned_in_expr(right, names);
        }
        ExprKind::Conditional { test, cons, alt } => {
            assigned_in_expr(test, names);
            assigned_in_expr(cons, names);
            assigned_in_expr(alt, names);
        }
        ExprKind::Ident(_)
        | ExprKind::Number(_)
        | ExprKind::Str(_)
        | ExprKind::Bool(_)
        | ExprKind::Null
        | ExprKind::This
        | ExprKind::Regex { .. }
        | ExprKind::Invalid => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_and_falsy() {
        let ty = union(vec![Type::String, Type::Null, Type::Undefined]);
        assert_eq!(truthy(&ty), Type::String);
        assert_eq!(falsy(&ty).to_string(), "\"\" | null | undefined");
        assert_eq!(truthy(&Type::Boolean), Type::BoolLit(true));
    }

    #[test]
    fn test_narrow_typeof() {
        let ty = union(vec![Type::String, Type::Number, Type::Null]);
        assert_eq!(narrow_typeof(&ty, "string", true), Type::String);
        assert_eq!(narrow_typeof(&ty, "string", false).to_string(), "number | null");
        assert_eq!(narrow_typeof(&Type::Unknown, "number", true), Type::Number);
    }

    #[test]
    fn test_narrow_nullish() {
        let ty = union(vec![Type::String, Type::Null, Type::Undefined]);
        assert_eq!(narrow_nullish(&ty, true, false, false).to_string(), "string | undefined");
        assert_eq!(narrow_nullish(&ty, true, true, false), Type::String);
        assert_eq!(narrow_nullish(&ty, false, false, true), Type::Undefined);
    }

    #[test]
    fn test_narrow_literal() {
        let ty = union(vec![Type::str_lit("a"), Type::str_lit("b")]);
        assert_eq!(narrow_literal(&ty, &Type::str_lit("a"), true), Type::str_lit("a"));
        assert_eq!(narrow_literal(&ty, &Type::str_lit("a"), false), Type::str_lit("b"));
    }

    #[test]
    fn test_facts_join_keeps_common_keys() {
        let mut a = Facts::default();
        let mut b = Facts::default();
        a.insert((0, vec![]), Type::String);
        b.insert((0, vec![]), Type::Null);
        a.insert((1, vec![]), Type::Number);
        let joined = a.join(&b);
        assert_eq!(joined.get(&(0, vec![])).map(ToString::to_string).as_deref(), Some("string | null"));
        assert!(joined.get(&(1, vec![])).is_none());
    }

    #[test]
    fn test_invalidate_prefix() {
        let mut facts = Facts::default();
        facts.insert((0, vec!["a".into()]), Type::String);
        facts.insert((0, vec!["a".into(), "b".into()]), Type::String);
        facts.insert((0, vec!["c".into()]), Type::String);
        facts.invalidate(&(0, vec!["a".into()]));
        assert!(facts.get(&(0, vec!["a".into()])).is_none());
        assert!(facts.get(&(0, vec!["c".into()])).is_some());
    }
}
