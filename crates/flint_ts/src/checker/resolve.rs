//! Type annotations to checker types, interfaces and aliases.

use super::{AliasRef, Checker, DeclRef, PendingInterface, SymState, SymbolKind, TypeSym};
use crate::ast::{
    Function, InterfaceDecl, LiteralType, Pattern, PatternKind, Stmt, StmtKind, TypeAliasDecl, TypeKeyword, TypeKind,
    TypeMember, TypeNode, TypeParam, VarDecl,
};
use crate::diagnostics::codes;
use crate::span::Span;
use crate::types::{
    awaited, instantiate_interface, non_nullable, substitute_object, union, InterfaceType, ObjectType, Property,
    SigParam, Signature, Type, TypeParamDef,
};
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use std::collections::HashSet;
use std::rc::Rc;

impl<'a> Checker<'a> {
    // ---- hoisting ----

    /// Declare the names a statement list introduces in the current scope
    pub(crate) fn hoist(&mut self, stmts: &'a [Stmt]) {
        for stmt in stmts {
            match &stmt.kind {
                StmtKind::Var(decl) => self.hoist_var(decl),
                StmtKind::Function(func) => {
                    let existing = self.scopes[self.scope].values.get(&func.name.name).copied();
                    match existing {
                        Some(id) if self.symbols[id].kind == SymbolKind::Function => {
                            if let DeclRef::Function(decls) = &mut self.symbols[id].decl {
                                decls.push(func);
                            }
                        }
                        _ => {
                            self.declare_hoisted(
                                &func.name.name,
                                SymbolKind::Function,
                                func.name.span,
                                DeclRef::Function(vec![func]),
                            );
                        }
                    }
                }
                StmtKind::Namespace { name, body } => {
                    self.declare_hoisted(&name.name, SymbolKind::Namespace, name.span, DeclRef::Namespace(body));
                }
                StmtKind::Interface(decl) => self.hoist_interface(decl),
                StmtKind::TypeAlias(decl) => {
                    let alias = AliasRef {
                        decl,
                        scope: self.scope,
                        file: self.file,
                    };
                    if self.scopes[self.scope].types.contains_key(&decl.name.name) {
                        self.error(
                            codes::DUPLICATE_IDENTIFIER,
                            decl.name.span,
                            format!("Duplicate identifier '{}'.", decl.name.name),
                        );
                    }
                    self.scopes[self.scope]
                        .types
                        .insert(decl.name.name.clone(), TypeSym::Alias(alias));
                }
                _ => {}
            }
        }
    }

    pub(crate) fn hoist_var(&mut self, decl: &'a VarDecl) {
        let kind = SymbolKind::from_var(decl.kind);
        for d in &decl.decls {
            let mut names = Vec::new();
            pattern_names(&d.pattern, &mut names);
            for (name, span) in names {
                self.declare_hoisted(&name, kind, span, DeclRef::Declarator(d));
            }
        }
    }

    fn declare_hoisted(&mut self, name: &str, kind: SymbolKind, span: Span, decl: DeclRef<'a>) {
        if let Some(&existing) = self.scopes[self.scope].values.get(name) {
            let prior = self.symbols[existing].kind;
            let both_var = prior == SymbolKind::Var && kind == SymbolKind::Var;
            if !both_var {
                self.error(
                    codes::DUPLICATE_IDENTIFIER,
                    span,
                    format!("Cannot redeclare block-scoped variable '{name}'."),
                );
                return;
            }
        }
        self.declare_symbol(name, kind, span, decl, SymState::Unresolved);
    }

    fn hoist_interface(&mut self, decl: &'a InterfaceDecl) {
        if let Some(TypeSym::Interface(existing)) = self.scopes[self.scope].types.get(&decl.name.name) {
            let key = Rc::as_ptr(existing) as usize;
            if let Some(pending) = self.pending_interfaces.get_mut(&key) {
                pending.decls.push(decl);
                return;
            }
        }
        let type_params = decl
            .type_params
            .iter()
            .map(|p| self.new_type_param(&p.name.name))
            .collect();
        let shell = Rc::new(InterfaceType {
            name: decl.name.name.clone(),
            type_params,
            members: OnceCell::new(),
            origin: Some(self.origin(decl.name.span)),
        });
        self.pending_interfaces.insert(
            Rc::as_ptr(&shell) as usize,
            PendingInterface {
                decls: vec![decl],
                scope: self.scope,
                file: self.file,
            },
        );
        self.scopes[self.scope]
            .types
            .insert(decl.name.name.clone(), TypeSym::Interface(shell));
    }

    /// Fill an interface's members on first use
    pub(crate) fn ensure_filled(&mut self, decl: &Rc<InterfaceType>) {
        if decl.members.get().is_some() {
            return;
        }
        let Some(pending) = self.pending_interfaces.remove(&(Rc::as_ptr(decl) as usize)) else {
            return;
        };
        let saved_scope = self.scope;
        let saved_file = self.file;
        self.file = pending.file;
        self.scope = self.push_scope(Some(pending.scope));
        for param in &decl.type_params {
            self.scopes[self.scope]
                .types
                .insert(param.name.clone(), TypeSym::Param(param.clone()));
        }
        if let Some(first) = pending.decls.first() {
            for (def, node) in decl.type_params.iter().zip(&first.type_params) {
                self.fill_type_param(def, node);
            }
        }

        let mut obj = ObjectType::default();
        for d in &pending.decls {
            for base in &d.extends {
                let base_ty = self.resolve_type(base);
                match self.object_view(&base_ty) {
                    Some(view) => inherit(&mut obj, view),
                    None => self.error(
                        codes::NOT_ASSIGNABLE,
                        base.span,
                        format!("An interface can only extend an object type, not '{base_ty}'."),
                    ),
                }
            }
        }
        let mut own = HashSet::new();
        for d in &pending.decls {
            self.add_members(&mut obj, &d.members, &mut own);
        }
        let _ = decl.members.set(obj);
        self.scope = saved_scope;
        self.file = saved_file;
    }

    /// Members of a filled interface instantiation
    pub(crate) fn named_members(&mut self, decl: &Rc<InterfaceType>, args: &[Type]) -> ObjectType {
        self.ensure_filled(decl);
        if decl.members.get().is_none() {
            return ObjectType::default();
        }
        instantiate_interface(decl, args)
    }

    fn fill_type_param(&mut self, def: &TypeParamDef, node: &'a TypeParam) {
        if let Some(c) = &node.constraint {
            let ty = self.resolve_type(c);
            let _ = def.constraint.set(ty);
        }
        if let Some(d) = &node.default {
            let ty = self.resolve_type(d);
            let _ = def.default.set(ty);
        }
    }

    /// Declare type parameters in the current scope
    pub(crate) fn declare_type_params(&mut self, params: &'a [TypeParam]) -> Vec<Rc<TypeParamDef>> {
        let defs: Vec<Rc<TypeParamDef>> = params.iter().map(|p| self.new_type_param(&p.name.name)).collect();
        for def in &defs {
            self.scopes[self.scope]
                .types
                .insert(def.name.clone(), TypeSym::Param(def.clone()));
        }
        for (def, node) in defs.iter().zip(params) {
            self.fill_type_param(def, node);
        }
        defs
    }

    fn add_members(&mut self, obj: &mut ObjectType, members: &'a [TypeMember], own: &mut HashSet<String>) {
        for member in members {
            match member {
                TypeMember::Property {
                    name,
                    optional,
                    readonly,
                    ty,
                    span,
                } => {
                    let resolved = match ty {
                        Some(node) => self.resolve_type(node),
                        None => Type::Any,
                    };
                    own.insert(name.clone());
                    obj.props.insert(
                        name.clone(),
                        Property {
                            ty: resolved,
                            optional: *optional,
                            readonly: *readonly,
                            origin: Some(self.origin(*span)),
                        },
                    );
                }
                TypeMember::Method {
                    name,
                    optional,
                    func,
                    span,
                } => {
                    let sig = Rc::new(self.resolve_signature(func));
                    let origin = Some(self.origin(*span));
                    let merged = if own.contains(name) {
                        obj.props.get(name).and_then(|existing| match &existing.ty {
                            Type::Function(prev) => Some(vec![prev.clone(), sig.clone()]),
                            Type::Object(prev) if !prev.calls.is_empty() => {
                                let mut calls = prev.calls.clone();
                                calls.push(sig.clone());
                                Some(calls)
                            }
                            _ => None,
                        })
                    } else {
                        None
                    };
                    let ty = match merged {
                        Some(calls) => Type::Object(Rc::new(ObjectType {
                            calls,
                            ..ObjectType::default()
                        })),
                        None => Type::Function(sig),
                    };
                    own.insert(name.clone());
                    obj.props.insert(
                        name.clone(),
                        Property {
                            ty,
                            optional: *optional,
                            readonly: false,
                            origin,
                        },
                    );
                }
                TypeMember::Index {
                    key, value, readonly, ..
                } => {
                    let key_ty = self.resolve_type(key);
                    let value_ty = self.resolve_type(value);
                    if key_ty.is_number_like() {
                        obj.number_index = Some(value_ty);
                    } else {
                        obj.string_index = Some((value_ty, *readonly));
                    }
                }
                TypeMember::Call { func, .. } => {
                    let sig = self.resolve_signature(func);
                    obj.calls.push(Rc::new(sig));
                }
                TypeMember::Construct { func, .. } => {
                    let sig = self.resolve_signature(func);
                    obj.constructs.push(Rc::new(sig));
                }
            }
        }
    }

    /// Object type of a type literal
    pub(crate) fn object_from_members(&mut self, members: &'a [TypeMember]) -> ObjectType {
        let mut obj = ObjectType::default();
        let mut own = HashSet::new();
        self.add_members(&mut obj, members, &mut own);
        obj
    }

    /// Signature of a declared function, method or function type
    pub(crate) fn resolve_signature(&mut self, func: &'a Function) -> Signature {
        let saved = self.enter_scope();
        let type_params = self.declare_type_params(&func.type_params);
        let params = func
            .params
            .iter()
            .map(|p| {
                let ty = match (&p.ty, &p.default) {
                    (Some(node), _) => self.resolve_type(node),
                    (None, _) if p.rest => Type::array(Type::Any),
                    _ => Type::Any,
                };
                SigParam {
                    name: param_display_name(&p.pattern),
                    ty,
                    optional: p.optional || p.default.is_some(),
                    rest: p.rest,
                }
            })
            .collect();
        let ret = match &func.ret {
            Some(node) => self.resolve_type(node),
            None => Type::Any,
        };
        let predicate = self.type_predicate(func);
        self.scope = saved;
        Signature {
            type_params,
            params,
            ret,
            predicate,
            origin: Some(self.origin(func.span)),
        }
    }

    /// Parameter index and type named by an `x is T` return annotation
    pub(crate) fn type_predicate(&mut self, func: &'a Function) -> Option<(usize, Type)> {
        let TypeKind::Predicate {
            param,
            asserts: false,
            ty: Some(ty),
        } = &func.ret.as_ref()?.kind
        else {
            return None;
        };
        let index = func
            .params
            .iter()
            .position(|p| matches!(&p.pattern.kind, PatternKind::Ident(id) if id.name == *param))?;
        Some((index, self.resolve_type(ty)))
    }

    // ---- annotations ----

    pub(crate) fn resolve_type(&mut self, node: &'a TypeNode) -> Type {
        match &node.kind {
            TypeKind::Keyword(kw) => match kw {
                TypeKeyword::Any => Type::Any,
                TypeKeyword::Unknown => Type::Unknown,
                TypeKeyword::Never => Type::Never,
                TypeKeyword::Void => Type::Void,
                TypeKeyword::Undefined => Type::Undefined,
                TypeKeyword::Null => Type::Null,
                TypeKeyword::String => Type::String,
                TypeKeyword::Number => Type::Number,
                TypeKeyword::Boolean => Type::Boolean,
                TypeKeyword::Object => Type::Object(Rc::default()),
            },
            TypeKind::Literal(lit) => match lit {
                LiteralType::Str(s) => Type::str_lit(s),
                LiteralType::Num(n) => Type::NumLit(*n),
                LiteralType::Bool(b) => Type::BoolLit(*b),
            },
            TypeKind::Ref { name, args } => self.resolve_reference(name, args, node.span),
            TypeKind::Array(elem) => Type::array(self.resolve_type(elem)),
            TypeKind::Tuple(elems) => Type::Tuple(
                elems
                    .iter()
                    .map(|e| {
                        let ty = self.resolve_type(&e.ty);
                        match ty {
                            Type::Array(inner) if e.rest => (*inner).clone(),
                            ty if e.optional => union(vec![ty, Type::Undefined]),
                            ty => ty,
                        }
                    })
                    .collect(),
            ),
            TypeKind::Union(members) => union(members.iter().map(|m| self.resolve_type(m)).collect()),
            TypeKind::Intersection(members) => {
                let types: Vec<Type> = members.iter().map(|m| self.resolve_type(m)).collect();
                self.intersect(types)
            }
            TypeKind::Object(members) => Type::Object(Rc::new(self.object_from_members(members))),
            TypeKind::Function(func) => Type::Function(Rc::new(self.resolve_signature(func))),
            TypeKind::Predicate { asserts, ty, .. } => {
                if let Some(ty) = ty {
                    self.resolve_type(ty);
                }
                if *asserts { Type::Void } else { Type::Boolean }
            }
        }
    }

    fn intersect(&mut self, types: Vec<Type>) -> Type {
        if types.iter().any(Type::is_any) {
            return Type::Any;
        }
        if types.iter().any(|t| matches!(t, Type::Never)) {
            return Type::Never;
        }
        let mut merged = ObjectType::default();
        let mut primitive = None;
        for ty in &types {
            match self.object_view(ty) {
                Some(view) if !matches!(ty, Type::String | Type::Number | Type::Boolean | Type::StrLit(_) | Type::NumLit(_)) => {
                    inherit(&mut merged, view)
                }
                _ => primitive = Some(ty.clone()),
            }
        }
        primitive.unwrap_or_else(|| Type::Object(Rc::new(merged)))
    }

    fn resolve_reference(&mut self, name: &str, args: &'a [TypeNode], span: Span) -> Type {
        let name = name.rsplit('.').next().unwrap_or(name);
        let resolved_args: Vec<Type> = args.iter().map(|a| self.resolve_type(a)).collect();
        if let Some(ty) = self.utility_type(name, &resolved_args, span) {
            return ty;
        }
        match self.lookup_type(name) {
            Some(TypeSym::Param(p)) => Type::Param(p),
            Some(TypeSym::Concrete(ty)) => ty,
            Some(TypeSym::Alias(alias)) => self.resolve_alias(alias, resolved_args, span),
            Some(TypeSym::Interface(decl)) => {
                let expected = decl.type_params.len();
                if resolved_args.len() < expected {
                    self.ensure_filled(&decl);
                }
                let required = decl.type_params.iter().filter(|p| p.default.get().is_none()).count();
                if resolved_args.len() > expected || resolved_args.len() < required {
                    self.error(
                        codes::GENERIC_REQUIRES_ARGS,
                        span,
                        format!("Generic type '{}' requires {} type argument(s).", display_generic(&decl), expected),
                    );
                }
                let mut filled = resolved_args;
                filled.truncate(expected);
                for param in decl.type_params.iter().skip(filled.len()) {
                    filled.push(param.default.get().cloned().unwrap_or(Type::Any));
                }
                Type::Named {
                    decl,
                    args: filled.into(),
                }
            }
            None => {
                self.error(codes::CANNOT_FIND_NAME, span, format!("Cannot find name '{name}'."));
                Type::Any
            }
        }
    }

    fn expect_args(&mut self, name: &str, params: &str, count: usize, args: &[Type], span: Span) -> bool {
        if args.len() == count {
            return true;
        }
        self.error(
            codes::GENERIC_REQUIRES_ARGS,
            span,
            format!("Generic type '{name}<{params}>' requires {count} type argument(s)."),
        );
        false
    }

    /// Built-in generic helpers
    fn utility_type(&mut self, name: &str, args: &[Type], span: Span) -> Option<Type> {
        if self.lookup_type(name).is_some_and(|sym| !matches!(sym, TypeSym::Interface(ref d) if d.name == "Array")) {
            return None;
        }
        let first = || args.first().cloned().unwrap_or(Type::Any);
        Some(match name {
            "Array" | "ReadonlyArray" => {
                self.expect_args(name, "T", 1, args, span);
                Type::array(first())
            }
            "Awaited" => {
                self.expect_args(name, "T", 1, args, span);
                awaited(&first())
            }
            "NonNullable" => {
                self.expect_args(name, "T", 1, args, span);
                non_nullable(&first())
            }
            "Partial" | "Required" | "Readonly" => {
                self.expect_args(name, "T", 1, args, span);
                let target = first();
                let Some(mut view) = self.object_view(&target) else {
                    return Some(target);
                };
                view.calls.clear();
                view.constructs.clear();
                for prop in view.props.values_mut() {
                    match name {
                        "Partial" => prop.optional = true,
                        "Required" => prop.optional = false,
                        _ => prop.readonly = true,
                    }
                }
                Type::Object(Rc::new(view))
            }
            "Pick" | "Omit" => {
                if !self.expect_args(name, "T, K", 2, args, span) {
                    return Some(Type::Any);
                }
                let keys: HashSet<String> = args[1]
                    .members()
                    .iter()
                    .filter_map(|k| match k {
                        Type::StrLit(s) => Some(s.to_string()),
                        _ => None,
                    })
                    .collect();
                let Some(view) = self.object_view(&args[0]) else {
                    return Some(Type::Any);
                };
                let keep_listed = name == "Pick";
                let props: IndexMap<String, Property> = view
                    .props
                    .into_iter()
                    .filter(|(k, _)| keys.contains(k) == keep_listed)
                    .collect();
                Type::Object(Rc::new(ObjectType::with_props(props)))
            }
            _ => return None,
        })
    }

    fn resolve_alias(&mut self, alias: AliasRef<'a>, args: Vec<Type>, span: Span) -> Type {
        let key = (alias.file, alias.decl.name.span.start);
        let generic = !alias.decl.type_params.is_empty();
        if !generic {
            if let Some(ty) = self.alias_cache.get(&key) {
                return ty.clone();
            }
        }
        if !self.resolving_aliases.insert(key) {
            return Type::Any;
        }
        let expected = alias.decl.type_params.len();
        let required = alias.decl.type_params.iter().filter(|p| p.default.is_none()).count();
        if args.len() > expected || args.len() < required {
            let params: Vec<&str> = alias.decl.type_params.iter().map(|p| p.name.name.as_str()).collect();
            self.error(
                codes::GENERIC_REQUIRES_ARGS,
                span,
                format!(
                    "Generic type '{}<{}>' requires {} type argument(s).",
                    alias.decl.name.name,
                    params.join(", "),
                    expected
                ),
            );
        }

        let saved_scope = self.scope;
        let saved_file = self.file;
        self.file = alias.file;
        self.scope = self.push_scope(Some(alias.scope));
        for (i, param) in alias.decl.type_params.iter().enumerate() {
            let ty = match args.get(i) {
                Some(arg) => arg.clone(),
                None => match &param.default {
                    Some(node) => self.resolve_type(node),
                    None => Type::Any,
                },
            };
            self.scopes[self.scope]
                .types
                .insert(param.name.name.clone(), TypeSym::Concrete(ty));
        }
        let ty = self.resolve_type(&alias.decl.ty);
        self.scope = saved_scope;
        self.file = saved_file;
        self.resolving_aliases.remove(&key);
        if !generic {
            self.alias_cache.insert(key, ty.clone());
        }
        ty
    }

    /// Resolve a local alias once so problems inside it are reported
    pub(crate) fn check_alias_decl(&mut self, decl: &'a TypeAliasDecl) {
        if decl.type_params.is_empty() {
            let alias = AliasRef {
                decl,
                scope: self.scope,
                file: self.file,
            };
            self.resolve_alias(alias, Vec::new(), decl.name.span);
            return;
        }
        let saved = self.enter_scope();
        self.declare_type_params(&decl.type_params);
        self.resolve_type(&decl.ty);
        self.scope = saved;
    }

    // ---- structural views ----

    /// Structural members of an object-like type
    pub(crate) fn object_view(&mut self, ty: &Type) -> Option<ObjectType> {
        let lib = |decl: &Option<Rc<InterfaceType>>| decl.clone();
        match ty {
            Type::Object(obj) => Some((**obj).clone()),
            Type::Named { decl, args } => Some(self.named_members(decl, args)),
            Type::Array(elem) => {
                let decl = lib(&self.lib.array)?;
                Some(self.named_members(&decl, &[(**elem).clone()]))
            }
            Type::Tuple(elems) => {
                let decl = lib(&self.lib.array)?;
                let mut view = self.named_members(&decl, &[union(elems.to_vec())]);
                for (i, elem) in elems.iter().enumerate() {
                    view.props.insert(i.to_string(), Property::new(elem.clone()));
                }
                view.props
                    .insert("length".to_string(), Property::new(Type::NumLit(elems.len() as f64)));
                Some(view)
            }
            Type::String | Type::StrLit(_) => {
                let decl = lib(&self.lib.string)?;
                Some(self.named_members(&decl, &[]))
            }
            Type::Number | Type::NumLit(_) => {
                let decl = lib(&self.lib.number)?;
                Some(self.named_members(&decl, &[]))
            }
            Type::Boolean | Type::BoolLit(_) => {
                let decl = lib(&self.lib.boolean)?;
                Some(self.named_members(&decl, &[]))
            }
            Type::Function(sig) => {
                let mut view = match lib(&self.lib.function) {
                    Some(decl) => self.named_members(&decl, &[]),
                    None => ObjectType::default(),
                };
                view.calls.push(sig.clone());
                Some(view)
            }
            Type::Param(p) => match p.constraint.get() {
                Some(c) => {
                    let c = c.clone();
                    self.object_view(&c)
                }
                None => None,
            },
            _ => None,
        }
    }

    /// Look up a property through apparent types
    ///
    /// `include_index` falls back to index signatures for unknown names.
    pub(crate) fn lookup_property(&mut self, ty: &Type, name: &str, include_index: bool) -> Option<Property> {
        match ty {
            Type::Any | Type::Awaited(_) => Some(Property::new(Type::Any)),
            Type::Union(members) => {
                let mut types = Vec::new();
                let mut optional = false;
                let mut readonly = false;
                for m in members.iter() {
                    let prop = self.lookup_property(m, name, include_index)?;
                    optional |= prop.optional;
                    readonly |= prop.readonly;
                    types.push(prop.ty);
                }
                Some(Property {
                    ty: union(types),
                    optional,
                    readonly,
                    origin: None,
                })
            }
            Type::Object(obj) => self.lookup_in_object(obj, name, include_index),
            Type::Named { decl, args } => {
                self.ensure_filled(decl);
                let members = decl.members.get()?;
                let found = members.props.get(name).cloned().or_else(|| {
                    if include_index {
                        members.string_index.as_ref().map(|(ty, ro)| Property {
                            readonly: *ro,
                            ..Property::new(ty.clone())
                        })
                    } else {
                        None
                    }
                });
                match found {
                    Some(prop) if decl.type_params.is_empty() => Some(prop),
                    Some(prop) => {
                        let map = crate::types::interface_map(decl, args);
                        Some(Property {
                            ty: crate::types::substitute(&prop.ty, &map),
                            ..prop
                        })
                    }
                    None => self.object_fallback(name),
                }
            }
            Type::Tuple(elems) => {
                if let Ok(index) = name.parse::<usize>() {
                    return elems.get(index).cloned().map(Property::new);
                }
                if name == "length" {
                    return Some(Property::new(Type::NumLit(elems.len() as f64)));
                }
                let view = self.object_view(ty)?;
                self.lookup_in_object(&view, name, include_index)
            }
            Type::Param(p) => {
                let constraint = p.constraint.get()?.clone();
                self.lookup_property(&constraint, name, include_index)
            }
            Type::Unknown | Type::Never | Type::Null | Type::Undefined | Type::Void => None,
            _ => {
                let view = self.object_view(ty)?;
                self.lookup_in_object(&view, name, include_index)
            }
        }
    }

    fn lookup_in_object(&mut self, obj: &ObjectType, name: &str, include_index: bool) -> Option<Property> {
        if let Some(prop) = obj.props.get(name) {
            return Some(prop.clone());
        }
        if include_index {
            if let Some((ty, readonly)) = &obj.string_index {
                return Some(Property {
                    readonly: *readonly,
                    ..Property::new(ty.clone())
                });
            }
            if let (Some(ty), true) = (&obj.number_index, name.parse::<f64>().is_ok()) {
                return Some(Property::new(ty.clone()));
            }
        }
        self.object_fallback(name)
    }

    /// Members every object inherits from `Object`
    fn object_fallback(&mut self, name: &str) -> Option<Property> {
        let decl = self.lib.object.clone()?;
        self.ensure_filled(&decl);
        decl.members.get()?.props.get(name).cloned()
    }

    /// Call signatures of a type
    pub(crate) fn call_signatures(&mut self, ty: &Type) -> Vec<Rc<Signature>> {
        match ty {
            Type::Function(sig) => vec![sig.clone()],
            Type::Object(obj) => obj.calls.clone(),
            Type::Named { decl, args } => {
                self.ensure_filled(decl);
                match decl.members.get() {
                    Some(members) if !members.calls.is_empty() => {
                        let map = crate::types::interface_map(decl, args);
                        substitute_object(
                            &ObjectType {
                                calls: members.calls.clone(),
                                ..ObjectType::default()
                            },
                            &map,
                        )
                        .calls
                    }
                    _ => Vec::new(),
                }
            }
            Type::Param(p) => match p.constraint.get() {
                Some(c) => {
                    let c = c.clone();
                    self.call_signatures(&c)
                }
                None => Vec::new(),
            },
            Type::Union(members) => {
                let mut sigs = Vec::new();
                for m in members.iter() {
                    let found = self.call_signatures(m);
                    if found.is_empty() {
                        return Vec::new();
                    }
                    if sigs.is_empty() {
                        sigs = found;
                    }
                }
                sigs
            }
            _ => Vec::new(),
        }
    }

    /// Construct signatures of a type
    pub(crate) fn construct_signatures(&mut self, ty: &Type) -> Vec<Rc<Signature>> {
        match ty {
            Type::Object(obj) => obj.constructs.clone(),
            Type::Named { decl, args } => {
                self.ensure_filled(decl);
                match decl.members.get() {
                    Some(members) if !members.constructs.is_empty() => {
                        let map = crate::types::interface_map(decl, args);
                        substitute_object(
                            &ObjectType {
                                constructs: members.constructs.clone(),
                                ..ObjectType::default()
                            },
                            &map,
                        )
                        .constructs
                    }
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// `Promise<T>`
    pub(crate) fn promise_of(&self, inner: Type) -> Type {
        match &self.lib.promise {
            Some(decl) => Type::Named {
                decl: decl.clone(),
                args: vec![inner].into(),
            },
            None => Type::Any,
        }
    }

    /// Type of a declared namespace object
    pub(crate) fn namespace_type(&mut self, body: &'a [Stmt]) -> Type {
        let mut obj = ObjectType::default();
        let mut overloads: IndexMap<String, Vec<Rc<Signature>>> = IndexMap::new();
        let mut origins = IndexMap::new();
        for stmt in body {
            match &stmt.kind {
                StmtKind::Function(func) => {
                    let sig = Rc::new(self.resolve_signature(&func.func));
                    origins
                        .entry(func.name.name.clone())
                        .or_insert_with(|| self.origin(func.name.span));
                    overloads.entry(func.name.name.clone()).or_default().push(sig);
                }
                StmtKind::Var(decl) => {
                    for d in &decl.decls {
                        if let PatternKind::Ident(id) = &d.pattern.kind {
                            let ty = match &d.ty {
                                Some(node) => self.resolve_type(node),
                                None => Type::Any,
                            };
                            obj.props.insert(
                                id.name.clone(),
                                Property {
                                    ty,
                                    optional: false,
                                    readonly: true,
                                    origin: Some(self.origin(id.span)),
                                },
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        for (name, mut sigs) in overloads {
            let ty = if sigs.len() == 1 {
                Type::Function(sigs.remove(0))
            } else {
                Type::Object(Rc::new(ObjectType {
                    calls: sigs,
                    ..ObjectType::default()
                }))
            };
            obj.props.insert(
                name.clone(),
                Property {
                    ty,
                    optional: false,
                    readonly: true,
                    origin: origins.get(&name).copied(),
                },
            );
        }
        Type::Object(Rc::new(obj))
    }
}

/// Copy inherited members, letting members already present win
fn inherit(target: &mut ObjectType, base: ObjectType) {
    for (name, prop) in base.props {
        target.props.entry(name).or_insert(prop);
    }
    if target.string_index.is_none() {
        target.string_index = base.string_index;
    }
    if target.number_index.is_none() {
        target.number_index = base.number_index;
    }
    target.calls.extend(base.calls);
    target.constructs.extend(base.constructs);
}

fn display_generic(decl: &InterfaceType) -> String {
    let params: Vec<&str> = decl.type_params.iter().map(|p| p.name.as_str()).collect();
    format!("{}<{}>", decl.name, params.join(", "))
}

/// Identifiers bound by a pattern, with their spans
pub(crate) fn pattern_names(pattern: &Pattern, out: &mut Vec<(String, Span)>) {
    match &pattern.kind {
        PatternKind::Ident(id) => out.push((id.name.clone(), id.span)),
        PatternKind::Object { props, rest } => {
            for prop in props {
                pattern_names(&prop.value, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
        PatternKind::Array { elems, rest } => {
            for elem in elems.iter().flatten() {
                pattern_names(&elem.pattern, out);
            }
            if let Some(rest) = rest {
                pattern_names(rest, out);
            }
        }
    }
}

pub(crate) fn param_display_name(pattern: &Pattern) -> String {
    match &pattern.kind {
        PatternKind::Ident(id) => id.name.clone(),
        PatternKind::Object { .. } => "__0".to_string(),
        PatternKind::Array { .. } => "__1".to_string(),
    }
}
