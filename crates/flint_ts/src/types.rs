//! Semantic types used by the checker.

use crate::span::Span;
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Declaration site of a type or symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Origin {
    /// File index, 0 is the checked source
    pub file: u16,
    /// Span within that file
    pub span: Span,
}

/// A checker type
#[derive(Debug, Clone)]
pub enum Type {
    /// `any`
    Any,
    /// `unknown`
    Unknown,
    /// `never`
    Never,
    /// `void`
    Void,
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// `string`
    String,
    /// `number`
    Number,
    /// `boolean`
    Boolean,
    /// String literal type
    StrLit(Rc<str>),
    /// Number literal type
    NumLit(f64),
    /// `true` / `false`
    BoolLit(bool),
    /// Anonymous object type
    Object(Rc<ObjectType>),
    /// `T[]`
    Array(Rc<Type>),
    /// `[A, B]`
    Tuple(Rc<[Type]>),
    /// `A | B`, normalized by [`union`]
    Union(Rc<[Type]>),
    /// Function type
    Function(Rc<Signature>),
    /// Interface reference with type arguments
    Named {
        /// Interface
        decl: Rc<InterfaceType>,
        /// Type arguments
        args: Rc<[Type]>,
    },
    /// Type parameter
    Param(Rc<TypeParamDef>),
    /// `Awaited<T>` on a type parameter, computed once instantiated
    Awaited(Rc<Type>),
}

/// Object type members
#[derive(Debug, Clone, Default)]
pub struct ObjectType {
    /// Named properties in declaration order
    pub props: IndexMap<String, Property>,
    /// Call signatures
    pub calls: Vec<Rc<Signature>>,
    /// Construct signatures
    pub constructs: Vec<Rc<Signature>>,
    /// `[key: string]: T` and whether it is read-only
    pub string_index: Option<(Type, bool)>,
    /// `[key: number]: T`
    pub number_index: Option<Type>,
}

impl ObjectType {
    /// Object type with only properties
    #[must_use]
    pub fn with_props(props: IndexMap<String, Property>) -> Self {
        Self {
            props,
            ..Self::default()
        }
    }
}

/// Object property
#[derive(Debug, Clone)]
pub struct Property {
    /// Declared type, without the `undefined` added by `?`
    pub ty: Type,
    /// `?`
    pub optional: bool,
    /// `readonly`
    pub readonly: bool,
    /// Declaration
    pub origin: Option<Origin>,
}

impl Property {
    /// Plain writable property
    #[must_use]
    pub fn new(ty: Type) -> Self {
        Self {
            ty,
            optional: false,
            readonly: false,
            origin: None,
        }
    }

    /// Type observed when reading the property
    #[must_use]
    pub fn read_type(&self) -> Type {
        if self.optional {
            union(vec![self.ty.clone(), Type::Undefined])
        } else {
            self.ty.clone()
        }
    }
}

/// Call or construct signature
#[derive(Debug, Clone)]
pub struct Signature {
    /// Generic parameters
    pub type_params: Vec<Rc<TypeParamDef>>,
    /// Parameters
    pub params: Vec<SigParam>,
    /// Return type
    pub ret: Type,
    /// `x is T` return: parameter index and asserted type
    pub predicate: Option<(usize, Type)>,
    /// Declaration
    pub origin: Option<Origin>,
}

impl Signature {
    /// Number of arguments that must be supplied
    ///
    /// Trailing parameters that accept `void` may be left out.
    #[must_use]
    pub fn min_args(&self) -> usize {
        let required = self.params.iter().take_while(|p| !p.optional && !p.rest).count();
        self.params[..required]
            .iter()
            .rposition(|p| !p.ty.members().iter().any(|m| matches!(m, Type::Void)))
            .map_or(0, |last| last + 1)
    }

    /// Maximum argument count, `None` with a rest parameter
    #[must_use]
    pub fn max_args(&self) -> Option<usize> {
        if self.params.iter().any(|p| p.rest) {
            None
        } else {
            Some(self.params.len())
        }
    }

    /// Declared type for argument `index`, the element type for rest parameters
    #[must_use]
    pub fn param_type_at(&self, index: usize) -> Option<Type> {
        if let Some(param) = self.params.get(index) {
            if !param.rest {
                return Some(param.ty.clone());
            }
        }
        let rest = self.params.last().filter(|p| p.rest)?;
        Some(match &rest.ty {
            Type::Array(elem) => (**elem).clone(),
            Type::Tuple(elems) => {
                let offset = index.saturating_sub(self.params.len() - 1);
                elems.get(offset).cloned().unwrap_or(Type::Undefined)
            }
            other => other.clone(),
        })
    }
}

/// Signature parameter
#[derive(Debug, Clone)]
pub struct SigParam {
    /// Name, for display
    pub name: String,
    /// Type
    pub ty: Type,
    /// `?` or has a default
    pub optional: bool,
    /// `...rest`
    pub rest: bool,
}

/// Interface declaration; members are filled in after every shell exists
#[derive(Debug)]
pub struct InterfaceType {
    /// Name
    pub name: String,
    /// Generic parameters
    pub type_params: Vec<Rc<TypeParamDef>>,
    /// Members including inherited ones
    pub members: OnceCell<ObjectType>,
    /// First declaration
    pub origin: Option<Origin>,
}

impl InterfaceType {
    /// Members; an interface read before it is filled stays empty
    #[must_use]
    pub fn members(&self) -> &ObjectType {
        self.members.get_or_init(ObjectType::default)
    }
}

/// Generic type parameter
#[derive(Debug)]
pub struct TypeParamDef {
    /// Unique id within one check
    pub id: u32,
    /// Name
    pub name: String,
    /// `extends` constraint
    pub constraint: OnceCell<Type>,
    /// Default type argument
    pub default: OnceCell<Type>,
}

impl TypeParamDef {
    /// Constraint, or `unknown`
    #[must_use]
    pub fn constraint_or_unknown(&self) -> Type {
        self.constraint.get().cloned().unwrap_or(Type::Unknown)
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (Any, Any)
            | (Unknown, Unknown)
            | (Never, Never)
            | (Void, Void)
            | (Undefined, Undefined)
            | (Null, Null)
            | (String, String)
            | (Number, Number)
            | (Boolean, Boolean) => true,
            (StrLit(a), StrLit(b)) => a == b,
            (NumLit(a), NumLit(b)) => a == b || (a.is_nan() && b.is_nan()),
            (BoolLit(a), BoolLit(b)) => a == b,
            (Object(a), Object(b)) => Rc::ptr_eq(a, b),
            (Array(a), Array(b)) | (Awaited(a), Awaited(b)) => a == b,
            (Tuple(a), Tuple(b)) | (Union(a), Union(b)) => a == b,
            (Function(a), Function(b)) => Rc::ptr_eq(a, b),
            (Named { decl: da, args: aa }, Named { decl: db, args: ab }) => Rc::ptr_eq(da, db) && aa == ab,
            (Param(a), Param(b)) => a.id == b.id,
            _ => false,
        }
    }
}

impl Type {
    /// `T[]`
    #[must_use]
    pub fn array(elem: Type) -> Type {
        Type::Array(Rc::new(elem))
    }

    /// String literal
    #[must_use]
    pub fn str_lit(s: &str) -> Type {
        Type::StrLit(Rc::from(s))
    }

    /// Members of a union, or the type itself
    #[must_use]
    pub fn members(&self) -> Vec<Type> {
        match self {
            Type::Union(members) => members.to_vec(),
            other => vec![other.clone()],
        }
    }

    /// `any`
    #[must_use]
    pub fn is_any(&self) -> bool {
        matches!(self, Type::Any)
    }

    /// `null` member present
    #[must_use]
    pub fn has_null(&self) -> bool {
        self.members().iter().any(|m| matches!(m, Type::Null))
    }

    /// `undefined` or `void` member present
    #[must_use]
    pub fn has_undefined(&self) -> bool {
        self.members()
            .iter()
            .any(|m| matches!(m, Type::Undefined | Type::Void))
    }

    /// Whether any member is nullish
    #[must_use]
    pub fn is_possibly_nullish(&self) -> bool {
        self.has_null() || self.has_undefined()
    }

    /// Whether the type is exactly `null`, `undefined` or a union of them
    #[must_use]
    pub fn is_nullish_only(&self) -> bool {
        self.members()
            .iter()
            .all(|m| matches!(m, Type::Null | Type::Undefined | Type::Void))
    }

    /// String-like type
    #[must_use]
    pub fn is_string_like(&self) -> bool {
        self.members()
            .iter()
            .all(|m| matches!(m, Type::String | Type::StrLit(_)))
    }

    /// Number-like type
    #[must_use]
    pub fn is_number_like(&self) -> bool {
        self.members()
            .iter()
            .all(|m| matches!(m, Type::Number | Type::NumLit(_)))
    }

    /// Literal type (or union of literals)
    #[must_use]
    pub fn is_literal(&self) -> bool {
        matches!(self, Type::StrLit(_) | Type::NumLit(_) | Type::BoolLit(_))
    }

    /// Whether a type parameter occurs anywhere
    #[must_use]
    pub fn has_params(&self) -> bool {
        match self {
            Type::Param(_) | Type::Awaited(_) => true,
            Type::Array(elem) => elem.has_params(),
            Type::Tuple(elems) | Type::Union(elems) => elems.iter().any(Type::has_params),
            Type::Named { args, .. } => args.iter().any(Type::has_params),
            Type::Function(sig) => {
                sig.params.iter().any(|p| p.ty.has_params()) || sig.ret.has_params()
            }
            Type::Object(obj) => {
                obj.props.values().any(|p| p.ty.has_params())
                    || obj.calls.iter().any(|s| s.ret.has_params() || s.params.iter().any(|p| p.ty.has_params()))
                    || obj.string_index.as_ref().is_some_and(|(t, _)| t.has_params())
            }
            _ => false,
        }
    }
}

/// Normalized union
#[must_use]
pub fn union(types: Vec<Type>) -> Type {
    let mut flat: Vec<Type> = Vec::with_capacity(types.len());
    for ty in types {
        match ty {
            Type::Union(members) => flat.extend(members.iter().cloned()),
            Type::Never => {}
            other => flat.push(other),
        }
    }
    if flat.iter().any(Type::is_any) {
        return Type::Any;
    }
    if flat.iter().any(|t| matches!(t, Type::Unknown)) {
        return Type::Unknown;
    }
    let has_string = flat.iter().any(|t| matches!(t, Type::String));
    let has_number = flat.iter().any(|t| matches!(t, Type::Number));
    let has_true = flat.iter().any(|t| matches!(t, Type::BoolLit(true)));
    let has_false = flat.iter().any(|t| matches!(t, Type::BoolLit(false)));
    let has_boolean = flat.iter().any(|t| matches!(t, Type::Boolean)) || (has_true && has_false);

    let mut out: Vec<Type> = Vec::with_capacity(flat.len());
    for ty in flat {
        let absorbed = match &ty {
            Type::StrLit(_) => has_string,
            Type::NumLit(_) => has_number,
            Type::BoolLit(_) => has_boolean,
            _ => false,
        };
        if absorbed {
            if has_boolean && matches!(ty, Type::BoolLit(_)) && !out.iter().any(|t| matches!(t, Type::Boolean)) {
                out.push(Type::Boolean);
            }
            continue;
        }
        if !out.contains(&ty) {
            out.push(ty);
        }
    }
    match out.len() {
        0 => Type::Never,
        1 => out.pop().unwrap_or(Type::Never),
        _ => Type::Union(out.into()),
    }
}

/// Remove `null` and `undefined`
#[must_use]
pub fn non_nullable(ty: &Type) -> Type {
    match ty {
        Type::Union(members) => union(
            members
                .iter()
                .filter(|m| !matches!(m, Type::Null | Type::Undefined | Type::Void))
                .cloned()
                .collect(),
        ),
        Type::Null | Type::Undefined | Type::Void => Type::Never,
        Type::Unknown => Type::Unknown,
        other => other.clone(),
    }
}

/// Remove `undefined` only
#[must_use]
pub fn remove_undefined(ty: &Type) -> Type {
    match ty {
        Type::Union(members) => union(
            members
                .iter()
                .filter(|m| !matches!(m, Type::Undefined))
                .cloned()
                .collect(),
        ),
        Type::Undefined => Type::Never,
        other => other.clone(),
    }
}

/// Keep the members matching a predicate
#[must_use]
pub fn filter_union(ty: &Type, keep: impl Fn(&Type) -> bool) -> Type {
    union(ty.members().into_iter().filter(|m| keep(m)).collect())
}

/// Widen literal types to their primitives
#[must_use]
pub fn widen(ty: &Type) -> Type {
    match ty {
        Type::StrLit(_) => Type::String,
        Type::NumLit(_) => Type::Number,
        Type::BoolLit(_) => Type::Boolean,
        Type::Union(members) => union(members.iter().map(widen).collect()),
        other => other.clone(),
    }
}

/// Substitute type parameters
#[must_use]
pub fn substitute(ty: &Type, map: &HashMap<u32, Type>) -> Type {
    if map.is_empty() {
        return ty.clone();
    }
    match ty {
        Type::Param(p) => map.get(&p.id).cloned().unwrap_or_else(|| ty.clone()),
        Type::Array(elem) => Type::Array(Rc::new(substitute(elem, map))),
        Type::Tuple(elems) => Type::Tuple(elems.iter().map(|t| substitute(t, map)).collect()),
        Type::Union(members) => union(members.iter().map(|t| substitute(t, map)).collect()),
        Type::Named { decl, args } => Type::Named {
            decl: decl.clone(),
            args: args.iter().map(|t| substitute(t, map)).collect(),
        },
        Type::Function(sig) => Type::Function(Rc::new(substitute_signature(sig, map))),
        Type::Object(obj) => Type::Object(Rc::new(substitute_object(obj, map))),
        Type::Awaited(inner) => awaited(&substitute(inner, map)),
        other => other.clone(),
    }
}

/// Substitute inside a signature
#[must_use]
pub fn substitute_signature(sig: &Signature, map: &HashMap<u32, Type>) -> Signature {
    Signature {
        type_params: sig.type_params.clone(),
        params: sig
            .params
            .iter()
            .map(|p| SigParam {
                name: p.name.clone(),
                ty: substitute(&p.ty, map),
                optional: p.optional,
                rest: p.rest,
            })
            .collect(),
        ret: substitute(&sig.ret, map),
        predicate: sig.predicate.as_ref().map(|(index, ty)| (*index, substitute(ty, map))),
        origin: sig.origin,
    }
}

/// Substitute inside an object type
#[must_use]
pub fn substitute_object(obj: &ObjectType, map: &HashMap<u32, Type>) -> ObjectType {
    ObjectType {
        props: obj
            .props
            .iter()
            .map(|(name, prop)| {
                (
                    name.clone(),
                    Property {
                        ty: substitute(&prop.ty, map),
                        ..prop.clone()
                    },
                )
            })
            .collect(),
        calls: obj
            .calls
            .iter()
            .map(|s| Rc::new(substitute_signature(s, map)))
            .collect(),
        constructs: obj
            .constructs
            .iter()
            .map(|s| Rc::new(substitute_signature(s, map)))
            .collect(),
        string_index: obj
            .string_index
            .as_ref()
            .map(|(t, ro)| (substitute(t, map), *ro)),
        number_index: obj.number_index.as_ref().map(|t| substitute(t, map)),
    }
}

/// Map from an interface's parameters to arguments
#[must_use]
pub fn interface_map(decl: &InterfaceType, args: &[Type]) -> HashMap<u32, Type> {
    decl.type_params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let arg = args
                .get(i)
                .cloned()
                .or_else(|| p.default.get().cloned())
                .unwrap_or(Type::Unknown);
            (p.id, arg)
        })
        .collect()
}

/// Members of an interface instantiation
#[must_use]
pub fn instantiate_interface(decl: &InterfaceType, args: &[Type]) -> ObjectType {
    substitute_object(decl.members(), &interface_map(decl, args))
}

/// Whether the type is a `Promise<T>` reference
#[must_use]
pub fn promise_arg(ty: &Type) -> Option<Type> {
    match ty {
        Type::Named { decl, args } if decl.name == "Promise" => {
            Some(args.first().cloned().unwrap_or(Type::Unknown))
        }
        _ => None,
    }
}

/// Type produced by `await`
///
/// Unwraps promises recursively, distributes over unions, and maps array
/// and tuple elements so `Promise.all` yields the settled element types.
#[must_use]
pub fn awaited(ty: &Type) -> Type {
    match ty {
        Type::Param(_) => Type::Awaited(Rc::new(ty.clone())),
        Type::Union(members) => union(members.iter().map(awaited).collect()),
        Type::Tuple(elems) => Type::Tuple(elems.iter().map(awaited).collect()),
        Type::Array(elem) if promise_arg(elem).is_some() || matches!(**elem, Type::Union(_)) => {
            Type::Array(Rc::new(awaited(elem)))
        }
        other => match promise_arg(other) {
            Some(inner) => awaited(&inner),
            None => other.clone(),
        },
    }
}

fn needs_parens_in_array(ty: &Type) -> bool {
    matches!(ty, Type::Union(_) | Type::Function(_))
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            let names: Vec<&str> = self.type_params.iter().map(|p| p.name.as_str()).collect();
            write!(f, "<{}>", names.join(", "))?;
        }
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if p.rest {
                write!(f, "...")?;
            }
            write!(f, "{}{}: {}", p.name, if p.optional { "?" } else { "" }, p.ty)?;
        }
        write!(f, ") => {}", self.ret)
    }
}

fn fmt_object(obj: &ObjectType, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if obj.props.is_empty() && obj.calls.is_empty() && obj.string_index.is_none() && obj.number_index.is_none() {
        return write!(f, "{{}}");
    }
    if obj.props.is_empty() && obj.calls.len() == 1 && obj.string_index.is_none() {
        return write!(f, "{}", obj.calls[0]);
    }
    write!(f, "{{ ")?;
    if let Some((ty, readonly)) = &obj.string_index {
        write!(f, "{}[key: string]: {ty}; ", if *readonly { "readonly " } else { "" })?;
    }
    if let Some(ty) = &obj.number_index {
        write!(f, "[index: number]: {ty}; ")?;
    }
    for (name, prop) in &obj.props {
        let key = if is_identifier_name(name) {
            name.clone()
        } else {
            format!("{name:?}")
        };
        write!(
            f,
            "{}{key}{}: {}; ",
            if prop.readonly { "readonly " } else { "" },
            if prop.optional { "?" } else { "" },
            prop.ty
        )?;
    }
    write!(f, "}}")
}

/// Whether a property name prints without quotes
#[must_use]
pub fn is_identifier_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Unknown => write!(f, "unknown"),
            Type::Never => write!(f, "never"),
            Type::Void => write!(f, "void"),
            Type::Undefined => write!(f, "undefined"),
            Type::Null => write!(f, "null"),
            Type::String => write!(f, "string"),
            Type::Number => write!(f, "number"),
            Type::Boolean => write!(f, "boolean"),
            Type::StrLit(s) => write!(f, "{s:?}"),
            Type::NumLit(n) => write!(f, "{}", crate::ast::format_number(*n)),
            Type::BoolLit(b) => write!(f, "{b}"),
            Type::Object(obj) => fmt_object(obj, f),
            Type::Array(elem) => {
                if needs_parens_in_array(elem) {
                    write!(f, "({elem})[]")
                } else {
                    write!(f, "{elem}[]")
                }
            }
            Type::Tuple(elems) => {
                let parts: Vec<String> = elems.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
            Type::Union(members) => {
                // nullish members print last
                let mut parts: Vec<String> = members
                    .iter()
                    .filter(|m| !matches!(m, Type::Null | Type::Undefined))
                    .map(ToString::to_string)
                    .collect();
                parts.extend(
                    members
                        .iter()
                        .filter(|m| matches!(m, Type::Null | Type::Undefined))
                        .map(ToString::to_string),
                );
                write!(f, "{}", parts.join(" | "))
            }
            Type::Function(sig) => write!(f, "{sig}"),
            Type::Named { decl, args } => {
                if args.is_empty() {
                    write!(f, "{}", decl.name)
                } else {
                    let parts: Vec<String> = args.iter().map(ToString::to_string).collect();
                    write!(f, "{}<{}>", decl.name, parts.join(", "))
                }
            }
            Type::Param(p) => write!(f, "{}", p.name),
            Type::Awaited(inner) => write!(f, "Awaited<{inner}>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(id: u32, name: &str) -> Rc<TypeParamDef> {
        Rc::new(TypeParamDef {
            id,
            name: name.to_string(),
            constraint: OnceCell::new(),
            default: OnceCell::new(),
        })
    }

    #[test]
    fn test_union_normalizes() {
        let ty = union(vec![Type::str_lit("a"), Type::String, Type::Null, Type::String]);
        assert_eq!(ty.to_string(), "string | null");
        let ty = union(vec![Type::BoolLit(true), Type::BoolLit(false)]);
        assert_eq!(ty, Type::Boolean);
        assert_eq!(union(vec![]), Type::Never);
        assert_eq!(union(vec![Type::Number, Type::Any]), Type::Any);
    }

    #[test]
    fn test_non_nullable() {
        let ty = union(vec![Type::String, Type::Null, Type::Undefined]);
        assert!(ty.is_possibly_nullish());
        assert_eq!(non_nullable(&ty), Type::String);
        assert_eq!(remove_undefined(&ty).to_string(), "string | null");
    }

    #[test]
    fn test_widen() {
        let ty = union(vec![Type::str_lit("a"), Type::NumLit(1.0)]);
        assert_eq!(widen(&ty).to_string(), "string | number");
    }

    #[test]
    fn test_display_nullish_last() {
        let ty = Type::Union(vec![Type::Null, Type::String].into());
        assert_eq!(ty.to_string(), "string | null");
        let arr = Type::array(union(vec![Type::String, Type::Null]));
        assert_eq!(arr.to_string(), "(string | null)[]");
    }

    #[test]
    fn test_display_object_and_function() {
        let mut props = IndexMap::new();
        props.insert("title".to_string(), Property::new(Type::String));
        props.insert(
            "tags".to_string(),
            Property {
                optional: true,
                ..Property::new(Type::array(Type::String))
            },
        );
        let obj = Type::Object(Rc::new(ObjectType::with_props(props)));
        assert_eq!(obj.to_string(), "{ title: string; tags?: string[]; }");

        let sig = Signature {
            type_params: vec![],
            params: vec![SigParam {
                name: "id".into(),
                ty: Type::String,
                optional: false,
                rest: false,
            }],
            ret: Type::Void,
            predicate: None,
            origin: None,
        };
        assert_eq!(Type::Function(Rc::new(sig)).to_string(), "(id: string) => void");
    }

    #[test]
    fn test_substitute_param() {
        let t = param(1, "T");
        let ty = Type::array(Type::Param(t.clone()));
        let mut map = HashMap::new();
        map.insert(1, Type::Number);
        assert_eq!(substitute(&ty, &map).to_string(), "number[]");
        assert!(ty.has_params());
    }

    #[test]
    fn test_awaited_unwraps_promise() {
        let promise = Rc::new(InterfaceType {
            name: "Promise".into(),
            type_params: vec![param(7, "T")],
            members: OnceCell::new(),
            origin: None,
        });
        let p = Type::Named {
            decl: promise,
            args: vec![union(vec![Type::String, Type::Null])].into(),
        };
        assert_eq!(awaited(&p).to_string(), "string | null");
        let tuple = Type::Tuple(vec![p.clone(), Type::Number].into());
        assert_eq!(awaited(&tuple).to_string(), "[string | null, number]");
        let deferred = awaited(&Type::Param(param(3, "U")));
        assert!(matches!(deferred, Type::Awaited(_)));
    }

    #[test]
    fn test_signature_arity() {
        let sig = Signature {
            type_params: vec![],
            params: vec![
                SigParam { name: "a".into(), ty: Type::String, optional: false, rest: false },
                SigParam { name: "b".into(), ty: Type::Number, optional: true, rest: false },
            ],
            ret: Type::Void,
            predicate: None,
            origin: None,
        };
        assert_eq!(sig.min_args(), 1);
        assert_eq!(sig.max_args(), Some(2));
        assert_eq!(sig.param_type_at(1), Some(Type::Number));
        assert_eq!(sig.param_type_at(2), None);
    }

    #[test]
    fn test_trailing_void_parameter_is_optional() {
        let sig = Signature {
            type_params: vec![],
            params: vec![
                SigParam { name: "a".into(), ty: Type::String, optional: false, rest: false },
                SigParam { name: "value".into(), ty: union(vec![Type::Void, Type::Number]), optional: false, rest: false },
            ],
            ret: Type::Void,
            predicate: None,
            origin: None,
        };
        assert_eq!(sig.min_args(), 1);
        let leading = Signature {
            params: sig.params.iter().rev().cloned().collect(),
            ..sig.clone()
        };
        assert_eq!(leading.min_args(), 2);
    }
}
