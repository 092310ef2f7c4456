//! Syntax tree for the supported TypeScript subset.

use crate::span::Span;

/// Identifier with its span
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    /// Name
    pub name: String,
    /// Span
    pub span: Span,
}

/// Parsed source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    /// Top-level statements
    pub body: Vec<Stmt>,
}

/// Statement
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Kind
    pub kind: StmtKind,
    /// Span
    pub span: Span,
}

/// `const`, `let` or `var`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// `const`
    Const,
    /// `let`
    Let,
    /// `var`
    Var,
}

impl VarKind {
    /// Keyword text
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Const => "const",
            Self::Let => "let",
            Self::Var => "var",
        }
    }
}

/// Variable declaration list
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// Declaration keyword
    pub kind: VarKind,
    /// Declarators
    pub decls: Vec<Declarator>,
    /// Ambient (`declare const x: T`)
    pub declare: bool,
}

/// One `pattern: T = init`
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    /// Binding target
    pub pattern: Pattern,
    /// Annotation
    pub ty: Option<TypeNode>,
    /// Initializer
    pub init: Option<Expr>,
    /// Span
    pub span: Span,
}

/// Binding pattern
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// Kind
    pub kind: PatternKind,
    /// Span
    pub span: Span,
}

/// Pattern kinds
#[derive(Debug, Clone, PartialEq)]
pub enum PatternKind {
    /// `x`
    Ident(Ident),
    /// `{ a, b: c = 1, ...rest }`
    Object {
        /// Properties
        props: Vec<ObjectPatternProp>,
        /// Rest element
        rest: Option<Box<Pattern>>,
    },
    /// `[a, , b = 2, ...rest]`
    Array {
        /// Elements; `None` is a hole
        elems: Vec<Option<ArrayPatternElem>>,
        /// Rest element
        rest: Option<Box<Pattern>>,
    },
}

/// Object pattern property
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectPatternProp {
    /// Source property
    pub key: PropKey,
    /// Target
    pub value: Pattern,
    /// Default
    pub default: Option<Expr>,
}

/// Array pattern element
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayPatternElem {
    /// Target
    pub pattern: Pattern,
    /// Default
    pub default: Option<Expr>,
}

/// Function-like node: declaration, expression, arrow or signature
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Type parameters
    pub type_params: Vec<TypeParam>,
    /// Parameters
    pub params: Vec<Param>,
    /// Return annotation
    pub ret: Option<TypeNode>,
    /// Body; `None` for signatures
    pub body: Option<FnBody>,
    /// `async`
    pub is_async: bool,
    /// Arrow function
    pub is_arrow: bool,
    /// Span of the whole function
    pub span: Span,
}

/// Function body
#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// Arrow expression body
    Expr(Box<Expr>),
}

/// Parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Binding
    pub pattern: Pattern,
    /// Annotation
    pub ty: Option<TypeNode>,
    /// `?`
    pub optional: bool,
    /// Default value
    pub default: Option<Expr>,
    /// `...`
    pub rest: bool,
    /// Span
    pub span: Span,
}

/// Generic type parameter
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    /// Name
    pub name: Ident,
    /// `extends` constraint
    pub constraint: Option<TypeNode>,
    /// Default type
    pub default: Option<TypeNode>,
}

/// Named function declaration
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    /// Name
    pub name: Ident,
    /// Function
    pub func: Function,
    /// Ambient signature (`declare function`, or inside a declared namespace)
    pub declare: bool,
}

/// Interface declaration
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    /// Name
    pub name: Ident,
    /// Type parameters
    pub type_params: Vec<TypeParam>,
    /// `extends` clause
    pub extends: Vec<TypeNode>,
    /// Members
    pub members: Vec<TypeMember>,
}

/// `type Name<T> = ...`
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAliasDecl {
    /// Name
    pub name: Ident,
    /// Type parameters
    pub type_params: Vec<TypeParam>,
    /// Aliased type
    pub ty: TypeNode,
}

/// `switch` clause
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    /// `None` for `default`
    pub test: Option<Expr>,
    /// Statements
    pub body: Vec<Stmt>,
    /// Span
    pub span: Span,
}

/// `for...of` / `for...in` head
#[derive(Debug, Clone, PartialEq)]
pub enum ForHead {
    /// `const x` / `let [a, b]`
    Decl(VarKind, Pattern),
    /// Existing assignment target
    Expr(Expr),
}

/// Classic `for` initializer
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    /// Declarations
    Var(VarDecl),
    /// Expression
    Expr(Expr),
}

/// Statement kinds
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `const`/`let`/`var`
    Var(VarDecl),
    /// `function f() {}`
    Function(FunctionDecl),
    /// Expression statement
    Expr(Expr),
    /// `{ ... }`
    Block(Vec<Stmt>),
    /// `if`
    If {
        /// Condition
        test: Expr,
        /// Then branch
        cons: Box<Stmt>,
        /// Else branch
        alt: Option<Box<Stmt>>,
    },
    /// `for (;;)`
    For {
        /// Initializer
        init: Option<ForInit>,
        /// Condition
        test: Option<Expr>,
        /// Update
        update: Option<Expr>,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (x of xs)`
    ForOf {
        /// Binding
        head: ForHead,
        /// Iterated value
        iter: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `for (k in obj)`
    ForIn {
        /// Binding
        head: ForHead,
        /// Object
        object: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `while`
    While {
        /// Condition
        test: Expr,
        /// Body
        body: Box<Stmt>,
    },
    /// `do ... while`
    DoWhile {
        /// Body
        body: Box<Stmt>,
        /// Condition
        test: Expr,
    },
    /// `switch`
    Switch {
        /// Discriminant
        discriminant: Expr,
        /// Clauses
        cases: Vec<SwitchCase>,
    },
    /// `try`
    Try {
        /// Protected block
        block: Vec<Stmt>,
        /// `catch (e)` binding
        param: Option<Pattern>,
        /// Catch block
        handler: Option<Vec<Stmt>>,
        /// Finally block
        finalizer: Option<Vec<Stmt>>,
    },
    /// `throw`
    Throw(Expr),
    /// `return`
    Return(Option<Expr>),
    /// `break`
    Break(Option<Ident>),
    /// `continue`
    Continue(Option<Ident>),
    /// `label: stmt`
    Labeled {
        /// Label
        label: Ident,
        /// Body
        body: Box<Stmt>,
    },
    /// `interface`
    Interface(InterfaceDecl),
    /// `type`
    TypeAlias(TypeAliasDecl),
    /// `declare namespace X { ... }`
    Namespace {
        /// Name
        name: Ident,
        /// Declarations
        body: Vec<Stmt>,
    },
    /// `;`
    Empty,
}

/// Expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Kind
    pub kind: ExprKind,
    /// Span
    pub span: Span,
}

/// Property key in literals and patterns
#[derive(Debug, Clone, PartialEq)]
pub enum PropKey {
    /// `name`
    Ident(Ident),
    /// `"name"`
    Str(String, Span),
    /// `1`
    Num(f64, Span),
    /// `[expr]`
    Computed(Box<Expr>),
}

impl PropKey {
    /// Static name of the key, if known
    #[must_use]
    pub fn static_name(&self) -> Option<String> {
        match self {
            Self::Ident(ident) => Some(ident.name.clone()),
            Self::Str(s, _) => Some(s.clone()),
            Self::Num(n, _) => Some(format_number(*n)),
            Self::Computed(expr) => match &expr.kind {
                ExprKind::Str(s) => Some(s.clone()),
                ExprKind::Number(n) => Some(format_number(*n)),
                _ => None,
            },
        }
    }

    /// Span of the key
    #[must_use]
    pub fn span(&self) -> Span {
        match self {
            Self::Ident(ident) => ident.span,
            Self::Str(_, span) | Self::Num(_, span) => *span,
            Self::Computed(expr) => expr.span,
        }
    }
}

/// Object literal member
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectProp {
    /// `key: value`
    KeyValue {
        /// Key
        key: PropKey,
        /// Value
        value: Expr,
    },
    /// `name`
    Shorthand(Ident),
    /// `...expr`
    Spread(Expr),
    /// `name(params) { body }`
    Method {
        /// Key
        key: PropKey,
        /// Function
        func: Function,
    },
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
    /// `+`
    Plus,
    /// `~`
    BitNot,
    /// `typeof`
    Typeof,
    /// `void`
    Void,
    /// `delete`
    Delete,
}

/// Binary operators (logical operators are separate)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `**`
    Exp,
    /// `==`
    LooseEq,
    /// `!=`
    LooseNe,
    /// `===`
    StrictEq,
    /// `!==`
    StrictNe,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    UShr,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `in`
    In,
    /// `instanceof`
    Instanceof,
}

impl BinaryOp {
    /// Operator text
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Exp => "**",
            Self::LooseEq => "==",
            Self::LooseNe => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
            Self::In => "in",
            Self::Instanceof => "instanceof",
        }
    }

    /// Whether the operator requires numeric operands
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            Self::Sub
                | Self::Mul
                | Self::Div
                | Self::Rem
                | Self::Exp
                | Self::Shl
                | Self::Shr
                | Self::UShr
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
        )
    }
}

/// `&&`, `||`, `??`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Nullish,
}

/// Assignment operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Assign,
    /// `op=` for an arithmetic or bitwise operator
    Compound(BinaryOp),
    /// `&&=`, `||=`, `??=`
    Logical(LogicalOp),
}

/// Expression kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Identifier reference
    Ident(String),
    /// Number literal
    Number(f64),
    /// String literal
    Str(String),
    /// `true` / `false`
    Bool(bool),
    /// `null`
    Null,
    /// `this`
    This,
    /// Template literal
    Template {
        /// Cooked text chunks
        quasis: Vec<String>,
        /// Substitutions
        exprs: Vec<Expr>,
    },
    /// Regular expression literal
    Regex {
        /// Pattern
        pattern: String,
        /// Flags
        flags: String,
    },
    /// `[a, , ...b]`
    Array(Vec<Option<Expr>>),
    /// `{ ... }`
    Object(Vec<ObjectProp>),
    /// Function or arrow expression
    Function {
        /// Optional name
        name: Option<Ident>,
        /// Function
        func: Box<Function>,
    },
    /// `a.b` / `a?.b`
    Member {
        /// Object
        object: Box<Expr>,
        /// Property
        prop: Ident,
        /// `?.`
        optional: bool,
    },
    /// `a[b]` / `a?.[b]`
    Index {
        /// Object
        object: Box<Expr>,
        /// Index
        index: Box<Expr>,
        /// `?.`
        optional: bool,
    },
    /// `f(args)` / `f?.(args)`
    Call {
        /// Callee
        callee: Box<Expr>,
        /// Explicit type arguments
        type_args: Vec<TypeNode>,
        /// Arguments
        args: Vec<Expr>,
        /// `?.`
        optional: bool,
    },
    /// `new C(args)`
    New {
        /// Constructor
        callee: Box<Expr>,
        /// Explicit type arguments
        type_args: Vec<TypeNode>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// Prefix unary
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        arg: Box<Expr>,
    },
    /// `++x` / `x--`
    Update {
        /// `true` for `++`
        increment: bool,
        /// Prefix form
        prefix: bool,
        /// Target
        arg: Box<Expr>,
    },
    /// Binary
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left
        left: Box<Expr>,
        /// Right
        right: Box<Expr>,
    },
    /// Logical
    Logical {
        /// Operator
        op: LogicalOp,
        /// Left
        left: Box<Expr>,
        /// Right
        right: Box<Expr>,
    },
    /// Assignment
    Assign {
        /// Operator
        op: AssignOp,
        /// Target
        target: Box<Expr>,
        /// Value
        value: Box<Expr>,
    },
    /// `a ? b : c`
    Conditional {
        /// Condition
        test: Box<Expr>,
        /// Then value
        cons: Box<Expr>,
        /// Else value
        alt: Box<Expr>,
    },
    /// `await x`
    Await(Box<Expr>),
    /// `...x` in arrays and arguments
    Spread(Box<Expr>),
    /// `a, b`
    Sequence(Vec<Expr>),
    /// `x as T`
    As {
        /// Operand
        expr: Box<Expr>,
        /// Target type
        ty: TypeNode,
    },
    /// `x satisfies T`
    Satisfies {
        /// Operand
        expr: Box<Expr>,
        /// Checked type
        ty: TypeNode,
    },
    /// `x!`
    NonNull(Box<Expr>),
    /// Placeholder after a syntax error
    Invalid,
}

/// Type annotation
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    /// Kind
    pub kind: TypeKind,
    /// Span
    pub span: Span,
}

/// Keyword types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKeyword {
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
    /// `object`
    Object,
}

impl TypeKeyword {
    /// Parse a keyword type name
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "any" => Self::Any,
            "unknown" => Self::Unknown,
            "never" => Self::Never,
            "void" => Self::Void,
            "undefined" => Self::Undefined,
            "null" => Self::Null,
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            _ => return None,
        })
    }
}

/// Literal types
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralType {
    /// `"a"`
    Str(String),
    /// `1`
    Num(f64),
    /// `true`
    Bool(bool),
}

/// Tuple element
#[derive(Debug, Clone, PartialEq)]
pub struct TupleElem {
    /// Element type
    pub ty: TypeNode,
    /// `T?`
    pub optional: bool,
    /// `...T[]`
    pub rest: bool,
}

/// Type kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Keyword
    Keyword(TypeKeyword),
    /// Literal
    Literal(LiteralType),
    /// `Name<Args>` or `ns.Name`
    Ref {
        /// Dotted name
        name: String,
        /// Type arguments
        args: Vec<TypeNode>,
    },
    /// `T[]`
    Array(Box<TypeNode>),
    /// `[A, B?]`
    Tuple(Vec<TupleElem>),
    /// `A | B`
    Union(Vec<TypeNode>),
    /// `A & B`
    Intersection(Vec<TypeNode>),
    /// `{ a: T; [k: string]: U }`
    Object(Vec<TypeMember>),
    /// `<T>(a: A) => R`
    Function(Box<Function>),
    /// Return-position `x is T`, `asserts x is T` or `asserts x`
    Predicate {
        /// Parameter name, or `this`
        param: String,
        /// `asserts`
        asserts: bool,
        /// Asserted type
        ty: Option<Box<TypeNode>>,
    },
}

/// Member of an object type literal or interface
#[derive(Debug, Clone, PartialEq)]
pub enum TypeMember {
    /// `readonly name?: T`
    Property {
        /// Name
        name: String,
        /// Optional
        optional: bool,
        /// Read-only
        readonly: bool,
        /// Type; `None` means implicit any
        ty: Option<TypeNode>,
        /// Span
        span: Span,
    },
    /// `name<T>(params): R`
    Method {
        /// Name
        name: String,
        /// Optional
        optional: bool,
        /// Signature
        func: Function,
        /// Span
        span: Span,
    },
    /// `[key: string]: T`
    Index {
        /// Key type
        key: TypeNode,
        /// Value type
        value: TypeNode,
        /// Read-only
        readonly: bool,
        /// Span
        span: Span,
    },
    /// `(params): R`
    Call {
        /// Signature
        func: Function,
        /// Span
        span: Span,
    },
    /// `new (params): R`
    Construct {
        /// Signature
        func: Function,
        /// Span
        span: Span,
    },
}

/// Number formatting matching `String(n)` for the common cases
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(-0.5), "-0.5");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    #[test]
    fn test_prop_key_static_name() {
        let key = PropKey::Num(2.0, Span::new(0, 1));
        assert_eq!(key.static_name().as_deref(), Some("2"));
        let computed = PropKey::Computed(Box::new(Expr {
            kind: ExprKind::Ident("k".to_string()),
            span: Span::new(1, 2),
        }));
        assert_eq!(computed.static_name(), None);
    }

    #[test]
    fn test_type_keyword() {
        assert_eq!(TypeKeyword::from_word("unknown"), Some(TypeKeyword::Unknown));
        assert_eq!(TypeKeyword::from_word("Note"), None);
    }
}
