//! Typed AST consumed by the SPIR-V emitter.
//!
//! This is the external collaborator interface the emitter is built against:
//! the upstream HLSL parser and type checker (out of scope for this crate)
//! hand us a [`TranslationUnit`] of fully-typed declarations. Nothing here
//! parses source text; it only defines the shapes the emitter walks.

use crate::arena::{Arena, Handle};

/// Number of bytes a scalar occupies.
pub type Bytes = u8;

/// Primitive type for a scalar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Sint,
    Uint,
    Float,
    Bool,
}

/// Number of components in a vector.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VectorSize {
    Bi = 2,
    Tri = 3,
    Quad = 4,
}

impl VectorSize {
    pub fn count(self) -> u32 {
        self as u8 as u32
    }
}

/// A fully resolved HLSL type (clang's `QualType`, stripped of qualifiers we
/// don't need: this emitter only cares about the type's shape).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar {
        kind: ScalarKind,
        width: Bytes,
    },
    Vector {
        size: VectorSize,
        kind: ScalarKind,
        width: Bytes,
    },
    /// Row-major matrix of floating point values. Bounded, per the SPIR-V
    /// backend's supported shape, to floats with 2-4 rows/columns.
    Matrix {
        rows: VectorSize,
        cols: VectorSize,
        width: Bytes,
    },
    Struct(Handle<StructDecl>),
    Array {
        base: Box<Type>,
        size: u32,
    },
}

impl Type {
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Type::Scalar {
                kind: ScalarKind::Float,
                ..
            } | Type::Vector {
                kind: ScalarKind::Float,
                ..
            } | Type::Matrix { .. }
        )
    }

    pub fn is_bool(&self) -> bool {
        matches!(
            self,
            Type::Scalar {
                kind: ScalarKind::Bool,
                ..
            } | Type::Vector {
                kind: ScalarKind::Bool,
                ..
            }
        )
    }

    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        match *self {
            Type::Scalar { kind, .. } | Type::Vector { kind, .. } => Some(kind),
            Type::Matrix { .. } => Some(ScalarKind::Float),
            _ => None,
        }
    }

    /// Number of vector/scalar lanes this type occupies, for swizzle bound
    /// checks. Scalars count as 1.
    pub fn vector_len(&self) -> u32 {
        match *self {
            Type::Vector { size, .. } => size.count(),
            _ => 1,
        }
    }
}

/// A name attached to a parameter or struct field selecting which stage
/// variable or SPIR-V built-in it binds to (e.g. `SV_Target`, `A`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Semantic(pub String);

impl Semantic {
    /// Maps well-known HLSL system-value semantics to their SPIR-V built-in.
    /// Returns `None` for ordinary user semantics, which consume a Location
    /// instead.
    pub fn builtin(&self) -> Option<spirv::BuiltIn> {
        match self.0.to_ascii_uppercase().as_str() {
            "SV_POSITION" => Some(spirv::BuiltIn::Position),
            "SV_VERTEXID" => Some(spirv::BuiltIn::VertexIndex),
            "SV_INSTANCEID" => Some(spirv::BuiltIn::InstanceIndex),
            "SV_ISFRONTFACE" => Some(spirv::BuiltIn::FrontFacing),
            "SV_DEPTH" => Some(spirv::BuiltIn::FragDepth),
            "SV_DISPATCHTHREADID" => Some(spirv::BuiltIn::GlobalInvocationId),
            "SV_GROUPID" => Some(spirv::BuiltIn::WorkgroupId),
            "SV_GROUPTHREADID" => Some(spirv::BuiltIn::LocalInvocationId),
            "SV_GROUPINDEX" => Some(spirv::BuiltIn::LocalInvocationIndex),
            _ => None,
        }
    }
}

/// Direction keyword on an HLSL function parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: Type,
    pub semantic: Option<Semantic>,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub name: String,
    pub fields: Arena<FieldDecl>,
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub ty: Type,
    pub semantic: Option<Semantic>,
    pub direction: Direction,
}

#[derive(Clone, Debug)]
pub struct LocalVarDecl {
    pub name: String,
    pub ty: Type,
    pub init: Option<Handle<Expr>>,
}

/// Global (module-scope) variable. Out of scope per spec.md §4.7's
/// *Declaration* statement rule; kept as an AST node only so the emitter has
/// something concrete to reject with `Error::Unsupported`.
#[derive(Clone, Debug)]
pub struct GlobalVarDecl {
    pub name: String,
    pub ty: Type,
}

/// Binary operator, shared between `BinaryOperator` and the compound-assign
/// family (the assign/compound-assign distinction lives on the `Expr`, not
/// here).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    ExclusiveOr,
    InclusiveOr,
    LogicalAnd,
    LogicalOr,
    ShiftLeftLogical,
    ShiftRightLogical,
    ShiftRightArithmetic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Negate,
    /// `!`
    LogicalNot,
    /// `~`
    BitwiseNot,
    /// `+`, identity
    Plus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Literal {
    Sint(i64),
    Uint(u64),
    Float(u64), // f64 bits, reinterpreted at lowering time
    Bool(bool),
}

/// HLSL intrinsic functions this emitter knows how to lower directly,
/// without going through an ordinary `OpFunctionCall`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrinsicOp {
    Dot,
    All,
    Any,
    AsFloat,
    AsInt,
    AsUint,
}

/// Mirrors clang's `CastKind` catalog, collapsed to the handling buckets the
/// emitter dispatches on (several clang `HLSLCC_*` cast kinds share handling
/// with their non-HLSLCC counterparts and so share a single variant here).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastKind {
    LValueToRValue,
    NoOp,
    IntegralCast,
    FloatingToIntegral,
    FloatingCast,
    IntegralToFloating,
    IntegralToBoolean,
    FloatingToBoolean,
    HlslVectorSplat,
    HlslVectorTruncation,
    HlslVectorToScalar,
    HlslVectorToMatrix,
    HlslMatrixSplat,
    HlslMatrixToScalar,
    HlslMatrixToVector,
    FunctionToPointerDecay,
    Other,
}

/// Identifies a declaration for the purposes of id lookup. Composite keys
/// carry the owning function/struct handle because parameter and local
/// handles are only unique within their own function's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclId {
    Param(Handle<FunctionDecl>, u32),
    Local(Handle<FunctionDecl>, Handle<LocalVarDecl>),
    Field(Handle<StructDecl>, u32),
    Function(Handle<FunctionDecl>),
}

#[derive(Clone, Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    /// Reference to a parameter, local variable, or (rarely, for a pointer
    /// decayed to a callee) function declaration.
    DeclRef(DeclId),
    /// Struct field access, `base.field`. Lowers to an access chain.
    Member {
        base: Handle<Expr>,
        field_index: u32,
    },
    /// Vector swizzle, `base.xyz`. May itself be the base of another
    /// swizzle; composition is condensed at lowering time.
    Swizzle {
        base: Handle<Expr>,
        selectors: Vec<u32>,
    },
    Literal(Literal),
    /// Brace initializer list, `float4(1, 2, 3, 4)` or `{1, 2, 3, 4}`.
    InitList(Vec<Handle<Expr>>),
    Binary {
        op: BinaryOp,
        lhs: Handle<Expr>,
        rhs: Handle<Expr>,
    },
    /// Plain `=`.
    Assign {
        lhs: Handle<Expr>,
        rhs: Handle<Expr>,
    },
    /// `+=`, `-=`, etc.
    CompoundAssign {
        op: BinaryOp,
        lhs: Handle<Expr>,
        rhs: Handle<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Handle<Expr>,
    },
    /// `++x` / `--x`.
    PreIncDec {
        increment: bool,
        expr: Handle<Expr>,
    },
    /// `x++` / `x--`.
    PostIncDec {
        increment: bool,
        expr: Handle<Expr>,
    },
    Conditional {
        cond: Handle<Expr>,
        then_expr: Handle<Expr>,
        else_expr: Handle<Expr>,
    },
    Call {
        callee: Handle<FunctionDecl>,
        args: Vec<Handle<Expr>>,
    },
    Intrinsic {
        op: IntrinsicOp,
        args: Vec<Handle<Expr>>,
    },
    Cast {
        kind: CastKind,
        expr: Handle<Expr>,
    },
}

/// A `[attribute]`-style annotation recognized on statements.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attribute {
    ForceCase,
}

#[derive(Clone, Debug)]
pub enum CaseLabel {
    Literal(i64),
    /// A case value that is not an integer literal; forces the if-chain
    /// switch lowering strategy.
    Expr(Handle<Expr>),
}

/// One item inside a switch body, in source order. Consecutive `Case`/
/// `Default` items with no `Stmt` between them model fall-through groups
/// (e.g. `case 2: case 3: return 20;`) without needing clang's nested
/// `CaseStmt` sub-statement chain.
#[derive(Clone, Debug)]
pub enum SwitchItem {
    Case(CaseLabel),
    Default,
    Stmt(Stmt),
}

pub type Block = Vec<Stmt>;

#[derive(Clone, Debug)]
pub enum Stmt {
    Compound(Block),
    /// A local variable declaration; the initializer, if any, lives on the
    /// referenced `LocalVarDecl`.
    Decl(Handle<LocalVarDecl>),
    Return(Option<Handle<Expr>>),
    If {
        cond: Handle<Expr>,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Handle<Expr>>,
        inc: Option<Handle<Expr>>,
        body: Block,
    },
    Switch {
        selector: Handle<Expr>,
        items: Vec<SwitchItem>,
    },
    Break,
    /// `discard` / `clip`.
    Kill,
    Attributed {
        attrs: Vec<Attribute>,
        stmt: Box<Stmt>,
    },
    Null,
    Expr(Handle<Expr>),
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub return_type: Type,
    pub return_semantic: Option<Semantic>,
    pub locals: Arena<LocalVarDecl>,
    pub exprs: Arena<Expr>,
    pub body: Block,
}

#[derive(Default, Clone, Debug)]
pub struct TranslationUnit {
    pub structs: Arena<StructDecl>,
    pub functions: Arena<FunctionDecl>,
    pub global_vars: Arena<GlobalVarDecl>,
}

impl TranslationUnit {
    /// Finds a function declaration by name, as the emitter does to locate
    /// the entry point among the translation unit's declarations.
    pub fn find_function(&self, name: &str) -> Option<Handle<FunctionDecl>> {
        self.functions
            .iter()
            .find(|(_, f)| f.name == name)
            .map(|(h, _)| h)
    }
}
