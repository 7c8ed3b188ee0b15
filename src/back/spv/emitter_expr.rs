//! SPIR-V Emitter (§4.7), part 2: expression lowering. See `emitter.rs` for
//! the top-level protocol and statement lowering that drives this half.

use super::emitter::Emitter;
use super::Error;
use crate::arena::Handle;
use crate::ast::{self, BinaryOp, CastKind, Expr, ExprKind, IntrinsicOp, Literal, ScalarKind, Type, UnaryOp};
use crate::diagnostic::{emit_error, DiagnosticSink};

use spirv::Word;

fn is_identity_swizzle(selectors: &[u32]) -> bool {
    selectors.iter().enumerate().all(|(i, &s)| s == i as u32)
}

fn scalar_of(ty: &Type) -> Type {
    match *ty {
        Type::Vector { kind, width, .. } => Type::Scalar { kind, width },
        ref other => other.clone(),
    }
}

fn negate_literal(lit: Literal) -> Option<Literal> {
    match lit {
        Literal::Sint(v) => Some(Literal::Sint(-v)),
        Literal::Float(bits) => Some(Literal::Float((-f64::from_bits(bits)).to_bits())),
        Literal::Uint(_) | Literal::Bool(_) => None,
    }
}

/// Selects the SPIR-V opcode for an HLSL binary operator at a given operand
/// element kind (§4.7 `translate_op` table).
pub(super) fn translate_op(op: BinaryOp, kind: ScalarKind) -> Option<spirv::Op> {
    use spirv::Op::*;
    match op {
        BinaryOp::LogicalAnd => return Some(LogicalAnd),
        BinaryOp::LogicalOr => return Some(LogicalOr),
        BinaryOp::ShiftLeftLogical if kind != ScalarKind::Float => return Some(ShiftLeftLogical),
        BinaryOp::ShiftRightLogical if kind != ScalarKind::Float => return Some(ShiftRightLogical),
        BinaryOp::ShiftRightArithmetic if kind != ScalarKind::Float => return Some(ShiftRightArithmetic),
        _ => {}
    }
    Some(match (op, kind) {
        (BinaryOp::Add, ScalarKind::Sint) | (BinaryOp::Add, ScalarKind::Uint) => IAdd,
        (BinaryOp::Add, ScalarKind::Float) => FAdd,
        (BinaryOp::Subtract, ScalarKind::Sint) | (BinaryOp::Subtract, ScalarKind::Uint) => ISub,
        (BinaryOp::Subtract, ScalarKind::Float) => FSub,
        (BinaryOp::Multiply, ScalarKind::Sint) | (BinaryOp::Multiply, ScalarKind::Uint) => IMul,
        (BinaryOp::Multiply, ScalarKind::Float) => FMul,
        (BinaryOp::Divide, ScalarKind::Sint) => SDiv,
        (BinaryOp::Divide, ScalarKind::Uint) => UDiv,
        (BinaryOp::Divide, ScalarKind::Float) => FDiv,
        (BinaryOp::Modulo, ScalarKind::Sint) => SRem,
        (BinaryOp::Modulo, ScalarKind::Uint) => UMod,
        (BinaryOp::Modulo, ScalarKind::Float) => FRem,
        (BinaryOp::Less, ScalarKind::Sint) => SLessThan,
        (BinaryOp::Less, ScalarKind::Uint) => ULessThan,
        (BinaryOp::Less, ScalarKind::Float) => FOrdLessThan,
        (BinaryOp::LessEqual, ScalarKind::Sint) => SLessThanEqual,
        (BinaryOp::LessEqual, ScalarKind::Uint) => ULessThanEqual,
        (BinaryOp::LessEqual, ScalarKind::Float) => FOrdLessThanEqual,
        (BinaryOp::Greater, ScalarKind::Sint) => SGreaterThan,
        (BinaryOp::Greater, ScalarKind::Uint) => UGreaterThan,
        (BinaryOp::Greater, ScalarKind::Float) => FOrdGreaterThan,
        (BinaryOp::GreaterEqual, ScalarKind::Sint) => SGreaterThanEqual,
        (BinaryOp::GreaterEqual, ScalarKind::Uint) => UGreaterThanEqual,
        (BinaryOp::GreaterEqual, ScalarKind::Float) => FOrdGreaterThanEqual,
        (BinaryOp::Equal, ScalarKind::Sint) | (BinaryOp::Equal, ScalarKind::Uint) => IEqual,
        (BinaryOp::Equal, ScalarKind::Float) => FOrdEqual,
        (BinaryOp::NotEqual, ScalarKind::Sint) | (BinaryOp::NotEqual, ScalarKind::Uint) => INotEqual,
        (BinaryOp::NotEqual, ScalarKind::Float) => FOrdNotEqual,
        (BinaryOp::And, ScalarKind::Sint) | (BinaryOp::And, ScalarKind::Uint) => BitwiseAnd,
        (BinaryOp::InclusiveOr, ScalarKind::Sint) | (BinaryOp::InclusiveOr, ScalarKind::Uint) => BitwiseOr,
        (BinaryOp::ExclusiveOr, ScalarKind::Sint) | (BinaryOp::ExclusiveOr, ScalarKind::Uint) => BitwiseXor,
        _ => return None,
    })
}

impl<'a> Emitter<'a> {
    pub(super) fn expr_ty(&self, handle: Handle<Expr>) -> Type {
        self.tu.functions[self.current_function].exprs[handle].ty.clone()
    }

    fn is_pointer(&self, id: Word) -> bool {
        self.pointer_storage.contains_key(&id)
    }

    /// Lowers `handle` and, if the result is a pointer, loads through it.
    /// The single place the "lvalue vs rvalue" distinction is resolved by
    /// runtime id rather than AST shape.
    pub(super) fn lower_expr_rvalue(&mut self, handle: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Word {
        let id = self.lower_expr(handle, sink);
        if self.is_pointer(id) {
            let ty_id = self.type_id(&self.expr_ty(handle), sink);
            self.builder.create_load(ty_id, id)
        } else {
            id
        }
    }

    /// Folds `handle` to a SPIR-V constant id if it's a compile-time
    /// constant expression (literal, splat-of-literal, or all-constant
    /// initializer list); `None` otherwise.
    pub(super) fn try_fold_constant(&mut self, handle: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Option<Word> {
        let tu = self.tu;
        let expr = tu.functions[self.current_function].exprs[handle].clone();
        match expr.kind {
            ExprKind::Literal(lit) => Some(self.lower_literal(lit, &expr.ty, sink)),
            ExprKind::InitList(ref elems) => {
                let mut ids = Vec::with_capacity(elems.len());
                for &element in elems {
                    ids.push(self.try_fold_constant(element, sink)?);
                }
                let ty_id = self.type_id(&expr.ty, sink);
                Some(self.builder.constant_composite(ty_id, &ids))
            }
            ExprKind::Cast {
                kind: CastKind::HlslVectorSplat,
                expr: inner,
            } => {
                let inner_id = self.try_fold_constant(inner, sink)?;
                let count = expr.ty.vector_len();
                let ty_id = self.type_id(&expr.ty, sink);
                Some(self.builder.constant_composite(ty_id, &vec![inner_id; count as usize]))
            }
            ExprKind::Unary {
                op: UnaryOp::Negate,
                expr: inner,
            } => {
                let inner_expr = tu.functions[self.current_function].exprs[inner].clone();
                match inner_expr.kind {
                    ExprKind::Literal(lit) => {
                        let negated = negate_literal(lit)?;
                        Some(self.lower_literal(negated, &expr.ty, sink))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn lower_literal(&mut self, lit: Literal, ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        match (lit, ty) {
            (Literal::Bool(b), _) => {
                let bool_ty = self.builder.type_bool();
                self.builder.constant_bool(b, bool_ty)
            }
            (Literal::Sint(v), Type::Scalar { width: 4, .. }) => {
                let ty_id = self.builder.type_i32();
                self.builder.constant_i32(v as i32, ty_id)
            }
            (Literal::Uint(v), Type::Scalar { width: 4, .. }) => {
                let ty_id = self.builder.type_u32();
                self.builder.constant_u32(v as u32, ty_id)
            }
            (Literal::Float(bits), Type::Scalar { width: 4, .. }) => {
                let value = f64::from_bits(bits) as f32;
                let ty_id = self.builder.type_f32();
                self.builder.constant_f32(value, ty_id)
            }
            _ => {
                emit_error!(sink, "{}", Error::Unsupported("only 32-bit integer and float literal widths are supported"));
                0
            }
        }
    }

    fn zero_constant(&mut self, ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        self.splat_scalar_constant(ty, Literal::Sint(0), Literal::Uint(0), Literal::Float(0f64.to_bits()), sink)
    }

    fn one_constant(&mut self, ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        self.splat_scalar_constant(ty, Literal::Sint(1), Literal::Uint(1), Literal::Float(1f64.to_bits()), sink)
    }

    fn splat_scalar_constant(
        &mut self,
        ty: &Type,
        sint: Literal,
        uint: Literal,
        float: Literal,
        sink: &mut dyn DiagnosticSink,
    ) -> Word {
        let component = scalar_of(ty);
        let lit = match component.scalar_kind() {
            Some(ScalarKind::Sint) => sint,
            Some(ScalarKind::Uint) => uint,
            Some(ScalarKind::Float) => float,
            _ => float,
        };
        let component_id = self.lower_literal(lit, &component, sink);
        match *ty {
            Type::Vector { size, .. } => {
                let ty_id = self.type_id(ty, sink);
                self.builder.constant_composite(ty_id, &vec![component_id; size.count() as usize])
            }
            _ => component_id,
        }
    }

    /// Condenses a (possibly nested) swizzle chain into its ultimate base
    /// expression and a single composed selector list (`v.xyzw.zx == v.zx`).
    fn condense_swizzle(&self, base: Handle<Expr>, selectors: &[u32]) -> (Handle<Expr>, Vec<u32>) {
        let expr = &self.tu.functions[self.current_function].exprs[base];
        if let ExprKind::Swizzle {
            base: inner_base,
            selectors: inner_selectors,
        } = &expr.kind
        {
            let composed: Vec<u32> = selectors.iter().map(|&s| inner_selectors[s as usize]).collect();
            self.condense_swizzle(*inner_base, &composed)
        } else {
            (base, selectors.to_vec())
        }
    }

    fn lower_swizzle(&mut self, base: Handle<Expr>, selectors: &[u32], result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let (base, selectors) = self.condense_swizzle(base, selectors);
        let base_ty = self.expr_ty(base);
        let base_len = base_ty.vector_len();
        let result_ty_id = self.type_id(result_ty, sink);

        if selectors.len() == 1 && base_len == 1 {
            return self.lower_expr(base, sink);
        }
        if selectors.len() as u32 == base_len && is_identity_swizzle(&selectors) {
            return self.lower_expr(base, sink);
        }
        if selectors.len() == 1 {
            let base_id = self.lower_expr(base, sink);
            if let Some(&class) = self.pointer_storage.get(&base_id) {
                let component_ty_id = self.type_id(&scalar_of(&base_ty), sink);
                let ptr_ty = self.builder.type_pointer(component_ty_id, class);
                let idx_ty = self.builder.type_u32();
                let idx_const = self.builder.constant_u32(selectors[0], idx_ty);
                let ptr = self.builder.create_access_chain(ptr_ty, base_id, &[idx_const]);
                self.pointer_storage.insert(ptr, class);
                return ptr;
            }
            return self.builder.create_composite_extract(result_ty_id, base_id, &[selectors[0]]);
        }
        if base_len == 1 {
            let base_value = self.lower_expr_rvalue(base, sink);
            let constituents = vec![base_value; selectors.len()];
            return self.builder.create_composite_construct(result_ty_id, &constituents);
        }
        let base_value = self.lower_expr_rvalue(base, sink);
        self.builder.create_vector_shuffle(result_ty_id, base_value, base_value, &selectors)
    }

    fn lower_swizzle_assign(
        &mut self,
        base: Handle<Expr>,
        selectors: &[u32],
        rhs_value: Word,
        sink: &mut dyn DiagnosticSink,
    ) -> Word {
        let (base, selectors) = self.condense_swizzle(base, selectors);
        let base_ty = self.expr_ty(base);
        let base_len = base_ty.vector_len();
        let base_ptr = self.lower_expr(base, sink);
        let class = match self.pointer_storage.get(&base_ptr).copied() {
            Some(class) => class,
            None => {
                emit_error!(sink, "{}", Error::Unsupported("swizzle assignment target is not addressable"));
                return rhs_value;
            }
        };

        if selectors.len() == 1 {
            let component_ty_id = self.type_id(&scalar_of(&base_ty), sink);
            let ptr_ty = self.builder.type_pointer(component_ty_id, class);
            let idx_ty = self.builder.type_u32();
            let idx_const = self.builder.constant_u32(selectors[0], idx_ty);
            let elem_ptr = self.builder.create_access_chain(ptr_ty, base_ptr, &[idx_const]);
            self.builder.create_store(elem_ptr, rhs_value);
            return rhs_value;
        }
        if selectors.len() as u32 == base_len && is_identity_swizzle(&selectors) {
            self.builder.create_store(base_ptr, rhs_value);
            return rhs_value;
        }

        let base_ty_id = self.type_id(&base_ty, sink);
        let loaded_base = self.builder.create_load(base_ty_id, base_ptr);
        let mut merged: Vec<u32> = (0..base_len).collect();
        for (i, &selector) in selectors.iter().enumerate() {
            merged[selector as usize] = base_len + i as u32;
        }
        let shuffled = self.builder.create_vector_shuffle(base_ty_id, loaded_base, rhs_value, &merged);
        self.builder.create_store(base_ptr, shuffled);
        rhs_value
    }

    fn lower_assign(&mut self, lhs: Handle<Expr>, rhs: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Word {
        let rhs_value = self.lower_expr_rvalue(rhs, sink);
        let lhs_kind = self.tu.functions[self.current_function].exprs[lhs].kind.clone();
        match lhs_kind {
            ExprKind::Swizzle { base, selectors } => self.lower_swizzle_assign(base, &selectors, rhs_value, sink),
            _ => {
                let lhs_ptr = self.lower_expr(lhs, sink);
                self.builder.create_store(lhs_ptr, rhs_value);
                rhs_value
            }
        }
    }

    fn lower_compound_assign(&mut self, op: BinaryOp, lhs: Handle<Expr>, rhs: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Word {
        let rhs_value = self.lower_expr_rvalue(rhs, sink);
        let lhs_kind = self.tu.functions[self.current_function].exprs[lhs].kind.clone();
        if let ExprKind::Swizzle { base, selectors } = lhs_kind {
            let (_, selectors) = self.condense_swizzle(base, &selectors);
            let base_len = self.expr_ty(base).vector_len();
            let is_simple = selectors.len() == 1 || (selectors.len() as u32 == base_len && is_identity_swizzle(&selectors));
            if !is_simple {
                emit_error!(
                    sink,
                    "{}",
                    Error::Unsupported("compound assignment through a non-identity swizzle is not supported")
                );
                return rhs_value;
            }
        }

        let lhs_ptr = self.lower_expr(lhs, sink);
        let lhs_ty = self.expr_ty(lhs);
        let ty_id = self.type_id(&lhs_ty, sink);
        let lhs_value = self.builder.create_load(ty_id, lhs_ptr);
        let kind = lhs_ty.scalar_kind().unwrap_or(ScalarKind::Float);
        match translate_op(op, kind) {
            Some(spv_op) => {
                let computed = self.builder.create_binary_op(spv_op, ty_id, lhs_value, rhs_value);
                self.builder.create_store(lhs_ptr, computed);
            }
            None => emit_error!(sink, "{}", Error::Unsupported("compound assignment operator/kind combination")),
        }
        lhs_ptr
    }

    fn lower_binary(&mut self, op: BinaryOp, lhs: Handle<Expr>, rhs: Handle<Expr>, result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let lhs_id = self.lower_expr_rvalue(lhs, sink);
        let rhs_id = self.lower_expr_rvalue(rhs, sink);
        let lhs_ty = self.expr_ty(lhs);
        let rhs_ty = self.expr_ty(rhs);

        if matches!(lhs_ty, Type::Matrix { .. }) || matches!(rhs_ty, Type::Matrix { .. }) {
            return self.lower_matrix_binary(op, lhs_id, rhs_id, &lhs_ty, &rhs_ty, result_ty, sink);
        }

        let result_ty_id = self.type_id(result_ty, sink);

        if op == BinaryOp::Multiply {
            let lhs_is_float_vector = matches!(lhs_ty, Type::Vector { kind: ScalarKind::Float, .. });
            let rhs_is_float_scalar = matches!(rhs_ty, Type::Scalar { kind: ScalarKind::Float, .. });
            if lhs_is_float_vector && rhs_is_float_scalar {
                return self.builder.create_vector_times_scalar(result_ty_id, lhs_id, rhs_id);
            }
            let rhs_is_float_vector = matches!(rhs_ty, Type::Vector { kind: ScalarKind::Float, .. });
            let lhs_is_float_scalar = matches!(lhs_ty, Type::Scalar { kind: ScalarKind::Float, .. });
            if rhs_is_float_vector && lhs_is_float_scalar {
                return self.builder.create_vector_times_scalar(result_ty_id, rhs_id, lhs_id);
            }
        }

        let kind = lhs_ty.scalar_kind().unwrap_or_else(|| rhs_ty.scalar_kind().unwrap_or(ScalarKind::Float));
        match translate_op(op, kind) {
            Some(spv_op) => self.builder.create_binary_op(spv_op, result_ty_id, lhs_id, rhs_id),
            None => {
                emit_error!(sink, "{}", Error::Unsupported("binary operator/operand-kind combination"));
                0
            }
        }
    }

    /// `processEachVectorInMatrix` (§9): HLSL's matrix `+`/`-`/`*`/etc. are
    /// component-wise, not a linear-algebra `mul()`, so neither operand ever
    /// reaches `OpFAdd`/`OpFMul` directly — there's no scalar/vector opcode
    /// that takes an `OpTypeMatrix` operand. Extracts each column of the
    /// matrix operand(s), applies the op column-by-column against the other
    /// operand's matching column (or splats a scalar/vector operand across
    /// every column), and reconstructs the result matrix from the columns.
    fn lower_matrix_binary(
        &mut self,
        op: BinaryOp,
        lhs_id: Word,
        rhs_id: Word,
        lhs_ty: &Type,
        rhs_ty: &Type,
        result_ty: &Type,
        sink: &mut dyn DiagnosticSink,
    ) -> Word {
        let (rows, cols, width) = match *result_ty {
            Type::Matrix { rows, cols, width } => (rows, cols, width),
            _ => {
                emit_error!(sink, "{}", Error::Unsupported("matrix binary operator result is not a matrix type"));
                return 0;
            }
        };
        let column_ty = Type::Vector {
            size: rows,
            kind: ScalarKind::Float,
            width,
        };
        let column_ty_id = self.type_id(&column_ty, sink);
        let result_ty_id = self.type_id(result_ty, sink);
        let lhs_is_matrix = matches!(lhs_ty, Type::Matrix { .. });
        let rhs_is_matrix = matches!(rhs_ty, Type::Matrix { .. });

        let mut columns = Vec::with_capacity(cols.count() as usize);
        for i in 0..cols.count() {
            let lhs_col = if lhs_is_matrix {
                self.builder.create_composite_extract(column_ty_id, lhs_id, &[i])
            } else {
                lhs_id
            };
            let rhs_col = if rhs_is_matrix {
                self.builder.create_composite_extract(column_ty_id, rhs_id, &[i])
            } else {
                rhs_id
            };
            columns.push(self.lower_matrix_column_op(op, lhs_col, rhs_col, lhs_is_matrix, rhs_is_matrix, column_ty_id, rows, sink));
        }
        self.builder.create_composite_construct(result_ty_id, &columns)
    }

    /// Applies `op` to a single pair of matrix columns (or a column and a
    /// scalar/vector operand broadcast to every column by the caller's loop).
    /// `Multiply` against a non-matrix operand uses `OpVectorTimesScalar`,
    /// same as the ordinary vector path; everything else splats the
    /// non-vector side to a vector of matching width and falls back to the
    /// float opcode table.
    fn lower_matrix_column_op(
        &mut self,
        op: BinaryOp,
        lhs_col: Word,
        rhs_col: Word,
        lhs_is_vector: bool,
        rhs_is_vector: bool,
        column_ty_id: Word,
        rows: ast::VectorSize,
        sink: &mut dyn DiagnosticSink,
    ) -> Word {
        if op == BinaryOp::Multiply && (!lhs_is_vector || !rhs_is_vector) {
            let (vector, scalar) = if lhs_is_vector { (lhs_col, rhs_col) } else { (rhs_col, lhs_col) };
            return self.builder.create_vector_times_scalar(column_ty_id, vector, scalar);
        }
        let lhs_vec = if lhs_is_vector {
            lhs_col
        } else {
            self.builder
                .create_composite_construct(column_ty_id, &vec![lhs_col; rows.count() as usize])
        };
        let rhs_vec = if rhs_is_vector {
            rhs_col
        } else {
            self.builder
                .create_composite_construct(column_ty_id, &vec![rhs_col; rows.count() as usize])
        };
        match translate_op(op, ScalarKind::Float) {
            Some(spv_op) => self.builder.create_binary_op(spv_op, column_ty_id, lhs_vec, rhs_vec),
            None => {
                emit_error!(sink, "{}", Error::Unsupported("matrix binary operator/operand-kind combination"));
                0
            }
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, inner: Handle<Expr>, result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        match op {
            UnaryOp::Plus => self.lower_expr(inner, sink),
            UnaryOp::LogicalNot => {
                let value = self.lower_expr_rvalue(inner, sink);
                let inner_ty = self.expr_ty(inner);
                let bool_value = self.cast_to_bool(value, &inner_ty, sink);
                let bool_ty_id = self.type_id(result_ty, sink);
                self.builder.create_unary_op(spirv::Op::LogicalNot, bool_ty_id, bool_value)
            }
            UnaryOp::BitwiseNot => {
                let value = self.lower_expr_rvalue(inner, sink);
                let ty_id = self.type_id(result_ty, sink);
                self.builder.create_unary_op(spirv::Op::Not, ty_id, value)
            }
            UnaryOp::Negate => {
                let value = self.lower_expr_rvalue(inner, sink);
                let ty_id = self.type_id(result_ty, sink);
                let op = if result_ty.is_float() { spirv::Op::FNegate } else { spirv::Op::SNegate };
                self.builder.create_unary_op(op, ty_id, value)
            }
        }
    }

    fn lower_inc_dec(&mut self, increment: bool, postfix: bool, inner: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Word {
        let ptr = self.lower_expr(inner, sink);
        let ty = self.expr_ty(inner);
        let ty_id = self.type_id(&ty, sink);
        let loaded = self.builder.create_load(ty_id, ptr);
        let one = self.one_constant(&ty, sink);
        let kind = ty.scalar_kind().unwrap_or(ScalarKind::Float);
        let op = if increment {
            translate_op(BinaryOp::Add, kind)
        } else {
            translate_op(BinaryOp::Subtract, kind)
        };
        let computed = match op {
            Some(spv_op) => self.builder.create_binary_op(spv_op, ty_id, loaded, one),
            None => {
                emit_error!(sink, "{}", Error::Unsupported("increment/decrement operand kind"));
                loaded
            }
        };
        self.builder.create_store(ptr, computed);
        if postfix {
            loaded
        } else {
            ptr
        }
    }

    fn lower_conditional(&mut self, cond: Handle<Expr>, then_expr: Handle<Expr>, else_expr: Handle<Expr>, result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        // Both arms are evaluated unconditionally; short-circuiting is not
        // modeled, matching HLSL's `?:` semantics.
        let cond_id = self.lower_expr_rvalue(cond, sink);
        let then_id = self.lower_expr_rvalue(then_expr, sink);
        let else_id = self.lower_expr_rvalue(else_expr, sink);
        let ty_id = self.type_id(result_ty, sink);
        self.builder.create_select(ty_id, cond_id, then_id, else_id)
    }

    fn lower_call(&mut self, callee: Handle<ast::FunctionDecl>, args: &[Handle<Expr>], result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let fn_id = self.ensure_function_id(callee);
        let tu = self.tu;
        let param_types: Vec<Type> = tu.functions[callee].params.iter().map(|p| p.ty.clone()).collect();

        let mut arg_ptrs = Vec::with_capacity(args.len());
        for (index, &arg) in args.iter().enumerate() {
            let value = self.lower_expr_rvalue(arg, sink);
            let param_ty = param_types.get(index).cloned().unwrap_or_else(|| self.expr_ty(arg));
            let ty_id = self.type_id(&param_ty, sink);
            let ptr_ty = self.builder.type_pointer(ty_id, spirv::StorageClass::Function);
            let ptr = self.builder.add_fn_variable(ptr_ty, None, None);
            self.pointer_storage.insert(ptr, spirv::StorageClass::Function);
            self.builder.create_store(ptr, value);
            arg_ptrs.push(ptr);
        }

        let ret_ty_id = self.type_id(result_ty, sink);
        self.builder.create_function_call(ret_ty_id, fn_id, &arg_ptrs)
    }

    fn lower_intrinsic(&mut self, op: IntrinsicOp, args: &[Handle<Expr>], result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        match op {
            IntrinsicOp::Dot => self.lower_dot(args[0], args[1], result_ty, sink),
            IntrinsicOp::All | IntrinsicOp::Any => {
                let value = self.lower_expr_rvalue(args[0], sink);
                let arg_ty = self.expr_ty(args[0]);
                let bool_value = self.cast_to_bool(value, &arg_ty, sink);
                if arg_ty.vector_len() == 1 {
                    bool_value
                } else {
                    let bool_ty = self.builder.type_bool();
                    let spv_op = if op == IntrinsicOp::All { spirv::Op::All } else { spirv::Op::Any };
                    self.builder.create_unary_op(spv_op, bool_ty, bool_value)
                }
            }
            IntrinsicOp::AsFloat | IntrinsicOp::AsInt | IntrinsicOp::AsUint => {
                let arg_ty = self.expr_ty(args[0]);
                if matches!(arg_ty, Type::Matrix { .. }) {
                    emit_error!(sink, "{}", Error::Unsupported("matrix argument to asfloat/asint/asuint"));
                    return 0;
                }
                let value = self.lower_expr_rvalue(args[0], sink);
                if arg_ty == *result_ty {
                    return value;
                }
                let ty_id = self.type_id(result_ty, sink);
                self.builder.create_unary_op(spirv::Op::Bitcast, ty_id, value)
            }
        }
    }

    fn lower_dot(&mut self, a_handle: Handle<Expr>, b_handle: Handle<Expr>, result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let a = self.lower_expr_rvalue(a_handle, sink);
        let b = self.lower_expr_rvalue(b_handle, sink);
        let a_ty = self.expr_ty(a_handle);
        let count = a_ty.vector_len();
        let result_ty_id = self.type_id(result_ty, sink);

        if count == 1 {
            let kind = a_ty.scalar_kind().unwrap_or(ScalarKind::Float);
            return match translate_op(BinaryOp::Multiply, kind) {
                Some(spv_op) => self.builder.create_binary_op(spv_op, result_ty_id, a, b),
                None => 0,
            };
        }
        if a_ty.is_float() {
            return self.builder.create_binary_op(spirv::Op::Dot, result_ty_id, a, b);
        }

        let scalar_ty = scalar_of(&a_ty);
        let scalar_ty_id = self.type_id(&scalar_ty, sink);
        let kind = scalar_ty.scalar_kind().unwrap_or(ScalarKind::Sint);
        let mul_op = translate_op(BinaryOp::Multiply, kind).unwrap_or(spirv::Op::IMul);
        let add_op = translate_op(BinaryOp::Add, kind).unwrap_or(spirv::Op::IAdd);
        let mut accumulator = None;
        for i in 0..count {
            let a_i = self.builder.create_composite_extract(scalar_ty_id, a, &[i]);
            let b_i = self.builder.create_composite_extract(scalar_ty_id, b, &[i]);
            let product = self.builder.create_binary_op(mul_op, scalar_ty_id, a_i, b_i);
            accumulator = Some(match accumulator {
                Some(previous) => self.builder.create_binary_op(add_op, scalar_ty_id, previous, product),
                None => product,
            });
        }
        accumulator.unwrap_or(0)
    }

    fn cast_to_bool(&mut self, value: Word, src_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        if src_ty.is_bool() {
            return value;
        }
        let zero = self.zero_constant(src_ty, sink);
        let kind = src_ty.scalar_kind().unwrap_or(ScalarKind::Float);
        let op = match kind {
            ScalarKind::Sint | ScalarKind::Uint => spirv::Op::INotEqual,
            _ => spirv::Op::FOrdNotEqual,
        };
        let bool_ty = match *src_ty {
            Type::Vector { size, .. } => {
                let bool_scalar = self.builder.type_bool();
                self.builder.type_vector(bool_scalar, size.count())
            }
            _ => self.builder.type_bool(),
        };
        self.builder.create_binary_op(op, bool_ty, value, zero)
    }

    fn cast_to_int(&mut self, value: Word, src_ty: &Type, target_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let target_ty_id = self.type_id(target_ty, sink);
        if src_ty.is_bool() {
            let one = self.one_constant(target_ty, sink);
            let zero = self.zero_constant(target_ty, sink);
            return self.builder.create_select(target_ty_id, value, one, zero);
        }
        match src_ty.scalar_kind() {
            Some(ScalarKind::Sint) | Some(ScalarKind::Uint) => {
                if src_ty.scalar_kind() == target_ty.scalar_kind() {
                    value
                } else {
                    self.builder.create_unary_op(spirv::Op::Bitcast, target_ty_id, value)
                }
            }
            Some(ScalarKind::Float) => {
                let op = if target_ty.scalar_kind() == Some(ScalarKind::Sint) {
                    spirv::Op::ConvertFToS
                } else {
                    spirv::Op::ConvertFToU
                };
                self.builder.create_unary_op(op, target_ty_id, value)
            }
            _ => {
                emit_error!(sink, "{}", Error::Unsupported("cast_to_int source kind"));
                0
            }
        }
    }

    fn cast_to_float(&mut self, value: Word, src_ty: &Type, target_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let target_ty_id = self.type_id(target_ty, sink);
        if src_ty.is_bool() {
            let one = self.one_constant(target_ty, sink);
            let zero = self.zero_constant(target_ty, sink);
            return self.builder.create_select(target_ty_id, value, one, zero);
        }
        match src_ty.scalar_kind() {
            Some(ScalarKind::Sint) => self.builder.create_unary_op(spirv::Op::ConvertSToF, target_ty_id, value),
            Some(ScalarKind::Uint) => self.builder.create_unary_op(spirv::Op::ConvertUToF, target_ty_id, value),
            Some(ScalarKind::Float) => value,
            _ => {
                emit_error!(sink, "{}", Error::Unsupported("cast_to_float source kind"));
                0
            }
        }
    }

    fn lower_cast(&mut self, kind: CastKind, inner: Handle<Expr>, target_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        match kind {
            CastKind::LValueToRValue => {
                let inner_id = self.lower_expr(inner, sink);
                if self.is_pointer(inner_id) {
                    let ty_id = self.type_id(target_ty, sink);
                    self.builder.create_load(ty_id, inner_id)
                } else {
                    inner_id
                }
            }
            CastKind::NoOp
            | CastKind::FunctionToPointerDecay
            | CastKind::HlslVectorToScalar
            | CastKind::HlslVectorToMatrix
            | CastKind::HlslMatrixToScalar
            | CastKind::HlslMatrixToVector => self.lower_expr_rvalue(inner, sink),
            CastKind::IntegralCast | CastKind::FloatingToIntegral => {
                if let Some(id) = self.try_fold_constant(inner, sink) {
                    return id;
                }
                let src_ty = self.expr_ty(inner);
                let value = self.lower_expr_rvalue(inner, sink);
                self.cast_to_int(value, &src_ty, target_ty, sink)
            }
            CastKind::FloatingCast | CastKind::IntegralToFloating => {
                if let Some(id) = self.try_fold_constant(inner, sink) {
                    return id;
                }
                let src_ty = self.expr_ty(inner);
                let value = self.lower_expr_rvalue(inner, sink);
                self.cast_to_float(value, &src_ty, target_ty, sink)
            }
            CastKind::IntegralToBoolean | CastKind::FloatingToBoolean => {
                let src_ty = self.expr_ty(inner);
                let value = self.lower_expr_rvalue(inner, sink);
                self.cast_to_bool(value, &src_ty, sink)
            }
            CastKind::HlslVectorSplat => {
                if let Some(id) = self.try_fold_constant(inner, sink) {
                    return id;
                }
                let value = self.lower_expr_rvalue(inner, sink);
                let count = target_ty.vector_len();
                let ty_id = self.type_id(target_ty, sink);
                self.builder.create_composite_construct(ty_id, &vec![value; count as usize])
            }
            CastKind::HlslVectorTruncation => {
                let src_ty = self.expr_ty(inner);
                let value = self.lower_expr_rvalue(inner, sink);
                let target_len = target_ty.vector_len();
                let component_ty_id = self.type_id(&scalar_of(&src_ty), sink);
                if target_len == 1 {
                    self.builder.create_composite_extract(component_ty_id, value, &[0])
                } else {
                    let mut parts = Vec::with_capacity(target_len as usize);
                    for i in 0..target_len {
                        parts.push(self.builder.create_composite_extract(component_ty_id, value, &[i]));
                    }
                    let ty_id = self.type_id(target_ty, sink);
                    self.builder.create_composite_construct(ty_id, &parts)
                }
            }
            CastKind::HlslMatrixSplat => {
                let value = self.lower_expr_rvalue(inner, sink);
                if let Type::Matrix { rows, cols, width } = *target_ty {
                    let column_ty = Type::Vector {
                        size: rows,
                        kind: ScalarKind::Float,
                        width,
                    };
                    let column_ty_id = self.type_id(&column_ty, sink);
                    let column = self
                        .builder
                        .create_composite_construct(column_ty_id, &vec![value; rows.count() as usize]);
                    let matrix_ty_id = self.type_id(target_ty, sink);
                    self.builder
                        .create_composite_construct(matrix_ty_id, &vec![column; cols.count() as usize])
                } else {
                    emit_error!(sink, "{}", Error::Internal("matrix splat target is not a matrix type".into()));
                    0
                }
            }
            CastKind::Other => {
                emit_error!(sink, "{}", Error::Unsupported("cast kind"));
                0
            }
        }
    }

    fn lower_init_list(&mut self, elems: &[Handle<Expr>], result_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        let ty_id = self.type_id(result_ty, sink);
        // A one-initializer list assigned to a vector target (`float4(1)`)
        // splats the sole value to every lane, type-converting it to the
        // target's element kind first if needed.
        if elems.len() == 1 {
            if let Type::Vector { size, .. } = *result_ty {
                let value = self.lower_expr_rvalue(elems[0], sink);
                let src_ty = self.expr_ty(elems[0]);
                let element_ty = scalar_of(result_ty);
                let converted = self.convert_scalar(value, &src_ty, &element_ty, sink);
                let constituents = vec![converted; size.count() as usize];
                return self.builder.create_composite_construct(ty_id, &constituents);
            }
        }
        let mut constituents = Vec::with_capacity(elems.len());
        for &elem in elems {
            constituents.push(self.lower_expr_rvalue(elem, sink));
        }
        self.builder.create_composite_construct(ty_id, &constituents)
    }

    /// Type-converts a single scalar value to `target_ty`'s element kind,
    /// per the same bool/int/float conversion rules `lower_cast` uses.
    /// No-op if the kinds already match.
    fn convert_scalar(&mut self, value: Word, src_ty: &Type, target_ty: &Type, sink: &mut dyn DiagnosticSink) -> Word {
        if src_ty.scalar_kind() == target_ty.scalar_kind() {
            return value;
        }
        match target_ty.scalar_kind() {
            Some(ScalarKind::Bool) => self.cast_to_bool(value, src_ty, sink),
            Some(ScalarKind::Sint) | Some(ScalarKind::Uint) => self.cast_to_int(value, src_ty, target_ty, sink),
            Some(ScalarKind::Float) => self.cast_to_float(value, src_ty, target_ty, sink),
            None => value,
        }
    }

    /// The central expression-lowering dispatch. Returns a pointer id for
    /// `DeclRef`/`Member`/single-lane-or-identity `Swizzle` on an lvalue
    /// base, a value id otherwise; callers that need a value unconditionally
    /// should go through `lower_expr_rvalue`.
    pub(super) fn lower_expr(&mut self, handle: Handle<Expr>, sink: &mut dyn DiagnosticSink) -> Word {
        let tu = self.tu;
        let expr = tu.functions[self.current_function].exprs[handle].clone();
        match expr.kind {
            ExprKind::DeclRef(decl) => {
                let id = self.mapper.get(decl);
                if id == 0 {
                    emit_error!(sink, "{}", Error::InvalidAst("unresolved declaration reference".into()));
                }
                id
            }
            ExprKind::Member { base, field_index } => {
                let base_id = self.lower_expr(base, sink);
                let ty_id = self.type_id(&expr.ty, sink);
                match self.pointer_storage.get(&base_id).copied() {
                    Some(class) => {
                        let ptr_ty = self.builder.type_pointer(ty_id, class);
                        let idx_ty = self.builder.type_u32();
                        let idx_const = self.builder.constant_u32(field_index, idx_ty);
                        let ptr = self.builder.create_access_chain(ptr_ty, base_id, &[idx_const]);
                        self.pointer_storage.insert(ptr, class);
                        ptr
                    }
                    None => self.builder.create_composite_extract(ty_id, base_id, &[field_index]),
                }
            }
            ExprKind::Swizzle { base, selectors } => self.lower_swizzle(base, &selectors, &expr.ty, sink),
            ExprKind::Literal(lit) => self.lower_literal(lit, &expr.ty, sink),
            ExprKind::InitList(elems) => self.lower_init_list(&elems, &expr.ty, sink),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(op, lhs, rhs, &expr.ty, sink),
            ExprKind::Assign { lhs, rhs } => self.lower_assign(lhs, rhs, sink),
            ExprKind::CompoundAssign { op, lhs, rhs } => self.lower_compound_assign(op, lhs, rhs, sink),
            ExprKind::Unary { op, expr: inner } => self.lower_unary(op, inner, &expr.ty, sink),
            ExprKind::PreIncDec { increment, expr: inner } => self.lower_inc_dec(increment, false, inner, sink),
            ExprKind::PostIncDec { increment, expr: inner } => self.lower_inc_dec(increment, true, inner, sink),
            ExprKind::Conditional { cond, then_expr, else_expr } => self.lower_conditional(cond, then_expr, else_expr, &expr.ty, sink),
            ExprKind::Call { callee, args } => self.lower_call(callee, &args, &expr.ty, sink),
            ExprKind::Intrinsic { op, args } => self.lower_intrinsic(op, &args, &expr.ty, sink),
            ExprKind::Cast { kind, expr: inner } => self.lower_cast(kind, inner, &expr.ty, sink),
        }
    }
}
