/*! HLSL → SPIR-V code generation backend.

Wires the Module Builder (§4.4), Type Translator (§4.5), Declaration-Id
Mapper (§4.6) and Emitter (§4.7) together behind a single [`translate`]
entry point.
!*/

mod builder;
mod context;
mod declmap;
mod emitter;
mod emitter_expr;
mod helpers;
mod instructions;
mod layout;
mod types;

use crate::ast;
use crate::diagnostic::DiagnosticSink;

use thiserror::Error;

/// Error taxonomy (§7). Every variant is surfaced through the diagnostic
/// sink before `translate` returns it; callers that only care about the
/// sink's accumulated messages can ignore the `Err` payload.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The profile string does not begin with a recognized shader-stage
    /// character (`v`, `h`, `d`, `g`, `p`, `c`).
    #[error("unknown target profile {0:?}")]
    UnknownProfile(String),
    /// A node shape the core does not yet implement.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
    /// The AST contains a reference that should have been resolved upstream.
    #[error("invalid AST: {0}")]
    InvalidAst(String),
    /// An internal invariant was violated (not an AST-shape problem).
    #[error("internal error: {0}")]
    Internal(String),
}

bitflags::bitflags! {
    /// Configuration flags for the writer.
    pub struct WriterFlags: u32 {
        /// Emit `OpName`/`OpMemberName` debug instructions.
        const DEBUG = 0x1;
    }
}

impl Default for WriterFlags {
    fn default() -> Self {
        let mut flags = WriterFlags::empty();
        if cfg!(debug_assertions) {
            flags |= WriterFlags::DEBUG;
        }
        flags
    }
}

/// Code-generation options bundle: which declaration is the entry point,
/// which shader-stage profile to target, and ambient writer behavior.
#[derive(Debug, Clone)]
pub struct Options {
    /// (Major, Minor) target version of the SPIR-V, e.g. `(1, 0)`.
    pub lang_version: (u8, u8),
    /// Name of the entry-point function within the translation unit.
    pub entry_point: String,
    /// HLSL target profile string, e.g. `"ps_5_0"`. Only the first
    /// character is significant for execution-model selection.
    pub profile: String,
    pub flags: WriterFlags,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            lang_version: (1, 0),
            entry_point: "main".to_string(),
            profile: "ps_5_0".to_string(),
            flags: WriterFlags::default(),
        }
    }
}

/// Lowers `tu` to a SPIR-V module, reporting diagnostics to `sink`.
///
/// Per the error propagation policy (§7), lowering does not abort eagerly
/// on a recoverable error: it keeps going so the sink accumulates as many
/// diagnostics as possible in one pass. The caller must check
/// `sink.had_error()` (or equivalent) and discard the returned words if it
/// reports true, even though this function itself returned `Ok`.
pub fn translate(
    tu: &ast::TranslationUnit,
    options: &Options,
    sink: &mut impl DiagnosticSink,
) -> Result<Vec<u32>, Error> {
    emitter::Emitter::new(tu, options).run(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::VecDiagnosticSink;

    #[test]
    fn empty_void_entry_point_produces_a_valid_header() {
        let mut tu = ast::TranslationUnit::default();
        tu.functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: Vec::new(),
            return_type: ast::Type::Void,
            return_semantic: None,
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });
        let options = Options {
            profile: "ps_5_0".to_string(),
            ..Options::default()
        };
        let mut sink = VecDiagnosticSink::new();
        let words = translate(&tu, &options, &mut sink).expect("translation should succeed");
        assert!(!sink.had_error(), "unexpected diagnostics: {:?}", sink.errors);
        assert_eq!(words[0], 0x0723_0203);
    }

    #[test]
    fn unknown_profile_is_reported_and_returned() {
        let tu = ast::TranslationUnit::default();
        let options = Options {
            profile: "xx_5_0".to_string(),
            ..Options::default()
        };
        let mut sink = VecDiagnosticSink::new();
        let result = translate(&tu, &options, &mut sink);
        assert!(matches!(result, Err(Error::UnknownProfile(_))));
        assert!(sink.had_error());
    }

    /// Splits a word stream into `(opcode, rest-of-instruction-words)` pairs,
    /// skipping the 5-word physical header. Scenario tests below only assert
    /// presence and relative order, not exact operand encodings.
    fn decode_ops(words: &[u32]) -> Vec<(u32, &[u32])> {
        let mut ops = Vec::new();
        let mut i = 5;
        while i < words.len() {
            let wc = (words[i] >> 16) as usize;
            let op = words[i] & 0xffff;
            ops.push((op, &words[i + 1..i + wc]));
            i += wc;
        }
        ops
    }

    fn find_op(ops: &[(u32, &[u32])], op: spirv::Op, from: usize) -> Option<usize> {
        ops.iter().skip(from).position(|&(o, _)| o == op as u32).map(|i| i + from)
    }

    fn f32_ty() -> ast::Type {
        ast::Type::Scalar {
            kind: ast::ScalarKind::Float,
            width: 4,
        }
    }

    fn float4_ty() -> ast::Type {
        ast::Type::Vector {
            size: ast::VectorSize::Quad,
            kind: ast::ScalarKind::Float,
            width: 4,
        }
    }

    fn int_ty() -> ast::Type {
        ast::Type::Scalar {
            kind: ast::ScalarKind::Sint,
            width: 4,
        }
    }

    fn int4_ty() -> ast::Type {
        ast::Type::Vector {
            size: ast::VectorSize::Quad,
            kind: ast::ScalarKind::Sint,
            width: 4,
        }
    }

    fn translate_ok(tu: &ast::TranslationUnit) -> Vec<u32> {
        let options = Options::default();
        let mut sink = VecDiagnosticSink::new();
        let words = translate(tu, &options, &mut sink).expect("translation should succeed");
        assert!(!sink.had_error(), "unexpected diagnostics: {:?}", sink.errors);
        words
    }

    /// S1: `float4 main(float4 a : A) : SV_Target { return a; }`
    #[test]
    fn s1_pass_through_fragment() {
        let mut tu = ast::TranslationUnit::default();
        let mut exprs = crate::arena::Arena::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: vec![ast::ParamDecl {
                name: "a".to_string(),
                ty: float4_ty(),
                semantic: Some(ast::Semantic("A".to_string())),
                direction: ast::Direction::In,
            }],
            return_type: float4_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });
        let a_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: float4_ty(),
        });
        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![ast::Stmt::Return(Some(a_ref))];
        tu.functions = functions;

        let words = translate_ok(&tu);
        assert_eq!(words[0], 0x0723_0203);
        let ops = decode_ops(&words);

        let cap = find_op(&ops, spirv::Op::Capability, 0).expect("OpCapability");
        assert_eq!(ops[cap].1, &[spirv::Capability::Shader as u32]);
        let entry = find_op(&ops, spirv::Op::EntryPoint, cap).expect("OpEntryPoint");
        assert_eq!(ops[entry].1[0], spirv::ExecutionModel::Fragment as u32);
        let mode = find_op(&ops, spirv::Op::ExecutionMode, entry).expect("OpExecutionMode");
        assert_eq!(ops[mode].1[1], spirv::ExecutionMode::OriginUpperLeft as u32);

        // Two stage variables (Input `a`, Output return value), each
        // decorated Location 0.
        let var1 = find_op(&ops, spirv::Op::Variable, 0).expect("first OpVariable");
        let var2 = find_op(&ops, spirv::Op::Variable, var1 + 1).expect("second OpVariable");
        let decorations: Vec<_> = ops.iter().filter(|&&(op, _)| op == spirv::Op::Decorate as u32).collect();
        assert_eq!(decorations.len(), 2);
        for &&(_, operands) in &decorations {
            assert_eq!(operands[1], spirv::Decoration::Location as u32);
            assert_eq!(operands[2], 0);
        }
        let _ = var2;

        let load = find_op(&ops, spirv::Op::Load, mode).expect("OpLoad");
        let store = find_op(&ops, spirv::Op::Store, load).expect("OpStore");
        let ret = find_op(&ops, spirv::Op::Return, store).expect("OpReturn");
        assert!(load < store && store < ret);
    }

    /// S2: `float4 main(float4 v : V) : SV_Target { v.yz = float2(1,2); return v; }`
    #[test]
    fn s2_swizzle_write() {
        let mut tu = ast::TranslationUnit::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: vec![ast::ParamDecl {
                name: "v".to_string(),
                ty: float4_ty(),
                semantic: Some(ast::Semantic("V".to_string())),
                direction: ast::Direction::In,
            }],
            return_type: float4_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });

        let mut exprs = crate::arena::Arena::default();
        let v_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: float4_ty(),
        });
        let swizzle = exprs.append(ast::Expr {
            kind: ast::ExprKind::Swizzle {
                base: v_ref,
                selectors: vec![1, 2],
            },
            ty: ast::Type::Vector {
                size: ast::VectorSize::Bi,
                kind: ast::ScalarKind::Float,
                width: 4,
            },
        });
        let one = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Float(1.0f64.to_bits())),
            ty: f32_ty(),
        });
        let two = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Float(2.0f64.to_bits())),
            ty: f32_ty(),
        });
        let rhs = exprs.append(ast::Expr {
            kind: ast::ExprKind::InitList(vec![one, two]),
            ty: ast::Type::Vector {
                size: ast::VectorSize::Bi,
                kind: ast::ScalarKind::Float,
                width: 4,
            },
        });
        let assign = exprs.append(ast::Expr {
            kind: ast::ExprKind::Assign { lhs: swizzle, rhs },
            ty: ast::Type::Vector {
                size: ast::VectorSize::Bi,
                kind: ast::ScalarKind::Float,
                width: 4,
            },
        });
        let v_ref2 = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: float4_ty(),
        });

        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![ast::Stmt::Expr(assign), ast::Stmt::Return(Some(v_ref2))];
        tu.functions = functions;

        let words = translate_ok(&tu);
        let ops = decode_ops(&words);
        let shuffle = find_op(&ops, spirv::Op::VectorShuffle, 0).expect("OpVectorShuffle");
        // Operand words are [type, result, vector1, vector2, selectors...];
        // selects base.x, rhs.0, rhs.1, base.w.
        assert_eq!(ops[shuffle].1[4..], [0, 4, 5, 3]);
        let store = find_op(&ops, spirv::Op::Store, shuffle).expect("OpStore after shuffle");
        assert!(shuffle < store);
    }

    /// S3: `int main(int x : X) : SV_Target { if (x>0) return 1; else return 2; }`
    #[test]
    fn s3_if_else() {
        let mut tu = ast::TranslationUnit::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: vec![ast::ParamDecl {
                name: "x".to_string(),
                ty: int_ty(),
                semantic: Some(ast::Semantic("X".to_string())),
                direction: ast::Direction::In,
            }],
            return_type: int_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });

        let mut exprs = crate::arena::Arena::default();
        let x_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: int_ty(),
        });
        let zero = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(0)),
            ty: int_ty(),
        });
        let cond = exprs.append(ast::Expr {
            kind: ast::ExprKind::Binary {
                op: ast::BinaryOp::Greater,
                lhs: x_ref,
                rhs: zero,
            },
            ty: ast::Type::Scalar {
                kind: ast::ScalarKind::Bool,
                width: 1,
            },
        });
        let one = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(1)),
            ty: int_ty(),
        });
        let two = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(2)),
            ty: int_ty(),
        });

        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![ast::Stmt::If {
            cond,
            then_branch: vec![ast::Stmt::Return(Some(one))],
            else_branch: Some(vec![ast::Stmt::Return(Some(two))]),
        }];
        tu.functions = functions;

        let words = translate_ok(&tu);
        let ops = decode_ops(&words);
        let cmp = find_op(&ops, spirv::Op::SGreaterThan, 0).expect("OpSGreaterThan");
        let merge = find_op(&ops, spirv::Op::SelectionMerge, cmp).expect("OpSelectionMerge");
        let branch = find_op(&ops, spirv::Op::BranchConditional, merge).expect("OpBranchConditional");
        assert!(cmp < merge && merge < branch);
        assert_eq!(ops.iter().filter(|&&(op, _)| op == spirv::Op::SelectionMerge as u32).count(), 1);
    }

    /// S4: `int main() : SV_Target { int s=0; for (int i=0;i<4;++i) s+=i; return s; }`
    #[test]
    fn s4_loop() {
        let mut tu = ast::TranslationUnit::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: Vec::new(),
            return_type: int_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });

        let mut locals = crate::arena::Arena::default();
        let mut exprs = crate::arena::Arena::default();

        let zero = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(0)),
            ty: int_ty(),
        });
        let s_local = locals.append(ast::LocalVarDecl {
            name: "s".to_string(),
            ty: int_ty(),
            init: Some(zero),
        });
        let i_init_lit = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(0)),
            ty: int_ty(),
        });
        let i_local = locals.append(ast::LocalVarDecl {
            name: "i".to_string(),
            ty: int_ty(),
            init: Some(i_init_lit),
        });

        let i_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Local(fn_handle, i_local)),
            ty: int_ty(),
        });
        let four = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(4)),
            ty: int_ty(),
        });
        let cond = exprs.append(ast::Expr {
            kind: ast::ExprKind::Binary {
                op: ast::BinaryOp::Less,
                lhs: i_ref,
                rhs: four,
            },
            ty: ast::Type::Scalar {
                kind: ast::ScalarKind::Bool,
                width: 1,
            },
        });
        let i_ref2 = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Local(fn_handle, i_local)),
            ty: int_ty(),
        });
        let inc = exprs.append(ast::Expr {
            kind: ast::ExprKind::PreIncDec {
                increment: true,
                expr: i_ref2,
            },
            ty: int_ty(),
        });
        let i_ref3 = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Local(fn_handle, i_local)),
            ty: int_ty(),
        });
        let s_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Local(fn_handle, s_local)),
            ty: int_ty(),
        });
        let body_add = exprs.append(ast::Expr {
            kind: ast::ExprKind::CompoundAssign {
                op: ast::BinaryOp::Add,
                lhs: s_ref,
                rhs: i_ref3,
            },
            ty: int_ty(),
        });
        let s_ref2 = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Local(fn_handle, s_local)),
            ty: int_ty(),
        });

        functions[fn_handle].locals = locals;
        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![
            ast::Stmt::Decl(s_local),
            ast::Stmt::For {
                init: Some(Box::new(ast::Stmt::Decl(i_local))),
                cond: Some(cond),
                inc: Some(inc),
                body: vec![ast::Stmt::Expr(body_add)],
            },
            ast::Stmt::Return(Some(s_ref2)),
        ];
        tu.functions = functions;

        let words = translate_ok(&tu);
        let ops = decode_ops(&words);
        let loop_merges: Vec<_> = ops.iter().filter(|&&(op, _)| op == spirv::Op::LoopMerge as u32).collect();
        assert_eq!(loop_merges.len(), 1);
        let merge_label = loop_merges[0].1[0];
        let continue_label = loop_merges[0].1[1];
        assert_ne!(merge_label, continue_label);
    }

    /// S5: `int main(int x:X):SV_Target { switch(x){case 1:return 10;case 2:case 3:return 20;default:return 0;} }`
    #[test]
    fn s5_switch_fallthrough_shares_a_label() {
        let mut tu = ast::TranslationUnit::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: vec![ast::ParamDecl {
                name: "x".to_string(),
                ty: int_ty(),
                semantic: Some(ast::Semantic("X".to_string())),
                direction: ast::Direction::In,
            }],
            return_type: int_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });

        let mut exprs = crate::arena::Arena::default();
        let x_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: int_ty(),
        });
        let ten = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(10)),
            ty: int_ty(),
        });
        let twenty = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(20)),
            ty: int_ty(),
        });
        let zero = exprs.append(ast::Expr {
            kind: ast::ExprKind::Literal(ast::Literal::Sint(0)),
            ty: int_ty(),
        });

        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![ast::Stmt::Switch {
            selector: x_ref,
            items: vec![
                ast::SwitchItem::Case(ast::CaseLabel::Literal(1)),
                ast::SwitchItem::Stmt(ast::Stmt::Return(Some(ten))),
                ast::SwitchItem::Case(ast::CaseLabel::Literal(2)),
                ast::SwitchItem::Case(ast::CaseLabel::Literal(3)),
                ast::SwitchItem::Stmt(ast::Stmt::Return(Some(twenty))),
                ast::SwitchItem::Default,
                ast::SwitchItem::Stmt(ast::Stmt::Return(Some(zero))),
            ],
        }];
        tu.functions = functions;

        let words = translate_ok(&tu);
        let ops = decode_ops(&words);
        let switch = find_op(&ops, spirv::Op::Switch, 0).expect("OpSwitch");
        let operands = ops[switch].1;
        // selector, default, then (literal, label) pairs; case 2 and case 3
        // must target the same label since they share a fall-through body.
        let case1_label = operands[3];
        let case2_label = operands[5];
        let case3_label = operands[7];
        assert_eq!(case2_label, case3_label);
        assert_ne!(case1_label, case2_label);
        let _ = words;
    }

    /// S6: `int main(int4 a:A,int4 b:B):SV_Target { return dot(a,b); }`
    #[test]
    fn s6_integer_dot_product_avoids_opdot() {
        let mut tu = ast::TranslationUnit::default();
        let mut functions = crate::arena::Arena::default();
        let fn_handle = functions.append(ast::FunctionDecl {
            name: "main".to_string(),
            params: vec![
                ast::ParamDecl {
                    name: "a".to_string(),
                    ty: int4_ty(),
                    semantic: Some(ast::Semantic("A".to_string())),
                    direction: ast::Direction::In,
                },
                ast::ParamDecl {
                    name: "b".to_string(),
                    ty: int4_ty(),
                    semantic: Some(ast::Semantic("B".to_string())),
                    direction: ast::Direction::In,
                },
            ],
            return_type: int_ty(),
            return_semantic: Some(ast::Semantic("SV_Target".to_string())),
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        });

        let mut exprs = crate::arena::Arena::default();
        let a_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 0)),
            ty: int4_ty(),
        });
        let b_ref = exprs.append(ast::Expr {
            kind: ast::ExprKind::DeclRef(ast::DeclId::Param(fn_handle, 1)),
            ty: int4_ty(),
        });
        let dot = exprs.append(ast::Expr {
            kind: ast::ExprKind::Intrinsic {
                op: ast::IntrinsicOp::Dot,
                args: vec![a_ref, b_ref],
            },
            ty: int_ty(),
        });

        functions[fn_handle].exprs = exprs;
        functions[fn_handle].body = vec![ast::Stmt::Return(Some(dot))];
        tu.functions = functions;

        let words = translate_ok(&tu);
        let ops = decode_ops(&words);
        let extracts = ops.iter().filter(|&&(op, _)| op == spirv::Op::CompositeExtract as u32).count();
        let muls = ops.iter().filter(|&&(op, _)| op == spirv::Op::IMul as u32).count();
        let adds = ops.iter().filter(|&&(op, _)| op == spirv::Op::IAdd as u32).count();
        let dots = ops.iter().filter(|&&(op, _)| op == spirv::Op::Dot as u32).count();
        // One extract per lane per operand (4 lanes * 2 operands), one
        // multiply per lane, and one add per lane after the first.
        assert_eq!(extracts, 8);
        assert_eq!(muls, 4);
        assert_eq!(adds, 3);
        assert_eq!(dots, 0);
    }
}
