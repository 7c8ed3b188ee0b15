//! Declaration-Id Mapper (§4.6): non-owning associations from AST
//! declarations to result-ids, plus stage-variable materialization and
//! Location assignment.

use super::builder::Builder;
use super::types::translate_type;
use super::Error;
use crate::ast::{self, DeclId};
use crate::FastHashMap;

use spirv::Word;

struct StageVariable {
    id: Word,
    class: spirv::StorageClass,
    has_builtin: bool,
}

/// Tracks result-ids for declarations and the module's stage input/output
/// variables. Never outlives the `Builder`/`Module` it was built against.
#[derive(Default)]
pub(super) struct DeclMapper {
    ids: FastHashMap<DeclId, Word>,
    stage_variables: Vec<StageVariable>,
}

impl DeclMapper {
    pub fn new() -> Self {
        DeclMapper::default()
    }

    /// Associates `decl` with `id`. Duplicate registration for the same
    /// declaration is a programming error, not an AST-shape issue, so it
    /// panics rather than returning a diagnosable `Error`.
    pub fn register(&mut self, decl: DeclId, id: Word) {
        let previous = self.ids.insert(decl, id);
        assert!(previous.is_none(), "Internal: duplicate registration for {:?}", decl);
    }

    /// Zero if `decl` has not been registered.
    pub fn get(&self, decl: DeclId) -> Word {
        self.ids.get(&decl).copied().unwrap_or(0)
    }

    /// Allocate-if-missing, for forward-referenced call targets: the callee
    /// may be discovered (and its id minted) before its own declaration is
    /// lowered.
    pub fn get_or_register(&mut self, decl: DeclId, allocate: impl FnOnce() -> Word) -> Word {
        if let Some(&id) = self.ids.get(&decl) {
            return id;
        }
        let id = allocate();
        self.ids.insert(decl, id);
        id
    }

    /// Materializes one stage-out variable per semantic-carrying leaf of an
    /// entry function's return type, registering each field to its id (or,
    /// for a non-struct return, the function itself, via `decl`).
    pub fn create_stage_var_from_fn_return(
        &mut self,
        builder: &mut Builder,
        tu: &ast::TranslationUnit,
        decl: DeclId,
        ty: &ast::Type,
        semantic: Option<&ast::Semantic>,
    ) -> Result<(), Error> {
        match *ty {
            ast::Type::Struct(handle) => {
                let struct_decl = tu
                    .structs
                    .try_get(handle)
                    .ok_or_else(|| Error::InvalidAst("return type struct handle not found".into()))?;
                for (index, field) in struct_decl.fields.iter().enumerate() {
                    let field_id = self.create_stage_variable(
                        builder,
                        &field.1.ty,
                        field.1.semantic.as_ref(),
                        spirv::StorageClass::Output,
                    )?;
                    self.register(field_struct_decl_id(handle, index as u32), field_id);
                }
                Ok(())
            }
            _ => {
                let id = self.create_stage_variable(builder, ty, semantic, spirv::StorageClass::Output)?;
                self.register(decl, id);
                Ok(())
            }
        }
    }

    /// Analogous to `create_stage_var_from_fn_return` for a single
    /// parameter; direction selects `Input` (plain/`in`) or `Output`
    /// (`out`/`inout` also produces an input half, handled by the caller).
    /// A `Type::Struct` parameter decomposes into one stage variable per
    /// semantic-carrying field, same as a struct return value; the result
    /// tags each id with its field index (`None` for a non-struct param's
    /// single id) so the caller knows which local-copy field it feeds.
    ///
    /// Unlike the return-value and ordinary-declaration registrations, this
    /// does NOT register `decl` to the returned id(s): an entry-function
    /// parameter's declaration resolves to a function-scope local copy (see
    /// `Emitter::lower_entry_function`), not to the stage variable itself,
    /// since writing through an `Input`-class pointer is invalid SPIR-V.
    pub fn create_stage_var_from_fn_param(
        &mut self,
        builder: &mut Builder,
        tu: &ast::TranslationUnit,
        param: &ast::ParamDecl,
    ) -> Result<Vec<(Option<u32>, Word)>, Error> {
        let class = match param.direction {
            ast::Direction::In | ast::Direction::InOut => spirv::StorageClass::Input,
            ast::Direction::Out => spirv::StorageClass::Output,
        };
        match param.ty {
            ast::Type::Struct(handle) => {
                let struct_decl = tu
                    .structs
                    .try_get(handle)
                    .ok_or_else(|| Error::InvalidAst("parameter struct handle not found".into()))?;
                let mut ids = Vec::with_capacity(struct_decl.fields.len());
                for (index, field) in struct_decl.fields.iter().enumerate() {
                    let field_id = self.create_stage_variable(builder, &field.1.ty, field.1.semantic.as_ref(), class)?;
                    ids.push((Some(index as u32), field_id));
                }
                Ok(ids)
            }
            _ => {
                let id = self.create_stage_variable(builder, &param.ty, param.semantic.as_ref(), class)?;
                Ok(vec![(None, id)])
            }
        }
    }

    fn create_stage_variable(
        &mut self,
        builder: &mut Builder,
        ty: &ast::Type,
        semantic: Option<&ast::Semantic>,
        class: spirv::StorageClass,
    ) -> Result<Word, Error> {
        let type_id = translate_type(builder, ty)?;
        let builtin = semantic.and_then(ast::Semantic::builtin);
        let id = match builtin {
            Some(built_in) => builder.add_stage_builtin_variable(type_id, class, built_in),
            None => builder.add_stage_io_variable(type_id, class),
        };
        self.stage_variables.push(StageVariable {
            id,
            class,
            has_builtin: builtin.is_some(),
        });
        Ok(id)
    }

    /// Assigns `Location` decorations: stage variables receive consecutive
    /// locations in creation order, Input and Output counted independently.
    /// BuiltIn-decorated variables don't consume a Location.
    pub fn finalize_stage_io_locations(&self, builder: &mut Builder) {
        let mut next_input = 0u32;
        let mut next_output = 0u32;
        for var in &self.stage_variables {
            if var.has_builtin {
                continue;
            }
            let location = match var.class {
                spirv::StorageClass::Input => {
                    let location = next_input;
                    next_input += 1;
                    location
                }
                spirv::StorageClass::Output => {
                    let location = next_output;
                    next_output += 1;
                    location
                }
                _ => continue,
            };
            builder.decorate_location(var.id, location);
        }
    }

    /// All stage-variable ids, for the `OpEntryPoint` interface list.
    pub fn collect_stage_variables(&self) -> Vec<Word> {
        self.stage_variables.iter().map(|v| v.id).collect()
    }
}

fn field_struct_decl_id(handle: crate::arena::Handle<ast::StructDecl>, index: u32) -> DeclId {
    DeclId::Field(handle, index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Handle;

    fn dummy_function_handle() -> Handle<ast::FunctionDecl> {
        let mut arena = crate::arena::Arena::default();
        arena.append(ast::FunctionDecl {
            name: "main".into(),
            params: Vec::new(),
            return_type: ast::Type::Void,
            return_semantic: None,
            locals: crate::arena::Arena::default(),
            exprs: crate::arena::Arena::default(),
            body: Vec::new(),
        })
    }

    #[test]
    fn register_then_get_round_trips() {
        let mut mapper = DeclMapper::new();
        let handle = dummy_function_handle();
        let decl = DeclId::Function(handle);
        mapper.register(decl, 42);
        assert_eq!(mapper.get(decl), 42);
    }

    #[test]
    fn get_on_unregistered_decl_is_zero() {
        let mapper = DeclMapper::new();
        let handle = dummy_function_handle();
        assert_eq!(mapper.get(DeclId::Function(handle)), 0);
    }

    #[test]
    #[should_panic(expected = "duplicate registration")]
    fn double_register_panics() {
        let mut mapper = DeclMapper::new();
        let handle = dummy_function_handle();
        let decl = DeclId::Function(handle);
        mapper.register(decl, 1);
        mapper.register(decl, 2);
    }

    #[test]
    fn stage_variable_locations_are_assigned_independently_per_class() {
        let mut builder = Builder::new(0x0001_0000);
        let mut mapper = DeclMapper::new();
        let tu = ast::TranslationUnit::default();
        let f32_ty = ast::Type::Scalar {
            kind: ast::ScalarKind::Float,
            width: 4,
        };
        for i in 0..2 {
            let param = ast::ParamDecl {
                name: format!("p{}", i),
                ty: f32_ty.clone(),
                semantic: Some(ast::Semantic(format!("TEXCOORD{}", i))),
                direction: ast::Direction::In,
            };
            let ids = mapper.create_stage_var_from_fn_param(&mut builder, &tu, &param).unwrap();
            assert_eq!(ids.len(), 1);
            assert_eq!(ids[0].0, None);
        }
        mapper.finalize_stage_io_locations(&mut builder);
        assert_eq!(mapper.collect_stage_variables().len(), 2);
    }

    #[test]
    fn struct_param_decomposes_into_one_stage_var_per_field() {
        let mut builder = Builder::new(0x0001_0000);
        let mut mapper = DeclMapper::new();
        let mut tu = ast::TranslationUnit::default();
        let f32_ty = ast::Type::Scalar {
            kind: ast::ScalarKind::Float,
            width: 4,
        };
        let mut fields = crate::arena::Arena::default();
        fields.append(ast::FieldDecl {
            name: "pos".into(),
            ty: ast::Type::Vector {
                size: ast::VectorSize::Quad,
                kind: ast::ScalarKind::Float,
                width: 4,
            },
            semantic: Some(ast::Semantic("SV_Position".into())),
        });
        fields.append(ast::FieldDecl {
            name: "uv".into(),
            ty: f32_ty.clone(),
            semantic: Some(ast::Semantic("TEXCOORD0".into())),
        });
        let struct_handle = tu.structs.append(ast::StructDecl {
            name: "VsOutput".into(),
            fields,
        });
        let param = ast::ParamDecl {
            name: "input".into(),
            ty: ast::Type::Struct(struct_handle),
            semantic: None,
            direction: ast::Direction::In,
        };
        let ids = mapper.create_stage_var_from_fn_param(&mut builder, &tu, &param).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].0, Some(0));
        assert_eq!(ids[1].0, Some(1));
    }
}
