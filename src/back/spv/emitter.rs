//! SPIR-V Emitter (§4.7), part 1: the top-level translation protocol,
//! function lowering, and statement lowering. Expression lowering lives in
//! `emitter_expr.rs`; both halves operate on the same `Emitter`.

use super::builder::Builder;
use super::declmap::DeclMapper;
use super::{Error, Options};
use crate::arena::Handle;
use crate::ast::{self, DeclId, FunctionDecl, Stmt, SwitchItem};
use crate::diagnostic::{emit_error, emit_warning, DiagnosticSink};
use crate::{FastHashMap, FastHashSet};

use spirv::Word;

pub(super) struct Emitter<'a> {
    pub(super) tu: &'a ast::TranslationUnit,
    options: &'a Options,
    pub(super) builder: Builder,
    pub(super) mapper: DeclMapper,
    pub(super) struct_types: FastHashMap<Handle<ast::StructDecl>, Word>,
    work_queue: Vec<Handle<FunctionDecl>>,
    queued: FastHashSet<Handle<FunctionDecl>>,
    pub(super) break_targets: Vec<Word>,
    entry_handle: Handle<FunctionDecl>,
    entry_fn_id: Word,
    pub(super) current_function: Handle<FunctionDecl>,
    /// Storage class each pointer-valued id was allocated with; consulted
    /// when building a derived pointer (member/swizzle access chain) so it
    /// inherits the right class instead of always assuming `Function`.
    pub(super) pointer_storage: FastHashMap<Word, spirv::StorageClass>,
    /// `(local_copy_ptr, stage_var_ptr, value_type)` triples for the entry
    /// function's `out`/`inout` parameters, flushed back to their stage
    /// variable at every `return` (see `flush_entry_out_params`).
    entry_out_params: Vec<(Word, Word, Word)>,
}

/// Parses the shader-model version out of an HLSL profile string
/// (`"ps_5_0"` -> `50`) for the `OpSource` version operand. Falls back to 0,
/// with a diagnostic, for profile strings that don't carry a version suffix.
fn shader_model_version(profile: &str, sink: &mut dyn DiagnosticSink) -> u32 {
    let mut parts = profile.split('_').skip(1);
    let major = parts.next().and_then(|s| s.parse::<u32>().ok());
    let minor = parts.next().and_then(|s| s.parse::<u32>().ok());
    match (major, minor) {
        (Some(major), Some(minor)) => major * 10 + minor,
        _ => {
            emit_warning!(sink, "profile {:?} has no parseable shader-model version suffix; OpSource version defaults to 0", profile);
            0
        }
    }
}

impl<'a> Emitter<'a> {
    pub fn new(tu: &'a ast::TranslationUnit, options: &'a Options) -> Self {
        // `entry_handle`/`current_function` are placeholders until `run`
        // resolves the real entry point; `Handle::DUMMY` is documented as
        // diagnostics-only, which is exactly this use.
        Emitter {
            tu,
            options,
            builder: Builder::new(u32::from(options.lang_version.0) << 16 | u32::from(options.lang_version.1) << 8),
            mapper: DeclMapper::new(),
            struct_types: FastHashMap::default(),
            work_queue: Vec::new(),
            queued: FastHashSet::default(),
            break_targets: Vec::new(),
            entry_handle: Handle::DUMMY,
            entry_fn_id: 0,
            current_function: Handle::DUMMY,
            pointer_storage: FastHashMap::default(),
            entry_out_params: Vec::new(),
        }
    }

    pub fn run(mut self, sink: &mut dyn DiagnosticSink) -> Result<Vec<u32>, Error> {
        let profile_char = self.options.profile.chars().next();
        let execution_model = match profile_char {
            Some('v') => spirv::ExecutionModel::Vertex,
            Some('h') => spirv::ExecutionModel::TessellationControl,
            Some('d') => spirv::ExecutionModel::TessellationEvaluation,
            Some('g') => spirv::ExecutionModel::Geometry,
            Some('p') => spirv::ExecutionModel::Fragment,
            Some('c') => spirv::ExecutionModel::GLCompute,
            _ => {
                let err = Error::UnknownProfile(self.options.profile.clone());
                emit_error!(sink, "{}", err);
                return Err(err);
            }
        };
        let capability = match execution_model {
            spirv::ExecutionModel::Vertex | spirv::ExecutionModel::Fragment | spirv::ExecutionModel::GLCompute => {
                spirv::Capability::Shader
            }
            spirv::ExecutionModel::TessellationControl | spirv::ExecutionModel::TessellationEvaluation => {
                spirv::Capability::Tessellation
            }
            spirv::ExecutionModel::Geometry => spirv::Capability::Geometry,
            _ => spirv::Capability::Shader,
        };
        self.builder.require_capability(capability);
        self.builder.set_addressing_model(spirv::AddressingModel::Logical);
        self.builder.set_memory_model(spirv::MemoryModel::GLSL450);
        self.builder
            .set_source(spirv::SourceLanguage::HLSL, shader_model_version(&self.options.profile, sink));

        let entry_handle = match self.tu.find_function(&self.options.entry_point) {
            Some(handle) => handle,
            None => {
                let err = Error::InvalidAst(format!("entry point {:?} not found", self.options.entry_point));
                emit_error!(sink, "{}", err);
                return Err(err);
            }
        };
        self.entry_handle = entry_handle;
        self.work_queue.push(entry_handle);
        self.queued.insert(entry_handle);

        let mut index = 0;
        while index < self.work_queue.len() {
            let handle = self.work_queue[index];
            self.lower_function(handle, sink);
            index += 1;
        }

        self.builder.add_entry_point(
            execution_model,
            self.entry_fn_id,
            &self.options.entry_point,
            &self.mapper.collect_stage_variables(),
        );
        if execution_model == spirv::ExecutionModel::Fragment {
            self.builder
                .add_execution_mode(self.entry_fn_id, spirv::ExecutionMode::OriginUpperLeft, &[]);
        }
        self.mapper.finalize_stage_io_locations(&mut self.builder);

        Ok(self.builder.take_module())
    }

    /// Reserves (if necessary) and returns the `OpFunction` id for `handle`,
    /// enqueuing it for lowering the first time it's seen. Used both when a
    /// function reaches the front of the work queue and when a call site
    /// discovers a callee it hasn't seen yet.
    pub(super) fn ensure_function_id(&mut self, handle: Handle<FunctionDecl>) -> Word {
        let builder = &mut self.builder;
        let id = self
            .mapper
            .get_or_register(DeclId::Function(handle), || builder.reserve_id());
        if self.queued.insert(handle) {
            self.work_queue.push(handle);
        }
        id
    }

    /// Translates an AST type to a SPIR-V type id, caching struct
    /// translations (`types::translate_type` alone can't resolve
    /// `Type::Struct` without a field-type pass against the owning arena).
    pub(super) fn type_id(&mut self, ty: &ast::Type, sink: &mut dyn DiagnosticSink) -> Word {
        match *ty {
            ast::Type::Struct(handle) => {
                if let Some(&id) = self.struct_types.get(&handle) {
                    return id;
                }
                let tu = self.tu;
                let decl = match tu.structs.try_get(handle) {
                    Some(decl) => decl,
                    None => {
                        emit_error!(sink, "internal error: unresolved struct handle");
                        return 0;
                    }
                };
                match super::types::translate_struct_type(&mut self.builder, decl) {
                    Ok(id) => {
                        self.struct_types.insert(handle, id);
                        id
                    }
                    Err(err) => {
                        emit_error!(sink, "{}", err);
                        0
                    }
                }
            }
            _ => match super::types::translate_type(&mut self.builder, ty) {
                Ok(id) => id,
                Err(err) => {
                    emit_error!(sink, "{}", err);
                    0
                }
            },
        }
    }

    fn lower_function(&mut self, handle: Handle<FunctionDecl>, sink: &mut dyn DiagnosticSink) {
        let is_entry = handle == self.entry_handle;
        self.current_function = handle;

        if is_entry {
            self.lower_entry_function(handle, sink);
        } else {
            self.lower_ordinary_function(handle, sink);
        }
    }

    fn lower_entry_function(&mut self, handle: Handle<FunctionDecl>, sink: &mut dyn DiagnosticSink) {
        let void_ty = self.builder.type_void();
        let fn_type = self.builder.type_function(void_ty, &[]);
        let fn_id = self.builder.reserve_id();
        self.entry_fn_id = fn_id;
        let tu = self.tu;
        let name = tu.functions[handle].name.clone();
        self.builder.begin_function(fn_id, fn_type, void_ty, Some(&name));
        let entry_block = self.builder.create_basic_block(Some("bb.entry"));
        self.builder.set_insert_point(entry_block);

        let params = tu.functions[handle].params.clone();
        for (index, param) in params.iter().enumerate() {
            let decl = DeclId::Param(handle, index as u32);
            let stage_vars = match self.mapper.create_stage_var_from_fn_param(&mut self.builder, tu, param) {
                Ok(ids) => ids,
                Err(err) => {
                    emit_error!(sink, "{}", err);
                    continue;
                }
            };
            let ty_id = self.type_id(&param.ty, sink);
            let local_ptr_ty = self.builder.type_pointer(ty_id, spirv::StorageClass::Function);
            let local = self.builder.add_fn_variable(local_ptr_ty, Some(&param.name), None);
            self.pointer_storage.insert(local, spirv::StorageClass::Function);

            match param.ty {
                ast::Type::Struct(struct_handle) => {
                    let struct_decl = match tu.structs.try_get(struct_handle) {
                        Some(decl) => decl,
                        None => {
                            emit_error!(sink, "{}", Error::InvalidAst("parameter struct handle not found".into()));
                            continue;
                        }
                    };
                    let idx_ty = self.builder.type_u32();
                    for (field_index, stage_id) in stage_vars {
                        let field_index = match field_index {
                            Some(field_index) => field_index,
                            None => {
                                emit_error!(sink, "{}", Error::Internal("struct parameter stage variable missing field index".into()));
                                continue;
                            }
                        };
                        let field = match struct_decl.fields.iter().nth(field_index as usize) {
                            Some((_, field)) => field,
                            None => {
                                emit_error!(sink, "{}", Error::Internal("struct parameter field index out of range".into()));
                                continue;
                            }
                        };
                        let field_ty_id = self.type_id(&field.ty, sink);
                        let field_ptr_ty = self.builder.type_pointer(field_ty_id, spirv::StorageClass::Function);
                        let idx_const = self.builder.constant_u32(field_index, idx_ty);
                        let field_ptr = self.builder.create_access_chain(field_ptr_ty, local, &[idx_const]);
                        self.pointer_storage.insert(field_ptr, spirv::StorageClass::Function);

                        if matches!(param.direction, ast::Direction::In | ast::Direction::InOut) {
                            let loaded = self.builder.create_load(field_ty_id, stage_id);
                            self.builder.create_store(field_ptr, loaded);
                        }
                        if matches!(param.direction, ast::Direction::Out | ast::Direction::InOut) {
                            self.entry_out_params.push((field_ptr, stage_id, field_ty_id));
                        }
                    }
                }
                _ => {
                    for (_, stage_id) in stage_vars {
                        if matches!(param.direction, ast::Direction::In | ast::Direction::InOut) {
                            let loaded = self.builder.create_load(ty_id, stage_id);
                            self.builder.create_store(local, loaded);
                        }
                        if matches!(param.direction, ast::Direction::Out | ast::Direction::InOut) {
                            self.entry_out_params.push((local, stage_id, ty_id));
                        }
                    }
                }
            }
            // Body references resolve to the local copy, never the `Input`/
            // `Output` stage variable directly: writing through `Input` is
            // invalid SPIR-V, and reading an `out` parameter before it has
            // been assigned would read uninitialized stage storage.
            self.mapper.register(decl, local);
        }

        let return_type = tu.functions[handle].return_type.clone();
        let return_semantic = tu.functions[handle].return_semantic.clone();
        if !matches!(return_type, ast::Type::Void) {
            if let Err(err) = self.mapper.create_stage_var_from_fn_return(
                &mut self.builder,
                tu,
                DeclId::Function(handle),
                &return_type,
                return_semantic.as_ref(),
            ) {
                emit_error!(sink, "{}", err);
            }
        }

        let body = tu.functions[handle].body.clone();
        self.lower_block(&body, sink);
        if !self.builder.is_current_block_terminated() {
            self.flush_entry_out_params();
            self.builder.create_return();
        }
        self.entry_out_params.clear();
        self.builder.end_function();
    }

    /// Copies every `out`/`inout` entry parameter's local back to its stage
    /// variable. Called immediately before every `OpReturn` in the entry
    /// function, mirroring how the return value itself is flushed.
    fn flush_entry_out_params(&mut self) {
        for (local, stage_id, ty_id) in self.entry_out_params.clone() {
            let value = self.builder.create_load(ty_id, local);
            self.builder.create_store(stage_id, value);
        }
    }

    fn lower_ordinary_function(&mut self, handle: Handle<FunctionDecl>, sink: &mut dyn DiagnosticSink) {
        let fn_id = self.ensure_function_id(handle);
        let tu = self.tu;
        let return_type = tu.functions[handle].return_type.clone();
        let name = tu.functions[handle].name.clone();
        let params = tu.functions[handle].params.clone();

        let ret_ty_id = self.type_id(&return_type, sink);
        let mut param_ptr_types = Vec::with_capacity(params.len());
        for param in &params {
            let ty_id = self.type_id(&param.ty, sink);
            param_ptr_types.push(self.builder.type_pointer(ty_id, spirv::StorageClass::Function));
        }
        let fn_type = self.builder.type_function(ret_ty_id, &param_ptr_types);
        self.builder.begin_function(fn_id, fn_type, ret_ty_id, Some(&name));

        for (index, ptr_type) in param_ptr_types.iter().enumerate() {
            let id = self.builder.add_fn_parameter(*ptr_type, Some(&params[index].name));
            self.pointer_storage.insert(id, spirv::StorageClass::Function);
            self.mapper.register(DeclId::Param(handle, index as u32), id);
        }

        let entry_block = self.builder.create_basic_block(Some("bb.entry"));
        self.builder.set_insert_point(entry_block);

        let body = tu.functions[handle].body.clone();
        self.lower_block(&body, sink);
        if !self.builder.is_current_block_terminated() {
            if matches!(return_type, ast::Type::Void) {
                self.builder.create_return();
            } else {
                emit_error!(sink, "non-void function {:?} falls off the end without a return", name);
                self.builder.create_unreachable();
            }
        }
        self.builder.end_function();
    }

    /// Allocates a function-scope local variable and registers its pointer.
    pub(super) fn declare_local(
        &mut self,
        decl: DeclId,
        ty_id: Word,
        name: Option<&str>,
        init: Option<Word>,
        sink: &mut dyn DiagnosticSink,
    ) -> Word {
        let _ = sink;
        let ptr_type = self.builder.type_pointer(ty_id, spirv::StorageClass::Function);
        let id = self.builder.add_fn_variable(ptr_type, name, init);
        self.pointer_storage.insert(id, spirv::StorageClass::Function);
        self.mapper.register(decl, id);
        id
    }

    pub(super) fn lower_block(&mut self, block: &ast::Block, sink: &mut dyn DiagnosticSink) {
        for stmt in block {
            if self.builder.is_current_block_terminated() {
                break;
            }
            self.lower_stmt(stmt, sink);
        }
    }

    fn lower_stmt(&mut self, stmt: &Stmt, sink: &mut dyn DiagnosticSink) {
        match stmt {
            Stmt::Compound(block) => self.lower_block(block, sink),
            Stmt::Decl(local_handle) => self.lower_decl_stmt(*local_handle, sink),
            Stmt::Return(value) => self.lower_return(*value, sink),
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(*cond, then_branch, else_branch.as_ref(), sink),
            Stmt::For { init, cond, inc, body } => self.lower_for(init.as_deref(), *cond, *inc, body, sink),
            Stmt::Switch { selector, items } => self.lower_switch(*selector, items, sink),
            Stmt::Break => {
                let target = *self.break_targets.last().unwrap_or(&0);
                if target == 0 {
                    emit_error!(sink, "break statement outside any breakable construct");
                } else {
                    self.builder.create_branch(target);
                }
            }
            Stmt::Kill => self.builder.create_kill(),
            Stmt::Attributed { stmt, .. } => self.lower_stmt(stmt, sink),
            Stmt::Null => {}
            Stmt::Expr(handle) => {
                self.lower_expr(*handle, sink);
            }
        }
    }

    fn lower_decl_stmt(&mut self, local_handle: Handle<ast::LocalVarDecl>, sink: &mut dyn DiagnosticSink) {
        let tu = self.tu;
        let function = self.current_function;
        let local = tu.functions[function].locals[local_handle].clone();
        let ty_id = self.type_id(&local.ty, sink);
        let decl = DeclId::Local(function, local_handle);

        match local.init {
            None => {
                self.declare_local(decl, ty_id, Some(&local.name), None, sink);
            }
            Some(init_handle) => match self.try_fold_constant(init_handle, sink) {
                Some(const_id) => {
                    self.declare_local(decl, ty_id, Some(&local.name), Some(const_id), sink);
                }
                None => {
                    let id = self.declare_local(decl, ty_id, Some(&local.name), None, sink);
                    let value = self.lower_expr_rvalue(init_handle, sink);
                    self.builder.create_store(id, value);
                }
            },
        }
    }

    fn lower_return(&mut self, value: Option<Handle<ast::Expr>>, sink: &mut dyn DiagnosticSink) {
        if self.current_function == self.entry_handle {
            self.lower_entry_return(value, sink);
            return;
        }
        match value {
            Some(handle) => {
                let value_id = self.lower_expr_rvalue(handle, sink);
                self.builder.create_return_value(value_id);
            }
            None => self.builder.create_return(),
        }
    }

    fn lower_entry_return(&mut self, value: Option<Handle<ast::Expr>>, sink: &mut dyn DiagnosticSink) {
        let handle = match value {
            Some(handle) => handle,
            None => {
                self.flush_entry_out_params();
                self.builder.create_return();
                return;
            }
        };
        let tu = self.tu;
        let function = self.current_function;
        let return_ty = tu.functions[function].exprs[handle].ty.clone();

        if let ast::Type::Struct(struct_handle) = return_ty {
            let value_id = self.lower_expr_rvalue(handle, sink);
            let struct_decl = tu.structs.try_get(struct_handle).cloned();
            if let Some(struct_decl) = struct_decl {
                for (index, field) in struct_decl.fields.iter().enumerate() {
                    let field_ty_id = self.type_id(&field.1.ty, sink);
                    let extracted = self.builder.create_composite_extract(field_ty_id, value_id, &[index as u32]);
                    let stage_id = self.mapper.get(DeclId::Field(struct_handle, index as u32));
                    if stage_id != 0 {
                        self.builder.create_store(stage_id, extracted);
                    }
                }
            }
        } else {
            let value_id = self.lower_expr_rvalue(handle, sink);
            let stage_id = self.mapper.get(DeclId::Function(self.entry_handle));
            if stage_id != 0 {
                self.builder.create_store(stage_id, value_id);
            }
        }
        self.flush_entry_out_params();
        self.builder.create_return();
    }

    fn lower_if(
        &mut self,
        cond: Handle<ast::Expr>,
        then_branch: &ast::Block,
        else_branch: Option<&ast::Block>,
        sink: &mut dyn DiagnosticSink,
    ) {
        let true_label = self.builder.reserve_id();
        let merge_label = self.builder.reserve_id();
        let false_label = if else_branch.is_some() { self.builder.reserve_id() } else { merge_label };

        let cond_id = self.lower_expr_rvalue(cond, sink);
        self.builder.create_selection_merge(merge_label);
        self.builder.create_conditional_branch(cond_id, true_label, false_label);

        self.push_reserved_block(true_label, Some("if.true"));
        self.builder.set_insert_point(true_label);
        self.lower_block(then_branch, sink);
        if !self.builder.is_current_block_terminated() {
            self.builder.create_branch(merge_label);
        }

        if let Some(else_branch) = else_branch {
            self.push_reserved_block(false_label, Some("if.false"));
            self.builder.set_insert_point(false_label);
            self.lower_block(else_branch, sink);
            if !self.builder.is_current_block_terminated() {
                self.builder.create_branch(merge_label);
            }
        }

        self.push_reserved_block(merge_label, Some("if.merge"));
        self.builder.set_insert_point(merge_label);
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<Handle<ast::Expr>>,
        inc: Option<Handle<ast::Expr>>,
        body: &ast::Block,
        sink: &mut dyn DiagnosticSink,
    ) {
        if let Some(init) = init {
            self.lower_stmt(init, sink);
        }

        let check_label = self.builder.reserve_id();
        let body_label = self.builder.reserve_id();
        let continue_label = self.builder.reserve_id();
        let merge_label = self.builder.reserve_id();

        self.builder.create_branch(check_label);

        self.push_reserved_block(check_label, Some("for.check"));
        self.builder.set_insert_point(check_label);
        let cond_id = match cond {
            Some(handle) => self.lower_expr_rvalue(handle, sink),
            None => {
                let bool_ty = self.builder.type_bool();
                self.builder.constant_bool(true, bool_ty)
            }
        };
        self.builder.create_loop_merge(merge_label, continue_label);
        self.builder.create_conditional_branch(cond_id, body_label, merge_label);

        self.break_targets.push(merge_label);
        self.push_reserved_block(body_label, Some("for.body"));
        self.builder.set_insert_point(body_label);
        self.lower_block(body, sink);
        if !self.builder.is_current_block_terminated() {
            self.builder.create_branch(continue_label);
        }
        self.break_targets.pop();

        self.push_reserved_block(continue_label, Some("for.continue"));
        self.builder.set_insert_point(continue_label);
        if let Some(inc) = inc {
            self.lower_expr(inc, sink);
        }
        if !self.builder.is_current_block_terminated() {
            self.builder.create_branch(check_label);
        }

        self.push_reserved_block(merge_label, Some("for.merge"));
        self.builder.set_insert_point(merge_label);
    }

    fn lower_switch(&mut self, selector: Handle<ast::Expr>, items: &[SwitchItem], sink: &mut dyn DiagnosticSink) {
        let all_literal = items.iter().all(|item| !matches!(item, SwitchItem::Case(ast::CaseLabel::Expr(_))));
        if !all_literal {
            emit_error!(sink, "{}", Error::Unsupported("if-chain switch lowering is not implemented"));
            return;
        }

        let selector_id = self.lower_expr_rvalue(selector, sink);
        let merge_label = self.builder.reserve_id();

        // First pass: group consecutive Case/Default items with no Stmt
        // between them into a single shared block — `case 2: case 3: ...`
        // is one fall-through body, not two separate targets that happen to
        // branch to each other.
        struct Group {
            label: Word,
            name: String,
            literals: Vec<i32>,
            is_default: bool,
        }
        let mut groups: Vec<Group> = Vec::new();
        let mut item_group: Vec<Option<usize>> = Vec::with_capacity(items.len());
        let mut index = 0;
        while index < items.len() {
            match &items[index] {
                SwitchItem::Case(_) | SwitchItem::Default => {
                    let label = self.builder.reserve_id();
                    let group_index = groups.len();
                    let mut literals = Vec::new();
                    let mut is_default = false;
                    while index < items.len() && matches!(items[index], SwitchItem::Case(_) | SwitchItem::Default) {
                        match &items[index] {
                            SwitchItem::Case(ast::CaseLabel::Literal(value)) => literals.push(*value as i32),
                            SwitchItem::Default => is_default = true,
                            SwitchItem::Case(ast::CaseLabel::Expr(_)) => unreachable!("filtered above"),
                            SwitchItem::Stmt(_) => unreachable!("loop condition excludes Stmt"),
                        }
                        item_group.push(Some(group_index));
                        index += 1;
                    }
                    let name = match literals.first() {
                        Some(value) if *value < 0 => format!("switch.n{}", -value),
                        Some(value) => format!("switch.{}", value),
                        None => "switch.default".to_string(),
                    };
                    groups.push(Group {
                        label,
                        name,
                        literals,
                        is_default,
                    });
                }
                SwitchItem::Stmt(_) => {
                    item_group.push(None);
                    index += 1;
                }
            }
        }

        let mut targets: Vec<(i32, Word)> = Vec::new();
        let mut default_label = merge_label;
        for group in &groups {
            for &literal in &group.literals {
                targets.push((literal, group.label));
            }
            if group.is_default {
                default_label = group.label;
            }
        }

        self.builder.create_switch(merge_label, selector_id, default_label, &targets);
        self.break_targets.push(merge_label);

        let mut last_group: Option<usize> = None;
        for (i, item) in items.iter().enumerate() {
            match item {
                SwitchItem::Case(_) | SwitchItem::Default => {
                    let group_index = item_group[i].expect("case/default item must have a group");
                    if last_group != Some(group_index) {
                        if last_group.is_some() && !self.builder.is_current_block_terminated() {
                            self.builder.create_branch(groups[group_index].label);
                        }
                        let label = groups[group_index].label;
                        let name = groups[group_index].name.clone();
                        self.push_reserved_block(label, Some(name.as_str()));
                        self.builder.set_insert_point(label);
                        last_group = Some(group_index);
                    }
                }
                SwitchItem::Stmt(stmt) => {
                    if !self.builder.is_current_block_terminated() {
                        self.lower_stmt(stmt, sink);
                    }
                }
            }
        }
        if !self.builder.is_current_block_terminated() {
            self.builder.create_branch(merge_label);
        }

        self.break_targets.pop();
        self.push_reserved_block(merge_label, Some("switch.merge"));
        self.builder.set_insert_point(merge_label);
    }

    /// `create_basic_block` mints a fresh label; control-flow lowering above
    /// needs its label decided up-front (e.g. to reference it from a branch
    /// emitted before the block exists), so it pre-reserves ids via
    /// `Builder::reserve_id` and threads them in here instead.
    fn push_reserved_block(&mut self, label: Word, name: Option<&str>) {
        self.builder.adopt_basic_block(label, name);
    }
}
