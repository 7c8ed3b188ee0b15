//! Module Builder (§4.4): the stateful API the Emitter drives. Owns the
//! Context, the Instruction Builder's output, and Module Assembly, and adds
//! interning, function/block bookkeeping, and structured control flow.

use super::context::Context;
use super::instructions::*;
use super::layout::{serialize, LogicalLayout, PhysicalLayout};

use fxhash::FxHashMap as FastHashMap;
use spirv::Word;
use std::collections::HashSet;

#[derive(PartialEq, Eq, Hash, Clone)]
enum TypeKey {
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Word, count: u32 },
    Matrix { column_type: Word, count: u32 },
    Pointer { pointee: Word, class: StorageClassKey },
    Struct { members: Vec<Word> },
    Array { element: Word, length: Word },
    Function { ret: Word, params: Vec<Word> },
}

// `spirv::StorageClass` is not `Hash`; wrap the discriminant ourselves so it
// can be used as a hash map key component.
#[derive(PartialEq, Eq, Hash, Clone, Copy)]
struct StorageClassKey(u32);

impl From<spirv::StorageClass> for StorageClassKey {
    fn from(class: spirv::StorageClass) -> Self {
        StorageClassKey(class as u32)
    }
}

#[derive(PartialEq, Eq, Hash, Clone)]
enum ConstantKey {
    Bool(bool, Word),
    Bits(u32, Word),
    Composite(Word, Vec<Word>),
}

struct BasicBlock {
    label_id: Word,
    instructions: Vec<Instruction>,
    terminated: bool,
}

impl BasicBlock {
    fn new(label_id: Word) -> Self {
        BasicBlock {
            label_id,
            instructions: Vec::new(),
            terminated: false,
        }
    }
}

struct InProgressFunction {
    id: Word,
    return_type_id: Word,
    function_type_id: Word,
    parameters: Vec<Instruction>,
    /// `OpVariable`s created by `add_fn_variable`, always spliced before any
    /// other instruction of the entry block at `end_function` time.
    variables: Vec<Instruction>,
    blocks: Vec<BasicBlock>,
    label_to_block: FastHashMap<Word, usize>,
    insert_point: Option<usize>,
}

/// The online SPIR-V module assembler the Emitter drives. See §4.4 for the
/// full public contract.
pub(crate) struct Builder {
    context: Context,
    physical: PhysicalLayout,
    logical: LogicalLayout,
    capabilities: HashSet<spirv::Capability>,
    addressing_model: Option<spirv::AddressingModel>,
    memory_model: Option<spirv::MemoryModel>,
    debugs: Vec<Instruction>,
    annotations: Vec<Instruction>,
    lookup_type: FastHashMap<TypeKey, Word>,
    lookup_constant: FastHashMap<ConstantKey, Word>,
    void_type: Option<Word>,
    current_function: Option<InProgressFunction>,
    consumed: bool,
}

impl Builder {
    pub fn new(version: Word) -> Self {
        Builder {
            context: Context::new(),
            physical: PhysicalLayout::new(version),
            logical: LogicalLayout::default(),
            capabilities: HashSet::new(),
            addressing_model: None,
            memory_model: None,
            debugs: Vec::new(),
            annotations: Vec::new(),
            lookup_type: FastHashMap::default(),
            lookup_constant: FastHashMap::default(),
            void_type: None,
            current_function: None,
            consumed: false,
        }
    }

    // === Debug ===

    pub fn set_source(&mut self, language: spirv::SourceLanguage, version: u32) {
        self.debugs.push(instruction_source(language, version));
    }

    pub fn name(&mut self, target: Word, name: &str) {
        if !name.is_empty() {
            self.debugs.push(instruction_name(target, name));
        }
    }

    pub fn member_name(&mut self, target: Word, member: u32, name: &str) {
        if !name.is_empty() {
            self.debugs.push(instruction_member_name(target, member, name));
        }
    }

    // === Function and Basic Block ===

    /// Mints a fresh id without any other side effect. Used to reserve a
    /// function's id ahead of lowering its body, so call sites discovered
    /// first can reference it.
    pub fn reserve_id(&mut self) -> Word {
        self.context.next_id()
    }

    /// Begins building the function that owns `id` (already minted, typically
    /// via `reserve_id`). Fails (panics, an `Internal` invariant) if another
    /// function is already under construction.
    pub fn begin_function(&mut self, id: Word, function_type: Word, return_type: Word, name: Option<&str>) -> Word {
        assert!(
            self.current_function.is_none(),
            "Internal: a function is already under construction"
        );
        self.current_function = Some(InProgressFunction {
            id,
            return_type_id: return_type,
            function_type_id: function_type,
            parameters: Vec::new(),
            variables: Vec::new(),
            blocks: Vec::new(),
            label_to_block: FastHashMap::default(),
            insert_point: None,
        });
        if let Some(name) = name {
            self.name(id, name);
        }
        id
    }

    pub fn add_fn_parameter(&mut self, type_id: Word, name: Option<&str>) -> Word {
        let id = self.context.next_id();
        {
            let func = self.current_function.as_mut().expect("no function under construction");
            assert!(
                func.blocks.is_empty(),
                "Internal: add_fn_parameter called after a basic block was created"
            );
            func.parameters.push(instruction_function_parameter(type_id, id));
        }
        if let Some(name) = name {
            self.name(id, name);
        }
        id
    }

    pub fn add_fn_variable(&mut self, pointer_type: Word, name: Option<&str>, init: Option<Word>) -> Word {
        let id = self.context.next_id();
        let instruction = instruction_variable(pointer_type, id, spirv::StorageClass::Function, init);
        {
            let func = self.current_function.as_mut().expect("no function under construction");
            func.variables.push(instruction);
        }
        if let Some(name) = name {
            self.name(id, name);
        }
        id
    }

    pub fn create_basic_block(&mut self, name: Option<&str>) -> Word {
        let id = self.context.next_id();
        self.adopt_basic_block(id, name);
        id
    }

    /// Registers a basic block under an already-minted label id (typically
    /// from `reserve_id`), for control-flow shapes where the label must be
    /// known before the block exists (e.g. a branch target referenced from
    /// an earlier block).
    pub fn adopt_basic_block(&mut self, label_id: Word, name: Option<&str>) {
        let func = self.current_function.as_mut().expect("no function under construction");
        let index = func.blocks.len();
        func.blocks.push(BasicBlock::new(label_id));
        func.label_to_block.insert(label_id, index);
        drop(func);
        if let Some(name) = name {
            self.name(label_id, name);
        }
    }

    pub fn set_insert_point(&mut self, label_id: Word) {
        let func = self.current_function.as_mut().expect("no function under construction");
        let index = *func
            .label_to_block
            .get(&label_id)
            .expect("Internal: set_insert_point given an unknown label");
        func.insert_point = Some(index);
    }

    pub fn is_current_block_terminated(&self) -> bool {
        let func = self.current_function.as_ref().expect("no function under construction");
        let index = func.insert_point.expect("no insertion point set");
        func.blocks[index].terminated
    }

    pub fn end_function(&mut self) {
        let mut func = self
            .current_function
            .take()
            .expect("Internal: end_function called with no function under construction");

        assert!(!func.blocks.is_empty(), "Internal: function has no basic blocks");
        let variables = std::mem::take(&mut func.variables);
        func.blocks[0].instructions.splice(0..0, variables);

        let words = &mut self.logical.functions;
        instruction_function(func.return_type_id, func.id, spirv::FunctionControl::NONE, func.function_type_id)
            .to_words(words);
        for parameter in &func.parameters {
            parameter.to_words(words);
        }
        for block in &func.blocks {
            assert!(
                block.terminated,
                "Internal: basic block with label {} has no terminator",
                block.label_id
            );
            instruction_label(block.label_id).to_words(words);
            for instruction in &block.instructions {
                instruction.to_words(words);
            }
        }
        instruction_function_end().to_words(words);
    }

    fn push(&mut self, instruction: Instruction) {
        let func = self.current_function.as_mut().expect("no function under construction");
        let index = func.insert_point.expect("no insertion point set");
        let block = &mut func.blocks[index];
        assert!(!block.terminated, "Internal: block already terminated");
        block.instructions.push(instruction);
    }

    fn terminate(&mut self, instruction: Instruction) {
        let func = self.current_function.as_mut().expect("no function under construction");
        let index = func.insert_point.expect("no insertion point set");
        let block = &mut func.blocks[index];
        assert!(!block.terminated, "Internal: block already terminated");
        block.instructions.push(instruction);
        block.terminated = true;
    }

    fn fresh(&mut self) -> Word {
        self.context.next_id()
    }

    // === Control flow primitives ===

    pub fn create_selection_merge(&mut self, merge: Word) {
        self.push(instruction_selection_merge(merge));
    }

    pub fn create_loop_merge(&mut self, merge: Word, continue_target: Word) {
        self.push(instruction_loop_merge(merge, continue_target));
    }

    pub fn create_branch(&mut self, target: Word) {
        self.terminate(instruction_branch(target));
    }

    pub fn create_conditional_branch(&mut self, condition: Word, true_label: Word, false_label: Word) {
        self.terminate(instruction_branch_conditional(condition, true_label, false_label));
    }

    pub fn create_switch(&mut self, merge: Word, selector: Word, default: Word, targets: &[(i32, Word)]) {
        self.create_selection_merge(merge);
        let targets: Vec<(Word, Word)> = targets.iter().map(|&(lit, label)| (lit as u32, label)).collect();
        self.terminate(instruction_switch(selector, default, &targets));
    }

    pub fn create_return(&mut self) {
        self.terminate(instruction_return());
    }

    pub fn create_return_value(&mut self, value: Word) {
        self.terminate(instruction_return_value(value));
    }

    pub fn create_kill(&mut self) {
        self.terminate(instruction_kill());
    }

    pub fn create_unreachable(&mut self) {
        self.terminate(instruction_unreachable());
    }

    // === Value primitives ===

    pub fn create_composite_construct(&mut self, result_type: Word, constituents: &[Word]) -> Word {
        let id = self.fresh();
        self.push(instruction_composite_construct(result_type, id, constituents));
        id
    }

    pub fn create_composite_extract(&mut self, result_type: Word, composite: Word, indexes: &[Word]) -> Word {
        let id = self.fresh();
        self.push(instruction_composite_extract(result_type, id, composite, indexes));
        id
    }

    pub fn create_vector_shuffle(&mut self, result_type: Word, vector1: Word, vector2: Word, selectors: &[Word]) -> Word {
        let id = self.fresh();
        self.push(instruction_vector_shuffle(result_type, id, vector1, vector2, selectors));
        id
    }

    pub fn create_load(&mut self, result_type: Word, pointer: Word) -> Word {
        let id = self.fresh();
        self.push(instruction_load(result_type, id, pointer));
        id
    }

    pub fn create_store(&mut self, pointer: Word, value: Word) {
        let instruction = instruction_store(pointer, value);
        self.push(instruction);
    }

    pub fn create_function_call(&mut self, result_type: Word, function: Word, args: &[Word]) -> Word {
        let id = self.fresh();
        self.push(instruction_function_call(result_type, id, function, args));
        id
    }

    pub fn create_access_chain(&mut self, result_type: Word, base: Word, indexes: &[Word]) -> Word {
        let id = self.fresh();
        self.push(instruction_access_chain(result_type, id, base, indexes));
        id
    }

    pub fn create_unary_op(&mut self, op: spirv::Op, result_type: Word, operand: Word) -> Word {
        let id = self.fresh();
        self.push(instruction_unary_op(op, result_type, id, operand));
        id
    }

    pub fn create_binary_op(&mut self, op: spirv::Op, result_type: Word, lhs: Word, rhs: Word) -> Word {
        let id = self.fresh();
        self.push(instruction_binary_op(op, result_type, id, lhs, rhs));
        id
    }

    pub fn create_vector_times_scalar(&mut self, result_type: Word, vector: Word, scalar: Word) -> Word {
        let id = self.fresh();
        self.push(instruction_vector_times_scalar(result_type, id, vector, scalar));
        id
    }

    pub fn create_select(&mut self, result_type: Word, condition: Word, true_value: Word, false_value: Word) -> Word {
        let id = self.fresh();
        self.push(instruction_select(result_type, id, condition, true_value, false_value));
        id
    }

    // === Types ===

    fn intern_type(&mut self, key: TypeKey, make: impl FnOnce(Word) -> Instruction) -> Word {
        if let Some(&id) = self.lookup_type.get(&key) {
            return id;
        }
        let id = self.context.next_id();
        let instruction = make(id);
        instruction.to_words(&mut self.logical.globals);
        self.lookup_type.insert(key, id);
        id
    }

    pub fn type_void(&mut self) -> Word {
        if let Some(id) = self.void_type {
            return id;
        }
        let id = self.context.next_id();
        instruction_type_void(id).to_words(&mut self.logical.globals);
        self.void_type = Some(id);
        id
    }

    pub fn type_bool(&mut self) -> Word {
        self.intern_type(TypeKey::Bool, instruction_type_bool)
    }

    pub fn type_int(&mut self, width: u32, signed: bool) -> Word {
        let key = TypeKey::Int { width, signed };
        let signedness = if signed { Signedness::Signed } else { Signedness::Unsigned };
        self.intern_type(key, move |id| instruction_type_int(id, width, signedness))
    }

    pub fn type_i32(&mut self) -> Word {
        self.type_int(32, true)
    }

    pub fn type_u32(&mut self) -> Word {
        self.type_int(32, false)
    }

    pub fn type_float(&mut self, width: u32) -> Word {
        self.intern_type(TypeKey::Float { width }, move |id| instruction_type_float(id, width))
    }

    pub fn type_f32(&mut self) -> Word {
        self.type_float(32)
    }

    pub fn type_vector(&mut self, component: Word, count: u32) -> Word {
        let key = TypeKey::Vector { component, count };
        self.intern_type(key, move |id| instruction_type_vector(id, component, count))
    }

    pub fn type_matrix(&mut self, column_type: Word, count: u32) -> Word {
        let key = TypeKey::Matrix { column_type, count };
        self.intern_type(key, move |id| instruction_type_matrix(id, column_type, count))
    }

    pub fn type_pointer(&mut self, pointee: Word, class: spirv::StorageClass) -> Word {
        let key = TypeKey::Pointer {
            pointee,
            class: class.into(),
        };
        self.intern_type(key, move |id| instruction_type_pointer(id, class, pointee))
    }

    pub fn type_struct(&mut self, members: &[Word]) -> Word {
        let key = TypeKey::Struct {
            members: members.to_vec(),
        };
        self.intern_type(key, move |id| instruction_type_struct(id, members))
    }

    pub fn type_array(&mut self, element: Word, length_const: Word) -> Word {
        let key = TypeKey::Array {
            element,
            length: length_const,
        };
        self.intern_type(key, move |id| instruction_type_array(id, element, length_const))
    }

    pub fn type_function(&mut self, ret: Word, params: &[Word]) -> Word {
        let key = TypeKey::Function {
            ret,
            params: params.to_vec(),
        };
        self.intern_type(key, move |id| instruction_type_function(id, ret, params))
    }

    // === Constants ===

    fn intern_constant(&mut self, key: ConstantKey, make: impl FnOnce(Word) -> Instruction) -> Word {
        if let Some(&id) = self.lookup_constant.get(&key) {
            return id;
        }
        let id = self.context.next_id();
        let instruction = make(id);
        instruction.to_words(&mut self.logical.globals);
        self.lookup_constant.insert(key, id);
        id
    }

    pub fn constant_bool(&mut self, value: bool, bool_type: Word) -> Word {
        let key = ConstantKey::Bool(value, bool_type);
        if value {
            self.intern_constant(key, move |id| instruction_constant_true(bool_type, id))
        } else {
            self.intern_constant(key, move |id| instruction_constant_false(bool_type, id))
        }
    }

    pub fn constant_i32(&mut self, value: i32, i32_type: Word) -> Word {
        let bits = value as u32;
        let key = ConstantKey::Bits(bits, i32_type);
        self.intern_constant(key, move |id| instruction_constant(i32_type, id, &[bits]))
    }

    pub fn constant_u32(&mut self, value: u32, u32_type: Word) -> Word {
        let key = ConstantKey::Bits(value, u32_type);
        self.intern_constant(key, move |id| instruction_constant(u32_type, id, &[value]))
    }

    pub fn constant_f32(&mut self, value: f32, f32_type: Word) -> Word {
        let bits = value.to_bits();
        let key = ConstantKey::Bits(bits, f32_type);
        self.intern_constant(key, move |id| instruction_constant(f32_type, id, &[bits]))
    }

    pub fn constant_composite(&mut self, result_type: Word, constituents: &[Word]) -> Word {
        let key = ConstantKey::Composite(result_type, constituents.to_vec());
        let owned = constituents.to_vec();
        self.intern_constant(key, move |id| instruction_constant_composite(result_type, id, &owned))
    }

    // === Module structure ===

    pub fn require_capability(&mut self, capability: spirv::Capability) {
        self.capabilities.insert(capability);
    }

    pub fn set_addressing_model(&mut self, model: spirv::AddressingModel) {
        self.addressing_model = Some(model);
    }

    pub fn set_memory_model(&mut self, model: spirv::MemoryModel) {
        self.memory_model = Some(model);
    }

    pub fn add_entry_point(&mut self, model: spirv::ExecutionModel, target: Word, name: &str, interfaces: &[Word]) {
        instruction_entry_point(model, target, name, interfaces).to_words(&mut self.logical.entry_points);
    }

    pub fn add_execution_mode(&mut self, entry_point: Word, mode: spirv::ExecutionMode, params: &[Word]) {
        instruction_execution_mode(entry_point, mode, params).to_words(&mut self.logical.execution_modes);
    }

    pub fn add_stage_io_variable(&mut self, ty: Word, class: spirv::StorageClass) -> Word {
        let pointer_type = self.type_pointer(ty, class);
        let id = self.context.next_id();
        instruction_variable(pointer_type, id, class, None).to_words(&mut self.logical.globals);
        id
    }

    pub fn add_stage_builtin_variable(&mut self, ty: Word, class: spirv::StorageClass, built_in: spirv::BuiltIn) -> Word {
        let id = self.add_stage_io_variable(ty, class);
        self.annotations
            .push(instruction_decorate(id, spirv::Decoration::BuiltIn, &[built_in as u32]));
        id
    }

    pub fn decorate_location(&mut self, target: Word, location: u32) {
        self.annotations
            .push(instruction_decorate(target, spirv::Decoration::Location, &[location]));
    }

    pub fn decorate_member_offset(&mut self, target: Word, member: u32, offset: u32) {
        self.annotations
            .push(instruction_member_decorate(target, member, spirv::Decoration::Offset, &[offset]));
    }

    // === Finalize ===

    pub fn take_module(mut self) -> Vec<Word> {
        assert!(!self.consumed, "Internal: take_module called twice");
        self.consumed = true;

        for capability in &self.capabilities {
            instruction_capability(*capability).to_words(&mut self.logical.capabilities);
        }
        if let (Some(addressing), Some(memory)) = (self.addressing_model, self.memory_model) {
            instruction_memory_model(addressing, memory).to_words(&mut self.logical.memory_model);
        }
        for instruction in &self.debugs {
            instruction.to_words(&mut self.logical.debugs);
        }
        for instruction in &self.annotations {
            instruction.to_words(&mut self.logical.annotations);
        }

        serialize(&self.physical, &self.logical, self.context.bound())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interns_identical_types_to_the_same_id() {
        let mut builder = Builder::new(0x0001_0000);
        let a = builder.type_f32();
        let b = builder.type_f32();
        assert_eq!(a, b);
        let v1 = builder.type_vector(a, 4);
        let v2 = builder.type_vector(a, 4);
        assert_eq!(v1, v2);
    }

    #[test]
    fn simple_function_round_trips_through_take_module() {
        let mut builder = Builder::new(0x0001_0000);
        builder.set_addressing_model(spirv::AddressingModel::Logical);
        builder.set_memory_model(spirv::MemoryModel::GLSL450);
        builder.require_capability(spirv::Capability::Shader);

        let void = builder.type_void();
        let fn_type = builder.type_function(void, &[]);
        let f = builder.reserve_id();
        builder.begin_function(f, fn_type, void, Some("main"));
        let entry = builder.create_basic_block(Some("bb.entry"));
        builder.set_insert_point(entry);
        builder.create_return();
        builder.end_function();

        builder.add_entry_point(spirv::ExecutionModel::Fragment, f, "main", &[]);

        let words = builder.take_module();
        assert_eq!(words[0], 0x0723_0203);
        assert!(words.len() > 5);
    }

    #[test]
    #[should_panic(expected = "no terminator")]
    fn end_function_panics_on_unterminated_block() {
        let mut builder = Builder::new(0x0001_0000);
        let void = builder.type_void();
        let fn_type = builder.type_function(void, &[]);
        let id = builder.reserve_id();
        builder.begin_function(id, fn_type, void, None);
        let entry = builder.create_basic_block(None);
        builder.set_insert_point(entry);
        builder.end_function();
    }

    #[test]
    fn fn_variable_is_spliced_before_existing_entry_block_instructions() {
        let mut builder = Builder::new(0x0001_0000);
        let void = builder.type_void();
        let i32_ty = builder.type_i32();
        let ptr = builder.type_pointer(i32_ty, spirv::StorageClass::Function);
        let fn_type = builder.type_function(void, &[]);
        let id = builder.reserve_id();
        builder.begin_function(id, fn_type, void, None);
        let entry = builder.create_basic_block(None);
        builder.set_insert_point(entry);
        let dummy_ptr = builder.add_fn_variable(ptr, None, None);
        let _ = builder.create_load(i32_ty, dummy_ptr);
        builder.add_fn_variable(ptr, None, None);
        builder.create_return();
        builder.end_function();
    }
}
