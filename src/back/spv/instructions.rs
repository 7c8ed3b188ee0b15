//! Instruction Builder (§4.2): formats one SPIR-V instruction at a time into
//! a word buffer. Each `instruction_*` free function here builds exactly one
//! instruction; callers (the Module Builder) decide which section it lands
//! in.

use super::helpers;
use spirv::Word;

pub(super) enum Signedness {
    Unsigned = 0,
    Signed = 1,
}

/// A single SPIR-V instruction: an opcode, an optional result type and
/// result id (which, per the grammar, always appear in that order right
/// after the opcode word when present), and the remaining operand words.
pub(crate) struct Instruction {
    op: spirv::Op,
    type_id: Option<Word>,
    result_id: Option<Word>,
    operands: Vec<Word>,
}

impl Instruction {
    pub fn new(op: spirv::Op) -> Self {
        Instruction {
            op,
            type_id: None,
            result_id: None,
            operands: Vec::new(),
        }
    }

    pub fn set_type(&mut self, type_id: Word) {
        self.type_id = Some(type_id);
    }

    pub fn set_result(&mut self, result_id: Word) {
        self.result_id = Some(result_id);
    }

    pub fn add_operand(&mut self, operand: Word) {
        self.operands.push(operand);
    }

    pub fn add_operands(&mut self, operands: impl IntoIterator<Item = Word>) {
        self.operands.extend(operands);
    }

    pub fn result_id(&self) -> Option<Word> {
        self.result_id
    }

    /// Appends this instruction's words to `sink`. The word-count in the
    /// header is recomputed from what actually got written, per the
    /// invariant in §3 (`Instruction`: "Word-count field in header equals
    /// actual word length").
    pub fn to_words(&self, sink: &mut Vec<Word>) {
        let mut word_count = 1u32;
        word_count += self.type_id.is_some() as u32;
        word_count += self.result_id.is_some() as u32;
        word_count += self.operands.len() as u32;

        sink.push((word_count << 16) | (self.op as u32));
        if let Some(type_id) = self.type_id {
            sink.push(type_id);
        }
        if let Some(result_id) = self.result_id {
            sink.push(result_id);
        }
        sink.extend_from_slice(&self.operands);
    }
}

//
// Debug Instructions
//

pub(super) fn instruction_source(source_language: spirv::SourceLanguage, version: u32) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Source);
    instruction.add_operand(source_language as u32);
    instruction.add_operands(helpers::bytes_to_words(&version.to_le_bytes()));
    instruction
}

pub(super) fn instruction_name(target_id: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Name);
    instruction.add_operand(target_id);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

pub(super) fn instruction_member_name(target_id: Word, member: u32, name: &str) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::MemberName);
    instruction.add_operand(target_id);
    instruction.add_operand(member);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

//
// Annotation Instructions
//

pub(super) fn instruction_decorate(
    target_id: Word,
    decoration: spirv::Decoration,
    operands: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Decorate);
    instruction.add_operand(target_id);
    instruction.add_operand(decoration as u32);
    for operand in operands {
        instruction.add_operand(*operand);
    }
    instruction
}

pub(super) fn instruction_member_decorate(
    target_id: Word,
    member: u32,
    decoration: spirv::Decoration,
    operands: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::MemberDecorate);
    instruction.add_operand(target_id);
    instruction.add_operand(member);
    instruction.add_operand(decoration as u32);
    for operand in operands {
        instruction.add_operand(*operand);
    }
    instruction
}

//
// Extension Instructions
//

pub(super) fn instruction_ext_inst_import(id: Word, name: &str) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ExtInstImport);
    instruction.set_result(id);
    instruction.add_operands(helpers::string_to_words(name));
    instruction
}

//
// Mode-Setting Instructions
//

pub(super) fn instruction_memory_model(
    addressing_model: spirv::AddressingModel,
    memory_model: spirv::MemoryModel,
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::MemoryModel);
    instruction.add_operand(addressing_model as u32);
    instruction.add_operand(memory_model as u32);
    instruction
}

pub(super) fn instruction_entry_point(
    execution_model: spirv::ExecutionModel,
    entry_point_id: Word,
    name: &str,
    interface_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::EntryPoint);
    instruction.add_operand(execution_model as u32);
    instruction.add_operand(entry_point_id);
    instruction.add_operands(helpers::string_to_words(name));
    for interface_id in interface_ids {
        instruction.add_operand(*interface_id);
    }
    instruction
}

pub(super) fn instruction_execution_mode(
    entry_point_id: Word,
    execution_mode: spirv::ExecutionMode,
    params: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ExecutionMode);
    instruction.add_operand(entry_point_id);
    instruction.add_operand(execution_mode as u32);
    for param in params {
        instruction.add_operand(*param);
    }
    instruction
}

pub(super) fn instruction_capability(capability: spirv::Capability) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Capability);
    instruction.add_operand(capability as u32);
    instruction
}

//
// Type-Declaration Instructions
//

pub(super) fn instruction_type_void(id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeVoid);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_bool(id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeBool);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_type_int(id: Word, width: Word, signedness: Signedness) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeInt);
    instruction.set_result(id);
    instruction.add_operand(width);
    instruction.add_operand(signedness as u32);
    instruction
}

pub(super) fn instruction_type_float(id: Word, width: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeFloat);
    instruction.set_result(id);
    instruction.add_operand(width);
    instruction
}

pub(super) fn instruction_type_vector(id: Word, component_type_id: Word, component_count: u32) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeVector);
    instruction.set_result(id);
    instruction.add_operand(component_type_id);
    instruction.add_operand(component_count);
    instruction
}

pub(super) fn instruction_type_matrix(id: Word, column_type_id: Word, column_count: u32) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeMatrix);
    instruction.set_result(id);
    instruction.add_operand(column_type_id);
    instruction.add_operand(column_count);
    instruction
}

pub(super) fn instruction_type_array(id: Word, element_type_id: Word, length_id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeArray);
    instruction.set_result(id);
    instruction.add_operand(element_type_id);
    instruction.add_operand(length_id);
    instruction
}

pub(super) fn instruction_type_struct(id: Word, member_ids: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeStruct);
    instruction.set_result(id);
    for member_id in member_ids {
        instruction.add_operand(*member_id);
    }
    instruction
}

pub(super) fn instruction_type_pointer(id: Word, storage_class: spirv::StorageClass, type_id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypePointer);
    instruction.set_result(id);
    instruction.add_operand(storage_class as u32);
    instruction.add_operand(type_id);
    instruction
}

pub(super) fn instruction_type_function(id: Word, return_type_id: Word, parameter_ids: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::TypeFunction);
    instruction.set_result(id);
    instruction.add_operand(return_type_id);
    for parameter_id in parameter_ids {
        instruction.add_operand(*parameter_id);
    }
    instruction
}

//
// Constant-Creation Instructions
//

pub(super) fn instruction_constant_true(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ConstantTrue);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant_false(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ConstantFalse);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_constant(result_type_id: Word, id: Word, values: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Constant);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    for value in values {
        instruction.add_operand(*value);
    }
    instruction
}

pub(super) fn instruction_constant_composite(result_type_id: Word, id: Word, constituent_ids: &[Word]) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ConstantComposite);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    for constituent_id in constituent_ids {
        instruction.add_operand(*constituent_id);
    }
    instruction
}

//
// Memory Instructions
//

pub(super) fn instruction_variable(
    result_type_id: Word,
    id: Word,
    storage_class: spirv::StorageClass,
    initializer_id: Option<Word>,
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Variable);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(storage_class as u32);
    if let Some(initializer_id) = initializer_id {
        instruction.add_operand(initializer_id);
    }
    instruction
}

pub(super) fn instruction_load(result_type_id: Word, id: Word, pointer_id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Load);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(pointer_id);
    instruction
}

pub(super) fn instruction_store(pointer_id: Word, object_id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Store);
    instruction.add_operand(pointer_id);
    instruction.add_operand(object_id);
    instruction
}

pub(super) fn instruction_access_chain(
    result_type_id: Word,
    id: Word,
    base_id: Word,
    indexes: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::AccessChain);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(base_id);
    for index in indexes {
        instruction.add_operand(*index);
    }
    instruction
}

//
// Function Instructions
//

pub(super) fn instruction_function(
    return_type_id: Word,
    id: Word,
    function_control: spirv::FunctionControl,
    function_type_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Function);
    instruction.set_type(return_type_id);
    instruction.set_result(id);
    instruction.add_operand(function_control.bits());
    instruction.add_operand(function_type_id);
    instruction
}

pub(super) fn instruction_function_parameter(result_type_id: Word, id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::FunctionParameter);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_function_end() -> Instruction {
    Instruction::new(spirv::Op::FunctionEnd)
}

pub(super) fn instruction_function_call(
    result_type_id: Word,
    id: Word,
    function_id: Word,
    argument_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::FunctionCall);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(function_id);
    for argument_id in argument_ids {
        instruction.add_operand(*argument_id);
    }
    instruction
}

//
// Conversion Instructions
//

fn instruction_unary(op: spirv::Op, result_type_id: Word, id: Word, value: Word) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(value);
    instruction
}

pub(super) fn instruction_unary_op(op: spirv::Op, result_type_id: Word, id: Word, operand: Word) -> Instruction {
    instruction_unary(op, result_type_id, id, operand)
}

//
// Composite Instructions
//

pub(super) fn instruction_composite_construct(
    result_type_id: Word,
    id: Word,
    constituent_ids: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::CompositeConstruct);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    for constituent_id in constituent_ids {
        instruction.add_operand(*constituent_id);
    }
    instruction
}

pub(super) fn instruction_composite_extract(
    result_type_id: Word,
    id: Word,
    composite_id: Word,
    indexes: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::CompositeExtract);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(composite_id);
    for index in indexes {
        instruction.add_operand(*index);
    }
    instruction
}

pub(super) fn instruction_vector_shuffle(
    result_type_id: Word,
    id: Word,
    vector1_id: Word,
    vector2_id: Word,
    selectors: &[Word],
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::VectorShuffle);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(vector1_id);
    instruction.add_operand(vector2_id);
    for selector in selectors {
        instruction.add_operand(*selector);
    }
    instruction
}

//
// Arithmetic Instructions
//

pub(super) fn instruction_vector_times_scalar(
    result_type_id: Word,
    id: Word,
    vector_id: Word,
    scalar_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::VectorTimesScalar);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(vector_id);
    instruction.add_operand(scalar_id);
    instruction
}

pub(super) fn instruction_binary_op(
    op: spirv::Op,
    result_type_id: Word,
    id: Word,
    lhs: Word,
    rhs: Word,
) -> Instruction {
    let mut instruction = Instruction::new(op);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(lhs);
    instruction.add_operand(rhs);
    instruction
}

pub(super) fn instruction_select(
    result_type_id: Word,
    id: Word,
    condition: Word,
    true_id: Word,
    false_id: Word,
) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Select);
    instruction.set_type(result_type_id);
    instruction.set_result(id);
    instruction.add_operand(condition);
    instruction.add_operand(true_id);
    instruction.add_operand(false_id);
    instruction
}

//
// Control-Flow Instructions
//

pub(super) fn instruction_label(id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Label);
    instruction.set_result(id);
    instruction
}

pub(super) fn instruction_branch(target_label: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Branch);
    instruction.add_operand(target_label);
    instruction
}

pub(super) fn instruction_branch_conditional(condition: Word, true_label: Word, false_label: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::BranchConditional);
    instruction.add_operand(condition);
    instruction.add_operand(true_label);
    instruction.add_operand(false_label);
    instruction
}

pub(super) fn instruction_selection_merge(merge_label: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::SelectionMerge);
    instruction.add_operand(merge_label);
    instruction.add_operand(spirv::SelectionControl::NONE.bits());
    instruction
}

pub(super) fn instruction_loop_merge(merge_label: Word, continue_label: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::LoopMerge);
    instruction.add_operand(merge_label);
    instruction.add_operand(continue_label);
    instruction.add_operand(spirv::LoopControl::NONE.bits());
    instruction
}

pub(super) fn instruction_switch(selector: Word, default: Word, targets: &[(Word, Word)]) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::Switch);
    instruction.add_operand(selector);
    instruction.add_operand(default);
    for (literal, label) in targets {
        instruction.add_operand(*literal);
        instruction.add_operand(*label);
    }
    instruction
}

pub(super) fn instruction_return() -> Instruction {
    Instruction::new(spirv::Op::Return)
}

pub(super) fn instruction_return_value(value_id: Word) -> Instruction {
    let mut instruction = Instruction::new(spirv::Op::ReturnValue);
    instruction.add_operand(value_id);
    instruction
}

pub(super) fn instruction_kill() -> Instruction {
    Instruction::new(spirv::Op::Kill)
}

pub(super) fn instruction_unreachable() -> Instruction {
    Instruction::new(spirv::Op::Unreachable)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_of(instruction: &Instruction) -> Vec<Word> {
        let mut out = Vec::new();
        instruction.to_words(&mut out);
        out
    }

    #[test]
    fn word_count_matches_actual_length() {
        let instruction = instruction_type_int(7, 32, Signedness::Signed);
        let words = words_of(&instruction);
        let wc = words[0] >> 16;
        assert_eq!(wc as usize, words.len());
        assert_eq!(words[0] & 0xffff, spirv::Op::TypeInt as u32);
        assert_eq!(&words[1..], &[7, 32, 1]);
    }

    #[test]
    fn string_operands_are_nul_terminated_and_padded() {
        let instruction = instruction_name(3, "ab");
        let words = words_of(&instruction);
        // opcode+wc, target, then one word of padded "ab\0\0"
        assert_eq!(words.len(), 3);
        assert_eq!(words[2].to_le_bytes(), *b"ab\0\0");
    }

    #[test]
    fn entry_point_lists_all_interfaces() {
        let instruction = instruction_entry_point(spirv::ExecutionModel::Fragment, 1, "main", &[2, 3]);
        let words = words_of(&instruction);
        assert_eq!(words.last(), Some(&3));
        assert_eq!(words[words.len() - 2], 2);
    }

    #[test]
    fn switch_emits_literal_label_pairs_in_order() {
        let instruction = instruction_switch(1, 9, &[(2, 10), (3, 11)]);
        let words = words_of(&instruction);
        assert_eq!(&words[2..], &[1, 9, 2, 10, 3, 11]);
    }
}
