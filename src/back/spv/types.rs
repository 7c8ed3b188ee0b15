//! Type Translator (§4.5): pure mapping from the AST's typed representation
//! to a SPIR-V type id, via the Module Builder's interning constructors.

use super::builder::Builder;
use super::Error;
use crate::ast;

use spirv::Word;

/// Matrices are modelled as rows-of-vectors (§9): an HLSL `floatRxC` becomes
/// `OpTypeMatrix` of `C` columns, each an `R`-component float vector —
/// bounded to 2-4 components per side, the "SPIR-V acceptable" shape the
/// spec calls out.
pub(super) fn translate_type(builder: &mut Builder, ty: &ast::Type) -> Result<Word, Error> {
    match *ty {
        ast::Type::Void => Ok(builder.type_void()),
        ast::Type::Scalar { kind, width } => scalar_type(builder, kind, width),
        ast::Type::Vector { size, kind, width } => {
            let component = scalar_type(builder, kind, width)?;
            Ok(builder.type_vector(component, size.count()))
        }
        ast::Type::Matrix { rows, cols, width } => {
            if width != 4 {
                return Err(Error::Unsupported("only 32-bit matrix components are supported"));
            }
            let component = builder.type_f32();
            let column = builder.type_vector(component, rows.count());
            Ok(builder.type_matrix(column, cols.count()))
        }
        ast::Type::Struct(handle) => Err(Error::Internal(format!(
            "struct type translation requires field types, call translate_struct_type (handle {:?})",
            handle
        ))),
        ast::Type::Array { ref base, size } => {
            let element = translate_type(builder, base)?;
            let width_bytes = builder.type_u32();
            let length = builder.constant_u32(size, width_bytes);
            Ok(builder.type_array(element, length))
        }
    }
}

fn scalar_type(builder: &mut Builder, kind: ast::ScalarKind, width: ast::Bytes) -> Result<Word, Error> {
    if width != 4 {
        return Err(Error::Unsupported("only 32-bit scalar widths are supported"));
    }
    Ok(match kind {
        ast::ScalarKind::Bool => builder.type_bool(),
        ast::ScalarKind::Sint => builder.type_i32(),
        ast::ScalarKind::Uint => builder.type_u32(),
        ast::ScalarKind::Float => builder.type_f32(),
    })
}

/// Translates a struct declaration's field types, in declaration order, and
/// interns the resulting `OpTypeStruct`. Split from `translate_type` because
/// struct field types require resolving `StructDecl` through the owning
/// arena, which `translate_type` alone can't reach.
///
/// Also assigns each member's `Offset` decoration (§4.5), packed tightly in
/// declaration order with each field aligned to its own natural alignment
/// (`vec3` rounds up to a 4-component alignment, same as `vec4`). This crate
/// has no uniform/storage-buffer block surface, so there's no std140/std430
/// `ArrayStride` requirement riding along with it — just the member offsets
/// every `OpTypeStruct` needs regardless of storage class.
pub(super) fn translate_struct_type(
    builder: &mut Builder,
    decl: &ast::StructDecl,
) -> Result<Word, Error> {
    let mut members = Vec::with_capacity(decl.fields.len());
    for (_, field) in decl.fields.iter() {
        members.push(translate_type(builder, &field.ty)?);
    }
    let id = builder.type_struct(&members);
    builder.name(id, &decl.name);
    let mut offset = 0u32;
    for (index, field) in decl.fields.iter().enumerate() {
        builder.member_name(id, index as u32, &field.1.name);
        let (size, align) = size_and_align(&field.1.ty);
        offset = round_up_to_alignment(offset, align);
        builder.decorate_member_offset(id, index as u32, offset);
        offset += size;
    }
    Ok(id)
}

fn round_up_to_alignment(offset: u32, align: u32) -> u32 {
    if align == 0 {
        offset
    } else {
        (offset + align - 1) / align * align
    }
}

/// Byte size and alignment of a field type, for `Offset` placement only.
fn size_and_align(ty: &ast::Type) -> (u32, u32) {
    match *ty {
        ast::Type::Void => (0, 1),
        ast::Type::Scalar { width, .. } => (u32::from(width), u32::from(width)),
        ast::Type::Vector { size, width, .. } => {
            let count = size.count();
            let width = u32::from(width);
            let align = if count == 3 { 4 * width } else { count * width };
            (count * width, align)
        }
        ast::Type::Matrix { rows, cols, width } => {
            let (column_size, column_align) = size_and_align(&ast::Type::Vector {
                size: rows,
                kind: ast::ScalarKind::Float,
                width,
            });
            (column_size * cols.count(), column_align)
        }
        ast::Type::Array { ref base, size } => {
            let (elem_size, elem_align) = size_and_align(base);
            (elem_size * size, elem_align)
        }
        // Nested structs aren't part of this crate's surface: `translate_type`
        // already rejects a `Type::Struct` field before this is ever reached.
        ast::Type::Struct(_) => (0, 4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_and_vector_types_intern() {
        let mut builder = Builder::new(0x0001_0000);
        let f32_ty = ast::Type::Scalar {
            kind: ast::ScalarKind::Float,
            width: 4,
        };
        let vec3 = ast::Type::Vector {
            size: ast::VectorSize::Tri,
            kind: ast::ScalarKind::Float,
            width: 4,
        };
        let id_a = translate_type(&mut builder, &vec3).unwrap();
        let id_b = translate_type(&mut builder, &vec3).unwrap();
        assert_eq!(id_a, id_b);
        let scalar_id = translate_type(&mut builder, &f32_ty).unwrap();
        assert_ne!(scalar_id, id_a);
    }

    #[test]
    fn non_32_bit_width_is_unsupported() {
        let mut builder = Builder::new(0x0001_0000);
        let ty = ast::Type::Scalar {
            kind: ast::ScalarKind::Float,
            width: 8,
        };
        assert!(matches!(translate_type(&mut builder, &ty), Err(Error::Unsupported(_))));
    }

    #[test]
    fn matrix_translates_as_array_of_column_vectors() {
        let mut builder = Builder::new(0x0001_0000);
        let ty = ast::Type::Matrix {
            rows: ast::VectorSize::Quad,
            cols: ast::VectorSize::Quad,
            width: 4,
        };
        assert!(translate_type(&mut builder, &ty).is_ok());
    }
}
