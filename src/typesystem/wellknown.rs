// Copyright 2017 The Australian National University
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::errors::Result;
use crate::serialize::{transform_option_id, TransformationContext};
use crate::typesystem::*;

macro_rules! well_known_table {
    ($name: ident, $id: ty, { $($field: ident),* $(,)* }) => {
        #[derive(Clone, Debug, Default)]
        pub struct $name {
            $(pub $field: Option<$id>),*
        }

        impl $name {
            pub fn apply_transformation(&mut self, context: &mut dyn TransformationContext) -> Result<()> {
                $(transform_option_id(context, &mut self.$field)?;)*
                Ok(())
            }
        }
    }
}

// Runtime types the data layer lays out by hand.
well_known_table!(WellKnownTypes, TypeId, {
    object,
    string,
    array,
    object_header,
    vtable,
    gc_info,
    runtime_type_impl,
    runtime_type_handle,
    code_pointer,
    type_representation,
});

// Fields that get special treatment when descriptors are refreshed or written.
well_known_table!(WellKnownFields, FieldId, {
    object_header_multi_use_word,
    object_header_virtual_table,
    string_array_length,
    string_string_length,
    string_first_char,
    array_num_elements,
    vtable_type,
    vtable_gc_info,
    vtable_method_pointers,
    vtable_interface_map,
    type_representation_method_table,
    type_representation_interface_method_tables,
    runtime_type_impl_handle,
    runtime_type_handle_value,
    code_pointer_target,
});

impl TypeSystem {
    /// A type system holding the runtime types of a 32 bits target:
    ///
    /// ```text
    /// ObjectHeader  { MultiUseWord: u32 @0, VirtualTable: VTable @4 }                    size 8
    /// String        { m_arrayLength: u32 @0, m_stringLength: u32 @4, m_firstChar: char @8 }
    ///               base 8, element 2
    /// Array         { m_numElements: u32 @0 }                                           base 4
    /// VTable        { BaseSize @0, ElementSize @4, Type @8, GCInfo @12,
    ///                 MethodPointers @16, InterfaceMap @20 }                            size 24
    /// ```
    pub fn with_runtime_types() -> TypeSystem {
        let mut ts = TypeSystem::new();

        let object = ts.add_type("Object", TypeKind::Class, None, 0);
        ts.well_known_types.object = Some(object);

        for kind in ALL_SCALAR_KINDS.iter() {
            ts.add_type(scalar_type_name(*kind), TypeKind::Scalar(*kind), None, kind.size());
        }
        let (u8_type, u32_type, char_type, intptr_type) = match (
            ts.scalar_type(ScalarKind::U8), ts.scalar_type(ScalarKind::U32),
            ts.scalar_type(ScalarKind::Char), ts.scalar_type(ScalarKind::IntPtr)) {
            (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
            _ => unreachable!()
        };

        let array = ts.add_type("Array", TypeKind::Abstract, Some(object), 4);
        ts.well_known_types.array = Some(array);
        let string = ts.add_type("String", TypeKind::Class, Some(object), 8);
        let object_header = ts.add_type("ObjectHeader", TypeKind::Value, None, 8);
        let vtable = ts.add_type("VTable", TypeKind::Class, Some(object), 24);
        let gc_info = ts.add_type("GCInfo", TypeKind::Value, None, 4);
        let runtime_type_impl = ts.add_type("RuntimeTypeImpl", TypeKind::Class, Some(object), 4);
        let runtime_type_handle = ts.add_type("RuntimeTypeHandle", TypeKind::Value, None, 4);
        let code_pointer = ts.add_type("CodePointer", TypeKind::Value, None, 4);
        let type_representation = ts.add_type("TypeRepresentation", TypeKind::Class, Some(object), 12);

        let u8_array = ts.array_of(u8_type);
        let code_pointer_array = ts.array_of(code_pointer);
        let object_array = ts.array_of(object);

        {
            let wkt = &mut ts.well_known_types;
            wkt.string = Some(string);
            wkt.object_header = Some(object_header);
            wkt.vtable = Some(vtable);
            wkt.gc_info = Some(gc_info);
            wkt.runtime_type_impl = Some(runtime_type_impl);
            wkt.runtime_type_handle = Some(runtime_type_handle);
            wkt.code_pointer = Some(code_pointer);
            wkt.type_representation = Some(type_representation);
        }

        let f = ts.add_field(object_header, "MultiUseWord", u32_type, 0);
        ts.well_known_fields.object_header_multi_use_word = Some(f);
        let f = ts.add_field(object_header, "VirtualTable", vtable, 4);
        ts.well_known_fields.object_header_virtual_table = Some(f);

        let f = ts.add_field(string, "m_arrayLength", u32_type, 0);
        ts.well_known_fields.string_array_length = Some(f);
        let f = ts.add_field(string, "m_stringLength", u32_type, 4);
        ts.well_known_fields.string_string_length = Some(f);
        let f = ts.add_field(string, "m_firstChar", char_type, 8);
        ts.well_known_fields.string_first_char = Some(f);
        ts.types[string.index()].layout = VTableLayout { base_size: 8, element_size: 2 };

        let f = ts.add_field(array, "m_numElements", u32_type, 0);
        ts.well_known_fields.array_num_elements = Some(f);

        ts.add_field(vtable, "BaseSize", u32_type, 0);
        ts.add_field(vtable, "ElementSize", u32_type, 4);
        let f = ts.add_field(vtable, "Type", runtime_type_impl, 8);
        ts.well_known_fields.vtable_type = Some(f);
        let f = ts.add_field(vtable, "GCInfo", gc_info, 12);
        ts.well_known_fields.vtable_gc_info = Some(f);
        let f = ts.add_field(vtable, "MethodPointers", code_pointer_array, 16);
        ts.well_known_fields.vtable_method_pointers = Some(f);
        let f = ts.add_field(vtable, "InterfaceMap", object_array, 20);
        ts.well_known_fields.vtable_interface_map = Some(f);

        ts.add_field(gc_info, "Pointers", u8_array, 0);

        let f = ts.add_field(runtime_type_impl, "m_handle", runtime_type_handle, 0);
        ts.well_known_fields.runtime_type_impl_handle = Some(f);
        let f = ts.add_field(runtime_type_handle, "m_value", vtable, 0);
        ts.well_known_fields.runtime_type_handle_value = Some(f);

        let f = ts.add_field(code_pointer, "Target", intptr_type, 0);
        ts.well_known_fields.code_pointer_target = Some(f);

        ts.add_field(type_representation, "m_vTable", vtable, 0);
        let f = ts.add_field(type_representation, "m_methodTable", code_pointer_array, 4);
        ts.well_known_fields.type_representation_method_table = Some(f);
        let f = ts.add_field(type_representation, "m_interfaceMethodTables", object_array, 8);
        ts.well_known_fields.type_representation_interface_method_tables = Some(f);

        ts.create_virtual_tables();

        debug!("runtime type system bootstrapped with {} types", ts.types_count());
        ts
    }
}

fn scalar_type_name(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::Bool => "Boolean",
        ScalarKind::Char => "Char",
        ScalarKind::I8 => "SByte",
        ScalarKind::U8 => "Byte",
        ScalarKind::I16 => "Int16",
        ScalarKind::U16 => "UInt16",
        ScalarKind::I32 => "Int32",
        ScalarKind::U32 => "UInt32",
        ScalarKind::I64 => "Int64",
        ScalarKind::U64 => "UInt64",
        ScalarKind::F32 => "Single",
        ScalarKind::F64 => "Double",
        ScalarKind::IntPtr => "IntPtr",
        ScalarKind::UIntPtr => "UIntPtr",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_layout() {
        let ts = TypeSystem::with_runtime_types();
        let wkt = ts.well_known_types();
        let wkf = ts.well_known_fields();

        let string = wkt.string.unwrap();
        assert_eq!(ts.get_type(string).layout, VTableLayout { base_size: 8, element_size: 2 });
        assert_eq!(ts.get_field(wkf.string_first_char.unwrap()).offset, 8);
        assert_eq!(ts.get_type(wkt.object_header.unwrap()).size, 8);
        assert_eq!(ts.get_field(wkf.object_header_virtual_table.unwrap()).offset, 4);

        let byte_array = ts.find_type("Byte[]").unwrap();
        assert_eq!(ts.element_type(byte_array), ts.scalar_type(ScalarKind::U8));
    }

    #[test]
    fn test_virtual_tables() {
        let mut ts = TypeSystem::with_runtime_types();
        let i32_type = ts.scalar_type(ScalarKind::I32).unwrap();
        let int_array = ts.array_of(i32_type);

        assert_eq!(ts.full_name(int_array), "Int32[]");
        assert_eq!(ts.get_type(int_array).layout, VTableLayout { base_size: 4, element_size: 4 });
        assert_eq!(ts.array_of(i32_type), int_array);

        // every reference type gets a virtual table, value types do not
        let vtable = ts.get_type(int_array).virtual_table.clone().unwrap();
        assert_eq!(vtable.type_id(), ts.well_known_types().vtable.unwrap());
        assert!(ts.get_type(i32_type).virtual_table.is_none());

        let vtable_type = ts.well_known_types().vtable.unwrap();
        let vtable_of_vtable = ts.get_type(vtable_type).virtual_table.clone().unwrap();
        assert_eq!(vtable_of_vtable.type_id(), vtable_type);
    }

    #[test]
    fn test_assignability() {
        let mut ts = TypeSystem::with_runtime_types();
        let wkt = ts.well_known_types().clone();
        let object = wkt.object.unwrap();
        let string = wkt.string.unwrap();
        let i32_type = ts.scalar_type(ScalarKind::I32).unwrap();

        assert!(ts.can_be_assigned_from(object, string));
        assert!(!ts.can_be_assigned_from(string, object));
        assert!(!ts.can_be_assigned_from(object, i32_type));

        let string_array = ts.array_of(string);
        let object_array = ts.array_of(object);
        let int_array = ts.array_of(i32_type);
        assert!(ts.can_be_assigned_from(object_array, string_array));
        assert!(!ts.can_be_assigned_from(object_array, int_array));
        assert!(ts.can_be_assigned_from(wkt.array.unwrap(), int_array));

        assert_eq!(ts.size_of_holding_variable(string), 4);
        assert_eq!(ts.size_of_holding_variable(ts.scalar_type(ScalarKind::F64).unwrap()), 8);
    }
}
