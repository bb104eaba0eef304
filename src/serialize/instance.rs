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

use std::collections::HashMap;

use crate::data::{BitFieldDefinition, BitFieldSection, DataDescriptor};
use crate::debug::{DebugInfo, SourceCode};
use crate::host::HostObject;
use crate::image::PlacementRequirements;
use crate::typesystem::{FieldRepresentation, MethodRepresentation, TypeRepresentation, TypeSystem};

/// A freshly created entity, before its contents are read.
pub enum Instance {
    TypeSystem(TypeSystem),
    Type(TypeRepresentation),
    Field(FieldRepresentation),
    Method(MethodRepresentation),
    BitField(BitFieldDefinition),
    BitFieldSection(BitFieldSection),
    Descriptor(DataDescriptor),
    Host(HostObject),
    DebugInfo(DebugInfo),
    SourceCode(SourceCode),
    Placement(PlacementRequirements),
}

impl Instance {
    pub fn serial_name(&self) -> &'static str {
        match *self {
            Instance::TypeSystem(_) => "TypeSystem",
            Instance::Type(_) => "TypeRepresentation",
            Instance::Field(_) => "FieldRepresentation",
            Instance::Method(_) => "MethodRepresentation",
            Instance::BitField(_) => "BitFieldDefinition",
            Instance::BitFieldSection(_) => "BitFieldSection",
            Instance::Descriptor(ref dd) => dd.kind.serial_name(),
            Instance::Host(_) => "HostObject",
            Instance::DebugInfo(_) => "DebugInfo",
            Instance::SourceCode(_) => "SourceCode",
            Instance::Placement(_) => "PlacementRequirements",
        }
    }

    /// a new empty entity of the named type
    pub fn for_name(name: &str) -> Option<Instance> {
        CONSTRUCTORS.get(name).map(|ctor| ctor())
    }
}

pub type Constructor = fn() -> Instance;

lazy_static! {
    pub static ref CONSTRUCTORS: HashMap<&'static str, Constructor> = {
        let mut ret: HashMap<&'static str, Constructor> = HashMap::new();
        ret.insert("TypeSystem", || Instance::TypeSystem(TypeSystem::new()));
        ret.insert("TypeRepresentation", || Instance::Type(TypeRepresentation::default()));
        ret.insert("FieldRepresentation", || Instance::Field(FieldRepresentation::default()));
        ret.insert("MethodRepresentation", || Instance::Method(MethodRepresentation::default()));
        ret.insert("BitFieldDefinition", || Instance::BitField(BitFieldDefinition::new()));
        ret.insert("BitFieldSection", || Instance::BitFieldSection(BitFieldSection::default()));
        ret.insert("ObjectDescriptor", || Instance::Descriptor(DataDescriptor::empty_object()));
        ret.insert("ArrayDescriptor", || Instance::Descriptor(DataDescriptor::empty_array()));
        ret.insert("ExternalDataDescriptor", || Instance::Descriptor(DataDescriptor::empty_external()));
        ret.insert("HostObject", || Instance::Host(HostObject::default()));
        ret.insert("DebugInfo", || Instance::DebugInfo(DebugInfo::default()));
        ret.insert("SourceCode", || Instance::SourceCode(SourceCode::default()));
        ret.insert("PlacementRequirements", || Instance::Placement(PlacementRequirements::default()));
        ret
    };
}
