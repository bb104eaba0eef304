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

//! Transformations of composite slots, written once against `TransformationContext`.

use std::hash::Hash;
use std::sync::Arc;

use zdata_utils::LinkedHashMap;

use crate::data::{DataValue, DescriptorId};
use crate::debug::DebugInfo;
use crate::errors::{DataError, Result};
use crate::host::{HostObject, HostRef, HostValue};
use crate::serialize::*;
use crate::typesystem::{ScalarKind, ScalarValue, TypeId, TypeSystem};

// scalars and identifiers

pub fn transform_required_string(context: &mut dyn TransformationContext, v: &mut String) -> Result<()> {
    let mut slot = Some(v.clone());
    context.transform_string(&mut slot)?;
    *v = slot.ok_or_else(|| DataError::Format("unexpected null string".to_string()))?;
    Ok(())
}

pub fn transform_id<T: ArenaId>(context: &mut dyn TransformationContext, id: &mut T) -> Result<()> {
    let mut raw = id.raw();
    context.transform_u32(&mut raw)?;
    *id = T::from_raw(raw);
    Ok(())
}

pub fn transform_option_id<T: ArenaId>(context: &mut dyn TransformationContext, id: &mut Option<T>) -> Result<()> {
    let mut present = id.is_some();
    context.transform_bool(&mut present)?;

    let mut raw = id.map_or(0, |id| id.raw());
    context.transform_u32(&mut raw)?;

    *id = if present { Some(T::from_raw(raw)) } else { None };
    Ok(())
}

pub fn transform_id_list<T: ArenaId>(context: &mut dyn TransformationContext, ids: &mut Vec<T>) -> Result<()> {
    let mut raw: Vec<u32> = ids.iter().map(|id| id.raw()).collect();
    transform_required_u32_array(context, &mut raw)?;
    *ids = raw.into_iter().map(T::from_raw).collect();
    Ok(())
}

// arrays

fn unexpected_null_array() -> DataError {
    DataError::Format("unexpected null array".to_string())
}

/// transforms the `count` elements of `items`, whose count is already transformed.
/// Readers rebuild `items` as elements arrive, never sized by `count` alone.
pub fn transform_items<T, FI, F>(context: &mut dyn TransformationContext, items: &mut Vec<T>, count: i32, what: &str,
                                 mut init: FI, mut f: F) -> Result<()>
    where FI: FnMut() -> T,
          F: FnMut(&mut dyn TransformationContext, &mut T) -> Result<()>
{
    if count < 0 {
        return Err(DataError::Format(format!("negative {} length {}", what, count)));
    }

    if context.is_reading() {
        items.clear();
        for _ in 0..count {
            let mut item = init();
            f(&mut *context, &mut item)?;
            items.push(item);
        }
    } else {
        for item in items.iter_mut() {
            f(&mut *context, item)?;
        }
    }
    Ok(())
}

/// transforms the length and the elements of an array whose head is already transformed
pub fn transform_array_contents<T, F>(context: &mut dyn TransformationContext, items: &mut Vec<T>, f: F) -> Result<()>
    where T: Clone + Default,
          F: FnMut(&mut dyn TransformationContext, &mut T) -> Result<()>
{
    let mut len = items.len() as i32;
    context.transform_i32(&mut len)?;
    transform_items(context, items, len, "array", T::default, f)
}

/// an array of `elem`, null or owned by the slot
pub fn transform_array<T, F>(context: &mut dyn TransformationContext, slot: &mut Option<Vec<T>>, elem: SerialType, f: F) -> Result<()>
    where T: Clone + Default,
          F: FnMut(&mut dyn TransformationContext, &mut T) -> Result<()>
{
    let ty = SerialType::array_of(elem);
    let presence = if slot.is_some() { Presence::Fresh(&ty) } else { Presence::Null };

    match context.transform_signature(presence, Some(&ty))? {
        Signature::Null => {
            *slot = None;
            Ok(())
        }
        Signature::Fresh { ty: ref actual, .. } if *actual == ty => {
            let items = slot.get_or_insert_with(Vec::new);
            transform_array_contents(context, items, f)
        }
        Signature::Fresh { ty: actual, .. } => Err(DataError::Format(format!("expected {}, found {}", ty, actual))),
        Signature::BackRef(_) => Err(protocol_error!("arrays of {} cannot be shared", ty)),
    }
}

pub fn transform_byte_array(context: &mut dyn TransformationContext, v: &mut Vec<u8>) -> Result<()> {
    let mut slot = Some(v.clone());
    context.transform_bytes(&mut slot)?;
    *v = slot.ok_or_else(unexpected_null_array)?;
    Ok(())
}

pub fn transform_chars(context: &mut dyn TransformationContext, v: &mut Option<Vec<u16>>) -> Result<()> {
    transform_array(context, v, ScalarKind::Char.serial_type(), |context, c| context.transform_u16(c))
}

pub fn transform_required_chars(context: &mut dyn TransformationContext, v: &mut Vec<u16>) -> Result<()> {
    let mut slot = Some(v.clone());
    transform_chars(context, &mut slot)?;
    *v = slot.ok_or_else(unexpected_null_array)?;
    Ok(())
}

pub fn transform_i32_array(context: &mut dyn TransformationContext, v: &mut Option<Vec<i32>>) -> Result<()> {
    transform_array(context, v, ScalarKind::I32.serial_type(), |context, x| context.transform_i32(x))
}

pub fn transform_required_i32_array(context: &mut dyn TransformationContext, v: &mut Vec<i32>) -> Result<()> {
    let mut slot = Some(v.clone());
    transform_i32_array(context, &mut slot)?;
    *v = slot.ok_or_else(unexpected_null_array)?;
    Ok(())
}

pub fn transform_u32_array(context: &mut dyn TransformationContext, v: &mut Option<Vec<u32>>) -> Result<()> {
    transform_array(context, v, ScalarKind::U32.serial_type(), |context, x| context.transform_u32(x))
}

pub fn transform_required_u32_array(context: &mut dyn TransformationContext, v: &mut Vec<u32>) -> Result<()> {
    let mut slot = Some(v.clone());
    transform_u32_array(context, &mut slot)?;
    *v = slot.ok_or_else(unexpected_null_array)?;
    Ok(())
}

pub fn transform_string_list(context: &mut dyn TransformationContext, v: &mut Option<Vec<String>>) -> Result<()> {
    transform_array(context, v, SerialType::string(), |context, s| transform_required_string(context, s))
}

// entities

/// an owned entity, possibly null
pub fn transform_owned<T: Persistent>(context: &mut dyn TransformationContext, slot: &mut Option<T>) -> Result<()> {
    let declared = T::declared_type();
    let runtime = slot.as_ref().map(|v| v.runtime_type());
    let presence = match runtime {
        Some(ref ty) => Presence::Fresh(ty),
        None => Presence::Null
    };

    match context.transform_signature(presence, Some(&declared))? {
        Signature::Null => {
            *slot = None;
            Ok(())
        }
        Signature::Fresh { ty, .. } => {
            if context.is_reading() {
                *slot = Some(T::from_instance(context.create_instance(&ty)?)?);
            }
            match *slot {
                Some(ref mut v) => v.apply_transformation(context),
                None => Err(protocol_error!("no {} to write", declared))
            }
        }
        Signature::BackRef(_) => Err(protocol_error!("{} is owned by a single slot", declared)),
    }
}

/// an owned entity that is never null
pub fn transform_owned_in_place<T: Persistent>(context: &mut dyn TransformationContext, v: &mut T) -> Result<()> {
    let declared = T::declared_type();
    let runtime = v.runtime_type();

    match context.transform_signature(Presence::Fresh(&runtime), Some(&declared))? {
        Signature::Fresh { ty, .. } => {
            if context.is_reading() {
                *v = T::from_instance(context.create_instance(&ty)?)?;
            }
            v.apply_transformation(context)
        }
        Signature::Null => Err(DataError::Format(format!("unexpected null {}", declared))),
        Signature::BackRef(_) => Err(protocol_error!("{} is owned by a single slot", declared)),
    }
}

/// a list of owned entities: count, then each element
pub fn transform_list<T: Persistent>(context: &mut dyn TransformationContext, list: &mut Vec<T>) -> Result<()> {
    let ty = SerialType::list_of(T::declared_type());
    match context.transform_signature(Presence::Fresh(&ty), Some(&ty))? {
        Signature::Fresh { .. } => {}
        Signature::Null => {
            list.clear();
            return Ok(());
        }
        Signature::BackRef(_) => return Err(protocol_error!("{} is owned by a single slot", ty)),
    }

    let mut count = list.len() as i32;
    context.transform_i32(&mut count)?;
    if count < 0 {
        return Err(DataError::Format(format!("negative list length {}", count)));
    }

    if context.is_reading() {
        list.clear();
        for _ in 0..count {
            let mut item = None;
            transform_owned(&mut *context, &mut item)?;
            list.push(item.ok_or_else(|| DataError::Format(format!("unexpected null in {}", ty)))?);
        }
    } else {
        for item in list.iter_mut() {
            transform_owned_in_place(&mut *context, item)?;
        }
    }
    Ok(())
}

/// an ordered map: count, then key and value of each entry. The map is rebuilt from
/// the transformed entries, in stream order.
pub fn transform_map<K, V, FK, FV>(context: &mut dyn TransformationContext, map: &mut LinkedHashMap<K, V>, ty: &SerialType,
                                   mut key_fn: FK, mut val_fn: FV) -> Result<()>
    where K: Hash + Eq + Clone + Default,
          V: Clone + Default,
          FK: FnMut(&mut dyn TransformationContext, &mut K) -> Result<()>,
          FV: FnMut(&mut dyn TransformationContext, &mut V) -> Result<()>
{
    match context.transform_signature(Presence::Fresh(ty), Some(ty))? {
        Signature::Fresh { .. } => {}
        Signature::Null => {
            map.clear();
            return Ok(());
        }
        Signature::BackRef(_) => return Err(protocol_error!("{} is owned by a single slot", ty)),
    }

    let mut entries: Vec<(K, V)> = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let mut count = entries.len() as i32;
    context.transform_i32(&mut count)?;
    transform_items(context, &mut entries, count, "map", Default::default, |context, entry| {
        key_fn(&mut *context, &mut entry.0)?;
        val_fn(&mut *context, &mut entry.1)
    })?;

    map.clear();
    for (key, val) in entries {
        map.insert(key, val);
    }
    Ok(())
}

// shared entities

/// completes a host object slot once its signature is known
fn resolve_host(context: &mut dyn TransformationContext, signature: Signature, current: Option<HostRef>) -> Result<Option<HostRef>> {
    match signature {
        Signature::Null => Ok(None),
        Signature::BackRef(None) => Ok(current),
        Signature::BackRef(Some(SharedObject::Host(host))) => Ok(Some(host)),
        Signature::BackRef(Some(other)) => Err(protocol_error!("expected a host object, found {:?}", other)),
        Signature::Fresh { ty, index } => {
            let host = if context.is_reading() {
                HostRef::from_object(HostObject::from_instance(context.create_instance(&ty)?)?)
            } else {
                current.ok_or_else(|| protocol_error!("no host object to write"))?
            };

            if let Some(index) = index {
                context.resolve_shared(index, SharedObject::Host(host.clone()))?;
            }
            context.defer_contents(host.clone());
            Ok(Some(host))
        }
    }
}

/// transforms the contents of queued host objects until the queue is empty. Objects
/// found meanwhile join the queue, so nesting depth never reaches the call stack.
pub fn transform_deferred_contents(context: &mut dyn TransformationContext) -> Result<()> {
    let mut count = 0;
    while let Some(host) = context.next_deferred() {
        host.transform_contents(context)?;
        count += 1;
    }
    trace!("transformed the contents of {} host objects", count);
    Ok(())
}

pub fn transform_host_object(context: &mut dyn TransformationContext, slot: &mut Option<HostRef>) -> Result<()> {
    let ty = HostObject::declared_type();
    let presence = match *slot {
        Some(ref host) => Presence::Shared(Identity::Host(host.id()), &ty),
        None => Presence::Null
    };

    let signature = context.transform_signature(presence, Some(&ty))?;
    *slot = resolve_host(context, signature, slot.take())?;
    Ok(())
}

/// an immutable entity shared through an `Arc`. The table entry stays reserved while
/// its contents are read, references to it from within are rejected.
fn transform_shared_arc<T, FI, FW, FU>(context: &mut dyn TransformationContext, slot: &mut Option<Arc<T>>,
                                       identity: FI, wrap: FW, unwrap: FU) -> Result<()>
    where T: Persistent + Clone,
          FI: Fn(&Arc<T>) -> Identity,
          FW: Fn(Arc<T>) -> SharedObject,
          FU: Fn(SharedObject) -> Option<Arc<T>>
{
    let declared = T::declared_type();
    let presence = match *slot {
        Some(ref v) => Presence::Shared(identity(v), &declared),
        None => Presence::Null
    };

    match context.transform_signature(presence, Some(&declared))? {
        Signature::Null => *slot = None,
        Signature::BackRef(None) => {}
        Signature::BackRef(Some(object)) => {
            let v = unwrap(object.clone()).ok_or_else(|| protocol_error!("expected {}, found {:?}", declared, object))?;
            *slot = Some(v);
        }
        Signature::Fresh { ty, index } => {
            if context.is_reading() {
                let mut v = T::from_instance(context.create_instance(&ty)?)?;
                v.apply_transformation(context)?;

                let v = Arc::new(v);
                if let Some(index) = index {
                    context.resolve_shared(index, wrap(v.clone()))?;
                }
                *slot = Some(v);
            } else {
                let mut copy = match *slot {
                    Some(ref v) => (**v).clone(),
                    None => return Err(protocol_error!("no {} to write", declared))
                };
                copy.apply_transformation(context)?;
            }
        }
    }
    Ok(())
}

pub fn transform_debug_info(context: &mut dyn TransformationContext, slot: &mut Option<Arc<DebugInfo>>) -> Result<()> {
    transform_shared_arc(context, slot,
        |v| Identity::DebugInfo(&**v as *const DebugInfo as usize),
        SharedObject::DebugInfo,
        |object| match object {
            SharedObject::DebugInfo(v) => Some(v),
            _ => None
        })
}

pub fn transform_type_system(context: &mut dyn TransformationContext, slot: &mut Option<Arc<TypeSystem>>) -> Result<()> {
    transform_shared_arc(context, slot,
        |v| Identity::TypeSystem(&**v as *const TypeSystem as usize),
        SharedObject::TypeSystem,
        |object| match object {
            SharedObject::TypeSystem(v) => Some(v),
            _ => None
        })
}

// dynamic slots

/// a boxed value, stored inline after its type
#[derive(Copy, Clone, Debug, PartialEq)]
enum Boxed {
    Scalar(ScalarValue),
    Enum(ScalarValue),
    Type(TypeId),
    Descriptor(DescriptorId),
}

impl Boxed {
    fn serial_type(&self) -> SerialType {
        match *self {
            Boxed::Scalar(ref s) => s.kind().serial_type(),
            Boxed::Enum(ref s) => SerialType::generic("Enum", vec![s.kind().serial_type()]),
            Boxed::Type(_) => SerialType::class("TypeRef"),
            Boxed::Descriptor(_) => SerialType::class("DescriptorRef"),
        }
    }
}

/// transforms the payload of a value record of type `ty`. The reader starts from the
/// zero value of that type.
fn transform_boxed(context: &mut dyn TransformationContext, ty: &SerialType, current: Option<Boxed>) -> Result<Boxed> {
    let mut boxed = match current {
        Some(v) if !context.is_reading() => v,
        _ => {
            if let Some(kind) = ty.scalar_kind() {
                Boxed::Scalar(ScalarValue::zero(kind))
            } else {
                match ty.name() {
                    Some("Enum") => {
                        let kind = ty.args().get(0).and_then(|arg| arg.scalar_kind())
                            .ok_or_else(|| DataError::Format(format!("malformed enumeration type {}", ty)))?;
                        Boxed::Enum(ScalarValue::zero(kind))
                    }
                    Some("TypeRef") => Boxed::Type(TypeId::default()),
                    Some("DescriptorRef") => Boxed::Descriptor(DescriptorId::default()),
                    _ => return Err(DataError::Format(format!("{} is not a value type", ty)))
                }
            }
        }
    };

    match boxed {
        Boxed::Scalar(ref mut s) | Boxed::Enum(ref mut s) => s.transform_payload(context)?,
        Boxed::Type(ref mut id) => transform_id(context, id)?,
        Boxed::Descriptor(ref mut id) => transform_id(context, id)?,
    }
    Ok(boxed)
}

/// a host value slot, transformed with the full record protocol
pub fn transform_host_value(context: &mut dyn TransformationContext, value: &mut HostValue) -> Result<()> {
    let host_type = HostObject::declared_type();
    let boxed = match *value {
        HostValue::Scalar(s) => Some(Boxed::Scalar(s)),
        HostValue::Enum(s) => Some(Boxed::Enum(s)),
        HostValue::Type(id) => Some(Boxed::Type(id)),
        HostValue::Descriptor(id) => Some(Boxed::Descriptor(id)),
        HostValue::Null | HostValue::Ref(_) => None,
    };
    let boxed_type = boxed.map(|b| b.serial_type());

    let presence = match (&*value, &boxed_type) {
        (&HostValue::Ref(ref host), _) => Presence::Shared(Identity::Host(host.id()), &host_type),
        (_, &Some(ref ty)) => Presence::Value(ty),
        _ => Presence::Null,
    };

    match context.transform_signature(presence, Some(&host_type))? {
        Signature::Null => *value = HostValue::Null,
        Signature::Fresh { ref ty, .. } if ty.is_value() => {
            *value = match transform_boxed(context, ty, boxed)? {
                Boxed::Scalar(s) => HostValue::Scalar(s),
                Boxed::Enum(s) => HostValue::Enum(s),
                Boxed::Type(id) => HostValue::Type(id),
                Boxed::Descriptor(id) => HostValue::Descriptor(id),
            };
        }
        signature => {
            let current = value.as_ref().cloned();
            *value = resolve_host(context, signature, current)?.map_or(HostValue::Null, HostValue::Ref);
        }
    }
    Ok(())
}

/// a descriptor value slot. Character arrays take an object index like any other
/// array, the other values are boxed.
pub fn transform_data_value(context: &mut dyn TransformationContext, value: &mut DataValue) -> Result<()> {
    let chars_type = SerialType::array_of(ScalarKind::Char.serial_type());
    let boxed = match *value {
        DataValue::Scalar(s) => Some(Boxed::Scalar(s)),
        DataValue::Enum(s) => Some(Boxed::Enum(s)),
        DataValue::Descriptor(id) => Some(Boxed::Descriptor(id)),
        DataValue::Null | DataValue::Chars(_) => None,
    };
    let boxed_type = boxed.map(|b| b.serial_type());

    let presence = match (&*value, &boxed_type) {
        (&DataValue::Chars(_), _) => Presence::Fresh(&chars_type),
        (_, &Some(ref ty)) => Presence::Value(ty),
        _ => Presence::Null,
    };

    match context.transform_signature(presence, None)? {
        Signature::Null => *value = DataValue::Null,
        Signature::Fresh { ref ty, .. } if *ty == chars_type => {
            let mut chars = match *value {
                DataValue::Chars(ref chars) if !context.is_reading() => chars.clone(),
                _ => vec![]
            };
            transform_array_contents(context, &mut chars, |context, c| context.transform_u16(c))?;
            *value = DataValue::Chars(chars);
        }
        Signature::Fresh { ref ty, .. } => {
            *value = match transform_boxed(context, ty, boxed)? {
                Boxed::Scalar(s) => DataValue::Scalar(s),
                Boxed::Enum(s) => DataValue::Enum(s),
                Boxed::Descriptor(id) => DataValue::Descriptor(id),
                Boxed::Type(_) => return Err(DataError::Format("type references cannot be stored in descriptors".to_string())),
            };
        }
        Signature::BackRef(_) => return Err(protocol_error!("descriptor values are never shared")),
    }
    Ok(())
}
