//! Binary ABI serialization.
//!
//! Layout rules:
//! - fixed-width integers are little endian
//! - `varuint32` is LEB128, at most 5 bytes
//! - `string` and `bytes` are a `varuint32` length followed by the data
//! - `T[]` is a `varuint32` count followed by the items
//! - `T?` is a one byte presence flag followed by the item when present
//! - `T$` (binary extension) may be cut off at the end of the input
//! - structs are their base's fields followed by their own, in order
//! - variants are a `varuint32` index into `types` followed by the value

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::schema::{Abi, StructDef};
use super::value::{Fields, Value};
use crate::error::AbiError;
use crate::types::Checksum256;

/// Maximum typedef chain / nesting depth.
const MAX_DEPTH: usize = 64;

type Result<T> = std::result::Result<T, AbiError>;

/// Read a LEB128 `varuint32`.
pub fn read_varuint32(buf: &mut impl Buf) -> Result<u32> {
    let mut result: u64 = 0;
    let mut shift = 0u32;

    loop {
        if !buf.has_remaining() {
            return Err(AbiError::UnexpectedEof("varuint32".into()));
        }
        let byte = buf.get_u8();
        result |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 35 {
            return Err(AbiError::VarUintOverflow);
        }
    }

    u32::try_from(result).map_err(|_| AbiError::VarUintOverflow)
}

/// Write a LEB128 `varuint32`.
pub fn write_varuint32(buf: &mut impl BufMut, mut n: u32) {
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if n == 0 {
            break;
        }
    }
}

#[inline]
fn need(buf: &Bytes, n: usize, ty: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(AbiError::UnexpectedEof(ty.to_owned()));
    }
    Ok(())
}

fn read_len_prefixed(buf: &mut Bytes, ty: &str) -> Result<Bytes> {
    let len = read_varuint32(buf)? as usize;
    need(buf, len, ty)?;
    Ok(buf.split_to(len))
}

fn mismatch(ty: &str, value: &Value) -> AbiError {
    AbiError::TypeMismatch {
        expected: ty.to_owned(),
        found: value.kind().to_owned(),
    }
}

fn integer<T>(ty: &str, value: &Value) -> Result<T>
where
    T: TryFrom<u64> + TryFrom<i64>,
{
    let (converted, shown) = match value {
        Value::Uint(n) => (T::try_from(*n).ok(), n.to_string()),
        Value::Int(n) => (T::try_from(*n).ok(), n.to_string()),
        other => return Err(mismatch(ty, other)),
    };
    converted.ok_or(AbiError::OutOfRange {
        type_name: ty.to_owned(),
        value: shown,
    })
}

fn decode_builtin(buf: &mut Bytes, ty: &str) -> Result<Option<Value>> {
    let value = match ty {
        "bool" => {
            need(buf, 1, ty)?;
            Value::Bool(buf.get_u8() != 0)
        }
        "int8" => {
            need(buf, 1, ty)?;
            Value::Int(buf.get_i8().into())
        }
        "uint8" => {
            need(buf, 1, ty)?;
            Value::Uint(buf.get_u8().into())
        }
        "int16" => {
            need(buf, 2, ty)?;
            Value::Int(buf.get_i16_le().into())
        }
        "uint16" => {
            need(buf, 2, ty)?;
            Value::Uint(buf.get_u16_le().into())
        }
        "int32" => {
            need(buf, 4, ty)?;
            Value::Int(buf.get_i32_le().into())
        }
        "uint32" => {
            need(buf, 4, ty)?;
            Value::Uint(buf.get_u32_le().into())
        }
        "int64" => {
            need(buf, 8, ty)?;
            Value::Int(buf.get_i64_le())
        }
        "uint64" => {
            need(buf, 8, ty)?;
            Value::Uint(buf.get_u64_le())
        }
        "varuint32" => Value::Uint(read_varuint32(buf)?.into()),
        "string" => {
            let raw = read_len_prefixed(buf, ty)?;
            let s = std::str::from_utf8(&raw).map_err(|_| AbiError::InvalidUtf8)?;
            Value::String(s.to_owned())
        }
        "bytes" => Value::Bytes(read_len_prefixed(buf, ty)?),
        "checksum256" => {
            need(buf, Checksum256::LEN, ty)?;
            let mut raw = [0u8; 32];
            buf.copy_to_slice(&mut raw);
            Value::Checksum256(Checksum256(raw))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn encode_builtin(buf: &mut BytesMut, ty: &str, value: &Value) -> Result<bool> {
    match ty {
        "bool" => {
            let b = value.as_bool().ok_or_else(|| mismatch(ty, value))?;
            buf.put_u8(u8::from(b));
        }
        "int8" => buf.put_i8(integer(ty, value)?),
        "uint8" => buf.put_u8(integer(ty, value)?),
        "int16" => buf.put_i16_le(integer(ty, value)?),
        "uint16" => buf.put_u16_le(integer(ty, value)?),
        "int32" => buf.put_i32_le(integer(ty, value)?),
        "uint32" => buf.put_u32_le(integer(ty, value)?),
        "int64" => buf.put_i64_le(integer(ty, value)?),
        "uint64" => buf.put_u64_le(integer(ty, value)?),
        "varuint32" => write_varuint32(buf, integer(ty, value)?),
        "string" => {
            let s = value.as_str().ok_or_else(|| mismatch(ty, value))?;
            put_len_prefixed(buf, ty, s.as_bytes())?;
        }
        "bytes" => {
            let b = value.as_bytes().ok_or_else(|| mismatch(ty, value))?;
            put_len_prefixed(buf, ty, b)?;
        }
        "checksum256" => {
            let c = value.as_checksum256().ok_or_else(|| mismatch(ty, value))?;
            buf.put_slice(c.as_ref());
        }
        _ => return Ok(false),
    }
    Ok(true)
}

fn put_len_prefixed(buf: &mut BytesMut, ty: &str, data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| AbiError::OutOfRange {
        type_name: ty.to_owned(),
        value: data.len().to_string(),
    })?;
    write_varuint32(buf, len);
    buf.put_slice(data);
    Ok(())
}

impl Abi {
    /// Follow typedefs until a non-alias name is reached.
    fn resolve<'a>(&'a self, ty: &'a str) -> Result<&'a str> {
        let mut current = ty;
        for _ in 0..MAX_DEPTH {
            match self.typedefs.get(current) {
                Some(next) => current = next.as_str(),
                None => return Ok(current),
            }
        }
        Err(AbiError::RecursionLimit(ty.to_owned()))
    }

    fn base_of(&self, def: &StructDef) -> Result<Option<&StructDef>> {
        if def.base.is_empty() {
            return Ok(None);
        }
        let name = self.resolve(&def.base)?;
        self.structs
            .get(name)
            .map(Some)
            .ok_or_else(|| AbiError::UnknownType(def.base.clone()))
    }

    pub(super) fn decode_type(&self, buf: &mut Bytes, ty: &str, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(AbiError::RecursionLimit(ty.to_owned()));
        }
        let ty = self.resolve(ty)?;

        if let Some(inner) = ty.strip_suffix("[]") {
            let len = read_varuint32(buf)? as usize;
            let mut items = Vec::with_capacity(len.min(buf.remaining()));
            for _ in 0..len {
                items.push(self.decode_type(buf, inner, depth + 1)?);
            }
            return Ok(Value::Array(items));
        }
        if let Some(inner) = ty.strip_suffix('?') {
            need(buf, 1, ty)?;
            return match buf.get_u8() {
                0 => Ok(Value::Null),
                1 => self.decode_type(buf, inner, depth + 1),
                flag => Err(AbiError::InvalidOptionalFlag(flag)),
            };
        }
        if let Some(inner) = ty.strip_suffix('$') {
            if !buf.has_remaining() {
                return Ok(Value::Null);
            }
            return self.decode_type(buf, inner, depth + 1);
        }

        if let Some(value) = decode_builtin(buf, ty)? {
            return Ok(value);
        }
        if let Some(def) = self.structs.get(ty) {
            let mut fields = Fields::new();
            self.decode_fields(buf, def, &mut fields, depth + 1)?;
            return Ok(Value::Struct(fields));
        }
        if let Some(def) = self.variants.get(ty) {
            let index = read_varuint32(buf)?;
            let tag = def
                .types
                .get(index as usize)
                .ok_or_else(|| AbiError::VariantIndex {
                    variant: def.name.clone(),
                    index,
                })?;
            let body = self.decode_type(buf, tag, depth + 1)?;
            return Ok(Value::Variant(tag.clone(), Box::new(body)));
        }

        Err(AbiError::UnknownType(ty.to_owned()))
    }

    fn decode_fields(
        &self,
        buf: &mut Bytes,
        def: &StructDef,
        fields: &mut Fields,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(AbiError::RecursionLimit(def.name.clone()));
        }
        if let Some(base) = self.base_of(def)? {
            self.decode_fields(buf, base, fields, depth + 1)?;
        }
        for field in &def.fields {
            // Trailing binary extensions may be cut off entirely.
            if field.type_name.ends_with('$') && !buf.has_remaining() {
                break;
            }
            let value = self.decode_type(buf, &field.type_name, depth + 1)?;
            fields.insert(field.name.clone(), value);
        }
        Ok(())
    }

    pub(super) fn encode_type(
        &self,
        buf: &mut BytesMut,
        ty: &str,
        value: &Value,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(AbiError::RecursionLimit(ty.to_owned()));
        }
        let ty = self.resolve(ty)?;

        if let Some(inner) = ty.strip_suffix("[]") {
            let items = value.as_array().ok_or_else(|| mismatch(ty, value))?;
            let len = u32::try_from(items.len()).map_err(|_| AbiError::OutOfRange {
                type_name: ty.to_owned(),
                value: items.len().to_string(),
            })?;
            write_varuint32(buf, len);
            for item in items {
                self.encode_type(buf, inner, item, depth + 1)?;
            }
            return Ok(());
        }
        if let Some(inner) = ty.strip_suffix('?') {
            if value.is_null() {
                buf.put_u8(0);
                return Ok(());
            }
            buf.put_u8(1);
            return self.encode_type(buf, inner, value, depth + 1);
        }
        if let Some(inner) = ty.strip_suffix('$') {
            if value.is_null() {
                return Ok(());
            }
            return self.encode_type(buf, inner, value, depth + 1);
        }

        if encode_builtin(buf, ty, value)? {
            return Ok(());
        }
        if let Some(def) = self.structs.get(ty) {
            let fields = value.as_struct().ok_or_else(|| mismatch(ty, value))?;
            return self.encode_fields(buf, def, fields, depth + 1);
        }
        if let Some(def) = self.variants.get(ty) {
            let Value::Variant(tag, body) = value else {
                return Err(mismatch(ty, value));
            };
            let index = def
                .types
                .iter()
                .position(|t| t == tag)
                .ok_or_else(|| AbiError::UnknownVariant {
                    variant: def.name.clone(),
                    tag: tag.clone(),
                })?;
            // Variant lists are far shorter than u32::MAX.
            write_varuint32(buf, index as u32);
            return self.encode_type(buf, tag, body, depth + 1);
        }

        Err(AbiError::UnknownType(ty.to_owned()))
    }

    fn encode_fields(
        &self,
        buf: &mut BytesMut,
        def: &StructDef,
        fields: &Fields,
        depth: usize,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(AbiError::RecursionLimit(def.name.clone()));
        }
        if let Some(base) = self.base_of(def)? {
            self.encode_fields(buf, base, fields, depth + 1)?;
        }
        for field in &def.fields {
            match fields.get(&field.name) {
                Some(value) => self.encode_type(buf, &field.type_name, value, depth + 1)?,
                None if field.type_name.ends_with('$') => return Ok(()),
                None if field.type_name.ends_with('?') => buf.put_u8(0),
                None => {
                    return Err(AbiError::MissingField {
                        struct_name: def.name.clone(),
                        field: field.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}
