//! ABI document sent by the node as the first frame of a session.
//!
//! Only the parts needed to encode and decode values are kept: type aliases,
//! structs and variants. Tables, actions and ricardian clauses are ignored.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Alias `new_type_name` → `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructDef {
    pub name: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

/// Tagged union; the wire index selects one of `types`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantDef {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Raw ABI document as found on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiDef {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<TypeDef>,
    #[serde(default)]
    pub structs: Vec<StructDef>,
    #[serde(default)]
    pub variants: Vec<VariantDef>,
}

/// A parsed ABI with name lookups ready for the binary codec.
#[derive(Debug, Clone, Default)]
pub struct Abi {
    def: AbiDef,
    pub(super) typedefs: HashMap<String, String>,
    pub(super) structs: HashMap<String, StructDef>,
    pub(super) variants: HashMap<String, VariantDef>,
}

impl Abi {
    /// Index an ABI definition.
    pub fn new(def: AbiDef) -> Self {
        let typedefs = def
            .types
            .iter()
            .map(|t| (t.new_type_name.clone(), t.type_name.clone()))
            .collect();
        let structs = def
            .structs
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect();
        let variants = def
            .variants
            .iter()
            .map(|v| (v.name.clone(), v.clone()))
            .collect();

        Self {
            def,
            typedefs,
            structs,
            variants,
        }
    }

    /// Parse a JSON ABI document.
    pub fn from_json(document: &[u8]) -> Result<Self> {
        let def: AbiDef = serde_json::from_slice(document)?;
        Ok(Self::new(def))
    }

    /// ABI version string, e.g. `eosio::abi/1.1`.
    pub fn version(&self) -> &str {
        &self.def.version
    }

    /// The definition this ABI was built from.
    pub fn definition(&self) -> &AbiDef {
        &self.def
    }

    pub fn get_struct(&self, name: &str) -> Option<&StructDef> {
        self.structs.get(name)
    }

    pub fn get_variant(&self, name: &str) -> Option<&VariantDef> {
        self.variants.get(name)
    }
}
