//! Builds a fully derived, expanded and address-resolved register model from a CMSIS-SVD
//! device description.
//!
//! Declarations are lowered into a [`NodeStore`] and moved through the construction stages by a
//! [`Session`]. Problems in the described device never abort construction; they are collected
//! as [`Diagnostic`]s and handed off together with the [`ResolvedModel`].

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use svd_parser::Access;

mod address;
mod attributes;
mod cluster;
mod device;
mod diagnostic;
mod dimension;
mod error;
mod field;
mod model;
mod node;
mod options;
mod peripheral;
mod register;
mod resolver;
mod session;
mod validate;
mod value;

pub use address::AddressResolver;
pub use attributes::{AttributeResolver, Effective};
pub use device::{lower_device, CpuSpec, EndianSpec};
pub use diagnostic::{codes, Arg, Category, Diagnostic, DiagnosticCode, Diagnostics, Severity};
pub use dimension::{substitute, Dimension, Expander};
pub use error::{Error, Result};
pub use model::{Outcome, ResolvedModel, ResolvedNode, Walk};
pub use node::{
  AddressBlockData, ClusterData, Declared, DeviceData, EnumContainerData, EnumData, FieldData,
  InterruptData, Kind, Node, NodeId, NodeKind, NodeStore, PeripheralData, RegisterData,
};
pub use options::{Defaults, Options};
pub use resolver::{NameIndex, Resolution, Resolver};
pub use session::{Session, Stage};
pub use validate::Validator;
pub use value::{
  width_mask, EnumeratedValueUsageSpec, ModifiedWriteValuesSpec, ProtectionSpec, ReadActionSpec,
  WriteConstraintRangeSpec, WriteConstraintSpec,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessSpec {
  ReadOnly,
  ReadWrite,
  ReadWriteOnce,
  WriteOnce,
  WriteOnly,
}
impl AccessSpec {
  pub fn new(access: &Access) -> AccessSpec {
    match access {
      Access::ReadOnly => AccessSpec::ReadOnly,
      Access::ReadWrite => AccessSpec::ReadWrite,
      Access::ReadWriteOnce => AccessSpec::ReadWriteOnce,
      Access::WriteOnce => AccessSpec::WriteOnce,
      Access::WriteOnly => AccessSpec::WriteOnly,
    }
  }

  pub fn can_read(&self) -> bool {
    match self {
      AccessSpec::ReadOnly | AccessSpec::ReadWrite | AccessSpec::ReadWriteOnce => true,
      _ => false,
    }
  }

  pub fn can_write(&self) -> bool {
    match self {
      AccessSpec::ReadWrite
      | AccessSpec::ReadWriteOnce
      | AccessSpec::WriteOnce
      | AccessSpec::WriteOnly => true,
      _ => false,
    }
  }
}
impl fmt::Display for AccessSpec {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      AccessSpec::ReadOnly => "read-only",
      AccessSpec::ReadWrite => "read-write",
      AccessSpec::ReadWriteOnce => "read-writeOnce",
      AccessSpec::WriteOnce => "writeOnce",
      AccessSpec::WriteOnly => "write-only",
    };
    write!(f, "{}", name)
  }
}

/// Collapses runs of whitespace in a description into single spaces.
pub(crate) fn clean_whitespace_opt(text: Option<String>) -> Result<Option<String>> {
  match text {
    Some(t) => {
      let re = Regex::new(r"\s+")?;
      Ok(Some(re.replace_all(t.trim(), " ").into_owned()))
    }
    None => Ok(None),
  }
}
