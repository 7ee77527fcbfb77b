use serde::{Deserialize, Serialize};
use svd_parser::{
  writeconstraint::WriteConstraintRange, ModifiedWriteValues, Usage, WriteConstraint,
};

/// Describes the manipulation of data written to a register or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifiedWriteValuesSpec {
  OneToClear,
  OneToSet,
  OneToToggle,
  ZeroToClear,
  ZeroToSet,
  ZeroToToggle,
  Clear,
  Set,
  Modify,
}
impl ModifiedWriteValuesSpec {
  pub fn new(mwv: &ModifiedWriteValues) -> Self {
    match mwv {
      ModifiedWriteValues::OneToClear => ModifiedWriteValuesSpec::OneToClear,
      ModifiedWriteValues::OneToSet => ModifiedWriteValuesSpec::OneToSet,
      ModifiedWriteValues::OneToToggle => ModifiedWriteValuesSpec::OneToToggle,

      ModifiedWriteValues::ZeroToClear => ModifiedWriteValuesSpec::ZeroToClear,
      ModifiedWriteValues::ZeroToSet => ModifiedWriteValuesSpec::ZeroToSet,
      ModifiedWriteValues::ZeroToToggle => ModifiedWriteValuesSpec::ZeroToToggle,

      ModifiedWriteValues::Clear => ModifiedWriteValuesSpec::Clear,
      ModifiedWriteValues::Set => ModifiedWriteValuesSpec::Set,
      ModifiedWriteValues::Modify => ModifiedWriteValuesSpec::Modify,
    }
  }
}

/// Secure/privileged access protection of a peripheral, cluster or register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProtectionSpec {
  /// No protection declared anywhere in the hierarchy.
  Undefined,
  Secure,
  NonSecure,
  Privileged,
}

/// Side effect of reading a register or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadActionSpec {
  /// Reading has no side effect.
  Undefined,
  Clear,
  Set,
  Modify,
  ModifyExternal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteConstraintSpec {
  UseEnumeratedValues,
  Range(WriteConstraintRangeSpec),
  WriteAsRead,
  Unconstrained,
}
impl WriteConstraintSpec {
  pub fn new(wc: &WriteConstraint) -> Self {
    match wc {
      WriteConstraint::WriteAsRead(true) => WriteConstraintSpec::WriteAsRead,
      WriteConstraint::UseEnumeratedValues(true) => WriteConstraintSpec::UseEnumeratedValues,
      WriteConstraint::Range(ref wcr) => {
        WriteConstraintSpec::Range(WriteConstraintRangeSpec::new(wcr))
      }
      _ => WriteConstraintSpec::Unconstrained,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteConstraintRangeSpec {
  pub min: u32,
  pub max: u32,
}
impl WriteConstraintRangeSpec {
  pub fn new(wcr: &WriteConstraintRange) -> Self {
    Self {
      min: wcr.min,
      max: wcr.max,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnumeratedValueUsageSpec {
  Read,
  Write,
  ReadWrite,
}
impl EnumeratedValueUsageSpec {
  pub fn new(u: &Usage) -> Self {
    match u {
      Usage::Read => EnumeratedValueUsageSpec::Read,
      Usage::Write => EnumeratedValueUsageSpec::Write,
      Usage::ReadWrite => EnumeratedValueUsageSpec::ReadWrite,
    }
  }

  pub fn can_read(self) -> bool {
    match self {
      EnumeratedValueUsageSpec::Read | EnumeratedValueUsageSpec::ReadWrite => true,
      _ => false,
    }
  }

  pub fn can_write(self) -> bool {
    match self {
      EnumeratedValueUsageSpec::Write | EnumeratedValueUsageSpec::ReadWrite => true,
      _ => false,
    }
  }
}

/// Mask covering the low `width` bits.
pub fn width_mask(width: u32) -> u64 {
  if width >= 64 {
    u64::MAX
  } else {
    (1u64 << width) - 1
  }
}
