use crate::{
  error::Result,
  value::{ModifiedWriteValuesSpec, ProtectionSpec, ReadActionSpec},
  AccessSpec,
};
use serde::{Deserialize, Serialize};

/// Global fallbacks used when neither a node nor any of its ancestors declares a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Defaults {
  pub bit_width: u32,
  pub access: AccessSpec,
  pub protection: ProtectionSpec,
  pub reset_value: u64,
  /// `None` means all ones for the effective bit width.
  pub reset_mask: Option<u64>,
  pub read_action: ReadActionSpec,
  pub modified_write_values: ModifiedWriteValuesSpec,
}
impl Default for Defaults {
  fn default() -> Self {
    Self {
      bit_width: 32,
      access: AccessSpec::ReadWrite,
      protection: ProtectionSpec::Undefined,
      reset_value: 0,
      reset_mask: None,
      read_action: ReadActionSpec::Undefined,
      modified_write_values: ModifiedWriteValuesSpec::Modify,
    }
  }
}

/// Settings of one construction session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Options {
  /// Token in a dimensioned name that is replaced by the index label.
  pub placeholder: String,
  pub defaults: Defaults,
  /// Report sibling registers whose byte spans overlap.
  pub check_overlaps: bool,
  /// Report peripherals without any address block.
  pub require_address_block: bool,
  /// Report writable fields whose enumerated values leave values uncovered without a default.
  pub report_enum_coverage: bool,
}
impl Default for Options {
  fn default() -> Self {
    Self {
      placeholder: "%s".to_owned(),
      defaults: Defaults::default(),
      check_overlaps: true,
      require_address_block: true,
      report_enum_coverage: true,
    }
  }
}
impl Options {
  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }
}
