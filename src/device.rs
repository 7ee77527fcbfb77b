use crate::{
  clean_whitespace_opt,
  error::Result,
  node::{DeviceData, Node, NodeKind, NodeStore},
  peripheral::lower_peripheral,
  register::with_register_properties,
};
use serde::{Deserialize, Serialize};
use svd_parser::{Cpu, Device, Endian};
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndianSpec {
  Little,
  Big,
  Selectable,
  Other,
}
impl EndianSpec {
  pub fn new(e: &Endian) -> Self {
    match e {
      Endian::Little => EndianSpec::Little,
      Endian::Big => EndianSpec::Big,
      Endian::Selectable => EndianSpec::Selectable,
      Endian::Other => EndianSpec::Other,
    }
  }
}

/// The processor core of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSpec {
  pub name: String,
  pub revision: String,
  pub endian: EndianSpec,
  pub mpu_present: bool,
  pub fpu_present: bool,
  pub nvic_priority_bits: u32,
  pub has_vendor_systick: bool,
}
impl CpuSpec {
  pub fn new(c: &Cpu) -> Self {
    Self {
      name: c.name.clone(),
      revision: c.revision.clone(),
      endian: EndianSpec::new(&c.endian),
      mpu_present: c.mpu_present,
      fpu_present: c.fpu_present,
      nvic_priority_bits: c.nvic_priority_bits,
      has_vendor_systick: c.has_vendor_systick,
    }
  }
}

/// Builds the declared node tree of a parsed device. Nothing is resolved here: derivations,
/// arrays and defaults are kept as declared for the construction passes.
#[instrument(skip_all, fields(device = %d.name))]
pub fn lower_device(d: &Device) -> Result<NodeStore> {
  let mut device = Node::new(
    NodeKind::Device(DeviceData {
      version: d.version.clone(),
      address_unit_bits: d.address_unit_bits,
      width: d.width,
      cpu: d.cpu.as_ref().map(CpuSpec::new),
    }),
    &d.name,
  );
  device.description = clean_whitespace_opt(d.description.clone())?;
  let device = with_register_properties(
    device,
    d.default_register_properties.size,
    d.default_register_properties.reset_value,
    d.default_register_properties.reset_mask,
    &d.default_register_properties.access,
  );

  let mut store = NodeStore::new(device);
  let root = store.root();
  for p in d.peripherals.iter() {
    lower_peripheral(&mut store, root, p)?;
  }

  debug!(nodes = store.len(), "lowered device");
  Ok(store)
}

#[cfg(test)]
mod tests {
  use super::{lower_device, EndianSpec};
  use crate::{
    node::{Kind, NodeKind},
    AccessSpec,
  };

  static DEVICE: &str = r##"
    <device schemaVersion="1.1">
      <name>SAMPLE</name>
      <version>1.2</version>
      <description>Sample   device
        for tests</description>
      <addressUnitBits>8</addressUnitBits>
      <width>32</width>
      <cpu>
        <name>CM4</name>
        <revision>r0p1</revision>
        <endian>little</endian>
        <mpuPresent>true</mpuPresent>
        <fpuPresent>false</fpuPresent>
        <nvicPrioBits>3</nvicPrioBits>
        <vendorSystickConfig>false</vendorSystickConfig>
      </cpu>
      <size>32</size>
      <access>read-write</access>
      <resetValue>0x00000000</resetValue>
      <resetMask>0xFFFFFFFF</resetMask>
      <peripherals>
        <peripheral>
          <name>TIMER0</name>
          <baseAddress>0x40010000</baseAddress>
          <addressBlock>
            <offset>0</offset>
            <size>0x100</size>
            <usage>registers</usage>
          </addressBlock>
          <registers>
            <register>
              <name>CR</name>
              <addressOffset>0x0</addressOffset>
            </register>
          </registers>
        </peripheral>
        <peripheral derivedFrom="TIMER0">
          <name>TIMER1</name>
          <baseAddress>0x40011000</baseAddress>
        </peripheral>
      </peripherals>
    </device>
  "##;

  #[test]
  fn lowers_device_with_defaults_and_cpu() {
    let device = svd_parser::parse(DEVICE).unwrap();
    let store = lower_device(&device).unwrap();

    let root = &store[store.root()];
    assert_eq!("SAMPLE", root.name);
    assert_eq!(Some("Sample device for tests".to_owned()), root.description);
    assert_eq!(Some(32), root.declared.bit_width);
    assert_eq!(Some(AccessSpec::ReadWrite), root.declared.access);
    assert_eq!(Some(0xFFFF_FFFF), root.declared.reset_mask);
    match &root.kind {
      NodeKind::Device(data) => {
        assert_eq!(Some("1.2".to_owned()), data.version);
        assert_eq!(Some(8), data.address_unit_bits);
        let cpu = data.cpu.as_ref().unwrap();
        assert_eq!("CM4", cpu.name);
        assert_eq!(EndianSpec::Little, cpu.endian);
        assert_eq!(3, cpu.nvic_priority_bits);
      }
      other => panic!("unexpected payload {:?}", other),
    }
  }

  #[test]
  fn keeps_derivations_unresolved() {
    let device = svd_parser::parse(DEVICE).unwrap();
    let store = lower_device(&device).unwrap();

    let peripherals = store.children(store.root());
    assert_eq!(2, peripherals.len());
    let timer1 = &store[peripherals[1]];
    assert_eq!(Kind::Peripheral, timer1.kind());
    assert_eq!(Some("TIMER0".to_owned()), timer1.derived_from);
    assert_eq!(Some(0x4001_1000), timer1.offset);
    assert!(store.children(peripherals[1]).is_empty());
  }
}
