use crate::{
  clean_whitespace_opt,
  cluster::lower_children,
  error::Result,
  node::{Node, NodeId, NodeKind, NodeStore, PeripheralData},
  register::with_register_properties,
};
use svd_parser::{AddressBlock, Interrupt, Peripheral};

/// Describes an address range uniquely mapped to a peripheral. The offset is relative to the
/// peripheral's base address and the size is counted in address units. Expected usages are
/// `registers`, `buffer` and `reserved`.
fn address_block(ab: &AddressBlock) -> Node {
  Node::address_block(u64::from(ab.offset), u64::from(ab.size), &ab.usage)
}

fn interrupt(i: &Interrupt) -> Result<Node> {
  let mut node = Node::interrupt(&i.name, i.value);
  node.description = clean_whitespace_opt(i.description.clone())?;
  Ok(node)
}

/// Adds a peripheral with its address block, interrupts, clusters and registers under `parent`.
pub(crate) fn lower_peripheral(
  store: &mut NodeStore,
  parent: NodeId,
  p: &Peripheral,
) -> Result<NodeId> {
  let mut node = Node::new(
    NodeKind::Peripheral(PeripheralData {
      version: p.version.clone(),
      display_name: p.display_name.clone(),
      group_name: p.group_name.clone(),
    }),
    &p.name,
  )
  .with_offset(u64::from(p.base_address));
  node.derived_from = p.derived_from.clone();
  node.description = clean_whitespace_opt(p.description.clone())?;
  let node = with_register_properties(
    node,
    p.default_register_properties.size,
    p.default_register_properties.reset_value,
    p.default_register_properties.reset_mask,
    &p.default_register_properties.access,
  );

  let id = store.attach(parent, node);

  if let Some(ref ab) = p.address_block {
    store.attach(id, address_block(ab));
  }
  for i in p.interrupt.iter() {
    store.attach(id, interrupt(i)?);
  }
  if let Some(ref children) = p.registers {
    lower_children(store, id, children)?;
  }

  Ok(id)
}

#[cfg(test)]
mod tests {
  use super::lower_peripheral;
  use crate::{
    node::{Kind, Node, NodeKind, NodeStore},
    AccessSpec,
  };
  use svd_parser::{parse::Parse, Peripheral};
  use xmltree::Element;

  #[test]
  fn can_lower_from_xml() {
    let el: Element = Element::parse(
      r##"
      <peripheral>
        <name>UART0</name>
        <version>2.0</version>
        <description>Universal   asynchronous
          receiver</description>
        <groupName>UART</groupName>
        <baseAddress>0x40002000</baseAddress>
        <size>16</size>
        <access>read-only</access>
        <addressBlock>
          <offset>0x0</offset>
          <size>0x400</size>
          <usage>registers</usage>
        </addressBlock>
        <interrupt>
          <name>UART0_IRQ</name>
          <description>UART 0 interrupt</description>
          <value>12</value>
        </interrupt>
        <registers>
          <register>
            <name>DATA</name>
            <addressOffset>0x0</addressOffset>
          </register>
          <cluster>
            <name>CFG</name>
            <addressOffset>0x10</addressOffset>
            <register>
              <name>BAUD</name>
              <addressOffset>0x0</addressOffset>
            </register>
          </cluster>
        </registers>
      </peripheral>
      "##
        .as_bytes(),
    )
    .unwrap();

    let p = Peripheral::parse(&el).unwrap();
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let id = lower_peripheral(&mut store, root, &p).unwrap();

    let node = &store[id];
    assert_eq!("UART0", node.name);
    assert_eq!(Some("Universal asynchronous receiver".to_owned()), node.description);
    assert_eq!(Some(0x4000_2000), node.offset);
    assert_eq!(Some(16), node.declared.bit_width);
    assert_eq!(Some(AccessSpec::ReadOnly), node.declared.access);
    match &node.kind {
      NodeKind::Peripheral(data) => {
        assert_eq!(Some("2.0".to_owned()), data.version);
        assert_eq!(Some("UART".to_owned()), data.group_name);
      }
      other => panic!("unexpected payload {:?}", other),
    }

    let kinds: Vec<Kind> = store.children(id).iter().map(|c| store[*c].kind()).collect();
    assert_eq!(
      vec![Kind::AddressBlock, Kind::Interrupt, Kind::Register, Kind::Cluster],
      kinds
    );

    let block = &store[store.children(id)[0]];
    assert_eq!(Some(0), block.offset);
    match &block.kind {
      NodeKind::AddressBlock(data) => {
        assert_eq!(0x400, data.size);
        assert_eq!("registers", data.usage);
      }
      other => panic!("unexpected payload {:?}", other),
    }

    let irq = &store[store.children(id)[1]];
    assert_eq!("UART0_IRQ", irq.name);
    assert_eq!(Some("UART 0 interrupt".to_owned()), irq.description);

    let cluster = store.children(id)[3];
    assert_eq!("BAUD", store[store.children(cluster)[0]].name);
  }

  #[test]
  fn keeps_derived_from_reference() {
    let el: Element = Element::parse(
      r##"
      <peripheral derivedFrom="UART0">
        <name>UART1</name>
        <baseAddress>0x40003000</baseAddress>
      </peripheral>
      "##
        .as_bytes(),
    )
    .unwrap();

    let p = Peripheral::parse(&el).unwrap();
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let id = lower_peripheral(&mut store, root, &p).unwrap();

    assert_eq!(Some("UART0".to_owned()), store[id].derived_from);
    assert!(store[id].declared.bit_width.is_none());
    assert!(store.children(id).is_empty());
  }
}
