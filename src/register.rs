use svd_parser::{Access, Register, RegisterInfo};

use crate::{
  clean_whitespace_opt,
  dimension::Dimension,
  error::Result,
  field::lower_field,
  node::{Node, NodeId, NodeKind, NodeStore, RegisterData},
  value::{ModifiedWriteValuesSpec, WriteConstraintSpec},
  AccessSpec,
};

/// Records the register properties declared on a device, peripheral, cluster or register. Each
/// one is a declared value that the attribute pass cascades down the tree.
pub(crate) fn with_register_properties(
  mut node: Node,
  size: Option<u32>,
  reset_value: Option<u32>,
  reset_mask: Option<u32>,
  access: &Option<Access>,
) -> Node {
  node.declared.bit_width = size;
  node.declared.reset_value = reset_value.map(u64::from);
  node.declared.reset_mask = reset_mask.map(u64::from);
  node.declared.access = access.as_ref().map(AccessSpec::new);
  node
}

/// Adds a register and its fields under `parent`. A register array becomes a single
/// dimensioned node.
pub(crate) fn lower_register(
  store: &mut NodeStore,
  parent: NodeId,
  r: &Register,
) -> Result<NodeId> {
  let (ri, dimension) = match r {
    Register::Single(ref ri) => (ri, None),
    Register::Array(ref ri, ref d) => (
      ri,
      Some(Dimension::from_array(d.dim, d.dim_increment, &d.dim_index)),
    ),
  };

  let mut node = from_register_info(ri)?;
  node.dimension = dimension;
  let id = store.attach(parent, node);

  if let Some(ref fields) = ri.fields {
    for f in fields.iter() {
      lower_field(store, id, f)?;
    }
  }

  Ok(id)
}

fn from_register_info(ri: &RegisterInfo) -> Result<Node> {
  let mut node = Node::new(
    NodeKind::Register(RegisterData {
      alternate_group: ri.alternate_group.clone(),
      write_constraint: ri.write_constraint.as_ref().map(WriteConstraintSpec::new),
    }),
    &ri.name,
  )
  .with_offset(u64::from(ri.address_offset));
  node.derived_from = ri.derived_from.clone();
  node.alternate = ri.alternate_register.clone();
  node.description = clean_whitespace_opt(ri.description.clone())?;
  node.declared.modified_write_values = ri
    .modified_write_values
    .as_ref()
    .map(ModifiedWriteValuesSpec::new);

  Ok(with_register_properties(
    node,
    ri.size,
    ri.reset_value,
    ri.reset_mask,
    &ri.access,
  ))
}

#[cfg(test)]
mod tests {
  use super::lower_register;
  use crate::{
    dimension::Dimension,
    node::{Node, NodeKind, NodeStore},
    value::{ModifiedWriteValuesSpec, WriteConstraintRangeSpec, WriteConstraintSpec},
    AccessSpec,
  };
  use svd_parser::parse::Parse;
  use svd_parser::Register;
  use xmltree::Element;

  #[test]
  fn can_lower_single_from_xml() {
    let el: Element = Element::parse(
      r##"
      <register>
        <name>FOO</name>
        <description>Bar</description>
        <addressOffset>3000</addressOffset>
        <access>write-only</access>
        <resetValue>1234</resetValue>
        <resetMask>4321</resetMask>
        <size>16</size>
        <writeConstraint>
          <range>
            <minimum>2</minimum>
            <maximum>4</maximum>
          </range>
        </writeConstraint>
        <modifiedWriteValues>zeroToToggle</modifiedWriteValues>
        <fields>
          <field>
            <name>F1</name>
            <bitWidth>2</bitWidth>
            <bitOffset>0</bitOffset>
          </field>
          <field>
            <name>F2</name>
            <bitWidth>2</bitWidth>
            <bitOffset>2</bitOffset>
          </field>
        </fields>
      </register>
      "##
        .as_bytes(),
    )
    .unwrap();

    let r = Register::parse(&el).unwrap();
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let id = lower_register(&mut store, root, &r).unwrap();

    let node = &store[id];
    assert_eq!("FOO", node.name);
    assert_eq!(Some("Bar".to_owned()), node.description);
    assert_eq!(Some(3000), node.offset);
    assert_eq!(Some(AccessSpec::WriteOnly), node.declared.access);
    assert_eq!(Some(1234), node.declared.reset_value);
    assert_eq!(Some(4321), node.declared.reset_mask);
    assert_eq!(Some(16), node.declared.bit_width);
    assert_eq!(
      Some(ModifiedWriteValuesSpec::ZeroToToggle),
      node.declared.modified_write_values
    );
    match &node.kind {
      NodeKind::Register(data) => assert_eq!(
        Some(WriteConstraintSpec::Range(WriteConstraintRangeSpec {
          min: 2,
          max: 4
        })),
        data.write_constraint
      ),
      other => panic!("unexpected payload {:?}", other),
    }

    let fields: Vec<&str> = store
      .children(id)
      .iter()
      .map(|f| store[*f].name.as_str())
      .collect();
    assert_eq!(vec!["F1", "F2"], fields);
  }

  #[test]
  fn can_lower_array_from_xml() {
    let el: Element = Element::parse(
      r##"
      <register>
        <dim>3</dim>
        <dimIncrement>4</dimIncrement>
        <name>FOO_%s</name>
        <description>Bar %s</description>
        <addressOffset>0x20</addressOffset>
      </register>
      "##
        .as_bytes(),
    )
    .unwrap();

    let r = Register::parse(&el).unwrap();
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let id = lower_register(&mut store, root, &r).unwrap();

    let node = &store[id];
    assert_eq!("FOO_%s", node.name);
    assert_eq!(Some("Bar %s".to_owned()), node.description);
    assert_eq!(Some(0x20), node.offset);
    assert_eq!(Some(Dimension::new(3, 4)), node.dimension);
  }

  #[test]
  fn keeps_alternate_and_derivation_references() {
    let el: Element = Element::parse(
      r##"
      <register derivedFrom="CTRL">
        <name>CTRL_ALT</name>
        <alternateRegister>CTRL</alternateRegister>
        <addressOffset>0x0</addressOffset>
      </register>
      "##
        .as_bytes(),
    )
    .unwrap();

    let r = Register::parse(&el).unwrap();
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let id = lower_register(&mut store, root, &r).unwrap();

    assert_eq!(Some("CTRL".to_owned()), store[id].derived_from);
    assert_eq!(Some("CTRL".to_owned()), store[id].alternate);
    assert!(store[id].declared.access.is_none());
  }
}
