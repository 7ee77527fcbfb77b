//! Arena holding every declared element of a device.
//!
//! Parent-to-child edges are ordered lists of [`NodeId`]s owned by the parent. Derivation and
//! alternate references are names, resolved once into plain indices that carry no ownership.

use crate::{
  attributes::Effective,
  dimension::Dimension,
  value::{
    EnumeratedValueUsageSpec, ModifiedWriteValuesSpec, ProtectionSpec, ReadActionSpec,
    WriteConstraintSpec,
  },
  AccessSpec, CpuSpec,
};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Index};

/// Stable index of a node inside a [`NodeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);
impl NodeId {
  pub fn index(self) -> usize {
    self.0
  }
}
impl fmt::Display for NodeId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// Kind tag of a node, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kind {
  Device,
  Peripheral,
  AddressBlock,
  Interrupt,
  Cluster,
  Register,
  Field,
  EnumContainer,
  Enum,
}
impl Kind {
  /// Peripherals, clusters, registers and fields: the kinds that carry offsets, dimensions and
  /// derivations.
  pub fn is_structural(self) -> bool {
    match self {
      Kind::Peripheral | Kind::Cluster | Kind::Register | Kind::Field => true,
      _ => false,
    }
  }

  /// Whether a node of this kind may carry a `derivedFrom` reference.
  pub fn is_derivable(self) -> bool {
    self.is_structural() || self == Kind::EnumContainer
  }
}
impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      Kind::Device => "device",
      Kind::Peripheral => "peripheral",
      Kind::AddressBlock => "addressBlock",
      Kind::Interrupt => "interrupt",
      Kind::Cluster => "cluster",
      Kind::Register => "register",
      Kind::Field => "field",
      Kind::EnumContainer => "enumeratedValues",
      Kind::Enum => "enumeratedValue",
    };
    write!(f, "{}", name)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceData {
  pub version: Option<String>,
  pub address_unit_bits: Option<u32>,
  pub width: Option<u32>,
  pub cpu: Option<CpuSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeripheralData {
  pub version: Option<String>,
  pub display_name: Option<String>,
  pub group_name: Option<String>,
}

/// An address range uniquely mapped to a peripheral. The node's offset is relative to the
/// peripheral's base address.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressBlockData {
  pub size: u64,
  pub usage: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterruptData {
  pub value: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterData {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterData {
  /// Registers of the same alternate group describe the same location differently.
  pub alternate_group: Option<String>,
  pub write_constraint: Option<WriteConstraintSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
  pub write_constraint: Option<WriteConstraintSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumContainerData {
  pub usage: Option<EnumeratedValueUsageSpec>,
  /// The enumerated value designated as default, filled in by attribute resolution.
  pub default_value: Option<NodeId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnumData {
  pub value: Option<u64>,
  pub is_default: bool,
}

/// A node with its kind-specific payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
  Device(DeviceData),
  Peripheral(PeripheralData),
  AddressBlock(AddressBlockData),
  Interrupt(InterruptData),
  Cluster(ClusterData),
  Register(RegisterData),
  Field(FieldData),
  EnumContainer(EnumContainerData),
  Enum(EnumData),
}
impl NodeKind {
  pub fn kind(&self) -> Kind {
    match self {
      NodeKind::Device(_) => Kind::Device,
      NodeKind::Peripheral(_) => Kind::Peripheral,
      NodeKind::AddressBlock(_) => Kind::AddressBlock,
      NodeKind::Interrupt(_) => Kind::Interrupt,
      NodeKind::Cluster(_) => Kind::Cluster,
      NodeKind::Register(_) => Kind::Register,
      NodeKind::Field(_) => Kind::Field,
      NodeKind::EnumContainer(_) => Kind::EnumContainer,
      NodeKind::Enum(_) => Kind::Enum,
    }
  }

  /// Fills payload values missing here from the payload of a derivation target.
  pub(crate) fn inherit_from(&mut self, other: &NodeKind) {
    fn take<T: Clone>(mine: &mut Option<T>, theirs: &Option<T>) {
      if mine.is_none() {
        *mine = theirs.clone();
      }
    }

    match (self, other) {
      (NodeKind::Peripheral(mine), NodeKind::Peripheral(theirs)) => {
        take(&mut mine.version, &theirs.version);
        take(&mut mine.display_name, &theirs.display_name);
        take(&mut mine.group_name, &theirs.group_name);
      }
      (NodeKind::Register(mine), NodeKind::Register(theirs)) => {
        take(&mut mine.alternate_group, &theirs.alternate_group);
        take(&mut mine.write_constraint, &theirs.write_constraint);
      }
      (NodeKind::Field(mine), NodeKind::Field(theirs)) => {
        take(&mut mine.write_constraint, &theirs.write_constraint);
      }
      (NodeKind::EnumContainer(mine), NodeKind::EnumContainer(theirs)) => {
        take(&mut mine.usage, &theirs.usage);
      }
      (NodeKind::Enum(mine), NodeKind::Enum(theirs)) => {
        take(&mut mine.value, &theirs.value);
        mine.is_default = mine.is_default || theirs.is_default;
      }
      _ => {}
    }
  }
}

/// The cascading attributes as written in the document. Absent values are inherited.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declared {
  pub bit_width: Option<u32>,
  pub access: Option<AccessSpec>,
  pub protection: Option<ProtectionSpec>,
  pub reset_value: Option<u64>,
  pub reset_mask: Option<u64>,
  pub read_action: Option<ReadActionSpec>,
  pub modified_write_values: Option<ModifiedWriteValuesSpec>,
}
impl Declared {
  /// Takes every value not declared here from `other`.
  pub(crate) fn inherit_from(&mut self, other: &Declared) {
    if self.bit_width.is_none() {
      self.bit_width = other.bit_width;
    }
    if self.access.is_none() {
      self.access = other.access;
    }
    if self.protection.is_none() {
      self.protection = other.protection;
    }
    if self.reset_value.is_none() {
      self.reset_value = other.reset_value;
    }
    if self.reset_mask.is_none() {
      self.reset_mask = other.reset_mask;
    }
    if self.read_action.is_none() {
      self.read_action = other.read_action;
    }
    if self.modified_write_values.is_none() {
      self.modified_write_values = other.modified_write_values;
    }
  }
}

/// One declared element of the device and the values computed for it by the passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
  pub kind: NodeKind,

  /// Name as declared. May contain the dimension placeholder.
  pub name: String,

  /// Name after expansion, with the placeholder substituted.
  pub name_calculated: String,

  pub description: Option<String>,

  /// Dotted path of the element this one derives from.
  pub derived_from: Option<String>,

  /// Name of the sibling this element is an alternate view of.
  pub alternate: Option<String>,

  pub declared: Declared,

  /// Declared position relative to the parent: base address of a peripheral, address offset of
  /// a cluster or register, bit offset of a field, offset of an address block.
  pub offset: Option<u64>,

  pub dimension: Option<Dimension>,

  /// Line of the declaration in the source document, when known.
  pub line: Option<u32>,

  pub(crate) parent: Option<NodeId>,
  pub(crate) children: Vec<NodeId>,
  pub(crate) effective: Option<Effective>,
  pub(crate) absolute_address: Option<u64>,
  pub(crate) hierarchical_name: Option<String>,
  pub(crate) dim_index: Option<String>,
  pub(crate) template: Option<NodeId>,
  pub(crate) instances: Vec<NodeId>,
  pub(crate) derived_target: Option<NodeId>,
  pub(crate) alternate_target: Option<NodeId>,
}
impl Node {
  pub fn new(kind: NodeKind, name: &str) -> Self {
    Self {
      kind,
      name: name.to_owned(),
      name_calculated: name.to_owned(),
      description: None,
      derived_from: None,
      alternate: None,
      declared: Declared::default(),
      offset: None,
      dimension: None,
      line: None,
      parent: None,
      children: Vec::new(),
      effective: None,
      absolute_address: None,
      hierarchical_name: None,
      dim_index: None,
      template: None,
      instances: Vec::new(),
      derived_target: None,
      alternate_target: None,
    }
  }

  pub fn device(name: &str) -> Self {
    Self::new(NodeKind::Device(DeviceData::default()), name)
  }

  pub fn peripheral(name: &str, base_address: u64) -> Self {
    Self::new(NodeKind::Peripheral(PeripheralData::default()), name).with_offset(base_address)
  }

  pub fn address_block(offset: u64, size: u64, usage: &str) -> Self {
    Self::new(
      NodeKind::AddressBlock(AddressBlockData {
        size,
        usage: usage.to_owned(),
      }),
      "",
    )
    .with_offset(offset)
  }

  pub fn interrupt(name: &str, value: u32) -> Self {
    Self::new(NodeKind::Interrupt(InterruptData { value }), name)
  }

  pub fn cluster(name: &str, address_offset: u64) -> Self {
    Self::new(NodeKind::Cluster(ClusterData::default()), name).with_offset(address_offset)
  }

  pub fn register(name: &str, address_offset: u64) -> Self {
    Self::new(NodeKind::Register(RegisterData::default()), name).with_offset(address_offset)
  }

  pub fn field(name: &str, bit_offset: u64, bit_width: u32) -> Self {
    Self::new(NodeKind::Field(FieldData::default()), name)
      .with_offset(bit_offset)
      .with_size(bit_width)
  }

  pub fn enum_container(name: &str) -> Self {
    Self::new(NodeKind::EnumContainer(EnumContainerData::default()), name)
  }

  pub fn enumerated(name: &str, value: u64) -> Self {
    Self::new(
      NodeKind::Enum(EnumData {
        value: Some(value),
        is_default: false,
      }),
      name,
    )
  }

  /// An enumerated value that stands for every value not listed explicitly.
  pub fn enumerated_default(name: &str) -> Self {
    Self::new(
      NodeKind::Enum(EnumData {
        value: None,
        is_default: true,
      }),
      name,
    )
  }

  pub fn with_offset(mut self, offset: u64) -> Self {
    self.offset = Some(offset);
    self
  }

  pub fn without_offset(mut self) -> Self {
    self.offset = None;
    self
  }

  pub fn with_description(mut self, description: &str) -> Self {
    self.description = Some(description.to_owned());
    self
  }

  pub fn derived_from(mut self, path: &str) -> Self {
    self.derived_from = Some(path.to_owned());
    self
  }

  pub fn with_alternate(mut self, name: &str) -> Self {
    self.alternate = Some(name.to_owned());
    self
  }

  pub fn with_dimension(mut self, dimension: Dimension) -> Self {
    self.dimension = Some(dimension);
    self
  }

  pub fn with_size(mut self, bit_width: u32) -> Self {
    self.declared.bit_width = Some(bit_width);
    self
  }

  pub fn without_size(mut self) -> Self {
    self.declared.bit_width = None;
    self
  }

  pub fn with_access(mut self, access: AccessSpec) -> Self {
    self.declared.access = Some(access);
    self
  }

  pub fn with_protection(mut self, protection: ProtectionSpec) -> Self {
    self.declared.protection = Some(protection);
    self
  }

  pub fn with_reset_value(mut self, reset_value: u64) -> Self {
    self.declared.reset_value = Some(reset_value);
    self
  }

  pub fn with_reset_mask(mut self, reset_mask: u64) -> Self {
    self.declared.reset_mask = Some(reset_mask);
    self
  }

  pub fn with_read_action(mut self, read_action: ReadActionSpec) -> Self {
    self.declared.read_action = Some(read_action);
    self
  }

  pub fn with_modified_write_values(mut self, mwv: ModifiedWriteValuesSpec) -> Self {
    self.declared.modified_write_values = Some(mwv);
    self
  }

  pub fn at_line(mut self, line: u32) -> Self {
    self.line = Some(line);
    self
  }

  pub fn kind(&self) -> Kind {
    self.kind.kind()
  }

  pub fn parent(&self) -> Option<NodeId> {
    self.parent
  }

  pub fn children(&self) -> &[NodeId] {
    &self.children
  }

  pub fn effective(&self) -> Option<&Effective> {
    self.effective.as_ref()
  }

  /// Undefined until addresses have been resolved.
  pub fn absolute_address(&self) -> Option<u64> {
    self.absolute_address
  }

  pub fn hierarchical_name(&self) -> Option<&str> {
    self.hierarchical_name.as_deref()
  }

  /// Index label of an expanded copy.
  pub fn dim_index(&self) -> Option<&str> {
    self.dim_index.as_deref()
  }

  /// The dimensioned declaration an expanded copy was made from.
  pub fn template(&self) -> Option<NodeId> {
    self.template
  }

  /// Expanded copies of a dimensioned declaration.
  pub fn instances(&self) -> &[NodeId] {
    &self.instances
  }

  /// The node a derivation reference resolved to.
  pub fn derived_target(&self) -> Option<NodeId> {
    self.derived_target
  }

  /// The sibling an alternate reference resolved to.
  pub fn alternate_target(&self) -> Option<NodeId> {
    self.alternate_target
  }

  /// Whether `self` and `other` are two views of the same location.
  pub(crate) fn shares_location_with(&self, other: &Node) -> bool {
    let same_group = match (&self.kind, &other.kind) {
      (NodeKind::Register(a), NodeKind::Register(b)) => {
        a.alternate_group.is_some() || b.alternate_group.is_some()
      }
      _ => false,
    };
    same_group
      || self.alternate.as_deref() == Some(other.name_calculated.as_str())
      || other.alternate.as_deref() == Some(self.name_calculated.as_str())
  }
}

/// Owner of every node of one device.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStore {
  nodes: Vec<Node>,
}
impl NodeStore {
  /// Creates a store whose root is `device`.
  pub fn new(device: Node) -> Self {
    let mut root = device;
    root.parent = None;
    Self { nodes: vec![root] }
  }

  pub fn root(&self) -> NodeId {
    NodeId(0)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn get(&self, id: NodeId) -> Option<&Node> {
    self.nodes.get(id.0)
  }

  pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
    self.nodes.get_mut(id.0)
  }

  /// Adds `node` as the last child of `parent`.
  pub fn attach(&mut self, parent: NodeId, node: Node) -> NodeId {
    let id = self.push(node, parent);
    self.nodes[parent.0].children.push(id);
    id
  }

  /// Adds `node` under `parent` without listing it among the parent's children.
  fn push(&mut self, mut node: Node, parent: NodeId) -> NodeId {
    let id = NodeId(self.nodes.len());
    node.parent = Some(parent);
    node.children = Vec::new();
    self.nodes.push(node);
    id
  }

  pub fn children(&self, id: NodeId) -> &[NodeId] {
    &self.nodes[id.0].children
  }

  pub(crate) fn set_children(&mut self, id: NodeId, children: Vec<NodeId>) {
    for child in children.iter() {
      self.nodes[child.0].parent = Some(id);
    }
    self.nodes[id.0].children = children;
  }

  pub fn parent(&self, id: NodeId) -> Option<NodeId> {
    self.nodes[id.0].parent
  }

  /// Ids of all nodes reachable from `from`, parents before children, in declaration order.
  pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
      order.push(id);
      stack.extend(self.nodes[id.0].children.iter().rev());
    }
    order
  }

  /// Whether `ancestor` lies on the path from the root to `id` (inclusive).
  pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
    let mut current = Some(id);
    while let Some(c) = current {
      if c == ancestor {
        return true;
      }
      current = self.nodes[c.0].parent;
    }
    false
  }

  /// The peripheral containing `id`, or `id` itself if it is a peripheral.
  pub fn enclosing_peripheral(&self, id: NodeId) -> Option<NodeId> {
    let mut current = Some(id);
    while let Some(c) = current {
      if self.nodes[c.0].kind() == Kind::Peripheral {
        return Some(c);
      }
      current = self.nodes[c.0].parent;
    }
    None
  }

  /// Deep-copies the subtree at `source` and hangs the copy under `parent`. The copy is not
  /// listed among the parent's children; callers place it. Computed values are not copied.
  pub(crate) fn clone_subtree(&mut self, source: NodeId, parent: NodeId) -> NodeId {
    let mut copy = self.nodes[source.0].clone();
    copy.effective = None;
    copy.absolute_address = None;
    copy.hierarchical_name = None;
    copy.instances = Vec::new();
    copy.derived_target = None;
    copy.alternate_target = None;

    let id = self.push(copy, parent);
    let source_children = self.nodes[source.0].children.clone();
    let copied_children: Vec<NodeId> = source_children
      .into_iter()
      .map(|child| self.clone_subtree(child, id))
      .collect();
    self.nodes[id.0].children = copied_children;
    id
  }

  /// Ids of the children of `id` whose declared name is `name`.
  pub fn children_named(&self, id: NodeId, name: &str) -> Vec<NodeId> {
    self.nodes[id.0]
      .children
      .iter()
      .copied()
      .filter(|c| self.nodes[c.0].name == name)
      .collect()
  }
}
impl Index<NodeId> for NodeStore {
  type Output = Node;

  fn index(&self, id: NodeId) -> &Node {
    &self.nodes[id.0]
  }
}
