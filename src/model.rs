//! The read-only model handed to generators once construction reaches `Ready`.

use crate::{
  attributes::Effective,
  device::lower_device,
  diagnostic::{Diagnostics, Severity},
  error::{Error, Result},
  node::{NodeId, NodeKind, NodeStore},
  options::Options,
  session::{Session, Stage},
  value::width_mask,
};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Overall result of a construction run, decided by the most severe diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
  Pass,
  Warn,
  Fail,
}

/// A fully resolved element. Every attribute is populated; nothing needs to be looked up in
/// ancestors or derivation targets.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedNode {
  pub id: NodeId,
  pub kind: NodeKind,
  pub name: String,
  pub name_calculated: String,
  pub hierarchical_name: String,
  pub description: Option<String>,
  pub effective: Effective,
  pub offset: Option<u64>,
  pub absolute_address: Option<u64>,
  pub dim_index: Option<String>,
  pub alternate: Option<String>,
  pub derived_from: Option<String>,
  pub line: Option<u32>,
  pub children: Vec<NodeId>,
}
impl ResolvedNode {
  /// Register bits covered by a field. `None` for other kinds.
  pub fn field_mask(&self) -> Option<u64> {
    let (msb, lsb) = self.bit_range()?;
    Some(width_mask(msb - lsb + 1) << lsb)
  }

  /// The `(msb, lsb)` pair of a field. `None` for other kinds, or when the field does not fit
  /// into 64 bits.
  pub fn bit_range(&self) -> Option<(u32, u32)> {
    match self.kind {
      NodeKind::Field(_) => {
        let lsb = self.offset?;
        let width = u64::from(self.effective.bit_width.max(1));
        if lsb + width > 64 {
          return None;
        }
        Some(((lsb + width - 1) as u32, lsb as u32))
      }
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedModel {
  nodes: Vec<ResolvedNode>,
  #[serde(skip)]
  positions: HashMap<NodeId, usize>,
  diagnostics: Diagnostics,
}
impl ResolvedModel {
  /// Copies every node reachable from the root of `store`. Fails if a pass left a node
  /// without effective attributes or hierarchical name.
  pub(crate) fn new(store: &NodeStore, diagnostics: Diagnostics) -> Result<Self> {
    let order = store.preorder(store.root());
    let mut nodes = Vec::with_capacity(order.len());
    let mut positions = HashMap::with_capacity(order.len());

    for id in order {
      let node = &store[id];
      let (effective, hierarchical_name) = match (node.effective(), node.hierarchical_name()) {
        (Some(e), Some(h)) => (e.clone(), h.to_owned()),
        _ => {
          return Err(Error::Internal {
            stage: Stage::Ready,
            detail: format!("{} '{}' ({}) was not fully resolved", node.kind(), node.name, id),
            diagnostics: diagnostics.into_vec(),
          })
        }
      };

      positions.insert(id, nodes.len());
      nodes.push(ResolvedNode {
        id,
        kind: node.kind.clone(),
        name: node.name.clone(),
        name_calculated: node.name_calculated.clone(),
        hierarchical_name,
        description: node.description.clone(),
        effective,
        offset: node.offset,
        absolute_address: node.absolute_address(),
        dim_index: node.dim_index().map(str::to_owned),
        alternate: node.alternate.clone(),
        derived_from: node.derived_from.clone(),
        line: node.line,
        children: node.children().to_vec(),
      });
    }

    Ok(Self {
      nodes,
      positions,
      diagnostics,
    })
  }

  /// Parses an SVD document and runs every construction stage on it.
  #[instrument(skip_all)]
  pub fn from_xml(xml: &str, options: &Options) -> Result<Self> {
    let device = svd_parser::parse(xml)?;
    let store = lower_device(&device)?;
    let model = Session::run(store, options)?;
    info!(
      nodes = model.nodes.len(),
      diagnostics = model.diagnostics.len(),
      outcome = ?model.outcome(),
      "model ready"
    );
    Ok(model)
  }

  /// The device node.
  pub fn root(&self) -> &ResolvedNode {
    &self.nodes[0]
  }

  pub fn node(&self, id: NodeId) -> Result<&ResolvedNode> {
    self
      .positions
      .get(&id)
      .map(|p| &self.nodes[*p])
      .ok_or(Error::UnknownNode(id))
  }

  pub fn children(&self, id: NodeId) -> Result<Vec<&ResolvedNode>> {
    self
      .node(id)?
      .children
      .iter()
      .map(|c| self.node(*c))
      .collect()
  }

  /// Depth-first, parents before children, siblings in declaration order. The root has depth 0.
  pub fn walk(&self) -> Walk<'_> {
    Walk {
      model: self,
      stack: vec![(0, self.root().id)],
    }
  }

  /// Looks a node up by its hierarchical name.
  pub fn find(&self, hierarchical_name: &str) -> Option<&ResolvedNode> {
    self
      .nodes
      .iter()
      .find(|n| n.hierarchical_name == hierarchical_name)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn diagnostics(&self) -> &Diagnostics {
    &self.diagnostics
  }

  pub fn outcome(&self) -> Outcome {
    match self.diagnostics.max_severity() {
      None | Some(Severity::Info) => Outcome::Pass,
      Some(Severity::Warning) => Outcome::Warn,
      Some(Severity::Error) => Outcome::Fail,
    }
  }

  /// Pretty-printed dump of every node and diagnostic, for debugging.
  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }
}

pub struct Walk<'a> {
  model: &'a ResolvedModel,
  stack: Vec<(usize, NodeId)>,
}
impl<'a> Iterator for Walk<'a> {
  type Item = (usize, &'a ResolvedNode);

  fn next(&mut self) -> Option<Self::Item> {
    let (depth, id) = self.stack.pop()?;
    let node = self.model.node(id).ok()?;
    self
      .stack
      .extend(node.children.iter().rev().map(|c| (depth + 1, *c)));
    Some((depth, node))
  }
}

#[cfg(test)]
mod tests {
  use super::{Outcome, ResolvedModel};
  use crate::{
    diagnostic::codes,
    error::Error,
    node::{Kind, Node, NodeId, NodeStore},
    options::Options,
    session::Session,
    value::{ProtectionSpec, ReadActionSpec},
    AccessSpec,
  };

  static DEVICE: &str = r##"
    <device schemaVersion="1.1">
      <name>GPIO_DEMO</name>
      <version>1.0</version>
      <description>GPIO demo</description>
      <addressUnitBits>8</addressUnitBits>
      <width>32</width>
      <size>32</size>
      <access>read-write</access>
      <resetValue>0x00000000</resetValue>
      <resetMask>0xFFFFFFFF</resetMask>
      <peripherals>
        <peripheral>
          <name>GPIOA</name>
          <baseAddress>0x40020000</baseAddress>
          <addressBlock>
            <offset>0</offset>
            <size>0x400</size>
            <usage>registers</usage>
          </addressBlock>
          <registers>
            <register>
              <name>MODER</name>
              <addressOffset>0x0</addressOffset>
              <resetValue>0xA8000000</resetValue>
              <fields>
                <field>
                  <dim>4</dim>
                  <dimIncrement>2</dimIncrement>
                  <name>MODE%s</name>
                  <description>Mode of pin %s</description>
                  <bitOffset>0</bitOffset>
                  <bitWidth>2</bitWidth>
                </field>
              </fields>
            </register>
            <register>
              <name>IDR</name>
              <addressOffset>0x10</addressOffset>
              <access>read-only</access>
              <size>16</size>
            </register>
          </registers>
        </peripheral>
        <peripheral derivedFrom="GPIOA">
          <name>GPIOB</name>
          <baseAddress>0x40020400</baseAddress>
        </peripheral>
      </peripherals>
    </device>
  "##;

  #[test]
  fn builds_model_from_xml() {
    let model = ResolvedModel::from_xml(DEVICE, &Options::default()).unwrap();

    assert_eq!(Outcome::Pass, model.outcome());
    assert!(model.diagnostics().is_empty());
    assert_eq!("GPIO_DEMO", model.root().name);

    let idr = model.find("GPIO_DEMO.GPIOB.IDR").unwrap();
    assert_eq!(Some(0x4002_0410), idr.absolute_address);
    assert_eq!(AccessSpec::ReadOnly, idr.effective.access);
    assert_eq!(16, idr.effective.bit_width);
    assert_eq!(ProtectionSpec::Undefined, idr.effective.protection);
    assert_eq!(ReadActionSpec::Undefined, idr.effective.read_action);

    let mode3 = model.find("GPIO_DEMO.GPIOB.MODER.MODE3").unwrap();
    assert_eq!(Some("Mode of pin 3".to_owned()), mode3.description);
    assert_eq!(Some("3".to_owned()), mode3.dim_index);
    assert_eq!(Some((7, 6)), mode3.bit_range());
    assert_eq!(Some(0xC0), mode3.field_mask());
    assert_eq!(0x0, mode3.effective.reset_value);
    assert_eq!(Some(0x4002_0400), mode3.absolute_address);
  }

  #[test]
  fn walk_yields_depths_in_declaration_order() {
    let model = ResolvedModel::from_xml(DEVICE, &Options::default()).unwrap();

    let gpioa: Vec<(usize, &str)> = model
      .walk()
      .take(9)
      .map(|(depth, n)| (depth, n.name_calculated.as_str()))
      .collect();
    assert_eq!(
      vec![
        (0, "GPIO_DEMO"),
        (1, "GPIOA"),
        (2, ""),
        (2, "MODER"),
        (3, "MODE0"),
        (3, "MODE1"),
        (3, "MODE2"),
        (3, "MODE3"),
        (2, "IDR"),
      ],
      gpioa
    );
    assert_eq!(model.len(), model.walk().count());
  }

  #[test]
  fn children_and_unknown_nodes() {
    let model = ResolvedModel::from_xml(DEVICE, &Options::default()).unwrap();

    let peripherals: Vec<&str> = model
      .children(model.root().id)
      .unwrap()
      .iter()
      .map(|p| p.name.as_str())
      .collect();
    assert_eq!(vec!["GPIOA", "GPIOB"], peripherals);

    match model.node(NodeId(100_000)) {
      Err(Error::UnknownNode(id)) => assert_eq!(NodeId(100_000), id),
      other => panic!("expected unknown node, got {:?}", other),
    }
  }

  #[test]
  fn outcome_follows_most_severe_diagnostic() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let p = store.attach(root, Node::peripheral("P", 0x1000));
    store.attach(p, Node::register("R", 0).derived_from("MISSING"));

    let model = Session::run(store, &Options::default()).unwrap();
    assert_eq!(Outcome::Fail, model.outcome());
    assert_eq!(1, model.diagnostics().count(codes::UNRESOLVED_REFERENCE));

    let mut store = NodeStore::new(Node::device("DEV"));
    let root = store.root();
    let p = store.attach(root, Node::peripheral("P", 0x1000));
    store.attach(p, Node::register("R", 0));
    let model = Session::run(store, &Options::default()).unwrap();
    assert_eq!(Outcome::Warn, model.outcome());
    assert_eq!(1, model.diagnostics().count(codes::MISSING_ADDRESS_BLOCK));
  }

  #[test]
  fn json_dump_lists_nodes_and_diagnostics() {
    let model = ResolvedModel::from_xml(DEVICE, &Options::default()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&model.to_json().unwrap()).unwrap();

    let nodes = json["nodes"].as_array().unwrap();
    assert_eq!(model.len(), nodes.len());
    assert_eq!("GPIO_DEMO.GPIOA", nodes[1]["hierarchicalName"]);
    assert_eq!("peripheral", nodes[1]["kind"]["type"]);
    assert_eq!(0x4002_0000, nodes[1]["absoluteAddress"]);
    assert!(json.get("positions").is_none());
    assert_eq!(Kind::Device, model.root().kind.kind());
  }

  #[test]
  fn rejects_invalid_document() {
    match ResolvedModel::from_xml("<device>", &Options::default()) {
      Err(Error::Parse(_)) => {}
      other => panic!("expected parse error, got {:?}", other.map(|m| m.len())),
    }
  }
}
