//! Absolute addresses and hierarchical names.

use crate::{
  diagnostic::{codes, Arg, Diagnostic, Diagnostics},
  node::{Kind, NodeId, NodeStore},
};
use std::collections::HashSet;
use tracing::{instrument, trace};

/// Highest address of the 32-bit address space.
const ADDRESS_LIMIT: u64 = u32::MAX as u64;

pub struct AddressResolver<'a> {
  store: &'a mut NodeStore,
  diagnostics: &'a mut Diagnostics,
  reported_cycles: HashSet<NodeId>,
}
impl<'a> AddressResolver<'a> {
  pub fn new(store: &'a mut NodeStore, diagnostics: &'a mut Diagnostics) -> Self {
    Self {
      store,
      diagnostics,
      reported_cycles: HashSet::new(),
    }
  }

  #[instrument(skip_all)]
  pub fn resolve_all(&mut self) {
    let root = self.store.root();
    for id in self.store.preorder(root) {
      self.resolve(id);
    }
  }

  /// Computes the absolute address and hierarchical name of `id`. The parent must have been
  /// resolved already.
  pub fn resolve(&mut self, id: NodeId) {
    let hierarchical_name = self.hierarchical_name(id);
    let mut address = self.own_address(id);

    let kind = self.store[id].kind();
    let may_alias = match kind {
      Kind::Peripheral | Kind::Cluster | Kind::Register => true,
      _ => false,
    };
    if may_alias && self.store[id].alternate.is_some() {
      if let Some(target) = self.alternate_target(id) {
        let (node, other) = (&self.store[id], &self.store[target]);
        if node.offset.is_some() && node.offset != other.offset {
          self.diagnostics.record(
            Diagnostic::warning(codes::ALTERNATE_OFFSET_CONFLICT)
              .with(Arg::Name, &node.name_calculated)
              .with(Arg::Name2, &other.name_calculated)
              .with_line(Arg::Line, node.line)
              .with_line(Arg::Line2, other.line),
          );
        }
        address = self.own_address(target);
        if let Some(node) = self.store.get_mut(id) {
          node.alternate_target = Some(target);
        }
      }
    }

    trace!(name = %hierarchical_name, ?address, "resolved address");
    if let Some(node) = self.store.get_mut(id) {
      node.absolute_address = address;
      node.hierarchical_name = Some(hierarchical_name);
    }
  }

  /// Address from the node's own offset, ignoring any alternate.
  fn own_address(&mut self, id: NodeId) -> Option<u64> {
    let node = &self.store[id];
    let (kind, offset) = (node.kind(), node.offset);
    let parent = node.parent().and_then(|p| self.store[p].absolute_address());

    let address = match kind {
      Kind::Peripheral => offset?,
      Kind::Cluster | Kind::Register | Kind::AddressBlock => {
        let parent = parent?;
        match parent.checked_add(offset.unwrap_or(0)) {
          Some(a) => a,
          None => {
            self.overflow(id, parent);
            return None;
          }
        }
      }
      Kind::Field => return parent,
      Kind::Device | Kind::Interrupt | Kind::EnumContainer | Kind::Enum => return None,
    };

    if address > ADDRESS_LIMIT {
      self.overflow(id, address);
      return None;
    }
    Some(address)
  }

  fn overflow(&mut self, id: NodeId, address: u64) {
    let node = &self.store[id];
    self.diagnostics.record(
      Diagnostic::error(codes::ADDRESS_OVERFLOW)
        .with(Arg::Name, &node.name_calculated)
        .with(Arg::Address, format!("{:#x}", address))
        .with_line(Arg::Line, node.line),
    );
  }

  /// Follows alternate references among siblings to the first element that is not itself an
  /// alternate.
  fn alternate_target(&mut self, id: NodeId) -> Option<NodeId> {
    let mut chain = vec![id];
    let mut current = id;

    while let Some(name) = self.store[current].alternate.clone() {
      let parent = self.store.parent(current)?;
      let target = self
        .store
        .children(parent)
        .iter()
        .copied()
        .find(|c| *c != current && self.store[*c].name_calculated == name);

      let target = match target {
        Some(t) => t,
        None if current == id => {
          let node = &self.store[id];
          self.diagnostics.record(
            Diagnostic::error(codes::UNRESOLVED_ALTERNATE)
              .with(Arg::Name, &node.name_calculated)
              .with(Arg::Path, &name)
              .with_line(Arg::Line, node.line),
          );
          return None;
        }
        // Reported when the sibling itself is resolved.
        None => return Some(current),
      };

      if let Some(position) = chain.iter().position(|n| *n == target) {
        let reported = chain[position..]
          .iter()
          .any(|n| self.reported_cycles.contains(n));
        if !reported {
          let mut names: Vec<String> = chain[position..]
            .iter()
            .map(|n| self.store[*n].name_calculated.clone())
            .collect();
          names.push(self.store[target].name_calculated.clone());
          let node = &self.store[id];
          self.diagnostics.record(
            Diagnostic::error(codes::ALTERNATE_CYCLE)
              .with(Arg::Name, &node.name_calculated)
              .with(Arg::Chain, names.join(" -> "))
              .with_line(Arg::Line, node.line),
          );
        }
        self.reported_cycles.extend(chain.iter().copied());
        return None;
      }

      chain.push(target);
      current = target;
    }

    Some(current)
  }

  /// Dotted path of calculated names, starting at the device. Unnamed elements take the name
  /// of their parent.
  fn hierarchical_name(&self, id: NodeId) -> String {
    let node = &self.store[id];
    let parent = match node.parent() {
      Some(p) => p,
      None => return node.name_calculated.clone(),
    };
    let prefix = self.store[parent]
      .hierarchical_name()
      .unwrap_or(self.store[parent].name_calculated.as_str());
    if node.name_calculated.is_empty() {
      prefix.to_owned()
    } else {
      format!("{}.{}", prefix, node.name_calculated)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::AddressResolver;
  use crate::{
    diagnostic::{codes, Diagnostics},
    node::{Node, NodeStore},
  };

  fn resolve(store: &mut NodeStore) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    AddressResolver::new(store, &mut diagnostics).resolve_all();
    diagnostics
  }

  #[test]
  fn composes_addresses_down_the_tree() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0x4000_0000));
    let block = store.attach(p, Node::address_block(0x800, 0x100, "registers"));
    let c = store.attach(p, Node::cluster("C", 0x100));
    let r = store.attach(c, Node::register("R", 0x04));
    let f = store.attach(r, Node::field("F", 4, 2));
    let e = store.attach(f, Node::enum_container("E"));

    let diagnostics = resolve(&mut store);

    assert!(diagnostics.is_empty());
    assert_eq!(None, store[store.root()].absolute_address());
    assert_eq!(Some(0x4000_0000), store[p].absolute_address());
    assert_eq!(Some(0x4000_0800), store[block].absolute_address());
    assert_eq!(Some(0x4000_0100), store[c].absolute_address());
    assert_eq!(Some(0x4000_0104), store[r].absolute_address());
    assert_eq!(Some(0x4000_0104), store[f].absolute_address());
    assert_eq!(None, store[e].absolute_address());
  }

  #[test]
  fn builds_hierarchical_names_from_device_root() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("GPIOA", 0));
    let block = store.attach(p, Node::address_block(0, 0x400, "registers"));
    let r = store.attach(p, Node::register("MODER", 0));
    let f = store.attach(r, Node::field("MODE0", 0, 2));

    resolve(&mut store);

    assert_eq!(Some("DEV"), store[store.root()].hierarchical_name());
    assert_eq!(Some("DEV.GPIOA"), store[p].hierarchical_name());
    assert_eq!(Some("DEV.GPIOA"), store[block].hierarchical_name());
    assert_eq!(Some("DEV.GPIOA.MODER.MODE0"), store[f].hierarchical_name());
  }

  #[test]
  fn alternate_shares_sibling_address() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0x1000));
    let a = store.attach(p, Node::register("CTRL", 0x8));
    let b = store.attach(p, Node::register("CTRL_ALT", 0x8).with_alternate("CTRL"));
    let f = store.attach(b, Node::field("BIT", 0, 1));

    let diagnostics = resolve(&mut store);

    assert!(diagnostics.is_empty());
    assert_eq!(Some(a), store[b].alternate_target());
    assert_eq!(Some(0x1008), store[b].absolute_address());
    assert_eq!(Some(0x1008), store[f].absolute_address());
  }

  #[test]
  fn conflicting_alternate_offset_is_reported() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0x1000));
    store.attach(p, Node::register("CTRL", 0x8));
    let b = store.attach(p, Node::register("ALT", 0xC).with_alternate("CTRL"));

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::ALTERNATE_OFFSET_CONFLICT));
    assert_eq!(Some(0x1008), store[b].absolute_address());
  }

  #[test]
  fn reports_unresolved_and_cyclic_alternates() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0x1000));
    let lost = store.attach(p, Node::register("LOST", 0x0).with_alternate("NOWHERE"));
    store.attach(p, Node::register("X", 0x4).with_alternate("Y"));
    store.attach(p, Node::register("Y", 0x4).with_alternate("X"));

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::UNRESOLVED_ALTERNATE));
    assert_eq!(1, diagnostics.count(codes::ALTERNATE_CYCLE));
    assert_eq!(Some(0x1000), store[lost].absolute_address());
    assert!(store[lost].alternate_target().is_none());
  }

  #[test]
  fn reports_addresses_beyond_32_bits() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0xFFFF_FF00));
    let r = store.attach(p, Node::register("R", 0x200));
    let f = store.attach(r, Node::field("F", 0, 1));

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::ADDRESS_OVERFLOW));
    assert_eq!(None, store[r].absolute_address());
    assert_eq!(None, store[f].absolute_address());
  }
}
