//! Cascading of declared attributes into fully populated effective values.

use crate::{
  diagnostic::{codes, Arg, Diagnostic, Diagnostics},
  node::{Declared, Kind, NodeId, NodeKind, NodeStore},
  options::Options,
  value::{width_mask, ModifiedWriteValuesSpec, ProtectionSpec, ReadActionSpec},
  AccessSpec,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{instrument, trace};

/// The values actually used for an element after inheritance and overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Effective {
  pub bit_width: u32,
  pub access: AccessSpec,
  pub protection: ProtectionSpec,
  pub reset_value: u64,
  pub reset_mask: u64,
  pub read_action: ReadActionSpec,
  pub modified_write_values: ModifiedWriteValuesSpec,
}

pub struct AttributeResolver<'a> {
  store: &'a mut NodeStore,
  diagnostics: &'a mut Diagnostics,
  options: &'a Options,
}
impl<'a> AttributeResolver<'a> {
  pub fn new(
    store: &'a mut NodeStore,
    diagnostics: &'a mut Diagnostics,
    options: &'a Options,
  ) -> Self {
    Self {
      store,
      diagnostics,
      options,
    }
  }

  #[instrument(skip_all)]
  pub fn resolve_all(&mut self) {
    let root = self.store.root();
    for id in self.store.preorder(root) {
      self.resolve(id);
    }
  }

  /// Computes and stores the effective attributes of `id`. The parent is resolved first if it
  /// has not been yet, so calling this in pre-order never recurses.
  pub fn resolve(&mut self, id: NodeId) -> Effective {
    if let Some(effective) = self.store[id].effective() {
      return effective.clone();
    }

    let effective = match self.store.parent(id) {
      None => {
        let base = self.global_defaults();
        self.cascade(id, &base)
      }
      Some(parent) => {
        let parent_effective = self.resolve(parent);
        match self.store[id].kind() {
          Kind::Field => self.field(id, &parent_effective),
          Kind::Device | Kind::Peripheral | Kind::Cluster | Kind::Register => {
            self.cascade(id, &parent_effective)
          }
          Kind::AddressBlock | Kind::Interrupt | Kind::EnumContainer | Kind::Enum => {
            parent_effective
          }
        }
      }
    };

    trace!(name = %self.store[id].name_calculated, ?effective, "resolved attributes");
    if let Some(node) = self.store.get_mut(id) {
      node.effective = Some(effective.clone());
    }

    if self.store[id].kind() == Kind::EnumContainer {
      self.designate_default(id, &effective);
    }

    effective
  }

  fn global_defaults(&self) -> Effective {
    let d = &self.options.defaults;
    Effective {
      bit_width: d.bit_width,
      access: d.access,
      protection: d.protection,
      reset_value: d.reset_value & width_mask(d.bit_width),
      reset_mask: d.reset_mask.unwrap_or(u64::MAX) & width_mask(d.bit_width),
      read_action: d.read_action,
      modified_write_values: d.modified_write_values,
    }
  }

  /// Own declaration, else the parent's effective value. Reset value and mask are masked to the
  /// resulting width.
  fn cascade(&mut self, id: NodeId, parent: &Effective) -> Effective {
    let declared = self.store[id].declared.clone();
    let bit_width = declared.bit_width.unwrap_or(parent.bit_width);
    let mask = width_mask(bit_width);

    let reset_value = match declared.reset_value {
      Some(value) => self.fit(id, value, bit_width),
      None => parent.reset_value & mask,
    };
    let reset_mask = match declared.reset_mask {
      Some(value) => value & mask,
      None => self.inherited_reset_mask(id) & mask,
    };

    Self::merge(&declared, parent, bit_width, reset_value, reset_mask)
  }

  /// Fields take their width from their own bit range and slice their reset value and mask out
  /// of the enclosing register's.
  fn field(&mut self, id: NodeId, register: &Effective) -> Effective {
    let declared = self.store[id].declared.clone();
    let bit_width = match declared.bit_width {
      Some(width) if width > 0 => width,
      _ => {
        let node = &self.store[id];
        self.diagnostics.record(
          Diagnostic::error(codes::FIELD_WITHOUT_WIDTH)
            .with(Arg::Name, &node.name_calculated)
            .with_line(Arg::Line, node.line),
        );
        1
      }
    };
    let mask = width_mask(bit_width);
    let shift = self.store[id].offset.unwrap_or(0);
    let slice = |value: u64| {
      if shift >= 64 {
        0
      } else {
        (value >> shift) & mask
      }
    };

    let reset_value = match declared.reset_value {
      Some(value) => self.fit(id, value, bit_width),
      None => slice(register.reset_value),
    };
    let reset_mask = match declared.reset_mask {
      Some(value) => value & mask,
      None => slice(register.reset_mask),
    };

    Self::merge(&declared, register, bit_width, reset_value, reset_mask)
  }

  fn merge(
    declared: &Declared,
    parent: &Effective,
    bit_width: u32,
    reset_value: u64,
    reset_mask: u64,
  ) -> Effective {
    Effective {
      bit_width,
      access: declared.access.unwrap_or(parent.access),
      protection: declared.protection.unwrap_or(parent.protection),
      reset_value,
      reset_mask,
      read_action: declared.read_action.unwrap_or(parent.read_action),
      modified_write_values: declared
        .modified_write_values
        .unwrap_or(parent.modified_write_values),
    }
  }

  /// The closest reset mask declared on an ancestor, or the global default. All ones when
  /// nothing is declared, so that widening a register does not narrow its mask.
  fn inherited_reset_mask(&self, id: NodeId) -> u64 {
    let mut current = self.store.parent(id);
    while let Some(ancestor) = current {
      if let Some(mask) = self.store[ancestor].declared.reset_mask {
        return mask;
      }
      current = self.store.parent(ancestor);
    }
    self.options.defaults.reset_mask.unwrap_or(u64::MAX)
  }

  fn fit(&mut self, id: NodeId, value: u64, bit_width: u32) -> u64 {
    let mask = width_mask(bit_width);
    if value & !mask != 0 {
      let node = &self.store[id];
      self.diagnostics.record(
        Diagnostic::warning(codes::RESET_VALUE_TRUNCATED)
          .with(Arg::Name, &node.name_calculated)
          .with(Arg::Value, format!("{:#x}", value))
          .with(Arg::Width, bit_width)
          .with_line(Arg::Line, node.line),
      );
    }
    value & mask
  }

  /// Picks the enumerated value standing for all unlisted values. The first one marked default
  /// wins.
  fn designate_default(&mut self, container: NodeId, field: &Effective) {
    let mut default = None;
    let mut values = BTreeSet::new();

    for child in self.store.children(container).to_vec() {
      let node = &self.store[child];
      if let NodeKind::Enum(data) = &node.kind {
        if let Some(v) = data.value {
          values.insert(v);
        }
        if !data.is_default {
          continue;
        }
        match default {
          None => default = Some(child),
          Some(first) => {
            self.diagnostics.record(
              Diagnostic::warning(codes::MULTIPLE_DEFAULT_ENUMS)
                .with(Arg::Name, &node.name_calculated)
                .with(Arg::Name2, &self.store[first].name_calculated)
                .with_line(Arg::Line, node.line),
            );
          }
        }
      }
    }

    let usage = match &self.store[container].kind {
      NodeKind::EnumContainer(data) => data.usage,
      _ => None,
    };
    if let Some(node) = self.store.get_mut(container) {
      if let NodeKind::EnumContainer(data) = &mut node.kind {
        data.default_value = default;
      }
    }

    let writable = field.access.can_write() && usage.map_or(true, |u| u.can_write());
    if default.is_some() || !writable || !self.options.report_enum_coverage {
      return;
    }
    if field.bit_width >= 64 {
      return;
    }
    let mask = width_mask(field.bit_width);
    let covered = values.iter().filter(|v| **v <= mask).count() as u64;
    if covered < mask + 1 {
      let owner = self.store.parent(container).unwrap_or(container);
      let node = &self.store[owner];
      self.diagnostics.record(
        Diagnostic::info(codes::ENUM_WITHOUT_DEFAULT)
          .with(Arg::Name, &node.name_calculated)
          .with(Arg::Width, field.bit_width)
          .with(Arg::Count, covered)
          .with_line(Arg::Line, node.line),
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::AttributeResolver;
  use crate::{
    diagnostic::{codes, Diagnostics},
    node::{Node, NodeId, NodeKind, NodeStore},
    options::Options,
    value::ProtectionSpec,
    AccessSpec,
  };

  fn resolve(store: &mut NodeStore) -> Diagnostics {
    let options = Options::default();
    let mut diagnostics = Diagnostics::new();
    AttributeResolver::new(store, &mut diagnostics, &options).resolve_all();
    diagnostics
  }

  fn field_tree(register: Node, field: Node) -> (NodeStore, NodeId, NodeId) {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0));
    let r = store.attach(p, register);
    let f = store.attach(r, field);
    (store, r, f)
  }

  #[test]
  fn declared_access_overrides_inherited() {
    let mut store = NodeStore::new(Node::device("DEV"));
    let p = store.attach(store.root(), Node::peripheral("P", 0x4000_0000));
    let r = store.attach(p, Node::register("R", 0).with_access(AccessSpec::ReadOnly));
    let f = store.attach(r, Node::field("F", 0, 1));

    let diagnostics = resolve(&mut store);

    assert!(diagnostics.is_empty());
    assert_eq!(AccessSpec::ReadWrite, store[p].effective().unwrap().access);
    assert_eq!(AccessSpec::ReadOnly, store[r].effective().unwrap().access);
    assert_eq!(AccessSpec::ReadOnly, store[f].effective().unwrap().access);
  }

  #[test]
  fn device_declarations_root_the_cascade() {
    let mut store = NodeStore::new(
      Node::device("DEV")
        .with_size(16)
        .with_protection(ProtectionSpec::Secure),
    );
    let p = store.attach(store.root(), Node::peripheral("P", 0));
    let r = store.attach(p, Node::register("R", 0));

    resolve(&mut store);

    let e = store[r].effective().unwrap();
    assert_eq!(16, e.bit_width);
    assert_eq!(ProtectionSpec::Secure, e.protection);
    assert_eq!(0xFFFF, e.reset_mask);
  }

  #[test]
  fn field_reset_mask_defaults_to_width_ones() {
    let (mut store, _, f) = field_tree(Node::register("R", 0), Node::field("F", 4, 3));

    resolve(&mut store);

    let e = store[f].effective().unwrap();
    assert_eq!(3, e.bit_width);
    assert_eq!((1 << 3) - 1, e.reset_mask);
  }

  #[test]
  fn widening_register_keeps_full_mask() {
    let mut store = NodeStore::new(Node::device("DEV").with_size(8));
    let p = store.attach(store.root(), Node::peripheral("P", 0));
    let r = store.attach(p, Node::register("R", 0).with_size(32));

    resolve(&mut store);

    assert_eq!(0xFFFF_FFFF, store[r].effective().unwrap().reset_mask);
  }

  #[test]
  fn field_reset_value_is_sliced_from_register() {
    let (mut store, _, f) = field_tree(
      Node::register("R", 0).with_reset_value(0x0000_A500),
      Node::field("F", 8, 8),
    );

    resolve(&mut store);

    assert_eq!(0xA5, store[f].effective().unwrap().reset_value);
  }

  #[test]
  fn oversized_reset_value_is_masked_with_warning() {
    let (mut store, r, _) = field_tree(
      Node::register("R", 0).with_size(8).with_reset_value(0x1FF),
      Node::field("F", 0, 8),
    );

    let diagnostics = resolve(&mut store);

    assert_eq!(0xFF, store[r].effective().unwrap().reset_value);
    assert_eq!(1, diagnostics.count(codes::RESET_VALUE_TRUNCATED));
  }

  #[test]
  fn field_without_width_is_reported() {
    let (mut store, _, f) = field_tree(
      Node::register("R", 0),
      Node::field("F", 0, 1).without_size().at_line(9),
    );

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::FIELD_WITHOUT_WIDTH));
    assert_eq!(1, store[f].effective().unwrap().bit_width);
  }

  #[test]
  fn first_default_enum_wins() {
    let (mut store, _, f) = field_tree(Node::register("R", 0), Node::field("MODE", 0, 2));
    let c = store.attach(f, Node::enum_container("MODE_E"));
    store.attach(c, Node::enumerated("A", 0));
    let first = store.attach(c, Node::enumerated_default("OTHER"));
    store.attach(c, Node::enumerated_default("ELSE"));

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::MULTIPLE_DEFAULT_ENUMS));
    assert_eq!(0, diagnostics.count(codes::ENUM_WITHOUT_DEFAULT));
    match &store[c].kind {
      NodeKind::EnumContainer(data) => assert_eq!(Some(first), data.default_value),
      other => panic!("unexpected payload {:?}", other),
    }
  }

  #[test]
  fn incomplete_writable_enum_is_reported_as_info() {
    let (mut store, _, f) = field_tree(Node::register("R", 0), Node::field("MODE", 0, 2));
    let c = store.attach(f, Node::enum_container("MODE_E"));
    store.attach(c, Node::enumerated("A", 0));
    store.attach(c, Node::enumerated("B", 1));

    let diagnostics = resolve(&mut store);

    assert_eq!(1, diagnostics.count(codes::ENUM_WITHOUT_DEFAULT));
    assert_eq!(
      Some(crate::diagnostic::Severity::Info),
      diagnostics.max_severity()
    );
  }

  #[test]
  fn read_only_enum_needs_no_default() {
    let (mut store, _, f) = field_tree(
      Node::register("R", 0).with_access(AccessSpec::ReadOnly),
      Node::field("MODE", 0, 2),
    );
    let c = store.attach(f, Node::enum_container("MODE_E"));
    store.attach(c, Node::enumerated("A", 0));

    let diagnostics = resolve(&mut store);

    assert!(diagnostics.is_empty());
  }
}
