//! Read-only consistency checks over the resolved tree.

use crate::{
  diagnostic::{codes, Arg, Diagnostic, Diagnostics},
  error::{Error, Result},
  node::{Kind, NodeId, NodeKind, NodeStore},
  options::Options,
  session::Stage,
  value::width_mask,
};
use std::collections::HashMap;
use tracing::instrument;

pub struct Validator<'a> {
  store: &'a NodeStore,
  diagnostics: &'a mut Diagnostics,
  options: &'a Options,
}
impl<'a> Validator<'a> {
  pub fn new(
    store: &'a NodeStore,
    diagnostics: &'a mut Diagnostics,
    options: &'a Options,
  ) -> Self {
    Self {
      store,
      diagnostics,
      options,
    }
  }

  /// Records a diagnostic for every inconsistency found. Fails only if the tree breaks an
  /// invariant the earlier passes guarantee.
  #[instrument(skip_all)]
  pub fn validate(&mut self) -> Result<()> {
    let store = self.store;
    for id in store.preorder(store.root()) {
      let node = &store[id];
      let kind = node.kind();

      if kind.is_structural() {
        if node.effective().is_none() {
          return Err(self.internal(format!(
            "{} {} has no effective attributes",
            kind, node.name_calculated
          )));
        }
        if node.name_calculated.trim().is_empty() {
          self.diagnostics.record(
            Diagnostic::error(codes::MISSING_NAME)
              .with(Arg::Kind, kind)
              .with_line(Arg::Line, node.line),
          );
        }
      }

      match kind {
        Kind::Peripheral => self.check_address_blocks(id),
        Kind::Register => self.check_fields(id),
        Kind::Field => self.check_enumerated_values(id),
        _ => {}
      }

      self.check_names(id);
      if self.options.check_overlaps {
        self.check_register_overlap(id);
      }
    }
    Ok(())
  }

  fn internal(&self, detail: String) -> Error {
    Error::Internal {
      stage: Stage::Validated,
      detail,
      diagnostics: self.diagnostics.iter().cloned().collect(),
    }
  }

  /// Calculated names must be unique among the children of `parent`.
  fn check_names(&mut self, parent: NodeId) {
    let store = self.store;
    let mut seen: HashMap<(bool, &str), NodeId> = HashMap::new();
    for child in store.children(parent) {
      let node = &store[*child];
      if node.kind() == Kind::AddressBlock || node.name_calculated.is_empty() {
        continue;
      }
      let key = (node.kind() == Kind::Interrupt, node.name_calculated.as_str());
      match seen.get(&key) {
        Some(first) => self.diagnostics.record(
          Diagnostic::error(codes::DUPLICATE_NAME)
            .with(Arg::Name, &node.name_calculated)
            .with_line(Arg::Line, node.line)
            .with_line(Arg::Line2, store[*first].line),
        ),
        None => {
          seen.insert(key, *child);
        }
      }
    }
  }

  /// Sibling registers must not cover the same bytes unless they are views of one location.
  fn check_register_overlap(&mut self, parent: NodeId) {
    let store = self.store;
    let registers: Vec<(NodeId, u64, u64)> = store
      .children(parent)
      .iter()
      .filter(|c| store[**c].kind() == Kind::Register)
      .filter_map(|c| {
        let node = &store[*c];
        let start = node.absolute_address()?;
        let bytes = (u64::from(node.effective()?.bit_width) + 7) / 8;
        Some((*c, start, start + bytes.max(1)))
      })
      .collect();

    for (i, (a, a_start, a_end)) in registers.iter().enumerate() {
      for (b, b_start, b_end) in registers.iter().skip(i + 1) {
        if a_start >= b_end || b_start >= a_end {
          continue;
        }
        let (first, second) = (&store[*a], &store[*b]);
        if first.shares_location_with(second) {
          continue;
        }
        self.diagnostics.record(
          Diagnostic::warning(codes::ADDRESS_OVERLAP)
            .with(Arg::Name, &first.name_calculated)
            .with_line(Arg::Line, first.line)
            .with(Arg::Name2, &second.name_calculated)
            .with_line(Arg::Line2, second.line)
            .with(Arg::Address, format!("{:#010x}", a_start.max(b_start))),
        );
      }
    }
  }

  /// Fields must lie within their register and must not overlap each other.
  fn check_fields(&mut self, register: NodeId) {
    let store = self.store;
    let width = match store[register].effective() {
      Some(e) => u64::from(e.bit_width),
      None => return,
    };

    let mut ranges: Vec<(NodeId, u64, u64)> = Vec::new();
    for child in store.children(register) {
      let node = &store[*child];
      let effective = match (node.kind(), node.effective()) {
        (Kind::Field, Some(e)) => e,
        _ => continue,
      };
      let lsb = node.offset.unwrap_or(0);
      let msb = lsb + u64::from(effective.bit_width) - 1;

      if msb >= width {
        self.diagnostics.record(
          Diagnostic::error(codes::FIELD_OUTSIDE_REGISTER)
            .with(Arg::Name, &node.name_calculated)
            .with(Arg::Value, format!("[{}:{}]", msb, lsb))
            .with(Arg::Width, width)
            .with(Arg::Name2, &store[register].name_calculated)
            .with_line(Arg::Line, node.line),
        );
      }

      for (other, other_lsb, other_msb) in ranges.iter() {
        if lsb <= *other_msb && *other_lsb <= msb {
          let previous = &store[*other];
          self.diagnostics.record(
            Diagnostic::warning(codes::FIELD_OVERLAP)
              .with(Arg::Name, &node.name_calculated)
              .with_line(Arg::Line, node.line)
              .with(Arg::Name2, &previous.name_calculated)
              .with_line(Arg::Line2, previous.line),
          );
        }
      }
      ranges.push((*child, lsb, msb));
    }
  }

  /// Enumerated values must fit into the field.
  fn check_enumerated_values(&mut self, field: NodeId) {
    let store = self.store;
    let width = match store[field].effective() {
      Some(e) => e.bit_width,
      None => return,
    };
    let mask = width_mask(width);

    for container in store.children(field) {
      for value in store.children(*container) {
        let node = &store[*value];
        if let NodeKind::Enum(data) = &node.kind {
          match data.value {
            Some(v) if v > mask => self.diagnostics.record(
              Diagnostic::error(codes::ENUM_VALUE_TOO_WIDE)
                .with(Arg::Name, &node.name_calculated)
                .with(Arg::Value, v)
                .with(Arg::Width, width)
                .with(Arg::Name2, &store[field].name_calculated)
                .with_line(Arg::Line, node.line),
            ),
            _ => {}
          }
        }
      }
    }
  }

  fn check_address_blocks(&mut self, peripheral: NodeId) {
    if !self.options.require_address_block {
      return;
    }
    let store = self.store;
    let has_block = store
      .children(peripheral)
      .iter()
      .any(|c| store[*c].kind() == Kind::AddressBlock);
    if !has_block {
      let node = &store[peripheral];
      self.diagnostics.record(
        Diagnostic::warning(codes::MISSING_ADDRESS_BLOCK)
          .with(Arg::Name, &node.name_calculated)
          .with_line(Arg::Line, node.line),
      );
    }
  }
}
