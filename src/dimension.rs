//! Expansion of dimensioned declarations into concrete, individually named siblings.

use crate::{
  diagnostic::{codes, Arg, Diagnostic, Diagnostics},
  node::{NodeId, NodeStore},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};

/// Compact declaration of `count` copies of an element, `increment` apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
  /// Number of copies. Kept signed so that malformed input survives until it can be reported.
  pub count: i64,

  /// Distance between consecutive copies: bytes for peripherals, clusters and registers, bits
  /// for fields.
  pub increment: u64,

  /// Labels substituted for the placeholder. Numeric labels `0..count` when absent.
  pub index: Option<Vec<String>>,
}
impl Dimension {
  pub fn new(count: i64, increment: u64) -> Self {
    Self {
      count,
      increment,
      index: None,
    }
  }

  pub fn with_index<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
    self.index = Some(labels.iter().map(|l| l.as_ref().to_owned()).collect());
    self
  }

  /// Dimension of an SVD array element.
  pub(crate) fn from_array(dim: u32, increment: u32, index: &Option<Vec<String>>) -> Self {
    Self {
      count: i64::from(dim),
      increment: u64::from(increment),
      index: index.clone(),
    }
  }
}

/// Replaces `placeholder` in a declared name. Names without the placeholder get the label
/// appended so that the copies stay distinguishable.
pub fn substitute(name: &str, placeholder: &str, label: &str) -> String {
  if name.contains(placeholder) {
    name.replace(placeholder, label)
  } else {
    format!("{}{}", name, label)
  }
}

/// Expands every dimensioned node of a store, parents before children.
pub struct Expander<'a> {
  store: &'a mut NodeStore,
  diagnostics: &'a mut Diagnostics,
  placeholder: &'a str,
}
impl<'a> Expander<'a> {
  pub fn new(
    store: &'a mut NodeStore,
    diagnostics: &'a mut Diagnostics,
    placeholder: &'a str,
  ) -> Self {
    Self {
      store,
      diagnostics,
      placeholder,
    }
  }

  /// Expands the whole tree. Running it again on an expanded tree changes nothing, since copies
  /// carry no dimension and templates are no longer listed among their parent's children.
  #[instrument(skip_all)]
  pub fn expand_all(&mut self) {
    let root = self.store.root();
    self.expand_children(root);
  }

  fn expand_children(&mut self, parent: NodeId) {
    let declared = self.store.children(parent).to_vec();
    let mut children = Vec::with_capacity(declared.len());

    for child in declared {
      if self.store[child].dimension.is_some() {
        if let Some(copies) = self.expand(child) {
          children.extend(copies);
        }
      } else {
        children.push(child);
      }
    }

    self.store.set_children(parent, children.clone());

    for child in children {
      self.expand_children(child);
    }
  }

  /// Replicates a dimensioned node into concrete siblings, returned in index order. The
  /// template keeps its dimension and records the copies; the caller lists the copies in place
  /// of the template. Returns `None` if the dimension is malformed; the node is then dropped
  /// from the tree and a diagnostic is recorded.
  pub fn expand(&mut self, id: NodeId) -> Option<Vec<NodeId>> {
    let (dimension, name, description, base, line, parent) = {
      let node = &self.store[id];
      (
        node.dimension.clone()?,
        node.name.clone(),
        node.description.clone(),
        node.offset.unwrap_or(0),
        node.line,
        node.parent()?,
      )
    };

    if dimension.count <= 0 {
      self.diagnostics.record(
        Diagnostic::error(codes::INVALID_DIM_COUNT)
          .with(Arg::Name, &name)
          .with(Arg::Count, dimension.count)
          .with_line(Arg::Line, line),
      );
      return None;
    }

    let labels: Vec<String> = match dimension.index {
      Some(ref labels) => {
        if labels.len() as i64 != dimension.count {
          self.diagnostics.record(
            Diagnostic::error(codes::DIM_INDEX_MISMATCH)
              .with(Arg::Name, &name)
              .with(Arg::Count, labels.len())
              .with(Arg::Expected, dimension.count)
              .with_line(Arg::Line, line),
          );
          return None;
        }
        labels.clone()
      }
      None => (0..dimension.count).map(|i| i.to_string()).collect(),
    };

    let mut offsets = Vec::with_capacity(labels.len());
    for n in 0..labels.len() as u64 {
      match n
        .checked_mul(dimension.increment)
        .and_then(|delta| base.checked_add(delta))
      {
        Some(offset) => offsets.push(offset),
        None => {
          self.diagnostics.record(
            Diagnostic::error(codes::ADDRESS_OVERFLOW)
              .with(Arg::Name, &name)
              .with(Arg::Value, format!("{:#x}", base))
              .with_line(Arg::Line, line),
          );
          return None;
        }
      }
    }

    if !name.contains(self.placeholder) {
      self.diagnostics.record(
        Diagnostic::warning(codes::DIM_NAME_WITHOUT_PLACEHOLDER)
          .with(Arg::Name, &name)
          .with_line(Arg::Line, line),
      );
    }

    debug!(name = %name, count = dimension.count, "expanding dimensioned element");

    let placeholder = self.placeholder;
    let mut copies = Vec::with_capacity(labels.len());
    for (label, offset) in labels.into_iter().zip(offsets) {
      let copy = self.store.clone_subtree(id, parent);
      if let Some(node) = self.store.get_mut(copy) {
        node.dimension = None;
        node.template = Some(id);
        node.name_calculated = substitute(&name, placeholder, &label);
        node.description = description.as_ref().map(|d| d.replace(placeholder, &label));
        node.offset = Some(offset);
        trace!(name = %node.name_calculated, offset, "created dimension instance");
        node.dim_index = Some(label);
      }
      copies.push(copy);
    }

    if let Some(template) = self.store.get_mut(id) {
      template.instances = copies.clone();
    }

    Some(copies)
  }
}
