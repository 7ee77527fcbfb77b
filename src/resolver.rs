//! Resolution of `derivedFrom` references and application of derivations.
//!
//! References are dotted paths of declared names. The [`NameIndex`] is built over the whole
//! declared tree before any copying, so forward references resolve regardless of declaration
//! order. Children copied in by a derivation are added to the index as they appear.

use crate::{
  diagnostic::{codes, Arg, Diagnostic, DiagnosticCode, Diagnostics},
  node::{Kind, NodeId, NodeStore},
};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Maximum number of segments in a reference path.
const MAX_SEGMENTS: usize = 3;

/// Upper bound on derivation rounds. Every round derives all pending nodes; later rounds only
/// handle nodes copied in by earlier ones.
const MAX_ROUNDS: usize = 32;

/// Outcome of looking up a reference path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  Found(NodeId),
  NotFound,
  /// More than one node matches at the same level of the path.
  Ambiguous(Vec<NodeId>),
  /// The path is empty, has empty segments or too many of them.
  Malformed,
}

/// Children of each node, keyed by declared name.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
  entries: HashMap<(NodeId, String), Vec<NodeId>>,
}
impl NameIndex {
  pub fn build(store: &NodeStore) -> Self {
    let mut index = Self::default();
    index.insert_subtree(store, store.root());
    index
  }

  /// Adds `id` and every node below it.
  pub fn insert_subtree(&mut self, store: &NodeStore, id: NodeId) {
    for node in store.preorder(id) {
      if let Some(parent) = store.parent(node) {
        self
          .entries
          .entry((parent, store[node].name.clone()))
          .or_insert_with(Vec::new)
          .push(node);
      }
    }
  }

  pub fn lookup(&self, parent: NodeId, name: &str) -> &[NodeId] {
    self
      .entries
      .get(&(parent, name.to_owned()))
      .map(|v| v.as_slice())
      .unwrap_or(&[])
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
  Pending,
  InProgress,
  Done,
}

pub struct Resolver<'a> {
  store: &'a mut NodeStore,
  diagnostics: &'a mut Diagnostics,
  index: &'a mut NameIndex,
  states: HashMap<NodeId, State>,
  stack: Vec<NodeId>,
}
impl<'a> Resolver<'a> {
  pub fn new(
    store: &'a mut NodeStore,
    diagnostics: &'a mut Diagnostics,
    index: &'a mut NameIndex,
  ) -> Self {
    Self {
      store,
      diagnostics,
      index,
      states: HashMap::new(),
      stack: Vec::new(),
    }
  }

  fn state(&self, id: NodeId) -> State {
    self.states.get(&id).copied().unwrap_or(State::Pending)
  }

  /// Applies every derivation in the tree, including those of nodes copied in by other
  /// derivations.
  #[instrument(skip_all)]
  pub fn derive_all(&mut self) {
    for round in 0..MAX_ROUNDS {
      let pending = self.pending();
      if pending.is_empty() {
        return;
      }
      debug!(round, count = pending.len(), "deriving pending elements");
      for id in pending {
        self.derive(id);
      }
    }
  }

  /// Reachable nodes whose derivation has not been applied.
  pub fn pending(&self) -> Vec<NodeId> {
    self
      .store
      .preorder(self.store.root())
      .into_iter()
      .filter(|id| self.store[*id].derived_from.is_some() && self.state(*id) == State::Pending)
      .collect()
  }

  /// Looks up a reference made by `scope`: first among its siblings, then inside its enclosing
  /// peripheral, then from the device root.
  pub fn resolve(&mut self, path: &str, scope: NodeId) -> Resolution {
    let segments: Vec<&str> = path.split('.').map(|s| s.trim()).collect();
    if segments.len() > MAX_SEGMENTS || segments.iter().any(|s| s.is_empty()) {
      return Resolution::Malformed;
    }

    let mut scopes = Vec::with_capacity(3);
    if let Some(parent) = self.store.parent(scope) {
      scopes.push(parent);
    }
    if let Some(peripheral) = self.store.enclosing_peripheral(scope) {
      if peripheral != scope && !scopes.contains(&peripheral) {
        scopes.push(peripheral);
      }
    }
    let root = self.store.root();
    if !scopes.contains(&root) {
      scopes.push(root);
    }

    for from in scopes {
      match self.search(&segments, from) {
        Resolution::NotFound => continue,
        resolution => return resolution,
      }
    }
    Resolution::NotFound
  }

  fn search(&mut self, segments: &[&str], from: NodeId) -> Resolution {
    let mut current = from;
    for (i, segment) in segments.iter().enumerate() {
      let found = self.index.lookup(current, segment).to_vec();
      match found.len() {
        0 => return Resolution::NotFound,
        1 => current = found[0],
        _ => return Resolution::Ambiguous(found),
      }
      if i + 1 < segments.len() {
        // The next segment may only exist once this one has been derived.
        self.derive(current);
      }
    }
    Resolution::Found(current)
  }

  /// Applies the derivation of `id`, deriving its target first.
  pub fn derive(&mut self, id: NodeId) {
    if self.state(id) != State::Pending {
      return;
    }
    let path = match self.store[id].derived_from.clone() {
      Some(path) => path,
      None => {
        self.states.insert(id, State::Done);
        return;
      }
    };

    self.states.insert(id, State::InProgress);
    self.stack.push(id);

    match self.resolve(&path, id) {
      Resolution::Found(target) => self.apply(id, target, &path),
      Resolution::NotFound => self.report(codes::UNRESOLVED_REFERENCE, id, &path, None),
      Resolution::Ambiguous(candidates) => {
        self.report(codes::AMBIGUOUS_REFERENCE, id, &path, Some(candidates.len()))
      }
      Resolution::Malformed => self.report(codes::INVALID_REFERENCE_PATH, id, &path, None),
    }

    self.stack.pop();
    self.states.insert(id, State::Done);
  }

  fn report(&mut self, code: DiagnosticCode, id: NodeId, path: &str, count: Option<usize>) {
    let node = &self.store[id];
    let mut diagnostic = Diagnostic::error(code)
      .with(Arg::Name, &node.name)
      .with(Arg::Path, path)
      .with_line(Arg::Line, node.line);
    if let Some(count) = count {
      diagnostic = diagnostic.with(Arg::Count, count);
    }
    self.diagnostics.record(diagnostic);
  }

  fn apply(&mut self, id: NodeId, target: NodeId, path: &str) {
    if let Some(position) = self.stack.iter().position(|n| *n == target) {
      let mut chain: Vec<&str> = self.stack[position..]
        .iter()
        .map(|n| self.store[*n].name.as_str())
        .collect();
      chain.push(self.store[target].name.as_str());
      let chain = chain.join(" -> ");
      self.cycle(id, target, chain);
      return;
    }
    if self.store.is_ancestor(target, id) {
      let chain = format!("{} -> {}", self.store[id].name, self.store[target].name);
      self.cycle(id, target, chain);
      return;
    }

    let (kind, expected) = (self.store[target].kind(), self.store[id].kind());
    if kind != expected {
      let node = &self.store[id];
      self.diagnostics.record(
        Diagnostic::error(codes::KIND_MISMATCH)
          .with(Arg::Name, &node.name)
          .with(Arg::Path, path)
          .with(Arg::Kind, kind)
          .with(Arg::Expected, expected)
          .with_line(Arg::Line, node.line),
      );
      return;
    }

    self.derive(target);
    debug!(name = %self.store[id].name, target = %path, "applying derivation");
    self.copy_from(id, target);
    if let Some(node) = self.store.get_mut(id) {
      node.derived_target = Some(target);
    }
  }

  fn cycle(&mut self, id: NodeId, target: NodeId, chain: String) {
    let (node, other) = (&self.store[id], &self.store[target]);
    self.diagnostics.record(
      Diagnostic::error(codes::DERIVATION_CYCLE)
        .with(Arg::Name, &node.name)
        .with(Arg::Name2, &other.name)
        .with(Arg::Chain, chain)
        .with_line(Arg::Line, node.line),
    );
  }

  /// Fills everything `dst` does not declare itself from `src`, merging children that share a
  /// declared name and kind.
  fn copy_from(&mut self, dst: NodeId, src: NodeId) {
    let source = self.store[src].clone();
    if let Some(node) = self.store.get_mut(dst) {
      node.declared.inherit_from(&source.declared);
      node.kind.inherit_from(&source.kind);
      if node.description.is_none() {
        node.description = source.description.clone();
      }
      if node.offset.is_none() {
        node.offset = source.offset;
      }
      if node.dimension.is_none() {
        node.dimension = source.dimension.clone();
      }
      if node.alternate.is_none() {
        node.alternate = source.alternate.clone();
      }
    }

    let has_blocks = self
      .store
      .children(dst)
      .iter()
      .any(|c| self.store[*c].kind() == Kind::AddressBlock);

    for child in source.children() {
      let child = *child;
      let kind = self.store[child].kind();
      match kind {
        Kind::Interrupt => continue,
        Kind::AddressBlock if has_blocks => continue,
        _ => {}
      }

      let name = self.store[child].name.clone();
      let existing = self
        .store
        .children_named(dst, &name)
        .into_iter()
        .find(|c| self.store[*c].kind() == kind);

      match existing {
        Some(local) if kind != Kind::AddressBlock => self.copy_from(local, child),
        _ => self.append_copy(dst, child),
      }
    }
  }

  fn append_copy(&mut self, dst: NodeId, child: NodeId) {
    let copy = self.store.clone_subtree(child, dst);
    let mut children = self.store.children(dst).to_vec();
    children.push(copy);
    self.store.set_children(dst, children);

    // Nodes already derived at their original place stay derived in the copy.
    let originals = self.store.preorder(child);
    let copies = self.store.preorder(copy);
    for (original, copied) in originals.into_iter().zip(copies) {
      let state = self.state(original);
      if state == State::Done {
        self.states.insert(copied, State::Done);
        let target = self.store[original].derived_target;
        if let Some(node) = self.store.get_mut(copied) {
          node.derived_target = target;
        }
      }
    }

    self.index.insert_subtree(self.store, copy);
  }
}
