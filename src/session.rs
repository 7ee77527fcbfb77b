//! The staged construction pipeline.
//!
//! A [`Session`] owns the node store of one conversion run and moves it through the stages in
//! a fixed order. Problems in the described device are recorded as diagnostics and never stop
//! the pipeline; only a broken invariant aborts it with [`Error::Internal`].

use crate::{
  address::AddressResolver,
  attributes::AttributeResolver,
  diagnostic::Diagnostics,
  dimension::Expander,
  error::{Error, Result},
  model::ResolvedModel,
  node::NodeStore,
  options::Options,
  resolver::{NameIndex, Resolver},
  validate::Validator,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
  Raw,
  NameIndexed,
  Derived,
  Expanded,
  AttributesResolved,
  AddressesResolved,
  Validated,
  Ready,
}
impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let name = match self {
      Stage::Raw => "raw",
      Stage::NameIndexed => "name indexing",
      Stage::Derived => "derivation",
      Stage::Expanded => "dimension expansion",
      Stage::AttributesResolved => "attribute resolution",
      Stage::AddressesResolved => "address resolution",
      Stage::Validated => "validation",
      Stage::Ready => "model hand-off",
    };
    write!(f, "{}", name)
  }
}

pub struct Session {
  store: NodeStore,
  options: Options,
  diagnostics: Diagnostics,
  index: NameIndex,
  stage: Stage,
}
impl Session {
  pub fn new(store: NodeStore, options: Options) -> Self {
    Self {
      store,
      options,
      diagnostics: Diagnostics::new(),
      index: NameIndex::default(),
      stage: Stage::Raw,
    }
  }

  /// Runs every stage and hands off the resolved model.
  #[instrument(skip_all)]
  pub fn run(store: NodeStore, options: &Options) -> Result<ResolvedModel> {
    let mut session = Session::new(store, options.clone());
    session.index_names()?;
    session.derive()?;
    session.expand()?;
    session.resolve_attributes()?;
    session.resolve_addresses()?;
    session.validate()?;
    session.finish()
  }

  pub fn stage(&self) -> Stage {
    self.stage
  }

  pub fn store(&self) -> &NodeStore {
    &self.store
  }

  pub fn diagnostics(&self) -> &Diagnostics {
    &self.diagnostics
  }

  fn internal(&self, stage: Stage, detail: String) -> Error {
    Error::Internal {
      stage,
      detail,
      diagnostics: self.diagnostics.iter().cloned().collect(),
    }
  }

  fn enter(&self, next: Stage) -> Result<()> {
    let expected = match next {
      Stage::Raw => None,
      Stage::NameIndexed => Some(Stage::Raw),
      Stage::Derived => Some(Stage::NameIndexed),
      Stage::Expanded => Some(Stage::Derived),
      Stage::AttributesResolved => Some(Stage::Expanded),
      Stage::AddressesResolved => Some(Stage::AttributesResolved),
      Stage::Validated => Some(Stage::AddressesResolved),
      Stage::Ready => Some(Stage::Validated),
    };
    if expected == Some(self.stage) {
      Ok(())
    } else {
      Err(self.internal(next, format!("cannot start {} in stage {:?}", next, self.stage)))
    }
  }

  fn complete(&mut self, stage: Stage) {
    self.stage = stage;
    info!(
      stage = ?stage,
      nodes = self.store.len(),
      diagnostics = self.diagnostics.len(),
      "stage complete"
    );
  }

  pub fn index_names(&mut self) -> Result<()> {
    self.enter(Stage::NameIndexed)?;
    self.index = NameIndex::build(&self.store);
    self.complete(Stage::NameIndexed);
    Ok(())
  }

  pub fn derive(&mut self) -> Result<()> {
    self.enter(Stage::Derived)?;
    let pending = {
      let mut resolver = Resolver::new(&mut self.store, &mut self.diagnostics, &mut self.index);
      resolver.derive_all();
      resolver.pending()
    };
    if !pending.is_empty() {
      let names: Vec<&str> = pending.iter().map(|id| self.store[*id].name.as_str()).collect();
      return Err(self.internal(
        Stage::Derived,
        format!("derivations left unapplied: {}", names.join(", ")),
      ));
    }
    self.complete(Stage::Derived);
    Ok(())
  }

  pub fn expand(&mut self) -> Result<()> {
    self.enter(Stage::Expanded)?;
    Expander::new(&mut self.store, &mut self.diagnostics, &self.options.placeholder).expand_all();
    self.complete(Stage::Expanded);
    Ok(())
  }

  pub fn resolve_attributes(&mut self) -> Result<()> {
    self.enter(Stage::AttributesResolved)?;
    AttributeResolver::new(&mut self.store, &mut self.diagnostics, &self.options).resolve_all();
    self.complete(Stage::AttributesResolved);
    Ok(())
  }

  pub fn resolve_addresses(&mut self) -> Result<()> {
    self.enter(Stage::AddressesResolved)?;
    AddressResolver::new(&mut self.store, &mut self.diagnostics).resolve_all();
    self.complete(Stage::AddressesResolved);
    Ok(())
  }

  pub fn validate(&mut self) -> Result<()> {
    self.enter(Stage::Validated)?;
    Validator::new(&self.store, &mut self.diagnostics, &self.options).validate()?;
    self.complete(Stage::Validated);
    Ok(())
  }

  /// Converts the validated tree into the read-only model.
  pub fn finish(mut self) -> Result<ResolvedModel> {
    self.enter(Stage::Ready)?;
    self.complete(Stage::Ready);
    ResolvedModel::new(&self.store, self.diagnostics)
  }
}
