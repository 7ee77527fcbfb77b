//! Structured diagnostics recorded while the model is constructed.
//!
//! The resolver never renders human-readable text. Each [`Diagnostic`] carries a stable
//! [`DiagnosticCode`], a [`Severity`] and a substitution map keyed by [`Arg`], which the host's
//! message subsystem turns into text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum Severity {
  Info,
  Warning,
  Error,
}
impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Severity::Info => write!(f, "info"),
      Severity::Warning => write!(f, "warning"),
      Severity::Error => write!(f, "error"),
    }
  }
}

/// The failure class of a diagnostic, determining the prefix letter of its code.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
  /// Malformed dimensions, unresolved references, kind mismatches. Prefixed with `S`.
  Structural,
  /// Derivation or alternate cycles. Prefixed with `R`.
  Recursion,
  /// Overlaps, out-of-range values, suspicious defaults. Prefixed with `C`.
  Consistency,
}
impl Category {
  pub fn prefix(self) -> char {
    match self {
      Category::Structural => 'S',
      Category::Recursion => 'R',
      Category::Consistency => 'C',
    }
  }
}

/// A stable diagnostic identifier, displayed as prefix plus three digits (e.g. `S201`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct DiagnosticCode {
  pub category: Category,
  pub number: u16,
}
impl DiagnosticCode {
  pub const fn new(category: Category, number: u16) -> Self {
    Self { category, number }
  }
}
impl fmt::Display for DiagnosticCode {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}{:03}", self.category.prefix(), self.number)
  }
}

/// Codes recorded by the construction passes.
pub mod codes {
  use super::{Category::*, DiagnosticCode};

  pub const UNRESOLVED_REFERENCE: DiagnosticCode = DiagnosticCode::new(Structural, 201);
  pub const AMBIGUOUS_REFERENCE: DiagnosticCode = DiagnosticCode::new(Structural, 202);
  pub const KIND_MISMATCH: DiagnosticCode = DiagnosticCode::new(Structural, 203);
  pub const INVALID_DIM_COUNT: DiagnosticCode = DiagnosticCode::new(Structural, 204);
  pub const DIM_INDEX_MISMATCH: DiagnosticCode = DiagnosticCode::new(Structural, 205);
  pub const DIM_NAME_WITHOUT_PLACEHOLDER: DiagnosticCode = DiagnosticCode::new(Structural, 206);
  pub const FIELD_WITHOUT_WIDTH: DiagnosticCode = DiagnosticCode::new(Structural, 207);
  pub const UNRESOLVED_ALTERNATE: DiagnosticCode = DiagnosticCode::new(Structural, 208);
  pub const ADDRESS_OVERFLOW: DiagnosticCode = DiagnosticCode::new(Structural, 209);
  pub const INVALID_REFERENCE_PATH: DiagnosticCode = DiagnosticCode::new(Structural, 210);

  pub const DERIVATION_CYCLE: DiagnosticCode = DiagnosticCode::new(Recursion, 301);
  pub const ALTERNATE_CYCLE: DiagnosticCode = DiagnosticCode::new(Recursion, 302);

  pub const ADDRESS_OVERLAP: DiagnosticCode = DiagnosticCode::new(Consistency, 401);
  pub const FIELD_OUTSIDE_REGISTER: DiagnosticCode = DiagnosticCode::new(Consistency, 402);
  pub const ENUM_VALUE_TOO_WIDE: DiagnosticCode = DiagnosticCode::new(Consistency, 403);
  pub const MULTIPLE_DEFAULT_ENUMS: DiagnosticCode = DiagnosticCode::new(Consistency, 404);
  pub const MISSING_ADDRESS_BLOCK: DiagnosticCode = DiagnosticCode::new(Consistency, 405);
  pub const DUPLICATE_NAME: DiagnosticCode = DiagnosticCode::new(Consistency, 406);
  pub const ALTERNATE_OFFSET_CONFLICT: DiagnosticCode = DiagnosticCode::new(Consistency, 407);
  pub const MISSING_NAME: DiagnosticCode = DiagnosticCode::new(Consistency, 408);
  pub const FIELD_OVERLAP: DiagnosticCode = DiagnosticCode::new(Consistency, 409);
  pub const ENUM_WITHOUT_DEFAULT: DiagnosticCode = DiagnosticCode::new(Consistency, 410);
  pub const RESET_VALUE_TRUNCATED: DiagnosticCode = DiagnosticCode::new(Consistency, 411);
}

/// Keys of the substitution map handed to the message templates.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Arg {
  Name,
  Name2,
  Line,
  Line2,
  Path,
  Chain,
  Kind,
  Expected,
  Count,
  Value,
  #[serde(rename = "ADDR")]
  Address,
  Width,
}
impl fmt::Display for Arg {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let key = match self {
      Arg::Name => "NAME",
      Arg::Name2 => "NAME2",
      Arg::Line => "LINE",
      Arg::Line2 => "LINE2",
      Arg::Path => "PATH",
      Arg::Chain => "CHAIN",
      Arg::Kind => "KIND",
      Arg::Expected => "EXPECTED",
      Arg::Count => "COUNT",
      Arg::Value => "VALUE",
      Arg::Address => "ADDR",
      Arg::Width => "WIDTH",
    };
    write!(f, "{}", key)
  }
}

/// One recorded problem or observation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
  pub code: DiagnosticCode,
  pub severity: Severity,
  pub args: BTreeMap<Arg, String>,
}
impl Diagnostic {
  pub fn new(code: DiagnosticCode, severity: Severity) -> Self {
    Self {
      code,
      severity,
      args: BTreeMap::new(),
    }
  }

  pub fn error(code: DiagnosticCode) -> Self {
    Self::new(code, Severity::Error)
  }

  pub fn warning(code: DiagnosticCode) -> Self {
    Self::new(code, Severity::Warning)
  }

  pub fn info(code: DiagnosticCode) -> Self {
    Self::new(code, Severity::Info)
  }

  /// Adds a substitution value.
  pub fn with(mut self, arg: Arg, value: impl ToString) -> Self {
    self.args.insert(arg, value.to_string());
    self
  }

  /// Adds a line number when the element carries one.
  pub fn with_line(self, arg: Arg, line: Option<u32>) -> Self {
    match line {
      Some(l) => self.with(arg, l),
      None => self,
    }
  }

  pub fn arg(&self, arg: Arg) -> Option<&str> {
    self.args.get(&arg).map(|s| s.as_str())
  }
}

/// Ordered log of diagnostics accumulated across all passes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
  entries: Vec<Diagnostic>,
}
impl Diagnostics {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&mut self, diagnostic: Diagnostic) {
    debug!(
      code = %diagnostic.code,
      severity = %diagnostic.severity,
      args = ?diagnostic.args,
      "diagnostic recorded"
    );
    self.entries.push(diagnostic);
  }

  pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
    self.entries.iter()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// The highest severity recorded so far.
  pub fn max_severity(&self) -> Option<Severity> {
    self.entries.iter().map(|d| d.severity).max()
  }

  pub fn count(&self, code: DiagnosticCode) -> usize {
    self.entries.iter().filter(|d| d.code == code).count()
  }

  pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
    self.entries.iter().filter(move |d| d.code == code)
  }

  pub fn into_vec(self) -> Vec<Diagnostic> {
    self.entries
  }
}
