use svd_parser::{EnumeratedValue, EnumeratedValues, Field, FieldInfo};

use crate::{
  clean_whitespace_opt,
  dimension::Dimension,
  error::Result,
  node::{EnumContainerData, EnumData, FieldData, Node, NodeId, NodeKind, NodeStore},
  value::{EnumeratedValueUsageSpec, ModifiedWriteValuesSpec, WriteConstraintSpec},
  AccessSpec,
};

/// Adds a field and its enumerated value containers under `register`. A field array becomes a
/// single dimensioned node whose increment counts bits.
pub(crate) fn lower_field(store: &mut NodeStore, register: NodeId, f: &Field) -> Result<NodeId> {
  let (fi, dimension) = match f {
    Field::Single(ref fi) => (fi, None),
    Field::Array(ref fi, ref d) => (
      fi,
      Some(Dimension::from_array(d.dim, d.dim_increment, &d.dim_index)),
    ),
  };

  let mut node = from_field_info(fi)?;
  node.dimension = dimension;
  let id = store.attach(register, node);

  for evs in fi.enumerated_values.iter() {
    lower_enumerated_values(store, id, evs)?;
  }

  Ok(id)
}

fn from_field_info(fi: &FieldInfo) -> Result<Node> {
  let mut node = Node::new(
    NodeKind::Field(FieldData {
      write_constraint: fi.write_constraint.as_ref().map(WriteConstraintSpec::new),
    }),
    &fi.name,
  )
  .with_offset(u64::from(fi.bit_range.offset))
  .with_size(fi.bit_range.width);
  node.derived_from = fi.derived_from.clone();
  node.description = clean_whitespace_opt(fi.description.clone())?;
  node.declared.access = fi.access.as_ref().map(AccessSpec::new);
  node.declared.modified_write_values = fi
    .modified_write_values
    .as_ref()
    .map(ModifiedWriteValuesSpec::new);
  Ok(node)
}

/// Unnamed containers get an empty name; they can still be derived from, but not referenced.
fn lower_enumerated_values(
  store: &mut NodeStore,
  field: NodeId,
  evs: &EnumeratedValues,
) -> Result<NodeId> {
  let mut container = Node::new(
    NodeKind::EnumContainer(EnumContainerData {
      usage: evs.usage.as_ref().map(EnumeratedValueUsageSpec::new),
      default_value: None,
    }),
    evs.name.as_deref().unwrap_or(""),
  );
  container.derived_from = evs.derived_from.clone();
  let id = store.attach(field, container);

  for ev in evs.values.iter() {
    store.attach(id, enumerated_value(ev)?);
  }

  Ok(id)
}

fn enumerated_value(ev: &EnumeratedValue) -> Result<Node> {
  let mut node = Node::new(
    NodeKind::Enum(EnumData {
      value: ev.value.map(u64::from),
      is_default: ev.is_default.unwrap_or(false),
    }),
    &ev.name,
  );
  node.description = clean_whitespace_opt(ev.description.clone())?;
  Ok(node)
}
