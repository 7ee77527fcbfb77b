use crate::{
  clean_whitespace_opt,
  dimension::Dimension,
  error::Result,
  node::{Node, NodeId, NodeStore},
  register::{lower_register, with_register_properties},
};
use svd_parser::{Cluster, ClusterInfo, RegisterCluster};

/// Lowers the registers and clusters of a peripheral or cluster, keeping declaration order.
pub(crate) fn lower_children(
  store: &mut NodeStore,
  parent: NodeId,
  children: &[RegisterCluster],
) -> Result<()> {
  for child in children.iter() {
    match child {
      RegisterCluster::Register(ref r) => {
        lower_register(store, parent, r)?;
      }
      RegisterCluster::Cluster(ref c) => {
        lower_cluster(store, parent, c)?;
      }
    }
  }
  Ok(())
}

/// Adds a cluster and its nested registers and clusters under `parent`. A cluster array
/// becomes a single dimensioned node.
pub(crate) fn lower_cluster(
  store: &mut NodeStore,
  parent: NodeId,
  c: &Cluster,
) -> Result<NodeId> {
  let (ci, dimension) = match c {
    Cluster::Single(ref ci) => (ci, None),
    Cluster::Array(ref ci, ref d) => (
      ci,
      Some(Dimension::from_array(d.dim, d.dim_increment, &d.dim_index)),
    ),
  };

  let mut node = from_cluster_info(ci)?;
  node.dimension = dimension;
  let id = store.attach(parent, node);
  lower_children(store, id, &ci.children)?;
  Ok(id)
}

fn from_cluster_info(ci: &ClusterInfo) -> Result<Node> {
  let mut node = Node::cluster(&ci.name, u64::from(ci.address_offset));
  node.derived_from = ci.derived_from.clone();
  node.description = clean_whitespace_opt(ci.description.clone())?;
  Ok(with_register_properties(
    node,
    ci.default_register_properties.size,
    ci.default_register_properties.reset_value,
    ci.default_register_properties.reset_mask,
    &ci.default_register_properties.access,
  ))
}
