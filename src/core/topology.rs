//! Region nodes, connectome and the label/index resolution used by every builder.
use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::CosimError;

/// A reference to an element of a labelled universe, either by position or by label.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum NodeRef {
    Index(usize),
    Label(String),
}

impl From<usize> for NodeRef {
    fn from(index: usize) -> Self {
        NodeRef::Index(index)
    }
}

impl From<&str> for NodeRef {
    fn from(label: &str) -> Self {
        NodeRef::Label(label.to_string())
    }
}

impl From<String> for NodeRef {
    fn from(label: String) -> Self {
        NodeRef::Label(label)
    }
}

/// A selection of elements of a labelled universe.
#[derive(Debug, PartialEq, Eq, Clone, Default, Serialize, Deserialize)]
pub enum NodeSelector {
    /// The whole universe.
    #[default]
    All,
    /// An explicit list of labels and/or indices.
    Only(Vec<NodeRef>),
}

impl From<Vec<NodeRef>> for NodeSelector {
    fn from(nodes: Vec<NodeRef>) -> Self {
        NodeSelector::Only(nodes)
    }
}

impl From<Vec<usize>> for NodeSelector {
    fn from(nodes: Vec<usize>) -> Self {
        NodeSelector::Only(nodes.into_iter().map(NodeRef::Index).collect())
    }
}

impl From<&[&str]> for NodeSelector {
    fn from(labels: &[&str]) -> Self {
        NodeSelector::Only(labels.iter().map(|&label| NodeRef::from(label)).collect())
    }
}

/// Returns the index of the element in the universe.
/// An unknown label is a configuration error, an out-of-range index a topology error.
pub fn index_of<S: AsRef<str>>(node: &NodeRef, universe: &[S]) -> Result<usize, CosimError> {
    match node {
        NodeRef::Index(index) => {
            if *index < universe.len() {
                Ok(*index)
            } else {
                Err(CosimError::Topology(format!(
                    "index {} out of range for {} elements",
                    index,
                    universe.len()
                )))
            }
        }
        NodeRef::Label(label) => universe
            .iter()
            .position(|candidate| candidate.as_ref() == label)
            .ok_or_else(|| CosimError::Configuration(format!("unresolved label '{}'", label))),
    }
}

/// Returns the sorted, deduplicated indices selected in the universe.
pub fn subset_indices<S: AsRef<str>>(
    selector: &NodeSelector,
    universe: &[S],
) -> Result<Vec<usize>, CosimError> {
    match selector {
        NodeSelector::All => Ok((0..universe.len()).collect()),
        NodeSelector::Only(nodes) => {
            let indices = nodes
                .iter()
                .map(|node| index_of(node, universe))
                .collect::<Result<Vec<usize>, CosimError>>()?;
            Ok(indices.into_iter().sorted().dedup().collect())
        }
    }
}

/// A region node shared by both simulators' coupling boundary.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct RegionNode {
    index: usize,
    label: String,
}

impl RegionNode {
    /// Returns the index of the region node in the connectome.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the label of the region node.
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// The Host's connectome: region labels with the weights and delays between every pair of regions.
/// Matrices are indexed as `[source, target]`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Connectivity {
    regions: Vec<RegionNode>,
    region_labels: Vec<String>,
    weights: DMatrix<f64>,
    delays: DMatrix<f64>,
}

impl Connectivity {
    /// Create a connectome with the specified labels, weights and delays.
    /// The function returns an error for duplicate labels, non-square matrices or negative delays.
    pub fn build(
        region_labels: Vec<String>,
        weights: Vec<Vec<f64>>,
        delays: Vec<Vec<f64>>,
    ) -> Result<Self, CosimError> {
        let n = region_labels.len();
        if region_labels.iter().duplicates().next().is_some() {
            return Err(CosimError::Configuration(
                "region labels must be unique".to_string(),
            ));
        }

        let to_matrix = |rows: Vec<Vec<f64>>, name: &str| -> Result<DMatrix<f64>, CosimError> {
            if rows.len() != n || rows.iter().any(|row| row.len() != n) {
                return Err(CosimError::Topology(format!(
                    "{} must be a {}x{} matrix",
                    name, n, n
                )));
            }
            Ok(DMatrix::from_row_iterator(n, n, rows.into_iter().flatten()))
        };
        let weights = to_matrix(weights, "weights")?;
        let delays = to_matrix(delays, "delays")?;

        if delays.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(CosimError::InvalidParameter(
                "connectome delays must be finite and non-negative".to_string(),
            ));
        }

        let regions = region_labels
            .iter()
            .enumerate()
            .map(|(index, label)| RegionNode {
                index,
                label: label.clone(),
            })
            .collect();

        Ok(Connectivity {
            regions,
            region_labels,
            weights,
            delays,
        })
    }

    /// Returns the number of region nodes.
    pub fn number_of_regions(&self) -> usize {
        self.regions.len()
    }

    /// Returns the region nodes.
    pub fn regions(&self) -> &[RegionNode] {
        &self.regions
    }

    /// Returns the region labels, in index order.
    pub fn region_labels(&self) -> &[String] {
        &self.region_labels
    }

    /// Returns the connectome weight from `source` to `target`.
    pub fn weight(&self, source: usize, target: usize) -> f64 {
        self.weights[(source, target)]
    }

    /// Returns the connectome delay from `source` to `target`.
    pub fn delay(&self, source: usize, target: usize) -> f64 {
        self.delays[(source, target)]
    }

    pub fn weights(&self) -> &DMatrix<f64> {
        &self.weights
    }

    pub fn delays(&self) -> &DMatrix<f64> {
        &self.delays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[test]
    fn test_index_of() {
        let universe = labels();
        assert_eq!(index_of(&NodeRef::from("b"), &universe), Ok(1));
        assert_eq!(index_of(&NodeRef::from(2), &universe), Ok(2));
        assert!(matches!(
            index_of(&NodeRef::from("z"), &universe),
            Err(CosimError::Configuration(_))
        ));
        assert!(matches!(
            index_of(&NodeRef::from(3), &universe),
            Err(CosimError::Topology(_))
        ));
    }

    #[test]
    fn test_subset_indices_sorted_unique() {
        let universe = labels();
        let selector = NodeSelector::from(vec![NodeRef::from("c"), NodeRef::from(0), NodeRef::from("c")]);
        assert_eq!(subset_indices(&selector, &universe), Ok(vec![0, 2]));
        assert_eq!(subset_indices(&NodeSelector::All, &universe), Ok(vec![0, 1, 2]));
        assert_eq!(
            subset_indices(&NodeSelector::Only(vec![]), &universe),
            Ok(vec![])
        );
    }

    #[test]
    fn test_connectivity_build() {
        let connectivity = Connectivity::build(
            vec!["a".to_string(), "b".to_string()],
            vec![vec![0.0, 0.3], vec![0.7, 0.0]],
            vec![vec![0.0, 1.0], vec![2.0, 0.0]],
        )
        .unwrap();
        assert_eq!(connectivity.number_of_regions(), 2);
        assert_eq!(connectivity.weight(0, 1), 0.3);
        assert_eq!(connectivity.weight(1, 0), 0.7);
        assert_eq!(connectivity.delay(1, 0), 2.0);
        assert_eq!(connectivity.regions()[1].label(), "b");
    }

    #[test]
    fn test_connectivity_invalid() {
        assert!(matches!(
            Connectivity::build(
                vec!["a".to_string(), "a".to_string()],
                vec![vec![0.0; 2]; 2],
                vec![vec![0.0; 2]; 2]
            ),
            Err(CosimError::Configuration(_))
        ));
        assert!(matches!(
            Connectivity::build(vec!["a".to_string()], vec![vec![0.0, 1.0]], vec![vec![0.0]]),
            Err(CosimError::Topology(_))
        ));
        assert!(matches!(
            Connectivity::build(vec!["a".to_string()], vec![vec![0.0]], vec![vec![-1.0]]),
            Err(CosimError::InvalidParameter(_))
        ));
    }
}
