//! The taxon namespace every tree of one comparison run is encoded against.
//!
//! Bipartitions are only comparable when identical taxa map to identical bit
//! positions, so the label → index mapping is built once per run and handed
//! explicitly to every loader and engine call. It is never extended afterwards:
//! a label outside the namespace is a [`Error::TaxonMismatch`].

use crate::bitset::Bitset;
use crate::error::{Error, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct TaxonNamespace {
    labels: Vec<String>,
    index: HashMap<String, usize>,
}

impl TaxonNamespace {
    /// Builds a namespace from labels, sorted alphabetically so that the same
    /// taxon set always yields the same bit layout.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut labels: Vec<String> = labels
            .into_iter()
            .map(|l| normalize_label(l.as_ref()).to_string())
            .collect();
        labels.sort();
        if let Some(dup) = labels.windows(2).find(|w| w[0] == w[1]) {
            return Err(Error::TaxonMismatch(format!(
                "duplicate taxon label '{}'",
                dup[0]
            )));
        }
        let index = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.clone(), i))
            .collect();
        Ok(TaxonNamespace { labels, index })
    }

    /// Builds a namespace from the leaf labels of a parsed tree.
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let names = tree
            .get_leaves()
            .iter()
            .map(|id| {
                tree.get(id)
                    .ok()
                    .and_then(|node| node.name.clone())
                    .ok_or_else(|| Error::TaxonMismatch("tree has an unnamed leaf".to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_labels(names)
    }

    pub fn index_of(&self, label: &str) -> Result<usize> {
        let label = normalize_label(label);
        self.index.get(label).copied().ok_or_else(|| {
            Error::TaxonMismatch(format!("taxon '{label}' is not in the shared namespace"))
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of u64 words a bitset over this namespace needs.
    pub fn words(&self) -> usize {
        self.labels.len().div_ceil(64).max(1)
    }

    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels.get(idx).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Space-separated labels of the taxa on one side of a split.
    pub fn describe(&self, side: &Bitset) -> String {
        side.ones()
            .filter_map(|i| self.label(i))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Strips surrounding whitespace and NEXUS/Newick quoting from a label.
pub fn normalize_label(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
        .unwrap_or(trimmed)
}
