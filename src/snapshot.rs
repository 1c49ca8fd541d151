//! Bipartition snapshots of phylogenetic trees.
//!
//! # Overview
//! A TreeSnapshot captures every split (bipartition) of a tree together with the
//! length of the edge inducing it, encoded against a shared
//! [`TaxonNamespace`]. Snapshots are immutable and are the only view of a tree
//! the expectation and convergence engines ever see.
//!
//! # What is a bipartition?
//! Each branch in a tree divides the leaves into two groups:
//! ```text
//!      root
//!     /    \
//!   {A,B}  {C,D}  ← this branch creates the split {A,B} | {C,D}
//! ```
//!
//! # Unrooted view
//! Comparisons treat trees as unrooted, so the two edges hanging off a
//! bifurcating root induce the same split; their lengths are summed.

use crate::bitset::Bitset;
use crate::error::{Error, Result};
use crate::io::{clean_newick, rename_leaf_nodes};
use crate::taxa::TaxonNamespace;
use phylotree::tree::Tree as PhyloTree;
use std::collections::{HashMap, HashSet};

/// An immutable snapshot of all splits in a phylogenetic tree.
///
/// # Fields
/// - `parts`: non-trivial splits (both sides hold at least two taxa), canonicalized
/// - `lengths`: edge length for every split, trivial (pendant) ones included
/// - `leaf_mask`: the taxa present in this tree
/// - `num_leaves`: number of taxa in this tree
///
/// # Canonicalization
/// Each split {A,B}|{C,D} can be stored as either side. We always store the side
/// that does NOT contain the lowest-index taxon of the tree, so identical splits
/// have identical bitsets regardless of rooting or child order.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    pub parts: HashSet<Bitset>,
    pub lengths: HashMap<Bitset, f64>,
    pub leaf_mask: Bitset,
    pub num_leaves: usize,
}

impl TreeSnapshot {
    /// Extract a snapshot from a parsed tree.
    ///
    /// # Algorithm
    /// 1. DFS from the root, building leaf bitsets bottom-up (leaf index from `ns`)
    /// 2. For every non-root node, canonicalize the bitset below it
    /// 3. Accumulate the parent edge length per canonical split
    /// 4. Keep non-trivial splits in `parts`
    ///
    /// # Errors
    /// [`Error::TaxonMismatch`] for unnamed leaves, duplicated leaves or labels
    /// outside `ns`; [`Error::Tree`] for a malformed node graph.
    pub fn from_tree(tree: &PhyloTree, ns: &TaxonNamespace) -> Result<Self> {
        let root_id = tree.get_root()?;
        let words = ns.words();

        let mut cache: HashMap<usize, Bitset> = HashMap::new();
        let leaf_mask = Self::compute_bitsets(root_id, tree, ns, words, &mut cache)?;
        let num_leaves = leaf_mask.count_ones();
        let leaf_count = tree.get_leaves().len();
        if num_leaves != leaf_count {
            return Err(Error::TaxonMismatch(format!(
                "tree has {leaf_count} leaves but only {num_leaves} distinct taxa"
            )));
        }

        let (parts, lengths) = Self::collect_splits(tree, root_id, &cache, &leaf_mask)?;

        Ok(TreeSnapshot {
            parts,
            lengths,
            leaf_mask,
            num_leaves,
        })
    }

    /// Parse a Newick string and encode it in one step.
    pub fn from_newick(newick: &str, ns: &TaxonNamespace) -> Result<Self> {
        Self::from_newick_translated(newick, ns, None)
    }

    /// Like [`TreeSnapshot::from_newick`], renaming leaves through a NEXUS
    /// TRANSLATE table first.
    pub fn from_newick_translated(
        newick: &str,
        ns: &TaxonNamespace,
        translate: Option<&HashMap<String, String>>,
    ) -> Result<Self> {
        let mut tree =
            parse_newick(newick).map_err(|reason| Error::malformed("newick", 0, reason))?;
        if let Some(table) = translate {
            rename_leaf_nodes(&mut tree, table);
        }
        Self::from_tree(&tree, ns)
    }

    /// Recursively compute bitsets for all nodes via DFS.
    fn compute_bitsets(
        node_id: usize,
        tree: &PhyloTree,
        ns: &TaxonNamespace,
        words: usize,
        cache: &mut HashMap<usize, Bitset>,
    ) -> Result<Bitset> {
        let node = tree.get(&node_id)?;

        let mut bitset = Bitset::zeros(words);
        if node.children.is_empty() {
            let name = node
                .name
                .as_deref()
                .ok_or_else(|| Error::TaxonMismatch("tree has an unnamed leaf".to_string()))?;
            bitset.set(ns.index_of(name)?);
        } else {
            for &child_id in &node.children {
                let child_bitset = Self::compute_bitsets(child_id, tree, ns, words, cache)?;
                bitset.or_assign(&child_bitset);
            }
        }

        cache.insert(node_id, bitset.clone());
        Ok(bitset)
    }

    /// Canonicalize every non-root node's bitset and attach its parent edge.
    ///
    /// Nodes are visited in id order so that merged lengths are summed in a
    /// fixed order. Missing branch lengths count as 0.0.
    fn collect_splits(
        tree: &PhyloTree,
        root_id: usize,
        cache: &HashMap<usize, Bitset>,
        leaf_mask: &Bitset,
    ) -> Result<(HashSet<Bitset>, HashMap<Bitset, f64>)> {
        let num_leaves = leaf_mask.count_ones();
        let anchor = leaf_mask.first_one();

        let mut node_ids: Vec<usize> = cache.keys().copied().filter(|&id| id != root_id).collect();
        node_ids.sort_unstable();

        let mut parts = HashSet::new();
        let mut lengths: HashMap<Bitset, f64> = HashMap::new();
        for node_id in node_ids {
            let bitset = &cache[&node_id];
            let canonical = match anchor {
                Some(a) if bitset.contains(a) => bitset.complement_within(leaf_mask),
                _ => bitset.clone(),
            };
            // A child spanning every taxon (unary root) induces no split.
            if canonical.is_empty() {
                continue;
            }

            let length = tree.get(&node_id)?.parent_edge.unwrap_or(0.0);
            *lengths.entry(canonical.clone()).or_insert(0.0) += length;

            let side = canonical.count_ones();
            if side >= 2 && num_leaves - side >= 2 {
                parts.insert(canonical);
            }
        }

        Ok((parts, lengths))
    }

    /// Sum of all edge lengths.
    pub fn tree_length(&self) -> f64 {
        self.lengths.values().sum()
    }

    /// True when both trees cover exactly the same taxa.
    pub fn same_taxa(&self, other: &TreeSnapshot) -> bool {
        self.leaf_mask == other.leaf_mask
    }
}

/// Parse a Newick string with `phylotree` after stripping comments/annotations
/// and insignificant whitespace.
pub fn parse_newick(text: &str) -> std::result::Result<PhyloTree, String> {
    let cleaned = clean_newick(text);
    if !cleaned.starts_with('(') {
        return Err(format!("not a Newick tree: '{}'", text.trim()));
    }
    if !cleaned.ends_with(';') {
        return Err("missing closing ';'".to_string());
    }
    PhyloTree::from_newick(&cleaned).map_err(|e| e.to_string())
}

/// Encode many Newick strings against one namespace, preserving order.
///
/// With the `parallel` feature the parse/encode step fans out over rayon;
/// results are collected in input order either way.
pub fn encode_all(
    newicks: &[&str],
    ns: &TaxonNamespace,
    translate: Option<&HashMap<String, String>>,
) -> Vec<Result<TreeSnapshot>> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        newicks
            .par_iter()
            .map(|n| TreeSnapshot::from_newick_translated(n, ns, translate))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        newicks
            .iter()
            .map(|n| TreeSnapshot::from_newick_translated(n, ns, translate))
            .collect()
    }
}
