//! Observability walks over the node DAG.
//!
//! Nothing here affects the proof beyond the literal nodes `get_support` may need to create; these
//! operations serve the schedule's `i` command and the SAT model report.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{BddError, Manager, NodeRef, LEAF_LEVEL};

use crate::proof::Prover;

impl Manager {
    /// Number of nodes in the DAG rooted at `node`, leaves included.
    pub fn get_size(&self, node: NodeRef) -> usize {
        let mut visited = FxHashSet::default();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if !visited.insert(self.id(node)) || self.is_leaf(node) {
                continue;
            }
            stack.push(self.high(node));
            stack.push(self.low(node));
        }
        visited.len()
    }

    /// Levels of the variables the function rooted at `node` depends on, ascending.
    pub fn support_levels(&self, node: NodeRef) -> Vec<u32> {
        let mut visited = FxHashSet::default();
        let mut levels = FxHashSet::default();
        let mut stack = vec![node];
        while let Some(node) = stack.pop() {
            if !visited.insert(self.id(node)) || self.is_leaf(node) {
                continue;
            }
            levels.insert(self.level(node));
            stack.push(self.high(node));
            stack.push(self.low(node));
        }
        let mut levels: Vec<u32> = levels.into_iter().collect();
        levels.sort_unstable();
        levels
    }

    /// The support of `node` as a chain of positive literals.
    pub fn get_support(
        &mut self,
        node: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        let levels = self.support_levels(node);
        let mut literals = Vec::with_capacity(levels.len());
        for level in levels {
            literals.push(self.literal(level, true, prover)?);
        }
        self.build_clause(&literals, prover)
    }

    /// Number of satisfying assignments over the support set of `root`.
    pub fn satisfy_count(
        &mut self,
        root: NodeRef,
        prover: &mut Prover,
    ) -> Result<u128, BddError> {
        let support = self.get_support(root, prover)?;
        let mut memo = FxHashMap::default();
        self.count_step(root, support, &mut memo)
    }

    fn count_step(
        &self,
        root: NodeRef,
        support: NodeRef,
        memo: &mut FxHashMap<(i64, i64), u128>,
    ) -> Result<u128, BddError> {
        if root == self.leaf1() && support == self.leaf0() {
            return Ok(1);
        }
        if let Some(&count) = memo.get(&(self.id(root), self.id(support))) {
            return Ok(count);
        }
        if root == self.leaf0() {
            memo.insert((self.id(root), self.id(support)), 0);
            return Ok(0);
        }
        if support == self.leaf0() {
            return Err(BddError::MissingSupport {
                node: self.id(root),
            });
        }
        let support_level = self.level(support);
        let root_level = self.level(root);
        let next_support = self.low(support);
        let count = if support_level < root_level {
            self.count_step(root, next_support, memo)?.saturating_mul(2)
        } else if support_level == root_level {
            let high = self.count_step(self.high(root), next_support, memo)?;
            let low = self.count_step(self.low(root), next_support, memo)?;
            high.saturating_add(low)
        } else {
            return Err(BddError::MissingSupport {
                node: self.id(root),
            });
        };
        memo.insert((self.id(root), self.id(support)), count);
        Ok(count)
    }

    /// Up to `limit` satisfying assignments as strings over the level order.
    ///
    /// Position `k` describes the variable at level `k + 1`: `1` set, `0` unset, `-` free.
    pub fn satisfy_strings(&self, node: NodeRef, limit: usize) -> Vec<String> {
        let mut out = vec![];
        let mut assignment = vec![];
        self.satisfy_rec(node, &mut assignment, limit, &mut out);
        out
    }

    fn satisfy_rec(
        &self,
        node: NodeRef,
        assignment: &mut Vec<(u32, bool)>,
        limit: usize,
        out: &mut Vec<String>,
    ) {
        if out.len() >= limit || node == self.leaf0() {
            return;
        }
        if node == self.leaf1() {
            let mut chars = vec!['-'; self.variables.len()];
            for &(level, value) in assignment.iter() {
                debug_assert_ne!(level, LEAF_LEVEL);
                chars[(level - 1) as usize] = if value { '1' } else { '0' };
            }
            out.push(chars.into_iter().collect());
            return;
        }
        let level = self.level(node);
        assignment.push((level, true));
        self.satisfy_rec(self.high(node), assignment, limit, out);
        assignment.pop();
        assignment.push((level, false));
        self.satisfy_rec(self.low(node), assignment, limit, out);
        assignment.pop();
    }
}
