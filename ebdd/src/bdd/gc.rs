//! Mark-and-sweep garbage collection.
//!
//! Collection runs only between top-level solver operations, never inside a recursive apply, so
//! cached results cannot reference freed nodes mid-computation. The driver passes the roots it
//! wants protected (active terms and stored registers); everything else goes, together with the
//! cache entries that mention it. Clause ids of dropped ITE axioms and dropped cached
//! justifications are returned so the driver can emit proof deletions.

use rustc_hash::FxHashSet;

use super::{Cached, Manager, NodeRef};

use crate::resolver::TAUTOLOGY;

impl Manager {
    /// Run a collection when enough variables were quantified away since the last one.
    pub fn check_gc(&mut self, roots: &[NodeRef]) -> Vec<i64> {
        let new_quants = self.quantified_levels.len() - self.last_gc;
        if new_quants > self.gc_threshold {
            self.collect_garbage(roots)
        } else {
            vec![]
        }
    }

    /// Collect all nodes unreachable from `roots` and return the proof clauses to delete.
    pub fn collect_garbage(&mut self, roots: &[NodeRef]) -> Vec<i64> {
        let marked = self.mark(roots);
        let mut clauses = self.clean_cache(&marked);
        clauses.extend(self.clean_nodes(&marked));
        self.last_gc = self.quantified_levels.len();
        self.gc_count += 1;
        clauses
    }

    /// Node ids reachable from the given roots; leaves are never collected and stay unmarked.
    fn mark(&self, roots: &[NodeRef]) -> FxHashSet<i64> {
        let mut marked = FxHashSet::default();
        let mut frontier: Vec<NodeRef> = roots
            .iter()
            .copied()
            .filter(|&root| !self.is_leaf(root))
            .collect();
        while let Some(node) = frontier.pop() {
            if !marked.insert(self.id(node)) {
                continue;
            }
            let high = self.high(node);
            let low = self.low(node);
            if !self.is_leaf(high) {
                frontier.push(high);
            }
            if !self.is_leaf(low) {
                frontier.push(low);
            }
        }
        marked
    }

    /// Drop cache entries whose result or operands died; collect their justification clauses.
    fn clean_cache(&mut self, marked: &FxHashSet<i64>) -> Vec<i64> {
        let mut deleted = vec![];
        let mut removed = 0u64;
        let slots = &self.slots;
        self.cache.retain(|key, entry| {
            let mut keep = match entry.result {
                Cached::Node(node) => marked.contains(&slots[node.0 as usize].id),
                // Implication checks produce no node to mark, so they never survive.
                Cached::Check(_) => false,
            };
            if keep {
                let (_, operand_a, operand_b) = *key;
                for &operand in [operand_a, operand_b].iter() {
                    if operand != 0 && !marked.contains(&operand) {
                        keep = false;
                    }
                }
            }
            if !keep {
                deleted.extend(entry.clauses.iter().copied());
                removed += 1;
            }
            keep
        });
        self.cache_removed += removed;
        deleted
    }

    /// Drop unmarked nodes from the unique table; collect their ITE axiom clauses.
    fn clean_nodes(&mut self, marked: &FxHashSet<i64>) -> Vec<i64> {
        let mut deleted = vec![];
        let mut freed = vec![];
        let slots = &self.slots;
        self.unique.retain(|_, node| {
            let data = &slots[node.0 as usize];
            if marked.contains(&data.id) {
                return true;
            }
            for &axiom in [
                data.infer_true_up,
                data.infer_false_up,
                data.infer_true_down,
                data.infer_false_down,
            ]
            .iter()
            {
                if axiom != TAUTOLOGY {
                    deleted.push(axiom);
                }
            }
            freed.push(node.0);
            false
        });
        self.nodes_removed += freed.len() as u64;
        for slot in freed {
            self.slots[slot as usize].id = 0;
            self.free_slots.push(slot);
        }
        deleted
    }
}
