//! The BDD manager.
//!
//! The manager owns every node of the shared BDD. Nodes live in a slot arena and are referred to
//! by [`NodeRef`] indices; canonicity is enforced by a unique table keyed on `(level, high id,
//! low id)`. Each internal node doubles as an extension variable of the emitted proof: creating a
//! node writes the four clauses of its defining If-Then-Else relation, and every later operation
//! on the node is justified in terms of those clauses.
//!
//! Apply-style operations and quantification live in the `apply` submodule, garbage collection
//! in `gc`, and observability walks (sizes, support, model counting) in `info`.

mod apply;
mod gc;
mod info;

use std::io::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::proof::{ProofError, Prover};
use crate::resolver::{OperationResolver, ResolutionError, TAUTOLOGY};

/// Level of the two leaves.
///
/// Leaves sort after every real variable, so `min` over levels always picks the real branching
/// variable.
pub const LEAF_LEVEL: u32 = u32::max_value();

/// Reference to a node in the manager's arena.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct NodeRef(u32);

const LEAF_0: NodeRef = NodeRef(0);
const LEAF_1: NodeRef = NodeRef(1);

/// A variable of the BDD ordering.
///
/// The `level` gives the position in the ordering while `id` is the number the variable carries in
/// emitted proof clauses. The two are decoupled so a permutation file can place input variables at
/// arbitrary levels without renaming the CNF.
#[derive(Debug)]
pub struct BddVar {
    pub level: u32,
    pub id: i64,
    pub name: String,
}

struct NodeData {
    /// Extension variable of this node in the emitted proof; 0 marks a freed slot.
    id: i64,
    level: u32,
    high: NodeRef,
    low: NodeRef,
    infer_true_up: i64,
    infer_false_up: i64,
    infer_true_down: i64,
    infer_false_down: i64,
}

/// Operation cache key tags.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
enum Op {
    Not,
    And,
    AndNj,
    Or,
    Xor,
    EQuant,
    Imply,
}

type CacheKey = (Op, i64, i64);

#[derive(Copy, Clone)]
enum Cached {
    Node(NodeRef),
    Check(bool),
}

struct CacheEntry {
    result: Cached,
    justification: i64,
    /// Clauses created for the justification, deleted from the proof when the entry dies.
    clauses: Vec<i64>,
}

/// Possible errors while operating on the BDD.
///
/// Apart from proof IO failures these all indicate bugs in the engine or its caller and are fatal.
#[derive(Debug, Error)]
pub enum BddError {
    #[error("node N{node} at level {node_level} cannot branch on a variable at level {var_level}")]
    BadBranch {
        node: i64,
        node_level: u32,
        var_level: u32,
    },
    #[error("implication check failed: {from} does not imply {to}")]
    ImplicationFailed { from: String, to: String },
    #[error("ran out of support variables below node N{node}")]
    MissingSupport { node: i64 },
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

pub struct Manager {
    slots: Vec<NodeData>,
    free_slots: Vec<u32>,
    unique: FxHashMap<(u32, i64, i64), NodeRef>,
    cache: FxHashMap<CacheKey, CacheEntry>,
    variables: Vec<BddVar>,
    next_node_id: i64,
    verbosity: u32,
    and_resolver: OperationResolver,
    imply_resolver: OperationResolver,
    /// Levels existentially quantified so far; its growth drives GC.
    quantified_levels: FxHashSet<u32>,
    last_gc: usize,
    gc_threshold: usize,
    // Statistics
    apply_count: u64,
    node_count: u64,
    max_live: usize,
    cache_justify_added: u64,
    cache_no_justify_added: u64,
    cache_removed: u64,
    nodes_removed: u64,
    gc_count: u64,
}

impl Manager {
    /// Create a manager whose first internal node gets proof id `next_node_id`.
    ///
    /// The driver passes the input variable count plus one, so node ids and input variable ids
    /// share one number space without colliding.
    pub fn new(next_node_id: i64, verbosity: u32) -> Manager {
        let leaf = |value: bool| NodeData {
            id: if value { TAUTOLOGY } else { -TAUTOLOGY },
            level: LEAF_LEVEL,
            high: if value { LEAF_1 } else { LEAF_0 },
            low: if value { LEAF_1 } else { LEAF_0 },
            infer_true_up: TAUTOLOGY,
            infer_false_up: TAUTOLOGY,
            infer_true_down: TAUTOLOGY,
            infer_false_down: TAUTOLOGY,
        };
        Manager {
            slots: vec![leaf(false), leaf(true)],
            free_slots: vec![],
            unique: FxHashMap::default(),
            cache: FxHashMap::default(),
            variables: vec![],
            next_node_id,
            verbosity,
            and_resolver: OperationResolver::conjunction(),
            imply_resolver: OperationResolver::implication(),
            quantified_levels: FxHashSet::default(),
            last_gc: 0,
            gc_threshold: 10,
            apply_count: 0,
            node_count: 0,
            max_live: 0,
            cache_justify_added: 0,
            cache_no_justify_added: 0,
            cache_removed: 0,
            nodes_removed: 0,
            gc_count: 0,
        }
    }

    pub fn leaf0(&self) -> NodeRef {
        LEAF_0
    }

    pub fn leaf1(&self) -> NodeRef {
        LEAF_1
    }

    /// Append a new variable at the next level of the ordering and return its level.
    pub fn new_variable(&mut self, name: &str, id: i64) -> u32 {
        let level = self.variables.len() as u32 + 1;
        self.variables.push(BddVar {
            level,
            id,
            name: name.to_string(),
        });
        level
    }

    pub fn var_count(&self) -> usize {
        self.variables.len()
    }

    /// Proof id of the variable at `level`.
    pub fn variable_id(&self, level: u32) -> i64 {
        self.variables[(level - 1) as usize].id
    }

    fn node(&self, node: NodeRef) -> &NodeData {
        let data = &self.slots[node.0 as usize];
        debug_assert_ne!(data.id, 0, "access to a collected node slot");
        data
    }

    /// Proof id of a node; node ids double as extension variables in emitted clauses.
    pub fn id(&self, node: NodeRef) -> i64 {
        self.node(node).id
    }

    pub fn level(&self, node: NodeRef) -> u32 {
        self.node(node).level
    }

    pub fn high(&self, node: NodeRef) -> NodeRef {
        self.node(node).high
    }

    pub fn low(&self, node: NodeRef) -> NodeRef {
        self.node(node).low
    }

    pub fn is_leaf(&self, node: NodeRef) -> bool {
        node.0 < 2
    }

    pub fn label(&self, node: NodeRef) -> String {
        if node == LEAF_0 {
            "C0".to_string()
        } else if node == LEAF_1 {
            "C1".to_string()
        } else {
            format!("N{}", self.id(node))
        }
    }

    /// The `var = 1` cofactor with respect to the variable at `level`.
    fn branch_high(&self, node: NodeRef, level: u32) -> Result<NodeRef, BddError> {
        let data = self.node(node);
        if data.level < level {
            return Err(BddError::BadBranch {
                node: data.id,
                node_level: data.level,
                var_level: level,
            });
        }
        Ok(if data.level == level { data.high } else { node })
    }

    /// The `var = 0` cofactor with respect to the variable at `level`.
    fn branch_low(&self, node: NodeRef, level: u32) -> Result<NodeRef, BddError> {
        let data = self.node(node);
        if data.level < level {
            return Err(BddError::BadBranch {
                node: data.id,
                node_level: data.level,
                var_level: level,
            });
        }
        Ok(if data.level == level { data.low } else { node })
    }

    /// Look up or create the node `(level ? high : low)`.
    ///
    /// Callers collapse `high == low` themselves; a fresh node immediately gets its four ITE
    /// axioms written to the proof. In the LRAT formats the two "down" clauses carry the negated
    /// ids of the "up" clauses as resolution-asymmetric-tautology hints.
    pub fn find_or_make(
        &mut self,
        level: u32,
        high: NodeRef,
        low: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        debug_assert_ne!(high, low);
        debug_assert!(level < self.level(high) && level < self.level(low));

        let key = (level, self.id(high), self.id(low));
        if let Some(&found) = self.unique.get(&key) {
            return Ok(found);
        }

        let id = self.next_node_id;
        self.next_node_id += 1;
        let var_id = self.variable_id(level);
        let high_id = self.id(high);
        let low_id = self.id(low);

        if prover.comments_enabled() {
            prover.comment(&format!("ITE assertions for node N{}", id))?;
        }
        // The node id leads each clause: hint-less additions are checked as RAT on their first
        // literal, which here is the fresh extension variable.
        let infer_true_up = prover.add_clause(&[id, -var_id, -high_id], &[], false)?;
        let infer_false_up = prover.add_clause(&[id, var_id, -low_id], &[], false)?;
        let mut antecedents = vec![];
        if prover.format().is_lrat() {
            if infer_true_up != TAUTOLOGY {
                antecedents.push(-infer_true_up);
            }
            if infer_false_up != TAUTOLOGY {
                antecedents.push(-infer_false_up);
            }
        }
        let infer_true_down = prover.add_clause(&[-id, -var_id, high_id], &antecedents, false)?;
        let infer_false_down = prover.add_clause(&[-id, var_id, low_id], &antecedents, false)?;

        let data = NodeData {
            id,
            level,
            high,
            low,
            infer_true_up,
            infer_false_up,
            infer_true_down,
            infer_false_down,
        };
        let node = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot as usize] = data;
                NodeRef(slot)
            }
            None => {
                self.slots.push(data);
                NodeRef((self.slots.len() - 1) as u32)
            }
        };
        self.unique.insert(key, node);
        self.node_count += 1;
        self.max_live = self.max_live.max(self.unique.len());
        Ok(node)
    }

    /// The BDD of a single literal over the variable at `level`.
    pub fn literal(
        &mut self,
        level: u32,
        phase: bool,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        if phase {
            self.find_or_make(level, LEAF_1, LEAF_0, prover)
        } else {
            self.find_or_make(level, LEAF_0, LEAF_1, prover)
        }
    }

    /// Build the disjunction of literal nodes as a chain ordered by level.
    pub fn build_clause(
        &mut self,
        literals: &[NodeRef],
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        let mut literals = literals.to_vec();
        literals.sort_by_key(|&lit| std::cmp::Reverse(self.level(lit)));
        let mut result = LEAF_0;
        for &lit in literals.iter() {
            result = self.apply_or(result, lit, prover)?;
        }
        Ok(result)
    }

    /// Build the BDD of an input clause and validate it against the input clause id.
    ///
    /// The validation clause is the unit clause asserting the chain's root, derived from the ITE
    /// "up" axioms of the chain nodes followed by the input clause itself; the axiom order matches
    /// the unit propagation a checker performs top-down along the chain.
    pub fn construct_clause(
        &mut self,
        input_clause_id: i64,
        literals: &[NodeRef],
        prover: &mut Prover,
    ) -> Result<(NodeRef, i64), BddError> {
        let root = self.build_clause(literals, prover)?;
        let mut antecedents = vec![];
        let mut chain = root;
        while !self.is_leaf(chain) {
            let data = self.node(chain);
            let positive = data.high == LEAF_1;
            if positive {
                antecedents.push(data.infer_true_up);
                if data.low != LEAF_0 {
                    antecedents.push(data.infer_false_up);
                }
                chain = data.low;
            } else {
                antecedents.push(data.infer_false_up);
                if data.high != LEAF_0 {
                    antecedents.push(data.infer_true_up);
                }
                chain = data.high;
            }
        }
        antecedents.push(input_clause_id);
        if prover.comments_enabled() {
            prover.comment(&format!(
                "Validate BDD representation of clause {}",
                input_clause_id
            ))?;
        }
        let validation = prover.add_clause(&[self.id(root)], &antecedents, false)?;
        Ok((root, validation))
    }

    /// Total number of internal nodes ever created.
    pub fn node_count(&self) -> u64 {
        self.node_count
    }

    /// Number of internal nodes currently in the unique table.
    pub fn live_count(&self) -> usize {
        self.unique.len()
    }

    pub fn gc_count(&self) -> u64 {
        self.gc_count
    }

    /// All internal nodes currently in the unique table.
    pub fn live_nodes(&self) -> Vec<NodeRef> {
        self.unique.values().copied().collect()
    }

    /// Report manager statistics.
    pub fn summarize(&self, target: &mut dyn Write) -> io::Result<()> {
        writeln!(target, "Input variables: {}", self.variables.len())?;
        writeln!(
            target,
            "Variables quantified out: {}",
            self.quantified_levels.len()
        )?;
        writeln!(target, "Total nodes: {}", self.node_count)?;
        writeln!(target, "Total nodes removed by gc: {}", self.nodes_removed)?;
        writeln!(target, "Maximum live nodes: {}", self.max_live)?;
        writeln!(target, "Total apply operations: {}", self.apply_count)?;
        writeln!(
            target,
            "Total cached results not requiring proofs: {}",
            self.cache_no_justify_added
        )?;
        writeln!(
            target,
            "Total cached results requiring proofs: {}",
            self.cache_justify_added
        )?;
        writeln!(
            target,
            "Total cache entries removed: {}",
            self.cache_removed
        )?;
        writeln!(target, "Total GCs performed: {}", self.gc_count)?;
        if self.verbosity >= 2 {
            writeln!(target, "Results from conjunction operations:")?;
            self.and_resolver.summarize(target)?;
            writeln!(target, "Results from implication testing:")?;
            self.imply_resolver.summarize(target)?;
        }
        Ok(())
    }
}
