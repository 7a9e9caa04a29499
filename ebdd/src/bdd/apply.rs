//! Apply-style operations over the shared BDD.
//!
//! All operators follow the classic Shannon cofactor recursion: handle the constant cases, split
//! on the smaller of the two top variables, recurse on both cofactor pairs, and hash-cons the
//! result. Conjunction and implication testing additionally assemble a rule index from the ITE
//! axioms of the operands, the recursive justifications and the axioms of the result node, and
//! hand it to the resolver to derive the clause asserting the operation.

use std::cmp::min;

use super::{BddError, Cached, CacheEntry, CacheKey, Manager, NodeRef, Op};

use crate::proof::Prover;
use crate::resolver::{clean_clause, Reduced, RuleIndex, TAUTOLOGY};

impl Manager {
    /// Conjunction along with the id of a clause justifying `(!A | !B | result)`.
    ///
    /// The justification is the tautology sentinel when the result is one of the arguments.
    pub fn apply_and_justify(
        &mut self,
        node_a: NodeRef,
        node_b: NodeRef,
        prover: &mut Prover,
    ) -> Result<(NodeRef, i64), BddError> {
        self.apply_count += 1;
        // Constant cases return one of the arguments and need no justification.
        if node_a == self.leaf0() || node_b == self.leaf0() {
            return Ok((self.leaf0(), TAUTOLOGY));
        }
        if node_a == self.leaf1() {
            return Ok((node_b, TAUTOLOGY));
        }
        if node_b == self.leaf1() {
            return Ok((node_a, TAUTOLOGY));
        }
        if node_a == node_b {
            return Ok((node_a, TAUTOLOGY));
        }

        let (node_a, node_b) = if self.id(node_a) > self.id(node_b) {
            (node_b, node_a)
        } else {
            (node_a, node_b)
        };
        let key = (Op::And, self.id(node_a), self.id(node_b));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok((node, entry.justification));
            }
        }

        let mut rules = RuleIndex::default();
        let split = min(self.level(node_a), self.level(node_b));
        let high_a = self.branch_high(node_a, split)?;
        let low_a = self.branch_low(node_a, split)?;
        let high_b = self.branch_high(node_b, split)?;
        let low_b = self.branch_low(node_b, split)?;

        if high_a != low_a {
            rules.insert("UHD", self.node(node_a).infer_true_down);
            rules.insert("ULD", self.node(node_a).infer_false_down);
        }
        if high_b != low_b {
            rules.insert("VHD", self.node(node_b).infer_true_down);
            rules.insert("VLD", self.node(node_b).infer_false_down);
        }

        let (new_high, and_high) = self.apply_and_justify(high_a, high_b, prover)?;
        rules.insert("ANDH", and_high);
        let (new_low, and_low) = self.apply_and_justify(low_a, low_b, prover)?;
        rules.insert("ANDL", and_low);

        let new_node = if new_high == new_low {
            new_high
        } else {
            let node = self.find_or_make(split, new_high, new_low, prover)?;
            rules.insert("WHU", self.node(node).infer_true_up);
            rules.insert("WLU", self.node(node).infer_false_up);
            node
        };

        let target = [-self.id(node_a), -self.id(node_b), self.id(new_node)];
        let (justification, clauses) = match clean_clause(&target) {
            Reduced::Tautology => (TAUTOLOGY, vec![]),
            Reduced::Clause(target) => {
                let comment = if prover.comments_enabled() {
                    Some(format!(
                        "Justification that {} & {} ==> {}",
                        self.label(node_a),
                        self.label(node_b),
                        self.label(new_node)
                    ))
                } else {
                    None
                };
                self.and_resolver
                    .run(&target, &rules, prover, comment.as_deref())?
            }
        };
        self.cache.insert(
            key,
            CacheEntry {
                result: Cached::Node(new_node),
                justification,
                clauses,
            },
        );
        self.cache_justify_added += 1;
        Ok((new_node, justification))
    }

    /// Conjunction without justification generation.
    pub fn apply_and(
        &mut self,
        node_a: NodeRef,
        node_b: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        self.apply_count += 1;
        if node_a == self.leaf0() || node_b == self.leaf0() {
            return Ok(self.leaf0());
        }
        if node_a == self.leaf1() {
            return Ok(node_b);
        }
        if node_b == self.leaf1() {
            return Ok(node_a);
        }
        if node_a == node_b {
            return Ok(node_a);
        }

        let (node_a, node_b) = if self.id(node_a) > self.id(node_b) {
            (node_b, node_a)
        } else {
            (node_a, node_b)
        };
        let key = (Op::AndNj, self.id(node_a), self.id(node_b));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok(node);
            }
        }

        let split = min(self.level(node_a), self.level(node_b));
        let new_high = {
            let high_a = self.branch_high(node_a, split)?;
            let high_b = self.branch_high(node_b, split)?;
            self.apply_and(high_a, high_b, prover)?
        };
        let new_low = {
            let low_a = self.branch_low(node_a, split)?;
            let low_b = self.branch_low(node_b, split)?;
            self.apply_and(low_a, low_b, prover)?
        };

        let new_node = if new_high == new_low {
            new_high
        } else {
            self.find_or_make(split, new_high, new_low, prover)?
        };
        self.insert_plain(key, new_node);
        Ok(new_node)
    }

    /// Negation.
    pub fn apply_not(
        &mut self,
        node: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        if node == self.leaf1() {
            return Ok(self.leaf0());
        }
        if node == self.leaf0() {
            return Ok(self.leaf1());
        }
        let key = (Op::Not, self.id(node), 0);
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok(node);
            }
        }
        let level = self.level(node);
        let new_high = {
            let high = self.high(node);
            self.apply_not(high, prover)?
        };
        let new_low = {
            let low = self.low(node);
            self.apply_not(low, prover)?
        };
        // Negation preserves the distinctness of the children.
        let new_node = self.find_or_make(level, new_high, new_low, prover)?;
        self.insert_plain(key, new_node);
        Ok(new_node)
    }

    /// Disjunction.
    pub fn apply_or(
        &mut self,
        node_a: NodeRef,
        node_b: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        if node_a == self.leaf1() || node_b == self.leaf1() {
            return Ok(self.leaf1());
        }
        if node_a == self.leaf0() {
            return Ok(node_b);
        }
        if node_b == self.leaf0() {
            return Ok(node_a);
        }
        if node_a == node_b {
            return Ok(node_a);
        }

        let (node_a, node_b) = if self.id(node_a) > self.id(node_b) {
            (node_b, node_a)
        } else {
            (node_a, node_b)
        };
        let key = (Op::Or, self.id(node_a), self.id(node_b));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok(node);
            }
        }

        let split = min(self.level(node_a), self.level(node_b));
        let new_high = {
            let high_a = self.branch_high(node_a, split)?;
            let high_b = self.branch_high(node_b, split)?;
            self.apply_or(high_a, high_b, prover)?
        };
        let new_low = {
            let low_a = self.branch_low(node_a, split)?;
            let low_b = self.branch_low(node_b, split)?;
            self.apply_or(low_a, low_b, prover)?
        };

        let new_node = if new_high == new_low {
            new_high
        } else {
            self.find_or_make(split, new_high, new_low, prover)?
        };
        self.insert_plain(key, new_node);
        Ok(new_node)
    }

    /// Exclusive or.
    pub fn apply_xor(
        &mut self,
        node_a: NodeRef,
        node_b: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        if node_a == self.leaf1() {
            return self.apply_not(node_b, prover);
        }
        if node_b == self.leaf1() {
            return self.apply_not(node_a, prover);
        }
        if node_a == self.leaf0() {
            return Ok(node_b);
        }
        if node_b == self.leaf0() {
            return Ok(node_a);
        }
        if node_a == node_b {
            return Ok(self.leaf0());
        }

        let (node_a, node_b) = if self.id(node_a) > self.id(node_b) {
            (node_b, node_a)
        } else {
            (node_a, node_b)
        };
        let key = (Op::Xor, self.id(node_a), self.id(node_b));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok(node);
            }
        }

        let split = min(self.level(node_a), self.level(node_b));
        let new_high = {
            let high_a = self.branch_high(node_a, split)?;
            let high_b = self.branch_high(node_b, split)?;
            self.apply_xor(high_a, high_b, prover)?
        };
        let new_low = {
            let low_a = self.branch_low(node_a, split)?;
            let low_b = self.branch_low(node_b, split)?;
            self.apply_xor(low_a, low_b, prover)?
        };

        let new_node = if new_high == new_low {
            new_high
        } else {
            self.find_or_make(split, new_high, new_low, prover)?
        };
        self.insert_plain(key, new_node);
        Ok(new_node)
    }

    /// Existential quantification of the variables of `clause`.
    ///
    /// `clause` is the canonical chain of the quantified variables as positive literals. The
    /// variables are recorded in the quantified set, whose growth triggers garbage collection.
    pub fn exists(
        &mut self,
        node: NodeRef,
        clause: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        let mut cursor = clause;
        while !self.is_leaf(cursor) {
            let level = self.level(cursor);
            self.quantified_levels.insert(level);
            cursor = self.low(cursor);
        }
        self.exists_rec(node, clause, prover)
    }

    fn exists_rec(
        &mut self,
        node: NodeRef,
        mut clause: NodeRef,
        prover: &mut Prover,
    ) -> Result<NodeRef, BddError> {
        if self.is_leaf(node) {
            return Ok(node);
        }
        while !self.is_leaf(clause) && self.level(node) > self.level(clause) {
            clause = self.low(clause);
        }
        if self.is_leaf(clause) {
            return Ok(node);
        }
        let key = (Op::EQuant, self.id(node), self.id(clause));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Node(node) = entry.result {
                return Ok(node);
            }
        }

        let new_high = {
            let high = self.high(node);
            self.exists_rec(high, clause, prover)?
        };
        let new_low = {
            let low = self.low(node);
            self.exists_rec(low, clause, prover)?
        };
        let new_node = if self.level(node) == self.level(clause) {
            self.apply_or(new_high, new_low, prover)?
        } else if new_high == new_low {
            new_high
        } else {
            let level = self.level(node);
            self.find_or_make(level, new_high, new_low, prover)?
        };
        self.insert_plain(key, new_node);
        Ok(new_node)
    }

    /// Test whether `node_a` implies `node_b`, justifying a positive answer with `(!A | B)`.
    ///
    /// A negative answer carries the tautology sentinel; callers treat it as an engine invariant
    /// violation when the implication was expected to hold.
    pub fn justify_imply(
        &mut self,
        node_a: NodeRef,
        node_b: NodeRef,
        prover: &mut Prover,
    ) -> Result<(bool, i64), BddError> {
        self.apply_count += 1;
        if node_a == node_b || node_a == self.leaf0() || node_b == self.leaf1() {
            return Ok((true, TAUTOLOGY));
        }
        if node_a == self.leaf1() || node_b == self.leaf0() {
            return Ok((false, TAUTOLOGY));
        }

        let key = (Op::Imply, self.id(node_a), self.id(node_b));
        if let Some(entry) = self.cache.get(&key) {
            if let Cached::Check(check) = entry.result {
                return Ok((check, entry.justification));
            }
        }

        let mut rules = RuleIndex::default();
        let split = min(self.level(node_a), self.level(node_b));
        let high_a = self.branch_high(node_a, split)?;
        let low_a = self.branch_low(node_a, split)?;
        let high_b = self.branch_high(node_b, split)?;
        let low_b = self.branch_low(node_b, split)?;

        if high_a != low_a {
            rules.insert("UHD", self.node(node_a).infer_true_down);
            rules.insert("ULD", self.node(node_a).infer_false_down);
        }
        if high_b != low_b {
            rules.insert("VHU", self.node(node_b).infer_true_up);
            rules.insert("VLU", self.node(node_b).infer_false_up);
        }

        let (check_high, imply_high) = self.justify_imply(high_a, high_b, prover)?;
        if imply_high != TAUTOLOGY {
            rules.insert("IMH", imply_high);
        }
        let (check_low, imply_low) = self.justify_imply(low_a, low_b, prover)?;
        if imply_low != TAUTOLOGY {
            rules.insert("IML", imply_low);
        }

        let check = check_high && check_low;
        let (justification, clauses) = if check {
            let target = [-self.id(node_a), self.id(node_b)];
            let comment = if prover.comments_enabled() {
                Some(format!(
                    "Justification that {} ==> {}",
                    self.label(node_a),
                    self.label(node_b)
                ))
            } else {
                None
            };
            self.imply_resolver
                .run(&target, &rules, prover, comment.as_deref())?
        } else {
            (TAUTOLOGY, vec![])
        };
        self.cache.insert(
            key,
            CacheEntry {
                result: Cached::Check(check),
                justification,
                clauses,
            },
        );
        if justification != TAUTOLOGY {
            self.cache_justify_added += 1;
        } else {
            self.cache_no_justify_added += 1;
        }
        Ok((check, justification))
    }

    fn insert_plain(&mut self, key: CacheKey, node: NodeRef) {
        self.cache.insert(
            key,
            CacheEntry {
                result: Cached::Node(node),
                justification: TAUTOLOGY,
                clauses: vec![],
            },
        );
        self.cache_no_justify_added += 1;
    }
}
