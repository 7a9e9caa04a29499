//! Terms: BDD roots paired with their validating proof clause.
//!
//! A term's validation clause is the unit clause asserting its root, entailed by the input clauses
//! and operation justifications accumulated so far. Combining or quantifying terms threads the
//! validations through the proof, so that the final zero-leaf term is validated by the empty
//! clause.

use crate::bdd::{BddError, Manager, NodeRef};
use crate::proof::Prover;
use crate::resolver::TAUTOLOGY;

#[derive(Copy, Clone, Debug)]
pub struct Term {
    root: NodeRef,
    validation: i64,
}

impl Term {
    pub fn new(root: NodeRef, validation: i64) -> Term {
        Term { root, validation }
    }

    pub fn root(&self) -> NodeRef {
        self.root
    }

    pub fn validation(&self) -> i64 {
        self.validation
    }

    /// Conjoin two terms, validating the result from both validations and the conjunction
    /// justification.
    ///
    /// When the conjunction collapses to one of the operands the justification is the tautology
    /// sentinel and that operand's validation is reused unchanged.
    pub fn combine(
        &self,
        other: &Term,
        manager: &mut Manager,
        prover: &mut Prover,
    ) -> Result<Term, BddError> {
        let (new_root, implication) = manager.apply_and_justify(self.root, other.root, prover)?;
        if implication == TAUTOLOGY {
            if new_root == self.root {
                return Ok(Term::new(new_root, self.validation));
            }
            if new_root == other.root {
                return Ok(Term::new(new_root, other.validation));
            }
        }
        let mut antecedents = vec![self.validation, other.validation];
        if implication != TAUTOLOGY {
            antecedents.push(implication);
        }
        if prover.comments_enabled() {
            let comment = if new_root == manager.leaf0() {
                "Validation of empty clause".to_string()
            } else {
                format!("Validation of {}", manager.label(new_root))
            };
            prover.comment(&comment)?;
        }
        let validation = prover.add_clause(&[manager.id(new_root)], &antecedents, false)?;
        Ok(Term::new(new_root, validation))
    }

    /// Existentially quantify the variables of `clause` out of this term.
    ///
    /// Quantification weakens the function, so the original root must imply the new one; a failed
    /// check means the engine broke its own invariant and is fatal.
    pub fn quantify(
        &self,
        clause: NodeRef,
        manager: &mut Manager,
        prover: &mut Prover,
    ) -> Result<Term, BddError> {
        let new_root = manager.exists(self.root, clause, prover)?;
        let (check, implication) = manager.justify_imply(self.root, new_root, prover)?;
        if !check {
            return Err(BddError::ImplicationFailed {
                from: manager.label(self.root),
                to: manager.label(new_root),
            });
        }
        let mut antecedents = vec![self.validation];
        if implication != TAUTOLOGY {
            antecedents.push(implication);
        }
        if prover.comments_enabled() {
            prover.comment(&format!("Validation of {}", manager.label(new_root)))?;
        }
        let validation = prover.add_clause(&[manager.id(new_root)], &antecedents, false)?;
        Ok(Term::new(new_root, validation))
    }

    /// Structural equality of roots; canonicity makes this a semantic equality test.
    pub fn equal(&self, other: &Term) -> bool {
        self.root == other.root
    }
}
