//! Resolution derivations justifying BDD operations.
//!
//! Every conjunction or implication computed by the BDD manager is justified by a short chain of
//! resolution steps over the ITE axioms of the operand nodes, the justifications of the recursive
//! sub-results, and the axioms of the freshly built result node. The manager names these clauses
//! with short rule tags (`UHD`, `ANDH`, `WHU`, ...) and hands them to a resolver together with the
//! target clause; the resolver emits intermediate resolvents to the prover and ends on a clause
//! equal to the target.

use std::io::{self, Write};

use thiserror::Error;

use crate::proof::{ProofError, Prover};

/// Sentinel clause id standing for "trivially true".
///
/// Doubles as the node id of the one-leaf, so that the unit clause asserting the one-leaf is a
/// tautology and never emitted, while the negated sentinel is the id of the zero-leaf and drops
/// out of any clause as the "false" literal.
pub const TAUTOLOGY: i64 = 1_000_000_000;

/// Outcome of cleaning a clause.
#[derive(Debug, PartialEq, Eq)]
pub enum Reduced {
    Tautology,
    Clause(Vec<i64>),
}

/// Remove duplicate and constant-false literals from a clause.
///
/// Returns [`Reduced::Tautology`] when the clause contains the constant-true literal or both a
/// literal and its negation. Literal order is preserved: hint-less clause additions are checked as
/// RAT on their first literal, so callers place the resolution variable first and cleaning must
/// not reorder it.
pub fn clean_clause(literals: &[i64]) -> Reduced {
    let mut out: Vec<i64> = Vec::with_capacity(literals.len());
    for &lit in literals {
        if lit == TAUTOLOGY {
            return Reduced::Tautology;
        }
        if lit == -TAUTOLOGY {
            continue;
        }
        if out.contains(&lit) {
            continue;
        }
        if out.contains(&-lit) {
            return Reduced::Tautology;
        }
        out.push(lit);
    }
    Reduced::Clause(out)
}

/// Resolve two clean clauses over their unique complementary pair.
///
/// Returns `None` unless exactly one pivot exists.
fn resolvent(c1: &[i64], c2: &[i64]) -> Option<Vec<i64>> {
    let mut pivot = None;
    for &lit in c1 {
        if c2.contains(&-lit) {
            if pivot.is_some() {
                return None;
            }
            pivot = Some(lit);
        }
    }
    let pivot = pivot?;
    let mut out: Vec<i64> = c1.iter().copied().filter(|&lit| lit != pivot).collect();
    for &lit in c2 {
        if lit != -pivot && !out.contains(&lit) {
            out.push(lit);
        }
    }
    Some(out)
}

/// Order-insensitive equality of clean clauses.
fn same_clause(a: &[i64], b: &[i64]) -> bool {
    a.len() == b.len() && a.iter().all(|lit| b.contains(lit))
}

/// Possible errors while producing a resolution derivation.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no resolution derivation reaches the target clause {target:?}")]
    NoDerivation { target: Vec<i64> },
    #[error("rule {name} names clause {id} which is not in the proof")]
    UnknownRule { name: &'static str, id: i64 },
    #[error(transparent)]
    Proof(#[from] ProofError),
}

/// Clause database for a single derivation, keyed by symbolic rule names.
#[derive(Default, Debug)]
pub struct RuleIndex {
    rules: Vec<(&'static str, i64)>,
}

impl RuleIndex {
    pub fn insert(&mut self, name: &'static str, id: i64) {
        self.rules.push((name, id));
    }

    fn get(&self, name: &str) -> Option<i64> {
        self.rules
            .iter()
            .find(|(rule, _)| *rule == name)
            .map(|&(_, id)| id)
    }
}

/// A candidate derivation for one cofactor branch: a left-to-right fold of resolutions starting
/// from a rule clause.
struct Chain {
    base_id: i64,
    steps: Vec<(i64, Vec<i64>)>,
    lits: Vec<i64>,
}

/// Emits the resolution proof for one operator.
///
/// The two rule groups are the hand-authored derivations of the high-branch and low-branch
/// obligations; resolving the two branch clauses over the split variable yields the target. When
/// operands collapse to constants or share cofactors, some rules are tautological and the full
/// chain does not resolve; shorter in-order subchains of the same group are tried instead, longest
/// first. The search is pure; only the successful derivation is written to the proof.
pub struct OperationResolver {
    high_rules: &'static [&'static str],
    low_rules: &'static [&'static str],
    run_count: u64,
    step_count: u64,
}

impl OperationResolver {
    /// Resolver for conjunction justifications `(!A | !B | W)`.
    pub fn conjunction() -> OperationResolver {
        OperationResolver {
            high_rules: &["ANDH", "UHD", "VHD", "WHU"],
            low_rules: &["ANDL", "ULD", "VLD", "WLU"],
            run_count: 0,
            step_count: 0,
        }
    }

    /// Resolver for implication justifications `(!A | B)`.
    pub fn implication() -> OperationResolver {
        OperationResolver {
            high_rules: &["IMH", "UHD", "VHU"],
            low_rules: &["IML", "ULD", "VLU"],
            run_count: 0,
            step_count: 0,
        }
    }

    /// Derive the target clause from the named rules.
    ///
    /// Returns the id of the final clause, which equals the target, and the ids of all clauses
    /// created along the way (final clause included) so they can be deleted if the result is later
    /// collected.
    pub fn run(
        &mut self,
        target: &[i64],
        rules: &RuleIndex,
        prover: &mut Prover,
        comment: Option<&str>,
    ) -> Result<(i64, Vec<i64>), ResolutionError> {
        self.run_count += 1;
        let target = match clean_clause(target) {
            Reduced::Tautology => return Ok((TAUTOLOGY, vec![])),
            Reduced::Clause(lits) => lits,
        };

        let high = gather(self.high_rules, rules, prover)?;
        let low = gather(self.low_rules, rules, prover)?;
        let high_chains = chains(&high);
        let low_chains = chains(&low);

        // A branch clause that already equals the target closes the derivation by itself; this
        // happens when the other branch collapsed to a constant.
        for chain in high_chains.iter().chain(low_chains.iter()) {
            if same_clause(&chain.lits, &target) {
                return self.emit(prover, comment, chain, None, &target);
            }
        }
        for high_chain in high_chains.iter() {
            for low_chain in low_chains.iter() {
                if let Some(lits) = resolvent(&high_chain.lits, &low_chain.lits) {
                    if same_clause(&lits, &target) {
                        return self.emit(prover, comment, high_chain, Some(low_chain), &target);
                    }
                }
            }
        }
        Err(ResolutionError::NoDerivation { target })
    }

    fn emit(
        &mut self,
        prover: &mut Prover,
        comment: Option<&str>,
        first: &Chain,
        second: Option<&Chain>,
        target: &[i64],
    ) -> Result<(i64, Vec<i64>), ResolutionError> {
        if let Some(text) = comment {
            prover.comment(text)?;
        }
        let mut created = vec![];
        let head = self.emit_chain(prover, first, &mut created)?;
        let result = match second {
            None => head,
            Some(chain) => {
                let tail = self.emit_chain(prover, chain, &mut created)?;
                let id = prover.add_clause(target, &[head, tail], false)?;
                self.step_count += 1;
                created.push(id);
                id
            }
        };
        Ok((result, created))
    }

    fn emit_chain(
        &mut self,
        prover: &mut Prover,
        chain: &Chain,
        created: &mut Vec<i64>,
    ) -> Result<i64, ResolutionError> {
        let mut current = chain.base_id;
        for (rule_id, lits) in chain.steps.iter() {
            let id = prover.add_clause(lits, &[current, *rule_id], false)?;
            self.step_count += 1;
            created.push(id);
            current = id;
        }
        Ok(current)
    }

    /// Report run statistics.
    pub fn summarize(&self, target: &mut dyn Write) -> io::Result<()> {
        writeln!(target, "  Resolver runs: {}", self.run_count)?;
        writeln!(target, "  Resolution steps emitted: {}", self.step_count)?;
        Ok(())
    }
}

/// Look up the present, non-tautological rules of one group, in group order.
fn gather(
    names: &'static [&'static str],
    rules: &RuleIndex,
    prover: &Prover,
) -> Result<Vec<(i64, Vec<i64>)>, ResolutionError> {
    let mut out = vec![];
    for &name in names {
        if let Some(id) = rules.get(name) {
            if id == TAUTOLOGY {
                continue;
            }
            let lits = prover
                .clause(id)
                .ok_or(ResolutionError::UnknownRule { name, id })?;
            out.push((id, lits.to_vec()));
        }
    }
    Ok(out)
}

/// All derivable in-order subchains of a rule group, longest first.
fn chains(group: &[(i64, Vec<i64>)]) -> Vec<Chain> {
    let mut masks: Vec<u32> = (1..(1u32 << group.len())).collect();
    masks.sort_by_key(|mask| std::cmp::Reverse(mask.count_ones()));

    let mut out = vec![];
    'mask: for mask in masks {
        let mut picked = (0..group.len()).filter(|i| mask & (1 << i) != 0);
        let first = match picked.next() {
            Some(first) => first,
            None => continue,
        };
        let mut chain = Chain {
            base_id: group[first].0,
            steps: vec![],
            lits: group[first].1.clone(),
        };
        for index in picked {
            match resolvent(&chain.lits, &group[index].1) {
                Some(lits) => {
                    chain.steps.push((group[index].0, lits.clone()));
                    chain.lits = lits;
                }
                None => continue 'mask,
            }
        }
        out.push(chain);
    }
    out
}
