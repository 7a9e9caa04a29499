//! The top-level solver driving the BDD manager over a CNF formula.
//!
//! Initialization emits the input clauses to the proof, allocates BDD variables in permutation
//! order and turns every input clause into a validated term. One of three strategies then combines
//! the terms: sequential pairing, an explicit schedule, or bucket elimination. Reaching the
//! zero-leaf establishes UNSAT with the empty clause as its validation; running out of terms to
//! combine establishes SAT.

use std::collections::BTreeMap;
use std::io::{self, Write};

use rustc_hash::FxHashMap;
use thiserror::Error;

use ebdd_dimacs::DimacsCnf;

use crate::bdd::{BddError, Manager, NodeRef, LEAF_LEVEL};
use crate::permute::{PermutationError, Permuter};
use crate::proof::{ProofError, Prover};
use crate::schedule::{Schedule, ScheduleError, ScheduleStep};
use crate::term::Term;

/// Possible solver failures; all are fatal.
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("CNF file contains no clauses")]
    EmptyFormula,
    #[error(transparent)]
    Bdd(#[from] BddError),
    #[error(transparent)]
    Proof(#[from] ProofError),
    #[error(transparent)]
    Permutation(#[from] PermutationError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct Solver {
    manager: Manager,
    prover: Prover,
    /// Signed input variable id to the BDD of that literal.
    lit_map: FxHashMap<i64, NodeRef>,
    /// Terms still to be combined, by term id; ordered so sequential pairing is deterministic.
    active: BTreeMap<usize, Term>,
    /// Terms parked in schedule registers; their roots stay protected from GC.
    stored: FxHashMap<usize, Term>,
    term_count: usize,
    unsat: bool,
    verbosity: u32,
    report: Box<dyn Write>,
    count_solutions: bool,
}

impl Solver {
    /// Ingest a parsed CNF: echo its comments, emit its clauses, build one term per clause.
    pub fn new(
        cnf: &DimacsCnf,
        mut prover: Prover,
        permuter: Option<Permuter>,
        verbosity: u32,
        report: Box<dyn Write>,
    ) -> Result<Solver, SolverError> {
        for comment in cnf.comments.iter() {
            prover.comment(comment)?;
        }
        let formula = &cnf.formula;
        if formula.is_empty() {
            return Err(SolverError::EmptyFormula);
        }

        let mut clause_number = 0;
        for clause in formula.iter() {
            clause_number += 1;
            if prover.comments_enabled() {
                prover.comment(&format!("Input clause {}", clause_number))?;
            }
            let literals: Vec<i64> = clause.iter().map(|lit| lit.to_dimacs() as i64).collect();
            prover.add_clause(&literals, &[], true)?;
        }
        prover.input_done();

        let var_count = formula.var_count();
        // Node ids continue the proof's variable numbering.
        let mut manager = Manager::new(var_count as i64 + 1, verbosity);
        let permuter = permuter.unwrap_or_else(|| Permuter::identity(var_count));

        let mut lit_map = FxHashMap::default();
        for level in 1..=var_count as i64 {
            let input_id = permuter.forward(level)?;
            let bdd_level = manager.new_variable(&format!("input-{}", input_id), input_id);
            let positive = manager.literal(bdd_level, true, &mut prover)?;
            lit_map.insert(input_id, positive);
            let negative = manager.literal(bdd_level, false, &mut prover)?;
            lit_map.insert(-input_id, negative);
        }

        let mut solver = Solver {
            manager,
            prover,
            lit_map,
            active: BTreeMap::new(),
            stored: FxHashMap::default(),
            term_count: 0,
            unsat: false,
            verbosity,
            report,
            count_solutions: true,
        };

        for clause in formula.iter() {
            solver.term_count += 1;
            let literals: Vec<NodeRef> = clause
                .iter()
                .map(|lit| solver.lit_map[&(lit.to_dimacs() as i64)])
                .collect();
            let (root, validation) = solver.manager.construct_clause(
                solver.term_count as i64,
                &literals,
                &mut solver.prover,
            )?;
            solver
                .active
                .insert(solver.term_count, Term::new(root, validation));
        }
        Ok(solver)
    }

    pub fn is_unsat(&self) -> bool {
        self.unsat
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn prover(&self) -> &Prover {
        &self.prover
    }

    /// Flush the proof stream.
    pub fn finish(&mut self) -> Result<(), SolverError> {
        self.prover.flush()?;
        Ok(())
    }

    /// Repeatedly combine the two lowest-numbered terms until one remains.
    pub fn run_sequential(&mut self) -> Result<(), SolverError> {
        while self.active.len() > 1 {
            let mut ids = self.active.keys().copied();
            let (id1, id2) = match (ids.next(), ids.next()) {
                (Some(id1), Some(id2)) => (id1, id2),
                _ => break,
            };
            if self.combine_terms(id1, id2, 0)?.is_none() {
                return Ok(());
            }
        }
        self.report_sat()
    }

    /// Execute a parsed schedule.
    pub fn run_schedule(&mut self, schedule: &Schedule) -> Result<(), SolverError> {
        let mut stack: Vec<usize> = vec![];
        let mut registers: FxHashMap<String, (usize, Term)> = FxHashMap::default();

        for (line, step) in schedule.steps.iter() {
            let line = *line;
            match step {
                ScheduleStep::PushTerms(ids) => stack.extend(ids.iter().copied()),
                ScheduleStep::Conjoin(count) => {
                    if count + 1 > stack.len() {
                        return Err(ScheduleError::StackExhausted {
                            line,
                            count: *count,
                            depth: stack.len(),
                        }
                        .into());
                    }
                    for _ in 0..*count {
                        let id1 = pop(&mut stack, line)?;
                        let id2 = pop(&mut stack, line)?;
                        match self.combine_terms(id1, id2, line)? {
                            None => return Ok(()),
                            Some(id) => stack.push(id),
                        }
                    }
                }
                ScheduleStep::Quantify(var_ids) => {
                    let id = pop(&mut stack, line)?;
                    let new_id = self.quantify_term(id, var_ids, line)?;
                    stack.push(new_id);
                }
                ScheduleStep::Store(name) => {
                    let id = *stack.last().ok_or(ScheduleError::EmptyStack { line })?;
                    let term = self.term(id, line)?;
                    registers.insert(name.clone(), (id, term));
                    self.stored.insert(id, term);
                }
                ScheduleStep::Retrieve(name) => {
                    let (id, term) =
                        *registers
                            .get(name)
                            .ok_or_else(|| ScheduleError::UnknownRegister {
                                line,
                                name: name.clone(),
                            })?;
                    stack.push(id);
                    // The register copy survives combines that consumed the original.
                    self.active.insert(id, term);
                }
                ScheduleStep::Delete(name) => {
                    let (id, _) =
                        registers
                            .remove(name)
                            .ok_or_else(|| ScheduleError::UnknownRegister {
                                line,
                                name: name.clone(),
                            })?;
                    self.stored.remove(&id);
                }
                ScheduleStep::EqualityTest => {
                    let id1 = pop(&mut stack, line)?;
                    let id2 = pop(&mut stack, line)?;
                    let term1 = self.term(id1, line)?;
                    let term2 = self.term(id2, line)?;
                    if term1.equal(&term2) {
                        writeln!(
                            self.report,
                            "Equality test PASSED.  {} == {}",
                            self.manager.id(term1.root()),
                            self.manager.id(term2.root())
                        )?;
                    } else {
                        writeln!(
                            self.report,
                            "Equality test FAILED.  {} != {}",
                            self.manager.id(term1.root()),
                            self.manager.id(term2.root())
                        )?;
                    }
                }
                ScheduleStep::Info(text) => {
                    let id = *stack.last().ok_or(ScheduleError::EmptyStack { line })?;
                    let term = self.term(id, line)?;
                    let root = term.root();
                    let size = self.manager.get_size(root);
                    if self.verbosity >= 1 {
                        if self.count_solutions {
                            let count = self.manager.satisfy_count(root, &mut self.prover)?;
                            writeln!(
                                self.report,
                                "Node {}.  Size = {}, Solutions = {}.{}",
                                self.manager.id(root),
                                size,
                                count,
                                text
                            )?;
                        } else {
                            writeln!(
                                self.report,
                                "Node {}.  Size = {}.{}",
                                self.manager.id(root),
                                size,
                                text
                            )?;
                        }
                    }
                }
            }
        }
        if stack.len() != 1 {
            log::warn!("schedule finished with stack depth {}", stack.len());
        }
        Ok(())
    }

    /// Bucket elimination: conjoin terms level by level, quantifying each level out once its
    /// bucket is reduced to a single term.
    pub fn run_buckets(&mut self) -> Result<(), SolverError> {
        let max_level = self.manager.var_count();
        let mut buckets: Vec<Vec<usize>> = vec![vec![]; max_level + 1];
        let ids: Vec<usize> = self.active.keys().copied().collect();
        for id in ids {
            self.place_in_bucket(&mut buckets, id)?;
        }
        for level in 0..=max_level {
            while buckets[level].len() > 1 {
                let id1 = buckets[level].remove(0);
                let id2 = buckets[level].remove(0);
                match self.combine_terms(id1, id2, 0)? {
                    None => return Ok(()),
                    Some(new_id) => self.place_in_bucket(&mut buckets, new_id)?,
                }
            }
            if level > 0 && !buckets[level].is_empty() {
                let id = buckets[level].remove(0);
                let var_id = self.manager.variable_id(level as u32);
                let new_id = self.quantify_term(id, &[var_id], 0)?;
                self.place_in_bucket(&mut buckets, new_id)?;
            }
        }
        self.report_sat()
    }

    /// Report statistics through the report sink.
    pub fn summarize(&mut self) -> Result<(), SolverError> {
        if self.verbosity >= 1 {
            self.manager.summarize(&mut self.report)?;
            writeln!(self.report, "Results from proof generation")?;
            self.prover.summarize(&mut self.report)?;
        }
        Ok(())
    }

    fn term(&self, id: usize, line: usize) -> Result<Term, SolverError> {
        self.active
            .get(&id)
            .copied()
            .ok_or_else(|| ScheduleError::UnknownTerm { line, id }.into())
    }

    fn take_term(&mut self, id: usize, line: usize) -> Result<Term, SolverError> {
        self.active
            .remove(&id)
            .ok_or_else(|| ScheduleError::UnknownTerm { line, id }.into())
    }

    /// Conjoin two active terms. Returns `None` once the empty clause is reached.
    fn combine_terms(
        &mut self,
        id1: usize,
        id2: usize,
        line: usize,
    ) -> Result<Option<usize>, SolverError> {
        let term_a = self.take_term(id1, line)?;
        let term_b = self.take_term(id2, line)?;
        let new_term = term_a.combine(&term_b, &mut self.manager, &mut self.prover)?;
        self.term_count += 1;
        if self.prover.comments_enabled() || log::log_enabled!(log::Level::Debug) {
            let comment = format!(
                "T{} (Node {}) & T{} (Node {}) --> T{} (Node {})",
                id1,
                self.manager.label(term_a.root()),
                id2,
                self.manager.label(term_b.root()),
                self.term_count,
                self.manager.label(new_term.root())
            );
            self.prover.comment(&comment)?;
            log::debug!("{}", comment);
        }
        self.active.insert(self.term_count, new_term);
        if new_term.root() == self.manager.leaf0() {
            writeln!(self.report, "UNSAT")?;
            self.unsat = true;
            self.summarize()?;
            return Ok(None);
        }
        Ok(Some(self.term_count))
    }

    /// Existentially quantify the listed input variables out of a term, then give the manager a
    /// chance to collect garbage.
    fn quantify_term(
        &mut self,
        id: usize,
        var_ids: &[i64],
        line: usize,
    ) -> Result<usize, SolverError> {
        let term = self.take_term(id, line)?;
        let mut literals = Vec::with_capacity(var_ids.len());
        for &var_id in var_ids.iter() {
            let lit = *self
                .lit_map
                .get(&var_id)
                .ok_or(ScheduleError::UnknownVariable { line, id: var_id })?;
            literals.push(lit);
        }
        let clause = self.manager.build_clause(&literals, &mut self.prover)?;
        let new_term = term.quantify(clause, &mut self.manager, &mut self.prover)?;
        self.term_count += 1;
        if self.prover.comments_enabled() || log::log_enabled!(log::Level::Debug) {
            let mut sorted = var_ids.to_vec();
            sorted.sort_unstable();
            let names: Vec<String> = sorted.iter().map(|v| v.to_string()).collect();
            let comment = format!(
                "T{} (Node {}) EQuant({}) --> T{} (Node {})",
                id,
                self.manager.label(term.root()),
                names.join(" "),
                self.term_count,
                self.manager.label(new_term.root())
            );
            self.prover.comment(&comment)?;
            log::debug!("{}", comment);
        }
        self.active.insert(self.term_count, new_term);

        let roots = self.live_roots();
        let deleted = self.manager.check_gc(&roots);
        self.prover.delete_clauses(&deleted)?;
        Ok(self.term_count)
    }

    fn place_in_bucket(
        &self,
        buckets: &mut Vec<Vec<usize>>,
        id: usize,
    ) -> Result<(), SolverError> {
        let term = self.term(id, 0)?;
        let level = self.manager.level(term.root());
        let slot = if level == LEAF_LEVEL { 0 } else { level as usize };
        buckets[slot].push(id);
        Ok(())
    }

    /// Roots the garbage collector must keep: all active terms plus stored registers.
    fn live_roots(&self) -> Vec<NodeRef> {
        self.active
            .values()
            .chain(self.stored.values())
            .map(|term| term.root())
            .collect()
    }

    fn report_sat(&mut self) -> Result<(), SolverError> {
        writeln!(self.report, "SAT")?;
        if self.verbosity >= 1 {
            let remaining = self.active.values().next().copied();
            if let Some(term) = remaining {
                for string in self.manager.satisfy_strings(term.root(), 20) {
                    writeln!(self.report, "  {}", string)?;
                }
            }
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<usize>, line: usize) -> Result<usize, ScheduleError> {
    stack.pop().ok_or(ScheduleError::EmptyStack { line })
}

#[cfg(test)]
mod tests {
    use super::*;

    use ebdd_dimacs::DimacsCnf;
    use ebdd_formula::cnf_formula;

    use crate::proof::ProofFormat;

    fn sink_prover() -> Prover {
        Prover::new(Box::new(io::sink()), ProofFormat::Lrat, 1)
    }

    #[test]
    fn empty_formula_is_rejected() {
        let cnf = DimacsCnf::default();
        let result = Solver::new(&cnf, sink_prover(), None, 1, Box::new(io::sink()));
        assert!(matches!(result, Err(SolverError::EmptyFormula)));
    }

    #[test]
    fn sequential_run_over_a_unit_conflict() {
        let cnf = DimacsCnf {
            formula: cnf_formula![
                1;
                -1;
            ],
            comments: vec![],
        };
        let mut solver =
            Solver::new(&cnf, sink_prover(), None, 1, Box::new(io::sink())).unwrap();
        solver.run_sequential().unwrap();
        assert!(solver.is_unsat());
    }

    #[test]
    fn permuted_variables_keep_their_input_ids() {
        let cnf = DimacsCnf {
            formula: cnf_formula![
                1, 2;
                -2;
            ],
            comments: vec![],
        };
        let permuter = Permuter::new(&[1, 2], &[2, 1]).unwrap();
        let mut solver =
            Solver::new(&cnf, sink_prover(), Some(permuter), 1, Box::new(io::sink())).unwrap();
        // Level 1 now carries input variable 2.
        assert_eq!(solver.manager().variable_id(1), 2);
        solver.run_sequential().unwrap();
        assert!(!solver.is_unsat());
    }
}
