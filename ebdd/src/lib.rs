//! A proof-generating SAT solver built on a BDD engine.
//!
//! Given a CNF formula, the solver builds one BDD per clause, combines them under conjunction and
//! existential quantification following a schedule, and emits a machine-checkable refutation proof
//! (tracecheck or LRAT) when the formula is unsatisfiable. Every BDD node doubles as an extension
//! variable of the proof; every operation on nodes is justified by resolution over the nodes' ITE
//! axioms, so an external checker can verify the run without trusting the engine.
//!
//! The crate is organized bottom-up:
//!
//! * [`resolver`] derives the per-operation resolution proofs,
//! * [`proof`] owns the proof output stream and clause ids,
//! * [`vbe`] is the variable-byte codec beneath the binary proof format,
//! * [`bdd`] is the node manager with justified apply operations and garbage collection,
//! * [`term`] pairs BDD roots with their validating clauses,
//! * [`permute`] and [`schedule`] read the auxiliary input files,
//! * [`solver`] drives everything over a parsed CNF.

pub mod bdd;
pub mod permute;
pub mod proof;
pub mod resolver;
pub mod schedule;
pub mod solver;
pub mod term;
pub mod vbe;

pub use bdd::{BddError, Manager, NodeRef};
pub use permute::{read_permutation, PermutationError, Permuter};
pub use proof::{ProofError, ProofFormat, Prover};
pub use schedule::{read_schedule, Schedule, ScheduleError};
pub use solver::{Solver, SolverError};
pub use term::Term;
