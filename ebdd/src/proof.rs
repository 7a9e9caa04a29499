//! Proof output.
//!
//! The prover owns the proof stream and the monotone clause id counter. Clause additions and
//! deletions are written in one of three formats: tracecheck text, LRAT text, or binary LRAT.
//! Besides writing, the prover keeps a dictionary of live clauses; the resolver reads antecedent
//! literals from it when it assembles derivations.

use std::io::{self, BufWriter, Write};
use std::path::Path;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::resolver::{clean_clause, Reduced, TAUTOLOGY};
use crate::vbe;

/// Format of the emitted proof.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProofFormat {
    /// Text format with sorted antecedents and no deletion records.
    Tracecheck,
    /// LRAT text format; antecedents keep emission order, deletions are recorded.
    Lrat,
    /// LRAT with zigzag variable-byte encoded fields.
    BinaryLrat,
}

impl ProofFormat {
    /// Select the format from a proof file name: `.lrat` and `.lratb` pick the LRAT formats,
    /// anything else (conventionally `.proof`) picks tracecheck.
    pub fn from_extension(path: &Path) -> ProofFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("lrat") => ProofFormat::Lrat,
            Some("lratb") => ProofFormat::BinaryLrat,
            _ => ProofFormat::Tracecheck,
        }
    }

    pub fn is_lrat(self) -> bool {
        self != ProofFormat::Tracecheck
    }

    pub fn is_binary(self) -> bool {
        self == ProofFormat::BinaryLrat
    }
}

/// Possible errors while emitting a proof.
#[derive(Debug, Error)]
pub enum ProofError {
    #[error("failed to write proof: {0}")]
    Io(#[from] io::Error),
}

/// Owns the proof output stream and allocates clause ids.
pub struct Prover {
    format: ProofFormat,
    target: BufWriter<Box<dyn Write>>,
    verbosity: u32,
    clause_count: i64,
    input_clause_count: i64,
    derived_count: i64,
    clauses: FxHashMap<i64, Vec<i64>>,
}

impl Prover {
    pub fn new(target: Box<dyn Write>, format: ProofFormat, verbosity: u32) -> Prover {
        Prover {
            format,
            target: BufWriter::new(target),
            verbosity,
            clause_count: 0,
            input_clause_count: 0,
            derived_count: 0,
            clauses: FxHashMap::default(),
        }
    }

    pub fn format(&self) -> ProofFormat {
        self.format
    }

    /// Whether proof comments are written at all.
    pub fn comments_enabled(&self) -> bool {
        self.verbosity > 1 && !self.format.is_binary()
    }

    /// Write a comment line into text proofs.
    pub fn comment(&mut self, text: &str) -> Result<(), ProofError> {
        if self.comments_enabled() {
            writeln!(self.target, "c {}", text)?;
        }
        Ok(())
    }

    /// Clean the clause and, unless it is a tautology, assign it the next id and write it.
    ///
    /// Input clauses restate the CNF: tracecheck re-emits them, the LRAT formats record them only
    /// as commentary (the checker reads the formula from the CNF file) while still consuming an
    /// id, so proof ids and CNF clause numbers stay aligned.
    pub fn add_clause(
        &mut self,
        literals: &[i64],
        antecedents: &[i64],
        is_input: bool,
    ) -> Result<i64, ProofError> {
        let literals = match clean_clause(literals) {
            Reduced::Tautology => return Ok(TAUTOLOGY),
            Reduced::Clause(literals) => literals,
        };
        self.clause_count += 1;
        let id = self.clause_count;
        if !is_input && !antecedents.is_empty() {
            self.derived_count += 1;
        }

        match self.format {
            ProofFormat::Tracecheck => {
                let mut sorted = antecedents.to_vec();
                sorted.sort_unstable();
                write_text_add(&mut self.target, id, &literals, &sorted)?;
            }
            ProofFormat::Lrat => {
                if is_input {
                    if self.comments_enabled() {
                        let mut line = vec![];
                        write_text_add(&mut line, id, &literals, antecedents)?;
                        let line = String::from_utf8_lossy(&line);
                        writeln!(self.target, "c {}", line.trim_end())?;
                    }
                } else {
                    write_text_add(&mut self.target, id, &literals, antecedents)?;
                }
            }
            ProofFormat::BinaryLrat => {
                if !is_input {
                    vbe::write_i64(&mut self.target, id)?;
                    self.target.write_all(b"a")?;
                    for &lit in literals.iter() {
                        vbe::write_i64(&mut self.target, lit)?;
                    }
                    self.target.write_all(&[0])?;
                    for &antecedent in antecedents.iter() {
                        vbe::write_i64(&mut self.target, antecedent)?;
                    }
                    self.target.write_all(&[0])?;
                }
            }
        }

        self.clauses.insert(id, literals);
        Ok(id)
    }

    /// Drop clauses from the dictionary and, in the LRAT formats, record the deletion.
    pub fn delete_clauses(&mut self, ids: &[i64]) -> Result<(), ProofError> {
        if ids.is_empty() {
            return Ok(());
        }
        for &id in ids.iter() {
            self.clauses.remove(&id);
        }
        match self.format {
            ProofFormat::Tracecheck => {}
            ProofFormat::Lrat => {
                itoa::write(&mut self.target, self.clause_count)?;
                self.target.write_all(b" d")?;
                for &id in ids.iter() {
                    self.target.write_all(b" ")?;
                    itoa::write(&mut self.target, id)?;
                }
                self.target.write_all(b" 0\n")?;
            }
            ProofFormat::BinaryLrat => {
                vbe::write_i64(&mut self.target, self.clause_count)?;
                self.target.write_all(b"d")?;
                for &id in ids.iter() {
                    vbe::write_i64(&mut self.target, id)?;
                }
                self.target.write_all(&[0])?;
            }
        }
        Ok(())
    }

    /// Record that all input clauses have been emitted.
    pub fn input_done(&mut self) {
        self.input_clause_count = self.clause_count;
    }

    /// The literals of a live clause.
    pub fn clause(&self, id: i64) -> Option<&[i64]> {
        self.clauses.get(&id).map(|lits| &lits[..])
    }

    /// The id of the most recently added clause.
    pub fn clause_count(&self) -> i64 {
        self.clause_count
    }

    pub fn flush(&mut self) -> Result<(), ProofError> {
        self.target.flush()?;
        Ok(())
    }

    /// Report clause statistics.
    pub fn summarize(&self, target: &mut dyn Write) -> io::Result<()> {
        writeln!(target, "Total clauses: {}", self.clause_count)?;
        writeln!(target, "Input clauses: {}", self.input_clause_count)?;
        let axiom_count = self.clause_count - self.input_clause_count - self.derived_count;
        writeln!(target, "Added clauses without antecedents: {}", axiom_count)?;
        writeln!(target, "Added clauses requiring proofs: {}", self.derived_count)?;
        Ok(())
    }
}

fn write_text_add(
    target: &mut impl Write,
    id: i64,
    literals: &[i64],
    antecedents: &[i64],
) -> io::Result<()> {
    itoa::write(&mut *target, id)?;
    for &lit in literals.iter() {
        target.write_all(b" ")?;
        itoa::write(&mut *target, lit)?;
    }
    target.write_all(b" 0")?;
    for &antecedent in antecedents.iter() {
        target.write_all(b" ")?;
        itoa::write(&mut *target, antecedent)?;
    }
    target.write_all(b" 0\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use tempfile::TempDir;

    fn file_prover(dir: &TempDir, name: &str, format: ProofFormat) -> Prover {
        let file = fs::File::create(dir.path().join(name)).unwrap();
        Prover::new(Box::new(file), format, 1)
    }

    fn read_back(dir: &TempDir, name: &str) -> Vec<u8> {
        fs::read(dir.path().join(name)).unwrap()
    }

    #[test]
    fn tracecheck_sorts_antecedents_and_keeps_deletions_silent() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.proof", ProofFormat::Tracecheck);

        assert_eq!(prover.add_clause(&[1, 2], &[], true).unwrap(), 1);
        assert_eq!(prover.add_clause(&[-1], &[], true).unwrap(), 2);
        assert_eq!(prover.add_clause(&[2], &[2, 1], false).unwrap(), 3);
        prover.delete_clauses(&[1]).unwrap();
        prover.flush().unwrap();

        let text = String::from_utf8(read_back(&tmp, "out.proof")).unwrap();
        assert_eq!(text, "1 1 2 0 0\n2 -1 0 0\n3 2 0 1 2 0\n");
    }

    #[test]
    fn lrat_text_comments_inputs_and_records_deletions() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.lrat", ProofFormat::Lrat);

        assert_eq!(prover.add_clause(&[1, 2], &[], true).unwrap(), 1);
        assert_eq!(prover.add_clause(&[2], &[1], false).unwrap(), 2);
        prover.delete_clauses(&[1]).unwrap();
        prover.flush().unwrap();

        let text = String::from_utf8(read_back(&tmp, "out.lrat")).unwrap();
        // Verbosity 1 suppresses even the input comments.
        assert_eq!(text, "2 2 0 1 0\n2 d 1 0\n");
    }

    #[test]
    fn lrat_antecedents_keep_emission_order() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.lrat", ProofFormat::Lrat);

        prover.add_clause(&[1], &[], true).unwrap();
        prover.add_clause(&[-1, 2], &[], true).unwrap();
        prover.add_clause(&[2], &[2, 1], false).unwrap();
        prover.flush().unwrap();

        let text = String::from_utf8(read_back(&tmp, "out.lrat")).unwrap();
        assert_eq!(text, "3 2 0 2 1 0\n");
    }

    #[test]
    fn binary_lrat_framing() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.lratb", ProofFormat::BinaryLrat);

        assert_eq!(prover.add_clause(&[1], &[], true).unwrap(), 1);
        assert_eq!(prover.add_clause(&[-1, 2], &[1], false).unwrap(), 2);
        prover.delete_clauses(&[2]).unwrap();
        prover.flush().unwrap();

        let bytes = read_back(&tmp, "out.lratb");
        let mut expected = vec![];
        // Input clauses are skipped entirely. The addition is id 'a' lits 0 antecedents 0.
        vbe::write_i64(&mut expected, 2).unwrap();
        expected.push(b'a');
        vbe::write_i64(&mut expected, -1).unwrap();
        vbe::write_i64(&mut expected, 2).unwrap();
        expected.push(0);
        vbe::write_i64(&mut expected, 1).unwrap();
        expected.push(0);
        // Deletion is id 'd' ids 0.
        vbe::write_i64(&mut expected, 2).unwrap();
        expected.push(b'd');
        vbe::write_i64(&mut expected, 2).unwrap();
        expected.push(0);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn tautologies_do_not_consume_ids() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.proof", ProofFormat::Tracecheck);

        assert_eq!(prover.add_clause(&[1, -1], &[], false).unwrap(), TAUTOLOGY);
        assert_eq!(prover.add_clause(&[5, TAUTOLOGY], &[], false).unwrap(), TAUTOLOGY);
        assert_eq!(prover.add_clause(&[1], &[], false).unwrap(), 1);
        assert_eq!(prover.clause_count(), 1);
    }

    #[test]
    fn empty_clause_after_cleaning() {
        let tmp = TempDir::new().unwrap();
        let mut prover = file_prover(&tmp, "out.proof", ProofFormat::Tracecheck);

        // The zero-leaf unit clause cleans to the empty clause.
        let id = prover.add_clause(&[-TAUTOLOGY], &[], false).unwrap();
        assert_eq!(id, 1);
        assert_eq!(prover.clause(1), Some(&[][..]));
        prover.flush().unwrap();
        let text = String::from_utf8(read_back(&tmp, "out.proof")).unwrap();
        assert_eq!(text, "1 0 0\n");
    }
}
