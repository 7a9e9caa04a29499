//! Strict DIMACS CNF reader and writer for the ebdd proof-generating SAT solver.
//!
//! The reader is deliberately stricter than most solver frontends: every clause must be terminated
//! by a `0` on its own line, clauses may not contain repeated or opposed literals, and the clause
//! count of the header must match the clauses found. Proof emission identifies input clauses by
//! their position in the file, so silently repairing a malformed formula would desynchronize the
//! proof from the CNF a checker reads.

use std::io::{self, BufRead, BufReader, Read, Write};

use ebdd_formula::{CnfFormula, Lit};

use thiserror::Error;

/// Possible errors while parsing a DIMACS CNF formula.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("line {line}: bad header '{header}': not cnf")]
    BadHeader { line: usize, header: String },
    #[error("line {line}: clause before 'p cnf' header")]
    MissingHeader { line: usize },
    #[error("line {line}: non-integer field '{field}'")]
    NonInteger { line: usize, field: String },
    #[error("line {line}: clause line does not end with 0")]
    UnterminatedClause { line: usize },
    #[error("line {line}: empty clause")]
    EmptyClause { line: usize },
    #[error("line {line}: literal {literal} out of range 1..={var_count}")]
    LiteralOutOfRange {
        line: usize,
        literal: isize,
        var_count: usize,
    },
    #[error("line {line}: opposite or repeated literal {literal}")]
    RepeatedLiteral { line: usize, literal: isize },
    #[error("got {clause_count} clauses, expected {header_clause_count}")]
    ClauseCount {
        clause_count: usize,
        header_clause_count: usize,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A parsed CNF file: the formula plus its comment lines.
///
/// Comments are kept because the solver echoes them into the proof output, so a proof can be
/// related back to the benchmark instance that produced it.
#[derive(Debug, Default)]
pub struct DimacsCnf {
    pub formula: CnfFormula,
    pub comments: Vec<String>,
}

/// Parse a complete DIMACS CNF file.
pub fn parse_dimacs(input: impl Read) -> Result<DimacsCnf, ParserError> {
    let reader = BufReader::new(input);
    let mut formula = CnfFormula::new();
    let mut comments = vec![];

    let mut header: Option<(usize, usize)> = None;
    let mut line_number = 0;

    for line in reader.lines() {
        let line = line?;
        line_number += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('c') {
            comments.push(comment.trim_start().to_string());
        } else if let Some(rest) = trimmed.strip_prefix('p') {
            header = Some(parse_header(line_number, trimmed, rest)?);
        } else {
            let (var_count, _) = header.ok_or(ParserError::MissingHeader { line: line_number })?;
            let clause = parse_clause_line(line_number, trimmed, var_count)?;
            formula.add_clause(&clause);
        }
    }

    if let Some((var_count, clause_count)) = header {
        formula.set_var_count(var_count);
        if formula.len() != clause_count {
            return Err(ParserError::ClauseCount {
                clause_count: formula.len(),
                header_clause_count: clause_count,
            });
        }
    } else if line_number > 0 || formula.len() > 0 {
        return Err(ParserError::MissingHeader { line: line_number });
    }

    Ok(DimacsCnf { formula, comments })
}

fn parse_header(line: usize, full: &str, rest: &str) -> Result<(usize, usize), ParserError> {
    let bad = || ParserError::BadHeader {
        line,
        header: full.to_string(),
    };
    let mut fields = rest.split_whitespace();
    if fields.next() != Some("cnf") {
        return Err(bad());
    }
    let var_count = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    let clause_count = fields.next().and_then(|f| f.parse().ok()).ok_or_else(bad)?;
    if fields.next().is_some() {
        return Err(bad());
    }
    Ok((var_count, clause_count))
}

fn parse_clause_line(
    line: usize,
    text: &str,
    var_count: usize,
) -> Result<Vec<Lit>, ParserError> {
    let mut values = Vec::new();
    for field in text.split_whitespace() {
        let value: isize = field.parse().map_err(|_| ParserError::NonInteger {
            line,
            field: field.to_string(),
        })?;
        values.push(value);
    }
    if values.pop() != Some(0) {
        return Err(ParserError::UnterminatedClause { line });
    }
    if values.is_empty() {
        return Err(ParserError::EmptyClause { line });
    }
    let mut clause = Vec::with_capacity(values.len());
    for &value in values.iter() {
        let magnitude = value.unsigned_abs();
        if value == 0 || magnitude > var_count {
            return Err(ParserError::LiteralOutOfRange {
                line,
                literal: value,
                var_count,
            });
        }
        if values.iter().filter(|&&v| v.abs() == value.abs()).count() > 1 {
            return Err(ParserError::RepeatedLiteral {
                line,
                literal: value,
            });
        }
        clause.push(Lit::from_dimacs(value));
    }
    Ok(clause)
}

/// Write a formula in DIMACS CNF format.
pub fn write_dimacs(target: &mut impl Write, formula: &CnfFormula) -> io::Result<()> {
    write!(target, "p cnf ")?;
    itoa::write(&mut *target, formula.var_count())?;
    target.write_all(b" ")?;
    itoa::write(&mut *target, formula.len())?;
    target.write_all(b"\n")?;
    for clause in formula.iter() {
        for &lit in clause.iter() {
            itoa::write(&mut *target, lit.to_dimacs())?;
            target.write_all(b" ")?;
        }
        target.write_all(b"0\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use ebdd_formula::cnf_formula;
    use proptest::prelude::*;

    fn parse_str(input: &str) -> Result<DimacsCnf, ParserError> {
        parse_dimacs(input.as_bytes())
    }

    #[test]
    fn parse_simple_formula() {
        let cnf = parse_str("c an instance\np cnf 3 2\n1 -2 0\n2 3 0\n").unwrap();
        assert_eq!(cnf.comments, vec!["an instance"]);
        assert_eq!(
            cnf.formula,
            cnf_formula![
                1, -2;
                2, 3;
            ]
        );
        assert_eq!(cnf.formula.var_count(), 3);
    }

    #[test]
    fn header_var_count_covers_unused_vars() {
        let cnf = parse_str("p cnf 5 1\n1 2 0\n").unwrap();
        assert_eq!(cnf.formula.var_count(), 5);
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(
            parse_str("1 2 0\n"),
            Err(ParserError::MissingHeader { line: 1 })
        ));
    }

    #[test]
    fn rejects_bad_header() {
        assert!(matches!(
            parse_str("p dnf 2 1\n1 0\n"),
            Err(ParserError::BadHeader { line: 1, .. })
        ));
    }

    #[test]
    fn rejects_clause_count_mismatch() {
        assert!(matches!(
            parse_str("p cnf 2 2\n1 2 0\n"),
            Err(ParserError::ClauseCount {
                clause_count: 1,
                header_clause_count: 2
            })
        ));
    }

    #[test]
    fn rejects_unterminated_clause() {
        assert!(matches!(
            parse_str("p cnf 2 1\n1 2\n"),
            Err(ParserError::UnterminatedClause { line: 2 })
        ));
    }

    #[test]
    fn rejects_empty_clause() {
        assert!(matches!(
            parse_str("p cnf 2 1\n0\n"),
            Err(ParserError::EmptyClause { line: 2 })
        ));
    }

    #[test]
    fn rejects_out_of_range_literal() {
        assert!(matches!(
            parse_str("p cnf 2 1\n1 3 0\n"),
            Err(ParserError::LiteralOutOfRange {
                line: 2,
                literal: 3,
                ..
            })
        ));
    }

    #[test]
    fn rejects_opposed_literals() {
        assert!(matches!(
            parse_str("p cnf 2 1\n1 -1 0\n"),
            Err(ParserError::RepeatedLiteral { line: 2, .. })
        ));
    }

    #[test]
    fn rejects_non_integer_field() {
        assert!(matches!(
            parse_str("p cnf 2 1\n1 x 0\n"),
            Err(ParserError::NonInteger { line: 2, .. })
        ));
    }

    proptest! {
        #[test]
        fn roundtrip_through_writer(
            formula in ebdd_formula::cnf::strategy::cnf_formula(1..20usize, 1..50, 1..8usize)
        ) {
            // The strict reader rejects repeated variables within a clause, so filter those.
            let mut cleaned = CnfFormula::new();
            for clause in formula.iter() {
                let mut seen = vec![];
                let mut keep = vec![];
                for &lit in clause.iter() {
                    if !seen.contains(&lit.var()) {
                        seen.push(lit.var());
                        keep.push(lit);
                    }
                }
                cleaned.add_clause(&keep);
            }
            cleaned.set_var_count(formula.var_count());

            let mut bytes = vec![];
            write_dimacs(&mut bytes, &cleaned).unwrap();
            let parsed = parse_dimacs(&bytes[..]).unwrap();
            prop_assert_eq!(parsed.formula, cleaned);
        }
    }
}
