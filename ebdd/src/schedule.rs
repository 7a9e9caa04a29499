//! Schedule files: a line-oriented command stream directing term combination.
//!
//! Benchmark generators emit a schedule alongside the CNF so the solver conjoins clauses in an
//! order that keeps intermediate BDDs small and quantifies variables out as soon as no remaining
//! clause mentions them. Commands operate on a stack of term ids, with named registers for terms
//! that are reused later.

use std::io::{self, BufRead, BufReader, Read};

use thiserror::Error;

/// One schedule command.
#[derive(Debug, PartialEq, Eq)]
pub enum ScheduleStep {
    /// `c i j ...`: push term ids onto the stack.
    PushTerms(Vec<usize>),
    /// `a n`: pop `n + 1` terms, conjoin them, push the result.
    Conjoin(usize),
    /// `q v ...`: pop one term, existentially quantify the listed input variables, push.
    Quantify(Vec<i64>),
    /// `s name`: copy the top term id into a register and protect it from GC.
    Store(String),
    /// `r name`: push a register's term id back onto the stack.
    Retrieve(String),
    /// `d name`: drop a register and its GC protection.
    Delete(String),
    /// `e`: pop two terms and report whether they are equal.
    EqualityTest,
    /// `i text`: report id, size and model count of the top term.
    Info(String),
}

/// A parsed schedule; each step keeps its line number for diagnostics.
#[derive(Debug, Default)]
pub struct Schedule {
    pub steps: Vec<(usize, ScheduleStep)>,
}

/// Possible errors while parsing or executing a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("line {line}: invalid field '{field}'")]
    NonInteger { line: usize, field: String },
    #[error("line {line}: {command} command must have 2 fields")]
    BadArity { line: usize, command: char },
    #[error("line {line}: unknown scheduler action '{command}'")]
    UnknownCommand { line: usize, command: String },
    #[error("line {line}: register {name} unknown")]
    UnknownRegister { line: usize, name: String },
    #[error("line {line}: conjunction count {count} exceeds stack depth {depth}")]
    StackExhausted {
        line: usize,
        count: usize,
        depth: usize,
    },
    #[error("line {line}: stack is empty")]
    EmptyStack { line: usize },
    #[error("line {line}: unknown term {id}")]
    UnknownTerm { line: usize, id: usize },
    #[error("line {line}: unknown variable {id}")]
    UnknownVariable { line: usize, id: i64 },
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Parse a schedule file. Blank lines and `#` lines are ignored.
pub fn read_schedule(input: impl Read) -> Result<Schedule, ScheduleError> {
    let reader = BufReader::new(input);
    let mut schedule = Schedule::default();
    let mut line_number = 0;
    for line in reader.lines() {
        let line = line?;
        line_number += 1;
        let mut fields = line.split_whitespace();
        let command = match fields.next() {
            None => continue,
            Some(command) => command,
        };
        if command.starts_with('#') {
            continue;
        }
        let step = match command {
            "i" => {
                // The remainder of the line, leading whitespace included, is free-form text
                // appended to the report.
                let text = line.trim_start();
                ScheduleStep::Info(text[1..].trim_end().to_string())
            }
            "s" | "r" | "d" => {
                let name = register_name(line_number, command, fields)?;
                match command {
                    "s" => ScheduleStep::Store(name),
                    "r" => ScheduleStep::Retrieve(name),
                    _ => ScheduleStep::Delete(name),
                }
            }
            "e" => ScheduleStep::EqualityTest,
            "c" => ScheduleStep::PushTerms(
                integers(line_number, fields)?
                    .into_iter()
                    .map(|id| id as usize)
                    .collect(),
            ),
            "a" => {
                let values = integers(line_number, fields)?;
                match values.first() {
                    Some(&count) => ScheduleStep::Conjoin(count as usize),
                    None => {
                        return Err(ScheduleError::BadArity {
                            line: line_number,
                            command: 'a',
                        })
                    }
                }
            }
            "q" => ScheduleStep::Quantify(integers(line_number, fields)?),
            _ => {
                return Err(ScheduleError::UnknownCommand {
                    line: line_number,
                    command: command.to_string(),
                })
            }
        };
        schedule.steps.push((line_number, step));
    }
    Ok(schedule)
}

fn register_name<'a>(
    line: usize,
    command: &str,
    mut fields: impl Iterator<Item = &'a str>,
) -> Result<String, ScheduleError> {
    let arity_error = || ScheduleError::BadArity {
        line,
        command: command.chars().next().unwrap_or('?'),
    };
    let name = fields.next().ok_or_else(arity_error)?;
    if fields.next().is_some() {
        return Err(arity_error());
    }
    Ok(name.to_string())
}

fn integers<'a>(
    line: usize,
    fields: impl Iterator<Item = &'a str>,
) -> Result<Vec<i64>, ScheduleError> {
    let mut values = vec![];
    for field in fields {
        let value = field.parse().map_err(|_| ScheduleError::NonInteger {
            line,
            field: field.to_string(),
        })?;
        values.push(value);
    }
    Ok(values)
}
