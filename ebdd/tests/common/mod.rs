//! Shared support for the end-to-end tests: a solver harness, a proof checker covering the three
//! emitted formats, and small benchmark generators.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{Cursor, Read};

use tempfile::TempDir;

use ebdd::proof::ProofFormat;
use ebdd::schedule::read_schedule;
use ebdd::solver::Solver;
use ebdd::vbe;
use ebdd::Prover;
use ebdd_dimacs::parse_dimacs;

pub enum Mode<'a> {
    Sequential,
    Bucket,
    Schedule(&'a str),
}

pub struct RunResult {
    pub unsat: bool,
    pub proof: Vec<u8>,
    pub report: String,
    pub clause_count: i64,
    pub gc_count: u64,
}

/// Run the solver over a CNF given as text, returning the emitted proof, the report output and
/// the input clauses for checking.
pub fn run(cnf_text: &str, format: ProofFormat, mode: Mode) -> (RunResult, Vec<Vec<i64>>) {
    let cnf = parse_dimacs(cnf_text.as_bytes()).expect("parsing failed");
    let inputs: Vec<Vec<i64>> = cnf
        .formula
        .iter()
        .map(|clause| clause.iter().map(|lit| lit.to_dimacs() as i64).collect())
        .collect();

    let tmp = TempDir::new().unwrap();
    let proof_path = tmp.path().join("proof.out");
    let report_path = tmp.path().join("report.txt");

    let prover = Prover::new(
        Box::new(fs::File::create(&proof_path).unwrap()),
        format,
        1,
    );
    let report = Box::new(fs::File::create(&report_path).unwrap());
    let mut solver = Solver::new(&cnf, prover, None, 1, report).expect("solver setup failed");

    match mode {
        Mode::Sequential => solver.run_sequential().expect("run failed"),
        Mode::Bucket => solver.run_buckets().expect("run failed"),
        Mode::Schedule(text) => {
            let schedule = read_schedule(text.as_bytes()).expect("bad schedule");
            solver.run_schedule(&schedule).expect("run failed");
        }
    }
    solver.finish().unwrap();

    let result = RunResult {
        unsat: solver.is_unsat(),
        proof: fs::read(&proof_path).unwrap(),
        report: fs::read_to_string(&report_path).unwrap(),
        clause_count: solver.prover().clause_count(),
        gc_count: solver.manager().gc_count(),
    };
    (result, inputs)
}

/// One parsed proof record.
#[derive(Debug)]
pub enum Step {
    Add {
        id: i64,
        lits: Vec<i64>,
        hints: Vec<i64>,
    },
    Delete {
        ids: Vec<i64>,
    },
}

pub fn parse_steps(proof: &[u8], format: ProofFormat) -> Result<Vec<Step>, String> {
    if format.is_binary() {
        parse_binary_steps(proof)
    } else {
        let text = std::str::from_utf8(proof).map_err(|err| err.to_string())?;
        parse_text_steps(text)
    }
}

fn parse_text_steps(text: &str) -> Result<Vec<Step>, String> {
    let mut steps = vec![];
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() >= 2 && fields[1] == "d" {
            let mut ids: Vec<i64> = fields[2..]
                .iter()
                .map(|field| field.parse().map_err(|_| format!("bad field {}", field)))
                .collect::<Result<_, _>>()?;
            if ids.pop() != Some(0) {
                return Err(format!("unterminated deletion: {}", line));
            }
            steps.push(Step::Delete { ids });
        } else {
            let values: Vec<i64> = fields
                .iter()
                .map(|field| field.parse().map_err(|_| format!("bad field {}", field)))
                .collect::<Result<_, _>>()?;
            let id = values[0];
            let mut rest = values[1..].split(|&value| value == 0);
            let lits = rest.next().ok_or("missing literals")?.to_vec();
            let hints = rest.next().ok_or("missing antecedents")?.to_vec();
            steps.push(Step::Add { id, lits, hints });
        }
    }
    Ok(steps)
}

fn parse_binary_steps(proof: &[u8]) -> Result<Vec<Step>, String> {
    let mut cursor = Cursor::new(proof);
    let mut steps = vec![];
    loop {
        let id = match vbe::read_i64(&mut cursor).map_err(|err| err.to_string())? {
            None => break,
            Some(id) => id,
        };
        let mut marker = [0u8; 1];
        cursor
            .read_exact(&mut marker)
            .map_err(|err| err.to_string())?;
        let read_until_zero = |cursor: &mut Cursor<&[u8]>| -> Result<Vec<i64>, String> {
            let mut values = vec![];
            loop {
                match vbe::read_i64(cursor).map_err(|err| err.to_string())? {
                    Some(0) => return Ok(values),
                    Some(value) => values.push(value),
                    None => return Err("truncated record".to_string()),
                }
            }
        };
        match marker[0] {
            b'a' => {
                let lits = read_until_zero(&mut cursor)?;
                let hints = read_until_zero(&mut cursor)?;
                steps.push(Step::Add { id, lits, hints });
            }
            b'd' => {
                let ids = read_until_zero(&mut cursor)?;
                steps.push(Step::Delete { ids });
            }
            other => return Err(format!("bad record marker {:#x}", other)),
        }
    }
    Ok(steps)
}

/// Check a refutation. Every addition must be an input restatement, a resolution-asymmetric
/// tautology on its first literal, or reverse-unit-propagation derivable from its hints; every
/// deletion must name live clauses. Returns whether the empty clause was derived.
pub fn check_refutation(
    inputs: &[Vec<i64>],
    steps: &[Step],
    format: ProofFormat,
) -> Result<bool, String> {
    let mut db: HashMap<i64, Vec<i64>> = HashMap::new();
    // The LRAT formats leave the input clauses to the CNF file but still number them.
    let inputs_in_proof = !format.is_lrat();
    if !inputs_in_proof {
        for (index, clause) in inputs.iter().enumerate() {
            db.insert(index as i64 + 1, clause.clone());
        }
    }

    let mut last_id = 0;
    let mut derived_empty = false;
    for step in steps {
        match step {
            Step::Add { id, lits, hints } => {
                if *id <= last_id {
                    return Err(format!("clause id {} not monotone", id));
                }
                last_id = *id;
                let ok = if inputs_in_proof && *id <= inputs.len() as i64 && hints.is_empty() {
                    set_equal(lits, &inputs[(*id - 1) as usize])
                } else if !hints.is_empty() && hints.iter().all(|&hint| hint > 0) {
                    rup_check(&db, lits, hints, format.is_lrat())
                } else {
                    rat_check(&db, lits)
                };
                if !ok {
                    return Err(format!("clause {} does not check: {:?}", id, lits));
                }
                if lits.is_empty() {
                    derived_empty = true;
                }
                db.insert(*id, lits.clone());
            }
            Step::Delete { ids } => {
                for id in ids {
                    if db.remove(id).is_none() {
                        return Err(format!("deletion of unknown clause {}", id));
                    }
                }
            }
        }
    }
    Ok(derived_empty)
}

fn set_equal(a: &[i64], b: &[i64]) -> bool {
    a.len() == b.len() && a.iter().all(|lit| b.contains(lit))
}

/// Reverse unit propagation from the negated clause through the hinted antecedents. LRAT hints
/// must propagate in order; tracecheck sorts its antecedents, so propagation saturates instead.
fn rup_check(db: &HashMap<i64, Vec<i64>>, lits: &[i64], hints: &[i64], ordered: bool) -> bool {
    let mut assignment: HashSet<i64> = lits.iter().map(|&lit| -lit).collect();
    let clauses: Option<Vec<&Vec<i64>>> = hints.iter().map(|hint| db.get(hint)).collect();
    let clauses = match clauses {
        None => return false,
        Some(clauses) => clauses,
    };

    if ordered {
        for (index, &clause) in clauses.iter().enumerate() {
            match propagate(clause, &assignment) {
                Propagation::Conflict => return index == clauses.len() - 1,
                Propagation::Unit(lit) => {
                    assignment.insert(lit);
                }
                Propagation::Open => return false,
            }
        }
        false
    } else {
        loop {
            let mut progress = false;
            for &clause in clauses.iter() {
                match propagate(clause, &assignment) {
                    Propagation::Conflict => return true,
                    Propagation::Unit(lit) => {
                        if assignment.insert(lit) {
                            progress = true;
                        }
                    }
                    Propagation::Open => {}
                }
            }
            if !progress {
                return false;
            }
        }
    }
}

enum Propagation {
    Conflict,
    Unit(i64),
    Open,
}

fn propagate(clause: &[i64], assignment: &HashSet<i64>) -> Propagation {
    let mut unassigned = None;
    for &lit in clause {
        if assignment.contains(&lit) {
            // Satisfied clauses propagate nothing.
            return Propagation::Open;
        }
        if !assignment.contains(&-lit) {
            if unassigned.is_some() {
                return Propagation::Open;
            }
            unassigned = Some(lit);
        }
    }
    match unassigned {
        None => Propagation::Conflict,
        Some(lit) => Propagation::Unit(lit),
    }
}

/// Resolution asymmetric tautology on the first literal: every live clause with the negated pivot
/// must resolve to a tautology. Fresh extension variables pass vacuously.
fn rat_check(db: &HashMap<i64, Vec<i64>>, lits: &[i64]) -> bool {
    let pivot = match lits.first() {
        None => return false,
        Some(&pivot) => pivot,
    };
    for clause in db.values() {
        if clause.contains(&-pivot) {
            let tautological = clause
                .iter()
                .any(|&lit| lit != -pivot && lits.contains(&-lit));
            if !tautological {
                return false;
            }
        }
    }
    true
}

pub fn assert_verified(inputs: &[Vec<i64>], result: &RunResult, format: ProofFormat) {
    let steps = parse_steps(&result.proof, format).expect("proof does not parse");
    let refuted = check_refutation(inputs, &steps, format).expect("proof does not check");
    assert!(refuted, "proof never derives the empty clause");
}

/// Pigeonhole: `pigeons` pigeons into `pigeons - 1` holes, at-most-one per hole pairwise.
pub fn pigeonhole(pigeons: usize) -> String {
    let holes = pigeons - 1;
    let var = |pigeon: usize, hole: usize| (pigeon * holes + hole + 1) as i64;
    let mut clauses: Vec<Vec<i64>> = vec![];
    for pigeon in 0..pigeons {
        clauses.push((0..holes).map(|hole| var(pigeon, hole)).collect());
    }
    for hole in 0..holes {
        for pigeon_a in 0..pigeons {
            for pigeon_b in pigeon_a + 1..pigeons {
                clauses.push(vec![-var(pigeon_a, hole), -var(pigeon_b, hole)]);
            }
        }
    }
    render_cnf(pigeons * holes, &clauses)
}

/// Mutilated chessboard: domino tiling of an `n` by `n` board with two opposite corners removed.
/// Returns the CNF together with a column-sweep schedule that conjoins each column's cell
/// constraints and quantifies out edges interior to the processed region.
pub fn mutilated_board(n: usize) -> (String, String) {
    let alive = |row: isize, col: isize| {
        row >= 0
            && col >= 0
            && row < n as isize
            && col < n as isize
            && (row, col) != (0, 0)
            && (row, col) != (n as isize - 1, n as isize - 1)
    };
    // Horizontal edge (row, col)-(row, col + 1); vertical edge (row, col)-(row + 1, col).
    let horizontal_ok = |row: isize, col: isize| alive(row, col) && alive(row, col + 1);
    let vertical_ok = |row: isize, col: isize| alive(row, col) && alive(row + 1, col);

    // Number the edges in column-sweep order so the default variable order matches the schedule.
    let mut ids: HashMap<(char, isize, isize), i64> = HashMap::new();
    let mut next_id = 0;
    for col in 0..n as isize {
        for row in 0..n as isize {
            if col > 0 && horizontal_ok(row, col - 1) {
                next_id += 1;
                ids.insert(('h', row, col - 1), next_id);
            }
            if vertical_ok(row, col) {
                next_id += 1;
                ids.insert(('v', row, col), next_id);
            }
        }
    }

    let mut clauses: Vec<Vec<i64>> = vec![];
    let mut column_clauses: Vec<Vec<usize>> = vec![vec![]; n];
    for col in 0..n as isize {
        for row in 0..n as isize {
            if !alive(row, col) {
                continue;
            }
            let mut incident = vec![];
            for &(kind, edge_row, edge_col) in &[
                ('h', row, col - 1),
                ('h', row, col),
                ('v', row - 1, col),
                ('v', row, col),
            ] {
                if let Some(&id) = ids.get(&(kind, edge_row, edge_col)) {
                    incident.push(id);
                }
            }
            // Exactly one incident domino: at least one, pairwise at most one.
            column_clauses[col as usize].push(clauses.len() + 1);
            clauses.push(incident.clone());
            for a in 0..incident.len() {
                for b in a + 1..incident.len() {
                    column_clauses[col as usize].push(clauses.len() + 1);
                    clauses.push(vec![-incident[a], -incident[b]]);
                }
            }
        }
    }

    let mut schedule = String::new();
    for col in 0..n as isize {
        let members = &column_clauses[col as usize];
        let id_list: Vec<String> = members.iter().map(|id| id.to_string()).collect();
        schedule.push_str(&format!("c {}\n", id_list.join(" ")));
        // The first column starts the running conjunction; later columns join it.
        let count = if col == 0 {
            members.len() - 1
        } else {
            members.len()
        };
        schedule.push_str(&format!("a {}\n", count));
        let mut quantify = vec![];
        for row in 0..n as isize {
            if col > 0 {
                if let Some(&id) = ids.get(&('h', row, col - 1)) {
                    quantify.push(id);
                }
            }
            if let Some(&id) = ids.get(&('v', row, col)) {
                quantify.push(id);
            }
        }
        if !quantify.is_empty() {
            let var_list: Vec<String> = quantify.iter().map(|id| id.to_string()).collect();
            schedule.push_str(&format!("q {}\n", var_list.join(" ")));
        }
    }

    (render_cnf(next_id as usize, &clauses), schedule)
}

fn render_cnf(var_count: usize, clauses: &[Vec<i64>]) -> String {
    let mut out = format!("p cnf {} {}\n", var_count, clauses.len());
    for clause in clauses {
        for lit in clause {
            out.push_str(&lit.to_string());
            out.push(' ');
        }
        out.push_str("0\n");
    }
    out
}
