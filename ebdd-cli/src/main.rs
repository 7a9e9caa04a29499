use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::{anyhow, Context, Error};
use clap::{crate_version, App, AppSettings, Arg};
use log::{info, LevelFilter};

use ebdd::{read_permutation, read_schedule, ProofFormat, Prover, Solver};
use ebdd_dimacs::parse_dimacs;

/// Apply recursion reaches the variable count; run the solver on its own thread with a stack deep
/// enough for instances with tens of thousands of variables.
const SOLVER_STACK_SIZE: usize = 1 << 30;

fn main() {
    let exit_code = match main_with_err() {
        Err(err) => {
            eprintln!("Aborted: {}", err);
            1
        }
        Ok(exit_code) => exit_code,
    };
    std::process::exit(exit_code);
}

struct Options {
    verbosity: u32,
    input: Option<String>,
    output: Option<String>,
    stdout_mode: Option<char>,
    permutation: Option<String>,
    schedule: Option<String>,
    bucket: bool,
    logfile: Option<String>,
}

fn init_logging(verbosity: u32) {
    let level = match verbosity {
        0 => LevelFilter::Error,
        1 | 2 => LevelFilter::Info,
        3 | 4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = env_logger::Builder::new();
    builder.filter(None, level);
    if let Ok(ref env_var) = env::var("EBDD_LOG") {
        builder.parse_filters(env_var);
    }
    builder.init();
}

fn main_with_err() -> Result<i32, Error> {
    let matches = App::new("ebdd")
        .version(crate_version!())
        .about("Proof-generating SAT solver based on BDDs")
        .setting(AppSettings::DisableHelpSubcommand)
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .value_name("LEVEL")
                .default_value("1")
                .help("Verbosity level (0 silent, 1 statistics, 2 summaries, 3 proof steps, 5 tree info)"),
        )
        .arg(
            Arg::with_name("input")
                .short("i")
                .value_name("CNF")
                .help("CNF input file (stdin if omitted)"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .value_name("FILE")
                .help("Proof output file (.proof = tracecheck, .lrat = LRAT text, .lratb = LRAT binary)"),
        )
        .arg(
            Arg::with_name("mode")
                .short("m")
                .value_name("t|b|p")
                .possible_values(&["t", "b", "p"])
                .conflicts_with("output")
                .help("Pipe proof to stdout (t = LRAT text, b = LRAT binary, p = tracecheck)"),
        )
        .arg(
            Arg::with_name("permutation")
                .short("p")
                .value_name("FILE")
                .help("File mapping CNF variables to BDD levels"),
        )
        .arg(
            Arg::with_name("schedule")
                .short("s")
                .value_name("FILE")
                .help("Action schedule file"),
        )
        .arg(
            Arg::with_name("bucket")
                .short("b")
                .conflicts_with("schedule")
                .help("Process terms via bucket elimination"),
        )
        .arg(
            Arg::with_name("logfile")
                .short("L")
                .value_name("FILE")
                .help("Append report output to a log file"),
        )
        .get_matches();

    let verbosity: u32 = matches
        .value_of("verbosity")
        .unwrap_or("1")
        .parse()
        .context("verbosity must be a non-negative integer")?;

    init_logging(verbosity);

    let options = Options {
        verbosity,
        input: matches.value_of("input").map(str::to_string),
        output: matches.value_of("output").map(str::to_string),
        stdout_mode: matches
            .value_of("mode")
            .and_then(|mode| mode.chars().next()),
        permutation: matches.value_of("permutation").map(str::to_string),
        schedule: matches.value_of("schedule").map(str::to_string),
        bucket: matches.is_present("bucket"),
        logfile: matches.value_of("logfile").map(str::to_string),
    };

    let solver_thread = std::thread::Builder::new()
        .name("solver".to_string())
        .stack_size(SOLVER_STACK_SIZE)
        .spawn(move || solve(options))?;
    solver_thread
        .join()
        .map_err(|_| anyhow!("solver thread panicked"))?
}

fn solve(options: Options) -> Result<i32, Error> {
    let permuter = match &options.permutation {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("could not open permutation file '{}'", path))?;
            Some(read_permutation(file)?)
        }
        None => None,
    };
    let schedule = match &options.schedule {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("could not open schedule file '{}'", path))?;
            Some(read_schedule(file)?)
        }
        None => None,
    };

    let (target, format): (Box<dyn Write>, ProofFormat) = match &options.output {
        Some(path) => {
            let format = ProofFormat::from_extension(Path::new(path));
            let file = fs::File::create(path)
                .with_context(|| format!("could not open proof file '{}'", path))?;
            (Box::new(file), format)
        }
        None => {
            let format = match options.stdout_mode {
                Some('t') => ProofFormat::Lrat,
                Some('b') => ProofFormat::BinaryLrat,
                _ => ProofFormat::Tracecheck,
            };
            (Box::new(io::stdout()), format)
        }
    };
    let prover = Prover::new(target, format, options.verbosity);

    let cnf = match &options.input {
        Some(path) => {
            info!("Reading file '{}'", path);
            let file = fs::File::open(path)
                .with_context(|| format!("could not open CNF file '{}'", path))?;
            parse_dimacs(file)?
        }
        None => {
            info!("Reading from stdin");
            let stdin = io::stdin();
            let locked = stdin.lock();
            parse_dimacs(locked)?
        }
    };

    let logger = Logger::new(options.logfile.as_deref())?;

    let start = Instant::now();
    let mut solver = Solver::new(
        &cnf,
        prover,
        permuter,
        options.verbosity,
        Box::new(logger),
    )?;
    if options.bucket {
        solver.run_buckets()?;
    } else if let Some(schedule) = &schedule {
        solver.run_schedule(schedule)?;
    } else {
        solver.run_sequential()?;
    }
    solver.finish()?;

    if options.verbosity >= 1 {
        info!(
            "Elapsed time for SAT: {:.2} seconds",
            start.elapsed().as_secs_f64()
        );
    }
    // SAT and UNSAT alike are normal runs.
    Ok(0)
}

/// Report sink writing to stderr, optionally teeing into an append-mode log file.
struct Logger {
    file: Option<fs::File>,
}

impl Logger {
    fn new(path: Option<&str>) -> Result<Logger, Error> {
        let file = match path {
            Some(path) => Some(
                fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("could not open log file '{}'", path))?,
            ),
            None => None,
        };
        Ok(Logger { file })
    }
}

impl Write for Logger {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = &mut self.file {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = &mut self.file {
            file.flush()?;
        }
        Ok(())
    }
}
