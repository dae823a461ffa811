use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use framelisp::ast::Value;
use framelisp::evaluator::Environment;
use framelisp::{EvalConfig, Error, Interpreter};

const USAGE: &str = "Usage: framelisp [--max-depth N] [--repl] [FILE]

Evaluates every top-level form of FILE (or standard input) and prints each
result that is not void. Any error stops the program with exit status 1.

Options:
  --max-depth N   maximum nesting of evaluations (default 10000)
  --repl          read and evaluate forms interactively
  -h, --help      show this message";

#[derive(Debug, Default)]
struct Options {
    config: EvalConfig,
    repl: bool,
    file: Option<PathBuf>,
}

enum Command {
    Run(Options),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut options = Options::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "--repl" => options.repl = true,
            "--max-depth" => {
                let raw = args
                    .next()
                    .ok_or_else(|| "--max-depth requires a value".to_owned())?;
                options.config.max_depth = raw
                    .parse()
                    .map_err(|_| format!("invalid --max-depth value: {raw}"))?;
            }
            flag if flag.starts_with('-') && flag != "-" => {
                return Err(format!("unknown option: {flag}"));
            }
            path => {
                if options.file.is_some() {
                    return Err(format!("unexpected extra argument: {path}"));
                }
                options.file = Some(PathBuf::from(path));
            }
        }
    }

    Ok(Command::Run(options))
}

/// Install a stderr subscriber, only when RUST_LOG asks for one
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        let filter = EnvFilter::from_default_env();
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .with(filter)
            .init();
    }
}

fn read_source(file: Option<&PathBuf>) -> Result<String, Error> {
    match file {
        Some(path) if path.as_os_str() != "-" => Ok(std::fs::read_to_string(path)?),
        _ => {
            let mut source = String::new();
            io::stdin().read_to_string(&mut source)?;
            Ok(source)
        }
    }
}

fn run(options: &Options) -> Result<(), Error> {
    let interpreter = Interpreter::new(options.config);
    tracing::debug!(
        max_depth = interpreter.evaluator().config().max_depth,
        repl = options.repl,
        "starting interpreter"
    );

    if options.repl {
        return run_repl(&interpreter);
    }

    let source = read_source(options.file.as_ref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = interpreter.run_source(&source, &mut out);
    out.flush()?;
    result
}

#[cfg(feature = "repl")]
fn run_repl(interpreter: &Interpreter) -> Result<(), Error> {
    use framelisp::ParseErrorKind;
    use framelisp::scheme::parse_program;
    use rustyline::DefaultEditor;
    use rustyline::error::ReadlineError;

    println!(
        "framelisp (max depth {}) - type :env to list bindings, :quit or Ctrl+D to exit.",
        interpreter.evaluator().config().max_depth
    );

    let mut rl = DefaultEditor::new().map_err(|e| Error::Io(e.to_string()))?;
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { "framelisp> " } else { "      ...> " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Eof | ReadlineError::Interrupted) => return Ok(()),
            Err(err) => return Err(Error::Io(err.to_string())),
        };

        if pending.is_empty() {
            match line.trim() {
                "" => continue,
                ":env" => {
                    print_environment(interpreter.env());
                    continue;
                }
                ":quit" | ":exit" => return Ok(()),
                _ => {}
            }
        }

        let _ = rl.add_history_entry(line.as_str());
        pending.push_str(&line);
        pending.push('\n');

        let forms = match parse_program(&pending) {
            Ok(forms) => forms,
            // Keep reading until the form is closed
            Err(Error::ParseError(err)) if err.kind == ParseErrorKind::Incomplete => continue,
            Err(err) => return Err(err),
        };
        pending.clear();

        let stdout = io::stdout();
        let mut out = stdout.lock();
        interpreter.run_forms(&forms, &mut out)?;
        out.flush()?;
    }
}

#[cfg(not(feature = "repl"))]
fn run_repl(_interpreter: &Interpreter) -> Result<(), Error> {
    Err(Error::EvalError(
        "interactive mode requires the `repl` feature".to_owned(),
    ))
}

#[cfg_attr(not(feature = "repl"), expect(dead_code))]
fn print_environment(env: &Environment) {
    let mut primitives = Vec::new();
    let mut user_defined = Vec::new();

    for (name, value) in env.get_all_bindings() {
        match value {
            Value::Primitive { .. } => primitives.push(name),
            _ => user_defined.push((name, value)),
        }
    }

    println!("Primitives ({}): {}", primitives.len(), primitives.join(" "));
    if !user_defined.is_empty() {
        println!("User-defined values ({}):", user_defined.len());
        for (name, value) in user_defined {
            println!("  {name} = {value}");
        }
    }
}

fn main() -> ExitCode {
    let command = match parse_args(std::env::args().skip(1)) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("Error: {msg}\n\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    let options = match command {
        Command::Help => {
            println!("{USAGE}");
            return ExitCode::SUCCESS;
        }
        Command::Run(options) => options,
    };

    init_tracing();

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, String> {
        parse_args(args.iter().map(|s| (*s).to_owned()))
    }

    #[test]
    fn test_parse_args() {
        match parse(&[]) {
            Ok(Command::Run(options)) => {
                assert!(!options.repl);
                assert!(options.file.is_none());
                assert_eq!(options.config, EvalConfig::default());
            }
            _ => panic!("expected default options"),
        }

        match parse(&["--max-depth", "50", "prog.scm"]) {
            Ok(Command::Run(options)) => {
                assert_eq!(options.config.max_depth, 50);
                assert_eq!(options.file, Some(PathBuf::from("prog.scm")));
            }
            _ => panic!("expected max depth and file"),
        }

        assert!(matches!(parse(&["--repl"]), Ok(Command::Run(Options { repl: true, .. }))));
        assert!(matches!(parse(&["--help"]), Ok(Command::Help)));
        assert!(parse(&["--max-depth"]).is_err());
        assert!(parse(&["--max-depth", "lots"]).is_err());
        assert!(parse(&["--verbose"]).is_err());
        assert!(parse(&["a.scm", "b.scm"]).is_err());
    }
}
