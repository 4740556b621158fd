//! Run a sequence of steps against one worker session.
//!
//! ```text
//! subenv --worker subenv-worker exec 'x = 2' eval 'x * 21'
//! subenv --python python3 call json:dumps '[[1, 2]]'
//! ```

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use subenv::{Session, SessionConfig, logging};

#[derive(Debug, PartialEq)]
enum Step {
    Exec(String),
    Eval(String),
    Get(String),
    Set(String, Value),
    Call {
        target: String,
        args: Value,
        kwargs: Value,
    },
}

#[derive(Debug, PartialEq)]
enum Launcher {
    Python(PathBuf),
    Worker(PathBuf),
}

#[derive(Debug)]
struct Cli {
    launcher: Launcher,
    scratch_dir: Option<PathBuf>,
    verbose: bool,
    steps: Vec<Step>,
}

const USAGE: &str = "\
Usage: subenv [--python <exe> | --worker <program>] [--scratch-dir <dir>] [--verbose] <step>...

Steps:
  exec <code>                          Run statements in the worker namespace
  eval <expr>                          Evaluate an expression and print its value
  get <name>                           Print a bound value
  set <name> <json>                    Bind a value
  call <target> <json-args> [<json-kwargs>]
                                       Call module:attr and print the result

Options:
  --python <exe>       Python interpreter with the subenv module [default: python]
  --worker <program>   Standalone worker program, e.g. subenv-worker
  --scratch-dir <dir>  Directory for scratch files [default: system temp]
  --verbose            Log timings at info level";

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            process::exit(2);
        }
    };

    logging::init_tracing();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let mut launcher = Launcher::Python(PathBuf::from("python"));
    let mut scratch_dir = None;
    let mut verbose = false;
    let mut steps = Vec::new();

    let mut rest = args.iter().skip(1).map(String::as_str).peekable();

    while let Some(arg) = rest.next() {
        match arg {
            "--python" => launcher = Launcher::Python(value(&mut rest, "--python")?.into()),
            "--worker" => launcher = Launcher::Worker(value(&mut rest, "--worker")?.into()),
            "--scratch-dir" => scratch_dir = Some(value(&mut rest, "--scratch-dir")?.into()),
            "--verbose" | "-v" => verbose = true,
            "--help" | "-h" => return Err(String::new()),
            "exec" => steps.push(Step::Exec(value(&mut rest, "exec")?)),
            "eval" => steps.push(Step::Eval(value(&mut rest, "eval")?)),
            "get" => steps.push(Step::Get(value(&mut rest, "get")?)),
            "set" => {
                let name = value(&mut rest, "set")?;
                let json = parse_json(&value(&mut rest, "set <name>")?)?;
                steps.push(Step::Set(name, json));
            }
            "call" => {
                let target = value(&mut rest, "call")?;
                let args = parse_json(&value(&mut rest, "call <target>")?)?;
                let kwargs = match rest.peek() {
                    Some(next) if next.starts_with('{') => parse_json(&value(&mut rest, "call")?)?,
                    _ => Value::Object(Map::new()),
                };
                steps.push(Step::Call {
                    target,
                    args,
                    kwargs,
                });
            }
            flag if flag.starts_with('-') => return Err(format!("unknown flag: {flag}")),
            other => return Err(format!("unknown step: {other}")),
        }
    }

    if steps.is_empty() {
        return Err("no steps given".to_string());
    }

    Ok(Cli {
        launcher,
        scratch_dir,
        verbose,
        steps,
    })
}

fn value<'a>(rest: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<String, String> {
    rest.next()
        .map(str::to_string)
        .ok_or_else(|| format!("{what} requires a value"))
}

fn parse_json(text: &str) -> Result<Value, String> {
    serde_json::from_str(text).map_err(|e| format!("invalid JSON {text:?}: {e}"))
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match cli.launcher {
        Launcher::Python(python) => SessionConfig::python(python),
        Launcher::Worker(program) => SessionConfig::command(program),
    }
    .with_verbose(cli.verbose);
    if let Some(dir) = cli.scratch_dir {
        config = config.with_scratch_dir(dir);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async {
        let mut session = Session::start(config)
            .await
            .context("failed to start worker")?;
        let result = run_steps(&mut session, cli.steps).await;
        session.close().await;
        result
    })
}

async fn run_steps(session: &mut Session, steps: Vec<Step>) -> Result<()> {
    for step in steps {
        let output: Option<Value> = match step {
            Step::Exec(code) => {
                session.exec(&code).await?;
                None
            }
            Step::Eval(expr) => Some(session.eval(&expr).await?),
            Step::Get(name) => Some(session.get(&name).await?),
            Step::Set(name, value) => {
                session.set(&name, &value).await?;
                None
            }
            Step::Call {
                target,
                args,
                kwargs,
            } => {
                if !args.is_array() {
                    bail!("call arguments must be a JSON array, got {args}");
                }
                Some(session.call(&target, &args, &kwargs).await?)
            }
        };
        if let Some(value) = output {
            println!("{value}");
        }
    }
    Ok(())
}
