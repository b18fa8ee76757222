//! evopkg CLI
//!
//! Type package commands in any package manager's grammar and run them on
//! whichever package manager this host actually has.

use clap::Parser;
use color_eyre::Result;
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use evopkg_core::{
    CoreError, EXIT_EVOPKG_FAILURE, EXIT_INTERRUPTED, EXIT_OK, Engine, EvopkgConfig,
};
use evopkg_exec::Interrupt;
use evopkg_pkg::{DetectedEnvironment, PackageError, syntax_for_program};

mod cli;
mod render;

use cli::{AliasCommand, Cli, Commands, RunArgs};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_args();

    let config = match &cli.config {
        Some(path) => EvopkgConfig::load(path),
        None => EvopkgConfig::load_default(),
    };
    let log_level = config.as_ref().map_or("warn", |c| c.log_level.as_str());
    init_tracing(cli.verbose, cli.log_json, log_level);

    let outcome = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    let code = match outcome {
        Ok(code) => code,
        Err(report) => match report.downcast_ref::<CoreError>() {
            Some(err) => {
                eprintln!("evopkg: {err}");
                err.exit_code()
            }
            None => {
                eprintln!("{report:?}");
                EXIT_EVOPKG_FAILURE
            }
        },
    };
    std::process::exit(code)
}

/// Parse arguments, treating a binary named after a backend as `run --syntax`
fn parse_args() -> Cli {
    let mut argv = std::env::args();
    let program = argv.next().unwrap_or_default();
    match syntax_for_program(&program) {
        Some(syntax) => Cli {
            config: None,
            json: false,
            verbose: 0,
            log_json: false,
            command: Commands::Run(RunArgs {
                syntax: Some(syntax),
                backend: None,
                dry_run: false,
                argv: argv.collect(),
            }),
        },
        None => Cli::parse(),
    }
}

fn init_tracing(verbose: u8, json: bool, configured: &str) {
    let fallback = match verbose {
        0 => configured,
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Trigger `interrupt` on Ctrl-C
fn watch_ctrl_c(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping package manager commands");
            interrupt.trigger();
        }
    });
}

async fn run(cli: Cli, config: EvopkgConfig) -> Result<i32> {
    let interrupt = Interrupt::new();
    watch_ctrl_c(interrupt.clone());
    let engine = Engine::from_config(config, interrupt.clone());

    match dispatch(&engine, cli).await {
        // Whatever failed after Ctrl-C failed because of it.
        Err(report) if interrupt.is_triggered() => {
            eprintln!("evopkg: {report}");
            Ok(EXIT_INTERRUPTED)
        }
        Ok(EXIT_OK) if interrupt.is_triggered() => Ok(EXIT_INTERRUPTED),
        outcome => outcome,
    }
}

async fn dispatch(engine: &Engine, cli: Cli) -> Result<i32> {
    let json = cli.json;

    match cli.command {
        Commands::Detect => {
            let env = engine.environment();
            emit(json, env, render::environment)?;
            let status = detect_status(env);
            if status != EXIT_OK {
                return Ok(status);
            }
        }
        Commands::Run(args) => run_verb(engine, args, json).await?,
        Commands::Compare(args) => {
            let rows = engine
                .compare(&args.packages, &args.backends, args.refresh)
                .await?;
            emit(json, &rows, |rows| render::comparison(rows))?;
        }
        Commands::Locate(args) => {
            let locations = engine.locate(&args.packages, &args.backends).await?;
            emit(json, &locations, |locations| render::locations(locations))?;
        }
        Commands::Alias(command) => alias(engine, command, json)?,
        Commands::Shim { name, args } => {
            let result = engine.run_alias(&name, &args).await?;
            print!("{}", result.stdout);
        }
    }

    Ok(EXIT_OK)
}

/// Exit status for `detect`: an empty host is a failure, not a result
fn detect_status(env: &DetectedEnvironment) -> i32 {
    match env.require_native() {
        Ok(_) => EXIT_OK,
        Err(e) => CoreError::from(e).exit_code(),
    }
}

async fn run_verb(engine: &Engine, args: RunArgs, json: bool) -> Result<()> {
    let syntax = match args.syntax {
        Some(syntax) => syntax,
        None => engine
            .environment()
            .require_native()
            .map_err(CoreError::from)?,
    };
    let (verb, rest) = args.argv.split_first().ok_or_else(|| {
        CoreError::from(PackageError::UnknownVerb {
            syntax,
            verb: String::new(),
        })
    })?;

    let invocation = engine.prepare(syntax, verb, rest, args.backend).await?;
    if args.dry_run {
        return emit(json, &invocation, render::invocation);
    }

    let result = engine.run(&invocation.command).await?;
    if json {
        print_json(&serde_json::json!({
            "invocation": invocation,
            "result": result,
        }))?;
    } else {
        print!("{}", result.stdout);
    }
    Ok(())
}

fn alias(engine: &Engine, command: AliasCommand, json: bool) -> Result<()> {
    match command {
        AliasCommand::Create { name, syntax } => {
            let alias = engine.create_alias(&name, syntax)?;
            emit(json, &alias, render::alias)?;
        }
        AliasCommand::Simulate { syntax } => {
            let alias = engine.install_simulator(syntax)?;
            emit(json, &alias, render::alias)?;
        }
        AliasCommand::Remove { name } => {
            let removed = engine.remove_alias(&name)?;
            if json {
                print_json(&serde_json::json!({ "name": name, "removed": removed }))?;
            } else if removed {
                println!("removed {name}");
            } else {
                println!("no alias named {name}");
            }
        }
        AliasCommand::List => {
            let aliases = engine.list_aliases()?;
            emit(json, &aliases, |aliases| render::aliases(aliases))?;
        }
        AliasCommand::Show { name } => {
            let alias = engine.aliases().lookup(&name)?;
            emit(json, &alias, render::alias)?;
        }
    }
    Ok(())
}

/// Print `value` as JSON or through its plain renderer
fn emit<T: Serialize + ?Sized>(json: bool, value: &T, plain: impl Fn(&T) -> String) -> Result<()> {
    if json {
        print_json(value)
    } else {
        print!("{}", plain(value));
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use evopkg_pkg::BackendKind;

    use super::*;

    #[test]
    fn test_detect_on_empty_host_fails() {
        assert_eq!(
            detect_status(&DetectedEnvironment::default()),
            EXIT_EVOPKG_FAILURE
        );
    }

    #[test]
    fn test_detect_with_backend_succeeds() {
        let env = DetectedEnvironment::with_backends(&[BackendKind::Pacman]);
        assert_eq!(detect_status(&env), EXIT_OK);
    }
}
