//! Logkit CLI - run logkit command scripts
//!
//! Usage:
//!   logkit -c ':echo hello'           # Execute command strings
//!   logkit script.lks arg1 arg2       # Execute a script file
//!   logkit -D name=value script.lks   # Seed override variables

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;

use logkit::{execute_file, execute_init_commands, CommandRegistry, ExecContext};

/// Logkit - log analysis command core
#[derive(Parser, Debug)]
#[command(name = "logkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Execute the given command string (may be repeated)
    #[arg(short = 'c', value_name = "CMD")]
    commands: Vec<String>,

    /// Seed an override variable; takes precedence over script variables
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    define: Vec<String>,

    /// Validate statements and describe side effects without performing them
    #[arg(long)]
    dry_run: bool,

    /// Script file to execute
    #[arg()]
    script: Option<PathBuf>,

    /// Arguments to pass to the script
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut builder = ExecContext::builder().dry_run(args.dry_run);
    for def in &args.define {
        let (name, value) = def
            .split_once('=')
            .with_context(|| format!("invalid -D flag '{def}': expected NAME=VALUE"))?;
        builder = builder.override_var(name, value);
    }
    let mut ec = builder.build();
    let registry = CommandRegistry::with_defaults();

    // Command strings run as a startup batch.
    if !args.commands.is_empty() {
        let msgs = execute_init_commands(&registry, &mut ec, &args.commands).await;
        ec.resolve_pipes().await;

        let mut failed = false;
        for (result, alt_msg) in msgs {
            match result {
                Ok(out) if !out.is_empty() => println!("{out}"),
                Ok(_) if !alt_msg.is_empty() => println!("{alt_msg}"),
                Ok(_) => {}
                Err(e) => {
                    eprintln!("{e}");
                    failed = true;
                }
            }
        }
        if failed {
            std::process::exit(1);
        }
        return Ok(());
    }

    // Script file with trailing arguments as positionals.
    let Some(script) = args.script else {
        bail!("no command string or script given (try --help)");
    };

    let mut path_and_args = script.to_string_lossy().into_owned();
    for arg in &args.args {
        path_and_args.push(' ');
        path_and_args.push_str(arg);
    }

    match execute_file(&registry, &mut ec, &path_and_args, true).await {
        Ok(_) => {
            ec.resolve_pipes().await;
            if !ec.accumulator.is_empty() {
                println!("{}", ec.accumulator);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
