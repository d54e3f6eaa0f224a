use anyhow::{Context, Result};
use clap::Parser;
use gopkgdriver::builder::{self, Archive, PackageBuilder, PackageInputs, TestFilter};
use gopkgdriver::cli::{self, BuilderArgs, BuilderCommand, PkgArgs, StdlibArgs};
use gopkgdriver::config::Config;
use gopkgdriver::constraint::BuildContext;
use gopkgdriver::error::DriverError;
use gopkgdriver::logging;
use gopkgdriver::util;
use std::env;
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("gopkg: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args_os()
        .map(|arg| arg.to_string_lossy().to_string())
        .collect();
    let args = util::expand_params_files(args).context("expand params files")?;
    let args = BuilderArgs::parse_from(cli::normalize_go_flags(args, cli::BUILDER_FLAGS));
    match args.command {
        BuilderCommand::Pkg(pkg) => run_pkg(pkg),
        BuilderCommand::Stdlib(stdlib) => run_stdlib(stdlib),
    }
}

fn required<T>(value: Option<T>, flag: &str) -> Result<T> {
    value.ok_or_else(|| DriverError::input(format!("-{flag} not set")).into())
}

fn run_pkg(args: PkgArgs) -> Result<()> {
    let id = required(args.id, "id")?;
    let import_path = required(args.importpath, "importpath")?;
    let import_map = required(args.importmap, "importmap")?;
    let output = required(args.output, "o")?;
    let test_filter: TestFilter = args.testfilter.parse()?;
    let archives = args
        .archives
        .iter()
        .map(|arc| arc.parse::<Archive>())
        .collect::<Result<Vec<_>, _>>()?;

    let inputs = PackageInputs {
        id,
        import_path,
        import_map,
        export_file: args.export_file,
        go_srcs: args.go_srcs,
        other_srcs: args.other_srcs,
        orig_srcs: args.orig_srcs,
        test_filter,
        archives,
    };
    let ctx = BuildContext::from_env().with_tags(&args.tags);
    let mut builder = PackageBuilder::new(ctx, Config::get().stdlib_id_prefix())?;
    builder
        .build_to(&inputs, &output)
        .with_context(|| format!("build package descriptor for {}", inputs.id))?;
    Ok(())
}

fn run_stdlib(args: StdlibArgs) -> Result<()> {
    let go = required(args.go, "go")?;
    let output = required(args.output, "o")?;
    builder::build_stdlib_packages(&go, &output, &Config::get().stdlib_id_prefix())?;
    Ok(())
}
