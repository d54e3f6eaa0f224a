use anyhow::{Context, Result};
use clap::Parser;
use gopkgdriver::cli::{self, DriverArgs, DriverCommand};
use gopkgdriver::config::Config;
use gopkgdriver::driver::{self, ListOptions};
use gopkgdriver::error::DriverError;
use gopkgdriver::harvest::Facets;
use gopkgdriver::logging;
use gopkgdriver::schema::{DriverRequest, DriverResponse};
use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    logging::init();
    let args = cli::normalize_go_flags(
        env::args_os().map(|arg| arg.to_string_lossy().to_string()),
        cli::DRIVER_FLAGS,
    );
    let args = DriverArgs::parse_from(args);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("gopackagesdriver: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: DriverArgs) -> Result<()> {
    let config = Config::get();
    let cwd = env::current_dir().context("get working directory")?;
    let response = match args.command {
        Some(DriverCommand::List(list)) => {
            let opts = ListOptions {
                facets: Facets {
                    deps: list.deps,
                    export: list.export,
                    tests: list.test,
                },
                build_flags: list.build_flags,
                env: Vec::new(),
                goarch: driver::default_goarch(),
            };
            driver::list(config, &cwd, &opts, &list.patterns)?
        }
        None => {
            let request: DriverRequest = serde_json::from_reader(io::stdin().lock())
                .map_err(|err| DriverError::input(format!("unable to read request: {err}")))?;
            driver::run_request(config, &cwd, &request, &args.patterns)?
        }
    };
    write_response(&response)
}

fn write_response(response: &DriverResponse) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, response).context("encode response")?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}
