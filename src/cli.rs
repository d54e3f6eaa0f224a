use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "gopackagesdriver",
    version,
    about = "go/packages driver for Bazel workspaces",
    args_conflicts_with_subcommands = true,
    after_help = r#"Without a subcommand the go/packages request is read from stdin.

Examples:
  echo '{"mode":8}' | gopackagesdriver ./...
  gopackagesdriver list -deps -buildflag=--config=ci -- //foo/...
  GOPACKAGESDRIVER_LOG=debug gopackagesdriver file=foo/bar.go < request.json
"#
)]
pub struct DriverArgs {
    #[command(subcommand)]
    pub command: Option<DriverCommand>,
    /// Patterns to resolve: labels, `file=<path>`, `pattern=<p>` or `std`.
    pub patterns: Vec<String>,
}

#[derive(Subcommand)]
pub enum DriverCommand {
    /// List packages without reading a request.
    List(ListArgs),
}

#[derive(Args)]
pub struct ListArgs {
    /// Include test variants.
    #[arg(long)]
    pub test: bool,
    /// Include export data.
    #[arg(long)]
    pub export: bool,
    /// Include transitive dependencies.
    #[arg(long)]
    pub deps: bool,
    /// Extra build tool flag; repeatable.
    #[arg(long = "buildflag", value_name = "FLAG", allow_hyphen_values = true)]
    pub build_flags: Vec<String>,
    #[arg(last = true)]
    pub patterns: Vec<String>,
}

/// Long flags `list` accepts in go-style single-dash form.
pub const DRIVER_FLAGS: &[&str] = &["test", "export", "deps", "buildflag", "help"];

#[derive(Parser)]
#[command(
    name = "gopkg",
    version,
    about = "Writes package descriptors for the go/packages driver",
    after_help = r#"Arguments of the form @file are read from a params file, one per line.

Examples:
  gopkg pkg -id //foo:foo -importpath example.com/foo -importmap example.com/foo \
    -go_src foo/a.go -arc //bar:bar=example.com/bar=example.com/bar=bar.a -o foo.json
  gopkg stdlib -go external/go_sdk/bin/go -o stdlib
"#
)]
pub struct BuilderArgs {
    #[command(subcommand)]
    pub command: BuilderCommand,
}

#[derive(Subcommand)]
pub enum BuilderCommand {
    /// Describe one compilation unit.
    Pkg(PkgArgs),
    /// Describe every standard library package.
    Stdlib(StdlibArgs),
}

#[derive(Args)]
pub struct PkgArgs {
    /// Label of the unit.
    #[arg(long)]
    pub id: Option<String>,
    #[arg(long)]
    pub importpath: Option<String>,
    /// Import path after vendoring and import map rewrites.
    #[arg(long)]
    pub importmap: Option<String>,
    /// Export data file.
    #[arg(long = "file")]
    pub export_file: Option<String>,
    /// Compiled source; repeatable.
    #[arg(long = "go_src")]
    pub go_srcs: Vec<PathBuf>,
    /// Non-Go source; repeatable.
    #[arg(long = "other_src")]
    pub other_srcs: Vec<PathBuf>,
    /// Source before preprocessing; repeatable.
    #[arg(long = "orig_src")]
    pub orig_srcs: Vec<PathBuf>,
    /// off, only or exclude.
    #[arg(long, default_value = "off")]
    pub testfilter: String,
    /// Direct dependency as `label=importpath=importmap=file`; repeatable.
    #[arg(long = "arc")]
    pub archives: Vec<String>,
    /// Build tags, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub tags: Vec<String>,
    /// Output file.
    #[arg(short = 'o')]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct StdlibArgs {
    /// go binary.
    #[arg(long)]
    pub go: Option<PathBuf>,
    /// Output directory.
    #[arg(short = 'o')]
    pub output: Option<PathBuf>,
}

/// Long flags `gopkg` accepts in go-style single-dash form.
pub const BUILDER_FLAGS: &[&str] = &[
    "id",
    "importpath",
    "importmap",
    "file",
    "go_src",
    "other_src",
    "orig_src",
    "testfilter",
    "arc",
    "tags",
    "go",
    "help",
];

/// Rewrites go-style `-flag[=value]` arguments to `--flag[=value]` for the
/// names in `known`. Arguments after `--` are left alone.
pub fn normalize_go_flags<I>(args: I, known: &[&str]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut out = Vec::new();
    let mut passthrough = false;
    for arg in args {
        if passthrough || arg == "--" {
            passthrough = true;
            out.push(arg);
            continue;
        }
        let rewritten = arg
            .strip_prefix('-')
            .filter(|rest| !rest.starts_with('-'))
            .filter(|rest| {
                let name = rest.split_once('=').map_or(*rest, |(name, _)| name);
                known.contains(&name)
            })
            .map(|rest| format!("--{rest}"));
        out.push(rewritten.unwrap_or(arg));
    }
    out
}
