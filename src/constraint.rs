//! Build constraint evaluation, following the go/build rules.
//!
//! A file matches a target environment when its name passes the
//! `_GOOS`/`_GOARCH` suffix convention and its header constraints
//! (`//go:build` or, failing that, every `// +build` line) hold.

use anyhow::{Result, bail};
use std::env;

pub const KNOWN_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "js", "linux",
    "nacl", "netbsd", "openbsd", "plan9", "solaris", "wasip1", "windows", "zos",
];

pub const KNOWN_ARCH: &[&str] = &[
    "386", "amd64", "amd64p32", "arm", "armbe", "arm64", "arm64be", "loong64", "mips", "mipsle",
    "mips64", "mips64le", "mips64p32", "mips64p32le", "ppc", "ppc64", "ppc64le", "riscv",
    "riscv64", "s390", "s390x", "sparc", "sparc64", "wasm",
];

const UNIX_OS: &[&str] = &[
    "aix", "android", "darwin", "dragonfly", "freebsd", "hurd", "illumos", "ios", "linux",
    "netbsd", "openbsd", "solaris",
];

/// Latest `go1.N` release tag enabled by default.
const LATEST_GO_MINOR: u32 = 22;

/// The environment constraints are evaluated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub goos: String,
    pub goarch: String,
    pub cgo_enabled: bool,
    pub compiler: String,
    pub build_tags: Vec<String>,
    pub release_tags: Vec<String>,
}

impl Default for BuildContext {
    fn default() -> Self {
        Self {
            goos: host_goos().to_string(),
            goarch: host_goarch().to_string(),
            cgo_enabled: false,
            compiler: "gc".to_string(),
            build_tags: Vec::new(),
            release_tags: (1..=LATEST_GO_MINOR).map(|minor| format!("go1.{minor}")).collect(),
        }
    }
}

impl BuildContext {
    /// Reads `GOOS`, `GOARCH` and `CGO_ENABLED`, defaulting to the host.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut ctx = Self::default();
        if let Some(goos) = lookup("GOOS").filter(|v| !v.is_empty()) {
            ctx.goos = goos;
        }
        if let Some(goarch) = lookup("GOARCH").filter(|v| !v.is_empty()) {
            ctx.goarch = goarch;
        }
        ctx.cgo_enabled = match lookup("CGO_ENABLED").as_deref() {
            Some("1") => true,
            Some("0") => false,
            // go/build enables cgo by default for native builds.
            _ => ctx.goos == host_goos() && ctx.goarch == host_goarch(),
        };
        ctx
    }

    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.build_tags
            .extend(tags.iter().map(|tag| tag.as_ref().to_string()));
        self
    }

    /// Whether a single tag holds in this environment.
    pub fn match_tag(&self, tag: &str) -> bool {
        if tag == "cgo" {
            return self.cgo_enabled;
        }
        if tag == self.goos || tag == self.goarch || tag == self.compiler {
            return true;
        }
        match (self.goos.as_str(), tag) {
            ("android", "linux") | ("illumos", "solaris") | ("ios", "darwin") => return true,
            _ => {}
        }
        if tag == "unix" && UNIX_OS.contains(&self.goos.as_str()) {
            return true;
        }
        self.build_tags.iter().any(|t| t == tag) || self.release_tags.iter().any(|t| t == tag)
    }
}

fn host_goos() -> &'static str {
    match env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

fn host_goarch() -> &'static str {
    match env::consts::ARCH {
        "x86_64" => "amd64",
        "x86" => "386",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "loongarch64" => "loong64",
        other => other,
    }
}

/// Source extensions go/build considers at all.
pub const KNOWN_EXTENSIONS: &[&str] = &[
    "go", "c", "cc", "cxx", "cpp", "m", "s", "S", "sx", "h", "hh", "hpp", "hxx", "f", "F", "f90",
    "swig", "swigcxx", "syso",
];

/// Whether the file name is buildable: a known extension, not hidden, and
/// any `_GOOS`, `_GOARCH` or `_GOOS_GOARCH` suffix matches.
pub fn match_file_name(ctx: &BuildContext, name: &str) -> bool {
    if name.starts_with('_') || name.starts_with('.') {
        return false;
    }
    match name.rsplit_once('.') {
        Some((_, ext)) if KNOWN_EXTENSIONS.contains(&ext) => {}
        _ => return false,
    }
    let stem = name.split('.').next().unwrap_or(name);
    let Some(i) = stem.find('_') else {
        return true;
    };
    let mut parts: Vec<&str> = stem[i..].split('_').collect();
    if parts.last() == Some(&"test") {
        parts.pop();
    }
    let n = parts.len();
    if n >= 2 && KNOWN_OS.contains(&parts[n - 2]) && KNOWN_ARCH.contains(&parts[n - 1]) {
        return ctx.match_tag(parts[n - 2]) && ctx.match_tag(parts[n - 1]);
    }
    if n >= 1 && (KNOWN_OS.contains(&parts[n - 1]) || KNOWN_ARCH.contains(&parts[n - 1])) {
        return ctx.match_tag(parts[n - 1]);
    }
    true
}

/// Constraint lines found in a file header.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HeaderConstraints {
    pub go_build: Option<String>,
    pub plus_build: Vec<String>,
}

/// Collects `//go:build` and `// +build` lines from the leading comments.
/// A `//go:build` line counts anywhere in the leading comments outside
/// `/* */` blocks. `// +build` lines only count before the last blank line
/// that precedes the first non-comment line; later ones belong to the
/// package doc comment.
pub fn scan_header(source: &str) -> Result<HeaderConstraints> {
    let lines: Vec<&str> = source.lines().collect();
    let mut header = HeaderConstraints::default();
    let mut end = 0;
    let mut in_block = false;
    for (i, line) in lines.iter().enumerate() {
        let mut line = line.trim();
        if in_block {
            match line.find("*/") {
                Some(pos) => {
                    in_block = false;
                    line = line[pos + 2..].trim();
                }
                None => continue,
            }
        }
        if line.is_empty() {
            end = i;
            continue;
        }
        if let Some(comment) = line.strip_prefix("//") {
            if let Some(expr) = directive(comment, "go:build") {
                if header.go_build.is_some() {
                    bail!("multiple //go:build comments");
                }
                header.go_build = Some(expr.to_string());
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("/*") {
            match rest.find("*/") {
                Some(pos) if rest[pos + 2..].trim().is_empty() => continue,
                Some(_) => break,
                None => {
                    in_block = true;
                    continue;
                }
            }
        }
        break;
    }

    in_block = false;
    for line in &lines[..end] {
        let line = line.trim();
        if in_block {
            if line.contains("*/") {
                in_block = false;
            }
            continue;
        }
        if line.starts_with("/*") {
            in_block = !line[2..].contains("*/");
            continue;
        }
        if let Some(comment) = line.strip_prefix("//")
            && let Some(expr) = directive(comment.trim_start(), "+build")
        {
            header.plus_build.push(expr.to_string());
        }
    }
    Ok(header)
}

fn directive<'a>(comment: &'a str, name: &str) -> Option<&'a str> {
    let rest = comment.strip_prefix(name)?;
    if rest.is_empty() {
        return Some(rest);
    }
    if rest.starts_with([' ', '\t']) {
        return Some(rest.trim());
    }
    None
}

impl HeaderConstraints {
    pub fn is_empty(&self) -> bool {
        self.go_build.is_none() && self.plus_build.is_empty()
    }

    pub fn eval(&self, ctx: &BuildContext) -> Result<bool> {
        if let Some(expr) = &self.go_build {
            return Ok(parse_expr(expr)?.eval(ctx));
        }
        Ok(self
            .plus_build
            .iter()
            .all(|line| eval_plus_build(ctx, line)))
    }
}

/// `// +build` syntax: space-separated alternatives of comma-separated
/// terms, each optionally negated once.
pub fn eval_plus_build(ctx: &BuildContext, line: &str) -> bool {
    line.split_whitespace().any(|alternative| {
        alternative.split(',').all(|term| match term.strip_prefix('!') {
            Some(tag) => valid_tag(tag) && !ctx.match_tag(tag),
            None => valid_tag(term) && ctx.match_tag(term),
        })
    })
}

fn valid_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

/// A parsed `//go:build` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Tag(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn eval(&self, ctx: &BuildContext) -> bool {
        match self {
            Expr::Tag(tag) => ctx.match_tag(tag),
            Expr::Not(inner) => !inner.eval(ctx),
            Expr::And(a, b) => a.eval(ctx) && b.eval(ctx),
            Expr::Or(a, b) => a.eval(ctx) || b.eval(ctx),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Tag(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = expr.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            ' ' | '\t' => {}
            '!' => tokens.push(Token::Not),
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '&' | '|' => {
                if chars.next_if(|&(_, next)| next == c).is_none() {
                    bail!("invalid syntax at {c:?} in build constraint {expr:?}");
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' => {
                let mut end = i + c.len_utf8();
                while let Some(&(j, next)) = chars.peek() {
                    if !(next.is_alphanumeric() || next == '_' || next == '.') {
                        break;
                    }
                    end = j + next.len_utf8();
                    chars.next();
                }
                tokens.push(Token::Tag(expr[i..end].to_string()));
            }
            other => bail!("unexpected {other:?} in build constraint {expr:?}"),
        }
    }
    Ok(tokens)
}

/// Parses a `//go:build` expression. `||` binds looser than `&&`, which
/// binds looser than `!`.
pub fn parse_expr(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    let mut parser = ExprParser {
        tokens: &tokens,
        pos: 0,
        source: expr,
    };
    let parsed = parser.or()?;
    if parser.pos != tokens.len() {
        bail!("unexpected token in build constraint {expr:?}");
    }
    Ok(parsed)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn or(&mut self) -> Result<Expr> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr> {
        let mut left = self.not()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expr> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr> {
        let token = self.peek().cloned();
        self.pos += 1;
        match token {
            Some(Token::Tag(tag)) => Ok(Expr::Tag(tag)),
            Some(Token::Open) => {
                let inner = self.or()?;
                if self.peek() != Some(&Token::Close) {
                    bail!("missing ')' in build constraint {:?}", self.source);
                }
                self.pos += 1;
                Ok(inner)
            }
            _ => bail!("expected tag in build constraint {:?}", self.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_amd64() -> BuildContext {
        BuildContext {
            goos: "linux".to_string(),
            goarch: "amd64".to_string(),
            cgo_enabled: true,
            ..BuildContext::default()
        }
    }

    #[test]
    fn file_name_suffixes() {
        let ctx = linux_amd64();
        assert!(match_file_name(&ctx, "foo.go"));
        assert!(match_file_name(&ctx, "foo_linux.go"));
        assert!(match_file_name(&ctx, "foo_linux_amd64_test.go"));
        assert!(match_file_name(&ctx, "foo_amd64.s"));
        assert!(!match_file_name(&ctx, "foo_windows.go"));
        assert!(!match_file_name(&ctx, "foo_linux_arm64.go"));
        assert!(!match_file_name(&ctx, "foo_darwin_test.go"));
        assert!(match_file_name(&ctx, "foo_bar.go"));
        assert!(match_file_name(&ctx, "linux.go"));
        assert!(!match_file_name(&ctx, "_hidden.go"));
        assert!(!match_file_name(&ctx, ".hidden.go"));
        assert!(match_file_name(&ctx, "gen.pb.go"));
        assert!(match_file_name(&ctx, "trampoline.S"));
        assert!(match_file_name(&ctx, "blob_amd64.syso"));
        assert!(!match_file_name(&ctx, "README.txt"));
        assert!(!match_file_name(&ctx, "notes.md"));
        assert!(!match_file_name(&ctx, "Makefile"));
    }

    #[test]
    fn special_os_aliases() {
        let android = BuildContext {
            goos: "android".to_string(),
            ..linux_amd64()
        };
        assert!(android.match_tag("linux"));
        assert!(android.match_tag("unix"));
        assert!(!linux_amd64().match_tag("android"));
        let windows = BuildContext {
            goos: "windows".to_string(),
            ..linux_amd64()
        };
        assert!(!windows.match_tag("unix"));
    }

    #[test]
    fn go_build_expressions() {
        let ctx = linux_amd64().with_tags(&["integration"]);
        let eval = |expr: &str| parse_expr(expr).unwrap().eval(&ctx);
        assert!(eval("linux"));
        assert!(eval("linux && amd64"));
        assert!(eval("!windows && (darwin || linux)"));
        assert!(!eval("linux && !cgo"));
        assert!(eval("integration"));
        assert!(eval("go1.18"));
        assert!(!eval("go1.99"));
        assert!(!eval("ignore"));
        assert!(eval("windows || amd64 && linux"));
        assert!(!eval("!(linux)"));
    }

    #[test]
    fn malformed_expressions_fail() {
        assert!(parse_expr("linux &&").is_err());
        assert!(parse_expr("linux & amd64").is_err());
        assert!(parse_expr("(linux").is_err());
        assert!(parse_expr("linux)").is_err());
        assert!(parse_expr("").is_err());
    }

    #[test]
    fn plus_build_lines() {
        let ctx = linux_amd64();
        assert!(eval_plus_build(&ctx, "linux,amd64 darwin"));
        assert!(eval_plus_build(&ctx, "!windows"));
        assert!(!eval_plus_build(&ctx, "!linux"));
        assert!(!eval_plus_build(&ctx, "!!linux"));
        assert!(!eval_plus_build(&ctx, "linux,!cgo"));
    }

    #[test]
    fn header_stops_at_package_doc_comment() {
        let source = "// Copyright\n\n//go:build linux\n\n// +build linux\n\n// Package foo does things.\n// +build ignore\npackage foo\n";
        let header = scan_header(source).unwrap();
        assert_eq!(header.go_build.as_deref(), Some("linux"));
        assert_eq!(header.plus_build, vec!["linux"]);
    }

    #[test]
    fn header_without_blank_line_has_no_constraints() {
        let source = "// +build ignore\npackage foo\n";
        assert!(scan_header(source).unwrap().is_empty());
    }

    #[test]
    fn go_build_right_above_package_counts() {
        let source = "//go:build ignore\npackage foo\n";
        let header = scan_header(source).unwrap();
        assert_eq!(header.go_build.as_deref(), Some("ignore"));
        assert!(!header.eval(&linux_amd64()).unwrap());
    }

    #[test]
    fn go_build_in_doc_comment_counts() {
        let source = "// Copyright\n\n// Package foo does things.\n//go:build windows\npackage foo\n";
        let header = scan_header(source).unwrap();
        assert_eq!(header.go_build.as_deref(), Some("windows"));
        assert!(!header.eval(&linux_amd64()).unwrap());

        let source = "//go:build linux\n\n// Package foo.\n//go:build amd64\npackage foo\n";
        assert!(scan_header(source).is_err());
    }

    #[test]
    fn header_skips_block_comments() {
        let source = "/*\n//go:build windows\n*/\n\n// +build !linux\n\npackage foo\n";
        let header = scan_header(source).unwrap();
        assert!(header.go_build.is_none());
        assert_eq!(header.plus_build, vec!["!linux"]);
        assert!(!header.eval(&linux_amd64()).unwrap());
    }

    #[test]
    fn go_build_wins_over_plus_build() {
        let source = "//go:build linux\n// +build windows\n\npackage foo\n";
        let header = scan_header(source).unwrap();
        assert!(header.eval(&linux_amd64()).unwrap());
    }

    #[test]
    fn duplicate_go_build_is_an_error() {
        let source = "//go:build linux\n//go:build amd64\n\npackage foo\n";
        assert!(scan_header(source).is_err());
    }

    #[test]
    fn context_from_lookup() {
        let ctx = BuildContext::from_lookup(|key| match key {
            "GOOS" => Some("windows".to_string()),
            "GOARCH" => Some("arm64".to_string()),
            "CGO_ENABLED" => Some("1".to_string()),
            _ => None,
        });
        assert_eq!(ctx.goos, "windows");
        assert_eq!(ctx.goarch, "arm64");
        assert!(ctx.cgo_enabled);
        assert!(ctx.match_tag("gc"));
    }
}
