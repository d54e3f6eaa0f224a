use crate::constraint::{self, BuildContext};
use anyhow::{Context, Result, anyhow, bail};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Node, Parser};

/// What one source file contributes to its package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub file: PathBuf,
    /// Build constraints hold for the target environment.
    pub matched: bool,
    /// Declared package name; empty unless matched and a Go file.
    pub package: String,
    pub imports: Vec<String>,
    /// Imports the pseudo-package `C`.
    pub is_cgo: bool,
}

pub struct MetadataExtractor {
    parser: Parser,
}

impl MetadataExtractor {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let language = tree_sitter_go::LANGUAGE;
        parser.set_language(&language.into())?;
        Ok(Self { parser })
    }

    /// Evaluates `path` against `ctx`. With `preprocessed`, the file is taken
    /// to be cgo output already: the `cgo` tag holds and importing `C` never
    /// disqualifies it.
    pub fn read(&mut self, ctx: &BuildContext, path: &Path, preprocessed: bool) -> Result<Metadata> {
        let mut meta = Metadata {
            file: path.to_path_buf(),
            ..Default::default()
        };
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("invalid source file name {}", path.display()))?;
        if !constraint::match_file_name(ctx, name) {
            return Ok(meta);
        }

        let is_go = name.ends_with(".go");
        if name.ends_with(".syso") {
            meta.matched = true;
            return Ok(meta);
        }

        let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let source = String::from_utf8_lossy(&data);
        let header = constraint::scan_header(&source)
            .with_context(|| format!("parse build constraints in {}", path.display()))?;
        let effective;
        let eval_ctx = if preprocessed && !ctx.cgo_enabled {
            effective = BuildContext {
                cgo_enabled: true,
                ..ctx.clone()
            };
            &effective
        } else {
            ctx
        };
        let holds = header
            .eval(eval_ctx)
            .with_context(|| format!("evaluate build constraints in {}", path.display()))?;
        if !holds {
            return Ok(meta);
        }
        if !is_go {
            meta.matched = true;
            return Ok(meta);
        }

        let (package, imports) = self
            .parse_source(&source)
            .with_context(|| format!("parse {}", path.display()))?;
        meta.is_cgo = imports.iter().any(|imp| imp == "C");
        if meta.is_cgo && !preprocessed && !ctx.cgo_enabled {
            return Ok(meta);
        }
        meta.matched = true;
        meta.package = package;
        meta.imports = imports;
        Ok(meta)
    }

    /// Package name and import paths of a Go source file.
    pub fn parse_source(&mut self, source: &str) -> Result<(String, Vec<String>)> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("tree-sitter parse failed"))?;
        let root = tree.root_node();
        let mut package = None;
        let mut imports = Vec::new();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            match child.kind() {
                "package_clause" => {
                    let mut inner = child.walk();
                    package = child
                        .named_children(&mut inner)
                        .next()
                        .map(|ident| node_text(ident, source));
                }
                "import_declaration" => collect_imports(child, source, &mut imports),
                _ => {}
            }
        }
        match package {
            Some(name) if !name.is_empty() => Ok((name, imports)),
            _ => bail!("expected 'package' clause"),
        }
    }
}

fn collect_imports(node: Node<'_>, source: &str, imports: &mut Vec<String>) {
    if node.kind() == "import_spec" {
        if let Some(path_node) = node.child_by_field_name("path") {
            let import_path = extract_string_literal(path_node, source);
            if !import_path.is_empty() && !imports.contains(&import_path) {
                imports.push(import_path);
            }
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_imports(child, source, imports);
    }
}

fn extract_string_literal(node: Node<'_>, source: &str) -> String {
    let raw = node_text(node, source);
    unquote_go_string(&raw).unwrap_or(raw)
}

fn unquote_go_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() < 2 {
        return None;
    }
    let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('`') && trimmed.ends_with('`'));
    quoted.then(|| trimmed[1..trimmed.len() - 1].to_string())
}

fn node_text(node: Node<'_>, source: &str) -> String {
    source
        .get(node.start_byte()..node.end_byte())
        .unwrap_or("")
        .trim()
        .to_string()
}
