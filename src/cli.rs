//! Minimal CLI: catalog + root shape → (instances | graph)
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};

use specimen::catalog::{load_catalogs, load_settings};
use specimen::context::ContextBuilder;
use specimen::{GenerationContext, GenerationError, Model, Selector, ShapeRegistry, TypeRef, Value, report};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate seeded, reproducible fixtures from JSON shape catalogs
#[derive(Parser, Debug)]
#[command(name = "specimen", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,

    /// log filter used when SPECIMEN_LOG is unset (e.g. `info`, `specimen=debug`)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// generate instances of the root shape as JSON
    Generate(GenerateOut),
    /// print the node graph built for the root shape
    Graph(GraphOut),
}

#[derive(Args, Debug, Clone)]
struct ModelSettings {
    /// One or more catalogs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    catalog: Vec<String>,

    /// root type expression (e.g. `Order` or `Page<Item<String>>`)
    #[arg(long, short)]
    root: String,

    /// JSON settings file
    #[arg(long)]
    settings: Option<PathBuf>,

    /// override one setting
    #[arg(long = "setting", value_name = "KEY=VALUE")]
    setting: Vec<String>,

    /// set a target to a JSON literal
    #[arg(long, value_name = "TARGET=JSON")]
    set: Vec<String>,

    /// leave a target absent
    #[arg(long, value_name = "TARGET")]
    ignore: Vec<String>,

    /// allow nulls at a target
    #[arg(long, value_name = "TARGET")]
    nullable: Vec<String>,

    /// substitute a subtype at a target
    #[arg(long, value_name = "TARGET=TYPE")]
    subtype: Vec<String>,

    /// only explicit overrides produce values
    #[arg(long)]
    blank: bool,

    /// accept selectors that match nothing
    #[arg(long)]
    lenient: bool,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    model: ModelSettings,

    /// seed of the first instance (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// number of instances
    #[arg(long, short = 'n', default_value_t = 1)]
    count: usize,

    /// generate instances on the rayon pool
    #[arg(long)]
    parallel: bool,

    /// print the node graph to stderr first
    #[arg(long, short)]
    verbose: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct GraphOut {
    #[command(flatten)]
    model: ModelSettings,

    /// no colors
    #[arg(long)]
    plain: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl ModelSettings {
    fn context(&self, seed: Option<u64>) -> Result<GenerationContext> {
        let mut builder = GenerationContext::builder();
        if let Some(path) = &self.settings {
            builder = builder.settings(load_settings(path)?);
        }
        for raw in &self.setting {
            let (key, value) = split_pair(raw, "--setting")?;
            builder = builder.setting(key, value);
        }
        for raw in &self.set {
            let (target, literal) = split_pair(raw, "--set")?;
            let json: serde_json::Value =
                serde_json::from_str(literal).with_context(|| format!("--set {raw}: value is not JSON"))?;
            builder = builder.set(parse_target(target)?, Value::from_json(&json));
        }
        for raw in &self.ignore {
            builder = builder.ignore(parse_target(raw)?);
        }
        for raw in &self.nullable {
            builder = builder.nullable(parse_target(raw)?);
        }
        for raw in &self.subtype {
            let (target, ty) = split_pair(raw, "--subtype")?;
            builder = builder.subtype(parse_target(target)?, TypeRef::parse(ty)?);
        }
        builder = apply_switches(builder, self.blank, self.lenient, seed);
        Ok(builder.build()?)
    }

    fn model(&self, seed: Option<u64>) -> Result<Model> {
        let mut registry = ShapeRegistry::new();
        let paths = load_catalogs(&self.catalog, &mut registry)?;
        tracing::info!(catalogs = paths.len(), "catalogs loaded");
        let root = TypeRef::parse(&self.root).with_context(|| format!("invalid root `{}`", self.root))?;
        let model = Model::new(Arc::new(registry), root, self.context(seed)?)?;
        Ok(model)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Generate(target) => {
                let model = target.model.model(target.seed)?;
                if target.verbose {
                    eprint!("{}", report::render(model.graph(), true));
                }

                let result = if target.parallel {
                    model.generate_many_parallel(target.count)
                } else {
                    model.generate_many(target.count)
                };
                let generated = match result {
                    Ok(generated) => generated,
                    Err(GenerationError::UnmatchedSelectors { selectors, .. }) => {
                        bail!("selectors matched no nodes (pass --lenient to allow): {}", selectors.join(", "))
                    }
                    Err(error) => return Err(error.into()),
                };

                for instance in &generated {
                    eprintln!("seed: {}", instance.seed);
                }
                let json = if target.count == 1 {
                    generated.first().map(|g| g.value.to_json()).unwrap_or_default()
                } else {
                    serde_json::Value::Array(generated.iter().map(|g| g.value.to_json()).collect())
                };
                let src = serde_json::to_string_pretty(&json)?;
                if let Some(out) = target.out.as_ref() {
                    if let Some(parent) = out.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(out, &src).with_context(|| format!("failed to write {}", out.display()))?;
                } else {
                    println!("{src}");
                }
            }
            Command::Graph(target) => {
                let model = target.model.model(None)?;
                print!("{}", report::render(model.graph(), !target.plain));
            }
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn apply_switches(mut builder: ContextBuilder, blank: bool, lenient: bool, seed: Option<u64>) -> ContextBuilder {
    if blank {
        builder = builder.blank();
    }
    if lenient {
        builder = builder.lenient();
    }
    if let Some(seed) = seed {
        builder = builder.with_seed(seed);
    }
    builder
}

fn split_pair<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str)> {
    match raw.split_once('=') {
        Some((left, right)) if !left.trim().is_empty() => Ok((left.trim(), right.trim())),
        _ => bail!("{flag} expects LEFT=RIGHT, got `{raw}`"),
    }
}

/// `$` is the root, `@Shape` every node of a shape, `Shape.field` a field of
/// one declaring shape, and a bare name any field with that name.
fn parse_target(raw: &str) -> Result<Selector> {
    let raw = raw.trim();
    if raw == "$" {
        return Ok(Selector::root());
    }
    if let Some(pattern) = raw.strip_prefix('@') {
        return Ok(Selector::shape(pattern)?);
    }
    Ok(match raw.split_once('.') {
        Some((declaring, name)) => Selector::field_of(declaring, name),
        None => Selector::field(raw),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets() {
        assert_eq!(parse_target("$").unwrap(), Selector::root());
        assert_eq!(parse_target("@List<_>").unwrap(), Selector::shape("List<_>").unwrap());
        assert_eq!(parse_target("Person.name").unwrap(), Selector::field_of("Person", "name"));
        assert_eq!(parse_target(" name ").unwrap(), Selector::field("name"));
    }

    #[test]
    fn pairs() {
        assert_eq!(split_pair("min_size=2", "--setting").unwrap(), ("min_size", "2"));
        assert_eq!(split_pair("id = {\"a\": 1}", "--set").unwrap(), ("id", "{\"a\": 1}"));
        assert!(split_pair("=2", "--setting").is_err());
        assert!(split_pair("nothing", "--setting").is_err());
    }

    #[test]
    fn parses_generate_flags() {
        let cli = CommandLineInterface::try_parse_from([
            "specimen", "generate", "-c", "shapes/*.json", "-r", "Order", "--seed", "42", "-n", "3", "--set",
            "id=7", "--lenient",
        ])
        .unwrap();
        let Command::Generate(target) = cli.cmd else { panic!("generate expected") };
        assert_eq!(target.seed, Some(42));
        assert_eq!(target.count, 3);
        assert_eq!(target.model.set, ["id=7"]);
        assert!(target.model.lenient);
    }
}
