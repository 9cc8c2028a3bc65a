//! ImageFlow CLI - inspect, check and evaluate saved graphs.

use anyhow::{bail, Context, Result};
use imageflow::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("ImageFlow v{}", imageflow::VERSION);
    println!();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("imageflow");

    let Some(command) = args.get(1) else {
        print_usage(program);
        return Ok(());
    };

    match command.as_str() {
        "primitives" => list_primitives(),
        "check" => check_graph(&graph_path(&args)?),
        "types" => show_types(&graph_path(&args)?),
        "eval" => evaluate_graph(&graph_path(&args)?, &args[3..]),
        "demo" => run_demo(),
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(())
        }
        other => {
            print_usage(program);
            bail!("unknown command: {}", other)
        }
    }
}

fn print_usage(program: &str) {
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  primitives              List all available primitives");
    println!("  check <graph.json>      Validate a saved graph");
    println!("  types <graph.json>      Show the inferred type of every node");
    println!("  eval <graph.json> [options]");
    println!("                          Evaluate a saved graph");
    println!("  demo                    Build and evaluate a small graph");
    println!("  help                    Show this help message");
    println!();
    println!("Eval options:");
    println!("  --node <index>          Evaluate one node only (default: all)");
    println!("  --config <options.toml> Execution options");
    println!("  --sequential            Disable parallel evaluation");
}

fn graph_path(args: &[String]) -> Result<PathBuf> {
    match args.get(2) {
        Some(path) => Ok(PathBuf::from(path)),
        None => bail!("please specify a graph file"),
    }
}

fn load_graph(path: &Path) -> Result<Graph> {
    let registry = Arc::new(PrimitiveRegistry::with_builtins());
    Graph::load(path, registry).with_context(|| format!("failed to load {}", path.display()))
}

fn list_primitives() -> Result<()> {
    let registry = PrimitiveRegistry::with_builtins();
    println!("Available primitives ({} total):", registry.len());
    println!();

    for (category, signatures) in registry.grouped_by_category() {
        println!("  {}", category.display_name());
        for signature in signatures {
            println!("      {} : {}", signature.name, signature.scheme);
            if !signature.description.is_empty() {
                println!("          {}", signature.description);
            }
        }
        println!();
    }
    Ok(())
}

fn check_graph(path: &Path) -> Result<()> {
    let graph = load_graph(path)?;
    let report = ValidationPipeline::default().validate(&graph);

    for warning in &report.warnings {
        println!("warning: {}", warning.message);
        if let Some(suggestion) = &warning.suggestion {
            println!("    hint: {}", suggestion);
        }
    }
    for line in report.detailed_errors() {
        eprintln!("{}", line);
    }
    println!("{} ({} ms)", report.summary(), report.duration_ms);

    if !report.is_usable() {
        bail!("{} error(s) in {}", report.errors.len(), path.display());
    }
    Ok(())
}

fn show_types(path: &Path) -> Result<()> {
    let graph = load_graph(path)?;
    for (index, node) in graph.nodes().iter().enumerate() {
        match node.output_type() {
            Ok(ty) => println!("  [{}] {} : {}", index, node.display_name(), ty),
            Err(error) => println!("  [{}] {} : <{}>", index, node.display_name(), error),
        }
    }
    Ok(())
}

fn evaluate_graph(path: &Path, options: &[String]) -> Result<()> {
    let mut target: Option<NodeIndex> = None;
    let mut execution = ExecutionOptions::default();

    let mut i = 0;
    while i < options.len() {
        match options[i].as_str() {
            "--node" if i + 1 < options.len() => {
                target = Some(
                    options[i + 1]
                        .parse()
                        .with_context(|| format!("invalid node index '{}'", options[i + 1]))?,
                );
                i += 2;
            }
            "--config" if i + 1 < options.len() => {
                execution = ExecutionOptions::load(&options[i + 1])
                    .with_context(|| format!("failed to read {}", options[i + 1]))?;
                i += 2;
            }
            "--sequential" => {
                execution = execution.with_parallel(false);
                i += 1;
            }
            other => bail!("unknown option: {}", other),
        }
    }

    let graph = load_graph(path)?;
    let session = EditorSession::with_options(graph, execution)?;

    match target {
        Some(index) => {
            let value = session.evaluate(index)?;
            println!("  [{}] = {}", index, value);
        }
        None => {
            for (index, value) in session.evaluate_all()?.iter().enumerate() {
                println!("  [{}] = {}", index, value);
            }
        }
    }

    let stats = session.cache_stats();
    log::info!(
        "Cache: {} hit(s), {} miss(es), ratio {:.2}",
        stats.hits,
        stats.misses,
        stats.hit_ratio()
    );
    Ok(())
}

/// Builds `|x| x * scale` mapped over `range(5)`, where `scale` is
/// another node, then breaks and repairs the wiring.
fn run_demo() -> Result<()> {
    let mut session = EditorSession::new();

    let scale = session.add_output_node(Expression::constant(2.0))?;
    session.set_label(scale, Some("scale".to_string()))?;

    let numbers =
        session.add_output_node(Expression::primitive("range", vec![Expression::constant(5_i64)]))?;
    session.set_label(numbers, Some("numbers".to_string()))?;

    let scaled = session.add_output_node(Expression::map(
        Expression::input(0),
        Expression::lambda(
            vec!["x"],
            Expression::primitive("mul", vec![Expression::variable("x"), Expression::input(1)]),
        ),
    ))?;
    session.set_label(scaled, Some("scaled".to_string()))?;
    session.add_edge(scaled, 0, numbers)?;
    session.add_edge(scaled, 1, scale)?;

    println!("Graph:");
    for (index, node) in session.graph().nodes().iter().enumerate() {
        let ty = session
            .type_of(index)
            .map(|ty| ty.to_string())
            .unwrap_or_else(|e| format!("<{}>", e));
        println!("  [{}] {} : {}", index, node.display_name(), ty);
    }
    println!();
    println!("scaled = {}", session.evaluate(scaled)?);

    println!();
    println!("Trying to feed 'scaled' back into 'numbers'...");
    match session.add_edge(numbers, 0, scaled) {
        Ok(()) => bail!("cycle was accepted"),
        Err(error) => println!("  rejected: {}", error),
    }

    println!("Replacing the scale with a string...");
    session.set_node_expression(scale, OUTPUT_PARAMETER, Expression::constant("two"))?;
    match session.type_of(scaled) {
        Ok(ty) => println!("  scaled : {}", ty),
        Err(error) => println!("  scaled no longer types: {}", error),
    }
    println!("  scaled = {}", session.evaluate(scaled)?);

    session.set_node_expression(scale, OUTPUT_PARAMETER, Expression::constant(0.5))?;
    println!("Restored: scaled = {}", session.evaluate(scaled)?);

    let stats = session.cache_stats();
    println!();
    println!(
        "Cache: {} hit(s), {} miss(es), {} evicted",
        stats.hits, stats.misses, stats.evictions
    );
    Ok(())
}
