/// Grammar Linter — validates rule tables before they ship.
///
/// Usage: grammar_linter <rules_path> [--verbose]

use std::path::Path;
use std::process;
use stochastic_grammar::core::grammar::{Grammar, GrammarError};
use stochastic_grammar::core::node::Node;
use stochastic_grammar::schema::rule_set::RuleSet;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: grammar_linter <rules_path> [--verbose]");
        process::exit(0);
    }

    let rules_path = &args[1];
    if args[2..].iter().any(|a| a == "--verbose" || a == "-v") {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    // Load all rule files from path
    let mut rule_set = RuleSet::default();
    let path = Path::new(rules_path);

    if path.is_file() {
        match RuleSet::load_from_ron(path) {
            Ok(rs) => rule_set.merge(rs),
            Err(e) => {
                eprintln!("ERROR: Failed to load rule file: {}", e);
                process::exit(1);
            }
        }
    } else if path.is_dir() {
        load_rules_recursive(path, &mut rule_set);
    } else {
        eprintln!("ERROR: Path '{}' does not exist", rules_path);
        process::exit(1);
    }

    println!(
        "Loaded {} terminals and {} rules",
        rule_set.terminals.len(),
        rule_set.rules.len()
    );

    let (errors, warnings) = match lint_rules(&rule_set) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            process::exit(1);
        }
    };

    println!("\n=== Grammar Lint Report ===\n");

    if errors.is_empty() && warnings.is_empty() {
        println!("All checks passed!");
    }

    for warning in &warnings {
        println!("WARNING: {}", warning);
    }

    for error in &errors {
        println!("ERROR: {}", error);
    }

    println!(
        "\nSummary: {} errors, {} warnings",
        errors.len(),
        warnings.len()
    );

    if errors.is_empty() {
        process::exit(0);
    } else {
        process::exit(1);
    }
}

fn load_rules_recursive(dir: &Path, rule_set: &mut RuleSet) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<_> = entries.flatten().map(|entry| entry.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            load_rules_recursive(&path, rule_set);
        } else if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            match RuleSet::load_from_ron(&path) {
                Ok(rs) => {
                    println!("  Loaded: {}", path.display());
                    rule_set.merge(rs);
                }
                Err(e) => {
                    eprintln!("  ERROR loading {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn lint_rules(
    rule_set: &RuleSet,
) -> Result<(Vec<String>, Vec<String>), GrammarError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let mut grammar = Grammar::<String>::builder()
        .config(rule_set.config.clone())
        .string_literals()
        .build()?;

    for (name, value) in &rule_set.terminals {
        grammar.register_terminal(name, value.clone());
    }

    // Compile each rule on its own so one bad rule doesn't hide the rest
    for (name, text) in &rule_set.rules {
        if let Err(e) = grammar.compile(name, text) {
            errors.push(format!("Rule '{}' (\"{}\") failed to compile: {}", name, text, e));
        }
    }

    let mut declared: Vec<&str> = rule_set.rules.iter().map(|(name, _)| name.as_str()).collect();
    declared.sort_unstable();
    for pair in declared.windows(2) {
        if pair[0] == pair[1] {
            warnings.push(format!(
                "Rule '{}' is declared more than once; the last definition wins",
                pair[0]
            ));
        }
    }
    warnings.dedup();

    for name in grammar.rule_names() {
        let Some(id) = grammar.node_id(name) else {
            continue;
        };
        if let Node::Select { options, .. } = grammar.node(id) {
            let zero = options.iter().filter(|(_, weight)| *weight == 0.0).count();
            if zero > 0 {
                warnings.push(format!(
                    "Rule '{}' has {} option(s) with weight 0 that can never be chosen",
                    name, zero
                ));
            }
        }
    }

    for name in grammar.unbounded_cycles() {
        errors.push(format!(
            "Rule '{}' can reach itself without a fallback (infinite recursion)",
            name
        ));
    }

    Ok((errors, warnings))
}
