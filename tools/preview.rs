/// Preview — interactive generation shell for testing rule tables.
///
/// Usage: preview --rules <path> [--seed <n>] [--max-depth <n>] [--verbose]
///
/// Commands:
///   gen <rule> [n]            — generate n sequences from a rule
///   define <name> <text>      — compile a rule
///   terminal <name> <value>   — register a terminal value
///   rules                     — list registered rules
///   seed <n>                  — set RNG seed
///   bulk <rule> <n>           — generate n sequences with variety stats
///   lint                      — report rules that recurse without a fallback
///   help                      — list commands
///   quit                      — exit

use rustc_hash::FxHashSet;
use std::io::{self, BufRead, Write};
use std::path::Path;
use stochastic_grammar::core::grammar::Grammar;
use stochastic_grammar::schema::rule_set::RuleSet;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let mut rules_path = None;
    let mut seed: u64 = 42;
    let mut max_depth = None;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rules" if i + 1 < args.len() => {
                i += 1;
                rules_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse().unwrap_or(42);
            }
            "--max-depth" if i + 1 < args.len() => {
                i += 1;
                max_depth = args[i].parse::<u32>().ok();
            }
            "--verbose" | "-v" => verbose = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(io::stderr)
            .init();
    }

    let mut rule_set = RuleSet::default();
    if let Some(ref path) = rules_path {
        match RuleSet::load_from_ron(Path::new(path)) {
            Ok(rs) => rule_set = rs,
            Err(e) => {
                eprintln!("ERROR: Failed to load {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }
    rule_set.config.seed = Some(seed);
    if let Some(depth) = max_depth {
        rule_set.config.max_depth = depth;
    }

    let mut grammar = match rule_set.build() {
        Ok(g) => g,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    println!("Loaded {} rules", grammar.len());
    println!("Seed: {}, max depth: {}", seed, grammar.max_depth());
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd.to_lowercase().as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "gen" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                if parts.is_empty() {
                    println!("Usage: gen <rule> [n]");
                    continue;
                }
                let count = parts.get(1).and_then(|n| n.parse().ok()).unwrap_or(1);
                for _ in 0..count {
                    match grammar.generate(parts[0]) {
                        Ok(tokens) => println!("{}", tokens.join(" ")),
                        Err(e) => {
                            println!("ERROR: {}", e);
                            break;
                        }
                    }
                }
            }
            "define" => {
                let Some((name, text)) = rest.split_once(' ') else {
                    println!("Usage: define <name> <rule text>");
                    continue;
                };
                match grammar.compile(name, text.trim()) {
                    Ok(()) => println!("Rule '{}' compiled", name),
                    Err(e) => println!("ERROR: {}", e),
                }
            }
            "terminal" => {
                let Some((name, value)) = rest.split_once(' ') else {
                    println!("Usage: terminal <name> <value>");
                    continue;
                };
                grammar.register_terminal(name, value.trim().to_string());
                println!("Terminal '{}' registered", name);
            }
            "rules" => {
                for name in grammar.rule_names() {
                    println!("  {}", name);
                }
            }
            "seed" => match rest.parse::<u64>() {
                Ok(s) => {
                    grammar.reseed(s);
                    println!("Seed set to {}", s);
                }
                Err(_) => println!("Usage: seed <n>"),
            },
            "bulk" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let count: usize = match parts.get(1).map(|n| n.parse()) {
                    Some(Ok(n)) if n > 0 => n,
                    _ => {
                        println!("Usage: bulk <rule> <n>");
                        continue;
                    }
                };
                print_bulk_stats(&mut grammar, parts[0], count);
            }
            "lint" => {
                let cycles = grammar.unbounded_cycles();
                if cycles.is_empty() {
                    println!("No unbounded recursion.");
                }
                for name in cycles {
                    println!("WARNING: '{}' recurses without a fallback", name);
                }
            }
            _ => println!("Unknown command '{}'. Type 'help' for commands.", cmd),
        }
    }
}

fn print_bulk_stats(grammar: &mut Grammar<String>, rule: &str, count: usize) {
    let mut outputs = Vec::with_capacity(count);
    for _ in 0..count {
        match grammar.generate(rule) {
            Ok(tokens) => outputs.push(tokens.join(" ")),
            Err(e) => {
                println!("ERROR: {}", e);
                return;
            }
        }
    }

    let unique: FxHashSet<&str> = outputs.iter().map(String::as_str).collect();
    let total_tokens: usize = outputs.iter().map(|o| o.split_whitespace().count()).sum();

    println!("\n=== Bulk Generation: {} sequences from '{}' ===\n", count, rule);
    println!("Unique outputs: {}/{}", unique.len(), count);
    println!("Average length: {:.1} tokens", total_tokens as f64 / count as f64);
    println!("\nSamples:");
    for output in outputs.iter().take(5) {
        println!("  {}", output);
    }
    println!();
}

fn print_usage() {
    println!("Usage: preview --rules <path> [--seed <n>] [--max-depth <n>] [--verbose]");
}

fn print_help() {
    println!("Commands:");
    println!("  gen <rule> [n]            generate n sequences from a rule");
    println!("  define <name> <text>      compile a rule");
    println!("  terminal <name> <value>   register a terminal value");
    println!("  rules                     list registered rules");
    println!("  seed <n>                  set RNG seed");
    println!("  bulk <rule> <n>           generate n sequences with variety stats");
    println!("  lint                      report rules that recurse without a fallback");
    println!("  quit                      exit");
}
