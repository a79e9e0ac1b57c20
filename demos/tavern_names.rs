/// Tavern names — builds a grammar in code and from a rule table.
///
/// Run with: cargo run --example tavern_names

use std::path::Path;
use stochastic_grammar::core::grammar::{Grammar, GrammarError};
use stochastic_grammar::schema::rule_set::RuleSet;

#[derive(Debug, Clone)]
enum Glyph {
    Word(&'static str),
    Space,
}

fn main() -> Result<(), GrammarError> {
    // Typed terminals: every leaf must be registered up front.
    let mut signs: Grammar<Glyph> = Grammar::builder().seed(2024).max_depth(3).build()?;
    signs.register_terminal("The", Glyph::Word("The"));
    signs.register_terminal("_", Glyph::Space);
    signs.register_terminal("Stag", Glyph::Word("Stag"));
    signs.register_terminal("Crown", Glyph::Word("Crown"));
    signs.register_terminal("Lantern", Glyph::Word("Lantern"));
    signs.compile("noun", "2 Stag | 1 Crown | 1 Lantern")?;
    signs.compile("sign", "The & _ & noun")?;

    println!("=== Typed grammar ===");
    for _ in 0..3 {
        let rendered: String = signs
            .generate("sign")?
            .iter()
            .map(|glyph| match glyph {
                Glyph::Word(word) => *word,
                Glyph::Space => " ",
            })
            .collect();
        println!("  {}", rendered);
    }

    // String terminals: unknown words become literals automatically.
    let mut grammar = RuleSet::load_from_ron(Path::new("rule_data/tavern.ron"))?.build()?;
    grammar.reseed(7);

    println!("\n=== Rule table ===");
    for _ in 0..5 {
        println!("  {}", grammar.generate("tavern_name")?.join(" "));
    }
    println!("  Toast: {}!", grammar.generate("cheers")?.join(", "));

    // Redefining a rule reaches every rule already built on it.
    grammar.compile("noun", "Dragon")?;
    println!("\n=== After redefining 'noun' ===");
    println!("  {}", grammar.generate("double")?.join(" "));

    Ok(())
}
