/// Rule-text parsing — splits a rule string into its operator and operands.
///
/// Operators are literal delimiters surrounded by single spaces and are
/// tried in a fixed order against the whole string; the first match wins.

use crate::core::grammar::GrammarError;

pub const FALLBACK_DELIMITER: &str = " -> ";
pub const SEQUENCE_DELIMITER: &str = " & ";
pub const SELECTOR_DELIMITER: &str = " | ";
pub const REPETITION_DELIMITER: &str = " # ";

/// Largest repeat count a repetition rule accepts.
pub const MAX_REPEAT_COUNT: u32 = u32::MAX;

/// A parsed rule string. Operands are rule references, still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleExpr {
    /// `PRIMARY -> ALTERNATE`
    Fallback { primary: String, alternate: String },
    /// `R1 & R2 & … & Rn`
    Sequence(Vec<String>),
    /// `W1 R1 | W2 R2 | … | Wn Rn`
    Selector(Vec<WeightedRef>),
    /// `R # N`
    Repetition { reference: String, count: f32 },
    /// A bare reference to another rule.
    Reference(String),
}

/// One option of a selector rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedRef {
    pub weight: f32,
    pub reference: String,
}

impl RuleExpr {
    /// Parse a rule string.
    ///
    /// Priority: fallback, sequence, selector, repetition, reference.
    /// Fallback and repetition split on the first delimiter only; sequence
    /// and selector are n-ary.
    pub fn parse(text: &str) -> Result<RuleExpr, GrammarError> {
        if let Some((primary, alternate)) = text.split_once(FALLBACK_DELIMITER) {
            return Ok(RuleExpr::Fallback {
                primary: primary.to_string(),
                alternate: alternate.to_string(),
            });
        }

        if text.contains(SEQUENCE_DELIMITER) {
            return Ok(RuleExpr::Sequence(split_operands(text, SEQUENCE_DELIMITER)));
        }

        if text.contains(SELECTOR_DELIMITER) {
            let options = split_operands(text, SELECTOR_DELIMITER)
                .iter()
                .map(|option| parse_option(option))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(RuleExpr::Selector(options));
        }

        if let Some((reference, count)) = text.split_once(REPETITION_DELIMITER) {
            return Ok(RuleExpr::Repetition {
                reference: reference.to_string(),
                count: parse_repeat_count(count)?,
            });
        }

        Ok(RuleExpr::Reference(text.to_string()))
    }

    /// Every rule name this expression refers to, in declaration order.
    pub fn references(&self) -> Vec<&str> {
        match self {
            RuleExpr::Fallback { primary, alternate } => vec![primary.as_str(), alternate.as_str()],
            RuleExpr::Sequence(refs) => refs.iter().map(String::as_str).collect(),
            RuleExpr::Selector(options) => options.iter().map(|o| o.reference.as_str()).collect(),
            RuleExpr::Repetition { reference, .. } => vec![reference.as_str()],
            RuleExpr::Reference(reference) => vec![reference.as_str()],
        }
    }
}

/// Split `text` on every occurrence of `delimiter`.
///
/// Any run of delimiter characters at the cursor is skipped before the next
/// operand is taken, so empty operands never appear.
fn split_operands(text: &str, delimiter: &str) -> Vec<String> {
    let is_delimiter_char = |c: char| delimiter.contains(c);
    let mut operands = Vec::new();
    let mut rest = text;

    loop {
        rest = rest.trim_start_matches(is_delimiter_char);
        if rest.is_empty() {
            break;
        }
        match rest.find(delimiter) {
            Some(end) => {
                operands.push(rest[..end].to_string());
                rest = &rest[end..];
            }
            None => {
                operands.push(rest.to_string());
                break;
            }
        }
    }

    operands
}

/// `"<weight> <rule name>"` — the weight is everything up to the first space.
fn parse_option(option: &str) -> Result<WeightedRef, GrammarError> {
    let Some((weight, reference)) = option.split_once(' ') else {
        // A lone token is either a weight with no rule or a rule with no weight.
        parse_number(option)?;
        return Err(GrammarError::MissingReference(option.to_string()));
    };

    if reference.is_empty() {
        return Err(GrammarError::MissingReference(option.to_string()));
    }

    Ok(WeightedRef {
        weight: parse_number(weight)?,
        reference: reference.to_string(),
    })
}

/// Weights and repeat counts: finite, non-negative decimal literals.
fn parse_number(token: &str) -> Result<f32, GrammarError> {
    match token.trim().parse::<f32>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(value),
        _ => Err(GrammarError::MalformedNumericLiteral(token.to_string())),
    }
}

/// Repeat counts additionally must round to at most `MAX_REPEAT_COUNT`.
fn parse_repeat_count(token: &str) -> Result<f32, GrammarError> {
    let count = parse_number(token)?;
    if count.round() > MAX_REPEAT_COUNT as f32 {
        return Err(GrammarError::MalformedNumericLiteral(token.to_string()));
    }
    Ok(count)
}
