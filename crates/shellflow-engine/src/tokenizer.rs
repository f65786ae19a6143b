//! Instruction tokenizer.
//!
//! Turning an instruction line into an argument vector takes three passes:
//!
//! 1. **Variable substitution.** Locals and globals are merged (locals
//!    first), stably sorted by name length, longest first, and each
//!    `$name` is replaced literally in that order. Replacement is plain
//!    text on the running string, so a value inserted by one substitution
//!    can be matched again by a later, shorter name. Workflow authors rely
//!    on `$10` winning over `$1`; the re-matching is part of the language.
//! 2. **Environment expansion** of whatever `$NAME` / `${NAME}` references
//!    remain (see [`Environment::expand`]).
//! 3. **Splitting** on spaces with single/double quote grouping.

use crate::env::Environment;
use crate::scope::Scope;

/// Full tokenization of one instruction line.
pub fn tokenize(line: &str, locals: &Scope, globals: &Scope, env: &Environment) -> Vec<String> {
    let substituted = substitute(line, locals, globals);
    split(&env.expand(&substituted))
}

/// Pass 1: literal `$name` replacement, longest names first.
pub fn substitute(input: &str, locals: &Scope, globals: &Scope) -> String {
    let mut vars: Vec<(&str, &str)> = locals.iter().chain(globals.iter()).collect();
    vars.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut text = input.to_string();
    for (name, value) in vars {
        let pattern = format!("${name}");
        if text.contains(&pattern) {
            text = text.replace(&pattern, value);
        }
    }
    text
}

/// Pass 3: split on spaces, honouring quotes.
///
/// A quote opens a span only at the start of input, right after a space,
/// or while a span is already open. Inside a span, the other quote
/// character is literal. Quote characters that open or close spans are
/// dropped; empty tokens are never produced.
pub fn split(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut open: Option<char> = None;
    let mut last: Option<char> = None;

    for c in input.chars() {
        let is_quote = c == '"' || c == '\'';
        if is_quote && (last.is_none() || last == Some(' ') || open.is_some()) {
            match open {
                None => open = Some(c),
                Some(q) if q == c => open = None,
                Some(_) => current.push(c),
            }
        } else if c == ' ' && open.is_none() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
        last = Some(c);
    }

    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(pairs: &[(&str, &str)]) -> Scope {
        let mut s = Scope::new();
        for (k, v) in pairs {
            s.set(*k, *v);
        }
        s
    }

    #[test]
    fn quoted_argument_stays_together() {
        let tokens = split(r#"runCommand - echo "a b" c"#);
        assert_eq!(tokens, ["runCommand", "-", "echo", "a b", "c"]);
    }

    #[test]
    fn longest_name_substitutes_first() {
        let vars = scope(&[("1", "x"), ("10", "y")]);
        assert_eq!(substitute("$10", &vars, &Scope::new()), "y");
        assert_eq!(substitute("$1 $10", &vars, &Scope::new()), "x y");
    }

    #[test]
    fn locals_shadow_globals() {
        let locals = scope(&[("name", "local")]);
        let globals = scope(&[("name", "global"), ("other", "g")]);
        assert_eq!(substitute("$name $other", &locals, &globals), "local g");
    }

    #[test]
    fn inserted_text_can_be_substituted_again() {
        let vars = scope(&[("ab", "$b"), ("b", "done")]);
        assert_eq!(substitute("$ab", &vars, &Scope::new()), "done");
    }

    #[test]
    fn quotes_mid_word_are_literal() {
        assert_eq!(split(r#"say it's "fine""#), ["say", "it's", "fine"]);
    }

    #[test]
    fn other_quote_inside_span_is_literal() {
        assert_eq!(split(r#"print "it's here""#), ["print", "it's here"]);
        assert_eq!(split(r#"print 'say "hi"'"#), ["print", r#"say "hi""#]);
    }

    #[test]
    fn repeated_spaces_produce_no_empty_tokens() {
        assert_eq!(split("  a   b  "), ["a", "b"]);
        assert!(split("   ").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn empty_quotes_produce_nothing() {
        assert_eq!(split(r#"a "" b"#), ["a", "b"]);
    }

    #[test]
    fn unterminated_quote_runs_to_end() {
        assert_eq!(split(r#"a "b c"#), ["a", "b c"]);
    }

    #[test]
    fn tokenize_runs_all_passes() {
        let mut env = Environment::empty();
        env.set("GREETING", "hello there").unwrap();
        let locals = scope(&[("1", "world")]);
        let tokens = tokenize(r#"print "$GREETING" $1"#, &locals, &Scope::new(), &env);
        assert_eq!(tokens, ["print", "hello there", "world"]);
    }
}
