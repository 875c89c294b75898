//! The textual command parser.

use std::collections::BTreeMap;

use superclaude_util::error::ParseError;

use crate::types::{Command, CommandMetadata, FlagType, FlagValue};
use crate::KNOWN_NAMESPACES;

/// A raw invocation: grammar parsed, flags not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawInvocation {
    pub namespace: String,
    pub name: String,
    /// Tokens after the command head, in order.
    pub tokens: Vec<String>,
    pub raw_text: String,
}

/// Parse the command head and tokenize the rest.
///
/// # Errors
///
/// Grammar-level failures only; flag validation happens against the
/// command's metadata in [`validate_invocation`].
pub fn parse_raw(text: &str) -> Result<RawInvocation, ParseError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut tokens = tokenize(trimmed)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let head = tokens.remove(0);

    let Some(head) = head.strip_prefix('/') else {
        return Err(ParseError::MissingSlash {
            text: head.clone(),
        });
    };
    let Some((namespace, name)) = head.split_once(':') else {
        return Err(ParseError::MissingSeparator {
            text: head.to_string(),
        });
    };

    validate_identifier(namespace)?;
    validate_identifier(name)?;

    if !KNOWN_NAMESPACES.contains(&namespace) {
        return Err(ParseError::UnknownNamespace {
            namespace: namespace.to_string(),
        });
    }

    Ok(RawInvocation {
        namespace: namespace.to_string(),
        name: name.to_string(),
        tokens,
        raw_text: trimmed.to_string(),
    })
}

/// Validate a raw invocation against command metadata, producing the
/// immutable [`Command`].
///
/// Flag forms: `--flag` (boolean), `--key=value`, `--key value`, `-k`
/// (short). Unknown flags and type mismatches fail with structured
/// errors; defaults from the flag specification fill whatever the user
/// left out.
pub fn validate_invocation(
    raw: &RawInvocation,
    metadata: &CommandMetadata,
) -> Result<Command, ParseError> {
    let command_label = format!("{}:{}", raw.namespace, raw.name);
    let mut flags: BTreeMap<String, FlagValue> = BTreeMap::new();
    let mut args: Vec<String> = Vec::new();

    let mut tokens = raw.tokens.iter().peekable();
    while let Some(token) = tokens.next() {
        if let Some(long) = token.strip_prefix("--") {
            let (flag_name, inline_value) = match long.split_once('=') {
                Some((n, v)) => (n, Some(v.to_string())),
                None => (long, None),
            };

            let spec = metadata.flag(flag_name).ok_or_else(|| ParseError::UnknownFlag {
                flag: flag_name.to_string(),
                command: command_label.clone(),
            })?;

            match &spec.kind {
                FlagType::Bool => {
                    if let Some(value) = inline_value {
                        return Err(ParseError::InvalidFlagValue {
                            flag: flag_name.to_string(),
                            value,
                            expected: "no value (boolean flag)".to_string(),
                        });
                    }
                    flags.insert(spec.name.clone(), FlagValue::Bool(true));
                }
                kind => {
                    let value = match inline_value {
                        Some(v) => v,
                        None => {
                            // `--key value` form: next token is the value
                            // unless it looks like another flag
                            match tokens.peek() {
                                Some(next) if !next.starts_with('-') => {
                                    tokens.next().expect("peeked").clone()
                                }
                                _ => {
                                    return Err(ParseError::MissingFlagValue {
                                        flag: flag_name.to_string(),
                                    });
                                }
                            }
                        }
                    };
                    flags.insert(spec.name.clone(), typed_value(flag_name, kind, value)?);
                }
            }
        } else if let Some(short) = token.strip_prefix('-')
            && short.len() == 1
            && !short.chars().next().unwrap().is_ascii_digit()
        {
            let short_char = short.chars().next().unwrap();
            let spec =
                metadata
                    .flag_by_short(short_char)
                    .ok_or_else(|| ParseError::UnknownFlag {
                        flag: short.to_string(),
                        command: command_label.clone(),
                    })?;
            match &spec.kind {
                FlagType::Bool => {
                    flags.insert(spec.name.clone(), FlagValue::Bool(true));
                }
                kind => {
                    let value = match tokens.peek() {
                        Some(next) if !next.starts_with('-') => {
                            tokens.next().expect("peeked").clone()
                        }
                        _ => {
                            return Err(ParseError::MissingFlagValue {
                                flag: spec.name.clone(),
                            });
                        }
                    };
                    flags.insert(spec.name.clone(), typed_value(&spec.name, kind, value)?);
                }
            }
        } else {
            args.push(token.clone());
        }
    }

    // Apply defaults for flags the user left out
    for spec in &metadata.flags_spec {
        if !flags.contains_key(&spec.name)
            && let Some(default) = &spec.default
        {
            flags.insert(spec.name.clone(), default.clone());
        }
    }

    Ok(Command {
        namespace: raw.namespace.clone(),
        name: raw.name.clone(),
        args,
        flags,
        raw_text: raw.raw_text.clone(),
    })
}

/// Render the canonical textual form: flags in name order, then
/// positionals, with quoting only where needed.
#[must_use]
pub fn format_command(command: &Command) -> String {
    let mut out = format!("/{}:{}", command.namespace, command.name);

    for (name, value) in &command.flags {
        match value {
            FlagValue::Bool(true) => {
                out.push_str(&format!(" --{name}"));
            }
            FlagValue::Bool(false) => {}
            FlagValue::Number(n) => {
                out.push_str(&format!(" --{name}={n}"));
            }
            FlagValue::Text(s) => {
                out.push_str(&format!(" --{name}={}", quote_if_needed(s)));
            }
        }
    }
    for arg in &command.args {
        out.push(' ');
        out.push_str(&quote_if_needed(arg));
    }
    out
}

fn quote_if_needed(s: &str) -> String {
    if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'') {
        format!("\"{}\"", s.replace('"', "\\\""))
    } else {
        s.to_string()
    }
}

fn typed_value(flag: &str, kind: &FlagType, value: String) -> Result<FlagValue, ParseError> {
    match kind {
        FlagType::Bool => unreachable!("boolean flags never reach typed_value"),
        FlagType::Text => Ok(FlagValue::Text(value)),
        FlagType::Number => value.parse::<i64>().map(FlagValue::Number).map_err(|_| {
            ParseError::InvalidFlagValue {
                flag: flag.to_string(),
                value,
                expected: "integer".to_string(),
            }
        }),
        FlagType::Choice { allowed } => {
            if allowed.contains(&value) {
                Ok(FlagValue::Text(value))
            } else {
                Err(ParseError::DisallowedFlagValue {
                    flag: flag.to_string(),
                    value,
                    allowed: allowed.join(", "),
                })
            }
        }
    }
}

fn validate_identifier(ident: &str) -> Result<(), ParseError> {
    let valid = !ident.is_empty()
        && ident
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidIdentifier {
            ident: ident.to_string(),
        })
    }
}

/// Split on whitespace with single- and double-quote grouping and
/// backslash escapes inside double quotes.
fn tokenize(text: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    let mut in_token = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(escaped) => current.push(escaped),
                            None => return Err(ParseError::UnterminatedQuote),
                        },
                        Some(inner) => current.push(inner),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(inner) => current.push(inner),
                        None => return Err(ParseError::UnterminatedQuote),
                    }
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Complexity, Expectations, FlagSpec};
    use proptest::prelude::*;

    fn implement_metadata() -> CommandMetadata {
        CommandMetadata {
            name: "implement".to_string(),
            namespace: "sc".to_string(),
            category: "engineering".to_string(),
            description: "implement a feature".to_string(),
            complexity: Complexity::High,
            mcp_servers: vec![],
            personas: vec![],
            flags_spec: vec![
                FlagSpec {
                    name: "consensus".to_string(),
                    short: Some('c'),
                    kind: FlagType::Bool,
                    default: None,
                    description: String::new(),
                },
                FlagSpec {
                    name: "iterations".to_string(),
                    short: None,
                    kind: FlagType::Number,
                    default: Some(FlagValue::Number(3)),
                    description: String::new(),
                },
                FlagSpec {
                    name: "tier".to_string(),
                    short: None,
                    kind: FlagType::Choice {
                        allowed: vec!["deep_thinking".to_string(), "fast_iteration".to_string()],
                    },
                    default: None,
                    description: String::new(),
                },
                FlagSpec {
                    name: "label".to_string(),
                    short: None,
                    kind: FlagType::Text,
                    default: None,
                    description: String::new(),
                },
            ],
            requires_evidence: true,
            default_agent: None,
            expectations: Expectations::default(),
        }
    }

    fn parse_full(text: &str) -> Result<Command, ParseError> {
        let raw = parse_raw(text)?;
        validate_invocation(&raw, &implement_metadata())
    }

    #[test]
    fn parses_head_and_positional() {
        let command = parse_full("/sc:implement \"Add health endpoint\"").unwrap();
        assert_eq!(command.namespace, "sc");
        assert_eq!(command.name, "implement");
        assert_eq!(command.args, vec!["Add health endpoint"]);
        // Default applied
        assert_eq!(command.flags["iterations"], FlagValue::Number(3));
    }

    #[test]
    fn all_flag_forms_parse() {
        let command =
            parse_full("/sc:implement --consensus --iterations=2 --tier deep_thinking task")
                .unwrap();
        assert_eq!(command.flags["consensus"], FlagValue::Bool(true));
        assert_eq!(command.flags["iterations"], FlagValue::Number(2));
        assert_eq!(
            command.flags["tier"],
            FlagValue::Text("deep_thinking".to_string())
        );
        assert_eq!(command.args, vec!["task"]);

        let short = parse_full("/sc:implement -c task").unwrap();
        assert_eq!(short.flags["consensus"], FlagValue::Bool(true));
    }

    #[test]
    fn unknown_flag_is_structured_error() {
        let err = parse_full("/sc:implement --mystery").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownFlag {
                flag: "mystery".to_string(),
                command: "sc:implement".to_string(),
            }
        );
    }

    #[test]
    fn unknown_namespace_fails() {
        let err = parse_raw("/xx:implement task").unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownNamespace {
                namespace: "xx".to_string()
            }
        );
    }

    #[test]
    fn missing_separator_fails() {
        let err = parse_raw("/implement task").unwrap_err();
        assert!(matches!(err, ParseError::MissingSeparator { .. }));
    }

    #[test]
    fn missing_slash_fails() {
        let err = parse_raw("sc:implement").unwrap_err();
        assert!(matches!(err, ParseError::MissingSlash { .. }));
    }

    #[test]
    fn number_flag_rejects_text() {
        let err = parse_full("/sc:implement --iterations=lots").unwrap_err();
        assert!(matches!(err, ParseError::InvalidFlagValue { .. }));
    }

    #[test]
    fn choice_flag_rejects_unlisted_value() {
        let err = parse_full("/sc:implement --tier=psychic").unwrap_err();
        match err {
            ParseError::DisallowedFlagValue { allowed, .. } => {
                assert!(allowed.contains("deep_thinking"));
            }
            other => panic!("expected DisallowedFlagValue, got {other:?}"),
        }
    }

    #[test]
    fn boolean_flag_rejects_inline_value() {
        let err = parse_full("/sc:implement --consensus=yes").unwrap_err();
        assert!(matches!(err, ParseError::InvalidFlagValue { .. }));
    }

    #[test]
    fn value_flag_without_value_fails() {
        let err = parse_full("/sc:implement --label").unwrap_err();
        assert!(matches!(err, ParseError::MissingFlagValue { .. }));

        let err = parse_full("/sc:implement --label --consensus").unwrap_err();
        assert!(matches!(err, ParseError::MissingFlagValue { .. }));
    }

    #[test]
    fn unterminated_quote_fails() {
        let err = parse_raw("/sc:implement \"unclosed").unwrap_err();
        assert_eq!(err, ParseError::UnterminatedQuote);
    }

    #[test]
    fn quoted_args_preserve_spaces_and_quotes() {
        let command = parse_full("/sc:implement \"two words\" 'single quoted'").unwrap();
        assert_eq!(command.args, vec!["two words", "single quoted"]);

        let escaped = parse_full(r#"/sc:implement "say \"hi\"""#).unwrap();
        assert_eq!(escaped.args, vec![r#"say "hi""#]);
    }

    #[test]
    fn format_renders_canonical_form() {
        let command = parse_full("/sc:implement --consensus --tier=deep_thinking \"a task\"")
            .unwrap();
        let rendered = format_command(&command);
        assert_eq!(
            rendered,
            "/sc:implement --consensus --iterations=3 --tier=deep_thinking \"a task\""
        );
    }

    #[test]
    fn parse_format_round_trip() {
        let texts = [
            "/sc:implement task",
            "/sc:implement --consensus --iterations=2 \"multi word task\"",
            "/sc:implement --tier=fast_iteration --label=x one two",
        ];
        for text in texts {
            let first = parse_full(text).unwrap();
            let rendered = format_command(&first);
            let second = parse_full(&rendered).unwrap();
            // raw_text differs; everything semantic must survive
            assert_eq!(first.namespace, second.namespace);
            assert_eq!(first.name, second.name);
            assert_eq!(first.args, second.args);
            assert_eq!(first.flags, second.flags);
        }
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary_positionals(
            // Leading '-' would read as a flag; the grammar reserves it
            args in proptest::collection::vec("[a-zA-Z0-9_.][a-zA-Z0-9 _./-]{0,19}", 0..4),
            consensus in proptest::bool::ANY,
            iterations in 1i64..10,
        ) {
            let mut text = "/sc:implement".to_string();
            if consensus {
                text.push_str(" --consensus");
            }
            text.push_str(&format!(" --iterations={iterations}"));
            for arg in &args {
                text.push_str(&format!(" \"{arg}\""));
            }

            let first = parse_full(&text).unwrap();
            let second = parse_full(&format_command(&first)).unwrap();
            prop_assert_eq!(&first.args, &second.args);
            prop_assert_eq!(&first.flags, &second.flags);
        }
    }
}
