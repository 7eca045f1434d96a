//! Autotype keystroke-script tokenizer
//!
//! Parses the backslash-escape autotype language into a stream of tokens:
//! literal keys to send, and symbolic commands such as `UserName` or
//! `Delay:N`. A bound variant expands field commands against a concrete
//! entry into per-character key tokens.

use crate::entry::Entry;

/// One unit of an autotype script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutotypeToken {
    /// A literal to send, in send-keys notation (e.g. `a`, `{Tab}`, `+{Tab}`).
    Key(String),
    /// A symbolic action resolved by the consumer (e.g. `Password`, `Wait:500`).
    Command(String),
}

impl AutotypeToken {
    fn key(text: impl Into<String>) -> Self {
        Self::Key(text.into())
    }

    fn command(text: impl Into<String>) -> Self {
        Self::Command(text.into())
    }
}

enum State {
    Default,
    Escape,
    /// After `\c`; one more character selects the credit-card field.
    CreditCard,
    /// After `\d`, `\w`, or `\W`; at least one digit is required.
    MandatoryNumber(char),
    /// After `\o`; digits are optional.
    OptionalNumber,
}

/// Map one character to its send-keys token.
///
/// The send-keys meta-characters are emitted as bracketed literals; control
/// characters map to their named keys.
fn push_key(out: &mut Vec<AutotypeToken>, ch: char) {
    let key = match ch {
        '+' | '^' | '%' | '~' | '(' | ')' | '{' | '}' | '[' | ']' => format!("{{{ch}}}"),
        '\u{8}' => "{Backspace}".to_string(),
        '\n' | '\r' => "{Enter}".to_string(),
        '\t' => "{Tab}".to_string(),
        _ => ch.to_string(),
    };
    out.push(AutotypeToken::Key(key));
}

fn push_text_keys(out: &mut Vec<AutotypeToken>, text: &str) {
    for ch in text.chars() {
        push_key(out, ch);
    }
}

fn push_number_command(out: &mut Vec<AutotypeToken>, kind: char, digits: &str) {
    // At most three digits were collected, so this cannot overflow.
    let n: u32 = digits.parse().unwrap_or(0);
    let command = match kind {
        'd' => format!("Delay:{n}"),
        'w' => format!("Wait:{n}"),
        _ => format!("Wait:{}", n * 1000),
    };
    out.push(AutotypeToken::command(command));
}

fn push_notes_command(out: &mut Vec<AutotypeToken>, digits: &str) {
    if digits.is_empty() {
        out.push(AutotypeToken::command("Notes"));
    } else {
        let n: u32 = digits.parse().unwrap_or(0);
        out.push(AutotypeToken::command(format!("Notes:{n}")));
    }
}

/// Tokenize an autotype script.
///
/// An empty script yields the default sequence: user name, tab, password,
/// tab, enter.
pub fn tokenize(text: &str) -> Vec<AutotypeToken> {
    if text.is_empty() {
        return vec![
            AutotypeToken::command("UserName"),
            AutotypeToken::key("{Tab}"),
            AutotypeToken::command("Password"),
            AutotypeToken::key("{Tab}"),
            AutotypeToken::key("{Enter}"),
        ];
    }

    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut state = State::Default;
    let mut digits = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match state {
            State::Default => {
                if ch == '\\' {
                    state = State::Escape;
                } else {
                    push_key(&mut out, ch);
                }
                i += 1;
            }
            State::Escape => {
                state = State::Default;
                match ch {
                    'u' => out.push(AutotypeToken::command("UserName")),
                    'p' => out.push(AutotypeToken::command("Password")),
                    '2' => out.push(AutotypeToken::command("TwoFactorCode")),
                    'g' => out.push(AutotypeToken::command("Group")),
                    'i' => out.push(AutotypeToken::command("Title")),
                    'l' => out.push(AutotypeToken::command("Url")),
                    'm' => out.push(AutotypeToken::command("Email")),
                    'z' => out.push(AutotypeToken::command("Legacy")),
                    'b' => out.push(AutotypeToken::key("{Backspace}")),
                    't' => out.push(AutotypeToken::key("{Tab}")),
                    's' => out.push(AutotypeToken::key("+{Tab}")),
                    'n' => out.push(AutotypeToken::key("{Enter}")),
                    'c' => state = State::CreditCard,
                    'd' | 'w' | 'W' => {
                        digits.clear();
                        state = State::MandatoryNumber(ch);
                    }
                    'o' => {
                        digits.clear();
                        state = State::OptionalNumber;
                    }
                    other => push_key(&mut out, other),
                }
                i += 1;
            }
            State::CreditCard => {
                state = State::Default;
                match ch {
                    'n' => out.push(AutotypeToken::command("CreditCardNumber")),
                    'e' => out.push(AutotypeToken::command("CreditCardExpiration")),
                    'v' => out.push(AutotypeToken::command("CreditCardVerification")),
                    'p' => out.push(AutotypeToken::command("CreditCardPin")),
                    other => {
                        push_key(&mut out, 'c');
                        push_key(&mut out, other);
                    }
                }
                i += 1;
            }
            State::MandatoryNumber(kind) => {
                if ch.is_ascii_digit() && digits.len() < 3 {
                    digits.push(ch);
                    i += 1;
                } else if digits.is_empty() {
                    // No digit followed; the escape degrades to literals.
                    push_key(&mut out, kind);
                    push_key(&mut out, ch);
                    state = State::Default;
                    i += 1;
                } else {
                    push_number_command(&mut out, kind, &digits);
                    state = State::Default;
                    // Reprocess this character outside the number.
                }
            }
            State::OptionalNumber => {
                if ch.is_ascii_digit() && digits.len() < 3 {
                    digits.push(ch);
                    i += 1;
                } else {
                    push_notes_command(&mut out, &digits);
                    state = State::Default;
                    // Reprocess this character outside the number.
                }
            }
        }
    }

    match state {
        State::Default => {}
        State::Escape => out.push(AutotypeToken::key("\\")),
        State::CreditCard => push_key(&mut out, 'c'),
        State::MandatoryNumber(kind) => {
            if digits.is_empty() {
                push_key(&mut out, kind);
            } else {
                push_number_command(&mut out, kind, &digits);
            }
        }
        State::OptionalNumber => push_notes_command(&mut out, &digits),
    }

    out
}

/// Tokenize a script and expand field commands against an entry.
///
/// Field commands become per-character key tokens; `TwoFactorCode`, `Legacy`,
/// `Delay:N`, and `Wait:N` pass through for the consumer to act on.
pub fn tokenize_entry(text: &str, entry: &Entry) -> Vec<AutotypeToken> {
    let mut out = Vec::new();
    for token in tokenize(text) {
        match token {
            AutotypeToken::Key(key) => out.push(AutotypeToken::Key(key)),
            AutotypeToken::Command(command) => expand_command(&mut out, &command, entry),
        }
    }
    out
}

fn expand_command(out: &mut Vec<AutotypeToken>, command: &str, entry: &Entry) {
    match command {
        "UserName" => push_text_keys(out, &entry.user_name()),
        "Password" => push_text_keys(out, &entry.password()),
        "Group" => push_text_keys(out, &entry.group()),
        "Title" => push_text_keys(out, &entry.title()),
        "Url" => push_text_keys(out, &entry.url()),
        "Email" => push_text_keys(out, &entry.email()),
        "CreditCardNumber" => push_text_keys(out, &entry.credit_card_number()),
        "CreditCardExpiration" => push_text_keys(out, &entry.credit_card_expiration()),
        "CreditCardVerification" => {
            push_text_keys(out, &entry.credit_card_verification_value());
        }
        "CreditCardPin" => push_text_keys(out, &entry.credit_card_pin()),
        "Notes" => push_text_keys(out, &normalize_newlines(&entry.notes())),
        _ => {
            if let Some(line) = command.strip_prefix("Notes:") {
                push_notes_line(out, entry, line);
            } else {
                out.push(AutotypeToken::command(command));
            }
        }
    }
}

/// Emit one 1-indexed line of the notes. Out-of-range or non-numeric line
/// selectors produce no output.
fn push_notes_line(out: &mut Vec<AutotypeToken>, entry: &Entry, selector: &str) {
    let Ok(wanted) = selector.parse::<usize>() else {
        return;
    };
    if wanted == 0 {
        return;
    }
    let notes = normalize_newlines(&entry.notes());
    if let Some(line) = notes.split('\n').nth(wanted - 1) {
        push_text_keys(out, line);
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use AutotypeToken::{Command, Key};

    fn keys(tokens: &[AutotypeToken]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| match t {
                Key(k) => format!("K:{k}"),
                Command(c) => format!("C:{c}"),
            })
            .collect()
    }

    #[test]
    fn empty_script_yields_default_sequence() {
        assert_eq!(
            tokenize(""),
            vec![
                Command("UserName".into()),
                Key("{Tab}".into()),
                Command("Password".into()),
                Key("{Tab}".into()),
                Key("{Enter}".into()),
            ]
        );
    }

    #[test]
    fn field_escapes_become_commands() {
        assert_eq!(
            keys(&tokenize(r"\u\p\2\g\i\l\m\z")),
            vec![
                "C:UserName",
                "C:Password",
                "C:TwoFactorCode",
                "C:Group",
                "C:Title",
                "C:Url",
                "C:Email",
                "C:Legacy"
            ]
        );
    }

    #[test]
    fn key_escapes_become_named_keys() {
        assert_eq!(
            keys(&tokenize(r"\b\t\s\n")),
            vec!["K:{Backspace}", "K:{Tab}", "K:+{Tab}", "K:{Enter}"]
        );
    }

    #[test]
    fn unknown_escape_is_literal() {
        assert_eq!(keys(&tokenize(r"\q")), vec!["K:q"]);
        assert_eq!(keys(&tokenize(r"\\")), vec!["K:\\"]);
    }

    #[test]
    fn trailing_backslash_is_literal() {
        assert_eq!(keys(&tokenize("ab\\")), vec!["K:a", "K:b", "K:\\"]);
    }

    #[test]
    fn plain_characters_pass_through() {
        assert_eq!(keys(&tokenize("ab1")), vec!["K:a", "K:b", "K:1"]);
    }

    #[test]
    fn metacharacters_are_bracketed() {
        assert_eq!(
            keys(&tokenize("+^%~()")),
            vec!["K:{+}", "K:{^}", "K:{%}", "K:{~}", "K:{(}", "K:{)}"]
        );
        assert_eq!(
            keys(&tokenize("{}[]")),
            vec!["K:{{}", "K:{}}", "K:{[}", "K:{]}"]
        );
    }

    #[test]
    fn credit_card_escapes() {
        assert_eq!(
            keys(&tokenize(r"\cn\ce\cv\cp")),
            vec![
                "C:CreditCardNumber",
                "C:CreditCardExpiration",
                "C:CreditCardVerification",
                "C:CreditCardPin"
            ]
        );
    }

    #[test]
    fn unknown_credit_card_selector_degrades_to_literals() {
        assert_eq!(keys(&tokenize(r"\cx")), vec!["K:c", "K:x"]);
        assert_eq!(keys(&tokenize(r"\c")), vec!["K:c"]);
    }

    #[test]
    fn delay_and_wait_collect_up_to_three_digits() {
        assert_eq!(keys(&tokenize(r"\d123")), vec!["C:Delay:123"]);
        assert_eq!(keys(&tokenize(r"\w45")), vec!["C:Wait:45"]);
        assert_eq!(keys(&tokenize(r"\W2")), vec!["C:Wait:2000"]);
        // A fourth digit is an ordinary key.
        assert_eq!(keys(&tokenize(r"\d1234")), vec!["C:Delay:123", "K:4"]);
    }

    #[test]
    fn number_escape_without_digit_degrades_to_literals() {
        assert_eq!(keys(&tokenize(r"\dx")), vec!["K:d", "K:x"]);
        assert_eq!(keys(&tokenize(r"\d")), vec!["K:d"]);
        assert_eq!(keys(&tokenize(r"\W")), vec!["K:W"]);
    }

    #[test]
    fn number_escape_resumes_parsing_after_digits() {
        assert_eq!(
            keys(&tokenize(r"\d12\u")),
            vec!["C:Delay:12", "C:UserName"]
        );
    }

    #[test]
    fn optional_number_selects_notes() {
        assert_eq!(keys(&tokenize(r"\o")), vec!["C:Notes"]);
        assert_eq!(keys(&tokenize(r"\o2")), vec!["C:Notes:2"]);
        assert_eq!(keys(&tokenize(r"\o12x")), vec!["C:Notes:12", "K:x"]);
    }

    #[test]
    fn bound_expansion_types_fields() {
        let mut entry = Entry::new();
        entry.set_user_name("x").unwrap();
        entry.set_password("y").unwrap();

        assert_eq!(
            tokenize_entry("\\u\\t\\p\\n", &entry),
            vec![
                Key("x".into()),
                Key("{Tab}".into()),
                Key("y".into()),
                Key("{Enter}".into()),
            ]
        );
    }

    #[test]
    fn bound_expansion_maps_metacharacters_in_field_values() {
        let mut entry = Entry::new();
        entry.set_password("a+b").unwrap();
        assert_eq!(
            keys(&tokenize_entry(r"\p", &entry)),
            vec!["K:a", "K:{+}", "K:b"]
        );
    }

    #[test]
    fn bound_expansion_passes_commands_through() {
        let entry = Entry::new();
        assert_eq!(
            keys(&tokenize_entry(r"\2\z\d5", &entry)),
            vec!["C:TwoFactorCode", "C:Legacy", "C:Delay:5"]
        );
    }

    #[test]
    fn empty_script_expands_against_entry() {
        let mut entry = Entry::new();
        entry.set_user_name("ab").unwrap();
        entry.set_password("c").unwrap();
        assert_eq!(
            keys(&tokenize_entry("", &entry)),
            vec!["K:a", "K:b", "K:{Tab}", "K:c", "K:{Tab}", "K:{Enter}"]
        );
    }

    #[test]
    fn notes_expand_with_normalized_newlines() {
        let mut entry = Entry::new();
        entry.set_notes("one\r\ntwo").unwrap();
        assert_eq!(
            keys(&tokenize_entry(r"\o", &entry)),
            vec!["K:o", "K:n", "K:e", "K:{Enter}", "K:t", "K:w", "K:o"]
        );
    }

    #[test]
    fn notes_line_selection_is_one_indexed() {
        let mut entry = Entry::new();
        entry.set_notes("alpha\nbeta\ngamma").unwrap();
        assert_eq!(
            keys(&tokenize_entry(r"\o2", &entry)),
            vec!["K:b", "K:e", "K:t", "K:a"]
        );
        // Out of range produces no output.
        assert!(tokenize_entry(r"\o9", &entry).is_empty());
    }
}
