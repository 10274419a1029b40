use log::{debug, warn};

use crate::ast::{Pipeline, Redirect, Stage};
use crate::error::ParseError;
use crate::expander::expand_home;

/// Separates the stages of a pipeline.
pub const STAGE_SEPARATOR: char = '|';
/// A trailing `&` runs the line in the background.
pub const BACKGROUND_MARKER: char = '&';

/// States for the tokenizer state machine.
enum State {
    /// Between tokens: whitespace is skipped
    Normal,
    /// Building an unquoted word: whitespace ends it
    InWord,
    /// Inside double quotes: whitespace and `'` are literal
    InDoubleQuote,
    /// Inside single quotes: whitespace and `"` are literal
    InSingleQuote,
}

/// Read the first word of `input`, returning it together with the
/// unconsumed remainder. `None` when no non-empty word is left.
///
/// Quote characters are consumed, never emitted, so `''` and `""` alone
/// produce nothing. An unterminated quote runs to the end of input.
pub fn split_first_word(input: &str) -> Option<(String, &str)> {
    let mut word = String::new();
    let mut state = State::Normal;

    for (idx, ch) in input.char_indices() {
        match (&state, ch) {
            (State::Normal, c) if c.is_whitespace() => {}
            (State::InWord, c) if c.is_whitespace() => {
                if !word.is_empty() {
                    return Some((word, &input[idx..]));
                }
                state = State::Normal;
            }
            (State::Normal | State::InWord, '"') => state = State::InDoubleQuote,
            (State::Normal | State::InWord, '\'') => state = State::InSingleQuote,
            (State::Normal | State::InWord, c) => {
                word.push(c);
                state = State::InWord;
            }
            (State::InDoubleQuote, '"') | (State::InSingleQuote, '\'') => state = State::InWord,
            (State::InDoubleQuote | State::InSingleQuote, c) => word.push(c),
        }
    }

    (!word.is_empty()).then_some((word, ""))
}

/// Split a line into whitespace-separated words honoring quotes.
pub fn tokenize(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut rest = input;
    while let Some((word, remainder)) = split_first_word(rest) {
        words.push(word);
        rest = remainder;
    }
    words
}

/// Byte offsets and characters of `input` that sit outside any quotes.
/// The quote characters themselves are skipped.
fn unquoted_chars(input: &str) -> impl Iterator<Item = (usize, char)> + '_ {
    let mut quote: Option<char> = None;
    input.char_indices().filter(move |&(_, ch)| match quote {
        Some(open) => {
            if ch == open {
                quote = None;
            }
            false
        }
        None if ch == '"' || ch == '\'' => {
            quote = Some(ch);
            false
        }
        None => true,
    })
}

/// Position of the first occurrence of `pattern` that starts outside quotes.
pub fn find_unquoted(input: &str, pattern: &str) -> Option<usize> {
    unquoted_chars(input)
        .map(|(idx, _)| idx)
        .find(|&idx| input[idx..].starts_with(pattern))
}

/// Split on every unquoted occurrence of `separator`.
pub fn split_unquoted(input: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, ch) in unquoted_chars(input) {
        if ch == separator {
            parts.push(&input[start..idx]);
            start = idx + ch.len_utf8();
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Strip a trailing, unquoted background marker.
fn strip_background(line: &str) -> (&str, bool) {
    let trimmed = line.trim_end();
    match unquoted_chars(trimmed).last() {
        Some((idx, BACKGROUND_MARKER)) if idx + 1 == trimmed.len() => {
            (trimmed[..idx].trim_end(), true)
        }
        _ => (trimmed, false),
    }
}

/// Remove the operator at `pos` and the word following it from `text`,
/// returning that word.
fn take_target(text: &mut String, pos: usize, operator: &str) -> Option<String> {
    let after = &text[pos + operator.len()..];
    let (target, rest) = match split_first_word(after) {
        Some((word, rest)) => (Some(word), rest.to_string()),
        None => (None, String::new()),
    };
    if target.is_none() {
        warn!("redirection `{operator}' without a target ignored");
    }
    *text = format!("{} {}", &text[..pos], rest);
    target
}

/// Extract a `long`/`short` operator pair (append variant first).
fn take_output_redirect(text: &mut String, long: &str, short: &str) -> Option<Redirect> {
    if let Some(pos) = find_unquoted(text, long) {
        take_target(text, pos, long).map(|path| Redirect::append(expand_home(&path)))
    } else if let Some(pos) = find_unquoted(text, short) {
        take_target(text, pos, short).map(|path| Redirect::truncate(expand_home(&path)))
    } else {
        None
    }
}

/// Parse one `|`-separated segment into a stage. Redirections are detected
/// in the order stderr, stdout, stdin; only the first of each kind counts.
fn parse_stage(segment: &str) -> Stage {
    let mut rest = segment.to_string();

    let error = take_output_redirect(&mut rest, "2>>", "2>");
    let output = take_output_redirect(&mut rest, ">>", ">");
    let input = find_unquoted(&rest, "<")
        .and_then(|pos| take_target(&mut rest, pos, "<"))
        .map(|path| Redirect::truncate(expand_home(&path)));

    let args = tokenize(&rest).iter().map(|arg| expand_home(arg)).collect();

    Stage { args, input, output, error, background: false }
}

/// Parse a (variable-substituted) line into a pipeline.
///
/// Returns `Ok(None)` for a blank line.
pub fn parse_pipeline(line: &str) -> Result<Option<Pipeline>, ParseError> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let (body, background) = strip_background(line);
    let mut stages = Vec::new();
    for (idx, segment) in split_unquoted(body, STAGE_SEPARATOR).into_iter().enumerate() {
        let stage = parse_stage(segment);
        if stage.args.is_empty() {
            return Err(ParseError::MissingCommand { stage: idx + 1, line: line.trim().to_string() });
        }
        stages.push(stage);
    }

    if let Some(last) = stages.last_mut() {
        last.background = background;
    }

    debug!("parsed {} stage(s) from {line:?} (background: {background})", stages.len());
    Ok(Some(Pipeline { stages }))
}
