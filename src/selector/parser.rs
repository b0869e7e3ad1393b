//! CSS3 selector grammar
//!
//! Tokens come from cssparser; this module only arranges them into a small
//! AST. Only syntax is checked here; whether a pseudo-class has an XPath
//! rendering is decided during translation.

use cssparser::{
    parse_nth, BasicParseErrorKind, ParseError, ParseErrorKind, Parser, ParserInput, SourcePosition,
    ToCss, Token,
};

use super::SelectorError;

/// `a, b, c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorGroup(pub Vec<ComplexSelector>);

/// Compound selectors joined by combinators, e.g. `ul > li.item`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub head: Compound,
    pub tail: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// whitespace
    Descendant,
    /// `>`
    Child,
    /// `+`
    NextSibling,
    /// `~`
    SubsequentSibling,
}

/// A type selector (or `*`) followed by any number of filters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Compound {
    /// `None` for `*` or an omitted type selector
    pub element: Option<String>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `=`
    Equals,
    /// `~=`
    Includes,
    /// `|=`
    DashMatch,
    /// `^=`
    Prefix,
    /// `$=`
    Suffix,
    /// `*=`
    Substring,
    /// `!=`
    NotEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NthKind {
    Child,
    LastChild,
    OfType,
    LastOfType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Id(String),
    Class(String),
    Attribute {
        name: String,
        matcher: Option<(AttrOp, String)>,
    },
    /// Non-functional pseudo-class, lowercased
    Pseudo(String),
    /// `:nth-*(an+b)`
    Nth { kind: NthKind, a: i32, b: i32 },
    Contains(String),
    Lang(String),
    Not(Compound),
}

/// Pseudo-elements CSS2 allowed with a single colon
const LEGACY_PSEUDO_ELEMENTS: &[&str] = &["first-line", "first-letter", "before", "after"];

type ParseResult<'i, T> = Result<T, ParseError<'i, SelectorError>>;

pub fn parse(css: &str) -> Result<SelectorGroup, SelectorError> {
    if css.trim_matches(is_css_whitespace).is_empty() {
        return Err(SelectorError::Empty);
    }

    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    parser
        .parse_entirely(|parser| parser.parse_comma_separated(|parser| complex_selector(parser)))
        .map(SelectorGroup)
        .map_err(selector_error)
}

fn is_css_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r' | '\x0c')
}

fn selector_error(err: ParseError<'_, SelectorError>) -> SelectorError {
    let column = err.location.column;
    match err.kind {
        ParseErrorKind::Custom(err) => err,
        ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => SelectorError::UnexpectedEnd,
        ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
            SelectorError::UnexpectedToken {
                found: token.to_css_string(),
                column,
            }
        }
        ParseErrorKind::Basic(other) => SelectorError::UnexpectedToken {
            found: other.to_string(),
            column,
        },
    }
}

fn unsupported<'i>(input: &Parser<'i, '_>, what: &str) -> ParseError<'i, SelectorError> {
    input.new_custom_error(SelectorError::Unsupported(what.to_string()))
}

/// The next token, whitespace included; `None` at the end of the (nested) input
fn next_token<'i>(input: &mut Parser<'i, '_>) -> Option<Token<'i>> {
    input.next_including_whitespace().ok().cloned()
}

/// cssparser closes blocks left open at the end of input; a selector must not
fn expect_closed<'i>(
    input: &Parser<'i, '_>,
    start: SourcePosition,
    close: char,
) -> ParseResult<'i, ()> {
    if input.slice_from(start).ends_with(close) {
        Ok(())
    } else {
        Err(input.new_error(BasicParseErrorKind::EndOfInput))
    }
}

fn complex_selector<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, ComplexSelector> {
    input.skip_whitespace();
    let head = compound(input)?;
    let mut tail = vec![];

    loop {
        let mut had_whitespace = false;
        let combinator = loop {
            let state = input.state();
            match next_token(input) {
                None => return Ok(ComplexSelector { head, tail }),
                Some(Token::WhiteSpace(_)) => had_whitespace = true,
                Some(Token::Delim('>')) => break Combinator::Child,
                Some(Token::Delim('+')) => break Combinator::NextSibling,
                Some(Token::Delim('~')) => break Combinator::SubsequentSibling,
                Some(_) if had_whitespace => {
                    input.reset(&state);
                    break Combinator::Descendant;
                }
                Some(token) => return Err(input.new_unexpected_token_error(token)),
            }
        };
        input.skip_whitespace();
        tail.push((combinator, compound(input)?));
    }
}

fn compound<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, Compound> {
    let mut compound = Compound::default();
    let mut universal = false;

    let state = input.state();
    match next_token(input) {
        Some(Token::Ident(name)) => compound.element = Some(name.to_string()),
        Some(Token::Delim('*')) => universal = true,
        _ => input.reset(&state),
    }

    let state = input.state();
    if matches!(next_token(input), Some(Token::Delim('|'))) {
        return Err(unsupported(input, "namespace prefixes"));
    }
    input.reset(&state);

    loop {
        let state = input.state();
        let filter = match next_token(input) {
            Some(Token::IDHash(id) | Token::Hash(id)) => Filter::Id(id.to_string()),
            Some(Token::Delim('.')) => match next_token(input) {
                Some(Token::Ident(class)) => Filter::Class(class.to_string()),
                Some(token) => return Err(input.new_unexpected_token_error(token)),
                None => return Err(input.new_error(BasicParseErrorKind::EndOfInput)),
            },
            Some(Token::SquareBracketBlock) => {
                let start = input.position();
                let filter = input.parse_nested_block(|input| attribute(input))?;
                expect_closed(input, start, ']')?;
                filter
            }
            Some(Token::Colon) => pseudo(input)?,
            _ => {
                input.reset(&state);
                break;
            }
        };
        compound.filters.push(filter);
    }

    if !universal && compound.element.is_none() && compound.filters.is_empty() {
        return Err(input.new_error_for_next_token());
    }

    Ok(compound)
}

/// The inside of `[...]`
fn attribute<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, Filter> {
    let name = input.expect_ident()?.to_string();

    let state = input.state();
    if matches!(next_token(input), Some(Token::Delim('|'))) {
        return Err(unsupported(input, "namespace prefixes"));
    }
    input.reset(&state);

    let op = match input.next().ok().cloned() {
        None => return Ok(Filter::Attribute { name, matcher: None }),
        Some(Token::Delim('=')) => AttrOp::Equals,
        Some(Token::IncludeMatch) => AttrOp::Includes,
        Some(Token::DashMatch) => AttrOp::DashMatch,
        Some(Token::PrefixMatch) => AttrOp::Prefix,
        Some(Token::SuffixMatch) => AttrOp::Suffix,
        Some(Token::SubstringMatch) => AttrOp::Substring,
        Some(Token::Delim('!')) => match next_token(input) {
            Some(Token::Delim('=')) => AttrOp::NotEqual,
            Some(token) => return Err(input.new_unexpected_token_error(token)),
            None => return Err(input.new_error(BasicParseErrorKind::EndOfInput)),
        },
        Some(token) => return Err(input.new_unexpected_token_error(token)),
    };
    let value = ident_or_string(input)?;

    Ok(Filter::Attribute {
        name,
        matcher: Some((op, value)),
    })
}

/// An identifier or a terminated quoted string
fn ident_or_string<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    input.skip_whitespace();
    let start = input.position();
    let value = input.expect_ident_or_string()?.to_string();
    let raw = input.slice_from(start);
    if let Some(quote) = raw.chars().next().filter(|c| matches!(c, '"' | '\'')) {
        if raw.len() < 2 || !raw.ends_with(quote) {
            return Err(input.new_error(BasicParseErrorKind::EndOfInput));
        }
    }
    Ok(value)
}

/// Everything after the `:` of a pseudo-class
fn pseudo<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, Filter> {
    let name = match next_token(input) {
        Some(Token::Colon) => {
            return match next_token(input) {
                Some(Token::Ident(name) | Token::Function(name)) => Err(input
                    .new_custom_error(SelectorError::PseudoElement(name.to_string()))),
                Some(token) => Err(input.new_unexpected_token_error(token)),
                None => Err(input.new_error(BasicParseErrorKind::EndOfInput)),
            };
        }
        Some(Token::Ident(name)) => {
            let name = name.to_ascii_lowercase();
            if LEGACY_PSEUDO_ELEMENTS.contains(&name.as_str()) {
                return Err(input.new_custom_error(SelectorError::PseudoElement(name)));
            }
            return Ok(Filter::Pseudo(name));
        }
        Some(Token::Function(name)) => name.to_ascii_lowercase(),
        Some(token) => return Err(input.new_unexpected_token_error(token)),
        None => return Err(input.new_error(BasicParseErrorKind::EndOfInput)),
    };

    let kind = match name.as_str() {
        "nth-child" => Some(NthKind::Child),
        "nth-last-child" => Some(NthKind::LastChild),
        "nth-of-type" => Some(NthKind::OfType),
        "nth-last-of-type" => Some(NthKind::LastOfType),
        _ => None,
    };

    let start = input.position();
    let filter = match (name.as_str(), kind) {
        (_, Some(kind)) => {
            let (a, b) = input.parse_nested_block(|input| nth_arguments(input))?;
            Filter::Nth { kind, a, b }
        }
        ("not", None) => {
            let inner = input.parse_nested_block(|input| {
                input.skip_whitespace();
                compound(input)
            })?;
            Filter::Not(inner)
        }
        ("contains", None) => {
            Filter::Contains(input.parse_nested_block(|input| ident_or_string(input))?)
        }
        ("lang", None) => Filter::Lang(input.parse_nested_block(|input| ident_or_string(input))?),
        _ => return Err(unsupported(input, &format!(":{name}()"))),
    };
    expect_closed(input, start, ')')?;

    Ok(filter)
}

/// The argument of `:nth-*()`: `odd`, `even` or `an+b`
fn nth_arguments<'i>(input: &mut Parser<'i, '_>) -> ParseResult<'i, (i32, i32)> {
    let start = input.position();
    let parsed: ParseResult<'i, (i32, i32)> = input.parse_entirely(|input| Ok(parse_nth(input)?));
    parsed.or_else(|_| {
        while input.next().is_ok() {}
        let text = input.slice_from(start).trim_matches(is_css_whitespace);
        Err(input.new_custom_error(SelectorError::InvalidNth(text.to_string())))
    })
}
