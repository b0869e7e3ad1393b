//! Translation of parsed selectors into XPath 1.0

use std::fmt;

use super::parser::{AttrOp, Combinator, ComplexSelector, Compound, Filter, NthKind, SelectorGroup};
use super::SelectorError;

/// Axis every top-level selector is evaluated from
const PREFIX: &str = "descendant-or-self::";

/// Pseudo-classes describing interactive state, which a parsed document never has
const STATEFUL_PSEUDO_CLASSES: &[&str] = &[
    "link",
    "visited",
    "hover",
    "active",
    "focus",
    "focus-within",
    "target",
    "enabled",
    "disabled",
    "checked",
];

/// A location step under construction: `{path}{element}[{condition}]`
#[derive(Debug, Clone)]
struct XPathExpr {
    path: String,
    element: String,
    condition: String,
}

impl XPathExpr {
    fn new(element: Option<&str>) -> Self {
        let mut expr = Self {
            path: String::new(),
            element: "*".to_string(),
            condition: String::new(),
        };
        match element {
            Some(name) if is_xpath_name(name) => expr.element = name.to_string(),
            Some(name) => expr.add_condition(&format!("name() = {}", literal(name))),
            None => {}
        }
        expr
    }

    fn add_condition(&mut self, condition: &str) {
        self.condition = if self.condition.is_empty() {
            condition.to_string()
        } else {
            format!("({}) and ({})", self.condition, condition)
        };
    }

    /// Moves the element test into the condition so the step can follow a `::*` axis
    fn add_name_test(&mut self) {
        if self.element != "*" {
            let test = format!("name() = {}", literal(&self.element));
            self.add_condition(&test);
            self.element = "*".to_string();
        }
    }

    fn join(self, combiner: &str, other: XPathExpr) -> XPathExpr {
        XPathExpr {
            path: format!("{self}{combiner}{}", other.path),
            element: other.element,
            condition: other.condition,
        }
    }
}

impl fmt::Display for XPathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.path, self.element)?;
        if !self.condition.is_empty() {
            write!(f, "[{}]", self.condition)?;
        }
        Ok(())
    }
}

pub fn translate(group: &SelectorGroup) -> Result<String, SelectorError> {
    let parts = group
        .0
        .iter()
        .map(|selector| complex(selector).map(|expr| format!("{PREFIX}{expr}")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(" | "))
}

fn complex(selector: &ComplexSelector) -> Result<XPathExpr, SelectorError> {
    let mut expr = compound(&selector.head)?;

    for (combinator, next) in &selector.tail {
        let right = compound(next)?;
        expr = match combinator {
            Combinator::Descendant => expr.join("/descendant-or-self::*/", right),
            Combinator::Child => expr.join("/", right),
            Combinator::NextSibling => {
                let mut joined = expr.join("/following-sibling::", right);
                joined.add_name_test();
                joined.add_condition("position() = 1");
                joined
            }
            Combinator::SubsequentSibling => expr.join("/following-sibling::", right),
        };
    }

    Ok(expr)
}

fn compound(compound: &Compound) -> Result<XPathExpr, SelectorError> {
    let mut expr = XPathExpr::new(compound.element.as_deref());
    for filter in &compound.filters {
        apply_filter(&mut expr, filter)?;
    }
    Ok(expr)
}

fn apply_filter(expr: &mut XPathExpr, filter: &Filter) -> Result<(), SelectorError> {
    match filter {
        Filter::Id(id) => expr.add_condition(&format!("@id = {}", literal(id))),
        Filter::Class(class) => expr.add_condition(&includes_word("@class", class)),
        Filter::Attribute { name, matcher } => {
            let attr = attribute_test(name);
            let condition = match matcher {
                None => attr,
                Some((op, value)) => attribute_condition(&attr, *op, value),
            };
            expr.add_condition(&condition);
        }
        Filter::Pseudo(name) => {
            let condition = pseudo_condition(expr, name)?;
            expr.add_condition(&condition);
        }
        Filter::Nth { kind, a, b } => {
            if let Some(condition) = nth_condition(expr, *kind, *a, *b)? {
                expr.add_condition(&condition);
            }
        }
        Filter::Contains(text) => {
            expr.add_condition(&format!("contains(string(.), {})", literal(text)))
        }
        Filter::Lang(code) => {
            // nearest `lang` attribute, compared case-insensitively on its primary subtag
            let condition = format!(
                "ancestor-or-self::*[@lang][1][starts-with(concat(translate(@lang, \
                 'ABCDEFGHIJKLMNOPQRSTUVWXYZ', 'abcdefghijklmnopqrstuvwxyz'), '-'), {})]",
                literal(&format!("{}-", code.to_ascii_lowercase()))
            );
            expr.add_condition(&condition);
        }
        Filter::Not(inner) => {
            let mut negated = compound(inner)?;
            negated.add_name_test();
            if negated.condition.is_empty() {
                // :not(*) matches nothing
                expr.add_condition("0");
            } else {
                expr.add_condition(&format!("not({})", negated.condition));
            }
        }
    }
    Ok(())
}

fn attribute_condition(attr: &str, op: AttrOp, value: &str) -> String {
    let quoted = literal(value);
    match op {
        AttrOp::Equals => format!("{attr} = {quoted}"),
        AttrOp::NotEqual => format!("not({attr}) or {attr} != {quoted}"),
        AttrOp::Includes => {
            if value.is_empty() || value.chars().any(|c| c.is_ascii_whitespace()) {
                "0".to_string()
            } else {
                includes_word(attr, value)
            }
        }
        AttrOp::DashMatch => format!(
            "{attr} and ({attr} = {quoted} or starts-with({attr}, {}))",
            literal(&format!("{value}-"))
        ),
        AttrOp::Prefix if value.is_empty() => "0".to_string(),
        AttrOp::Prefix => format!("{attr} and starts-with({attr}, {quoted})"),
        AttrOp::Suffix if value.is_empty() => "0".to_string(),
        AttrOp::Suffix => format!(
            "{attr} and substring({attr}, string-length({attr})-{}) = {quoted}",
            value.chars().count() - 1
        ),
        AttrOp::Substring if value.is_empty() => "0".to_string(),
        AttrOp::Substring => format!("{attr} and contains({attr}, {quoted})"),
    }
}

fn pseudo_condition(expr: &XPathExpr, name: &str) -> Result<String, SelectorError> {
    let condition = match name {
        "root" => "not(parent::*)".to_string(),
        "empty" => "not(*) and not(string-length())".to_string(),
        "first-child" => "count(preceding-sibling::*) = 0".to_string(),
        "last-child" => "count(following-sibling::*) = 0".to_string(),
        "only-child" => "count(parent::*/child::*) = 1".to_string(),
        "first-of-type" => {
            format!("count(preceding-sibling::{}) = 0", typed_step(expr, name)?)
        }
        "last-of-type" => {
            format!("count(following-sibling::{}) = 0", typed_step(expr, name)?)
        }
        "only-of-type" => {
            format!("count(parent::*/child::{}) = 1", typed_step(expr, name)?)
        }
        stateful if STATEFUL_PSEUDO_CLASSES.contains(&stateful) => "0".to_string(),
        other => return Err(SelectorError::Unsupported(format!(":{other}"))),
    };
    Ok(condition)
}

/// Condition selecting the elements whose 1-based position among the
/// counted siblings is `a*k + b` for some `k >= 0`; `None` when every element
/// qualifies.
fn nth_condition(
    expr: &XPathExpr,
    kind: NthKind,
    a: i32,
    b: i32,
) -> Result<Option<String>, SelectorError> {
    // widened so `b - 1` and `-a` stay exact at the ends of the i32 range
    let (a, b) = (i64::from(a), i64::from(b));
    let siblings = match kind {
        NthKind::Child => "count(preceding-sibling::*)".to_string(),
        NthKind::LastChild => "count(following-sibling::*)".to_string(),
        NthKind::OfType => format!(
            "count(preceding-sibling::{})",
            typed_step(expr, "nth-of-type()")?
        ),
        NthKind::LastOfType => format!(
            "count(following-sibling::{})",
            typed_step(expr, "nth-last-of-type()")?
        ),
    };
    // siblings counted before the element, for the first position in the series
    let offset = b - 1;

    if a == 0 {
        if offset < 0 {
            return Ok(Some("0".to_string()));
        }
        return Ok(Some(format!("{siblings} = {offset}")));
    }

    let mut parts = vec![];
    if a > 0 {
        if offset > 0 {
            parts.push(format!("{siblings} >= {offset}"));
        }
        if a != 1 {
            let distance = match offset {
                0 => siblings.clone(),
                o if o > 0 => format!("{siblings} - {o}"),
                o => format!("{siblings} + {}", -o),
            };
            parts.push(format!("({distance}) mod {a} = 0"));
        }
    } else {
        if offset < 0 {
            return Ok(Some("0".to_string()));
        }
        parts.push(format!("{siblings} <= {offset}"));
        if a != -1 {
            parts.push(format!("({offset} - {siblings}) mod {} = 0", -a));
        }
    }

    if parts.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parts.join(" and ")))
    }
}

/// The step naming the compound's element type, required by the `*-of-type` family
fn typed_step(expr: &XPathExpr, pseudo: &str) -> Result<String, SelectorError> {
    if expr.element == "*" {
        return Err(SelectorError::Unsupported(format!("*:{pseudo}")));
    }
    Ok(expr.element.clone())
}

fn includes_word(attr: &str, word: &str) -> String {
    format!(
        "{attr} and contains(concat(' ', normalize-space({attr}), ' '), {})",
        literal(&format!(" {word} "))
    )
}

fn attribute_test(name: &str) -> String {
    if is_xpath_name(name) {
        format!("@{name}")
    } else {
        format!("@*[name() = {}]", literal(name))
    }
}

/// Whether `name` can be written as a bare XPath name test (no prefix)
fn is_xpath_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Quotes `value` as an XPath string literal
fn literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }

    let mut args = vec![];
    for (i, piece) in value.split('\'').enumerate() {
        if i > 0 {
            args.push("\"'\"".to_string());
        }
        if !piece.is_empty() {
            args.push(format!("'{piece}'"));
        }
    }
    if args.len() == 1 {
        return args.remove(0);
    }
    format!("concat({})", args.join(", "))
}
