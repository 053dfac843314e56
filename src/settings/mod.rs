use std::fmt::Write as _;

use crate::error::Error;
use crate::geometry::Interval;
use crate::geometry::Vector;
use crate::prelude::Float;

/// A typed settings value. Enumerations are stored by their integer
/// representation; the distinction from plain integers only survives in
/// the binary snapshot format, text configs parse both as `Int`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Float(Float),
    Str(String),
    Vector3(Vector),
    Interval(Interval),
    Enum(i64),
}

impl Value {
    pub fn type_tag(&self) -> u8 {
        match self {
            Value::Int(_) => 0,
            Value::Float(_) => 1,
            Value::Str(_) => 2,
            Value::Vector3(_) => 3,
            Value::Interval(_) => 4,
            Value::Enum(_) => 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Entry {
    Value(Value),
    Section(Settings),
}

/// Ordered collection of named values and nested sections. This is the
/// in-memory form of the line-oriented configuration format
///
/// ```text
/// "section" [
///   "key" = value
///   "subsection" [
///     "key" = value
///   ]
/// ]
/// ```
///
/// and of the material parameter blocks inside binary snapshots.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    entries: Vec<(String, Entry)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, key: &str, value: Value) {
        for (name, entry) in &mut self.entries {
            if name == key {
                *entry = Entry::Value(value);
                return;
            }
        }
        self.entries.push((key.to_owned(), Entry::Value(value)));
    }

    pub fn set_section(&mut self, key: &str, section: Settings) {
        for (name, entry) in &mut self.entries {
            if name == key {
                *entry = Entry::Section(section);
                return;
            }
        }
        self.entries.push((key.to_owned(), Entry::Section(section)));
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find_map(|(name, entry)| match entry {
            Entry::Value(value) if name == key => Some(value),
            _ => None,
        })
    }

    pub fn section(&self, key: &str) -> Option<&Settings> {
        self.entries.iter().find_map(|(name, entry)| match entry {
            Entry::Section(section) if name == key => Some(section),
            _ => None,
        })
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().filter_map(|(name, entry)| match entry {
            Entry::Value(value) => Some((name.as_str(), value)),
            Entry::Section(_) => None,
        })
    }

    fn missing(key: &str) -> Error {
        Error::InvalidSetup(format!("missing settings key \"{}\"", key))
    }

    fn mismatch(key: &str, expected: &str) -> Error {
        Error::InvalidSetup(format!("settings key \"{}\" is not {}", key, expected))
    }

    pub fn get_float(&self, key: &str) -> Result<Float, Error> {
        match self.get(key).ok_or_else(|| Self::missing(key))? {
            Value::Float(value) => Ok(*value),
            Value::Int(value) => Ok(*value as Float),
            _ => Err(Self::mismatch(key, "a float")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64, Error> {
        match self.get(key).ok_or_else(|| Self::missing(key))? {
            Value::Int(value) | Value::Enum(value) => Ok(*value),
            _ => Err(Self::mismatch(key, "an integer")),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<&str, Error> {
        match self.get(key).ok_or_else(|| Self::missing(key))? {
            Value::Str(value) => Ok(value),
            _ => Err(Self::mismatch(key, "a string")),
        }
    }

    pub fn get_vector(&self, key: &str) -> Result<Vector, Error> {
        match self.get(key).ok_or_else(|| Self::missing(key))? {
            Value::Vector3(value) => Ok(*value),
            _ => Err(Self::mismatch(key, "a vector")),
        }
    }

    pub fn get_interval(&self, key: &str) -> Result<Interval, Error> {
        match self.get(key).ok_or_else(|| Self::missing(key))? {
            Value::Interval(value) => Ok(*value),
            _ => Err(Self::mismatch(key, "an interval")),
        }
    }

    pub fn get_float_or(&self, key: &str, default: Float) -> Result<Float, Error> {
        match self.get(key) {
            None => Ok(default),
            Some(_) => self.get_float(key),
        }
    }

    /// Parses the textual configuration format. Whitespace tolerant;
    /// keys are quoted, sections are bracketed.
    pub fn parse(input: &str) -> Result<Settings, Error> {
        let tokens = tokenize(input)?;
        let mut position = 0;
        let settings = parse_body(&tokens, &mut position, true)?;
        if position != tokens.len() {
            return Err(Error::Corrupted(format!(
                "unexpected trailing token {:?}",
                tokens[position]
            )));
        }
        Ok(settings)
    }

    pub fn write_string(&self) -> String {
        let mut out = String::new();
        self.write_indented(&mut out, 0);
        out
    }

    fn write_indented(&self, out: &mut String, depth: usize) {
        for (name, entry) in &self.entries {
            for _ in 0..depth {
                out.push_str("  ");
            }
            match entry {
                Entry::Value(value) => {
                    let _ = writeln!(out, "\"{}\" = {}", name, format_value(value));
                }
                Entry::Section(section) => {
                    let _ = writeln!(out, "\"{}\" [", name);
                    section.write_indented(out, depth + 1);
                    for _ in 0..depth {
                        out.push_str("  ");
                    }
                    out.push_str("]\n");
                }
            }
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) | Value::Enum(v) => format!("{}", v),
        Value::Float(v) => {
            if v.fract() == 0.0 && v.abs() < 1.0e15 {
                format!("{:.1}", v)
            } else {
                format!("{:e}", v)
            }
        }
        Value::Str(v) => format!("\"{}\"", v),
        Value::Vector3(v) => format!("({:e}, {:e}, {:e})", v.x(), v.y(), v.z()),
        Value::Interval(v) => format!("({:e}, {:e})", v.lower(), v.upper()),
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Quoted(String),
    Equals,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
    Comma,
    Literal(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = vec![];
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '"' => {
                chars.next();
                let mut string = String::new();
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some(c) => string.push(c),
                        None => return Err(Error::Corrupted("unterminated string".to_owned())),
                    }
                }
                tokens.push(Token::Quoted(string));
            }
            '=' => {
                chars.next();
                tokens.push(Token::Equals);
            }
            '[' => {
                chars.next();
                tokens.push(Token::OpenBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::CloseBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            _ => {
                let mut literal = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || "=[](),\"".contains(c) {
                        break;
                    }
                    literal.push(c);
                    chars.next();
                }
                tokens.push(Token::Literal(literal));
            }
        }
    }
    Ok(tokens)
}

fn parse_number(literal: &str) -> Result<Value, Error> {
    if let Ok(int) = literal.parse::<i64>() {
        return Ok(Value::Int(int));
    }
    literal
        .parse::<Float>()
        .map(Value::Float)
        .map_err(|_| Error::Corrupted(format!("cannot parse value \"{}\"", literal)))
}

fn parse_float(token: Option<&Token>) -> Result<Float, Error> {
    match token {
        Some(Token::Literal(literal)) => match parse_number(literal)? {
            Value::Int(v) => Ok(v as Float),
            Value::Float(v) => Ok(v),
            _ => unreachable!(),
        },
        other => Err(Error::Corrupted(format!("expected a number, got {:?}", other))),
    }
}

fn parse_value(tokens: &[Token], position: &mut usize) -> Result<Value, Error> {
    match tokens.get(*position) {
        Some(Token::Quoted(string)) => {
            *position += 1;
            Ok(Value::Str(string.clone()))
        }
        Some(Token::Literal(literal)) => {
            *position += 1;
            parse_number(literal)
        }
        Some(Token::OpenParen) => {
            *position += 1;
            let mut components = vec![parse_float(tokens.get(*position))?];
            *position += 1;
            while tokens.get(*position) == Some(&Token::Comma) {
                *position += 1;
                components.push(parse_float(tokens.get(*position))?);
                *position += 1;
            }
            if tokens.get(*position) != Some(&Token::CloseParen) {
                return Err(Error::Corrupted("unterminated tuple".to_owned()));
            }
            *position += 1;
            match components.len() {
                2 => Ok(Value::Interval(Interval::new(
                    components[0],
                    components[1],
                ))),
                3 => Ok(Value::Vector3(Vector::new(
                    components[0],
                    components[1],
                    components[2],
                ))),
                n => Err(Error::Corrupted(format!("a tuple of {} components", n))),
            }
        }
        other => Err(Error::Corrupted(format!("expected a value, got {:?}", other))),
    }
}

fn parse_body(
    tokens: &[Token],
    position: &mut usize,
    top_level: bool,
) -> Result<Settings, Error> {
    let mut settings = Settings::new();
    loop {
        match tokens.get(*position) {
            None => {
                if top_level {
                    return Ok(settings);
                }
                return Err(Error::Corrupted("unterminated section".to_owned()));
            }
            Some(Token::CloseBracket) => {
                if top_level {
                    return Err(Error::Corrupted("unmatched closing bracket".to_owned()));
                }
                return Ok(settings);
            }
            Some(Token::Quoted(key)) => {
                let key = key.clone();
                *position += 1;
                match tokens.get(*position) {
                    Some(Token::Equals) => {
                        *position += 1;
                        let value = parse_value(tokens, position)?;
                        settings.set(&key, value);
                    }
                    Some(Token::OpenBracket) => {
                        *position += 1;
                        let section = parse_body(tokens, position, false)?;
                        // consume the closing bracket
                        *position += 1;
                        settings.set_section(&key, section);
                    }
                    other => {
                        return Err(Error::Corrupted(format!(
                            "expected '=' or '[' after key \"{}\", got {:?}",
                            key, other
                        )))
                    }
                }
            }
            Some(other) => {
                return Err(Error::Corrupted(format!("expected a key, got {:?}", other)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
"run" [
  "name" = "impact"
  "timestep" = 1e-5
  "iterations" = 100
  "gravity" [
    "opening_angle" = 0.5
  ]
]
"body" [
  "center" = (0.0, 1.0, 2.0)
  "damage_range" = (0.0, 1.0)
]
"#;

    #[test]
    fn parses_nested_sections() {
        let settings = Settings::parse(EXAMPLE).unwrap();
        let run = settings.section("run").unwrap();
        assert_eq!(run.get_str("name").unwrap(), "impact");
        assert_eq!(run.get_float("timestep").unwrap(), 1.0e-5);
        assert_eq!(run.get_int("iterations").unwrap(), 100);
        let gravity = run.section("gravity").unwrap();
        assert_eq!(gravity.get_float("opening_angle").unwrap(), 0.5);
        let body = settings.section("body").unwrap();
        assert_eq!(body.get_vector("center").unwrap().z(), 2.0);
        assert_eq!(body.get_interval("damage_range").unwrap().upper(), 1.0);
    }

    #[test]
    fn write_then_parse_round_trips() {
        let settings = Settings::parse(EXAMPLE).unwrap();
        let written = settings.write_string();
        let reparsed = Settings::parse(&written).unwrap();
        assert_eq!(settings, reparsed);
    }

    #[test]
    fn tolerates_messy_whitespace() {
        let settings = Settings::parse("\"a\"=1 \"b\" [ \"c\" = 2.5 ]").unwrap();
        assert_eq!(settings.get_int("a").unwrap(), 1);
        assert_eq!(
            settings.section("b").unwrap().get_float("c").unwrap(),
            2.5
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Settings::parse("\"key\" =").is_err());
        assert!(Settings::parse("\"section\" [ \"a\" = 1").is_err());
        assert!(Settings::parse("]").is_err());
        assert!(Settings::parse("\"v\" = (1.0, 2.0, 3.0, 4.0)").is_err());
    }
}
