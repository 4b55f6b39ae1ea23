//! Log records: the line-oriented text format written by the recorder.
//!
//! Every line is either a record, `NAME(arg, arg, ...)`, or a comment that
//! starts with `--`. Arguments are literals (`None`, `True`, `False`,
//! numbers), double-quoted strings, bare tokens (the object a definition or
//! deallocation record is about) or references `*<token>`.

use crate::registry::Token;
use num_bigint::BigInt;
use std::borrow::Cow;
use std::fmt::{self, Write as _};

/// Prefix shared by all definition records.
pub const DEFINITION_PREFIX: &str = "NEW_";
/// Record retiring a token.
pub const DEALLOC: &str = "DEALLOC";
/// Prefix of comment lines.
pub const COMMENT_PREFIX: &str = "--";

/// One record argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    None,
    Bool(bool),
    Int(i64),
    BigInt(BigInt),
    Float(f64),
    Str(String),
    /// Bare token, written without the `*` sigil.
    Token(Token),
    /// Reference to an already defined token.
    Ref(Token),
    /// Count-prefixed tuple of names, flattened into the argument list.
    Names(Vec<String>),
}

impl Arg {
    pub fn str(s: impl Into<String>) -> Self {
        Arg::Str(s.into())
    }

    pub fn opt_int(n: Option<i64>) -> Self {
        n.map_or(Arg::None, Arg::Int)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::None => f.write_str("None"),
            Arg::Bool(true) => f.write_str("True"),
            Arg::Bool(false) => f.write_str("False"),
            Arg::Int(n) => write!(f, "{}", n),
            Arg::BigInt(n) => write!(f, "{}", n),
            Arg::Float(x) => write_float(f, *x),
            Arg::Str(s) => write_quoted(f, s),
            Arg::Token(t) => write!(f, "{}", t),
            Arg::Ref(t) => write!(f, "*{}", t),
            Arg::Names(names) => {
                write!(f, "{}", names.len())?;
                for name in names {
                    f.write_str(", ")?;
                    write_quoted(f, name)?;
                }
                Ok(())
            }
        }
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, x: f64) -> fmt::Result {
    if x.is_nan() {
        f.write_str("nan")
    } else if x.is_infinite() {
        f.write_str(if x > 0.0 { "inf" } else { "-inf" })
    } else {
        // Debug keeps a fractional part or exponent, so floats never read
        // back as integers.
        write!(f, "{:?}", x)
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\r' => f.write_str("\\r")?,
            '\t' => f.write_str("\\t")?,
            c if c.is_control() && (c as u32) < 0x100 => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

/// A single log record.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    name: Cow<'static, str>,
    args: Vec<Arg>,
}

impl Record {
    pub fn new(name: &'static str) -> Self {
        Record {
            name: Cow::Borrowed(name),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = Arg>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn token(self, token: Token) -> Self {
        self.arg(Arg::Token(token))
    }

    pub fn reference(self, token: Token) -> Self {
        self.arg(Arg::Ref(token))
    }

    pub fn int(self, n: i64) -> Self {
        self.arg(Arg::Int(n))
    }

    pub fn str(self, s: impl Into<String>) -> Self {
        self.arg(Arg::Str(s.into()))
    }

    pub fn names(self, names: &[String]) -> Self {
        self.arg(Arg::Names(names.to_vec()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[Arg] {
        &self.args
    }

    pub fn is_definition(&self) -> bool {
        self.name.starts_with(DEFINITION_PREFIX)
    }

    /// The token a definition or deallocation record is about.
    pub fn subject(&self) -> Option<Token> {
        if !self.is_definition() && self.name != DEALLOC {
            return None;
        }
        match self.args.first() {
            Some(Arg::Token(t)) => Some(*t),
            _ => None,
        }
    }

    /// Every token this record mentions by reference.
    pub fn references(&self) -> impl Iterator<Item = Token> + '_ {
        self.args.iter().filter_map(|arg| match arg {
            Arg::Ref(t) => Some(*t),
            _ => None,
        })
    }

    /// Parse one record line. Comment lines are not records and fail to parse.
    pub fn parse(line: &str) -> Result<Record, RecordParseError> {
        let line = line.trim_end_matches(['\n', '\r']);
        let open = line.find('(').ok_or(RecordParseError::MissingParen)?;
        let name = &line[..open];
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_uppercase() || b == b'_') {
            return Err(RecordParseError::BadName(name.to_string()));
        }
        let body = line[open + 1..]
            .strip_suffix(')')
            .ok_or(RecordParseError::MissingParen)?;

        let mut args = parse_args(body)?;
        let is_subject_record = name.starts_with(DEFINITION_PREFIX) || name == DEALLOC;
        if is_subject_record {
            if let Some(Arg::Int(n)) = args.first() {
                let n = u64::try_from(*n)
                    .map_err(|_| RecordParseError::BadArgument(n.to_string()))?;
                args[0] = Arg::Token(Token(n));
            }
        }
        Ok(Record {
            name: Cow::Owned(name.to_string()),
            args,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        f.write_char('(')?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_char(')')
    }
}

/// Errors from [`Record::parse`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordParseError {
    #[error("record is not of the form NAME(...)")]
    MissingParen,
    #[error("invalid record name `{0}`")]
    BadName(String),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("invalid escape sequence `\\{0}`")]
    BadEscape(String),
    #[error("invalid argument `{0}`")]
    BadArgument(String),
}

fn parse_args(body: &str) -> Result<Vec<Arg>, RecordParseError> {
    let mut args = Vec::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
        let (arg, tail) = if rest.starts_with('"') {
            parse_string(rest)?
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            (parse_atom(rest[..end].trim())?, &rest[end..])
        };
        args.push(arg);
        rest = tail.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after.trim_start();
            if rest.is_empty() {
                return Err(RecordParseError::BadArgument(",".to_string()));
            }
        } else if !rest.is_empty() {
            return Err(RecordParseError::BadArgument(rest.to_string()));
        }
    }
    Ok(args)
}

fn parse_string(input: &str) -> Result<(Arg, &str), RecordParseError> {
    let mut out = String::new();
    let mut chars = input.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return Ok((Arg::Str(out), &input[i + 1..])),
            '\\' => match chars.next().map(|(_, e)| e) {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('x') => {
                    let hi = chars.next().map(|(_, h)| h);
                    let lo = chars.next().map(|(_, l)| l);
                    let hex: String = hi.into_iter().chain(lo).collect();
                    let byte = u8::from_str_radix(&hex, 16)
                        .map_err(|_| RecordParseError::BadEscape(format!("x{}", hex)))?;
                    out.push(char::from(byte));
                }
                Some(other) => return Err(RecordParseError::BadEscape(other.to_string())),
                None => return Err(RecordParseError::UnterminatedString),
            },
            c => out.push(c),
        }
    }
    Err(RecordParseError::UnterminatedString)
}

fn parse_atom(atom: &str) -> Result<Arg, RecordParseError> {
    let bad = || RecordParseError::BadArgument(atom.to_string());
    match atom {
        "None" => return Ok(Arg::None),
        "True" => return Ok(Arg::Bool(true)),
        "False" => return Ok(Arg::Bool(false)),
        "nan" | "inf" | "-inf" => return atom.parse().map(Arg::Float).map_err(|_| bad()),
        _ => {}
    }
    if let Some(token) = atom.strip_prefix('*') {
        return token.parse().map(|n| Arg::Ref(Token(n))).map_err(|_| bad());
    }
    if atom.contains(['.', 'e', 'E']) {
        return atom.parse().map(Arg::Float).map_err(|_| bad());
    }
    if let Ok(n) = atom.parse::<i64>() {
        return Ok(Arg::Int(n));
    }
    atom.parse::<BigInt>().map(Arg::BigInt).map_err(|_| bad())
}
