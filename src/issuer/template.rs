//! # Username Templates
//!
//! A small pipeline language for generating record identifiers.
//!
//! Text outside `{{ }}` is copied literally. An action is a pipeline `cmd | cmd | ...` where the
//! result of each command is appended as the last argument of the next one. Operands are the
//! fields `.DisplayName` and `.RoleName`, string literals (`"..."` or `` `...` ``), integers,
//! function names and parenthesized sub-pipelines.
//!
//! Functions:
//!
//! | Function | Arguments | Result |
//! |---|---|---|
//! | `truncate` | `N S` | first `N` characters of `S` |
//! | `replace` | `OLD NEW S` | `S` with every `OLD` replaced by `NEW` |
//! | `lowercase` / `uppercase` | `S` | case-converted `S` |
//! | `random` | `N` | fresh lowercase hex token of length `N` |
//! | `unix_time` / `unix_time_millis` | | current time since the epoch |
//! | `uuid` | | fresh v4 UUID |
//! | `printf` | `FMT ARGS...` | `%s`, `%d` and `%%` formatting |
//!
//! Templates are parsed once; arity, field and function names are checked at parse time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;
use uuid::Uuid;

/// Template used when the host supplies no `username_template`
pub const DEFAULT_USERNAME_TEMPLATE: &str = r#"{{ printf "v-%s-%s-%s-%s" (.DisplayName | truncate 8) (.RoleName | truncate 8) (random 20) (unix_time) | truncate 32 | replace "-" "_" | lowercase }}"#;

/// Inputs a template can refer to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameMetadata {
    pub display_name: String,
    pub role_name: String,
}

impl UsernameMetadata {
    pub fn new(display_name: impl Into<String>, role_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            role_name: role_name.into(),
        }
    }
}

/// Template parse or evaluation failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed action at offset {0}")]
    UnclosedAction(usize),

    #[error("empty action")]
    EmptyAction,

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected {0} in action")]
    Unexpected(String),

    #[error("function \"{0}\" not defined")]
    UnknownFunction(String),

    #[error("can't evaluate field {0}")]
    UnknownField(String),

    #[error("wrong number of args for {func}: want {want}, got {got}")]
    Arity {
        func: &'static str,
        want: String,
        got: usize,
    },

    #[error("{func}: expected {expected} argument, got {got:?}")]
    ArgumentType {
        func: &'static str,
        expected: &'static str,
        got: String,
    },

    #[error("can't give argument to non-function {0}")]
    NotAFunction(String),

    #[error("printf: {0}")]
    Format(String),

    #[error("generated username is empty")]
    Empty,
}

/// Parsed username template
#[derive(Debug, Clone)]
pub struct UsernameTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl UsernameTemplate {
    /// Parse `source`
    ///
    /// # Errors
    ///
    /// Any syntax error, unknown field or function, or a call with the wrong number of
    /// arguments.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Text(rest[..start].to_string()));
            }
            let body = &rest[start + 2..];
            let end = body
                .find("}}")
                .ok_or(TemplateError::UnclosedAction(offset + start))?;
            segments.push(Segment::Action(parse_action(&body[..end])?));

            let consumed = start + 2 + end + 2;
            offset += consumed;
            rest = &rest[consumed..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Text(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Generate an identifier at the current time
    ///
    /// # Errors
    ///
    /// Argument type errors during evaluation, or an empty result.
    pub fn generate(&self, metadata: &UsernameMetadata) -> Result<String, TemplateError> {
        self.generate_at(metadata, Utc::now())
    }

    /// Generate an identifier with `now` as the current time
    ///
    /// # Errors
    ///
    /// Argument type errors during evaluation, or an empty result.
    pub fn generate_at(
        &self,
        metadata: &UsernameMetadata,
        now: DateTime<Utc>,
    ) -> Result<String, TemplateError> {
        let ctx = EvalContext { metadata, now };
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Action(pipeline) => out.push_str(&pipeline.eval(&ctx)?.to_string()),
            }
        }
        if out.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Text(String),
    Action(Pipeline),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DisplayName,
    RoleName,
}

impl Field {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "DisplayName" => Ok(Field::DisplayName),
            "RoleName" => Ok(Field::RoleName),
            other => Err(TemplateError::UnknownField(format!(".{other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Truncate,
    Replace,
    Lowercase,
    Uppercase,
    Random,
    UnixTime,
    UnixTimeMillis,
    Uuid,
    Printf,
}

impl Func {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        Ok(match name {
            "truncate" => Func::Truncate,
            "replace" => Func::Replace,
            "lowercase" => Func::Lowercase,
            "uppercase" => Func::Uppercase,
            "random" => Func::Random,
            "unix_time" => Func::UnixTime,
            "unix_time_millis" => Func::UnixTimeMillis,
            "uuid" => Func::Uuid,
            "printf" => Func::Printf,
            other => return Err(TemplateError::UnknownFunction(other.to_string())),
        })
    }

    fn name(self) -> &'static str {
        match self {
            Func::Truncate => "truncate",
            Func::Replace => "replace",
            Func::Lowercase => "lowercase",
            Func::Uppercase => "uppercase",
            Func::Random => "random",
            Func::UnixTime => "unix_time",
            Func::UnixTimeMillis => "unix_time_millis",
            Func::Uuid => "uuid",
            Func::Printf => "printf",
        }
    }

    /// (min, max) argument count; `None` = variadic
    fn arity(self) -> (usize, Option<usize>) {
        match self {
            Func::Truncate => (2, Some(2)),
            Func::Replace => (3, Some(3)),
            Func::Lowercase | Func::Uppercase | Func::Random => (1, Some(1)),
            Func::UnixTime | Func::UnixTimeMillis | Func::Uuid => (0, Some(0)),
            Func::Printf => (1, None),
        }
    }

    fn check_arity(self, got: usize) -> Result<(), TemplateError> {
        let (min, max) = self.arity();
        if got >= min && max.is_none_or(|max| got <= max) {
            return Ok(());
        }
        let want = match max {
            Some(max) if max == min => min.to_string(),
            Some(max) => format!("{min}..={max}"),
            None => format!("at least {min}"),
        };
        Err(TemplateError::Arity {
            func: self.name(),
            want,
            got,
        })
    }
}

#[derive(Debug, Clone)]
enum Operand {
    Field(Field),
    Str(String),
    Int(i64),
    Func(Func),
    Pipeline(Pipeline),
}

#[derive(Debug, Clone)]
enum Command {
    Value(Operand),
    Call { func: Func, args: Vec<Operand> },
}

#[derive(Debug, Clone)]
struct Pipeline {
    commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Value {
    Str(String),
    Int(i64),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(n) => write!(f, "{n}"),
        }
    }
}

struct EvalContext<'a> {
    metadata: &'a UsernameMetadata,
    now: DateTime<Utc>,
}

impl Pipeline {
    fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, TemplateError> {
        let mut result = None;
        for command in &self.commands {
            result = Some(command.eval(result.take(), ctx)?);
        }
        result.ok_or(TemplateError::EmptyAction)
    }
}

impl Command {
    fn eval(&self, piped: Option<Value>, ctx: &EvalContext<'_>) -> Result<Value, TemplateError> {
        match self {
            Command::Value(operand) => operand.eval(ctx),
            Command::Call { func, args } => {
                let mut values = args
                    .iter()
                    .map(|arg| arg.eval(ctx))
                    .collect::<Result<Vec<_>, _>>()?;
                values.extend(piped);
                call(*func, values, ctx)
            }
        }
    }
}

impl Operand {
    fn eval(&self, ctx: &EvalContext<'_>) -> Result<Value, TemplateError> {
        match self {
            Operand::Field(Field::DisplayName) => Ok(Value::Str(ctx.metadata.display_name.clone())),
            Operand::Field(Field::RoleName) => Ok(Value::Str(ctx.metadata.role_name.clone())),
            Operand::Str(s) => Ok(Value::Str(s.clone())),
            Operand::Int(n) => Ok(Value::Int(*n)),
            Operand::Func(func) => call(*func, Vec::new(), ctx),
            Operand::Pipeline(pipeline) => pipeline.eval(ctx),
        }
    }

    fn describe(&self) -> String {
        match self {
            Operand::Field(Field::DisplayName) => ".DisplayName".to_string(),
            Operand::Field(Field::RoleName) => ".RoleName".to_string(),
            Operand::Str(s) => format!("{s:?}"),
            Operand::Int(n) => n.to_string(),
            Operand::Func(func) => func.name().to_string(),
            Operand::Pipeline(_) => "(pipeline)".to_string(),
        }
    }
}

/// Positional argument reader for one call
struct Args {
    func: Func,
    values: std::vec::IntoIter<Value>,
    got: usize,
}

impl Args {
    fn new(func: Func, values: Vec<Value>) -> Self {
        Self {
            func,
            got: values.len(),
            values: values.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Value, TemplateError> {
        self.values.next().ok_or_else(|| {
            self.func
                .check_arity(self.got)
                .err()
                .unwrap_or(TemplateError::Arity {
                    func: self.func.name(),
                    want: "more".to_string(),
                    got: self.got,
                })
        })
    }

    fn string(&mut self) -> Result<String, TemplateError> {
        match self.next()? {
            Value::Str(s) => Ok(s),
            Value::Int(n) => Err(self.type_error("string", n.to_string())),
        }
    }

    fn count(&mut self) -> Result<usize, TemplateError> {
        match self.next()? {
            Value::Int(n) => usize::try_from(n).map_err(|_| self.type_error("non-negative integer", n.to_string())),
            Value::Str(s) => Err(self.type_error("integer", s)),
        }
    }

    fn type_error(&self, expected: &'static str, got: String) -> TemplateError {
        TemplateError::ArgumentType {
            func: self.func.name(),
            expected,
            got,
        }
    }
}

fn call(func: Func, values: Vec<Value>, ctx: &EvalContext<'_>) -> Result<Value, TemplateError> {
    let mut args = Args::new(func, values);
    let result = match func {
        Func::Truncate => {
            let max = args.count()?;
            let s = args.string()?;
            s.chars().take(max).collect()
        }
        Func::Replace => {
            let old = args.string()?;
            let new = args.string()?;
            let s = args.string()?;
            s.replace(&old, &new)
        }
        Func::Lowercase => args.string()?.to_lowercase(),
        Func::Uppercase => args.string()?.to_uppercase(),
        Func::Random => random_hex(args.count()?),
        Func::UnixTime => ctx.now.timestamp().to_string(),
        Func::UnixTimeMillis => ctx.now.timestamp_millis().to_string(),
        Func::Uuid => Uuid::new_v4().to_string(),
        Func::Printf => {
            let format = args.string()?;
            printf(&format, args.values)?
        }
    };
    Ok(Value::Str(result))
}

fn random_hex(len: usize) -> String {
    let mut out = String::with_capacity(len + 32);
    while out.len() < len {
        out.push_str(&Uuid::new_v4().simple().to_string());
    }
    out.truncate(len);
    out
}

fn printf(format: &str, args: impl IntoIterator<Item = Value>) -> Result<String, TemplateError> {
    let mut args = args.into_iter();
    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                let value = args
                    .next()
                    .ok_or_else(|| TemplateError::Format("missing argument for %s".to_string()))?;
                out.push_str(&value.to_string());
            }
            Some('d') => match args.next() {
                Some(Value::Int(n)) => out.push_str(&n.to_string()),
                Some(Value::Str(s)) => {
                    let n: i64 = s.parse().map_err(|_| {
                        TemplateError::Format(format!("%d needs an integer, got {s:?}"))
                    })?;
                    out.push_str(&n.to_string());
                }
                None => return Err(TemplateError::Format("missing argument for %d".to_string())),
            },
            Some(verb) => {
                return Err(TemplateError::Format(format!("unsupported verb %{verb}")));
            }
            None => return Err(TemplateError::Format("trailing %".to_string())),
        }
    }

    if args.next().is_some() {
        return Err(TemplateError::Format("too many arguments".to_string()));
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Field(String),
    Ident(String),
    Str(String),
    Int(i64),
    Pipe,
    LParen,
    RParen,
}

fn parse_action(source: &str) -> Result<Pipeline, TemplateError> {
    let tokens = lex(source)?;
    if tokens.is_empty() {
        return Err(TemplateError::EmptyAction);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let pipeline = parser.pipeline()?;
    if let Some(token) = parser.peek() {
        return Err(TemplateError::Unexpected(format!("{token:?}")));
    }
    Ok(pipeline)
}

fn lex(source: &str) -> Result<Vec<Token>, TemplateError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '|' => {
                chars.next();
                tokens.push(Token::Pipe);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '"' => {
                chars.next();
                tokens.push(Token::Str(lex_quoted(&mut chars)?));
            }
            '`' => {
                chars.next();
                let mut raw = String::new();
                loop {
                    match chars.next() {
                        Some('`') => break,
                        Some(c) => raw.push(c),
                        None => return Err(TemplateError::UnterminatedString),
                    }
                }
                tokens.push(Token::Str(raw));
            }
            '.' => {
                chars.next();
                let name = take_word(&mut chars);
                if name.is_empty() {
                    return Err(TemplateError::Unexpected("'.'".to_string()));
                }
                tokens.push(Token::Field(name));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || (c == '-' && word.is_empty()) {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = word
                    .parse()
                    .map_err(|_| TemplateError::Unexpected(format!("number {word:?}")))?;
                tokens.push(Token::Int(n));
            }
            c if c.is_alphabetic() || c == '_' => tokens.push(Token::Ident(take_word(&mut chars))),
            other => return Err(TemplateError::Unexpected(format!("character {other:?}"))),
        }
    }
    Ok(tokens)
}

fn take_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            chars.next();
        } else {
            break;
        }
    }
    word
}

fn lex_quoted(chars: &mut Peekable<Chars<'_>>) -> Result<String, TemplateError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => {
                    return Err(TemplateError::Unexpected(format!("escape \\{other}")));
                }
                None => return Err(TemplateError::UnterminatedString),
            },
            Some(c) => out.push(c),
            None => return Err(TemplateError::UnterminatedString),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn pipeline(&mut self) -> Result<Pipeline, TemplateError> {
        let mut commands = vec![self.command(false)?];
        while self.peek() == Some(&Token::Pipe) {
            self.pos += 1;
            commands.push(self.command(true)?);
        }
        Ok(Pipeline { commands })
    }

    fn command(&mut self, piped: bool) -> Result<Command, TemplateError> {
        let mut operands = Vec::new();
        while let Some(token) = self.peek() {
            if matches!(token, Token::Pipe | Token::RParen) {
                break;
            }
            operands.push(self.operand()?);
        }

        let mut operands = operands.into_iter();
        let Some(first) = operands.next() else {
            return Err(TemplateError::Unexpected("empty command".to_string()));
        };
        let args: Vec<Operand> = operands.collect();

        match first {
            Operand::Func(func) => {
                func.check_arity(args.len() + usize::from(piped))?;
                for arg in &args {
                    if let Operand::Func(niladic) = arg {
                        niladic.check_arity(0)?;
                    }
                }
                Ok(Command::Call { func, args })
            }
            operand if piped || !args.is_empty() => {
                Err(TemplateError::NotAFunction(operand.describe()))
            }
            operand => Ok(Command::Value(operand)),
        }
    }

    fn operand(&mut self) -> Result<Operand, TemplateError> {
        match self.advance() {
            Some(Token::Field(name)) => Ok(Operand::Field(Field::parse(&name)?)),
            Some(Token::Ident(name)) => Ok(Operand::Func(Func::parse(&name)?)),
            Some(Token::Str(s)) => Ok(Operand::Str(s)),
            Some(Token::Int(n)) => Ok(Operand::Int(n)),
            Some(Token::LParen) => {
                let pipeline = self.pipeline()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(Operand::Pipeline(pipeline)),
                    _ => Err(TemplateError::Unexpected("unclosed '('".to_string())),
                }
            }
            Some(token) => Err(TemplateError::Unexpected(format!("{token:?}"))),
            None => Err(TemplateError::Unexpected("end of action".to_string())),
        }
    }
}
