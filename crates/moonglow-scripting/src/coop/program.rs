//! Compiled cooperative program and its stepper
//!
//! Parsing happens once at play time; block structure (if/while/loop) is
//! validated and jump targets are resolved up front so a step is a bounded
//! unit of work: execute one statement, return control to the manager.

use std::time::{Duration, Instant};

use moonglow_client::Serial;

use crate::error::ScriptError;
use crate::signal::MAX_PAUSE;

use super::lexer::{tokenize, Token};
use super::registry::{CommandCtx, CoopRegistry};

/// A runtime value in the command language
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Str(String),
    Serial(Serial),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Serial(s) => s.is_valid(),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            Value::Serial(s) => Some(i64::from(s.0)),
            Value::Str(s) => s.parse().ok(),
        }
    }

    pub fn as_serial(&self) -> Option<Serial> {
        match self {
            Value::Serial(s) => Some(*s),
            Value::Int(n) => u32::try_from(*n).ok().map(Serial),
            Value::Str(_) => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Str(s) => s.clone(),
            Value::Serial(s) => s.to_string(),
        }
    }
}

/// An unevaluated argument; words resolve at use time. Aliases are live,
/// `$name` reads a shared variable, anything else is a literal word.
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Int(i64),
    Str(String),
    Word(String),
}

fn parse_arg(token: &Token) -> Arg {
    if token.quoted {
        return Arg::Str(token.text.clone());
    }
    if let Some(hex) = token.text.strip_prefix("0x").or_else(|| token.text.strip_prefix("0X")) {
        if let Ok(n) = i64::from_str_radix(hex, 16) {
            return Arg::Int(n);
        }
    }
    if let Ok(n) = token.text.parse::<i64>() {
        return Arg::Int(n);
    }
    Arg::Word(token.text.to_ascii_lowercase())
}

/// A boolean condition: a registered expression, optionally negated
#[derive(Debug, Clone)]
struct Cond {
    negate: bool,
    name: String,
    args: Vec<Arg>,
}

#[derive(Debug, Clone)]
enum Stmt {
    Command { name: String, args: Vec<Arg> },
    Pause(Arg),
    If { cond: Cond, else_pc: Option<usize>, end_pc: usize },
    Else { end_pc: usize },
    EndIf,
    While { cond: Cond, end_pc: usize },
    EndWhile { start_pc: usize },
    Loop,
    EndLoop { start_pc: usize },
    Stop,
    Replay,
}

#[derive(Debug, Clone)]
struct Line {
    /// 1-based source line, for error messages
    source_line: usize,
    stmt: Stmt,
}

/// Result of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Executed one statement
    Ran,
    /// Pacing: the program is sleeping until a wake instant
    Waiting,
    /// Ran off the end or hit `stop`
    Finished,
}

/// A compiled cooperative program
pub struct CommandProgram {
    name: String,
    lines: Vec<Line>,
    pc: usize,
    playing: bool,
    wake_at: Option<Instant>,
}

enum OpenBlock {
    If { pc: usize, else_pc: Option<usize> },
    While { pc: usize },
    Loop { pc: usize },
}

fn parse_error(line: usize, message: impl Into<String>) -> ScriptError {
    ScriptError::Parse {
        line,
        message: message.into(),
    }
}

impl CommandProgram {
    /// Compile a source text. Block structure is validated here so a step
    /// never has to handle an unmatched `endif`.
    pub fn parse(name: impl Into<String>, source: &str) -> Result<Self, ScriptError> {
        let mut lines: Vec<Line> = Vec::new();
        let mut open: Vec<OpenBlock> = Vec::new();

        for (idx, raw) in source.lines().enumerate() {
            let source_line = idx + 1;
            let tokens = tokenize(raw).map_err(|m| parse_error(source_line, m))?;
            if tokens.is_empty() {
                continue;
            }
            let verb = tokens[0].text.to_ascii_lowercase();
            let args: Vec<Arg> = tokens[1..].iter().map(parse_arg).collect();
            let pc = lines.len();

            let stmt = match verb.as_str() {
                "if" | "while" => {
                    let cond = Self::parse_cond(&tokens[1..], source_line)?;
                    if verb == "if" {
                        open.push(OpenBlock::If { pc, else_pc: None });
                        Stmt::If {
                            cond,
                            else_pc: None,
                            end_pc: 0,
                        }
                    } else {
                        open.push(OpenBlock::While { pc });
                        Stmt::While { cond, end_pc: 0 }
                    }
                }
                "else" => {
                    match open.last_mut() {
                        Some(OpenBlock::If { else_pc, .. }) if else_pc.is_none() => {
                            *else_pc = Some(pc);
                        }
                        _ => return Err(parse_error(source_line, "else without matching if")),
                    }
                    Stmt::Else { end_pc: 0 }
                }
                "endif" => {
                    let Some(OpenBlock::If { pc: if_pc, else_pc }) = open.pop() else {
                        return Err(parse_error(source_line, "endif without matching if"));
                    };
                    if let Stmt::If {
                        else_pc: slot_else,
                        end_pc,
                        ..
                    } = &mut lines[if_pc].stmt
                    {
                        *slot_else = else_pc;
                        *end_pc = pc;
                    }
                    if let Some(else_at) = else_pc {
                        if let Stmt::Else { end_pc } = &mut lines[else_at].stmt {
                            *end_pc = pc;
                        }
                    }
                    Stmt::EndIf
                }
                "endwhile" => {
                    let Some(OpenBlock::While { pc: start_pc }) = open.pop() else {
                        return Err(parse_error(source_line, "endwhile without matching while"));
                    };
                    if let Stmt::While { end_pc, .. } = &mut lines[start_pc].stmt {
                        *end_pc = pc;
                    }
                    Stmt::EndWhile { start_pc }
                }
                "loop" => {
                    open.push(OpenBlock::Loop { pc });
                    Stmt::Loop
                }
                "endloop" => {
                    let Some(OpenBlock::Loop { pc: start_pc }) = open.pop() else {
                        return Err(parse_error(source_line, "endloop without matching loop"));
                    };
                    Stmt::EndLoop { start_pc }
                }
                "pause" | "wait" => {
                    let arg = args
                        .first()
                        .cloned()
                        .ok_or_else(|| parse_error(source_line, "pause needs a duration"))?;
                    Stmt::Pause(arg)
                }
                "stop" => Stmt::Stop,
                "replay" | "restart" => Stmt::Replay,
                _ => Stmt::Command { name: verb, args },
            };

            lines.push(Line { source_line, stmt });
        }

        if !open.is_empty() {
            let what = match open.last().unwrap() {
                OpenBlock::If { .. } => "if",
                OpenBlock::While { .. } => "while",
                OpenBlock::Loop { .. } => "loop",
            };
            return Err(parse_error(
                source.lines().count(),
                format!("unclosed {what} block"),
            ));
        }

        Ok(Self {
            name: name.into(),
            lines,
            pc: 0,
            playing: false,
            wake_at: None,
        })
    }

    fn parse_cond(tokens: &[Token], source_line: usize) -> Result<Cond, ScriptError> {
        let mut tokens = tokens;
        let mut negate = false;
        if tokens
            .first()
            .is_some_and(|t| !t.quoted && t.text.eq_ignore_ascii_case("not"))
        {
            negate = true;
            tokens = &tokens[1..];
        }
        let Some(head) = tokens.first() else {
            return Err(parse_error(source_line, "missing condition"));
        };
        Ok(Cond {
            negate,
            name: head.text.to_ascii_lowercase(),
            args: tokens[1..].iter().map(parse_arg).collect(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Rewind to the first line and clear pacing state
    pub fn reset(&mut self) {
        self.pc = 0;
        self.wake_at = None;
        self.playing = false;
    }

    fn resolve_arg(&self, arg: &Arg, ctx: &CommandCtx, registry: &CoopRegistry) -> Value {
        match arg {
            Arg::Int(n) => Value::Int(*n),
            Arg::Str(s) => Value::Str(s.clone()),
            Arg::Word(word) => {
                if let Some(alias) = registry.alias(word) {
                    return Value::Serial(alias(ctx.session, ctx.run));
                }
                // `$name` reads a shared variable. A plain word stays
                // literal, so name-taking commands (setvar, varexists)
                // always see the name, never a substituted value.
                if let Some(name) = word.strip_prefix('$') {
                    return Value::Str(ctx.vars.get(name));
                }
                Value::Str(word.clone())
            }
        }
    }

    fn resolve_args(&self, args: &[Arg], ctx: &CommandCtx, registry: &CoopRegistry) -> Vec<Value> {
        args.iter().map(|a| self.resolve_arg(a, ctx, registry)).collect()
    }

    fn eval_cond(
        &self,
        cond: &Cond,
        ctx: &mut CommandCtx,
        registry: &CoopRegistry,
        source_line: usize,
    ) -> Result<bool, ScriptError> {
        let Some(expr) = registry.expression(&cond.name) else {
            return Err(ScriptError::runtime(format!(
                "line {}: unknown expression '{}'",
                source_line, cond.name
            )));
        };
        let args = self.resolve_args(&cond.args, ctx, registry);
        let value = expr(ctx, &args)?;
        Ok(value.truthy() != cond.negate)
    }

    /// Advance by one bounded unit of work
    pub fn step(
        &mut self,
        ctx: &mut CommandCtx,
        registry: &CoopRegistry,
    ) -> Result<StepOutcome, ScriptError> {
        if let Some(wake_at) = self.wake_at {
            if Instant::now() < wake_at {
                return Ok(StepOutcome::Waiting);
            }
            self.wake_at = None;
        }

        let Some(line) = self.lines.get(self.pc).cloned() else {
            return Ok(StepOutcome::Finished);
        };

        match &line.stmt {
            Stmt::Command { name, args } => {
                let Some(command) = registry.command(name) else {
                    return Err(ScriptError::runtime(format!(
                        "line {}: unknown command '{}'",
                        line.source_line, name
                    )));
                };
                let args = self.resolve_args(args, ctx, registry);
                command(ctx, &args)?;
                self.pc += 1;
            }
            Stmt::Pause(arg) => {
                let ms = self
                    .resolve_arg(arg, ctx, registry)
                    .as_int()
                    .unwrap_or(0)
                    .max(0) as u64;
                let clamped = Duration::from_millis(ms).min(MAX_PAUSE);
                self.wake_at = Some(Instant::now() + clamped);
                self.pc += 1;
            }
            Stmt::If { cond, else_pc, end_pc } => {
                if self.eval_cond(cond, ctx, registry, line.source_line)? {
                    self.pc += 1;
                } else {
                    self.pc = else_pc.map(|e| e + 1).unwrap_or(end_pc + 1);
                }
            }
            Stmt::Else { end_pc } => {
                // Reached by falling through the true branch.
                self.pc = *end_pc;
            }
            Stmt::EndIf => self.pc += 1,
            Stmt::While { cond, end_pc } => {
                if self.eval_cond(cond, ctx, registry, line.source_line)? {
                    self.pc += 1;
                } else {
                    self.pc = end_pc + 1;
                }
            }
            Stmt::EndWhile { start_pc } => self.pc = *start_pc,
            Stmt::Loop => self.pc += 1,
            Stmt::EndLoop { start_pc } => self.pc = *start_pc,
            Stmt::Stop => return Ok(StepOutcome::Finished),
            Stmt::Replay => {
                self.pc = 0;
                self.wake_at = None;
            }
        }

        if self.pc >= self.lines.len() {
            return Ok(StepOutcome::Finished);
        }
        Ok(StepOutcome::Ran)
    }
}
