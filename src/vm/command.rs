use std::{fmt, str::FromStr};

use super::FRAME_SIZE;
use crate::hack::{is_symbol, MAX_ADDRESS};

/// Largest argument count whose frame offset `args + FRAME_SIZE` still fits an A-instruction.
pub const MAX_ARGS: u16 = MAX_ADDRESS - FRAME_SIZE;

/// Arithmetic and logical commands. All operate on the top of the stack.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl ArithOp {
    pub const ALL: [ArithOp; 9] = [
        ArithOp::Add,
        ArithOp::Sub,
        ArithOp::Neg,
        ArithOp::Eq,
        ArithOp::Gt,
        ArithOp::Lt,
        ArithOp::And,
        ArithOp::Or,
        ArithOp::Not,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Neg => "neg",
            ArithOp::Eq => "eq",
            ArithOp::Gt => "gt",
            ArithOp::Lt => "lt",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Not => "not",
        }
    }

    pub fn parse(s: &str) -> Option<ArithOp> {
        ArithOp::ALL.into_iter().find(|op| op.mnemonic() == s)
    }
}

/// Memory segments addressable by `push` and `pop`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Segment {
    Constant,
    Local,
    Argument,
    This,
    That,
    Pointer,
    Temp,
    Static,
}

impl Segment {
    pub const ALL: [Segment; 8] = [
        Segment::Constant,
        Segment::Local,
        Segment::Argument,
        Segment::This,
        Segment::That,
        Segment::Pointer,
        Segment::Temp,
        Segment::Static,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Local => "local",
            Segment::Argument => "argument",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
            Segment::Static => "static",
        }
    }

    pub fn parse(s: &str) -> Option<Segment> {
        Segment::ALL.into_iter().find(|seg| seg.name() == s)
    }

    /// Number of cells in fixed-size segments.
    pub fn size(self) -> Option<u16> {
        match self {
            Segment::Pointer => Some(2),
            Segment::Temp => Some(8),
            _ => None,
        }
    }
}

/// Single VM command.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Command {
    Arithmetic(ArithOp),
    Push(Segment, u16),
    Pop(Segment, u16),
    Label(String),
    Goto(String),
    IfGoto(String),
    /// Function name and number of locals
    Function(String, u16),
    /// Function name and number of arguments
    Call(String, u16),
    Return,
}

/// Error parsing a VM command line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ParseError {
    UnknownCommand(String),
    Arity {
        command: &'static str,
        expected: usize,
        found: usize,
    },
    BadName(String),
    BadNumber(String),
    NegativeNumber(String),
    /// Number larger than an A-instruction can load.
    NumberRange(String),
    /// Argument count too large for the call frame.
    ArgsRange(String),
    UnknownSegment(String),
    PopConstant,
    SegmentRange { segment: Segment, offset: u16 },
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand(name) => write!(f, "unknown command `{}`", name),
            Self::Arity {
                command,
                expected,
                found,
            } => write!(
                f,
                "`{}` takes {} operand(s), found {}",
                command, expected, found
            ),
            Self::BadName(name) => write!(f, "`{}` is not a valid name", name),
            Self::BadNumber(num) => write!(f, "`{}` is not a number", num),
            Self::NegativeNumber(num) => write!(f, "`{}` is negative", num),
            Self::NumberRange(num) => write!(f, "`{}` is larger than {}", num, MAX_ADDRESS),
            Self::ArgsRange(num) => write!(f, "`{}` arguments exceed the limit of {}", num, MAX_ARGS),
            Self::UnknownSegment(name) => write!(f, "unknown segment `{}`", name),
            Self::PopConstant => write!(f, "cannot pop into the constant segment"),
            Self::SegmentRange { segment, offset } => write!(
                f,
                "offset {} is outside the {} segment",
                offset,
                segment.name()
            ),
        }
    }
}

fn parse_number(tok: &str) -> Result<u16, ParseError> {
    if let Some(digits) = tok.strip_prefix('-') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::NegativeNumber(tok.to_string()));
        }
    }
    if tok.is_empty() || !tok.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadNumber(tok.to_string()));
    }
    match tok.parse::<u32>() {
        Ok(num) if num <= MAX_ADDRESS as u32 => Ok(num as u16),
        _ => Err(ParseError::NumberRange(tok.to_string())),
    }
}

fn parse_name(tok: &str) -> Result<String, ParseError> {
    if is_symbol(tok) {
        Ok(tok.to_string())
    } else {
        Err(ParseError::BadName(tok.to_string()))
    }
}

fn parse_access(segment: &str, offset: &str, pop: bool) -> Result<(Segment, u16), ParseError> {
    let segment =
        Segment::parse(segment).ok_or_else(|| ParseError::UnknownSegment(segment.to_string()))?;
    let offset = parse_number(offset)?;
    if pop && segment == Segment::Constant {
        return Err(ParseError::PopConstant);
    }
    if let Some(size) = segment.size() {
        if offset >= size {
            return Err(ParseError::SegmentRange { segment, offset });
        }
    }
    Ok((segment, offset))
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let toks: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = toks.split_first() else {
            return Err(ParseError::UnknownCommand(String::new()));
        };

        let (command, expected) = match name {
            "push" => ("push", 2),
            "pop" => ("pop", 2),
            "label" => ("label", 1),
            "goto" => ("goto", 1),
            "if-goto" => ("if-goto", 1),
            "function" => ("function", 2),
            "call" => ("call", 2),
            "return" => ("return", 0),
            _ => match ArithOp::parse(name) {
                Some(op) => (op.mnemonic(), 0),
                None => return Err(ParseError::UnknownCommand(name.to_string())),
            },
        };
        if args.len() != expected {
            return Err(ParseError::Arity {
                command,
                expected,
                found: args.len(),
            });
        }

        Ok(match command {
            "push" => {
                let (seg, offs) = parse_access(args[0], args[1], false)?;
                Command::Push(seg, offs)
            }
            "pop" => {
                let (seg, offs) = parse_access(args[0], args[1], true)?;
                Command::Pop(seg, offs)
            }
            "label" => Command::Label(parse_name(args[0])?),
            "goto" => Command::Goto(parse_name(args[0])?),
            "if-goto" => Command::IfGoto(parse_name(args[0])?),
            "function" => Command::Function(parse_name(args[0])?, parse_number(args[1])?),
            "call" => {
                let count = parse_number(args[1])?;
                if count > MAX_ARGS {
                    return Err(ParseError::ArgsRange(args[1].to_string()));
                }
                Command::Call(parse_name(args[0])?, count)
            }
            "return" => Command::Return,
            // Only arithmetic mnemonics remain
            _ => match ArithOp::parse(command) {
                Some(op) => Command::Arithmetic(op),
                None => return Err(ParseError::UnknownCommand(name.to_string())),
            },
        })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Arithmetic(op) => write!(f, "{}", op.mnemonic()),
            Command::Push(seg, offs) => write!(f, "push {} {}", seg.name(), offs),
            Command::Pop(seg, offs) => write!(f, "pop {} {}", seg.name(), offs),
            Command::Label(name) => write!(f, "label {}", name),
            Command::Goto(name) => write!(f, "goto {}", name),
            Command::IfGoto(name) => write!(f, "if-goto {}", name),
            Command::Function(name, locals) => write!(f, "function {} {}", name, locals),
            Command::Call(name, args) => write!(f, "call {} {}", name, args),
            Command::Return => write!(f, "return"),
        }
    }
}
