//! Hack instruction set: field tables, instruction classification and word encoding.

use std::{fmt, str::FromStr};

/// Largest value an A-instruction can load.
pub const MAX_ADDRESS: u16 = 0x7FFF;

/// Destination field of a C-instruction.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Dest {
    Null,
    M,
    D,
    MD,
    A,
    AM,
    AD,
    AMD,
}

impl Dest {
    pub const ALL: [Dest; 8] = [
        Dest::Null,
        Dest::M,
        Dest::D,
        Dest::MD,
        Dest::A,
        Dest::AM,
        Dest::AD,
        Dest::AMD,
    ];

    pub fn bits(self) -> u16 {
        match self {
            Dest::Null => 0b000,
            Dest::M => 0b001,
            Dest::D => 0b010,
            Dest::MD => 0b011,
            Dest::A => 0b100,
            Dest::AM => 0b101,
            Dest::AD => 0b110,
            Dest::AMD => 0b111,
        }
    }

    /// Empty for [`Dest::Null`], which is written by leaving the field out.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Dest::Null => "",
            Dest::M => "M",
            Dest::D => "D",
            Dest::MD => "MD",
            Dest::A => "A",
            Dest::AM => "AM",
            Dest::AD => "AD",
            Dest::AMD => "AMD",
        }
    }

    pub fn parse(s: &str) -> Option<Dest> {
        Dest::ALL
            .into_iter()
            .find(|dest| *dest != Dest::Null && dest.mnemonic() == s)
    }
}

/// Jump condition of a C-instruction, tested against the ALU output.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Jump {
    Null,
    JGT,
    JEQ,
    JGE,
    JLT,
    JNE,
    JLE,
    JMP,
}

impl Jump {
    pub const ALL: [Jump; 8] = [
        Jump::Null,
        Jump::JGT,
        Jump::JEQ,
        Jump::JGE,
        Jump::JLT,
        Jump::JNE,
        Jump::JLE,
        Jump::JMP,
    ];

    pub fn bits(self) -> u16 {
        match self {
            Jump::Null => 0b000,
            Jump::JGT => 0b001,
            Jump::JEQ => 0b010,
            Jump::JGE => 0b011,
            Jump::JLT => 0b100,
            Jump::JNE => 0b101,
            Jump::JLE => 0b110,
            Jump::JMP => 0b111,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Jump::Null => "",
            Jump::JGT => "JGT",
            Jump::JEQ => "JEQ",
            Jump::JGE => "JGE",
            Jump::JLT => "JLT",
            Jump::JNE => "JNE",
            Jump::JLE => "JLE",
            Jump::JMP => "JMP",
        }
    }

    pub fn parse(s: &str) -> Option<Jump> {
        Jump::ALL
            .into_iter()
            .find(|jump| *jump != Jump::Null && jump.mnemonic() == s)
    }
}

/// Computation field of a C-instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Comp {
    Zero,
    One,
    MinusOne,
    D,
    A,
    M,
    NotD,
    NotA,
    NotM,
    NegD,
    NegA,
    NegM,
    DPlusOne,
    APlusOne,
    MPlusOne,
    DMinusOne,
    AMinusOne,
    MMinusOne,
    DPlusA,
    DPlusM,
    DMinusA,
    DMinusM,
    AMinusD,
    MMinusD,
    DAndA,
    DAndM,
    DOrA,
    DOrM,
}

impl Comp {
    pub const ALL: [Comp; 28] = [
        Comp::Zero,
        Comp::One,
        Comp::MinusOne,
        Comp::D,
        Comp::A,
        Comp::M,
        Comp::NotD,
        Comp::NotA,
        Comp::NotM,
        Comp::NegD,
        Comp::NegA,
        Comp::NegM,
        Comp::DPlusOne,
        Comp::APlusOne,
        Comp::MPlusOne,
        Comp::DMinusOne,
        Comp::AMinusOne,
        Comp::MMinusOne,
        Comp::DPlusA,
        Comp::DPlusM,
        Comp::DMinusA,
        Comp::DMinusM,
        Comp::AMinusD,
        Comp::MMinusD,
        Comp::DAndA,
        Comp::DAndM,
        Comp::DOrA,
        Comp::DOrM,
    ];

    /// The `a` bit followed by the six ALU control bits.
    pub fn bits(self) -> u16 {
        match self {
            Comp::Zero => 0b0101010,
            Comp::One => 0b0111111,
            Comp::MinusOne => 0b0111010,
            Comp::D => 0b0001100,
            Comp::A => 0b0110000,
            Comp::M => 0b1110000,
            Comp::NotD => 0b0001101,
            Comp::NotA => 0b0110001,
            Comp::NotM => 0b1110001,
            Comp::NegD => 0b0001111,
            Comp::NegA => 0b0110011,
            Comp::NegM => 0b1110011,
            Comp::DPlusOne => 0b0011111,
            Comp::APlusOne => 0b0110111,
            Comp::MPlusOne => 0b1110111,
            Comp::DMinusOne => 0b0001110,
            Comp::AMinusOne => 0b0110010,
            Comp::MMinusOne => 0b1110010,
            Comp::DPlusA => 0b0000010,
            Comp::DPlusM => 0b1000010,
            Comp::DMinusA => 0b0010011,
            Comp::DMinusM => 0b1010011,
            Comp::AMinusD => 0b0000111,
            Comp::MMinusD => 0b1000111,
            Comp::DAndA => 0b0000000,
            Comp::DAndM => 0b1000000,
            Comp::DOrA => 0b0010101,
            Comp::DOrM => 0b1010101,
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Comp::Zero => "0",
            Comp::One => "1",
            Comp::MinusOne => "-1",
            Comp::D => "D",
            Comp::A => "A",
            Comp::M => "M",
            Comp::NotD => "!D",
            Comp::NotA => "!A",
            Comp::NotM => "!M",
            Comp::NegD => "-D",
            Comp::NegA => "-A",
            Comp::NegM => "-M",
            Comp::DPlusOne => "D+1",
            Comp::APlusOne => "A+1",
            Comp::MPlusOne => "M+1",
            Comp::DMinusOne => "D-1",
            Comp::AMinusOne => "A-1",
            Comp::MMinusOne => "M-1",
            Comp::DPlusA => "D+A",
            Comp::DPlusM => "D+M",
            Comp::DMinusA => "D-A",
            Comp::DMinusM => "D-M",
            Comp::AMinusD => "A-D",
            Comp::MMinusD => "M-D",
            Comp::DAndA => "D&A",
            Comp::DAndM => "D&M",
            Comp::DOrA => "D|A",
            Comp::DOrM => "D|M",
        }
    }

    pub fn parse(s: &str) -> Option<Comp> {
        Comp::ALL.into_iter().find(|comp| comp.mnemonic() == s)
    }
}

/// Field of a C-instruction, for error reporting.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Field {
    Dest,
    Comp,
    Jump,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Dest => write!(f, "destination"),
            Field::Comp => write!(f, "computation"),
            Field::Jump => write!(f, "jump"),
        }
    }
}

/// Value loaded by an A-instruction.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operand {
    /// Decimal literal, range checked at encoding time
    Literal(u32),
    Symbol(String),
}

/// Single line of Hack assembly.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Instruction {
    /// `@value`
    A(Operand),
    /// `dest=comp;jump`
    C { dest: Dest, comp: Comp, jump: Jump },
    /// `(NAME)`, binds a name to the following instruction
    Label(String),
}

/// Error classifying or parsing a single assembly line.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ParseError {
    /// Line matches none of the instruction shapes.
    Malformed,
    /// Name contains characters not allowed in a symbol.
    BadSymbol(String),
    /// Field text is not in its mnemonic table.
    UnknownMnemonic { field: Field, token: String },
    /// Literal does not fit in 15 bits.
    LiteralRange(String),
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "not an A-instruction, C-instruction or label"),
            Self::BadSymbol(name) => write!(f, "`{}` is not a valid symbol name", name),
            Self::UnknownMnemonic { field, token } => {
                write!(f, "unknown {} mnemonic `{}`", field, token)
            }
            Self::LiteralRange(lit) => {
                write!(f, "literal `{}` does not fit in 15 bits", lit)
            }
        }
    }
}

/// Test if `name` is a legal symbol: letters, digits, `_.$:`, not starting with a digit.
pub fn is_symbol(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => false,
        Some(c) if is_symbol_char(c) => chars.all(is_symbol_char),
        _ => false,
    }
}

fn is_symbol_char(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '$' | ':')
}

impl FromStr for Instruction {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if let Some(value) = line.strip_prefix('@') {
            return parse_operand(value).map(Instruction::A);
        }
        if line.contains('=') || line.contains(';') {
            return parse_c(line);
        }
        if let Some(name) = line.strip_prefix('(').and_then(|l| l.strip_suffix(')')) {
            if !is_symbol(name) {
                return Err(ParseError::BadSymbol(name.to_string()));
            }
            return Ok(Instruction::Label(name.to_string()));
        }
        Err(ParseError::Malformed)
    }
}

fn parse_operand(value: &str) -> Result<Operand, ParseError> {
    if value.is_empty() {
        return Err(ParseError::Malformed);
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<u32>()
            .map(Operand::Literal)
            .map_err(|_| ParseError::LiteralRange(value.to_string()));
    }
    if is_symbol(value) {
        Ok(Operand::Symbol(value.to_string()))
    } else {
        Err(ParseError::BadSymbol(value.to_string()))
    }
}

fn parse_c(line: &str) -> Result<Instruction, ParseError> {
    let (dest, rest) = match line.split_once('=') {
        Some((dest, rest)) => (Some(dest), rest),
        None => (None, line),
    };
    let (comp, jump) = match rest.split_once(';') {
        Some((comp, jump)) => (comp, Some(jump)),
        None => (rest, None),
    };

    let unknown = |field, token: &str| ParseError::UnknownMnemonic {
        field,
        token: token.to_string(),
    };
    let dest = match dest {
        Some(dest) => Dest::parse(dest).ok_or_else(|| unknown(Field::Dest, dest))?,
        None => Dest::Null,
    };
    let comp = Comp::parse(comp).ok_or_else(|| unknown(Field::Comp, comp))?;
    let jump = match jump {
        Some(jump) => Jump::parse(jump).ok_or_else(|| unknown(Field::Jump, jump))?,
        None => Jump::Null,
    };
    Ok(Instruction::C { dest, comp, jump })
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::A(Operand::Literal(value)) => write!(f, "@{}", value),
            Instruction::A(Operand::Symbol(name)) => write!(f, "@{}", name),
            Instruction::C { dest, comp, jump } => {
                if *dest != Dest::Null {
                    write!(f, "{}=", dest.mnemonic())?;
                }
                write!(f, "{}", comp.mnemonic())?;
                if *jump != Jump::Null {
                    write!(f, ";{}", jump.mnemonic())?;
                }
                Ok(())
            }
            Instruction::Label(name) => write!(f, "({})", name),
        }
    }
}

/// One 16-bit machine instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Word(pub u16);

impl Word {
    /// A-instruction loading `value`. `None` if it needs more than 15 bits.
    pub fn a(value: u32) -> Option<Word> {
        if value > MAX_ADDRESS as u32 {
            return None;
        }
        Some(Word(value as u16))
    }

    pub fn c(dest: Dest, comp: Comp, jump: Jump) -> Word {
        Word(0b111 << 13 | comp.bits() << 6 | dest.bits() << 3 | jump.bits())
    }

    pub fn is_c(self) -> bool {
        self.0 & 0x8000 != 0
    }

    /// Parse a line of a `.hack` file.
    pub fn parse(s: &str) -> Option<Word> {
        if s.len() != 16 || !s.bytes().all(|b| b == b'0' || b == b'1') {
            return None;
        }
        u16::from_str_radix(s, 2).ok().map(Word)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016b}", self.0)
    }
}
