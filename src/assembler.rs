use std::fmt;

use miette::Result;

use crate::{
    error,
    hack::{Instruction, Operand, Word},
    source::{Line, Source},
    symbol::SymbolTable,
};

/// Assembled machine code, one word per instruction.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Program {
    words: Vec<Word>,
}

impl Program {
    pub fn new(words: Vec<Word>) -> Self {
        Program { words }
    }

    /// Read the text form written by `Display`, one 16-digit binary word per line.
    pub fn from_hack(src: &Source) -> Result<Self> {
        let mut words = Vec::new();
        for line in src.lines() {
            match Word::parse(line.text) {
                Some(word) => words.push(word),
                None => return Err(error::hack_bad_word(&line, src)),
            }
        }
        Ok(Program { words })
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, word) in self.words.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", word)?;
        }
        Ok(())
    }
}

/// Two-pass assembler. Owns the symbol table for a single run.
pub struct Assembler {
    symbols: SymbolTable,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler {
            symbols: SymbolTable::new(),
        }
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Assemble a whole source file.
    pub fn assemble(&mut self, src: &Source) -> Result<Program> {
        let lines = parse(src)?;
        self.scan_labels(&lines, src)?;
        self.generate(&lines, src)
    }

    /// First pass: bind every label to the address of the instruction following it.
    fn scan_labels(&mut self, lines: &[(Line, Instruction)], src: &Source) -> Result<()> {
        let mut pc: u32 = 0;
        for (line, instr) in lines {
            match instr {
                Instruction::Label(name) => {
                    // Out of range addresses are caught when a reference is encoded
                    let addr = u16::try_from(pc).unwrap_or(u16::MAX);
                    if let Err(prev) = self.symbols.bind_label(name, addr) {
                        return Err(error::asm_duplicate_label(line, src, name, prev));
                    }
                }
                Instruction::A(_) | Instruction::C { .. } => pc += 1,
            }
        }
        Ok(())
    }

    /// Second pass: resolve symbols, allocating variables on first use, and encode.
    fn generate(&mut self, lines: &[(Line, Instruction)], src: &Source) -> Result<Program> {
        let mut words = Vec::with_capacity(lines.len());
        for (line, instr) in lines {
            let word = match instr {
                Instruction::A(operand) => {
                    let value = match operand {
                        Operand::Literal(value) => *value,
                        Operand::Symbol(name) => match self.symbols.lookup(name) {
                            Some(addr) => addr as u32,
                            None => self.symbols.bind_if_absent(name) as u32,
                        },
                    };
                    Word::a(value)
                        .ok_or_else(|| error::asm_address_range(line, src, &value.to_string()))?
                }
                Instruction::C { dest, comp, jump } => Word::c(*dest, *comp, *jump),
                Instruction::Label(_) => continue,
            };
            words.push(word);
        }
        Ok(Program { words })
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Classify every line of a source.
pub fn parse(src: &Source) -> Result<Vec<(Line<'_>, Instruction)>> {
    src.lines()
        .map(|line| {
            line.text
                .parse::<Instruction>()
                .map(|instr| (line, instr))
                .map_err(|err| error::asm_parse(err, &line, src))
        })
        .collect()
}

/// Assemble a source with a fresh symbol table.
pub fn assemble(src: &Source) -> Result<Program> {
    Assembler::new().assemble(src)
}
