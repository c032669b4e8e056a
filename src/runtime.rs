use std::fmt;

use miette::{bail, miette, Result, Severity};

use crate::{assembler::Program, hack::Word};

/// Hack ROM and RAM are both 32K words.
pub const MEMORY_MAX: usize = 0x8000;

const DEST_A: u16 = 0b100;
const DEST_D: u16 = 0b010;
const DEST_M: u16 = 0b001;

/// Why a run stopped.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Exit {
    /// Reached the conventional `(L) @L 0;JMP` loop
    Halted,
    /// PC moved one past the last instruction
    End,
    /// Cycle budget used up
    Budget,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Halted => write!(f, "halted"),
            Exit::End => write!(f, "reached end of program"),
            Exit::Budget => write!(f, "cycle budget exhausted"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Status {
    pub exit: Exit,
    pub cycles: u64,
}

/// Outcome of a single instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Step {
    Continue,
    Halted,
}

/// Complete machine state: program ROM, data RAM and the three registers.
pub struct Machine {
    rom: Vec<Word>,
    ram: Box<[u16]>,
    a: u16,
    d: u16,
    pc: u16,
}

impl Machine {
    pub fn new() -> Self {
        Machine {
            rom: Vec::new(),
            ram: vec![0; MEMORY_MAX].into_boxed_slice(),
            a: 0,
            d: 0,
            pc: 0,
        }
    }

    pub fn from_program(program: &Program) -> Result<Self> {
        let mut machine = Machine::new();
        machine.load(program.words())?;
        Ok(machine)
    }

    /// Replace ROM contents and reset registers. RAM is left as is.
    pub fn load(&mut self, words: &[Word]) -> Result<()> {
        if words.len() > MEMORY_MAX {
            bail!(
                severity = Severity::Error,
                code = "run::program_size",
                help = "ROM holds at most 32,768 instructions",
                "Program has {} instructions and cannot fit in ROM",
                words.len(),
            );
        }
        self.rom = words.to_vec();
        self.a = 0;
        self.d = 0;
        self.pc = 0;
        Ok(())
    }

    pub fn a(&self) -> u16 {
        self.a
    }

    pub fn d(&self) -> u16 {
        self.d
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn ram(&self) -> &[u16] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u16] {
        &mut self.ram
    }

    /// Read a RAM cell; addresses past the end read as 0.
    pub fn peek(&self, addr: u16) -> u16 {
        self.ram.get(addr as usize).copied().unwrap_or(0)
    }

    /// Write a RAM cell; addresses past the end are ignored.
    pub fn poke(&mut self, addr: u16, value: u16) {
        if let Some(cell) = self.ram.get_mut(addr as usize) {
            *cell = value;
        }
    }

    /// Execute until a halt loop, the end of ROM, or `max_cycles` instructions.
    pub fn run(&mut self, max_cycles: u64) -> Result<Status> {
        let mut cycles = 0;
        loop {
            if self.pc as usize == self.rom.len() {
                return Ok(Status { exit: Exit::End, cycles });
            }
            if cycles >= max_cycles {
                return Ok(Status { exit: Exit::Budget, cycles });
            }
            cycles += 1;
            if self.step()? == Step::Halted {
                return Ok(Status { exit: Exit::Halted, cycles });
            }
        }
    }

    /// Execute the instruction at PC.
    pub fn step(&mut self) -> Result<Step> {
        let pc = self.pc;
        let Some(&word) = self.rom.get(pc as usize) else {
            return Err(miette!(
                severity = Severity::Error,
                code = "run::pc_range",
                help = "end programs with an infinite loop such as `(END) @END 0;JMP`",
                "PC {} is past the end of the {}-instruction program",
                pc,
                self.rom.len(),
            ));
        };

        if !word.is_c() {
            self.a = word.0;
            self.pc = pc.wrapping_add(1);
            return Ok(Step::Continue);
        }

        // Memory and jump target use A from before this instruction
        let addr = self.a;
        let uses_m = word.0 & (1 << 12) != 0;
        let y = if uses_m { self.read(addr, pc)? } else { self.a };
        let out = alu((word.0 >> 6) & 0b11_1111, self.d, y);

        let dest = (word.0 >> 3) & 0b111;
        if dest & DEST_M != 0 {
            self.write(addr, out, pc)?;
        }
        if dest & DEST_A != 0 {
            self.a = out;
        }
        if dest & DEST_D != 0 {
            self.d = out;
        }

        if jumps(word.0 & 0b111, out) {
            self.pc = addr;
            let halt = addr.wrapping_add(1) == pc && self.rom.get(addr as usize) == Some(&Word(addr));
            if halt {
                return Ok(Step::Halted);
            }
        } else {
            self.pc = pc.wrapping_add(1);
        }
        Ok(Step::Continue)
    }

    fn read(&self, addr: u16, pc: u16) -> Result<u16> {
        match self.ram.get(addr as usize) {
            Some(&value) => Ok(value),
            None => Err(memory_range(addr, pc)),
        }
    }

    fn write(&mut self, addr: u16, value: u16, pc: u16) -> Result<()> {
        match self.ram.get_mut(addr as usize) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(memory_range(addr, pc)),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

fn memory_range(addr: u16, pc: u16) -> miette::Report {
    miette!(
        severity = Severity::Error,
        code = "run::memory_range",
        help = "RAM addresses range from 0 to 32,767",
        "Instruction {} accesses M with A = {}",
        pc,
        addr,
    )
}

/// Hack ALU. `control` holds zx nx zy ny f no, most significant first.
fn alu(control: u16, x: u16, y: u16) -> u16 {
    let bit = |n: u16| control & (1 << n) != 0;
    let mut x = if bit(5) { 0 } else { x };
    if bit(4) {
        x = !x;
    }
    let mut y = if bit(3) { 0 } else { y };
    if bit(2) {
        y = !y;
    }
    let out = if bit(1) { x.wrapping_add(y) } else { x & y };
    if bit(0) {
        !out
    } else {
        out
    }
}

/// Jump bits are lt eq gt, most significant first.
fn jumps(jump: u16, out: u16) -> bool {
    let out = out as i16;
    (jump & 0b100 != 0 && out < 0) || (jump & 0b010 != 0 && out == 0) || (jump & 0b001 != 0 && out > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembler::assemble, hack::Comp, source::Source};

    fn machine(asm: &str) -> Machine {
        let program = assemble(&Source::new("Test.asm", asm)).unwrap();
        Machine::from_program(&program).unwrap()
    }

    #[test]
    fn alu_matches_comp_table() {
        let (d, a) = (17u16, 5u16);
        for comp in Comp::ALL {
            let y = a;
            let expected = match comp.mnemonic().replace('M', "A").as_str() {
                "0" => 0,
                "1" => 1,
                "-1" => u16::MAX,
                "D" => d,
                "A" => y,
                "!D" => !d,
                "!A" => !y,
                "-D" => d.wrapping_neg(),
                "-A" => y.wrapping_neg(),
                "D+1" => d + 1,
                "A+1" => y + 1,
                "D-1" => d - 1,
                "A-1" => y - 1,
                "D+A" => d + y,
                "D-A" => d - y,
                "A-D" => y.wrapping_sub(d),
                "D&A" => d & y,
                "D|A" => d | y,
                other => panic!("unexpected mnemonic {other}"),
            };
            let control = comp.bits() & 0b11_1111;
            assert_eq!(alu(control, d, y), expected, "{}", comp.mnemonic());
        }
    }

    #[test]
    fn adds_constants() {
        let mut m = machine("@2\nD=A\n@3\nD=D+A\n@0\nM=D");
        let status = m.run(100).unwrap();
        assert_eq!(status, Status { exit: Exit::End, cycles: 6 });
        assert_eq!(m.peek(0), 5);
    }

    #[test]
    fn detects_halt_loop() {
        let mut m = machine("@7\nD=A\n(END)\n@END\n0;JMP");
        let status = m.run(1000).unwrap();
        assert_eq!(status.exit, Exit::Halted);
        assert_eq!(status.cycles, 4);
        assert_eq!(m.d(), 7);
        assert_eq!(m.pc(), 2);
    }

    #[test]
    fn stops_at_budget() {
        let mut m = machine("(LOOP)\n@R0\nM=M+1\n@LOOP\n0;JMP");
        let status = m.run(40).unwrap();
        assert_eq!(status.exit, Exit::Budget);
        assert_eq!(m.peek(0), 10);
    }

    #[test]
    fn memory_write_uses_previous_a() {
        let mut m = machine("@100\nAM=M+1\n@101\nM=A");
        m.poke(100, 41);
        m.run(100).unwrap();
        assert_eq!(m.peek(100), 42);
        assert_eq!(m.peek(42), 0);
        assert_eq!(m.peek(101), 101);
    }

    #[test]
    fn conditional_jumps() {
        // R2 = max(R0, R1)
        let asm = "\
            @R0\nD=M\n@R1\nD=D-M\n@FIRST\nD;JGT\n\
            @R1\nD=M\n@STORE\n0;JMP\n\
            (FIRST)\n@R0\nD=M\n\
            (STORE)\n@R2\nM=D\n\
            (END)\n@END\n0;JMP";
        for (x, y) in [(3u16, 9u16), (9, 3), ((-4i16) as u16, 2)] {
            let mut m = machine(asm);
            m.poke(0, x);
            m.poke(1, y);
            assert_eq!(m.run(1000).unwrap().exit, Exit::Halted);
            assert_eq!(m.peek(2) as i16, (x as i16).max(y as i16));
        }
    }

    #[test]
    fn stepping_past_program_fails() {
        let mut m = machine("@1");
        assert_eq!(m.step().unwrap(), Step::Continue);
        assert!(m.step().is_err());
    }

    #[test]
    fn memory_out_of_range_fails() {
        let mut m = machine("@32767\nD=A\nA=D+1\nM=1");
        assert!(m.run(10).is_err());
    }
}
