use fxhash::FxBuildHasher;
use miette::Result;

use super::{ArithOp, Command, Segment, Site, FRAME_SIZE};
use crate::{
    error,
    source::Source,
    symbol::{FxMap, PREDEFINED},
};

/// First RAM cell of the `temp` segment (`R5`).
const TEMP_BASE: u16 = 5;
/// Initial stack pointer set by the bootstrap code.
const STACK_BASE: u16 = 256;
/// Function the bootstrap code hands control to.
pub const ENTRY_POINT: &str = "Sys.init";

macro_rules! emit {
    ( $t:expr; $($line:expr),+ $(,)? ) => {{
        $( $t.line($line); )+
    }};
}

/// Translation context for one run over one or more units.
///
/// Owns the counter used to mint unique labels, the current unit and function names that
/// namespace statics and labels, and the cross-unit bookkeeping checked by [`Translator::finish`].
pub struct Translator {
    out: String,
    /// Next number handed out by `fresh`
    counter: usize,
    unit: String,
    function: Option<String>,
    annotate: bool,
    functions: FxMap<String, Site>,
    /// User labels by scoped name, the targets `goto` may reach
    labels: FxMap<String, Site>,
    /// Every label written to the output, generated ones included
    emitted: FxMap<String, Site>,
    /// Static cells by symbol name
    statics: FxMap<String, Site>,
    /// Labels and statics produced by the current command, not yet recorded
    pending: Vec<String>,
    pending_statics: Vec<String>,
    /// Called function names, checked against `functions` once every unit is in
    calls: Vec<(String, Site)>,
    /// Scoped jump targets, checked against `labels`
    jumps: Vec<(String, Site)>,
}

impl Translator {
    pub fn new() -> Self {
        Translator {
            out: String::new(),
            counter: 0,
            unit: String::new(),
            function: None,
            annotate: false,
            functions: FxMap::with_hasher(FxBuildHasher::default()),
            labels: FxMap::with_hasher(FxBuildHasher::default()),
            emitted: FxMap::with_hasher(FxBuildHasher::default()),
            statics: FxMap::with_hasher(FxBuildHasher::default()),
            pending: Vec::new(),
            pending_statics: Vec::new(),
            calls: Vec::new(),
            jumps: Vec::new(),
        }
    }

    /// Precede each command's code with a comment holding the command.
    pub fn annotate(mut self, annotate: bool) -> Self {
        self.annotate = annotate;
        self
    }

    /// Emit code setting up the stack and calling [`ENTRY_POINT`]. Must come before any unit.
    pub fn bootstrap(&mut self) {
        let call = Command::Call(ENTRY_POINT.to_string(), 0);
        if self.annotate {
            self.line("// bootstrap");
        }
        emit!(self; format!("@{STACK_BASE}"), "D=A", "@SP", "M=D");
        let site = Site {
            unit: "<bootstrap>".to_string(),
            line: 0,
            text: call.to_string(),
        };
        self.calls.push((ENTRY_POINT.to_string(), site.clone()));
        self.command(&call);
        // Nothing precedes the bootstrap, so its labels cannot clash
        let _ = self.settle(&site);
    }

    /// Translate every command of one unit, validating names against the rest of the run.
    pub fn translate(&mut self, src: &Source) -> Result<()> {
        self.set_unit(src.unit());
        for line in src.lines() {
            let cmd: Command = line
                .text
                .parse()
                .map_err(|err| error::vm_parse(err, &line, src))?;

            match &cmd {
                Command::Function(name, _) => {
                    if PREDEFINED.iter().any(|(symbol, _)| *symbol == name.as_str()) {
                        return Err(error::vm_reserved_name(&line, src, name));
                    }
                    if let Some(prev) = self.functions.get(name) {
                        return Err(error::vm_duplicate_function(&line, src, name, prev));
                    }
                    self.functions.insert(name.clone(), Site::new(src, &line));
                }
                Command::Label(name) => {
                    let scoped = self.scoped(name);
                    if let Some(prev) = self.labels.get(&scoped) {
                        return Err(error::vm_duplicate_label(&line, src, name, prev));
                    }
                    self.labels.insert(scoped, Site::new(src, &line));
                }
                Command::Goto(name) | Command::IfGoto(name) => {
                    let target = self.scoped(name);
                    self.jumps.push((target, Site::new(src, &line)));
                }
                Command::Call(name, _) => {
                    self.calls.push((name.clone(), Site::new(src, &line)));
                }
                _ => {}
            }

            let site = Site::new(src, &line);
            self.command(&cmd);
            self.settle(&site)
                .map_err(|(name, prev)| error::vm_name_clash(&line, src, &name, &prev))?;
        }
        Ok(())
    }

    /// Check references between units and return the generated assembly.
    pub fn finish(self) -> Result<String> {
        for (name, site) in &self.calls {
            if !self.functions.contains_key(name) {
                return Err(error::vm_unresolved_function(name, site));
            }
        }
        for (scoped, site) in &self.jumps {
            if !self.labels.contains_key(scoped) {
                let name = scoped.rsplit_once('$').map_or(scoped.as_str(), |(_, n)| n);
                return Err(error::vm_unresolved_label(name, site));
            }
        }
        Ok(self.out)
    }

    /// Start a new unit. Statics are named after it and no function is open.
    pub fn set_unit(&mut self, unit: &str) {
        self.unit = unit.to_string();
        self.function = None;
    }

    /// Record the labels and static cells the last command produced.
    /// Fails with the first name and the site that already claimed it.
    fn settle(&mut self, site: &Site) -> std::result::Result<(), (String, Site)> {
        for name in std::mem::take(&mut self.pending) {
            if let Some(prev) = self.emitted.get(&name).or_else(|| self.statics.get(&name)) {
                return Err((name, prev.clone()));
            }
            self.emitted.insert(name, site.clone());
        }
        for name in std::mem::take(&mut self.pending_statics) {
            if let Some(prev) = self.emitted.get(&name) {
                return Err((name, prev.clone()));
            }
            self.statics.entry(name).or_insert_with(|| site.clone());
        }
        Ok(())
    }

    /// Generate code for a single command in the current unit and function.
    fn command(&mut self, cmd: &Command) {
        if self.annotate {
            self.line(format!("// {cmd}"));
        }
        match cmd {
            Command::Arithmetic(op) => self.arithmetic(*op),
            Command::Push(seg, idx) => self.push(*seg, *idx),
            Command::Pop(seg, idx) => self.pop(*seg, *idx),
            Command::Label(name) => {
                let label = self.scoped(name);
                self.label(label);
            }
            Command::Goto(name) => {
                let label = self.scoped(name);
                emit!(self; format!("@{label}"), "0;JMP");
            }
            Command::IfGoto(name) => {
                let label = self.scoped(name);
                self.pop_d();
                emit!(self; format!("@{label}"), "D;JNE");
            }
            Command::Function(name, locals) => {
                self.function = Some(name.clone());
                self.label(name.clone());
                for _ in 0..*locals {
                    emit!(self; "@SP", "A=M", "M=0", "@SP", "M=M+1");
                }
            }
            Command::Call(name, args) => self.call(name, *args),
            Command::Return => self.ret(),
        }
    }

    /// Mint a number never handed out before in this run.
    fn fresh(&mut self) -> usize {
        let n = self.counter;
        self.counter += 1;
        n
    }

    /// Label name as seen by the assembler: `function$label`, or `unit$label` outside functions.
    fn scoped(&self, label: &str) -> String {
        format!("{}${label}", self.scope())
    }

    fn scope(&self) -> &str {
        self.function.as_deref().unwrap_or(&self.unit)
    }

    /// Declare `name` at the current output position.
    fn label(&mut self, name: String) {
        self.line(format!("({name})"));
        self.pending.push(name);
    }

    fn line(&mut self, line: impl AsRef<str>) {
        self.out.push_str(line.as_ref());
        self.out.push('\n');
    }

    /// Push D onto the stack.
    fn push_d(&mut self) {
        emit!(self; "@SP", "A=M", "M=D", "@SP", "M=M+1");
    }

    /// Pop the stack into D.
    fn pop_d(&mut self) {
        emit!(self; "@SP", "AM=M-1", "D=M");
    }

    fn arithmetic(&mut self, op: ArithOp) {
        match op {
            ArithOp::Neg => emit!(self; "@SP", "A=M-1", "M=-M"),
            ArithOp::Not => emit!(self; "@SP", "A=M-1", "M=!M"),
            ArithOp::Add | ArithOp::Sub | ArithOp::And | ArithOp::Or => {
                let comp = match op {
                    ArithOp::Add => "M=D+M",
                    ArithOp::Sub => "M=M-D",
                    ArithOp::And => "M=D&M",
                    _ => "M=D|M",
                };
                // y in D, A at x
                self.pop_d();
                emit!(self; "A=A-1", comp);
            }
            ArithOp::Eq | ArithOp::Gt | ArithOp::Lt => {
                let (kind, jump) = match op {
                    ArithOp::Eq => ("EQ", "JEQ"),
                    ArithOp::Gt => ("GT", "JGT"),
                    _ => ("LT", "JLT"),
                };
                let n = self.fresh();
                let truthy = format!("{kind}_TRUE_{n}");
                let end = format!("{kind}_END_{n}");
                self.pop_d();
                emit!(self;
                    "A=A-1",
                    "D=M-D",
                    format!("@{truthy}"),
                    format!("D;{jump}"),
                    "@SP",
                    "A=M-1",
                    "M=0",
                    format!("@{end}"),
                    "0;JMP",
                );
                self.label(truthy);
                emit!(self; "@SP", "A=M-1", "M=-1");
                self.label(end);
            }
        }
    }

    /// Symbol holding a segment's base address, for segments reached through a pointer.
    fn base(seg: Segment) -> Option<&'static str> {
        match seg {
            Segment::Local => Some("LCL"),
            Segment::Argument => Some("ARG"),
            Segment::This => Some("THIS"),
            Segment::That => Some("THAT"),
            _ => None,
        }
    }

    /// Symbol naming a fixed cell: pointer, temp and static segments.
    fn fixed(&mut self, seg: Segment, idx: u16) -> String {
        match seg {
            Segment::Pointer if idx == 0 => "THIS".to_string(),
            Segment::Pointer => "THAT".to_string(),
            Segment::Temp => format!("R{}", TEMP_BASE + idx),
            _ => {
                let cell = format!("{}.{}", self.unit, idx);
                self.pending_statics.push(cell.clone());
                cell
            }
        }
    }

    fn push(&mut self, seg: Segment, idx: u16) {
        if seg == Segment::Constant {
            emit!(self; format!("@{idx}"), "D=A");
        } else if let Some(base) = Self::base(seg) {
            emit!(self; format!("@{base}"), "D=M", format!("@{idx}"), "A=D+A", "D=M");
        } else {
            let cell = self.fixed(seg, idx);
            emit!(self; format!("@{cell}"), "D=M");
        }
        self.push_d();
    }

    fn pop(&mut self, seg: Segment, idx: u16) {
        if let Some(base) = Self::base(seg) {
            // Target address goes to R13 while the value is fetched
            emit!(self;
                format!("@{base}"),
                "D=M",
                format!("@{idx}"),
                "D=D+A",
                "@R13",
                "M=D",
            );
            self.pop_d();
            emit!(self; "@R13", "A=M", "M=D");
        } else {
            let cell = self.fixed(seg, idx);
            self.pop_d();
            emit!(self; format!("@{cell}"), "M=D");
        }
    }

    fn call(&mut self, name: &str, args: u16) {
        let n = self.fresh();
        let ret = format!("{}$ret.{n}", self.scope());

        emit!(self; format!("@{ret}"), "D=A");
        self.push_d();
        for base in ["LCL", "ARG", "THIS", "THAT"] {
            emit!(self; format!("@{base}"), "D=M");
            self.push_d();
        }
        // ARG = SP - args - 5
        emit!(self;
            "@SP",
            "D=M",
            format!("@{}", args + FRAME_SIZE),
            "D=D-A",
            "@ARG",
            "M=D",
        );
        // LCL = SP
        emit!(self; "@SP", "D=M", "@LCL", "M=D");
        emit!(self; format!("@{name}"), "0;JMP");
        self.label(ret);
    }

    fn ret(&mut self) {
        // FRAME = LCL, RET = *(FRAME - 5). RET is saved first since *ARG may alias it.
        emit!(self;
            "@LCL",
            "D=M",
            "@R13",
            "M=D",
            format!("@{FRAME_SIZE}"),
            "A=D-A",
            "D=M",
            "@R14",
            "M=D",
        );
        // *ARG = pop(), SP = ARG + 1
        self.pop_d();
        emit!(self; "@ARG", "A=M", "M=D", "@ARG", "D=M+1", "@SP", "M=D");
        for base in ["THAT", "THIS", "ARG", "LCL"] {
            emit!(self; "@R13", "AM=M-1", "D=M", format!("@{base}"), "M=D");
        }
        emit!(self; "@R14", "A=M", "0;JMP");
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use miette::Report;

    use super::*;

    fn translate(text: &str) -> Result<String> {
        let mut translator = Translator::new();
        translator.translate(&Source::new("Test.vm", text))?;
        translator.finish()
    }

    fn error_code(result: Result<String>) -> String {
        let report: Report = result.unwrap_err();
        report.code().map(|code| code.to_string()).unwrap_or_default()
    }

    fn labels(asm: &str) -> Vec<&str> {
        asm.lines()
            .filter_map(|l| l.strip_prefix('(').and_then(|l| l.strip_suffix(')')))
            .collect()
    }

    #[test]
    fn push_constant() {
        let asm = translate("push constant 7").unwrap();
        assert_eq!(asm, "@7\nD=A\n@SP\nA=M\nM=D\n@SP\nM=M+1\n");
    }

    #[test]
    fn comparison_labels_are_unique() {
        let asm = translate("eq\neq\ngt\nlt\neq").unwrap();
        let labels = labels(&asm);
        assert_eq!(labels.len(), 10);
        let mut deduped = labels.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), labels.len());
        assert!(labels.contains(&"EQ_TRUE_0"));
        assert!(labels.contains(&"EQ_END_1"));
    }

    #[test]
    fn counter_spans_units() {
        let mut translator = Translator::new();
        translator
            .translate(&Source::new("A.vm", "function A.f 0\neq\nreturn"))
            .unwrap();
        translator
            .translate(&Source::new("B.vm", "function B.f 0\neq\nreturn"))
            .unwrap();
        let asm = translator.finish().unwrap();
        let labels = labels(&asm);
        assert!(labels.contains(&"EQ_TRUE_0"));
        assert!(labels.contains(&"EQ_TRUE_1"));
    }

    #[test]
    fn statics_are_namespaced_by_unit() {
        let mut translator = Translator::new();
        translator
            .translate(&Source::new("Foo.vm", "push static 3"))
            .unwrap();
        translator
            .translate(&Source::new("Bar.vm", "pop static 3"))
            .unwrap();
        let asm = translator.finish().unwrap();
        assert!(asm.contains("@Foo.3\nD=M\n"));
        assert!(asm.contains("@Bar.3\nM=D\n"));
    }

    #[test]
    fn fixed_segments() {
        let asm = translate("push pointer 1\npop pointer 0\npush temp 6").unwrap();
        assert!(asm.starts_with("@THAT\nD=M\n"));
        assert!(asm.contains("@THIS\nM=D\n"));
        assert!(asm.contains("@R11\nD=M\n"));
    }

    #[test]
    fn labels_are_scoped_to_functions() {
        let asm = translate(
            "function Main.loop 0\nlabel TOP\ngoto TOP\nfunction Main.other 0\nlabel TOP\nif-goto TOP",
        )
        .unwrap();
        assert!(asm.contains("(Main.loop$TOP)\n@Main.loop$TOP\n0;JMP\n"));
        assert!(asm.contains("(Main.other$TOP)"));
        assert!(asm.contains("@Main.other$TOP\nD;JNE\n"));
    }

    #[test]
    fn function_initializes_locals() {
        let asm = translate("function Main.f 2\nreturn").unwrap();
        assert!(asm.starts_with("(Main.f)\n@SP\nA=M\nM=0\n@SP\nM=M+1\n@SP\nA=M\nM=0\n"));
    }

    #[test]
    fn call_sets_up_frame() {
        let asm = translate("function Main.main 0\ncall Main.main 2").unwrap();
        let expected = [
            "@Main.main$ret.0",
            "D=A",
            "@SP",
            "A=M",
            "M=D",
            "@SP",
            "M=M+1",
        ]
        .join("\n");
        assert!(asm.contains(&expected));
        assert!(asm.contains("@SP\nD=M\n@7\nD=D-A\n@ARG\nM=D\n@SP\nD=M\n@LCL\nM=D\n"));
        assert!(asm.ends_with("@Main.main\n0;JMP\n(Main.main$ret.0)\n"));
    }

    #[test]
    fn return_saves_address_before_moving_result() {
        let asm = translate("function Main.f 0\nreturn").unwrap();
        let save = asm.find("@R14\nM=D").unwrap();
        let store = asm.find("@ARG\nA=M\nM=D").unwrap();
        let restore = asm.find("@THAT\nM=D").unwrap();
        assert!(save < store && store < restore);
        assert!(asm.ends_with("@R14\nA=M\n0;JMP\n"));
    }

    #[test]
    fn bootstrap_calls_entry_point() {
        let mut translator = Translator::new();
        translator.bootstrap();
        translator
            .translate(&Source::new("Sys.vm", "function Sys.init 0\nlabel L\ngoto L"))
            .unwrap();
        let asm = translator.finish().unwrap();
        assert!(asm.starts_with("@256\nD=A\n@SP\nM=D\n"));
        assert!(asm.contains("@Sys.init\n0;JMP\n"));
    }

    #[test]
    fn annotates_commands() {
        let mut translator = Translator::new().annotate(true);
        translator
            .translate(&Source::new("T.vm", "push constant 1 // one\nnot"))
            .unwrap();
        let asm = translator.finish().unwrap();
        assert!(asm.starts_with("// push constant 1\n@1\n"));
        assert!(asm.contains("// not\n@SP\nA=M-1\nM=!M\n"));
    }

    #[test]
    fn reports_errors() {
        assert_eq!(error_code(translate("push heap 1")), "vm::unknown_segment");
        assert_eq!(error_code(translate("mul")), "vm::syntax");
        assert_eq!(error_code(translate("push local -2")), "vm::syntax");
        assert_eq!(error_code(translate("push temp 9")), "vm::segment_range");
        assert_eq!(error_code(translate("push constant 40000")), "vm::number_range");
        assert_eq!(
            error_code(translate("function f 0\nfunction f 1")),
            "vm::duplicate_function"
        );
        assert_eq!(
            error_code(translate("function f 0\nlabel A\nlabel A")),
            "vm::duplicate_label"
        );
        assert_eq!(
            error_code(translate("function f 0\ncall g 1")),
            "vm::unresolved_function"
        );
        assert_eq!(
            error_code(translate("function f 0\ngoto NOWHERE")),
            "vm::unresolved_label"
        );
    }

    #[test]
    fn errors_name_the_line() {
        let report = translate("push constant 1\n\n// hi\npush heap 1").unwrap_err();
        let message = report.to_string();
        assert!(message.contains("Line 4"), "{message}");
        assert!(message.contains("push heap 1"), "{message}");
    }

    #[test]
    fn user_label_clashing_with_return_label() {
        assert_eq!(
            error_code(translate(
                "function Main.f 0\nlabel ret.0\ncall Main.f 0\nreturn"
            )),
            "vm::duplicate_label"
        );
        assert_eq!(
            error_code(translate(
                "function Main.f 0\ncall Main.f 0\nlabel ret.0\nreturn"
            )),
            "vm::duplicate_label"
        );
    }

    #[test]
    fn function_named_after_comparison_label() {
        assert_eq!(
            error_code(translate("function EQ_TRUE_0 0\neq\nreturn")),
            "vm::duplicate_label"
        );
        assert_eq!(
            error_code(translate("function Main.f 0\nlt\nfunction LT_END_0 0\nreturn")),
            "vm::duplicate_label"
        );
    }

    #[test]
    fn function_named_after_static_cell() {
        assert_eq!(
            error_code(translate("function Test.3 0\npush static 3\nreturn")),
            "vm::duplicate_label"
        );
        assert_eq!(
            error_code(translate("function Main.f 0\npop static 1\nfunction Test.1 0")),
            "vm::duplicate_label"
        );
        assert!(translate("function Test.f 0\npush static 3\npush static 3\nreturn").is_ok());
    }

    #[test]
    fn function_named_after_predefined_symbol() {
        assert_eq!(error_code(translate("function LCL 0\nreturn")), "vm::reserved_name");
        assert_eq!(error_code(translate("function R13 0\nreturn")), "vm::reserved_name");
    }

    #[test]
    fn call_with_too_many_arguments() {
        assert_eq!(
            error_code(translate("function f 0\ncall f 32763")),
            "vm::number_range"
        );
        assert!(translate("function f 0\ncall f 32762")
            .unwrap()
            .contains("@32767\nD=D-A\n"));
    }

    #[test]
    fn labels_do_not_leak_between_functions() {
        assert_eq!(
            error_code(translate(
                "function f 0\nlabel A\nfunction g 0\ngoto A"
            )),
            "vm::unresolved_label"
        );
    }
}
