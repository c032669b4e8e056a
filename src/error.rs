use miette::{miette, LabeledSpan, Report, Severity};

use crate::{
    hack::{self, Field},
    source::{Line, Source},
    span::Span,
    symbol::Entry,
    vm,
};

/// Span of `token` inside `line`, falling back to the whole line.
fn token_span(line: &Line, token: &str) -> Span {
    match line.text.find(token) {
        Some(offs) if !token.is_empty() => line.span.sub(offs, token.len()),
        _ => line.span,
    }
}

// Assembler errors

pub fn asm_parse(err: hack::ParseError, line: &Line, src: &Source) -> Report {
    use hack::ParseError::*;
    match err {
        Malformed => miette!(
            severity = Severity::Error,
            code = "asm::syntax",
            help = "lines must be `@value`, `dest=comp;jump` or `(LABEL)`",
            labels = vec![LabeledSpan::at(line.span, "unrecognised line")],
            "Line {}: `{}` is not a valid instruction",
            line.number,
            line.text,
        )
        .with_source_code(src.named()),
        BadSymbol(name) => miette!(
            severity = Severity::Error,
            code = "asm::syntax",
            help = "symbols use letters, digits, `_`, `.`, `$` or `:` and may not start with a digit",
            labels = vec![LabeledSpan::at(token_span(line, &name), "invalid symbol")],
            "Line {}: `{}` is not a valid symbol",
            line.number,
            line.text,
        )
        .with_source_code(src.named()),
        UnknownMnemonic { field, token } => {
            let help = match field {
                Field::Dest => "valid destinations are M, D, MD, A, AM, AD and AMD",
                Field::Comp => "check the list of available computations in the documentation",
                Field::Jump => "valid jumps are JGT, JEQ, JGE, JLT, JNE, JLE and JMP",
            };
            miette!(
                severity = Severity::Error,
                code = "asm::unknown_mnemonic",
                help = help,
                labels = vec![LabeledSpan::at(token_span(line, &token), format!("unknown {field}"))],
                "Line {}: `{}` has an unknown {} mnemonic `{}`",
                line.number,
                line.text,
                field,
                token,
            )
            .with_source_code(src.named())
        }
        LiteralRange(lit) => asm_address_range(line, src, &lit),
    }
}

pub fn asm_address_range(line: &Line, src: &Source, value: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::address_range",
        help = "A-instructions load values from 0 to 32,767",
        labels = vec![LabeledSpan::at(line.span, "out of range")],
        "Line {}: `{}` resolves to {}, which does not fit in 15 bits",
        line.number,
        line.text,
        value,
    )
    .with_source_code(src.named())
}

pub fn asm_duplicate_label(line: &Line, src: &Source, name: &str, prev: Entry) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels may only be declared once and cannot shadow predefined symbols",
        labels = vec![LabeledSpan::at(line.span, "duplicate label")],
        "Line {}: `{}` redeclares `{}`, already bound as a {} to {}",
        line.number,
        line.text,
        name,
        prev.binding,
        prev.addr,
    )
    .with_source_code(src.named())
}

// VM translator errors

pub fn vm_parse(err: vm::ParseError, line: &Line, src: &Source) -> Report {
    use vm::ParseError::*;
    let (code, help, label) = match &err {
        UnknownCommand(_) | Arity { .. } | BadName(_) | BadNumber(_) => (
            "vm::syntax",
            "check the command and its operands",
            "invalid command",
        ),
        NegativeNumber(_) => (
            "vm::syntax",
            "offsets and counts must be non-negative",
            "negative value",
        ),
        UnknownSegment(_) => (
            "vm::unknown_segment",
            "segments are constant, local, argument, this, that, pointer, temp and static",
            "unknown segment",
        ),
        PopConstant => (
            "vm::syntax",
            "the constant segment can only be pushed",
            "cannot pop",
        ),
        NumberRange(_) => (
            "vm::number_range",
            "offsets, constants and counts range from 0 to 32,767",
            "out of range",
        ),
        ArgsRange(_) => (
            "vm::number_range",
            "a call passes at most 32,762 arguments",
            "out of range",
        ),
        SegmentRange { .. } => (
            "vm::segment_range",
            "pointer takes offsets 0-1 and temp takes offsets 0-7",
            "out of range",
        ),
    };
    let span = match &err {
        UnknownCommand(tok)
        | BadName(tok)
        | BadNumber(tok)
        | NegativeNumber(tok)
        | NumberRange(tok)
        | ArgsRange(tok)
        | UnknownSegment(tok) => token_span(line, tok),
        _ => line.span,
    };
    miette!(
        severity = Severity::Error,
        code = code,
        help = help,
        labels = vec![LabeledSpan::at(span, label)],
        "Line {}: `{}`: {}",
        line.number,
        line.text,
        err,
    )
    .with_source_code(src.named())
}

pub fn vm_duplicate_function(line: &Line, src: &Source, name: &str, prev: &vm::Site) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::duplicate_function",
        help = format!("`{name}` is first declared at {prev}"),
        labels = vec![LabeledSpan::at(line.span, "duplicate function")],
        "Line {}: `{}` redeclares function `{}`",
        line.number,
        line.text,
        name,
    )
    .with_source_code(src.named())
}

pub fn vm_duplicate_label(line: &Line, src: &Source, name: &str, prev: &vm::Site) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::duplicate_label",
        help = format!("`{name}` is first declared at {prev}"),
        labels = vec![LabeledSpan::at(line.span, "duplicate label")],
        "Line {}: `{}` redeclares label `{}`",
        line.number,
        line.text,
        name,
    )
    .with_source_code(src.named())
}

/// A label or static cell the translation produces is already taken by another one.
pub fn vm_name_clash(line: &Line, src: &Source, name: &str, prev: &vm::Site) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::duplicate_label",
        help = format!("`{name}` is already produced by `{}` at {prev}", prev.text),
        labels = vec![LabeledSpan::at(line.span, "name already in use")],
        "Line {}: `{}` produces `{}`, which is already in use",
        line.number,
        line.text,
        name,
    )
    .with_source_code(src.named())
}

pub fn vm_reserved_name(line: &Line, src: &Source, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::reserved_name",
        help = "SP, LCL, ARG, THIS, THAT, R0-R15, SCREEN and KBD cannot name functions",
        labels = vec![LabeledSpan::at(token_span(line, name), "predefined symbol")],
        "Line {}: `{}` names a function after predefined symbol `{}`",
        line.number,
        line.text,
        name,
    )
    .with_source_code(src.named())
}

/// Call site with no matching `function` anywhere in the translation.
pub fn vm_unresolved_function(name: &str, site: &vm::Site) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::unresolved_function",
        help = "make sure the file declaring the function is part of the translation",
        "{site}: `{}` calls undeclared function `{name}`",
        site.text,
    )
}

/// Jump whose label is never declared in the enclosing function.
pub fn vm_unresolved_label(name: &str, site: &vm::Site) -> Report {
    miette!(
        severity = Severity::Error,
        code = "vm::unresolved_label",
        help = "labels are only visible inside the function that declares them",
        "{site}: `{}` jumps to undeclared label `{name}`",
        site.text,
    )
}

// Machine code errors

pub fn hack_bad_word(line: &Line, src: &Source) -> Report {
    miette!(
        severity = Severity::Error,
        code = "hack::syntax",
        help = "each line of a `.hack` file holds exactly 16 binary digits",
        labels = vec![LabeledSpan::at(line.span, "not a machine word")],
        "Line {}: `{}` is not a 16-bit binary word",
        line.number,
        line.text,
    )
    .with_source_code(src.named())
}
