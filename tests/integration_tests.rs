use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::TempDir;

fn hackchain() -> Command {
    Command::cargo_bin("hackchain").unwrap()
}

/// Copy a fixture (file or directory) into a fresh scratch directory.
fn scratch(fixture: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let from = Path::new("tests/files").join(fixture);
    let to = dir.path().join(fixture);
    if from.is_dir() {
        fs::create_dir(&to).unwrap();
        for entry in fs::read_dir(&from).unwrap() {
            let entry = entry.unwrap();
            fs::copy(entry.path(), to.join(entry.file_name())).unwrap();
        }
    } else {
        fs::copy(&from, &to).unwrap();
    }
    (dir, to)
}

#[test]
fn runs_without_arguments() {
    hackchain().assert().success().stdout(contains("hackchain"));
}

#[test]
fn assembles_add() {
    let (_dir, asm) = scratch("Add.asm");
    hackchain()
        .arg("assemble")
        .arg(&asm)
        .assert()
        .success()
        .stdout(contains("6 instructions"))
        .stdout(contains("Saved"));

    let hack = fs::read_to_string(asm.with_extension("hack")).unwrap();
    assert_eq!(hack, include_str!("files/Add.hack").trim_end());
}

#[test]
fn assembles_to_destination() {
    let (dir, asm) = scratch("Max.asm");
    let dest = dir.path().join("out.hack");
    hackchain().arg("assemble").arg(&asm).arg(&dest).assert().success();

    let hack = fs::read_to_string(&dest).unwrap();
    assert_eq!(hack.lines().count(), 16);
    assert!(hack.lines().all(|line| line.len() == 16));
    assert!(!asm.with_extension("hack").exists());
}

#[test]
fn prints_symbol_table() {
    let (_dir, asm) = scratch("Max.asm");
    hackchain()
        .arg("assemble")
        .arg(&asm)
        .arg("--symbols")
        .assert()
        .success()
        .stdout(contains("OUTPUT_FIRST = 10"))
        .stdout(contains("OUTPUT_D = 12"))
        .stdout(contains("INFINITE_LOOP = 14"))
        .stdout(contains("SCREEN = 16384"));
}

#[test]
fn translates_single_file() {
    let (_dir, vm) = scratch("SimpleAdd.vm");
    hackchain().arg("translate").arg(&vm).assert().success();

    let asm = fs::read_to_string(vm.with_extension("asm")).unwrap();
    assert!(asm.contains("@7"));
    assert!(asm.contains("@8"));
    assert!(!asm.contains("Sys.init"));
}

#[test]
fn translates_directory_with_bootstrap() {
    let (_dir, program) = scratch("FibonacciElement");
    hackchain().arg("translate").arg(&program).assert().success();

    let asm = fs::read_to_string(program.join("FibonacciElement.asm")).unwrap();
    assert!(asm.starts_with("@256\n"));
    assert!(asm.contains("@Sys.init"));
    assert!(asm.contains("(Main.fibonacci)"));
    assert!(asm.contains("(Main.fibonacci$N_LT_2)"));
    assert!(asm.contains("(Sys.init$WHILE)"));
}

#[test]
fn translates_directory_without_bootstrap() {
    let (_dir, program) = scratch("FibonacciElement");
    hackchain()
        .arg("translate")
        .arg(&program)
        .arg("--no-bootstrap")
        .assert()
        .success();

    let asm = fs::read_to_string(program.join("FibonacciElement.asm")).unwrap();
    assert!(asm.starts_with("(Main.fibonacci)\n"));
}

#[test]
fn annotates_from_environment() {
    let (_dir, vm) = scratch("SimpleAdd.vm");
    hackchain()
        .env("HACKCHAIN_ANNOTATE", "1")
        .arg("translate")
        .arg(&vm)
        .assert()
        .success();

    let asm = fs::read_to_string(vm.with_extension("asm")).unwrap();
    assert!(asm.contains("// push constant 7"));
    assert!(asm.contains("// add"));
}

#[test]
fn builds_bare_path() {
    let (_dir, vm) = scratch("SimpleAdd.vm");
    hackchain().arg(&vm).assert().success().stdout(contains("Saved"));

    let hack = fs::read_to_string(vm.with_extension("hack")).unwrap();
    assert!(hack.lines().all(|line| line.len() == 16));
    assert!(!vm.with_extension("asm").exists());
}

#[test]
fn builds_directory() {
    let (_dir, program) = scratch("FibonacciElement");
    hackchain().arg("build").arg(&program).assert().success();
    assert!(program.join("FibonacciElement.hack").exists());
}

#[test]
fn checks_valid_files() {
    hackchain()
        .arg("check")
        .arg("tests/files/Max.asm")
        .assert()
        .success()
        .stdout(contains("no errors found!"));

    hackchain()
        .arg("check")
        .arg("tests/files/FibonacciElement")
        .assert()
        .success();

    hackchain()
        .arg("check")
        .arg("tests/files/Add.hack")
        .assert()
        .success();
}

#[test]
fn reports_assembly_errors() {
    hackchain()
        .arg("check")
        .arg("tests/files/Bad.asm")
        .assert()
        .failure()
        .stderr(contains("Line 3"))
        .stderr(contains("D=X"));
    assert!(!Path::new("tests/files/Bad.hack").exists());
}

#[test]
fn reports_vm_errors_without_output() {
    let (_dir, vm) = scratch("Bad.vm");
    hackchain()
        .arg("translate")
        .arg(&vm)
        .assert()
        .failure()
        .stderr(contains("Line 2"))
        .stderr(contains("push nowhere 1"));
    assert!(!vm.with_extension("asm").exists());
}

#[test]
fn rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "@1").unwrap();
    hackchain().arg("check").arg(&path).assert().failure();
}

#[test]
fn fails_on_missing_file() {
    hackchain()
        .arg("assemble")
        .arg("tests/files/Missing.asm")
        .assert()
        .failure();
}

#[test]
fn runs_simple_add() {
    hackchain()
        .arg("run")
        .arg("tests/files/SimpleAdd.vm")
        .arg("--ram")
        .arg("0..1")
        .assert()
        .success()
        .stdout(contains("reached end of program"))
        .stdout(contains("RAM[0] = 257"));

    hackchain()
        .arg("run")
        .arg("tests/files/SimpleAdd.vm")
        .arg("--ram")
        .arg("256..257")
        .assert()
        .success()
        .stdout(contains("RAM[256] = 15"));
}

#[test]
fn runs_fibonacci() {
    hackchain()
        .arg("run")
        .arg("tests/files/FibonacciElement")
        .arg("--ram")
        .arg("0..262")
        .assert()
        .success()
        .stdout(contains("halted"))
        .stdout(contains("RAM[0] = 262"))
        .stdout(contains("RAM[261] = 3"));
}

#[test]
fn runs_machine_code() {
    hackchain()
        .arg("run")
        .arg("tests/files/Add.hack")
        .arg("--ram")
        .arg("0..1")
        .assert()
        .success()
        .stdout(contains("RAM[0] = 5"));
}

#[test]
fn stops_at_cycle_budget() {
    hackchain()
        .arg("run")
        .arg("tests/files/Max.asm")
        .arg("--cycles")
        .arg("5")
        .assert()
        .success()
        .stdout(contains("cycle budget exhausted after 5 cycles"));

    hackchain()
        .env("HACKCHAIN_CYCLES", "3")
        .arg("run")
        .arg("tests/files/Max.asm")
        .assert()
        .success()
        .stdout(contains("after 3 cycles"));

    hackchain()
        .arg("run")
        .arg("tests/files/Max.asm")
        .assert()
        .success()
        .stdout(contains("halted"));
}

#[test]
fn rejects_bad_ram_range() {
    hackchain()
        .arg("run")
        .arg("tests/files/Max.asm")
        .arg("--ram")
        .arg("10..2")
        .assert()
        .failure();
}
