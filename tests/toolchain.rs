use assert_cmd::Command;
use bit16::asm::{assemble, load_image, save_image, ErrorKind};
use bit16::cpu::bus::STACK_TOP;
use bit16::devices::{KeyBuffer, Keyboard, Machine, RunOutcome, Screen};
use bit16::Register;
use predicates::str::contains;

fn machine_for(source: &str) -> Machine {
    let words = assemble(source).unwrap().words();
    Machine::with_program(&words, 0).unwrap()
}

#[test]
fn counts_down_with_labels_and_jumps() {
    let mut machine = machine_for(
        "
            MW A, 0
            MW B, 3
        loop:
            ADD A, 2
            SUB B, 1
            @done
            JMPZ HL
            @loop
            SUB D, D        ; force Zero
            JMPZ HL
        done:
            HALT
        ",
    );

    let summary = machine.run(1000).unwrap();

    assert_eq!(summary.outcome, RunOutcome::Halted);
    assert_eq!(machine.cpu.regs.get(Register::A), 6);
    assert_eq!(machine.cpu.regs.get(Register::B), 0);
}

#[test]
fn push_pop_restores_stack() {
    let mut machine = machine_for("PUSH 42\nPOP C\nHALT");

    machine.run(10).unwrap();

    assert_eq!(machine.cpu.regs.get(Register::C), 42);
    assert_eq!(machine.cpu.regs.sp, STACK_TOP);
}

#[test]
fn writes_text_to_vram() {
    let mut machine = machine_for(
        "
        const H 0x48
        MWH 0x80
        MWL 0x00
        MW A, H
        SW HL, A
        MW A, 0x49
        MWL 0x01
        SW HL, A
        HALT
        ",
    );
    machine.add_device(Box::new(Screen::new(1))).unwrap();

    machine.run(100).unwrap();

    assert_eq!(Screen::text(&machine.bus), "HI");
}

#[test]
fn echoes_keyboard_to_screen() {
    let mut machine = machine_for(
        "
        MWH 0xFD
        MWL 0xFE
        LW A, HL        ; keyboard port
        MWH 0x80
        MWL 0x00
        SW HL, A
        HALT
        ",
    );
    machine.add_device(Box::new(Keyboard::new(KeyBuffer::from_bytes(b"Z")))).unwrap();
    machine.add_device(Box::new(Screen::new(1))).unwrap();

    machine.run(100).unwrap();

    assert_eq!(Screen::text(&machine.bus), "Z");
}

#[test]
fn runaway_program_hits_cycle_cap() {
    let mut machine = machine_for("top:\n@top\nSUB A, A\nJMPZ HL");

    let summary = machine.run(500).unwrap();

    assert_eq!(summary.outcome, RunOutcome::CycleLimit);
    assert_eq!(summary.cycles, 500);
    assert!(machine.cpu.is_running());
}

#[test]
fn image_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.bin");
    let words = assemble("MW A, 5\nHALT").unwrap().image(Some(1)).unwrap();

    save_image(&path, &words).unwrap();
    assert_eq!(std::fs::read(&path).unwrap()[..4], [0x05u8, 0x28, 0x00, 0x10]);

    let loaded = load_image(&path).unwrap();
    assert_eq!(loaded.len(), 512);

    let mut machine = Machine::with_program(&loaded, 0).unwrap();
    machine.run(10).unwrap();
    assert_eq!(machine.cpu.regs.get(Register::A), 5);
    assert_eq!(machine.cpu.regs.pc, 1);
}

#[test]
fn load_address_sets_entry_point() {
    let words = assemble("MW A, 1\nMW A, 2\nHALT").unwrap().words();
    let mut machine = Machine::with_program(&words, 1).unwrap();

    machine.run(10).unwrap();

    assert_eq!(machine.cpu.regs.get(Register::A), 2);
}

#[test]
fn assembly_errors_carry_location() {
    let err = assemble("NOP\nMW A, @x").unwrap_err();
    assert_eq!(err.line, 2);
    assert!(matches!(err.kind, ErrorKind::UnknownConstant(_)));
}

// ====== Command line ======

fn bit16() -> Command {
    Command::cargo_bin("bit16").unwrap()
}

#[test]
fn prints_help() {
    bit16().arg("--help").assert().success().stdout(contains("asm"));
    bit16().args(["asm", "--help"]).assert().success();
}

#[test]
fn assembles_runs_and_disassembles() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("prog.asm");
    std::fs::write(&source, "MW A, 5 ; five\nHALT\n").unwrap();

    bit16()
        .args(["asm", "--clean", "--symbols", "-i"])
        .arg(&source)
        .assert()
        .success();

    let bin = dir.path().join("prog.bin");
    assert_eq!(std::fs::read(&bin).unwrap(), vec![0x05u8, 0x28, 0x00, 0x10]);
    assert_eq!(
        std::fs::read_to_string(dir.path().join("prog_clean.txt")).unwrap(),
        "MW A, 5\nHALT\n"
    );
    assert!(dir.path().join("prog.sym.json").exists());

    bit16()
        .args(["run", "-i"])
        .arg(&bin)
        .assert()
        .success()
        .stdout(contains("Halted"))
        .stdout(contains("A: 0005"));

    bit16()
        .arg("disasm")
        .arg(&bin)
        .assert()
        .success()
        .stdout(contains("0000: 2805  MW A, 5"));
}

#[test]
fn reports_assembly_errors() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("good.asm");
    let bad = dir.path().join("bad.asm");
    std::fs::write(&good, "HALT\n").unwrap();
    std::fs::write(&bad, "NOP\nJUMP 4\n").unwrap();

    bit16()
        .args(["asm", "-i"])
        .arg(&bad)
        .arg("-i")
        .arg(&good)
        .assert()
        .failure()
        .stderr(contains("bad.asm:2: unknown instruction `JUMP`"));

    // the sibling file still assembled
    assert!(dir.path().join("good.bin").exists());
    assert!(!dir.path().join("bad.bin").exists());
}

#[test]
fn image_size_limited_to_rom() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("big.asm");
    std::fs::write(&source, "HALT\n").unwrap();

    bit16()
        .args(["asm", "-s", "65", "-i"])
        .arg(&source)
        .assert()
        .failure()
        .stderr(contains("program needs 33280 words but ROM holds 32768"));
    assert!(!dir.path().join("big.bin").exists());

    bit16().args(["asm", "-s", "64", "-i"]).arg(&source).assert().success();
    let bin = dir.path().join("big.bin");
    assert_eq!(std::fs::metadata(&bin).unwrap().len(), 65536);
    bit16().args(["run", "-i"]).arg(&bin).assert().success();
}

#[test]
fn rejects_bad_run_arguments() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("prog.bin");
    let text = dir.path().join("prog.txt");
    save_image(&image, &[0x1000]).unwrap();
    std::fs::write(&text, b"\x00\x10").unwrap();

    bit16().args(["run", "-i"]).arg(&text).assert().failure();
    bit16()
        .args(["run", "-l", "0x8000", "-i"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(contains("past the end of ROM"));
    bit16().arg("run").assert().failure();
}

#[test]
fn invalid_instruction_dumps_registers() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("bad.bin");
    save_image(&image, &[0x1001]).unwrap();

    bit16()
        .args(["run", "-i"])
        .arg(&image)
        .assert()
        .failure()
        .stderr(contains("invalid instruction 0x1001"))
        .stderr(contains("SP: fdfd"));
}

#[test]
fn register_dump_printed_once() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("bad.bin");
    save_image(&image, &[0x1001]).unwrap();

    let output = bit16().args(["run", "-i"]).arg(&image).output().unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("SP: fdfd").count(), 1);
}
