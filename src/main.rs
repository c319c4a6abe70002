use std::cell::Cell;
use std::env;
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Instant;

use cinder::bytecode::disasm;
use cinder::{Assembler, Engine, ExitStatus, NativeRegistry, Opcode, VmImage};

/// Demo driver: hand-writes a countdown program with the assembler,
/// registers the host's native routines, runs it, and reports timing plus
/// the final machine state.
fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    let show_disasm = args.contains(&"--disasm".to_string());
    let quiet = args.contains(&"--quiet".to_string());

    // first non-flag argument is the loop count
    let count = match args.iter().skip(1).find(|a| !a.starts_with('-')) {
        Some(text) => text.clone(),
        None => "1_000_000".to_string(),
    };

    let mut natives = NativeRegistry::new();
    let print = natives.register("print", |image: &mut VmImage| {
        println!("{}", image.peek().map_err(|e| e.to_string())?);
        Ok(())
    });
    natives.register("input", |image: &mut VmImage| {
        let line = io::stdin()
            .lock()
            .lines()
            .next()
            .transpose()
            .map_err(|e| format!("read error: {}", e))?
            .unwrap_or_default();
        let value = line
            .trim()
            .parse()
            .map_err(|e| format!("cannot parse '{}' as a number: {}", line.trim(), e))?;
        image.push(value).map_err(|e| e.to_string())
    });

    let mut image = match build_countdown(&count, print) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if show_disasm {
        print!("{}", disasm::disassemble(&image));
        println!();
    }

    let mut engine = Engine::new(natives);

    let started: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));
    let start_clock = started.clone();
    engine.on_start = Some(Box::new(move || {
        start_clock.set(Some(Instant::now()));
    }));
    engine.on_exit = Some(Box::new(move |image: &VmImage, status: &ExitStatus| {
        if let Some(t0) = started.get() {
            println!("program completed in {} ms", t0.elapsed().as_millis());
        }
        match status {
            ExitStatus::Completed => println!("program executed without errors"),
            ExitStatus::Faulted(fault) => eprintln!("program executed with error [{}]", fault),
        }
        if !quiet {
            print!("{}", image.dump_state());
        }
    }));

    match engine.run(&mut image) {
        ExitStatus::Completed => ExitCode::SUCCESS,
        ExitStatus::Faulted(_) => ExitCode::FAILURE,
    }
}

/// i = count; print i; loop { i = i - 1 } while i != 0
fn build_countdown(count: &str, print: usize) -> Result<VmImage, cinder::AssembleError> {
    let mut asm = Assembler::new();
    asm.declare_variable("i")?;

    asm.emit_op(Opcode::LoadConst);
    asm.emit_number(count)?;
    asm.set_variable("i")?;

    // Print the starting value; the routine peeks, so SetVariable takes the
    // word back off the stack afterwards.
    asm.load_variable("i")?;
    asm.call_native(print);
    asm.set_variable("i")?;

    asm.set_label("loop")?;
    asm.load_variable("i")?;
    asm.emit_op(Opcode::LoadConst);
    asm.emit_number("1")?;
    asm.emit_op(Opcode::Sub);
    asm.set_variable("i")?;

    asm.load_variable("i")?;
    asm.jump_if_not_zero("loop");

    asm.finalize()
}
