//! Fallen command-line interface.
//!
//! Subcommands: `parse <file>` (AST dump), `build <file>` (constant pool and
//! instruction listing), `run <file>`, and `repl`. The optional `--debug`
//! flag adds the host-side debug dump after the Fallen-formatted error.

use std::{
    env, fs,
    io::{self, Write as _},
    process::ExitCode,
};

use fallen::{Error, ReplSession, StdConsole, compile_source, parse_source, run_file};

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let debug = args.iter().any(|arg| arg == "--debug");
    args.retain(|arg| arg != "--debug");

    match args.as_slice() {
        [cmd, file] if cmd == "parse" => cmd_parse(file, debug),
        [cmd, file] if cmd == "build" => cmd_build(file, debug),
        [cmd, file] if cmd == "run" => cmd_run(file, debug),
        [cmd] if cmd == "repl" => cmd_repl(debug),
        _ => usage(),
    }
}

fn usage() -> ExitCode {
    eprintln!("usage: fallen [--debug] <parse|build|run> <file>");
    eprintln!("       fallen [--debug] repl");
    ExitCode::FAILURE
}

fn report(err: &Error, debug: bool) -> ExitCode {
    eprintln!("{err}");
    if debug {
        eprintln!("{err:#?}");
    }
    ExitCode::FAILURE
}

fn read_source(path: &str) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|err| {
        eprintln!("Cannot read file \"{path}\": {err}");
        ExitCode::FAILURE
    })
}

fn cmd_parse(path: &str, debug: bool) -> ExitCode {
    let source = match read_source(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    match parse_source(&source, path) {
        Ok(program) => {
            println!("{program:#?}");
            ExitCode::SUCCESS
        }
        Err(err) => report(&err, debug),
    }
}

fn cmd_build(path: &str, debug: bool) -> ExitCode {
    let source = match read_source(path) {
        Ok(source) => source,
        Err(code) => return code,
    };
    match compile_source(&source, path) {
        Ok(unit) => {
            print!("{}", unit.disassemble());
            ExitCode::SUCCESS
        }
        Err(err) => report(&err, debug),
    }
}

fn cmd_run(path: &str, debug: bool) -> ExitCode {
    match run_file(path, &mut StdConsole) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => report(&err, debug),
    }
}

fn cmd_repl(debug: bool) -> ExitCode {
    let mut session = ReplSession::from_current_dir();
    let mut source = String::new();

    loop {
        let prompt = if source.is_empty() { ">>> " } else { "... " };
        let Some(line) = read_line(prompt) else {
            println!();
            break;
        };

        if source.is_empty() && line.trim().is_empty() {
            continue;
        }

        if !source.is_empty() {
            source.push('\n');
        }
        source.push_str(&line);

        if needs_more_input(&source) {
            continue;
        }

        if let Err(err) = session.execute(&source, &mut StdConsole) {
            eprintln!("{err}");
            if debug {
                eprintln!("{err:#?}");
            }
        }
        source.clear();
    }

    ExitCode::SUCCESS
}

/// Heuristic multiline detector: keep reading while brackets are unbalanced.
fn needs_more_input(source: &str) -> bool {
    let mut balance = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for ch in source.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '(' | '[' | '{' => balance += 1,
            ')' | ']' | '}' => balance -= 1,
            _ => {}
        }
    }
    balance > 0 || in_string
}

/// Reads one line from stdin after printing a prompt.
///
/// Returns `None` on EOF (Ctrl+D).
fn read_line(prompt: &str) -> Option<String> {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return None;
    }
    let mut input = String::new();
    let read = io::stdin().read_line(&mut input).ok()?;
    if read == 0 {
        return None;
    }
    Some(input.trim_end_matches(['\r', '\n']).to_owned())
}
