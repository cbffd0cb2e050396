use caption_text::{split_sentences, LineNormalizer};
use std::env;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::process;

fn main() {
    if let Err(err) = run() {
        eprintln!("{}: {err}", env!("CARGO_PKG_NAME"));
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let mut args = env::args();
    let program = args
        .next()
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

    let mut mode = Mode::Tokens;
    let mut input = None;
    for arg in args {
        match arg.as_str() {
            flag if is_help_flag(flag) => {
                print_help(&program);
                return Ok(());
            }
            flag if is_version_flag(flag) => {
                println!("{}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "-s" | "--sentences" => mode = Mode::Sentences,
            "-" if input.is_none() => input = Some(Input::Stdin),
            path if input.is_none() && !path.starts_with('-') => {
                input = Some(Input::File(path.to_string()))
            }
            extra => {
                return Err(format!("unexpected argument: {extra}\n{}", usage(&program)));
            }
        }
    }

    let reader: Box<dyn BufRead> = match input.unwrap_or(Input::Stdin) {
        Input::Stdin => Box::new(BufReader::new(io::stdin())),
        Input::File(path) => Box::new(BufReader::new(
            File::open(&path).map_err(|err| format!("failed to read '{path}': {err}"))?,
        )),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        Mode::Tokens => write_tokens(reader, &mut out),
        Mode::Sentences => write_sentences(reader, &mut out),
    }
}

enum Mode {
    Tokens,
    Sentences,
}

enum Input {
    Stdin,
    File(String),
}

fn write_tokens(reader: Box<dyn BufRead>, out: &mut impl Write) -> Result<(), String> {
    for line in LineNormalizer::new(reader) {
        let line = line.map_err(|err| err.to_string())?;
        let json = serde_json::to_string(&line)
            .map_err(|err| format!("failed to serialize JSON: {err}"))?;
        writeln!(out, "{json}").map_err(|err| format!("failed to write output: {err}"))?;
    }
    Ok(())
}

fn write_sentences(mut reader: Box<dyn BufRead>, out: &mut impl Write) -> Result<(), String> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|err| format!("failed to read input: {err}"))?;
    let json = serde_json::to_string_pretty(&split_sentences(&text))
        .map_err(|err| format!("failed to serialize JSON: {err}"))?;
    writeln!(out, "{json}").map_err(|err| format!("failed to write output: {err}"))
}

fn is_help_flag(arg: &str) -> bool {
    arg == "-h" || arg == "--help"
}

fn is_version_flag(arg: &str) -> bool {
    arg == "-V" || arg == "--version"
}

fn print_help(program: &str) {
    println!(
        "{}\n\nOptions:\n  -s, --sentences Split the input into sentences instead of tokenizing lines\n  -h, --help      Show this message\n  -V, --version   Print package version",
        usage(program)
    );
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {program} [--sentences] [TEXT_FILE|-]\n\n\
         Normalizes each line of a text file (or stdin when no path or '-' is given) \
         and prints one JSON object per line with its tokens."
    )
}
