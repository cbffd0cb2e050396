use std::io::Write;
use std::process::{Command, Output, Stdio};

fn run(args: &[&str], stdin: Option<&str>) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_caption_text"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn caption_text");
    let mut pipe = child.stdin.take().expect("stdin open");
    if let Some(text) = stdin {
        pipe.write_all(text.as_bytes()).expect("write stdin");
    }
    drop(pipe);
    child.wait_with_output().expect("collect output")
}

fn stdout_of(output: &Output) -> String {
    assert!(
        output.status.success(),
        "caption_text failed ({}): {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn with_final_newline(text: &str) -> String {
    format!("{}\n", text.trim_end_matches('\n'))
}

#[test]
fn tokenizes_each_line_of_a_file() {
    let output = run(&["tests/fixtures/text/captions.txt"], None);
    assert_eq!(
        stdout_of(&output),
        with_final_newline(include_str!("fixtures/expected/captions.jsonl"))
    );
}

#[test]
fn splits_article_sentences_read_from_stdin() {
    let article = include_str!("fixtures/text/article.txt");
    let output = run(&["--sentences", "-"], Some(article));
    assert_eq!(
        stdout_of(&output),
        with_final_newline(include_str!("fixtures/expected/article_sentences.json"))
    );
}

#[test]
fn unknown_flags_fail_with_usage() {
    let output = run(&["--bogus"], None);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unexpected argument: --bogus"), "{stderr}");
}
