//! Normalize caption and article text into canonical token sequences.
//!
//! The pipeline is: trim, transliterate to ASCII, strip markup and bracketed
//! annotations, tokenize into words, then fold every token to plain ASCII word
//! characters (dropping tokens that were pure punctuation).

use ego_tree::NodeRef;
use regex::Regex;
use scraper::{node::Node, Html};
use std::sync::OnceLock;
use unicode_normalization::char::decompose_compatible;

mod stream;

pub use stream::{LineNormalizer, NormalizedLine, StreamError};

const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

const ABBREVIATIONS: &[&str] = &[
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "st", "mt", "gen", "gov", "sen", "rep", "rev",
    "lt", "col", "sgt", "capt", "cmdr", "inc", "co", "corp", "ltd", "vs", "etc", "no", "jan",
    "feb", "mar", "apr", "aug", "sept", "sep", "oct", "nov", "dec", "ave", "blvd", "ft",
];

/// Normalizes one caption or sentence into tokens.
///
/// # Example
///
/// ```
/// use caption_text::normalize_sentence;
///
/// let tokens = normalize_sentence("  <b>Café</b> owners [Reuters] don't close. ");
/// assert_eq!(tokens, vec!["Cafe", "owners", "do", "nt", "close"]);
/// ```
pub fn normalize_sentence(raw: &str) -> Vec<String> {
    let ascii = transliterate(raw.trim());
    let denoised = strip_markup(&ascii);
    tokenize_words(&denoised)
        .iter()
        .filter_map(|token| fold_token(token))
        .collect()
}

/// Replaces non-ASCII characters with their closest ASCII spelling.
///
/// Characters without a sensible ASCII form are dropped.
pub fn transliterate(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else if let Some(replacement) = ascii_replacement(ch) {
            out.push_str(replacement);
        } else {
            decompose_compatible(ch, |part| {
                if part.is_ascii() {
                    out.push(part);
                }
            });
        }
    }
    out
}

/// Removes markup tags and `[...]` annotations, keeping the visible text.
///
/// ```
/// use caption_text::strip_markup;
///
/// assert_eq!(strip_markup("<i>Hello</i> [1]world"), "Hello world");
/// ```
pub fn strip_markup(input: &str) -> String {
    let text = if input.contains('<') || input.contains('&') {
        let fragment = Html::parse_fragment(input);
        let mut buf = String::with_capacity(input.len());
        collect_text(&fragment.root_element(), &mut buf);
        buf
    } else {
        input.to_string()
    };
    bracket_pattern().replace_all(&text, "").into_owned()
}

/// Splits text into word tokens, separating punctuation and contractions.
pub fn tokenize_words(text: &str) -> Vec<String> {
    let rules = treebank_rules();
    let mut buf = apply_all(&rules.starting, text.to_string());
    buf = apply_all(&rules.punctuation, buf);
    buf = format!(" {buf} ");
    buf = apply_all(&rules.ending, buf);
    buf = apply_all(&rules.contractions, buf);
    buf.split_whitespace().map(str::to_string).collect()
}

/// Folds a token to ASCII word characters, or `None` when nothing is left.
pub fn fold_token(token: &str) -> Option<String> {
    let mut folded = String::with_capacity(token.len());
    for ch in token.chars() {
        decompose_compatible(ch, |part| {
            if part.is_ascii_alphanumeric() || part == '_' {
                folded.push(part);
            }
        });
    }
    (!folded.is_empty()).then_some(folded)
}

/// Splits running article text into sentences.
///
/// Line breaks always end a sentence. Inside a line, a word ending in `.`,
/// `!` or `?` ends a sentence when the next word looks like a sentence start
/// and the word is not a known abbreviation or initial.
///
/// ```
/// use caption_text::split_sentences;
///
/// let text = "Mr. Smith arrived. He left at 5 p.m. on Friday!\nNew line";
/// assert_eq!(
///     split_sentences(text),
///     vec!["Mr. Smith arrived.", "He left at 5 p.m. on Friday!", "New line"]
/// );
/// ```
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    for line in text.lines() {
        let words: Vec<&str> = line.split_whitespace().collect();
        let mut current: Vec<&str> = Vec::new();
        for (idx, word) in words.iter().enumerate() {
            current.push(word);
            let Some(next) = words.get(idx + 1) else {
                continue;
            };
            if ends_sentence(word) && starts_sentence(next) {
                sentences.push(current.join(" "));
                current.clear();
            }
        }
        if !current.is_empty() {
            sentences.push(current.join(" "));
        }
    }
    sentences
}

fn ends_sentence(word: &str) -> bool {
    let core = word.trim_end_matches(|ch: char| "\"')]}\u{2019}\u{201d}".contains(ch));
    let Some(last) = core.chars().last() else {
        return false;
    };
    match last {
        '!' | '?' => true,
        '.' => !is_abbreviation(core.trim_end_matches('.')),
        _ => false,
    }
}

fn is_abbreviation(stem: &str) -> bool {
    let stem = stem.trim_start_matches(|ch: char| !ch.is_alphanumeric());
    if stem.chars().count() == 1 && stem.chars().all(char::is_alphabetic) {
        return true;
    }
    if stem.contains('.') {
        return stem.split('.').all(|part| part.chars().count() <= 2);
    }
    ABBREVIATIONS.contains(&stem.to_ascii_lowercase().as_str())
}

fn starts_sentence(word: &str) -> bool {
    word.chars().next().is_some_and(|ch| {
        ch.is_uppercase() || ch.is_ascii_digit() || "\"'([\u{2018}\u{201c}".contains(ch)
    })
}

fn ascii_replacement(ch: char) -> Option<&'static str> {
    let replacement = match ch {
        '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{2032}' => "'",
        '\u{201c}' | '\u{201d}' | '\u{201e}' | '\u{00ab}' | '\u{00bb}' | '\u{2033}' => "\"",
        '\u{2010}' | '\u{2011}' | '\u{2012}' | '\u{2013}' | '\u{2212}' => "-",
        '\u{2014}' | '\u{2015}' => "--",
        '\u{2026}' => "...",
        '\u{00a0}' | '\u{2009}' | '\u{200a}' | '\u{202f}' => " ",
        '\u{00df}' => "ss",
        '\u{00e6}' => "ae",
        '\u{00c6}' => "AE",
        '\u{0153}' => "oe",
        '\u{0152}' => "OE",
        '\u{00f8}' => "o",
        '\u{00d8}' => "O",
        '\u{0142}' => "l",
        '\u{0141}' => "L",
        '\u{0111}' => "d",
        '\u{0110}' => "D",
        '\u{00fe}' => "th",
        '\u{00de}' => "Th",
        '\u{00f0}' => "d",
        '\u{00d0}' => "D",
        '\u{0131}' => "i",
        '\u{00a3}' => "PS",
        '\u{20ac}' => "EUR",
        '\u{00b0}' => " degrees",
        _ => return None,
    };
    Some(replacement)
}

fn collect_text(node: &NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => {
            out.push_str(text);
        }
        Node::Element(element) if SKIPPED_TAGS.contains(&element.name()) => {}
        _ => {
            for child in node.children() {
                collect_text(&child, out);
            }
        }
    }
}

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[^\]]*\]").expect("valid bracket pattern"))
}

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("valid tokenizer pattern"),
            replacement,
        }
    }
}

struct TreebankRules {
    starting: Vec<Rule>,
    punctuation: Vec<Rule>,
    ending: Vec<Rule>,
    contractions: Vec<Rule>,
}

fn apply_all(rules: &[Rule], mut text: String) -> String {
    for rule in rules {
        text = rule
            .pattern
            .replace_all(&text, rule.replacement)
            .into_owned();
    }
    text
}

fn treebank_rules() -> &'static TreebankRules {
    static RULES: OnceLock<TreebankRules> = OnceLock::new();
    RULES.get_or_init(|| TreebankRules {
        starting: vec![
            Rule::new(r#"^""#, "``"),
            Rule::new(r"(``)", " ${1} "),
            Rule::new(r#"([ (\[{<])("|'{2})"#, "${1} `` "),
        ],
        punctuation: vec![
            Rule::new(r"([:,])([^\d])", " ${1} ${2}"),
            Rule::new(r"([:,])$", " ${1} "),
            Rule::new(r"\.\.\.", " ... "),
            Rule::new(r"[;@#$%&]", " ${0} "),
            Rule::new(r#"([^\.])(\.)([\]\)}>"']*)\s*$"#, "${1} ${2}${3} "),
            Rule::new(r"[?!]", " ${0} "),
            Rule::new(r"([^'])' ", "${1} ' "),
            Rule::new(r"[\]\[\(\)\{\}<>]", " ${0} "),
            Rule::new(r"--", " -- "),
        ],
        ending: vec![
            Rule::new(r#"""#, " '' "),
            Rule::new(r"(\S)('')", "${1} ${2} "),
            Rule::new(r"([^' ])('[sS]|'[mM]|'[dD]|') ", "${1} ${2} "),
            Rule::new(r"([^' ])('ll|'LL|'re|'RE|'ve|'VE|n't|N'T) ", "${1} ${2} "),
        ],
        contractions: vec![
            Rule::new(r"(?i)\b(can)(not)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(d)('ye)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(gim)(me)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(gon)(na)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(got)(ta)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(lem)(me)\b", " ${1} ${2} "),
            Rule::new(r"(?i)\b(wan)(na)\b", " ${1} ${2} "),
        ],
    })
}
