use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use newscap::dataset::read_image_records;
use newscap::document::write_article_set;
use newscap::{
    build_article_set, parse_documents, BatchReport, LexiconTagger, NormalizationConfig,
    Normalizer, SkipRecord, Stage,
};

#[derive(Parser, Debug)]
#[command(
    name = "newscap-article-set",
    about = "Split and normalize the articles of every kept image"
)]
struct ArticleSetCli {
    /// Raw captioning dataset JSON holding the article bodies
    #[arg(
        long,
        env = "NEWSCAP_CAPTIONING_DATASET",
        default_value = "captioning_dataset.json"
    )]
    captioning_dataset: PathBuf,

    /// News dataset written by clean_captions
    #[arg(long, env = "NEWSCAP_NEWS_DATASET", default_value = "news_dataset.json")]
    news_dataset: PathBuf,

    /// Output article set JSON
    #[arg(long, env = "NEWSCAP_ARTICLE_SET", default_value = "article.json")]
    output: PathBuf,

    /// Optional entity gazetteer with one LABEL<TAB>phrase per line
    #[arg(long, env = "NEWSCAP_ENTITY_LEXICON")]
    entities: Option<PathBuf>,

    /// Keep the original letter case of sentence tokens
    #[arg(long, default_value_t = false)]
    keep_case: bool,

    /// Optional JSONL listing every skipped article and why
    #[arg(long, env = "NEWSCAP_LEFTOVERS")]
    leftovers: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = ArticleSetCli::parse();

    let config = NormalizationConfig {
        lowercase: !cli.keep_case,
        ..NormalizationConfig::default()
    };
    let mut normalizer = Normalizer::new(config);
    if let Some(path) = &cli.entities {
        let lexicon = LexiconTagger::open(path)
            .with_context(|| format!("failed to load entity lexicon {path:?}"))?;
        normalizer = normalizer.with_tagger(Arc::new(lexicon));
    }

    let news = File::open(&cli.news_dataset)
        .with_context(|| format!("failed to open {:?}", cli.news_dataset))?;
    let images = read_image_records(BufReader::new(news))
        .with_context(|| format!("failed to parse {:?}", cli.news_dataset))?;

    let raw = File::open(&cli.captioning_dataset)
        .with_context(|| format!("failed to open {:?}", cli.captioning_dataset))?;
    let parsed = parse_documents(BufReader::new(raw))
        .with_context(|| format!("failed to parse {:?}", cli.captioning_dataset))?;

    let mut report = BatchReport::new();
    let mut documents = Vec::with_capacity(parsed.len());
    for document in parsed {
        match document {
            Ok(document) => documents.push(document),
            Err(err) => {
                let id = err.id().unwrap_or("<dataset>").to_string();
                report.skip(SkipRecord::new(id, Stage::Parse, err));
            }
        }
    }

    let articles = build_article_set(&images, &documents, &normalizer, &mut report);
    report.log_summary("article set");

    let file =
        File::create(&cli.output).with_context(|| format!("failed to create {:?}", cli.output))?;
    let mut writer = BufWriter::new(file);
    write_article_set(&mut writer, &articles)
        .with_context(|| format!("failed to write {:?}", cli.output))?;
    writer.flush()?;
    log::info!("wrote {} articles to {:?}", articles.len(), cli.output);

    if let Some(path) = &cli.leftovers {
        report
            .write_leftovers(path)
            .with_context(|| format!("failed to write leftovers to {path:?}"))?;
    }
    Ok(())
}
