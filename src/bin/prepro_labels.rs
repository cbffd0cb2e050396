use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use newscap::dataset::{read_image_records, write_dataset_record};
use newscap::document::read_article_set;
use newscap::tables::{write_article_keys, write_article_table, write_label_table};
use newscap::{
    assemble_labels, vectorize_article_set, BatchReport, EmbeddingLookup, EncodingArgs,
    VectorizeArgs, WordVectors,
};

#[derive(Parser, Debug)]
#[command(
    name = "newscap-prepro-labels",
    about = "Build the vocabulary and encode captions into a label table"
)]
struct LabelsCli {
    /// News dataset written by clean_captions
    #[arg(
        long,
        alias = "input_json",
        env = "NEWSCAP_NEWS_DATASET",
        default_value = "news_dataset.json"
    )]
    input_json: PathBuf,

    /// Output dataset record (vocabulary and image metadata)
    #[arg(long, alias = "output_json", env = "NEWSCAP_DATASET_RECORD")]
    output_json: PathBuf,

    /// Output label table
    #[arg(long, alias = "output_labels", env = "NEWSCAP_LABEL_TABLE")]
    output_labels: PathBuf,

    #[command(flatten)]
    encoding: EncodingArgs,

    /// Article set to vectorize alongside the labels
    #[arg(
        long,
        alias = "input_article_json",
        requires_all = ["vectors", "output_keys_json", "output_articles"]
    )]
    input_article_json: Option<PathBuf>,

    /// Word vectors in word2vec/GloVe text format
    #[arg(long, env = "NEWSCAP_WORD_VECTORS")]
    vectors: Option<PathBuf>,

    /// Output JSON array of article keys, one per article table row
    #[arg(long, alias = "output_keys_json")]
    output_keys_json: Option<PathBuf>,

    /// Output article table
    #[arg(long, alias = "output_articles")]
    output_articles: Option<PathBuf>,

    #[command(flatten)]
    vectorize: VectorizeArgs,

    /// Optional JSONL listing every skipped article and why (article run only)
    #[arg(long, requires = "input_article_json")]
    leftovers: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = LabelsCli::parse();
    let controls = cli.encoding.build_controls();

    let input = File::open(&cli.input_json)
        .with_context(|| format!("failed to open {:?}", cli.input_json))?;
    let images = read_image_records(BufReader::new(input))
        .with_context(|| format!("failed to parse {:?}", cli.input_json))?;
    log::info!("loaded {} images from {:?}", images.len(), cli.input_json);

    let assembly = assemble_labels(&images, &controls).context("failed to assemble labels")?;
    assembly.stats.log_summary();

    let table = File::create(&cli.output_labels)
        .with_context(|| format!("failed to create {:?}", cli.output_labels))?;
    let mut writer = BufWriter::new(table);
    write_label_table(&mut writer, &assembly.table)
        .with_context(|| format!("failed to write {:?}", cli.output_labels))?;
    writer.flush()?;

    let record = File::create(&cli.output_json)
        .with_context(|| format!("failed to create {:?}", cli.output_json))?;
    let mut writer = BufWriter::new(record);
    write_dataset_record(&mut writer, &assembly.record)
        .with_context(|| format!("failed to write {:?}", cli.output_json))?;
    writer.flush()?;
    log::info!("wrote {:?} and {:?}", cli.output_json, cli.output_labels);

    if let Some(article_path) = &cli.input_article_json {
        let (Some(vectors), Some(keys), Some(table)) = (
            cli.vectors.as_deref(),
            cli.output_keys_json.as_deref(),
            cli.output_articles.as_deref(),
        ) else {
            anyhow::bail!("article vectorization needs vectors, keys and table paths");
        };
        let report = write_articles(article_path, vectors, keys, table, &cli.vectorize)?;
        if let Some(path) = &cli.leftovers {
            report
                .write_leftovers(path)
                .with_context(|| format!("failed to write leftovers to {path:?}"))?;
        }
    }
    Ok(())
}

fn write_articles(
    article_path: &Path,
    vectors_path: &Path,
    keys_path: &Path,
    table_path: &Path,
    args: &VectorizeArgs,
) -> Result<BatchReport> {
    let controls = args.build_controls();
    let file =
        File::open(article_path).with_context(|| format!("failed to open {article_path:?}"))?;
    let articles = read_article_set(BufReader::new(file))
        .with_context(|| format!("failed to parse {article_path:?}"))?;

    let file =
        File::open(vectors_path).with_context(|| format!("failed to open {vectors_path:?}"))?;
    let vectors = WordVectors::from_reader(BufReader::new(file), controls.embedding_dim())
        .with_context(|| format!("failed to load word vectors from {vectors_path:?}"))?;

    let mut report = BatchReport::new();
    let matrices = vectorize_article_set(&articles, &vectors, &controls, &mut report)?;
    report.log_summary("article vectors");

    let file =
        File::create(keys_path).with_context(|| format!("failed to create {keys_path:?}"))?;
    let mut writer = BufWriter::new(file);
    write_article_keys(&mut writer, &matrices)
        .with_context(|| format!("failed to write {keys_path:?}"))?;
    writer.flush()?;

    let file =
        File::create(table_path).with_context(|| format!("failed to create {table_path:?}"))?;
    let mut writer = BufWriter::new(file);
    write_article_table(&mut writer, vectors.dim(), &matrices)
        .with_context(|| format!("failed to write {table_path:?}"))?;
    writer.flush()?;
    log::info!("wrote {} article matrices to {table_path:?}", matrices.len());
    Ok(report)
}
