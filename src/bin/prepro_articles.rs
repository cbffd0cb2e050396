use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use newscap::components::DEFAULT_ITERATIONS;
use newscap::document::read_article_set;
use newscap::tables::{write_article_keys, write_article_table};
use newscap::{
    vectorize_article_set, ArticleMatrix, BatchReport, CommonComponents, EmbeddingLookup,
    VectorizeArgs, WordVectors, DEFAULT_SPLIT_SEED,
};

#[derive(Parser, Debug)]
#[command(
    name = "newscap-prepro-articles",
    about = "Turn every article into a matrix of pooled sentence vectors"
)]
struct ArticlesCli {
    /// Article set written by article_set
    #[arg(
        long,
        alias = "input_article_json",
        env = "NEWSCAP_ARTICLE_SET",
        default_value = "article.json"
    )]
    input_article_json: PathBuf,

    /// Word vectors in word2vec/GloVe text format
    #[arg(long, env = "NEWSCAP_WORD_VECTORS")]
    vectors: PathBuf,

    /// Output JSON array of article keys, one per article table row
    #[arg(long, alias = "output_keys_json", default_value = "article_keys.json")]
    output_keys_json: PathBuf,

    /// Output article table
    #[arg(long, alias = "output_articles", default_value = "articles.ncav")]
    output_articles: PathBuf,

    #[command(flatten)]
    vectorize: VectorizeArgs,

    /// Remove this many common sentence directions before writing
    #[arg(long, num_args = 0..=1, default_missing_value = "10")]
    remove_components: Option<usize>,

    /// Subspace iterations used to fit the common directions
    #[arg(long, default_value_t = DEFAULT_ITERATIONS)]
    svd_iterations: usize,

    /// Seed for the direction fit
    #[arg(long, env = "NEWSCAP_SEED", default_value_t = DEFAULT_SPLIT_SEED)]
    seed: u64,

    /// Optional JSONL listing every skipped article and why
    #[arg(long, env = "NEWSCAP_LEFTOVERS")]
    leftovers: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = ArticlesCli::parse();
    let controls = cli.vectorize.build_controls();

    let file = File::open(&cli.input_article_json)
        .with_context(|| format!("failed to open {:?}", cli.input_article_json))?;
    let articles = read_article_set(BufReader::new(file))
        .with_context(|| format!("failed to parse {:?}", cli.input_article_json))?;
    log::info!("loaded {} articles from {:?}", articles.len(), cli.input_article_json);

    let file =
        File::open(&cli.vectors).with_context(|| format!("failed to open {:?}", cli.vectors))?;
    let vectors = WordVectors::from_reader(BufReader::new(file), controls.embedding_dim())
        .with_context(|| format!("failed to load word vectors from {:?}", cli.vectors))?;
    log::info!("loaded {} word vectors of dim {}", vectors.len(), vectors.dim());

    let mut report = BatchReport::new();
    let mut matrices = vectorize_article_set(&articles, &vectors, &controls, &mut report)
        .context("failed to set up article vectorization")?;
    report.log_summary("article vectors");

    if let Some(n_components) = cli.remove_components {
        remove_common(&mut matrices, n_components, cli.svd_iterations, cli.seed);
    }

    write_outputs(&cli.output_keys_json, &cli.output_articles, vectors.dim(), &matrices)?;
    if let Some(path) = &cli.leftovers {
        report
            .write_leftovers(path)
            .with_context(|| format!("failed to write leftovers to {path:?}"))?;
    }
    Ok(())
}

fn remove_common(
    matrices: &mut [ArticleMatrix],
    n_components: usize,
    iterations: usize,
    seed: u64,
) {
    if n_components == 0 || matrices.is_empty() {
        return;
    }
    let components = CommonComponents::fit(
        matrices.iter().map(|article| &article.matrix),
        n_components,
        iterations,
        seed,
    );
    if components.len() < n_components {
        log::warn!(
            "only {} of {} common directions fit the sentence space",
            components.len(),
            n_components
        );
    }
    for article in matrices.iter_mut() {
        components.remove(&mut article.matrix);
    }
    log::info!(
        "removed {} common directions from {} articles",
        components.len(),
        matrices.len()
    );
}

fn write_outputs(
    keys_path: &Path,
    table_path: &Path,
    dim: usize,
    matrices: &[ArticleMatrix],
) -> Result<()> {
    let file =
        File::create(keys_path).with_context(|| format!("failed to create {keys_path:?}"))?;
    let mut writer = BufWriter::new(file);
    write_article_keys(&mut writer, matrices)
        .with_context(|| format!("failed to write {keys_path:?}"))?;
    writer.flush()?;

    let file =
        File::create(table_path).with_context(|| format!("failed to create {table_path:?}"))?;
    let mut writer = BufWriter::new(file);
    write_article_table(&mut writer, dim, matrices)
        .with_context(|| format!("failed to write {table_path:?}"))?;
    writer.flush()?;
    log::info!("wrote {} article matrices to {table_path:?}", matrices.len());
    Ok(())
}
