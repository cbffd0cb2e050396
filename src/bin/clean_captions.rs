use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use newscap::{
    clean_captions, parse_documents, ImageRecord, LexiconTagger, NormalizationConfig, Normalizer,
    Split, SplitAssigner, DEFAULT_IMAGE_DIR, DEFAULT_SPLIT_SEED,
};

#[derive(Parser, Debug)]
#[command(
    name = "newscap-clean-captions",
    about = "Normalize image captions and assign train/val/test splits"
)]
struct CleanCli {
    /// Raw captioning dataset JSON keyed by document id
    #[arg(
        long,
        env = "NEWSCAP_CAPTIONING_DATASET",
        default_value = "captioning_dataset.json"
    )]
    input: PathBuf,

    /// Directory receiving news_dataset.json, val.json and test.json
    #[arg(long, env = "NEWSCAP_DATA_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Optional entity gazetteer with one LABEL<TAB>phrase per line
    #[arg(long, env = "NEWSCAP_ENTITY_LEXICON")]
    entities: Option<PathBuf>,

    /// Directory recorded as the filepath of every image
    #[arg(long, default_value = DEFAULT_IMAGE_DIR)]
    image_dir: String,

    /// Seed for the split generator
    #[arg(long, env = "NEWSCAP_SEED", default_value_t = DEFAULT_SPLIT_SEED)]
    seed: u64,

    /// Keep the original letter case of caption tokens
    #[arg(long, default_value_t = false)]
    keep_case: bool,

    /// Optional JSONL listing every skipped caption and why
    #[arg(long, env = "NEWSCAP_LEFTOVERS")]
    leftovers: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = CleanCli::parse();

    let normalizer = build_normalizer(cli.entities.as_deref(), cli.keep_case)?;
    let input =
        File::open(&cli.input).with_context(|| format!("failed to open {:?}", cli.input))?;
    let documents = parse_documents(BufReader::new(input))
        .with_context(|| format!("failed to parse {:?}", cli.input))?;
    log::info!("loaded {} documents from {:?}", documents.len(), cli.input);

    let mut splits = SplitAssigner::new(cli.seed);
    let output = clean_captions(documents, &normalizer, &mut splits, &cli.image_dir);
    output.report.log_summary("clean captions");
    anyhow::ensure!(
        !output.images.is_empty(),
        "no caption survived normalization; check {:?}",
        cli.input
    );

    let all: Vec<&ImageRecord> = output.images.iter().collect();
    write_images(&cli.output_dir.join("news_dataset.json"), &all)?;
    let val = output.subset(Split::Val);
    write_images(&cli.output_dir.join("val.json"), &val)?;
    let test = output.subset(Split::Test);
    write_images(&cli.output_dir.join("test.json"), &test)?;
    log::info!(
        "wrote {} images ({} val, {} test) to {:?}",
        all.len(),
        val.len(),
        test.len(),
        cli.output_dir
    );

    if let Some(path) = &cli.leftovers {
        output
            .report
            .write_leftovers(path)
            .with_context(|| format!("failed to write leftovers to {path:?}"))?;
    }
    Ok(())
}

fn build_normalizer(entities: Option<&Path>, keep_case: bool) -> Result<Normalizer> {
    let config = NormalizationConfig {
        lowercase: !keep_case,
        ..NormalizationConfig::default()
    };
    let normalizer = Normalizer::new(config);
    match entities {
        Some(path) => {
            let lexicon = LexiconTagger::open(path)
                .with_context(|| format!("failed to load entity lexicon {path:?}"))?;
            Ok(normalizer.with_tagger(Arc::new(lexicon)))
        }
        None => Ok(normalizer),
    }
}

fn write_images(path: &Path, images: &[&ImageRecord]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, images)
        .with_context(|| format!("failed to write {path:?}"))?;
    writer.flush()?;
    Ok(())
}
