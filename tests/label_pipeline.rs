use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::sync::Arc;

use newscap::dataset::{read_image_records, write_dataset_record};
use newscap::document::{read_article_set, write_article_set};
use newscap::tables::{
    read_article_keys, read_article_table, read_label_table, write_article_keys,
    write_article_table, write_label_table,
};
use newscap::{
    assemble_labels, build_article_set, clean_captions, parse_documents, vectorize_article_set,
    BatchReport, CommonComponents, DatasetRecord, EncodingControls, LexiconTagger,
    NormalizationConfig, Normalizer, SplitAssigner, VectorizeControls, Weighting, WordVectors,
    DEFAULT_IMAGE_DIR, DEFAULT_SPLIT_SEED,
};
use pretty_assertions::assert_eq;

const RAW: &str = r#"{
    "a1": {
        "article": "Barack Obama visited Paris. The crowd cheered loudly.",
        "images": {"0": "Barack Obama waves in Paris.", "1": "A crowd gathers."}
    },
    "b2": {
        "article": "The market fell today.",
        "images": {"0": "Traders watch screens.", "1": "<p></p>"}
    }
}"#;

fn normalizer() -> Normalizer {
    let mut lexicon = LexiconTagger::new();
    lexicon.insert("PERSON", "Barack Obama");
    Normalizer::new(NormalizationConfig::default()).with_tagger(Arc::new(lexicon))
}

fn words(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|token| token.to_string()).collect()
}

#[test]
fn raw_documents_become_label_and_article_tables() {
    let dir = tempfile::tempdir().unwrap();
    let normalizer = normalizer();

    let documents = parse_documents(RAW.as_bytes()).unwrap();
    let mut splits = SplitAssigner::new(DEFAULT_SPLIT_SEED);
    let cleaned = clean_captions(documents, &normalizer, &mut splits, DEFAULT_IMAGE_DIR);
    assert_eq!(cleaned.images.len(), 3);
    assert_eq!(cleaned.report.processed(), 3);
    let skipped: Vec<&str> = cleaned.report.skipped().iter().map(|r| r.id.as_str()).collect();
    assert_eq!(skipped, vec!["b2_1"]);

    let news_path = dir.path().join("news_dataset.json");
    serde_json::to_writer(File::create(&news_path).unwrap(), &cleaned.images).unwrap();
    let images = read_image_records(BufReader::new(File::open(&news_path).unwrap())).unwrap();
    assert_eq!(images, cleaned.images);
    assert_eq!(images[0].sentences[0].tokens, words(&["PERSON_", "waves", "in", "paris"]));

    let assembly = assemble_labels(&images, &EncodingControls::new(0, 3)).unwrap();
    let table = &assembly.table;
    assert_eq!(table.label_start_ix, vec![1, 2, 3]);
    assert_eq!(table.label_end_ix, vec![1, 2, 3]);
    assert_eq!(table.label_length, vec![3, 3, 3]);

    let labels_path = dir.path().join("labels.nclb");
    let mut writer = BufWriter::new(File::create(&labels_path).unwrap());
    write_label_table(&mut writer, table).unwrap();
    writer.flush().unwrap();
    drop(writer);
    let restored = read_label_table(BufReader::new(File::open(&labels_path).unwrap())).unwrap();
    assert_eq!(&restored, table);

    let record_path = dir.path().join("dataset.json");
    write_dataset_record(File::create(&record_path).unwrap(), &assembly.record).unwrap();
    let record: DatasetRecord =
        serde_json::from_reader(BufReader::new(File::open(&record_path).unwrap())).unwrap();
    assert_eq!(record.images.len(), 3);
    assert_eq!(record.images[0].file_path.as_deref(), Some("resized/a1_0.jpg"));
    assert_eq!(record.images[2].id, Some(2));

    let vocab = record.vocabulary().unwrap();
    assert_eq!(vocab.len(), 10);
    assert_eq!(vocab.unk_index(), None);
    assert_eq!(
        restored.decode_row(0, &vocab).unwrap(),
        words(&["PERSON_", "waves", "in"])
    );
    assert_eq!(
        restored.decode_row(2, &vocab).unwrap(),
        words(&["traders", "watch", "screens"])
    );

    let documents: Vec<_> = parse_documents(RAW.as_bytes())
        .unwrap()
        .into_iter()
        .map(Result::unwrap)
        .collect();
    let mut report = BatchReport::new();
    let articles = build_article_set(&images, &documents, &normalizer, &mut report);
    assert!(report.skipped().is_empty());

    let article_path = dir.path().join("article.json");
    write_article_set(File::create(&article_path).unwrap(), &articles).unwrap();
    let articles = read_article_set(BufReader::new(File::open(&article_path).unwrap())).unwrap();
    let keys: Vec<&str> = articles.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(keys, vec!["a1", "b2"]);
    assert_eq!(
        articles[0].1.sentence,
        vec!["barack obama visited paris", "the crowd cheered loudly"]
    );
    assert_eq!(articles[0].1.sentence_ner, vec!["barack obama visited paris"]);

    let mut vectors = WordVectors::new(2);
    vectors.insert("paris", vec![1.0, 0.0]).unwrap();
    vectors.insert("crowd", vec![0.0, 1.0]).unwrap();
    vectors.insert("market", vec![1.0, 1.0]).unwrap();
    let controls = VectorizeControls::new(5, 2, Weighting::Average, 2);
    let mut report = BatchReport::new();
    let mut matrices = vectorize_article_set(&articles, &vectors, &controls, &mut report).unwrap();
    assert_eq!(matrices.len(), 2);
    assert_eq!(matrices[0].matrix.dim(), (2, 2));
    assert_eq!(matrices[1].matrix.dim(), (2, 1));

    let components = CommonComponents::fit(matrices.iter().map(|a| &a.matrix), 1, 7, 42);
    assert_eq!(components.len(), 1);
    for article in &mut matrices {
        components.remove(&mut article.matrix);
    }
    let direction = components.direction(0).unwrap();
    for article in &matrices {
        for column in article.matrix.columns() {
            assert!(direction.dot(&column).abs() < 1e-9);
        }
    }

    let keys_path = dir.path().join("article_keys.json");
    write_article_keys(File::create(&keys_path).unwrap(), &matrices).unwrap();
    let table_path = dir.path().join("articles.ncav");
    let mut writer = BufWriter::new(File::create(&table_path).unwrap());
    write_article_table(&mut writer, 2, &matrices).unwrap();
    writer.flush().unwrap();
    drop(writer);

    let keys = read_article_keys(BufReader::new(File::open(&keys_path).unwrap())).unwrap();
    assert_eq!(keys, vec!["a1", "b2"]);
    let table = read_article_table(BufReader::new(File::open(&table_path).unwrap())).unwrap();
    assert_eq!(table.dim, 2);
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.rows[0], matrices[0].matrix);
}
