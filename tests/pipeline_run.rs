use chrono::NaiveDate;
use sales_lens::config::{AnalysisConfig, AppConfig};
use sales_lens::pipeline::{self, AnalysisOutput, PipelineError};
use sales_lens::report;
use sales_lens::storage::SqliteStorage;
use sales_lens::EngineError;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const CLEANED: &str = "\
Order ID,Date,Status,Category,ASIN,Qty,Amount,ship-state,Unnamed: 22
405-1,04-30-22,Shipped,Set,B01,2,600.0,MAHARASHTRA,
405-2,04-30-22,Shipped,Kurta,B02,1,300.0,karnataka,
405-3,05-02-22,Shipped,Set,B01,3,900.0,Goa,
405-4,05-15-22,Shipped,Kurta,B03,1,250.0,ATLANTIS,
405-5,06-01-22,Shipped,Set,B02,4,1200.0,Karnataka,
405-6,06-03-22,Shipped,Top,B01,1,5000.0,Maharashtra,
";

const REGIONS: &str = "\
state,region
maharashtra,West
goa,West
karnataka,South
";

fn workspace() -> (TempDir, AppConfig) {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("cleaned.csv");
    let regions = dir.path().join("region_mapping.csv");
    fs::write(&input, CLEANED).unwrap();
    fs::write(&regions, REGIONS).unwrap();
    let config = AppConfig {
        input_path: input,
        region_mapping_path: Some(regions),
        output_dir: dir.path().join("reports"),
        database_path: Some(dir.path().join("results.db")),
        analysis: AnalysisConfig {
            top_n: 2,
            ..AnalysisConfig::default()
        },
    };
    (dir, config)
}

fn report_header(dir: &Path, file: &str) -> String {
    let content = fs::read_to_string(dir.join(file)).unwrap();
    content.lines().next().unwrap_or_default().to_string()
}

#[tokio::test]
async fn full_run_writes_reports_and_persists_results() {
    let (_dir, config) = workspace();
    let out_dir = config.output_dir.clone();
    let db_path = config.database_path.clone().unwrap();

    let summary = pipeline::run(Arc::new(config)).await.unwrap();

    assert_eq!(summary.record_count, 6);
    assert_eq!(summary.outputs.len(), 5);
    assert_eq!(summary.report_paths.len(), 6);
    assert_eq!(summary.unmapped.get("ATLANTIS"), Some(&1));

    match &summary.outputs[0] {
        AnalysisOutput::TopProducts(top) => {
            let keys: Vec<&str> = top.rows.iter().map(|r| r.product_key.as_str()).collect();
            assert_eq!(keys, vec!["B01", "B02"]);
            assert_eq!(top.rows[0].total, 6.0);
        }
        other => panic!("unexpected first output: {}", other.name()),
    }

    assert_eq!(report_header(&out_dir, report::TOP_N_FILE), "ASIN,popularity");
    assert_eq!(
        report_header(&out_dir, report::REGION_POPULARITY_FILE),
        "region,ASIN,popularity"
    );
    assert!(report_header(&out_dir, report::LONG_TAIL_FILE).ends_with("segment"));

    let storage = SqliteStorage::new(&db_path.to_string_lossy()).unwrap();
    let run = storage.latest_run().unwrap().unwrap();
    assert_eq!(Some(run.id), summary.run_id);
    assert_eq!(run.record_count, 6);

    let top = storage.get_top_products(run.id, 10).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].product_key, "B01");

    let monthly = storage.get_series(run.id, "Qty").unwrap();
    let months: Vec<NaiveDate> = monthly.iter().map(|(d, _)| *d).collect();
    assert_eq!(
        months,
        vec![
            NaiveDate::from_ymd_opt(2022, 4, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2022, 6, 1).unwrap(),
        ]
    );
    assert_eq!(monthly.iter().map(|(_, q)| q).sum::<f64>(), 12.0);
}

#[tokio::test]
async fn run_without_mapping_or_database_skips_those_stages() {
    let (_dir, mut config) = workspace();
    config.region_mapping_path = None;
    config.database_path = None;

    let summary = pipeline::run(Arc::new(config)).await.unwrap();

    assert!(summary.region_popularity.is_none());
    assert!(summary.unmapped.is_empty());
    assert!(summary.run_id.is_none());
    assert_eq!(summary.report_paths.len(), 5);
}

#[tokio::test]
async fn conflicting_region_mapping_aborts_the_run() {
    let (dir, config) = workspace();
    fs::write(
        dir.path().join("region_mapping.csv"),
        "state,region\ngoa,West\nGOA ,South\n",
    )
    .unwrap();

    let result = pipeline::run(Arc::new(config)).await;
    assert!(matches!(
        result,
        Err(PipelineError::Engine(EngineError::DuplicateKey { .. }))
    ));
}

#[tokio::test]
async fn missing_input_file_is_an_ingestion_error() {
    let (dir, mut config) = workspace();
    config.input_path = dir.path().join("does-not-exist.csv");

    let result = pipeline::run(Arc::new(config)).await;
    assert!(matches!(result, Err(PipelineError::Parser(_))));
}

#[tokio::test]
async fn failed_persistence_rolls_back_the_whole_run() {
    let (_dir, config) = workspace();
    let db_path = config.database_path.clone().unwrap();
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch("CREATE TABLE time_series (legacy INTEGER NOT NULL);")
            .unwrap();
    }

    let result = pipeline::run(Arc::new(config)).await;
    assert!(matches!(result, Err(PipelineError::Storage(_))));

    let storage = SqliteStorage::new(&db_path.to_string_lossy()).unwrap();
    assert_eq!(storage.latest_run().unwrap(), None);

    let conn = rusqlite::Connection::open(&db_path).unwrap();
    for table in ["runs", "popularity", "summary_stats", "long_tail", "region_popularity"] {
        let rows: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0, "table {table}");
    }
}
