use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sales_lens::analyzer::{Period, Segment};
use sales_lens::model::UNMAPPED_REGION;
use sales_lens::report::to_csv_string;
use sales_lens::{
    aggregate_time, compute_popularity, define_regions, flag_outliers, long_tail_analysis,
    map_to_region, popularity_by_region, summary_stats, Dataset, Field, Metric, Record, RecordSet,
};

fn day(m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022, m, d).unwrap()
}

/// Quantities and amounts are multiples of 0.5, so every sum is exact in f64.
fn sample_records() -> Vec<Record> {
    let states = ["MAHARASHTRA", "KARNATAKA", "Tamil Nadu", "GOA", "ATLANTIS"];
    (0..60u32)
        .map(|i| {
            let asin = format!("B0{}", i % 7);
            let date = day(4 + i % 3, 1 + (i * 5) % 28);
            let qty = f64::from(1 + i % 4);
            let amount = 100.0 + f64::from(i % 9) * 12.5;
            Record::new(asin, date, qty, amount)
                .with_text(Field::ShipState, states[(i % 5) as usize])
                .with_text(Field::Category, if i % 2 == 0 { "kurta" } else { "set" })
        })
        .collect()
}

fn shuffled(seed: u64) -> RecordSet {
    let mut records = sample_records();
    records.shuffle(&mut StdRng::seed_from_u64(seed));
    RecordSet::from_records(records)
}

#[test]
fn results_do_not_depend_on_row_order() {
    let base = RecordSet::from_records(sample_records());
    let popularity = compute_popularity(&base, Field::Asin, Metric::Quantity).unwrap();
    let stats = summary_stats(&base, Field::Category, &[Field::Qty, Field::Amount]).unwrap();
    let trend = aggregate_time(&base, Field::Date, Period::Week, &[Field::Qty], Some(Field::Asin)).unwrap();

    for seed in [1, 7, 42] {
        let data = shuffled(seed);
        assert_eq!(compute_popularity(&data, Field::Asin, Metric::Quantity).unwrap(), popularity);
        assert_eq!(
            summary_stats(&data, Field::Category, &[Field::Qty, Field::Amount]).unwrap(),
            stats
        );
        assert_eq!(
            aggregate_time(&data, Field::Date, Period::Week, &[Field::Qty], Some(Field::Asin)).unwrap(),
            trend
        );
    }
}

#[test]
fn long_tail_segments_cover_every_group_once() {
    let data = RecordSet::from_records(sample_records());
    let popularity = compute_popularity(&data, Field::Asin, Metric::Quantity).unwrap();
    let table = long_tail_analysis(&data, Field::Asin, Field::Qty, 0.8).unwrap();

    assert_eq!(table.rows.len(), popularity.len());
    let last = table.rows.last().unwrap();
    assert!((last.cumulative_share - 1.0).abs() < 1e-9);
    assert_eq!(last.cumulative_total, popularity.grand_total());

    // Head is a prefix of the ranking.
    let first_tail = table.rows.iter().position(|r| r.segment == Segment::Tail);
    let pos = first_tail.expect("a 0.8 split of seven products leaves a tail");
    assert!(table.rows[pos].cumulative_share > 0.8);
    assert!(table.rows[pos..].iter().all(|r| r.segment == Segment::Tail));
    assert!(table.head().all(|r| r.cumulative_share <= 0.8));
    assert_eq!(table.head().count() + table.tail().count(), table.rows.len());
}

#[test]
fn every_bucket_total_adds_up_to_the_dataset_total() {
    let data = RecordSet::from_records(sample_records());
    let qty_total: f64 = data.records().iter().map(|r| r.qty).sum();

    for period in [Period::Day, Period::Week, Period::Month] {
        let table = aggregate_time(&data, Field::Date, period, &[Field::Qty], None).unwrap();
        let bucketed: f64 = table.rows.iter().map(|r| r.totals[0]).sum();
        assert_eq!(bucketed, qty_total, "period {period}");
        assert!(table.rows.windows(2).all(|w| w[0].period_start < w[1].period_start));
    }
}

#[test]
fn stats_count_every_record_of_a_group() {
    let data = RecordSet::from_records(sample_records());
    let table = summary_stats(&data, Field::Asin, &[Field::Qty, Field::Amount]).unwrap();

    assert_eq!(table.rows.len(), 7);
    for row in &table.rows {
        let expected = data.records().iter().filter(|r| r.asin == row.group_key).count();
        for column in &row.columns {
            assert_eq!(column.count, expected, "{} {}", row.group_key, column.field);
            assert!(column.min <= column.q1);
            assert!(column.q1 <= column.median);
            assert!(column.median <= column.q3);
            assert!(column.q3 <= column.max);
        }
    }
}

fn regions() -> sales_lens::analyzer::RegionMapping {
    define_regions([
        ("maharashtra", "West"),
        ("goa", "West"),
        ("karnataka", "South"),
        ("tamil nadu", "South"),
    ])
    .unwrap()
}

#[test]
fn region_tagging_keeps_rows_and_totals() {
    let data = RecordSet::from_records(sample_records());
    let mapping = regions();

    let assignment = map_to_region(&data, Field::ShipState, &mapping).unwrap();
    assert_eq!(assignment.tagged.len(), data.records().len());
    assert_eq!(assignment.unmapped.get("ATLANTIS"), Some(&12));
    assert_eq!(assignment.unmapped_rows(), 12);

    let table =
        popularity_by_region(&assignment.tagged, Field::Region, Field::Asin, Metric::Revenue).unwrap();
    let overall = compute_popularity(&data, Field::Asin, Metric::Revenue).unwrap();
    for product in &overall.rows {
        let regional: f64 = table
            .rows
            .iter()
            .filter(|r| r.product_key == product.product_key)
            .map(|r| r.total)
            .sum();
        assert_eq!(regional, product.total, "product {}", product.product_key);
    }

    let regions: Vec<&str> = table.rows.iter().map(|r| r.region.as_str()).collect();
    assert!(regions.windows(2).all(|w| w[0] <= w[1]));
    assert!(regions.contains(&UNMAPPED_REGION));
}

#[test]
fn repeated_runs_render_identical_reports() {
    let data = shuffled(3);
    let mapping = regions();
    let render = || {
        let assignment = map_to_region(&data, Field::ShipState, &mapping).unwrap();
        vec![
            to_csv_string(&compute_popularity(&data, Field::Asin, Metric::Quantity).unwrap()).unwrap(),
            to_csv_string(&summary_stats(&data, Field::Category, &[Field::Qty, Field::Amount]).unwrap())
                .unwrap(),
            to_csv_string(&long_tail_analysis(&data, Field::Asin, Field::Amount, 0.5).unwrap()).unwrap(),
            to_csv_string(
                &aggregate_time(&data, Field::Date, Period::Month, &[Field::Qty, Field::Amount], None)
                    .unwrap(),
            )
            .unwrap(),
            to_csv_string(&flag_outliers(&data, Field::Amount, Some(Field::Category)).unwrap()).unwrap(),
            to_csv_string(
                &popularity_by_region(&assignment.tagged, Field::Region, Field::Asin, Metric::Quantity)
                    .unwrap(),
            )
            .unwrap(),
        ]
    };
    assert_eq!(render(), render());
}
