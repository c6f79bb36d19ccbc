use crate::errors::DataShapeError;
use crate::model::{Outcome, TestCounts, TestRunRecord};

/// Normalizes raw test-run data into one pass/total pair.
///
/// Two incompatible shapes exist in the wild: outcome-tagged statistics per
/// run, and a pre-aggregated pair per run. When every record carries
/// statistics, the outcome entries are flattened and summed; otherwise the
/// aggregate fields are summed across all records. The records for one call
/// never mix shapes in practice, hence the all-or-fallback selection.
pub fn try_reconcile(records: &[TestRunRecord]) -> Result<TestCounts, DataShapeError> {
    if records.is_empty() {
        return Ok(TestCounts::default());
    }

    if records.iter().all(|r| r.run_statistics.is_some()) {
        let stats = records
            .iter()
            .flat_map(|r| r.run_statistics.as_deref().unwrap_or_default());
        let mut counts = TestCounts::default();
        for entry in stats {
            if entry.outcome == Outcome::Passed {
                counts.passed += entry.count;
            }
            counts.total += entry.count;
        }
        return Ok(counts);
    }

    if records
        .iter()
        .any(|r| r.total_tests.is_some() || r.passed_tests.is_some())
    {
        return Ok(TestCounts {
            passed: records.iter().filter_map(|r| r.passed_tests).sum(),
            total: records.iter().filter_map(|r| r.total_tests).sum(),
        });
    }

    Err(DataShapeError)
}

/// Like [`try_reconcile`], but degrades an unrecognized shape to "no test
/// data" after logging it. This is what the orchestrator calls.
pub fn reconcile(records: &[TestRunRecord]) -> TestCounts {
    match try_reconcile(records) {
        Ok(counts) => counts,
        Err(err) => {
            log::warn!("{err}; reporting zero test counts");
            TestCounts::default()
        }
    }
}

/// The run with the highest id is the authoritative "latest" run when one
/// must be singled out. Count reconciliation still sums across all runs;
/// the two queries aggregate at different granularity.
pub fn latest_run(records: &[TestRunRecord]) -> Option<&TestRunRecord> {
    records.iter().max_by_key(|r| r.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutcomeCount;
    use proptest::prelude::*;

    fn tagged(id: u64, entries: &[(Outcome, u64)]) -> TestRunRecord {
        TestRunRecord {
            id,
            run_statistics: Some(
                entries
                    .iter()
                    .map(|(outcome, count)| OutcomeCount {
                        outcome: *outcome,
                        count: *count,
                    })
                    .collect(),
            ),
            passed_tests: None,
            total_tests: None,
        }
    }

    fn aggregated(id: u64, passed: u64, total: u64) -> TestRunRecord {
        TestRunRecord {
            id,
            run_statistics: None,
            passed_tests: Some(passed),
            total_tests: Some(total),
        }
    }

    #[test]
    fn outcome_tagged_records_sum_passed_and_total() {
        let records = vec![tagged(1, &[(Outcome::Passed, 8), (Outcome::Failed, 2)])];
        let counts = reconcile(&records);
        assert_eq!(counts, TestCounts { passed: 8, total: 10 });
    }

    #[test]
    fn outcome_tagged_records_flatten_across_runs() {
        let records = vec![
            tagged(1, &[(Outcome::Passed, 3), (Outcome::NotExecuted, 1)]),
            tagged(2, &[(Outcome::Passed, 5), (Outcome::Failed, 2)]),
        ];
        let counts = reconcile(&records);
        assert_eq!(counts, TestCounts { passed: 8, total: 11 });
    }

    #[test]
    fn aggregated_records_sum_directly() {
        let records = vec![aggregated(1, 10, 12), aggregated(2, 4, 4)];
        let counts = reconcile(&records);
        assert_eq!(counts, TestCounts { passed: 14, total: 16 });
    }

    #[test]
    fn one_aggregated_record_forces_fallback_for_all() {
        // Shape selection is "all tagged" vs "sum aggregates"; a single
        // aggregate record drops the whole call into the fallback.
        let records = vec![
            tagged(1, &[(Outcome::Passed, 3)]),
            aggregated(2, 4, 5),
        ];
        let counts = reconcile(&records);
        assert_eq!(counts, TestCounts { passed: 4, total: 5 });
    }

    #[test]
    fn empty_input_means_no_test_data() {
        assert_eq!(reconcile(&[]), TestCounts::default());
    }

    #[test]
    fn latest_run_has_highest_id() {
        let records = vec![aggregated(3, 1, 1), aggregated(9, 2, 2), aggregated(5, 3, 3)];
        assert_eq!(latest_run(&records).unwrap().id, 9);
        assert!(latest_run(&[]).is_none());
    }

    #[test]
    fn latest_run_and_counts_aggregate_at_different_granularity() {
        // Singling out the authoritative run does not narrow the counts,
        // which always sum across every run of the build.
        let records = vec![aggregated(1, 2, 3), aggregated(4, 5, 6)];
        assert_eq!(latest_run(&records).unwrap().id, 4);
        assert_eq!(reconcile(&records), TestCounts { passed: 7, total: 9 });
    }

    #[test]
    fn unrecognized_shape_is_an_error() {
        let records = vec![TestRunRecord {
            id: 1,
            run_statistics: None,
            passed_tests: None,
            total_tests: None,
        }];
        assert_eq!(try_reconcile(&records), Err(DataShapeError));
        assert_eq!(reconcile(&records), TestCounts::default());
    }

    proptest! {
        #[test]
        fn tagged_counts_bound_and_sum(
            runs in prop::collection::vec(
                prop::collection::vec(
                    (
                        prop_oneof![
                            Just(Outcome::Passed),
                            Just(Outcome::Failed),
                            Just(Outcome::NotExecuted),
                        ],
                        0u64..1000,
                    ),
                    0..6,
                ),
                1..6,
            ),
        ) {
            let records: Vec<TestRunRecord> = runs
                .iter()
                .enumerate()
                .map(|(i, entries)| tagged(i as u64, entries))
                .collect();

            let counts = reconcile(&records);
            let expected_total: u64 = runs.iter().flatten().map(|(_, c)| c).sum();
            prop_assert!(counts.passed <= counts.total);
            prop_assert_eq!(counts.total, expected_total);
            // Idempotence.
            prop_assert_eq!(reconcile(&records), counts);
        }
    }
}
