//! Compute Module Tests
//!
//! ## Test Scopes
//! - **Accumulator**: add-or-initialize, overflow, and lost-update freedom under contention.
//! - **Worker job**: partition fan-out, threshold filtering, failure and cancellation.
//! - **Dispatcher**: one job per node, fail-all on any node error, reduce semantics.

#[cfg(test)]
mod tests {
    use crate::cluster::topology::ClusterTopology;
    use crate::cluster::types::{Node, NodeId};
    use crate::compute::accumulator::{BalanceAccumulator, add_local, exact_add};
    use crate::compute::error::{AggregateError, AggregateResult};
    use crate::compute::job::{ComputeNode, local_aggregate};
    use crate::compute::submitter::{JobSubmitter, LocalSubmitter};
    use crate::compute::task::{Dispatcher, map_jobs, reduce};
    use crate::compute::types::*;
    use crate::storage::account::{AccountRecord, PartitionId};
    use crate::storage::memory::AccountStore;
    use crate::storage::partitioner::PartitionManager;

    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn node(id: &str, port: u16) -> Node {
        Node::new(id, SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn balances(entries: &[(i64, &str)]) -> ClientBalances {
        entries.iter().map(|(c, b)| (*c, dec(b))).collect()
    }

    /// Serves canned per-partition results.
    #[derive(Default)]
    struct FakeScanner {
        partitions: HashMap<PartitionId, Vec<AggregateResult<AccountRecord>>>,
        broken: Vec<PartitionId>,
    }

    impl FakeScanner {
        fn with(mut self, partition: PartitionId, record: AggregateResult<AccountRecord>) -> Self {
            self.partitions.entry(partition).or_default().push(record);
            self
        }
    }

    impl PartitionScanner for FakeScanner {
        fn scan_partition(&self, partition: PartitionId) -> AggregateResult<AccountCursor> {
            if self.broken.contains(&partition) {
                return Err(AggregateError::PartitionScan {
                    partition,
                    reason: "storage offline".to_string(),
                });
            }
            let records = self.partitions.get(&partition).cloned().unwrap_or_default();
            Ok(Box::new(records.into_iter()))
        }
    }

    /// Yields one record every few milliseconds, forever.
    struct SlowScanner;

    impl PartitionScanner for SlowScanner {
        fn scan_partition(&self, _partition: PartitionId) -> AggregateResult<AccountCursor> {
            Ok(Box::new((0..).map(|i| {
                std::thread::sleep(Duration::from_millis(5));
                Ok(AccountRecord::new(i, 1, Decimal::ONE))
            })))
        }
    }

    struct FixedOwnership(Vec<PartitionId>);

    impl PartitionOwnership for FixedOwnership {
        fn primary_partitions_of(&self, _node: &NodeId) -> Vec<PartitionId> {
            self.0.clone()
        }
    }

    fn malformed(partition: PartitionId) -> AggregateResult<AccountRecord> {
        Err(AggregateError::MalformedRecord {
            partition,
            reason: "missing field `client_id`".to_string(),
        })
    }

    // ============================================================
    // ACCUMULATOR TESTS
    // ============================================================

    #[test]
    fn test_accumulator_add_or_initialize() {
        let acc = BalanceAccumulator::new();

        acc.add(7, dec("10.00")).unwrap();
        acc.add(7, dec("5.50")).unwrap();
        acc.add(8, dec("1")).unwrap();

        assert_eq!(acc.len(), 2);
        assert_eq!(acc.into_balances(), balances(&[(7, "15.50"), (8, "1")]));
    }

    #[test]
    fn test_accumulator_merge_partial() {
        let acc = BalanceAccumulator::new();
        acc.add(1, dec("1.25")).unwrap();

        acc.merge(balances(&[(1, "0.75"), (2, "3")])).unwrap();

        assert_eq!(acc.snapshot(), balances(&[(1, "2.00"), (2, "3")]));
    }

    #[test]
    fn test_accumulator_reports_overflow() {
        let acc = BalanceAccumulator::new();
        acc.add(3, Decimal::MAX).unwrap();

        let err = acc.add(3, Decimal::MAX).unwrap_err();

        assert_eq!(err, AggregateError::BalanceOverflow { client_id: 3 });
    }

    #[test]
    fn test_accumulator_rejects_sum_that_would_round() {
        let acc = BalanceAccumulator::new();
        acc.add(1, dec("1000000000000000000000000000")).unwrap();

        let err = acc.add(1, dec("0.01")).unwrap_err();

        assert_eq!(err, AggregateError::BalanceOverflow { client_id: 1 });
        // The stored total is left untouched.
        assert_eq!(acc.snapshot(), balances(&[(1, "1000000000000000000000000000")]));
    }

    #[test]
    fn test_local_sum_rejects_sum_that_would_round() {
        let mut partial = ClientBalances::new();
        add_local(&mut partial, 4, dec("1000000000000000000000000000")).unwrap();

        let err = add_local(&mut partial, 4, dec("0.01")).unwrap_err();

        assert_eq!(err, AggregateError::BalanceOverflow { client_id: 4 });
    }

    #[test]
    fn test_exact_add_keeps_large_exact_sums() {
        // Trailing zeros may be dropped as long as the value is unchanged.
        let sum = exact_add(dec("1000000000000000000000000000"), dec("0.00")).unwrap();
        assert_eq!(sum, dec("1000000000000000000000000000"));

        assert_eq!(
            exact_add(dec("999999999999999999999999999"), dec("1")),
            Some(dec("1000000000000000000000000000"))
        );
        assert_eq!(
            exact_add(
                dec("1000000000000000000000000000"),
                dec("1.0000000000000000000000000000")
            ),
            Some(dec("1000000000000000000000000001"))
        );
        assert_eq!(exact_add(dec("10.00"), dec("5.5")), Some(dec("15.50")));
        assert_eq!(exact_add(Decimal::MAX, Decimal::ONE), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_accumulator_never_loses_updates() {
        let acc = Arc::new(BalanceAccumulator::new());
        let mut handles = Vec::new();

        for _ in 0..64 {
            let acc = acc.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                for _ in 0..1_000 {
                    acc.add(42, dec("0.01")).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(acc.snapshot(), balances(&[(42, "640.00")]));
    }

    // ============================================================
    // THRESHOLD TESTS
    // ============================================================

    #[test]
    fn test_threshold_is_strict() {
        let all = balances(&[(1, "100.00"), (2, "60.00"), (3, "59.99")]);

        let filtered = apply_threshold(all, Some(dec("60")));

        assert_eq!(filtered, balances(&[(3, "59.99")]));
    }

    #[test]
    fn test_no_threshold_keeps_everything() {
        let all = balances(&[(1, "100.00"), (2, "-5")]);

        assert_eq!(apply_threshold(all.clone(), None), all);
    }

    // ============================================================
    // WORKER JOB TESTS
    // ============================================================

    #[tokio::test]
    async fn test_client_split_across_partitions_is_summed() {
        let scanner = FakeScanner::default()
            .with(0, Ok(AccountRecord::new(1, 7, dec("10.00"))))
            .with(1, Ok(AccountRecord::new(2, 7, dec("5.50"))))
            .with(1, Ok(AccountRecord::new(3, 9, dec("2"))));

        let result = local_aggregate(
            Arc::new(scanner),
            &[0, 1],
            None,
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, balances(&[(7, "15.50"), (9, "2")]));
    }

    #[tokio::test]
    async fn test_only_owned_partitions_are_scanned() {
        let scanner = FakeScanner::default()
            .with(0, Ok(AccountRecord::new(1, 1, dec("1"))))
            .with(5, Ok(AccountRecord::new(2, 2, dec("2"))));

        let result = local_aggregate(
            Arc::new(scanner),
            &[5],
            None,
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, balances(&[(2, "2")]));
    }

    #[tokio::test]
    async fn test_no_partitions_yields_empty_result() {
        let result = local_aggregate(
            Arc::new(FakeScanner::default()),
            &[],
            Some(dec("10")),
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_applied_after_summing() {
        // Each account is below the threshold, the client total is not.
        let scanner = FakeScanner::default()
            .with(0, Ok(AccountRecord::new(1, 1, dec("40"))))
            .with(1, Ok(AccountRecord::new(2, 1, dec("30"))))
            .with(1, Ok(AccountRecord::new(3, 2, dec("50"))));

        let result = local_aggregate(
            Arc::new(scanner),
            &[0, 1],
            Some(dec("60")),
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, balances(&[(2, "50")]));
    }

    #[tokio::test]
    async fn test_malformed_record_fails_fast() {
        let scanner = FakeScanner::default()
            .with(0, Ok(AccountRecord::new(1, 1, dec("1"))))
            .with(1, malformed(1));

        let err = local_aggregate(
            Arc::new(scanner),
            &[0, 1],
            None,
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AggregateError::MalformedRecord { partition: 1, .. }));
    }

    #[tokio::test]
    async fn test_malformed_record_can_be_skipped() {
        let scanner = FakeScanner::default()
            .with(0, Ok(AccountRecord::new(1, 1, dec("1"))))
            .with(0, malformed(0))
            .with(0, Ok(AccountRecord::new(2, 1, dec("2"))));

        let result = local_aggregate(
            Arc::new(scanner),
            &[0],
            None,
            MalformedRecordPolicy::Skip,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, balances(&[(1, "3")]));
    }

    #[tokio::test]
    async fn test_partition_scan_failure_aborts_job() {
        let scanner = FakeScanner {
            broken: vec![3],
            ..FakeScanner::default()
        }
        .with(0, Ok(AccountRecord::new(1, 1, dec("1"))));

        let err = local_aggregate(
            Arc::new(scanner),
            &[0, 3],
            None,
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AggregateError::PartitionScan { partition: 3, .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_partitions_same_client() {
        let mut scanner = FakeScanner::default();
        for partition in 0..128 {
            for account in 0..50 {
                scanner = scanner.with(
                    partition,
                    Ok(AccountRecord::new(
                        (partition * 1000 + account) as i64,
                        1,
                        dec("0.10"),
                    )),
                );
            }
        }
        let partitions: Vec<PartitionId> = (0..128).collect();

        let result = local_aggregate(
            Arc::new(scanner),
            &partitions,
            None,
            MalformedRecordPolicy::FailFast,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(result, balances(&[(1, "640.00")]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_stops_job() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = local_aggregate(
            Arc::new(SlowScanner),
            &[0, 1],
            None,
            MalformedRecordPolicy::FailFast,
            &cancel,
        )
        .await
        .unwrap_err();

        assert_eq!(err, AggregateError::Cancelled);
    }

    /// Like `SlowScanner`, but counts every record it hands out.
    struct CountingScanner(Arc<AtomicUsize>);

    impl PartitionScanner for CountingScanner {
        fn scan_partition(&self, _partition: PartitionId) -> AggregateResult<AccountCursor> {
            let produced = self.0.clone();
            Ok(Box::new((0..).map(move |i| {
                std::thread::sleep(Duration::from_millis(5));
                produced.fetch_add(1, Ordering::SeqCst);
                Ok(AccountRecord::new(i, 1, Decimal::ONE))
            })))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_job_stops_partition_scans() {
        let produced = Arc::new(AtomicUsize::new(0));
        let scanner = Arc::new(CountingScanner(produced.clone()));
        let cancel = CancellationToken::new();

        let result = tokio::time::timeout(
            Duration::from_millis(30),
            local_aggregate(
                scanner,
                &[0, 1],
                None,
                MalformedRecordPolicy::FailFast,
                &cancel,
            ),
        )
        .await;
        assert!(result.is_err(), "job should not finish over endless partitions");

        // Each scan may finish the record it was reading when the future was dropped.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let settled = produced.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(produced.load(Ordering::SeqCst), settled);
        // The caller's own token is not cancelled by dropping the job.
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_job_timeout() {
        let compute = ComputeNode::new(
            NodeId::from("slow"),
            Arc::new(FixedOwnership(vec![0])),
            Arc::new(SlowScanner),
            JobSettings {
                job_timeout: Some(Duration::from_millis(40)),
                ..JobSettings::default()
            },
        );

        let err = SumBalancesJob::new(None)
            .execute(&compute, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, AggregateError::Timeout { after_ms: 40 });
    }

    // ============================================================
    // DISPATCHER TESTS
    // ============================================================

    /// Two nodes sharing one store; each only scans the partitions it is primary for.
    fn in_process_cluster(records: &[AccountRecord]) -> (Vec<Node>, Dispatcher) {
        let topology = ClusterTopology::new(node("node-x", 6000), vec![node("node-y", 6001)]);
        let partitioner = PartitionManager::with_partitions(topology.clone(), 32);
        let store = AccountStore::new(partitioner.clone());
        for record in records {
            store
                .store_local(partitioner.get_partition(record.client_id()), record)
                .unwrap();
        }

        let mut submitter = LocalSubmitter::new();
        for member in topology.members() {
            submitter.register(ComputeNode::new(
                member.id,
                partitioner.clone(),
                store.clone(),
                JobSettings::default(),
            ));
        }

        (topology.members(), Dispatcher::new(Arc::new(submitter)))
    }

    fn sample_records() -> Vec<AccountRecord> {
        vec![
            AccountRecord::new(1, 1, dec("70.00")),
            AccountRecord::new(2, 1, dec("30.00")),
            AccountRecord::new(3, 2, dec("50.00")),
            AccountRecord::new(4, 3, dec("20.00")),
        ]
    }

    #[tokio::test]
    async fn test_cluster_aggregate_with_threshold() {
        let (nodes, dispatcher) = in_process_cluster(&sample_records());

        let result = dispatcher.aggregate(&nodes, Some(dec("60.00"))).await.unwrap();

        assert_eq!(result, balances(&[(2, "50.00"), (3, "20.00")]));
    }

    #[tokio::test]
    async fn test_cluster_aggregate_without_threshold() {
        let (nodes, dispatcher) = in_process_cluster(&sample_records());

        let result = dispatcher.aggregate(&nodes, None).await.unwrap();

        assert_eq!(
            result,
            balances(&[(1, "100.00"), (2, "50.00"), (3, "20.00")])
        );
    }

    #[tokio::test]
    async fn test_cluster_aggregate_is_idempotent() {
        let (nodes, dispatcher) = in_process_cluster(&sample_records());

        let first = dispatcher.aggregate(&nodes, Some(dec("75"))).await.unwrap();
        let second = dispatcher.aggregate(&nodes, Some(dec("75"))).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_cluster_is_rejected() {
        let dispatcher = Dispatcher::new(Arc::new(LocalSubmitter::new()));

        let err = dispatcher.aggregate(&[], None).await.unwrap_err();

        assert_eq!(err, AggregateError::EmptyCluster);
    }

    #[tokio::test]
    async fn test_unknown_node_is_unreachable() {
        let dispatcher = Dispatcher::new(Arc::new(LocalSubmitter::new()));

        let err = dispatcher
            .aggregate(&[node("ghost", 6100)], None)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AggregateError::NodeUnreachable {
                node: NodeId::from("ghost")
            }
        );
    }

    /// Returns canned partials and counts submissions.
    struct ScriptedSubmitter {
        results: HashMap<NodeId, AggregateResult<ClientBalances>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl JobSubmitter for ScriptedSubmitter {
        async fn submit(
            &self,
            node: &Node,
            job: SumBalancesJob,
            _cancel: &CancellationToken,
        ) -> AggregateResult<ClientBalances> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let result = self
                .results
                .get(&node.id)
                .cloned()
                .unwrap_or_else(|| Ok(ClientBalances::new()));
            result.map(|partial| apply_threshold(partial, job.threshold))
        }
    }

    #[tokio::test]
    async fn test_partials_are_unioned_and_filtered() {
        let submitter = Arc::new(ScriptedSubmitter {
            results: HashMap::from([
                (
                    NodeId::from("x"),
                    Ok(balances(&[(1, "100.00"), (2, "50.00")])),
                ),
                (NodeId::from("y"), Ok(balances(&[(3, "20.00")]))),
            ]),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(submitter.clone());

        let result = dispatcher
            .aggregate(&[node("x", 1), node("y", 2)], Some(dec("60.00")))
            .await
            .unwrap();

        assert_eq!(result, balances(&[(2, "50.00"), (3, "20.00")]));
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_node_failure_fails_aggregate() {
        let submitter = Arc::new(ScriptedSubmitter {
            results: HashMap::from([
                (NodeId::from("x"), Ok(balances(&[(1, "1")]))),
                (
                    NodeId::from("y"),
                    Err(AggregateError::RemoteExecution {
                        node: NodeId::from("y"),
                        reason: "boom".to_string(),
                    }),
                ),
                (NodeId::from("z"), Ok(balances(&[(2, "2")]))),
            ]),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(submitter.clone());

        let err = dispatcher
            .aggregate(&[node("x", 1), node("y", 2), node("z", 3)], None)
            .await
            .unwrap_err();

        assert!(matches!(err, AggregateError::RemoteExecution { .. }));
        // Every node was still asked.
        assert_eq!(submitter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_aggregate() {
        let submitter = Arc::new(ScriptedSubmitter {
            results: HashMap::new(),
            calls: AtomicUsize::new(0),
        });
        let dispatcher = Dispatcher::new(submitter);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = dispatcher
            .aggregate_with_cancel(&[node("x", 1)], None, &cancel)
            .await;

        // Both branches may be ready; either outcome is acceptable, but never an error
        // other than cancellation.
        match result {
            Ok(partial) => assert!(partial.is_empty()),
            Err(e) => assert_eq!(e, AggregateError::Cancelled),
        }
    }

    #[test]
    fn test_map_jobs_one_per_node() {
        let nodes = vec![node("a", 1), node("b", 2), node("a", 1)];

        let jobs = map_jobs(&nodes, Some(dec("5")));

        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|(_, job)| job.threshold == Some(dec("5"))));
        assert_eq!(jobs[0].0.id, NodeId::from("a"));
        assert_eq!(jobs[1].0.id, NodeId::from("b"));
    }

    #[test]
    fn test_reduce_last_writer_wins() {
        let merged = reduce(vec![
            balances(&[(1, "10"), (2, "20")]),
            balances(&[(2, "99")]),
        ]);

        assert_eq!(merged, balances(&[(1, "10"), (2, "99")]));
    }
}
