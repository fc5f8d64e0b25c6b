// tests/property/sequence_test.rs

//! Property-based tests for request identification
//! Sequence numbers issued by one clerk must be strictly increasing with no gaps,
//! whatever the mix of operations, groups, and unreachable addresses.

use async_trait::async_trait;
use cortado::client::{Clerk, Credentials, FailoverPolicy, ReplicaGroup, Transport};
use cortado::connection::dispatch;
use cortado::core::CortadoError;
use cortado::core::backend::MemoryBackend;
use cortado::core::protocol::{Encoding, Request, Response};
use cortado::core::types::{ClientId, SessionHandle, Statement};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::collections::HashSet;

/// Delivers calls straight into an in-process backend; addresses in `down` refuse them.
struct InProcess {
    backend: MemoryBackend,
    down: HashSet<String>,
    attempts: Mutex<Vec<u64>>,
    delivered: Mutex<Vec<u64>>,
}

#[async_trait]
impl Transport for InProcess {
    async fn call(&self, addr: &str, request: Request) -> Result<Response, CortadoError> {
        self.attempts.lock().push(request.seq_id().as_u64());
        if self.down.contains(addr) {
            return Err(CortadoError::Connect {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.delivered.lock().push(request.seq_id().as_u64());
        Ok(dispatch(&self.backend, request, Encoding::Binary).await)
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Open,
    Execute,
    Close,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![Just(Op::Open), Just(Op::Execute), Just(Op::Execute), Just(Op::Close)]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_sequence_numbers_are_gapless_and_increasing(
        layout in prop::collection::vec(prop::collection::vec(any::<bool>(), 1..=3), 3),
        ops in prop::collection::vec((op_strategy(), 0usize..3), 1..40),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut down = HashSet::new();
            let groups: Vec<ReplicaGroup> = layout
                .iter()
                .enumerate()
                .map(|(g, nodes)| {
                    ReplicaGroup::new(nodes.iter().enumerate().map(|(n, is_down)| {
                        let addr = format!("node-{g}-{n}");
                        if *is_down {
                            down.insert(addr.clone());
                        }
                        addr
                    }))
                })
                .collect();

            let transport = InProcess {
                backend: MemoryBackend::standalone(),
                down,
                attempts: Mutex::new(Vec::new()),
                delivered: Mutex::new(Vec::new()),
            };
            let clerk = Clerk::with_identity(
                ClientId::from_raw(1),
                transport,
                FailoverPolicy::ConnectOnly,
                Credentials::default(),
            );

            let mut handle: Option<SessionHandle> = None;
            for (op, g) in &ops {
                let group = &groups[*g];
                if matches!(op, Op::Open) || handle.is_none() {
                    if let Ok(opened) = clerk.open_connection(group).await {
                        handle = Some(opened);
                    }
                    continue;
                }
                if let Some(h) = handle.as_mut() {
                    if matches!(op, Op::Close) {
                        let _ = clerk.close_connection(group, h).await;
                    } else {
                        let _ = clerk.execute_sql(group, h, Statement::new("SELECT * FROM t")).await;
                    }
                }
            }

            let issued = clerk.last_seq().await.as_u64();
            assert_eq!(issued as usize, ops.len());

            // Every attempt of one operation carries the same number; collapsing repeats
            // yields exactly 1, 2, 3, ..., n.
            let mut distinct = clerk.transport().attempts.lock().clone();
            distinct.dedup();
            let expected: Vec<u64> = (1..=issued).collect();
            assert_eq!(distinct, expected);

            // The backend sees each operation at most once, in increasing order.
            let delivered = clerk.transport().delivered.lock().clone();
            assert!(delivered.windows(2).all(|w| w[0] < w[1]), "{delivered:?}");
        });
    }
}
