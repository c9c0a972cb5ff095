use super::CallSignature;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// One aggregated on-chain read for every call in the batch.
    Aggregated,
    /// Independent reads issued in parallel.
    Independent,
}

/// Reads issued together for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallBatch {
    pub epoch: u64,
    pub block: u64,
    pub mode: BatchMode,
    pub calls: Vec<CallSignature>,
}

/// A signature selected by a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueCall {
    pub signature: CallSignature,
    /// The last aggregated read containing this call failed as a whole.
    pub isolate: bool,
}

/// Groups the calls due at `block` into batches.
///
/// Aggregated batches hold at most `max_calls_per_batch` calls, ordered by
/// target so calls against the same contract share a batch. Calls flagged for
/// isolation, and every call when aggregation is unavailable, go into a single
/// independent batch.
pub fn plan_batches(
    epoch: u64,
    block: u64,
    due: Vec<DueCall>,
    max_calls_per_batch: usize,
    aggregation_available: bool,
) -> Vec<CallBatch> {
    let (isolated, mut aggregated): (Vec<DueCall>, Vec<DueCall>) = due
        .into_iter()
        .partition(|call| call.isolate || !aggregation_available);

    aggregated.sort_by(|a, b| {
        a.signature
            .address()
            .cmp(&b.signature.address())
            .then_with(|| a.signature.method().cmp(b.signature.method()))
            .then_with(|| a.signature.calldata()[..].cmp(&b.signature.calldata()[..]))
    });

    let chunk_size = max_calls_per_batch.max(1);
    let mut batches: Vec<CallBatch> = aggregated
        .chunks(chunk_size)
        .map(|chunk| CallBatch {
            epoch,
            block,
            mode: BatchMode::Aggregated,
            calls: chunk.iter().map(|call| call.signature.clone()).collect(),
        })
        .collect();

    if !isolated.is_empty() {
        batches.push(CallBatch {
            epoch,
            block,
            mode: BatchMode::Independent,
            calls: isolated.into_iter().map(|call| call.signature).collect(),
        });
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Interface;
    use crate::repository::contract::IERC20;
    use alloy::primitives::Address;

    fn balance_of(token: u8, account: u8) -> CallSignature {
        CallSignature::of(
            Address::repeat_byte(token),
            Interface::Erc20,
            &IERC20::balanceOfCall {
                account: Address::repeat_byte(account),
            },
        )
    }

    fn due(signature: CallSignature, isolate: bool) -> DueCall {
        DueCall { signature, isolate }
    }

    #[test]
    fn test_nothing_due_plans_nothing() {
        assert!(plan_batches(0, 10, Vec::new(), 100, true).is_empty());
    }

    #[test]
    fn test_due_calls_share_one_aggregated_read() {
        let calls = vec![
            due(balance_of(2, 1), false),
            due(balance_of(1, 1), false),
            due(balance_of(1, 2), false),
        ];
        let batches = plan_batches(3, 10, calls, 100, true);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, BatchMode::Aggregated);
        assert_eq!(batches[0].block, 10);
        assert_eq!(batches[0].epoch, 3);
        assert_eq!(batches[0].calls.len(), 3);
        // Grouped by target contract.
        assert_eq!(batches[0].calls[0].address(), Address::repeat_byte(1));
        assert_eq!(batches[0].calls[1].address(), Address::repeat_byte(1));
        assert_eq!(batches[0].calls[2].address(), Address::repeat_byte(2));
    }

    #[test]
    fn test_aggregated_batches_respect_max_size() {
        let calls = (0..5).map(|i| due(balance_of(1, i), false)).collect();
        let batches = plan_batches(0, 1, calls, 2, true);

        let sizes: Vec<usize> = batches.iter().map(|b| b.calls.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_isolated_calls_are_issued_independently() {
        let calls = vec![due(balance_of(1, 1), true), due(balance_of(1, 2), false)];
        let batches = plan_batches(0, 1, calls, 100, true);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].mode, BatchMode::Aggregated);
        assert_eq!(batches[0].calls, vec![balance_of(1, 2)]);
        assert_eq!(batches[1].mode, BatchMode::Independent);
        assert_eq!(batches[1].calls, vec![balance_of(1, 1)]);
    }

    #[test]
    fn test_without_aggregation_everything_is_independent() {
        let calls = vec![due(balance_of(1, 1), false), due(balance_of(2, 1), false)];
        let batches = plan_batches(0, 1, calls, 100, false);

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, BatchMode::Independent);
        assert_eq!(batches[0].calls.len(), 2);
    }
}
