use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, Bytes};
use tokio::sync::watch;

use super::entry::{CacheEntry, CallResult};
use super::planner::{CallBatch, DueCall, plan_batches};
use super::signature::CallSignature;

pub type SubscriptionId = u64;

/// Interest in one call signature.
///
/// The receiver observes every mutation of the entry. It is closed when the
/// session resets, after which the caller has to subscribe again.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    signature: CallSignature,
    receiver: watch::Receiver<CacheEntry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn signature(&self) -> &CallSignature {
        &self.signature
    }

    pub fn current(&self) -> CacheEntry {
        self.receiver.borrow().clone()
    }

    /// Waits for the next mutation. Returns `false` once the session was reset.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

/// What a fetch observed for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub block: u64,
    pub result: Result<Bytes, String>,
}

/// Point-in-time view of one cached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    pub signature: CallSignature,
    pub entry: CacheEntry,
    pub listeners: usize,
    pub fresh: bool,
}

struct Slot {
    entry: CacheEntry,
    /// Blocks-per-fetch requested by each interest holder.
    listeners: BTreeMap<SubscriptionId, u64>,
    /// Threshold in effect while the last listener was registered.
    last_blocks_per_fetch: u64,
    sender: watch::Sender<CacheEntry>,
    /// Block of the newest fetch still in flight.
    in_flight: Option<u64>,
    /// Block of the confirmation that invalidated the entry.
    invalidated_at: Option<u64>,
    isolate: bool,
}

impl Slot {
    fn new(blocks_per_fetch: u64) -> Self {
        let (sender, _) = watch::channel(CacheEntry::default());
        Self {
            entry: CacheEntry::default(),
            listeners: BTreeMap::new(),
            last_blocks_per_fetch: blocks_per_fetch,
            sender,
            in_flight: None,
            invalidated_at: None,
            isolate: false,
        }
    }

    fn blocks_per_fetch(&self) -> Option<u64> {
        self.listeners.values().min().copied()
    }

    fn freshness_threshold(&self) -> u64 {
        self.blocks_per_fetch().unwrap_or(self.last_blocks_per_fetch)
    }

    fn remember_threshold(&mut self) {
        if let Some(blocks_per_fetch) = self.blocks_per_fetch() {
            self.last_blocks_per_fetch = blocks_per_fetch;
        }
    }

    fn is_due(&self, block: u64) -> bool {
        let Some(blocks_per_fetch) = self.blocks_per_fetch() else {
            return false;
        };
        if self.in_flight.is_some_and(|requested| requested >= block) {
            return false;
        }
        if self.entry.invalidated {
            return true;
        }
        match (&self.entry.result, self.entry.fetched_block) {
            (CallResult::Success { .. }, Some(fetched)) => {
                block.saturating_sub(fetched) >= blocks_per_fetch
            }
            _ => true,
        }
    }

    fn publish(&self) {
        // Replacing works with zero receivers: late results still land in the cache.
        self.sender.send_replace(self.entry.clone());
    }
}

/// Block-driven cache of read-only contract calls.
///
/// Subscribers to the same signature share one registration and one fetch per
/// tick. All methods are synchronous; the session drives them from its loop
/// and performs the network reads in between.
pub struct CallCache {
    slots: HashMap<CallSignature, Slot>,
    subscriptions: HashMap<SubscriptionId, CallSignature>,
    next_id: SubscriptionId,
    epoch: u64,
    latest_block: Option<u64>,
    max_calls_per_batch: usize,
    aggregation_available: bool,
}

impl CallCache {
    pub fn new(max_calls_per_batch: usize, aggregation_available: bool) -> Self {
        Self {
            slots: HashMap::new(),
            subscriptions: HashMap::new(),
            next_id: 0,
            epoch: 0,
            latest_block: None,
            max_calls_per_batch,
            aggregation_available,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn latest_block(&self) -> Option<u64> {
        self.latest_block
    }

    pub fn subscribe(&mut self, signature: CallSignature, blocks_per_fetch: u64) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;

        let blocks_per_fetch = blocks_per_fetch.max(1);
        let slot = self
            .slots
            .entry(signature.clone())
            .or_insert_with(|| Slot::new(blocks_per_fetch));
        slot.listeners.insert(id, blocks_per_fetch);
        slot.remember_threshold();
        let receiver = slot.sender.subscribe();
        self.subscriptions.insert(id, signature.clone());

        tracing::trace!("Subscribed {id} to {signature}");

        Subscription {
            id,
            signature,
            receiver,
        }
    }

    /// Drops one interest. Returns `false` for unknown or already dropped ids.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(signature) = self.subscriptions.remove(&id) else {
            return false;
        };
        match self.slots.get_mut(&signature) {
            Some(slot) => {
                let removed = slot.listeners.remove(&id).is_some();
                slot.remember_threshold();
                removed
            }
            None => false,
        }
    }

    pub fn listener_count(&self, signature: &CallSignature) -> usize {
        self.slots
            .get(signature)
            .map_or(0, |slot| slot.listeners.len())
    }

    pub fn entry(&self, signature: &CallSignature) -> Option<CacheEntry> {
        self.slots.get(signature).map(|slot| slot.entry.clone())
    }

    /// Freshness of an entry at the latest observed block, using the
    /// smallest blocks-per-fetch among its subscribers. Once the last one
    /// leaves, the threshold it had stays in effect.
    pub fn is_fresh(&self, signature: &CallSignature) -> bool {
        let (Some(slot), Some(block)) = (self.slots.get(signature), self.latest_block) else {
            return false;
        };
        slot.entry.is_fresh(block, slot.freshness_threshold())
    }

    /// Every cached signature, ordered by target and method.
    pub fn snapshot(&self) -> Vec<EntrySnapshot> {
        let mut entries: Vec<EntrySnapshot> = self
            .slots
            .iter()
            .map(|(signature, slot)| EntrySnapshot {
                signature: signature.clone(),
                entry: slot.entry.clone(),
                listeners: slot.listeners.len(),
                fresh: self.is_fresh(signature),
            })
            .collect();
        entries.sort_by(|a, b| {
            a.signature
                .address()
                .cmp(&b.signature.address())
                .then_with(|| a.signature.method().cmp(b.signature.method()))
        });
        entries
    }

    /// Selects every subscribed signature due at `block`, marks it loading and
    /// returns the batches to fetch.
    pub fn tick(&mut self, block: u64) -> Vec<CallBatch> {
        self.latest_block = Some(self.latest_block.map_or(block, |latest| latest.max(block)));

        let mut due = Vec::new();
        for (signature, slot) in self.slots.iter_mut() {
            if !slot.is_due(block) {
                continue;
            }

            slot.in_flight = Some(block);
            slot.entry.fetching = true;
            if slot.entry.result == CallResult::Unstarted {
                slot.entry.result = CallResult::Loading;
            }
            slot.publish();

            due.push(DueCall {
                signature: signature.clone(),
                isolate: slot.isolate,
            });
        }

        if !due.is_empty() {
            tracing::debug!("Block {block}: {} calls due", due.len());
        }

        plan_batches(
            self.epoch,
            block,
            due,
            self.max_calls_per_batch,
            self.aggregation_available,
        )
    }

    /// Merges a fetch result. Returns whether the entry changed.
    ///
    /// Results from a previous session are dropped, and a result never
    /// replaces one observed at a higher block.
    pub fn complete(
        &mut self,
        epoch: u64,
        signature: &CallSignature,
        outcome: FetchOutcome,
    ) -> bool {
        if epoch != self.epoch {
            tracing::debug!("Dropping result for {signature} from session epoch {epoch}");
            return false;
        }
        let Some(slot) = self.slots.get_mut(signature) else {
            return false;
        };

        if slot
            .in_flight
            .is_some_and(|requested| requested <= outcome.block)
        {
            slot.in_flight = None;
        }

        let applied = match outcome.result {
            Ok(data) => {
                if slot
                    .entry
                    .fetched_block
                    .is_some_and(|fetched| fetched > outcome.block)
                {
                    false
                } else {
                    slot.entry.result = CallResult::Success {
                        data,
                        block: outcome.block,
                    };
                    slot.entry.fetched_block = Some(outcome.block);
                    if slot
                        .invalidated_at
                        .is_some_and(|invalidated| outcome.block >= invalidated)
                    {
                        slot.invalidated_at = None;
                    }
                    slot.entry.invalidated = slot.invalidated_at.is_some();
                    slot.isolate = false;
                    true
                }
            }
            Err(reason) => {
                let superseded = match &slot.entry.result {
                    CallResult::Success { block, .. } => *block >= outcome.block,
                    CallResult::Error { block, .. } => *block > outcome.block,
                    _ => false,
                };
                if superseded {
                    false
                } else {
                    tracing::debug!("Call {signature} failed at block {}: {reason}", outcome.block);
                    slot.entry.result = CallResult::Error {
                        reason,
                        block: outcome.block,
                    };
                    true
                }
            }
        };

        slot.entry.fetching = slot.in_flight.is_some();
        slot.publish();
        applied
    }

    /// Records a whole-batch failure. Every call of the batch reports the
    /// error and is retried on its own at the next tick.
    pub fn fail_batch(&mut self, batch: &CallBatch, reason: &str) -> usize {
        if batch.epoch != self.epoch {
            return 0;
        }

        let mut failed = 0;
        for signature in &batch.calls {
            if let Some(slot) = self.slots.get_mut(signature) {
                slot.isolate = true;
            }
            let outcome = FetchOutcome {
                block: batch.block,
                result: Err(reason.to_string()),
            };
            if self.complete(batch.epoch, signature, outcome) {
                failed += 1;
            }
        }
        failed
    }

    /// Marks every entry targeting `address` stale so it is refetched on the
    /// next tick. Values stay visible. Returns the number of entries touched.
    pub fn invalidate_address(&mut self, address: Address, block: u64) -> usize {
        let mut touched = 0;
        for (signature, slot) in self.slots.iter_mut() {
            if signature.address() != address {
                continue;
            }
            slot.invalidated_at = Some(slot.invalidated_at.map_or(block, |at| at.max(block)));
            slot.entry.invalidated = true;
            slot.publish();
            touched += 1;
        }
        tracing::debug!("Invalidated {touched} cached calls on {address}");
        touched
    }

    /// Forgets every entry and subscription and starts a new epoch.
    pub fn reset(&mut self) -> u64 {
        self.slots.clear();
        self.subscriptions.clear();
        self.latest_block = None;
        self.epoch += 1;
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicall::BatchMode;
    use crate::repository::Interface;
    use crate::repository::contract::{IERC20, IJacuzzi};
    use alloy::primitives::U256;
    use alloy::sol_types::SolValue;

    const TOKEN: Address = Address::repeat_byte(0xab);
    const JACUZZI: Address = Address::repeat_byte(0xcd);
    const ACCOUNT: Address = Address::repeat_byte(0x01);

    fn balance_of(token: Address, account: Address) -> CallSignature {
        CallSignature::of(token, Interface::Erc20, &IERC20::balanceOfCall { account })
    }

    fn ok(block: u64, value: u64) -> FetchOutcome {
        FetchOutcome {
            block,
            result: Ok(U256::from(value).abi_encode().into()),
        }
    }

    fn value_of(cache: &CallCache, signature: &CallSignature) -> Option<U256> {
        cache
            .entry(signature)
            .and_then(|entry| entry.decode::<IERC20::balanceOfCall>())
    }

    fn fetched_calls(batches: &[CallBatch]) -> Vec<CallSignature> {
        batches.iter().flat_map(|b| b.calls.clone()).collect()
    }

    #[test]
    fn test_subscribe_returns_unstarted_entry() {
        let mut cache = CallCache::new(100, true);
        let subscription = cache.subscribe(balance_of(TOKEN, ACCOUNT), 1);

        assert_eq!(subscription.current().result, CallResult::Unstarted);
        assert_eq!(cache.listener_count(subscription.signature()), 1);
    }

    #[test]
    fn test_balance_scenario_follows_new_blocks() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let subscription = cache.subscribe(signature.clone(), 1);

        let batches = cache.tick(10);
        assert_eq!(fetched_calls(&batches), vec![signature.clone()]);
        assert_eq!(subscription.current().result, CallResult::Loading);
        assert!(cache.complete(0, &signature, ok(10, 100)));
        assert_eq!(value_of(&cache, &signature), Some(U256::from(100)));

        let batches = cache.tick(11);
        assert_eq!(fetched_calls(&batches), vec![signature.clone()]);
        // The previous value stays visible while the refetch is in flight.
        let entry = subscription.current();
        assert!(entry.fetching);
        assert_eq!(
            entry.decode::<IERC20::balanceOfCall>(),
            Some(U256::from(100))
        );

        assert!(cache.complete(0, &signature, ok(11, 150)));
        let entry = subscription.current();
        assert_eq!(entry.fetched_block, Some(11));
        assert!(!entry.fetching);
        assert_eq!(
            entry.decode::<IERC20::balanceOfCall>(),
            Some(U256::from(150))
        );
    }

    #[test]
    fn test_shared_interest_issues_one_fetch() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let first = cache.subscribe(signature.clone(), 1);
        let second = cache.subscribe(signature.clone(), 3);
        assert_ne!(first.id(), second.id());

        let batches = cache.tick(5);
        assert_eq!(batches.len(), 1);
        assert_eq!(fetched_calls(&batches), vec![signature.clone()]);

        // Same block again: already in flight.
        assert!(cache.tick(5).is_empty());
    }

    #[test]
    fn test_blocks_per_fetch_uses_smallest_request() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let slow = cache.subscribe(signature.clone(), 5);

        cache.tick(10);
        cache.complete(0, &signature, ok(10, 1));
        assert!(cache.tick(12).is_empty());
        assert_eq!(fetched_calls(&cache.tick(15)), vec![signature.clone()]);
        cache.complete(0, &signature, ok(15, 1));

        let _fast = cache.subscribe(signature.clone(), 1);
        assert_eq!(fetched_calls(&cache.tick(16)), vec![signature.clone()]);

        assert!(cache.unsubscribe(slow.id()));
    }

    #[test]
    fn test_freshness_keeps_threshold_after_last_unsubscribe() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let subscription = cache.subscribe(signature.clone(), 5);

        cache.tick(10);
        cache.complete(0, &signature, ok(10, 1));
        assert!(cache.unsubscribe(subscription.id()));

        assert!(cache.tick(14).is_empty());
        assert!(cache.is_fresh(&signature));
        cache.tick(16);
        assert!(!cache.is_fresh(&signature));
    }

    #[test]
    fn test_out_of_order_completion_never_regresses() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let _subscription = cache.subscribe(signature.clone(), 1);

        cache.tick(100);
        cache.tick(105);

        assert!(cache.complete(0, &signature, ok(105, 2)));
        assert!(!cache.complete(0, &signature, ok(100, 1)));

        let entry = cache.entry(&signature).unwrap();
        assert_eq!(entry.fetched_block, Some(105));
        assert_eq!(value_of(&cache, &signature), Some(U256::from(2)));
    }

    #[test]
    fn test_failed_call_is_isolated_and_retried() {
        let mut cache = CallCache::new(100, true);
        let good = balance_of(TOKEN, ACCOUNT);
        let bad = balance_of(JACUZZI, ACCOUNT);
        let _a = cache.subscribe(good.clone(), 1);
        let _b = cache.subscribe(bad.clone(), 1);

        cache.tick(1);
        cache.complete(0, &good, ok(1, 7));
        cache.complete(
            0,
            &bad,
            FetchOutcome {
                block: 1,
                result: Err("execution reverted".to_string()),
            },
        );

        assert_eq!(value_of(&cache, &good), Some(U256::from(7)));
        assert!(matches!(
            cache.entry(&bad).unwrap().result,
            CallResult::Error { .. }
        ));

        // Errors are retried at the next block even though good values are still fresh.
        let retried = fetched_calls(&cache.tick(2));
        assert!(retried.contains(&bad));
    }

    #[test]
    fn test_whole_batch_failure_degrades_to_independent_reads() {
        let mut cache = CallCache::new(100, true);
        let a = balance_of(TOKEN, ACCOUNT);
        let b = balance_of(JACUZZI, ACCOUNT);
        let _sa = cache.subscribe(a.clone(), 1);
        let _sb = cache.subscribe(b.clone(), 1);

        let batches = cache.tick(1);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, BatchMode::Aggregated);
        assert_eq!(cache.fail_batch(&batches[0], "gateway timeout"), 2);

        let batches = cache.tick(2);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, BatchMode::Independent);
        assert_eq!(batches[0].calls.len(), 2);

        // A success clears the isolation flag.
        cache.complete(0, &a, ok(2, 1));
        cache.complete(0, &b, ok(2, 1));
        let batches = cache.tick(3);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].mode, BatchMode::Aggregated);
    }

    #[test]
    fn test_invalidation_touches_only_target_address() {
        let mut cache = CallCache::new(100, true);
        let on_token = balance_of(TOKEN, ACCOUNT);
        let also_on_token = CallSignature::of(TOKEN, Interface::Erc20, &IERC20::totalSupplyCall {});
        let on_jacuzzi = CallSignature::of(JACUZZI, Interface::Jacuzzi, &IJacuzzi::totalSupplyCall {});
        for signature in [&on_token, &also_on_token, &on_jacuzzi] {
            let _ = cache.subscribe(signature.clone(), 10);
        }

        cache.tick(1);
        for signature in [&on_token, &also_on_token, &on_jacuzzi] {
            cache.complete(0, signature, ok(1, 5));
        }
        assert!(cache.tick(2).is_empty());

        assert_eq!(cache.invalidate_address(TOKEN, 2), 2);
        assert!(cache.entry(&on_token).unwrap().invalidated);
        assert!(cache.entry(&also_on_token).unwrap().invalidated);
        assert!(!cache.entry(&on_jacuzzi).unwrap().invalidated);
        // Stale values remain visible.
        assert_eq!(value_of(&cache, &on_token), Some(U256::from(5)));

        let refetched = fetched_calls(&cache.tick(3));
        assert_eq!(refetched.len(), 2);
        assert!(!refetched.contains(&on_jacuzzi));

        cache.complete(0, &on_token, ok(3, 6));
        assert!(!cache.entry(&on_token).unwrap().invalidated);
    }

    #[test]
    fn test_result_older_than_invalidation_keeps_entry_stale() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let _s = cache.subscribe(signature.clone(), 1);

        cache.tick(10);
        cache.invalidate_address(TOKEN, 11);
        cache.complete(0, &signature, ok(10, 1));

        let entry = cache.entry(&signature).unwrap();
        assert_eq!(entry.fetched_block, Some(10));
        assert!(entry.invalidated);
    }

    #[test]
    fn test_unsubscribed_signature_keeps_value_but_stops_ticking() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let subscription = cache.subscribe(signature.clone(), 1);

        cache.tick(1);
        cache.complete(0, &signature, ok(1, 9));
        assert!(cache.unsubscribe(subscription.id()));
        assert!(!cache.unsubscribe(subscription.id()));

        assert!(cache.tick(2).is_empty());
        assert_eq!(value_of(&cache, &signature), Some(U256::from(9)));
    }

    #[test]
    fn test_result_arriving_after_last_unsubscribe_still_updates() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let subscription = cache.subscribe(signature.clone(), 1);

        cache.tick(1);
        cache.unsubscribe(subscription.id());
        drop(subscription);

        assert!(cache.complete(0, &signature, ok(1, 3)));
        assert_eq!(value_of(&cache, &signature), Some(U256::from(3)));
    }

    #[test]
    fn test_reset_discards_results_of_previous_session() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let _old = cache.subscribe(signature.clone(), 1);
        let batches = cache.tick(10);
        let old_epoch = batches[0].epoch;

        let new_epoch = cache.reset();
        assert_ne!(old_epoch, new_epoch);

        let fresh = cache.subscribe(signature.clone(), 1);
        assert!(!cache.complete(old_epoch, &signature, ok(10, 100)));
        assert_eq!(fresh.current().result, CallResult::Unstarted);
        assert_eq!(cache.fail_batch(&batches[0], "late"), 0);
    }

    #[test]
    fn test_is_fresh_uses_latest_block() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let _s = cache.subscribe(signature.clone(), 2);

        assert!(!cache.is_fresh(&signature));
        cache.tick(10);
        cache.complete(0, &signature, ok(10, 1));
        assert!(cache.is_fresh(&signature));

        // No subscriber needs it before block 12, and the view stays fresh until then.
        assert!(cache.tick(11).is_empty());
        assert!(cache.is_fresh(&signature));
        assert_eq!(fetched_calls(&cache.tick(12)).len(), 1);
        assert!(cache.is_fresh(&signature));

        // Block 12's read has not landed; by 13 the value is stale and refetched.
        assert_eq!(fetched_calls(&cache.tick(13)).len(), 1);
        assert!(!cache.is_fresh(&signature));
    }

    #[tokio::test]
    async fn test_subscribers_are_notified_on_mutation() {
        let mut cache = CallCache::new(100, true);
        let signature = balance_of(TOKEN, ACCOUNT);
        let mut subscription = cache.subscribe(signature.clone(), 1);

        cache.tick(1);
        assert!(subscription.changed().await);
        assert_eq!(subscription.current().result, CallResult::Loading);

        cache.complete(0, &signature, ok(1, 42));
        assert!(subscription.changed().await);
        assert_eq!(
            subscription.current().decode::<IERC20::balanceOfCall>(),
            Some(U256::from(42))
        );

        cache.reset();
        assert!(!subscription.changed().await);
    }

    #[test]
    fn test_snapshot_lists_entries_with_freshness() {
        let mut cache = CallCache::new(100, true);
        let fetched = balance_of(TOKEN, ACCOUNT);
        let pending = balance_of(JACUZZI, ACCOUNT);
        let _a = cache.subscribe(fetched.clone(), 1);
        let _b = cache.subscribe(pending.clone(), 1);
        let _c = cache.subscribe(pending.clone(), 1);

        cache.tick(5);
        cache.complete(0, &fetched, ok(5, 1));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        let by_signature = |signature: &CallSignature| {
            snapshot
                .iter()
                .find(|s| &s.signature == signature)
                .unwrap()
                .clone()
        };
        assert!(by_signature(&fetched).fresh);
        assert_eq!(by_signature(&fetched).listeners, 1);
        assert!(!by_signature(&pending).fresh);
        assert!(by_signature(&pending).entry.is_loading());
        assert_eq!(by_signature(&pending).listeners, 2);
    }
}
