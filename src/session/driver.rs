use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Session;
use crate::repository::ChainRepository;

/// Background loop feeding the session with chain events.
///
/// Every block interval the latest block number is read and, when it moved,
/// the cache is ticked and each batch is fetched on its own task so the loop
/// never waits on reads. Every receipt interval pending transactions are
/// checked. Polling continues until the token is cancelled.
pub struct SessionDriver {
    session: Arc<Session>,
    repository: Arc<dyn ChainRepository>,
    block_interval: Duration,
    receipt_interval: Duration,
    last_block: Option<u64>,
}

impl SessionDriver {
    pub fn new(
        session: Arc<Session>,
        repository: Arc<dyn ChainRepository>,
        block_interval: Duration,
        receipt_interval: Duration,
    ) -> Self {
        Self {
            session,
            repository,
            block_interval,
            receipt_interval,
            last_block: None,
        }
    }

    pub async fn run(mut self, token: CancellationToken) {
        let mut blocks = tokio::time::interval(self.block_interval);
        blocks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut receipts = tokio::time::interval(self.receipt_interval);
        receipts.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Session driver started (blocks every {:?}, receipts every {:?})",
            self.block_interval,
            self.receipt_interval
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("Session driver stopped");
                    break;
                }
                _ = blocks.tick() => {
                    self.poll_block().await;
                }
                _ = receipts.tick() => {
                    let session = self.session.clone();
                    tokio::spawn(async move {
                        session.poll_receipts().await;
                    });
                }
            }
        }
    }

    /// Reads the block number and, on a new block, spawns the due fetches.
    /// Returns the number of batches spawned.
    pub async fn poll_block(&mut self) -> usize {
        let block = match self.repository.block_number().await {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!("Failed to read block number: {}", e);
                return 0;
            }
        };
        if self.last_block.is_some_and(|last| block <= last) {
            return 0;
        }
        self.last_block = Some(block);

        let batches = self.session.on_block(block).await;
        let spawned = batches.len();
        for batch in batches {
            let session = self.session.clone();
            tokio::spawn(async move {
                session.fetch_batch(batch).await;
            });
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multicall::CallResult;
    use crate::repository::contract::IERC20;
    use crate::repository::mock::MockChain;
    use crate::repository::{ContractHandle, Interface};
    use crate::session::{SessionKey, SessionSettings};
    use alloy::primitives::{Address, U256};

    const TOKEN: Address = Address::repeat_byte(0x70);
    const ACCOUNT: Address = Address::repeat_byte(0x01);

    fn setup() -> (Arc<MockChain>, Arc<Session>, SessionDriver) {
        let chain = Arc::new(MockChain::new(true, None));
        let session = Arc::new(Session::new(
            chain.clone(),
            SessionKey {
                account: Some(ACCOUNT),
                chain_id: 43114,
            },
            SessionSettings::default(),
        ));
        let driver = SessionDriver::new(
            session.clone(),
            chain.clone(),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        (chain, session, driver)
    }

    #[tokio::test]
    async fn test_poll_block_ticks_only_on_new_blocks() {
        let (chain, session, mut driver) = setup();
        let call = IERC20::balanceOfCall { account: ACCOUNT };
        chain.respond(TOKEN, &call, &U256::from(3));
        let signature = ContractHandle::bind(Some(TOKEN), Interface::Erc20, None, false)
            .unwrap()
            .read(&call);
        let mut subscription = session.subscribe(signature, None).await;

        chain.set_block(5);
        assert_eq!(driver.poll_block().await, 1);
        // Same block again: nothing to do.
        assert_eq!(driver.poll_block().await, 0);

        while !subscription.current().result.is_success() {
            assert!(subscription.changed().await);
        }
        assert_eq!(
            subscription.current().result,
            CallResult::Success {
                data: U256::from(3).to_be_bytes_vec().into(),
                block: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (chain, _session, driver) = setup();
        chain.set_block(1);
        let token = CancellationToken::new();

        let handle = tokio::spawn(driver.run(token.clone()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("driver did not stop")
            .unwrap();
    }
}
