use alloy::primitives::Bytes;
use alloy::sol_types::SolCall;

/// Latest known state of one call signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CallResult {
    /// Nobody has asked for a fetch yet.
    #[default]
    Unstarted,
    /// The first fetch is in flight and nothing has been observed yet.
    Loading,
    Success { data: Bytes, block: u64 },
    Error { reason: String, block: u64 },
}

impl CallResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CallResult::Success { .. })
    }
}

/// Whether a value fetched at `fetched_block` may still be served at `current_block`.
pub fn is_fresh_at(current_block: u64, fetched_block: u64, blocks_per_fetch: u64) -> bool {
    current_block.saturating_sub(fetched_block) <= blocks_per_fetch
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheEntry {
    pub result: CallResult,
    /// Block of the latest successful fetch.
    pub fetched_block: Option<u64>,
    /// A fetch for this signature is in flight. The previous result stays visible.
    pub fetching: bool,
    /// A confirmed transaction touched the target contract since the last fetch.
    pub invalidated: bool,
}

impl CacheEntry {
    pub fn is_loading(&self) -> bool {
        matches!(self.result, CallResult::Loading) || self.fetching
    }

    pub fn is_fresh(&self, current_block: u64, blocks_per_fetch: u64) -> bool {
        if self.invalidated || !self.result.is_success() {
            return false;
        }
        self.fetched_block
            .is_some_and(|fetched| is_fresh_at(current_block, fetched, blocks_per_fetch))
    }

    pub fn data(&self) -> Option<&Bytes> {
        match &self.result {
            CallResult::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Decodes the return value of a successful call, `None` otherwise.
    pub fn decode<C: SolCall>(&self) -> Option<C::Return> {
        let data = self.data()?;
        match C::abi_decode_returns(data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Failed to decode {} result: {}", C::SIGNATURE, e);
                None
            }
        }
    }
}
