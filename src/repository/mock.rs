//! Scripted in-memory chain used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, Bytes, TxHash};
use alloy::sol_types::SolCall;
use async_trait::async_trait;

use super::{
    AggregateResult, CallReturn, ChainCall, ChainRepository, ReceiptInfo, RepoResult,
    RepositoryError, WriteRequest,
};

#[derive(Default)]
struct MockState {
    block: u64,
    responses: HashMap<(Address, Bytes), Result<Bytes, String>>,
    aggregate_error: Option<String>,
    aggregate_requests: Vec<(u64, Vec<ChainCall>)>,
    call_requests: Vec<(u64, ChainCall)>,
    receipts: HashMap<TxHash, ReceiptInfo>,
    receipt_requests: Vec<TxHash>,
    estimate_error: Option<String>,
    estimated_gas: u64,
    sent: Vec<WriteRequest>,
    sent_hashes: Vec<TxHash>,
}

pub(crate) struct MockChain {
    chain_id: u64,
    aggregation: bool,
    signer: Option<Address>,
    state: Mutex<MockState>,
}

impl MockChain {
    pub(crate) fn new(aggregation: bool, signer: Option<Address>) -> Self {
        Self {
            chain_id: 43114,
            aggregation,
            signer,
            state: Mutex::new(MockState {
                estimated_gas: 100_000,
                ..Default::default()
            }),
        }
    }

    pub(crate) fn set_block(&self, block: u64) {
        self.state.lock().unwrap().block = block;
    }

    /// Scripts the return value of `call` against `target`.
    pub(crate) fn respond<C: SolCall>(&self, target: Address, call: &C, returns: &C::Return) {
        let data: Bytes = C::abi_encode_returns(returns).into();
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((target, call.abi_encode().into()), Ok(data));
    }

    pub(crate) fn revert<C: SolCall>(&self, target: Address, call: &C, reason: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert((target, call.abi_encode().into()), Err(reason.to_string()));
    }

    pub(crate) fn fail_aggregate(&self, reason: Option<&str>) {
        self.state.lock().unwrap().aggregate_error = reason.map(str::to_string);
    }

    pub(crate) fn fail_estimate(&self, reason: Option<&str>) {
        self.state.lock().unwrap().estimate_error = reason.map(str::to_string);
    }

    pub(crate) fn set_receipt(&self, hash: TxHash, receipt: ReceiptInfo) {
        self.state.lock().unwrap().receipts.insert(hash, receipt);
    }

    pub(crate) fn aggregate_requests(&self) -> Vec<(u64, Vec<ChainCall>)> {
        self.state.lock().unwrap().aggregate_requests.clone()
    }

    pub(crate) fn call_requests(&self) -> Vec<(u64, ChainCall)> {
        self.state.lock().unwrap().call_requests.clone()
    }

    pub(crate) fn receipt_requests(&self) -> Vec<TxHash> {
        self.state.lock().unwrap().receipt_requests.clone()
    }

    pub(crate) fn sent(&self) -> Vec<WriteRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_hashes(&self) -> Vec<TxHash> {
        self.state.lock().unwrap().sent_hashes.clone()
    }

    fn lookup(state: &MockState, call: &ChainCall) -> Result<Bytes, String> {
        state
            .responses
            .get(&(call.target, call.data.clone()))
            .cloned()
            .unwrap_or_else(|| Err("execution reverted".to_string()))
    }
}

#[async_trait]
impl ChainRepository for MockChain {
    async fn chain_id(&self) -> RepoResult<u64> {
        Ok(self.chain_id)
    }

    async fn block_number(&self) -> RepoResult<u64> {
        Ok(self.state.lock().unwrap().block)
    }

    fn supports_aggregation(&self) -> bool {
        self.aggregation
    }

    async fn aggregate(&self, block: u64, calls: &[ChainCall]) -> RepoResult<AggregateResult> {
        if !self.aggregation {
            return Err(RepositoryError::AggregationUnavailable);
        }
        let mut state = self.state.lock().unwrap();
        state.aggregate_requests.push((block, calls.to_vec()));
        if let Some(reason) = &state.aggregate_error {
            return Err(RepositoryError::ContractError(reason.clone()));
        }

        let returns = calls
            .iter()
            .map(|call| match Self::lookup(&state, call) {
                Ok(data) => CallReturn {
                    success: true,
                    data,
                },
                Err(_) => CallReturn {
                    success: false,
                    data: Bytes::new(),
                },
            })
            .collect();
        Ok(AggregateResult { block, returns })
    }

    async fn call(&self, block: u64, call: &ChainCall) -> RepoResult<Bytes> {
        let mut state = self.state.lock().unwrap();
        state.call_requests.push((block, call.clone()));
        Self::lookup(&state, call).map_err(RepositoryError::ContractError)
    }

    async fn transaction_receipt(&self, hash: TxHash) -> RepoResult<Option<ReceiptInfo>> {
        let mut state = self.state.lock().unwrap();
        state.receipt_requests.push(hash);
        Ok(state.receipts.get(&hash).copied())
    }

    async fn estimate_gas(&self, request: &WriteRequest) -> RepoResult<u64> {
        if self.signer != Some(request.from) {
            return Err(RepositoryError::NoSigner(request.from.to_string()));
        }
        let state = self.state.lock().unwrap();
        match &state.estimate_error {
            Some(reason) => Err(RepositoryError::ContractError(reason.clone())),
            None => Ok(state.estimated_gas),
        }
    }

    async fn send_transaction(&self, request: WriteRequest) -> RepoResult<TxHash> {
        if self.signer != Some(request.from) {
            return Err(RepositoryError::NoSigner(request.from.to_string()));
        }
        let mut state = self.state.lock().unwrap();
        let hash = TxHash::repeat_byte(0xe0 + state.sent.len() as u8);
        state.sent.push(request);
        state.sent_hashes.push(hash);
        Ok(hash)
    }

    fn signer_address(&self) -> Option<Address> {
        self.signer
    }
}
