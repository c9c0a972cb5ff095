use std::fmt;

use alloy::primitives::{Address, Bytes};
use alloy::sol_types::SolCall;

use crate::repository::{ChainCall, Interface};

/// Cache key of one read-only contract query.
///
/// Two signatures are equal when they target the same contract through the
/// same interface with the same method and encoded arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallSignature {
    address: Address,
    interface: Interface,
    signature: &'static str,
    calldata: Bytes,
}

impl CallSignature {
    pub fn of<C: SolCall>(address: Address, interface: Interface, call: &C) -> Self {
        Self {
            address,
            interface,
            signature: C::SIGNATURE,
            calldata: call.abi_encode().into(),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }

    /// Method name without argument types, e.g. `balanceOf`.
    pub fn method(&self) -> &'static str {
        self.signature
            .split_once('(')
            .map_or(self.signature, |(name, _)| name)
    }

    /// Full Solidity signature, e.g. `balanceOf(address)`.
    pub fn solidity_signature(&self) -> &'static str {
        self.signature
    }

    pub fn calldata(&self) -> &Bytes {
        &self.calldata
    }

    pub fn to_chain_call(&self) -> ChainCall {
        ChainCall {
            target: self.address,
            data: self.calldata.clone(),
        }
    }
}

impl fmt::Display for CallSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}.{}", self.interface, self.address, self.signature)
    }
}
