use std::fmt;

use alloy::primitives::Address;
use alloy::sol_types::SolCall;

use crate::multicall::CallSignature;
use crate::repository::{RepoResult, RepositoryError, WriteRequest};

/// Contract interfaces the client knows how to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Interface {
    Multicall,
    Erc20,
    Airdrop,
    Jacuzzi,
    Pair,
}

impl Interface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interface::Multicall => "multicall3",
            Interface::Erc20 => "erc20",
            Interface::Airdrop => "airdrop",
            Interface::Jacuzzi => "jacuzzi",
            Interface::Pair => "pair",
        }
    }
}

impl fmt::Display for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A contract bound to the current account.
///
/// Reads produce cache keys, writes produce unsigned requests for the
/// configured wallet. A handle is only signing when it was bound with
/// `with_signer_if_possible` and an account was connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractHandle {
    address: Address,
    interface: Interface,
    signer: Option<Address>,
}

impl ContractHandle {
    /// Returns `None` when the contract is not deployed on the current chain.
    pub fn bind(
        address: Option<Address>,
        interface: Interface,
        account: Option<Address>,
        with_signer_if_possible: bool,
    ) -> Option<Self> {
        let address = address?;
        let signer = if with_signer_if_possible {
            account
        } else {
            None
        };
        Some(Self {
            address,
            interface,
            signer,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn interface(&self) -> Interface {
        self.interface
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn read<C: SolCall>(&self, call: &C) -> CallSignature {
        CallSignature::of(self.address, self.interface, call)
    }

    pub fn write<C: SolCall>(&self, call: &C) -> RepoResult<WriteRequest> {
        let from = self.signer.ok_or_else(|| {
            RepositoryError::NoSigner(format!("{} at {}", self.interface, self.address))
        })?;

        Ok(WriteRequest {
            from,
            to: self.address,
            data: call.abi_encode().into(),
            gas_limit: None,
            gas_price: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::contract::{IAirdrop, IERC20};

    const TOKEN: Address = Address::repeat_byte(0x11);
    const ACCOUNT: Address = Address::repeat_byte(0xaa);

    #[test]
    fn test_bind_without_address_yields_none() {
        assert!(ContractHandle::bind(None, Interface::Erc20, Some(ACCOUNT), true).is_none());
    }

    #[test]
    fn test_signer_only_when_requested_and_connected() {
        let signing = ContractHandle::bind(Some(TOKEN), Interface::Erc20, Some(ACCOUNT), true)
            .expect("bound");
        assert_eq!(signing.signer(), Some(ACCOUNT));

        let read_only = ContractHandle::bind(Some(TOKEN), Interface::Erc20, Some(ACCOUNT), false)
            .expect("bound");
        assert_eq!(read_only.signer(), None);

        let disconnected =
            ContractHandle::bind(Some(TOKEN), Interface::Erc20, None, true).expect("bound");
        assert_eq!(disconnected.signer(), None);
    }

    #[test]
    fn test_read_builds_signature_for_target() {
        let handle =
            ContractHandle::bind(Some(TOKEN), Interface::Erc20, None, false).expect("bound");
        let signature = handle.read(&IERC20::balanceOfCall { account: ACCOUNT });

        assert_eq!(signature.address(), TOKEN);
        assert_eq!(signature.interface(), Interface::Erc20);
        assert_eq!(signature.method(), "balanceOf");
        assert_eq!(signature.solidity_signature(), "balanceOf(address)");
    }

    #[test]
    fn test_write_requires_signer() {
        let handle =
            ContractHandle::bind(Some(TOKEN), Interface::Airdrop, None, true).expect("bound");
        let result = handle.write(&IAirdrop::claimCall {});
        assert!(matches!(result, Err(RepositoryError::NoSigner(_))));

        let handle = ContractHandle::bind(Some(TOKEN), Interface::Airdrop, Some(ACCOUNT), true)
            .expect("bound");
        let request = handle.write(&IAirdrop::claimCall {}).expect("signing handle");
        assert_eq!(request.from, ACCOUNT);
        assert_eq!(request.to, TOKEN);
        assert_eq!(&request.data[..4], &IAirdrop::claimCall::SELECTOR);
    }
}
