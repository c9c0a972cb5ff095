use alloy::sol;

// Contract interfaces the client reads from and writes to.
sol! {
    /// Multicall3 aggregator.
    ///
    /// `tryBlockAndAggregate` with `requireSuccess = false` reports each call's
    /// outcome separately together with the block the batch executed at.
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call {
            address target;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function tryBlockAndAggregate(bool requireSuccess, Call[] calldata calls)
            external
            payable
            returns (uint256 blockNumber, bytes32 blockHash, Result[] memory returnData);

        function getBlockNumber() external view returns (uint256 blockNumber);

        function getEthBalance(address addr) external view returns (uint256 balance);
    }

    /// ERC20 token standard interface.
    #[sol(rpc)]
    interface IERC20 {
        function balanceOf(address account) external view returns (uint256);

        function decimals() external view returns (uint8);

        function symbol() external view returns (string memory);

        function name() external view returns (string memory);

        function totalSupply() external view returns (uint256);

        function allowance(address owner, address spender) external view returns (uint256);

        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// PARTY airdrop distributor.
    #[sol(rpc)]
    interface IAirdrop {
        /// Whether claims are currently open.
        function claimingAllowed() external view returns (bool);

        /// Amount the account may still withdraw.
        function withdrawAmount(address account) external view returns (uint96);

        function claim() external;
    }

    /// Jacuzzi staking pool: deposit the reward token, receive a share token.
    #[sol(rpc)]
    interface IJacuzzi {
        function totalSupply() external view returns (uint256);

        function balanceOf(address account) external view returns (uint256);

        /// Unix timestamp (seconds) after which leaving is not penalised.
        function unlockDate() external view returns (uint256);

        function earlyWithdrawalFee() external view returns (uint256);

        function MAX_EARLY_WITHDRAW_FEE() external view returns (uint256);

        function enter(uint256 amount) external;

        function leave(uint256 share) external;
    }

    /// Constant-product pair. `token0` sorts before `token1` by address.
    #[sol(rpc)]
    interface IPair {
        function getReserves()
            external
            view
            returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }
}
