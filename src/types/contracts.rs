//! Contract interfaces the redeemer talks to.
use alloy::sol;

sol! {
    /// ERC-7579 execution struct.
    #[derive(Debug, Default, PartialEq, Eq)]
    struct Execution {
        /// The call target.
        address target;
        /// Amount of native value to send to the target.
        uint256 value;
        /// The calldata bytes.
        bytes callData;
    }

    /// The delegation manager redeeming delegation chains.
    interface IDelegationManager {
        /// Redeems each permission context and runs its execution calldata under `modes`.
        ///
        /// A permission context is `abi.encode(Delegation[])`, ordered leaf-first.
        function redeemDelegations(
            bytes[] calldata permissionContexts,
            bytes32[] calldata modes,
            bytes[] calldata executionCallDatas
        ) external;
    }

    /// The submitting smart account.
    interface ISmartAccount {
        /// ERC-7579 execution entry point.
        function execute(bytes32 mode, bytes calldata executionCalldata) external payable;
    }

    /// ERC-4337 v0.7 entry point.
    #[sol(rpc)]
    interface IEntryPoint {
        /// Returns the next nonce of `sender` for the given nonce key.
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce);
    }

    /// Minimal ERC-20 interface.
    interface IERC20 {
        /// Transfers `amount` tokens to `to`.
        function transfer(address to, uint256 amount) external returns (bool);
    }
}
