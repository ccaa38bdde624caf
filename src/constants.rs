//! Redemption constants.

use alloy::primitives::{Address, address};
use std::time::Duration;

/// The canonical ERC-4337 v0.7 entry point.
pub const ENTRYPOINT_V07: Address = address!("0x0000000071727De22E5E9d8BAf0edAc6f37da032");

/// The delegation manager of the MetaMask delegation framework v1.3.0.
pub const DELEGATION_MANAGER: Address = address!("0xdb9B1e94B5b69Df7e401DDbedE43491141047dB3");

/// The timestamp caveat enforcer of the MetaMask delegation framework v1.3.0.
pub const TIMESTAMP_ENFORCER: Address = address!("0x1046bb45C8d673d4ea75321280DB34899413c069");

/// EIP-712 domain name of the delegation manager.
pub const DELEGATION_MANAGER_NAME: &str = "DelegationManager";

/// EIP-712 domain version of the delegation manager.
pub const DELEGATION_MANAGER_VERSION: &str = "1";

/// Number of attempts made to hand a user operation to the bundler.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Delay before the first resubmission. Doubles on every further attempt.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Interval between user operation receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for a user operation to be included.
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long an unused submission record is kept for deduplication.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(60 * 60);

/// Timeout of a single request to a bundler or paymaster.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(10);

/// The default RPC server port.
pub const DEFAULT_PORT: u16 = 50051;

/// The default metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 9000;

/// The default maximum number of RPC connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5000;
