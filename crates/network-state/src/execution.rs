//! Execution Accounting Accessors
//!
//! Typed reads against the protocol contracts. Every call takes the execution
//! block number it must be evaluated at, so one snapshot never mixes state
//! from different blocks.

use crate::types::{
    PoolThreshold, RewardCycleDetails, RewardShare, ValidatorContractInfo, ValidatorPubkey,
};
use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    sol,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

// Read-only bindings for the protocol contracts
sol! {
    #[sol(rpc)]
    contract PermissionlessNodeRegistry {
        function operatorIDByAddress(address operator) external view returns (uint256);
        function getOperatorTotalKeys(uint256 operatorId) external view returns (uint256);
        function getOperatorTotalNonTerminalKeys(
            address nodeOperator,
            uint256 startIndex,
            uint256 endIndex
        ) external view returns (uint64);
        function validatorIdsByOperatorId(uint256 operatorId, uint256 index)
            external view returns (uint256);
        function validatorRegistry(uint256 validatorId) external view returns (
            uint8 status,
            bytes pubkey,
            bytes preDepositSignature,
            bytes depositSignature,
            address withdrawVaultAddress,
            uint256 operatorId,
            uint256 depositBlock,
            uint256 withdrawnBlock
        );
        function nextOperatorId() external view returns (uint256);
        function nextValidatorId() external view returns (uint256);
        function getTotalActiveValidatorCount() external view returns (uint256);
        function getTotalQueuedValidatorCount() external view returns (uint256);
    }

    #[sol(rpc)]
    contract VaultFactory {
        function computeNodeELRewardVaultAddress(uint8 poolId, uint256 operatorId)
            external view returns (address);
    }

    #[sol(rpc)]
    contract PoolUtils {
        function calculateRewardShare(uint8 poolId, uint256 totalRewards) external view returns (
            uint256 userShare,
            uint256 operatorShare,
            uint256 protocolShare
        );
    }

    #[sol(rpc)]
    contract SDCollateral {
        function operatorSDBalance(address operator) external view returns (uint256);
        function convertETHToSD(uint256 ethAmount) external view returns (uint256);
        function totalSDCollateral() external view returns (uint256);
        function poolThresholdbyPoolId(uint8 poolId) external view returns (
            uint256 minThreshold,
            uint256 maxThreshold,
            uint256 withdrawThreshold,
            string units
        );
    }

    #[sol(rpc)]
    contract PenaltyTracker {
        function totalPenaltyAmount(bytes pubkey) external view returns (uint256);
    }

    #[sol(rpc)]
    contract StaderConfig {
        function getRewardsThreshold() external view returns (uint256);
    }

    #[sol(rpc)]
    contract SocializingPool {
        function getRewardDetails() external view returns (
            uint256 currentIndex,
            uint256 currentStartBlock,
            uint256 currentEndBlock
        );
        function claimedRewards(address operator, uint256 index) external view returns (bool);
    }

    #[sol(rpc)]
    contract ERC20 {
        function totalSupply() external view returns (uint256);
    }

    #[sol(rpc)]
    contract StakePoolManager {
        function totalAssets() external view returns (uint256);
    }
}

/// Errors from execution-chain reads
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Contract call failed: {0}")]
    Contract(#[from] alloy::contract::Error),

    #[error("RPC transport error: {0}")]
    Transport(#[from] alloy::transports::TransportError),

    #[error("Invalid RPC URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Protocol contract addresses, resolved from configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    pub permissionless_node_registry: Address,
    pub vault_factory: Address,
    pub sd_collateral: Address,
    pub ethx_token: Address,
    pub penalty_tracker: Address,
    pub stake_pool_manager: Address,
    pub pool_utils: Address,
    pub stader_config: Address,
    pub socializing_pool: Address,
}

/// Read-only protocol accounting on the execution chain
#[async_trait]
pub trait ExecutionAccessor: Send + Sync {
    /// Registry id of the operator owning `node`; zero when unregistered
    async fn operator_id(&self, node: Address, block: u64) -> Result<u64, ExecutionError>;

    /// Address of the operator's execution-layer reward vault
    async fn operator_el_reward_vault(
        &self,
        pool_id: u8,
        operator_id: u64,
        block: u64,
    ) -> Result<Address, ExecutionError>;

    /// ETH balance of any account
    async fn eth_balance(&self, address: Address, block: u64) -> Result<U256, ExecutionError>;

    /// Split of `total_rewards` under the pool's fee configuration
    async fn calculate_reward_share(
        &self,
        pool_id: u8,
        total_rewards: U256,
        block: u64,
    ) -> Result<RewardShare, ExecutionError>;

    async fn operator_sd_balance(&self, node: Address, block: u64) -> Result<U256, ExecutionError>;

    async fn total_validator_keys(&self, operator_id: u64, block: u64)
        -> Result<u64, ExecutionError>;

    async fn total_non_terminal_keys(
        &self,
        node: Address,
        total_keys: u64,
        block: u64,
    ) -> Result<u64, ExecutionError>;

    /// Validator id at position `index` of the operator's key list
    async fn validator_id_by_operator_id(
        &self,
        operator_id: u64,
        index: u64,
        block: u64,
    ) -> Result<u64, ExecutionError>;

    async fn validator_info(
        &self,
        validator_id: u64,
        block: u64,
    ) -> Result<ValidatorContractInfo, ExecutionError>;

    async fn cumulative_validator_penalty(
        &self,
        pubkey: ValidatorPubkey,
        block: u64,
    ) -> Result<U256, ExecutionError>;

    /// Operator share above which withdraw-vault balances are not counted as rewards
    async fn rewards_threshold(&self, block: u64) -> Result<U256, ExecutionError>;

    async fn reward_cycle_details(&self, block: u64) -> Result<RewardCycleDetails, ExecutionError>;

    async fn has_claimed_rewards(
        &self,
        node: Address,
        cycle: u64,
        block: u64,
    ) -> Result<bool, ExecutionError>;

    async fn convert_eth_to_sd(&self, eth_amount: U256, block: u64) -> Result<U256, ExecutionError>;

    async fn next_operator_id(&self, block: u64) -> Result<u64, ExecutionError>;

    async fn next_validator_id(&self, block: u64) -> Result<u64, ExecutionError>;

    async fn total_active_validators(&self, block: u64) -> Result<u64, ExecutionError>;

    async fn total_queued_validators(&self, block: u64) -> Result<u64, ExecutionError>;

    async fn total_sd_collateral(&self, block: u64) -> Result<U256, ExecutionError>;

    async fn pool_threshold(&self, pool_id: u8, block: u64)
        -> Result<PoolThreshold, ExecutionError>;

    async fn ethx_total_supply(&self, block: u64) -> Result<U256, ExecutionError>;

    /// ETH staked by users through the stake pool manager
    async fn total_staked_assets(&self, block: u64) -> Result<U256, ExecutionError>;
}

/// JSON-RPC backed accessor using the generated contract bindings
#[derive(Clone)]
pub struct ContractAccessor {
    provider: DynProvider,
    addresses: ContractAddresses,
}

impl ContractAccessor {
    /// Connect to an execution node over HTTP
    ///
    /// # Errors
    /// Returns an error if `rpc_url` is not a valid URL
    pub fn new(rpc_url: &str, addresses: ContractAddresses) -> Result<Self, ExecutionError> {
        let url: reqwest::Url = rpc_url
            .parse()
            .map_err(|e| ExecutionError::InvalidUrl(format!("{rpc_url}: {e}")))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self::with_provider(provider, addresses))
    }

    /// Wrap an existing provider
    #[must_use]
    pub fn with_provider(provider: DynProvider, addresses: ContractAddresses) -> Self {
        Self {
            provider,
            addresses,
        }
    }

    /// Configured contract addresses
    #[must_use]
    pub fn addresses(&self) -> &ContractAddresses {
        &self.addresses
    }

    fn registry(&self) -> PermissionlessNodeRegistry::PermissionlessNodeRegistryInstance<&DynProvider> {
        PermissionlessNodeRegistry::new(self.addresses.permissionless_node_registry, &self.provider)
    }

    fn sd_collateral(&self) -> SDCollateral::SDCollateralInstance<&DynProvider> {
        SDCollateral::new(self.addresses.sd_collateral, &self.provider)
    }
}

fn at(block: u64) -> BlockId {
    BlockId::number(block)
}

/// Narrow an on-chain counter to `u64`
///
/// # Errors
/// Returns an error if the value does not fit
pub fn u256_to_u64(field: &str, value: U256) -> Result<u64, ExecutionError> {
    u64::try_from(value)
        .map_err(|_| ExecutionError::InvalidResponse(format!("{field} {value} exceeds u64")))
}

#[async_trait]
impl ExecutionAccessor for ContractAccessor {
    #[instrument(skip(self))]
    async fn operator_id(&self, node: Address, block: u64) -> Result<u64, ExecutionError> {
        let id = self.registry().operatorIDByAddress(node).block(at(block)).call().await?;
        u256_to_u64("operator id", id)
    }

    #[instrument(skip(self))]
    async fn operator_el_reward_vault(
        &self,
        pool_id: u8,
        operator_id: u64,
        block: u64,
    ) -> Result<Address, ExecutionError> {
        let factory = VaultFactory::new(self.addresses.vault_factory, &self.provider);
        Ok(factory
            .computeNodeELRewardVaultAddress(pool_id, U256::from(operator_id))
            .block(at(block))
            .call()
            .await?)
    }

    #[instrument(skip(self))]
    async fn eth_balance(&self, address: Address, block: u64) -> Result<U256, ExecutionError> {
        Ok(self.provider.get_balance(address).block_id(at(block)).await?)
    }

    #[instrument(skip(self))]
    async fn calculate_reward_share(
        &self,
        pool_id: u8,
        total_rewards: U256,
        block: u64,
    ) -> Result<RewardShare, ExecutionError> {
        let utils = PoolUtils::new(self.addresses.pool_utils, &self.provider);
        let share = utils
            .calculateRewardShare(pool_id, total_rewards)
            .block(at(block))
            .call()
            .await?;
        Ok(RewardShare {
            user_share: share.userShare,
            operator_share: share.operatorShare,
            protocol_share: share.protocolShare,
        })
    }

    #[instrument(skip(self))]
    async fn operator_sd_balance(&self, node: Address, block: u64) -> Result<U256, ExecutionError> {
        Ok(self.sd_collateral().operatorSDBalance(node).block(at(block)).call().await?)
    }

    #[instrument(skip(self))]
    async fn total_validator_keys(
        &self,
        operator_id: u64,
        block: u64,
    ) -> Result<u64, ExecutionError> {
        let keys = self
            .registry()
            .getOperatorTotalKeys(U256::from(operator_id))
            .block(at(block))
            .call()
            .await?;
        u256_to_u64("total keys", keys)
    }

    #[instrument(skip(self))]
    async fn total_non_terminal_keys(
        &self,
        node: Address,
        total_keys: u64,
        block: u64,
    ) -> Result<u64, ExecutionError> {
        Ok(self
            .registry()
            .getOperatorTotalNonTerminalKeys(node, U256::ZERO, U256::from(total_keys))
            .block(at(block))
            .call()
            .await?)
    }

    #[instrument(skip(self))]
    async fn validator_id_by_operator_id(
        &self,
        operator_id: u64,
        index: u64,
        block: u64,
    ) -> Result<u64, ExecutionError> {
        let id = self
            .registry()
            .validatorIdsByOperatorId(U256::from(operator_id), U256::from(index))
            .block(at(block))
            .call()
            .await?;
        u256_to_u64("validator id", id)
    }

    #[instrument(skip(self))]
    async fn validator_info(
        &self,
        validator_id: u64,
        block: u64,
    ) -> Result<ValidatorContractInfo, ExecutionError> {
        let record = self
            .registry()
            .validatorRegistry(U256::from(validator_id))
            .block(at(block))
            .call()
            .await?;
        let pubkey = ValidatorPubkey::from_slice(&record.pubkey)
            .map_err(|e| ExecutionError::InvalidResponse(format!("validator {validator_id}: {e}")))?;
        debug!(validator_id, %pubkey, status = record.status, "Fetched validator record");

        Ok(ValidatorContractInfo {
            status: record.status.into(),
            pubkey,
            withdraw_vault_address: record.withdrawVaultAddress,
            operator_id: u256_to_u64("operator id", record.operatorId)?,
        })
    }

    #[instrument(skip(self))]
    async fn cumulative_validator_penalty(
        &self,
        pubkey: ValidatorPubkey,
        block: u64,
    ) -> Result<U256, ExecutionError> {
        let tracker = PenaltyTracker::new(self.addresses.penalty_tracker, &self.provider);
        Ok(tracker
            .totalPenaltyAmount(Bytes::copy_from_slice(pubkey.as_bytes()))
            .block(at(block))
            .call()
            .await?)
    }

    #[instrument(skip(self))]
    async fn rewards_threshold(&self, block: u64) -> Result<U256, ExecutionError> {
        let config = StaderConfig::new(self.addresses.stader_config, &self.provider);
        Ok(config.getRewardsThreshold().block(at(block)).call().await?)
    }

    #[instrument(skip(self))]
    async fn reward_cycle_details(&self, block: u64) -> Result<RewardCycleDetails, ExecutionError> {
        let pool = SocializingPool::new(self.addresses.socializing_pool, &self.provider);
        let details = pool.getRewardDetails().block(at(block)).call().await?;
        Ok(RewardCycleDetails {
            current_index: u256_to_u64("current index", details.currentIndex)?,
            current_start_block: u256_to_u64("start block", details.currentStartBlock)?,
            current_end_block: u256_to_u64("end block", details.currentEndBlock)?,
        })
    }

    #[instrument(skip(self))]
    async fn has_claimed_rewards(
        &self,
        node: Address,
        cycle: u64,
        block: u64,
    ) -> Result<bool, ExecutionError> {
        let pool = SocializingPool::new(self.addresses.socializing_pool, &self.provider);
        Ok(pool
            .claimedRewards(node, U256::from(cycle))
            .block(at(block))
            .call()
            .await?)
    }

    #[instrument(skip(self))]
    async fn convert_eth_to_sd(&self, eth_amount: U256, block: u64) -> Result<U256, ExecutionError> {
        Ok(self.sd_collateral().convertETHToSD(eth_amount).block(at(block)).call().await?)
    }

    #[instrument(skip(self))]
    async fn next_operator_id(&self, block: u64) -> Result<u64, ExecutionError> {
        let id = self.registry().nextOperatorId().block(at(block)).call().await?;
        u256_to_u64("next operator id", id)
    }

    #[instrument(skip(self))]
    async fn next_validator_id(&self, block: u64) -> Result<u64, ExecutionError> {
        let id = self.registry().nextValidatorId().block(at(block)).call().await?;
        u256_to_u64("next validator id", id)
    }

    #[instrument(skip(self))]
    async fn total_active_validators(&self, block: u64) -> Result<u64, ExecutionError> {
        let count = self
            .registry()
            .getTotalActiveValidatorCount()
            .block(at(block))
            .call()
            .await?;
        u256_to_u64("active validators", count)
    }

    #[instrument(skip(self))]
    async fn total_queued_validators(&self, block: u64) -> Result<u64, ExecutionError> {
        let count = self
            .registry()
            .getTotalQueuedValidatorCount()
            .block(at(block))
            .call()
            .await?;
        u256_to_u64("queued validators", count)
    }

    #[instrument(skip(self))]
    async fn total_sd_collateral(&self, block: u64) -> Result<U256, ExecutionError> {
        Ok(self.sd_collateral().totalSDCollateral().block(at(block)).call().await?)
    }

    #[instrument(skip(self))]
    async fn pool_threshold(
        &self,
        pool_id: u8,
        block: u64,
    ) -> Result<PoolThreshold, ExecutionError> {
        let threshold = self
            .sd_collateral()
            .poolThresholdbyPoolId(pool_id)
            .block(at(block))
            .call()
            .await?;
        Ok(PoolThreshold {
            min_threshold: threshold.minThreshold,
            max_threshold: threshold.maxThreshold,
            withdraw_threshold: threshold.withdrawThreshold,
            units: threshold.units,
        })
    }

    #[instrument(skip(self))]
    async fn ethx_total_supply(&self, block: u64) -> Result<U256, ExecutionError> {
        let token = ERC20::new(self.addresses.ethx_token, &self.provider);
        Ok(token.totalSupply().block(at(block)).call().await?)
    }

    #[instrument(skip(self))]
    async fn total_staked_assets(&self, block: u64) -> Result<U256, ExecutionError> {
        let manager = StakePoolManager::new(self.addresses.stake_pool_manager, &self.provider);
        Ok(manager.totalAssets().block(at(block)).call().await?)
    }
}
