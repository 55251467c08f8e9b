//! Timestamp to block number resolution.

use crate::rpc::{BlockSource, RpcError};

/// Find the first block whose timestamp is at or after `timestamp`
/// (seconds). Returns `None` when even the latest block is older.
///
/// Block timestamps are non-decreasing, so a binary search over
/// `[0, latest]` needs about log2(latest) timestamp lookups.
pub async fn find_block_at_or_after<S>(source: &S, timestamp: i64) -> Result<Option<u64>, RpcError>
where
    S: BlockSource + ?Sized,
{
    let latest = source.latest_block().await?;
    if source.block_timestamp(latest).await? < timestamp {
        return Ok(None);
    }

    let (mut low, mut high) = (0u64, latest);
    while low < high {
        let mid = low + (high - low) / 2;
        if source.block_timestamp(mid).await? < timestamp {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    Ok(Some(low))
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::rpc::{BlockSource, EventFilter, RpcError};
    use async_trait::async_trait;
    use chainwatch_core::ContractEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory chain: block `n` has timestamp `timestamps[n]`.
    pub struct FakeChain {
        pub timestamps: Vec<i64>,
        pub events: Mutex<Vec<ContractEvent>>,
        pub timestamp_calls: AtomicUsize,
    }

    impl FakeChain {
        pub fn new(timestamps: Vec<i64>) -> Self {
            Self {
                timestamps,
                events: Mutex::new(Vec::new()),
                timestamp_calls: AtomicUsize::new(0),
            }
        }

        /// Chain with `blocks` blocks, 12 seconds apart starting at `start`.
        pub fn regular(blocks: usize, start: i64) -> Self {
            Self::new((0..blocks as i64).map(|n| start + n * 12).collect())
        }

        pub fn push_event(&self, event: ContractEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[async_trait]
    impl BlockSource for FakeChain {
        async fn latest_block(&self) -> Result<u64, RpcError> {
            Ok(self.timestamps.len() as u64 - 1)
        }

        async fn block_timestamp(&self, number: u64) -> Result<i64, RpcError> {
            self.timestamp_calls.fetch_add(1, Ordering::Relaxed);
            self.timestamps
                .get(number as usize)
                .copied()
                .ok_or(RpcError::BlockNotFound(number))
        }

        async fn logs(
            &self,
            filter: &EventFilter,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<ContractEvent>, RpcError> {
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.address == filter.address)
                .filter(|e| match &filter.topic {
                    Some(topic) => e.signature() == Some(topic.as_str()),
                    None => true,
                })
                .filter(|e| (from_block..=to_block).contains(&e.block_number))
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FakeChain;
    use super::*;

    #[tokio::test]
    async fn test_exact_match() {
        let chain = FakeChain::regular(1000, 1_700_000_000);
        let block = find_block_at_or_after(&chain, 1_700_000_000 + 12 * 400).await.unwrap();
        assert_eq!(block, Some(400));
    }

    #[tokio::test]
    async fn test_between_blocks_rounds_up() {
        let chain = FakeChain::regular(1000, 1_700_000_000);
        let block = find_block_at_or_after(&chain, 1_700_000_000 + 12 * 400 + 5).await.unwrap();
        assert_eq!(block, Some(401));
    }

    #[tokio::test]
    async fn test_bounds() {
        let chain = FakeChain::regular(100, 1_700_000_000);
        assert_eq!(find_block_at_or_after(&chain, 0).await.unwrap(), Some(0));
        assert_eq!(
            find_block_at_or_after(&chain, 1_700_000_000 + 12 * 99).await.unwrap(),
            Some(99)
        );
        assert_eq!(find_block_at_or_after(&chain, 1_800_000_000).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_equal_timestamps_pick_first() {
        let chain = FakeChain::new(vec![10, 20, 20, 20, 30]);
        assert_eq!(find_block_at_or_after(&chain, 20).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_logarithmic_lookups() {
        let chain = FakeChain::regular(1 << 16, 0);
        find_block_at_or_after(&chain, 12 * 12345).await.unwrap();
        let calls = chain.timestamp_calls.load(std::sync::atomic::Ordering::Relaxed);
        assert!(calls <= 18, "too many lookups: {}", calls);
    }
}
