use std::collections::VecDeque;

use alloy::primitives::B256;
use ciro_common::error::AppError;

use crate::rpc::RpcAdapter;

/// Sliding-window reorg detector.
///
/// Maintains a window of recent `(block_number, block_hash)` pairs. On
/// each new block, checks whether its parent hash matches the recorded
/// hash for the previous block. A mismatch triggers a backward walk
/// through the window, re-fetching each block from the RPC adapter until
/// one still matches what we recorded — that's the ancestor the reorg
/// diverged from.
pub struct ReorgDetector {
    window: VecDeque<(u64, B256)>,
    max_size: usize,
}

impl ReorgDetector {
    pub fn new(max_size: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Returns `Some(ancestor_block)` — the last block still on the
    /// canonical chain — when a reorg is detected, `None` otherwise.
    pub async fn check_and_record(
        &mut self,
        block_number: u64,
        block_hash: B256,
        parent_hash: B256,
        rpc: &RpcAdapter,
    ) -> Result<Option<u64>, AppError> {
        if block_number > 0
            && let Some(pos) = self
                .window
                .iter()
                .position(|(num, _)| *num == block_number - 1)
        {
            let (_, expected_parent_hash) = &self.window[pos];

            if parent_hash != *expected_parent_hash {
                tracing::warn!(
                    block_number,
                    expected = %expected_parent_hash,
                    actual = %parent_hash,
                    "reorg detected: parent hash mismatch"
                );

                let ancestor = self.find_divergence_point(rpc).await?;
                self.window.retain(|(num, _)| *num <= ancestor);

                return Ok(Some(ancestor));
            }
        }

        self.window.push_back((block_number, block_hash));
        if self.window.len() > self.max_size {
            self.window.pop_front();
        }

        Ok(None)
    }

    /// Walks the window backward, re-fetching each block, until one still
    /// matches the recorded hash. That block is the last canonical
    /// ancestor; `Orchestrator` resumes catch-up from its successor.
    async fn find_divergence_point(&self, rpc: &RpcAdapter) -> Result<u64, AppError> {
        for (block_number, expected_hash) in self.window.iter().rev() {
            match rpc.block_by_number(*block_number).await {
                Ok(block) if block.header.hash == *expected_hash => {
                    return Ok(*block_number);
                }
                _ => continue,
            }
        }

        Ok(self.window.front().map(|(num, _)| num.saturating_sub(1)).unwrap_or(0))
    }

    pub fn window_size(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_detector_has_empty_window() {
        let detector = ReorgDetector::new(10);
        assert_eq!(detector.window_size(), 0);
        assert_eq!(detector.max_size, 10);
    }
}
