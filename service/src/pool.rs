//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Fixed set of I/O processors

use crate::{IoProcessor, ProcessorConfig, ProcessorHandle, Result, ServiceMetrics};
use sessionix_session::ConfigError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Pool of processors that sessions are assigned to round-robin
pub struct ProcessorPool {
    handles: Vec<ProcessorHandle>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
}

impl ProcessorPool {
    /// Spawn `count` processors on the current runtime
    pub fn new(count: usize, config: ProcessorConfig, metrics: Arc<ServiceMetrics>) -> Result<Self> {
        if count == 0 {
            return Err(ConfigError::invalid("processor_count", count, "must be greater than 0").into());
        }

        let mut handles = Vec::with_capacity(count);
        let mut tasks = Vec::with_capacity(count);
        for index in 0..count {
            let (handle, task) = IoProcessor::spawn(index, config.clone(), metrics.clone())?;
            handles.push(handle);
            tasks.push(task);
        }

        tracing::debug!(processors = count, "Processor pool started");
        Ok(Self {
            handles,
            tasks: Mutex::new(tasks),
            next: AtomicUsize::new(0),
        })
    }

    /// Pick the processor for the next session
    pub fn next(&self) -> &ProcessorHandle {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.handles.len();
        &self.handles[index]
    }

    /// Number of processors in the pool
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Get the processor at `index`
    pub fn get(&self, index: usize) -> Option<&ProcessorHandle> {
        self.handles.get(index)
    }

    /// Shut every processor down and wait for them to stop
    ///
    /// Sessions still owned by a processor are closed as part of its shutdown.
    pub async fn dispose(&self) {
        for handle in &self.handles {
            handle.shutdown();
        }

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for result in futures_util::future::join_all(tasks).await {
            if let Err(error) = result {
                tracing::error!(error = %error, "Processor task failed");
            }
        }
        tracing::debug!(processors = self.handles.len(), "Processor pool stopped");
    }
}

impl Drop for ProcessorPool {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.shutdown();
        }
    }
}

impl std::fmt::Debug for ProcessorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorPool")
            .field("size", &self.size())
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SessionError;

    #[tokio::test]
    async fn test_round_robin() {
        let pool = ProcessorPool::new(3, ProcessorConfig::default(), Arc::new(ServiceMetrics::new()))
            .unwrap();

        let picked: Vec<usize> = (0..6).map(|_| pool.next().index()).collect();
        assert_eq!(picked, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(pool.size(), 3);
        assert!(pool.get(3).is_none());
    }

    #[tokio::test]
    async fn test_dispose_stops_processors() {
        let pool = ProcessorPool::new(2, ProcessorConfig::default(), Arc::new(ServiceMetrics::new()))
            .unwrap();
        assert!(pool.next().is_running());

        pool.dispose().await;
        assert!(!pool.get(0).unwrap().is_running());
        assert!(!pool.get(1).unwrap().is_running());
    }

    #[tokio::test]
    async fn test_invalid_pool() {
        let metrics = Arc::new(ServiceMetrics::new());
        assert!(matches!(
            ProcessorPool::new(0, ProcessorConfig::default(), metrics.clone()),
            Err(SessionError::Config(_))
        ));

        let config = ProcessorConfig::default().with_sweep_interval(std::time::Duration::ZERO);
        assert!(matches!(
            ProcessorPool::new(1, config, metrics),
            Err(SessionError::Config(_))
        ));
    }
}
