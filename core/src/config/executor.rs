// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::utils::available_parallelism;
use crate::{Error, Result};
use log::{debug, warn};
use std::fmt::{self, Debug};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};

/// Runtime that drives the calls of one client.
///
/// An executor built by the client is owned and shut down when the client
/// closes. One handed in by the caller is only borrowed.
pub struct ClientExecutor {
    handle: Handle,
    owned: Mutex<Option<Runtime>>,
}

impl ClientExecutor {
    /// Borrow a runtime owned by the caller.
    pub fn shared(handle: Handle) -> Self {
        Self {
            handle,
            owned: Mutex::new(None),
        }
    }

    /// Owned runtime for the sync client.
    ///
    /// One worker drives timers and I/O while the caller's thread polls the
    /// call itself.
    pub fn new_sync() -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("reqflow-sync")
            .enable_all()
            .build()
            .map_err(|e| Error::unexpected("failed to build sync runtime").with_source(e))?;
        Ok(Self::owned(runtime))
    }

    /// Owned runtime for the async client, sized from the available CPUs.
    pub fn new_async() -> Result<Self> {
        let cpus = available_parallelism();
        let runtime = Builder::new_multi_thread()
            .worker_threads(cpus.max(8))
            .max_blocking_threads((2 * cpus).max(64))
            .thread_keep_alive(Duration::from_secs(10))
            .thread_name("reqflow-async-response")
            .enable_all()
            .build()
            .map_err(|e| Error::unexpected("failed to build async runtime").with_source(e))?;
        Ok(Self::owned(runtime))
    }

    fn owned(runtime: Runtime) -> Self {
        Self {
            handle: runtime.handle().clone(),
            owned: Mutex::new(Some(runtime)),
        }
    }

    /// Handle to spawn on.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    fn runtime(&self) -> Result<MutexGuard<'_, Option<Runtime>>> {
        self.owned
            .lock()
            .map_err(|_| Error::unexpected("client executor lock poisoned"))
    }

    /// Check if the client owns this runtime and is yet to shut it down.
    pub fn is_owned(&self) -> bool {
        self.runtime().is_ok_and(|rt| rt.is_some())
    }

    /// Shut down an owned runtime. Does nothing for a borrowed one or the
    /// second time.
    pub fn shutdown(&self) -> Result<()> {
        if let Some(runtime) = self.runtime()?.take() {
            debug!("shutting down client executor");
            runtime.shutdown_background();
        }
        Ok(())
    }
}

impl Drop for ClientExecutor {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!("failed to shut down client executor: {err}");
        }
    }
}

impl Debug for ClientExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientExecutor")
            .field("owned", &self.is_owned())
            .finish_non_exhaustive()
    }
}
