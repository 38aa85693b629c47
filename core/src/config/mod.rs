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

//! Layered client configuration.
//!
//! Options come from four layers, highest priority first: client overrides,
//! the caller's builder, service defaults and global defaults.
//! [`ClientConfigurationResolver`] merges them and builds the immutable
//! [`ClientConfiguration`] a client runs with.

mod builder;
pub use builder::{ClientConfigurationBuilder, ClientOverrideConfiguration};

mod executor;
pub use executor::ClientExecutor;

mod request_override;
pub use request_override::RequestOverrideConfiguration;

mod resolver;
pub use resolver::{ClientConfiguration, ClientConfigurationResolver, ServiceDefaults};

/// Kind of client a configuration is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClientType {
    /// Blocking client.
    Sync,
    /// Future based client.
    Async,
}
