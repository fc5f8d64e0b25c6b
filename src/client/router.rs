// src/client/router.rs

use super::transport::Transport;
use crate::core::CortadoError;
use crate::core::protocol::{Request, Response};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use strum_macros::{Display, EnumString};
use tracing::{debug, warn};

/// An ordered, immutable list of node addresses believed to serve the same replicated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaGroup {
    addrs: Arc<[String]>,
}

impl ReplicaGroup {
    pub fn new<I, S>(addrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addrs: addrs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn addrs(&self) -> &[String] {
        &self.addrs
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }
}

impl fmt::Display for ReplicaGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.addrs.join(", "))
    }
}

/// Which failures move a call on to the next address of the group.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailoverPolicy {
    /// Only failures to reach a node fall through; anything a node answers is final.
    #[default]
    ConnectOnly,
    /// Every failure falls through.
    AnyError,
}

impl FailoverPolicy {
    pub fn should_fall_through(self, err: &CortadoError) -> bool {
        match self {
            FailoverPolicy::ConnectOnly => err.is_connect_failure(),
            FailoverPolicy::AnyError => true,
        }
    }
}

/// Tries the addresses of a group strictly in order, one at a time, one attempt each.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupRouter {
    policy: FailoverPolicy,
}

impl GroupRouter {
    pub fn new(policy: FailoverPolicy) -> Self {
        Self { policy }
    }

    /// Runs `attempt` against each address until one succeeds.
    ///
    /// When every address fails, the error from the last one is returned.
    pub async fn try_each<T, F, Fut>(
        &self,
        group: &ReplicaGroup,
        mut attempt: F,
    ) -> Result<T, CortadoError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, CortadoError>>,
    {
        let mut last_err = None;
        for addr in group.addrs() {
            match attempt(addr.clone()).await {
                Ok(value) => return Ok(value),
                Err(e) if self.policy.should_fall_through(&e) => {
                    warn!("Attempt against {} failed, trying next address: {}", addr, e);
                    last_err = Some(e);
                }
                Err(e) => {
                    debug!("Attempt against {} failed with a final error: {}", addr, e);
                    return Err(e);
                }
            }
        }
        Err(last_err.unwrap_or(CortadoError::EmptyGroup))
    }

    /// Delivers `request` through `transport` to the first address that answers it.
    ///
    /// `Response::Error` replies are turned into `Err` so the failover policy sees them.
    pub async fn dispatch<T>(
        &self,
        transport: &T,
        group: &ReplicaGroup,
        request: Request,
    ) -> Result<Response, CortadoError>
    where
        T: Transport + ?Sized,
    {
        self.try_each(group, |addr| {
            let request = request.clone();
            async move {
                match transport.call(&addr, request).await? {
                    Response::Error(e) => Err(e.into()),
                    response => Ok(response),
                }
            }
        })
        .await
    }
}
