//! Reference scheduler
//!
//! Answers `ready`, optionally loads components into the executor, releases
//! it with `start` and then acknowledges every injection site. With `drive`
//! set it executes the reported active components before acknowledging, so
//! their pending work lands before each UI action.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use neutralsync_core::rpc::RpcError;
use neutralsync_core::{SchedulerService, TestControlClient};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Behaviour knobs for [`ReferenceScheduler`]
#[derive(Debug, Clone, Default)]
pub struct SchedulerPlan {
    /// Components to load before sending `start`
    pub load: Vec<String>,
    /// Pause between `ready` and `start`
    pub start_delay: Duration,
    /// Execute active components at each injection site
    pub drive: bool,
    /// Stop after this many injection sites
    pub max_sites: Option<usize>,
}

pub struct ReferenceScheduler {
    executor: TestControlClient,
    plan: SchedulerPlan,
    sites: AtomicUsize,
    done: CancellationToken,
}

impl ReferenceScheduler {
    pub fn new(executor: TestControlClient, plan: SchedulerPlan, done: CancellationToken) -> Self {
        Self {
            executor,
            plan,
            sites: AtomicUsize::new(0),
            done,
        }
    }

    /// Injection sites acknowledged so far
    pub fn sites(&self) -> usize {
        self.sites.load(Ordering::SeqCst)
    }
}

impl SchedulerService for ReferenceScheduler {
    async fn ready(&self) -> Result<(), RpcError> {
        info!(executor = %self.executor.endpoint(), "Executor ready");
        println!("ready      executor={}", self.executor.endpoint());

        // The executor only starts waiting for start() once ready() returns
        let executor = self.executor.clone();
        let load = self.plan.load.clone();
        let delay = self.plan.start_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !load.is_empty() {
                if let Err(e) = executor.load_neutral_components(&load).await {
                    warn!(error = %e, "loadNeutralComponents failed");
                    return;
                }
                println!("loaded     {}", load.join(","));
            }
            match executor.start().await {
                Ok(()) => println!("started"),
                Err(e) => warn!(error = %e, "start failed"),
            }
        });

        Ok(())
    }

    async fn at_injection_site(
        &self,
        action: String,
        active: Option<Vec<String>>,
    ) -> Result<(), RpcError> {
        let n = self.sites.fetch_add(1, Ordering::SeqCst) + 1;
        let listed = match &active {
            Some(names) => format!("[{}]", names.join(",")),
            None => "-".to_string(),
        };
        println!("site {:<5} {} active={}", n, action, listed);
        debug!(site = n, action = %action, "Injection site");

        if self.plan.drive {
            if let Some(names) = active.filter(|names| !names.is_empty()) {
                match self.executor.execute_neutral_components(&names).await {
                    Ok(()) => println!("executed   {}", names.join(",")),
                    Err(e) => warn!(error = %e, "executeNeutralComponents failed"),
                }
            }
        }

        if self.plan.max_sites.is_some_and(|max| n >= max) {
            info!(sites = n, "Site limit reached");
            self.done.cancel();
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neutralsync_core::rpc::{self, RpcClientConfig};
    use neutralsync_core::{
        ComponentCatalog, ConnectionState, NeutralComponent, NotifyOutcome, SchedulerEndpoint,
        SessionOptions, SyncSession,
    };
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;

    #[derive(Default)]
    struct Ticker {
        ticks: AtomicUsize,
    }

    impl NeutralComponent for Ticker {
        fn can_execute(&self) -> bool {
            true
        }

        fn execute(&self) -> anyhow::Result<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    #[tokio::test]
    async fn test_drives_executor_through_a_run() {
        let emulator_port = free_port();
        let executor_addr: SocketAddr = ([127, 0, 0, 1], emulator_port).into();
        let done = CancellationToken::new();

        let ticker = Arc::new(Ticker::default());
        let mut catalog = ComponentCatalog::new();
        let shared = ticker.clone();
        catalog.register("Ticker", move || Ok(shared.clone() as Arc<dyn NeutralComponent>));

        let scheduler = Arc::new(ReferenceScheduler::new(
            TestControlClient::new(executor_addr, RpcClientConfig::default()),
            SchedulerPlan {
                load: vec!["Ticker".into()],
                start_delay: Duration::from_millis(50),
                drive: true,
                max_sites: Some(2),
            },
            done.clone(),
        ));
        let server = rpc::spawn(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(SchedulerEndpoint::new(scheduler.clone())),
            done.clone(),
        )
        .await
        .unwrap();

        let session = SyncSession::new(catalog, SessionOptions::loopback());
        let config: HashMap<String, String> = [
            ("port.emu".to_string(), emulator_port.to_string()),
            ("port.host".to_string(), server.local_addr().port().to_string()),
        ]
        .into_iter()
        .collect();

        let outcome = session.handshake(&config).await;
        assert_eq!(outcome.state, ConnectionState::Started);

        for action in ["click #login", "type password"] {
            let outcome = session.notify(action).await;
            assert_eq!(
                outcome,
                NotifyOutcome::Delivered {
                    active: Some(vec!["Ticker".to_string()])
                }
            );
        }

        // Driven once per site, before each acknowledgement
        assert_eq!(ticker.ticks.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.sites(), 2);
        assert!(done.is_cancelled());

        server.join().await;
        session.shutdown().await;
    }
}
