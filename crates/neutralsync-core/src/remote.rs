//! The two service contracts between executor and scheduler
//!
//! ```text
//!  Executor                                    Scheduler
//!  ─────────                                   ─────────
//!  SchedulerClient ── scheduler.ready ───────► SchedulerEndpoint<S: SchedulerService>
//!                  ── scheduler.atInjectionSite ►
//!
//!  TestControlEndpoint<T: TestControl> ◄── rti.start ────────────── TestControlClient
//!                                      ◄── rti.loadNeutralComponents
//!                                      ◄── rti.executeNeutralComponents
//! ```
//!
//! Every method is void on the wire: success is `"result": null`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::RtiResult;
use crate::rpc::{
    optional_string_list, string_arg, string_list, RequestHandler, RpcClient, RpcClientConfig,
    RpcError,
};

/// Service name of the scheduler's contract
pub const SCHEDULER_SERVICE: &str = "scheduler";

/// Service name of the executor's test-control contract
pub const TEST_CONTROL_SERVICE: &str = "rti";

/// Method names on the wire
pub mod methods {
    /// `scheduler.ready()`
    pub const READY: &str = "ready";
    /// `scheduler.atInjectionSite(action, names | null)`
    pub const AT_INJECTION_SITE: &str = "atInjectionSite";
    /// `rti.start()`
    pub const START: &str = "start";
    /// `rti.loadNeutralComponents(names)`
    pub const LOAD_NEUTRAL_COMPONENTS: &str = "loadNeutralComponents";
    /// `rti.executeNeutralComponents(names)`
    pub const EXECUTE_NEUTRAL_COMPONENTS: &str = "executeNeutralComponents";
}

fn string_array(names: &[String]) -> Value {
    Value::Array(names.iter().cloned().map(Value::String).collect())
}

// ============================================================================
// Executor → scheduler
// ============================================================================

/// Executor-side handle to the scheduler. Creating one performs no I/O.
#[derive(Debug, Clone)]
pub struct SchedulerClient {
    rpc: RpcClient,
}

impl SchedulerClient {
    /// Handle to the scheduler at `endpoint`
    pub fn new(endpoint: SocketAddr, config: RpcClientConfig) -> Self {
        Self {
            rpc: RpcClient::new(endpoint, SCHEDULER_SERVICE, config),
        }
    }

    /// Scheduler address
    pub fn endpoint(&self) -> SocketAddr {
        self.rpc.endpoint()
    }

    /// Announce that the executor is listening, waiting at most `timeout`
    pub async fn ready(&self, timeout: Duration) -> RtiResult<()> {
        self.rpc
            .call_with_timeout(methods::READY, vec![], Some(timeout))
            .await?;
        Ok(())
    }

    /// Report an imminent UI action and the active components.
    ///
    /// Returns only once the scheduler has acknowledged; the scheduler may
    /// hold the answer back for as long as it needs the executor paused.
    pub async fn at_injection_site(&self, action: &str, active: Option<&[String]>) -> RtiResult<()> {
        let names = active.map(string_array).unwrap_or(Value::Null);
        self.rpc
            .call(
                methods::AT_INJECTION_SITE,
                vec![Value::String(action.to_string()), names],
            )
            .await?;
        Ok(())
    }
}

/// What a scheduler does when the executor calls it
pub trait SchedulerService: Send + Sync + 'static {
    /// The executor's control server is up
    fn ready(&self) -> impl Future<Output = Result<(), RpcError>> + Send;

    /// The executor is about to deliver `action`; `active` is `None` if it
    /// has never loaded components
    fn at_injection_site(
        &self,
        action: String,
        active: Option<Vec<String>>,
    ) -> impl Future<Output = Result<(), RpcError>> + Send;
}

/// Serves a [`SchedulerService`] as the `scheduler` service
#[derive(Debug)]
pub struct SchedulerEndpoint<S> {
    service: Arc<S>,
}

impl<S> SchedulerEndpoint<S> {
    /// Wrap a service implementation
    pub fn new(service: Arc<S>) -> Self {
        Self { service }
    }
}

impl<S: SchedulerService> RequestHandler for SchedulerEndpoint<S> {
    fn service(&self) -> &'static str {
        SCHEDULER_SERVICE
    }

    async fn handle(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        match method {
            methods::READY => self.service.ready().await?,
            methods::AT_INJECTION_SITE => {
                let action = string_arg(&params, 0)?;
                let active = optional_string_list(&params, 1)?;
                self.service.at_injection_site(action, active).await?
            }
            _ => return Err(RpcError::method_not_found(method)),
        }
        Ok(Value::Null)
    }
}

// ============================================================================
// Scheduler → executor
// ============================================================================

/// Scheduler-side handle to an executor's control server
#[derive(Debug, Clone)]
pub struct TestControlClient {
    rpc: RpcClient,
}

impl TestControlClient {
    /// Handle to the executor at `endpoint`
    pub fn new(endpoint: SocketAddr, config: RpcClientConfig) -> Self {
        Self {
            rpc: RpcClient::new(endpoint, TEST_CONTROL_SERVICE, config),
        }
    }

    /// Executor address
    pub fn endpoint(&self) -> SocketAddr {
        self.rpc.endpoint()
    }

    /// Release the executor's handshake
    pub async fn start(&self) -> RtiResult<()> {
        self.rpc.call(methods::START, vec![]).await?;
        Ok(())
    }

    /// Replace the executor's component set
    pub async fn load_neutral_components(&self, names: &[String]) -> RtiResult<()> {
        self.rpc
            .call(methods::LOAD_NEUTRAL_COMPONENTS, vec![string_array(names)])
            .await?;
        Ok(())
    }

    /// Run the named components once each
    pub async fn execute_neutral_components(&self, names: &[String]) -> RtiResult<()> {
        self.rpc
            .call(methods::EXECUTE_NEUTRAL_COMPONENTS, vec![string_array(names)])
            .await?;
        Ok(())
    }
}

/// What an executor does when the scheduler calls it.
///
/// Implementations are synchronous; the endpoint runs them on the blocking
/// pool because component construction and execution may block.
pub trait TestControl: Send + Sync + 'static {
    /// Mark the run as started
    fn start(&self);

    /// Replace the current component set
    fn load_neutral_components(&self, names: &[String]);

    /// Run the named components
    fn execute_neutral_components(&self, names: &[String]);
}

/// Serves a [`TestControl`] as the `rti` service
#[derive(Debug)]
pub struct TestControlEndpoint<T> {
    control: Arc<T>,
}

impl<T> TestControlEndpoint<T> {
    /// Wrap a control implementation
    pub fn new(control: Arc<T>) -> Self {
        Self { control }
    }
}

impl<T: TestControl> RequestHandler for TestControlEndpoint<T> {
    fn service(&self) -> &'static str {
        TEST_CONTROL_SERVICE
    }

    async fn handle(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let control = self.control.clone();
        let call: Box<dyn FnOnce() + Send> = match method {
            methods::START => Box::new(move || control.start()),
            methods::LOAD_NEUTRAL_COMPONENTS => {
                let names = string_list(&params, 0)?;
                Box::new(move || control.load_neutral_components(&names))
            }
            methods::EXECUTE_NEUTRAL_COMPONENTS => {
                let names = string_list(&params, 0)?;
                Box::new(move || control.execute_neutral_components(&names))
            }
            _ => return Err(RpcError::method_not_found(method)),
        };

        tokio::task::spawn_blocking(call)
            .await
            .map_err(RpcError::internal)?;
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RtiError;
    use crate::rpc::spawn;
    use parking_lot::Mutex;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<String>>,
    }

    impl TestControl for RecordingControl {
        fn start(&self) {
            self.calls.lock().push("start".into());
        }

        fn load_neutral_components(&self, names: &[String]) {
            self.calls.lock().push(format!("load {}", names.join(",")));
        }

        fn execute_neutral_components(&self, names: &[String]) {
            self.calls.lock().push(format!("execute {}", names.join(",")));
        }
    }

    #[derive(Default)]
    struct RecordingScheduler {
        sites: Mutex<Vec<(String, Option<Vec<String>>)>>,
        refuse_ready: bool,
    }

    impl SchedulerService for RecordingScheduler {
        async fn ready(&self) -> Result<(), RpcError> {
            if self.refuse_ready {
                return Err(RpcError::internal("not accepting executors"));
            }
            Ok(())
        }

        async fn at_injection_site(
            &self,
            action: String,
            active: Option<Vec<String>>,
        ) -> Result<(), RpcError> {
            self.sites.lock().push((action, active));
            Ok(())
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_control_roundtrip() {
        let control = Arc::new(RecordingControl::default());
        let server = spawn(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(TestControlEndpoint::new(control.clone())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let client = TestControlClient::new(server.local_addr(), RpcClientConfig::default());
        client.load_neutral_components(&names(&["A", "B"])).await.unwrap();
        client.execute_neutral_components(&names(&["A"])).await.unwrap();
        client.start().await.unwrap();

        assert_eq!(
            *control.calls.lock(),
            vec!["load A,B".to_string(), "execute A".into(), "start".into()]
        );
    }

    #[tokio::test]
    async fn test_control_rejects_bad_params() {
        let control = Arc::new(RecordingControl::default());
        let endpoint = TestControlEndpoint::new(control.clone());

        let err = endpoint
            .handle(methods::LOAD_NEUTRAL_COMPONENTS, vec![Value::from(3)])
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcError::INVALID_PARAMS);

        let err = endpoint.handle("reboot", vec![]).await.unwrap_err();
        assert_eq!(err.code, RpcError::METHOD_NOT_FOUND);
        assert!(control.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_roundtrip() {
        let scheduler = Arc::new(RecordingScheduler::default());
        let server = spawn(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(SchedulerEndpoint::new(scheduler.clone())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let client = SchedulerClient::new(server.local_addr(), RpcClientConfig::default());
        client.ready(Duration::from_secs(5)).await.unwrap();
        client.at_injection_site("click OK", None).await.unwrap();
        client
            .at_injection_site("type text", Some(names(&["Clock"]).as_slice()))
            .await
            .unwrap();

        assert_eq!(
            *scheduler.sites.lock(),
            vec![
                ("click OK".to_string(), None),
                ("type text".to_string(), Some(names(&["Clock"]))),
            ]
        );
    }

    #[tokio::test]
    async fn test_ready_rejected_by_scheduler() {
        let scheduler = Arc::new(RecordingScheduler {
            refuse_ready: true,
            ..Default::default()
        });
        let server = spawn(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(SchedulerEndpoint::new(scheduler)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let client = SchedulerClient::new(server.local_addr(), RpcClientConfig::default());
        let err = client.ready(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, RtiError::Remote(_)));
    }
}
