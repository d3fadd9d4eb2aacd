//! prover worker protocol
//!
//! one dedicated thread owns the witness calculator, the proving key and the
//! parsed r1cs. callers hold a [`WorkerHandle`] and exchange tagged frames:
//! every request carries a fresh message id, every response echoes it, and
//! unsolicited progress frames may arrive while an artifact downloads.
//!
//! pending requests live in a bounded table and are evicted on timeout; a
//! response arriving after its caller gave up is discarded. only idempotent
//! requests (`Ping`, `CheckCache`, `GetVk`, `GetCircuitInfo`) are retried
//! after a timeout - `Prove` never is, the worker may still be grinding.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::{ArtifactProvider, ArtifactUrls, Progress};
use crate::calculator::WitnessCalculator;
use crate::error::{ProverError, Result};
use crate::groth16::{CircuitInfo, Groth16Prover};

/// proof generation budget
pub const PROVE_TIMEOUT: Duration = Duration::from_secs(120);
/// every other request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// worker thread startup handshake
pub const SPAWN_TIMEOUT: Duration = Duration::from_secs(10);

/// bound on in-flight requests; expired entries are evicted on insert
const MAX_PENDING: usize = 64;
/// eviction grace past the caller's own deadline
const EVICTION_GRACE: Duration = Duration::from_secs(1);

/// requests the worker understands
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Request {
    InitModules,
    InitWitness,
    InitProver,
    Prove { inputs_json: String },
    Verify { proof: Vec<u8>, public_inputs: Vec<u8> },
    GetVk,
    GetCircuitInfo,
    Ping,
    CheckCache { url: String },
    ClearCache,
}

impl Request {
    /// safe to reissue after a timeout
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self,
            Request::Ping | Request::CheckCache { .. } | Request::GetVk | Request::GetCircuitInfo
        )
    }

    pub fn timeout(&self) -> Duration {
        match self {
            Request::Prove { .. } => PROVE_TIMEOUT,
            _ => DEFAULT_TIMEOUT,
        }
    }
}

/// responses, one variant per request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Response {
    ModulesReady,
    WitnessReady,
    ProverReady,
    Proof {
        compressed: Vec<u8>,
        on_chain: Vec<u8>,
    },
    Verified {
        valid: bool,
    },
    Vk {
        compressed: Vec<u8>,
    },
    CircuitInfo {
        info: CircuitInfo,
    },
    Pong {
        modules_ready: bool,
        witness_ready: bool,
        prover_ready: bool,
    },
    CacheStatus {
        present: bool,
    },
    CacheCleared,
}

/// request envelope on the channel
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub body: Request,
}

/// response envelope; `result` is the wire-level success/error split
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub result: std::result::Result<Response, String>,
}

/// everything the worker emits
#[derive(Clone, Debug)]
enum WorkerFrame {
    Response(ResponseFrame),
    Progress { id: u64, progress: Progress },
}

/// parse a wire request, naming unknown tags explicitly
pub fn parse_request(json: &str) -> Result<RequestFrame> {
    match serde_json::from_str::<RequestFrame>(json) {
        Ok(frame) => Ok(frame),
        Err(e) => {
            let tag = serde_json::from_str::<serde_json::Value>(json)
                .ok()
                .and_then(|v| {
                    v.get("body")
                        .and_then(|b| b.get("type"))
                        .and_then(|t| t.as_str())
                        .map(String::from)
                });
            match tag {
                Some(tag) if e.to_string().contains("unknown variant") => {
                    Err(ProverError::UnknownMessageType(tag))
                }
                _ => Err(ProverError::Serialization(e.to_string())),
            }
        }
    }
}

/// worker construction parameters
pub struct WorkerConfig {
    pub urls: ArtifactUrls,
    pub artifacts: Box<dyn ArtifactProvider>,
    /// builds a witness calculator from the downloaded circuit wasm
    pub calculator_factory:
        Box<dyn Fn(&[u8]) -> Result<Box<dyn WitnessCalculator>> + Send>,
    /// receives progress frames, tagged with the request id
    pub on_progress: Option<Box<dyn Fn(u64, Progress) + Send>>,
}

/// the state owned by the worker thread
struct ProverWorker {
    urls: ArtifactUrls,
    artifacts: Box<dyn ArtifactProvider>,
    calculator_factory: Box<dyn Fn(&[u8]) -> Result<Box<dyn WitnessCalculator>> + Send>,
    modules_ready: bool,
    calculator: Option<Box<dyn WitnessCalculator>>,
    prover: Option<Groth16Prover>,
}

impl ProverWorker {
    fn handle(
        &mut self,
        id: u64,
        request: Request,
        emit: &std_mpsc::Sender<WorkerFrame>,
    ) -> Result<Response> {
        match request {
            Request::Ping => Ok(Response::Pong {
                modules_ready: self.modules_ready,
                witness_ready: self.calculator.is_some(),
                prover_ready: self.prover.is_some(),
            }),

            Request::InitModules => {
                // the proving modules are linked into this binary; the step
                // survives as the protocol's first gate
                self.modules_ready = true;
                info!("modules ready");
                Ok(Response::ModulesReady)
            }

            Request::InitWitness => {
                if !self.modules_ready {
                    return Err(ProverError::WorkerNotReady("modules not loaded".into()));
                }
                let wasm = self.fetch(id, &self.urls.circuit_wasm, emit)?;
                self.calculator = Some((self.calculator_factory)(&wasm)?);
                info!("witness calculator ready");
                Ok(Response::WitnessReady)
            }

            Request::InitProver => {
                if self.calculator.is_none() {
                    return Err(ProverError::WorkerNotReady(
                        "witness calculator not loaded".into(),
                    ));
                }
                let pk = self.fetch(id, &self.urls.proving_key, emit)?;
                let r1cs = self.fetch(id, &self.urls.r1cs, emit)?;
                self.prover = Some(Groth16Prover::new(&pk, &r1cs)?);
                info!("prover ready");
                Ok(Response::ProverReady)
            }

            Request::Prove { inputs_json } => {
                let calculator = self
                    .calculator
                    .as_ref()
                    .ok_or_else(|| ProverError::WorkerNotReady("prover not initialized".into()))?;
                let prover = self
                    .prover
                    .as_ref()
                    .ok_or_else(|| ProverError::WorkerNotReady("prover not initialized".into()))?;

                let witness = calculator.calculate(&inputs_json)?;
                let bundle = prover.prove(&witness)?;
                Ok(Response::Proof {
                    compressed: bundle.compressed,
                    on_chain: bundle.on_chain.to_bytes(),
                })
            }

            Request::Verify {
                proof,
                public_inputs,
            } => {
                let prover = self
                    .prover
                    .as_ref()
                    .ok_or_else(|| ProverError::WorkerNotReady("prover not initialized".into()))?;
                Ok(Response::Verified {
                    valid: prover.verify(&proof, &public_inputs)?,
                })
            }

            Request::GetVk => {
                let prover = self
                    .prover
                    .as_ref()
                    .ok_or_else(|| ProverError::WorkerNotReady("prover not initialized".into()))?;
                Ok(Response::Vk {
                    compressed: prover.verifying_key()?,
                })
            }

            Request::GetCircuitInfo => {
                let prover = self
                    .prover
                    .as_ref()
                    .ok_or_else(|| ProverError::WorkerNotReady("prover not initialized".into()))?;
                Ok(Response::CircuitInfo {
                    info: prover.circuit_info(),
                })
            }

            Request::CheckCache { url } => Ok(Response::CacheStatus {
                present: self.artifacts.cached(&url),
            }),

            Request::ClearCache => {
                self.artifacts.evict_all()?;
                Ok(Response::CacheCleared)
            }
        }
    }

    fn fetch(
        &self,
        id: u64,
        url: &str,
        emit: &std_mpsc::Sender<WorkerFrame>,
    ) -> Result<Vec<u8>> {
        self.artifacts.fetch_with_progress(url, &mut |progress| {
            let _ = emit.send(WorkerFrame::Progress { id, progress });
        })
    }
}

struct PendingEntry {
    reply: tokio::sync::oneshot::Sender<std::result::Result<Response, String>>,
    deadline: Instant,
}

type PendingTable = Arc<Mutex<HashMap<u64, PendingEntry>>>;

/// caller-side handle; clone-cheap, correlate-by-id
pub struct WorkerHandle {
    requests: std_mpsc::Sender<RequestFrame>,
    pending: PendingTable,
    next_id: AtomicU64,
}

impl WorkerHandle {
    /// start the worker and dispatcher threads
    ///
    /// blocks up to [`SPAWN_TIMEOUT`] for the worker's startup handshake.
    pub fn spawn(config: WorkerConfig) -> Result<Self> {
        let (request_tx, request_rx) = std_mpsc::channel::<RequestFrame>();
        let (frame_tx, frame_rx) = std_mpsc::channel::<WorkerFrame>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<()>();

        let WorkerConfig {
            urls,
            artifacts,
            calculator_factory,
            on_progress,
        } = config;
        let mut worker = ProverWorker {
            urls,
            artifacts,
            calculator_factory,
            modules_ready: false,
            calculator: None,
            prover: None,
        };

        thread::Builder::new()
            .name("prover-worker".into())
            .spawn(move || {
                let _ = ready_tx.send(());
                while let Ok(frame) = request_rx.recv() {
                    debug!(id = frame.id, "worker request");
                    let result = worker
                        .handle(frame.id, frame.body, &frame_tx)
                        .map_err(|e| e.to_string());
                    let _ = frame_tx.send(WorkerFrame::Response(ResponseFrame {
                        id: frame.id,
                        result,
                    }));
                }
                debug!("worker channel closed, exiting");
            })
            .map_err(|e| ProverError::WorkerNotReady(format!("spawn failed: {e}")))?;

        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let dispatcher_pending = Arc::clone(&pending);
        thread::Builder::new()
            .name("prover-dispatch".into())
            .spawn(move || {
                while let Ok(frame) = frame_rx.recv() {
                    match frame {
                        WorkerFrame::Response(response) => {
                            let entry = dispatcher_pending
                                .lock()
                                .expect("not poisoned")
                                .remove(&response.id);
                            match entry {
                                Some(entry) => {
                                    let _ = entry.reply.send(response.result);
                                }
                                None => {
                                    debug!(id = response.id, "late response discarded");
                                }
                            }
                        }
                        WorkerFrame::Progress { id, progress } => {
                            if let Some(handler) = &on_progress {
                                handler(id, progress);
                            }
                        }
                    }
                }
            })
            .map_err(|e| ProverError::WorkerNotReady(format!("spawn failed: {e}")))?;

        ready_rx
            .recv_timeout(SPAWN_TIMEOUT)
            .map_err(|_| ProverError::WorkerTimeout)?;

        Ok(Self {
            requests: request_tx,
            pending,
            next_id: AtomicU64::new(1),
        })
    }

    /// issue a request with its standard timeout
    ///
    /// idempotent requests retry once after a timeout; everything else
    /// surfaces the timeout to the caller.
    pub async fn request(&self, body: Request) -> Result<Response> {
        let timeout = body.timeout();
        match self.request_with_timeout(body.clone(), timeout).await {
            Err(ProverError::WorkerTimeout) if body.is_idempotent() => {
                warn!("idempotent request timed out, retrying once");
                self.request_with_timeout(body, timeout).await
            }
            other => other,
        }
    }

    /// issue a request with an explicit timeout, no retry
    pub async fn request_with_timeout(
        &self,
        body: Request,
        timeout: Duration,
    ) -> Result<Response> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();

        {
            let mut pending = self.pending.lock().expect("not poisoned");
            let now = Instant::now();
            pending.retain(|_, entry| entry.deadline + EVICTION_GRACE > now);
            if pending.len() >= MAX_PENDING {
                return Err(ProverError::QueueFull);
            }
            pending.insert(
                id,
                PendingEntry {
                    reply: reply_tx,
                    deadline: now + timeout,
                },
            );
        }

        if self.requests.send(RequestFrame { id, body }).is_err() {
            self.pending.lock().expect("not poisoned").remove(&id);
            return Err(ProverError::WorkerGone);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Err(_) => {
                // evict; if the worker answers later the dispatcher drops it
                self.pending.lock().expect("not poisoned").remove(&id);
                Err(ProverError::WorkerTimeout)
            }
            Ok(Err(_)) => Err(ProverError::WorkerGone),
            Ok(Ok(Ok(response))) => Ok(response),
            Ok(Ok(Err(message))) => Err(wire_error(message)),
        }
    }

    /// readiness tuple, answered from any state
    pub async fn ping(&self) -> Result<(bool, bool, bool)> {
        match self.request(Request::Ping).await? {
            Response::Pong {
                modules_ready,
                witness_ready,
                prover_ready,
            } => Ok((modules_ready, witness_ready, prover_ready)),
            other => Err(ProverError::Serialization(format!(
                "unexpected response to ping: {other:?}"
            ))),
        }
    }
}

/// rehydrate a typed error from the wire string
fn wire_error(message: String) -> ProverError {
    if message.starts_with("worker not ready") {
        ProverError::WorkerNotReady(message)
    } else {
        ProverError::ProverFailure(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::MemoryArtifacts;
    use crate::calculator::FixedWitnessCalculator;
    use crate::groth16::fixtures::product_setup;
    use crate::r1cs::fixtures;
    use std::sync::mpsc as std_mpsc;

    const WASM_URL: &str = "http://artifacts/circuit.wasm";
    const PK_URL: &str = "http://artifacts/proving.key";
    const R1CS_URL: &str = "http://artifacts/circuit.r1cs";

    fn urls() -> ArtifactUrls {
        ArtifactUrls {
            circuit_wasm: WASM_URL.into(),
            proving_key: PK_URL.into(),
            r1cs: R1CS_URL.into(),
        }
    }

    fn test_config(witness: Vec<u8>) -> WorkerConfig {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("umbriel_prover=debug")
            .with_test_writer()
            .try_init();

        let (pk_bytes, r1cs_bytes) = product_setup();
        let artifacts = MemoryArtifacts::empty()
            .with_file(WASM_URL, b"fake circuit wasm".to_vec())
            .with_file(PK_URL, pk_bytes)
            .with_file(R1CS_URL, r1cs_bytes);
        WorkerConfig {
            urls: urls(),
            artifacts: Box::new(artifacts),
            calculator_factory: Box::new(move |_wasm| {
                Ok(Box::new(FixedWitnessCalculator::new(witness.clone())))
            }),
            on_progress: None,
        }
    }

    async fn ready_handle(witness: Vec<u8>) -> WorkerHandle {
        let handle = WorkerHandle::spawn(test_config(witness)).unwrap();
        handle.request(Request::InitModules).await.unwrap();
        handle.request(Request::InitWitness).await.unwrap();
        handle.request(Request::InitProver).await.unwrap();
        handle
    }

    #[tokio::test]
    async fn test_state_machine_forward_only() {
        let handle = WorkerHandle::spawn(test_config(fixtures::product_witness(2, 3))).unwrap();

        assert_eq!(handle.ping().await.unwrap(), (false, false, false));

        // out-of-order init is refused and the state stays put
        let err = handle.request(Request::InitWitness).await.unwrap_err();
        assert!(matches!(err, ProverError::WorkerNotReady(_)));
        assert_eq!(handle.ping().await.unwrap(), (false, false, false));

        handle.request(Request::InitModules).await.unwrap();
        assert_eq!(handle.ping().await.unwrap(), (true, false, false));

        handle.request(Request::InitWitness).await.unwrap();
        assert_eq!(handle.ping().await.unwrap(), (true, true, false));

        handle.request(Request::InitProver).await.unwrap();
        assert_eq!(handle.ping().await.unwrap(), (true, true, true));
    }

    #[tokio::test]
    async fn test_prove_verify_through_worker() {
        let witness = fixtures::product_witness(2, 3);
        let handle = ready_handle(witness.clone()).await;

        let response = handle
            .request(Request::Prove {
                inputs_json: "{}".into(),
            })
            .await
            .unwrap();
        let Response::Proof {
            compressed,
            on_chain,
        } = response
        else {
            panic!("expected proof response");
        };
        assert_eq!(on_chain.len(), 256);

        // public input is witness element 1
        let public_inputs = witness[32..64].to_vec();
        let response = handle
            .request(Request::Verify {
                proof: compressed,
                public_inputs,
            })
            .await
            .unwrap();
        assert_eq!(response, Response::Verified { valid: true });
    }

    #[tokio::test]
    async fn test_prove_before_ready() {
        let handle = WorkerHandle::spawn(test_config(fixtures::product_witness(2, 3))).unwrap();
        let err = handle
            .request(Request::Prove {
                inputs_json: "{}".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ProverError::WorkerNotReady(_)));
    }

    #[tokio::test]
    async fn test_vk_and_circuit_info() {
        let handle = ready_handle(fixtures::product_witness(2, 3)).await;

        let Response::Vk { compressed } = handle.request(Request::GetVk).await.unwrap() else {
            panic!("expected vk");
        };
        assert!(!compressed.is_empty());

        let Response::CircuitInfo { info } =
            handle.request(Request::GetCircuitInfo).await.unwrap()
        else {
            panic!("expected circuit info");
        };
        assert_eq!(info.num_public_inputs, 1);
        assert_eq!(info.num_wires, 4);
        assert_eq!(info.num_constraints, 1);
    }

    #[tokio::test]
    async fn test_cache_protocol() {
        let handle = WorkerHandle::spawn(test_config(fixtures::product_witness(2, 3))).unwrap();

        // nothing fetched yet
        let response = handle
            .request(Request::CheckCache { url: PK_URL.into() })
            .await
            .unwrap();
        assert_eq!(response, Response::CacheStatus { present: false });

        handle.request(Request::InitModules).await.unwrap();
        handle.request(Request::InitWitness).await.unwrap();
        handle.request(Request::InitProver).await.unwrap();

        let response = handle
            .request(Request::CheckCache { url: PK_URL.into() })
            .await
            .unwrap();
        assert_eq!(response, Response::CacheStatus { present: true });

        // check_cache is side-effect free: ask twice, same answer
        let again = handle
            .request(Request::CheckCache { url: PK_URL.into() })
            .await
            .unwrap();
        assert_eq!(again, Response::CacheStatus { present: true });

        handle.request(Request::ClearCache).await.unwrap();
        let response = handle
            .request(Request::CheckCache { url: PK_URL.into() })
            .await
            .unwrap();
        assert_eq!(response, Response::CacheStatus { present: false });
    }

    #[tokio::test]
    async fn test_ping_idempotent() {
        let handle = ready_handle(fixtures::product_witness(2, 3)).await;
        assert_eq!(handle.ping().await.unwrap(), handle.ping().await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_precedes_response() {
        let (progress_tx, progress_rx) = std_mpsc::channel();
        let mut config = test_config(fixtures::product_witness(2, 3));
        config.on_progress = Some(Box::new(move |id, progress| {
            let _ = progress_tx.send((id, progress.percent));
        }));

        let handle = WorkerHandle::spawn(config).unwrap();
        handle.request(Request::InitModules).await.unwrap();
        handle.request(Request::InitWitness).await.unwrap();

        // the memory provider emits 0% and 100% for the wasm fetch
        let frames: Vec<(u64, f32)> = progress_rx.try_iter().collect();
        assert!(frames.len() >= 2);
        assert_eq!(frames[0].1, 0.0);
        assert_eq!(frames.last().unwrap().1, 100.0);
    }

    #[tokio::test]
    async fn test_timeout_and_late_response_discarded() {
        struct SlowCalculator;
        impl crate::calculator::WitnessCalculator for SlowCalculator {
            fn calculate(&self, _inputs_json: &str) -> Result<Vec<u8>> {
                std::thread::sleep(Duration::from_millis(300));
                Ok(fixtures::product_witness(2, 3))
            }
        }

        let mut config = test_config(Vec::new());
        config.calculator_factory = Box::new(|_wasm| Ok(Box::new(SlowCalculator)));
        let handle = WorkerHandle::spawn(config).unwrap();
        handle.request(Request::InitModules).await.unwrap();
        handle.request(Request::InitWitness).await.unwrap();
        handle.request(Request::InitProver).await.unwrap();

        // force a timeout well below the calculator's sleep
        let err = handle
            .request_with_timeout(
                Request::Prove {
                    inputs_json: "{}".into(),
                },
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProverError::WorkerTimeout));

        // the worker finishes the abandoned prove, discards it, and keeps
        // serving requests
        assert_eq!(handle.ping().await.unwrap(), (true, true, true));
    }

    #[tokio::test]
    async fn test_spawn_handshake() {
        let handle = WorkerHandle::spawn(test_config(Vec::new()));
        assert!(handle.is_ok());
    }

    #[test]
    fn test_wire_format_round_trip() {
        let frame = RequestFrame {
            id: 7,
            body: Request::Prove {
                inputs_json: "{}".into(),
            },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"PROVE\""));
        let parsed = parse_request(&json).unwrap();
        assert_eq!(parsed.id, 7);
        assert_eq!(parsed.body, frame.body);
    }

    #[test]
    fn test_unknown_message_type() {
        let json = r#"{"id":1,"body":{"type":"SELF_DESTRUCT"}}"#;
        let err = parse_request(json).unwrap_err();
        match err {
            ProverError::UnknownMessageType(tag) => assert_eq!(tag, "SELF_DESTRUCT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_idempotency_classification() {
        assert!(Request::Ping.is_idempotent());
        assert!(Request::GetVk.is_idempotent());
        assert!(Request::GetCircuitInfo.is_idempotent());
        assert!(Request::CheckCache { url: "u".into() }.is_idempotent());
        assert!(!Request::Prove { inputs_json: String::new() }.is_idempotent());
        assert!(!Request::InitProver.is_idempotent());
        assert!(!Request::ClearCache.is_idempotent());
    }

    #[test]
    fn test_timeout_classification() {
        assert_eq!(
            Request::Prove { inputs_json: String::new() }.timeout(),
            PROVE_TIMEOUT
        );
        assert_eq!(Request::Ping.timeout(), DEFAULT_TIMEOUT);
    }
}
