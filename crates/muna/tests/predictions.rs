use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use chrono::Utc;
use muna::schemas::{self, PredictionResource, Predictor, User};
use muna::{
    ClientError, ControlPlane, CreatePredictionRequest, Download, Downloader, Inputs, Muna,
    MunaError, Object, PredictionOptions, ResourceError, RuntimeError, Tensor,
};
use muna_runtime::testing::{fake_runtime, predictor_creations, predictor_resources};

/// Control plane that describes every tag as a local predictor.
#[derive(Default)]
struct FakeControlPlane {
    resources: HashMap<String, Vec<PredictionResource>>,
    requests: Mutex<Vec<CreatePredictionRequest>>,
}

impl FakeControlPlane {
    fn requests(&self) -> Vec<CreatePredictionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ControlPlane for FakeControlPlane {
    fn create_prediction(
        &self,
        request: &CreatePredictionRequest,
    ) -> Result<schemas::Prediction, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(schemas::Prediction {
            id: format!("pred_{}", self.requests.lock().unwrap().len()),
            tag: request.tag.clone(),
            configuration: Some("configuration-token".to_owned()),
            resources: self.resources.get(&request.tag).cloned(),
            results: Some(vec![serde_json::json!("from the cloud")]),
            latency: None,
            error: None,
            logs: None,
            created: Utc::now(),
        })
    }

    fn retrieve_predictor(&self, _tag: &str) -> Result<Option<Predictor>, ClientError> {
        Ok(None)
    }

    fn delete_predictor(&self, _tag: &str) -> Result<(), ClientError> {
        Ok(())
    }

    fn archive_predictor(&self, tag: &str) -> Result<(), ClientError> {
        Err(ClientError::Api {
            status: 403,
            message: format!("{tag} cannot be archived"),
        })
    }

    fn retrieve_user(&self) -> Result<Option<User>, ClientError> {
        Ok(None)
    }
}

#[derive(Default)]
struct CountingDownloader {
    opened: AtomicUsize,
}

impl Downloader for CountingDownloader {
    fn open(&self, url: &str) -> Result<Download, ResourceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let data = url.as_bytes().to_vec();
        Ok(Download {
            total: Some(data.len() as u64),
            reader: Box::new(Cursor::new(data)),
        })
    }
}

struct Harness {
    muna: Muna,
    control: Arc<FakeControlPlane>,
    downloader: Arc<CountingDownloader>,
    cache: tempfile::TempDir,
}

fn harness(resources: &[(&str, &[(&str, &str)])]) -> Harness {
    let cache = tempfile::tempdir().unwrap();
    let control = Arc::new(FakeControlPlane {
        resources: resources
            .iter()
            .map(|(tag, list)| {
                let list = list
                    .iter()
                    .map(|(kind, url)| PredictionResource {
                        kind: kind.to_string(),
                        url: url.to_string(),
                        name: None,
                    })
                    .collect();
                (tag.to_string(), list)
            })
            .collect(),
        requests: Mutex::new(Vec::new()),
    });
    let downloader = Arc::new(CountingDownloader::default());
    let muna = Muna::builder()
        .with_control_plane(control.clone())
        .with_downloader(downloader.clone())
        .with_runtime(fake_runtime())
        .with_cache_dir(cache.path())
        .build()
        .unwrap();
    Harness {
        muna,
        control,
        downloader,
        cache,
    }
}

#[test]
fn predictor_is_built_once_per_tag() {
    let tag = "@test/facade-resources";
    let h = harness(&[(
        tag,
        &[
            ("bin", "https://cdn.muna.ai/weights.bin"),
            ("dso", "https://cdn.muna.ai/libPredictor.so"),
        ],
    )]);

    let first = h
        .muna
        .predictions()
        .create(tag, Some(Inputs::new().with("x", 1)))
        .unwrap();
    let second = h
        .muna
        .predictions()
        .create(tag, Some(Inputs::new().with("x", 2)))
        .unwrap();

    assert_eq!(first.results.unwrap(), [Object::Int(1)]);
    assert_eq!(second.results.unwrap(), [Object::Int(2)]);
    assert_eq!(predictor_creations(tag), 1);
    assert_eq!(h.control.requests().len(), 1);
    assert_eq!(h.downloader.opened.load(Ordering::SeqCst), 2);
    let cache = h.cache.path();
    assert_eq!(
        predictor_resources(tag),
        [
            ("bin".to_owned(), cache.join("weights.bin").display().to_string()),
            ("dso".to_owned(), cache.join("libPredictor.so").display().to_string()),
        ]
    );
}

#[test]
fn native_prediction_record() {
    let tag = "@test/facade-record";
    let h = harness(&[]);
    let tensor = Tensor::new(vec![2, 3], vec![0.5f32, 1.0, 1.5, 2.0, 2.5, 3.0]).unwrap();

    let prediction = h
        .muna
        .predictions()
        .create(
            tag,
            Some(
                Inputs::new()
                    .with("flag", true)
                    .with("matrix", tensor.clone())
                    .with("name", "muna")
                    .with("options", serde_json::json!({ "temperature": 0.7 })),
            ),
        )
        .unwrap();

    assert_eq!(prediction.tag, tag);
    assert!(prediction.id.starts_with("pred_"));
    assert!(prediction.error.is_none());
    assert!(prediction.latency.is_some());
    assert!(prediction.logs.unwrap().contains(tag));
    assert_eq!(
        prediction.results.unwrap(),
        [
            Object::Bool(true),
            Object::Tensor(tensor),
            Object::from("muna"),
            Object::Mapping(
                serde_json::json!({ "temperature": 0.7 })
                    .as_object()
                    .unwrap()
                    .clone()
            ),
        ]
    );
}

#[test]
fn predictor_error_is_returned_not_raised() {
    let tag = "@test/facade-error";
    let h = harness(&[]);

    let prediction = h
        .muna
        .predictions()
        .create(tag, Some(Inputs::new().with("image", vec![1u8, 2, 3])))
        .unwrap();

    assert_eq!(prediction.error.as_deref(), Some("invalid input shape"));
    assert_eq!(prediction.results, None);
    assert!(matches!(
        prediction.into_result(),
        Err(MunaError::Prediction { ref message, .. }) if message == "invalid input shape"
    ));
}

#[test]
fn predictor_construction_failure_is_raised_and_not_cached() {
    let tag = "@test/facade-invalid";
    let h = harness(&[]);

    let err = h
        .muna
        .predictions()
        .create(tag, Some(Inputs::new().with("x", 1)))
        .unwrap_err();

    assert!(matches!(err, MunaError::Runtime(RuntimeError::NativeCall { .. })));
    assert!(!h.muna.predictions().is_loaded(tag));

    h.muna
        .predictions()
        .create(tag, Some(Inputs::new().with("x", 1)))
        .unwrap_err();
    assert_eq!(h.control.requests().len(), 2);
}

#[test]
fn raw_prediction_skips_the_runtime() {
    let tag = "@test/facade-raw";
    let h = harness(&[]);

    let prediction = h.muna.predictions().create(tag, None).unwrap();
    let overridden = h
        .muna
        .predictions()
        .create_with(
            tag,
            None,
            &PredictionOptions::default()
                .with_client_id("custom-client")
                .with_configuration_id("cfg_custom"),
        )
        .unwrap();

    assert_eq!(prediction.results.unwrap(), [Object::from("from the cloud")]);
    assert_eq!(overridden.configuration.as_deref(), Some("configuration-token"));
    assert_eq!(predictor_creations(tag), 0);
    assert!(!h.muna.predictions().is_loaded(tag));
    let requests = h.control.requests();
    assert_eq!(requests[0].client_id.as_deref(), Some("fake-linux-x86_64"));
    assert!(requests[0].configuration_id.as_deref().unwrap().starts_with("cfg_"));
    assert_eq!(requests[1].client_id.as_deref(), Some("custom-client"));
    assert_eq!(requests[1].configuration_id.as_deref(), Some("cfg_custom"));
}

#[test]
fn raw_prediction_without_runtime_sends_no_identifiers() {
    let cache = tempfile::tempdir().unwrap();
    let control = Arc::new(FakeControlPlane::default());
    let muna = Muna::builder()
        .with_control_plane(control.clone())
        .with_library_path(cache.path().join("libMissing.so"))
        .with_cache_dir(cache.path())
        .build()
        .unwrap();

    muna.predictions().create("@test/facade-cloud", None).unwrap();
    let err = muna
        .predictions()
        .create("@test/facade-cloud", Some(Inputs::new().with("x", 1)))
        .unwrap_err();

    let requests = control.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].client_id, None);
    assert_eq!(requests[0].configuration_id, None);
    assert!(matches!(err, MunaError::Runtime(RuntimeError::Library(_))));
}

#[test]
fn stream_yields_every_prediction() {
    let tag = "@test/facade-stream-4";
    let h = harness(&[]);

    let predictions: Vec<_> = h
        .muna
        .predictions()
        .stream(tag, Inputs::new().with("prompt", "hi"))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(predictions.len(), 4);
    for prediction in &predictions {
        assert_eq!(prediction.tag, tag);
        assert_eq!(prediction.results.as_deref(), Some(&[Object::from("hi")][..]));
    }
}

#[test]
fn stream_failure_ends_iteration() {
    let tag = "@test/facade-stream-fault-2";
    let h = harness(&[]);

    let mut stream = h
        .muna
        .predictions()
        .stream(tag, Inputs::new().with("prompt", "hi"))
        .unwrap();

    assert!(stream.next().unwrap().is_ok());
    assert!(stream.next().unwrap().is_ok());
    assert!(matches!(
        stream.next(),
        Some(Err(MunaError::Runtime(RuntimeError::NativeCall { .. })))
    ));
    assert!(stream.next().is_none());
}

#[test]
fn stream_outlives_deleted_predictor() {
    let tag = "@test/facade-stream-delete-3";
    let h = harness(&[]);

    let stream = h
        .muna
        .predictions()
        .stream(tag, Inputs::new().with("prompt", "hi"))
        .unwrap();
    assert!(h.muna.predictions().delete(tag));

    assert_eq!(stream.count(), 3);
}

#[test]
fn concurrent_callers_share_one_predictor() {
    let tag = "@test/facade-concurrent";
    let h = harness(&[(tag, &[("bin", "https://cdn.muna.ai/shared.bin")])]);
    let predictions = h.muna.predictions();

    std::thread::scope(|scope| {
        for i in 0..8 {
            scope.spawn(move || {
                let prediction = predictions
                    .create(tag, Some(Inputs::new().with("i", i)))
                    .unwrap();
                assert_eq!(prediction.results.unwrap(), [Object::Int(i as i64)]);
            });
        }
    });

    assert_eq!(predictor_creations(tag), 1);
    assert_eq!(h.downloader.opened.load(Ordering::SeqCst), 1);
}

/// Downloader that holds every download open until the test lets it finish.
struct GatedDownloader {
    started: Mutex<mpsc::Sender<String>>,
    proceed: Mutex<mpsc::Receiver<()>>,
}

impl Downloader for GatedDownloader {
    fn open(&self, url: &str) -> Result<Download, ResourceError> {
        self.started.lock().unwrap().send(url.to_owned()).unwrap();
        self.proceed.lock().unwrap().recv().unwrap();
        Ok(Download {
            total: Some(4),
            reader: Box::new(Cursor::new(b"slow".to_vec())),
        })
    }
}

#[test]
fn building_one_predictor_does_not_block_other_tags() {
    let fast = "@test/facade-gate-fast";
    let slow = "@test/facade-gate-slow";
    let cache = tempfile::tempdir().unwrap();
    let control = Arc::new(FakeControlPlane {
        resources: HashMap::from([(
            slow.to_owned(),
            vec![PredictionResource {
                kind: "bin".to_owned(),
                url: "https://cdn.muna.ai/gated.bin".to_owned(),
                name: None,
            }],
        )]),
        requests: Mutex::new(Vec::new()),
    });
    let (started_tx, started_rx) = mpsc::channel();
    let (proceed_tx, proceed_rx) = mpsc::channel();
    let muna = Muna::builder()
        .with_control_plane(control)
        .with_downloader(Arc::new(GatedDownloader {
            started: Mutex::new(started_tx),
            proceed: Mutex::new(proceed_rx),
        }))
        .with_runtime(fake_runtime())
        .with_cache_dir(cache.path())
        .build()
        .unwrap();
    let predictions = muna.predictions();
    predictions.create(fast, Some(Inputs::new().with("x", 1))).unwrap();

    std::thread::scope(|scope| {
        let building = scope.spawn(|| predictions.create(slow, Some(Inputs::new().with("x", 2))));
        assert_eq!(started_rx.recv().unwrap(), "https://cdn.muna.ai/gated.bin");

        let (done_tx, done_rx) = mpsc::channel();
        scope.spawn(move || {
            let cached = predictions.create(fast, Some(Inputs::new().with("x", 3)));
            done_tx.send(cached.map(|prediction| prediction.results)).unwrap();
        });
        let cached = done_rx.recv_timeout(Duration::from_secs(10));
        let slow_loaded = predictions.is_loaded(slow);
        proceed_tx.send(()).unwrap();

        assert_eq!(cached.unwrap().unwrap(), Some(vec![Object::Int(3)]));
        assert!(!slow_loaded);
        assert!(building.join().unwrap().is_ok());
    });

    assert!(predictions.is_loaded(slow));
    assert_eq!(predictor_creations(fast), 1);
    assert_eq!(predictor_creations(slow), 1);
}

struct PanickingDownloader;

impl Downloader for PanickingDownloader {
    fn open(&self, url: &str) -> Result<Download, ResourceError> {
        panic!("connection to {url} dropped");
    }
}

#[test]
fn panicked_download_worker_is_an_error() {
    let tag = "@test/facade-worker-panic";
    let cache = tempfile::tempdir().unwrap();
    let resource = |url: &str| PredictionResource {
        kind: "bin".to_owned(),
        url: url.to_owned(),
        name: None,
    };
    let control = Arc::new(FakeControlPlane {
        resources: HashMap::from([(
            tag.to_owned(),
            vec![
                resource("https://cdn.muna.ai/first.bin"),
                resource("https://cdn.muna.ai/second.bin"),
            ],
        )]),
        requests: Mutex::new(Vec::new()),
    });
    let muna = Muna::builder()
        .with_control_plane(control)
        .with_downloader(Arc::new(PanickingDownloader))
        .with_max_parallel_downloads(2)
        .with_runtime(fake_runtime())
        .with_cache_dir(cache.path())
        .build()
        .unwrap();

    let err = muna
        .predictions()
        .create(tag, Some(Inputs::new().with("x", 1)))
        .unwrap_err();

    assert!(matches!(err, MunaError::Resource(ResourceError::WorkerPanicked)));
    assert!(!muna.predictions().is_loaded(tag));
    assert_eq!(predictor_creations(tag), 0);
}

#[test]
fn delete_unloads_predictor() {
    let tag = "@test/facade-delete";
    let h = harness(&[]);
    let predictions = h.muna.predictions();

    predictions.create(tag, Some(Inputs::new().with("x", 1))).unwrap();
    assert!(predictions.is_loaded(tag));

    assert!(predictions.delete(tag));
    assert!(!predictions.delete(tag));
    assert!(!predictions.is_loaded(tag));

    predictions.create(tag, Some(Inputs::new().with("x", 1))).unwrap();
    assert_eq!(predictor_creations(tag), 2);
}

#[test]
fn unsupported_input_is_rejected() {
    let tag = "@test/facade-unsupported";
    let h = harness(&[]);

    let err = h
        .muna
        .predictions()
        .create(tag, Some(Inputs::new().with("big", i64::MAX)))
        .unwrap_err();

    assert!(matches!(err, MunaError::Runtime(RuntimeError::UnsupportedValue(_))));
}

#[test]
fn predictor_service_passes_errors_through() {
    let h = harness(&[]);

    assert!(h.muna.predictors().retrieve("@test/missing").unwrap().is_none());
    assert!(h.muna.users().retrieve().unwrap().is_none());
    let err = h.muna.predictors().archive("@test/locked").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Control plane error: @test/locked cannot be archived (Status Code: 403)"
    );
}
