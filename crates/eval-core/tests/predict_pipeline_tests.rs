use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use eval_core::dataset::DatasetOpener;
use eval_core::store::{DataStore, RecordIter};
use eval_core::{DatasetRow, DatasetUri, EvalError, Features, InMemoryDataStore, InMemoryDatasetCatalog,
                InMemoryStatusStore, InMemoryTimeline, Metrics, PipelineConfig, PipelineHandler, PredictBatch,
                PredictInput, RowIndex, RunContext, RunStatus};
use serde_json::{json, Value};

struct Fixture {
    catalog: Arc<InMemoryDatasetCatalog>,
    store: Arc<InMemoryDataStore>,
    status: InMemoryStatusStore,
    timeline: InMemoryTimeline,
    uri: DatasetUri,
}

fn fixture(rows: i64) -> Fixture {
    let catalog = Arc::new(InMemoryDatasetCatalog::new());
    let data = (0..rows).map(|i| DatasetRow::new(i, Features::new().with("x", json!(i))))
                        .collect();
    let info: Metrics = [("source".to_string(), json!("unit"))].into_iter().collect();
    let uri = catalog.add("mnist", "v1", data, info);
    Fixture { catalog,
              store: Arc::new(InMemoryDataStore::new()),
              status: InMemoryStatusStore::default(),
              timeline: InMemoryTimeline::default(),
              uri }
}

fn x_of(f: &Features) -> Result<i64, eval_core::CallbackError> {
    f.json("x").and_then(Value::as_i64).ok_or_else(|| "missing x".into())
}

/// Duplica `x`; falla en cualquier batch que contenga la fila 2.
fn doubling(fail_on_two: bool) -> impl Fn(PredictInput<'_>) -> eval_core::CallbackResult<Value> + Send + Sync {
    move |input: PredictInput<'_>| {
        assert_eq!(input.dataset_info["source"], json!("unit"));
        match input.batch {
            PredictBatch::Single { features, .. } => {
                let x = x_of(features)?;
                if fail_on_two && x == 2 {
                    return Err("row 2 is broken".into());
                }
                Ok(json!(x * 2))
            }
            PredictBatch::Batch { features, .. } => {
                let xs = features.iter().map(|f| x_of(f)).collect::<Result<Vec<_>, _>>()?;
                if fail_on_two && xs.contains(&2) {
                    return Err("row 2 is broken".into());
                }
                Ok(json!(xs.iter().map(|x| x * 2).collect::<Vec<_>>()))
            }
        }
    }
}

fn config(batch: usize, ignore_error: bool) -> PipelineConfig {
    PipelineConfig { predict_batch_size: batch,
                     ignore_error,
                     flush_result: true,
                     ..PipelineConfig::default() }
}

fn results_table(ctx: &RunContext) -> String {
    format!("project/{}/eval/{}/results", ctx.project(), ctx.version())
}

fn stored_results(store: &InMemoryDataStore, ctx: &RunContext) -> Vec<(String, Value)> {
    let mut out: Vec<(String, Value)> = store.scan(&results_table(ctx))
                                             .unwrap()
                                             .map(|r| {
                                                 let r = r.unwrap();
                                                 (r.id.to_string(), r.fields["result"].clone())
                                             })
                                             .collect();
    out.sort_by_key(|(_, v)| v.as_i64());
    out
}

#[test]
fn predict_batches_and_logs_every_row() {
    let fx = fixture(5);
    let ctx = RunContext::new("self", "run1", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx.clone()).config(config(2, false))
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .predict(doubling(false))
                                                           .build()
                                                           .unwrap();
    assert_eq!(fx.status.current(), Some(RunStatus::Start));

    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.succeeded_rows, 5);
    assert_eq!(summary.failed_rows, 0);
    assert_eq!(fx.status.history(),
               vec![RunStatus::Start, RunStatus::Running, RunStatus::Success]);

    let results = stored_results(&fx.store, &ctx);
    let values: Vec<i64> = results.iter().filter_map(|(_, v)| v.as_i64()).collect();
    assert_eq!(values, vec![0, 2, 4, 6, 8]);
    assert_eq!(results[1].0, "dataset-mnist-v1_#@#_1");

    let events = fx.timeline.events();
    assert_eq!(events.len(), 5);
    assert!(events.iter().all(|e| e.status && e.exception.is_empty()));
    assert_eq!(events[0].index_with_dataset.as_deref(), Some("dataset-mnist-v1_#@#_0"));
}

#[test]
fn ignore_error_skips_failed_batch_and_succeeds() {
    let fx = fixture(5);
    let ctx = RunContext::new("self", "run2", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx.clone()).config(config(2, true))
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .predict(doubling(true))
                                                           .build()
                                                           .unwrap();
    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.succeeded_rows, 3);
    assert_eq!(summary.failed_rows, 2);
    assert_eq!(fx.status.current(), Some(RunStatus::Success));

    let values: Vec<i64> = stored_results(&fx.store, &ctx).iter().filter_map(|(_, v)| v.as_i64()).collect();
    assert_eq!(values, vec![0, 2, 8]);

    let failed: Vec<_> = fx.timeline.events().into_iter().filter(|e| !e.status).collect();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0].index, Some(RowIndex::Int(2)));
    assert_eq!(failed[1].index, Some(RowIndex::Int(3)));
    assert!(failed.iter().all(|e| e.exception == "row 2 is broken"));
}

#[test]
fn fail_fast_stops_at_first_failing_batch() {
    let fx = fixture(5);
    let dispatched = Arc::new(AtomicUsize::new(0));
    let counter = dispatched.clone();
    let inner = doubling(true);
    let ctx = RunContext::new("self", "run3", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx.clone()).config(config(2, false))
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .predict(move |input: PredictInput<'_>| {
                                                               counter.fetch_add(input.batch.len(), Ordering::SeqCst);
                                                               inner(input)
                                                           })
                                                           .build()
                                                           .unwrap();
    let err = handler.run_predict().unwrap_err();
    assert_eq!(err,
               EvalError::ItemProcessing { indices: vec![RowIndex::Int(2), RowIndex::Int(3)],
                                           message: "row 2 is broken".into() });
    assert_eq!(fx.status.current(), Some(RunStatus::Failed));
    // la fila 4 nunca llega al callback
    assert_eq!(dispatched.load(Ordering::SeqCst), 4);
    assert_eq!(fx.timeline.events().len(), 4);

    // los resultados ya producidos se escriben al cerrar el handler
    handler.close().unwrap();
    assert_eq!(fx.store.row_count(&results_table(&ctx)), 2);
    assert!(fx.timeline.is_closed());
}

#[test]
fn single_row_mode_reports_each_row() {
    let fx = fixture(3);
    let ctx = RunContext::new("self", "run4", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx.clone()).config(config(1, true))
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .ppl(doubling(true))
                                                           .build()
                                                           .unwrap();
    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.failed_rows, 1);
    assert_eq!(fx.timeline.events().iter().filter(|e| e.status).count(), 2);
}

#[test]
fn batch_result_of_wrong_shape_is_an_item_failure() {
    let fx = fixture(4);
    let ctx = RunContext::new("self", "run5", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx).config(config(2, true))
                                                   .status_store(fx.status.clone())
                                                   .timeline(fx.timeline.clone())
                                                   .data_store(fx.store.clone())
                                                   .datasets(fx.catalog.clone())
                                                   .predict(|_| Ok(json!("not a list")))
                                                   .build()
                                                   .unwrap();
    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.failed_rows, 4);
    assert!(fx.timeline.events().iter().all(|e| !e.status));
}

#[test]
fn auto_log_off_writes_no_results() {
    let fx = fixture(3);
    let ctx = RunContext::new("self", "run6", "predict", 0, vec![fx.uri.to_string()]);
    let cfg = PipelineConfig { predict_auto_log: false,
                               ..config(1, false) };
    let mut handler = PipelineHandler::builder(ctx.clone()).config(cfg)
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .predict(doubling(false))
                                                           .build()
                                                           .unwrap();
    handler.run_predict().unwrap();
    drop(handler);
    assert_eq!(fx.store.row_count(&results_table(&ctx)), 0);
    assert_eq!(fx.timeline.events().len(), 3);
}

#[test]
fn ignore_dataset_data_drops_features_from_results() {
    let fx = fixture(2);
    let ctx = RunContext::new("self", "run7", "predict", 0, vec![fx.uri.to_string()]);
    let cfg = PipelineConfig { ignore_dataset_data: true,
                               ..config(1, false) };
    let mut handler = PipelineHandler::builder(ctx.clone()).config(cfg)
                                                           .status_store(fx.status.clone())
                                                           .timeline(fx.timeline.clone())
                                                           .data_store(fx.store.clone())
                                                           .datasets(fx.catalog.clone())
                                                           .predict(doubling(false))
                                                           .build()
                                                           .unwrap();
    handler.run_predict().unwrap();
    let records: Vec<_> = handler.evaluation_store()
                                 .get_results()
                                 .unwrap()
                                 .map(|r| r.unwrap())
                                 .collect();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.features.is_empty()));
}

/// Opener que cuenta aperturas: verifica que los errores de configuración
/// ocurren antes de tocar el dataset.
struct CountingOpener {
    inner: Arc<InMemoryDatasetCatalog>,
    opened: Mutex<usize>,
}

impl DatasetOpener for CountingOpener {
    fn open(&self, uri: &DatasetUri, readonly: bool) -> Result<Box<dyn eval_core::Dataset>, EvalError> {
        *self.opened.lock().unwrap() += 1;
        self.inner.open(uri, readonly)
    }
}

#[test]
fn configuration_errors_happen_before_dataset_io() {
    let fx = fixture(2);
    let opener = Arc::new(CountingOpener { inner: fx.catalog.clone(),
                                           opened: Mutex::new(0) });

    // predict + ppl
    let err = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, vec![fx.uri.to_string()]))
        .status_store(InMemoryStatusStore::default())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .datasets(opener.clone())
        .predict(doubling(false))
        .ppl(doubling(false))
        .build()
        .err()
        .unwrap();
    assert_eq!(err, EvalError::config("predict and ppl cannot be defined at the same time"));

    // ningún rol de predict
    let status = InMemoryStatusStore::default();
    let mut handler = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, vec![fx.uri.to_string()]))
        .status_store(status.clone())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .datasets(opener.clone())
        .build()
        .unwrap();
    let err = handler.run_predict().unwrap_err();
    assert_eq!(err, EvalError::config("predict or ppl must be defined, predict function is recommended"));
    assert_eq!(status.current(), Some(RunStatus::Failed));

    // sin datasets
    let mut handler = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, vec![]))
        .status_store(InMemoryStatusStore::default())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .datasets(opener.clone())
        .predict(doubling(false))
        .build()
        .unwrap();
    assert_eq!(handler.run_predict().unwrap_err(), EvalError::config("context.dataset_uris is empty"));

    // dos referencias al mismo prefijo
    let refs = vec!["mnist/v1".to_string(), "dataset/mnist/version/v1".to_string()];
    let mut handler = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, refs))
        .status_store(InMemoryStatusStore::default())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .datasets(opener.clone())
        .predict(doubling(false))
        .build()
        .unwrap();
    assert!(handler.run_predict().unwrap_err().is_configuration());

    assert_eq!(*opener.opened.lock().unwrap(), 0);
}

#[test]
fn context_refs_take_precedence_over_config() {
    let fx = fixture(2);
    let cfg = PipelineConfig { dataset_uris: vec!["other/v9".into()],
                               ..PipelineConfig::default() };
    let handler = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, vec![fx.uri.to_string()]))
        .config(cfg.clone())
        .status_store(InMemoryStatusStore::default())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .build()
        .unwrap();
    assert_eq!(handler.dataset_uris(), &[fx.uri.to_string()]);

    let handler = PipelineHandler::builder(RunContext::new("self", "r", "predict", 0, vec![]))
        .config(cfg)
        .status_store(InMemoryStatusStore::default())
        .timeline(InMemoryTimeline::default())
        .data_store(fx.store.clone())
        .build()
        .unwrap();
    assert_eq!(handler.dataset_uris(), &["other/v9".to_string()]);
}

#[test]
fn second_phase_on_same_handler_is_rejected() {
    let fx = fixture(1);
    let mut handler = PipelineHandler::builder(RunContext::new("self", "r8", "predict", 0, vec![fx.uri.to_string()]))
        .status_store(fx.status.clone())
        .timeline(fx.timeline.clone())
        .data_store(fx.store.clone())
        .datasets(fx.catalog.clone())
        .predict(doubling(false))
        .build()
        .unwrap();
    handler.run_predict().unwrap();
    let err = handler.run_predict().unwrap_err();
    assert_eq!(err,
               EvalError::InvalidStatusTransition { from: RunStatus::Success,
                                                    to: RunStatus::Running });
    assert_eq!(fx.status.current(), Some(RunStatus::Success));
}

#[test]
fn panicking_callback_marks_run_failed() {
    let fx = fixture(4);
    let ctx = RunContext::new("self", "r9", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx).config(config(1, false))
                                                   .status_store(fx.status.clone())
                                                   .timeline(fx.timeline.clone())
                                                   .data_store(fx.store.clone())
                                                   .datasets(fx.catalog.clone())
                                                   .predict(|input: PredictInput<'_>| {
                                                       if let PredictBatch::Single { index: RowIndex::Int(1), .. } = input.batch {
                                                           panic!("user bug");
                                                       }
                                                       Ok(json!(0))
                                                   })
                                                   .build()
                                                   .unwrap();
    let err = handler.run_predict().unwrap_err();
    assert_eq!(err,
               EvalError::ItemProcessing { indices: vec![RowIndex::Int(1)],
                                           message: "panic in user callback: user bug".into() });
    assert_eq!(fx.status.current(), Some(RunStatus::Failed));
    let events = fx.timeline.events();
    assert_eq!(events.len(), 2);
    assert!(events[0].status);
    assert_eq!(events[1].exception, "panic in user callback: user bug");
}

#[test]
fn panicking_callback_is_an_item_failure_under_ignore_error() {
    let fx = fixture(3);
    let ctx = RunContext::new("self", "r10", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx).config(config(1, true))
                                                   .status_store(fx.status.clone())
                                                   .timeline(fx.timeline.clone())
                                                   .data_store(fx.store.clone())
                                                   .datasets(fx.catalog.clone())
                                                   .predict(|input: PredictInput<'_>| match input.batch {
                                                       PredictBatch::Single { index: RowIndex::Int(0), .. } => {
                                                           panic!("{}", String::from("owned message"))
                                                       }
                                                       _ => Ok(json!(1)),
                                                   })
                                                   .build()
                                                   .unwrap();
    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.failed_rows, 1);
    assert_eq!(summary.succeeded_rows, 2);
    assert_eq!(fx.status.current(), Some(RunStatus::Success));
    assert_eq!(fx.timeline.events()[0].exception, "panic in user callback: owned message");
}

/// Almacén cuyas escrituras fallan siempre.
struct BrokenStore;

impl DataStore for BrokenStore {
    fn put(&self, table: &str, _id: &RowIndex, _fields: Metrics) -> Result<(), EvalError> {
        Err(EvalError::Store(format!("{table}: disk full")))
    }

    fn scan(&self, _table: &str) -> Result<RecordIter, EvalError> {
        Ok(Box::new(std::iter::empty()))
    }
}

#[test]
fn result_write_failure_fails_the_run() {
    let fx = fixture(3);
    let ctx = RunContext::new("self", "r11", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx).config(PipelineConfig::default())
                                                   .status_store(fx.status.clone())
                                                   .timeline(fx.timeline.clone())
                                                   .data_store(Arc::new(BrokenStore))
                                                   .datasets(fx.catalog.clone())
                                                   .predict(doubling(false))
                                                   .build()
                                                   .unwrap();
    let err = handler.run_predict().unwrap_err();
    assert!(matches!(err, EvalError::Store(ref m) if m.ends_with("disk full")));
    assert_eq!(fx.status.current(), Some(RunStatus::Failed));
    assert_eq!(fx.timeline.events().len(), 3);
}

#[test]
fn close_reports_results_it_could_not_write() {
    let fx = fixture(5);
    let ctx = RunContext::new("self", "r12", "predict", 0, vec![fx.uri.to_string()]);
    let mut handler = PipelineHandler::builder(ctx).config(config(2, false))
                                                   .status_store(fx.status.clone())
                                                   .timeline(fx.timeline.clone())
                                                   .data_store(Arc::new(BrokenStore))
                                                   .datasets(fx.catalog.clone())
                                                   .predict(doubling(true))
                                                   .build()
                                                   .unwrap();
    assert!(matches!(handler.run_predict(), Err(EvalError::ItemProcessing { .. })));
    // filas 0 y 1 quedaron en el buffer
    assert_eq!(handler.evaluation_store().pending_results(), 2);
    assert!(matches!(handler.close(), Err(EvalError::Store(_))));
    assert!(fx.timeline.is_closed());
}

#[test]
fn index_with_dataset_is_unique_across_datasets() {
    let catalog = Arc::new(InMemoryDatasetCatalog::new());
    let info: Metrics = [("source".to_string(), json!("unit"))].into_iter().collect();
    let refs: Vec<String> = ["a", "b"].iter()
                                      .map(|name| {
                                          let rows = (0..4).map(|i| DatasetRow::new(i, Features::new().with("x", json!(i))))
                                                           .collect();
                                          catalog.add(name, "v1", rows, info.clone()).to_string()
                                      })
                                      .collect();
    let store = Arc::new(InMemoryDataStore::new());
    let timeline = InMemoryTimeline::default();
    let ctx = RunContext::new("self", "r13", "predict", 0, refs);
    let mut handler = PipelineHandler::builder(ctx.clone()).config(config(3, false))
                                                           .status_store(InMemoryStatusStore::default())
                                                           .timeline(timeline.clone())
                                                           .data_store(store.clone())
                                                           .datasets(catalog)
                                                           .predict(doubling(false))
                                                           .build()
                                                           .unwrap();
    let summary = handler.run_predict().unwrap();
    assert_eq!(summary.datasets, 2);
    assert_eq!(summary.succeeded_rows, 8);

    let result_ids: HashSet<String> = stored_results(&store, &ctx).into_iter().map(|(id, _)| id).collect();
    let timeline_ids: HashSet<String> = timeline.events()
                                                .into_iter()
                                                .filter_map(|e| e.index_with_dataset)
                                                .collect();
    assert_eq!(result_ids.len(), 8);
    assert_eq!(result_ids, timeline_ids);
    for prefix in ["dataset-a-v1_#@#_", "dataset-b-v1_#@#_"] {
        assert_eq!(result_ids.iter().filter(|id| id.starts_with(prefix)).count(), 4);
    }
}
