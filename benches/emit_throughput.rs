// benches/emit_throughput.rs

use coflow::{AsyncEventEmitter, AsyncListener, EmitterOptions, EventEmitter, FlowError, Step, TaskPipeline};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use futures::FutureExt;
use tokio::runtime::Runtime;

// --- Benchmarking Constants ---
const LISTENER_COUNTS: [usize; 3] = [1, 16, 128];
const PIPELINE_STEPS: usize = 1_000;

fn emitter_with(listeners: usize) -> AsyncEventEmitter<u64, FlowError> {
  let emitter = AsyncEventEmitter::with_options(EmitterOptions::with_max_listeners(listeners as i64));
  for _ in 0..listeners {
    emitter
      .on("tick", AsyncListener::new(|next, n: u64| {
        black_box(n);
        next.done();
      }))
      .expect("capacity sized for the bench");
  }
  emitter
}

fn sync_emit(c: &mut Criterion) {
  let mut group = c.benchmark_group("emit_sync_listeners");
  for listeners in LISTENER_COUNTS {
    let emitter = emitter_with(listeners);
    group.throughput(Throughput::Elements(listeners as u64));
    group.bench_with_input(BenchmarkId::from_parameter(listeners), &listeners, |b, _| {
      b.iter(|| {
        let settled = emitter.emit("tick", black_box(7)).now_or_never();
        assert!(matches!(settled, Some(Ok(()))));
      })
    });
  }
  group.finish();
}

fn async_emit(c: &mut Criterion) {
  let rt = Runtime::new().expect("Failed to create Tokio runtime");
  let emitter = AsyncEventEmitter::<u64, FlowError>::with_options(EmitterOptions::with_max_listeners(16));
  for _ in 0..16 {
    emitter
      .on("tick", AsyncListener::from_future(|n| async move {
        black_box(n);
        Ok(())
      }))
      .expect("capacity sized for the bench");
  }

  let mut group = c.benchmark_group("emit_async_listeners");
  group.throughput(Throughput::Elements(16));
  group.bench_function("16", |b| {
    b.to_async(&rt).iter(|| async { emitter.emit("tick", black_box(7)).await.expect("emission failed") })
  });
  group.finish();
}

fn pipeline_run(c: &mut Criterion) {
  let task = TaskPipeline::<u64>::new();
  for _ in 0..PIPELINE_STEPS {
    task.chain(Step::new(|next, acc| next.proceed_with(acc.unwrap_or(0) + 1)));
  }

  let mut group = c.benchmark_group("pipeline");
  group.throughput(Throughput::Elements(PIPELINE_STEPS as u64));
  group.bench_function("synchronous_steps", |b| {
    b.iter(|| {
      task.start();
      black_box(task.status());
    })
  });
  group.finish();
}

criterion_group!(benches, sync_emit, async_emit, pipeline_run);
criterion_main!(benches);
