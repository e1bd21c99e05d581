// tests/task.rs

use std::time::Duration;

use coflow::{Continuation, FlowError, Step, TaskPipeline, TaskStatus};
use futures::FutureExt;
use tokio_test::{assert_pending, assert_ready};
mod common;

use common::{Journal, Parking};

type Task = TaskPipeline<u32>;

fn recording(journal: &Journal, tag: &'static str) -> Step<u32> {
  let journal = journal.clone();
  Step::new(move |next: Continuation<u32>, args| {
    journal.push(format!("{}:{:?}", tag, args));
    next.proceed();
  })
}

fn parking(parked: &Parking<Continuation<u32>>) -> Step<u32> {
  let parked = parked.clone();
  Step::new(move |next, _| parked.park(next))
}

fn collect_errors(task: &Task) -> Parking<FlowError> {
  let errors = Parking::new();
  let sink = errors.clone();
  task.on_error(move |err| sink.park(err.clone()));
  errors
}

#[test]
fn steps_run_in_order_and_signal_done() {
  common::setup_tracing();
  let task = Task::new();
  let journal = Journal::new();
  let done = journal.clone();
  task
    .chain(recording(&journal, "a"))
    .then(|next, _| next.proceed_with(7))
    .chain(recording(&journal, "b"))
    .on_done(move || done.push("done"));

  task.start();
  assert_eq!(task.status(), TaskStatus::Completed);
  assert_eq!(journal.entries(), vec!["a:None", "b:Some(7)", "done"]);
  assert_eq!(task.cursor(), 3);
  assert_eq!(task.len(), 3);
}

#[test]
fn completed_task_can_run_again() {
  let task = Task::new();
  let journal = Journal::new();
  let done = journal.clone();
  task.chain(recording(&journal, "a")).on_done(move || done.push("done"));

  task.start();
  task.start();
  assert_eq!(journal.count("a:None"), 2);
  assert_eq!(journal.count("done"), 2);
}

#[test]
fn steps_chained_while_running_are_picked_up() {
  let task = Task::new();
  let journal = Journal::new();
  let parked = Parking::new();
  task.chain(parking(&parked));

  task.start();
  assert_eq!(task.status(), TaskStatus::Running);
  task.chain(recording(&journal, "late"));

  parked.take().proceed_with(3);
  assert_eq!(journal.entries(), vec!["late:Some(3)"]);
  assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn pause_takes_effect_at_the_next_boundary() {
  common::setup_tracing();
  let task = Task::new();
  let journal = Journal::new();
  let parked = Parking::new();
  task.chain(parking(&parked)).chain(recording(&journal, "second"));

  task.start();
  let mut paused = tokio_test::task::spawn(task.pause());
  assert_eq!(task.status(), TaskStatus::PrePause);
  assert_pending!(paused.poll());

  parked.take().proceed_with(5);
  assert!(paused.is_woken());
  assert_eq!(assert_ready!(paused.poll()), Ok(()));
  assert_eq!(task.status(), TaskStatus::Paused);
  assert!(journal.entries().is_empty(), "no step runs while paused");

  // Pausing again is a no-op that resolves at once.
  assert_eq!(task.pause().now_or_never(), Some(Ok(())));

  assert_eq!(task.resume().now_or_never(), Some(Ok(())));
  assert_eq!(journal.entries(), vec!["second:Some(5)"]);
  assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn resume_withdraws_a_pending_pause() {
  let task = Task::new();
  let journal = Journal::new();
  let parked = Parking::new();
  task.chain(parking(&parked)).chain(recording(&journal, "second"));

  task.start();
  let paused = task.pause();
  assert_eq!(task.resume().now_or_never(), Some(Ok(())));
  assert_eq!(paused.now_or_never(), Some(Err(FlowError::PauseInterrupted)));
  assert_eq!(task.status(), TaskStatus::Running);

  parked.take().proceed();
  assert_eq!(journal.entries(), vec!["second:None"]);
  assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn cancel_while_running_waits_for_the_step() {
  common::setup_tracing();
  let task = Task::new();
  let journal = Journal::new();
  let parked = Parking::new();
  task.chain(parking(&parked)).chain(recording(&journal, "second"));

  task.start();
  let paused = task.pause();
  let cancelled = task.cancel();
  assert_eq!(task.status(), TaskStatus::PreCancel);

  parked.take().proceed();
  assert_eq!(task.status(), TaskStatus::Cancelled);
  assert_eq!(cancelled.now_or_never(), Some(Ok(())));
  assert_eq!(paused.now_or_never(), Some(Err(FlowError::BeingCancelled)));
  assert!(journal.entries().is_empty());
}

#[test]
fn cancelled_task_cannot_be_started() {
  let task = Task::new();
  let parked = Parking::new();
  let errors = collect_errors(&task);
  task.chain(parking(&parked));

  task.start();
  let _ = task.pause();
  parked.take().proceed();
  assert_eq!(task.status(), TaskStatus::Paused);

  assert_eq!(task.cancel().now_or_never(), Some(Ok(())));
  assert_eq!(task.status(), TaskStatus::Cancelled);

  task.start();
  assert_eq!(task.status(), TaskStatus::Cancelled);
  assert_eq!(errors.take(), FlowError::InvalidStart(TaskStatus::Cancelled));
  assert_eq!(
    task.resume().now_or_never(),
    Some(Err(FlowError::NotRunning(TaskStatus::Cancelled)))
  );
}

#[test]
fn start_while_running_is_reported() {
  let task = Task::new();
  let parked = Parking::new();
  let errors = collect_errors(&task);
  task.chain(parking(&parked));

  task.start();
  task.start();
  let err = errors.take();
  assert_eq!(err, FlowError::InvalidStart(TaskStatus::Running));
  assert!(err.is_misuse());
  assert_eq!(parked.len(), 1, "the first step runs only once");
}

/// Builds a two-step task (the first step parks) and drives it into `status`.
fn task_in(status: TaskStatus) -> (Task, Parking<Continuation<u32>>, Parking<FlowError>) {
  let task = Task::new();
  let parked = Parking::new();
  let errors = collect_errors(&task);
  match status {
    TaskStatus::Completed => {
      task.then(|next, _| next.proceed());
      task.start();
    }
    _ => {
      task.chain(parking(&parked)).chain(parking(&parked));
      task.start();
      match status {
        TaskStatus::PrePause => drop(task.pause()),
        TaskStatus::Paused => {
          drop(task.pause());
          parked.take().proceed();
        }
        TaskStatus::PreCancel => drop(task.cancel()),
        _ => {}
      }
    }
  }
  assert_eq!(task.status(), status);
  (task, parked, errors)
}

#[test]
fn control_requests_follow_the_transition_table() {
  common::setup_tracing();
  let cells = [
    (TaskStatus::PreCancel, "pause", Some(Err(FlowError::NotRunning(TaskStatus::PreCancel)))),
    (TaskStatus::PreCancel, "resume", Some(Err(FlowError::NotRunning(TaskStatus::PreCancel)))),
    (TaskStatus::PreCancel, "cancel", None),
    (TaskStatus::PrePause, "resume", Some(Ok(()))),
    (TaskStatus::PrePause, "cancel", None),
    (TaskStatus::Paused, "pause", Some(Ok(()))),
    (TaskStatus::Completed, "pause", Some(Err(FlowError::NotRunning(TaskStatus::Completed)))),
    (TaskStatus::Completed, "resume", Some(Err(FlowError::NotRunning(TaskStatus::Completed)))),
    (TaskStatus::Completed, "cancel", Some(Err(FlowError::NotRunning(TaskStatus::Completed)))),
  ];

  for (status, request, expected) in cells {
    let (task, _parked, _errors) = task_in(status);
    let promise = match request {
      "pause" => task.pause(),
      "resume" => task.resume(),
      _ => task.cancel(),
    };
    assert_eq!(promise.now_or_never(), expected, "{} from {:?}", request, status);
  }
}

#[test]
fn repeated_cancel_settles_with_the_first_one() {
  let (task, parked, _errors) = task_in(TaskStatus::PreCancel);
  let mut again = tokio_test::task::spawn(task.cancel());
  assert_pending!(again.poll());
  assert_eq!(task.status(), TaskStatus::PreCancel);

  parked.take().proceed();
  assert_eq!(task.status(), TaskStatus::Cancelled);
  assert_eq!(assert_ready!(again.poll()), Ok(()));
  assert_eq!(parked.len(), 0, "no step runs after the cancel");
}

#[test]
fn start_is_rejected_outside_ready_and_completed() {
  for status in [
    TaskStatus::Running,
    TaskStatus::PrePause,
    TaskStatus::Paused,
    TaskStatus::PreCancel,
  ] {
    let (task, parked, errors) = task_in(status);
    let waiting = parked.len();
    task.start();
    assert_eq!(task.status(), status);
    assert_eq!(errors.take(), FlowError::InvalidStart(status));
    assert_eq!(errors.len(), 0);
    assert_eq!(parked.len(), waiting, "start from {:?} runs nothing", status);
  }
}

#[test]
fn reused_continuation_does_not_advance_twice() {
  common::setup_tracing();
  let task = Task::new();
  let journal = Journal::new();
  let errors = collect_errors(&task);
  task
    .then(|next, _| {
      let again = next.clone();
      next.proceed();
      assert!(again.is_called());
      again.proceed();
    })
    .chain(recording(&journal, "second"));

  task.start();
  assert_eq!(journal.entries(), vec!["second:None"]);
  assert_eq!(errors.take(), FlowError::ContinuationReused);
  assert_eq!(errors.len(), 0);
  assert_eq!(task.status(), TaskStatus::Completed);
}

#[test]
fn failing_step_halts_the_pipeline() {
  let task = Task::new();
  let journal = Journal::new();
  let parked = Parking::new();
  let errors = collect_errors(&task);
  task.chain(parking(&parked)).chain(recording(&journal, "second"));

  task.start();
  let paused = task.pause();
  parked.take().fail(FlowError::failed("disk full"));

  assert_eq!(task.status(), TaskStatus::Cancelled);
  assert_eq!(paused.now_or_never(), Some(Err(FlowError::failed("disk full"))));
  assert_eq!(errors.take(), FlowError::failed("disk full"));
  assert!(journal.entries().is_empty());
}

#[test]
fn signals_are_observable_directly() {
  let task = Task::new();
  let journal = Journal::new();
  let seen = journal.clone();
  task.signals().add_listener(
    coflow::task::DONE,
    coflow::SyncListener::observer(move |signal: &Option<FlowError>| seen.push(format!("{:?}", signal))),
  );
  task.start();
  assert_eq!(journal.entries(), vec!["None"]);
}

#[tokio::test]
async fn async_steps_forward_values() -> anyhow::Result<()> {
  common::setup_tracing();
  let task = Task::new();
  task
    .chain(Step::from_future(|_| async {
      tokio::time::sleep(Duration::from_millis(5)).await;
      Ok(Some(20))
    }))
    .chain(Step::from_future(|acc: Option<u32>| async move { Ok(acc.map(|n| n + 1)) }));

  let result = Parking::new();
  let sink = result.clone();
  task.chain(Step::new(move |next, acc| {
    sink.park(acc);
    next.proceed();
  }));

  let (tx, rx) = tokio::sync::oneshot::channel();
  let tx = parking_lot::Mutex::new(Some(tx));
  task.on_done(move || {
    if let Some(tx) = tx.lock().take() {
      let _ = tx.send(());
    }
  });

  task.start();
  tokio::time::timeout(Duration::from_secs(2), rx).await??;
  assert_eq!(result.take(), Some(21));
  assert_eq!(task.status(), TaskStatus::Completed);
  Ok(())
}

#[tokio::test]
async fn pause_from_another_task() -> anyhow::Result<()> {
  let task = Task::new();
  let journal = Journal::new();
  task
    .chain(Step::from_future(|_| async {
      tokio::time::sleep(Duration::from_millis(20)).await;
      Ok(Some(1))
    }))
    .chain(recording(&journal, "second"));

  task.start();
  let controller = task.clone();
  tokio::spawn(async move { controller.pause().await }).await??;
  assert_eq!(task.status(), TaskStatus::Paused);
  assert!(journal.entries().is_empty());

  task.resume().await?;
  assert_eq!(journal.entries(), vec!["second:Some(1)"]);
  Ok(())
}
