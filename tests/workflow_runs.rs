// YAML workflows executed through the executor.

mod common;

use common::{handler, reservoir_volume, well_volume};
use pipetlab::logs::Outcome;
use pipetlab::{
    ExecutionStatus, GridPos, LabError, Operation, OperationJournal, Workflow, WorkflowExecutor,
};

const FEED: &str = r#"
name: feed
description: fill two wells from the water reservoir
operations:
  - type: pick_tips
    holder: tips
  - type: add_medium
    source: res
    source_position: { col: 0, row: 0 }
    destination: plate
    destination_positions:
      - { col: 0, row: 0 }
      - { col: 1, row: 0 }
    volume_per_well: 100.0
  - type: discard_tips
  - type: home
"#;

#[test]
fn test_yaml_workflow_parses() {
    let wf = Workflow::from_yaml_str(FEED).unwrap();
    assert_eq!(wf.name, "feed");
    assert_eq!(wf.operations.len(), 4);
    assert_eq!(
        wf.operations[0],
        Operation::PickTips {
            holder: "tips".into(),
            positions: None
        }
    );
    assert_eq!(wf.operations[3], Operation::Home);
    assert_eq!(wf.operations[1].kind(), "add_medium");
}

#[test]
fn test_workflow_runs_to_completion() {
    let mut h = handler(false);
    let wf = Workflow::from_yaml_str(FEED).unwrap();
    let executor = WorkflowExecutor::default();

    let result = executor.execute(&mut h, &wf);

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.operations_completed, 4);
    assert_eq!(executor.journal().len(), 4);
    assert_eq!(executor.journal().failures(), 0);
    assert!((well_volume(&h, "plate", 0, 0) - 100.0).abs() < 1e-6);
    assert!((well_volume(&h, "plate", 1, 0) - 100.0).abs() < 1e-6);
    assert!(!h.has_tips());
}

#[test]
fn test_channel_mismatch_stops_the_run() {
    let yaml = r#"
name: mismatch
operations:
  - type: pick_tips
    holder: tips
  - type: add_medium
    source: res
    source_position: { col: 0, row: 0 }
    destination: plate
    destination_positions: [{ col: 0, row: 0 }]
    volume_per_well: 50.0
    channels: 8
  - type: home
"#;
    let mut h = handler(false);
    let wf = Workflow::from_yaml_str(yaml).unwrap();
    let executor = WorkflowExecutor::new(OperationJournal::new(16));

    let result = executor.execute(&mut h, &wf);

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.failed_operation_index, Some(1));
    assert_eq!(result.operations_completed, 1);
    assert!(result.error_message.unwrap().contains("8 channel"));
    let entries = executor.journal().entries();
    assert_eq!(entries.len(), 2);
    assert!(matches!(entries[1].outcome, Outcome::Failed(_)));
    assert_eq!(well_volume(&h, "plate", 0, 0), 0.0);
}

#[test]
fn test_per_operation_tip_change() {
    let yaml = r#"
name: fresh tips
operations:
  - type: add_medium
    source: res
    source_position: { col: 0, row: 0 }
    destination: plate
    destination_positions: [{ col: 0, row: 0 }]
    volume_per_well: 20.0
    change_tips: true
"#;
    let mut h = handler(false);
    let wf = Workflow::from_yaml_str(yaml).unwrap();
    let result = WorkflowExecutor::default().execute(&mut h, &wf);
    assert!(result.is_success(), "{result:?}");
    assert!(h.has_tips());
    // The setting applies to that operation only.
    assert!(!h.change_tips);
}

#[test]
fn test_invalid_workflows_are_rejected_before_running() {
    assert!(Workflow::from_yaml_str("name: empty\noperations: []\n").is_err());
    let zero = r#"
name: zero
operations:
  - type: suck
    labware: res
    position: { col: 0, row: 0 }
    volume: 0.0
"#;
    assert!(matches!(Workflow::from_yaml_str(zero), Err(LabError::InvalidInput(_))));
    let unknown = "name: x\noperations:\n  - type: centrifuge\n";
    assert!(Workflow::from_yaml_str(unknown).is_err());
}

#[test]
fn test_execute_from_resumes_mid_workflow() {
    let mut h = handler(false);
    h.pick_tips("tips", None).unwrap();
    let wf = Workflow::from_yaml_str(FEED).unwrap();

    let result = WorkflowExecutor::default().execute_from(&mut h, &wf, 1);

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.operations_completed, 4);
    assert!((well_volume(&h, "plate", 1, 0) - 100.0).abs() < 1e-6);
}

#[test]
fn test_executor_dry_run_leaves_state_untouched() {
    let mut h = handler(false);
    let wf = Workflow::from_yaml_str(FEED).unwrap();
    let executor = WorkflowExecutor::default();

    let result = executor.dry_run(&mut h, &wf).unwrap();

    assert!(result.is_success(), "{result:?}");
    assert_eq!(executor.journal().len(), 4);
    assert!(h.driver().commands().is_empty());
    assert!(!h.has_tips());
    assert_eq!(well_volume(&h, "plate", 0, 0), 0.0);
    assert!((reservoir_volume(&h, "res", 1) - 20000.0).abs() < 1e-6);
}

#[test]
fn test_abort_marks_the_run_aborted() {
    let mut h = handler(false);
    let wf = Workflow::from_yaml_str(FEED).unwrap();
    h.control().request_abort();

    let result = WorkflowExecutor::default().execute(&mut h, &wf);

    assert_eq!(result.status, ExecutionStatus::Aborted);
    assert_eq!(result.failed_operation_index, Some(0));
    assert!(!h.has_tips());
}

#[test]
fn test_describe_names_the_targets() {
    let op = Operation::Suck {
        labware: "res".into(),
        position: GridPos::new(0, 0),
        volume: 10.0,
    };
    assert!(op.describe().contains("res"));
}
