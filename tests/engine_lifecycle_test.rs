//! Engine lifecycle tests against the simulated robot behind a hardware worker.
//!
//! Covers command status transitions, id generation, pause/resume, stop while
//! a command is in flight, and hardware faults ending a run.

use protocol_engine::commands::*;
use protocol_engine::engine::{EngineDependencies, ProtocolEngine};
use protocol_engine::execution::EngineStatus;
use protocol_engine::hardware::{HardwareApi, HardwareCall, HardwareHandle, SimulatedHardware};
use protocol_engine::resources::InMemoryLabwareProvider;
use protocol_engine::types::{DeckSlotName, LabwareLocation, Mount, PipetteName};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn engine_with(simulator: &Arc<SimulatedHardware>) -> ProtocolEngine {
    let device: Arc<dyn HardwareApi> = Arc::clone(simulator) as Arc<dyn HardwareApi>;
    let (hardware, _worker) = HardwareHandle::spawn(device, 16);
    ProtocolEngine::new(EngineDependencies::new(
        Arc::new(hardware),
        Arc::new(InMemoryLabwareProvider::with_builtin()),
    ))
}

fn load_pipette(pipette_id: &str) -> CommandRequest {
    CommandData::LoadPipette(LoadPipetteData {
        pipette_name: PipetteName::P300Single,
        mount: Mount::Left,
        pipette_id: Some(pipette_id.to_string()),
    })
    .into()
}

fn load_labware(load_name: &str, slot: DeckSlotName, labware_id: Option<&str>) -> CommandRequest {
    CommandData::LoadLabware(LoadLabwareData {
        location: LabwareLocation::slot(slot),
        load_name: load_name.to_string(),
        namespace: "opentrons".to_string(),
        version: 1,
        labware_id: labware_id.map(str::to_string),
    })
    .into()
}

fn pick_up_tip(well: &str) -> CommandRequest {
    CommandData::PickUpTip(PickUpTipData {
        pipette_id: "pipette-id".into(),
        labware_id: "tiprack-id".into(),
        well_name: well.into(),
    })
    .into()
}

fn drop_tip(well: &str) -> CommandRequest {
    CommandData::DropTip(DropTipData {
        pipette_id: "pipette-id".into(),
        labware_id: "tiprack-id".into(),
        well_name: well.into(),
    })
    .into()
}

fn tip_setup() -> Vec<CommandRequest> {
    vec![
        load_pipette("pipette-id"),
        load_labware(
            "opentrons_96_tiprack_300ul",
            DeckSlotName::Slot1,
            Some("tiprack-id"),
        ),
    ]
}

async fn wait_until_running(engine: &ProtocolEngine, command_id: &str) {
    let mut state_rx = engine.subscribe_state();
    timeout(WAIT, async {
        loop {
            if engine.state().commands().get_running().map(String::as_str) == Some(command_id) {
                return;
            }
            state_rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

async fn wait_for_status(engine: &ProtocolEngine, status: EngineStatus) {
    let mut status_rx = engine.subscribe_status();
    timeout(WAIT, async {
        while *status_rx.borrow_and_update() != status {
            status_rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap();
}

async fn wait_for_halt(simulator: &SimulatedHardware) {
    // The worker handles halts on its own task.
    timeout(WAIT, async {
        while !simulator.calls().contains(&HardwareCall::Halt) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_statuses_and_timestamps_are_monotonic() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);

    let mut ids = Vec::new();
    for request in tip_setup().into_iter().chain([pick_up_tip("A1"), drop_tip("A1")]) {
        ids.push(engine.add_command(request).unwrap().id);
    }
    engine.play().unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    let state = engine.state();
    let mut previous_completed = None;
    for id in &ids {
        let command = state.commands().get(id).unwrap();
        assert_eq!(command.status, CommandStatus::Succeeded, "{:?}", command);
        let started = command.started_at.unwrap();
        let completed = command.completed_at.unwrap();
        assert!(command.created_at <= started);
        assert!(started <= completed);
        if let Some(previous) = previous_completed {
            // FIFO: each command starts after the previous one finished.
            assert!(previous <= started);
        }
        previous_completed = Some(completed);
        assert!(command.result.is_some());
        assert!(command.error.is_none());
    }
}

#[tokio::test]
async fn test_identical_loads_get_distinct_labware() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);
    engine.play().unwrap();

    let first = engine
        .execute_command(load_labware(
            "corning_96_wellplate_360ul_flat",
            DeckSlotName::Slot2,
            None,
        ))
        .await
        .unwrap();
    let second = engine
        .execute_command(load_labware(
            "corning_96_wellplate_360ul_flat",
            DeckSlotName::Slot3,
            None,
        ))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    let labware_ids: Vec<String> = [first, second]
        .into_iter()
        .map(|command| match command.result {
            Some(CommandResult::LoadLabware(result)) => result.labware_id,
            other => panic!("unexpected result {:?}", other),
        })
        .collect();
    assert_ne!(labware_ids[0], labware_ids[1]);
    assert_eq!(engine.state().labware().get_all().len(), 2);
}

#[tokio::test]
async fn test_occupied_slot_fails_the_run() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);

    engine
        .add_command(load_labware("nest_12_reservoir_15ml", DeckSlotName::Slot4, None))
        .unwrap();
    let clash = engine
        .add_command(load_labware("nest_12_reservoir_15ml", DeckSlotName::Slot4, None))
        .unwrap();
    let never = engine.add_command(load_pipette("pipette-id")).unwrap();
    engine.play().unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    let state = engine.state();
    let failed = state.commands().get(&clash.id).unwrap();
    assert_eq!(failed.status, CommandStatus::Failed);
    assert_eq!(failed.error.as_ref().unwrap().error_type, "SlotOccupiedError");
    assert_eq!(
        state.commands().get(&never.id).unwrap().status,
        CommandStatus::Queued
    );
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert_eq!(engine.run_error().unwrap().error_type, "SlotOccupiedError");
}

#[tokio::test]
async fn test_stop_cancels_in_flight_command_and_leaves_queue() {
    let simulator = Arc::new(SimulatedHardware::new().with_move_delay(Duration::from_secs(10)));
    let engine = engine_with(&simulator);

    for request in tip_setup() {
        engine.add_command(request).unwrap();
    }
    let in_flight = engine.add_command(pick_up_tip("A1")).unwrap();
    let queued: Vec<String> = ["B1", "C1"]
        .iter()
        .map(|well| engine.add_command(pick_up_tip(well)).unwrap().id)
        .collect();

    engine.play().unwrap();
    wait_until_running(&engine, &in_flight.id).await;
    engine.stop().await.unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    let state = engine.state();
    let all = state.commands().get_all();
    let failed: Vec<&Command> = all
        .iter()
        .filter(|c| c.status == CommandStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, in_flight.id);
    assert_eq!(failed[0].error.as_ref().unwrap().error_type, "CancelledError");

    for id in &queued {
        assert_eq!(state.commands().get(id).unwrap().status, CommandStatus::Queued);
    }
    assert!(state.commands().get_running().is_none());
    // Cancellation is not a run failure.
    assert!(engine.run_error().is_none());
    wait_for_halt(&simulator).await;
}

#[tokio::test]
async fn test_pause_command_holds_queue_until_play() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);

    engine.add_command(load_pipette("pipette-id")).unwrap();
    let pause = engine
        .add_command(
            CommandData::Pause(PauseData {
                message: Some("refill reservoir".into()),
            })
            .into(),
        )
        .unwrap();
    let after = engine
        .add_command(load_labware("nest_12_reservoir_15ml", DeckSlotName::Slot5, None))
        .unwrap();

    engine.play().unwrap();
    wait_for_status(&engine, EngineStatus::Paused).await;
    let paused = engine.wait_for_command(&pause.id).await.unwrap();
    assert_eq!(paused.status, CommandStatus::Succeeded);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        engine.state().commands().get(&after.id).unwrap().status,
        CommandStatus::Queued
    );

    engine.play().unwrap();
    let done = timeout(WAIT, engine.wait_for_command(&after.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, CommandStatus::Succeeded);
}

#[tokio::test]
async fn test_pause_during_command_never_runs_twice() {
    let simulator = Arc::new(SimulatedHardware::new().with_move_delay(Duration::from_millis(50)));
    let engine = engine_with(&simulator);

    for request in tip_setup() {
        engine.add_command(request).unwrap();
    }
    let pick_up = engine.add_command(pick_up_tip("A1")).unwrap();
    let drop = engine.add_command(drop_tip("A1")).unwrap();

    engine.play().unwrap();
    wait_until_running(&engine, &pick_up.id).await;
    engine.pause();

    // The in-flight command still finishes.
    let finished = timeout(WAIT, engine.wait_for_command(&pick_up.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(finished.status, CommandStatus::Succeeded);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        engine.state().commands().get(&drop.id).unwrap().status,
        CommandStatus::Queued
    );

    engine.play().unwrap();
    engine.play().unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    let calls = simulator.calls();
    let count = |pred: fn(&HardwareCall) -> bool| calls.iter().filter(|c| pred(c)).count();
    assert_eq!(count(|c| matches!(c, HardwareCall::CacheInstruments(_))), 1);
    assert_eq!(count(|c| matches!(c, HardwareCall::PickUpTip { .. })), 1);
    assert_eq!(count(|c| matches!(c, HardwareCall::DropTip { .. })), 1);
}

#[tokio::test]
async fn test_hardware_fault_stops_the_run() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);

    for request in tip_setup() {
        engine.add_command(request).unwrap();
    }
    let faulted = engine.add_command(pick_up_tip("A1")).unwrap();
    let skipped = engine.add_command(drop_tip("A1")).unwrap();

    simulator.fail_next_move("gantry stalled");
    engine.play().unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    let state = engine.state();
    let command = state.commands().get(&faulted.id).unwrap();
    assert_eq!(command.status, CommandStatus::Failed);
    let error = command.error.as_ref().unwrap();
    assert_eq!(error.error_type, "HardwareFaultError");
    assert!(error.detail.contains("gantry stalled"));

    assert_eq!(
        state.commands().get(&skipped.id).unwrap().status,
        CommandStatus::Queued
    );
    assert_eq!(engine.status(), EngineStatus::Stopped);
    assert_eq!(engine.run_error().as_ref(), Some(error));
    // No partial effects: a failed move never updates the current well.
    assert!(state.pipettes().get_current_well().is_none());
}

#[tokio::test]
async fn test_commands_can_be_added_while_running() {
    let simulator = Arc::new(SimulatedHardware::new().with_move_delay(Duration::from_millis(20)));
    let engine = engine_with(&simulator);
    engine.play().unwrap();

    for request in tip_setup() {
        engine.add_command(request).unwrap();
    }
    let first = engine.add_command(pick_up_tip("A1")).unwrap();
    wait_until_running(&engine, &first.id).await;
    let second = engine.add_command(drop_tip("A1")).unwrap();

    let done = timeout(WAIT, engine.wait_for_command(&second.id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.status, CommandStatus::Succeeded);
    assert_eq!(engine.status(), EngineStatus::Running);
}

#[tokio::test]
async fn test_pipette_id_cannot_be_loaded_twice() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);
    engine.play().unwrap();

    let first = engine.execute_command(load_pipette("p")).await.unwrap();
    let second = engine
        .execute_command(
            CommandData::LoadPipette(LoadPipetteData {
                pipette_name: PipetteName::P300Single,
                mount: Mount::Right,
                pipette_id: Some("p".into()),
            })
            .into(),
        )
        .await
        .unwrap();

    assert_eq!(first.status, CommandStatus::Succeeded);
    assert_eq!(second.status, CommandStatus::Failed);
    assert_eq!(
        second.error.as_ref().unwrap().error_type,
        "PipetteAlreadyLoadedError"
    );

    let state = engine.state();
    assert_eq!(state.pipettes().get_all().len(), 1);
    assert_eq!(state.pipettes().get("p").unwrap().mount, Mount::Left);
    assert!(state.pipettes().get_by_mount(Mount::Right).is_none());
}

#[tokio::test]
async fn test_unknown_labware_fails_without_touching_hardware() {
    let simulator = Arc::new(SimulatedHardware::new());
    let engine = engine_with(&simulator);
    engine.play().unwrap();

    engine.execute_command(load_pipette("p")).await.unwrap();
    let before = simulator.boundary_call_count();

    let command = engine
        .execute_command(
            CommandData::MoveToWell(MoveToWellData {
                pipette_id: "p".into(),
                labware_id: "no-such-labware".into(),
                well_name: "A1".into(),
                well_location: Default::default(),
            })
            .into(),
        )
        .await
        .unwrap();

    assert_eq!(command.status, CommandStatus::Failed);
    assert_eq!(
        command.error.as_ref().unwrap().error_type,
        "LabwareDoesNotExistError"
    );
    assert_eq!(simulator.boundary_call_count(), before);
}

#[tokio::test]
async fn test_nothing_starts_after_stop() {
    let simulator = Arc::new(SimulatedHardware::new().with_move_delay(Duration::from_secs(60)));
    let engine = engine_with(&simulator);

    for request in tip_setup() {
        engine.add_command(request).unwrap();
    }
    let in_flight = engine.add_command(pick_up_tip("A1")).unwrap();
    let queued: Vec<_> = (0..3)
        .map(|_| engine.add_command(drop_tip("A1")).unwrap().id)
        .collect();

    engine.play().unwrap();
    wait_until_running(&engine, &in_flight.id).await;
    engine.stop().await.unwrap();
    timeout(WAIT, engine.wait_until_complete()).await.unwrap();

    // Give the dispatch loop a chance to misbehave.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let state = engine.state();
    for id in &queued {
        let command = state.commands().get(id).unwrap();
        assert_eq!(command.status, CommandStatus::Queued);
        assert!(command.started_at.is_none());
    }
    assert_eq!(state.commands().get_failed().len(), 1);
}
