use frames::MessageType;
use serde_json::json;

use super::*;
use crate::config::EngineConfig;
use crate::input::Tool;
use crate::permission::Participant;

fn host_loop(capacity: usize) -> EventLoop {
    let config = EngineConfig { queue_capacity: capacity, ..EngineConfig::default() };
    let mut event_loop = EventLoop::new(EngineCore::new(config, "s1", Participant::host("gm", "GM")));
    event_loop.push(Task::Input(InputEvent::ConnectionOpened)).unwrap();
    event_loop.drain();
    event_loop
}

fn down(x: f64, y: f64) -> Task {
    Task::Input(InputEvent::PointerDown { screen: Point::new(x, y), button: Button::Primary })
}

fn mv(x: f64, y: f64) -> Task {
    Task::Input(InputEvent::PointerMove { screen: Point::new(x, y) })
}

fn up(x: f64, y: f64) -> Task {
    Task::Input(InputEvent::PointerUp { screen: Point::new(x, y) })
}

#[test]
fn queue_rejects_past_capacity() {
    let mut queue = TaskQueue::new(2);
    queue.push(Task::Tick).unwrap();
    queue.push(Task::Tick).unwrap();
    assert_eq!(queue.push(Task::Tick), Err(QueueError::Full { capacity: 2 }));
    assert_eq!(queue.len(), 2);
}

#[test]
fn zero_capacity_is_raised_to_one() {
    assert_eq!(TaskQueue::new(0).capacity(), 1);
}

#[test]
fn consecutive_moves_collapse() {
    let mut queue = TaskQueue::new(8);
    queue.push(mv(1.0, 1.0)).unwrap();
    queue.push(mv(2.0, 2.0)).unwrap();
    queue.push(mv(3.0, 3.0)).unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.pop(), Some(mv(3.0, 3.0)));
}

#[test]
fn moves_separated_by_other_tasks_are_kept() {
    let mut queue = TaskQueue::new(8);
    queue.push(mv(1.0, 1.0)).unwrap();
    queue.push(up(1.0, 1.0)).unwrap();
    queue.push(mv(2.0, 2.0)).unwrap();
    assert_eq!(queue.len(), 3);
}

#[test]
fn move_into_full_queue_replaces_pending_move() {
    let mut queue = TaskQueue::new(1);
    queue.push(mv(1.0, 1.0)).unwrap();
    queue.push(mv(2.0, 2.0)).unwrap();
    assert_eq!(queue.pop(), Some(mv(2.0, 2.0)));
}

#[test]
fn tasks_run_in_order() {
    let mut event_loop = host_loop(16);
    event_loop.engine_mut().set_tool(Tool::Draw);
    for task in [down(0.0, 0.0), mv(10.0, 0.0), up(20.0, 0.0)] {
        event_loop.push(task).unwrap();
    }

    let actions = event_loop.drain();
    let sent: Vec<_> = actions
        .iter()
        .filter_map(|a| match a {
            Action::Send(m) => Some(m.kind),
            _ => None,
        })
        .collect();
    assert_eq!(sent, vec![MessageType::DrawingAdd]);
    assert_eq!(event_loop.engine().store.drawings().len(), 1);
    assert!(event_loop.queue().is_empty());
}

#[test]
fn render_requests_coalesce_until_tick() {
    let mut event_loop = host_loop(16);
    for task in [mv(0.0, 0.0), down(0.0, 0.0), mv(5.0, 5.0), mv(9.0, 9.0)] {
        event_loop.push(task).unwrap();
    }
    let actions = event_loop.drain();
    assert!(!actions.contains(&Action::RenderNeeded));
    assert!(event_loop.is_dirty());

    event_loop.push(Task::Tick).unwrap();
    event_loop.push(Task::Tick).unwrap();
    assert_eq!(event_loop.run_one(), Some(vec![Action::RenderNeeded]));
    assert_eq!(event_loop.run_one(), Some(Vec::new()));
    assert_eq!(event_loop.run_one(), None);
}

#[test]
fn inbound_messages_reach_the_store() {
    let mut event_loop = host_loop(16);
    let message = SyncMessage::new(
        MessageType::FogReveal,
        "s1",
        "p1",
        1,
        json!({ "area": { "id": "f1", "x": 0.0, "y": 0.0, "radius": 20.0 } }),
    );
    event_loop.push(Task::Inbound(message)).unwrap();
    event_loop.drain();
    assert_eq!(event_loop.engine().store.fog().areas().len(), 1);
    assert!(event_loop.is_dirty());
}

#[test]
fn connection_lost_mid_gesture_discards_it() {
    let mut event_loop = host_loop(16);
    event_loop.engine_mut().set_tool(Tool::Draw);
    for task in [down(0.0, 0.0), mv(10.0, 0.0), Task::Input(InputEvent::ConnectionLost), up(20.0, 0.0)] {
        event_loop.push(task).unwrap();
    }
    event_loop.drain();
    assert!(event_loop.engine().store.drawings().is_empty());
}

#[test]
fn keyboard_events_dispatch() {
    let mut event_loop = host_loop(16);
    event_loop.engine_mut().place_token(Point::new(0.0, 0.0), "Orc");
    let undo = InputEvent::KeyDown { key: "z".into(), modifiers: Modifiers { ctrl: true, ..Modifiers::default() } };
    event_loop.push(Task::Input(undo)).unwrap();
    event_loop.drain();
    assert!(event_loop.engine().store.tokens().is_empty());
}
